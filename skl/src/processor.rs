//! Runtime trait for long-running tasks.
//!
//! The keyboard task and the release timer task both implement [`Runnable`], so that they can be
//! joined together in the firmware's main task:
//!
//! ```rust,ignore
//! embassy_futures::join::join(keyboard.run(), timer_task.run()).await;
//! ```

/// A task which runs forever, driven by its own event sources.
pub trait Runnable {
    async fn run(&mut self) -> !;
}
