//! Release timers of the sticky keys.
//!
//! Every pool row owns one timer. The keyboard task schedules and cancels timers, the
//! [`ReleaseTimerTask`] fires them. The two sides only share the per-row atomic state and the
//! cancel-requested flag:
//!
//! ```text
//!            schedule             claimed by task
//!   IDLE ─────────────► SCHEDULED ───────────────► FIRED
//!    ▲                     │ cancel                  │ take_fired
//!    └─────────────────────┴─────────────────────────┘
//! ```
//!
//! Cancelling a FIRED row can't stop the timeout which is already on its way to the keyboard
//! task. The cancel request is recorded instead, and [`ReleaseTimers::take_fired`] absorbs the
//! timeout when it arrives.

use core::cell::Cell;

use embassy_futures::select::select;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::{Instant, Timer};
use portable_atomic::{AtomicBool, AtomicU8, Ordering};

use super::pool::SlotHandle;
use crate::RawMutex;
use crate::processor::Runnable;

const IDLE: u8 = 0;
const SCHEDULED: u8 = 1;
const FIRED: u8 = 2;

/// Result of [`ReleaseTimers::schedule`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScheduleResult {
    /// The timer will fire at the deadline
    Scheduled,
    /// The deadline has already passed, nothing was scheduled. The caller times out the sticky key
    /// itself.
    Overdue,
    /// The timer of the row is still running or firing, nothing was scheduled
    Refused,
}

/// Result of [`ReleaseTimers::cancel`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CancelResult {
    /// The timer won't fire. Also returned if it wasn't scheduled.
    Cancelled,
    /// The timer has already fired and its timeout is pending, the cancel request absorbs it
    RaceInProgress,
}

/// What to do with a fired timer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FiredAction {
    /// Run the timeout of the sticky key
    Timeout,
    /// The timer was cancelled while firing, do nothing
    Absorbed,
}

struct TimerRow {
    state: AtomicU8,
    cancel_requested: AtomicBool,
    deadline: Mutex<RawMutex, Cell<Option<(SlotHandle, Instant)>>>,
}

impl TimerRow {
    const fn new() -> Self {
        Self {
            state: AtomicU8::new(IDLE),
            cancel_requested: AtomicBool::new(false),
            deadline: Mutex::new(Cell::new(None)),
        }
    }

    fn deadline(&self) -> Option<(SlotHandle, Instant)> {
        self.deadline.lock(|d| d.get())
    }

    fn set_deadline(&self, deadline: Option<(SlotHandle, Instant)>) {
        self.deadline.lock(|d| d.set(deadline))
    }
}

/// One release timer per sticky key pool row
pub struct ReleaseTimers<const N: usize> {
    rows: [TimerRow; N],
    /// Wakes the timer task when a deadline changes
    reschedule: Signal<RawMutex, ()>,
    /// Handles of sticky keys whose timer fired, waiting for the keyboard task
    fired: Channel<RawMutex, SlotHandle, N>,
}

impl<const N: usize> Default for ReleaseTimers<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ReleaseTimers<N> {
    pub const fn new() -> Self {
        Self {
            rows: [const { TimerRow::new() }; N],
            reschedule: Signal::new(),
            fired: Channel::new(),
        }
    }

    /// Start the timer of `handle`'s row, firing at `deadline`.
    ///
    /// A deadline which isn't after `now` is never handed to the timer task.
    pub fn schedule(&self, handle: SlotHandle, deadline: Instant, now: Instant) -> ScheduleResult {
        let Some(row) = self.rows.get(handle.index()) else {
            error!("Release timer {} doesn't exist", handle.index());
            return ScheduleResult::Refused;
        };
        if deadline <= now {
            debug!("Release timer {} is overdue, not scheduling", handle.index());
            return ScheduleResult::Overdue;
        }
        if row.state.load(Ordering::Acquire) != IDLE {
            error!("Release timer {} is already running", handle.index());
            return ScheduleResult::Refused;
        }

        row.set_deadline(Some((handle, deadline)));
        row.state.store(SCHEDULED, Ordering::Release);
        self.reschedule.signal(());
        ScheduleResult::Scheduled
    }

    /// Stop the timer of row `index`
    pub fn cancel(&self, index: usize) -> CancelResult {
        let Some(row) = self.rows.get(index) else {
            return CancelResult::Cancelled;
        };
        match row
            .state
            .compare_exchange(SCHEDULED, IDLE, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                row.set_deadline(None);
                self.reschedule.signal(());
                CancelResult::Cancelled
            }
            Err(FIRED) => {
                debug!("Release timer {} has already fired, requesting cancel", index);
                row.cancel_requested.store(true, Ordering::Release);
                CancelResult::RaceInProgress
            }
            Err(_) => CancelResult::Cancelled,
        }
    }

    /// Settle the fired timer of `handle`'s row, called when its timeout reaches the keyboard task.
    ///
    /// A pending cancel request is cleared and absorbs the timeout.
    pub fn take_fired(&self, handle: SlotHandle) -> FiredAction {
        let Some(row) = self.rows.get(handle.index()) else {
            return FiredAction::Absorbed;
        };
        row.set_deadline(None);
        let cancelled = row.cancel_requested.swap(false, Ordering::AcqRel);
        let fired = row
            .state
            .compare_exchange(FIRED, IDLE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if cancelled || !fired {
            debug!("Release timer {} was cancelled while firing", handle.index());
            FiredAction::Absorbed
        } else {
            FiredAction::Timeout
        }
    }

    /// Whether row `index` has a cancel request which wasn't absorbed yet.
    ///
    /// Such a row can't be given to a new sticky key, its pending timeout would be absorbed by the
    /// wrong occupant's cancel request.
    pub fn is_cancel_pending(&self, index: usize) -> bool {
        self.rows
            .get(index)
            .is_some_and(|row| row.cancel_requested.load(Ordering::Acquire))
    }

    /// Wait for the next fired timer
    pub async fn fired(&self) -> SlotHandle {
        self.fired.receive().await
    }

    #[cfg(test)]
    pub(crate) fn try_fired(&self) -> Option<SlotHandle> {
        self.fired.try_receive().ok()
    }

    /// Claim every scheduled row whose deadline is not after `now`, returns the earliest
    /// deadline still pending
    pub(crate) fn fire_expired(&self, now: Instant) -> Option<Instant> {
        let mut next: Option<Instant> = None;
        for (index, row) in self.rows.iter().enumerate() {
            if row.state.load(Ordering::Acquire) != SCHEDULED {
                continue;
            }
            let Some((handle, deadline)) = row.deadline() else {
                continue;
            };
            if deadline > now {
                next = Some(next.map_or(deadline, |n| n.min(deadline)));
                continue;
            }
            // Lose the claim if the keyboard task cancelled the timer in the meantime
            if row
                .state
                .compare_exchange(SCHEDULED, FIRED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                debug!("Release timer {} fired", index);
                if self.fired.try_send(handle).is_err() {
                    // Every row has at most one handle in flight, so this can't happen
                    error!("Fired release timer channel is full, dropping timer {}", index);
                    row.state.store(IDLE, Ordering::Release);
                }
            }
        }
        next
    }
}

/// The task which fires the release timers
pub struct ReleaseTimerTask<'a, const N: usize> {
    timers: &'a ReleaseTimers<N>,
}

impl<'a, const N: usize> ReleaseTimerTask<'a, N> {
    pub fn new(timers: &'a ReleaseTimers<N>) -> Self {
        Self { timers }
    }
}

impl<const N: usize> Runnable for ReleaseTimerTask<'_, N> {
    async fn run(&mut self) -> ! {
        loop {
            match self.timers.fire_expired(Instant::now()) {
                Some(deadline) => {
                    select(Timer::at(deadline), self.timers.reschedule.wait()).await;
                }
                None => self.timers.reschedule.wait().await,
            }
        }
    }
}
