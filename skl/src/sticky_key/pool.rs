use embassy_time::Instant;
use skl_types::keycode::EncodedKey;

use crate::config::StickyKeyLayerConfig;
use crate::error::StickyKeyError;
use crate::layer::{LayerMask, LayerState};

/// Handle of an occupied pool row.
///
/// The generation changes every time the row is freed, so a handle never refers to a later
/// occupant of the same row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlotHandle {
    pub(crate) index: u8,
    pub(crate) generation: u16,
}

impl SlotHandle {
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

/// A sticky key which is currently held, armed or consumed
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ActiveStickyKey<'a> {
    pub position: u32,
    /// Originating half of a split keyboard
    pub source: Option<u8>,
    /// The modifier pressed through the wrapped behavior
    pub modifier: EncodedKey,
    pub config: &'a StickyKeyLayerConfig,
    /// The sticky key was released and its release timer armed
    pub timer_started: bool,
    pub release_at: Option<Instant>,
    /// `(usage page, keycode)` of the key currently consuming the sticky key
    pub consumed_by: Option<(u8, u32)>,
    pub target_layer: u8,
    /// The target layer was already active when the sticky key was pressed
    pub layer_was_active: bool,
    /// Layer state saved before the position listener switched to the target layer
    pub saved_layer_state: Option<LayerMask>,
    /// The wrapped behavior was pressed and awaits its release
    pub modifier_pressed: bool,
}

impl ActiveStickyKey<'_> {
    pub fn is_consumed(&self) -> bool {
        self.consumed_by.is_some()
    }
}

#[derive(Clone, Copy, Debug)]
struct Row<'a> {
    generation: u16,
    key: Option<ActiveStickyKey<'a>>,
}

/// Fixed capacity pool of active sticky keys
pub struct StickyKeyPool<'a, const N: usize> {
    rows: [Row<'a>; N],
}

impl<'a, const N: usize> Default for StickyKeyPool<'a, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, const N: usize> StickyKeyPool<'a, N> {
    pub const fn new() -> Self {
        const { assert!(N <= u8::MAX as usize, "sticky key pool is indexed by u8") };
        Self {
            rows: [Row {
                generation: 0,
                key: None,
            }; N],
        }
    }

    /// Store a new sticky key in the first free row for which `reusable` holds.
    ///
    /// `reusable` is used to skip rows whose timer cancellation is still in flight.
    pub fn allocate(
        &mut self,
        position: u32,
        source: Option<u8>,
        modifier: EncodedKey,
        config: &'a StickyKeyLayerConfig,
        layers: &LayerState,
        reusable: impl Fn(usize) -> bool,
    ) -> Result<SlotHandle, StickyKeyError> {
        let Some((index, row)) = self
            .rows
            .iter_mut()
            .enumerate()
            .find(|(i, row)| row.key.is_none() && reusable(*i))
        else {
            return Err(StickyKeyError::CapacityExceeded { position });
        };

        let key = ActiveStickyKey {
            position,
            source,
            modifier,
            config,
            timer_started: false,
            release_at: None,
            consumed_by: None,
            target_layer: config.target_layer,
            layer_was_active: layers.is_active(config.target_layer),
            saved_layer_state: None,
            modifier_pressed: false,
        };
        debug!(
            "Stored sticky key at {}, modifier {:?}, target layer {}, layer was active {}",
            position, modifier, key.target_layer, key.layer_was_active
        );
        row.key = Some(key);

        Ok(SlotHandle {
            index: index as u8,
            generation: row.generation,
        })
    }

    /// Find the live sticky key at `position`
    pub fn find(&self, position: u32) -> Option<SlotHandle> {
        self.rows.iter().enumerate().find_map(|(i, row)| match row.key {
            Some(key) if key.position == position => Some(SlotHandle {
                index: i as u8,
                generation: row.generation,
            }),
            _ => None,
        })
    }

    pub fn get(&self, handle: SlotHandle) -> Option<&ActiveStickyKey<'a>> {
        self.rows
            .get(handle.index())
            .filter(|row| row.generation == handle.generation)
            .and_then(|row| row.key.as_ref())
    }

    pub fn get_mut(&mut self, handle: SlotHandle) -> Option<&mut ActiveStickyKey<'a>> {
        self.rows
            .get_mut(handle.index())
            .filter(|row| row.generation == handle.generation)
            .and_then(|row| row.key.as_mut())
    }

    /// Free the row of `handle`, returning the sticky key it held.
    ///
    /// A stale handle frees nothing.
    pub fn release(&mut self, handle: SlotHandle) -> Option<ActiveStickyKey<'a>> {
        let row = self.rows.get_mut(handle.index())?;
        if row.generation != handle.generation {
            return None;
        }
        let key = row.key.take()?;
        debug!("Cleared sticky key at {}", key.position);
        row.generation = row.generation.wrapping_add(1);
        Some(key)
    }

    /// Handles of all occupied rows, in row order
    pub fn handles(&self) -> heapless::Vec<SlotHandle, N> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.key.is_some())
            .map(|(i, row)| SlotHandle {
                index: i as u8,
                generation: row.generation,
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|row| row.key.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skl_types::keycode::HidKeyCode;

    static CONFIG: StickyKeyLayerConfig = StickyKeyLayerConfig {
        release_after_ms: 1000,
        quick_release: false,
        lazy: false,
        ignore_modifiers: true,
        target_layer: 1,
        behavior: crate::behavior::Behavior::KeyPress,
    };

    fn lctrl() -> EncodedKey {
        EncodedKey::key(HidKeyCode::LCtrl)
    }

    #[test]
    fn test_allocate_and_find() {
        let layers = LayerState::new(4, 0);
        let mut pool: StickyKeyPool<'_, 2> = StickyKeyPool::new();
        let handle = pool.allocate(5, None, lctrl(), &CONFIG, &layers, |_| true).unwrap();
        assert_eq!(pool.find(5), Some(handle));
        assert_eq!(pool.find(6), None);
        let key = pool.get(handle).unwrap();
        assert_eq!(key.target_layer, 1);
        assert!(!key.layer_was_active);
        assert!(!key.is_consumed());
    }

    #[test]
    fn test_layer_was_active_on_entry() {
        let mut layers = LayerState::new(4, 0);
        layers.activate(1);
        let mut pool: StickyKeyPool<'_, 2> = StickyKeyPool::new();
        let handle = pool.allocate(5, None, lctrl(), &CONFIG, &layers, |_| true).unwrap();
        assert!(pool.get(handle).unwrap().layer_was_active);
    }

    #[test]
    fn test_capacity_exceeded() {
        let layers = LayerState::new(4, 0);
        let mut pool: StickyKeyPool<'_, 2> = StickyKeyPool::new();
        pool.allocate(1, None, lctrl(), &CONFIG, &layers, |_| true).unwrap();
        pool.allocate(2, None, lctrl(), &CONFIG, &layers, |_| true).unwrap();
        assert_eq!(
            pool.allocate(3, None, lctrl(), &CONFIG, &layers, |_| true),
            Err(StickyKeyError::CapacityExceeded { position: 3 })
        );
        assert_eq!(pool.find(3), None);
    }

    #[test]
    fn test_stale_handle_after_reuse() {
        let layers = LayerState::new(4, 0);
        let mut pool: StickyKeyPool<'_, 1> = StickyKeyPool::new();
        let first = pool.allocate(1, None, lctrl(), &CONFIG, &layers, |_| true).unwrap();
        assert!(pool.release(first).is_some());
        assert!(pool.release(first).is_none());
        let second = pool.allocate(2, None, lctrl(), &CONFIG, &layers, |_| true).unwrap();
        assert_eq!(first.index(), second.index());
        assert_ne!(first, second);
        assert!(pool.get(first).is_none());
        assert!(pool.release(first).is_none());
        assert_eq!(pool.get(second).unwrap().position, 2);
    }

    #[test]
    fn test_row_with_pending_cancel_is_skipped() {
        let layers = LayerState::new(4, 0);
        let mut pool: StickyKeyPool<'_, 2> = StickyKeyPool::new();
        let handle = pool.allocate(1, None, lctrl(), &CONFIG, &layers, |i| i != 0).unwrap();
        assert_eq!(handle.index(), 1);
        assert_eq!(
            pool.allocate(2, None, lctrl(), &CONFIG, &layers, |i| i != 0),
            Err(StickyKeyError::CapacityExceeded { position: 2 })
        );
    }
}
