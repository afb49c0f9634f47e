use core::fmt;

/// Recoverable errors of the sticky key layer engine.
///
/// None of them is fatal: the offending transition is aborted and event processing continues.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StickyKeyError {
    /// Every slot of the pool is occupied, the sticky key press is ignored
    CapacityExceeded { position: u32 },
    /// A release arrived for a position without a tracked sticky key
    MissingActiveSlot { position: u32 },
    /// The wrapped behavior takes a second parameter, which cannot be proxied
    ChildMetadataUnsupported,
    /// The layer doesn't exist in the keymap
    InvalidLayer(u8),
    /// The binding refers to a sticky key layer instance that isn't configured
    UnknownInstance(u8),
}

impl fmt::Display for StickyKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StickyKeyError::CapacityExceeded { position } => write!(
                f,
                "unable to store sticky key at position {}, all sticky key slots are held",
                position
            ),
            StickyKeyError::MissingActiveSlot { position } => {
                write!(f, "no active sticky key at position {}, cleared too early", position)
            }
            StickyKeyError::ChildMetadataUnsupported => {
                write!(f, "bound behavior takes a second parameter, which sticky keys cannot proxy")
            }
            StickyKeyError::InvalidLayer(layer) => write!(f, "layer {} doesn't exist", layer),
            StickyKeyError::UnknownInstance(instance) => {
                write!(f, "sticky key layer instance {} is not configured", instance)
            }
        }
    }
}
