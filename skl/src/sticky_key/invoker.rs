use embassy_time::Instant;

use super::pool::{ActiveStickyKey, SlotHandle};
use super::{Emission, Emissions, emit};
use crate::behavior::{Binding, BindingEvent};
use crate::event::Provenance;

/// The wrapped behavior, bound with the sticky key's modifier only.
///
/// The layer is never forwarded, layer switching belongs to the sticky key itself.
fn wrapped_binding(key: &ActiveStickyKey) -> Binding {
    Binding::new(key.config.behavior, key.modifier.0, 0)
}

fn invoke(handle: SlotHandle, key: &ActiveStickyKey, timestamp: Instant, pressed: bool, out: &mut Emissions) {
    emit(
        out,
        Emission::Invoke {
            binding: wrapped_binding(key),
            event: BindingEvent {
                position: key.position,
                timestamp,
                source: key.source,
            },
            pressed,
            provenance: Provenance::StickyKey(handle),
        },
    );
}

pub(super) fn press(handle: SlotHandle, key: &ActiveStickyKey, timestamp: Instant, out: &mut Emissions) {
    debug!("Pressing sticky key behavior, modifier {:?}", key.modifier);
    invoke(handle, key, timestamp, true, out);
}

pub(super) fn release(handle: SlotHandle, key: &ActiveStickyKey, timestamp: Instant, out: &mut Emissions) {
    debug!("Releasing sticky key behavior, modifier {:?}", key.modifier);
    invoke(handle, key, timestamp, false, out);
}
