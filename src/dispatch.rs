use anyhow::Result;
use log::debug;

use crate::actions::{PointerSink, VolumeControl};
use crate::config::VolumeRange;
use crate::error::SessionError;
use crate::gestures::ControlEvent;

/// Perform one classified event. `Exit` is the session's business and is a
/// no-op here.
pub fn dispatch_event(
    ev: &ControlEvent,
    pointer: &mut dyn PointerSink,
    volume: &mut dyn VolumeControl,
    range: &VolumeRange,
) -> Result<(), SessionError> {
    let r = match ev {
        ControlEvent::MoveTo { x, y } => pointer.move_to(x.round() as i32, y.round() as i32),
        ControlEvent::Click => pointer.click(),
        ControlEvent::DoubleClick => pointer.double_click(),
        ControlEvent::DragStart => pointer.mouse_down(),
        ControlEvent::DragEnd => pointer.mouse_up(),
        ControlEvent::Scroll { amount } => pointer.scroll(*amount),
        ControlEvent::Volume { delta } => nudge_volume(volume, *delta, range),
        ControlEvent::Exit => Ok(()),
    };
    r.map_err(|e| SessionError::ActuatorFailure(format!("{}: {e}", ev.name())))
}

fn nudge_volume(volume: &mut dyn VolumeControl, delta: f32, range: &VolumeRange) -> Result<()> {
    let current = volume.level()?;
    let next = (current + delta).clamp(range.min, range.max);
    if next != current {
        debug!("volume {current:.1} -> {next:.1}");
        volume.set_level(next)?;
    }
    Ok(())
}
