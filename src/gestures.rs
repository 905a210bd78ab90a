mod eye;
mod hand;

use eye::EyeClassifier;
use hand::HandClassifier;

use serde::Serialize;

use crate::config::Profile;
use crate::error::SessionError;
use crate::landmarks::{LandmarkFrame, Modality};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ControlEvent {
    /// Absolute screen position.
    MoveTo { x: f32, y: f32 },
    Click,
    DoubleClick,
    DragStart,
    DragEnd,
    /// Signed wheel ticks, positive scrolls up.
    Scroll { amount: i32 },
    /// Signed change applied to the current output volume.
    Volume { delta: f32 },
    Exit,
}

impl ControlEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MoveTo { .. } => "move_to",
            Self::Click => "click",
            Self::DoubleClick => "double_click",
            Self::DragStart => "drag_start",
            Self::DragEnd => "drag_end",
            Self::Scroll { .. } => "scroll",
            Self::Volume { .. } => "volume",
            Self::Exit => "exit",
        }
    }
}

/// Per-modality state machine fed one frame at a time.
pub trait GestureClassifier {
    fn modality(&self) -> Modality;

    /// Classify one frame that contains a subject. Events come out in the
    /// order they should be actuated.
    fn observe(&mut self, frame: &LandmarkFrame) -> Result<Vec<ControlEvent>, SessionError>;

    /// The detector saw nothing this frame.
    fn observe_absent(&mut self, now: f64) -> Vec<ControlEvent>;

    /// Use the most recent tracked point as the neutral reference. Returns
    /// false when there is nothing to calibrate against.
    fn calibrate(&mut self) -> bool;

    fn is_calibrated(&self) -> bool;

    /// Events needed to leave the OS in a clean state when the session ends.
    fn finish(&mut self) -> Vec<ControlEvent> {
        Vec::new()
    }
}

pub fn classifier_for(modality: Modality, profile: &Profile) -> Box<dyn GestureClassifier> {
    match modality {
        Modality::Hand => Box::new(HandClassifier::new(
            profile.hand.clone(),
            profile.screen.size(),
        )),
        Modality::Eye => Box::new(EyeClassifier::new(
            profile.eye.clone(),
            &profile.smoothing,
            profile.screen.size(),
        )),
    }
}
