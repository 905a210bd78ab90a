//! Geometric features computed from a single landmark frame.
//!
//! Everything here is a pure function of the frame. Distances are in camera
//! pixels (normalized coordinate times frame size) so thresholds can be tuned
//! against what the camera actually sees.

use crate::error::SessionError;
use crate::landmarks::{Landmark, LandmarkFrame, Modality, face, hand};

/// Pixel-space point.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Px {
    pub x: f32,
    pub y: f32,
}

impl Px {
    pub fn distance(self, other: Px) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

struct View<'a> {
    frame: &'a LandmarkFrame,
    modality: Modality,
}

impl<'a> View<'a> {
    fn landmark(&self, index: usize) -> Result<&'a Landmark, SessionError> {
        self.frame
            .points
            .get(index)
            .ok_or(SessionError::MissingLandmark {
                modality: self.modality,
                index,
                available: self.frame.points.len(),
            })
    }

    fn px(&self, index: usize) -> Result<Px, SessionError> {
        let p = self.landmark(index)?;
        Ok(Px {
            x: p.x * self.frame.width,
            y: p.y * self.frame.height,
        })
    }

    fn distance(&self, a: usize, b: usize) -> Result<f32, SessionError> {
        Ok(self.px(a)?.distance(self.px(b)?))
    }

    /// Vertical eyelid separation over horizontal eye width.
    fn eye_aspect_ratio(&self, eye: face::EyeIndices) -> Result<f32, SessionError> {
        let vertical = self.distance(eye.top, eye.bottom)?;
        let horizontal = self.distance(eye.outer, eye.inner)?;
        if horizontal <= f32::EPSILON {
            return Err(SessionError::MalformedFrame(format!(
                "degenerate eye width between landmarks {} and {}",
                eye.outer, eye.inner
            )));
        }
        Ok(vertical / horizontal)
    }
}

#[derive(Debug, Clone)]
pub struct HandFeatures {
    /// Normalized index fingertip, the cursor driver.
    pub index_tip: Landmark,
    /// Middle fingertip in pixels, the scroll driver.
    pub middle_tip_px: Px,
    pub pinch_distance_px: f32,
    /// Thumb, index, middle, ring, pinky: tip above its proximal joint.
    pub extended: [bool; 5],
    /// Index, middle, ring, pinky: tip below its proximal joint.
    pub folded: [bool; 4],
    pub thumb_tip_y: f32,
    pub thumb_base_y: f32,
}

impl HandFeatures {
    pub fn extract(frame: &LandmarkFrame) -> Result<Self, SessionError> {
        let v = View {
            frame,
            modality: Modality::Hand,
        };

        let mut extended = [false; 5];
        for (slot, &(tip, pip)) in extended.iter_mut().zip(hand::FINGERS.iter()) {
            *slot = v.landmark(tip)?.y < v.landmark(pip)?.y;
        }
        let mut folded = [false; 4];
        for (slot, &(tip, pip)) in folded.iter_mut().zip(hand::FINGERS[1..].iter()) {
            *slot = v.landmark(tip)?.y > v.landmark(pip)?.y;
        }

        Ok(Self {
            index_tip: *v.landmark(hand::INDEX_TIP)?,
            middle_tip_px: v.px(hand::MIDDLE_TIP)?,
            pinch_distance_px: v.distance(hand::INDEX_TIP, hand::THUMB_TIP)?,
            extended,
            folded,
            thumb_tip_y: v.landmark(hand::THUMB_TIP)?.y,
            thumb_base_y: v.landmark(hand::THUMB_MCP)?.y,
        })
    }

    pub fn open_palm(&self) -> bool {
        self.extended.iter().all(|&e| e)
    }
}

#[derive(Debug, Clone)]
pub struct FaceFeatures {
    pub ear_left: f32,
    pub ear_right: f32,
    pub mouth_open_px: f32,
    pub iris_px: Px,
}

impl FaceFeatures {
    pub fn extract(frame: &LandmarkFrame) -> Result<Self, SessionError> {
        let v = View {
            frame,
            modality: Modality::Eye,
        };
        Ok(Self {
            ear_left: v.eye_aspect_ratio(face::LEFT_EYE)?,
            ear_right: v.eye_aspect_ratio(face::RIGHT_EYE)?,
            mouth_open_px: v.distance(face::UPPER_LIP, face::LOWER_LIP)?,
            iris_px: v.px(face::TRACKED_IRIS)?,
        })
    }
}
