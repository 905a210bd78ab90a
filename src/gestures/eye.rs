//! Eye modality: iris displacement from a calibrated centre moves the cursor,
//! left-eye blinks click, a held eye nudges the volume, an open mouth exits.

use log::debug;
use std::collections::VecDeque;

use super::{ControlEvent, GestureClassifier};
use crate::config::{EyeThresholds, Smoothing};
use crate::error::SessionError;
use crate::features::{FaceFeatures, Px};
use crate::landmarks::{LandmarkFrame, Modality};
use crate::smoother::TemporalSmoother;

/// Consecutive closed frames for one eye.
#[derive(Debug, Default)]
struct ClosureCounter {
    run: u32,
}

impl ClosureCounter {
    /// Returns the length of a closed run that ended on this frame.
    fn observe(&mut self, closed: bool) -> Option<u32> {
        if closed {
            self.run += 1;
            None
        } else {
            let run = std::mem::take(&mut self.run);
            (run > 0).then_some(run)
        }
    }
}

/// Completed blinks waiting to be resolved into a click or a double click.
#[derive(Debug)]
struct ClickWindow {
    window: f64,
    stamps: VecDeque<f64>,
}

impl ClickWindow {
    fn new(window: f64) -> Self {
        Self {
            window,
            stamps: VecDeque::with_capacity(2),
        }
    }

    fn push(&mut self, t: f64) -> Option<ControlEvent> {
        self.stamps.push_back(t);
        self.stamps.retain(|&s| t - s <= self.window);
        if self.stamps.len() == 2 {
            self.stamps.clear();
            return Some(ControlEvent::DoubleClick);
        }
        None
    }

    /// A lone blink whose window has closed becomes a single click.
    fn expire(&mut self, now: f64) -> Option<ControlEvent> {
        match self.stamps.front() {
            Some(&t) if self.stamps.len() == 1 && now - t > self.window => {
                self.stamps.clear();
                Some(ControlEvent::Click)
            }
            _ => None,
        }
    }

    /// Resolve a lone pending blink now instead of waiting out its window.
    fn flush(&mut self) -> Option<ControlEvent> {
        let pending = self.stamps.len() == 1;
        self.stamps.clear();
        pending.then_some(ControlEvent::Click)
    }
}

#[derive(Debug)]
pub struct EyeClassifier {
    th: EyeThresholds,
    smoother: TemporalSmoother,
    reference: Option<Px>,
    last_iris: Option<Px>,
    left: ClosureCounter,
    right: ClosureCounter,
    clicks: ClickWindow,
}

impl EyeClassifier {
    pub fn new(th: EyeThresholds, smoothing: &Smoothing, screen: (f32, f32)) -> Self {
        let smoother = TemporalSmoother::new(
            smoothing.buffer_size,
            smoothing.dead_zone_px,
            smoothing.alpha,
            screen,
        );
        let clicks = ClickWindow::new(th.double_click_window_sec);
        Self {
            th,
            smoother,
            reference: None,
            last_iris: None,
            left: ClosureCounter::default(),
            right: ClosureCounter::default(),
            clicks,
        }
    }

    #[cfg(test)]
    pub fn reference(&self) -> Option<Px> {
        self.reference
    }

    fn track_cursor(&mut self, iris: Px) -> Option<ControlEvent> {
        let reference = self.reference?;
        let dx = (iris.x - reference.x) * self.th.sensitivity;
        let dy = (iris.y - reference.y) * self.th.sensitivity;
        self.smoother
            .update(dx, dy)
            .map(|p| ControlEvent::MoveTo { x: p.x, y: p.y })
    }
}

impl GestureClassifier for EyeClassifier {
    fn modality(&self) -> Modality {
        Modality::Eye
    }

    fn observe(&mut self, frame: &LandmarkFrame) -> Result<Vec<ControlEvent>, SessionError> {
        let f = FaceFeatures::extract(frame)?;
        let now = frame.timestamp;
        let mut out = Vec::new();

        if f.mouth_open_px > self.th.mouth_open_threshold_px {
            debug!("mouth open ({:.1}px)", f.mouth_open_px);
            out.push(ControlEvent::Exit);
            return Ok(out);
        }

        out.extend(self.clicks.expire(now));

        self.last_iris = Some(f.iris_px);
        out.extend(self.track_cursor(f.iris_px));

        let right_closed = f.ear_right < self.th.blink_threshold;
        let left_closed = f.ear_left < self.th.blink_threshold;

        if let Some(run) = self.right.observe(right_closed) {
            debug!("right eye reopened after {run} frames");
        }
        if self.right.run >= self.th.hold_frames {
            out.push(ControlEvent::Volume {
                delta: self.th.volume_step,
            });
        }

        let left_release = self.left.observe(left_closed);
        if self.left.run >= self.th.hold_frames {
            out.push(ControlEvent::Volume {
                delta: -self.th.volume_step,
            });
        }
        if let Some(run) = left_release.filter(|&r| r >= self.th.consec_frames) {
            debug!("left blink completed ({run} frames)");
            out.extend(self.clicks.push(now));
        }

        Ok(out)
    }

    fn observe_absent(&mut self, now: f64) -> Vec<ControlEvent> {
        self.clicks.expire(now).into_iter().collect()
    }

    fn calibrate(&mut self) -> bool {
        match self.last_iris {
            Some(p) => {
                self.reference = Some(p);
                true
            }
            None => false,
        }
    }

    fn is_calibrated(&self) -> bool {
        self.reference.is_some()
    }

    fn finish(&mut self) -> Vec<ControlEvent> {
        self.clicks.flush().into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::fixtures::*;
    use crate::landmarks::face;

    const FPS: f64 = 30.0;
    const OPEN: f32 = 0.30;
    const SHUT: f32 = 0.10;

    fn classifier() -> EyeClassifier {
        EyeClassifier::new(
            EyeThresholds::default(),
            &Smoothing::default(),
            (1920.0, 1080.0),
        )
    }

    /// Feeds `(ear_left, ear_right)` pairs at 30 fps starting at `t0`.
    fn feed(c: &mut EyeClassifier, t0: f64, ears: &[(f32, f32)]) -> Vec<(f64, ControlEvent)> {
        let mut out = Vec::new();
        for (i, &(l, r)) in ears.iter().enumerate() {
            let t = t0 + i as f64 / FPS;
            for e in c.observe(&frame(t, face_points(l, r, (0.5, 0.4)))).unwrap() {
                out.push((t, e));
            }
        }
        out
    }

    fn blink(frames: usize) -> Vec<(f32, f32)> {
        let mut v = vec![(SHUT, OPEN); frames];
        v.push((OPEN, OPEN));
        v
    }

    fn count(events: &[(f64, ControlEvent)], kind: &ControlEvent) -> usize {
        events.iter().filter(|(_, e)| e == kind).count()
    }

    #[test]
    fn closure_counter_reports_run_on_release() {
        let mut c = ClosureCounter::default();
        assert_eq!(c.observe(false), None);
        assert_eq!(c.observe(true), None);
        assert_eq!(c.observe(true), None);
        assert_eq!(c.observe(false), Some(2));
        assert_eq!(c.observe(false), None);
    }

    #[test]
    fn single_frame_closure_is_noise() {
        let mut c = classifier();
        let mut events = feed(&mut c, 0.0, &blink(1));
        events.extend(c.observe_absent(2.0).into_iter().map(|e| (2.0, e)));
        assert!(events.is_empty(), "{events:?}");
    }

    #[test]
    fn two_quick_blinks_are_one_double_click() {
        let mut c = classifier();
        let mut events = feed(&mut c, 0.0, &blink(3));
        // second blink starts 0.4s after the first
        events.extend(feed(&mut c, 0.4, &blink(3)));
        events.extend(feed(&mut c, 0.6, &[(OPEN, OPEN); 30]));

        assert_eq!(count(&events, &ControlEvent::DoubleClick), 1);
        assert_eq!(count(&events, &ControlEvent::Click), 0);
    }

    #[test]
    fn lone_blink_clicks_once_its_window_closes() {
        let mut c = classifier();
        let events = feed(&mut c, 0.0, &blink(3));
        assert!(events.is_empty());
        let released_at = 3.0 / FPS;

        let events = feed(&mut c, 0.2, &[(OPEN, OPEN); 30]);
        assert_eq!(count(&events, &ControlEvent::Click), 1);
        let (t, _) = events[0];
        assert!(t - released_at > 0.5);
    }

    /// Feeds explicit `(t, ear_left)` frames with the right eye open.
    fn feed_at(c: &mut EyeClassifier, frames: &[(f64, f32)]) -> Vec<(f64, ControlEvent)> {
        let mut out = Vec::new();
        for &(t, l) in frames {
            for e in c.observe(&frame(t, face_points(l, OPEN, (0.5, 0.4)))).unwrap() {
                out.push((t, e));
            }
        }
        out
    }

    #[test]
    fn closure_of_exactly_consec_frames_is_a_blink() {
        let mut c = classifier();
        let mut events = feed(&mut c, 0.0, &blink(2));
        events.extend(c.observe_absent(5.0).into_iter().map(|e| (5.0, e)));
        assert_eq!(events, vec![(5.0, ControlEvent::Click)]);
    }

    #[test]
    fn blinks_exactly_one_window_apart_double_click() {
        let mut c = classifier();
        // releases at 0.25 and 0.75
        let events = feed_at(
            &mut c,
            &[
                (0.125, SHUT),
                (0.1875, SHUT),
                (0.25, OPEN),
                (0.625, SHUT),
                (0.6875, SHUT),
                (0.75, OPEN),
            ],
        );
        assert_eq!(events, vec![(0.75, ControlEvent::DoubleClick)]);
    }

    #[test]
    fn finish_resolves_a_pending_blink() {
        let mut c = classifier();
        assert!(feed(&mut c, 0.0, &blink(3)).is_empty());
        assert_eq!(c.finish(), vec![ControlEvent::Click]);
        assert!(c.finish().is_empty());
        assert!(c.observe_absent(5.0).is_empty());
    }

    #[test]
    fn spaced_blinks_are_two_single_clicks() {
        let mut c = classifier();
        let mut events = feed(&mut c, 0.0, &blink(3));
        events.extend(feed(&mut c, 0.8, &blink(3)));
        events.extend(c.observe_absent(3.0).into_iter().map(|e| (3.0, e)));

        assert_eq!(count(&events, &ControlEvent::Click), 2);
        assert_eq!(count(&events, &ControlEvent::DoubleClick), 0);
    }

    #[test]
    fn held_eyes_nudge_volume_then_still_click() {
        let mut c = classifier();
        let mut ears = vec![(SHUT, OPEN); 14];
        ears.push((OPEN, OPEN));
        let events = feed(&mut c, 0.0, &ears);
        // frames 12, 13 and 14 of the closure are past the hold threshold
        assert_eq!(count(&events, &ControlEvent::Volume { delta: -1.5 }), 3);

        let mut ears = vec![(OPEN, SHUT); 12];
        ears.push((OPEN, OPEN));
        let events = feed(&mut c, 2.0, &ears);
        assert_eq!(count(&events, &ControlEvent::Volume { delta: 1.5 }), 1);
        // the long left closure above still resolves as a click
        assert_eq!(count(&events, &ControlEvent::Click), 1);
    }

    #[test]
    fn open_mouth_exits_immediately() {
        let mut c = classifier();
        let mut pts = face_points(OPEN, OPEN, (0.5, 0.4));
        pts[face::LOWER_LIP].y = 0.8;
        let events = c.observe(&frame(0.0, pts)).unwrap();
        assert_eq!(events, vec![ControlEvent::Exit]);
    }

    #[test]
    fn cursor_waits_for_calibration_then_tracks() {
        let mut c = classifier();
        assert!(!c.calibrate(), "nothing seen yet");

        let centre = face_points(OPEN, OPEN, (0.5, 0.4));
        c.observe(&frame(0.0, centre.clone())).unwrap();
        assert!(!c.is_calibrated());
        assert!(c.calibrate());
        assert!(c.reference().is_some());

        // iris 0.02 of frame width to the right: 12.8px * 65 is well past the dead zone
        let moved = face_points(OPEN, OPEN, (0.52, 0.4));
        let mut last = None;
        for i in 1..40 {
            for e in c.observe(&frame(i as f64 / FPS, moved.clone())).unwrap() {
                if let ControlEvent::MoveTo { x, y } = e {
                    last = Some((x, y));
                }
            }
        }
        let (x, y) = last.expect("cursor moved after buffer filled");
        assert!(x > 960.0 && x <= 1920.0);
        assert!((y - 540.0).abs() < 1.0);
    }

    #[test]
    fn uncalibrated_eye_never_moves_cursor() {
        let mut c = classifier();
        let pts = face_points(OPEN, OPEN, (0.9, 0.9));
        for i in 0..20 {
            let events = c.observe(&frame(i as f64, pts.clone())).unwrap();
            assert!(!events
                .iter()
                .any(|e| matches!(e, ControlEvent::MoveTo { .. })));
        }
    }
}
