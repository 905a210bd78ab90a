//! Hand modality: index fingertip drives the cursor, a thumb/index pinch is
//! the mouse button, the middle fingertip scrolls, a thumbs up/down with the
//! other fingers curled nudges the volume, and a held open palm ends the
//! session.

use log::debug;

use super::{ControlEvent, GestureClassifier};
use crate::config::HandThresholds;
use crate::error::SessionError;
use crate::features::HandFeatures;
use crate::landmarks::{LandmarkFrame, Modality};
use crate::smoother::{CursorEma, CursorPos};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PinchState {
    Inactive,
    /// Pinched, not yet held long enough to drag.
    Active { since: f64 },
    /// Mouse button is down.
    Dragging { since: f64 },
}

#[derive(Debug)]
pub struct HandClassifier {
    th: HandThresholds,
    screen: (f32, f32),
    cursor: CursorEma,
    pinch: PinchState,
    last_scroll: Option<f64>,
    palm_run: u32,
}

impl HandClassifier {
    pub fn new(th: HandThresholds, screen: (f32, f32)) -> Self {
        let cursor = CursorEma::new(th.cursor_alpha, screen);
        Self {
            th,
            screen,
            cursor,
            pinch: PinchState::Inactive,
            last_scroll: None,
            palm_run: 0,
        }
    }

    #[cfg(test)]
    pub fn pinch_state(&self) -> PinchState {
        self.pinch
    }

    /// Counts consecutive open-palm frames. True exactly once per run, on the
    /// frame the run reaches the confirmation length.
    fn update_palm(&mut self, open_palm: bool) -> bool {
        if open_palm {
            self.palm_run += 1;
            self.palm_run == self.th.exit_confirm_frames
        } else {
            self.palm_run = 0;
            false
        }
    }

    fn update_pinch(&mut self, distance_px: f32, now: f64) -> Option<ControlEvent> {
        let pinched = distance_px < self.th.pinch_threshold_px;
        match (self.pinch, pinched) {
            (PinchState::Inactive, true) => {
                self.pinch = PinchState::Active { since: now };
                None
            }
            (PinchState::Active { since }, true) => {
                if now - since >= self.th.drag_hold_sec {
                    self.pinch = PinchState::Dragging { since };
                    Some(ControlEvent::DragStart)
                } else {
                    None
                }
            }
            (PinchState::Dragging { .. }, true) | (PinchState::Inactive, false) => None,
            (PinchState::Active { since }, false) => {
                self.pinch = PinchState::Inactive;
                // a hold that crossed the drag threshold between frames fires nothing
                (now - since < self.th.drag_hold_sec).then_some(ControlEvent::Click)
            }
            (PinchState::Dragging { .. }, false) => {
                self.pinch = PinchState::Inactive;
                Some(ControlEvent::DragEnd)
            }
        }
    }

    /// `y` is the scroll fingertip as a fraction of frame height.
    fn update_scroll(&mut self, y: f32, now: f64) -> Option<ControlEvent> {
        if self.pinch != PinchState::Inactive {
            return None;
        }
        let cooled = self
            .last_scroll
            .is_none_or(|t| now - t >= self.th.scroll_cooldown_sec);
        if !cooled {
            return None;
        }
        let amount = if y < self.th.scroll_upper_band {
            self.th.scroll_amount
        } else if y > self.th.scroll_lower_band {
            -self.th.scroll_amount
        } else {
            return None;
        };
        self.last_scroll = Some(now);
        Some(ControlEvent::Scroll { amount })
    }

    fn volume_nudge(&self, f: &HandFeatures) -> Option<ControlEvent> {
        let offset = f.thumb_tip_y - f.thumb_base_y;
        if !f.folded.iter().all(|&d| d) || offset.abs() <= self.th.thumb_extension {
            return None;
        }
        // image y grows downward: a tip above its base is a thumbs up
        let delta = if offset < 0.0 {
            self.th.volume_step
        } else {
            -self.th.volume_step
        };
        Some(ControlEvent::Volume { delta })
    }
}

impl GestureClassifier for HandClassifier {
    fn modality(&self) -> Modality {
        Modality::Hand
    }

    fn observe(&mut self, frame: &LandmarkFrame) -> Result<Vec<ControlEvent>, SessionError> {
        let f = HandFeatures::extract(frame)?;
        let now = frame.timestamp;
        let mut out = Vec::new();

        if self.update_palm(f.open_palm()) {
            debug!("open palm held for {} frames", self.palm_run);
            out.push(ControlEvent::Exit);
            return Ok(out);
        }

        let target = CursorPos {
            x: f.index_tip.x * self.screen.0,
            y: f.index_tip.y * self.screen.1,
        };
        let pos = self.cursor.ease_to(target);
        out.push(ControlEvent::MoveTo { x: pos.x, y: pos.y });

        out.extend(self.update_pinch(f.pinch_distance_px, now));
        out.extend(self.update_scroll(f.middle_tip_px.y / frame.height, now));
        out.extend(self.volume_nudge(&f));
        Ok(out)
    }

    fn observe_absent(&mut self, _now: f64) -> Vec<ControlEvent> {
        self.palm_run = 0;
        Vec::new()
    }

    fn calibrate(&mut self) -> bool {
        debug!("hand cursor is absolute; nothing to calibrate");
        false
    }

    fn is_calibrated(&self) -> bool {
        true
    }

    fn finish(&mut self) -> Vec<ControlEvent> {
        let dragging = matches!(self.pinch, PinchState::Dragging { .. });
        self.pinch = PinchState::Inactive;
        if dragging {
            vec![ControlEvent::DragEnd]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::fixtures::*;
    use crate::landmarks::{Landmark, hand};

    const FPS: f64 = 30.0;

    fn classifier() -> HandClassifier {
        HandClassifier::new(HandThresholds::default(), (1920.0, 1080.0))
    }

    fn discrete(events: &[ControlEvent]) -> Vec<ControlEvent> {
        events
            .iter()
            .filter(|e| !matches!(e, ControlEvent::MoveTo { .. }))
            .cloned()
            .collect()
    }

    fn run(
        c: &mut HandClassifier,
        frames: impl IntoIterator<Item = (f64, Vec<Landmark>)>,
    ) -> Vec<(f64, ControlEvent)> {
        let mut out = Vec::new();
        for (t, pts) in frames {
            for e in discrete(&c.observe(&frame(t, pts)).unwrap()) {
                out.push((t, e));
            }
        }
        out
    }

    #[test]
    fn short_pinch_is_a_click() {
        let mut c = classifier();
        let frames = (0..10).map(|i| (i as f64 / FPS, pinched(hand_points())));
        let mut events = run(&mut c, frames);
        events.extend(run(&mut c, [(10.0 / FPS, hand_points())]));
        let kinds: Vec<_> = events.iter().map(|(_, e)| e.clone()).collect();
        assert_eq!(kinds, vec![ControlEvent::Click]);
        assert_eq!(c.pinch_state(), PinchState::Inactive);
    }

    #[test]
    fn long_pinch_drags_instead_of_clicking() {
        let mut c = classifier();
        // pinched for 2.0s at 30 fps, then released
        let frames = (0..=60).map(|i| (i as f64 / FPS, pinched(hand_points())));
        let mut events = run(&mut c, frames);
        events.extend(run(&mut c, [(61.0 / FPS, hand_points())]));

        let starts: Vec<f64> = events
            .iter()
            .filter(|(_, e)| *e == ControlEvent::DragStart)
            .map(|(t, _)| *t)
            .collect();
        assert_eq!(starts.len(), 1);
        assert!((starts[0] - 1.2).abs() < 1.0 / FPS + 1e-9);

        assert_eq!(
            events.iter().filter(|(_, e)| *e == ControlEvent::DragEnd).count(),
            1
        );
        assert!(!events.iter().any(|(_, e)| *e == ControlEvent::Click));
        assert!(!events.iter().any(|(_, e)| matches!(e, ControlEvent::Scroll { .. })));
    }

    #[test]
    fn pinch_released_past_threshold_without_a_frame_in_between_fires_nothing() {
        let mut c = classifier();
        let events = run(&mut c, [(0.0, pinched(hand_points())), (1.5, hand_points())]);
        assert!(events.is_empty());
    }

    #[test]
    fn pinch_held_exactly_the_drag_hold_does_not_click() {
        let mut c = classifier();
        let events = run(
            &mut c,
            [
                (0.0, pinched(hand_points())),
                (0.5, pinched(hand_points())),
                (1.2, hand_points()),
            ],
        );
        assert!(events.is_empty(), "{events:?}");

        let events = run(
            &mut c,
            [
                (2.0, pinched(hand_points())),
                (2.5, pinched(hand_points())),
                (3.0, hand_points()),
            ],
        );
        assert_eq!(events, vec![(3.0, ControlEvent::Click)]);
    }

    #[test]
    fn palm_must_be_held_before_exit() {
        let mut c = classifier();
        let events = run(&mut c, (0..20).map(|i| (i as f64 / FPS, open_palm_points())));
        let exits: Vec<f64> = events
            .iter()
            .filter(|(_, e)| *e == ControlEvent::Exit)
            .map(|(t, _)| *t)
            .collect();
        assert_eq!(exits.len(), 1);
        assert!((exits[0] - 14.0 / FPS).abs() < 1e-9, "exit on the 15th frame");
    }

    #[test]
    fn broken_palm_run_starts_over() {
        let mut c = classifier();
        let mut frames: Vec<_> = (0..14).map(|i| (i as f64, open_palm_points())).collect();
        frames.push((14.0, hand_points()));
        frames.extend((15..29).map(|i| (i as f64, open_palm_points())));
        assert!(run(&mut c, frames).is_empty());

        c.observe_absent(29.0);
        let events = run(&mut c, (30..44).map(|i| (i as f64, open_palm_points())));
        assert!(events.is_empty());
    }

    #[test]
    fn scroll_respects_bands_and_cooldown() {
        let mut c = classifier();
        let mut high = hand_points();
        high[hand::MIDDLE_TIP].y = 0.2;
        high[hand::MIDDLE_PIP].y = 0.15;

        let events = run(
            &mut c,
            [
                (0.0, high.clone()),
                (0.25, high.clone()),
                // exactly one cooldown after the first scroll
                (0.3, high.clone()),
                (0.55, high.clone()),
                (0.7, high.clone()),
            ],
        );
        let ticks: Vec<f64> = events.iter().map(|(t, _)| *t).collect();
        assert_eq!(ticks, vec![0.0, 0.3, 0.7]);
        assert!(events
            .iter()
            .all(|(_, e)| *e == ControlEvent::Scroll { amount: 3 }));

        let mut low = hand_points();
        low[hand::MIDDLE_TIP].y = 0.8;
        let events = run(&mut c, [(1.0, low)]);
        assert_eq!(events, vec![(1.0, ControlEvent::Scroll { amount: -3 })]);

        // centred fingertip never scrolls
        assert!(run(&mut c, [(2.0, hand_points())]).is_empty());
    }

    #[test]
    fn no_scroll_while_pinching() {
        let mut c = classifier();
        let mut pts = pinched(hand_points());
        pts[hand::MIDDLE_TIP].y = 0.9;
        assert!(run(&mut c, [(0.0, pts.clone()), (0.5, pts)]).is_empty());
    }

    #[test]
    fn thumbs_up_and_down_nudge_volume_every_frame() {
        let mut c = classifier();
        let mut up = hand_points();
        up[hand::THUMB_TIP].y = up[hand::THUMB_MCP].y - 0.1;
        let mut down = hand_points();
        down[hand::THUMB_TIP].y = down[hand::THUMB_MCP].y + 0.1;

        let events = run(&mut c, [(0.0, up.clone()), (0.03, up), (0.06, down)]);
        let deltas: Vec<_> = events.into_iter().map(|(_, e)| e).collect();
        assert_eq!(
            deltas,
            vec![
                ControlEvent::Volume { delta: 1.5 },
                ControlEvent::Volume { delta: 1.5 },
                ControlEvent::Volume { delta: -1.5 },
            ]
        );
    }

    #[test]
    fn small_thumb_offset_or_open_fingers_leave_volume_alone() {
        let mut c = classifier();
        let mut slight = hand_points();
        slight[hand::THUMB_TIP].y = slight[hand::THUMB_MCP].y - 0.03;
        let mut pointing = hand_points();
        pointing[hand::THUMB_TIP].y = pointing[hand::THUMB_MCP].y - 0.1;
        pointing[hand::INDEX_TIP].y = 0.3;
        assert!(run(&mut c, [(0.0, slight), (0.1, pointing)]).is_empty());
    }

    #[test]
    fn cursor_follows_index_tip_on_screen() {
        let mut c = classifier();
        let mut last = None;
        for i in 0..60 {
            let events = c.observe(&frame(i as f64 / FPS, hand_points())).unwrap();
            if let Some(ControlEvent::MoveTo { x, y }) = events.first() {
                assert!((0.0..=1920.0).contains(x) && (0.0..=1080.0).contains(y));
                last = Some((*x, *y));
            }
        }
        let (x, y) = last.unwrap();
        assert!((x - 0.6 * 1920.0).abs() < 1.0);
        assert!((y - 0.5 * 1080.0).abs() < 1.0);
    }
}
