//! The per-modality frame loop: read a frame, classify it, actuate, repeat.
//!
//! One frame is fully handled before the next is read. The only other
//! threads are the control socket and signal listener, which talk to the loop
//! through a channel and a stop flag that are checked once per frame, and the
//! feedback worker, which the loop never waits on except for the farewell.

use log::{debug, error, info, warn};
use serde::Serialize;
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, Sender},
    },
    time::Duration,
};

use crate::actions::{PointerSink, VolumeControl};
use crate::config::VolumeRange;
use crate::dispatch::dispatch_event;
use crate::error::SessionError;
use crate::feedback::FeedbackSink;
use crate::gestures::{ControlEvent, GestureClassifier};
use crate::ipc::SessionCommand;
use crate::landmarks::{LandmarkFrame, LandmarkSource, Modality, SourceItem};

const FAREWELL_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub modality: Modality,
    pub profile: String,
    pub frames: u64,
    pub skipped: u64,
    pub calibrated: bool,
    pub last_event: Option<&'static str>,
    pub actuator_failures: u64,
}

impl SessionStatus {
    pub fn new(modality: Modality, profile: &str) -> Self {
        Self {
            modality,
            profile: profile.to_string(),
            frames: 0,
            skipped: 0,
            calibrated: false,
            last_event: None,
            actuator_failures: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The user made the exit gesture.
    ExitGesture,
    /// Stop signal or stop request.
    Stopped,
    /// The landmark stream ended.
    SourceEnded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Calibration {
    Applied,
    NotNeeded,
    NoReference,
}

pub struct Actuators<P, V> {
    pub pointer: P,
    pub volume: V,
    pub volume_range: VolumeRange,
}

pub struct Session<P, V, F> {
    classifier: Box<dyn GestureClassifier>,
    act: Actuators<P, V>,
    feedback: F,
    status: Arc<Mutex<SessionStatus>>,
    commands: Receiver<SessionCommand>,
    command_tx: Sender<SessionCommand>,
    stop: Arc<AtomicBool>,
}

fn activation_message(m: Modality) -> &'static str {
    match m {
        Modality::Hand => "Hand gesture control activated",
        Modality::Eye => "Eye gesture control activated",
    }
}

fn exit_message(m: Modality) -> &'static str {
    match m {
        Modality::Hand => "Exiting hand gesture control",
        Modality::Eye => "Exiting eye gesture control",
    }
}

impl<P: PointerSink, V: VolumeControl, F: FeedbackSink> Session<P, V, F> {
    pub fn new(
        classifier: Box<dyn GestureClassifier>,
        act: Actuators<P, V>,
        feedback: F,
        profile_name: &str,
    ) -> Self {
        let status = SessionStatus::new(classifier.modality(), profile_name);
        let (command_tx, commands) = mpsc::channel();
        Self {
            classifier,
            act,
            feedback,
            status: Arc::new(Mutex::new(status)),
            commands,
            command_tx,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn status_handle(&self) -> Arc<Mutex<SessionStatus>> {
        self.status.clone()
    }

    pub fn command_sender(&self) -> Sender<SessionCommand> {
        self.command_tx.clone()
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    #[cfg(test)]
    pub fn actuators(&self) -> &Actuators<P, V> {
        &self.act
    }

    fn with_status(&self, f: impl FnOnce(&mut SessionStatus)) {
        if let Ok(mut s) = self.status.lock() {
            f(&mut s);
        }
    }

    fn calibrate(&mut self) -> Calibration {
        let modality = self.classifier.modality();
        let outcome = if self.classifier.calibrate() {
            info!("calibrated {modality} reference");
            Calibration::Applied
        } else if self.classifier.is_calibrated() {
            debug!("{modality} cursor needs no calibration");
            Calibration::NotNeeded
        } else {
            warn!("calibration ignored: no tracked point yet");
            Calibration::NoReference
        };
        let calibrated = self.classifier.is_calibrated();
        self.with_status(|s| s.calibrated = calibrated);
        outcome
    }

    /// True when a stop was requested.
    fn drain_commands(&mut self) -> bool {
        while let Ok(cmd) = self.commands.try_recv() {
            match cmd {
                SessionCommand::Calibrate => {
                    self.calibrate();
                }
                SessionCommand::Stop => return true,
            }
        }
        self.stop.load(Ordering::SeqCst)
    }

    /// Actuate events in order. Returns true when one of them is `Exit`.
    fn actuate(&mut self, events: Vec<ControlEvent>) -> bool {
        for ev in events {
            if ev != ControlEvent::Exit {
                debug!("event: {ev:?}");
            }
            let name = ev.name();
            self.with_status(|s| s.last_event = Some(name));
            if ev == ControlEvent::Exit {
                return true;
            }
            if let Err(e) = dispatch_event(
                &ev,
                &mut self.act.pointer,
                &mut self.act.volume,
                &self.act.volume_range,
            ) {
                error!("{e}");
                self.with_status(|s| s.actuator_failures += 1);
            }
        }
        false
    }

    fn process(&mut self, frame: &LandmarkFrame) -> Result<bool, SessionError> {
        let events = if frame.is_empty() {
            self.classifier.observe_absent(frame.timestamp)
        } else {
            self.classifier.observe(frame)?
        };
        self.with_status(|s| s.frames += 1);
        Ok(self.actuate(events))
    }

    /// Run until the exit gesture, a stop, the end of the stream, or a fatal
    /// error. The farewell is attempted on every path out.
    pub fn run(&mut self, source: &mut dyn LandmarkSource) -> Result<SessionOutcome, SessionError> {
        let modality = self.classifier.modality();
        info!("{modality} session started");
        self.feedback.announce(activation_message(modality));

        let result = self.run_frames(source);

        let leftovers = self.classifier.finish();
        self.actuate(leftovers);

        match &result {
            Ok(outcome) => {
                info!("{modality} session ended: {outcome:?}");
                self.feedback.farewell(exit_message(modality), FAREWELL_TIMEOUT);
            }
            Err(e) => {
                error!("{modality} session aborted: {e}");
                self.feedback
                    .farewell("Gesture control stopped after an error", FAREWELL_TIMEOUT);
            }
        }
        result
    }

    fn run_frames(&mut self, source: &mut dyn LandmarkSource) -> Result<SessionOutcome, SessionError> {
        loop {
            if self.drain_commands() {
                return Ok(SessionOutcome::Stopped);
            }
            let Some(item) = source.next_item() else {
                return Ok(SessionOutcome::SourceEnded);
            };
            let frame = match item {
                Ok(SourceItem::Frame(frame)) => frame,
                Ok(SourceItem::Calibrate) => {
                    self.calibrate();
                    continue;
                }
                Err(e) => {
                    self.skip(e)?;
                    continue;
                }
            };
            match self.process(&frame) {
                Ok(true) => return Ok(SessionOutcome::ExitGesture),
                Ok(false) => {}
                Err(e) => self.skip(e)?,
            }
        }
    }

    /// Swallow a per-frame error, or hand back a fatal one.
    fn skip(&mut self, e: SessionError) -> Result<(), SessionError> {
        if e.is_fatal() {
            return Err(e);
        }
        match e {
            SessionError::CaptureUnavailable => debug!("{e}; skipping"),
            _ => warn!("{e}; skipping frame"),
        }
        self.with_status(|s| s.skipped += 1);
        Ok(())
    }
}
