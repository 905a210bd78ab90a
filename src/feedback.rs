//! Spoken and audible feedback, run off the frame loop.

use log::{debug, warn};
use std::{
    process::Command,
    sync::mpsc::{self, Receiver, Sender},
    thread,
    time::Duration,
};

use crate::config::Feedback;
use crate::error::SessionError;

pub trait FeedbackSink {
    /// Queue a message and return immediately.
    fn announce(&self, text: &str);

    /// Queue a message and wait up to `timeout` for it to finish. Failures
    /// and timeouts are logged, never returned.
    fn farewell(&self, text: &str, timeout: Duration);
}

enum Job {
    Say(String),
    Chime,
    SayAndAck(String, Sender<()>),
}

/// Runs the configured speech (and optional chime) command on a worker thread.
pub struct CommandFeedback {
    tx: Option<Sender<Job>>,
    has_chime: bool,
}

impl CommandFeedback {
    pub fn spawn(cfg: &Feedback) -> Self {
        if !cfg.enabled {
            return Self::silent();
        }
        let (tx, rx) = mpsc::channel::<Job>();
        let speech = cfg.speech_command.clone();
        let chime = cfg.chime_command.clone();
        let has_chime = chime.is_some();
        let spawned = thread::Builder::new()
            .name("feedback".into())
            .spawn(move || worker(rx, speech, chime));
        match spawned {
            Ok(_) => Self {
                tx: Some(tx),
                has_chime,
            },
            Err(e) => {
                warn!("feedback worker failed to start: {e}");
                Self::silent()
            }
        }
    }

    pub fn silent() -> Self {
        Self {
            tx: None,
            has_chime: false,
        }
    }

    /// Short sound played when a modality comes up.
    pub fn chime(&self) {
        if self.has_chime {
            self.send(Job::Chime);
        }
    }

    fn send(&self, job: Job) -> bool {
        match &self.tx {
            Some(tx) => tx.send(job).is_ok(),
            None => false,
        }
    }
}

impl FeedbackSink for CommandFeedback {
    fn announce(&self, text: &str) {
        if !self.send(Job::Say(text.to_string())) {
            debug!("feedback (silent): {text}");
        }
    }

    fn farewell(&self, text: &str, timeout: Duration) {
        let (ack_tx, ack_rx) = mpsc::channel();
        if !self.send(Job::SayAndAck(text.to_string(), ack_tx)) {
            debug!("feedback (silent): {text}");
            return;
        }
        if ack_rx.recv_timeout(timeout).is_err() {
            warn!("farewell not confirmed within {timeout:?}; continuing shutdown");
        }
    }
}

fn worker(rx: Receiver<Job>, speech: String, chime: Option<String>) {
    for job in rx {
        let result = match job {
            Job::Say(text) => run_command(&speech, Some(&text)),
            Job::Chime => match &chime {
                Some(cmd) => run_command(cmd, None),
                None => Ok(()),
            },
            Job::SayAndAck(text, ack) => {
                let r = run_command(&speech, Some(&text));
                let _ = ack.send(());
                r
            }
        };
        if let Err(e) = result {
            warn!("{e}");
        }
    }
}

/// `command_line` is split on whitespace; `text` goes last as one argument.
fn run_command(command_line: &str, text: Option<&str>) -> Result<(), SessionError> {
    let mut parts = command_line.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| SessionError::NotificationFailure("empty command".into()))?;
    let mut cmd = Command::new(program);
    cmd.args(parts);
    if let Some(t) = text {
        cmd.arg(t);
    }
    let status = cmd
        .status()
        .map_err(|e| SessionError::NotificationFailure(format!("{program}: {e}")))?;
    if !status.success() {
        return Err(SessionError::NotificationFailure(format!(
            "{program} exited with {status}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn missing_program_is_a_notification_failure() {
        let err = run_command("definitely-not-a-real-tts-binary", Some("hi")).unwrap_err();
        assert!(matches!(err, SessionError::NotificationFailure(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(run_command("   ", None).is_err());
    }

    #[test]
    fn silent_feedback_never_blocks() {
        let fb = CommandFeedback::silent();
        let start = Instant::now();
        fb.announce("hello");
        fb.chime();
        fb.farewell("bye", Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn broken_speech_command_still_acknowledges_farewell() {
        let fb = CommandFeedback::spawn(&Feedback {
            enabled: true,
            speech_command: "definitely-not-a-real-tts-binary".into(),
            chime_command: None,
        });
        fb.announce("queued first");
        let start = Instant::now();
        fb.farewell("bye", Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
