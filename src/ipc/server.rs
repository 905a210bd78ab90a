use anyhow::{Result, anyhow};
use log::{error, info, warn};
use std::{
    fs,
    io::{BufRead, BufReader, Write},
    os::unix::net::{UnixListener, UnixStream},
    path::PathBuf,
    sync::{Arc, Mutex, mpsc::Sender},
    thread,
    time::Duration,
};

use super::runtime::socket_path;
use crate::landmarks::Modality;
use crate::session::SessionStatus;

/// Out-of-band requests, drained by the frame loop once per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Calibrate,
    Stop,
}

/// Listens on the modality's control socket; removes it on drop.
pub struct ControlServer {
    path: PathBuf,
}

impl ControlServer {
    pub fn start(
        modality: Modality,
        status: Arc<Mutex<SessionStatus>>,
        tx: Sender<SessionCommand>,
    ) -> Result<Self> {
        let sock = socket_path(modality)?;
        if sock.exists() {
            if UnixStream::connect(&sock).is_ok() {
                return Err(anyhow!(
                    "a {modality} session is already running ({})",
                    sock.display()
                ));
            }
            let _ = fs::remove_file(&sock);
        }
        let listener = UnixListener::bind(&sock)?;
        info!("control: listening on {}", sock.display());

        thread::Builder::new()
            .name("control".into())
            .spawn(move || {
                for stream in listener.incoming() {
                    match stream {
                        Ok(stream) => {
                            if let Err(e) = handle_client(stream, &status, &tx) {
                                error!("ipc client error: {e}");
                            }
                        }
                        Err(e) => warn!("control accept failed: {e}"),
                    }
                }
            })?;

        Ok(Self { path: sock })
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn handle_client(
    mut stream: UnixStream,
    status: &Mutex<SessionStatus>,
    tx: &Sender<SessionCommand>,
) -> Result<()> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    if line.trim().is_empty() {
        return Ok(());
    }
    let req: serde_json::Value = serde_json::from_str(&line)?;
    let resp = respond(&req, status, tx);
    writeln!(stream, "{resp}")?;
    Ok(())
}

fn respond(
    req: &serde_json::Value,
    status: &Mutex<SessionStatus>,
    tx: &Sender<SessionCommand>,
) -> serde_json::Value {
    let op = req.get("op").and_then(|v| v.as_str()).unwrap_or("");
    let command = match op {
        "status" => {
            return match status.lock() {
                Ok(s) => serde_json::json!({"ok": true, "data": *s}),
                Err(_) => serde_json::json!({"ok": false, "error": "status unavailable"}),
            };
        }
        "calibrate" => SessionCommand::Calibrate,
        "stop" => SessionCommand::Stop,
        _ => return serde_json::json!({"ok": false, "error": format!("unknown op: {op}")}),
    };
    match tx.send(command) {
        Ok(()) => serde_json::json!({"ok": true, "data": op}),
        Err(_) => serde_json::json!({"ok": false, "error": "session is shutting down"}),
    }
}
