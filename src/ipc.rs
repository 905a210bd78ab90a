pub mod runtime;
mod server;

pub use server::{ControlServer, SessionCommand};

use anyhow::{Result, anyhow};
use std::{
    io::{BufRead, BufReader, Write},
    os::unix::net::UnixStream,
};

use crate::landmarks::Modality;

/// Send one JSON request to a running session and wait for its one-line reply.
pub fn client_request(modality: Modality, req: serde_json::Value) -> Result<serde_json::Value> {
    let sock = runtime::socket_path(modality)?;
    if !sock.exists() {
        return Err(anyhow!(
            "no {modality} session is running (socket missing at {})",
            sock.display()
        ));
    }
    let mut stream = UnixStream::connect(&sock)
        .map_err(|e| anyhow!("cannot reach {modality} session at {}: {e}", sock.display()))?;
    let line = serde_json::to_string(&req)? + "\n";
    stream.write_all(line.as_bytes())?;
    let mut reader = BufReader::new(stream);
    let mut resp = String::new();
    reader.read_line(&mut resp)?;
    let v: serde_json::Value = serde_json::from_str(&resp)?;
    Ok(v)
}
