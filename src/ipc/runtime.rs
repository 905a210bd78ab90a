use anyhow::{Result, anyhow};
use directories::UserDirs;
use std::{fs, path::PathBuf};

use crate::landmarks::Modality;

pub fn runtime_dir() -> Result<PathBuf> {
    let dirs = UserDirs::new().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    let dir = dirs.home_dir().join(".local").join("run");
    let _ = fs::create_dir_all(&dir);
    Ok(dir)
}

/// One control socket per modality so hand and eye sessions can run side by side.
pub fn socket_path(modality: Modality) -> Result<PathBuf> {
    Ok(runtime_dir()?.join(format!("gesturectl-{modality}.sock")))
}
