use anyhow::{Result, anyhow};
use directories::UserDirs;
use log::info;
use serde::Deserialize;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use crate::ipc::runtime;
use crate::landmarks::Modality;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Meta {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Screen {
    pub width: u32,
    pub height: u32,
}

impl Default for Screen {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

impl Screen {
    pub fn size(&self) -> (f32, f32) {
        (self.width as f32, self.height as f32)
    }
}

/// Camera size used when a frame record does not carry its own.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Camera {
    pub width: u32,
    pub height: u32,
    pub mirror: bool,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            mirror: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Smoothing {
    pub alpha: f32,
    pub dead_zone_px: f32,
    pub buffer_size: usize,
}

impl Default for Smoothing {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            dead_zone_px: 25.0,
            buffer_size: 8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HandThresholds {
    pub pinch_threshold_px: f32,
    pub drag_hold_sec: f64,
    pub scroll_cooldown_sec: f64,
    /// Fractions of frame height; above the upper band scrolls up.
    pub scroll_upper_band: f32,
    pub scroll_lower_band: f32,
    pub scroll_amount: i32,
    /// Normalized vertical thumb offset that counts as a thumbs up/down.
    pub thumb_extension: f32,
    pub volume_step: f32,
    pub exit_confirm_frames: u32,
    pub cursor_alpha: f32,
}

impl Default for HandThresholds {
    fn default() -> Self {
        Self {
            pinch_threshold_px: 40.0,
            drag_hold_sec: 1.2,
            scroll_cooldown_sec: 0.3,
            scroll_upper_band: 0.4,
            scroll_lower_band: 0.6,
            scroll_amount: 3,
            thumb_extension: 0.05,
            volume_step: 1.5,
            exit_confirm_frames: 15,
            cursor_alpha: 0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EyeThresholds {
    pub blink_threshold: f32,
    pub consec_frames: u32,
    pub double_click_window_sec: f64,
    /// Closed frames before a held eye starts nudging the volume.
    #[serde(alias = "scroll_hold_frames")]
    pub hold_frames: u32,
    pub mouth_open_threshold_px: f32,
    pub sensitivity: f32,
    pub volume_step: f32,
}

impl Default for EyeThresholds {
    fn default() -> Self {
        Self {
            blink_threshold: 0.22,
            consec_frames: 2,
            double_click_window_sec: 0.5,
            hold_frames: 12,
            mouth_open_threshold_px: 20.0,
            sensitivity: 65.0,
            volume_step: 1.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VolumeRange {
    pub min: f32,
    pub max: f32,
}

impl Default for VolumeRange {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 100.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Feedback {
    pub enabled: bool,
    pub speech_command: String,
    pub chime_command: Option<String>,
}

impl Default for Feedback {
    fn default() -> Self {
        Self {
            enabled: true,
            speech_command: "spd-say".to_string(),
            chime_command: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub meta: Meta,
    pub screen: Screen,
    pub camera: Camera,
    pub smoothing: Smoothing,
    pub hand: HandThresholds,
    pub eye: EyeThresholds,
    pub volume: VolumeRange,
    pub feedback: Feedback,
}

impl Profile {
    pub fn parse(text: &str) -> Result<Self> {
        let profile: Profile = toml::from_str(text)?;
        validate_profile(&profile)?;
        Ok(profile)
    }
}

#[derive(Debug, Clone)]
pub struct ConfigState {
    pub active_name: String,
    pub profile: Profile,
    pub profiles_dir: PathBuf,
    pub active_ptr: PathBuf,
}

fn config_dir() -> Result<PathBuf> {
    let dirs = UserDirs::new().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(dirs.home_dir().join(".config").join("gesturectl"))
}

fn default_profile_text() -> &'static str {
    include_str!("../profiles/default.toml")
}

impl ConfigState {
    pub fn load_or_install_default() -> Result<Self> {
        let cfgdir = config_dir()?;
        let profdir = cfgdir.join("profiles");
        fs::create_dir_all(&profdir)?;

        let def_path = profdir.join("default.toml");
        if !def_path.exists() {
            fs::write(&def_path, default_profile_text())?;
            info!("installed default profile at {}", def_path.display());
        }

        let active_ptr = cfgdir.join("active");
        if !active_ptr.exists() {
            let mut f = fs::File::create(&active_ptr)?;
            f.write_all(b"default")?;
        }

        let active_name = fs::read_to_string(&active_ptr)?.trim().to_string();
        let profile = load_profile(&profdir, &active_name)?;

        Ok(Self {
            active_name,
            profile,
            profiles_dir: profdir,
            active_ptr,
        })
    }

    /// Load a profile by name for this run only; the active pointer is untouched.
    pub fn load_named(&mut self, name: &str) -> Result<()> {
        self.profile = load_profile(&self.profiles_dir, name)?;
        self.active_name = name.to_string();
        Ok(())
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        let p = self.profiles_dir.join(format!("{name}.toml"));
        if !p.exists() {
            return Err(anyhow!("profile not found: {}", p.display()));
        }
        self.load_named(name)?;
        fs::write(&self.active_ptr, name.as_bytes())?;
        Ok(())
    }

    pub fn list_profiles(&self) -> Vec<String> {
        let mut v = Vec::new();
        if let Ok(rd) = fs::read_dir(&self.profiles_dir) {
            for e in rd.flatten() {
                let path = e.path();
                if path.extension().is_some_and(|ext| ext == "toml") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        v.push(stem.to_string());
                    }
                }
            }
        }
        v.sort();
        v
    }

    pub fn doctor_report(&self) -> serde_json::Value {
        let uinput_ok = Path::new("/dev/uinput").exists();
        let in_input_group = check_in_input_group();
        let sockets: serde_json::Map<String, serde_json::Value> = [Modality::Hand, Modality::Eye]
            .into_iter()
            .map(|m| {
                let path = runtime::socket_path(m).ok();
                let live = path.as_ref().is_some_and(|p| p.exists());
                (
                    m.to_string(),
                    serde_json::json!({ "path": path, "running": live }),
                )
            })
            .collect();
        serde_json::json!({
            "uinput_present": uinput_ok,
            "input_group_member": in_input_group,
            "profiles_dir": self.profiles_dir,
            "active_profile": self.active_name,
            "sessions": sockets,
            "speech_command": self.profile.feedback.speech_command,
            "hints": {
                "udev_rule": "/etc/udev/rules.d/80-uinput.rules",
                "add_user_to_input_group": "sudo usermod -aG input $USER && newgrp input"
            }
        })
    }
}

fn load_profile(dir: &Path, name: &str) -> Result<Profile> {
    let path = dir.join(format!("{name}.toml"));
    let txt = fs::read_to_string(&path)
        .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
    Profile::parse(&txt).map_err(|e| anyhow!("failed to load {}: {e}", path.display()))
}

fn validate_profile(p: &Profile) -> Result<()> {
    if p.screen.width == 0 || p.screen.height == 0 {
        return Err(anyhow!("screen size must be positive"));
    }
    if p.camera.width == 0 || p.camera.height == 0 {
        return Err(anyhow!("camera size must be positive"));
    }
    if !(p.smoothing.alpha > 0.0 && p.smoothing.alpha <= 1.0) {
        return Err(anyhow!("smoothing.alpha must be in (0,1]"));
    }
    if !(p.hand.cursor_alpha > 0.0 && p.hand.cursor_alpha <= 1.0) {
        return Err(anyhow!("hand.cursor_alpha must be in (0,1]"));
    }
    if p.smoothing.buffer_size == 0 {
        return Err(anyhow!("smoothing.buffer_size must be at least 1"));
    }
    if p.smoothing.dead_zone_px < 0.0 {
        return Err(anyhow!("smoothing.dead_zone_px must not be negative"));
    }

    let h = &p.hand;
    if h.drag_hold_sec <= 0.0 || h.scroll_cooldown_sec < 0.0 {
        return Err(anyhow!("hand durations must be positive"));
    }
    if h.pinch_threshold_px <= 0.0 {
        return Err(anyhow!("hand.pinch_threshold_px must be positive"));
    }
    if !(0.0 < h.scroll_upper_band
        && h.scroll_upper_band < h.scroll_lower_band
        && h.scroll_lower_band < 1.0)
    {
        return Err(anyhow!(
            "hand scroll bands must satisfy 0 < upper < lower < 1 (normalized height)"
        ));
    }
    if h.exit_confirm_frames == 0 {
        return Err(anyhow!("hand.exit_confirm_frames must be at least 1"));
    }

    let e = &p.eye;
    if e.consec_frames == 0 || e.hold_frames == 0 {
        return Err(anyhow!("eye frame counts must be at least 1"));
    }
    if e.double_click_window_sec <= 0.0 {
        return Err(anyhow!("eye.double_click_window_sec must be positive"));
    }
    if e.blink_threshold <= 0.0 || e.mouth_open_threshold_px <= 0.0 {
        return Err(anyhow!("eye thresholds must be positive"));
    }

    if p.volume.min >= p.volume.max {
        return Err(anyhow!("volume.min must be below volume.max"));
    }
    if p.feedback.enabled && p.feedback.speech_command.trim().is_empty() {
        return Err(anyhow!("feedback.speech_command is empty but feedback is enabled"));
    }
    Ok(())
}

fn check_in_input_group() -> bool {
    if let Ok(s) = fs::read_to_string("/etc/group") {
        let user = whoami::username();
        for line in s.lines() {
            if line.starts_with("input:")
                && line
                    .split(':')
                    .nth(3)
                    .unwrap_or("")
                    .split(',')
                    .any(|u| u == user)
            {
                return true;
            }
        }
    }
    false
}
