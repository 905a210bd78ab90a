use anyhow::{Result, anyhow};
use log::{debug, info, warn};
use std::process::Command;

/// Pointer side of the OS: cursor, buttons, wheel.
pub trait PointerSink {
    fn move_to(&mut self, x: i32, y: i32) -> Result<()>;
    fn click(&mut self) -> Result<()>;
    fn double_click(&mut self) -> Result<()>;
    fn mouse_down(&mut self) -> Result<()>;
    fn mouse_up(&mut self) -> Result<()>;
    fn scroll(&mut self, amount: i32) -> Result<()>;
}

/// Output volume. The level is read fresh every time; nothing is cached.
pub trait VolumeControl {
    fn level(&mut self) -> Result<f32>;
    fn set_level(&mut self, level: f32) -> Result<()>;
}

pub struct UinputSink {
    #[allow(dead_code)]
    linux: Option<Box<LinuxUinput>>,
}

impl UinputSink {
    pub fn new(screen: (u32, u32)) -> Result<Self> {
        #[cfg(target_os = "linux")]
        {
            let dev = LinuxUinput::create(screen)?;
            return Ok(Self {
                linux: Some(Box::new(dev)),
            });
        }
        #[allow(unreachable_code)]
        {
            let _ = screen;
            warn!("uinput not available; running in NO-OP mode");
            Ok(Self::noop())
        }
    }

    pub fn noop() -> Self {
        Self { linux: None }
    }
}

impl PointerSink for UinputSink {
    fn move_to(&mut self, x: i32, y: i32) -> Result<()> {
        #[cfg(target_os = "linux")]
        if let Some(dev) = self.linux.as_mut() {
            dev.move_to(x, y)?;
            return Ok(());
        }
        debug!("noop: move_to {x},{y}");
        Ok(())
    }

    fn click(&mut self) -> Result<()> {
        #[cfg(target_os = "linux")]
        if let Some(dev) = self.linux.as_mut() {
            dev.press_left()?;
            dev.release_left()?;
            return Ok(());
        }
        debug!("noop: click");
        Ok(())
    }

    fn double_click(&mut self) -> Result<()> {
        self.click()?;
        self.click()
    }

    fn mouse_down(&mut self) -> Result<()> {
        #[cfg(target_os = "linux")]
        if let Some(dev) = self.linux.as_mut() {
            dev.press_left()?;
            return Ok(());
        }
        debug!("noop: mouse_down");
        Ok(())
    }

    fn mouse_up(&mut self) -> Result<()> {
        #[cfg(target_os = "linux")]
        if let Some(dev) = self.linux.as_mut() {
            dev.release_left()?;
            return Ok(());
        }
        debug!("noop: mouse_up");
        Ok(())
    }

    fn scroll(&mut self, amount: i32) -> Result<()> {
        #[cfg(target_os = "linux")]
        if let Some(dev) = self.linux.as_mut() {
            dev.scroll_vertical(amount)?;
            return Ok(());
        }
        debug!("noop: scroll {amount}");
        Ok(())
    }
}

#[cfg(target_os = "linux")]
struct LinuxUinput {
    dev: uinput::device::Device,
}

#[cfg(target_os = "linux")]
impl LinuxUinput {
    fn create(screen: (u32, u32)) -> Result<Self> {
        use uinput::event::{absolute, controller::Mouse, relative};

        let dev = uinput::default()?
            .name("Gesturectl Virtual Pointer")?
            // absolute pointer in screen pixels
            .event(absolute::Position::X)?
            .min(0)
            .max(screen.0 as i32)
            .event(absolute::Position::Y)?
            .min(0)
            .max(screen.1 as i32)
            // wheel
            .event(relative::Wheel::Vertical)?
            // buttons
            .event(Mouse::Left)?
            .event(Mouse::Right)?
            .create()?;

        info!(
            "uinput: created virtual pointer ({}x{})",
            screen.0, screen.1
        );
        Ok(Self { dev })
    }

    fn sync(&mut self) -> Result<()> {
        self.dev.synchronize()?;
        Ok(())
    }

    fn move_to(&mut self, x: i32, y: i32) -> Result<()> {
        use uinput::event::absolute::Position;
        self.dev.send(Position::X, x)?;
        self.dev.send(Position::Y, y)?;
        self.sync()
    }

    fn press_left(&mut self) -> Result<()> {
        use uinput::event::controller::Mouse;
        self.dev.send(Mouse::Left, 1)?;
        self.sync()
    }

    fn release_left(&mut self) -> Result<()> {
        use uinput::event::controller::Mouse;
        self.dev.send(Mouse::Left, 0)?;
        self.sync()
    }

    fn scroll_vertical(&mut self, steps: i32) -> Result<()> {
        use uinput::event::relative::Wheel;
        self.dev.send(Wheel::Vertical, steps)?;
        self.sync()
    }
}

/// Default PulseAudio/PipeWire sink driven through `pactl`, level in percent.
pub struct PactlVolume {
    sink: String,
}

impl Default for PactlVolume {
    fn default() -> Self {
        Self {
            sink: "@DEFAULT_SINK@".to_string(),
        }
    }
}

impl VolumeControl for PactlVolume {
    fn level(&mut self) -> Result<f32> {
        let out = Command::new("pactl")
            .args(["get-sink-volume", &self.sink])
            .output()
            .map_err(|e| anyhow!("failed to run pactl: {e}"))?;
        if !out.status.success() {
            return Err(anyhow!(
                "pactl get-sink-volume failed: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            ));
        }
        parse_pactl_percent(&String::from_utf8_lossy(&out.stdout))
    }

    fn set_level(&mut self, level: f32) -> Result<()> {
        let pct = format!("{}%", level.round() as i64);
        let status = Command::new("pactl")
            .args(["set-sink-volume", &self.sink, &pct])
            .status()
            .map_err(|e| anyhow!("failed to run pactl: {e}"))?;
        if !status.success() {
            return Err(anyhow!("pactl set-sink-volume {pct} exited with {status}"));
        }
        Ok(())
    }
}

/// First `NN%` figure in `pactl get-sink-volume` output.
fn parse_pactl_percent(text: &str) -> Result<f32> {
    text.split_whitespace()
        .find_map(|tok| tok.strip_suffix('%').and_then(|n| n.parse::<f32>().ok()))
        .ok_or_else(|| anyhow!("no volume percentage in pactl output: {text:?}"))
}

/// Volume backend for dry runs: remembers the level, touches nothing.
pub struct NoopVolume {
    level: f32,
}

impl NoopVolume {
    pub fn new(level: f32) -> Self {
        Self { level }
    }
}

impl VolumeControl for NoopVolume {
    fn level(&mut self) -> Result<f32> {
        Ok(self.level)
    }

    fn set_level(&mut self, level: f32) -> Result<()> {
        debug!("noop: volume {:.1} -> {:.1}", self.level, level);
        self.level = level;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pactl_sink_volume() {
        let out = "Volume: front-left: 42598 /  65% / -11.23 dB,   front-right: 42598 /  65% / -11.23 dB\n        balance 0.00\n";
        assert_eq!(parse_pactl_percent(out).unwrap(), 65.0);
    }

    #[test]
    fn pactl_output_without_percent_is_an_error() {
        assert!(parse_pactl_percent("Failed to get sink volume").is_err());
    }

    #[test]
    fn noop_sink_accepts_everything() {
        let mut s = UinputSink::noop();
        s.move_to(10, 20).unwrap();
        s.click().unwrap();
        s.double_click().unwrap();
        s.mouse_down().unwrap();
        s.mouse_up().unwrap();
        s.scroll(-3).unwrap();
    }

    #[test]
    fn noop_volume_round_trips_level() {
        let mut v = NoopVolume::new(40.0);
        v.set_level(41.5).unwrap();
        assert_eq!(v.level().unwrap(), 41.5);
    }
}
