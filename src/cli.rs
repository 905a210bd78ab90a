use anyhow::{Result, anyhow};
use log::{info, warn};
use pico_args::Arguments;
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};
use std::{
    env,
    fs::File,
    io::{self, BufReader},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use crate::actions::{NoopVolume, PactlVolume, PointerSink, UinputSink, VolumeControl};
use crate::config::{ConfigState, Profile};
use crate::dispatch::dispatch_event;
use crate::feedback::CommandFeedback;
use crate::gestures::{ControlEvent, classifier_for};
use crate::ipc::{self, ControlServer};
use crate::landmarks::{JsonLinesSource, Modality};
use crate::session::{Actuators, Session};

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // No args -> general help
    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }

    // Flags-based help (-h/--help)
    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    // First free arg is the subcommand
    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            if let Some(t) = topic {
                print_subcmd_help(&t);
            } else {
                print_help();
            }
            Ok(())
        }

        Some("run") => run_session(pargs),

        Some("calibrate") => {
            let modality = opt_modality(&mut pargs)?.unwrap_or(Modality::Eye);
            let r = ipc::client_request(modality, serde_json::json!({"op":"calibrate"}))?;
            print_response(&r);
            Ok(())
        }

        Some("stop") => {
            for modality in modalities(opt_modality(&mut pargs)?) {
                match ipc::client_request(modality, serde_json::json!({"op":"stop"})) {
                    Ok(r) => print_response(&r),
                    Err(e) => eprintln!("{e}"),
                }
            }
            Ok(())
        }

        Some("status") => {
            for modality in modalities(opt_modality(&mut pargs)?) {
                match ipc::client_request(modality, serde_json::json!({"op":"status"})) {
                    Ok(r) => print_response(&r),
                    Err(e) => print_response(&serde_json::json!({
                        "ok": false,
                        "modality": modality,
                        "error": e.to_string(),
                    })),
                }
            }
            Ok(())
        }

        Some("use") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: gesturectl use <profile_name>"))?;
            let mut cfg = ConfigState::load_or_install_default()?;
            cfg.set_active(&name)?;
            print_response(&serde_json::json!({"ok": true, "data": {"active_profile": cfg.active_name}}));
            Ok(())
        }

        Some("list") => {
            let cfg = ConfigState::load_or_install_default()?;
            let list = cfg.list_profiles();
            print_response(&serde_json::json!({"ok": true, "data": {"profiles": list, "active": cfg.active_name}}));
            Ok(())
        }

        Some("doctor") => {
            let cfg = ConfigState::load_or_install_default()?;
            print_response(&serde_json::json!({"ok": true, "data": cfg.doctor_report()}));
            Ok(())
        }

        Some("emit") => emit(pargs),

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

fn opt_modality(pargs: &mut Arguments) -> Result<Option<Modality>> {
    let raw: Option<String> = pargs.opt_free_from_str()?;
    raw.map(|s| s.parse::<Modality>().map_err(|e| anyhow!(e)))
        .transpose()
}

fn modalities(only: Option<Modality>) -> Vec<Modality> {
    match only {
        Some(m) => vec![m],
        None => vec![Modality::Hand, Modality::Eye],
    }
}

fn parse_screen(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let w: u32 = w.trim().parse().map_err(|_| format!("bad width in '{s}'"))?;
    let h: u32 = h.trim().parse().map_err(|_| format!("bad height in '{s}'"))?;
    if w == 0 || h == 0 {
        return Err(format!("screen size must be positive, got '{s}'"));
    }
    Ok((w, h))
}

fn load_profile(profile_name: Option<&str>, screen: Option<(u32, u32)>) -> Result<(String, Profile)> {
    let mut cfg = ConfigState::load_or_install_default()?;
    if let Some(name) = profile_name {
        cfg.load_named(name)?;
    }
    let mut profile = cfg.profile;
    if let Some((w, h)) = screen {
        profile.screen.width = w;
        profile.screen.height = h;
    }
    Ok((cfg.active_name, profile))
}

fn run_session(mut pargs: Arguments) -> Result<()> {
    let modality: Modality = pargs
        .free_from_str()
        .map_err(|_| anyhow!("usage: gesturectl run <hand|eye> [--source PATH] ..."))?;
    let source: Option<String> = pargs.opt_value_from_str("--source")?;
    let profile_name: Option<String> = pargs.opt_value_from_str("--profile")?;
    let screen: Option<(u32, u32)> = pargs.opt_value_from_fn("--screen", parse_screen)?;
    let dry_run = pargs.contains("--dry-run");

    let (name, profile) = load_profile(profile_name.as_deref(), screen)?;
    info!(
        "profile '{name}' ({}): screen {}x{}, camera {}x{}",
        profile.meta.name.as_deref().unwrap_or("unnamed"),
        profile.screen.width, profile.screen.height, profile.camera.width, profile.camera.height
    );

    if dry_run {
        warn!("dry run: events are logged, nothing is injected");
        drive(modality, &name, &profile, source.as_deref(), UinputSink::noop(), NoopVolume::new(50.0))
    } else {
        let pointer = UinputSink::new((profile.screen.width, profile.screen.height))?;
        drive(modality, &name, &profile, source.as_deref(), pointer, PactlVolume::default())
    }
}

fn drive<P: PointerSink, V: VolumeControl>(
    modality: Modality,
    profile_name: &str,
    profile: &Profile,
    source: Option<&str>,
    pointer: P,
    volume: V,
) -> Result<()> {
    let feedback = CommandFeedback::spawn(&profile.feedback);
    feedback.chime();

    let mut session = Session::new(
        classifier_for(modality, profile),
        Actuators {
            pointer,
            volume,
            volume_range: profile.volume.clone(),
        },
        feedback,
        profile_name,
    );
    let _server = ControlServer::start(modality, session.status_handle(), session.command_sender())?;
    install_signal_handler(session.stop_flag())?;

    let camera = (profile.camera.width as f32, profile.camera.height as f32);
    let mirror = profile.camera.mirror;
    let outcome = match source {
        None | Some("-") => {
            let stdin = io::stdin();
            session.run(&mut JsonLinesSource::new(stdin.lock(), camera, mirror))
        }
        Some(path) => {
            let file = File::open(path).map_err(|e| anyhow!("cannot open {path}: {e}"))?;
            session.run(&mut JsonLinesSource::new(BufReader::new(file), camera, mirror))
        }
    };

    match outcome {
        Ok(o) => {
            info!("{modality} session finished ({o:?})");
            Ok(())
        }
        Err(e) => Err(anyhow!("{modality} session aborted: {e}")),
    }
}

/// First SIGINT/SIGTERM stops after the current frame; a second one exits.
fn install_signal_handler(stop: Arc<AtomicBool>) -> Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            for sig in signals.forever() {
                if stop.swap(true, Ordering::SeqCst) {
                    warn!("signal {sig} again; exiting now");
                    std::process::exit(130);
                }
                info!("signal {sig}: stopping after the current frame");
            }
        })?;
    Ok(())
}

fn emit(mut pargs: Arguments) -> Result<()> {
    // usage:
    //   gesturectl emit click
    //   gesturectl emit scroll -3
    //   gesturectl emit move 960 540
    //   gesturectl emit volume up
    let what: String = pargs
        .free_from_str()
        .map_err(|_| anyhow!("usage: gesturectl emit <click|double-click|scroll|move|volume> ..."))?;
    let (_, profile) = load_profile(None, None)?;

    let ev = match what.as_str() {
        "click" => ControlEvent::Click,
        "double-click" => ControlEvent::DoubleClick,
        "scroll" => {
            let amount: i32 = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: gesturectl emit scroll <ticks>"))?;
            ControlEvent::Scroll { amount }
        }
        "move" => {
            let x: f32 = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: gesturectl emit move <x> <y>"))?;
            let y: f32 = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: gesturectl emit move <x> <y>"))?;
            ControlEvent::MoveTo { x, y }
        }
        "volume" => {
            let dir: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: gesturectl emit volume <up|down>"))?;
            let step = profile.hand.volume_step;
            match dir.as_str() {
                "up" => ControlEvent::Volume { delta: step },
                "down" => ControlEvent::Volume { delta: -step },
                other => return Err(anyhow!("unknown volume direction: {other}")),
            }
        }
        other => return Err(anyhow!("unknown emit kind: {other}")),
    };

    let mut pointer = UinputSink::new((profile.screen.width, profile.screen.height))?;
    let mut volume = PactlVolume::default();
    dispatch_event(&ev, &mut pointer, &mut volume, &profile.volume)?;
    println!("ok: {}", ev.name());
    Ok(())
}

fn print_help() {
    println!(
        r#"gesturectl: hand and eye gesture control from landmark streams

USAGE:
  gesturectl help [command]               Show general or command-specific help
  gesturectl run <hand|eye> [options]     Run a control session on a landmark stream
  gesturectl calibrate [eye|hand]         Set the neutral gaze point of a running session
  gesturectl stop [eye|hand]              Stop running session(s)
  gesturectl status [eye|hand]            Show running session state
  gesturectl list                         List profiles
  gesturectl use <name>                   Switch active profile
  gesturectl doctor                       Diagnose permissions and sessions
  gesturectl emit <kind> ...              Inject one pointer/volume event

RUN OPTIONS:
  --source PATH     JSON-lines landmark stream (default: stdin, '-' also means stdin)
  --profile NAME    Use a profile for this run without changing the active one
  --screen WxH      Override the profile's screen size
  --dry-run         Log events instead of injecting them

TIPS:
  - Profiles: ~/.config/gesturectl/profiles
  - Active profile pointer: ~/.config/gesturectl/active
  - Control sockets: ~/.local/run/gesturectl-<hand|eye>.sock
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "run" => println!(
            "usage: gesturectl run <hand|eye> [--source PATH] [--profile NAME] [--screen WxH] [--dry-run]\n\
             Reads one JSON record per line:\n  \
             {{\"kind\":\"frame\",\"t\":0.033,\"width\":640,\"height\":480,\"landmarks\":[{{\"x\":..,\"y\":..}}]}}\n  \
             {{\"kind\":\"no_frame\"}}   capture failed this cycle\n  \
             {{\"kind\":\"calibrate\"}}  use the current gaze point as centre"
        ),
        "calibrate" => println!(
            "usage: gesturectl calibrate [eye|hand]\nUses the current tracked point as the neutral reference (default: eye)."
        ),
        "stop" => println!("usage: gesturectl stop [eye|hand]\nStops the running session(s) after the current frame."),
        "status" => println!(
            "usage: gesturectl status [eye|hand]\nShows frames processed, skipped, calibration and last event."
        ),
        "list" => println!("usage: gesturectl list\nLists available profiles and the active one."),
        "use" => println!("usage: gesturectl use <name>\nMakes <name> the active profile for future sessions."),
        "doctor" => println!(
            "usage: gesturectl doctor\nChecks uinput access, input group membership and running sessions."
        ),
        "emit" => println!(
            "usage:\n  gesturectl emit click\n  gesturectl emit double-click\n  gesturectl emit scroll <ticks>\n  gesturectl emit move <x> <y>\n  gesturectl emit volume <up|down>"
        ),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn print_response(v: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_screen_sizes() {
        assert_eq!(parse_screen("2560x1440"), Ok((2560, 1440)));
        assert_eq!(parse_screen("800X600"), Ok((800, 600)));
        assert!(parse_screen("800").is_err());
        assert!(parse_screen("0x600").is_err());
        assert!(parse_screen("axb").is_err());
    }

    #[test]
    fn no_modality_means_both() {
        assert_eq!(modalities(None), vec![Modality::Hand, Modality::Eye]);
        assert_eq!(modalities(Some(Modality::Eye)), vec![Modality::Eye]);
    }
}
