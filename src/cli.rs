use anyhow::{Result, anyhow};
use pico_args::Arguments;
use std::{
    env,
    path::PathBuf,
    process::{Command, Stdio},
};

use crate::actions::{ActionSink, MouseButton, UinputSink};
use crate::config::DaemonConfigState;
use crate::ipc::{self, DaemonOptions};
use crate::tracker::Axis;

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // Hidden daemon mode (spawned by `start`)
    if pargs.contains("--daemon") {
        let input: Option<PathBuf> = pargs.opt_value_from_str("--input")?;
        return ipc::run_daemon(DaemonOptions {
            input,
            control_socket: true,
        });
    }

    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }

    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

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

        Some("run") => {
            let input: Option<PathBuf> = pargs.opt_value_from_str("--input")?;
            ipc::run_daemon(DaemonOptions {
                input,
                control_socket: false,
            })
        }

        Some("start") => {
            let input: PathBuf = pargs
                .opt_value_from_str("--input")?
                .ok_or_else(|| anyhow!("usage: handctl start --input <path>"))?;
            let input = input.canonicalize()?;
            let exe = env::current_exe()?;
            let child = Command::new(exe)
                .arg("--daemon")
                .arg("--input")
                .arg(&input)
                .stdin(Stdio::null())
                .spawn()?;
            println!(
                "handctl: started daemon (pid={}) reading {}",
                child.id(),
                input.display()
            );
            Ok(())
        }

        Some("stop") => request(serde_json::json!({"op":"shutdown"})),
        Some("status") => request(serde_json::json!({"op":"status"})),
        Some("reload") => request(serde_json::json!({"op":"reload"})),

        Some("use") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl use <profile_name>"))?;
            request(serde_json::json!({"op":"use","profile":name}))
        }

        Some("list") => request(serde_json::json!({"op":"list"})),
        Some("doctor") => request(serde_json::json!({"op":"doctor"})),

        Some("emit") => emit(&mut pargs),

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

fn request(req: serde_json::Value) -> Result<()> {
    let r = ipc::client_request(req)?;
    print_response(&r);
    Ok(())
}

fn emit(pargs: &mut Arguments) -> Result<()> {
    // usage:
    //   handctl emit click right
    //   handctl emit scroll -2
    //   handctl emit key a
    //   handctl emit volume 0.4
    let what: String = pargs.free_from_str().map_err(|_| {
        anyhow!("usage: handctl emit <click|scroll|hscroll|key|volume|brightness> ...")
    })?;
    let cfg = DaemonConfigState::load_or_install_default()?;
    let mut sink = UinputSink::new(cfg.profile.commands.clone())?;
    match what.as_str() {
        "click" => {
            let btn: MouseButton = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl emit click <left|right|middle>"))?;
            sink.click(btn)?;
            println!("ok: clicked {btn:?}");
        }
        "scroll" | "hscroll" => {
            let steps: i32 = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl emit {what} <steps>"))?;
            let axis = if what == "scroll" {
                Axis::Vertical
            } else {
                Axis::Horizontal
            };
            sink.scroll(axis, steps)?;
            println!("ok: scrolled {axis:?} {steps}");
        }
        "key" => {
            let key: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl emit key <char|enter|backspace>"))?;
            match key.to_ascii_lowercase().as_str() {
                "enter" => sink.send_enter()?,
                "backspace" => sink.send_backspace()?,
                "space" => sink.send_key(' ')?,
                k => {
                    let mut chars = k.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => sink.send_key(c)?,
                        _ => return Err(anyhow!("expected a single character, got {key:?}")),
                    }
                }
            }
            println!("ok: sent key {key}");
        }
        "volume" | "brightness" => {
            let level: f32 = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl emit {what} <0..1>"))?;
            if !(0.0..=1.0).contains(&level) {
                return Err(anyhow!("level must be in [0,1], got {level}"));
            }
            if what == "volume" {
                sink.set_volume(level)?;
            } else {
                sink.set_brightness(level)?;
            }
            println!("ok: {what} {level:.2}");
        }
        other => return Err(anyhow!("unknown emit kind: {other}")),
    }
    Ok(())
}

fn print_help() {
    println!(
        r#"handctl - hand-gesture mouse and keyboard control

USAGE:
  handctl help [command]                  Show general or command-specific help
  handctl run [--input PATH]              Run in the foreground (frames from PATH or stdin)
  handctl start --input PATH              Start the daemon reading frames from PATH
  handctl stop                            Stop the daemon
  handctl status                          Show daemon and gesture state
  handctl reload                          Reload active profile
  handctl use <name>                      Switch active profile
  handctl list                            List profiles
  handctl doctor                          Diagnose permissions and commands
  handctl emit click <left|right|middle>  Emit a mouse click
  handctl emit scroll|hscroll <steps>     Emit a vertical or horizontal scroll
  handctl emit key <char>                 Type a character (or enter, backspace)
  handctl emit volume|brightness <0..1>   Run the configured level command

FRAMES:
  One JSON object per line:
  {{"hands": [{{"label": "Right", "landmarks": [[x, y, z], ... 21 points]}}]}}

TIPS:
  - Profiles: ~/.config/handctl/profiles
  - Active profile pointer: ~/.config/handctl/active
  - Control socket: ~/.local/run/handctl.sock
  - Log level: RUST_LOG=debug handctl run
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "run" => println!(
            "usage: handctl run [--input PATH]\nProcesses frames in the foreground until EOF or Ctrl-C."
        ),
        "start" => println!(
            "usage: handctl start --input PATH\nStarts the background daemon on a frame file or FIFO."
        ),
        "stop" => println!("usage: handctl stop\nStops the running daemon."),
        "status" => println!(
            "usage: handctl status\nShows active profile, input, frames processed, committed gestures and mode."
        ),
        "reload" => println!(
            "usage: handctl reload\nReloads the current profile; keeps last good on error."
        ),
        "use" => {
            println!("usage: handctl use <name>\nSwitches active profile to <name> and reloads.")
        }
        "list" => println!("usage: handctl list\nLists available profiles."),
        "doctor" => println!(
            "usage: handctl doctor\nChecks uinput permissions and the configured level commands."
        ),
        "emit" => println!(
            "usage:\n  handctl emit click <left|right|middle>\n  handctl emit scroll <steps>\n  handctl emit hscroll <steps>\n  handctl emit key <char|enter|backspace>\n  handctl emit volume <0..1>\n  handctl emit brightness <0..1>"
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
