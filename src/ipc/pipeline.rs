use anyhow::{Context, Result};
use log::{debug, info, warn};
use signal_hook::{consts::TERM_SIGNALS, flag};
use std::{
    io::BufRead,
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Instant,
};

use crate::actions::{ActionSink, UinputSink};
use crate::config::Profile;
use crate::engine::{Engine, EngineStatus};
use crate::input::{self, FrameReader};

/// State shared between the frame thread and the control loop.
pub struct Shared {
    profile: Mutex<Profile>,
    revision: AtomicU64,
    status: Mutex<EngineStatus>,
    pub stop: Arc<AtomicBool>,
}

impl Shared {
    pub fn new(profile: Profile) -> Self {
        Self {
            profile: Mutex::new(profile),
            revision: AtomicU64::new(0),
            status: Mutex::new(EngineStatus::default()),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn update_profile(&self, new_profile: Profile) {
        if let Ok(mut p) = self.profile.lock() {
            *p = new_profile;
            self.revision.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn status(&self) -> EngineStatus {
        self.status.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn stopping(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    fn snapshot(&self) -> Option<(u64, Profile)> {
        let p = self.profile.lock().ok()?;
        Some((self.revision.load(Ordering::SeqCst), p.clone()))
    }

    fn profile_if_newer(&self, seen: u64) -> Option<(u64, Profile)> {
        if self.revision.load(Ordering::SeqCst) == seen {
            return None;
        }
        self.snapshot()
    }

    fn publish(&self, status: EngineStatus) {
        if let Ok(mut s) = self.status.lock() {
            *s = status;
        }
    }
}

/// SIGINT/SIGTERM/SIGQUIT raise `stop`; a second one while blocked on input exits.
pub fn register_stop_signals(stop: &Arc<AtomicBool>) -> Result<()> {
    for sig in TERM_SIGNALS {
        flag::register_conditional_shutdown(*sig, 1, Arc::clone(stop))?;
        flag::register(*sig, Arc::clone(stop))?;
    }
    Ok(())
}

/// Read frames until EOF or stop, driving the engine into a uinput sink.
/// Returns the number of frames processed.
pub fn run_pipeline(input: Option<&Path>, shared: Arc<Shared>) -> Result<u64> {
    let frames = input::open(input).with_context(|| match input {
        Some(p) => format!("failed to open frame source {}", p.display()),
        None => "failed to open stdin".to_string(),
    })?;
    match input {
        Some(p) => info!("pipeline: reading frames from {}", p.display()),
        None => info!("pipeline: reading frames from stdin"),
    }

    let commands = shared
        .profile
        .lock()
        .map(|p| p.commands.clone())
        .unwrap_or_default();
    let mut sink = UinputSink::open_or_noop(commands);
    Ok(drive(frames, &shared, &mut sink, |s, p| s.set_commands(p.commands.clone())))
}

fn drive<R: BufRead, S: ActionSink>(
    frames: FrameReader<R>,
    shared: &Shared,
    sink: &mut S,
    on_profile: impl Fn(&mut S, &Profile),
) -> u64 {
    let (mut seen, profile) = match shared.snapshot() {
        Some(x) => x,
        None => return 0,
    };
    let mut engine = Engine::new(&profile);
    let mut processed = 0;

    for item in frames {
        if shared.stopping() {
            info!("pipeline: stop requested");
            break;
        }
        if let Some((rev, p)) = shared.profile_if_newer(seen) {
            seen = rev;
            engine.apply_profile(&p);
            on_profile(sink, &p);
        }

        let frame = match item {
            Ok(f) => f,
            Err(e) => {
                warn!("skipping frame: {e}");
                continue;
            }
        };
        let out = engine.process_frame(&frame, Instant::now(), sink);
        processed += 1;
        if let Some((role, g)) = out.dispatched {
            debug!(
                "frame {processed} (t={:?}ms): major {} minor {} -> {role:?} {g}, key {:?}",
                frame.timestamp_ms, out.major, out.minor, out.key
            );
        }
        shared.publish(engine.status());
    }
    info!("pipeline: done after {processed} frames");
    processed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::MouseButton;
    use crate::actions::recording::{Call, RecordingSink};
    use crate::config::default_profile;
    use crate::gestures::Gesture;

    /// A right-hand fist: every fingertip folded just below its knuckle.
    fn fist_line() -> String {
        let mut pts = vec![[0.0f32, 0.0, 0.0]; 21];
        pts[0] = [0.5, 0.9, 0.0];
        pts[2] = [0.38, 0.76, 0.0];
        pts[4] = [0.32, 0.68, 0.0];
        for (finger, x) in [0.44f32, 0.50, 0.56, 0.62].into_iter().enumerate() {
            let base = 5 + finger * 4;
            pts[base] = [x, 0.7, 0.0];
            pts[base + 3] = [x, 0.75, 0.0];
        }
        serde_json::json!({"hands": [{"label": "Right", "landmarks": pts}]}).to_string()
    }

    #[test]
    fn test_drive_skips_bad_lines_and_publishes_status() {
        let mut text = String::new();
        for _ in 0..6 {
            text.push_str(&fist_line());
            text.push('\n');
        }
        text.push_str("{not json\n{}\n");

        let shared = Shared::new(default_profile().unwrap());
        let mut sink = RecordingSink::default();
        let n = drive(FrameReader::new(text.as_bytes()), &shared, &mut sink, |_, _| {});
        assert_eq!(n, 7);

        let calls = sink.take();
        assert_eq!(calls.first(), Some(&Call::Press(MouseButton::Left)));
        assert_eq!(calls.last(), Some(&Call::Release(MouseButton::Left)));
        let st = shared.status();
        assert_eq!(st.frames, 7);
        assert_eq!(st.major, Gesture::Fist);
        assert!(!st.dragging);
    }

    #[test]
    fn test_drive_honours_stop_flag() {
        let text = format!("{}\n{}\n", fist_line(), fist_line());
        let shared = Shared::new(default_profile().unwrap());
        shared.stop.store(true, Ordering::Relaxed);
        let mut sink = RecordingSink::default();
        assert_eq!(drive(FrameReader::new(text.as_bytes()), &shared, &mut sink, |_, _| {}), 0);
    }

    #[test]
    fn test_profile_revision_is_picked_up() {
        let shared = Shared::new(default_profile().unwrap());
        assert!(shared.profile_if_newer(0).is_none());
        let mut p = default_profile().unwrap();
        p.controls.scroll_steps = 3;
        shared.update_profile(p);
        let (rev, got) = shared.profile_if_newer(0).unwrap();
        assert_eq!(rev, 1);
        assert_eq!(got.controls.scroll_steps, 3);
        assert!(shared.profile_if_newer(rev).is_none());
    }
}
