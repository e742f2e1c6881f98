//! Per-frame orchestration: role assignment, recognition for both hands, the
//! priority rule that picks one gesture to dispatch, and the keyboard overlay.

use std::time::{Duration, Instant};

use log::info;
use serde::Serialize;

use crate::actions::ActionSink;
use crate::config::{EngineSettings, Profile};
use crate::dispatch::{ClickArm, Dispatcher, InputMode, UiMode};
use crate::gestures::{Gesture, HandRecognizer, HandRole};
use crate::input::Frame;
use crate::keyboard::{Key, VirtualKeyboard};
use crate::landmarks::{INDEX_TIP, LandmarkSet, THUMB_TIP};
use crate::tracker::Axis;

/// What one frame did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameOutcome {
    pub major: Gesture,
    pub minor: Gesture,
    /// Role and gesture that went to the dispatcher; `None` when no hand was seen.
    pub dispatched: Option<(HandRole, Gesture)>,
    pub key: Option<Key>,
}

/// Snapshot served to `handctl status`.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub frames: u64,
    pub hands_visible: usize,
    pub major: Gesture,
    pub minor: Gesture,
    pub input_mode: InputMode,
    pub dragging: bool,
    pub click_armed: bool,
    pub pinch_major: bool,
    pub pinch_minor: bool,
    pub pinch_axis: Option<Axis>,
    pub pinch_level: f32,
    pub volume: f32,
    pub brightness: f32,
    pub typed: String,
}

impl Default for EngineStatus {
    fn default() -> Self {
        Self {
            frames: 0,
            hands_visible: 0,
            major: Gesture::Palm,
            minor: Gesture::Palm,
            input_mode: InputMode::Mouse,
            dragging: false,
            click_armed: false,
            pinch_major: false,
            pinch_minor: false,
            pinch_axis: None,
            pinch_level: 0.0,
            volume: 0.0,
            brightness: 0.0,
            typed: String::new(),
        }
    }
}

pub struct Engine {
    settings: EngineSettings,
    major: HandRecognizer,
    minor: HandRecognizer,
    dispatcher: Dispatcher,
    keyboard: VirtualKeyboard,
    mode: UiMode,
    frames: u64,
    hands_visible: usize,
}

impl Engine {
    pub fn new(profile: &Profile) -> Self {
        Self {
            settings: profile.engine.clone(),
            major: HandRecognizer::new(HandRole::Major),
            minor: HandRecognizer::new(HandRole::Minor),
            dispatcher: Dispatcher::new(profile),
            keyboard: VirtualKeyboard::new(Duration::from_millis(profile.controls.key_cooldown_ms)),
            mode: UiMode::default(),
            frames: 0,
            hands_visible: 0,
        }
    }

    /// Swap in a reloaded profile without dropping recognition state.
    pub fn apply_profile(&mut self, profile: &Profile) {
        self.settings = profile.engine.clone();
        self.dispatcher.apply_profile(profile);
        self.keyboard
            .set_cooldown(Duration::from_millis(profile.controls.key_cooldown_ms));
        info!(
            "engine: dominant hand {:?}, screen {}x{}",
            self.settings.dominant_hand, self.settings.screen_width, self.settings.screen_height
        );
    }

    pub fn process_frame(
        &mut self,
        frame: &Frame,
        now: Instant,
        sink: &mut dyn ActionSink,
    ) -> FrameOutcome {
        self.frames += 1;
        let was_visible = self.hands_visible;
        self.hands_visible = frame.hands.len();

        if frame.hands.is_empty() {
            if was_visible > 0 {
                info!("hand lost");
            }
            self.dispatcher.hand_lost(&mut self.mode, sink);
            return FrameOutcome {
                major: self.major.committed(),
                minor: self.minor.committed(),
                dispatched: None,
                key: None,
            };
        }

        // no identity across frames; a later hand with the same label wins
        let mut major_hand: Option<&LandmarkSet> = None;
        let mut minor_hand: Option<&LandmarkSet> = None;
        for h in &frame.hands {
            if h.label == self.settings.dominant_hand {
                major_hand = Some(&h.landmarks);
            } else {
                minor_hand = Some(&h.landmarks);
            }
        }

        let major = self.major.observe(major_hand);
        let minor = self.minor.observe(minor_hand);

        let (role, gesture, hand) = if minor == Gesture::PinchMinor {
            (HandRole::Minor, minor, minor_hand)
        } else {
            (HandRole::Major, major, major_hand)
        };
        self.dispatcher
            .dispatch(gesture, role, hand, &mut self.mode, sink);

        let mut key = None;
        if self.mode.keyboard_visible() {
            if let Some(h) = major_hand.or(minor_hand) {
                let (w, ht) = (self.settings.camera_width, self.settings.camera_height);
                let index = h.to_pixels(INDEX_TIP, w, ht);
                let thumb = h.to_pixels(THUMB_TIP, w, ht);
                key = self
                    .keyboard
                    .handle(index, thumb, now, &mut self.mode, sink);
            }
        }

        FrameOutcome {
            major,
            minor,
            dispatched: Some((role, gesture)),
            key,
        }
    }

    pub fn status(&self) -> EngineStatus {
        let pinch = self.dispatcher.pinch();
        EngineStatus {
            frames: self.frames,
            hands_visible: self.hands_visible,
            major: self.major.committed(),
            minor: self.minor.committed(),
            input_mode: self.mode.input,
            dragging: self.mode.dragging,
            click_armed: self.dispatcher.arm() == ClickArm::Armed,
            pinch_major: pinch.is_active(HandRole::Major),
            pinch_minor: pinch.is_active(HandRole::Minor),
            pinch_axis: pinch.axis(),
            pinch_level: pinch.level(),
            volume: self.dispatcher.volume(),
            brightness: self.dispatcher.brightness(),
            typed: self.mode.typed.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::MouseButton;
    use crate::actions::recording::{Call, RecordingSink};
    use crate::config::default_profile;
    use crate::input::{DetectedHand, Handedness};
    use crate::landmarks::{LANDMARK_COUNT, fixtures::hand_with_curled};

    fn fist() -> LandmarkSet {
        hand_with_curled([true, true, true, true])
    }

    fn pinch() -> LandmarkSet {
        let mut h = hand_with_curled([true, false, false, false]);
        let tip = h.point(INDEX_TIP);
        h.set(THUMB_TIP, tip.x, tip.y, 0.0);
        h
    }

    fn shifted(h: &LandmarkSet, dx: f32, dy: f32) -> LandmarkSet {
        let mut out = h.clone();
        for i in 0..LANDMARK_COUNT {
            let p = h.point(i);
            out.set(i, p.x + dx, p.y + dy, p.z);
        }
        out
    }

    fn frame(hands: &[(Handedness, &LandmarkSet)]) -> Frame {
        Frame {
            timestamp_ms: None,
            hands: hands
                .iter()
                .map(|(label, h)| DetectedHand {
                    label: *label,
                    landmarks: (*h).clone(),
                })
                .collect(),
        }
    }

    fn engine() -> Engine {
        Engine::new(&default_profile().unwrap())
    }

    #[test]
    fn test_commit_on_sixth_frame_then_drag() {
        let mut e = engine();
        let mut sink = RecordingSink::default();
        let now = Instant::now();
        let f = frame(&[(Handedness::Right, &fist())]);
        for n in 1..=5 {
            let out = e.process_frame(&f, now, &mut sink);
            assert_eq!(out.major, Gesture::Palm, "frame {n}");
        }
        let out = e.process_frame(&f, now, &mut sink);
        assert_eq!(out.dispatched, Some((HandRole::Major, Gesture::Fist)));
        assert_eq!(sink.take().first(), Some(&Call::Press(MouseButton::Left)));
        assert!(e.status().dragging);
    }

    #[test]
    fn test_minor_pinch_wins_over_major_drag() {
        let mut e = engine();
        let mut sink = RecordingSink::default();
        let now = Instant::now();
        let major = fist();
        let minor = pinch();
        let f = frame(&[(Handedness::Right, &major), (Handedness::Left, &minor)]);
        for _ in 0..6 {
            e.process_frame(&f, now, &mut sink);
        }
        let out = e.process_frame(&f, now, &mut sink);
        assert_eq!(out.major, Gesture::Fist);
        assert_eq!(out.minor, Gesture::PinchMinor);
        assert_eq!(out.dispatched, Some((HandRole::Minor, Gesture::PinchMinor)));

        // lift the pinching hand; the scroll fires, the drag never starts
        let up = shifted(&minor, 0.0, -0.1);
        let f = frame(&[(Handedness::Right, &major), (Handedness::Left, &up)]);
        for _ in 0..6 {
            e.process_frame(&f, now, &mut sink);
        }
        let calls = sink.take();
        assert!(!calls.contains(&Call::Press(MouseButton::Left)));
        assert_eq!(calls, vec![Call::Scroll(Axis::Vertical, 1)]);
    }

    #[test]
    fn test_dominant_hand_setting_swaps_roles() {
        let mut profile = default_profile().unwrap();
        profile.engine.dominant_hand = Handedness::Left;
        let mut e = Engine::new(&profile);
        let mut sink = RecordingSink::default();
        let f = frame(&[(Handedness::Left, &fist())]);
        for _ in 0..6 {
            e.process_frame(&f, Instant::now(), &mut sink);
        }
        assert_eq!(e.status().major, Gesture::Fist);
        assert_eq!(e.status().minor, Gesture::Palm);
    }

    #[test]
    fn test_hand_lost_releases_drag() {
        let mut e = engine();
        let mut sink = RecordingSink::default();
        let now = Instant::now();
        let f = frame(&[(Handedness::Right, &fist())]);
        for _ in 0..6 {
            e.process_frame(&f, now, &mut sink);
        }
        sink.take();
        let out = e.process_frame(&Frame::default(), now, &mut sink);
        assert_eq!(out.dispatched, None);
        assert_eq!(sink.take(), vec![Call::Release(MouseButton::Left)]);
        let st = e.status();
        assert!(!st.dragging);
        assert_eq!(st.hands_visible, 0);
        // the committed gesture survives the gap
        assert_eq!(st.major, Gesture::Fist);
    }

    #[test]
    fn test_keyboard_press_in_camera_space() {
        let mut e = engine();
        e.mode.toggle_keyboard();
        let mut sink = RecordingSink::default();
        let mut h = fist();
        // (80, 130) px on the 1280x720 camera is inside Q
        h.set(INDEX_TIP, 80.0 / 1280.0, 130.0 / 720.0, 0.0);
        h.set(THUMB_TIP, 90.0 / 1280.0, 130.0 / 720.0, 0.0);
        let out = e.process_frame(&frame(&[(Handedness::Right, &h)]), Instant::now(), &mut sink);
        assert_eq!(out.key, Some(Key::Char('Q')));
        assert_eq!(sink.take(), vec![Call::Key('q')]);
        assert_eq!(e.status().typed, "Q");
    }

    #[test]
    fn test_status_serializes() {
        let e = engine();
        let v = serde_json::to_value(e.status()).unwrap();
        assert_eq!(v["major"], "PALM");
        assert_eq!(v["input_mode"], "mouse");
        assert_eq!(v["click_armed"], false);
    }
}
