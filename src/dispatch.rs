use std::time::Instant;

use log::{error, info};
use serde::Serialize;

use crate::actions::{ActionError, ActionSink, MouseButton};
use crate::config::{Controls, Profile};
use crate::cursor::CursorMapper;
use crate::gestures::{Gesture, HandRole};
use crate::landmarks::{INDEX_TIP, LandmarkSet};
use crate::tracker::{Axis, Commit, PinchTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    Mouse,
    Keyboard,
}

/// Cross-frame UI state touched by dispatch and the keyboard overlay.
#[derive(Debug)]
pub struct UiMode {
    pub input: InputMode,
    pub dragging: bool,
    pub last_key_press: Option<Instant>,
    pub typed: String,
}

impl Default for UiMode {
    fn default() -> Self {
        Self {
            input: InputMode::Mouse,
            dragging: false,
            last_key_press: None,
            typed: String::new(),
        }
    }
}

impl UiMode {
    pub fn mouse_enabled(&self) -> bool {
        self.input == InputMode::Mouse
    }

    pub fn keyboard_visible(&self) -> bool {
        self.input == InputMode::Keyboard
    }

    pub fn toggle_keyboard(&mut self) {
        self.input = match self.input {
            InputMode::Mouse => {
                self.typed.clear();
                InputMode::Keyboard
            }
            InputMode::Keyboard => InputMode::Mouse,
        };
        info!(
            "keyboard visible: {}, mouse enabled: {}",
            self.keyboard_visible(),
            self.mouse_enabled()
        );
    }

    pub fn hide_keyboard(&mut self) {
        self.input = InputMode::Mouse;
        self.typed.clear();
    }
}

/// Click actions fire only after a V gesture has armed them, and disarm once
/// they fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickArm {
    Idle,
    Armed,
}

/// Which system controls a pinch drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PinchTarget {
    /// horizontal → horizontal scroll, vertical → vertical scroll
    Scroll,
    /// horizontal → brightness, vertical → volume
    Levels,
}

pub struct Dispatcher {
    arm: ClickArm,
    last: Gesture,
    cursor: CursorMapper,
    pinch: PinchTracker,
    controls: Controls,
    volume: f32,
    brightness: f32,
}

fn report(what: &str, res: Result<(), ActionError>) {
    if let Err(e) = res {
        error!("{what} failed: {e}");
    }
}

impl Dispatcher {
    pub fn new(profile: &Profile) -> Self {
        let c = &profile.controls;
        Self {
            arm: ClickArm::Idle,
            last: Gesture::Palm,
            cursor: CursorMapper::new(profile.engine.screen_width, profile.engine.screen_height),
            pinch: PinchTracker::new(),
            controls: c.clone(),
            volume: c.initial_volume,
            brightness: c.initial_brightness,
        }
    }

    /// Pick up a reloaded profile. Current volume and brightness are kept.
    pub fn apply_profile(&mut self, profile: &Profile) {
        self.cursor
            .resize(profile.engine.screen_width, profile.engine.screen_height);
        self.controls = profile.controls.clone();
    }

    pub fn arm(&self) -> ClickArm {
        self.arm
    }

    pub fn pinch(&self) -> &PinchTracker {
        &self.pinch
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn brightness(&self) -> f32 {
        self.brightness
    }

    /// Act on this frame's governing gesture.
    pub fn dispatch(
        &mut self,
        gesture: Gesture,
        role: HandRole,
        hand: Option<&LandmarkSet>,
        mode: &mut UiMode,
        sink: &mut dyn ActionSink,
    ) {
        let edge = gesture != self.last;
        self.last = gesture;
        if edge {
            info!("{role:?}: {gesture}");
        }

        // only V and FIST move the cursor; other poses just keep the hand history current
        let pos = match hand {
            Some(h) if mode.mouse_enabled() && matches!(gesture, Gesture::VGest | Gesture::Fist) => {
                Some(self.cursor.map(h))
            }
            Some(h) => {
                self.cursor.track(h);
                None
            }
            None => None,
        };

        if gesture != Gesture::Fist && mode.dragging {
            mode.dragging = false;
            report("drag release", sink.release(MouseButton::Left));
        }
        if gesture != Gesture::PinchMajor {
            self.pinch.release(HandRole::Major);
        }
        if gesture != Gesture::PinchMinor {
            self.pinch.release(HandRole::Minor);
        }

        let armed = self.arm == ClickArm::Armed;
        match gesture {
            Gesture::VGest if mode.mouse_enabled() => {
                self.arm = ClickArm::Armed;
                if let Some((x, y)) = pos {
                    report("move", sink.move_cursor(x, y));
                }
            }
            Gesture::Fist if mode.mouse_enabled() => {
                if !mode.dragging {
                    mode.dragging = true;
                    report("drag press", sink.press(MouseButton::Left));
                }
                if let Some((x, y)) = pos {
                    report("drag move", sink.move_cursor(x, y));
                }
            }
            Gesture::Mid if edge && armed => {
                self.arm = ClickArm::Idle;
                report("click", sink.click(MouseButton::Left));
                mode.toggle_keyboard();
            }
            Gesture::ThumbsUp if edge && armed => {
                self.arm = ClickArm::Idle;
                mode.toggle_keyboard();
            }
            Gesture::Index if edge && armed && mode.mouse_enabled() => {
                self.arm = ClickArm::Idle;
                report("right click", sink.click(MouseButton::Right));
            }
            Gesture::TwoFingerClosed if edge && armed && mode.mouse_enabled() => {
                self.arm = ClickArm::Idle;
                report("double click", sink.double_click());
            }
            Gesture::PinchMinor => {
                if let Some(h) = hand {
                    self.pinch_frame(HandRole::Minor, PinchTarget::Scroll, h, sink);
                }
            }
            Gesture::PinchMajor => {
                if let Some(h) = hand {
                    self.pinch_frame(HandRole::Major, PinchTarget::Levels, h, sink);
                }
            }
            Gesture::Palm => self.arm = ClickArm::Idle,
            _ => {}
        }
    }

    fn pinch_frame(
        &mut self,
        role: HandRole,
        target: PinchTarget,
        hand: &LandmarkSet,
        sink: &mut dyn ActionSink,
    ) {
        let tip = hand.point(INDEX_TIP);
        let Some(Commit { axis, level }) = self.pinch.update(role, (tip.x, tip.y)) else {
            return;
        };
        let steps = if level > 0.0 {
            self.controls.scroll_steps
        } else {
            -self.controls.scroll_steps
        };
        let delta = level / self.controls.level_divisor;
        match (target, axis) {
            (PinchTarget::Scroll, axis) => report("scroll", sink.scroll(axis, steps)),
            (PinchTarget::Levels, Axis::Horizontal) => {
                self.brightness = (self.brightness + delta).clamp(0.0, 1.0);
                report("brightness", sink.set_brightness(self.brightness));
            }
            (PinchTarget::Levels, Axis::Vertical) => {
                self.volume = (self.volume + delta).clamp(0.0, 1.0);
                report("volume", sink.set_volume(self.volume));
            }
        }
    }

    /// No hand in view: drop cursor history, any drag, and both pinch sessions.
    pub fn hand_lost(&mut self, mode: &mut UiMode, sink: &mut dyn ActionSink) {
        self.cursor.reset();
        if mode.dragging {
            mode.dragging = false;
            report("drag release", sink.release(MouseButton::Left));
        }
        self.pinch.release_all();
    }
}
