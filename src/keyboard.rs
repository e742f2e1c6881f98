//! On-screen keyboard hit boxes and key presses driven by the fingertip.
//!
//! Coordinates are camera pixels. Drawing the overlay is left to whoever
//! renders the camera feed.

use std::time::{Duration, Instant};

use log::{error, info};

use crate::actions::ActionSink;
use crate::dispatch::UiMode;

/// Index-thumb pixel distance below which the hovered key is pressed.
const PRESS_DIST_PX: f32 = 40.0;
const KEY_SIZE: i32 = 60;
const WIDE_KEY: i32 = 120;
const COL_PITCH: i32 = 70;
const ROW_PITCH: i32 = 80;
const ORIGIN: (i32, i32) = (50, 100);

const ROWS: [&[&str]; 3] = [
    &["Q", "W", "E", "R", "T", "Y", "U", "I", "O", "P"],
    &["A", "S", "D", "F", "G", "H", "J", "K", "L"],
    &["Z", "X", "C", "V", "B", "N", "M", "<", " ", "Enter"],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Backspace,
    Enter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyBox {
    pub key: Key,
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl KeyBox {
    /// Strictly inside the box; edges do not count.
    pub fn contains(&self, px: i32, py: i32) -> bool {
        self.x < px && px < self.x + self.w && self.y < py && py < self.y + self.h
    }
}

pub fn default_layout() -> Vec<KeyBox> {
    let mut out = Vec::new();
    for (row, labels) in ROWS.iter().enumerate() {
        for (col, label) in labels.iter().enumerate() {
            let key = match *label {
                "<" => Key::Backspace,
                "Enter" => Key::Enter,
                s => Key::Char(s.chars().next().unwrap_or(' ')),
            };
            let w = if key == Key::Enter { WIDE_KEY } else { KEY_SIZE };
            out.push(KeyBox {
                key,
                x: COL_PITCH * col as i32 + ORIGIN.0,
                y: ROW_PITCH * row as i32 + ORIGIN.1,
                w,
                h: KEY_SIZE,
            });
        }
    }
    out
}

#[derive(Debug)]
pub struct VirtualKeyboard {
    keys: Vec<KeyBox>,
    cooldown: Duration,
}

impl VirtualKeyboard {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            keys: default_layout(),
            cooldown,
        }
    }

    pub fn set_cooldown(&mut self, cooldown: Duration) {
        self.cooldown = cooldown;
    }

    pub fn hit(&self, px: i32, py: i32) -> Option<Key> {
        self.keys.iter().find(|k| k.contains(px, py)).map(|k| k.key)
    }

    /// Press the key under the index fingertip if the thumb is pinched onto it
    /// and the cooldown since the last press has run out.
    pub fn handle(
        &self,
        index: (i32, i32),
        thumb: (i32, i32),
        now: Instant,
        mode: &mut UiMode,
        sink: &mut dyn ActionSink,
    ) -> Option<Key> {
        let key = self.hit(index.0, index.1)?;
        let (dx, dy) = ((thumb.0 - index.0) as f32, (thumb.1 - index.1) as f32);
        if dx.hypot(dy) >= PRESS_DIST_PX {
            return None;
        }
        if let Some(last) = mode.last_key_press {
            if now.saturating_duration_since(last) <= self.cooldown {
                return None;
            }
        }

        let res = match key {
            Key::Backspace => {
                mode.typed.pop();
                sink.send_backspace()
            }
            Key::Enter => {
                let r = sink.send_enter();
                mode.hide_keyboard();
                info!("keyboard: submitted input, mouse enabled");
                r
            }
            Key::Char(c) => {
                mode.typed.push(c);
                sink.send_key(c.to_ascii_lowercase())
            }
        };
        if let Err(e) = res {
            error!("keyboard: {key:?} failed: {e}");
        }
        mode.last_key_press = Some(now);
        info!("keyboard: typed {key:?}, text {:?}", mode.typed);
        Some(key)
    }
}
