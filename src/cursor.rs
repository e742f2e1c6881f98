//! Hand position to screen cursor, with a gain curve that swallows jitter at
//! rest and speeds up large sweeps.

use crate::landmarks::{LandmarkSet, PALM_CENTER};

/// Squared pixel motion at or below which the hand is considered still.
const NOISE_SQ: f32 = 25.0;
/// Squared pixel motion up to which gain grows with distance.
const SLOW_SQ: f32 = 900.0;
const SLOW_GAIN: f32 = 0.07;
const FAST_GAIN: f32 = 2.1;

/// Movement multiplier for a squared pixel displacement.
pub fn gain(dist_sq: f32) -> f32 {
    if dist_sq <= NOISE_SQ {
        0.0
    } else if dist_sq <= SLOW_SQ {
        SLOW_GAIN * dist_sq.sqrt()
    } else {
        FAST_GAIN
    }
}

#[derive(Debug)]
pub struct CursorMapper {
    width: u32,
    height: u32,
    prev: Option<(i32, i32)>,
    cursor: (f32, f32),
}

impl CursorMapper {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            prev: None,
            cursor: (width as f32 / 2.0, height as f32 / 2.0),
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if (width, height) != (self.width, self.height) {
            *self = Self::new(width, height);
        }
    }

    /// Forget the previous hand position so the next frame starts from rest.
    pub fn reset(&mut self) {
        self.prev = None;
    }

    pub fn position(&self) -> (i32, i32) {
        (self.cursor.0.round() as i32, self.cursor.1.round() as i32)
    }

    /// Record the palm position without moving the cursor, so hand motion
    /// during a non-pointing gesture is dropped rather than replayed later.
    pub fn track(&mut self, hand: &LandmarkSet) {
        self.prev = Some(hand.to_pixels(PALM_CENTER, self.width, self.height));
    }

    /// Advance the cursor from this frame's palm position and return it.
    pub fn map(&mut self, hand: &LandmarkSet) -> (i32, i32) {
        let (x, y) = hand.to_pixels(PALM_CENTER, self.width, self.height);
        let (px, py) = self.prev.unwrap_or((x, y));
        self.prev = Some((x, y));

        let (dx, dy) = (x.saturating_sub(px) as f32, y.saturating_sub(py) as f32);
        let ratio = gain(dx * dx + dy * dy);
        let max_x = self.width.saturating_sub(1) as f32;
        let max_y = self.height.saturating_sub(1) as f32;
        self.cursor = (
            (self.cursor.0 + dx * ratio).clamp(0.0, max_x),
            (self.cursor.1 + dy * ratio).clamp(0.0, max_y),
        );
        self.position()
    }
}
