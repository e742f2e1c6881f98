//! Pinch-session tracking: turns fingertip travel since the pinch started into
//! committed intensity levels along one latched axis.

use log::debug;

use crate::gestures::{HandRole, round1};

/// Minimum level magnitude that selects an axis, and the band a level must stay
/// inside to count as stable.
const PINCH_THRESHOLD: f32 = 0.3;
/// Stable frames needed per commit.
const COMMIT_FRAMES: u32 = 5;
/// Normalized travel to level units.
const LEVEL_SCALE: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Horizontal,
    Vertical,
}

/// A level that held steady long enough to act on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Commit {
    pub axis: Axis,
    pub level: f32,
}

#[derive(Debug, Default)]
pub struct PinchTracker {
    anchor: (f32, f32),
    axis: Option<Axis>,
    level: f32,
    pending: f32,
    run: u32,
    major_active: bool,
    minor_active: bool,
}

impl PinchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self, role: HandRole) -> bool {
        match role {
            HandRole::Major => self.major_active,
            HandRole::Minor => self.minor_active,
        }
    }

    fn set_active(&mut self, role: HandRole, on: bool) {
        match role {
            HandRole::Major => self.major_active = on,
            HandRole::Minor => self.minor_active = on,
        }
    }

    fn start(&mut self, role: HandRole, tip: (f32, f32)) {
        self.anchor = tip;
        self.axis = None;
        self.level = 0.0;
        self.pending = 0.0;
        self.run = 0;
        self.set_active(role, true);
        debug!("pinch: {role:?} session anchored at ({:.3}, {:.3})", tip.0, tip.1);
    }

    /// Feed the index fingertip for one pinch frame. Starts a session when the
    /// role has none running.
    pub fn update(&mut self, role: HandRole, tip: (f32, f32)) -> Option<Commit> {
        if !self.is_active(role) {
            self.start(role, tip);
        }

        let dx = round1((tip.0 - self.anchor.0) * LEVEL_SCALE);
        // image y grows downward; upward travel reads positive
        let dy = round1((self.anchor.1 - tip.1) * LEVEL_SCALE);

        let delta = if dy.abs() > dx.abs() && dy.abs() > PINCH_THRESHOLD {
            self.axis = Some(Axis::Vertical);
            dy
        } else if dx.abs() > PINCH_THRESHOLD {
            self.axis = Some(Axis::Horizontal);
            dx
        } else {
            return None;
        };

        if (self.pending - delta).abs() < PINCH_THRESHOLD {
            self.run += 1;
        } else {
            self.pending = delta;
            self.run = 0;
        }

        if self.run == COMMIT_FRAMES {
            self.run = 0;
            self.level = self.pending;
            let axis = self.axis?;
            return Some(Commit {
                axis,
                level: self.level,
            });
        }
        None
    }

    /// The role's pinch ended. Anchor and levels stay until the next session.
    pub fn release(&mut self, role: HandRole) {
        if self.is_active(role) {
            debug!("pinch: {role:?} session released");
            self.set_active(role, false);
        }
    }

    pub fn release_all(&mut self) {
        self.release(HandRole::Major);
        self.release(HandRole::Minor);
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn axis(&self) -> Option<Axis> {
        self.axis
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_cadence_every_fifth_stable_frame() {
        let mut t = PinchTracker::new();
        assert_eq!(t.update(HandRole::Minor, (0.5, 0.5)), None);
        // first frame past the threshold sets the candidate
        assert_eq!(t.update(HandRole::Minor, (0.6, 0.5)), None);

        let mut fired = vec![];
        for frame in 1..=15 {
            if let Some(c) = t.update(HandRole::Minor, (0.6, 0.5)) {
                assert_eq!(c.axis, Axis::Horizontal);
                assert!((c.level - 1.0).abs() < 1e-6);
                fired.push(frame);
            }
        }
        assert_eq!(fired, vec![5, 10, 15]);
        assert!((t.level() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_vertical_up_is_positive() {
        let mut t = PinchTracker::new();
        t.update(HandRole::Major, (0.5, 0.5));
        let mut last = None;
        for _ in 0..6 {
            last = t.update(HandRole::Major, (0.52, 0.4)).or(last);
        }
        let c = last.expect("commit");
        assert_eq!(c.axis, Axis::Vertical);
        assert!((c.level - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_small_travel_selects_no_axis() {
        let mut t = PinchTracker::new();
        for _ in 0..20 {
            assert_eq!(t.update(HandRole::Major, (0.52, 0.48)), None);
        }
        assert_eq!(t.axis(), None);
    }

    #[test]
    fn test_jitter_outside_band_restarts_run() {
        let mut t = PinchTracker::new();
        t.update(HandRole::Major, (0.5, 0.5));
        t.update(HandRole::Major, (0.6, 0.5));
        for _ in 0..4 {
            assert_eq!(t.update(HandRole::Major, (0.6, 0.5)), None);
        }
        // jump to a new level, the run starts over
        assert_eq!(t.update(HandRole::Major, (0.7, 0.5)), None);
        for _ in 0..4 {
            assert_eq!(t.update(HandRole::Major, (0.7, 0.5)), None);
        }
        let c = t.update(HandRole::Major, (0.7, 0.5)).expect("commit");
        assert!((c.level - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_release_keeps_other_role_and_levels() {
        let mut t = PinchTracker::new();
        t.update(HandRole::Major, (0.5, 0.5));
        t.update(HandRole::Minor, (0.5, 0.5));
        t.release(HandRole::Major);
        assert!(!t.is_active(HandRole::Major));
        assert!(t.is_active(HandRole::Minor));

        t.update(HandRole::Minor, (0.6, 0.5));
        for _ in 0..5 {
            t.update(HandRole::Minor, (0.6, 0.5));
        }
        t.release(HandRole::Minor);
        assert!((t.level() - 1.0).abs() < 1e-6);
        assert_eq!(t.axis(), Some(Axis::Horizontal));

        // a new session re-anchors and clears levels
        assert_eq!(t.update(HandRole::Minor, (0.2, 0.2)), None);
        assert_eq!(t.level(), 0.0);
        assert_eq!(t.axis(), None);
    }
}
