//! Hand landmark sets and the geometric measures taken over them.

pub const LANDMARK_COUNT: usize = 21;

pub const WRIST: usize = 0;
pub const THUMB_MCP: usize = 2;
pub const THUMB_TIP: usize = 4;
pub const INDEX_MCP: usize = 5;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_MCP: usize = 9;
pub const MIDDLE_TIP: usize = 12;
pub const RING_MCP: usize = 13;
pub const RING_TIP: usize = 16;
pub const PINKY_MCP: usize = 17;
pub const PINKY_TIP: usize = 20;

/// Reference point for cursor mapping.
pub const PALM_CENTER: usize = MIDDLE_MCP;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// The 21 keypoints of one detected hand for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    points: [Landmark; LANDMARK_COUNT],
}

impl LandmarkSet {
    pub fn new(points: [Landmark; LANDMARK_COUNT]) -> Self {
        Self { points }
    }

    pub fn point(&self, idx: usize) -> Landmark {
        self.points[idx]
    }

    #[cfg(test)]
    pub fn set(&mut self, idx: usize, x: f32, y: f32, z: f32) {
        self.points[idx] = Landmark::new(x, y, z);
    }

    /// Planar distance between two landmarks.
    pub fn dist(&self, a: usize, b: usize) -> f32 {
        let (p, q) = (self.points[a], self.points[b]);
        ((p.x - q.x).powi(2) + (p.y - q.y).powi(2)).sqrt()
    }

    /// Planar distance, negative when `a` sits above `b` in image space.
    pub fn signed_dist(&self, a: usize, b: usize) -> f32 {
        let d = self.dist(a, b);
        if self.points[a].y < self.points[b].y {
            -d
        } else {
            d
        }
    }

    /// Absolute depth difference.
    pub fn depth_delta(&self, a: usize, b: usize) -> f32 {
        (self.points[a].z - self.points[b].z).abs()
    }

    /// Landmark position in a `width` x `height` pixel space.
    pub fn to_pixels(&self, idx: usize, width: u32, height: u32) -> (i32, i32) {
        let p = self.points[idx];
        ((p.x * width as f32) as i32, (p.y * height as f32) as i32)
    }
}

#[cfg(test)]
pub mod fixtures {
    use super::*;

    /// Upright open hand: wrist at the bottom, all four fingers pointing up.
    pub fn open_hand() -> LandmarkSet {
        let mut pts = [Landmark::default(); LANDMARK_COUNT];
        pts[WRIST] = Landmark::new(0.5, 0.9, 0.0);
        pts[1] = Landmark::new(0.42, 0.82, 0.0);
        pts[THUMB_MCP] = Landmark::new(0.38, 0.76, 0.0);
        pts[3] = Landmark::new(0.35, 0.72, 0.0);
        pts[THUMB_TIP] = Landmark::new(0.32, 0.68, 0.0);
        for (finger, x) in [0.44f32, 0.50, 0.56, 0.62].into_iter().enumerate() {
            let base = INDEX_MCP + finger * 4;
            pts[base] = Landmark::new(x, 0.7, 0.0);
            pts[base + 1] = Landmark::new(x, 0.6, 0.0);
            pts[base + 2] = Landmark::new(x, 0.55, 0.0);
            pts[base + 3] = Landmark::new(x, 0.5, 0.0);
        }
        LandmarkSet::new(pts)
    }

    /// Open hand with the given fingers (index..pinky) folded onto the palm.
    pub fn hand_with_curled(curled: [bool; 4]) -> LandmarkSet {
        let mut h = open_hand();
        for (finger, c) in curled.into_iter().enumerate() {
            if c {
                let mcp = h.point(INDEX_MCP + finger * 4);
                h.set(INDEX_MCP + finger * 4 + 3, mcp.x, mcp.y + 0.05, 0.0);
            }
        }
        h
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::open_hand;
    use super::*;

    #[test]
    fn test_signed_dist_flips_when_above() {
        let h = open_hand();
        assert!(h.signed_dist(INDEX_TIP, INDEX_MCP) < 0.0);
        assert!(h.signed_dist(INDEX_MCP, INDEX_TIP) > 0.0);
        assert!((h.signed_dist(INDEX_TIP, INDEX_MCP).abs() - h.dist(INDEX_TIP, INDEX_MCP)).abs() < 1e-6);
    }

    #[test]
    fn test_depth_delta_is_absolute() {
        let mut h = open_hand();
        h.set(INDEX_TIP, 0.4, 0.5, -0.2);
        h.set(MIDDLE_TIP, 0.5, 0.5, 0.1);
        assert!((h.depth_delta(INDEX_TIP, MIDDLE_TIP) - 0.3).abs() < 1e-6);
        assert!((h.depth_delta(MIDDLE_TIP, INDEX_TIP) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_to_pixels() {
        let mut h = open_hand();
        h.set(INDEX_TIP, 0.5, 0.25, 0.0);
        assert_eq!(h.to_pixels(INDEX_TIP, 1280, 720), (640, 180));
    }
}
