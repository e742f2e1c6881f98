use std::fmt;

use log::debug;

use crate::landmarks::{
    INDEX_MCP, INDEX_TIP, LandmarkSet, MIDDLE_MCP, MIDDLE_TIP, PINKY_MCP, PINKY_TIP, RING_MCP,
    RING_TIP, THUMB_MCP, THUMB_TIP, WRIST,
};

/// Curl ratio above which a finger counts as extended.
const EXTENDED_RATIO: f32 = 0.5;
/// Stand-in denominator when a segment collapses to zero length. Negative, like an
/// upright knuckle-to-wrist segment, so the finger leans towards "extended".
const DEGENERATE_DENOM: f32 = -0.01;
/// Index-thumb tip distance below which LAST3/LAST4 become a pinch.
const PINCH_DIST: f32 = 0.05;
/// Tip/base spread ratio above which FIRST2 is a V.
const V_SPREAD_RATIO: f32 = 1.7;
/// Index-middle depth delta below which FIRST2 counts as closed.
const CLOSED_DEPTH: f32 = 0.1;
/// Consecutive matches needed beyond the first frame before committing.
const COMMIT_RUN: u32 = 4;

/// (tip, base) pairs for index, middle, ring, pinky; ratios are taken against base→wrist.
const FINGERS: [(usize, usize); 4] = [
    (INDEX_TIP, INDEX_MCP),
    (MIDDLE_TIP, MIDDLE_MCP),
    (RING_TIP, RING_MCP),
    (PINKY_TIP, PINKY_MCP),
];

/// Which physical hand a gesture came from, relative to the configured dominant hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HandRole {
    Major,
    Minor,
}

/// 5-bit finger summary: bit 4 thumb, bits 3..0 index, middle, ring, pinky.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoseCode(u8);

impl PoseCode {
    pub const FIST: PoseCode = PoseCode(0b00000);
    pub const PINKY: PoseCode = PoseCode(0b00001);
    pub const RING: PoseCode = PoseCode(0b00010);
    pub const MID: PoseCode = PoseCode(0b00100);
    pub const LAST3: PoseCode = PoseCode(0b00111);
    pub const INDEX: PoseCode = PoseCode(0b01000);
    pub const FIRST2: PoseCode = PoseCode(0b01100);
    pub const LAST4: PoseCode = PoseCode(0b01111);
    pub const THUMB: PoseCode = PoseCode(0b10000);
    pub const PALM: PoseCode = PoseCode(0b11111);

    #[cfg(test)]
    pub fn from_bits(bits: u8) -> Self {
        Self(bits & 0b11111)
    }

    #[cfg(test)]
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Encode the finger states of one hand. The thumb bit is never set.
    pub fn encode(hand: &LandmarkSet) -> Self {
        let mut code = 0u8; // thumb
        for (tip, base) in FINGERS {
            let num = hand.signed_dist(tip, base);
            let mut denom = hand.signed_dist(base, WRIST);
            if denom.abs() < f32::EPSILON {
                denom = DEGENERATE_DENOM;
            }
            let ratio = round1(num / denom);
            code <<= 1;
            if ratio > EXTENDED_RATIO {
                code |= 1;
            }
        }
        Self(code)
    }
}

impl fmt::Display for PoseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:05b}", self.0)
    }
}

/// Round to one decimal place.
pub(crate) fn round1(v: f32) -> f32 {
    (v * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gesture {
    Fist,
    Pinky,
    Ring,
    Mid,
    Last3,
    Index,
    First2,
    Last4,
    Thumb,
    Palm,
    VGest,
    TwoFingerClosed,
    PinchMajor,
    PinchMinor,
    ThumbsUp,
    /// A pose code with no named gesture.
    Pose(PoseCode),
}

/// Pose codes that are gestures in their own right.
const POSE_TABLE: [(PoseCode, Gesture); 10] = [
    (PoseCode::FIST, Gesture::Fist),
    (PoseCode::PINKY, Gesture::Pinky),
    (PoseCode::RING, Gesture::Ring),
    (PoseCode::MID, Gesture::Mid),
    (PoseCode::LAST3, Gesture::Last3),
    (PoseCode::INDEX, Gesture::Index),
    (PoseCode::FIRST2, Gesture::First2),
    (PoseCode::LAST4, Gesture::Last4),
    (PoseCode::THUMB, Gesture::Thumb),
    (PoseCode::PALM, Gesture::Palm),
];

impl Gesture {
    pub fn from_pose(code: PoseCode) -> Self {
        POSE_TABLE
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, g)| *g)
            .unwrap_or(Gesture::Pose(code))
    }

    pub fn name(self) -> String {
        let s = match self {
            Gesture::Fist => "FIST",
            Gesture::Pinky => "PINKY",
            Gesture::Ring => "RING",
            Gesture::Mid => "MID",
            Gesture::Last3 => "LAST3",
            Gesture::Index => "INDEX",
            Gesture::First2 => "FIRST2",
            Gesture::Last4 => "LAST4",
            Gesture::Thumb => "THUMB",
            Gesture::Palm => "PALM",
            Gesture::VGest => "V_GEST",
            Gesture::TwoFingerClosed => "TWO_FINGER_CLOSED",
            Gesture::PinchMajor => "PINCH_MAJOR",
            Gesture::PinchMinor => "PINCH_MINOR",
            Gesture::ThumbsUp => "THUMBS_UP",
            Gesture::Pose(code) => return format!("POSE_{code}"),
        };
        s.to_string()
    }
}

impl fmt::Display for Gesture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl serde::Serialize for Gesture {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.name())
    }
}

/// Map a pose code to one gesture, disambiguating the codes that need geometry.
pub fn classify(code: PoseCode, role: HandRole, hand: &LandmarkSet) -> Gesture {
    if (code == PoseCode::LAST3 || code == PoseCode::LAST4)
        && hand.dist(INDEX_TIP, THUMB_TIP) < PINCH_DIST
    {
        return match role {
            HandRole::Major => Gesture::PinchMajor,
            HandRole::Minor => Gesture::PinchMinor,
        };
    }

    if code == PoseCode::FIRST2 {
        let mut base = hand.dist(INDEX_MCP, MIDDLE_MCP);
        if base < f32::EPSILON {
            base = DEGENERATE_DENOM.abs();
        }
        let spread = hand.dist(INDEX_TIP, MIDDLE_TIP) / base;
        return if spread > V_SPREAD_RATIO {
            Gesture::VGest
        } else if hand.depth_delta(INDEX_TIP, MIDDLE_TIP) < CLOSED_DEPTH {
            Gesture::TwoFingerClosed
        } else {
            Gesture::Mid
        };
    }

    if code == PoseCode::THUMB {
        let thumb_up = hand.point(THUMB_TIP).y < hand.point(THUMB_MCP).y;
        let index_down = hand.point(INDEX_TIP).y > hand.point(INDEX_MCP).y;
        return if thumb_up && index_down {
            Gesture::ThumbsUp
        } else {
            Gesture::Thumb
        };
    }

    Gesture::from_pose(code)
}

/// Holds a raw gesture back until it has been seen on enough consecutive frames.
#[derive(Debug, Clone)]
pub struct Debouncer {
    previous: Gesture,
    committed: Gesture,
    run: u32,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self {
            previous: Gesture::Palm,
            committed: Gesture::Palm,
            run: 0,
        }
    }
}

impl Debouncer {
    pub fn feed(&mut self, raw: Gesture) -> Gesture {
        if raw == self.previous {
            self.run = self.run.saturating_add(1);
        } else {
            self.run = 0;
        }
        self.previous = raw;
        if self.run > COMMIT_RUN {
            self.committed = raw;
        }
        self.committed
    }

    pub fn committed(&self) -> Gesture {
        self.committed
    }
}

/// Classification plus debounce state for one hand role.
#[derive(Debug, Clone)]
pub struct HandRecognizer {
    role: HandRole,
    debounce: Debouncer,
}

impl HandRecognizer {
    pub fn new(role: HandRole) -> Self {
        Self {
            role,
            debounce: Debouncer::default(),
        }
    }

    /// Classify this frame's hand and return the committed gesture.
    /// An absent hand reads as PALM and leaves the debounce state alone.
    pub fn observe(&mut self, hand: Option<&LandmarkSet>) -> Gesture {
        let Some(hand) = hand else {
            return Gesture::Palm;
        };
        let code = PoseCode::encode(hand);
        let raw = classify(code, self.role, hand);
        debug!("{:?}: pose {code} raw {raw}", self.role);
        self.debounce.feed(raw)
    }

    pub fn committed(&self) -> Gesture {
        self.debounce.committed()
    }
}
