//! Landmark frames from the external hand detector, one JSON object per line:
//!
//! `{"timestamp_ms": 12, "hands": [{"label": "Right", "landmarks": [[x, y, z], ...]}]}`

use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::landmarks::{LANDMARK_COUNT, Landmark, LandmarkSet};

const MAX_HANDS: usize = 2;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("hand {hand}: expected {expected} landmarks, got {count}", expected = LANDMARK_COUNT)]
    LandmarkCount { hand: usize, count: usize },

    #[error("expected at most {max} hands, got {0}", max = MAX_HANDS)]
    TooManyHands(usize),

    #[error("read error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Handedness {
    #[serde(rename = "left", alias = "Left", alias = "LEFT")]
    Left,
    #[serde(rename = "right", alias = "Right", alias = "RIGHT")]
    Right,
}

#[derive(Debug, Clone)]
pub struct DetectedHand {
    pub label: Handedness,
    pub landmarks: LandmarkSet,
}

#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub timestamp_ms: Option<u64>,
    pub hands: Vec<DetectedHand>,
}

#[derive(Deserialize)]
struct WireFrame {
    #[serde(default)]
    timestamp_ms: Option<u64>,
    #[serde(default)]
    hands: Vec<WireHand>,
}

#[derive(Deserialize)]
struct WireHand {
    label: Handedness,
    landmarks: Vec<[f32; 3]>,
}

impl FromStr for Frame {
    type Err = FrameError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let wire: WireFrame = serde_json::from_str(line)?;
        if wire.hands.len() > MAX_HANDS {
            return Err(FrameError::TooManyHands(wire.hands.len()));
        }
        let mut hands = Vec::with_capacity(wire.hands.len());
        for (i, h) in wire.hands.into_iter().enumerate() {
            let points: [[f32; 3]; LANDMARK_COUNT] =
                h.landmarks
                    .as_slice()
                    .try_into()
                    .map_err(|_| FrameError::LandmarkCount {
                        hand: i,
                        count: h.landmarks.len(),
                    })?;
            hands.push(DetectedHand {
                label: h.label,
                landmarks: LandmarkSet::new(points.map(|[x, y, z]| Landmark::new(x, y, z))),
            });
        }
        Ok(Frame {
            timestamp_ms: wire.timestamp_ms,
            hands,
        })
    }
}

/// Frame stream over any line source; blank lines are skipped.
pub struct FrameReader<R> {
    lines: io::Lines<R>,
}

impl<R: BufRead> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }
}

impl<R: BufRead> Iterator for FrameReader<R> {
    type Item = Result<Frame, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(l) => l,
                Err(e) => return Some(Err(e.into())),
            };
            if line.trim().is_empty() {
                continue;
            }
            return Some(line.parse());
        }
    }
}

/// Open a frame source: a file or FIFO when given, stdin otherwise.
pub fn open(path: Option<&Path>) -> io::Result<FrameReader<Box<dyn BufRead + Send>>> {
    let reader: Box<dyn BufRead + Send> = match path {
        Some(p) => Box::new(BufReader::new(File::open(p)?)),
        None => Box::new(BufReader::new(io::stdin())),
    };
    Ok(FrameReader::new(reader))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hand_json(label: &str, n: usize) -> String {
        let pts: Vec<String> = (0..n)
            .map(|i| format!("[{}, 0.5, 0.0]", i as f32 / 40.0))
            .collect();
        format!(r#"{{"label": "{label}", "landmarks": [{}]}}"#, pts.join(","))
    }

    #[test]
    fn test_parse_two_hands() {
        let line = format!(
            r#"{{"timestamp_ms": 40, "hands": [{}, {}]}}"#,
            hand_json("Right", 21),
            hand_json("left", 21)
        );
        let f: Frame = line.parse().unwrap();
        assert_eq!(f.timestamp_ms, Some(40));
        assert_eq!(f.hands.len(), 2);
        assert_eq!(f.hands[0].label, Handedness::Right);
        assert_eq!(f.hands[1].label, Handedness::Left);
        assert!((f.hands[0].landmarks.point(20).x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_empty_frame_is_valid() {
        let f: Frame = "{}".parse().unwrap();
        assert!(f.hands.is_empty());
        assert_eq!(f.timestamp_ms, None);
    }

    #[test]
    fn test_rejects_short_hand() {
        let line = format!(r#"{{"hands": [{}]}}"#, hand_json("Right", 20));
        assert!(matches!(
            line.parse::<Frame>(),
            Err(FrameError::LandmarkCount { hand: 0, count: 20 })
        ));
    }

    #[test]
    fn test_rejects_bad_label_and_garbage() {
        let line = format!(r#"{{"hands": [{}]}}"#, hand_json("Middle", 21));
        assert!(matches!(line.parse::<Frame>(), Err(FrameError::Json(_))));
        assert!(matches!("not json".parse::<Frame>(), Err(FrameError::Json(_))));
    }

    #[test]
    fn test_reader_skips_blank_lines_and_keeps_going() {
        let text = format!("{{}}\n\n garbage\n{{\"hands\": [{}]}}\n", hand_json("Right", 21));
        let results: Vec<_> = FrameReader::new(text.as_bytes()).collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap().hands.len(), 1);
    }
}
