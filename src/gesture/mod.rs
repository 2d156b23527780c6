//! Gesture extraction
//!
//! Reduces detector output to the fingertip pair of each hand, decides which
//! hand drives which control, and measures the pinch distance.

use serde::{Deserialize, Serialize};

use crate::ml::{Hand, Handedness};

/// Hand landmark indices (MediaPipe hand landmark model convention)
#[allow(dead_code)]
pub mod landmarks {
    pub const WRIST: usize = 0;
    pub const THUMB_CMC: usize = 1;
    pub const THUMB_MCP: usize = 2;
    pub const THUMB_IP: usize = 3;
    pub const THUMB_TIP: usize = 4;
    pub const INDEX_FINGER_MCP: usize = 5;
    pub const INDEX_FINGER_PIP: usize = 6;
    pub const INDEX_FINGER_DIP: usize = 7;
    pub const INDEX_FINGER_TIP: usize = 8;
    pub const MIDDLE_FINGER_MCP: usize = 9;
    pub const MIDDLE_FINGER_PIP: usize = 10;
    pub const MIDDLE_FINGER_DIP: usize = 11;
    pub const MIDDLE_FINGER_TIP: usize = 12;
    pub const RING_FINGER_MCP: usize = 13;
    pub const RING_FINGER_PIP: usize = 14;
    pub const RING_FINGER_DIP: usize = 15;
    pub const RING_FINGER_TIP: usize = 16;
    pub const PINKY_MCP: usize = 17;
    pub const PINKY_PIP: usize = 18;
    pub const PINKY_DIP: usize = 19;
    pub const PINKY_TIP: usize = 20;

    /// Number of landmarks per hand
    pub const COUNT: usize = 21;
}

/// Pixel coordinate of a landmark
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// The two landmark indices whose distance drives a control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingertipPair(pub [usize; 2]);

impl Default for FingertipPair {
    fn default() -> Self {
        Self([landmarks::THUMB_TIP, landmarks::INDEX_FINGER_TIP])
    }
}

impl FingertipPair {
    pub fn contains(&self, index: usize) -> bool {
        self.0.contains(&index)
    }
}

/// How detected hands are routed to the brightness and volume controls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum HandAssignment {
    /// First detected hand is left, second is right. No handedness check.
    #[default]
    DetectionOrder,
    /// Use the detector's handedness label
    Handedness,
}

/// Hands selected for each control in one frame
#[derive(Debug, Clone, Copy, Default)]
pub struct AssignedHands<'a> {
    /// Drives brightness
    pub left: Option<&'a Hand>,
    /// Drives volume
    pub right: Option<&'a Hand>,
}

/// Pick the brightness and volume hands out of a frame's detections
pub fn assign_hands(hands: &[Hand], assignment: HandAssignment) -> AssignedHands<'_> {
    match assignment {
        HandAssignment::DetectionOrder => AssignedHands {
            left: hands.first(),
            right: hands.get(1),
        },
        HandAssignment::Handedness => AssignedHands {
            left: hands.iter().find(|h| h.handedness == Handedness::Left),
            right: hands.iter().find(|h| h.handedness == Handedness::Right),
        },
    }
}

/// Convert the fingertip pair of a hand to pixel coordinates, in landmark order
pub fn extract_fingertips(hand: &Hand, width: u32, height: u32, pair: FingertipPair) -> Vec<Point> {
    hand.landmarks
        .iter()
        .enumerate()
        .filter(|(idx, _)| pair.contains(*idx))
        .map(|(_, lm)| Point::new((lm.x * width as f32) as i32, (lm.y * height as f32) as i32))
        .collect()
}

/// Euclidean distance between the first two points, or 0 with fewer than two
pub fn pinch_distance(points: &[Point]) -> f32 {
    match points {
        [a, b, ..] => {
            let dx = (b.x - a.x) as f32;
            let dy = (b.y - a.y) as f32;
            dx.hypot(dy)
        }
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::HandLandmark;

    fn hand_with(handedness: Handedness, thumb: (f32, f32), index: (f32, f32)) -> Hand {
        let mut hand = Hand {
            handedness,
            ..Default::default()
        };
        hand.landmarks[landmarks::THUMB_TIP] = HandLandmark { x: thumb.0, y: thumb.1, z: 0.0 };
        hand.landmarks[landmarks::INDEX_FINGER_TIP] = HandLandmark { x: index.0, y: index.1, z: 0.0 };
        hand
    }

    #[test]
    fn test_distance_needs_two_points() {
        assert_eq!(pinch_distance(&[]), 0.0);
        assert_eq!(pinch_distance(&[Point::new(30, 40)]), 0.0);
    }

    #[test]
    fn test_distance_is_euclidean() {
        assert_eq!(pinch_distance(&[Point::new(0, 0), Point::new(100, 0)]), 100.0);
        assert_eq!(pinch_distance(&[Point::new(0, 0), Point::new(3, 4)]), 5.0);
        assert_eq!(pinch_distance(&[Point::new(3, 4), Point::new(0, 0)]), 5.0);
    }

    #[test]
    fn test_extract_keeps_only_fingertips_in_pixels() {
        let hand = hand_with(Handedness::Left, (0.5, 0.25), (0.999, 0.1));
        let points = extract_fingertips(&hand, 640, 480, FingertipPair::default());
        // Truncation, not rounding
        assert_eq!(points, vec![Point::new(320, 120), Point::new(639, 48)]);
    }

    #[test]
    fn test_extract_follows_landmark_order() {
        let hand = hand_with(Handedness::Left, (0.1, 0.1), (0.2, 0.2));
        let reversed = FingertipPair([landmarks::INDEX_FINGER_TIP, landmarks::THUMB_TIP]);
        let points = extract_fingertips(&hand, 100, 100, reversed);
        assert_eq!(points[0], Point::new(10, 10));
    }

    #[test]
    fn test_detection_order_assignment() {
        let hands = vec![
            hand_with(Handedness::Right, (0.0, 0.0), (0.1, 0.0)),
            hand_with(Handedness::Right, (0.0, 0.0), (0.2, 0.0)),
            hand_with(Handedness::Left, (0.0, 0.0), (0.3, 0.0)),
        ];
        let assigned = assign_hands(&hands, HandAssignment::DetectionOrder);
        assert!(std::ptr::eq(assigned.left.unwrap(), &hands[0]));
        assert!(std::ptr::eq(assigned.right.unwrap(), &hands[1]));
    }

    #[test]
    fn test_detection_order_single_hand_is_left() {
        let hands = vec![hand_with(Handedness::Right, (0.0, 0.0), (0.1, 0.0))];
        let assigned = assign_hands(&hands, HandAssignment::DetectionOrder);
        assert!(assigned.left.is_some());
        assert!(assigned.right.is_none());
    }

    #[test]
    fn test_handedness_assignment() {
        let hands = vec![
            hand_with(Handedness::Right, (0.0, 0.0), (0.1, 0.0)),
            hand_with(Handedness::Left, (0.0, 0.0), (0.2, 0.0)),
        ];
        let assigned = assign_hands(&hands, HandAssignment::Handedness);
        assert!(std::ptr::eq(assigned.left.unwrap(), &hands[1]));
        assert!(std::ptr::eq(assigned.right.unwrap(), &hands[0]));

        let none = assign_hands(&[], HandAssignment::Handedness);
        assert!(none.left.is_none() && none.right.is_none());
    }
}
