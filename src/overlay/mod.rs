//! Preview overlay
//!
//! Hand skeletons are drawn straight into the frame pixels; the feedback
//! text is produced here and painted by the UI layer.

use image::{Rgba, RgbaImage};

use crate::control::ControlLevels;
use crate::gesture::landmarks::*;
use crate::ml::Hand;

/// Skeleton edges between landmark indices
pub const HAND_CONNECTIONS: [(usize, usize); 21] = [
    // Thumb
    (WRIST, THUMB_CMC),
    (THUMB_CMC, THUMB_MCP),
    (THUMB_MCP, THUMB_IP),
    (THUMB_IP, THUMB_TIP),
    // Index
    (WRIST, INDEX_FINGER_MCP),
    (INDEX_FINGER_MCP, INDEX_FINGER_PIP),
    (INDEX_FINGER_PIP, INDEX_FINGER_DIP),
    (INDEX_FINGER_DIP, INDEX_FINGER_TIP),
    // Middle
    (INDEX_FINGER_MCP, MIDDLE_FINGER_MCP),
    (MIDDLE_FINGER_MCP, MIDDLE_FINGER_PIP),
    (MIDDLE_FINGER_PIP, MIDDLE_FINGER_DIP),
    (MIDDLE_FINGER_DIP, MIDDLE_FINGER_TIP),
    // Ring
    (MIDDLE_FINGER_MCP, RING_FINGER_MCP),
    (RING_FINGER_MCP, RING_FINGER_PIP),
    (RING_FINGER_PIP, RING_FINGER_DIP),
    (RING_FINGER_DIP, RING_FINGER_TIP),
    // Pinky and palm base
    (RING_FINGER_MCP, PINKY_MCP),
    (WRIST, PINKY_MCP),
    (PINKY_MCP, PINKY_PIP),
    (PINKY_PIP, PINKY_DIP),
    (PINKY_DIP, PINKY_TIP),
];

pub const CONNECTION_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);
pub const LANDMARK_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
/// Feedback text color (RGB)
pub const TEXT_COLOR: [u8; 3] = [0, 255, 0];

const CONNECTION_THICKNESS: i32 = 2;
const LANDMARK_RADIUS: i32 = 2;

/// Frame-pixel anchors of the two feedback lines
pub const BRIGHTNESS_TEXT_POS: (f32, f32) = (10.0, 30.0);
pub const VOLUME_TEXT_POS: (f32, f32) = (10.0, 60.0);

/// Feedback lines shown every frame
pub fn feedback_lines(levels: &ControlLevels) -> [String; 2] {
    [
        format!("Brightness: {}%", levels.brightness),
        format!("Volume: {}", levels.volume as i32),
    ]
}

/// Draw one hand's skeleton and landmark dots onto the frame
///
/// Non-finite landmarks are skipped along with their connections.
pub fn draw_hand(image: &mut RgbaImage, hand: &Hand) {
    let (w, h) = (image.width() as f32, image.height() as f32);
    let points: Vec<Option<(i32, i32)>> = hand
        .landmarks
        .iter()
        .map(|lm| landmark_pixel(lm.x, lm.y, w, h))
        .collect();

    for &(a, b) in &HAND_CONNECTIONS {
        if let (Some(from), Some(to)) = (points[a], points[b]) {
            draw_line(image, from, to, CONNECTION_THICKNESS, CONNECTION_COLOR);
        }
    }
    for p in points.into_iter().flatten() {
        fill_circle(image, p, LANDMARK_RADIUS, LANDMARK_COLOR);
    }
}

/// Normalized landmark to pixel, clamped to one frame size beyond each edge
fn landmark_pixel(x: f32, y: f32, w: f32, h: f32) -> Option<(i32, i32)> {
    if !x.is_finite() || !y.is_finite() {
        return None;
    }
    let margin = w.max(h);
    Some((
        (x * w).clamp(-margin, w + margin) as i32,
        (y * h).clamp(-margin, h + margin) as i32,
    ))
}

fn put_pixel_clipped(image: &mut RgbaImage, x: i32, y: i32, color: Rgba<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, color);
    }
}

/// Bresenham line stamped with a square brush
fn draw_line(image: &mut RgbaImage, from: (i32, i32), to: (i32, i32), thickness: i32, color: Rgba<u8>) {
    let (mut x, mut y) = from;
    let dx = (to.0 - x).abs();
    let dy = -(to.1 - y).abs();
    let sx = if x < to.0 { 1 } else { -1 };
    let sy = if y < to.1 { 1 } else { -1 };
    let mut err = dx + dy;
    let lo = -(thickness - 1) / 2;
    let hi = thickness / 2;

    loop {
        for oy in lo..=hi {
            for ox in lo..=hi {
                put_pixel_clipped(image, x + ox, y + oy, color);
            }
        }
        if x == to.0 && y == to.1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

fn fill_circle(image: &mut RgbaImage, center: (i32, i32), radius: i32, color: Rgba<u8>) {
    for oy in -radius..=radius {
        for ox in -radius..=radius {
            if ox * ox + oy * oy <= radius * radius {
                put_pixel_clipped(image, center.0 + ox, center.1 + oy, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::HandLandmark;

    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

    #[test]
    fn test_connections_reference_valid_landmarks() {
        for &(a, b) in &HAND_CONNECTIONS {
            assert!(a < COUNT && b < COUNT);
            assert_ne!(a, b);
        }
        // Every landmark is part of the skeleton
        for i in 0..COUNT {
            assert!(HAND_CONNECTIONS.iter().any(|&(a, b)| a == i || b == i));
        }
    }

    #[test]
    fn test_feedback_text() {
        let levels = ControlLevels { brightness: 29, volume: -12.7 };
        assert_eq!(feedback_lines(&levels), ["Brightness: 29%".to_string(), "Volume: -12".to_string()]);
        assert_eq!(feedback_lines(&ControlLevels::default())[0], "Brightness: 50%");
    }

    #[test]
    fn test_draw_line_covers_endpoints() {
        let mut image = RgbaImage::from_pixel(20, 20, BLACK);
        draw_line(&mut image, (2, 2), (15, 9), 2, CONNECTION_COLOR);
        assert_eq!(*image.get_pixel(2, 2), CONNECTION_COLOR);
        assert_eq!(*image.get_pixel(15, 9), CONNECTION_COLOR);
        assert_eq!(*image.get_pixel(19, 0), BLACK);
    }

    #[test]
    fn test_draw_hand_marks_landmarks_and_clips() {
        let mut image = RgbaImage::from_pixel(100, 100, BLACK);
        let mut hand = Hand::default();
        for (i, lm) in hand.landmarks.iter_mut().enumerate() {
            *lm = HandLandmark { x: 0.1 + 0.04 * i as f32, y: 0.5, z: 0.0 };
        }
        // Off-frame landmark must not panic
        hand.landmarks[PINKY_TIP] = HandLandmark { x: 1.5, y: -0.2, z: 0.0 };
        draw_hand(&mut image, &hand);

        assert_eq!(*image.get_pixel(10, 50), LANDMARK_COLOR);
        assert_eq!(*image.get_pixel(10, 52), LANDMARK_COLOR);
        assert_eq!(*image.get_pixel(0, 0), BLACK);
    }

    #[test]
    fn test_landmark_pixel_rejects_and_clamps() {
        assert_eq!(landmark_pixel(0.5, 0.25, 100.0, 80.0), Some((50, 20)));
        assert_eq!(landmark_pixel(f32::NAN, 0.5, 100.0, 80.0), None);
        assert_eq!(landmark_pixel(0.5, f32::INFINITY, 100.0, 80.0), None);
        assert_eq!(landmark_pixel(1e12, -1e12, 100.0, 80.0), Some((200, -100)));
    }

    #[test]
    fn test_draw_hand_survives_degenerate_landmarks() {
        let mut image = RgbaImage::from_pixel(100, 100, BLACK);
        let mut hand = Hand::default();
        for (i, lm) in hand.landmarks.iter_mut().enumerate() {
            *lm = HandLandmark { x: 0.1 + 0.04 * i as f32, y: 0.5, z: 0.0 };
        }
        hand.landmarks[INDEX_FINGER_TIP] = HandLandmark { x: f32::NAN, y: 0.5, z: 0.0 };
        hand.landmarks[THUMB_TIP] = HandLandmark { x: 0.5, y: f32::NEG_INFINITY, z: 0.0 };
        hand.landmarks[PINKY_TIP] = HandLandmark { x: 1e12, y: 0.5, z: 0.0 };
        draw_hand(&mut image, &hand);

        assert_eq!(*image.get_pixel(10, 50), LANDMARK_COLOR);
        // Pinky's last segment runs off the right edge
        assert_eq!(*image.get_pixel(99, 50), CONNECTION_COLOR);
        assert_eq!(*image.get_pixel(50, 0), BLACK);
    }
}
