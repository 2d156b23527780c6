//! SSD anchors and palm box decoding for the palm detection model

/// SSD anchor generation parameters
#[derive(Debug, Clone)]
pub struct AnchorOptions {
    pub input_size: u32,
    pub min_scale: f32,
    pub max_scale: f32,
    pub anchor_offset: f32,
    pub strides: Vec<u32>,
    pub aspect_ratios: Vec<f32>,
    pub interpolated_scale_aspect_ratio: f32,
    pub fixed_anchor_size: bool,
}

impl AnchorOptions {
    /// Anchors of the 192x192 palm detection model (2016 anchors)
    pub fn palm_192() -> Self {
        Self {
            input_size: 192,
            min_scale: 0.148_437_5,
            max_scale: 0.75,
            anchor_offset: 0.5,
            strides: vec![8, 16, 16, 16],
            aspect_ratios: vec![1.0],
            interpolated_scale_aspect_ratio: 1.0,
            fixed_anchor_size: true,
        }
    }
}

/// Anchor center and size, normalized to the model input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub x_center: f32,
    pub y_center: f32,
    pub w: f32,
    pub h: f32,
}

fn calculate_scale(min_scale: f32, max_scale: f32, stride_index: usize, num_strides: usize) -> f32 {
    if num_strides == 1 {
        (min_scale + max_scale) * 0.5
    } else {
        min_scale + (max_scale - min_scale) * stride_index as f32 / (num_strides - 1) as f32
    }
}

/// Generate anchors; consecutive layers sharing a stride share one grid
pub fn generate_anchors(options: &AnchorOptions) -> Vec<Anchor> {
    let num_layers = options.strides.len();
    let mut anchors = Vec::new();
    let mut layer_id = 0;

    while layer_id < num_layers {
        let mut anchor_sizes: Vec<(f32, f32)> = Vec::new();

        let mut last_same_stride_layer = layer_id;
        while last_same_stride_layer < num_layers
            && options.strides[last_same_stride_layer] == options.strides[layer_id]
        {
            let scale = calculate_scale(
                options.min_scale,
                options.max_scale,
                last_same_stride_layer,
                num_layers,
            );
            for &ratio in &options.aspect_ratios {
                let ratio_sqrt = ratio.sqrt();
                anchor_sizes.push((scale / ratio_sqrt, scale * ratio_sqrt));
            }
            if options.interpolated_scale_aspect_ratio > 0.0 {
                let scale_next = if last_same_stride_layer == num_layers - 1 {
                    1.0
                } else {
                    calculate_scale(
                        options.min_scale,
                        options.max_scale,
                        last_same_stride_layer + 1,
                        num_layers,
                    )
                };
                let interpolated = (scale * scale_next).sqrt();
                let ratio_sqrt = options.interpolated_scale_aspect_ratio.sqrt();
                anchor_sizes.push((interpolated / ratio_sqrt, interpolated * ratio_sqrt));
            }
            last_same_stride_layer += 1;
        }

        let stride = options.strides[layer_id];
        let feature_map = options.input_size.div_ceil(stride);

        for y in 0..feature_map {
            for x in 0..feature_map {
                for &(h, w) in &anchor_sizes {
                    let (w, h) = if options.fixed_anchor_size { (1.0, 1.0) } else { (w, h) };
                    anchors.push(Anchor {
                        x_center: (x as f32 + options.anchor_offset) / feature_map as f32,
                        y_center: (y as f32 + options.anchor_offset) / feature_map as f32,
                        w,
                        h,
                    });
                }
            }
        }

        layer_id = last_same_stride_layer;
    }

    anchors
}

/// Number of keypoints emitted per palm
pub const PALM_KEYPOINTS: usize = 7;

/// Values per anchor in the regressor output: box (4) + keypoints (7 * 2)
pub const PALM_REGRESSOR_STRIDE: usize = 4 + PALM_KEYPOINTS * 2;

/// Palm box decoded from the detector, normalized to the square model input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PalmDetection {
    pub score: f32,
    pub x_center: f32,
    pub y_center: f32,
    pub width: f32,
    pub height: f32,
    /// 0 = wrist, 2 = middle finger MCP
    pub keypoints: [(f32, f32); PALM_KEYPOINTS],
}

impl PalmDetection {
    fn bounds(&self) -> (f32, f32, f32, f32) {
        (
            self.x_center - self.width / 2.0,
            self.y_center - self.height / 2.0,
            self.x_center + self.width / 2.0,
            self.y_center + self.height / 2.0,
        )
    }

    /// Intersection over union of two boxes
    pub fn iou(&self, other: &PalmDetection) -> f32 {
        let (ax0, ay0, ax1, ay1) = self.bounds();
        let (bx0, by0, bx1, by1) = other.bounds();
        let iw = (ax1.min(bx1) - ax0.max(bx0)).max(0.0);
        let ih = (ay1.min(by1) - ay0.max(by0)).max(0.0);
        let intersection = iw * ih;
        let union = self.width * self.height + other.width * other.height - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

/// Decode raw regressors and scores into palms above `min_score`
pub fn decode_palms(
    regressors: &[f32],
    scores: &[f32],
    anchors: &[Anchor],
    input_size: f32,
    min_score: f32,
) -> Vec<PalmDetection> {
    let mut palms = Vec::new();

    for (i, anchor) in anchors.iter().enumerate() {
        let Some(&raw_score) = scores.get(i) else { break };
        let score = super::sigmoid(raw_score);
        if score < min_score {
            continue;
        }
        let Some(raw) = regressors.get(i * PALM_REGRESSOR_STRIDE..(i + 1) * PALM_REGRESSOR_STRIDE)
        else {
            break;
        };

        let mut keypoints = [(0.0, 0.0); PALM_KEYPOINTS];
        for (k, keypoint) in keypoints.iter_mut().enumerate() {
            *keypoint = (
                raw[4 + k * 2] / input_size * anchor.w + anchor.x_center,
                raw[4 + k * 2 + 1] / input_size * anchor.h + anchor.y_center,
            );
        }

        palms.push(PalmDetection {
            score,
            x_center: raw[0] / input_size * anchor.w + anchor.x_center,
            y_center: raw[1] / input_size * anchor.h + anchor.y_center,
            width: raw[2] / input_size * anchor.w,
            height: raw[3] / input_size * anchor.h,
            keypoints,
        });
    }

    palms
}

/// Greedy non-maximum suppression, highest score first
pub fn non_max_suppression(mut palms: Vec<PalmDetection>, iou_threshold: f32, limit: usize) -> Vec<PalmDetection> {
    palms.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<PalmDetection> = Vec::new();
    for palm in palms {
        if kept.len() >= limit {
            break;
        }
        if kept.iter().all(|k| k.iou(&palm) <= iou_threshold) {
            kept.push(palm);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn palm(score: f32, x: f32, y: f32, size: f32) -> PalmDetection {
        PalmDetection {
            score,
            x_center: x,
            y_center: y,
            width: size,
            height: size,
            keypoints: [(x, y); PALM_KEYPOINTS],
        }
    }

    #[test]
    fn test_palm_anchor_count() {
        let anchors = generate_anchors(&AnchorOptions::palm_192());
        assert_eq!(anchors.len(), 2016);
        // First grid: 24x24 cells, 2 anchors per cell
        assert_eq!(anchors[0].x_center, 0.5 / 24.0);
        assert_eq!(anchors[1].x_center, 0.5 / 24.0);
        assert_eq!(anchors[2].x_center, 1.5 / 24.0);
        // Second grid: 12x12 cells, 6 anchors per cell
        assert_eq!(anchors[1152].x_center, 0.5 / 12.0);
        assert_eq!(anchors[1157].x_center, 0.5 / 12.0);
        assert_eq!(anchors[1158].x_center, 1.5 / 12.0);
        assert!(anchors.iter().all(|a| a.w == 1.0 && a.h == 1.0));
    }

    #[test]
    fn test_decode_filters_and_offsets() {
        let anchors = vec![
            Anchor { x_center: 0.25, y_center: 0.5, w: 1.0, h: 1.0 },
            Anchor { x_center: 0.75, y_center: 0.5, w: 1.0, h: 1.0 },
        ];
        let mut regressors = vec![0.0; 2 * PALM_REGRESSOR_STRIDE];
        regressors[0] = 19.2; // +0.1 in x
        regressors[2] = 48.0; // width 0.25
        regressors[3] = 96.0; // height 0.5
        regressors[4] = -19.2; // wrist x -0.1
        let scores = vec![5.0, -5.0];

        let palms = decode_palms(&regressors, &scores, &anchors, 192.0, 0.75);
        assert_eq!(palms.len(), 1);
        let p = palms[0];
        assert!((p.x_center - 0.35).abs() < 1e-6);
        assert!((p.y_center - 0.5).abs() < 1e-6);
        assert!((p.width - 0.25).abs() < 1e-6);
        assert!((p.height - 0.5).abs() < 1e-6);
        assert!((p.keypoints[0].0 - 0.15).abs() < 1e-6);
        assert!(p.score > 0.99);
    }

    #[test]
    fn test_decode_tolerates_short_outputs() {
        let anchors = generate_anchors(&AnchorOptions::palm_192());
        let palms = decode_palms(&[0.0; 18], &[10.0, 10.0], &anchors, 192.0, 0.5);
        assert_eq!(palms.len(), 1);
    }

    #[test]
    fn test_nms_keeps_best_of_overlapping() {
        let palms = vec![
            palm(0.8, 0.5, 0.5, 0.2),
            palm(0.9, 0.51, 0.5, 0.2),
            palm(0.85, 0.1, 0.1, 0.2),
        ];
        let kept = non_max_suppression(palms, 0.3, 2);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].score, 0.9);
        assert_eq!(kept[1].score, 0.85);
    }

    #[test]
    fn test_nms_respects_limit() {
        let palms = vec![
            palm(0.9, 0.1, 0.1, 0.1),
            palm(0.8, 0.5, 0.5, 0.1),
            palm(0.7, 0.9, 0.9, 0.1),
        ];
        assert_eq!(non_max_suppression(palms, 0.3, 2).len(), 2);
    }

    #[test]
    fn test_iou() {
        let a = palm(1.0, 0.5, 0.5, 0.2);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&palm(1.0, 0.9, 0.9, 0.2)), 0.0);
    }
}
