//! Two-stage ONNX hand detector: palm detection, then hand landmarks per palm

use ndarray::Array4;
use ort::session::Session;

use super::anchors::{self, AnchorOptions, PalmDetection, PALM_REGRESSOR_STRIDE};
use super::roi::{self, Letterbox, Roi};
use super::{image_to_tensor, sigmoid, DetectorError, Hand, HandDetector, HandLandmark, Handedness, TensorLayout};
use crate::camera::CameraFrame;
use crate::gesture::landmarks;
use crate::settings::DetectorSettings;

/// Palm detection model input size
const PALM_INPUT_SIZE: u32 = 192;
/// Hand landmark model input size
const LANDMARK_INPUT_SIZE: u32 = 224;
/// Palms overlapping more than this are the same palm
const PALM_NMS_IOU: f32 = 0.3;
/// A new palm overlapping a tracked hand this much is that hand
const TRACKED_OVERLAP_IOU: f32 = 0.5;

/// Hand detector backed by the MediaPipe palm and landmark models
pub struct OnnxHandDetector {
    palm: Session,
    landmark: Session,
    anchors: Vec<anchors::Anchor>,
    layout: TensorLayout,
    max_hands: usize,
    min_detection_confidence: f32,
    min_tracking_confidence: f32,
    /// Presence and handedness outputs need a sigmoid
    scores_are_logits: bool,
    /// Regions carried over from the previous frame's landmarks
    tracked: Vec<Roi>,
}

impl OnnxHandDetector {
    /// Initialize ONNX Runtime and load both models
    pub fn new(settings: &DetectorSettings) -> Result<Self, DetectorError> {
        let model_dir = super::find_model_dir(settings.model_dir.as_ref())?;
        log::info!("Model directory: {:?}", model_dir);

        let palm_path = model_dir.join(&settings.palm_model);
        if !palm_path.exists() {
            return Err(DetectorError::ModelNotFound(palm_path));
        }
        let landmark_path = model_dir.join(&settings.landmark_model);
        if !landmark_path.exists() {
            return Err(DetectorError::ModelNotFound(landmark_path));
        }

        ort::init()
            .with_name("HandControl")
            .commit()
            .map_err(|e| DetectorError::Runtime(format!("Failed to initialize ORT: {}", e)))?;

        let session_builder = Session::builder()
            .map_err(|e| DetectorError::Runtime(format!("Failed to create session builder: {}", e)))?
            .with_intra_threads(settings.intra_threads)
            .map_err(|e| DetectorError::Runtime(format!("Failed to set threads: {}", e)))?;

        let palm = session_builder
            .clone()
            .commit_from_file(&palm_path)
            .map_err(|e| DetectorError::Runtime(format!("Failed to load palm model: {}", e)))?;
        log::info!("Loaded palm detection model from {:?}", palm_path);

        let landmark = session_builder
            .commit_from_file(&landmark_path)
            .map_err(|e| DetectorError::Runtime(format!("Failed to load landmark model: {}", e)))?;
        log::info!("Loaded hand landmark model from {:?}", landmark_path);

        Ok(Self {
            palm,
            landmark,
            anchors: anchors::generate_anchors(&AnchorOptions::palm_192()),
            layout: settings.input_layout,
            max_hands: settings.max_hands,
            min_detection_confidence: settings.min_detection_confidence,
            min_tracking_confidence: settings.min_tracking_confidence,
            scores_are_logits: settings.landmark_scores_are_logits,
            tracked: Vec::new(),
        })
    }

    /// Run palm detection on the whole frame
    fn detect_palms(&mut self, frame: &CameraFrame) -> Result<Vec<Roi>, DetectorError> {
        let letterbox = Letterbox::for_frame(frame.width(), frame.height());
        let input = image_to_tensor(&letterbox.apply(&frame.image, PALM_INPUT_SIZE), self.layout);
        let outputs = run_model(&mut self.palm, input)?;

        let anchor_count = self.anchors.len();
        let regressors = outputs
            .iter()
            .find(|o| o.len() == anchor_count * PALM_REGRESSOR_STRIDE)
            .ok_or_else(|| DetectorError::UnexpectedOutput("palm regressors missing".to_string()))?;
        let scores = outputs
            .iter()
            .find(|o| o.len() == anchor_count)
            .ok_or_else(|| DetectorError::UnexpectedOutput("palm scores missing".to_string()))?;

        let palms = anchors::decode_palms(
            regressors,
            scores,
            &self.anchors,
            PALM_INPUT_SIZE as f32,
            self.min_detection_confidence,
        );
        let palms: Vec<PalmDetection> = anchors::non_max_suppression(palms, PALM_NMS_IOU, self.max_hands);

        Ok(palms.iter().map(|p| Roi::from_palm(p, &letterbox)).collect())
    }

    /// Run the landmark model on one region; `None` if no hand is present
    fn estimate_landmarks(&mut self, frame: &CameraFrame, region: &Roi) -> Result<Option<Hand>, DetectorError> {
        let crop = roi::crop_square(&frame.image, region, LANDMARK_INPUT_SIZE);
        let outputs = run_model(&mut self.landmark, image_to_tensor(&crop, self.layout))?;

        let coords = outputs
            .iter()
            .find(|o| o.len() == landmarks::COUNT * 3)
            .ok_or_else(|| DetectorError::UnexpectedOutput("hand landmarks missing".to_string()))?;
        let mut scalars = outputs.iter().filter(|o| o.len() == 1).map(|o| o[0]);
        let logits = self.scores_are_logits;
        let presence = probability(
            scalars
                .next()
                .ok_or_else(|| DetectorError::UnexpectedOutput("hand presence missing".to_string()))?,
            logits,
        );
        let handedness_score = scalars.next().map(|v| probability(v, logits)).unwrap_or(0.0);

        if presence < self.min_tracking_confidence {
            return Ok(None);
        }

        let (width, height) = (frame.width() as f32, frame.height() as f32);
        let scale = region.size / LANDMARK_INPUT_SIZE as f32;
        let mut hand_landmarks = [HandLandmark::default(); 21];
        for (i, lm) in hand_landmarks.iter_mut().enumerate() {
            let (x, y, z) = (coords[i * 3], coords[i * 3 + 1], coords[i * 3 + 2]);
            *lm = HandLandmark {
                x: (region.left() + x * scale) / width,
                y: (region.top() + y * scale) / height,
                z: z / LANDMARK_INPUT_SIZE as f32,
            };
        }

        Ok(Some(Hand {
            landmarks: hand_landmarks,
            confidence: presence,
            handedness: if handedness_score > 0.5 {
                Handedness::Right
            } else {
                Handedness::Left
            },
            handedness_score,
        }))
    }
}

impl HandDetector for OnnxHandDetector {
    fn detect(&mut self, frame: &CameraFrame) -> Result<Vec<Hand>, DetectorError> {
        let mut regions = std::mem::take(&mut self.tracked);

        // Palm detection only runs while hands are missing
        if regions.len() < self.max_hands {
            for palm in self.detect_palms(frame)? {
                if regions.len() >= self.max_hands {
                    break;
                }
                if regions.iter().all(|r| r.iou(&palm) <= TRACKED_OVERLAP_IOU) {
                    regions.push(palm);
                }
            }
        }

        let mut hands: Vec<Hand> = Vec::new();
        let mut next_regions: Vec<Roi> = Vec::new();
        for region in &regions {
            let Some(hand) = self.estimate_landmarks(frame, region)? else { continue };
            let next = Roi::from_landmarks(&hand, frame.width(), frame.height());
            // Two regions converged on the same hand
            if next_regions.iter().any(|r| r.iou(&next) > TRACKED_OVERLAP_IOU) {
                continue;
            }
            next_regions.push(next);
            hands.push(hand);
        }

        log::debug!(
            "Frame {}: {} region(s), {} hand(s)",
            frame.frame_number,
            regions.len(),
            hands.len()
        );

        self.tracked = next_regions;
        Ok(hands)
    }
}

/// Landmark model score as a probability
fn probability(value: f32, logits: bool) -> f32 {
    if logits {
        sigmoid(value)
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Run a single-input model and copy every output out as a flat f32 vector
fn run_model(session: &mut Session, input: Array4<f32>) -> Result<Vec<Vec<f32>>, DetectorError> {
    let input_tensor = ort::value::Tensor::from_array(input)
        .map_err(|e| DetectorError::Runtime(format!("Failed to create tensor: {}", e)))?;

    let outputs = session
        .run(ort::inputs![input_tensor])
        .map_err(|e| DetectorError::Runtime(format!("Inference failed: {}", e)))?;

    let values = outputs
        .iter()
        .map(|(_, value)| {
            value
                .try_extract_tensor::<f32>()
                .map(|(_shape, data)| data.to_vec())
                .map_err(|e| DetectorError::Runtime(format!("Failed to extract output: {}", e)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probability_passthrough() {
        assert_eq!(probability(0.3, false), 0.3);
        assert_eq!(probability(1.0, false), 1.0);
        assert_eq!(probability(1.2, false), 1.0);
        assert_eq!(probability(-0.5, false), 0.0);
    }

    #[test]
    fn test_probability_logits_always_squashed() {
        // A logit of 0.9 is about 0.71, below the default 0.75 threshold
        let p = probability(0.9, true);
        assert!(p > 0.7 && p < 0.75);
        assert_eq!(probability(0.0, true), 0.5);
        assert!(probability(4.0, true) > 0.98);
        assert!(probability(-4.0, true) < 0.02);
    }
}
