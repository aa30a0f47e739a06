//! YOLO face detector using ONNX Runtime via `ort`.
//!
//! Handles model loading through [`ModelLoader`], letterbox preprocessing,
//! inference and candidate merging through the domain's box merger.
use std::path::Path;

use ort::session::Session;

use crate::detection::domain::box_merger::{merge_candidates, Candidate};
use crate::detection::domain::detection_params::DetectionParams;
use crate::detection::domain::face_detector::{DetectionError, DetectorInitError, FaceDetector};
use crate::shared::face_box::FaceBox;
use crate::shared::frame::Frame;

use super::execution_provider::accelerated_providers;
use super::model_loader::ModelLoader;
use super::model_resolver::ModelOrigin;

/// Fallback model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// Download progress sink: `(bytes_downloaded, total_bytes)`.
pub type InitProgressFn = Box<dyn Fn(u64, u64) + Send>;

pub struct OnnxFaceDetector {
    loader: ModelLoader,
    params: DetectionParams,
    session: Option<Session>,
    input_size: u32,
    on_progress: Option<InitProgressFn>,
}

impl OnnxFaceDetector {
    /// The model is not loaded until [`FaceDetector::initialize`].
    pub fn new(loader: ModelLoader, params: DetectionParams) -> Self {
        Self {
            loader,
            params,
            session: None,
            input_size: DEFAULT_INPUT_SIZE,
            on_progress: None,
        }
    }

    pub fn with_progress(mut self, on_progress: InitProgressFn) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    pub fn params(&self) -> &DetectionParams {
        &self.params
    }
}

impl FaceDetector for OnnxFaceDetector {
    fn initialize(&mut self) -> Result<(), DetectorInitError> {
        if self.session.is_some() {
            return Ok(());
        }

        let on_progress = |dl: u64, total: u64| {
            if let Some(ref cb) = self.on_progress {
                cb(dl, total);
            }
        };
        let resolved = self
            .loader
            .wait(&on_progress)
            .map_err(DetectorInitError::ModelUnavailable)?;

        let session = match load_session(&resolved.path) {
            Ok(session) => session,
            Err(e) if resolved.origin == ModelOrigin::Bundled => return Err(e),
            Err(e) => {
                log::warn!(
                    "Cached model {} failed to load ({e}); fetching again",
                    resolved.path.display()
                );
                let fresh = self
                    .loader
                    .refetch(&resolved)
                    .map_err(|e| DetectorInitError::ModelUnavailable(e.to_string()))?;
                load_session(&fresh.path)?
            }
        };

        self.input_size = input_size_of(&session);
        log::info!(
            "Face detector ready (input {}x{})",
            self.input_size,
            self.input_size
        );
        self.session = Some(session);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.session.is_some()
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceBox>, DetectionError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(Vec::new());
        };
        if frame.is_empty() {
            return Ok(Vec::new());
        }

        let (input_tensor, scale, pad_x, pad_y) = letterbox(frame, self.input_size);

        let input_value = ort::value::Tensor::from_array(input_tensor)
            .map_err(|e| DetectionError::Inference(ort_error(e)))?;
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| DetectionError::Inference(ort_error(e)))?;
        if outputs.len() == 0 {
            return Err(DetectionError::UnexpectedOutput(
                "model produced no outputs".into(),
            ));
        }
        let tensor = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| DetectionError::Inference(ort_error(e)))?;
        let shape = tensor.shape().to_vec();
        let data = tensor
            .as_slice()
            .ok_or_else(|| DetectionError::UnexpectedOutput("non-contiguous tensor".into()))?;

        let candidates = parse_candidates(data, &shape, scale, pad_x, pad_y)?;
        Ok(merge_candidates(candidates, &self.params))
    }
}

fn load_session(path: &Path) -> Result<Session, DetectorInitError> {
    let session = Session::builder()
        .map_err(|e| DetectorInitError::Load(ort_error(e)))?
        .with_execution_providers(accelerated_providers())
        .map_err(|e| DetectorInitError::Load(ort_error(e)))?
        .commit_from_file(path)
        .map_err(|e| DetectorInitError::Load(ort_error(e)))?;
    Ok(session)
}

fn ort_error(e: impl std::fmt::Display) -> Box<dyn std::error::Error + Send + Sync> {
    e.to_string().into()
}

/// Reads the square input size from the model's NCHW input shape.
fn input_size_of(session: &Session) -> u32 {
    session
        .inputs()
        .first()
        .and_then(|input| {
            if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                if shape.len() >= 4 && shape[2] > 0 {
                    Some(shape[2] as u32)
                } else {
                    None
                }
            } else {
                None
            }
        })
        .unwrap_or(DEFAULT_INPUT_SIZE)
}

/// Maps raw rows `[cx, cy, w, h, conf, ...]` back to frame coordinates.
///
/// Output shape is `[1, features, detections]` (transposed) or
/// `[1, detections, features]`; both are accepted.
fn parse_candidates(
    data: &[f32],
    shape: &[usize],
    scale: f64,
    pad_x: u32,
    pad_y: u32,
) -> Result<Vec<Candidate>, DetectionError> {
    if shape.len() != 3 {
        return Err(DetectionError::UnexpectedOutput(format!(
            "output shape {shape:?}"
        )));
    }
    let transposed = shape[1] < shape[2];
    let (num_dets, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if num_feats < 5 || data.len() < num_dets * num_feats {
        return Err(DetectionError::UnexpectedOutput(format!(
            "output shape {shape:?} with {} values",
            data.len()
        )));
    }

    let at = |det: usize, feat: usize| -> f64 {
        if transposed {
            data[feat * num_dets + det] as f64
        } else {
            data[det * num_feats + feat] as f64
        }
    };

    let px = pad_x as f64;
    let py = pad_y as f64;
    let candidates = (0..num_dets)
        .map(|i| {
            let (cx, cy, w, h) = (at(i, 0), at(i, 1), at(i, 2), at(i, 3));
            Candidate::new(
                ((cx - w / 2.0) - px) / scale,
                ((cy - h / 2.0) - py) / scale,
                ((cx + w / 2.0) - px) / scale,
                ((cy + h / 2.0) - py) / scale,
                at(i, 4),
            )
        })
        .collect();
    Ok(candidates)
}

/// Letterbox-resize a frame to `target_size` x `target_size`, RGB order.
///
/// Returns `(NCHW float32 tensor, scale, pad_x, pad_y)`.
fn letterbox(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, f64, u32, u32) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    // Padding is 114/255 gray, the YOLO convention.
    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;
    let rgb = frame.format().rgb_offsets();

    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for (c, &offset) in rgb.iter().enumerate() {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, offset]] as f32 / 255.0;
            }
        }
    }

    (tensor, scale, pad_x, pad_y)
}
