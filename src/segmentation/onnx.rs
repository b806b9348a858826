use super::preprocess::{self, Preprocessor, TensorLayout};
use super::types::{BackendError, BackendErrorKind, Frame, Mask, PrimaryBackend};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Selfie-segmentation model running on ONNX Runtime
///
/// Masks are smoothed over time, so frames must arrive in order: a timestamp
/// that does not advance is rejected as stale.
pub struct OnnxSelfieSegmenter {
    model_path: PathBuf,
    session: Option<Session>,
    preprocessor: Preprocessor,
    temporal_smoothing: f32,
    previous: Vec<f32>,
    last_timestamp: Option<Duration>,
}

impl OnnxSelfieSegmenter {
    /// # Arguments
    /// * `model_path` - Path to the ONNX model file
    /// * `input_size` - Model input (width, height), 256x256 for MediaPipe selfie models
    /// * `layout` - Input tensor layout the model expects
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: (u32, u32), layout: TensorLayout) -> Self {
        Self {
            model_path: model_path.as_ref().to_path_buf(),
            session: None,
            preprocessor: Preprocessor::new(input_size.0, input_size.1, layout),
            temporal_smoothing: 0.0,
            previous: Vec::new(),
            last_timestamp: None,
        }
    }

    /// Weight of the previous frame's mask in [0, 0.99]
    pub fn with_temporal_smoothing(mut self, smoothing: f32) -> Self {
        self.temporal_smoothing = smoothing;
        self
    }

    fn build_session(&self, accelerated: bool) -> ort::Result<Session> {
        let builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?;

        #[cfg(feature = "cuda")]
        let builder = if accelerated {
            use ort::execution_providers::CUDAExecutionProvider;
            builder.with_execution_providers([CUDAExecutionProvider::default().build()])?
        } else {
            builder
        };
        #[cfg(not(feature = "cuda"))]
        let _ = accelerated;

        builder.commit_from_file(&self.model_path)
    }

    fn check_timestamp(&mut self, timestamp: Duration) -> Result<(), BackendError> {
        if let Some(last) = self.last_timestamp {
            if timestamp <= last {
                return Err(BackendError::new(
                    BackendErrorKind::StaleTimestamp,
                    format!("timestamp {timestamp:?} does not advance past {last:?}"),
                ));
            }
        }
        self.last_timestamp = Some(timestamp);
        Ok(())
    }
}

fn classify_ort_error(err: ort::Error) -> BackendError {
    // ONNX Runtime reports allocation failures only through the message
    BackendError::unclassified(format!("inference failed: {err}"))
}

impl PrimaryBackend for OnnxSelfieSegmenter {
    fn name(&self) -> &str {
        "onnx-selfie"
    }

    async fn init(&mut self) -> Result<(), BackendError> {
        if self.session.is_some() {
            return Ok(());
        }

        tracing::info!("Loading segmentation model from {}", self.model_path.display());

        let session = match self.build_session(true) {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!("Accelerated session failed ({}), retrying on CPU", err);
                self.build_session(false).map_err(|err| {
                    BackendError::init(format!(
                        "failed to load model from {}: {err}",
                        self.model_path.display()
                    ))
                })?
            }
        };

        tracing::info!("Segmentation model loaded successfully");
        self.session = Some(session);
        Ok(())
    }

    async fn infer(&mut self, frame: &Frame, timestamp: Duration) -> Result<Mask, BackendError> {
        let _span = tracing::debug_span!("onnx_infer").entered();

        self.check_timestamp(timestamp)?;

        let input = self.preprocessor.preprocess(frame);
        let (model_width, model_height) = self.preprocessor.input_size();
        let expected = (model_width * model_height) as usize;

        let session = self
            .session
            .as_mut()
            .ok_or_else(|| BackendError::init("inference requested before init"))?;

        let tensor = Tensor::from_array(input).map_err(classify_ort_error)?;
        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(classify_ort_error)?;

        let mut plane = None;
        for (_, value) in outputs.iter() {
            if let Ok((shape, data)) = value.try_extract_tensor::<f32>() {
                let shape: Vec<i64> = shape.iter().copied().collect();
                if let Some(values) = preprocess::person_plane(expected, &shape, data) {
                    plane = Some(values);
                    break;
                }
            }
        }

        let mut values = plane.ok_or_else(|| {
            BackendError::new(
                BackendErrorKind::InvalidOutput,
                "no model output matches the input resolution",
            )
        })?;

        if preprocess::looks_like_logits(&values) {
            preprocess::sigmoid_in_place(&mut values);
        }
        preprocess::smooth_temporally(&mut self.previous, &values, self.temporal_smoothing);

        let (frame_width, frame_height) = frame.dimensions();
        Ok(preprocess::probabilities_to_mask(
            &self.previous,
            model_width,
            model_height,
            frame_width,
            frame_height,
        ))
    }

    fn dispose(&mut self) {
        tracing::info!("Releasing segmentation model");
        self.session = None;
        self.previous.clear();
        self.last_timestamp = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_model_fails_init_on_every_provider() {
        let mut segmenter =
            OnnxSelfieSegmenter::new("/nonexistent/selfie.onnx", (256, 256), TensorLayout::Nhwc);

        let err = segmenter.init().await.unwrap_err();

        assert_eq!(err.kind, BackendErrorKind::Init);
        assert!(err.message.contains("/nonexistent/selfie.onnx"));
        assert!(segmenter.session.is_none());
    }

    #[tokio::test]
    async fn stale_timestamps_are_rejected_before_inference() {
        let mut segmenter =
            OnnxSelfieSegmenter::new("/nonexistent/selfie.onnx", (4, 4), TensorLayout::Nhwc);
        segmenter.check_timestamp(Duration::from_millis(10)).unwrap();

        let frame = Frame::new(4, 4);
        let err = segmenter
            .infer(&frame, Duration::from_millis(10))
            .await
            .unwrap_err();

        assert_eq!(err.kind, BackendErrorKind::StaleTimestamp);
    }
}
