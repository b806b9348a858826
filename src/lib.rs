//! Webcam subject overlay
//!
//! Captures camera frames, separates the person from the background with an
//! ONNX segmentation model (falling back to a skin-tone heuristic when the
//! model is unavailable or unreliable) and composites the cut-out subject
//! onto an output surface at a fixed cadence.

pub mod capture;
pub mod compositing;
pub mod config;
pub mod error;
pub mod output;
pub mod scheduler;
pub mod segmentation;
pub mod status;
