use async_trait::async_trait;
use thiserror::Error;

/// Outcome of a forward pass: the winning class index and its probability.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassPrediction {
    pub class_index: usize,
    pub probability: f32,
}

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Image transformation error: {0}")]
    InvalidImage(String),
    #[error("Inference error: {0}")]
    InferenceFailed(String),
}

#[async_trait]
pub trait ModelService: Send + Sync + Clone + 'static {
    async fn predict(&self, image_data: Vec<u8>) -> Result<ClassPrediction, InferenceError>;
}
