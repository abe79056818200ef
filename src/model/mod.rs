use std::fmt;

use ndarray::{Array4, ArrayBase, ArrayD, Data, Dimension};

use crate::error::InferenceError;

mod fetch;
mod loader;
mod onnx;

pub use fetch::*;
pub use loader::*;
pub use onnx::*;

/// One output tensor of a captioning model, tagged by element type once after inference.
///
/// Non-text tensors are rendered while their native element type is still
/// known, so an `i64` or `f64` output keeps its full precision.
#[derive(Debug, Clone)]
pub enum OutputTensor {
    Text(ArrayD<String>),
    Numeric(String),
}

impl OutputTensor {
    pub fn numeric<A, S, D>(array: &ArrayBase<S, D>) -> Self
    where
        A: fmt::Display,
        S: Data<Elem = A>,
        D: Dimension,
    {
        OutputTensor::Numeric(array.to_string())
    }
}

/// Named model outputs in the order the model declares them.
#[derive(Debug, Clone, Default)]
pub struct ModelOutputs(Vec<(String, OutputTensor)>);

impl ModelOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, tensor: OutputTensor) {
        self.0.push((name.into(), tensor));
    }

    pub fn with(mut self, name: impl Into<String>, tensor: OutputTensor) -> Self {
        self.push(name, tensor);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OutputTensor)> {
        self.0.iter().map(|(name, tensor)| (name.as_str(), tensor))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reduce the outputs to a caption.
    ///
    /// The first text output wins and its first batch element is the caption.
    /// Without any text output the first tensor is rendered as a string, which
    /// only happens when the model was exported with the wrong signature.
    pub fn into_caption(self) -> Result<String, InferenceError> {
        let text = self.0.iter().find_map(|(name, tensor)| match tensor {
            OutputTensor::Text(strings) => Some((name, strings)),
            OutputTensor::Numeric(_) => None,
        });

        if let Some((name, strings)) = text {
            return strings
                .iter()
                .next()
                .cloned()
                .ok_or_else(|| InferenceError::EmptyText(name.clone()));
        }

        match self.0.first() {
            Some((_, OutputTensor::Numeric(rendered))) => Ok(rendered.clone()),
            _ => Err(InferenceError::NoOutputs),
        }
    }
}

/// A loaded, inference-only captioning model.
///
/// Implementations take a `[1, 299, 299, 3]` tensor from [`crate::preprocess`]
/// and must be callable from many request tasks at once.
pub trait CaptionModel: Send + Sync {
    /// Name of the signature this model serves.
    fn signature(&self) -> &str;

    fn infer(&self, input: Array4<f32>) -> Result<ModelOutputs, InferenceError>;
}
