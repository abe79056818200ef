use std::{
    fmt,
    path::{Path, PathBuf},
};

use ndarray::Array4;
use ort::{
    DynValue, GraphOptimizationLevel, PrimitiveTensorElementType, Session, TensorElementType,
    ValueType,
};
use tracing::{debug, info};

use super::{CaptionModel, ModelOutputs, OutputTensor};
use crate::{
    error::{InferenceError, StartupError},
    preprocess::INPUT_SHAPE,
};

/// Signature picked when a model directory exports more than one.
pub const DEFAULT_SIGNATURE: &str = "serving_default";

pub struct OnnxModelConfig {
    pub num_intra_thread: usize,
    pub optimization_level: GraphOptimizationLevel,
}

impl Default for OnnxModelConfig {
    fn default() -> Self {
        Self {
            num_intra_thread: 4,
            optimization_level: GraphOptimizationLevel::Level3,
        }
    }
}

/// Captioning model backed by an ONNX Runtime session.
pub struct OnnxCaptionModel {
    session: Session,
    signature: String,
    input_name: String,
}

impl OnnxCaptionModel {
    /// Load a model from a single `.onnx` file or from a directory of signatures.
    pub fn load(path: impl AsRef<Path>, config: OnnxModelConfig) -> Result<Self, StartupError> {
        let (signature, model_path) = select_signature(path.as_ref())?;
        info!(?model_path, %signature, "loading captioning model");

        let session = Session::builder()
            .and_then(|builder| builder.with_optimization_level(config.optimization_level))
            .and_then(|builder| builder.with_intra_threads(config.num_intra_thread))
            .and_then(|builder| builder.commit_from_file(&model_path))
            .map_err(|source| StartupError::Load {
                path: model_path.clone(),
                source,
            })?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| StartupError::NoInput {
                path: model_path.clone(),
            })?;

        debug!(
            %input_name,
            outputs = ?session.outputs.iter().map(|o| o.name.as_str()).collect::<Vec<_>>(),
            "model session ready"
        );

        Ok(Self {
            session,
            signature,
            input_name,
        })
    }
}

impl CaptionModel for OnnxCaptionModel {
    fn signature(&self) -> &str {
        &self.signature
    }

    fn infer(&self, input: Array4<f32>) -> Result<ModelOutputs, InferenceError> {
        if input.shape() != INPUT_SHAPE {
            return Err(InferenceError::Shape {
                expected: INPUT_SHAPE.to_vec(),
                actual: input.shape().to_vec(),
            });
        }

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input.view()]?)?;

        let mut result = ModelOutputs::new();
        for output in &self.session.outputs {
            let Some(value) = outputs.get(output.name.as_str()) else {
                continue;
            };
            result.push(output.name.clone(), to_output_tensor(value)?);
        }

        Ok(result)
    }
}

/// Tag one session output, rendering non-text tensors with their own element type.
fn to_output_tensor(value: &DynValue) -> Result<OutputTensor, InferenceError> {
    let ty = match value.dtype()? {
        ValueType::Tensor { ty, .. } => ty,
        // sequences and maps have no sensible caption; describe them instead
        other => return Ok(OutputTensor::Numeric(format!("{:?}", other))),
    };

    Ok(match ty {
        TensorElementType::String => OutputTensor::Text(value.try_extract_string_tensor()?),
        TensorElementType::Float32 => render::<f32>(value)?,
        TensorElementType::Float64 => render::<f64>(value)?,
        TensorElementType::Float16 => render::<half::f16>(value)?,
        TensorElementType::Bfloat16 => render::<half::bf16>(value)?,
        TensorElementType::Int8 => render::<i8>(value)?,
        TensorElementType::Int16 => render::<i16>(value)?,
        TensorElementType::Int32 => render::<i32>(value)?,
        TensorElementType::Int64 => render::<i64>(value)?,
        TensorElementType::Uint8 => render::<u8>(value)?,
        TensorElementType::Uint16 => render::<u16>(value)?,
        TensorElementType::Uint32 => render::<u32>(value)?,
        TensorElementType::Uint64 => render::<u64>(value)?,
        TensorElementType::Bool => render::<bool>(value)?,
    })
}

fn render<T>(value: &DynValue) -> Result<OutputTensor, InferenceError>
where
    T: PrimitiveTensorElementType + fmt::Display,
{
    Ok(OutputTensor::numeric(&value.try_extract_tensor::<T>()?))
}

/// Resolve the model file to load and the signature name it serves.
///
/// A file is its own signature. In a directory every `*.onnx` file is a
/// signature named after its stem; `serving_default` wins, otherwise the
/// first one in lexical order.
pub fn select_signature(path: &Path) -> Result<(String, PathBuf), StartupError> {
    if path.is_file() {
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_SIGNATURE.to_string());
        return Ok((name, path.to_path_buf()));
    }

    let mut candidates = std::fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "onnx"))
        .collect::<Vec<_>>();
    candidates.sort();

    let chosen = candidates
        .iter()
        .find(|p| p.file_stem().is_some_and(|stem| stem == DEFAULT_SIGNATURE))
        .or_else(|| candidates.first())
        .ok_or_else(|| StartupError::NoSignature {
            dir: path.to_path_buf(),
        })?;

    let name = chosen
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok((name, chosen.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("caption-server-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn serving_default_is_preferred() {
        let dir = scratch_dir();
        for name in ["a_first.onnx", "serving_default.onnx", "z_last.onnx", "notes.txt"] {
            std::fs::write(dir.join(name), b"").unwrap();
        }

        let (signature, path) = select_signature(&dir).unwrap();
        assert_eq!(signature, "serving_default");
        assert_eq!(path, dir.join("serving_default.onnx"));

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn falls_back_to_first_signature() {
        let dir = scratch_dir();
        for name in ["predict.onnx", "caption.onnx", "README.md"] {
            std::fs::write(dir.join(name), b"").unwrap();
        }

        let (signature, path) = select_signature(&dir).unwrap();
        assert_eq!(signature, "caption");
        assert_eq!(path, dir.join("caption.onnx"));

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn single_file_is_its_own_signature() {
        let dir = scratch_dir();
        let file = dir.join("image_caption.onnx");
        std::fs::write(&file, b"").unwrap();

        let (signature, path) = select_signature(&file).unwrap();
        assert_eq!(signature, "image_caption");
        assert_eq!(path, file);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn directory_without_signatures_is_rejected() {
        let dir = scratch_dir();
        std::fs::write(dir.join("saved_model.pb"), b"").unwrap();

        assert!(matches!(
            select_signature(&dir),
            Err(StartupError::NoSignature { .. })
        ));

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn unparseable_artifact_fails_to_load() {
        let dir = scratch_dir();
        let file = dir.join("broken.onnx");
        std::fs::write(&file, b"this is not a protobuf graph").unwrap();

        assert!(matches!(
            OnnxCaptionModel::load(&file, OnnxModelConfig::default()),
            Err(StartupError::Load { .. })
        ));

        std::fs::remove_dir_all(dir).unwrap();
    }
}
