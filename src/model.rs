use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{fs, path::Path, sync::Arc};
use thiserror::Error;

/// Width of the one-hot hour encoding every model consumes.
pub const IN_DIM: usize = 24;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("feature length mismatch: got {got}, expected {expected}")]
    InputShape { got: usize, expected: usize },
    #[error("model produced no class scores")]
    EmptyOutput,
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Opaque trained classifier: one score per class for a single input row.
pub trait Classifier: Send + Sync {
    fn scores(&self, input: &[f32]) -> Result<Vec<f32>, ModelError>;

    fn name(&self) -> &str;
}

// ---------- Dense (JSON export) ----------

#[derive(Deserialize)]
struct DenseJson {
    /// `[classes][IN_DIM]`
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
}

/// Single dense layer with softmax, exported from the training notebook as JSON.
#[derive(Debug, Clone)]
pub struct DenseModel {
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
}

impl DenseModel {
    pub fn new(weights: Vec<Vec<f32>>, bias: Vec<f32>) -> Result<Self> {
        if weights.is_empty() {
            bail!("dense model has no output classes");
        }
        if weights.len() != bias.len() {
            bail!(
                "weights have {} rows but bias has {} entries",
                weights.len(),
                bias.len()
            );
        }
        if let Some((i, row)) = weights.iter().enumerate().find(|(_, r)| r.len() != IN_DIM) {
            bail!("weight row {} has {} columns, expected {}", i, row.len(), IN_DIM);
        }
        Ok(Self { weights, bias })
    }

    pub fn from_json_str(txt: &str) -> Result<Self> {
        let raw: DenseJson = serde_json::from_str(txt).context("failed to parse dense model JSON")?;
        Self::new(raw.weights, raw.bias)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let txt = fs::read_to_string(path)
            .with_context(|| format!("failed to read model at {}", path.display()))?;
        Self::from_json_str(&txt)
    }
}

impl Classifier for DenseModel {
    fn scores(&self, input: &[f32]) -> Result<Vec<f32>, ModelError> {
        if input.len() != IN_DIM {
            return Err(ModelError::InputShape {
                got: input.len(),
                expected: IN_DIM,
            });
        }

        let logits: Vec<f32> = self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(input).map(|(w, x)| w * x).sum::<f32>() + b)
            .collect();

        if logits.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::Inference("non-finite logit".into()));
        }
        Ok(softmax(&logits))
    }

    fn name(&self) -> &str {
        "dense"
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exp: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exp.iter().sum();
    exp.into_iter().map(|v| v / sum).collect()
}

// ---------- TorchScript ----------

#[cfg(feature = "torch")]
pub use torch::TorchModel;

#[cfg(feature = "torch")]
mod torch {
    use super::{Classifier, ModelError, IN_DIM};
    use anyhow::{Context, Result};
    use parking_lot::Mutex;
    use std::path::Path;
    use tch::{CModule, Device, Kind, Tensor};

    /// TorchScript classifier. libtorch modules are not guaranteed reentrant,
    /// so forwards go through a mutex.
    pub struct TorchModel {
        module: Mutex<CModule>,
        device: Device,
    }

    impl TorchModel {
        pub fn load(path: &Path) -> Result<Self> {
            let device = Device::Cpu;
            let module = CModule::load_on_device(path, device)
                .with_context(|| format!("failed to load TorchScript {}", path.display()))?;
            Ok(Self {
                module: Mutex::new(module),
                device,
            })
        }
    }

    impl Classifier for TorchModel {
        fn scores(&self, input: &[f32]) -> Result<Vec<f32>, ModelError> {
            if input.len() != IN_DIM {
                return Err(ModelError::InputShape {
                    got: input.len(),
                    expected: IN_DIM,
                });
            }
            let x = Tensor::from_slice(input)
                .reshape([1, IN_DIM as i64])
                .to_device(self.device);

            // Forward: [1, classes]
            let out = self
                .module
                .lock()
                .forward_ts(&[x])
                .map_err(|e| ModelError::Inference(e.to_string()))?;
            let flat = out.to_kind(Kind::Float).reshape([-1]);
            Vec::<f32>::try_from(&flat).map_err(|e| ModelError::Inference(e.to_string()))
        }

        fn name(&self) -> &str {
            "torchscript"
        }
    }
}

// ---------- Loading ----------

fn is_torchscript(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("pt") | Some("ts")
    )
}

/// Load a classifier from disk, picking the backend from the file extension,
/// and run a warm-up forward. Returns the model and its class count.
pub fn load_model(path: &Path) -> Result<(Arc<dyn Classifier>, usize)> {
    let model: Arc<dyn Classifier> = if is_torchscript(path) {
        load_torch(path)?
    } else {
        Arc::new(DenseModel::load(path)?)
    };
    let n_classes = warmup(model.as_ref())?;
    Ok((model, n_classes))
}

#[cfg(feature = "torch")]
fn load_torch(path: &Path) -> Result<Arc<dyn Classifier>> {
    Ok(Arc::new(TorchModel::load(path)?))
}

#[cfg(not(feature = "torch"))]
fn load_torch(path: &Path) -> Result<Arc<dyn Classifier>> {
    bail!(
        "{} is a TorchScript model but this build lacks the `torch` feature",
        path.display()
    )
}

/// Forward an all-zero hour vector and check the output has at least one class.
pub fn warmup(model: &dyn Classifier) -> Result<usize> {
    let scores = model
        .scores(&[0.0; IN_DIM])
        .with_context(|| format!("warm-up forward failed for {} model", model.name()))?;
    if scores.is_empty() {
        bail!(ModelError::EmptyOutput);
    }
    Ok(scores.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn identity_like(classes: usize) -> (Vec<Vec<f32>>, Vec<f32>) {
        // class = hour % classes gets the largest weight
        let weights = (0..classes)
            .map(|c| (0..IN_DIM).map(|h| if h % classes == c { 5.0 } else { 0.0 }).collect())
            .collect();
        (weights, vec![0.0; classes])
    }

    #[test]
    fn test_dense_scores_are_probabilities() {
        let (w, b) = identity_like(3);
        let model = DenseModel::new(w, b).unwrap();

        let mut x = [0.0f32; IN_DIM];
        x[4] = 1.0;
        let scores = model.scores(&x).unwrap();

        assert_eq!(scores.len(), 3);
        assert!((scores.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        let best = scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(best, Some(1));
    }

    #[test]
    fn test_dense_rejects_bad_shapes() {
        assert!(DenseModel::new(vec![], vec![]).is_err());
        assert!(DenseModel::new(vec![vec![0.0; IN_DIM]], vec![0.0, 1.0]).is_err());
        assert!(DenseModel::new(vec![vec![0.0; 23]], vec![0.0]).is_err());

        let (w, b) = identity_like(3);
        let model = DenseModel::new(w, b).unwrap();
        assert!(matches!(
            model.scores(&[0.0; 5]),
            Err(ModelError::InputShape { got: 5, expected: IN_DIM })
        ));
    }

    #[test]
    fn test_load_from_file_with_warmup() {
        let (w, b) = identity_like(3);
        let json = serde_json::json!({ "weights": w, "bias": b });

        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, "{}", json).unwrap();

        let (model, n_classes) = load_model(file.path()).unwrap();
        assert_eq!(n_classes, 3);
        assert_eq!(model.name(), "dense");
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = load_model(Path::new("/nonexistent/model.json")).err().unwrap();
        assert!(err.to_string().contains("failed to read model"));
    }

    #[cfg(not(feature = "torch"))]
    #[test]
    fn test_torchscript_needs_feature() {
        assert!(load_model(Path::new("models/model.pt")).is_err());
    }
}
