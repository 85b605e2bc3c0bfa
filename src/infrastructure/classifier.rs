//! Pre-trained `SignalClassifier` (spec §4.6, §B.6). Weights are loaded
//! once at startup and never retrained here; before loading, the model
//! file's bytes are hashed and compared against a registry of known-good
//! SHA-256 digests so a swapped or corrupted model file fails startup
//! instead of silently scoring with the wrong weights.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use ort::session::Session;
use tracing::{info, warn};

use crate::domain::ids::sha256_hex;
use crate::domain::ports::SignalClassifier;

/// Loads an ONNX model after verifying its digest against `allowed_hashes`.
/// `Score(features) -> prob_up` is the entire runtime surface; there is no
/// training path in this binary.
pub struct OrtSignalClassifier {
    session: Mutex<Session>,
}

impl OrtSignalClassifier {
    pub fn load(model_path: &Path, allowed_hashes: &[String]) -> Result<Self> {
        let bytes = std::fs::read(model_path)
            .with_context(|| format!("failed to read model file {}", model_path.display()))?;
        let digest = sha256_hex(&bytes);
        if !allowed_hashes.iter().any(|h| h.eq_ignore_ascii_case(&digest)) {
            anyhow::bail!(
                "model file {} has digest {} which is not in the registry",
                model_path.display(),
                digest
            );
        }
        info!(digest = %digest, path = %model_path.display(), "signal classifier model verified against registry");

        let session = Session::builder()
            .context("failed to create onnx session builder")?
            .commit_from_file(model_path)
            .with_context(|| format!("failed to load model {}", model_path.display()))?;

        Ok(Self { session: Mutex::new(session) })
    }
}

impl SignalClassifier for OrtSignalClassifier {
    fn score(&self, features: &[f32]) -> Result<f32> {
        let shape = vec![1, features.len()];
        let input = ort::value::Value::from_array((shape.as_slice(), features.to_vec()))
            .context("failed to build classifier input tensor")?;
        let inputs = ort::inputs![input];

        let mut session = self.session.lock().map_err(|_| anyhow::anyhow!("classifier session poisoned"))?;
        let outputs = session.run(inputs).context("classifier inference failed")?;
        let output = outputs
            .iter()
            .next()
            .map(|(_, v)| v)
            .ok_or_else(|| anyhow::anyhow!("classifier produced no output"))?;
        let tensor = output.try_extract_tensor::<f32>().context("failed to extract classifier output tensor")?;
        tensor.1.iter().next().copied().ok_or_else(|| anyhow::anyhow!("classifier output tensor empty"))
    }
}

/// Returns 0.5 unconditionally; used in `Mode::Dry` or when no registry
/// entry for the configured model path exists, so the Alpha Chamber degrades
/// to a technical-only blend rather than failing startup.
pub struct NeutralSignalClassifier;

impl SignalClassifier for NeutralSignalClassifier {
    fn score(&self, _features: &[f32]) -> Result<f32> {
        Ok(0.5)
    }
}

pub fn default_model_path() -> PathBuf {
    PathBuf::from("models/signal_classifier.onnx")
}

pub fn load_or_neutral(model_path: &Path, allowed_hashes: &[String]) -> std::sync::Arc<dyn SignalClassifier> {
    if allowed_hashes.is_empty() || !model_path.exists() {
        warn!("no signal classifier registry entry or model file found, falling back to neutral scorer");
        return std::sync::Arc::new(NeutralSignalClassifier);
    }
    match OrtSignalClassifier::load(model_path, allowed_hashes) {
        Ok(classifier) => std::sync::Arc::new(classifier),
        Err(e) => {
            warn!("failed to load signal classifier, falling back to neutral scorer: {}", e);
            std::sync::Arc::new(NeutralSignalClassifier)
        }
    }
}
