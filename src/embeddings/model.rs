//! ONNX CLIP model management.
//!
//! Loads the vision and text towers of an exported CLIP model together
//! with its tokenizer, and runs single-item inference on either tower.

use std::path::{Path, PathBuf};

use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use parking_lot::Mutex;
use tokenizers::{Tokenizer, TruncationParams};

use super::preprocess;
use super::Embedder;
use crate::error::EmbeddingError;
use crate::Result;

/// Vision tower file name.
pub const VISION_MODEL_FILE: &str = "vision_model.onnx";

/// Text tower file name.
pub const TEXT_MODEL_FILE: &str = "text_model.onnx";

/// Tokenizer file name.
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// CLIP text context length.
pub const MAX_TEXT_TOKENS: usize = 77;

const IMAGE_OUTPUT: &str = "image_embeds";
const TEXT_OUTPUT: &str = "text_embeds";

/// Resolved paths of the files making up an exported CLIP model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFiles {
    pub vision_model: PathBuf,
    pub text_model: PathBuf,
    pub tokenizer: PathBuf,
}

impl ModelFiles {
    /// Locate model files inside `dir`.
    ///
    /// The tokenizer must sit at the root; the ONNX graphs may sit at the
    /// root or under `onnx/`.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError::ModelLoad`] naming the first missing file.
    pub fn resolve(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();

        if !dir.is_dir() {
            return Err(EmbeddingError::ModelLoad(format!(
                "model directory not found: {}",
                dir.display()
            ))
            .into());
        }

        let tokenizer = dir.join(TOKENIZER_FILE);
        if !tokenizer.is_file() {
            return Err(EmbeddingError::ModelLoad(format!(
                "tokenizer not found: {}",
                tokenizer.display()
            ))
            .into());
        }

        Ok(Self {
            vision_model: find_graph(dir, VISION_MODEL_FILE)?,
            text_model: find_graph(dir, TEXT_MODEL_FILE)?,
            tokenizer,
        })
    }
}

fn find_graph(dir: &Path, name: &str) -> Result<PathBuf> {
    [dir.join(name), dir.join("onnx").join(name)]
        .into_iter()
        .find(|p| p.is_file())
        .ok_or_else(|| {
            EmbeddingError::ModelLoad(format!("{name} not found in {}", dir.display())).into()
        })
}

/// CLIP model backed by ONNX Runtime.
///
/// `Session::run` needs exclusive access, so each tower sits behind its own
/// lock; an image and a text request can still run at the same time.
pub struct ClipModel {
    name: String,
    vision: Mutex<Session>,
    text: Mutex<Session>,
    tokenizer: Tokenizer,
    image_dim: usize,
    text_dim: usize,
}

impl ClipModel {
    /// Load a CLIP model from a directory.
    ///
    /// Runs one probe inference per tower to record the output dimensions.
    ///
    /// # Errors
    ///
    /// Returns an error if any file is missing, fails to load, or the probe
    /// inference fails.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let files = ModelFiles::resolve(dir)?;
        let name = dir
            .file_name()
            .map_or_else(|| "clip".to_string(), |n| n.to_string_lossy().into_owned());

        Self::load_files(name, &files)
    }

    /// Load a CLIP model from explicit file paths.
    ///
    /// # Errors
    ///
    /// Returns an error if any file fails to load or the probe inference fails.
    pub fn load_files(name: impl Into<String>, files: &ModelFiles) -> Result<Self> {
        let name = name.into();
        let intra_threads =
            std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);

        tracing::info!(
            model = %name,
            vision = %files.vision_model.display(),
            text = %files.text_model.display(),
            "Loading CLIP model"
        );

        let vision = build_session(&files.vision_model, intra_threads)?;
        let text = build_session(&files.text_model, intra_threads)?;
        let tokenizer = load_tokenizer(&files.tokenizer)?;

        let mut model = Self {
            name,
            vision: Mutex::new(vision),
            text: Mutex::new(text),
            tokenizer,
            image_dim: 0,
            text_dim: 0,
        };

        let probe = Array4::zeros((
            1,
            3,
            preprocess::CLIP_IMAGE_SIZE as usize,
            preprocess::CLIP_IMAGE_SIZE as usize,
        ));
        model.image_dim = model
            .run_vision(probe)
            .map_err(|e| EmbeddingError::ModelLoad(format!("vision probe failed: {e}")))?
            .len();
        model.text_dim = model
            .run_text("")
            .map_err(|e| EmbeddingError::ModelLoad(format!("text probe failed: {e}")))?
            .len();

        tracing::info!(
            model = %model.name,
            image_dim = model.image_dim,
            text_dim = model.text_dim,
            "CLIP model loaded successfully"
        );

        Ok(model)
    }

    fn run_vision(&self, pixel_values: Array4<f32>) -> Result<Vec<f32>> {
        let shape: Vec<i64> = pixel_values.shape().iter().map(|&d| d as i64).collect();
        let (data, _) = pixel_values.into_raw_vec_and_offset();

        let input = Tensor::from_array((shape.as_slice(), data))
            .map_err(|e| EmbeddingError::Runtime(format!("failed to create pixel_values: {e}")))?;

        let mut session = self.vision.lock();
        let outputs = session
            .run(ort::inputs!["pixel_values" => input])
            .map_err(|e| EmbeddingError::Runtime(format!("vision inference failed: {e}")))?;

        let value = outputs
            .get(IMAGE_OUTPUT)
            .ok_or_else(|| EmbeddingError::Runtime(format!("missing output '{IMAGE_OUTPUT}'")))?;
        extract_row(value)
    }

    fn run_text(&self, text: &str) -> Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| EmbeddingError::Tokenization(format!("failed to tokenize: {e}")))?;

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| i64::from(id)).collect();
        let attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| i64::from(m))
            .collect();

        #[allow(clippy::cast_possible_wrap)]
        let shape = vec![1_i64, input_ids.len() as i64];

        let ids_tensor = Tensor::from_array((shape.as_slice(), input_ids))
            .map_err(|e| EmbeddingError::Runtime(format!("failed to create input_ids: {e}")))?;
        let mask_tensor = Tensor::from_array((shape.as_slice(), attention_mask)).map_err(|e| {
            EmbeddingError::Runtime(format!("failed to create attention_mask: {e}"))
        })?;

        let mut session = self.text.lock();
        let outputs = session
            .run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor
            ])
            .map_err(|e| EmbeddingError::Runtime(format!("text inference failed: {e}")))?;

        let value = outputs
            .get(TEXT_OUTPUT)
            .ok_or_else(|| EmbeddingError::Runtime(format!("missing output '{TEXT_OUTPUT}'")))?;
        extract_row(value)
    }
}

impl Embedder for ClipModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn image_dim(&self) -> usize {
        self.image_dim
    }

    fn text_dim(&self) -> usize {
        self.text_dim
    }

    fn embed_image(&self, payload: &[u8]) -> Result<Vec<f32>> {
        let pixel_values = preprocess::preprocess(payload)?;
        self.run_vision(pixel_values)
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        self.run_text(text)
    }
}

impl std::fmt::Debug for ClipModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipModel")
            .field("name", &self.name)
            .field("image_dim", &self.image_dim)
            .field("text_dim", &self.text_dim)
            .finish_non_exhaustive()
    }
}

fn build_session(path: &Path, intra_threads: usize) -> Result<Session> {
    Session::builder()
        .map_err(|e| EmbeddingError::Runtime(format!("failed to create session builder: {e}")))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| EmbeddingError::Runtime(format!("failed to set optimization level: {e}")))?
        .with_intra_threads(intra_threads)
        .map_err(|e| EmbeddingError::Runtime(format!("failed to set threads: {e}")))?
        .commit_from_file(path)
        .map_err(|e| {
            EmbeddingError::ModelLoad(format!("failed to load {}: {e}", path.display())).into()
        })
}

/// Load the tokenizer, truncating to the CLIP context length.
///
/// # Errors
///
/// Returns an error if the tokenizer cannot be loaded.
pub fn load_tokenizer(path: impl AsRef<Path>) -> Result<Tokenizer> {
    let mut tokenizer = Tokenizer::from_file(path.as_ref())
        .map_err(|e| EmbeddingError::ModelLoad(format!("failed to load tokenizer: {e}")))?;

    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: MAX_TEXT_TOKENS,
            ..Default::default()
        }))
        .map_err(|e| EmbeddingError::ModelLoad(format!("failed to set truncation: {e}")))?;
    tokenizer.with_padding(None);

    Ok(tokenizer)
}

/// Take the single row of a `[1, D]` output tensor.
fn extract_row(value: &ort::value::DynValue) -> Result<Vec<f32>> {
    let (shape, data) = value
        .try_extract_tensor::<f32>()
        .map_err(|e| EmbeddingError::Runtime(format!("failed to extract output: {e}")))?;

    if shape.len() != 2 || shape[0] != 1 {
        return Err(EmbeddingError::Runtime(format!(
            "unexpected output shape {shape:?}, expected [1, D]"
        ))
        .into());
    }

    Ok(data.to_vec())
}
