//! Sentence embeddings for scenario memory and review topic scoring.
//!
//! One embedder is shared by every simulation worker: memory stores embed
//! each item's reviews, and the evaluator embeds simulated and real review
//! pairs. The model is downloaded and loaded by whichever worker asks first.

use std::sync::{Mutex, OnceLock};

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use crate::embedder::Embedder;
use crate::error::{WssError, WssResult};

/// Output width of all-MiniLM-L6-v2.
pub const DIMENSIONS: usize = 384;

/// Reviews per inference batch; an item's review list can run to hundreds.
const BATCH_SIZE: usize = 64;

pub struct FastEmbedder {
    model: OnceLock<TextEmbedding>,
    // Serialises the first load so concurrent workers don't fetch twice.
    init_lock: Mutex<()>,
}

impl FastEmbedder {
    pub fn new() -> Self {
        Self {
            model: OnceLock::new(),
            init_lock: Mutex::new(()),
        }
    }

    fn model(&self) -> WssResult<&TextEmbedding> {
        if let Some(m) = self.model.get() {
            return Ok(m);
        }
        let _guard = self
            .init_lock
            .lock()
            .map_err(|_| WssError::Embedding("embedder init lock poisoned".into()))?;
        if let Some(m) = self.model.get() {
            return Ok(m);
        }
        tracing::info!("loading all-MiniLM-L6-v2 sentence embedder");
        let model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(true),
        )
        .map_err(|e| WssError::Embedding(format!("cannot load sentence embedder: {e}")))?;
        let _ = self.model.set(model);
        self.model
            .get()
            .ok_or_else(|| WssError::Embedding("sentence embedder not loaded".into()))
    }
}

impl Default for FastEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl Embedder for FastEmbedder {
    fn embed(&self, text: &str) -> WssResult<Vec<f32>> {
        self.embed_batch(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| WssError::Embedding("empty embedding result".into()))
    }

    fn embed_batch(&self, texts: &[&str]) -> WssResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.model()?
            .embed(texts.to_vec(), Some(BATCH_SIZE))
            .map_err(|e| WssError::Embedding(e.to_string()))
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_batch_does_not_load_model() {
        let e = FastEmbedder::new();
        assert!(e.embed_batch(&[]).unwrap().is_empty());
        assert!(e.model.get().is_none());
        assert_eq!(e.dimensions(), DIMENSIONS);
    }
}
