//! Feature-hashing embedder.
//!
//! Tokens are lowercased alphanumeric runs; each token lands in one bucket
//! chosen by its SHA-256 digest, with a sign taken from the same digest so
//! collisions tend to cancel. The vector is L2-normalised. No model download,
//! fully deterministic, good enough to rank near-duplicate reviews.

use sha2::{Digest, Sha256};

use crate::embedder::Embedder;
use crate::error::WssResult;

pub const DEFAULT_DIMENSIONS: usize = 384;

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    fn bucket(&self, token: &str) -> (usize, f32) {
        let digest = Sha256::digest(token.as_bytes());
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&digest[..8]);
        let h = u64::from_le_bytes(raw);
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        ((h % self.dims as u64) as usize, sign)
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> WssResult<Vec<f32>> {
        let mut v = vec![0.0f32; self.dims];
        for token in tokens(text) {
            let (idx, sign) = self.bucket(&token);
            v[idx] += sign;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        Ok(v)
    }

    fn embed_batch(&self, texts: &[&str]) -> WssResult<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::cosine_similarity;

    #[test]
    fn test_deterministic_and_normalised() {
        let e = HashingEmbedder::default();
        let a = e.embed("The pizza was great").unwrap();
        let b = e.embed("the PIZZA was great!").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), DEFAULT_DIMENSIONS);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let e = HashingEmbedder::new(16);
        let v = e.embed("  ...  ").unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_overlap_ranks_higher() {
        let e = HashingEmbedder::default();
        let q = e.embed("friendly staff and clean rooms").unwrap();
        let near = e.embed("the staff were friendly and the rooms clean").unwrap();
        let far = e.embed("terrible parking downtown").unwrap();
        assert!(cosine_similarity(&q, &near) > cosine_similarity(&q, &far));
    }

    #[test]
    fn test_batch_matches_single() {
        let e = HashingEmbedder::new(32);
        let batch = e.embed_batch(&["a b", "c"]).unwrap();
        assert_eq!(batch[0], e.embed("a b").unwrap());
        assert_eq!(batch[1], e.embed("c").unwrap());
    }
}
