use crate::error::WssResult;
use crate::scenario::ScenarioMemory;

/// Vector-indexed scenario memories.
pub trait ScenarioStore {
    fn add(&self, memory: ScenarioMemory, embedding: &[f32]) -> WssResult<String>;
    fn get(&self, id: &str) -> WssResult<Option<ScenarioMemory>>;

    /// Nearest memories by cosine distance, closest first.
    fn search(&self, embedding: &[f32], k: usize) -> WssResult<Vec<(ScenarioMemory, f32)>>;

    fn count(&self) -> WssResult<usize>;
    fn clear(&self) -> WssResult<usize>;
}
