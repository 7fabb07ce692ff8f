pub mod dataset;
pub mod embedder;
pub mod error;
#[cfg(feature = "embeddings")]
pub mod fastembed_embedder;
pub mod hashing_embedder;
pub mod llm;
pub mod scenario;
pub mod store;

pub use dataset::{
    GroundTruth, InteractionTool, Item, Review, SimulationOutput, Task, User, NO_REVIEW_GENERATED,
};
pub use embedder::{cosine_similarity, Embedder};
pub use error::{WssError, WssResult};
#[cfg(feature = "embeddings")]
pub use fastembed_embedder::FastEmbedder;
pub use hashing_embedder::HashingEmbedder;
pub use llm::{CallOrigin, Llm, LlmRequest, Message, Role, ScriptedLlm};
pub use scenario::{MemoryKind, ScenarioMemory};
pub use store::ScenarioStore;
