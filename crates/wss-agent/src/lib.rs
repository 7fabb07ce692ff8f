pub mod agent;
pub mod call_log;
pub mod gemini;
pub mod http;
pub mod memory;
pub mod openai;
pub mod planning;
pub mod reasoning;

pub use agent::{parse_answer, AgentContext, AgentSpec, SimulationAgent};
pub use call_log::{CallLog, LoggedLlm};
pub use gemini::GeminiLlm;
pub use http::RetryPolicy;
pub use memory::{build_memory, MemoryConfig, MemoryModule};
pub use openai::OpenAiLlm;
pub use reasoning::{Reasoner, ReasoningKind};
