use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Memory module variant. Also names the on-disk directory of its stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    Dilu,
    Generative,
    Tp,
    Voyager,
}

impl MemoryKind {
    pub const ALL: [MemoryKind; 4] = [Self::Dilu, Self::Generative, Self::Tp, Self::Voyager];
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dilu => write!(f, "dilu"),
            Self::Generative => write!(f, "generative"),
            Self::Tp => write!(f, "tp"),
            Self::Voyager => write!(f, "voyager"),
        }
    }
}

impl std::str::FromStr for MemoryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dilu" => Ok(Self::Dilu),
            "generative" => Ok(Self::Generative),
            "tp" => Ok(Self::Tp),
            "voyager" => Ok(Self::Voyager),
            _ => Err(format!("invalid memory kind: {s}")),
        }
    }
}

/// One remembered scenario. `content` is what gets embedded; `trajectory`
/// is what retrieval hands back to the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioMemory {
    pub id: String,
    pub kind: MemoryKind,
    pub content: String,
    pub task_name: Option<String>,
    pub task_description: Option<String>,
    pub trajectory: String,
    pub created_at: DateTime<Utc>,
}

impl ScenarioMemory {
    pub fn new(kind: MemoryKind, content: String, trajectory: String) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            kind,
            content,
            task_name: None,
            task_description: None,
            trajectory,
            created_at: Utc::now(),
        }
    }
}
