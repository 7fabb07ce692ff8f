use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::WssResult;

/// Review text used when the model reply carries no `review:` line.
pub const NO_REVIEW_GENERATED: &str = "No review generated.";

// ---------------------------------------------------------------------------
// Dataset records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub item_id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    #[serde(default)]
    pub review_id: String,
    pub user_id: String,
    pub item_id: String,
    #[serde(default)]
    pub stars: f64,
    #[serde(default)]
    pub text: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl User {
    /// Compact JSON rendering used inside prompts.
    pub fn to_prompt_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl Review {
    /// Give an id-less review `user:item:ordinal`, where `ordinal` is its
    /// position among the reviews read so far. Repeat reviews of one item
    /// by the same user stay distinct.
    pub fn ensure_id(&mut self, ordinal: usize) {
        if self.review_id.is_empty() {
            self.review_id = format!("{}:{}:{ordinal}", self.user_id, self.item_id);
        }
    }
}

impl Item {
    pub fn to_prompt_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Tasks and outcomes
// ---------------------------------------------------------------------------

fn default_task_type() -> String {
    "user_behavior_simulation".into()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "type", default = "default_task_type")]
    pub kind: String,
    pub user_id: String,
    pub item_id: String,
}

impl Task {
    pub fn new(user_id: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            kind: default_task_type(),
            user_id: user_id.into(),
            item_id: item_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruth {
    pub stars: f64,
    #[serde(default)]
    pub review: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationOutput {
    pub stars: f64,
    pub review: String,
}

impl SimulationOutput {
    /// The value recorded when a workflow fails: zero stars, empty review.
    pub fn failed() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Interaction tool
// ---------------------------------------------------------------------------

/// Read access to users, items and reviews, shared by all agents of a run.
pub trait InteractionTool: Send + Sync {
    fn get_user(&self, user_id: &str) -> WssResult<Option<User>>;
    fn get_item(&self, item_id: &str) -> WssResult<Option<Item>>;
    fn get_review(&self, review_id: &str) -> WssResult<Option<Review>>;
    fn reviews_for_item(&self, item_id: &str) -> WssResult<Vec<Review>>;
    fn reviews_by_user(&self, user_id: &str) -> WssResult<Vec<Review>>;
}
