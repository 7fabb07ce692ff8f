//! The user-behaviour simulation agent: plan, look up, remember, reason,
//! parse.

use std::sync::Arc;

use tracing::{debug, warn};

use wss_core::{
    Embedder, InteractionTool, Llm, MemoryKind, SimulationOutput, Task, WssResult,
    NO_REVIEW_GENERATED,
};

use crate::call_log::CallLog;
use crate::memory::{build_memory, MemoryConfig, MemoryModule, REVIEW_MARKER};
use crate::planning::{baseline_plan, ToolCall};
use crate::reasoning::{Reasoner, ReasoningKind};

pub const MAX_REVIEW_CHARS: usize = 512;
const DEFAULT_STARS: f64 = 3.0;
const NO_USER: &str = "No user data available";
const NO_BUSINESS: &str = "No business data available";

/// Which reasoning strategy and memory variant an agent is assembled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentSpec {
    pub reasoning: ReasoningKind,
    pub memory: Option<MemoryKind>,
}

impl Default for AgentSpec {
    fn default() -> Self {
        Self {
            reasoning: ReasoningKind::Tot,
            memory: Some(MemoryKind::Dilu),
        }
    }
}

impl AgentSpec {
    pub fn label(&self) -> String {
        match self.memory {
            Some(m) => format!("{}+{}", self.reasoning, m),
            None => self.reasoning.to_string(),
        }
    }
}

/// Shared handles every agent of a run borrows.
#[derive(Clone)]
pub struct AgentContext {
    pub tool: Arc<dyn InteractionTool>,
    pub llm: Arc<dyn Llm>,
    pub embedder: Arc<dyn Embedder>,
    pub log: Arc<CallLog>,
    pub memory: MemoryConfig,
}

pub struct SimulationAgent {
    tool: Arc<dyn InteractionTool>,
    memory: Option<Box<dyn MemoryModule>>,
    reasoner: Reasoner,
}

impl SimulationAgent {
    /// Builds a fresh agent with its own memory store.
    pub fn new(spec: AgentSpec, ctx: &AgentContext) -> WssResult<Self> {
        let memory = match spec.memory {
            Some(kind) => Some(build_memory(
                kind,
                &ctx.memory,
                ctx.embedder.clone(),
                ctx.llm.clone(),
                ctx.log.clone(),
            )?),
            None => None,
        };
        Ok(Self {
            tool: ctx.tool.clone(),
            memory,
            reasoner: Reasoner::new(spec.reasoning, ctx.llm.clone(), ctx.log.clone()),
        })
    }

    /// Simulate `task`. Never fails: a broken workflow yields the failure
    /// value.
    pub fn run(&self, task: &Task) -> SimulationOutput {
        match self.workflow(task) {
            Ok(out) => out,
            Err(e) => {
                warn!(user = %task.user_id, item = %task.item_id, "workflow failed: {e}");
                SimulationOutput::failed()
            }
        }
    }

    pub fn workflow(&self, task: &Task) -> WssResult<SimulationOutput> {
        let mut user = None;
        let mut business = None;
        for sub_task in baseline_plan(task) {
            debug!(step = %sub_task.description, "plan step");
            match sub_task.tool {
                ToolCall::User(id) => {
                    user = Some(
                        self.tool
                            .get_user(&id)?
                            .map(|u| u.to_prompt_string())
                            .unwrap_or_else(|| NO_USER.to_string()),
                    );
                }
                ToolCall::Item(id) => {
                    business = Some(
                        self.tool
                            .get_item(&id)?
                            .map(|i| i.to_prompt_string())
                            .unwrap_or_else(|| NO_BUSINESS.to_string()),
                    );
                }
            }
        }
        let user = user.unwrap_or_else(|| NO_USER.to_string());
        let business = business.unwrap_or_else(|| NO_BUSINESS.to_string());

        let similar = match &self.memory {
            Some(memory) => {
                for review in self.tool.reviews_for_item(&task.item_id)? {
                    memory.dispatch(&format!("{REVIEW_MARKER} {}", review.text))?;
                }
                match self.tool.reviews_by_user(&task.user_id)?.first() {
                    Some(first) => memory.retrieve_memory(&first.text)?,
                    None => String::new(),
                }
            }
            None => String::new(),
        };

        let prompt = reviewer_prompt(&user, &business, &similar);
        let answer = self.reasoner.reason(&prompt)?;
        Ok(parse_answer(&answer))
    }
}

pub fn reviewer_prompt(user: &str, business: &str, similar: &str) -> String {
    format!(
        "You are a real human user on Yelp, a platform for crowd-sourced business reviews. \
Here is your Yelp profile and review history: {user}

You need to write a review for this business: {business}

Others have reviewed this business before: {similar}

Please analyze the following aspects carefully:
1. Based on your user profile and review style, what rating would you give this business? \
Remember that many users give 5-star ratings for excellent experiences that exceed \
expectations, and 1-star ratings for very poor experiences that fail to meet basic standards.
2. Given the business details and your past experiences, what specific aspects would you \
comment on? Focus on the positive aspects that make this business stand out or negative \
aspects that severely impact the experience.

Requirements:
- Star rating must be one of: 1.0, 2.0, 3.0, 4.0, 5.0
- If the business meets or exceeds expectations in key areas, consider giving a 5-star rating
- If the business fails significantly in key areas, consider giving a 1-star rating
- Review text should be 2-4 sentences, focusing on your personal experience and emotional response
- Maintain consistency with your historical review style and rating patterns
- Focus on specific details about the business rather than generic comments
- Be generous with ratings when businesses deliver quality service and products
- Be critical when businesses fail to meet basic standards

Format your response exactly as follows:
stars: [your rating]
review: [your review]
"
    )
}

fn after_colon(line: &str) -> Option<&str> {
    line.split_once(':').map(|(_, rest)| rest.trim())
}

/// Pull `stars:` and `review:` out of a model reply, with defaults for
/// anything missing or malformed.
pub fn parse_answer(text: &str) -> SimulationOutput {
    let stars = text
        .lines()
        .find(|l| l.to_lowercase().contains("stars:"))
        .and_then(after_colon)
        .and_then(|v| {
            v.trim_matches(|c: char| c == '*' || c == '[' || c == ']' || c.is_whitespace())
                .parse::<f64>()
                .ok()
        })
        .unwrap_or(DEFAULT_STARS);

    let review = text
        .lines()
        .find(|l| l.to_lowercase().contains("review:"))
        .and_then(after_colon)
        .map(|r| r.chars().take(MAX_REVIEW_CHARS).collect())
        .unwrap_or_else(|| NO_REVIEW_GENERATED.to_string());

    SimulationOutput { stars, review }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map, Value};
    use std::collections::HashMap;
    use wss_core::{HashingEmbedder, Item, Review, ScriptedLlm, User, WssError};

    #[derive(Default)]
    struct FakeTool {
        users: HashMap<String, User>,
        items: HashMap<String, Item>,
        reviews: Vec<Review>,
        broken: bool,
    }

    fn fields(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    impl InteractionTool for FakeTool {
        fn get_user(&self, id: &str) -> WssResult<Option<User>> {
            if self.broken {
                return Err(WssError::Database("gone".into()));
            }
            Ok(self.users.get(id).cloned())
        }
        fn get_item(&self, id: &str) -> WssResult<Option<Item>> {
            Ok(self.items.get(id).cloned())
        }
        fn get_review(&self, id: &str) -> WssResult<Option<Review>> {
            Ok(self.reviews.iter().find(|r| r.review_id == id).cloned())
        }
        fn reviews_for_item(&self, id: &str) -> WssResult<Vec<Review>> {
            Ok(self.reviews.iter().filter(|r| r.item_id == id).cloned().collect())
        }
        fn reviews_by_user(&self, id: &str) -> WssResult<Vec<Review>> {
            Ok(self.reviews.iter().filter(|r| r.user_id == id).cloned().collect())
        }
    }

    fn review(id: &str, user: &str, item: &str, text: &str) -> Review {
        Review {
            review_id: id.into(),
            user_id: user.into(),
            item_id: item.into(),
            stars: 4.0,
            text: text.into(),
            fields: Map::new(),
        }
    }

    fn tool() -> FakeTool {
        let mut t = FakeTool::default();
        t.users.insert(
            "u1".into(),
            User {
                user_id: "u1".into(),
                fields: fields(json!({"name": "Ann"})),
            },
        );
        t.items.insert(
            "b1".into(),
            Item {
                item_id: "b1".into(),
                fields: fields(json!({"name": "Taco Spot"})),
            },
        );
        t.reviews = vec![
            review("r1", "u2", "b1", "crispy tacos and quick service"),
            review("r2", "u1", "b7", "slow service but tasty tacos"),
        ];
        t
    }

    fn context(tool: FakeTool, llm: Arc<ScriptedLlm>) -> AgentContext {
        AgentContext {
            tool: Arc::new(tool),
            llm,
            embedder: Arc::new(HashingEmbedder::new(32)),
            log: Arc::new(CallLog::disabled()),
            memory: MemoryConfig::default(),
        }
    }

    #[test]
    fn test_parse_answer_happy_path() {
        let out = parse_answer("Thoughts...\nStars: 4.0\nreview: Great food: loved it");
        assert_eq!(out.stars, 4.0);
        assert_eq!(out.review, "Great food: loved it");
    }

    #[test]
    fn test_parse_answer_defaults() {
        let out = parse_answer("nothing useful");
        assert_eq!(out.stars, 3.0);
        assert_eq!(out.review, NO_REVIEW_GENERATED);

        let out = parse_answer("stars: five\nreview:");
        assert_eq!(out.stars, 3.0);
        assert_eq!(out.review, "");

        assert_eq!(parse_answer("**stars:** [2.0]").stars, 2.0);
    }

    #[test]
    fn test_parse_answer_truncates_review() {
        let long = "x".repeat(600);
        let out = parse_answer(&format!("stars: 5\nreview: {long}"));
        assert_eq!(out.review.chars().count(), MAX_REVIEW_CHARS);
    }

    #[test]
    fn test_spec_label() {
        assert_eq!(AgentSpec::default().label(), "tot+dilu");
        let io = AgentSpec {
            reasoning: ReasoningKind::Io,
            memory: None,
        };
        assert_eq!(io.label(), "io");
    }

    #[test]
    fn test_workflow_builds_prompt_from_lookups_and_memory() {
        let llm = Arc::new(ScriptedLlm::new(["stars: 5.0\nreview: Best tacos in town."]));
        let spec = AgentSpec {
            reasoning: ReasoningKind::Io,
            memory: Some(MemoryKind::Dilu),
        };
        let agent = SimulationAgent::new(spec, &context(tool(), llm.clone())).unwrap();
        let out = agent.run(&Task::new("u1", "b1"));
        assert_eq!(out.stars, 5.0);
        assert_eq!(out.review, "Best tacos in town.");

        let prompt = &llm.requests()[0].messages[0].content;
        assert!(prompt.contains("Ann"));
        assert!(prompt.contains("Taco Spot"));
        // the item's review came back as the similar-review context
        assert!(prompt.contains("crispy tacos and quick service"));
    }

    #[test]
    fn test_missing_records_use_placeholders() {
        let llm = Arc::new(ScriptedLlm::new(["stars: 2.0\nreview: meh"]));
        let spec = AgentSpec {
            reasoning: ReasoningKind::Io,
            memory: None,
        };
        let agent = SimulationAgent::new(spec, &context(tool(), llm.clone())).unwrap();
        agent.run(&Task::new("ghost", "nowhere"));
        let prompt = &llm.requests()[0].messages[0].content;
        assert!(prompt.contains(NO_USER));
        assert!(prompt.contains(NO_BUSINESS));
        assert!(prompt.contains("Others have reviewed this business before: \n"));
    }

    #[test]
    fn test_workflow_error_yields_failure_value() {
        let mut broken = tool();
        broken.broken = true;
        let llm = Arc::new(ScriptedLlm::new(["stars: 5.0\nreview: x"]));
        let agent = SimulationAgent::new(AgentSpec::default(), &context(broken, llm.clone())).unwrap();
        let out = agent.run(&Task::new("u1", "b1"));
        assert_eq!(out, SimulationOutput::failed());
        assert_eq!(llm.call_count(), 0);

        let failing_llm = Arc::new(ScriptedLlm::new(Vec::<String>::new()));
        let agent = SimulationAgent::new(AgentSpec::default(), &context(tool(), failing_llm)).unwrap();
        assert_eq!(agent.run(&Task::new("u1", "b1")), SimulationOutput::failed());
    }
}
