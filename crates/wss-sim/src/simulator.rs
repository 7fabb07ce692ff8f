use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use wss_agent::{AgentContext, AgentSpec, CallLog, MemoryConfig, SimulationAgent};
use wss_core::{
    Embedder, GroundTruth, InteractionTool, Llm, SimulationOutput, Task, WssError, WssResult,
};

use crate::metrics;
use crate::report::EvaluationReport;

/// Result of one task: the agent's output, or why no agent could run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task: Task,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<SimulationOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskOutcome {
    /// The value scored by the evaluator; errors count as the failure value.
    pub fn scored_output(&self) -> SimulationOutput {
        self.output.clone().unwrap_or_else(SimulationOutput::failed)
    }
}

pub struct Simulator {
    ctx: AgentContext,
    spec: AgentSpec,
    tasks: Vec<Task>,
    groundtruth: Vec<GroundTruth>,
    outcomes: Vec<TaskOutcome>,
}

impl Simulator {
    pub fn new(
        tool: Arc<dyn InteractionTool>,
        llm: Arc<dyn Llm>,
        embedder: Arc<dyn Embedder>,
        spec: AgentSpec,
    ) -> Self {
        Self {
            ctx: AgentContext {
                tool,
                llm,
                embedder,
                log: Arc::new(CallLog::disabled()),
                memory: MemoryConfig::default(),
            },
            spec,
            tasks: Vec::new(),
            groundtruth: Vec::new(),
            outcomes: Vec::new(),
        }
    }

    pub fn with_call_log(mut self, log: Arc<CallLog>) -> Self {
        self.ctx.log = log;
        self
    }

    /// Persist memory stores under `root` instead of keeping them in memory.
    pub fn with_db_root(mut self, root: PathBuf) -> Self {
        self.ctx.memory.db_root = Some(root);
        self
    }

    pub fn set_tasks(&mut self, tasks: Vec<Task>, groundtruth: Vec<GroundTruth>) {
        self.tasks = tasks;
        self.groundtruth = groundtruth;
        self.outcomes.clear();
    }

    pub fn set_spec(&mut self, spec: AgentSpec) {
        self.spec = spec;
        self.outcomes.clear();
    }

    pub fn outcomes(&self) -> &[TaskOutcome] {
        &self.outcomes
    }

    /// Run the first `number_of_tasks` tasks (all when `None`). With
    /// `threading`, tasks run on a pool of `max_workers` threads; outcomes
    /// keep task order either way.
    pub fn run(
        &mut self,
        number_of_tasks: Option<usize>,
        threading: bool,
        max_workers: usize,
    ) -> WssResult<&[TaskOutcome]> {
        let count = number_of_tasks
            .unwrap_or(self.tasks.len())
            .min(self.tasks.len());
        let tasks = &self.tasks[..count];
        info!(
            tasks = count,
            threading,
            max_workers,
            agent = %self.spec.label(),
            "starting simulation"
        );

        let outcomes: Vec<TaskOutcome> = if threading {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(max_workers.max(1))
                .build()
                .map_err(|e| WssError::Config(format!("cannot build worker pool: {e}")))?;
            pool.install(|| {
                tasks
                    .par_iter()
                    .enumerate()
                    .map(|(i, t)| run_task(&self.ctx, self.spec, i, t))
                    .collect()
            })
        } else {
            tasks
                .iter()
                .enumerate()
                .map(|(i, t)| run_task(&self.ctx, self.spec, i, t))
                .collect()
        };

        let failed = outcomes.iter().filter(|o| o.error.is_some()).count();
        info!(completed = outcomes.len() - failed, failed, "simulation finished");
        self.outcomes = outcomes;
        Ok(&self.outcomes)
    }

    /// Score the last run against the loaded ground truth.
    pub fn evaluate(&self) -> WssResult<EvaluationReport> {
        let outputs: Vec<SimulationOutput> =
            self.outcomes.iter().map(TaskOutcome::scored_output).collect();
        metrics::evaluate(self.ctx.embedder.as_ref(), &outputs, &self.groundtruth)
    }
}

fn run_task(ctx: &AgentContext, spec: AgentSpec, index: usize, task: &Task) -> TaskOutcome {
    let task_id = index.to_string();
    ctx.log.log_simulation_event(
        "task_start",
        json!({
            "index": index,
            "user_id": task.user_id,
            "item_id": task.item_id,
            "agent": spec.label(),
        }),
        Some(&task_id),
    );
    let start = Instant::now();

    let outcome = match SimulationAgent::new(spec, ctx) {
        Ok(agent) => TaskOutcome {
            task: task.clone(),
            output: Some(agent.run(task)),
            error: None,
        },
        Err(e) => {
            warn!(index, "cannot build agent: {e}");
            TaskOutcome {
                task: task.clone(),
                output: None,
                error: Some(e.to_string()),
            }
        }
    };

    ctx.log.log_simulation_event(
        "task_complete",
        json!({
            "index": index,
            "stars": outcome.output.as_ref().map(|o| o.stars),
            "review_length": outcome.output.as_ref().map(|o| o.review.chars().count()),
            "error": outcome.error,
            "duration_ms": start.elapsed().as_secs_f64() * 1000.0,
        }),
        Some(&task_id),
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::InMemoryDataset;
    use serde_json::{Map, Value};
    use wss_agent::call_log::read_entries;
    use wss_agent::ReasoningKind;
    use wss_core::{HashingEmbedder, Item, Review, ScriptedLlm, User};

    fn dataset() -> InMemoryDataset {
        let mut ds = InMemoryDataset::default();
        for i in 0..4 {
            ds.add_user(User {
                user_id: format!("u{i}"),
                fields: Map::new(),
            });
            ds.add_item(Item {
                item_id: format!("b{i}"),
                fields: Map::new(),
            });
            ds.add_review(Review {
                review_id: format!("r{i}"),
                user_id: format!("u{i}"),
                item_id: format!("b{i}"),
                stars: 4.0,
                text: format!("review number {i}"),
                fields: Map::<String, Value>::new(),
            });
        }
        ds
    }

    fn simulator(llm: Arc<ScriptedLlm>) -> Simulator {
        let spec = AgentSpec {
            reasoning: ReasoningKind::Io,
            memory: None,
        };
        let mut sim = Simulator::new(
            Arc::new(dataset()),
            llm,
            Arc::new(HashingEmbedder::new(32)),
            spec,
        );
        let tasks = (0..4).map(|i| Task::new(format!("u{i}"), format!("b{i}"))).collect();
        let gts = (0..4)
            .map(|_| GroundTruth {
                stars: 4.0,
                review: "Solid spot.".into(),
            })
            .collect();
        sim.set_tasks(tasks, gts);
        sim
    }

    #[test]
    fn test_sequential_run_and_evaluate() {
        let llm = Arc::new(ScriptedLlm::new(["stars: 4.0\nreview: Solid spot."]));
        let mut sim = simulator(llm.clone());
        let outcomes = sim.run(Some(2), false, 1).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[1].task.user_id, "u1");
        assert_eq!(llm.call_count(), 2);

        let report = sim.evaluate().unwrap();
        assert_eq!(report.data_info.evaluated_count, 2);
        assert_eq!(report.data_info.original_ground_truth_count, 4);
        assert_eq!(report.metrics.overall_quality, 1.0);
    }

    #[test]
    fn test_threaded_run_keeps_order() {
        let llm = Arc::new(ScriptedLlm::new(["stars: 3.0\nreview: ok"]));
        let mut sim = simulator(llm);
        let outcomes = sim.run(None, true, 3).unwrap();
        let users: Vec<&str> = outcomes.iter().map(|o| o.task.user_id.as_str()).collect();
        assert_eq!(users, vec!["u0", "u1", "u2", "u3"]);
        assert!(outcomes.iter().all(|o| o.output.as_ref().unwrap().stars == 3.0));
    }

    #[test]
    fn test_count_larger_than_tasks() {
        let mut sim = simulator(Arc::new(ScriptedLlm::new(["stars: 1"])));
        assert_eq!(sim.run(Some(99), false, 1).unwrap().len(), 4);
    }

    #[test]
    fn test_task_events_logged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calls.jsonl");
        let log = Arc::new(CallLog::open(&path).unwrap());
        let mut sim =
            simulator(Arc::new(ScriptedLlm::new(["stars: 5.0\nreview: yes"]))).with_call_log(log);
        sim.run(Some(1), false, 1).unwrap();

        let events: Vec<Value> = read_entries(&path)
            .unwrap()
            .into_iter()
            .filter(|e| e["log_type"] == "simulation_event")
            .collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["event_type"], "task_start");
        assert_eq!(events[1]["event_type"], "task_complete");
        assert_eq!(events[1]["data"]["stars"], 5.0);
        assert_eq!(events[1]["task_id"], "0");
    }

    #[test]
    fn test_outcome_serialization() {
        let ok = TaskOutcome {
            task: Task::new("u", "b"),
            output: Some(SimulationOutput::failed()),
            error: None,
        };
        let v = serde_json::to_value(&ok).unwrap();
        assert!(v.get("error").is_none());
        let err = TaskOutcome {
            task: Task::new("u", "b"),
            output: None,
            error: Some("boom".into()),
        };
        assert_eq!(err.scored_output(), SimulationOutput::failed());
        let v = serde_json::to_value(&err).unwrap();
        assert_eq!(v["error"], "boom");
        assert!(v.get("output").is_none());
    }
}
