//! Scenario memory modules.
//!
//! Every module owns its own vector store. Reviews go in through
//! [`MemoryModule::add_memory`], and the agent pulls back whatever is most
//! similar to a query through [`MemoryModule::retrieve_memory`]. The four
//! variants differ in what they embed and how they post-process a hit.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use wss_core::{Embedder, Llm, LlmRequest, MemoryKind, ScenarioMemory, ScenarioStore, WssResult};
use wss_store::SqliteStore;

use crate::call_log::CallLog;

const MODULE: &str = "memory";
const QUERY_LOG_CHARS: usize = 100;

/// Marker that turns a `dispatch` call into an insertion.
pub const REVIEW_MARKER: &str = "review:";

pub const TP_PLAN_PREFIX: &str = "Plan from successful attempt in similar task:\n";

pub trait MemoryModule: Send {
    fn add_memory(&self, situation: &str) -> WssResult<()>;

    /// Most useful remembered trajectory for `query`, or `""` when the
    /// store is empty.
    fn retrieve_memory(&self, query: &str) -> WssResult<String>;

    /// Text containing the review marker is stored with the marker removed;
    /// anything else is a retrieval query. Returns `None` for insertions.
    fn dispatch(&self, situation: &str) -> WssResult<Option<String>> {
        if situation.contains(REVIEW_MARKER) {
            self.add_memory(&situation.replace(REVIEW_MARKER, ""))?;
            Ok(None)
        } else {
            self.retrieve_memory(situation).map(Some)
        }
    }
}

/// Where memory stores live. `None` keeps them in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryConfig {
    pub db_root: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Shared plumbing
// ---------------------------------------------------------------------------

struct MemoryBase {
    kind: MemoryKind,
    store: SqliteStore,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn Llm>,
    log: Arc<CallLog>,
}

impl MemoryBase {
    fn new(
        kind: MemoryKind,
        config: &MemoryConfig,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn Llm>,
        log: Arc<CallLog>,
    ) -> WssResult<Self> {
        let dims = embedder.dimensions();
        let (store, db_path) = match &config.db_root {
            Some(root) => {
                let path = store_path(root, kind);
                (SqliteStore::new(&path, dims)?, Some(path))
            }
            None => (SqliteStore::in_memory(dims)?, None),
        };
        debug!(%kind, ?db_path, "memory store ready");
        log.log_module_diagnostic(
            MODULE,
            "new",
            "memory_initialized",
            json!({
                "memory_type": kind.to_string(),
                "db_path": db_path.map(|p| p.display().to_string()),
            }),
            None,
        );
        Ok(Self {
            kind,
            store,
            embedder,
            llm,
            log,
        })
    }

    fn diag(&self, function: &str, event: &str, mut data: serde_json::Value) {
        data["memory_type"] = json!(self.kind.to_string());
        self.log
            .log_module_diagnostic(MODULE, function, event, data, None);
    }

    /// Embed `content`, keep `trajectory` as the retrievable payload.
    fn insert(&self, content: &str, trajectory: &str, summary: Option<&str>) -> WssResult<()> {
        let embedding = self.embedder.embed(content)?;
        if embedding.iter().all(|x| *x == 0.0) {
            debug!(kind = %self.kind, "skipping memory with zero embedding");
            self.diag(
                "add_memory",
                "memory_skipped",
                json!({ "reason": "zero_embedding", "content_length": content.chars().count() }),
            );
            return Ok(());
        }
        let mut memory =
            ScenarioMemory::new(self.kind, content.to_string(), trajectory.to_string());
        match summary {
            Some(s) => memory.task_description = Some(s.to_string()),
            None => memory.task_name = Some(content.to_string()),
        }
        self.store.add(memory, &embedding)?;

        let mut data = json!({
            "content_length": trajectory.chars().count(),
            "memory_count_after": self.store.count()?,
        });
        if let Some(s) = summary {
            data["summary_length"] = json!(s.chars().count());
        }
        self.diag("add_memory", "memory_added", data);
        Ok(())
    }

    fn search(&self, query: &str, k: usize) -> WssResult<Vec<(ScenarioMemory, f32)>> {
        let embedding = self.embedder.embed(query)?;
        self.store.search(&embedding, k)
    }

    fn is_empty(&self) -> WssResult<bool> {
        Ok(self.store.count()? == 0)
    }
}

fn store_path(root: &Path, kind: MemoryKind) -> PathBuf {
    root.join(kind.to_string())
        .join(format!("{}.db", ulid::Ulid::new()))
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// First run of ASCII digits in `text`, or 0.
fn first_integer(text: &str) -> i64 {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

pub fn build_memory(
    kind: MemoryKind,
    config: &MemoryConfig,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn Llm>,
    log: Arc<CallLog>,
) -> WssResult<Box<dyn MemoryModule>> {
    let base = MemoryBase::new(kind, config, embedder, llm, log)?;
    Ok(match kind {
        MemoryKind::Dilu => Box::new(DiluMemory { base }),
        MemoryKind::Generative => Box::new(GenerativeMemory { base }),
        MemoryKind::Tp => Box::new(TpMemory { base }),
        MemoryKind::Voyager => Box::new(VoyagerMemory { base }),
    })
}

// ---------------------------------------------------------------------------
// DILU: nearest trajectory, verbatim
// ---------------------------------------------------------------------------

pub struct DiluMemory {
    base: MemoryBase,
}

impl MemoryModule for DiluMemory {
    fn add_memory(&self, situation: &str) -> WssResult<()> {
        self.base.insert(situation, situation, None)
    }

    fn retrieve_memory(&self, query: &str) -> WssResult<String> {
        let count = self.base.store.count()?;
        if count == 0 {
            self.base.diag(
                "retrieve_memory",
                "memory_retrieval_empty",
                json!({ "query": truncate_chars(query, QUERY_LOG_CHARS) }),
            );
            return Ok(String::new());
        }

        let hits = self.base.search(query, 1)?;
        let result = hits
            .iter()
            .map(|(m, _)| m.trajectory.as_str())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        self.base.diag(
            "retrieve_memory",
            "memory_retrieved",
            json!({
                "query": truncate_chars(query, QUERY_LOG_CHARS),
                "memory_count": count,
                "similarity_score": hits.first().map(|(_, d)| *d),
                "result_length": result.chars().count(),
            }),
        );
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Generative: top-3, LLM-scored importance
// ---------------------------------------------------------------------------

pub struct GenerativeMemory {
    base: MemoryBase,
}

impl GenerativeMemory {
    fn importance_prompt(trajectory: &str, query: &str) -> String {
        format!(
            "You will be given a successful case where you successfully complete the task. \
Then you will be given an ongoing task. Do not summarize these two cases, but rather evaluate \
how relevant and helpful the successful case is for the ongoing task, on a scale of 1-10.\n\
Success Case:\n{trajectory}\n\
Ongoing task:\n{query}\n\
Your output format should be:\n\
Score: "
        )
    }
}

impl MemoryModule for GenerativeMemory {
    fn add_memory(&self, situation: &str) -> WssResult<()> {
        self.base.insert(situation, situation, None)
    }

    fn retrieve_memory(&self, query: &str) -> WssResult<String> {
        if self.base.is_empty()? {
            return Ok(String::new());
        }

        // (score, trajectory) pairs stay together so the winner can't drift
        // from its score when empty trajectories are skipped.
        let mut scored: Vec<(i64, String)> = Vec::new();
        for (memory, _) in self.base.search(query, 3)? {
            if memory.trajectory.is_empty() {
                continue;
            }
            let request = LlmRequest::user(Self::importance_prompt(&memory.trajectory, query))
                .temperature(0.1)
                .stop("\n")
                .origin(MODULE, "retrieve_memory");
            let score = first_integer(&self.base.llm.complete_one(&request)?);
            self.base.diag(
                "retrieve_memory",
                "importance_scored",
                json!({ "score": score, "trajectory_index": scored.len() }),
            );
            scored.push((score, memory.trajectory));
        }

        let Some(max_score) = scored.iter().map(|(s, _)| *s).max() else {
            return Ok(String::new());
        };
        let Some(selected) = scored.iter().position(|(s, _)| *s == max_score) else {
            return Ok(String::new());
        };

        self.base.diag(
            "retrieve_memory",
            "memory_selected",
            json!({
                "selected_index": selected,
                "max_score": max_score,
                "all_scores": scored.iter().map(|(s, _)| *s).collect::<Vec<_>>(),
            }),
        );
        Ok(scored.swap_remove(selected).1)
    }
}

// ---------------------------------------------------------------------------
// TP: nearest trajectory turned into a plan
// ---------------------------------------------------------------------------

pub struct TpMemory {
    base: MemoryBase,
}

impl TpMemory {
    fn plan_prompt(trajectory: &str, task: &str) -> String {
        format!(
            "You will be given a successful case where you successfully complete the task. \
Then you will be given an ongoing task. Do not summarize these two cases, but rather use the \
successful case to think about the strategy and path you took to attempt to complete the task \
in the ongoing task. Devise a concise, new plan of action that accounts for your task with \
reference to specific actions that you should have taken. You will need this later to solve \
the task. Give your plan after \"Plan\".\n\
Success Case:\n{trajectory}\n\
Ongoing task:\n{task}\n\
Plan:\n"
        )
    }
}

impl MemoryModule for TpMemory {
    fn add_memory(&self, situation: &str) -> WssResult<()> {
        self.base.insert(situation, situation, None)
    }

    fn retrieve_memory(&self, query: &str) -> WssResult<String> {
        if self.base.is_empty()? {
            return Ok(String::new());
        }

        let mut plans = Vec::new();
        for (memory, _) in self.base.search(query, 1)? {
            if memory.trajectory.is_empty() {
                continue;
            }
            let request = LlmRequest::user(Self::plan_prompt(&memory.trajectory, query))
                .temperature(0.1)
                .origin(MODULE, "retrieve_memory");
            plans.push(self.base.llm.complete_one(&request)?);
        }
        Ok(format!("{TP_PLAN_PREFIX}{}", plans.join("\n")))
    }
}

// ---------------------------------------------------------------------------
// Voyager: embed an LLM summary, return the raw trajectory
// ---------------------------------------------------------------------------

pub struct VoyagerMemory {
    base: MemoryBase,
}

impl VoyagerMemory {
    fn summary_prompt(trajectory: &str) -> String {
        format!(
            "You are a helpful assistant that writes a description of the task resolution \
trajectory.\n\n\
1) Try to summarize the trajectory in no more than 6 sentences.\n\
2) Your response should be a single line of text.\n\n\
Trajectory:\n{trajectory}"
        )
    }
}

impl MemoryModule for VoyagerMemory {
    fn add_memory(&self, situation: &str) -> WssResult<()> {
        let request = LlmRequest::user(Self::summary_prompt(situation))
            .temperature(0.1)
            .origin(MODULE, "add_memory");
        let summary = self.base.llm.complete_one(&request)?;
        self.base.insert(&summary, situation, Some(&summary))
    }

    fn retrieve_memory(&self, query: &str) -> WssResult<String> {
        if self.base.is_empty()? {
            return Ok(String::new());
        }
        let hits = self.base.search(query, 1)?;
        Ok(hits
            .into_iter()
            .map(|(m, _)| m.trajectory)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
