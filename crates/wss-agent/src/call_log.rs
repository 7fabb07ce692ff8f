//! JSON Lines log of every LLM call and module diagnostic.
//!
//! One JSON object per line. The first line is a header. Writing never
//! fails the caller: I/O errors are reported through `tracing` and dropped.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use chrono::Local;
use serde_json::{json, Value};
use tracing::debug;

use wss_core::{Llm, LlmRequest, WssError, WssResult};

pub struct CallLog {
    path: Option<PathBuf>,
    file: Mutex<Option<File>>,
    call_counter: AtomicU64,
}

impl CallLog {
    /// Log to `path`, creating parent directories. Appends to an existing file.
    pub fn open(path: &Path) -> WssResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let log = Self {
            path: Some(path.to_path_buf()),
            file: Mutex::new(Some(file)),
            call_counter: AtomicU64::new(0),
        };
        log.write_entry(&json!({
            "log_type": "header",
            "timestamp": now(),
            "description": "LLM call and module diagnostic log",
            "format": "one JSON object per line",
        }));
        Ok(log)
    }

    /// A log that records nothing.
    pub fn disabled() -> Self {
        Self {
            path: None,
            file: Mutex::new(None),
            call_counter: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.path.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn next_call_id(&self) -> u64 {
        self.call_counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn write_entry(&self, entry: &Value) {
        let Ok(mut guard) = self.file.lock() else {
            return;
        };
        let Some(file) = guard.as_mut() else {
            return;
        };
        let line = match serde_json::to_string(entry) {
            Ok(l) => l,
            Err(e) => {
                debug!("call log serialization failed: {e}");
                return;
            }
        };
        if let Err(e) = writeln!(file, "{line}") {
            debug!("call log write failed: {e}");
        }
    }

    /// Record one LLM call with its full input and outcome.
    pub fn log_llm_call(
        &self,
        request: &LlmRequest,
        model: &str,
        outcome: &WssResult<Vec<String>>,
        duration_ms: f64,
    ) {
        if !self.is_enabled() {
            return;
        }
        let (response, error) = match outcome {
            Ok(r) if request.n == 1 => (json!(r.first()), Value::Null),
            Ok(r) => (json!(r), Value::Null),
            Err(e) => (Value::Null, json!(e.to_string())),
        };
        self.write_entry(&json!({
            "log_type": "llm_call",
            "timestamp": now(),
            "call_id": self.next_call_id(),
            "module": request.origin.module,
            "function": request.origin.function,
            "input": {
                "messages": request.messages,
                "model": request.model.as_deref().unwrap_or(model),
                "temperature": request.temperature,
                "max_tokens": request.max_tokens,
                "stop_strs": request.stop,
                "n": request.n,
            },
            "output": {
                "response": response,
                "error": error,
                "duration_ms": duration_ms,
            },
        }));
    }

    pub fn log_module_diagnostic(
        &self,
        module: &str,
        function: &str,
        event_type: &str,
        data: Value,
        task_id: Option<&str>,
    ) {
        if !self.is_enabled() {
            return;
        }
        self.write_entry(&json!({
            "log_type": "module_diagnostic",
            "timestamp": now(),
            "module": module,
            "function": function,
            "event_type": event_type,
            "task_id": task_id,
            "data": data,
        }));
    }

    pub fn log_simulation_event(&self, event_type: &str, data: Value, task_id: Option<&str>) {
        if !self.is_enabled() {
            return;
        }
        self.write_entry(&json!({
            "log_type": "simulation_event",
            "timestamp": now(),
            "event_type": event_type,
            "task_id": task_id,
            "data": data,
        }));
    }
}

impl Default for CallLog {
    fn default() -> Self {
        Self::disabled()
    }
}

fn now() -> String {
    Local::now().to_rfc3339()
}

// ---------------------------------------------------------------------------
// LoggedLlm
// ---------------------------------------------------------------------------

/// Wraps any client and records each call, successful or not, in a log.
pub struct LoggedLlm<L> {
    inner: L,
    log: std::sync::Arc<CallLog>,
}

impl<L: Llm> LoggedLlm<L> {
    pub fn new(inner: L, log: std::sync::Arc<CallLog>) -> Self {
        Self { inner, log }
    }
}

impl<L: Llm> Llm for LoggedLlm<L> {
    fn complete(&self, request: &LlmRequest) -> WssResult<Vec<String>> {
        let start = Instant::now();
        let outcome = self.inner.complete(request);
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.log
            .log_llm_call(request, self.inner.model(), &outcome, duration_ms);
        outcome
    }

    fn model(&self) -> &str {
        self.inner.model()
    }
}

/// Parse a log file back into entries, skipping blank lines.
pub fn read_entries(path: &Path) -> WssResult<Vec<Value>> {
    let content = std::fs::read_to_string(path)?;
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(WssError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use wss_core::ScriptedLlm;

    #[test]
    fn test_header_written_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("calls.jsonl");
        let log = CallLog::open(&path).unwrap();
        assert!(log.is_enabled());
        drop(log);

        let entries = read_entries(&path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["log_type"], "header");
    }

    #[test]
    fn test_logged_llm_records_calls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calls.jsonl");
        let log = Arc::new(CallLog::open(&path).unwrap());
        let llm = LoggedLlm::new(ScriptedLlm::new(["stars: 4.0"]), log.clone());

        let req = LlmRequest::user("rate it").origin("reasoning", "reason");
        llm.complete_one(&req).unwrap();
        llm.complete(&req.clone().n(2)).unwrap();

        let entries = read_entries(&path).unwrap();
        let calls: Vec<_> = entries
            .iter()
            .filter(|e| e["log_type"] == "llm_call")
            .collect();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0]["call_id"], 1);
        assert_eq!(calls[1]["call_id"], 2);
        assert_eq!(calls[0]["module"], "reasoning");
        assert_eq!(calls[0]["input"]["model"], "scripted");
        assert_eq!(calls[0]["output"]["response"], "stars: 4.0");
        assert!(calls[1]["output"]["response"].is_array());
        assert_eq!(calls[0]["input"]["messages"][0]["role"], "user");
    }

    #[test]
    fn test_errors_are_logged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calls.jsonl");
        let log = Arc::new(CallLog::open(&path).unwrap());
        let llm = LoggedLlm::new(ScriptedLlm::new(Vec::<String>::new()), log);

        assert!(llm.complete(&LlmRequest::user("x")).is_err());
        let entries = read_entries(&path).unwrap();
        let call = entries.iter().find(|e| e["log_type"] == "llm_call").unwrap();
        assert!(call["output"]["error"].as_str().unwrap().contains("no responses"));
        assert!(call["output"]["response"].is_null());
    }

    #[test]
    fn test_diagnostics_and_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calls.jsonl");
        let log = CallLog::open(&path).unwrap();
        log.log_module_diagnostic(
            "memory",
            "retrieve_memory",
            "memory_retrieval_empty",
            json!({"memory_type": "dilu"}),
            None,
        );
        log.log_simulation_event("task_start", json!({"index": 0}), Some("0"));

        let entries = read_entries(&path).unwrap();
        assert_eq!(entries[1]["log_type"], "module_diagnostic");
        assert_eq!(entries[1]["event_type"], "memory_retrieval_empty");
        assert_eq!(entries[2]["log_type"], "simulation_event");
        assert_eq!(entries[2]["task_id"], "0");
    }

    #[test]
    fn test_disabled_log_is_silent() {
        let log = CallLog::disabled();
        assert!(!log.is_enabled());
        log.log_simulation_event("task_start", json!({}), None);
        assert!(log.path().is_none());
    }
}
