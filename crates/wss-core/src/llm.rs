use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{WssError, WssResult};

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Which module/function issued a call, for the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallOrigin {
    pub module: &'static str,
    pub function: &'static str,
}

impl CallOrigin {
    pub const fn new(module: &'static str, function: &'static str) -> Self {
        Self { module, function }
    }
}

#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub messages: Vec<Message>,
    /// Overrides the client's configured model.
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stop: Vec<String>,
    /// Number of completions wanted.
    pub n: usize,
    pub origin: CallOrigin,
}

impl LlmRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            model: None,
            temperature: 0.0,
            max_tokens: 500,
            stop: Vec::new(),
            n: 1,
            origin: CallOrigin::default(),
        }
    }

    pub fn user(prompt: impl Into<String>) -> Self {
        Self::new(vec![Message::user(prompt)])
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn stop(mut self, stop: impl Into<String>) -> Self {
        self.stop.push(stop.into());
        self
    }

    pub fn n(mut self, n: usize) -> Self {
        self.n = n.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn origin(mut self, module: &'static str, function: &'static str) -> Self {
        self.origin = CallOrigin::new(module, function);
        self
    }
}

// ---------------------------------------------------------------------------
// Client trait
// ---------------------------------------------------------------------------

pub trait Llm: Send + Sync {
    /// Returns up to `request.n` completions.
    fn complete(&self, request: &LlmRequest) -> WssResult<Vec<String>>;

    /// Configured model name.
    fn model(&self) -> &str;

    fn complete_one(&self, request: &LlmRequest) -> WssResult<String> {
        self.complete(request)?
            .into_iter()
            .next()
            .ok_or_else(|| WssError::Llm("empty response".into()))
    }
}

// ---------------------------------------------------------------------------
// Scripted client
// ---------------------------------------------------------------------------

/// Replays canned responses in order. Once the script runs out, the last
/// response keeps being returned. Every request is recorded.
///
/// Used for offline dry runs (`provider = "scripted"`) and in tests.
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<String>>,
    last: Mutex<Option<String>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlm {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests seen so far.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn next_response(&self) -> WssResult<String> {
        let mut queue = self
            .responses
            .lock()
            .map_err(|_| WssError::Llm("script lock poisoned".into()))?;
        let mut last = self
            .last
            .lock()
            .map_err(|_| WssError::Llm("script lock poisoned".into()))?;
        match queue.pop_front() {
            Some(r) => {
                *last = Some(r.clone());
                Ok(r)
            }
            None => last
                .clone()
                .ok_or_else(|| WssError::Llm("scripted llm has no responses".into())),
        }
    }
}

impl Llm for ScriptedLlm {
    fn complete(&self, request: &LlmRequest) -> WssResult<Vec<String>> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request.clone());
        }
        (0..request.n).map(|_| self.next_response()).collect()
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let req = LlmRequest::user("hi");
        assert_eq!(req.temperature, 0.0);
        assert_eq!(req.max_tokens, 500);
        assert_eq!(req.n, 1);
        assert!(req.stop.is_empty());
        assert_eq!(req.messages[0].role, Role::User);
    }

    #[test]
    fn test_request_builder() {
        let req = LlmRequest::user("hi")
            .temperature(0.7)
            .n(0)
            .stop("\n")
            .origin("memory", "retrieve");
        assert_eq!(req.n, 1);
        assert_eq!(req.stop, vec!["\n".to_string()]);
        assert_eq!(req.origin.module, "memory");
    }

    #[test]
    fn test_scripted_replays_then_repeats_last() {
        let llm = ScriptedLlm::new(["a", "b"]);
        let req = LlmRequest::user("x");
        assert_eq!(llm.complete_one(&req).unwrap(), "a");
        assert_eq!(llm.complete(&req.clone().n(3)).unwrap(), vec!["b", "b", "b"]);
        assert_eq!(llm.call_count(), 2);
    }

    #[test]
    fn test_scripted_empty_errors() {
        let llm = ScriptedLlm::new(Vec::<String>::new());
        assert!(llm.complete_one(&LlmRequest::user("x")).is_err());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::assistant("ok")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"ok"}"#);
    }
}
