//! Google Gemini `generateContent` client.

use std::time::Duration;

use serde_json::{json, Value};
use tracing::debug;

use wss_core::{Llm, LlmRequest, Role, WssError, WssResult};

use crate::http::{build_agent, collect_n, post_json, RetryPolicy};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

pub struct GeminiLlm {
    api_key: String,
    model: String,
    base_url: String,
    agent: ureq::Agent,
    retry: RetryPolicy,
}

impl GeminiLlm {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.into(),
            agent: build_agent(Duration::from_secs(120)),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    fn generate(&self, request: &LlmRequest, count: usize) -> WssResult<Vec<String>> {
        let model = request.model.as_deref().unwrap_or(&self.model);
        let url = format!(
            "{}/v1beta/models/{model}:generateContent?key={}",
            self.base_url, self.api_key
        );
        let body = build_body(request, count);
        let resp = post_json(
            &self.agent,
            &url,
            &[("Content-Type", "application/json")],
            &body,
            &self.retry,
        )?;
        parse_response(&resp, request.max_tokens)
    }
}

impl Llm for GeminiLlm {
    fn complete(&self, request: &LlmRequest) -> WssResult<Vec<String>> {
        collect_n(request.n, |remaining| {
            debug!(remaining, model = %self.model, "gemini request");
            self.generate(request, remaining)
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Request body. System messages go to `systemInstruction`; assistant
/// turns use Gemini's `model` role.
pub fn build_body(request: &LlmRequest, candidate_count: usize) -> Value {
    let system: Vec<Value> = request
        .messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| json!({ "text": m.content }))
        .collect();
    let contents: Vec<Value> = request
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| {
            let role = if m.role == Role::Assistant { "model" } else { "user" };
            json!({ "role": role, "parts": [{ "text": m.content }] })
        })
        .collect();

    let mut config = json!({
        "temperature": request.temperature,
        "maxOutputTokens": request.max_tokens,
        "candidateCount": candidate_count,
    });
    if !request.stop.is_empty() {
        config["stopSequences"] = json!(request.stop);
    }

    let mut body = json!({ "contents": contents, "generationConfig": config });
    if !system.is_empty() {
        body["systemInstruction"] = json!({ "parts": system });
    }
    body
}

fn candidate_text(candidate: &Value) -> Option<String> {
    let parts = candidate["content"]["parts"].as_array()?;
    let text: String = parts
        .iter()
        .filter(|p| !p["thought"].as_bool().unwrap_or(false))
        .filter_map(|p| p["text"].as_str())
        .collect();
    (!text.is_empty()).then_some(text)
}

/// Extract candidate texts, turning blocked or empty responses into errors.
pub fn parse_response(resp: &Value, max_tokens: u32) -> WssResult<Vec<String>> {
    if let Some(reason) = resp["promptFeedback"]["blockReason"].as_str() {
        return Err(WssError::Llm(format!("prompt blocked: {reason}")));
    }
    let candidates = resp["candidates"].as_array().map(Vec::as_slice).unwrap_or(&[]);
    if candidates.is_empty() {
        return Err(WssError::Llm("no candidates in API response".into()));
    }

    let mut texts = Vec::new();
    let mut last_problem = None;
    for candidate in candidates {
        let finish = candidate["finishReason"].as_str().unwrap_or("");
        if matches!(finish, "SAFETY" | "RECITATION") {
            last_problem = Some(format!("content was blocked, finish reason: {finish}"));
            continue;
        }
        match candidate_text(candidate) {
            Some(t) => texts.push(t),
            None if finish == "MAX_TOKENS" => {
                last_problem = Some(format!(
                    "response hit MAX_TOKENS limit ({max_tokens} tokens) but returned no text; \
                     the limit is too small, increase max_tokens"
                ));
            }
            None => {
                last_problem = Some(format!(
                    "candidate has no extractable text, finish reason: {finish}"
                ));
            }
        }
    }

    match (texts.is_empty(), last_problem) {
        (true, Some(problem)) => Err(WssError::Llm(problem)),
        _ => Ok(texts),
    }
}
