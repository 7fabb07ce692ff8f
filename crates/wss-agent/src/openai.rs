//! OpenAI-compatible `/chat/completions` client (OpenAI, vLLM, Ollama, ...).

use std::time::Duration;

use serde_json::{json, Value};
use tracing::debug;

use wss_core::{Llm, LlmRequest, WssError, WssResult};

use crate::http::{build_agent, collect_n, post_json, RetryPolicy};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiLlm {
    api_key: Option<String>,
    model: String,
    base_url: String,
    agent: ureq::Agent,
    retry: RetryPolicy,
}

impl OpenAiLlm {
    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            api_key,
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
}

impl Llm for OpenAiLlm {
    fn complete(&self, request: &LlmRequest) -> WssResult<Vec<String>> {
        let url = format!("{}/chat/completions", self.base_url);
        let model = request.model.as_deref().unwrap_or(&self.model);
        let auth = self.api_key.as_ref().map(|k| format!("Bearer {k}"));

        collect_n(request.n, |remaining| {
            debug!(remaining, %model, "chat completion request");
            let mut headers = vec![("Content-Type", "application/json")];
            if let Some(auth) = &auth {
                headers.push(("Authorization", auth.as_str()));
            }
            let body = build_body(request, model, remaining);
            let resp = post_json(&self.agent, &url, &headers, &body, &self.retry)?;
            parse_response(&resp)
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}

pub fn build_body(request: &LlmRequest, model: &str, n: usize) -> Value {
    let messages: Vec<Value> = request
        .messages
        .iter()
        .map(|m| json!({ "role": m.role.to_string(), "content": m.content }))
        .collect();
    let mut body = json!({
        "model": model,
        "messages": messages,
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
        "n": n,
    });
    if !request.stop.is_empty() {
        body["stop"] = json!(request.stop);
    }
    body
}

pub fn parse_response(resp: &Value) -> WssResult<Vec<String>> {
    if let Some(msg) = resp["error"]["message"].as_str() {
        return Err(WssError::Llm(format!("API error: {msg}")));
    }
    let choices = resp["choices"]
        .as_array()
        .ok_or_else(|| WssError::Llm("no choices in API response".into()))?;
    let texts: Vec<String> = choices
        .iter()
        .filter_map(|c| c["message"]["content"].as_str())
        .map(String::from)
        .collect();
    if texts.is_empty() {
        return Err(WssError::Llm("no message content in API response".into()));
    }
    Ok(texts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wss_core::Message;

    #[test]
    fn test_body_shape() {
        let req = LlmRequest::new(vec![Message::system("sys"), Message::user("hi")])
            .stop("\n")
            .n(3);
        let body = build_body(&req, "gpt-4o-mini", 2);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["n"], 2);
        assert_eq!(body["stop"][0], "\n");
        assert_eq!(body["max_tokens"], 500);
    }

    #[test]
    fn test_parse_choices() {
        let resp = json!({
            "choices": [
                {"message": {"role": "assistant", "content": "a"}},
                {"message": {"role": "assistant", "content": "b"}},
            ]
        });
        assert_eq!(parse_response(&resp).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_parse_errors() {
        let err = parse_response(&json!({"error": {"message": "bad key"}})).unwrap_err();
        assert!(err.to_string().contains("bad key"));
        assert!(parse_response(&json!({"choices": []})).is_err());
        assert!(parse_response(&json!({})).is_err());
    }
}
