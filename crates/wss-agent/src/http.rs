//! Blocking JSON POST with exponential-backoff retry, shared by the
//! provider clients.

use std::time::Duration;

use serde_json::Value;
use tracing::warn;

use wss_core::{WssError, WssResult};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// No retries, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based): doubles each time,
    /// capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Rate limits and server-side failures are worth another try.
pub fn is_retryable_status(code: u16) -> bool {
    code == 429 || (500..600).contains(&code)
}

pub fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new().timeout(timeout).build()
}

pub fn post_json(
    agent: &ureq::Agent,
    url: &str,
    headers: &[(&str, &str)],
    body: &Value,
    retry: &RetryPolicy,
) -> WssResult<Value> {
    let attempts = retry.max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        let mut req = agent.post(url);
        for (k, v) in headers {
            req = req.set(k, v);
        }

        match req.send_json(body) {
            Ok(resp) => {
                return resp
                    .into_json::<Value>()
                    .map_err(|e| WssError::Llm(format!("invalid response body: {e}")));
            }
            Err(ureq::Error::Status(code, resp)) => {
                let text = resp.into_string().unwrap_or_default();
                if !is_retryable_status(code) {
                    return Err(WssError::Llm(format!("HTTP {code}: {text}")));
                }
                last_error = format!("HTTP {code}: {text}");
            }
            Err(ureq::Error::Transport(t)) => {
                last_error = format!("transport error: {t}");
            }
        }

        if attempt < attempts {
            let delay = retry.delay_for(attempt);
            warn!(attempt, ?delay, "LLM request failed, retrying: {last_error}");
            std::thread::sleep(delay);
        }
    }

    Err(WssError::Llm(format!(
        "giving up after {attempts} attempts: {last_error}"
    )))
}

/// Keep asking `fetch(remaining)` until `n` responses are gathered. Stops
/// early once a round adds nothing, so a provider that never returns more
/// than it did cannot loop forever.
pub fn collect_n<F>(n: usize, mut fetch: F) -> WssResult<Vec<String>>
where
    F: FnMut(usize) -> WssResult<Vec<String>>,
{
    let n = n.max(1);
    let mut out = fetch(n)?;
    while out.len() < n {
        let more = fetch(n - out.len())?;
        if more.is_empty() {
            break;
        }
        out.extend(more);
    }
    out.truncate(n);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(500));
        assert_eq!(policy.delay_for(40), Duration::from_millis(500));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(401));
    }

    #[test]
    fn test_collect_n_fills_across_rounds() {
        let mut rounds = vec![vec!["a".to_string()], vec!["b".into(), "c".into(), "d".into()]];
        let out = collect_n(3, |_| Ok(rounds.remove(0))).unwrap();
        assert_eq!(out, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_collect_n_stops_on_empty_round() {
        let mut calls = 0;
        let out = collect_n(3, |_| {
            calls += 1;
            Ok(if calls == 1 { vec!["only".into()] } else { vec![] })
        })
        .unwrap();
        assert_eq!(out, vec!["only"]);
        assert_eq!(calls, 2);
    }
}
