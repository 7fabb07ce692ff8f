//! Prompting strategies that turn a task description into a
//! `stars: ... / review: ...` answer.

use std::fmt;
use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use wss_core::{Llm, LlmRequest, Message, WssResult};

use crate::call_log::CallLog;

const MODULE: &str = "reasoning";

/// Returned when sampling yields nothing to choose from.
pub const FALLBACK_ANSWER: &str = "stars: 3.0\nreview: Unable to generate review.";

const EXAMPLES: [&str; 2] = [
    "stars: 1.0\nreview: I had high hopes for the Masters Inn Fairgrounds, but my experience was \
a major letdown. The room was infested with roaches, and the furniture was old and falling \
apart. The staff was unhelpful and seemed disinterested in addressing the issues. The overall \
cleanliness and maintenance were poor, which made the stay very uncomfortable. Given my \
preference for well-maintained and clean environments, this place did not meet any of my \
standards. I would not recommend it to anyone, especially families or those looking for a \
pleasant stay.",
    "stars: 3.0\nreview: I visited Arizona Bug Doctor for pest control services, and my \
experience was mixed. On the positive side, the technicians were knowledgeable and thorough, \
which is important when dealing with pests. However, scheduling the appointment was a bit of \
a challenge, and the office staff could be more responsive. The limited hours of operation \
were also inconvenient. Overall, the service was effective, but there's room for improvement \
in customer service and flexibility.",
];

const DILU_SYSTEM: &str = "You are ChatGPT, a large language model trained by OpenAI. Now you \
act as a real human user on Yelp. You will be given a detailed description of the scenario of \
current frame along with your history of previous decisions.";

const TOT_CANDIDATES: usize = 3;
const TOT_VOTES: usize = 5;
const COTSC_SAMPLES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReasoningKind {
    Io,
    Cot,
    CotSc,
    #[default]
    Tot,
    Dilu,
    SelfRefine,
    StepBack,
}

impl ReasoningKind {
    pub const ALL: [ReasoningKind; 7] = [
        Self::Io,
        Self::Cot,
        Self::CotSc,
        Self::Tot,
        Self::Dilu,
        Self::SelfRefine,
        Self::StepBack,
    ];
}

impl fmt::Display for ReasoningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io => write!(f, "io"),
            Self::Cot => write!(f, "cot"),
            Self::CotSc => write!(f, "cotsc"),
            Self::Tot => write!(f, "tot"),
            Self::Dilu => write!(f, "dilu"),
            Self::SelfRefine => write!(f, "self_refine"),
            Self::StepBack => write!(f, "stepback"),
        }
    }
}

impl std::str::FromStr for ReasoningKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "io" => Ok(Self::Io),
            "cot" => Ok(Self::Cot),
            "cotsc" | "cot_sc" => Ok(Self::CotSc),
            "tot" => Ok(Self::Tot),
            "dilu" => Ok(Self::Dilu),
            "self_refine" | "selfrefine" => Ok(Self::SelfRefine),
            "stepback" | "step_back" => Ok(Self::StepBack),
            _ => Err(format!("invalid reasoning kind: {s}")),
        }
    }
}

fn render_examples() -> String {
    EXAMPLES
        .iter()
        .enumerate()
        .map(|(i, e)| format!("Example {}:\n{e}", i + 1))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn solve_prompt(task: &str, extra: &str) -> String {
    format!(
        "Solve the task step by step. Your instructions must follow the examples.\n\
Here are some examples.\n{}{extra}\n\
Here is the task:\n{task}",
        render_examples()
    )
}

/// Majority answer, first seen wins ties.
fn majority(answers: &[String]) -> Option<&String> {
    let mut best: Option<(&String, usize)> = None;
    for (i, a) in answers.iter().enumerate() {
        // Count each distinct answer once, at its first position.
        if answers[..i].contains(a) {
            continue;
        }
        let count = answers.iter().filter(|b| *b == a).count();
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((a, count));
        }
    }
    best.map(|(a, _)| a)
}

/// 0-based candidate index from a vote like "The best answer is 2".
pub fn parse_vote(output: &str, candidates: usize) -> Option<usize> {
    let lower = output.to_lowercase();
    let rest = &lower[lower.find("best answer is")? + "best answer is".len()..];
    let digits: String = rest
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let vote: usize = digits.parse().ok()?;
    (1..=candidates).contains(&vote).then(|| vote - 1)
}

/// Index with the most votes, lowest index on ties.
fn select_by_votes(votes: &[usize]) -> usize {
    let mut best = 0;
    for (i, v) in votes.iter().enumerate() {
        if *v > votes[best] {
            best = i;
        }
    }
    best
}

pub struct Reasoner {
    kind: ReasoningKind,
    llm: Arc<dyn Llm>,
    log: Arc<CallLog>,
}

impl Reasoner {
    pub fn new(kind: ReasoningKind, llm: Arc<dyn Llm>, log: Arc<CallLog>) -> Self {
        Self { kind, llm, log }
    }

    pub fn reason(&self, task: &str) -> WssResult<String> {
        debug!(kind = %self.kind, "reasoning");
        match self.kind {
            ReasoningKind::Io => self.io(task),
            ReasoningKind::Cot => self.single(solve_prompt(task, "")),
            ReasoningKind::CotSc => self.cot_sc(task),
            ReasoningKind::Tot => self.tot(task),
            ReasoningKind::Dilu => self.dilu(task),
            ReasoningKind::SelfRefine => self.self_refine(task),
            ReasoningKind::StepBack => self.step_back(task),
        }
    }

    fn diag(&self, function: &str, event: &str, data: serde_json::Value) {
        self.log
            .log_module_diagnostic(MODULE, function, event, data, None);
    }

    fn single(&self, prompt: String) -> WssResult<String> {
        let request = LlmRequest::user(prompt)
            .temperature(0.1)
            .origin(MODULE, "reason");
        self.llm.complete_one(&request)
    }

    fn io(&self, task: &str) -> WssResult<String> {
        self.diag(
            "reason",
            "reasoning_started",
            json!({
                "reasoning_type": "IO",
                "task_length": task.chars().count(),
                "examples_count": EXAMPLES.len(),
            }),
        );
        let prompt = format!(
            "Your instructions must follow the examples.\n\
Here are some examples.\n{}\n\
Here is the task:\n{task}",
            render_examples()
        );
        let result = self.single(prompt)?;
        self.diag(
            "reason",
            "reasoning_completed",
            json!({ "reasoning_type": "IO", "result_length": result.chars().count() }),
        );
        Ok(result)
    }

    fn cot_sc(&self, task: &str) -> WssResult<String> {
        let request = LlmRequest::user(solve_prompt(task, ""))
            .temperature(0.1)
            .n(COTSC_SAMPLES)
            .origin(MODULE, "reason");
        let answers = self.llm.complete(&request)?;
        Ok(majority(&answers)
            .cloned()
            .unwrap_or_else(|| FALLBACK_ANSWER.to_string()))
    }

    fn tot(&self, task: &str) -> WssResult<String> {
        self.diag(
            "reason",
            "reasoning_started",
            json!({
                "reasoning_type": "TOT",
                "task_length": task.chars().count(),
                "examples_count": EXAMPLES.len(),
                "n_candidates": TOT_CANDIDATES,
            }),
        );

        let request = LlmRequest::user(solve_prompt(task, ""))
            .temperature(0.1)
            .n(TOT_CANDIDATES)
            .origin(MODULE, "reason");
        let mut candidates = self.llm.complete(&request)?;
        if candidates.is_empty() {
            candidates.push(FALLBACK_ANSWER.to_string());
        }
        self.diag(
            "reason",
            "reasoning_candidates_generated",
            json!({ "reasoning_type": "TOT", "candidates_count": candidates.len() }),
        );

        let result = self.vote(task, candidates)?;
        self.diag(
            "reason",
            "reasoning_completed",
            json!({ "reasoning_type": "TOT", "result_length": result.chars().count() }),
        );
        Ok(result)
    }

    fn vote(&self, task: &str, mut candidates: Vec<String>) -> WssResult<String> {
        // A candidate that is still thinking aloud is taken as is.
        if candidates[0].to_lowercase().contains("think") {
            return Ok(candidates.swap_remove(0));
        }

        let mut prompt = format!(
            "Given the reasoning process for two completed tasks and one ongoing task, and \
several answers for the next step, decide which answer best follows the reasoning process for \
example command format. Output \"The best answer is {{s}}\", where s is the integer id chosen.\n\
Here are some examples.\n{}\n\
Here is the task:\n{task}\n\n",
            render_examples()
        );
        for (i, c) in candidates.iter().enumerate() {
            prompt.push_str(&format!("Answer {}:\n{c}\n", i + 1));
        }

        let request = LlmRequest::user(prompt)
            .temperature(0.7)
            .n(TOT_VOTES)
            .origin(MODULE, "vote");
        let outputs = self.llm.complete(&request)?;

        let mut votes = vec![0usize; candidates.len()];
        for output in &outputs {
            match parse_vote(output, candidates.len()) {
                Some(i) => votes[i] += 1,
                None => debug!("vote did not name a candidate: {output:?}"),
            }
        }
        let selected = select_by_votes(&votes);
        self.diag(
            "vote",
            "vote_selection",
            json!({
                "reasoning_type": "TOT",
                "vote_results": votes,
                "selected_id": selected,
                "votes_count": outputs.len(),
            }),
        );
        Ok(candidates.swap_remove(selected))
    }

    fn dilu(&self, task: &str) -> WssResult<String> {
        let user = format!(
            "Above messages are some examples of how you make a step successfully in the past. \
Those scenarios are similar to the current scenario. You should refer to those examples to \
make a step for the current scenario. Your instructions must follow the examples.\n\
Here are two examples.\n{}\n\
Here is the task:\n{task}",
            render_examples()
        );
        let request = LlmRequest::new(vec![Message::system(DILU_SYSTEM), Message::user(user)])
            .temperature(0.1)
            .origin(MODULE, "reason");
        self.llm.complete_one(&request)
    }

    fn self_refine(&self, task: &str) -> WssResult<String> {
        let draft = self.single(solve_prompt(task, ""))?;
        let prompt = format!(
            "Reflect on the reasoning process and identify any potential errors or areas for \
improvement. Provide a revised version of the reasoning if necessary.\n\
Here is the original reasoning:\n{draft}\n"
        );
        let request = LlmRequest::user(prompt)
            .temperature(0.0)
            .origin(MODULE, "refine");
        self.llm.complete_one(&request)
    }

    fn step_back(&self, task: &str) -> WssResult<String> {
        let request = LlmRequest::user(format!(
            "What common sense, instruction structure is involved in solving this task?\n{task}"
        ))
        .temperature(0.1)
        .origin(MODULE, "stepback");
        let principle = self.llm.complete_one(&request)?;
        self.single(solve_prompt(task, &format!("\n{principle}")))
    }
}
