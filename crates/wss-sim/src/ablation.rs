//! Side-by-side comparison of agent variants.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use wss_agent::AgentSpec;
use wss_core::{WssError, WssResult};

use crate::report::EvaluationReport;
use crate::simulator::Simulator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Preference,
    Review,
    Overall,
}

impl Metric {
    pub fn of(&self, report: &EvaluationReport) -> f64 {
        match self {
            Self::Preference => report.metrics.preference_estimation,
            Self::Review => report.metrics.review_generation,
            Self::Overall => report.metrics.overall_quality,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preference => write!(f, "preference_estimation"),
            Self::Review => write!(f, "review_generation"),
            Self::Overall => write!(f, "overall_quality"),
        }
    }
}

impl std::str::FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "preference" | "preference_estimation" => Ok(Self::Preference),
            "review" | "review_generation" => Ok(Self::Review),
            "overall" | "overall_quality" => Ok(Self::Overall),
            _ => Err(format!("invalid metric: {s}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AblationReport {
    pub rows: Vec<(String, EvaluationReport)>,
}

/// Outcome of checking a claim such as `Voyager > Generative > TP`.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderingCheck {
    pub holds: bool,
    /// Adjacent pairs of the claim that the table contradicts.
    pub violations: Vec<String>,
}

impl AblationReport {
    pub fn push(&mut self, label: impl Into<String>, report: EvaluationReport) {
        self.rows.push((label.into(), report));
    }

    /// Row whose label matches `name`, ignoring case. A bare memory name
    /// also matches a `reasoning+memory` label.
    pub fn find(&self, name: &str) -> Option<&EvaluationReport> {
        let name = name.trim().to_lowercase();
        self.rows
            .iter()
            .find(|(label, _)| {
                let label = label.to_lowercase();
                label == name || label.rsplit('+').next() == Some(name.as_str())
            })
            .map(|(_, r)| r)
    }

    /// Labels by descending `metric`; ties keep table order.
    pub fn ranking(&self, metric: Metric) -> Vec<(&str, f64)> {
        let mut ranked: Vec<(&str, f64)> = self
            .rows
            .iter()
            .map(|(label, r)| (label.as_str(), metric.of(r)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    /// Percent change of `label` relative to `baseline`. `None` when either
    /// row is missing or the baseline is zero.
    pub fn relative_change(&self, label: &str, baseline: &str, metric: Metric) -> Option<f64> {
        let value = metric.of(self.find(label)?);
        let base = metric.of(self.find(baseline)?);
        if base == 0.0 {
            return None;
        }
        Some((value - base) / base * 100.0)
    }

    /// Verify a `A > B > C` claim against the table on `metric`.
    pub fn check_ordering(&self, claim: &str, metric: Metric) -> WssResult<OrderingCheck> {
        let names: Vec<&str> = claim.split('>').map(str::trim).collect();
        if names.len() < 2 || names.iter().any(|n| n.is_empty()) {
            return Err(WssError::Config(format!("not an ordering claim: {claim}")));
        }
        let mut values = Vec::with_capacity(names.len());
        for name in &names {
            let report = self
                .find(name)
                .ok_or_else(|| WssError::NotFound(format!("no ablation row for {name}")))?;
            values.push(metric.of(report));
        }

        let violations: Vec<String> = names
            .windows(2)
            .zip(values.windows(2))
            .filter(|(_, v)| v[0] <= v[1])
            .map(|(n, v)| format!("{} ({:.4}) is not above {} ({:.4})", n[0], v[0], n[1], v[1]))
            .collect();
        Ok(OrderingCheck {
            holds: violations.is_empty(),
            violations,
        })
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::from(
            "| Variant | Preference | Review | Overall | Evaluated |\n\
             |---------|-----------:|-------:|--------:|----------:|\n",
        );
        for (label, r) in &self.rows {
            out.push_str(&format!(
                "| {label} | {:.4} | {:.4} | {:.4} | {} |\n",
                r.metrics.preference_estimation,
                r.metrics.review_generation,
                r.metrics.overall_quality,
                r.data_info.evaluated_count,
            ));
        }
        let ranking = self
            .ranking(Metric::Overall)
            .iter()
            .map(|(label, _)| *label)
            .collect::<Vec<_>>()
            .join(" > ");
        if !ranking.is_empty() {
            out.push_str(&format!("\nRanking by overall quality: {ranking}\n"));
        }
        out
    }
}

/// Run each agent configuration over the simulator's tasks, one row per configuration.
pub fn run_ablation(
    sim: &mut Simulator,
    specs: &[AgentSpec],
    number_of_tasks: Option<usize>,
    threading: bool,
    max_workers: usize,
) -> WssResult<AblationReport> {
    let mut report = AblationReport::default();
    for spec in specs {
        sim.set_spec(*spec);
        sim.run(number_of_tasks, threading, max_workers)?;
        let eval = sim.evaluate()?;
        info!(
            agent = %spec.label(),
            overall = eval.metrics.overall_quality,
            "ablation row"
        );
        report.push(spec.label(), eval);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{DataInfo, Metrics};

    fn row(pref: f64, review: f64) -> EvaluationReport {
        EvaluationReport::new(
            Metrics {
                preference_estimation: pref,
                review_generation: review,
                overall_quality: (pref + review) / 2.0,
            },
            DataInfo {
                evaluated_count: 5,
                original_simulation_count: 5,
                original_ground_truth_count: 5,
            },
        )
    }

    fn table() -> AblationReport {
        let mut t = AblationReport::default();
        t.push("tot+dilu", row(0.70, 0.80));
        t.push("tot+generative", row(0.80, 0.82));
        t.push("tot+tp", row(0.75, 0.80));
        t.push("tot+voyager", row(0.85, 0.83));
        t
    }

    #[test]
    fn test_ranking_descending_and_stable() {
        let t = table();
        let labels: Vec<&str> = t.ranking(Metric::Overall).iter().map(|(l, _)| *l).collect();
        assert_eq!(labels, vec!["tot+voyager", "tot+generative", "tot+tp", "tot+dilu"]);

        let mut tied = AblationReport::default();
        tied.push("a", row(0.5, 0.5));
        tied.push("b", row(0.5, 0.5));
        let labels: Vec<&str> = tied.ranking(Metric::Overall).iter().map(|(l, _)| *l).collect();
        assert_eq!(labels, vec!["a", "b"]);
    }

    #[test]
    fn test_relative_change() {
        let t = table();
        let change = t.relative_change("voyager", "dilu", Metric::Preference).unwrap();
        assert!((change - (0.85 - 0.70) / 0.70 * 100.0).abs() < 1e-9);
        assert!(t.relative_change("missing", "dilu", Metric::Overall).is_none());

        let mut zero = AblationReport::default();
        zero.push("a", row(0.0, 0.0));
        zero.push("b", row(0.5, 0.5));
        assert!(zero.relative_change("b", "a", Metric::Overall).is_none());
    }

    #[test]
    fn test_check_ordering() {
        let t = table();
        let ok = t.check_ordering("Voyager > Generative > TP > DILU", Metric::Overall).unwrap();
        assert!(ok.holds);

        let bad = t.check_ordering("DILU > TP", Metric::Overall).unwrap();
        assert!(!bad.holds);
        assert_eq!(bad.violations.len(), 1);

        assert!(matches!(
            t.check_ordering("Voyager > Reflexion", Metric::Overall),
            Err(WssError::NotFound(_))
        ));
        assert!(t.check_ordering("Voyager", Metric::Overall).is_err());
    }

    #[test]
    fn test_markdown_table() {
        let md = table().to_markdown();
        assert!(md.contains("| tot+voyager | 0.8500 | 0.8300 | 0.8400 | 5 |"));
        assert!(md.contains("Ranking by overall quality: tot+voyager > tot+generative"));
        assert!(AblationReport::default().to_markdown().starts_with("| Variant"));
    }

    #[test]
    fn test_run_ablation_one_row_per_spec() {
        use crate::dataset::InMemoryDataset;
        use std::sync::Arc;
        use wss_agent::ReasoningKind;
        use wss_core::{GroundTruth, HashingEmbedder, MemoryKind, ScriptedLlm, Task};

        let mut sim = Simulator::new(
            Arc::new(InMemoryDataset::default()),
            Arc::new(ScriptedLlm::new(["stars: 4.0\nreview: fine"])),
            Arc::new(HashingEmbedder::new(16)),
            AgentSpec::default(),
        );
        sim.set_tasks(
            vec![Task::new("u", "b")],
            vec![GroundTruth {
                stars: 4.0,
                review: "fine".into(),
            }],
        );
        let specs: Vec<AgentSpec> = [MemoryKind::Dilu, MemoryKind::Tp]
            .into_iter()
            .map(|m| AgentSpec {
                reasoning: ReasoningKind::Io,
                memory: Some(m),
            })
            .collect();

        let report = run_ablation(&mut sim, &specs, None, false, 1).unwrap();
        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[0].0, "io+dilu");
        assert_eq!(report.rows[1].0, "io+tp");
        assert_eq!(report.rows[0].1.metrics.overall_quality, 1.0);
    }

    #[test]
    fn test_metric_names() {
        assert_eq!("overall".parse::<Metric>().unwrap(), Metric::Overall);
        assert_eq!(Metric::Review.to_string(), "review_generation");
        assert!("speed".parse::<Metric>().is_err());
    }
}
