use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub preference_estimation: f64,
    pub review_generation: f64,
    pub overall_quality: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataInfo {
    pub evaluated_count: usize,
    pub original_simulation_count: usize,
    pub original_ground_truth_count: usize,
}

/// The metrics payload printed after a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    #[serde(rename = "type")]
    pub kind: String,
    pub metrics: Metrics,
    pub data_info: DataInfo,
}

impl EvaluationReport {
    pub fn new(metrics: Metrics, data_info: DataInfo) -> Self {
        Self {
            kind: "simulation".into(),
            metrics,
            data_info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let report = EvaluationReport::new(
            Metrics {
                preference_estimation: 0.8,
                review_generation: 0.7,
                overall_quality: 0.75,
            },
            DataInfo {
                evaluated_count: 5,
                original_simulation_count: 5,
                original_ground_truth_count: 6,
            },
        );
        let v = serde_json::to_value(&report).unwrap();
        assert_eq!(v["type"], "simulation");
        assert_eq!(v["metrics"]["overall_quality"], 0.75);
        assert_eq!(v["data_info"]["original_ground_truth_count"], 6);
        let keys: Vec<&String> = v.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["type", "metrics", "data_info"]);
    }
}
