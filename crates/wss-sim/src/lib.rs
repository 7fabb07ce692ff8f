pub mod ablation;
pub mod dataset;
pub mod lexicon;
pub mod metrics;
pub mod report;
pub mod simulator;

pub use ablation::{run_ablation, AblationReport, Metric, OrderingCheck};
pub use dataset::{load_groundtruth, load_task_list, load_tasks, read_jsonl, InMemoryDataset};
pub use metrics::evaluate;
pub use report::{DataInfo, EvaluationReport, Metrics};
pub use simulator::{Simulator, TaskOutcome};
