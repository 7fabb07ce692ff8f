//! Eager dataset loading and task / ground-truth discovery.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing::{info, warn};

use wss_core::{GroundTruth, InteractionTool, Item, Review, Task, User, WssError, WssResult};

/// The whole prepared dataset held in hash maps, with per-user and
/// per-item review indices.
#[derive(Debug, Default)]
pub struct InMemoryDataset {
    users: HashMap<String, User>,
    items: HashMap<String, Item>,
    reviews: Vec<Review>,
    review_ids: HashMap<String, usize>,
    by_user: HashMap<String, Vec<usize>>,
    by_item: HashMap<String, Vec<usize>>,
}

impl InMemoryDataset {
    pub fn load(dir: &Path) -> WssResult<Self> {
        let mut ds = Self::default();
        for user in read_jsonl::<User>(&dir.join("user.json"))? {
            ds.users.insert(user.user_id.clone(), user);
        }
        for item in read_jsonl::<Item>(&dir.join("item.json"))? {
            ds.items.insert(item.item_id.clone(), item);
        }
        for review in read_jsonl::<Review>(&dir.join("review.json"))? {
            ds.add_review(review);
        }
        info!(
            users = ds.users.len(),
            items = ds.items.len(),
            reviews = ds.reviews.len(),
            "dataset loaded"
        );
        Ok(ds)
    }

    pub fn add_user(&mut self, user: User) {
        self.users.insert(user.user_id.clone(), user);
    }

    pub fn add_item(&mut self, item: Item) {
        self.items.insert(item.item_id.clone(), item);
    }

    pub fn add_review(&mut self, mut review: Review) {
        let idx = self.reviews.len();
        review.ensure_id(idx);
        self.review_ids.insert(review.review_id.clone(), idx);
        self.by_user
            .entry(review.user_id.clone())
            .or_default()
            .push(idx);
        self.by_item
            .entry(review.item_id.clone())
            .or_default()
            .push(idx);
        self.reviews.push(review);
    }

    fn collect(&self, index: Option<&Vec<usize>>) -> Vec<Review> {
        index
            .map(|ids| ids.iter().map(|&i| self.reviews[i].clone()).collect())
            .unwrap_or_default()
    }
}

impl InteractionTool for InMemoryDataset {
    fn get_user(&self, user_id: &str) -> WssResult<Option<User>> {
        Ok(self.users.get(user_id).cloned())
    }

    fn get_item(&self, item_id: &str) -> WssResult<Option<Item>> {
        Ok(self.items.get(item_id).cloned())
    }

    fn get_review(&self, review_id: &str) -> WssResult<Option<Review>> {
        Ok(self
            .review_ids
            .get(review_id)
            .map(|&i| self.reviews[i].clone()))
    }

    fn reviews_for_item(&self, item_id: &str) -> WssResult<Vec<Review>> {
        Ok(self.collect(self.by_item.get(item_id)))
    }

    fn reviews_by_user(&self, user_id: &str) -> WssResult<Vec<Review>> {
        Ok(self.collect(self.by_user.get(user_id)))
    }
}

/// Parse a JSON Lines file, skipping blank and malformed lines.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> WssResult<Vec<T>> {
    let file = File::open(path)
        .map_err(|e| WssError::Dataset(format!("cannot open {}: {e}", path.display())))?;
    let mut out = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(v) => out.push(v),
            Err(e) => warn!(file = %path.display(), line = n + 1, "skipping malformed record: {e}"),
        }
    }
    Ok(out)
}

/// `<prefix><n>.json` files of `dir`, ordered by `n`.
fn numbered_files(dir: &Path, prefix: &str) -> WssResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| WssError::Dataset(format!("cannot read {}: {e}", dir.display())))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(n) = name
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix(".json"))
            .and_then(|num| num.parse::<u64>().ok())
        else {
            continue;
        };
        files.push((n, path));
    }
    files.sort_by_key(|(n, _)| *n);
    Ok(files.into_iter().map(|(_, p)| p).collect())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> WssResult<T> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| WssError::Dataset(format!("{}: {e}", path.display())))
}

/// `task_<n>.json` files of `dir`, in numeric order.
pub fn load_task_list(dir: &Path) -> WssResult<Vec<Task>> {
    numbered_files(dir, "task_")?
        .iter()
        .map(|p| read_json(p))
        .collect()
}

/// `groundtruth_<n>.json` files of `dir`, in numeric order.
pub fn load_groundtruth(dir: &Path) -> WssResult<Vec<GroundTruth>> {
    numbered_files(dir, "groundtruth_")?
        .iter()
        .map(|p| read_json(p))
        .collect()
}

/// Load tasks and ground truth together. The two lists may differ in
/// length; evaluation pairs them by position.
pub fn load_tasks(task_dir: &Path, groundtruth_dir: &Path) -> WssResult<(Vec<Task>, Vec<GroundTruth>)> {
    let tasks = load_task_list(task_dir)?;
    let groundtruth = load_groundtruth(groundtruth_dir)?;
    if tasks.len() != groundtruth.len() {
        warn!(
            tasks = tasks.len(),
            groundtruth = groundtruth.len(),
            "task and ground-truth counts differ"
        );
    }
    info!(tasks = tasks.len(), "tasks loaded");
    Ok((tasks, groundtruth))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(path: &Path, body: &str) {
        let mut f = File::create(path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
    }

    #[test]
    fn test_load_and_index() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("user.json"), "{\"user_id\":\"u1\",\"name\":\"Ann\"}\n");
        write(
            &dir.path().join("item.json"),
            "{\"item_id\":\"b1\",\"city\":\"Philadelphia\"}\nbroken\n",
        );
        write(
            &dir.path().join("review.json"),
            concat!(
                "{\"review_id\":\"r1\",\"user_id\":\"u1\",\"item_id\":\"b1\",\"stars\":4,\"text\":\"good\"}\n",
                "{\"user_id\":\"u2\",\"item_id\":\"b1\",\"stars\":2,\"text\":\"bad\"}\n",
                "{\"user_id\":\"u2\",\"item_id\":\"b1\",\"stars\":3,\"text\":\"better\"}\n",
            ),
        );

        let ds = InMemoryDataset::load(dir.path()).unwrap();
        assert_eq!(ds.get_user("u1").unwrap().unwrap().fields["name"], "Ann");
        assert!(ds.get_item("b1").unwrap().is_some());
        assert_eq!(ds.reviews_for_item("b1").unwrap().len(), 3);
        assert_eq!(ds.reviews_by_user("u2").unwrap()[0].text, "bad");
        assert!(ds.reviews_by_user("nobody").unwrap().is_empty());
        assert_eq!(ds.get_review("u2:b1:1").unwrap().unwrap().stars, 2.0);
        assert_eq!(ds.get_review("u2:b1:2").unwrap().unwrap().text, "better");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            InMemoryDataset::load(dir.path()),
            Err(WssError::Dataset(_))
        ));
    }

    #[test]
    fn test_tasks_ordered_numerically() {
        let dir = tempfile::tempdir().unwrap();
        let tasks = dir.path().join("tasks");
        let gt = dir.path().join("groundtruth");
        std::fs::create_dir_all(&tasks).unwrap();
        std::fs::create_dir_all(&gt).unwrap();
        for n in [10, 2, 1] {
            write(
                &tasks.join(format!("task_{n}.json")),
                &format!("{{\"type\":\"user_behavior_simulation\",\"user_id\":\"u{n}\",\"item_id\":\"b{n}\"}}"),
            );
        }
        write(&tasks.join("notes.txt"), "ignored");
        for n in [2, 1] {
            write(
                &gt.join(format!("groundtruth_{n}.json")),
                &format!("{{\"stars\":{n}.0,\"review\":\"r{n}\"}}"),
            );
        }

        let (tasks, gts) = load_tasks(&tasks, &gt).unwrap();
        let users: Vec<&str> = tasks.iter().map(|t| t.user_id.as_str()).collect();
        assert_eq!(users, vec!["u1", "u2", "u10"]);
        assert_eq!(gts.len(), 2);
        assert_eq!(gts[0].review, "r1");
    }
}
