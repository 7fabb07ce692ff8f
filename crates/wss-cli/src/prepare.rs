//! Turn the raw Yelp Open Dataset into the JSON Lines files the simulator
//! reads: `item.json`, `review.json` and `user.json`.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use serde_json::{Map, Value};
use tracing::{info, warn};

pub const BUSINESS_FILE: &str = "yelp_academic_dataset_business.json";
pub const USER_FILE: &str = "yelp_academic_dataset_user.json";
pub const REVIEW_FILE: &str = "yelp_academic_dataset_review.json";

pub const DEFAULT_CITY: &str = "Philadelphia";

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PrepareStats {
    pub items: usize,
    pub reviews: usize,
    pub users: usize,
    pub skipped: usize,
}

/// Plain file, or the same name with `.gz`.
fn locate(input_dir: &Path, name: &str) -> Option<PathBuf> {
    let plain = input_dir.join(name);
    if plain.exists() {
        return Some(plain);
    }
    let gz = input_dir.join(format!("{name}.gz"));
    gz.exists().then_some(gz)
}

fn open_lines(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader: Box<dyn Read> = if path.extension().is_some_and(|e| e == "gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufReader::new(reader)))
}

/// Stream JSON objects from `path`, counting unparseable lines in `skipped`.
fn for_each_record<F>(path: &Path, skipped: &mut usize, mut f: F) -> Result<()>
where
    F: FnMut(Map<String, Value>) -> Result<()>,
{
    for (n, line) in open_lines(path)?.lines().enumerate() {
        let line = line.with_context(|| format!("reading {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(&line) {
            Ok(Value::Object(obj)) => f(obj)?,
            Ok(_) | Err(_) => {
                warn!(file = %path.display(), line = n + 1, "skipping malformed record");
                *skipped += 1;
            }
        }
    }
    Ok(())
}

/// Rename `business_id` to `item_id` in place of the original key.
fn rename_business_id(obj: Map<String, Value>) -> Map<String, Value> {
    obj.into_iter()
        .map(|(k, v)| {
            if k == "business_id" {
                ("item_id".to_string(), v)
            } else {
                (k, v)
            }
        })
        .collect()
}

fn tag(mut obj: Map<String, Value>, business: bool) -> Map<String, Value> {
    obj.insert("source".into(), Value::from("yelp"));
    if business {
        obj.insert("type".into(), Value::from("business"));
    }
    obj
}

fn write_record(out: &mut impl Write, obj: &Map<String, Value>) -> Result<()> {
    serde_json::to_writer(&mut *out, obj)?;
    out.write_all(b"\n")?;
    Ok(())
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    Ok(BufWriter::new(
        File::create(path).with_context(|| format!("creating {}", path.display()))?,
    ))
}

/// Keep businesses in `cities`, their reviews, and the users who wrote
/// those reviews.
pub fn prepare_yelp(input_dir: &Path, output_dir: &Path, cities: &[String]) -> Result<PrepareStats> {
    let mut missing = Vec::new();
    let mut paths = Vec::new();
    for name in [BUSINESS_FILE, REVIEW_FILE, USER_FILE] {
        match locate(input_dir, name) {
            Some(p) => paths.push(p),
            None => missing.push(name),
        }
    }
    if !missing.is_empty() {
        bail!(
            "missing required files in {}:\n{}",
            input_dir.display(),
            missing
                .iter()
                .map(|m| format!("- {m}"))
                .collect::<Vec<_>>()
                .join("\n")
        );
    }
    let (business_path, review_path, user_path) = (&paths[0], &paths[1], &paths[2]);

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;
    let cities: HashSet<&str> = cities.iter().map(String::as_str).collect();
    let mut stats = PrepareStats::default();

    info!(?cities, "filtering businesses");
    let mut business_ids = HashSet::new();
    let mut items = create(&output_dir.join("item.json"))?;
    for_each_record(business_path, &mut stats.skipped, |obj| {
        let in_city = obj
            .get("city")
            .and_then(Value::as_str)
            .is_some_and(|c| cities.contains(c));
        let Some(id) = obj.get("business_id").and_then(Value::as_str) else {
            return Ok(());
        };
        if in_city {
            business_ids.insert(id.to_string());
            write_record(&mut items, &tag(rename_business_id(obj), true))?;
            stats.items += 1;
        }
        Ok(())
    })?;
    items.flush()?;
    info!(businesses = stats.items, "businesses kept");

    let mut user_ids = HashSet::new();
    let mut reviews = create(&output_dir.join("review.json"))?;
    for_each_record(review_path, &mut stats.skipped, |obj| {
        let keep = obj
            .get("business_id")
            .and_then(Value::as_str)
            .is_some_and(|id| business_ids.contains(id));
        if keep {
            if let Some(user) = obj.get("user_id").and_then(Value::as_str) {
                user_ids.insert(user.to_string());
            }
            write_record(&mut reviews, &tag(rename_business_id(obj), true))?;
            stats.reviews += 1;
        }
        Ok(())
    })?;
    reviews.flush()?;
    info!(reviews = stats.reviews, "reviews kept");

    let mut users = create(&output_dir.join("user.json"))?;
    for_each_record(user_path, &mut stats.skipped, |obj| {
        let keep = obj
            .get("user_id")
            .and_then(Value::as_str)
            .is_some_and(|id| user_ids.contains(id));
        if keep {
            write_record(&mut users, &tag(obj, false))?;
            stats.users += 1;
        }
        Ok(())
    })?;
    users.flush()?;
    info!(users = stats.users, "users kept");

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn write_raw(dir: &Path, gz_reviews: bool) {
        std::fs::write(
            dir.join(BUSINESS_FILE),
            concat!(
                "{\"business_id\":\"b1\",\"name\":\"Taco Spot\",\"city\":\"Philadelphia\"}\n",
                "{\"business_id\":\"b2\",\"name\":\"Elsewhere\",\"city\":\"Tampa\"}\n",
                "garbage\n",
            ),
        )
        .unwrap();

        let reviews = concat!(
            "{\"review_id\":\"r1\",\"user_id\":\"u1\",\"business_id\":\"b1\",\"stars\":5.0,\"text\":\"yum\"}\n",
            "{\"review_id\":\"r2\",\"user_id\":\"u2\",\"business_id\":\"b2\",\"stars\":1.0,\"text\":\"no\"}\n",
        );
        if gz_reviews {
            let file = File::create(dir.join(format!("{REVIEW_FILE}.gz"))).unwrap();
            let mut enc = GzEncoder::new(file, Compression::default());
            enc.write_all(reviews.as_bytes()).unwrap();
            enc.finish().unwrap();
        } else {
            std::fs::write(dir.join(REVIEW_FILE), reviews).unwrap();
        }

        std::fs::write(
            dir.join(USER_FILE),
            concat!(
                "{\"user_id\":\"u1\",\"name\":\"Ann\"}\n",
                "{\"user_id\":\"u2\",\"name\":\"Bo\"}\n",
            ),
        )
        .unwrap();
    }

    fn read_lines(path: &Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_prepare_filters_by_city() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_raw(input.path(), false);

        let stats =
            prepare_yelp(input.path(), output.path(), &[DEFAULT_CITY.to_string()]).unwrap();
        assert_eq!(
            stats,
            PrepareStats {
                items: 1,
                reviews: 1,
                users: 1,
                skipped: 1
            }
        );

        let items = read_lines(&output.path().join("item.json"));
        assert_eq!(items[0]["item_id"], "b1");
        assert!(items[0].get("business_id").is_none());
        assert_eq!(items[0]["source"], "yelp");
        assert_eq!(items[0]["type"], "business");
        let keys: Vec<&String> = items[0].as_object().unwrap().keys().collect();
        assert_eq!(keys[0], "item_id");

        let reviews = read_lines(&output.path().join("review.json"));
        assert_eq!(reviews[0]["item_id"], "b1");
        let users = read_lines(&output.path().join("user.json"));
        assert_eq!(users[0]["user_id"], "u1");
        assert!(users[0].get("type").is_none());
    }

    #[test]
    fn test_prepare_reads_gzip() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_raw(input.path(), true);
        let stats = prepare_yelp(
            input.path(),
            output.path(),
            &["Philadelphia".into(), "Tampa".into()],
        )
        .unwrap();
        assert_eq!(stats.items, 2);
        assert_eq!(stats.reviews, 2);
        assert_eq!(stats.users, 2);
    }

    #[test]
    fn test_prepare_lists_missing_files() {
        let input = tempfile::tempdir().unwrap();
        std::fs::write(input.path().join(USER_FILE), "").unwrap();
        let err = prepare_yelp(input.path(), input.path(), &[DEFAULT_CITY.into()]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains(BUSINESS_FILE));
        assert!(msg.contains(REVIEW_FILE));
        assert!(!msg.contains(USER_FILE));
    }
}
