use std::path::Path;

use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::models::RawResponse;

/// On-disk shape of the response store: a single JSON document holding the
/// append-only response list.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    responses: Vec<RawResponse>,
}

/// Loads the store; a missing file is an empty store, not an error.
pub fn load(path: &Path) -> anyhow::Result<Vec<RawResponse>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let file: StoreFile = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a valid response store", path.display()))?;
    Ok(file.responses)
}

pub fn save(path: &Path, responses: Vec<RawResponse>) -> anyhow::Result<()> {
    let file = StoreFile { responses };
    let raw = serde_json::to_string_pretty(&file)?;
    std::fs::write(path, raw)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Appends responses and returns the new total count.
pub fn append(path: &Path, new: Vec<RawResponse>) -> anyhow::Result<usize> {
    let mut responses = load(path)?;
    responses.extend(new);
    let total = responses.len();
    save(path, responses)?;
    Ok(total)
}

/// Removes every stored response in one write.
pub fn clear(path: &Path) -> anyhow::Result<()> {
    save(path, Vec::new())
}

/// Imports responses from a CSV file with columns
/// `timestamp,age_group,q1..q6`; empty cells stay missing. Returns the
/// number of rows appended.
pub fn import_csv(path: &Path, csv_path: &Path) -> anyhow::Result<usize> {
    #[derive(Deserialize)]
    struct CsvRow {
        #[serde(default)]
        timestamp: Option<String>,
        #[serde(default)]
        age_group: Option<String>,
        q1: Option<f64>,
        q2: Option<f64>,
        q3: Option<f64>,
        q4: Option<f64>,
        q5: Option<f64>,
        q6: Option<f64>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut imported = Vec::new();

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        imported.push(RawResponse {
            timestamp: row
                .timestamp
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| Utc::now().to_rfc3339()),
            age_group: row.age_group.filter(|a| !a.is_empty()),
            q1: row.q1,
            q2: row.q2,
            q3: row.q3,
            q4: row.q4,
            q5: row.q5,
            q6: row.q6,
        });
    }

    let count = imported.len();
    append(path, imported)?;
    Ok(count)
}

/// Dumps the store to CSV with the same column layout the importer reads.
pub fn export_csv(path: &Path, out: &Path) -> anyhow::Result<usize> {
    let responses = load(path)?;
    let mut writer = csv::Writer::from_path(out)
        .with_context(|| format!("failed to create {}", out.display()))?;

    writer.write_record(["timestamp", "age_group", "q1", "q2", "q3", "q4", "q5", "q6"])?;
    for response in &responses {
        let mut record = vec![
            response.timestamp.clone(),
            response.age_group.clone().unwrap_or_default(),
        ];
        for item in response.items() {
            record.push(item.map(|v| v.to_string()).unwrap_or_default());
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(responses.len())
}
