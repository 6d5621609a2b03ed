//! University admission data, one JSON file per school under `DATA_DIR/school`.
//!
//! Files are loaded concurrently into an in-memory snapshot at startup and on
//! explicit reload. Lookups never touch the filesystem.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

pub const MAJOR_NAME: &str = "Tên ngành";
pub const SUBJECT_COMBINATION: &str = "Tổ hợp môn";
pub const MAJOR_CODE: &str = "Mã ngành";
pub const CUTOFF_SCORE: &str = "Điểm chuẩn";
const DEFAULT_TYPE: &str = "công lập";

#[derive(Debug, Clone, Serialize)]
pub struct UniversityBrief {
    pub code: String,
    pub school_name: Option<String>,
    pub location: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub major_count: usize,
    pub data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreFilter {
    High,
    Medium,
    Low,
}

impl ScoreFilter {
    /// `None` for "all"; `Err` for anything unrecognised.
    pub fn parse(raw: &str) -> Result<Option<Self>, String> {
        match raw.trim().to_lowercase().as_str() {
            "" | "all" => Ok(None),
            "high" => Ok(Some(ScoreFilter::High)),
            "medium" => Ok(Some(ScoreFilter::Medium)),
            "low" => Ok(Some(ScoreFilter::Low)),
            other => Err(format!("unknown score filter '{other}'")),
        }
    }

    fn accepts(self, score: f64) -> bool {
        match self {
            ScoreFilter::High => score > 22.0,
            ScoreFilter::Medium => (18.0..=22.0).contains(&score),
            ScoreFilter::Low => score > 0.0 && score < 18.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub loaded: usize,
    pub errors: usize,
    pub load_time: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Snapshot {
    universities: Vec<UniversityBrief>,
    by_code: HashMap<String, usize>,
    loaded_at: Option<DateTime<Utc>>,
}

pub struct UniversityCatalog {
    dir: PathBuf,
    snapshot: RwLock<Snapshot>,
}

/// Text of a string or numeric JSON cell.
pub fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Every table row that names a major.
pub fn major_rows(data: &Value) -> Vec<&Value> {
    data.get("tables")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|table| table.get("data").and_then(Value::as_array))
        .flatten()
        .filter(|row| {
            row.get(MAJOR_NAME)
                .and_then(cell_text)
                .is_some_and(|name| !name.is_empty())
        })
        .collect()
}

/// Number of distinct major names across all tables.
pub fn count_majors(data: &Value) -> usize {
    major_rows(data)
        .into_iter()
        .filter_map(|row| row.get(MAJOR_NAME).and_then(cell_text))
        .collect::<HashSet<_>>()
        .len()
}

pub fn cutoff_score(row: &Value) -> Option<f64> {
    match row.get(CUTOFF_SCORE)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}

fn contains_ci(haystack: Option<String>, needle: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(needle))
}

fn string_field(data: &Value, key: &str) -> Option<String> {
    data.get(key).and_then(Value::as_str).map(String::from)
}

async fn load_file(path: PathBuf) -> anyhow::Result<(String, Value)> {
    let code = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_uppercase)
        .ok_or_else(|| anyhow::anyhow!("unnamed file {}", path.display()))?;
    let raw = tokio::fs::read_to_string(&path).await?;
    let data: Value = serde_json::from_str(&raw)?;
    Ok((code, data))
}

async fn json_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

impl UniversityCatalog {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            snapshot: RwLock::new(Snapshot::default()),
        }
    }

    /// Re-reads every school file and swaps in the new snapshot.
    pub async fn reload(&self) -> LoadReport {
        let started = Instant::now();
        info!("Loading university data from {}", self.dir.display());

        let files = match json_files(&self.dir).await {
            Ok(files) => files,
            Err(e) => {
                warn!("University data directory {} unavailable: {e}", self.dir.display());
                Vec::new()
            }
        };

        let results = join_all(files.iter().cloned().map(load_file)).await;

        let mut snapshot = Snapshot::default();
        let mut errors = 0;
        for (path, result) in files.iter().zip(results) {
            match result {
                Ok((code, data)) => {
                    let brief = UniversityBrief {
                        school_name: string_field(&data, "school_name"),
                        location: string_field(&data, "location"),
                        kind: string_field(&data, "type").unwrap_or_else(|| DEFAULT_TYPE.to_string()),
                        major_count: count_majors(&data),
                        code: code.clone(),
                        data,
                    };
                    snapshot.by_code.insert(code, snapshot.universities.len());
                    snapshot.universities.push(brief);
                }
                Err(e) => {
                    error!("Failed to load {}: {e}", path.display());
                    errors += 1;
                }
            }
        }
        snapshot.loaded_at = Some(Utc::now());

        let report = LoadReport {
            loaded: snapshot.universities.len(),
            errors,
            load_time: snapshot.loaded_at,
        };
        *self.snapshot.write().await = snapshot;

        info!(
            "University data loaded: {} ok, {} errors in {:.2}s",
            report.loaded,
            report.errors,
            started.elapsed().as_secs_f64()
        );
        report
    }

    pub async fn is_loaded(&self) -> bool {
        self.snapshot.read().await.loaded_at.is_some()
    }

    pub async fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.snapshot.read().await.loaded_at
    }

    pub async fn len(&self) -> usize {
        self.snapshot.read().await.universities.len()
    }

    pub async fn total_majors(&self) -> usize {
        let snapshot = self.snapshot.read().await;
        snapshot.universities.iter().map(|u| u.major_count).sum()
    }

    /// Filters, then paginates. The second value is the count before pagination.
    /// A `limit` of 0 means no limit.
    pub async fn list(
        &self,
        search: Option<&str>,
        type_filter: Option<&str>,
        limit: Option<usize>,
        offset: usize,
    ) -> (Vec<UniversityBrief>, usize) {
        let snapshot = self.snapshot.read().await;
        let search = search.map(str::to_lowercase).filter(|s| !s.is_empty());
        let type_filter = type_filter
            .map(str::to_lowercase)
            .filter(|t| !t.is_empty() && t != "all");

        let matches: Vec<&UniversityBrief> = snapshot
            .universities
            .iter()
            .filter(|u| match &search {
                Some(term) => {
                    u.code.to_lowercase().contains(term)
                        || contains_ci(u.school_name.clone(), term)
                        || contains_ci(u.location.clone(), term)
                }
                None => true,
            })
            .filter(|u| match &type_filter {
                Some(kind) => u.kind.to_lowercase().contains(kind),
                None => true,
            })
            .collect();

        let total = matches.len();
        let page = matches
            .into_iter()
            .skip(offset)
            .take(limit.filter(|&n| n > 0).unwrap_or(usize::MAX))
            .cloned()
            .collect();
        (page, total)
    }

    pub async fn get(&self, code: &str) -> Option<UniversityBrief> {
        let snapshot = self.snapshot.read().await;
        snapshot
            .by_code
            .get(&code.to_uppercase())
            .map(|&i| snapshot.universities[i].clone())
    }

    /// Major rows of one school matching `search` and `score`.
    pub async fn majors(
        &self,
        code: &str,
        search: Option<&str>,
        score: Option<ScoreFilter>,
    ) -> Option<(UniversityBrief, Vec<Value>)> {
        let university = self.get(code).await?;
        let search = search.map(str::to_lowercase).filter(|s| !s.is_empty());

        let majors = major_rows(&university.data)
            .into_iter()
            .filter(|row| match &search {
                Some(term) => [MAJOR_NAME, SUBJECT_COMBINATION, MAJOR_CODE]
                    .iter()
                    .any(|key| contains_ci(row.get(*key).and_then(cell_text), term)),
                None => true,
            })
            .filter(|row| match score {
                Some(filter) => cutoff_score(row).is_some_and(|s| filter.accepts(s)),
                None => true,
            })
            .cloned()
            .collect();

        Some((university, majors))
    }
}

#[cfg(test)]
pub fn write_sample_schools(dir: &Path) {
    let school = dir.join("school");
    std::fs::create_dir_all(&school).unwrap();
    std::fs::write(
        school.join("bka.json"),
        serde_json::json!({
            "school_name": "Đại học Bách khoa Hà Nội",
            "location": "Hà Nội",
            "type": "công lập",
            "website": "https://hust.edu.vn",
            "tables": [
                {"data": [
                    {"Tên ngành": "Khoa học máy tính", "Mã ngành": "IT1", "Tổ hợp môn": "A00", "Điểm chuẩn": "28.5"},
                    {"Tên ngành": "Kỹ thuật cơ khí", "Mã ngành": "ME1", "Tổ hợp môn": "A00;A01", "Điểm chuẩn": 21},
                    {"Tên ngành": "Khoa học máy tính", "Mã ngành": "IT1-E", "Tổ hợp môn": "D01", "Điểm chuẩn": "Xét tuyển"}
                ]},
                {"data": [
                    {"Tên ngành": "Công nghệ giáo dục", "Mã ngành": 7140101, "Tổ hợp môn": "D01", "Điểm chuẩn": "17,5"},
                    {"Ghi chú": "không phải ngành"}
                ]}
            ]
        })
        .to_string(),
    )
    .unwrap();
    std::fs::write(
        school.join("FPT.json"),
        serde_json::json!({
            "school_name": "Đại học FPT",
            "location": "Hà Nội",
            "type": "tư thục",
            "tables": []
        })
        .to_string(),
    )
    .unwrap();
    std::fs::write(school.join("BAD.json"), "{ not json").unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn loaded() -> (tempfile::TempDir, UniversityCatalog) {
        let dir = tempfile::tempdir().unwrap();
        write_sample_schools(dir.path());
        let catalog = UniversityCatalog::new(dir.path().join("school"));
        catalog.reload().await;
        (dir, catalog)
    }

    #[tokio::test]
    async fn test_reload_counts_errors() {
        let dir = tempfile::tempdir().unwrap();
        write_sample_schools(dir.path());
        let catalog = UniversityCatalog::new(dir.path().join("school"));
        assert!(!catalog.is_loaded().await);

        let report = catalog.reload().await;
        assert_eq!(report.loaded, 2);
        assert_eq!(report.errors, 1);
        assert!(catalog.is_loaded().await);
    }

    #[tokio::test]
    async fn test_missing_directory_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = UniversityCatalog::new(dir.path().join("nope"));
        let report = catalog.reload().await;
        assert_eq!(report.loaded, 0);
        assert!(catalog.is_loaded().await);
    }

    #[tokio::test]
    async fn test_major_count_is_distinct_names() {
        let (_dir, catalog) = loaded().await;
        let bka = catalog.get("bka").await.unwrap();
        assert_eq!(bka.code, "BKA");
        assert_eq!(bka.major_count, 3);
        assert_eq!(catalog.total_majors().await, 3);
    }

    #[tokio::test]
    async fn test_list_filters_before_paginating() {
        let (_dir, catalog) = loaded().await;

        let (page, total) = catalog.list(Some("hà nội"), None, Some(1), 0).await;
        assert_eq!(total, 2);
        assert_eq!(page.len(), 1);

        let (page, total) = catalog.list(None, Some("tư thục"), None, 0).await;
        assert_eq!(total, 1);
        assert_eq!(page[0].code, "FPT");

        let (page, total) = catalog.list(None, Some("all"), None, 5).await;
        assert_eq!(total, 2);
        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn test_zero_limit_returns_everything() {
        let (_dir, catalog) = loaded().await;
        let (page, total) = catalog.list(None, None, Some(0), 0).await;
        assert_eq!(total, 2);
        assert_eq!(page.len(), 2);
    }

    #[tokio::test]
    async fn test_majors_search_and_score_filter() {
        let (_dir, catalog) = loaded().await;

        let (_, rows) = catalog.majors("BKA", Some("a01"), None).await.unwrap();
        assert_eq!(rows.len(), 1);

        let (_, rows) = catalog.majors("BKA", Some("7140"), None).await.unwrap();
        assert_eq!(rows.len(), 1);

        let (_, high) = catalog.majors("BKA", None, Some(ScoreFilter::High)).await.unwrap();
        assert_eq!(high.len(), 1);
        let (_, medium) = catalog.majors("BKA", None, Some(ScoreFilter::Medium)).await.unwrap();
        assert_eq!(medium.len(), 1);
        let (_, low) = catalog.majors("BKA", None, Some(ScoreFilter::Low)).await.unwrap();
        assert_eq!(low[0][MAJOR_NAME], "Công nghệ giáo dục");

        let (_, all) = catalog.majors("BKA", None, None).await.unwrap();
        assert_eq!(all.len(), 4);

        assert!(catalog.majors("XXX", None, None).await.is_none());
    }

    #[test]
    fn test_score_filter_parse() {
        assert_eq!(ScoreFilter::parse("all").unwrap(), None);
        assert_eq!(ScoreFilter::parse("HIGH").unwrap(), Some(ScoreFilter::High));
        assert!(ScoreFilter::parse("extreme").is_err());
        assert!(ScoreFilter::Medium.accepts(18.0));
        assert!(ScoreFilter::Medium.accepts(22.0));
        assert!(!ScoreFilter::Low.accepts(0.0));
    }
}
