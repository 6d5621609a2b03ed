//! Major-group data: one JSON file per group under `DATA_DIR/job`, named by
//! the slug of the group's Vietnamese name. Files are read per request.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

use crate::errors::AppError;

pub const MAJOR_GROUPS: [&str; 35] = [
    "Kế toán - Kiểm toán",
    "Tài chính - Ngân hàng - Bảo hiểm",
    "Kinh tế - Quản trị kinh doanh - Thương Mại",
    "Công nghệ thông tin - Tin học",
    "Công nghiệp bán dẫn",
    "Báo chí - Marketing - Quảng cáo - PR",
    "Sư phạm - Giáo dục",
    "Y - Dược",
    "Bác sĩ thú y",
    "Công an - Quân đội",
    "Thiết kế đồ họa - Game - Đa phương tiện",
    "Xây dựng - Kiến trúc - Giao thông",
    "Ngoại giao - Ngoại ngữ",
    "Ngoại thương - Xuất nhập khẩu - Kinh Tế quốc tế",
    "Du lịch - Khách sạn",
    "Ô tô - Cơ khí - Chế tạo",
    "Điện lạnh - Điện tử - Điện - Tự động hóa",
    "Hàng hải - Thủy lợi - Thời tiết",
    "Hàng không - Vũ trụ - Hạt nhân",
    "Công nghệ vật liệu",
    "Công nghệ chế biến thực phẩm",
    "Công nghệ In - Giấy",
    "Công nghệ sinh - Hóa",
    "Luật - Tòa án",
    "Mỏ - Địa chất",
    "Mỹ thuật - Âm nhạc - Nghệ thuật",
    "Tài nguyên - Môi trường",
    "Tâm lý",
    "Thể dục - Thể thao",
    "Thời trang - May mặc",
    "Thủy sản - Lâm Nghiệp - Nông nghiệp",
    "Toán học và thống kê",
    "Nhân sự - Hành chính",
    "Văn hóa - Chính trị - Khoa học Xã hội",
    "Khoa học tự nhiên khác",
];

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").expect("valid regex"));
static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s_-]+").expect("valid regex"));
static SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9_]+$").expect("valid regex"));

/// ASCII file stem for a Vietnamese group name.
pub fn slugify(name: &str) -> String {
    let stripped: String = name.nfd().filter(|c| !is_combining_mark(*c)).collect();
    let cleaned = NON_WORD.replace_all(&stripped, "");
    let joined = SEPARATORS.replace_all(&cleaned, "_");
    joined
        .replace('đ', "d")
        .replace('Đ', "D")
        .to_lowercase()
        .trim_matches('_')
        .to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct MajorGroup {
    pub name: &'static str,
    pub filename: String,
    pub id: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MajorSummary {
    pub id: usize,
    pub name: String,
    pub school_count: usize,
    pub program_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub nhom_nganh: String,
    pub nganh: String,
    pub truong: String,
    pub chuyen_nganh: String,
    pub to_hop_mon: String,
    pub diem_chuan_2024: Value,
    pub diem_chuan_2023: Value,
    pub match_type: &'static str,
}

fn array<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn text(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn schools(major: &Value) -> &[Value] {
    array(major, "data")
}

fn programs(school: &Value) -> &[Value] {
    array(school, "data_school")
}

fn program_count(major: &Value) -> usize {
    schools(major).iter().map(|s| programs(s).len()).sum()
}

pub fn major_groups() -> Vec<MajorGroup> {
    MAJOR_GROUPS
        .iter()
        .enumerate()
        .map(|(id, name)| MajorGroup {
            name,
            filename: slugify(name),
            id,
        })
        .collect()
}

/// Adds `statistics{total_majors, total_schools, total_programs}` to a group document.
pub fn with_statistics(mut data: Value) -> Value {
    let majors = array(&data, "danh_sach_nganh");
    let statistics = json!({
        "total_majors": majors.len(),
        "total_schools": majors.iter().map(|m| schools(m).len()).sum::<usize>(),
        "total_programs": majors.iter().map(program_count).sum::<usize>(),
    });
    if let Some(object) = data.as_object_mut() {
        object.insert("statistics".to_string(), statistics);
    }
    data
}

pub fn summarize(data: &Value) -> Vec<MajorSummary> {
    array(data, "danh_sach_nganh")
        .iter()
        .enumerate()
        .map(|(id, major)| MajorSummary {
            id,
            name: text(major, "ten_nganh"),
            school_count: schools(major).len(),
            program_count: program_count(major),
        })
        .collect()
}

/// A school-name match brings in all of that school's programs; otherwise
/// only programs whose name matches are returned.
pub fn search_in(data: &Value, query: &str) -> Vec<SearchHit> {
    let query = query.to_lowercase();
    let group = text(data, "nhom_nganh");
    let mut hits = Vec::new();

    for major in array(data, "danh_sach_nganh") {
        for school in schools(major) {
            let school_name = text(school, "ten_truong");
            let school_matches = school_name.to_lowercase().contains(&query);

            let matching: Vec<&Value> = programs(school)
                .iter()
                .filter(|p| school_matches || text(p, "ten_nganh").to_lowercase().contains(&query))
                .collect();

            for program in matching {
                hits.push(SearchHit {
                    nhom_nganh: group.clone(),
                    nganh: text(major, "ten_nganh"),
                    truong: school_name.clone(),
                    chuyen_nganh: text(program, "ten_nganh"),
                    to_hop_mon: text(program, "to_hop_mon"),
                    diem_chuan_2024: program.get("diem_chuan_2024").cloned().unwrap_or(json!("")),
                    diem_chuan_2023: program.get("diem_chuan_2023").cloned().unwrap_or(json!("")),
                    match_type: if school_matches { "school" } else { "program" },
                });
            }
        }
    }
    hits
}

pub struct MajorCatalog {
    dir: PathBuf,
}

impl MajorCatalog {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, file: &str) -> Result<PathBuf, AppError> {
        if !SLUG.is_match(file) {
            return Err(AppError::Validation(format!("Invalid major group file '{file}'")));
        }
        Ok(self.dir.join(format!("{file}.json")))
    }

    async fn read(path: &Path) -> anyhow::Result<Value> {
        let raw = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Parsed group document; 404 when the file does not exist.
    pub async fn group(&self, file: &str) -> Result<Value, AppError> {
        let path = self.path_for(file)?;
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(AppError::NotFound(format!("Major data not found: {file}")));
        }
        Ok(Self::read(&path).await?)
    }

    pub async fn major(&self, file: &str, id: usize) -> Result<Value, AppError> {
        let data = self.group(file).await?;
        let major = array(&data, "danh_sach_nganh")
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Major not found".to_string()))?;
        Ok(json!({
            "nhom_nganh": text(&data, "nhom_nganh"),
            "major": major,
        }))
    }

    /// Searches one group, or every group file when `group` is `None`.
    /// Unreadable files are skipped.
    pub async fn search(&self, query: &str, group: Option<&str>) -> Result<Vec<SearchHit>, AppError> {
        let paths = match group {
            Some(file) => vec![self.path_for(file)?],
            None => self.group_files().await,
        };

        let mut hits = Vec::new();
        for path in paths {
            match Self::read(&path).await {
                Ok(data) => hits.extend(search_in(&data, query)),
                Err(e) => debug!("Skipping {} during search: {e}", path.display()),
            }
        }
        Ok(hits)
    }

    async fn group_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Major data directory {} unavailable: {e}", self.dir.display());
                return files;
            }
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        files
    }
}

#[cfg(test)]
pub fn write_sample_group(dir: &Path) {
    let job = dir.join("job");
    std::fs::create_dir_all(&job).unwrap();
    std::fs::write(
        job.join("cong_nghe_thong_tin_tin_hoc.json"),
        json!({
            "nhom_nganh": "Công nghệ thông tin - Tin học",
            "danh_sach_nganh": [
                {
                    "ten_nganh": "Khoa học máy tính",
                    "data": [
                        {"ten_truong": "Đại học Bách khoa Hà Nội", "data_school": [
                            {"ten_nganh": "Khoa học máy tính", "to_hop_mon": "A00", "diem_chuan_2024": 29.4, "diem_chuan_2023": 29.42},
                            {"ten_nganh": "Khoa học dữ liệu", "to_hop_mon": "A00", "diem_chuan_2024": 28.0}
                        ]},
                        {"ten_truong": "Đại học FPT", "data_school": [
                            {"ten_nganh": "Trí tuệ nhân tạo", "to_hop_mon": "A00"}
                        ]}
                    ]
                },
                {"ten_nganh": "An toàn thông tin", "data": []}
            ]
        })
        .to_string(),
    )
    .unwrap();
    std::fs::write(job.join("broken.json"), "[oops").unwrap();
}
