//! CV evaluation: upload validation, PDF text extraction, a cheap
//! suspicious-content screen, and LLM scoring against a rubric.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{error, info, warn};
use unicode_normalization::UnicodeNormalization;

use crate::cv::prompts::{
    ATS_CRITERIA, EVALUATION_PROMPT_TEMPLATE, EVALUATION_SYSTEM, JD_SECTION, JD_STEP,
    TSHAPE_CRITERIA,
};
use crate::llm_client::ChatModel;

pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf"];
pub const MAX_CV_LENGTH: usize = 50_000;
pub const MAX_FILES_PER_REQUEST: usize = 5;

const SUSPICIOUS_PATTERNS: &[&str] = &[
    "lorem ipsum",
    "sample text",
    "placeholder text",
    "example content",
    "test content",
    "dummy text",
];

static SCORE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)tổng điểm\s*:\s*(\d{1,3})\s*/\s*100",
        r"(?i)điểm\s*:\s*(\d{1,3})\s*/\s*100",
        r"(\d{1,3})\s*/\s*100",
        r"(?i)điểm số\s*:\s*(\d{1,3})",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriteriaOption {
    Ats,
    TShape,
    Custom,
}

impl FromStr for CriteriaOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ats" => Ok(CriteriaOption::Ats),
            "tshape" => Ok(CriteriaOption::TShape),
            "custom" => Ok(CriteriaOption::Custom),
            other => Err(format!("unknown criteria option '{other}'")),
        }
    }
}

/// Form parameters shared by every file in one evaluation request.
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    pub industry: String,
    pub criteria_option: CriteriaOption,
    pub custom_criteria: String,
    pub job_description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    pub filename: String,
    pub evaluation: String,
    pub score: Option<u8>,
    pub processing_time: f64,
    pub file_size: usize,
    pub errors: Vec<String>,
}

impl EvaluationResult {
    fn new(filename: String, file_size: usize) -> Self {
        Self {
            filename,
            evaluation: String::new(),
            score: None,
            processing_time: 0.0,
            file_size,
            errors: Vec::new(),
        }
    }

    fn fail(mut self, evaluation: impl Into<String>, error: impl Into<String>) -> Self {
        self.evaluation = evaluation.into();
        self.errors.push(error.into());
        self
    }
}

/// ASCII-folds accents, turns path separators and whitespace runs into `_`,
/// and keeps only `[A-Za-z0-9._-]`.
pub fn sanitize_filename(name: &str) -> String {
    let ascii: String = name
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let cleaned: String = ascii
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    cleaned.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// Returns the sanitised filename, or a user-facing reason the file is rejected.
pub fn validate_file(name: &str, size: usize) -> Result<String, String> {
    if name.trim().is_empty() {
        return Err("No file provided".to_string());
    }

    let filename = sanitize_filename(name);
    if filename.is_empty() {
        return Err("Invalid filename".to_string());
    }

    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err("File type not supported. Allowed: .pdf".to_string());
    }

    if size > MAX_FILE_SIZE {
        return Err(format!(
            "File too large. Max size: {}MB",
            MAX_FILE_SIZE / (1024 * 1024)
        ));
    }

    Ok(filename)
}

/// Collapses whitespace and caps the text at `MAX_CV_LENGTH` characters.
pub fn clean_text(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let total = collapsed.chars().count();
    if total <= MAX_CV_LENGTH {
        return collapsed;
    }
    warn!("CV text truncated from {total} to {MAX_CV_LENGTH} characters");
    collapsed.chars().take(MAX_CV_LENGTH).collect()
}

/// Extracts text from PDF bytes on the blocking pool.
pub async fn extract_text(data: Bytes) -> anyhow::Result<String> {
    let raw = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&data))
        .await
        .map_err(|e| anyhow::anyhow!("PDF extraction task failed: {e}"))?
        .map_err(|e| anyhow::anyhow!("Cannot read PDF file: {e}"))?;
    Ok(clean_text(&raw))
}

/// Placeholder phrases, or one long word dominating the text.
pub fn looks_suspicious(text: &str) -> bool {
    let lower = text.to_lowercase();

    if let Some(pattern) = SUSPICIOUS_PATTERNS.iter().find(|p| lower.contains(*p)) {
        warn!("Suspicious pattern detected: {pattern}");
        return true;
    }

    let words: Vec<&str> = lower.split_whitespace().collect();
    if words.len() <= 10 {
        return false;
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for word in words.iter().filter(|w| w.chars().count() > 3) {
        *counts.entry(word).or_default() += 1;
    }
    let max = counts.values().copied().max().unwrap_or(0);
    if max as f64 > words.len() as f64 * 0.05 && max > 10 {
        warn!("Excessive repetition detected");
        return true;
    }
    false
}

pub fn criteria_text(option: CriteriaOption, industry: &str, custom: &str) -> String {
    match option {
        CriteriaOption::TShape => TSHAPE_CRITERIA.replace("{industry}", industry),
        CriteriaOption::Custom if !custom.trim().is_empty() => custom.trim().to_string(),
        _ => ATS_CRITERIA.to_string(),
    }
}

pub fn build_prompt(cv_text: &str, criteria: &str, industry: &str, job_description: &str) -> String {
    let has_jd = !job_description.trim().is_empty();
    let (jd_section, jd_step, summary_index) = if has_jd {
        (JD_SECTION.replace("{job_description}", job_description), JD_STEP, "6")
    } else {
        (String::new(), "", "5")
    };

    EVALUATION_PROMPT_TEMPLATE
        .replace("{industry_upper}", &industry.to_uppercase())
        .replace("{industry}", industry)
        .replace("{jd_step}", jd_step)
        .replace("{summary_index}", summary_index)
        .replace("{jd_section}", &jd_section)
        .replace("{criteria}", criteria)
        .replace("{cv_text}", cv_text)
}

/// First `N/100`-style score in range, trying the most specific phrasing first.
pub fn extract_score(text: &str) -> Option<u8> {
    SCORE_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures_iter(text)
            .filter_map(|c| c.get(1)?.as_str().parse::<u32>().ok())
            .find(|score| *score <= 100)
            .map(|score| score as u8)
    })
}

pub struct CvEvaluator {
    chat: Option<Arc<dyn ChatModel>>,
}

impl CvEvaluator {
    pub fn new(chat: Option<Arc<dyn ChatModel>>) -> Self {
        if chat.is_none() {
            warn!("CV evaluator started without an LLM; evaluations will report a configuration error");
        }
        Self { chat }
    }

    pub fn llm_available(&self) -> bool {
        self.chat.is_some()
    }

    /// Evaluates one uploaded file. Every failure is reported in-band.
    pub async fn evaluate(&self, name: &str, data: Bytes, request: &EvaluationRequest) -> EvaluationResult {
        let started = Instant::now();
        let size = data.len();

        let mut result = match validate_file(name, size) {
            Ok(filename) => match extract_text(data).await {
                Ok(text) => self.evaluate_text(EvaluationResult::new(filename, size), &text, request).await,
                Err(e) => {
                    error!("Error evaluating CV {filename}: {e}");
                    EvaluationResult::new(filename, size).fail(format!("Lỗi xử lý CV: {e}"), e.to_string())
                }
            },
            Err(reason) => EvaluationResult::new(sanitize_or_unknown(name), 0)
                .fail(format!("Lỗi file: {reason}"), reason),
        };

        result.processing_time = started.elapsed().as_secs_f64();
        result
    }

    async fn evaluate_text(
        &self,
        result: EvaluationResult,
        cv_text: &str,
        request: &EvaluationRequest,
    ) -> EvaluationResult {
        if cv_text.trim().is_empty() {
            return result.fail("CV trống hoặc không đọc được nội dung.", "Empty CV content");
        }

        if looks_suspicious(cv_text) {
            let mut result = result.fail(
                "⚠️ Phát hiện nội dung nghi ngờ hoặc lặp lại quá nhiều trong CV.",
                "Suspicious content detected",
            );
            result.score = Some(0);
            return result;
        }

        let Some(chat) = &self.chat else {
            return result.fail(
                "Lỗi: dịch vụ AI chưa được cấu hình. Vui lòng kiểm tra API key.",
                "LLM not configured",
            );
        };

        let criteria = criteria_text(request.criteria_option, &request.industry, &request.custom_criteria);
        let prompt = build_prompt(cv_text, &criteria, &request.industry, &request.job_description);

        match chat.complete(EVALUATION_SYSTEM, &prompt).await {
            Ok(evaluation) => {
                let score = extract_score(&evaluation);
                info!("Evaluated {} (score {:?})", result.filename, score);
                EvaluationResult {
                    evaluation,
                    score,
                    ..result
                }
            }
            Err(e) => {
                error!("LLM error while evaluating {}: {e}", result.filename);
                result.fail(
                    format!("Lỗi khi gọi dịch vụ AI: {e}. Vui lòng thử lại sau."),
                    "LLM call failed",
                )
            }
        }
    }
}

fn sanitize_or_unknown(name: &str) -> String {
    let filename = sanitize_filename(name);
    if filename.is_empty() {
        "unknown".to_string()
    } else {
        filename
    }
}
