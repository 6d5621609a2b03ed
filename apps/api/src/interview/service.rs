//! Mock-interview sessions.
//!
//! A session walks the chosen career's criteria in order, asking every
//! question of a criterion before moving on. When the last question of a
//! criterion is answered, the concatenated answers are scored 1–4 by the LLM.
//! Sessions live in memory and expire after `SESSION_TTL`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::interview::catalog::{Career, InterviewCatalog, Level};
use crate::interview::prompts::{
    FINAL_PROMPT_TEMPLATE, INTERVIEW_SYSTEM, NO_REASONING, SCORE_PROMPT_TEMPLATE,
    SCORING_UNAVAILABLE,
};
use crate::llm_client::ChatModel;

pub const MIN_SCORE: u8 = 1;
pub const MAX_SCORE: u8 = 4;
pub const DEFAULT_SCORE: u8 = 2;
const SESSION_TTL: Duration = Duration::from_secs(6 * 3600);

static SCORE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)ĐÁNH GIÁ:\s*(\d+)").expect("valid score regex"));
static REASON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)LÝ DO:\s*(.*)").expect("valid reason regex"));

#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub name: String,
    pub age: i64,
    pub job: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CriterionResult {
    pub criteria_id: serde_json::Value,
    pub criteria_name: String,
    pub score: u8,
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnswerScore {
    pub score: u8,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CriteriaRef {
    pub id: serde_json::Value,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    pub criteria_index: usize,
    pub criteria_total: usize,
    pub question_index: usize,
    pub question_total: usize,
}

/// What the client should show next.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum NextStep {
    Question {
        session_id: String,
        criteria: CriteriaRef,
        question: String,
        progress: Progress,
    },
    Complete {
        complete: bool,
        session_id: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct InterviewReport {
    pub candidate: Candidate,
    pub total_score: u32,
    pub max_score: u32,
    pub score_percentage: f64,
    pub evaluation: String,
    pub detailed_results: Vec<CriterionResult>,
}

struct Session {
    id: String,
    candidate: Candidate,
    career: Career,
    criteria_index: usize,
    question_index: usize,
    results: Vec<CriterionResult>,
    created_at: Instant,
}

impl Session {
    fn is_complete(&self) -> bool {
        self.criteria_index >= self.career.criteria.len()
    }

    fn next_step(&self) -> NextStep {
        let Some(criterion) = self.career.criteria.get(self.criteria_index) else {
            return NextStep::Complete {
                complete: true,
                session_id: self.id.clone(),
            };
        };

        NextStep::Question {
            session_id: self.id.clone(),
            criteria: CriteriaRef {
                id: criterion.id.clone(),
                name: criterion.name.clone(),
            },
            question: criterion
                .questions
                .get(self.question_index)
                .cloned()
                .unwrap_or_default(),
            progress: Progress {
                criteria_index: self.criteria_index,
                criteria_total: self.career.criteria.len(),
                question_index: self.question_index,
                question_total: criterion.questions.len(),
            },
        }
    }
}

pub struct InterviewService {
    catalog: InterviewCatalog,
    chat: Option<Arc<dyn ChatModel>>,
    sessions: DashMap<String, Arc<Mutex<Session>>>,
}

impl InterviewService {
    pub fn new(catalog: InterviewCatalog, chat: Option<Arc<dyn ChatModel>>) -> Self {
        Self {
            catalog,
            chat,
            sessions: DashMap::new(),
        }
    }

    pub fn catalog(&self) -> &InterviewCatalog {
        &self.catalog
    }

    pub fn llm_available(&self) -> bool {
        self.chat.is_some()
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn start(&self, candidate: Candidate) -> Result<NextStep, AppError> {
        let career = self
            .catalog
            .find_by_name(&candidate.job)
            .cloned()
            .ok_or_else(|| AppError::Validation("Invalid job selection".to_string()))?;

        self.sessions
            .retain(|_, s| s.try_lock().map_or(true, |s| s.created_at.elapsed() < SESSION_TTL));

        let results = career
            .criteria
            .iter()
            .map(|c| CriterionResult {
                criteria_id: c.id.clone(),
                criteria_name: c.name.clone(),
                score: 0,
                answer: String::new(),
                reasoning: None,
            })
            .collect();

        let session = Session {
            id: format!("session_{}", uuid::Uuid::new_v4().simple()),
            candidate,
            career,
            criteria_index: 0,
            question_index: 0,
            results,
            created_at: Instant::now(),
        };
        info!(
            "Interview {} started for '{}' ({})",
            session.id, session.candidate.name, session.candidate.job
        );

        let step = session.next_step();
        self.sessions
            .insert(session.id.clone(), Arc::new(Mutex::new(session)));
        Ok(step)
    }

    fn session(&self, session_id: &str) -> Result<Arc<Mutex<Session>>, AppError> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::Validation("Invalid session".to_string()))
    }

    pub async fn answer(&self, session_id: &str, answer: &str) -> Result<NextStep, AppError> {
        let handle = self.session(session_id)?;
        let mut session = handle.lock().await;

        if session.is_complete() {
            return Err(AppError::Validation("Interview already completed".to_string()));
        }

        let c_idx = session.criteria_index;
        let q_idx = session.question_index;
        let criterion = session.career.criteria[c_idx].clone();

        let transcript = &mut session.results[c_idx].answer;
        transcript.push_str(answer);
        transcript.push_str("\n\n");

        if q_idx + 1 >= criterion.questions.len() {
            let scored = score_answer(
                self.chat.as_deref(),
                &session.results[c_idx].answer,
                &criterion.name,
                &criterion.questions[q_idx],
                &session.candidate.job,
                &criterion.levels,
            )
            .await;
            debug!("{session_id}: '{}' scored {}", criterion.name, scored.score);

            let result = &mut session.results[c_idx];
            result.score = scored.score;
            result.reasoning = Some(scored.reasoning);

            session.criteria_index += 1;
            session.question_index = 0;
        } else {
            session.question_index += 1;
        }

        Ok(session.next_step())
    }

    pub async fn finish(&self, session_id: &str) -> Result<InterviewReport, AppError> {
        let handle = self.session(session_id)?;
        let session = handle.lock().await;

        let total_score: u32 = session.results.iter().map(|r| r.score as u32).sum();
        let max_score = session.career.criteria.len() as u32 * MAX_SCORE as u32;
        let score_percentage = if max_score == 0 {
            0.0
        } else {
            total_score as f64 / max_score as f64 * 100.0
        };

        let evaluation = match &self.chat {
            Some(chat) => {
                let prompt = final_prompt(&session.candidate, &session.results, total_score, max_score, score_percentage);
                match chat.complete(INTERVIEW_SYSTEM, &prompt).await {
                    Ok(text) => text.trim().to_string(),
                    Err(e) => {
                        warn!("Final interview evaluation failed for {session_id}: {e}");
                        band_message(&session.candidate.name, score_percentage)
                    }
                }
            }
            None => band_message(&session.candidate.name, score_percentage),
        };
        info!("Interview {session_id} finished: {total_score}/{max_score}");

        Ok(InterviewReport {
            candidate: session.candidate.clone(),
            total_score,
            max_score,
            score_percentage,
            evaluation,
            detailed_results: session.results.clone(),
        })
    }
}

pub async fn score_answer(
    chat: Option<&dyn ChatModel>,
    answer: &str,
    criteria_name: &str,
    question: &str,
    job: &str,
    levels: &[Level],
) -> AnswerScore {
    let Some(chat) = chat else {
        return unavailable_score();
    };

    let levels_text = levels
        .iter()
        .map(|l| format!("Level {}: {}", l.score, l.description))
        .collect::<Vec<_>>()
        .join("\n");
    let prompt = SCORE_PROMPT_TEMPLATE
        .replace("{job}", job)
        .replace("{criteria}", criteria_name)
        .replace("{question}", question)
        .replace("{levels}", &levels_text)
        .replace("{answer}", answer);

    match chat.complete(INTERVIEW_SYSTEM, &prompt).await {
        Ok(reply) => parse_score_reply(&reply),
        Err(e) => {
            warn!("Interview scoring failed: {e}");
            unavailable_score()
        }
    }
}

fn unavailable_score() -> AnswerScore {
    AnswerScore {
        score: DEFAULT_SCORE,
        reasoning: SCORING_UNAVAILABLE.to_string(),
    }
}

/// Reads `ĐÁNH GIÁ: n` (clamped to 1–4) and the `LÝ DO:` paragraph.
pub fn parse_score_reply(reply: &str) -> AnswerScore {
    let score = SCORE_RE
        .captures(reply)
        .and_then(|c| c.get(1)?.as_str().parse::<u64>().ok())
        .map(|s| s.clamp(MIN_SCORE as u64, MAX_SCORE as u64) as u8)
        .unwrap_or(DEFAULT_SCORE);

    let reasoning = REASON_RE
        .captures(reply)
        .and_then(|c| c.get(1))
        .map(|m| {
            let text = m.as_str();
            text.split("\n\n").next().unwrap_or(text).trim().to_string()
        })
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| NO_REASONING.to_string());

    AnswerScore { score, reasoning }
}

fn final_prompt(
    candidate: &Candidate,
    results: &[CriterionResult],
    total: u32,
    max: u32,
    percentage: f64,
) -> String {
    let mut results_text = String::new();
    for (i, r) in results.iter().enumerate() {
        results_text.push_str(&format!("{}. {}: {}/4\n", i + 1, r.criteria_name, r.score));
        if let Some(reasoning) = &r.reasoning {
            results_text.push_str(&format!("   Nhận xét: {reasoning}\n\n"));
        }
    }

    FINAL_PROMPT_TEMPLATE
        .replace("{name}", &candidate.name)
        .replace("{age}", &candidate.age.to_string())
        .replace("{job}", &candidate.job)
        .replace("{total}", &total.to_string())
        .replace("{max}", &max.to_string())
        .replace("{percentage}", &format!("{percentage:.1}"))
        .replace("{results}", &results_text)
}

pub fn band_message(name: &str, percentage: f64) -> String {
    if percentage >= 80.0 {
        format!("Ứng viên {name} thể hiện rất xuất sắc, đáp ứng tốt hầu hết các tiêu chí của vị trí.")
    } else if percentage >= 60.0 {
        format!("Ứng viên {name} thể hiện tốt, có nền tảng vững và một số điểm cần cải thiện thêm.")
    } else if percentage >= 40.0 {
        format!("Ứng viên {name} ở mức trung bình, cần bổ sung kiến thức và kinh nghiệm cho vị trí này.")
    } else {
        format!("Ứng viên {name} chưa đáp ứng yêu cầu của vị trí, nên tiếp tục rèn luyện trước khi ứng tuyển.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interview::catalog::SAMPLE_CATALOG;
    use crate::llm_client::testing::ScriptedChat;

    fn service(chat: Option<Arc<dyn ChatModel>>) -> InterviewService {
        InterviewService::new(InterviewCatalog::from_json(SAMPLE_CATALOG).unwrap(), chat)
    }

    fn candidate() -> Candidate {
        Candidate {
            name: "Lan".to_string(),
            age: 22,
            job: "Lập trình viên".to_string(),
        }
    }

    fn session_id(step: &NextStep) -> String {
        match step {
            NextStep::Question { session_id, .. } | NextStep::Complete { session_id, .. } => {
                session_id.clone()
            }
        }
    }

    #[test]
    fn test_parse_score_reply() {
        let reply = "ĐÁNH GIÁ: 3\nLÝ DO: Trả lời rõ ràng.\nCó ví dụ.\n\nGhi chú thêm";
        assert_eq!(
            parse_score_reply(reply),
            AnswerScore {
                score: 3,
                reasoning: "Trả lời rõ ràng.\nCó ví dụ.".to_string()
            }
        );
    }

    #[test]
    fn test_parse_score_reply_clamps_and_defaults() {
        assert_eq!(parse_score_reply("ĐÁNH GIÁ: 9").score, 4);
        assert_eq!(parse_score_reply("ĐÁNH GIÁ: 0").score, 1);
        assert_eq!(parse_score_reply("đánh giá: 3").score, 3);
        let unparseable = parse_score_reply("Tốt lắm");
        assert_eq!(unparseable.score, DEFAULT_SCORE);
        assert_eq!(unparseable.reasoning, NO_REASONING);
    }

    #[test]
    fn test_band_message_thresholds() {
        assert!(band_message("A", 80.0).contains("xuất sắc"));
        assert!(band_message("A", 79.9).contains("thể hiện tốt"));
        assert!(band_message("A", 40.0).contains("trung bình"));
        assert!(band_message("A", 39.9).contains("chưa đáp ứng"));
    }

    #[test]
    fn test_start_rejects_unknown_career() {
        let svc = service(None);
        let mut c = candidate();
        c.job = "Phi hành gia".to_string();
        assert!(matches!(svc.start(c), Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_full_interview_walk() {
        let chat = Arc::new(ScriptedChat::replying(&[
            "ĐÁNH GIÁ: 4\nLÝ DO: Rất tốt",
            "ĐÁNH GIÁ: 3\nLÝ DO: Ổn",
            "Đánh giá tổng quan: ứng viên tiềm năng.",
        ]));
        let svc = service(Some(chat.clone()));

        let step = svc.start(candidate()).unwrap();
        let id = session_id(&step);
        match &step {
            NextStep::Question { question, progress, .. } => {
                assert_eq!(question, "Bạn dùng ngôn ngữ nào?");
                assert_eq!(progress.criteria_total, 2);
                assert_eq!(progress.question_total, 2);
            }
            other => panic!("unexpected {other:?}"),
        }

        // First answer does not trigger scoring.
        let step = svc.answer(&id, "Rust").await.unwrap();
        assert_eq!(chat.calls(), 0);
        assert!(matches!(&step, NextStep::Question { progress, .. } if progress.question_index == 1));

        let step = svc.answer(&id, "Hệ thống thanh toán").await.unwrap();
        assert_eq!(chat.calls(), 1);
        assert!(chat.prompts.lock().unwrap()[0].contains("Rust\n\nHệ thống thanh toán"));
        assert!(matches!(&step, NextStep::Question { progress, .. } if progress.criteria_index == 1 && progress.question_index == 0));

        let step = svc.answer(&id, "Tôi lắng nghe").await.unwrap();
        assert!(matches!(step, NextStep::Complete { complete: true, .. }));

        let err = svc.answer(&id, "thêm").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let report = svc.finish(&id).await.unwrap();
        assert_eq!(report.total_score, 7);
        assert_eq!(report.max_score, 8);
        assert!((report.score_percentage - 87.5).abs() < 1e-9);
        assert_eq!(report.evaluation, "Đánh giá tổng quan: ứng viên tiềm năng.");
        assert_eq!(report.detailed_results[0].reasoning.as_deref(), Some("Rất tốt"));
    }

    #[tokio::test]
    async fn test_without_llm_scores_default_and_uses_band() {
        let svc = service(None);
        let id = session_id(&svc.start(candidate()).unwrap());
        for answer in ["a", "b", "c"] {
            svc.answer(&id, answer).await.unwrap();
        }

        let report = svc.finish(&id).await.unwrap();
        assert!(report.detailed_results.iter().all(|r| r.score == DEFAULT_SCORE));
        assert_eq!(report.score_percentage, 50.0);
        assert!(report.evaluation.contains("trung bình"));
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let svc = service(None);
        assert!(matches!(svc.answer("nope", "x").await, Err(AppError::Validation(m)) if m == "Invalid session"));
        assert!(svc.finish("nope").await.is_err());
    }
}
