//! Career counseling agent: retrieval confidence and semantic relevance
//! decide between grounded advice, general advice and an off-topic reply.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::llm_client::{ChatModel, LlmError};
use crate::rag::embeddings::EmbeddingGenerator;
use crate::rag::prompts::{
    ANSWER_TEMPLATE, CAREER_REFERENCE_QUESTIONS, COUNSELOR_SYSTEM, EMPTY_QUESTION_REPLY,
    GENERATION_FAILED, GREETINGS, GREETING_REPLIES, INSUFFICIENT_CONTEXT_TEMPLATE, NO_DOCUMENTS,
    OFF_TOPIC_REPLY, TOPIC_CHECK_SYSTEM, TOPIC_CHECK_TEMPLATE,
};
use crate::rag::store::{cosine_similarity, DocumentStore, ScoredChunk};

pub const RELEVANCE_THRESHOLD: f32 = 0.6;
pub const HIGH_CONFIDENCE_THRESHOLD: f32 = 0.8;
pub const OFF_TOPIC_THRESHOLD: f32 = 0.3;
const NEUTRAL_RELEVANCE: f32 = 0.5;
const CONTEXT_PREVIEW_CHARS: usize = 500;

/// Greetings that are only matched as whole words.
const WORD_GREETINGS: [&str; 3] = ["hi", "hey", "hello"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    EmptyQuestion,
    Greeting,
    OffTopic,
    HighConfidenceAdvice,
    MediumConfidenceAdvice,
    GeneralAdvice,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentAnswer {
    pub response: String,
    #[serde(rename = "type")]
    pub kind: AnswerKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_docs: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_relevance: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieval_confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combined_confidence: Option<f32>,
    pub processing_time: f64,
}

impl AgentAnswer {
    fn plain(response: &str, kind: AnswerKind, started: Instant) -> Self {
        Self {
            response: response.to_string(),
            kind,
            context_docs: None,
            semantic_relevance: None,
            retrieval_confidence: None,
            combined_confidence: None,
            processing_time: started.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Default)]
struct References {
    questions: Vec<String>,
    embeddings: Vec<Vec<f32>>,
}

pub struct CareerAgent {
    chat: Arc<dyn ChatModel>,
    embeddings: EmbeddingGenerator,
    store: DocumentStore,
    max_results: usize,
    references: RwLock<References>,
}

impl CareerAgent {
    /// Embeds the reference questions up front. A provider failure leaves
    /// the agent without references rather than failing construction.
    pub async fn new(
        chat: Arc<dyn ChatModel>,
        embeddings: EmbeddingGenerator,
        store: DocumentStore,
        max_results: usize,
    ) -> Self {
        let questions: Vec<String> = CAREER_REFERENCE_QUESTIONS.iter().map(|q| q.to_string()).collect();
        let reference_embeddings = match embed_all(&embeddings, &questions).await {
            Ok(vectors) => {
                info!("Computed {} reference embeddings", vectors.len());
                vectors
            }
            Err(e) => {
                warn!("Failed to compute reference embeddings: {e}");
                Vec::new()
            }
        };

        Self {
            chat,
            embeddings,
            store,
            max_results,
            references: RwLock::new(References {
                questions,
                embeddings: reference_embeddings,
            }),
        }
    }

    pub async fn answer_question(&self, question: &str) -> AgentAnswer {
        let started = Instant::now();
        let question = question.trim();

        if question.is_empty() {
            return AgentAnswer::plain(EMPTY_QUESTION_REPLY, AnswerKind::EmptyQuestion, started);
        }

        let preview: String = question.chars().take(100).collect();
        info!("Processing question: {preview}");

        if is_greeting(question) {
            return AgentAnswer::plain(&handle_greeting(question), AnswerKind::Greeting, started);
        }

        let (documents, retrieval) = self.retrieve_with_confidence(question, self.max_results).await;
        let semantic = self.semantic_relevance(question).await;
        let combined = retrieval.max(semantic);

        if combined < OFF_TOPIC_THRESHOLD && !self.check_topic_relevance(question).await {
            return AgentAnswer {
                semantic_relevance: Some(semantic),
                retrieval_confidence: Some(retrieval),
                ..AgentAnswer::plain(OFF_TOPIC_REPLY, AnswerKind::OffTopic, started)
            };
        }

        let context = format_context(&documents);
        let response = self.generate_response(question, &context, combined).await;

        let kind = if combined >= HIGH_CONFIDENCE_THRESHOLD {
            AnswerKind::HighConfidenceAdvice
        } else if combined >= RELEVANCE_THRESHOLD {
            AnswerKind::MediumConfidenceAdvice
        } else {
            AnswerKind::GeneralAdvice
        };

        let answer = AgentAnswer {
            response,
            kind,
            context_docs: Some(documents.len()),
            semantic_relevance: Some(semantic),
            retrieval_confidence: Some(retrieval),
            combined_confidence: Some(combined),
            processing_time: started.elapsed().as_secs_f64(),
        };
        info!("Question answered in {:.2}s", answer.processing_time);
        answer
    }

    /// Highest cosine similarity to a reference question; neutral when
    /// there are no references or the question cannot be embedded.
    pub async fn semantic_relevance(&self, question: &str) -> f32 {
        let references = self.references.read().await;
        if references.embeddings.is_empty() {
            warn!("No reference embeddings available, using neutral relevance");
            return NEUTRAL_RELEVANCE;
        }

        match self.embeddings.generate_single(question).await {
            Ok(embedding) => {
                let best = references
                    .embeddings
                    .iter()
                    .map(|reference| cosine_similarity(&embedding, reference))
                    .fold(f32::MIN, f32::max);
                info!("Semantic relevance score: {best:.3}");
                best
            }
            Err(e) => {
                warn!("Semantic relevance computation failed: {e}");
                NEUTRAL_RELEVANCE
            }
        }
    }

    pub async fn retrieve_with_confidence(&self, question: &str, k: usize) -> (Vec<ScoredChunk>, f32) {
        let embedding = match self.embeddings.generate_single(question).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!("Context retrieval failed: {e}");
                return (Vec::new(), 0.0);
            }
        };

        match self.store.search_similar(&embedding, k).await {
            Ok(documents) => {
                let confidence = documents
                    .iter()
                    .map(|d| d.similarity_score)
                    .fold(0.0, f32::max);
                info!("Retrieved {} docs, max confidence: {confidence:.3}", documents.len());
                (documents, confidence)
            }
            Err(e) => {
                warn!("Context retrieval failed: {e}");
                (Vec::new(), 0.0)
            }
        }
    }

    pub async fn generate_response(&self, question: &str, context: &str, confidence: f32) -> String {
        let prompt = if confidence >= RELEVANCE_THRESHOLD {
            ANSWER_TEMPLATE
                .replace("{confidence_level}", confidence_level(confidence))
                .replace("{context}", context)
                .replace("{question}", question)
        } else {
            INSUFFICIENT_CONTEXT_TEMPLATE.replace("{question}", question)
        };

        match self.chat.complete(COUNSELOR_SYSTEM, &prompt).await {
            Ok(response) => response,
            Err(e) => {
                error!("Response generation failed: {e}");
                GENERATION_FAILED.to_string()
            }
        }
    }

    /// Asks the model whether the question is about careers or study.
    /// Any failure lets the question through.
    pub async fn check_topic_relevance(&self, question: &str) -> bool {
        let prompt = TOPIC_CHECK_TEMPLATE.replace("{question}", question);
        match self.chat.complete(TOPIC_CHECK_SYSTEM, &prompt).await {
            Ok(reply) => {
                let relevant = reply.trim().to_uppercase().contains("CÓ");
                info!("LLM topic check: {relevant}");
                relevant
            }
            Err(e) => {
                warn!("LLM topic check failed: {e}");
                true
            }
        }
    }

    /// Appends questions and re-embeds the whole list. The previous
    /// references stay in place if embedding fails.
    pub async fn update_domain_references(&self, new_questions: Vec<String>) -> Result<usize, LlmError> {
        let mut references = self.references.write().await;
        let mut questions = references.questions.clone();
        questions.extend(new_questions);

        match embed_all(&self.embeddings, &questions).await {
            Ok(embeddings) => {
                references.questions = questions;
                references.embeddings = embeddings;
                info!("Updated domain references: {} questions", references.questions.len());
                Ok(references.questions.len())
            }
            Err(e) => {
                error!("Failed to update domain references: {e}");
                Err(e)
            }
        }
    }

    pub async fn agent_info(&self) -> Value {
        let references = self.references.read().await;
        json!({
            "name": "Career Counseling Agent",
            "domain": "career_counseling",
            "approach": "semantic_similarity",
            "capabilities": [
                "Tư vấn hướng nghiệp với độ tin cậy cao",
                "Phân tích ngữ nghĩa để xác định chủ đề",
                "Định hướng học tập dựa trên ngữ cảnh",
                "Đánh giá độ liên quan tự động"
            ],
            "languages": ["Vietnamese"],
            "model": self.chat.model_name(),
            "embedding_model": self.embeddings.model_name(),
            "relevance_threshold": RELEVANCE_THRESHOLD,
            "high_confidence_threshold": HIGH_CONFIDENCE_THRESHOLD,
            "reference_questions": references.questions.len(),
            "reference_embeddings": references.embeddings.len(),
        })
    }
}

async fn embed_all(generator: &EmbeddingGenerator, questions: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
    let mut vectors = Vec::with_capacity(questions.len());
    for question in questions {
        vectors.push(generator.generate_single(question).await?);
    }
    Ok(vectors)
}

pub fn is_greeting(question: &str) -> bool {
    let lower = question.trim().to_lowercase();
    GREETINGS.iter().any(|greeting| {
        if WORD_GREETINGS.contains(greeting) {
            lower
                .split(|c: char| !c.is_alphanumeric())
                .any(|word| word == *greeting)
        } else {
            lower.contains(greeting)
        }
    })
}

pub fn handle_greeting(question: &str) -> String {
    let lower = question.to_lowercase();
    if lower.contains("buổi sáng") {
        format!("Chào buổi sáng! {}", GREETING_REPLIES[0])
    } else if lower.contains("buổi chiều") {
        format!("Chào buổi chiều! {}", GREETING_REPLIES[1])
    } else if lower.contains("buổi tối") {
        format!("Chào buổi tối! {}", GREETING_REPLIES[2])
    } else {
        GREETING_REPLIES[0].to_string()
    }
}

pub fn format_context(documents: &[ScoredChunk]) -> String {
    if documents.is_empty() {
        return NO_DOCUMENTS.to_string();
    }

    documents
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            let mut content: String = doc.content.chars().take(CONTEXT_PREVIEW_CHARS).collect();
            if doc.content.chars().count() > CONTEXT_PREVIEW_CHARS {
                content.push_str("...");
            }
            let source = doc
                .title()
                .map(str::to_string)
                .unwrap_or_else(|| format!("Tài liệu {}", i + 1));
            format!("[{source}] (độ liên quan: {:.2})\n{content}", doc.similarity_score)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn confidence_level(confidence: f32) -> &'static str {
    if confidence >= HIGH_CONFIDENCE_THRESHOLD {
        "cao"
    } else if confidence >= RELEVANCE_THRESHOLD {
        "trung bình"
    } else {
        "thấp"
    }
}


#[cfg(test)]
mod tests {
    use super::testing::agent;
    use super::*;
    use crate::llm_client::testing::{FixedEmbeddings, ScriptedChat};
    use crate::rag::store::embedded_chunk;

    fn scored(content: &str, title: Option<&str>, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk_id: "c".into(),
            content: content.into(),
            parent_content: None,
            strategy: "simple".into(),
            metadata: title.map(|t| json!({"title": t})).unwrap_or_else(|| json!({})),
            similarity_score: score,
        }
    }

    #[test]
    fn test_greeting_detection() {
        assert!(is_greeting("Xin chào"));
        assert!(is_greeting("hi there"));
        assert!(is_greeting("Hey!"));
        assert!(!is_greeting("which job suits me?"));
        assert!(!is_greeting("Tôi nên học ngành gì?"));
    }

    #[test]
    fn test_greeting_replies_follow_time_of_day() {
        assert!(handle_greeting("Chúc buổi sáng").starts_with("Chào buổi sáng! Xin chào!"));
        assert!(handle_greeting("chúc buổi tối").starts_with("Chào buổi tối! Hello!"));
        assert_eq!(handle_greeting("hello"), GREETING_REPLIES[0]);
    }

    #[test]
    fn test_format_context() {
        assert_eq!(format_context(&[]), NO_DOCUMENTS);

        let long = "ý".repeat(600);
        let formatted = format_context(&[scored(&long, Some("Sổ tay"), 0.876), scored("ngắn", None, 0.5)]);
        let blocks: Vec<&str> = formatted.split("\n\n").collect();
        assert!(blocks[0].starts_with("[Sổ tay] (độ liên quan: 0.88)\n"));
        assert!(blocks[0].ends_with("..."));
        assert_eq!(blocks[0].lines().nth(1).unwrap().chars().count(), 503);
        assert_eq!(blocks[1], "[Tài liệu 2] (độ liên quan: 0.50)\nngắn");
    }

    #[test]
    fn test_confidence_levels() {
        assert_eq!(confidence_level(0.85), "cao");
        assert_eq!(confidence_level(0.6), "trung bình");
        assert_eq!(confidence_level(0.2), "thấp");
    }

    #[tokio::test]
    async fn test_empty_and_greeting_skip_the_model() {
        let chat = Arc::new(ScriptedChat::replying(&["unused"]));
        let (agent, _) = agent(chat.clone(), FixedEmbeddings::new(Some(vec![1.0, 0.0, 0.0]))).await;

        assert_eq!(agent.answer_question("   ").await.kind, AnswerKind::EmptyQuestion);
        let greeting = agent.answer_question("Chào bạn").await;
        assert_eq!(greeting.kind, AnswerKind::Greeting);
        assert!(greeting.context_docs.is_none());
        assert_eq!(chat.calls(), 0);
    }

    #[tokio::test]
    async fn test_high_confidence_uses_context() {
        let chat = Arc::new(ScriptedChat::replying(&["Nên học CNTT."]));
        let (agent, store) = agent(chat.clone(), FixedEmbeddings::new(Some(vec![1.0, 0.0, 0.0]))).await;
        store
            .store_chunks(&[embedded_chunk("it", "Ngành CNTT đang thiếu nhân lực.", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();

        let answer = agent.answer_question("Nên học ngành gì?").await;
        assert_eq!(answer.kind, AnswerKind::HighConfidenceAdvice);
        assert_eq!(answer.response, "Nên học CNTT.");
        assert_eq!(answer.context_docs, Some(1));
        assert!((answer.retrieval_confidence.unwrap() - 1.0).abs() < 1e-6);

        let prompt = chat.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("(độ liên quan: cao)"));
        assert!(prompt.contains("[Tài liệu it]"));
    }

    #[tokio::test]
    async fn test_off_topic_after_model_check() {
        let chat = Arc::new(ScriptedChat::replying(&["KHÔNG, không liên quan"]));
        let embeddings = FixedEmbeddings::new(Some(vec![1.0, 0.0, 0.0])).with("Công thức phở bò?", vec![0.0, 0.0, 1.0]);
        let (agent, _) = agent(chat.clone(), embeddings).await;

        let answer = agent.answer_question("Công thức phở bò?").await;
        assert_eq!(answer.kind, AnswerKind::OffTopic);
        assert_eq!(answer.semantic_relevance, Some(0.0));
        assert!(answer.combined_confidence.is_none());
        assert_eq!(chat.calls(), 1);
    }

    #[tokio::test]
    async fn test_low_confidence_allowed_by_model_gets_general_advice() {
        let chat = Arc::new(ScriptedChat::replying(&["CÓ", "Lời khuyên chung"]));
        let embeddings = FixedEmbeddings::new(Some(vec![1.0, 0.0, 0.0])).with("Nghề bay?", vec![0.0, 0.0, 1.0]);
        let (agent, _) = agent(chat.clone(), embeddings).await;

        let answer = agent.answer_question("Nghề bay?").await;
        assert_eq!(answer.kind, AnswerKind::GeneralAdvice);
        assert_eq!(answer.response, "Lời khuyên chung");
        assert!(chat.prompts.lock().unwrap()[1].contains("Tôi không tìm thấy thông tin cụ thể"));
    }

    #[tokio::test]
    async fn test_embedding_outage_is_neutral() {
        let chat = Arc::new(ScriptedChat::replying(&["Trả lời"]));
        let (agent, _) = agent(chat.clone(), FixedEmbeddings::new(None)).await;

        assert_eq!(agent.semantic_relevance("bất kỳ").await, NEUTRAL_RELEVANCE);
        let (docs, confidence) = agent.retrieve_with_confidence("bất kỳ", 5).await;
        assert!(docs.is_empty());
        assert_eq!(confidence, 0.0);

        let answer = agent.answer_question("Tôi nên làm gì?").await;
        assert_eq!(answer.kind, AnswerKind::GeneralAdvice);
        assert_eq!(answer.combined_confidence, Some(NEUTRAL_RELEVANCE));
        assert_eq!(chat.calls(), 1);
    }

    #[tokio::test]
    async fn test_generation_failure_apologises() {
        let (agent, _) = agent(Arc::new(ScriptedChat::failing()), FixedEmbeddings::new(Some(vec![1.0, 0.0, 0.0]))).await;
        let answer = agent.answer_question("Nên học ngành gì?").await;
        assert_eq!(answer.response, GENERATION_FAILED);
    }

    #[tokio::test]
    async fn test_update_domain_references() {
        let (agent, _) = agent(
            Arc::new(ScriptedChat::replying(&["x"])),
            FixedEmbeddings::new(Some(vec![1.0, 0.0, 0.0])),
        )
        .await;

        let total = agent
            .update_domain_references(vec!["Học y có khó không?".to_string()])
            .await
            .unwrap();
        assert_eq!(total, 11);
        assert_eq!(agent.agent_info().await["reference_questions"], 11);
    }
}
