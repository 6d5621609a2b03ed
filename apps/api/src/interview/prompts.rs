pub const INTERVIEW_SYSTEM: &str =
    "Bạn là chuyên gia đánh giá các buổi phỏng vấn tuyển dụng. Trả lời bằng tiếng Việt.";

/// Per-criterion scoring. Placeholders: `{job}`, `{criteria}`, `{question}`,
/// `{answer}`, `{levels}`. The reply format is parsed by `parse_score_reply`.
pub const SCORE_PROMPT_TEMPLATE: &str = r#"Hãy đánh giá câu trả lời dưới đây cho một câu hỏi phỏng vấn cho vị trí {job}.

Tiêu chí đánh giá: {criteria}

Câu hỏi: {question}

Câu trả lời của ứng viên: {answer}

Dựa trên các cấp độ đánh giá sau:
{levels}

Trả lời theo định dạng:
ĐÁNH GIÁ: [1-4]
LÝ DO: [giải thích chi tiết]"#;

/// Final write-up. Placeholders: `{name}`, `{age}`, `{job}`, `{results}`,
/// `{total}`, `{max}`, `{percentage}`.
pub const FINAL_PROMPT_TEMPLATE: &str = r#"Đánh giá tổng quan ứng viên:

- Họ tên: {name}
- Tuổi: {age}
- Vị trí: {job}

Kết quả:
{results}

Tổng điểm: {total}/{max} ({percentage}%)

Hãy viết một đánh giá 3-5 đoạn, chuyên nghiệp và có tính xây dựng."#;

pub const NO_REASONING: &str = "Không có giải thích cụ thể.";
pub const SCORING_UNAVAILABLE: &str = "Đánh giá tự động không khả dụng. Điểm mặc định được sử dụng.";
