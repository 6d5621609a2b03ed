// Prompt text for CV evaluation. Output is expected in Vietnamese and must end
// with a "Tổng điểm: XX/100" line, which `extract_score` reads back.

pub const EVALUATION_SYSTEM: &str = "Bạn là chuyên gia tuyển dụng chuyên nghiệp. \
    Hãy đánh giá CV một cách khách quan, có dẫn chứng cụ thể và trả lời bằng tiếng Việt.";

/// T-shape rubric. Replace `{industry}` before sending.
pub const TSHAPE_CRITERIA: &str = r#"ĐÁNH GIÁ CV THEO CHUẨN T-SHAPE SKILLS

1. **Chiều sâu (Vertical Skills):**
- Kiến thức chuyên môn sâu sắc liên quan đến lĩnh vực {industry}.
- Kỹ năng ứng dụng công nghệ hiện đại và công cụ chuyên ngành.
- Kỹ năng đánh giá và đo lường hiệu quả công việc qua các dự án hoặc kết quả thực tế.

2. **Chiều rộng (Horizontal Skills):**
- Kỹ năng truyền đạt, hướng dẫn và đào tạo người khác.
- Kỹ năng tương tác, giao tiếp hiệu quả trong môi trường đa dạng.
- Kỹ năng lập kế hoạch, thiết kế nội dung công việc khoa học.
- Kỹ năng tổ chức, quản lý và điều phối các hoạt động thực tiễn.
- Khả năng thích ứng linh hoạt, hỗ trợ cá nhân hóa theo yêu cầu.
- Tư duy phát triển bản thân, đổi mới sáng tạo không ngừng.
- Tinh thần trách nhiệm và đạo đức nghề nghiệp cao.

**Nhiệm vụ:** Đánh giá chi tiết theo từng nhóm kỹ năng và đưa ra điểm số từ 0-100."#;

pub const ATS_CRITERIA: &str = r#"ĐÁNH GIÁ CV THEO CHUẨN ATS

1. Từ khóa phù hợp (30%): CV chứa từ khóa liên quan job description
2. Định dạng chuẩn (20%): PDF/DOCX, font đơn giản, tránh thiết kế phức tạp
3. Cấu trúc logic (15%): Thông tin cá nhân, tóm tắt, kinh nghiệm, kỹ năng, học vấn
4. Phù hợp với JD (20%): Kỹ năng và kinh nghiệm match với yêu cầu
5. Không lỗi chính tả (10%): Chính tả và ngữ pháp chính xác
6. Hồ sơ chuyên nghiệp (5%): LinkedIn, GitHub, Portfolio

Tổng điểm từ 0–100 theo chuẩn ATS."#;

/// JD block. Replace `{job_description}` before sending.
pub const JD_SECTION: &str = r#"--- MÔ TẢ CÔNG VIỆC (JD) ---
{job_description}

Hãy so sánh CV với mô tả công việc này và đánh giá mức độ phù hợp."#;

/// Main evaluation prompt. Placeholders: `{industry_upper}`, `{criteria}`,
/// `{jd_section}`, `{cv_text}`, `{industry}`, `{jd_step}`, `{summary_index}`.
pub const EVALUATION_PROMPT_TEMPLATE: &str = r#"Ngành tuyển dụng: {industry_upper}.

--- TIÊU CHÍ ĐÁNH GIÁ ---
{criteria}

{jd_section}

--- CV ỨNG VIÊN ---
{cv_text}

Hãy thực hiện đánh giá theo các bước:
1. Phân tích kỹ năng và kinh nghiệm nổi bật
2. Đánh giá độ phù hợp với ngành {industry}
3. Phân tích kỹ năng chuyên môn (có ví dụ cụ thể)
4. Đánh giá kỹ năng mềm và khả năng học hỏi
{jd_step}{summary_index}. Tổng kết điểm mạnh, yếu và khuyến nghị

Đặc biệt chú ý:
- Gắn cờ 🚩 cho nội dung chung chung, thiếu bằng chứng
- Phát hiện dấu hiệu đạo nhái hoặc nhồi nhét từ khóa
- Đánh giá tính tự nhiên và chân thực của CV

👉 **Cuối cùng, cho điểm từ 0-100**
Tổng điểm: XX/100"#;

pub const JD_STEP: &str = "5. So sánh với JD và đánh giá mức độ phù hợp\n";
