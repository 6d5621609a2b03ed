/// System prompt for the career counseling agent.
pub const COUNSELOR_SYSTEM: &str = "Bạn là một trợ lý AI chuyên về tư vấn hướng nghiệp cho học sinh, sinh viên hoặc người đang tìm kiếm định hướng nghề nghiệp.

Nhiệm vụ của bạn:
1. Đưa ra lời khuyên chuyên nghiệp về hướng nghiệp dựa trên ngữ cảnh được cung cấp
2. Trả lời một cách rõ ràng, chuyên nghiệp và mang tính định hướng
3. Nếu ngữ cảnh không đủ thông tin liên quan, hãy đưa ra lời khuyên chung nhưng vẫn hữu ích
4. Luôn giữ thái độ tích cực và hỗ trợ người dùng";

/// Placeholders: {confidence_level}, {context}, {question}
pub const ANSWER_TEMPLATE: &str = "Dưới đây là ngữ cảnh tài liệu liên quan (độ liên quan: {confidence_level}):

{context}

Câu hỏi từ người dùng: {question}

Dựa trên ngữ cảnh trên, hãy trả lời một cách rõ ràng, chuyên nghiệp và mang tính định hướng:";

/// Placeholder: {question}
pub const INSUFFICIENT_CONTEXT_TEMPLATE: &str = "Câu hỏi từ người dùng: {question}

Tôi không tìm thấy thông tin cụ thể liên quan đến câu hỏi này trong cơ sở dữ liệu hiện tại.
Tuy nhiên, với tư cách là trợ lý tư vấn nghề nghiệp, tôi có thể đưa ra một số lời khuyên chung và hướng dẫn bạn tìm hiểu thêm:";

pub const TOPIC_CHECK_SYSTEM: &str = "Bạn là chuyên gia phân loại câu hỏi.";

/// Placeholder: {question}
pub const TOPIC_CHECK_TEMPLATE: &str = "Hãy đánh giá xem câu hỏi sau có liên quan đến nghề nghiệp, học tập, hoặc định hướng tương lai không:

Câu hỏi: \"{question}\"

Trả lời chỉ \"CÓ\" hoặc \"KHÔNG\" và giải thích ngắn gọn.";

pub const NO_DOCUMENTS: &str = "Không tìm thấy tài liệu liên quan trong cơ sở dữ liệu.";

pub const GENERATION_FAILED: &str = "Xin lỗi, tôi gặp lỗi kỹ thuật. Vui lòng thử lại sau.";

pub const EMPTY_QUESTION_REPLY: &str =
    "Bạn chưa đặt câu hỏi. Hãy hỏi tôi về các vấn đề liên quan đến nghề nghiệp nhé!";

pub const OFF_TOPIC_REPLY: &str = "Tôi chuyên tư vấn về các vấn đề liên quan đến nghề nghiệp, học tập và định hướng tương lai. Bạn có thể đặt câu hỏi khác liên quan đến những chủ đề này không?";

pub const GREETING_REPLIES: [&str; 3] = [
    "Xin chào! Tôi là trợ lý tư vấn hướng nghiệp. Tôi có thể giúp bạn với các câu hỏi về nghề nghiệp, học tập và định hướng tương lai. Bạn có câu hỏi gì không?",
    "Chào bạn! Rất vui được hỗ trợ bạn về vấn đề hướng nghiệp. Bạn đang quan tâm đến lĩnh vực nào?",
    "Hello! Tôi chuyên tư vấn về nghề nghiệp và định hướng học tập. Bạn cần tư vấn về vấn đề gì?",
];

pub const GREETINGS: [&str; 11] = [
    "xin chào",
    "chào",
    "hello",
    "hi",
    "hey",
    "chào bạn",
    "bạn khỏe không",
    "chúc buổi sáng",
    "chúc buổi chiều",
    "chúc buổi tối",
    "chào buổi",
];

pub const CAREER_REFERENCE_QUESTIONS: [&str; 10] = [
    "Nên học ngành gì để có tương lai tốt?",
    "Làm thế nào để chọn nghề phù hợp?",
    "Ngành công nghệ thông tin có triển vọng không?",
    "Mức lương của nghề marketing như thế nào?",
    "Tôi nên học đại học hay học nghề?",
    "Kỹ năng nào cần thiết để xin việc?",
    "Làm sao để viết CV ấn tượng?",
    "Cách chuẩn bị cho buổi phỏng vấn xin việc?",
    "Nghề nào phù hợp với người hướng nội?",
    "Học bằng cấp 2 có thể làm nghề gì?",
];

pub const STRUCTURE_SYSTEM: &str =
    "You clean up text extracted from PDF documents without dropping any content.";

/// Placeholders: {chunk_info}, {part_note}, {text}
pub const STRUCTURE_TEMPLATE: &str = "Please clean and structure the following text extracted from a PDF document{chunk_info}.
Preserve and enhance the document structure by:

1. Identifying and properly formatting headers and subheaders
2. Maintaining paragraph structure
3. Preserving lists and numbered items
4. Fixing any OCR errors or formatting issues
5. Adding appropriate line breaks and spacing
6. Keeping all the original content but making it more readable

{part_note}

Original text:
---
{text}
---

Please return the cleaned and structured version:";

pub const PART_NOTE: &str = "Note: This is part of a larger document. Focus on making this section coherent while preserving connection points for merging.";
