// CV evaluation service.
// PDF text goes through `evaluator`, which calls the LLM only via the ChatModel trait.

pub mod evaluator;
pub mod handlers;
pub mod prompts;
