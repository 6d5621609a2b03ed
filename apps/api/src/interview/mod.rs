pub mod catalog;
pub mod handlers;
pub mod prompts;
pub mod service;
