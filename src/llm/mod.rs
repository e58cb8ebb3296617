// src/llm/mod.rs

pub mod ollama;
pub mod prompt;
