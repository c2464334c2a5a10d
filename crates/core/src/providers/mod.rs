pub mod gemini;
pub mod sse;

pub use gemini::{GeminiClient, GeminiConfig};
pub use sse::SseDecoder;
