mod traits;
mod ollama;

pub use traits::*;
pub use ollama::{OllamaClient, SamplingOptions, DEFAULT_OLLAMA_URL};
