pub mod content;
pub mod embedding;
pub mod entities;
pub mod llm;

pub use content::HttpContentFetcher;
pub use embedding::HfEmbedder;
pub use entities::HfEntityRecognizer;
pub use llm::AnthropicFactExtractor;
