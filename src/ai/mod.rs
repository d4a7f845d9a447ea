pub mod openai;
pub mod perplexity;

pub use openai::OpenAiClient;
pub use perplexity::PerplexitySearch;
