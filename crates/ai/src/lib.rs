mod cosine_similarity;
pub use cosine_similarity::cosine_similarity;

mod embedding;
pub use embedding::{DeterministicEmbedder, Embedder, OpenAiEmbedder};

mod llm;
pub use llm::{Llm, OpenAiLlm, ScriptedLlm};

mod rate_limit;
pub use rate_limit::RateLimiter;

mod retry;
pub use retry::RetryPolicy;

mod schema;
pub use schema::ResponseSchema;
