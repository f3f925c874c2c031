mod error;
pub use error::MemoryError;

mod config;
pub use config::{Config, DbConfig, EmbeddingConfig, LlmConfig, TelemetryConfig};

mod memory;
pub use memory::{MemoryFilter, MemoryMetadata, MemoryRecord};

mod telemetry;
pub use telemetry::{safe_serialize, span_kind};
