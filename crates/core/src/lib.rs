mod consolidator;
pub use consolidator::{Consolidation, PlanAction, PlanItem};

mod extractor;
pub use extractor::flatten_transcript;

mod factory;
pub use factory::build_service;

mod model;
pub use model::{
  ActionConfirmation, ActionStatus, ConversationMessage, MemoryResponse, MessagePart,
};

mod prompts;

mod service;
pub use service::{MemoryService, MemoryUpdateItem};

pub use engram_shared::{MemoryFilter, MemoryMetadata};
