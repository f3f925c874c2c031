use engram_core::MemoryService;

#[derive(Clone)]
pub struct AppState {
  pub service: MemoryService,
}

impl AppState {
  #[must_use]
  pub const fn new(service: MemoryService) -> Self {
    Self { service }
  }
}
