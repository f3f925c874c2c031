pub mod api;
pub mod utils;

mod error;
pub use error::ApiError;

mod server;
pub use server::{app, serve};

// Re-export for OpenAPI documentation
pub use api::ApiDoc;
