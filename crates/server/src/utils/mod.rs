mod process_time;
pub use process_time::process_time;

mod state;
pub use state::AppState;
