pub mod import;
pub mod query;
pub mod serve;

// Re-export command functions for convenience
pub use import::import;
pub use query::{platforms, stats};
pub use serve::{serve, ServeParams};
