pub mod error;
pub mod types;

pub use error::{CoreError, Result};
pub use types::{entropy_ref, now_millis};
