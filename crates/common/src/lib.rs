//! Common utilities and types used across the media layer.

pub mod error;
pub mod id;
pub mod time;

pub use error::{MediaError, MediaResult};
pub use id::ObjectId;
pub use time::Millis;
