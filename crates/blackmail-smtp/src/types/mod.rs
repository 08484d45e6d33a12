//! Core SMTP types.

mod extension;
mod reply;

pub use extension::{AuthMechanism, Extensions};
pub use reply::{Reply, ReplyCode};
