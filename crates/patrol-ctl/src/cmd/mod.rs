//! CLI command modules.

pub mod http;
pub mod messages;
pub mod orders;
pub mod status;
pub mod users;
