//! Management API for the rate limit configuration.

mod server;
mod store;

pub use server::{ManagementServer, ManagementState};
pub use store::{ConfigStore, FileConfigStore};
