//! Cache-related MCP tools.
//!
//! This module provides tools for inspecting and pruning the resource cache.

pub mod remove;
pub mod search;

pub use remove::{CacheRemoveParams, remove_impl};
pub use search::{CacheSearchParams, search_impl};
