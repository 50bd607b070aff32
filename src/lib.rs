//! Live-support chat: session manager, message sync, read receipts and widget placement.
//!
//! (c) Softlandia 2025

pub mod api;
pub mod core;
pub mod infrastructure;
