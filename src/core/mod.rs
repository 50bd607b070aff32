pub mod admin;
pub mod config;
pub mod errors;
pub mod positioning;
pub mod receipts;
pub mod services;
pub mod sync;
pub mod traits;
pub mod widget;
