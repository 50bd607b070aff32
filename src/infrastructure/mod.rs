pub mod database;
pub mod entities;
pub mod position_store;
pub mod repositories;
pub mod traits;
