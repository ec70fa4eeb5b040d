pub mod chat;
pub mod config_api;
pub mod errors;
pub mod models;
pub mod thinking;
