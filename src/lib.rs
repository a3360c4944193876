pub mod api;
pub mod browser;
pub mod config;
pub mod crawler;
pub mod error;
pub mod extract;
pub mod models;
