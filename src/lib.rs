pub mod auth;
pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod server;
