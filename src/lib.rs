pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod loaders;
pub mod models;
pub mod store;
