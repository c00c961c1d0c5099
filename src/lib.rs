pub mod app;
pub mod auth;
pub mod config;
pub mod cookies;
pub mod db;
pub mod state;
