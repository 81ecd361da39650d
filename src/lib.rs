pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod global;
pub mod report;
