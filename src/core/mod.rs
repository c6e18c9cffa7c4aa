pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod poller;
pub mod progress;
pub mod session;

#[cfg(test)]
mod api_tests;
