pub mod config;
pub mod crypto;
pub mod daemon;
pub mod db;
pub mod error;
pub mod http;
pub mod logging;
pub mod models;
pub mod repository;
pub mod services;
pub mod state;

#[cfg(test)]
mod tests;
