pub mod actors;
pub mod application;
pub mod cache;
pub mod config;
pub mod db;
pub mod domain;
pub mod http;
pub mod messaging;
pub mod metrics;
pub mod processing;
pub mod utils;

#[cfg(test)]
mod testing;
