pub mod alerts;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod model;
pub mod monitor;
pub mod parser;
pub mod phrases;
pub mod source;
pub mod state;
pub mod watcher;
pub mod weather;

#[cfg(test)]
mod testing;
