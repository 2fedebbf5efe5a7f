pub mod agent;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod orchestrator;
pub mod prompts;
pub mod session;
pub mod shell;
pub mod store;

#[cfg(test)]
mod testing;
