pub mod config;
pub mod errors;
pub mod health;
pub mod logging;
pub mod orchestrator;
pub mod phase;
pub mod recovery;
pub mod state;
pub mod ui;
