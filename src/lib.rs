pub mod classifier;
pub mod config;
pub mod constants;
pub mod debounce;
pub mod dispatcher;
pub mod error;
pub mod labelmatch;
pub mod logging;
pub mod matcher;
pub mod rules;
pub mod types;

// Layered boundaries: collaborator ports and their adapters
pub mod app;
pub mod infra;
