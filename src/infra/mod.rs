pub mod config_store;
pub mod history_store;
pub mod labeler;
pub mod media_server;
pub mod metadata_db;
pub mod subscriber;
pub mod unconfigured;
