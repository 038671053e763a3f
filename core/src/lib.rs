pub mod config;
pub mod db;
pub mod extract;
pub mod files;
pub mod indexer;
pub mod server;
pub mod thumbs;
pub mod users;
pub mod walker;
pub mod watcher;
