pub mod config;
pub mod document;
pub mod i18n;
pub mod replication;
pub mod retry;
pub mod security;
pub mod server;
pub mod session;
pub mod store;
pub mod views;
