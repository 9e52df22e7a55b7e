pub mod config;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod oauth;
pub mod server;
pub mod sources;
pub mod state;
pub mod storage;
