pub mod auth;
pub mod cli;
pub mod compiler;
pub mod config;
pub mod error;
pub mod handlers;
pub mod model;
pub mod pipeline;
pub mod realtime;
pub mod registry;
pub mod server;
pub mod storage;
