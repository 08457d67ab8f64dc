pub mod commands;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod parsers;
