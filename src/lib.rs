pub mod config;
pub mod error;
pub mod fingerprint;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod scrapers;
pub mod session;
pub mod storage;
