//! Utility modules: logging and configuration files

pub mod config;
pub mod logger;
