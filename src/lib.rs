pub mod backend;
pub mod characteristics;
pub mod config;
pub mod engine;
pub mod error;
pub mod platform;
