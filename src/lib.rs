pub mod acquire;
pub mod analysis;
pub mod catalog;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod transcribe;
pub mod trim;
