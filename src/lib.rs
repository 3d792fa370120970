pub mod analysis;
pub mod batch;
pub mod cli;
pub mod config;
pub mod pipeline;
pub mod source;
