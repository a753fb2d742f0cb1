// src/lib.rs
pub mod matching;
pub mod models;
pub mod pipeline;
pub mod scoring;
pub mod storage;
pub mod utils;

pub use pipeline::run_pipeline;
