//! Data types shared across the pipeline.

pub mod candidate;
pub mod config;
pub mod document;
pub mod record;
pub mod review;
pub mod run;
pub mod section;
