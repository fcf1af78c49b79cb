pub mod api;
pub mod config;
pub mod disaggregation;
pub mod domain;
pub mod ml;
pub mod pipeline;
pub mod scoring;
pub mod telemetry;
