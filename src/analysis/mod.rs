// Analysis module - prompt chaining, response repair, shape normalization

pub mod normalize;
pub mod pipeline;
pub mod repair;

pub use pipeline::{analyze_report, AnalysisError, PipelineSettings, UploadedReport};
