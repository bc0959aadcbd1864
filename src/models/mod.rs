// Models module

pub mod report;
pub mod request;

pub use report::{AnalysisMetadata, AnalysisResult, Disclaimer, DiseaseCode, ReportDraft};
pub use request::{CaseInfo, ExportRequest};
