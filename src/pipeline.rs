pub mod aggregate;
pub mod report;
pub mod stages;

pub use aggregate::{AggregationOutcome, Aggregator, PredictionFailure};
pub use report::{RenderError, render};
pub use stages::{
    GenerateAndUploadStage, ProcessAndSendStage, ProcessSummary, ReportSummary, StageError,
    StageLocations,
};
