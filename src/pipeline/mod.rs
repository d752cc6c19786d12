//! Staged analysis pipeline with stop-on-error validation.
//!
//! Each experiment runs the same sequence, every stage consuming the context
//! produced by the previous one:
//! 1. Load - reads and filters the experiment's CSV
//! 2. Reshape - wide-to-long pivot, composite keys, derived responses
//! 3. Summarize - per-group descriptive statistics
//! 4. Fit - linear mixed model (REML)
//! 5. Anova - likelihood-ratio tests of the fixed terms
//! 6. Stratify - explicit branch on a significant interaction
//! 7. Emmeans - estimated marginal means with compact letters
//! 8. Plot - composite figure from the derived means table
//! 9. Report - printed statistical tables

mod execution;
mod stages;
mod types;

pub use execution::AnalysisPipeline;
pub use stages::{
    AnovaStage, EmmeansStage, FitStage, LoadStage, PlotStage, ReportStage, ReshapeStage,
    StratifyStage, SummarizeStage,
};
pub use types::{PipelineStage, StageContext, ValidationResult, ValidationStrategy};
