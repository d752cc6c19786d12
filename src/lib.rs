//! Statistical analysis pipelines for a plant-pathology isolate study.
//!
//! Five replicated experiments (perithecia production, mycelial growth,
//! sporulation, head blight severity, fungicide sensitivity) share one
//! staged pipeline: load and filter a CSV, reshape it, fit a linear mixed
//! model by REML, test the fixed effects with likelihood-ratio chi-squares,
//! compute estimated marginal means with compact letter displays, and render
//! a multi-panel figure plus a printed report. A significant interaction
//! triggers stratified refits instead of reporting confounded main effects.

pub mod anova;
pub mod config;
pub mod data;
pub mod emmeans;
pub mod error;
pub mod experiments;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod stratify;
pub mod summary;
pub mod viz;

pub use config::AnalysisConfig;
pub use error::{PhytostatError, Result};
pub use pipeline::{AnalysisPipeline, StageContext, ValidationStrategy};
