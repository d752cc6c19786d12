//! Pipeline context and stage contract.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Result;

use crate::anova::SignificanceReport;
use crate::config::AnalysisConfig;
use crate::data::DataTable;
use crate::emmeans::EmmeansTable;
use crate::experiments::ExperimentDef;
use crate::model::FittedModel;
use crate::report::ExperimentReport;
use crate::stratify::StratificationPlan;

/// Context passed between pipeline stages. Each stage fills in the artifacts
/// it produces; nothing is mutated in place by a later stage.
#[derive(Debug, Clone)]
pub struct StageContext {
    /// Experiment being analyzed
    pub experiment: ExperimentDef,

    /// Shared analysis settings
    pub config: AnalysisConfig,

    /// Current observation table (replaced by Load and Reshape)
    pub table: Option<DataTable>,

    /// Per-group descriptive summary
    pub summary: Option<DataTable>,

    /// Fitted mixed model for the full design
    pub model: Option<FittedModel>,

    /// ANOVA over the fixed effects
    pub anova: Option<SignificanceReport>,

    /// Decision taken on the interaction term
    pub plan: Option<StratificationPlan>,

    /// Estimated means, full model or one entry per stratum
    pub means: Vec<(String, EmmeansTable)>,

    /// Rendered figure path
    pub figure: Option<PathBuf>,

    /// Final report
    pub report: Option<ExperimentReport>,

    /// Metadata accumulated during the run
    pub metadata: HashMap<String, serde_json::Value>,

    /// Outcome of every stage validation, in execution order
    pub validation_results: Vec<ValidationResult>,
}

impl StageContext {
    pub fn new(experiment: ExperimentDef, config: AnalysisConfig) -> Self {
        Self {
            experiment,
            config,
            table: None,
            summary: None,
            model: None,
            anova: None,
            plan: None,
            means: Vec::new(),
            figure: None,
            report: None,
            metadata: HashMap::new(),
            validation_results: Vec::new(),
        }
    }
}

/// Validation result from a pipeline stage
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub stage: String,
    pub passed: bool,
    pub message: String,
}

/// Validation strategy for pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStrategy {
    /// Stop on first error
    StopOnError,
    /// Continue on errors but collect them
    ContinueOnError,
    /// Skip validation
    None,
}

/// Trait for pipeline stages
pub trait PipelineStage {
    /// Name of this stage
    fn name(&self) -> &str;

    /// Execute this stage
    fn execute(&self, ctx: StageContext) -> Result<StageContext>;

    /// Validate the output of this stage
    fn validate(&self, _ctx: &StageContext) -> Result<ValidationResult> {
        Ok(ValidationResult {
            stage: self.name().to_string(),
            passed: true,
            message: "No validation configured".to_string(),
        })
    }
}
