//! Pipeline runner.

use anyhow::{Context as AnyhowContext, Result};
use tracing::{debug, info, warn};

use crate::config::AnalysisConfig;
use crate::experiments::ExperimentDef;
use crate::pipeline::stages::{
    AnovaStage, EmmeansStage, FitStage, LoadStage, PlotStage, ReportStage, ReshapeStage,
    StratifyStage, SummarizeStage,
};
use crate::pipeline::types::{PipelineStage, StageContext, ValidationStrategy};

/// The staged analysis pipeline shared by every experiment.
pub struct AnalysisPipeline {
    stages: Vec<Box<dyn PipelineStage>>,
    validation: ValidationStrategy,
}

impl AnalysisPipeline {
    pub fn new(validation: ValidationStrategy) -> Self {
        Self {
            stages: Vec::new(),
            validation,
        }
    }

    /// The full stage sequence for one experiment.
    pub fn standard(validation: ValidationStrategy) -> Self {
        Self::new(validation)
            .add_stage(Box::new(LoadStage))
            .add_stage(Box::new(ReshapeStage))
            .add_stage(Box::new(SummarizeStage))
            .add_stage(Box::new(FitStage))
            .add_stage(Box::new(AnovaStage))
            .add_stage(Box::new(StratifyStage))
            .add_stage(Box::new(EmmeansStage))
            .add_stage(Box::new(PlotStage))
            .add_stage(Box::new(ReportStage))
    }

    /// Add a stage to the pipeline
    pub fn add_stage(mut self, stage: Box<dyn PipelineStage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Run the complete pipeline for one experiment.
    pub fn run(
        &self,
        experiment: ExperimentDef,
        config: AnalysisConfig,
    ) -> Result<StageContext> {
        info!(
            "Starting '{}' pipeline with {} stages",
            experiment.name,
            self.stages.len()
        );

        let mut ctx = StageContext::new(experiment, config);

        for (idx, stage) in self.stages.iter().enumerate() {
            info!(
                "Running stage {}/{}: {}",
                idx + 1,
                self.stages.len(),
                stage.name()
            );

            ctx = stage
                .execute(ctx)
                .with_context(|| format!("Stage '{}' failed", stage.name()))?;

            if self.validation != ValidationStrategy::None {
                debug!("Validating stage: {}", stage.name());
                let validation = stage.validate(&ctx)?;
                if !validation.passed {
                    warn!(
                        "Validation failed for stage '{}': {}",
                        validation.stage, validation.message
                    );
                    if self.validation == ValidationStrategy::StopOnError {
                        anyhow::bail!(
                            "Validation failed for stage '{}': {}",
                            validation.stage,
                            validation.message
                        );
                    }
                }
                ctx.validation_results.push(validation);
            }
        }

        info!("Pipeline for '{}' completed", ctx.experiment.name);
        Ok(ctx)
    }
}
