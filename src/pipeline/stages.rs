//! The nine stage implementations.

use anyhow::{Context as AnyhowContext, Result};
use tracing::{info, warn};

use crate::anova;
use crate::data::{load_csv, pivot_longer, Column};
use crate::emmeans;
use crate::experiments::derive;
use crate::model::{fit, FitOptions};
use crate::pipeline::types::{PipelineStage, StageContext, ValidationResult};
use crate::report::ExperimentReport;
use crate::stratify::{self, StratificationPlan};
use crate::summary::group_summary;
use crate::viz::{render, PlotSpec};

fn table_of(ctx: &StageContext) -> Result<&crate::data::DataTable> {
    ctx.table
        .as_ref()
        .context("no table in context; did the Load stage run?")
}

/// Load stage - reads the CSV, validates the schema, applies row filters and
/// column drops.
pub struct LoadStage;

impl PipelineStage for LoadStage {
    fn name(&self) -> &str {
        "Load"
    }

    fn execute(&self, mut ctx: StageContext) -> Result<StageContext> {
        let path = ctx.config.data_dir.join(&ctx.experiment.data_file);
        let table = load_csv(&path, &ctx.experiment.schema)
            .with_context(|| format!("loading {}", path.display()))?;

        let filtered = if ctx.experiment.filters.is_empty() {
            table
        } else {
            table.filter(&ctx.experiment.filters)?
        };
        let trimmed = if ctx.experiment.drop.is_empty() {
            filtered
        } else {
            let names: Vec<&str> = ctx.experiment.drop.iter().map(|s| s.as_str()).collect();
            filtered.drop_columns(&names)?
        };

        ctx.metadata.insert(
            "rows_loaded".to_string(),
            serde_json::json!(trimmed.n_rows()),
        );
        ctx.table = Some(trimmed);
        Ok(ctx)
    }

    fn validate(&self, ctx: &StageContext) -> Result<ValidationResult> {
        let passed = ctx.table.as_ref().map(|t| t.n_rows() > 0).unwrap_or(false);
        Ok(ValidationResult {
            stage: self.name().to_string(),
            passed,
            message: if passed {
                "Table loaded".to_string()
            } else {
                "Loaded table is empty".to_string()
            },
        })
    }
}

/// Reshape stage - wide-to-long pivot, composite grouping key, derived
/// response columns.
pub struct ReshapeStage;

impl PipelineStage for ReshapeStage {
    fn name(&self) -> &str {
        "Reshape"
    }

    fn execute(&self, mut ctx: StageContext) -> Result<StageContext> {
        let mut table = table_of(&ctx)?.clone();

        if let Some(spec) = &ctx.experiment.reshape {
            let value_cols: Vec<&str> = spec.value_cols.iter().map(|s| s.as_str()).collect();
            table = pivot_longer(&table, &value_cols, &spec.name_col, &spec.value_col)?;
        }

        if let Some(composite) = &ctx.experiment.composite {
            table = crate::data::derive_composite(
                &table,
                &composite.left,
                &composite.right,
                &composite.out,
                &ctx.config.separator,
            )?;
        }

        for step in &ctx.experiment.derived {
            table = derive::apply(&table, step)?;
        }

        ctx.metadata.insert(
            "rows_after_reshape".to_string(),
            serde_json::json!(table.n_rows()),
        );
        ctx.table = Some(table);
        Ok(ctx)
    }

    fn validate(&self, ctx: &StageContext) -> Result<ValidationResult> {
        // the modeled response must exist after reshaping
        let response = &ctx.experiment.model.response;
        let passed = ctx
            .table
            .as_ref()
            .map(|t| t.numeric(response).is_ok())
            .unwrap_or(false);
        Ok(ValidationResult {
            stage: self.name().to_string(),
            passed,
            message: if passed {
                format!("Response '{}' present", response)
            } else {
                format!("Response '{}' missing after reshape", response)
            },
        })
    }
}

/// Summarize stage - descriptive per-group statistics for the figure caption
/// and sanity checks.
pub struct SummarizeStage;

impl PipelineStage for SummarizeStage {
    fn name(&self) -> &str {
        "Summarize"
    }

    fn execute(&self, mut ctx: StageContext) -> Result<StageContext> {
        let table = table_of(&ctx)?;
        let groups: Vec<&str> = ctx
            .experiment
            .model
            .fixed
            .iter()
            .map(|s| s.as_str())
            .collect();
        let mut summary = group_summary(table, &groups, &ctx.experiment.model.response)?;
        // descriptive-only responses ride along; group order is identical
        // because group_summary sorts its keys
        for extra in &ctx.experiment.summary_responses {
            let more = group_summary(table, &groups, extra)?;
            for stat in ["mean", "sd", "se"] {
                let col = more.numeric(stat)?.to_vec();
                summary = summary
                    .with_column(&format!("{}_{}", extra, stat), Column::Numeric(col))?;
            }
        }
        info!(
            "{} groups summarized for '{}'",
            summary.n_rows(),
            ctx.experiment.name
        );
        ctx.summary = Some(summary);
        Ok(ctx)
    }
}

/// Fit stage - the full mixed model, REML.
pub struct FitStage;

impl PipelineStage for FitStage {
    fn name(&self) -> &str {
        "Fit"
    }

    fn execute(&self, mut ctx: StageContext) -> Result<StageContext> {
        let table = table_of(&ctx)?;
        let model = fit(table, &ctx.experiment.model)?;
        for component in &model.components {
            info!(
                "variance component {}: {:.4}",
                component.label, component.variance
            );
        }
        ctx.model = Some(model);
        Ok(ctx)
    }

    fn validate(&self, ctx: &StageContext) -> Result<ValidationResult> {
        let passed = ctx
            .model
            .as_ref()
            .map(|m| m.sigma2.is_finite() && m.sigma2 > 0.0)
            .unwrap_or(false);
        Ok(ValidationResult {
            stage: self.name().to_string(),
            passed,
            message: if passed {
                "Model fitted".to_string()
            } else {
                "Degenerate fit".to_string()
            },
        })
    }
}

/// Anova stage - likelihood-ratio tests of every fixed term.
pub struct AnovaStage;

impl PipelineStage for AnovaStage {
    fn name(&self) -> &str {
        "Anova"
    }

    fn execute(&self, mut ctx: StageContext) -> Result<StageContext> {
        let table = table_of(&ctx)?;
        let report = anova::anova(table, &ctx.experiment.model, &FitOptions::default())?;
        ctx.anova = Some(report);
        Ok(ctx)
    }
}

/// Stratify stage - the explicit branch on a significant interaction.
pub struct StratifyStage;

impl PipelineStage for StratifyStage {
    fn name(&self) -> &str {
        "Stratify"
    }

    fn execute(&self, mut ctx: StageContext) -> Result<StageContext> {
        let report = ctx.anova.as_ref().context("no ANOVA report in context")?;
        let plan = match &ctx.experiment.conditioning_factor {
            Some(factor) => stratify::stratification_plan(report, factor, ctx.config.alpha),
            None => StratificationPlan::None,
        };
        if plan == StratificationPlan::None && report.interaction_term().is_some() {
            info!("Interaction not significant; main effects reported from the full model");
        }
        ctx.plan = Some(plan);
        Ok(ctx)
    }
}

/// Emmeans stage - estimated marginal means with compact letters, either for
/// the full model or per stratum.
pub struct EmmeansStage;

impl PipelineStage for EmmeansStage {
    fn name(&self) -> &str {
        "Emmeans"
    }

    fn execute(&self, mut ctx: StageContext) -> Result<StageContext> {
        let factors: Vec<&str> = ctx
            .experiment
            .emmeans_factors
            .iter()
            .map(|s| s.as_str())
            .collect();

        match ctx.plan.clone().context("no stratification plan")? {
            StratificationPlan::None => {
                let model = ctx.model.as_ref().context("no fitted model")?;
                let table = emmeans::emmeans(model, &factors, &ctx.config)?;
                ctx.means = vec![("full model".to_string(), table)];
            }
            StratificationPlan::ByFactor(factor) => {
                let table = table_of(&ctx)?.clone();
                let strata = stratify::partition(&table, &factor)?;
                let spec = stratify::stratum_spec(&ctx.experiment.model, &factor);
                let mut means = Vec::with_capacity(strata.len());
                for (level, subset) in strata {
                    let model = fit(&subset, &spec)?;
                    let table = emmeans::emmeans(&model, &factors, &ctx.config)?;
                    means.push((format!("{} = {}", factor, level), table));
                }
                ctx.means = means;
            }
        }
        Ok(ctx)
    }

    fn validate(&self, ctx: &StageContext) -> Result<ValidationResult> {
        let all_labeled = ctx
            .means
            .iter()
            .flat_map(|(_, t)| t.means.iter())
            .all(|m| !m.letters.is_empty());
        let passed = !ctx.means.is_empty() && all_labeled;
        Ok(ValidationResult {
            stage: self.name().to_string(),
            passed,
            message: if passed {
                "Every mean carries a letter".to_string()
            } else {
                "Unlabeled means".to_string()
            },
        })
    }
}

/// Plot stage - renders the composite figure from the derived means table,
/// never from the raw observations.
pub struct PlotStage;

impl PlotStage {
    /// Flatten the per-stratum means into one plot table; the stratum label
    /// becomes the facet.
    fn plot_table(ctx: &StageContext) -> Result<crate::data::DataTable> {
        let mut group = Vec::new();
        let mut stratum = Vec::new();
        let mut estimate = Vec::new();
        let mut lower = Vec::new();
        let mut upper = Vec::new();
        let mut letters = Vec::new();
        for (label, table) in &ctx.means {
            for mean in &table.means {
                group.push(mean.group.clone());
                stratum.push(label.clone());
                estimate.push(mean.estimate);
                lower.push(mean.lower);
                upper.push(mean.upper);
                letters.push(mean.letters.clone());
            }
        }
        crate::data::DataTable::from_columns(vec![
            ("group".to_string(), Column::Categorical(group)),
            ("stratum".to_string(), Column::Categorical(stratum)),
            ("estimate".to_string(), Column::Numeric(estimate)),
            ("lower".to_string(), Column::Numeric(lower)),
            ("upper".to_string(), Column::Numeric(upper)),
            ("letters".to_string(), Column::Categorical(letters)),
        ])
        .map_err(Into::into)
    }
}

impl PipelineStage for PlotStage {
    fn name(&self) -> &str {
        "Plot"
    }

    fn execute(&self, mut ctx: StageContext) -> Result<StageContext> {
        let table = Self::plot_table(&ctx)?;
        let mut spec = PlotSpec {
            kind: ctx.experiment.plot_kind,
            title: ctx.experiment.description.clone(),
            x: "group".to_string(),
            y: "estimate".to_string(),
            error: Some(("lower".to_string(), "upper".to_string())),
            letters: Some("letters".to_string()),
            color: Some("group".to_string()),
            facet: None,
            y_label: ctx.experiment.y_label.clone(),
        };
        if ctx.means.len() > 1 {
            spec.facet = Some("stratum".to_string());
        }

        std::fs::create_dir_all(&ctx.config.figure_dir)?;
        let path = ctx
            .config
            .figure_dir
            .join(format!("{}.png", ctx.experiment.name));
        match render(&table, &spec, &path, &ctx.config) {
            Ok(()) => ctx.figure = Some(path),
            // a missing font stack should not sink the statistics; the
            // validation below reports the gap under the active strategy
            Err(e) => warn!("figure rendering failed: {}", e),
        }
        Ok(ctx)
    }

    fn validate(&self, ctx: &StageContext) -> Result<ValidationResult> {
        if ctx.figure.is_some() {
            Ok(ValidationResult {
                stage: self.name().to_string(),
                passed: true,
                message: "Figure rendered".to_string(),
            })
        } else {
            Ok(ValidationResult {
                stage: self.name().to_string(),
                passed: false,
                message: "Figure was not rendered".to_string(),
            })
        }
    }
}

/// Report stage - assembles the statistical tables for rendering.
pub struct ReportStage;

impl PipelineStage for ReportStage {
    fn name(&self) -> &str {
        "Report"
    }

    fn execute(&self, mut ctx: StageContext) -> Result<StageContext> {
        let report = ExperimentReport {
            experiment: ctx.experiment.name.clone(),
            response: ctx.experiment.model.response.clone(),
            summary: ctx.summary.clone(),
            anova: ctx.anova.clone().context("no ANOVA report")?,
            plan: ctx.plan.clone().context("no stratification plan")?,
            means: ctx.means.clone(),
            figure: ctx
                .figure
                .as_ref()
                .map(|p| p.display().to_string()),
            timestamp: chrono::Utc::now(),
        };
        ctx.report = Some(report);
        Ok(ctx)
    }

    fn validate(&self, ctx: &StageContext) -> Result<ValidationResult> {
        let passed = ctx.report.is_some();
        Ok(ValidationResult {
            stage: self.name().to_string(),
            passed,
            message: if passed {
                "Report assembled".to_string()
            } else {
                "No report".to_string()
            },
        })
    }
}
