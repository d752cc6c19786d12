//! The five experiment definitions.
//!
//! Each definition is pure data: where the CSV lives, what its columns mean,
//! which rows to keep, how to reshape, which response to derive, and the
//! model to fit. The pipeline interprets the definition; nothing here touches
//! the filesystem.

pub mod derive;

mod defs;

use serde::{Deserialize, Serialize};

use crate::data::{ColumnSchema, Predicate};
use crate::error::{PhytostatError, Result};
use crate::model::ModelSpec;
use crate::viz::PlotKind;

pub use derive::DerivedStep;

/// Wide-to-long pivot instructions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReshapeSpec {
    pub value_cols: Vec<String>,
    pub name_col: String,
    pub value_col: String,
}

/// Composite grouping key built from two categorical columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeSpec {
    pub left: String,
    pub right: String,
    pub out: String,
}

/// A complete, self-contained analysis recipe for one experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentDef {
    pub name: String,
    pub description: String,
    pub data_file: String,
    pub schema: Vec<ColumnSchema>,
    pub filters: Vec<Predicate>,
    pub drop: Vec<String>,
    pub reshape: Option<ReshapeSpec>,
    pub composite: Option<CompositeSpec>,
    pub derived: Vec<DerivedStep>,
    pub model: ModelSpec,
    /// Extra numeric columns summarized per group alongside the modeled
    /// response (descriptive only, never modeled).
    pub summary_responses: Vec<String>,
    /// Factors the post-hoc means marginalize over.
    pub emmeans_factors: Vec<String>,
    /// Stratify by this factor when its interaction is significant.
    pub conditioning_factor: Option<String>,
    pub plot_kind: PlotKind,
    pub y_label: String,
}

/// Every experiment, in report order.
pub fn all() -> Vec<ExperimentDef> {
    vec![
        defs::perithecia(),
        defs::growth(),
        defs::sporulation(),
        defs::severity(),
        defs::fungicide(),
    ]
}

pub fn by_name(name: &str) -> Result<ExperimentDef> {
    all()
        .into_iter()
        .find(|e| e.name == name)
        .ok_or_else(|| PhytostatError::UnknownExperiment(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_five_experiments_with_unique_names() {
        let defs = all();
        assert_eq!(defs.len(), 5);
        let mut names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 5);
    }

    #[test]
    fn by_name_rejects_unknown() {
        assert!(by_name("phototropism").is_err());
        assert_eq!(by_name("growth").unwrap().name, "growth");
    }

    #[test]
    fn every_response_is_produced_or_loaded() {
        // the modeled response must either be in the schema or be the output
        // of a derivation step
        for def in all() {
            let from_schema = def.schema.iter().any(|c| c.name == def.model.response);
            let from_derived = def.derived.iter().any(|step| match step {
                DerivedStep::WeightedIndex { out, .. } => *out == def.model.response,
                DerivedStep::Audpc { out, .. } => *out == def.model.response,
                DerivedStep::Log1p { out, .. } => *out == def.model.response,
            });
            assert!(
                from_schema || from_derived,
                "{}: response '{}' has no source",
                def.name,
                def.model.response
            );
        }
    }

    #[test]
    fn emmeans_factors_are_fixed_effects() {
        for def in all() {
            for factor in &def.emmeans_factors {
                assert!(
                    def.model.fixed.contains(factor),
                    "{}: '{}' is not a fixed effect",
                    def.name,
                    factor
                );
            }
        }
    }

    #[test]
    fn conditioning_factor_requires_an_interaction() {
        for def in all() {
            if def.conditioning_factor.is_some() {
                assert!(def.model.interaction, "{}: no interaction to test", def.name);
            }
        }
    }
}
