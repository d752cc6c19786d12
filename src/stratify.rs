//! Stratification policy for significant interactions.
//!
//! A significant interaction is a data condition, not an error: main-effect
//! p-values for the involved factors are no longer directly interpretable, so
//! the analysis refits simpler models per level of the conditioning factor.
//! One decision function replaces the per-dataset ad hoc blocks.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::anova::SignificanceReport;
use crate::data::DataTable;
use crate::error::Result;
use crate::model::ModelSpec;

/// What to do after reading the significance report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StratificationPlan {
    /// Main effects are interpretable as reported
    None,
    /// Condition on this factor and refit per level
    ByFactor(String),
}

/// Decide whether stratification is required: if the report's interaction
/// term is significant at `alpha`, condition on `conditioning_factor`.
pub fn stratification_plan(
    report: &SignificanceReport,
    conditioning_factor: &str,
    alpha: f64,
) -> StratificationPlan {
    match report.interaction_term() {
        Some(term) if report.significant(term, alpha) => {
            info!(
                "Interaction '{}' significant; stratifying by '{}'",
                term, conditioning_factor
            );
            StratificationPlan::ByFactor(conditioning_factor.to_string())
        }
        _ => StratificationPlan::None,
    }
}

/// Split a table into one subset per level of `factor`. The subsets are
/// disjoint and exhaustive: every input row lands in exactly one stratum.
pub fn partition(table: &DataTable, factor: &str) -> Result<Vec<(String, DataTable)>> {
    let levels = table.levels(factor)?;
    let values = table.categorical(factor)?;
    let mut strata = Vec::with_capacity(levels.len());
    for level in levels {
        let rows: Vec<usize> = values
            .iter()
            .enumerate()
            .filter(|(_, v)| **v == level)
            .map(|(i, _)| i)
            .collect();
        strata.push((level, table.select_rows(&rows)));
    }
    Ok(strata)
}

/// The simpler per-stratum model: the conditioning factor and the interaction
/// are dropped, everything else (including the random structure) is kept.
pub fn stratum_spec(spec: &ModelSpec, conditioning_factor: &str) -> ModelSpec {
    let mut reduced = spec.clone();
    reduced.fixed.retain(|f| f != conditioning_factor);
    reduced.interaction = false;
    reduced
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anova::{SignificanceReport, TermTest};
    use crate::data::Column;
    use crate::model::RandomSpec;

    fn report(interaction_p: f64) -> SignificanceReport {
        SignificanceReport {
            response: "mgr".to_string(),
            terms: vec![
                TermTest {
                    term: "temperature".to_string(),
                    chi_square: 12.0,
                    df: 2,
                    p_value: 0.002,
                },
                TermTest {
                    term: "population".to_string(),
                    chi_square: 5.0,
                    df: 2,
                    p_value: 0.08,
                },
                TermTest {
                    term: "temperature:population".to_string(),
                    chi_square: 9.0,
                    df: 4,
                    p_value: interaction_p,
                },
            ],
        }
    }

    #[test]
    fn test_plan_stratifies_on_significant_interaction() {
        let plan = stratification_plan(&report(0.01), "temperature", 0.05);
        assert_eq!(plan, StratificationPlan::ByFactor("temperature".to_string()));
    }

    #[test]
    fn test_plan_keeps_full_model_otherwise() {
        assert_eq!(
            stratification_plan(&report(0.3), "temperature", 0.05),
            StratificationPlan::None
        );
    }

    #[test]
    fn test_partition_is_disjoint_and_exhaustive() {
        let table = DataTable::from_columns(vec![
            (
                "temperature".to_string(),
                Column::Categorical(vec![
                    "15".into(),
                    "25".into(),
                    "15".into(),
                    "30".into(),
                    "25".into(),
                ]),
            ),
            (
                "mgr".to_string(),
                Column::Numeric(vec![1.0, 2.0, 3.0, 4.0, 5.0]),
            ),
        ])
        .unwrap();

        let strata = partition(&table, "temperature").unwrap();
        assert_eq!(strata.len(), 3);
        let total: usize = strata.iter().map(|(_, t)| t.n_rows()).sum();
        assert_eq!(total, table.n_rows());
        for (level, stratum) in &strata {
            for value in stratum.categorical("temperature").unwrap() {
                assert_eq!(value, level);
            }
        }
    }

    #[test]
    fn test_stratum_spec_drops_factor_and_interaction() {
        let spec = ModelSpec::new(
            "mgr",
            &["temperature", "population"],
            RandomSpec::Intercept("isolate".to_string()),
        )
        .with_interaction();

        let reduced = stratum_spec(&spec, "temperature");
        assert_eq!(reduced.fixed, vec!["population".to_string()]);
        assert!(!reduced.interaction);
        assert_eq!(reduced.random, spec.random);
    }
}
