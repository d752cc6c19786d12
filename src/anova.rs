//! Likelihood-ratio ANOVA over the fixed effects of a mixed model.
//!
//! Each term is tested by refitting nested models with maximum likelihood
//! (REML deviances of models with different fixed effects are not comparable)
//! and referring the deviance change to a chi-square distribution. Marginality
//! is respected: the interaction is tested against the full model, main
//! effects within the model that excludes the interaction.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};
use tracing::info;

use crate::data::DataTable;
use crate::error::Result;
use crate::model::{fit_with_options, FitOptions, Method, ModelSpec};

/// Test result for one fixed-effect term.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermTest {
    pub term: String,
    pub chi_square: f64,
    pub df: usize,
    pub p_value: f64,
}

/// One row per fixed-effect term, interaction last.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignificanceReport {
    pub response: String,
    pub terms: Vec<TermTest>,
}

impl SignificanceReport {
    pub fn term(&self, label: &str) -> Option<&TermTest> {
        self.terms.iter().find(|t| t.term == label)
    }

    pub fn significant(&self, label: &str, alpha: f64) -> bool {
        self.term(label).map(|t| t.p_value < alpha).unwrap_or(false)
    }

    /// Label of the interaction term, if the report contains one.
    pub fn interaction_term(&self) -> Option<&str> {
        self.terms
            .iter()
            .map(|t| t.term.as_str())
            .find(|t| t.contains(':'))
    }
}

fn chi_square_p(stat: f64, df: usize) -> f64 {
    if df == 0 {
        return 1.0;
    }
    // deviance differences can dip just below zero numerically
    let stat = stat.max(0.0);
    let dist = ChiSquared::new(df as f64).expect("positive df");
    1.0 - dist.cdf(stat)
}

/// Compute the ANOVA table for `spec` against `table`.
pub fn anova(
    table: &DataTable,
    spec: &ModelSpec,
    options: &FitOptions,
) -> Result<SignificanceReport> {
    let ml_spec = spec.clone().with_method(Method::Ml);
    let full = fit_with_options(table, &ml_spec, options)?;

    let mut tests = Vec::new();

    let interaction_label = if spec.interaction {
        Some(spec.fixed.join(":"))
    } else {
        None
    };

    // Main effects are tested within the additive model
    let additive_spec = if spec.interaction {
        let mut s = ml_spec.clone();
        s.interaction = false;
        s
    } else {
        ml_spec.clone()
    };
    let additive = if spec.interaction {
        fit_with_options(table, &additive_spec, options)?
    } else {
        full.clone()
    };

    for factor in &spec.fixed {
        let reduced_spec = additive_spec.without_term(factor);
        let reduced = fit_with_options(table, &reduced_spec, options)?;
        let stat = reduced.deviance - additive.deviance;
        let df = additive.rank - reduced.rank;
        tests.push(TermTest {
            term: factor.clone(),
            chi_square: stat.max(0.0),
            df,
            p_value: chi_square_p(stat, df),
        });
    }

    if let Some(label) = interaction_label {
        let stat = additive.deviance - full.deviance;
        let df = full.rank - additive.rank;
        tests.push(TermTest {
            term: label,
            chi_square: stat.max(0.0),
            df,
            p_value: chi_square_p(stat, df),
        });
    }

    for t in &tests {
        info!(
            "{}: chi2({}) = {:.3}, p = {:.4}",
            t.term, t.df, t.chi_square, t.p_value
        );
    }

    Ok(SignificanceReport {
        response: spec.response.clone(),
        terms: tests,
    })
}
