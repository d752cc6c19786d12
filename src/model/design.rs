//! Model specification and design-matrix construction.
//!
//! Fixed effects are unordered categorical factors, dummy-coded against the
//! first (sorted) level. Random effects are intercepts only: a single
//! grouping factor, or a factor nested inside another, each contributing one
//! variance component.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::data::DataTable;
use crate::error::{PhytostatError, Result};

/// Estimation method. REML for reporting variance components and estimated
/// means; ML whenever nested models are compared by likelihood ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    Reml,
    Ml,
}

/// Random-intercept structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RandomSpec {
    /// One variance component for the grouping factor
    Intercept(String),
    /// Separate variance components for `outer` and for `inner`-within-`outer`
    Nested { outer: String, inner: String },
}

impl RandomSpec {
    pub fn factors(&self) -> Vec<&str> {
        match self {
            RandomSpec::Intercept(f) => vec![f],
            RandomSpec::Nested { outer, inner } => vec![outer, inner],
        }
    }
}

/// Full model specification: response, fixed factors with an optional
/// pairwise interaction, random structure, estimation method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub response: String,
    pub fixed: Vec<String>,
    pub interaction: bool,
    pub random: RandomSpec,
    pub method: Method,
}

impl ModelSpec {
    pub fn new(response: &str, fixed: &[&str], random: RandomSpec) -> Self {
        Self {
            response: response.to_string(),
            fixed: fixed.iter().map(|s| s.to_string()).collect(),
            interaction: false,
            random,
            method: Method::Reml,
        }
    }

    pub fn with_interaction(mut self) -> Self {
        self.interaction = true;
        self
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Fixed-effect term labels in testing order: main effects first, the
    /// interaction (if any) last.
    pub fn term_labels(&self) -> Vec<String> {
        let mut labels = self.fixed.clone();
        if self.interaction {
            labels.push(self.fixed.join(":"));
        }
        labels
    }

    /// Same spec without one fixed term (used by the likelihood-ratio ANOVA).
    /// Dropping a main effect also drops the interaction, per marginality.
    pub fn without_term(&self, term: &str) -> Self {
        let mut reduced = self.clone();
        if term == self.fixed.join(":") {
            reduced.interaction = false;
        } else {
            reduced.fixed.retain(|f| f != term);
            reduced.interaction = false;
        }
        reduced
    }
}

/// One fixed-effect term's column span inside X.
#[derive(Debug, Clone)]
pub struct TermSpan {
    pub label: String,
    pub start: usize,
    pub len: usize,
}

/// One random term: indicator matrix Z and its level labels.
#[derive(Debug, Clone)]
pub struct RandomBlock {
    pub label: String,
    pub z: Array2<f64>,
    pub levels: Vec<String>,
}

/// Assembled design: response y, fixed matrix X with term spans, random
/// indicator blocks, and the observed levels of every fixed factor.
#[derive(Debug, Clone)]
pub struct Design {
    pub y: Array1<f64>,
    pub x: Array2<f64>,
    pub terms: Vec<TermSpan>,
    pub random: Vec<RandomBlock>,
    pub factor_levels: Vec<(String, Vec<String>)>,
}

impl Design {
    pub fn n(&self) -> usize {
        self.y.len()
    }

    pub fn rank(&self) -> usize {
        self.x.ncols()
    }
}

/// Dummy codes for one factor: the sorted levels and, per row, the level index.
fn factor_codes(table: &DataTable, name: &str) -> Result<(Vec<String>, Vec<usize>)> {
    let levels = table.levels(name)?;
    let values = table.categorical(name)?;
    let codes = values
        .iter()
        .map(|v| levels.iter().position(|l| l == v).expect("level from same column"))
        .collect();
    Ok((levels, codes))
}

/// Build the numerical design for a spec against a table.
pub fn build(table: &DataTable, spec: &ModelSpec) -> Result<Design> {
    let n = table.n_rows();
    let y = Array1::from_vec(table.numeric(&spec.response)?.to_vec());

    let mut factors = Vec::new();
    for name in &spec.fixed {
        let (levels, codes) = factor_codes(table, name)?;
        if levels.len() < 2 {
            return Err(PhytostatError::Singular(format!(
                "fixed factor '{}' has a single level",
                name
            )));
        }
        factors.push((name.clone(), levels, codes));
    }

    // Intercept plus dummy columns per term
    let mut width = 1;
    let mut terms = Vec::new();
    for (name, levels, _) in &factors {
        terms.push(TermSpan {
            label: name.clone(),
            start: width,
            len: levels.len() - 1,
        });
        width += levels.len() - 1;
    }
    if spec.interaction {
        if factors.len() != 2 {
            return Err(PhytostatError::Singular(format!(
                "interaction requires exactly two fixed factors, got {}",
                factors.len()
            )));
        }
        let len = (factors[0].1.len() - 1) * (factors[1].1.len() - 1);
        terms.push(TermSpan {
            label: spec.fixed.join(":"),
            start: width,
            len,
        });
        width += len;
    }

    let mut x = Array2::<f64>::zeros((n, width));
    for row in 0..n {
        x[[row, 0]] = 1.0;
    }
    for (term, (_, _levels, codes)) in terms.iter().zip(&factors) {
        for row in 0..n {
            let code = codes[row];
            if code > 0 {
                x[[row, term.start + code - 1]] = 1.0;
            }
        }
    }
    if spec.interaction {
        let term = terms.last().expect("interaction span exists");
        let (_, _a_levels, a_codes) = &factors[0];
        let (_, b_levels, b_codes) = &factors[1];
        let b_width = b_levels.len() - 1;
        for row in 0..n {
            let (a, b) = (a_codes[row], b_codes[row]);
            if a > 0 && b > 0 {
                x[[row, term.start + (a - 1) * b_width + (b - 1)]] = 1.0;
            }
        }
    }

    let random = build_random(table, &spec.random)?;

    let factor_levels = factors
        .into_iter()
        .map(|(name, levels, _)| (name, levels))
        .collect();

    Ok(Design {
        y,
        x,
        terms,
        random,
        factor_levels,
    })
}

fn indicator(levels: &[String], codes: &[usize]) -> Array2<f64> {
    let mut z = Array2::<f64>::zeros((codes.len(), levels.len()));
    for (row, &code) in codes.iter().enumerate() {
        z[[row, code]] = 1.0;
    }
    z
}

fn build_random(table: &DataTable, spec: &RandomSpec) -> Result<Vec<RandomBlock>> {
    match spec {
        RandomSpec::Intercept(factor) => {
            let (levels, codes) = factor_codes(table, factor)?;
            Ok(vec![RandomBlock {
                label: factor.clone(),
                z: indicator(&levels, &codes),
                levels,
            }])
        }
        RandomSpec::Nested { outer, inner } => {
            let (outer_levels, outer_codes) = factor_codes(table, outer)?;
            // Inner levels are only meaningful within an outer level, so the
            // nested grouping is keyed by the (outer, inner) pair.
            let outer_vals = table.categorical(outer)?;
            let inner_vals = table.categorical(inner)?;
            let mut nested_levels: Vec<String> = outer_vals
                .iter()
                .zip(inner_vals.iter())
                .map(|(o, i)| format!("{}:{}", o, i))
                .collect();
            let nested_vals = nested_levels.clone();
            nested_levels.sort();
            nested_levels.dedup();
            let nested_codes: Vec<usize> = nested_vals
                .iter()
                .map(|v| {
                    nested_levels
                        .iter()
                        .position(|l| l == v)
                        .expect("level from same column")
                })
                .collect();
            Ok(vec![
                RandomBlock {
                    label: outer.clone(),
                    z: indicator(&outer_levels, &outer_codes),
                    levels: outer_levels,
                },
                RandomBlock {
                    label: format!("{}:{}", outer, inner),
                    z: indicator(&nested_levels, &nested_codes),
                    levels: nested_levels,
                },
            ])
        }
    }
}
