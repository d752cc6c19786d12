//! Estimated marginal means, adjusted pairwise comparisons, and the compact
//! letter display.
//!
//! Means marginalize over the non-selected fixed factors with equal weights.
//! Intervals use the t distribution on residual degrees of freedom; pairwise
//! p-values carry a Šidák multiplicity adjustment.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::config::AnalysisConfig;
use crate::error::{PhytostatError, Result};
use crate::model::FittedModel;

/// One estimated marginal mean.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatedMean {
    /// Level combination of the selected factor(s), joined by " "
    pub group: String,
    pub estimate: f64,
    pub se: f64,
    pub lower: f64,
    pub upper: f64,
    /// Compact letter display; means sharing a letter are indistinguishable
    pub letters: String,
}

/// Estimated means for one (possibly stratified) model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmmeansTable {
    pub response: String,
    pub factors: Vec<String>,
    pub confidence: f64,
    /// Rows sorted by estimate, descending
    pub means: Vec<EstimatedMean>,
}

/// One adjusted pairwise comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairwiseComparison {
    pub left: String,
    pub right: String,
    pub difference: f64,
    pub se: f64,
    pub t_value: f64,
    pub p_adjusted: f64,
}

/// Per-factor level weights: one-hot for selected factors, uniform for the
/// factors being marginalized over.
fn factor_weights(model: &FittedModel, selection: &[(usize, usize)]) -> Vec<Vec<f64>> {
    model
        .factor_levels
        .iter()
        .enumerate()
        .map(|(fi, (_, levels))| {
            if let Some((_, li)) = selection.iter().find(|(f, _)| *f == fi) {
                let mut w = vec![0.0; levels.len()];
                w[*li] = 1.0;
                w
            } else {
                vec![1.0 / levels.len() as f64; levels.len()]
            }
        })
        .collect()
}

/// Contrast row L such that L·β is the marginal mean of the selected levels.
fn contrast_row(model: &FittedModel, weights: &[Vec<f64>]) -> Array1<f64> {
    let mut l = Array1::<f64>::zeros(model.rank);
    l[0] = 1.0;
    for (fi, term) in model
        .terms
        .iter()
        .enumerate()
        .take(model.factor_levels.len())
    {
        let w = &weights[fi];
        for col in 0..term.len {
            l[term.start + col] = w[col + 1];
        }
    }
    if model.spec.interaction {
        let term = model.terms.last().expect("interaction span");
        let wa = &weights[0];
        let wb = &weights[1];
        let b_width = wb.len() - 1;
        for a in 0..wa.len() - 1 {
            for b in 0..b_width {
                l[term.start + a * b_width + b] = wa[a + 1] * wb[b + 1];
            }
        }
    }
    l
}

fn contrast_se(model: &FittedModel, l: &Array1<f64>) -> f64 {
    let vcov = model.beta_vcov();
    l.dot(&vcov.dot(l)).max(0.0).sqrt()
}

fn t_quantile(df: f64, prob: f64) -> Result<f64> {
    let dist = StudentsT::new(0.0, 1.0, df)
        .map_err(|e| PhytostatError::Singular(format!("t distribution: {}", e)))?;
    Ok(dist.inverse_cdf(prob))
}

fn two_sided_p(t: f64, df: f64) -> Result<f64> {
    let dist = StudentsT::new(0.0, 1.0, df)
        .map_err(|e| PhytostatError::Singular(format!("t distribution: {}", e)))?;
    Ok(2.0 * (1.0 - dist.cdf(t.abs())))
}

/// Cartesian product of the selected factors' level indices, with the level
/// labels joined for display.
fn level_grid(model: &FittedModel, factors: &[&str]) -> Result<Vec<(String, Vec<(usize, usize)>)>> {
    let mut selected = Vec::new();
    for name in factors {
        let fi = model
            .factor_levels
            .iter()
            .position(|(f, _)| f == name)
            .ok_or_else(|| PhytostatError::MissingColumn(name.to_string()))?;
        selected.push(fi);
    }

    let mut grid: Vec<(String, Vec<(usize, usize)>)> = vec![(String::new(), Vec::new())];
    for &fi in &selected {
        let levels = &model.factor_levels[fi].1;
        let mut next = Vec::with_capacity(grid.len() * levels.len());
        for (label, sel) in &grid {
            for (li, level) in levels.iter().enumerate() {
                let joined = if label.is_empty() {
                    level.clone()
                } else {
                    format!("{} {}", label, level)
                };
                let mut sel = sel.clone();
                sel.push((fi, li));
                next.push((joined, sel));
            }
        }
        grid = next;
    }
    Ok(grid)
}

/// Estimated marginal means with t-based confidence intervals and compact
/// letters from Šidák-adjusted pairwise comparisons.
pub fn emmeans(
    model: &FittedModel,
    factors: &[&str],
    config: &AnalysisConfig,
) -> Result<EmmeansTable> {
    let grid = level_grid(model, factors)?;
    let df = model.residual_df();
    let t_crit = t_quantile(df, 1.0 - (1.0 - config.confidence) / 2.0)?;

    let rows: Vec<(String, Array1<f64>, f64, f64)> = grid
        .iter()
        .map(|(label, selection)| {
            let l = contrast_row(model, &factor_weights(model, selection));
            let estimate = l.dot(&model.beta);
            let se = contrast_se(model, &l);
            (label.clone(), l, estimate, se)
        })
        .collect();

    let pairs = pairwise_rows(model, &rows, df)?;
    let letters = compact_letters(
        &rows
            .iter()
            .map(|(label, _, est, _)| (label.clone(), *est))
            .collect::<Vec<_>>(),
        &pairs,
        config.alpha,
    );

    let mut means: Vec<EstimatedMean> = rows
        .into_iter()
        .map(|(group, _, estimate, se)| {
            let letter = letters
                .iter()
                .find(|(g, _)| *g == group)
                .map(|(_, l)| l.clone())
                .unwrap_or_default();
            EstimatedMean {
                group,
                estimate,
                se,
                lower: estimate - t_crit * se,
                upper: estimate + t_crit * se,
                letters: letter,
            }
        })
        .collect();
    means.sort_by(|a, b| {
        b.estimate
            .partial_cmp(&a.estimate)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.group.cmp(&b.group))
    });

    Ok(EmmeansTable {
        response: model.spec.response.clone(),
        factors: factors.iter().map(|s| s.to_string()).collect(),
        confidence: config.confidence,
        means,
    })
}

/// All adjusted pairwise comparisons among the marginal means.
pub fn pairwise(model: &FittedModel, factors: &[&str]) -> Result<Vec<PairwiseComparison>> {
    let grid = level_grid(model, factors)?;
    let df = model.residual_df();
    let rows: Vec<(String, Array1<f64>, f64, f64)> = grid
        .iter()
        .map(|(label, selection)| {
            let l = contrast_row(model, &factor_weights(model, selection));
            let estimate = l.dot(&model.beta);
            let se = contrast_se(model, &l);
            (label.clone(), l, estimate, se)
        })
        .collect();
    pairwise_rows(model, &rows, df)
}

fn pairwise_rows(
    model: &FittedModel,
    rows: &[(String, Array1<f64>, f64, f64)],
    df: f64,
) -> Result<Vec<PairwiseComparison>> {
    let m = rows.len() * (rows.len().saturating_sub(1)) / 2;
    let mut comparisons = Vec::with_capacity(m);
    for i in 0..rows.len() {
        for j in (i + 1)..rows.len() {
            let l = &rows[i].1 - &rows[j].1;
            let difference = rows[i].2 - rows[j].2;
            let se = contrast_se(model, &l);
            let t = if se > 0.0 { difference / se } else { 0.0 };
            let p = two_sided_p(t, df)?;
            // Šidák adjustment over all m comparisons
            let p_adjusted = (1.0 - (1.0 - p).powi(m as i32)).clamp(0.0, 1.0);
            comparisons.push(PairwiseComparison {
                left: rows[i].0.clone(),
                right: rows[j].0.clone(),
                difference,
                se,
                t_value: t,
                p_adjusted,
            });
        }
    }
    Ok(comparisons)
}

/// Assign compact letters: two means share a letter iff their adjusted
/// comparison is not significant at `alpha`.
///
/// Means are swept in ascending order (ties broken by label, so the
/// assignment is deterministic); from each anchor a group of mutually
/// non-significant means is grown, and groups contained in an earlier group
/// are dropped. A mean may carry several letters.
pub fn compact_letters(
    means: &[(String, f64)],
    pairs: &[PairwiseComparison],
    alpha: f64,
) -> Vec<(String, String)> {
    let n = means.len();
    let significant = |a: &str, b: &str| -> bool {
        pairs
            .iter()
            .find(|p| {
                (p.left == a && p.right == b) || (p.left == b && p.right == a)
            })
            .map(|p| p.p_adjusted < alpha)
            .unwrap_or(false)
    };

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        means[a]
            .1
            .partial_cmp(&means[b].1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| means[a].0.cmp(&means[b].0))
    });

    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (pos, &anchor) in order.iter().enumerate() {
        let mut group = vec![anchor];
        for &candidate in &order[pos + 1..] {
            let compatible = group
                .iter()
                .all(|&member| !significant(&means[member].0, &means[candidate].0));
            if compatible {
                group.push(candidate);
            }
        }
        let redundant = groups
            .iter()
            .any(|g| group.iter().all(|i| g.contains(i)));
        if !redundant {
            groups.push(group);
        }
    }

    let letter = |idx: usize| -> String {
        // A..Z, then AA, AB, ...
        let mut s = String::new();
        let mut i = idx;
        loop {
            s.insert(0, (b'A' + (i % 26) as u8) as char);
            if i < 26 {
                break;
            }
            i = i / 26 - 1;
        }
        s
    };

    means
        .iter()
        .enumerate()
        .map(|(i, (label, _))| {
            let mut assigned: Vec<String> = groups
                .iter()
                .enumerate()
                .filter(|(_, g)| g.contains(&i))
                .map(|(gi, _)| letter(gi))
                .collect();
            assigned.sort();
            (label.clone(), assigned.join(""))
        })
        .collect()
}
