//! Profiled (RE)ML estimation of the linear mixed model.
//!
//! The model is y = Xβ + Σ Z_k b_k + ε with independent random intercepts
//! b_k ~ N(0, σ²θ_k I) and ε ~ N(0, σ² I). β and σ² are profiled out, so the
//! optimizer only searches the variance ratios θ (one or two of them here) on
//! the log scale with a Nelder–Mead simplex. An optimizer that fails to
//! settle is reported as `NonConvergence`, never returned as a fit.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::DataTable;
use crate::error::{PhytostatError, Result};
use crate::model::design::{self, Design, Method, ModelSpec, TermSpan};
use crate::model::linalg::Cholesky;

/// Optimizer controls. The defaults are adequate for every design in this
/// study; tests shrink `max_iter` to exercise the non-convergence path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FitOptions {
    pub max_iter: usize,
    pub tolerance: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iter: 500,
            tolerance: 1e-9,
        }
    }
}

/// One estimated variance component, on the response scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarianceComponent {
    pub label: String,
    pub variance: f64,
}

/// A fitted linear mixed model.
#[derive(Debug, Clone)]
pub struct FittedModel {
    pub spec: ModelSpec,
    /// Fixed-effect estimates, intercept first
    pub beta: Array1<f64>,
    /// (XᵀV⁻¹X)⁻¹ at the optimum; multiply by sigma2 for the β covariance
    pub vcov_unscaled: Array2<f64>,
    /// Residual variance estimate
    pub sigma2: f64,
    /// Random-effect variance components (label, variance)
    pub components: Vec<VarianceComponent>,
    /// -2 log-likelihood at the optimum (profiled)
    pub deviance: f64,
    pub n: usize,
    pub rank: usize,
    pub terms: Vec<TermSpan>,
    pub factor_levels: Vec<(String, Vec<String>)>,
}

impl FittedModel {
    pub fn log_likelihood(&self) -> f64 {
        -0.5 * self.deviance
    }

    pub fn residual_df(&self) -> f64 {
        (self.n - self.rank) as f64
    }

    /// Scaled covariance of the fixed effects.
    pub fn beta_vcov(&self) -> Array2<f64> {
        &self.vcov_unscaled * self.sigma2
    }
}

struct ProfiledFit {
    deviance: f64,
    beta: Array1<f64>,
    sigma2: f64,
    vcov_unscaled: Array2<f64>,
}

/// GLS solve and profiled deviance for a fixed θ.
fn profile(design: &Design, theta: &[f64], method: Method) -> Result<ProfiledFit> {
    let n = design.n();
    let p = design.rank();

    let mut v = Array2::<f64>::eye(n);
    for (block, &t) in design.random.iter().zip(theta) {
        v = v + &(block.z.dot(&block.z.t()) * t);
    }
    let chol_v = Cholesky::new(&v)?;

    let vinv_x = chol_v.solve_matrix(&design.x);
    let vinv_y = chol_v.solve(&design.y);
    let xt_vinv_x = design.x.t().dot(&vinv_x);
    let xt_vinv_y = design.x.t().dot(&vinv_y);

    let chol_xtx = Cholesky::new(&xt_vinv_x)
        .map_err(|_| PhytostatError::Singular("XᵀV⁻¹X is not invertible".to_string()))?;
    let beta = chol_xtx.solve(&xt_vinv_y);

    let residuals = &design.y - &design.x.dot(&beta);
    let quad = residuals.dot(&chol_v.solve(&residuals));

    let (df, extra) = match method {
        Method::Ml => (n as f64, 0.0),
        Method::Reml => ((n - p) as f64, chol_xtx.log_det()),
    };
    if quad <= 0.0 || !quad.is_finite() {
        return Err(PhytostatError::Singular(format!(
            "degenerate residual quadratic form {:.3e}",
            quad
        )));
    }
    let sigma2 = quad / df;
    let deviance =
        df * ((2.0 * std::f64::consts::PI * sigma2).ln() + 1.0) + chol_v.log_det() + extra;

    Ok(ProfiledFit {
        deviance,
        beta,
        sigma2,
        vcov_unscaled: chol_xtx.inverse(),
    })
}

/// Nelder–Mead on the log-θ scale. Returns the best point found, or
/// `NonConvergence` if the simplex never settles within `max_iter`.
fn minimize_deviance(
    design: &Design,
    method: Method,
    options: &FitOptions,
) -> Result<Vec<f64>> {
    let k = design.random.len();
    let objective = |log_theta: &[f64]| -> f64 {
        let theta: Vec<f64> = log_theta.iter().map(|t| t.exp()).collect();
        match profile(design, &theta, method) {
            Ok(fit) => fit.deviance,
            // an invalid candidate steers the simplex away
            Err(_) => f64::INFINITY,
        }
    };

    // initial simplex around θ = 1
    let mut simplex: Vec<(Vec<f64>, f64)> = Vec::with_capacity(k + 1);
    let origin = vec![0.0; k];
    simplex.push((origin.clone(), objective(&origin)));
    for i in 0..k {
        let mut point = origin.clone();
        point[i] += 1.0;
        let value = objective(&point);
        simplex.push((point, value));
    }

    let (alpha, gamma, rho, sigma) = (1.0, 2.0, 0.5, 0.5);
    for iteration in 0..options.max_iter {
        simplex.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        let best = simplex[0].1;
        let worst = simplex[k].1;
        if best.is_finite() && (worst - best).abs() < options.tolerance {
            debug!(
                "deviance converged after {} iterations ({:.6})",
                iteration, best
            );
            return Ok(simplex[0].0.iter().map(|t| t.exp()).collect());
        }

        // centroid of all but the worst vertex
        let mut centroid = vec![0.0; k];
        for (point, _) in simplex.iter().take(k) {
            for (c, p) in centroid.iter_mut().zip(point) {
                *c += p / k as f64;
            }
        }

        let reflect: Vec<f64> = centroid
            .iter()
            .zip(&simplex[k].0)
            .map(|(c, w)| c + alpha * (c - w))
            .collect();
        let f_reflect = objective(&reflect);

        if f_reflect < simplex[0].1 {
            let expand: Vec<f64> = centroid
                .iter()
                .zip(&reflect)
                .map(|(c, r)| c + gamma * (r - c))
                .collect();
            let f_expand = objective(&expand);
            simplex[k] = if f_expand < f_reflect {
                (expand, f_expand)
            } else {
                (reflect, f_reflect)
            };
        } else if f_reflect < simplex[k - 1].1 {
            simplex[k] = (reflect, f_reflect);
        } else {
            let contract: Vec<f64> = centroid
                .iter()
                .zip(&simplex[k].0)
                .map(|(c, w)| c + rho * (w - c))
                .collect();
            let f_contract = objective(&contract);
            if f_contract < simplex[k].1 {
                simplex[k] = (contract, f_contract);
            } else {
                // shrink toward the best vertex
                let best_point = simplex[0].0.clone();
                for entry in simplex.iter_mut().skip(1) {
                    let shrunk: Vec<f64> = best_point
                        .iter()
                        .zip(&entry.0)
                        .map(|(b, p)| b + sigma * (p - b))
                        .collect();
                    let value = objective(&shrunk);
                    *entry = (shrunk, value);
                }
            }
        }
    }

    simplex.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    Err(PhytostatError::NonConvergence {
        iterations: options.max_iter,
        deviance: simplex[0].1,
    })
}

/// Fit the model described by `spec` against `table`.
pub fn fit(table: &DataTable, spec: &ModelSpec) -> Result<FittedModel> {
    fit_with_options(table, spec, &FitOptions::default())
}

pub fn fit_with_options(
    table: &DataTable,
    spec: &ModelSpec,
    options: &FitOptions,
) -> Result<FittedModel> {
    let design = design::build(table, spec)?;
    debug!(
        "Fitting '{}' ~ {} ({} rows, {} fixed columns, {} random terms)",
        spec.response,
        spec.term_labels().join(" + "),
        design.n(),
        design.rank(),
        design.random.len()
    );

    let theta = minimize_deviance(&design, spec.method, options)?;
    let profiled = profile(&design, &theta, spec.method)?;

    let components = design
        .random
        .iter()
        .zip(&theta)
        .map(|(block, &t)| VarianceComponent {
            label: block.label.clone(),
            variance: t * profiled.sigma2,
        })
        .collect();

    Ok(FittedModel {
        spec: spec.clone(),
        beta: profiled.beta,
        vcov_unscaled: profiled.vcov_unscaled,
        sigma2: profiled.sigma2,
        components,
        deviance: profiled.deviance,
        n: design.n(),
        rank: design.rank(),
        terms: design.terms,
        factor_levels: design.factor_levels,
    })
}
