//! Dense symmetric linear algebra for the mixed-model solver.
//!
//! Greenhouse-scale designs stay in the low hundreds of observations, so a
//! plain O(n^3) Cholesky over `ndarray` is sufficient and avoids an external
//! LAPACK provider.

use ndarray::{Array1, Array2};

use crate::error::{PhytostatError, Result};

/// Lower-triangular Cholesky factor of a symmetric positive-definite matrix.
#[derive(Debug, Clone)]
pub struct Cholesky {
    l: Array2<f64>,
}

impl Cholesky {
    /// Factor `a` as L·Lᵀ. Fails on non-positive-definite input.
    pub fn new(a: &Array2<f64>) -> Result<Self> {
        let n = a.nrows();
        if a.ncols() != n {
            return Err(PhytostatError::Singular(format!(
                "matrix is {}x{}, expected square",
                n,
                a.ncols()
            )));
        }
        let mut l = Array2::<f64>::zeros((n, n));
        for i in 0..n {
            for j in 0..=i {
                let mut sum = a[[i, j]];
                for k in 0..j {
                    sum -= l[[i, k]] * l[[j, k]];
                }
                if i == j {
                    if sum <= 0.0 || !sum.is_finite() {
                        return Err(PhytostatError::Singular(format!(
                            "non-positive pivot {:.3e} at row {}",
                            sum, i
                        )));
                    }
                    l[[i, j]] = sum.sqrt();
                } else {
                    l[[i, j]] = sum / l[[j, j]];
                }
            }
        }
        Ok(Self { l })
    }

    pub fn dim(&self) -> usize {
        self.l.nrows()
    }

    /// log|A| = 2 Σ log L[i,i]
    pub fn log_det(&self) -> f64 {
        (0..self.dim()).map(|i| self.l[[i, i]].ln()).sum::<f64>() * 2.0
    }

    /// Solve L·x = b (forward substitution).
    fn solve_lower(&self, b: &Array1<f64>) -> Array1<f64> {
        let n = self.dim();
        let mut x = b.clone();
        for i in 0..n {
            for k in 0..i {
                let adj = self.l[[i, k]] * x[k];
                x[i] -= adj;
            }
            x[i] /= self.l[[i, i]];
        }
        x
    }

    /// Solve Lᵀ·x = b (back substitution).
    fn solve_upper(&self, b: &Array1<f64>) -> Array1<f64> {
        let n = self.dim();
        let mut x = b.clone();
        for i in (0..n).rev() {
            for k in (i + 1)..n {
                let adj = self.l[[k, i]] * x[k];
                x[i] -= adj;
            }
            x[i] /= self.l[[i, i]];
        }
        x
    }

    /// Solve A·x = b.
    pub fn solve(&self, b: &Array1<f64>) -> Array1<f64> {
        self.solve_upper(&self.solve_lower(b))
    }

    /// Solve A·X = B column-wise.
    pub fn solve_matrix(&self, b: &Array2<f64>) -> Array2<f64> {
        let mut out = Array2::<f64>::zeros(b.dim());
        for (j, col) in b.columns().into_iter().enumerate() {
            let solved = self.solve(&col.to_owned());
            out.column_mut(j).assign(&solved);
        }
        out
    }

    /// Inverse of A via the factorization.
    pub fn inverse(&self) -> Array2<f64> {
        let n = self.dim();
        self.solve_matrix(&Array2::<f64>::eye(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_cholesky_solve() {
        let a = array![[4.0, 2.0, 0.6], [2.0, 5.0, 1.5], [0.6, 1.5, 3.8]];
        let chol = Cholesky::new(&a).unwrap();

        let b = array![1.0, 2.0, 3.0];
        let x = chol.solve(&b);
        let back = a.dot(&x);
        for i in 0..3 {
            assert_relative_eq!(back[i], b[i], epsilon = 1e-10);
        }
    }

    #[test]
    fn test_log_det_matches_identity_scaling() {
        let a = Array2::<f64>::eye(4) * 3.0;
        let chol = Cholesky::new(&a).unwrap();
        assert_relative_eq!(chol.log_det(), 4.0 * 3.0_f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_inverse() {
        let a = array![[2.0, 0.5], [0.5, 1.0]];
        let inv = Cholesky::new(&a).unwrap().inverse();
        let prod = a.dot(&inv);
        assert_relative_eq!(prod[[0, 0]], 1.0, epsilon = 1e-12);
        assert_relative_eq!(prod[[0, 1]], 0.0, epsilon = 1e-12);
        assert_relative_eq!(prod[[1, 1]], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rejects_indefinite_matrix() {
        let a = array![[1.0, 2.0], [2.0, 1.0]];
        assert!(matches!(
            Cholesky::new(&a),
            Err(PhytostatError::Singular(_))
        ));
    }
}
