//! Linear mixed-effects modeling: specification, design matrices, and the
//! profiled (RE)ML fitter.

mod design;
mod fit;
mod linalg;

pub use design::{build, Design, Method, ModelSpec, RandomBlock, RandomSpec, TermSpan};
pub use fit::{fit, fit_with_options, FitOptions, FittedModel, VarianceComponent};
pub use linalg::Cholesky;
