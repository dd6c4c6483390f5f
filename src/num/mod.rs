//! Numerical kernels: the tridiagonal band matrix and its direct solvers.

pub mod solve;
pub mod tdmatrix;

pub use solve::{solve_gauss_pivot, solve_gauss_pivot_cached, solve_thomas, solve_thomas_cached};
pub use tdmatrix::TriDiagMatrix;
