//! In-place direct solvers for tridiagonal systems.
//!
//! All four solvers overwrite the right-hand side with the solution of
//! `A * x = b`. The plain variants leave the matrix untouched; the cached
//! variants factorize into the matrix bands on first use (tagging it via
//! [`TriDiagMatrix::set_prepared`]) and reuse the factors on every later
//! solve with the same matrix.
//!
//! The Thomas solvers assume a nonzero (in practice diagonally dominant)
//! diagonal and do no pivoting; the caller guarantees well-posedness. The
//! Gauss variants do partial row interchange between each row and its
//! sub-diagonal neighbor, which is all the pivoting a tridiagonal band
//! admits.

use crate::num::tdmatrix::{BandsMut, TriDiagMatrix};

/// Thomas algorithm. Overwrites `rhs` with the solution; `a` is unchanged.
///
/// Allocates one scratch vector of length n-1 for the modified
/// super-diagonal.
pub fn solve_thomas(a: &TriDiagMatrix, rhs: &mut [f64]) {
    let n = a.size();
    debug_assert!(n > 0);
    debug_assert_eq!(n, rhs.len());

    let (diag, lower, upper) = a.bands();
    let mut c_star = upper.to_vec();

    c_star[0] /= diag[0];
    for i in 1..n - 1 {
        c_star[i] /= diag[i] - c_star[i - 1] * lower[i - 1];
    }

    rhs[0] /= diag[0];
    for i in 1..n {
        rhs[i] = (rhs[i] - rhs[i - 1] * lower[i - 1]) / (diag[i] - c_star[i - 1] * lower[i - 1]);
    }

    for i in (0..n - 1).rev() {
        rhs[i] -= c_star[i] * rhs[i + 1];
    }
}

/// Thomas algorithm with cached elimination.
///
/// On the first call the super-diagonal is overwritten with the modified
/// `c*` coefficients and the diagonal with the post-elimination pivots; the
/// matrix is then tagged prepared. Subsequent calls skip the elimination and
/// only run the forward sweep on `rhs` plus the back-substitution, making
/// repeated solves with the same matrix allocation-free.
pub fn solve_thomas_cached(a: &mut TriDiagMatrix, rhs: &mut [f64]) {
    let n = a.size();
    debug_assert!(n > 0);
    debug_assert_eq!(n, rhs.len());

    let prepared = a.is_prepared();
    let BandsMut {
        diag, lower, upper, ..
    } = a.bands_mut();

    if !prepared {
        upper[0] /= diag[0];
        for i in 1..n - 1 {
            upper[i] /= diag[i] - upper[i - 1] * lower[i - 1];
        }
        for i in 1..n {
            diag[i] -= upper[i - 1] * lower[i - 1];
        }
    }

    rhs[0] /= diag[0];
    for i in 1..n {
        rhs[i] = (rhs[i] - rhs[i - 1] * lower[i - 1]) / diag[i];
    }

    for i in (0..n - 1).rev() {
        rhs[i] -= upper[i] * rhs[i + 1];
    }

    a.set_prepared(true);
}

/// Gaussian elimination with partial pivoting. Overwrites `rhs`; `a` is
/// unchanged (the elimination works on band copies).
///
/// Row interchanges push fill-in one place past the super-diagonal; the
/// copied sub-diagonal slot doubles as that second super-diagonal during
/// back-substitution.
pub fn solve_gauss_pivot(a: &TriDiagMatrix, rhs: &mut [f64]) {
    let n = a.size();
    debug_assert!(n >= 2);
    debug_assert_eq!(n, rhs.len());

    let (diag, lower, upper) = a.bands();
    let mut d = diag.to_vec();
    let mut dl = lower.to_vec();
    let mut du = upper.to_vec();

    for i in 0..n - 2 {
        if d[i].abs() >= dl[i].abs() {
            // No row interchange; d[i] assumed nonzero.
            let fact = dl[i] / d[i];
            d[i + 1] -= fact * du[i];
            rhs[i + 1] -= fact * rhs[i];
            dl[i] = 0.0;
        } else {
            // Interchange rows i and i+1.
            let fact = d[i] / dl[i];
            d[i] = dl[i];
            let temp = d[i + 1];
            d[i + 1] = du[i] - fact * temp;
            dl[i] = du[i + 1];
            du[i + 1] = -fact * dl[i];
            du[i] = temp;
            rhs.swap(i, i + 1);
            rhs[i + 1] -= fact * rhs[i];
        }
    }

    let i = n - 2;
    if d[i].abs() >= dl[i].abs() {
        let fact = dl[i] / d[i];
        d[i + 1] -= fact * du[i];
        rhs[i + 1] -= fact * rhs[i];
    } else {
        let fact = d[i] / dl[i];
        d[i] = dl[i];
        let temp = d[i + 1];
        d[i + 1] = du[i] - fact * temp;
        du[i] = temp;
        rhs.swap(i, i + 1);
        rhs[i + 1] -= fact * rhs[i];
    }

    // Back-substitution against U with two super-diagonals.
    rhs[n - 1] /= d[n - 1];
    rhs[n - 2] = (rhs[n - 2] - du[n - 2] * rhs[n - 1]) / d[n - 2];
    for i in (0..n.saturating_sub(2)).rev() {
        rhs[i] = (rhs[i] - du[i] * rhs[i + 1] - dl[i] * rhs[i + 2]) / d[i];
    }
}

/// Gaussian elimination with partial pivoting and cached factorization.
///
/// The first call factorizes in place: multipliers into `lower`, interchange
/// fill-in into `super_upper`, the permutation into the pivot vector; the
/// matrix is tagged prepared. Later calls apply the stored permutation and
/// run the L-solve followed by the U-solve.
pub fn solve_gauss_pivot_cached(a: &mut TriDiagMatrix, rhs: &mut [f64]) {
    let n = a.size();
    debug_assert!(n >= 2);
    debug_assert_eq!(n, rhs.len());

    let prepared = a.is_prepared();
    let BandsMut {
        diag: d,
        lower: dl,
        upper: du,
        super_upper: du2,
        pivot: ipiv,
    } = a.bands_mut();

    if !prepared {
        du2.clear();
        du2.resize(n.saturating_sub(2), 0.0);
        ipiv.clear();
        ipiv.extend(0..n);

        for i in 0..n - 2 {
            if d[i].abs() >= dl[i].abs() {
                // No interchange; eliminate dl[i], keep the multiplier.
                let fact = dl[i] / d[i];
                dl[i] = fact;
                d[i + 1] -= fact * du[i];
            } else {
                // Interchange rows i and i+1, eliminate dl[i].
                let fact = d[i] / dl[i];
                d[i] = dl[i];
                dl[i] = fact;
                let temp = du[i];
                du[i] = d[i + 1];
                d[i + 1] = temp - fact * d[i + 1];
                du2[i] = du[i + 1];
                du[i + 1] = -fact * du[i + 1];
                ipiv[i] = i + 1;
            }
        }

        let i = n - 2;
        if d[i].abs() >= dl[i].abs() {
            let fact = dl[i] / d[i];
            dl[i] = fact;
            d[i + 1] -= fact * du[i];
        } else {
            let fact = d[i] / dl[i];
            d[i] = dl[i];
            dl[i] = fact;
            let temp = du[i];
            du[i] = d[i + 1];
            d[i + 1] = temp - fact * d[i + 1];
            ipiv[i] = i + 1;
        }
    }

    // Solve L * x = P * b.
    for i in 0..n - 1 {
        if ipiv[i] == i {
            rhs[i + 1] -= dl[i] * rhs[i];
        } else {
            let temp = rhs[i] - dl[i] * rhs[i + 1];
            rhs[i] = rhs[i + 1];
            rhs[i + 1] = temp;
        }
    }

    // Solve U * x = y; all pivots assumed nonzero.
    rhs[n - 1] /= d[n - 1];
    rhs[n - 2] = (rhs[n - 2] - du[n - 2] * rhs[n - 1]) / d[n - 2];
    for i in (0..n.saturating_sub(2)).rev() {
        rhs[i] = (rhs[i] - du[i] * rhs[i + 1] - du2[i] * rhs[i + 2]) / d[i];
    }

    a.set_prepared(true);
}
