/// Tridiagonal band matrix.
///
/// Stores only the three bands of an `n x n` matrix: `diag` (length n),
/// `lower` and `upper` (length n-1). The cached-factorization solvers in
/// [`crate::num::solve`] additionally use `super_upper` (length n-2, fill-in
/// from row interchanges) and a pivot permutation; both are allocated lazily
/// on the first cached pivoted solve.
///
/// The `prepared` flag marks that the bands have been overwritten with LU
/// factors in place. While it is set, the bands no longer represent the
/// original matrix; only the matching cached solver may interpret them.
#[derive(Debug, Clone, Default)]
pub struct TriDiagMatrix {
    diag: Vec<f64>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    super_upper: Vec<f64>,
    pivot: Vec<usize>,
    prepared: bool,
}

/// Mutable views of all band storage, for the in-place solvers.
///
/// Splitting the borrows here lets a solver eliminate into `diag` while
/// reading `lower` and writing `upper` in the same sweep.
pub(crate) struct BandsMut<'a> {
    pub diag: &'a mut [f64],
    pub lower: &'a mut [f64],
    pub upper: &'a mut [f64],
    pub super_upper: &'a mut Vec<f64>,
    pub pivot: &'a mut Vec<usize>,
}

impl TriDiagMatrix {
    /// Creates an `n x n` band matrix with all bands zero.
    pub fn new(n: usize) -> Self {
        Self {
            diag: vec![0.0; n],
            lower: vec![0.0; n.saturating_sub(1)],
            upper: vec![0.0; n.saturating_sub(1)],
            super_upper: Vec::new(),
            pivot: Vec::new(),
            prepared: false,
        }
    }

    /// Matrix dimension (length of the diagonal).
    pub fn size(&self) -> usize {
        self.diag.len()
    }

    /// Zeroes all three bands. Does not touch the `prepared` flag.
    pub fn clear(&mut self) {
        self.diag.fill(0.0);
        self.lower.fill(0.0);
        self.upper.fill(0.0);
    }

    pub fn diag(&self, i: usize) -> f64 {
        self.diag[i]
    }

    pub fn diag_mut(&mut self, i: usize) -> &mut f64 {
        &mut self.diag[i]
    }

    /// Sub-diagonal element of row `i + 1`, valid for `i < n - 1`.
    pub fn lower(&self, i: usize) -> f64 {
        self.lower[i]
    }

    pub fn lower_mut(&mut self, i: usize) -> &mut f64 {
        &mut self.lower[i]
    }

    /// Super-diagonal element of row `i`, valid for `i < n - 1`.
    pub fn upper(&self, i: usize) -> f64 {
        self.upper[i]
    }

    pub fn upper_mut(&mut self, i: usize) -> &mut f64 {
        &mut self.upper[i]
    }

    /// Element accessor by (row, column); only the band `|i - j| <= 1` is
    /// addressable.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        debug_assert!(i < self.size() && j < self.size());
        debug_assert!(i.abs_diff(j) <= 1, "access outside the tridiagonal band");
        if i == j {
            self.diag[i]
        } else if j > i {
            self.upper[i]
        } else {
            self.lower[i - 1]
        }
    }

    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        debug_assert!(i < self.size() && j < self.size());
        debug_assert!(i.abs_diff(j) <= 1, "access outside the tridiagonal band");
        if i == j {
            self.diag[i] = value;
        } else if j > i {
            self.upper[i] = value;
        } else {
            self.lower[i - 1] = value;
        }
    }

    /// Largest band element (signed).
    pub fn max(&self) -> f64 {
        let mut max_el = 0.0_f64;
        let n = self.size();
        if n < 1 {
            return max_el;
        }
        for i in 0..n - 1 {
            max_el = max_el.max(self.diag[i]).max(self.lower[i]).max(self.upper[i]);
        }
        max_el.max(self.diag[n - 1])
    }

    /// Largest absolute band element. The matrix builder uses this to size
    /// the Crank–Nicolson sub-step.
    pub fn abs_max(&self) -> f64 {
        let mut max_el = 0.0_f64;
        let n = self.size();
        if n < 1 {
            return max_el;
        }
        for i in 0..n - 1 {
            max_el = max_el
                .max(self.diag[i].abs())
                .max(self.lower[i].abs())
                .max(self.upper[i].abs());
        }
        max_el.max(self.diag[n - 1].abs())
    }

    /// Weak row-wise diagonal dominance over the interior rows.
    pub fn is_diagonally_dominant(&self) -> bool {
        let n = self.size();
        for i in 1..n.saturating_sub(1) {
            if self.diag[i].abs() < self.upper[i].abs() + self.lower[i - 1].abs() {
                return false;
            }
        }
        true
    }

    /// Scales every band element in place. Does not touch `prepared`.
    pub fn multiply_by(&mut self, s: f64) {
        for d in &mut self.diag {
            *d *= s;
        }
        for u in &mut self.upper {
            *u *= s;
        }
        for l in &mut self.lower {
            *l *= s;
        }
    }

    /// Computes `A * v` into a fresh vector. Requires `|v| == size > 1`.
    pub fn mat_vec(&self, v: &[f64]) -> Vec<f64> {
        let n = self.size();
        debug_assert_eq!(n, v.len());
        debug_assert!(n > 1);

        let mut result = vec![0.0; n];
        result[0] = v[0] * self.diag[0] + v[1] * self.upper[0];
        for i in 1..n - 1 {
            result[i] = self.lower[i - 1] * v[i - 1] + self.diag[i] * v[i] + self.upper[i] * v[i + 1];
        }
        result[n - 1] = self.lower[n - 2] * v[n - 2] + self.diag[n - 1] * v[n - 1];
        result
    }

    /// Computes `v := A * v` in place with a single scalar of carry.
    ///
    /// Produces the same values as [`Self::mat_vec`]; the carry holds each
    /// row's left neighbor before it is overwritten.
    pub fn inline_multiply(&self, v: &mut [f64]) {
        let n = self.size();
        debug_assert_eq!(n, v.len());
        debug_assert!(n > 1);

        let mut carry = v[0];
        v[0] = v[0] * self.diag[0] + v[1] * self.upper[0];
        for i in 1..n - 1 {
            let old = v[i];
            v[i] = self.lower[i - 1] * carry + self.diag[i] * old + self.upper[i] * v[i + 1];
            carry = old;
        }
        v[n - 1] = self.lower[n - 2] * carry + self.diag[n - 1] * v[n - 1];
    }

    /// Whether the bands currently hold cached LU factors instead of the
    /// original matrix.
    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    /// Tags the band contents as factorized (or resets the tag). Setting the
    /// flag reinterprets the bands until the owner rebuilds the matrix.
    pub fn set_prepared(&mut self, prepared: bool) {
        self.prepared = prepared;
    }

    pub(crate) fn bands_mut(&mut self) -> BandsMut<'_> {
        BandsMut {
            diag: &mut self.diag,
            lower: &mut self.lower,
            upper: &mut self.upper,
            super_upper: &mut self.super_upper,
            pivot: &mut self.pivot,
        }
    }

    pub(crate) fn bands(&self) -> (&[f64], &[f64], &[f64]) {
        (&self.diag, &self.lower, &self.upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_3x3() -> TriDiagMatrix {
        let mut m = TriDiagMatrix::new(3);
        *m.diag_mut(0) = 1.0;
        *m.diag_mut(1) = 2.0;
        *m.diag_mut(2) = 3.0;
        *m.lower_mut(0) = 4.0;
        *m.lower_mut(1) = 5.0;
        *m.upper_mut(0) = 6.0;
        *m.upper_mut(1) = 7.0;
        m
    }

    #[test]
    fn test_new_is_zeroed() {
        let m = TriDiagMatrix::new(3);
        assert_eq!(m.get(0, 0), 0.0);
        assert_eq!(m.get(1, 1), 0.0);
        assert_eq!(m.get(2, 2), 0.0);
        assert_eq!(m.get(0, 1), 0.0);
        assert_eq!(m.get(1, 2), 0.0);
        assert_eq!(m.get(1, 0), 0.0);
        assert_eq!(m.get(2, 1), 0.0);
        assert!(!m.is_prepared());
    }

    #[test]
    fn test_size() {
        assert_eq!(TriDiagMatrix::new(3).size(), 3);
        assert_eq!(TriDiagMatrix::default().size(), 0);
    }

    #[test]
    fn test_row_col_accessors_map_to_bands() {
        let mut m = TriDiagMatrix::new(3);
        m.set(0, 0, 1.0);
        m.set(1, 1, 2.0);
        m.set(2, 2, 3.0);
        m.set(0, 1, 4.0);
        m.set(1, 2, 5.0);
        m.set(1, 0, 6.0);
        m.set(2, 1, 7.0);

        assert_eq!(m.diag(0), 1.0);
        assert_eq!(m.diag(1), 2.0);
        assert_eq!(m.diag(2), 3.0);
        assert_eq!(m.upper(0), 4.0);
        assert_eq!(m.upper(1), 5.0);
        assert_eq!(m.lower(0), 6.0);
        assert_eq!(m.lower(1), 7.0);
    }

    #[test]
    fn test_clear() {
        let mut m = filled_3x3();
        m.clear();
        for i in 0..3 {
            assert_eq!(m.diag(i), 0.0);
        }
        for i in 0..2 {
            assert_eq!(m.lower(i), 0.0);
            assert_eq!(m.upper(i), 0.0);
        }
    }

    #[test]
    fn test_multiply_by() {
        let mut m = filled_3x3();
        m.multiply_by(2.0);
        assert_eq!(m.diag(0), 2.0);
        assert_eq!(m.diag(1), 4.0);
        assert_eq!(m.diag(2), 6.0);
        assert_eq!(m.lower(0), 8.0);
        assert_eq!(m.lower(1), 10.0);
        assert_eq!(m.upper(0), 12.0);
        assert_eq!(m.upper(1), 14.0);
    }

    #[test]
    fn test_max_and_abs_max() {
        let mut m = filled_3x3();
        assert_eq!(m.max(), 7.0);
        *m.lower_mut(0) = 19.0;
        assert_eq!(m.max(), 19.0);
        *m.lower_mut(1) = -125.0;
        assert_eq!(m.max(), 19.0);
        assert_eq!(m.abs_max(), 125.0);
    }

    #[test]
    fn test_mat_vec() {
        let mut m = filled_3x3();
        *m.lower_mut(1) = 15.0;
        let res = m.mat_vec(&[4.0, 2.0, 9.0]);
        assert_eq!(res, vec![16.0, 83.0, 57.0]);
    }

    #[test]
    fn test_inline_multiply_matches_mat_vec() {
        let mut m = filled_3x3();
        *m.lower_mut(1) = 15.0;
        let mut v = vec![4.0, 2.0, 9.0];
        m.inline_multiply(&mut v);
        assert_eq!(v, vec![16.0, 83.0, 57.0]);
    }

    #[test]
    fn test_inline_multiply_matches_mat_vec_larger() {
        let n = 12;
        let mut m = TriDiagMatrix::new(n);
        for i in 0..n {
            *m.diag_mut(i) = 1.0 + i as f64 * 0.25;
        }
        for i in 0..n - 1 {
            *m.lower_mut(i) = -0.5 + i as f64 * 0.125;
            *m.upper_mut(i) = 0.75 - i as f64 * 0.0625;
        }
        let v: Vec<f64> = (0..n).map(|i| (i as f64 * 0.7).sin() + 1.5).collect();

        let expected = m.mat_vec(&v);
        let mut inline = v.clone();
        m.inline_multiply(&mut inline);
        for i in 0..n {
            assert!(
                (inline[i] - expected[i]).abs() < 1e-14,
                "row {i}: {} vs {}",
                inline[i],
                expected[i]
            );
        }
    }

    #[test]
    fn test_diagonal_dominance() {
        let mut m = TriDiagMatrix::new(3);
        *m.diag_mut(0) = 4.0;
        *m.diag_mut(1) = 4.0;
        *m.diag_mut(2) = 4.0;
        *m.lower_mut(0) = -1.0;
        *m.lower_mut(1) = -1.0;
        *m.upper_mut(0) = -1.0;
        *m.upper_mut(1) = -1.0;
        assert!(m.is_diagonally_dominant());

        *m.diag_mut(1) = 1.0;
        assert!(!m.is_diagonally_dominant());
    }

    #[test]
    fn test_prepared_flag() {
        let mut m = TriDiagMatrix::new(3);
        assert!(!m.is_prepared());
        m.set_prepared(true);
        assert!(m.is_prepared());
        m.set_prepared(false);
        assert!(!m.is_prepared());
    }
}
