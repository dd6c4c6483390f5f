//! Spatial discretization of the compartment stack.
//!
//! Two mesh families: equidistant cells of `1/resolution` µm, and a
//! Babuška–Kloker geometric refinement that keeps fine cells near interior
//! interfaces and 1 µm cells in the bulk. Construction assigns each
//! compartment its contiguous cell range and appends the single sink cell
//! at the end.

use crate::sim::compartment::{Compartment, Sink};

/// Spatial discretization method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscMethod {
    /// Uniform cells, `resolution` subdivisions per micrometer.
    Equidistant,
    /// Geometric refinement around interior interfaces (Babuška–Kloker).
    BabuskaKloker,
}

impl DiscMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscMethod::Equidistant => "EQUIDIST",
            DiscMethod::BabuskaKloker => "BK",
        }
    }

    /// Parses the wire form (case-insensitive `EQUIDIST` / `BK`).
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "EQUIDIST" => Some(DiscMethod::Equidistant),
            "BK" => Some(DiscMethod::BabuskaKloker),
            _ => None,
        }
    }
}

/// The per-cell space-step vector and the bookkeeping that goes with it.
#[derive(Debug, Clone)]
pub struct Geometry {
    space_steps: Vec<f64>,
    min_step: f64,
    max_step: f64,
    method: DiscMethod,
    valid: bool,
    /// User-requested transition ratio for the refined mesh, in (0, 1].
    eta: f64,
    /// Ratio actually used after the transition fit.
    refined_eta: f64,
}

impl Default for Geometry {
    fn default() -> Self {
        Self::new()
    }
}

impl Geometry {
    pub fn new() -> Self {
        Self {
            space_steps: Vec::new(),
            min_step: 1.0,
            max_step: 1.0,
            method: DiscMethod::Equidistant,
            valid: false,
            eta: 0.6,
            refined_eta: 0.0,
        }
    }

    /// Builds the space-step vector and assigns cell ranges to every
    /// compartment and the sink.
    ///
    /// Returns `false` only when the total cell count comes out zero; any
    /// other degenerate input is the caller's validation responsibility.
    /// The refined mesh is only constructed for `resolution > 1` with at
    /// least two compartments; otherwise the equidistant mesh is used.
    pub fn create(
        &mut self,
        method: DiscMethod,
        compartments: &mut [Compartment],
        resolution: u32,
        sink: Option<&mut Sink>,
    ) -> bool {
        debug_assert!(!compartments.is_empty());
        debug_assert!(resolution >= 1);

        self.method = method;
        self.space_steps.clear();
        self.min_step = 1.0;
        self.max_step = 1.0;

        // A transition ratio of 1 produces no refinement; treat it as the
        // equidistant case instead of fitting a degenerate transition.
        if method == DiscMethod::Equidistant
            || resolution == 1
            || compartments.len() == 1
            || self.eta >= 1.0
        {
            return self.create_equidistant(compartments, resolution, sink);
        }
        self.create_refined(compartments, resolution, sink)
    }

    fn create_equidistant(
        &mut self,
        compartments: &mut [Compartment],
        resolution: u32,
        sink: Option<&mut Sink>,
    ) -> bool {
        let ss = 1.0 / resolution as f64;
        let mut counter = 0usize;
        let mut total_um = 0usize;

        for c in compartments.iter_mut() {
            debug_assert!(c.thickness_um > 0);
            let cells = c.thickness_um as usize * resolution as usize;
            c.set_cell_range(counter, counter + cells - 1);
            counter += cells;
            total_um += c.thickness_um as usize;
        }

        let mut size = total_um * resolution as usize;
        if let Some(sink) = sink {
            sink.set_cell(counter);
            size += 1;
        }

        self.valid = size > 0;
        if !self.valid {
            return false;
        }
        self.min_step = ss;
        self.max_step = ss;
        self.space_steps = vec![ss; size];
        true
    }

    fn create_refined(
        &mut self,
        compartments: &mut [Compartment],
        resolution: u32,
        sink: Option<&mut Sink>,
    ) -> bool {
        const EPS: f64 = 1.0e-13;

        // Fit the transition: n elements per side, refined ratio, and the
        // per-side transition width in whole micrometers.
        self.refined_eta = self.eta;
        let mut n_trans = 1usize;
        let mut trans_um = 1usize;
        let mut boundary_step = 1.0 / resolution as f64;
        self.fit_transition(&mut n_trans, &mut trans_um, &mut boundary_step, EPS);
        debug_assert!(n_trans > 0);

        // Symmetric transition vector: eta, eta^2, .., eta^(n-1), eta^(n-1)
        // and its mirror image.
        let eta = self.refined_eta;
        let mut trans = Vec::with_capacity(n_trans * 2);
        let mut ss = 1.0;
        for _ in 0..n_trans - 1 {
            ss *= eta;
            trans.push(ss);
        }
        trans.push(ss);
        for i in (0..n_trans).rev() {
            let v = trans[i];
            trans.push(v);
        }

        let c_count = compartments.len();
        let half = trans.len() / 2;
        let mut counter = 0usize;
        let mut carry = 0usize;

        for (i, c) in compartments.iter_mut().enumerate() {
            let start = counter;
            let trans_width = if i == 0 || i == c_count - 1 {
                trans_um
            } else {
                trans_um * 2
            };
            let bulk = c.thickness_um as isize - trans_width as isize;
            debug_assert!(bulk >= 0, "compartment thinner than its transition zone");
            let bulk = bulk.max(0) as usize;

            for _ in 0..bulk {
                self.space_steps.push(1.0);
            }
            counter += bulk;

            // The full transition straddles the interface; half of its cells
            // belong to this compartment, the mirror half to the next one.
            if i < c_count - 1 {
                counter += half;
                self.space_steps.extend_from_slice(&trans);
            }
            counter += carry;
            c.set_cell_range(start, counter - 1);
            carry = half;
        }

        if let Some(sink) = sink {
            self.space_steps.push(1.0);
            sink.set_cell(counter);
        }

        self.valid = !self.space_steps.is_empty();
        self.max_step = 1.0;
        self.min_step = boundary_step;
        self.valid
    }

    /// Solves for the transition element count `n`, the refined ratio and
    /// the per-side transition width so that the one-sided geometric power
    /// sum with doubled last element hits an integer micrometer count while
    /// the finest cell stays at or below the requested boundary step.
    ///
    /// The outer loop retries with one more element at most 10 times; the
    /// original construction carries no termination proof for adversarial
    /// ratios, so the bound is a hard invariant.
    fn fit_transition(
        &mut self,
        n: &mut usize,
        trans_um: &mut usize,
        boundary_step: &mut f64,
        err: f64,
    ) {
        let start_eta = self.refined_eta;
        *n = (boundary_step.ln() / start_eta.ln()).ceil().max(1.0) as usize;
        *trans_um = power_series_double_last(*n, start_eta).ceil() as usize;
        self.refined_eta = find_optimal_x(start_eta, *n, *trans_um as f64, err);

        let mut i = 0;
        while self.refined_eta.powi(*n as i32 - 1) > *boundary_step && i < 10 {
            i += 1;
            *n += 1;
            *trans_um = power_series_double_last(*n, start_eta).ceil() as usize;
            self.refined_eta = find_optimal_x(start_eta, *n, *trans_um as f64, err);
        }
        *boundary_step = self.refined_eta.powi(*n as i32 - 1);
    }

    pub fn space_steps(&self) -> &[f64] {
        &self.space_steps
    }

    /// Total number of cells including the sink cell.
    pub fn size(&self) -> usize {
        self.space_steps.len()
    }

    pub fn min_step(&self) -> f64 {
        self.min_step
    }

    pub fn max_step(&self) -> f64 {
        self.max_step
    }

    pub fn method(&self) -> DiscMethod {
        self.method
    }

    pub fn valid(&self) -> bool {
        self.valid
    }

    pub fn eta(&self) -> f64 {
        self.eta
    }

    pub fn set_eta(&mut self, eta: f64) {
        self.eta = eta;
    }

    /// The geometric ratio actually used by the refined mesh.
    pub fn refined_eta(&self) -> f64 {
        self.refined_eta
    }

    /// Excises the half-open cell range `[from, to)` and rescans the step
    /// extrema. Used when the vehicle compartment is removed mid-run.
    pub fn remove(&mut self, from: usize, to: usize) {
        self.space_steps.drain(from..to);
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &s in &self.space_steps {
            min = min.min(s);
            max = max.max(s);
        }
        if self.space_steps.is_empty() {
            min = 1.0;
            max = 1.0;
            self.valid = false;
        }
        self.min_step = min;
        self.max_step = max;
    }
}

/// `x + x^2 + .. + x^(n-1) + x^(n-1)`: the one-sided transition width for
/// ratio `x` with the last element doubled.
fn power_series_double_last(n: usize, x: f64) -> f64 {
    let mut sum = 0.0;
    let mut term = 1.0;
    for _ in 1..n {
        term *= x;
        sum += term;
    }
    sum + term
}

/// Newton iteration (secant-style derivative over one machine epsilon) for
/// the ratio `x` with `power_series_double_last(n, x) == a`.
fn find_optimal_x(start_x: f64, n: usize, a: f64, err: f64) -> f64 {
    let mut x = start_x;
    let mut old_x = x + 2.0 * err;
    let dx = f64::EPSILON;

    while (old_x - x).abs() > err {
        old_x = x;
        let f_x = power_series_double_last(n, x) - a;
        let f_dx = power_series_double_last(n, x + dx) - a;
        x -= f_x * dx / (f_dx - f_x);
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::compartment::SinkKind;
    use approx::assert_relative_eq;

    fn stack(thicknesses: &[u32]) -> Vec<Compartment> {
        thicknesses
            .iter()
            .enumerate()
            .map(|(i, &h)| Compartment::new(&format!("c{i}"), h, 1.0, 1.0, 1.0e8))
            .collect()
    }

    fn sink() -> Sink {
        Sink::new("Sink", SinkKind::PerfectSink, 1.0e8, 1.0, 1.0)
    }

    #[test]
    fn test_equidistant_single_compartment() {
        let mut comps = stack(&[10]);
        let mut s = sink();
        let mut geo = Geometry::new();
        assert!(geo.create(DiscMethod::Equidistant, &mut comps, 1, Some(&mut s)));

        assert_eq!(geo.size(), 11);
        assert_eq!(comps[0].cell_range(), (0, 9));
        assert_eq!(s.cell(), 10);
        assert_eq!(geo.min_step(), 1.0);
        assert_eq!(geo.max_step(), 1.0);
        assert!(geo.space_steps().iter().all(|&x| x == 1.0));
    }

    #[test]
    fn test_equidistant_resolution_and_ranges() {
        let mut comps = stack(&[10, 20, 5]);
        let mut s = sink();
        let mut geo = Geometry::new();
        assert!(geo.create(DiscMethod::Equidistant, &mut comps, 4, Some(&mut s)));

        // size == sum(h) * resolution + 1 sink cell
        assert_eq!(geo.size(), 35 * 4 + 1);
        assert_eq!(comps[0].cell_range(), (0, 39));
        assert_eq!(comps[1].cell_range(), (40, 119));
        assert_eq!(comps[2].cell_range(), (120, 139));
        assert_eq!(s.cell(), 140);
        assert!(geo.space_steps().iter().all(|&x| x == 0.25));
    }

    #[test]
    fn test_bk_falls_back_to_equidistant_for_unit_ratio() {
        let mut comps = stack(&[10, 10]);
        let mut s = sink();
        let mut geo = Geometry::new();
        geo.set_eta(1.0);
        assert!(geo.create(DiscMethod::BabuskaKloker, &mut comps, 5, Some(&mut s)));
        assert_eq!(geo.size(), 20 * 5 + 1);
        assert!(geo.space_steps().iter().all(|&x| x == 0.2));
    }

    #[test]
    fn test_bk_falls_back_to_equidistant_for_resolution_one() {
        let mut comps = stack(&[10, 10]);
        let mut s = sink();
        let mut geo = Geometry::new();
        assert!(geo.create(DiscMethod::BabuskaKloker, &mut comps, 1, Some(&mut s)));
        assert_eq!(geo.size(), 21);
        assert!(geo.space_steps().iter().all(|&x| x == 1.0));
    }

    #[test]
    fn test_bk_mesh_structure() {
        let mut comps = stack(&[10, 10]);
        let mut s = sink();
        let mut geo = Geometry::new();
        assert!(geo.create(DiscMethod::BabuskaKloker, &mut comps, 5, Some(&mut s)));

        // Finer than the boundary target near the interface, 1 µm in bulk.
        assert!(geo.min_step() <= 1.0 / 5.0, "min step {}", geo.min_step());
        assert_eq!(geo.max_step(), 1.0);
        assert!(geo.refined_eta() > 0.0 && geo.refined_eta() < 1.0);

        // More cells than the 1 µm equidistant mesh, fewer than full
        // subdivision.
        assert!(geo.size() > 21);
        assert!(geo.size() < 20 * 5 + 1);

        // Ranges tile the vector with the sink last.
        assert_eq!(comps[0].cell_from(), 0);
        assert_eq!(comps[1].cell_from(), comps[0].cell_to() + 1);
        assert_eq!(s.cell(), comps[1].cell_to() + 1);
        assert_eq!(s.cell(), geo.size() - 1);

        // Per-compartment step sums recover the thickness to rounding.
        for c in &comps {
            let total: f64 = geo.space_steps()[c.cell_from()..=c.cell_to()].iter().sum();
            assert!(
                (total - c.thickness_um as f64).abs() < 0.5,
                "thickness {} vs steps {total}",
                c.thickness_um
            );
        }

        // The transition is symmetric around the interface.
        let steps = geo.space_steps();
        let iface = comps[0].cell_to();
        assert_relative_eq!(steps[iface], steps[iface + 1], max_relative = 1e-12);
        assert_relative_eq!(steps[iface - 1], steps[iface + 2], max_relative = 1e-12);
    }

    #[test]
    fn test_bk_min_step_matches_refined_eta_power() {
        let mut comps = stack(&[10, 10, 10]);
        let mut s = sink();
        let mut geo = Geometry::new();
        assert!(geo.create(DiscMethod::BabuskaKloker, &mut comps, 5, Some(&mut s)));

        let min_in_vector = geo
            .space_steps()
            .iter()
            .cloned()
            .fold(f64::INFINITY, f64::min);
        assert_relative_eq!(geo.min_step(), min_in_vector, max_relative = 1e-12);
    }

    #[test]
    fn test_power_series_double_last() {
        // n = 3, x = 0.5: 0.5 + 0.25 + 0.25
        assert_relative_eq!(power_series_double_last(3, 0.5), 1.0, max_relative = 1e-15);
        // n = 1 degenerates to the doubled zeroth term.
        assert_relative_eq!(power_series_double_last(1, 0.5), 1.0, max_relative = 1e-15);
    }

    #[test]
    fn test_find_optimal_x_hits_target() {
        let x = find_optimal_x(0.6, 4, 2.0, 1.0e-13);
        assert_relative_eq!(power_series_double_last(4, x), 2.0, max_relative = 1e-10);
    }

    #[test]
    fn test_remove_range() {
        let mut comps = stack(&[10, 10]);
        let mut s = sink();
        let mut geo = Geometry::new();
        geo.create(DiscMethod::Equidistant, &mut comps, 2, Some(&mut s));
        let before = geo.size();

        let (from, to) = comps[0].cell_range();
        geo.remove(from, to + 1);
        assert_eq!(geo.size(), before - 20);
        assert_eq!(geo.min_step(), 0.5);
        assert_eq!(geo.max_step(), 0.5);
    }
}
