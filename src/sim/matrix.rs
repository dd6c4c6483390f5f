//! Crank–Nicolson matrix assembly.
//!
//! Builds the pair of tridiagonal matrices advancing the concentration
//! vector by one sub-step, `(2I + dt·L) c' = (2I - dt·L) c` (the first
//! scheme uses the equivalent `(I ± dt/2·L)` form), together with the
//! number of sub-steps per simulated minute. Three finite-difference
//! schemes are supported; they differ in where concentrations live
//! (cell centers vs. cell edges) and in how the partition and area
//! asymmetries enter the transfer coefficients.

use anyhow::{bail, Result};

use crate::num::TriDiagMatrix;
use crate::sim::compartment::{Compartment, Sink, SinkKind};
use crate::sim::geometry::Geometry;

/// Finite-difference assembly scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Central-node concentrations with back-flux damping and area
    /// correction. Finite dose only.
    DSkin13,
    /// Edge-concentration Crank formulation with partition-weighted
    /// harmonic transfer coefficients and an area clamp.
    DSkin14,
    /// Same as the edge formulation but with the area absorbed into the
    /// partition term (`K·A`); the fastest variant and the default.
    DSkin15,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::DSkin13 => "DSkin_1_3",
            Method::DSkin14 => "DSkin_1_4",
            Method::DSkin15 => "DSkin_1_5",
        }
    }

    /// Parses the wire form (exact match).
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "DSkin_1_3" => Some(Method::DSkin13),
            "DSkin_1_4" => Some(Method::DSkin14),
            "DSkin_1_5" => Some(Method::DSkin15),
            _ => None,
        }
    }
}

/// Assembles the Crank–Nicolson LHS/RHS pair and the sub-step count.
#[derive(Debug, Clone)]
pub struct MatrixBuilder {
    method: Method,
    max_module: f64,
    timesteps: u32,
    rhs: TriDiagMatrix,
    lhs: TriDiagMatrix,
}

impl MatrixBuilder {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            max_module: 50.0,
            timesteps: 1,
            rhs: TriDiagMatrix::default(),
            lhs: TriDiagMatrix::default(),
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    pub fn max_module(&self) -> f64 {
        self.max_module
    }

    /// Upper bound on the absolute pre-matrix entry per sub-step; larger
    /// assembled moduli raise the sub-step count instead.
    pub fn set_max_module(&mut self, max_module: f64) {
        debug_assert!(max_module > 0.0);
        self.max_module = max_module;
    }

    /// Sub-steps per simulated minute; at least 1, valid after `build`.
    pub fn timesteps(&self) -> u32 {
        self.timesteps
    }

    pub fn rhs(&self) -> &TriDiagMatrix {
        &self.rhs
    }

    pub fn lhs(&self) -> &TriDiagMatrix {
        &self.lhs
    }

    /// Builds both matrices for the configured scheme.
    ///
    /// Degenerate parameters are the caller's validation responsibility;
    /// the only rejected combination is the central-node scheme with an
    /// infinite-dose vehicle, which this formulation cannot express.
    pub fn build(
        &mut self,
        compartments: &[Compartment],
        geometry: &Geometry,
        sink: Option<&Sink>,
    ) -> Result<()> {
        debug_assert!(!compartments.is_empty());
        match self.method {
            Method::DSkin13 => self.build_central_node(compartments, geometry, sink),
            Method::DSkin14 => self.build_edge(compartments, geometry, sink, false),
            Method::DSkin15 => self.build_edge(compartments, geometry, sink, true),
        }
    }

    /// Central-node scheme: harmonic-mean diffusivities between neighbor
    /// cells, flux damping against the partition gradient, and an area
    /// clamp toward narrower neighbors.
    fn build_central_node(
        &mut self,
        compartments: &[Compartment],
        geometry: &Geometry,
        sink: Option<&Sink>,
    ) -> Result<()> {
        if !compartments[0].finite_dose {
            bail!("the central-node scheme does not support an infinite-dose vehicle");
        }

        let n = geometry.size();
        let d_vec = param_vector(n, compartments, |c| c.diffusion, sink);
        let k_vec = param_vector(n, compartments, |c| c.partition, sink);
        let a_vec = param_vector(n, compartments, |c| c.area, sink);
        let ss = geometry.space_steps();

        let mut rhs = TriDiagMatrix::new(n);

        // Reflecting boundary at the top: zero flux through x = 0. The
        // doubled gain from the right conserves the mass spent toward the
        // boundary in the neighboring equation.
        let l_dx = ss[0];
        let r_dx = avg(ss, 0, 1);
        *rhs.diag_mut(0) = 2.0 * d_vec[0] / (l_dx * r_dx);
        *rhs.upper_mut(0) = 4.0 * d_vec[0] / (r_dx * (l_dx + r_dx));

        for i in 1..n - 1 {
            let l = avg(ss, i, i - 1);
            let r = avg(ss, i, i + 1);
            let d_l = harmonic_mean(d_vec[i], d_vec[i - 1]);
            let d_r = harmonic_mean(d_vec[i], d_vec[i + 1]);

            // Flux toward a lower-partition neighbor is damped by the
            // partition ratio so it cannot pull mass against the gradient;
            // the paired gain factor on the other side matches, keeping the
            // exchange conservative.
            let (k1, k2, k3, k4) = back_flux_correction(&k_vec, i);
            let (v1, v2) = area_correction(&a_vec, i);

            *rhs.lower_mut(i - 1) = d_l * k1 * v2 * 2.0 / (l * (l + r));
            *rhs.diag_mut(i) = (d_l * k3 * v2 + d_r * k4 * v1) / (l * r);
            *rhs.upper_mut(i) = d_r * k2 * v1 * 2.0 / (r * (l + r));
        }

        // Last row: only the gain from above; the boundary condition toward
        // the sink is applied after the time-step conversion.
        let l_dx = avg(ss, n - 1, n - 2);
        let r_dx = ss[n - 1];
        *rhs.lower_mut(n - 2) = d_vec[n - 1] * 2.0 / (l_dx * (l_dx + r_dx));

        let dt = self.apply_timestep(&mut rhs);

        // Convert to Crank–Nicolson form, `I - dt/2·L` on the RHS.
        for i in 0..n - 1 {
            *rhs.diag_mut(i) = 1.0 - rhs.diag(i) / 2.0;
            *rhs.lower_mut(i) /= 2.0;
            *rhs.upper_mut(i) /= 2.0;
        }

        // One-way drain: the sink gains from the last layer but never feeds
        // back, so the sink row is deliberately not symmetric.
        *rhs.upper_mut(n - 2) = 0.0;

        if let Some(sink) = sink {
            *rhs.diag_mut(n - 1) = match sink.kind {
                SinkKind::PerfectSink => 1.0,
                SinkKind::PkCompartment => 1.0 - dt * sink.k_el() / 2.0,
            };
        }

        self.lhs = mirror_of(&rhs);
        self.rhs = rhs;
        Ok(())
    }

    /// Edge-concentration Crank scheme. With `merge_area` the area is
    /// folded into the partition term (`K·A`) and the explicit area clamp
    /// is dropped.
    fn build_edge(
        &mut self,
        compartments: &[Compartment],
        geometry: &Geometry,
        sink: Option<&Sink>,
        merge_area: bool,
    ) -> Result<()> {
        let n = geometry.size();
        let d_vec = param_vector(n, compartments, |c| c.diffusion, sink);
        let a_vec = param_vector(n, compartments, |c| c.area, sink);
        let mut k_vec = param_vector(n, compartments, |c| c.partition, sink);
        if merge_area {
            for (k, a) in k_vec.iter_mut().zip(&a_vec) {
                *k *= a;
            }
        }
        // min(1, A_neighbor / A_center), or no clamp once the area lives in
        // the partition term.
        let clamp = |a_n: f64, a_c: f64| if merge_area { 1.0 } else { (a_n / a_c).min(1.0) };

        let ss = geometry.space_steps();
        let mut rhs = TriDiagMatrix::new(n);

        // Reflecting boundary at the top.
        let h2 = avg(ss, 0, 1);
        let upper_f =
            partition_harmonic(ss[0], ss[1], d_vec[0], d_vec[1], k_vec[0] / k_vec[1]) / (h2 * h2);
        *rhs.diag_mut(0) = upper_f * clamp(a_vec[1], a_vec[0]);
        *rhs.upper_mut(0) = upper_f * k_vec[0] / k_vec[1] * clamp(a_vec[1], a_vec[0]);

        for i in 1..n - 1 {
            let h1 = avg(ss, i - 1, i);
            let h2 = avg(ss, i, i + 1);

            // Partition-weighted harmonic mean of the neighboring
            // diffusivities; exact only when the four space steps around the
            // interface are equal, which the refined mesh guarantees.
            let lower_f =
                partition_harmonic(ss[i - 1], ss[i], d_vec[i - 1], d_vec[i], k_vec[i - 1] / k_vec[i])
                    * 2.0
                    * h2
                    / (h1 * h2 * (h1 + h2));
            let upper_f =
                partition_harmonic(ss[i], ss[i + 1], d_vec[i], d_vec[i + 1], k_vec[i] / k_vec[i + 1])
                    * 2.0
                    * h1
                    / (h1 * h2 * (h1 + h2));

            let v_l = clamp(a_vec[i - 1], a_vec[i]);
            let v_r = clamp(a_vec[i + 1], a_vec[i]);

            *rhs.lower_mut(i - 1) = lower_f * v_l;
            *rhs.upper_mut(i) = upper_f * k_vec[i] / k_vec[i + 1] * v_r;
            *rhs.diag_mut(i) = lower_f * k_vec[i - 1] / k_vec[i] * v_l + upper_f * v_r;
        }

        // Last row, reflecting before the sink condition is applied.
        let h1 = avg(ss, n - 2, n - 1);
        let lower_f = partition_harmonic(
            ss[n - 2],
            ss[n - 1],
            d_vec[n - 2],
            d_vec[n - 1],
            k_vec[n - 2] / k_vec[n - 1],
        ) / (h1 * h1);
        let v_l = clamp(a_vec[n - 2], a_vec[n - 1]);
        *rhs.lower_mut(n - 2) = lower_f * v_l;
        *rhs.diag_mut(n - 1) = lower_f * k_vec[n - 2] / k_vec[n - 1] * v_l;

        let dt = self.apply_timestep(&mut rhs);

        // Crank–Nicolson pair: `2I + dt·L` on the left, `2I - dt·L` on the
        // right.
        let mut lhs = TriDiagMatrix::new(n);
        for i in 0..n - 1 {
            *lhs.diag_mut(i) = 2.0 + rhs.diag(i);
            *lhs.lower_mut(i) = -rhs.lower(i);
            *lhs.upper_mut(i) = -rhs.upper(i);
            *rhs.diag_mut(i) = 2.0 - rhs.diag(i);
        }

        // One-way drain into the sink (see the central-node scheme).
        *rhs.upper_mut(n - 2) = 0.0;
        *lhs.upper_mut(n - 2) = 0.0;

        if let Some(sink) = sink {
            match sink.kind {
                SinkKind::PerfectSink => {
                    *rhs.diag_mut(n - 1) = 2.0;
                    *lhs.diag_mut(n - 1) = 2.0;
                }
                SinkKind::PkCompartment => {
                    // Implicit first-order elimination, averaged like the
                    // transport terms.
                    *rhs.diag_mut(n - 1) = 2.0 - dt * sink.k_el();
                    *lhs.diag_mut(n - 1) = 2.0 + dt * sink.k_el();
                }
            }
        }

        // An infinite-dose vehicle holds its concentration: the first row
        // becomes an identity equation in both matrices.
        if !compartments[0].finite_dose {
            *rhs.diag_mut(0) = 2.0;
            *lhs.diag_mut(0) = 2.0;
            *rhs.upper_mut(0) = 0.0;
            *lhs.upper_mut(0) = 0.0;
        }

        self.rhs = rhs;
        self.lhs = lhs;
        Ok(())
    }

    /// Sizes the sub-step from the largest pre-matrix modulus and scales
    /// the bands by `dt = 1 / n_ts`. Returns `dt`.
    fn apply_timestep(&mut self, rhs: &mut TriDiagMatrix) -> f64 {
        let max_m = rhs.abs_max();
        self.timesteps = (max_m / self.max_module).ceil().max(1.0) as u32;
        let dt = 1.0 / self.timesteps as f64;
        rhs.multiply_by(dt);
        dt
    }
}

/// Fans each compartment's parameter into its cell range; the sink cell
/// inherits the value of the cell right above it.
fn param_vector<F>(n: usize, compartments: &[Compartment], f: F, sink: Option<&Sink>) -> Vec<f64>
where
    F: Fn(&Compartment) -> f64,
{
    let mut result = vec![0.0; n];
    for c in compartments {
        let value = f(c);
        for slot in &mut result[c.cell_from()..=c.cell_to()] {
            *slot = value;
        }
    }
    if let Some(sink) = sink {
        let idx = sink.cell();
        result[idx] = result[idx - 1];
    }
    result
}

fn avg(v: &[f64], i: usize, j: usize) -> f64 {
    (v[i] + v[j]) / 2.0
}

/// Harmonic mean of two diffusivities; zero when both vanish (no transport
/// across a dead interface).
fn harmonic_mean(a: f64, b: f64) -> f64 {
    let den = a + b;
    if den == 0.0 {
        return 0.0;
    }
    2.0 * a * b / den
}

/// Partition-weighted harmonic transfer term
/// `(l_a + l_b)·D_a·D_b / (l_a·D_b + k_ratio·l_b·D_a)`, zero across a dead
/// interface.
fn partition_harmonic(l_a: f64, l_b: f64, d_a: f64, d_b: f64, k_ratio: f64) -> f64 {
    let den = l_a * d_b + k_ratio * l_b * d_a;
    if den == 0.0 {
        return 0.0;
    }
    (l_a + l_b) * d_a * d_b / den
}

/// Damping factors against the partition gradient at cell `i`:
/// gains from the left/right neighbor (`k1`, `k2`) and losses toward them
/// (`k3`, `k4`). Each factor is `min(1, K_receiver / K_source)` for its
/// flux direction, so the loss on one side always matches the gain booked
/// on the other.
fn back_flux_correction(k: &[f64], i: usize) -> (f64, f64, f64, f64) {
    let k1 = (k[i] / k[i - 1]).min(1.0);
    let k2 = (k[i] / k[i + 1]).min(1.0);
    let k3 = (k[i - 1] / k[i]).min(1.0);
    let k4 = (k[i + 1] / k[i]).min(1.0);
    (k1, k2, k3, k4)
}

/// Area clamps toward the right (`v1`) and left (`v2`) neighbor:
/// `min(1, A_neighbor / A_center)`.
fn area_correction(a: &[f64], i: usize) -> (f64, f64) {
    let v1 = (a[i + 1] / a[i]).min(1.0);
    let v2 = (a[i - 1] / a[i]).min(1.0);
    (v1, v2)
}

/// The Crank–Nicolson mirror of an `I - dt/2·L` right-hand matrix:
/// `diag -> 2 - diag`, off-diagonals negated.
fn mirror_of(rhs: &TriDiagMatrix) -> TriDiagMatrix {
    let n = rhs.size();
    let mut result = rhs.clone();
    for i in 0..n - 1 {
        *result.diag_mut(i) = 2.0 - result.diag(i);
        *result.upper_mut(i) = -result.upper(i);
        *result.lower_mut(i) = -result.lower(i);
    }
    *result.diag_mut(n - 1) = 2.0 - result.diag(n - 1);
    result
}
