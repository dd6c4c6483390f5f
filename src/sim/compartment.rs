//! Passive parameter records for the stacked diffusion domain.
//!
//! A [`Compartment`] is a contiguous slab with uniform diffusion, partition
//! and cross-sectional area; the [`Sink`] is the single terminal cell below
//! the deepest layer. Cell ranges are assigned by
//! [`crate::sim::geometry::Geometry`] during mesh construction.

/// A single material slab of the stack (vehicle or membrane layer).
#[derive(Debug, Clone)]
pub struct Compartment {
    pub name: String,
    /// Thickness in whole micrometers.
    pub thickness_um: u32,
    /// Diffusion coefficient [µm²/min].
    pub diffusion: f64,
    /// Partition coefficient relative to the vehicle.
    pub partition: f64,
    /// Cross-sectional area [µm²].
    pub area: f64,
    /// Initial concentration [mg/µm³].
    pub c_init: f64,
    /// Finite-dose flag; only meaningful on the vehicle (first compartment).
    pub finite_dose: bool,
    cell_from: usize,
    cell_to: usize,
}

impl Compartment {
    pub fn new(name: &str, thickness_um: u32, diffusion: f64, partition: f64, area: f64) -> Self {
        Self {
            name: name.to_string(),
            thickness_um,
            diffusion,
            partition,
            area,
            c_init: 0.0,
            finite_dose: true,
            cell_from: 0,
            cell_to: 0,
        }
    }

    /// Inclusive cell range in the global concentration vector.
    pub fn cell_range(&self) -> (usize, usize) {
        (self.cell_from, self.cell_to)
    }

    pub fn cell_from(&self) -> usize {
        self.cell_from
    }

    pub fn cell_to(&self) -> usize {
        self.cell_to
    }

    /// Number of mesh cells assigned to this compartment.
    pub fn cell_count(&self) -> usize {
        self.cell_to - self.cell_from + 1
    }

    pub fn set_cell_range(&mut self, from: usize, to: usize) {
        debug_assert!(from <= to);
        self.cell_from = from;
        self.cell_to = to;
    }

    /// Shifts the assigned range down by `count` cells (after an upstream
    /// compartment was removed).
    pub fn shift_cells_down(&mut self, count: usize) {
        debug_assert!(self.cell_from >= count);
        self.cell_from -= count;
        self.cell_to -= count;
    }
}

/// Kind of terminal compartment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    /// Infinite drain; accumulated mass never decays.
    PerfectSink,
    /// Pharmacokinetic elimination compartment with first-order decay.
    PkCompartment,
}

/// The terminal single-cell compartment below the deepest layer.
#[derive(Debug, Clone)]
pub struct Sink {
    pub name: String,
    pub kind: SinkKind,
    /// Cross-sectional area [µm²].
    pub area: f64,
    /// Distribution volume [ml].
    pub vd_ml: f64,
    /// Elimination half-life [min].
    pub t_half_min: f64,
    /// Initial concentration [mg/µm³].
    pub c_init: f64,
    cell: usize,
}

impl Sink {
    pub fn new(name: &str, kind: SinkKind, area: f64, vd_ml: f64, t_half_min: f64) -> Self {
        Self {
            name: name.to_string(),
            kind,
            area,
            vd_ml,
            t_half_min,
            c_init: 0.0,
            cell: 0,
        }
    }

    /// First-order elimination rate [1/min], derived from the half-life.
    pub fn k_el(&self) -> f64 {
        std::f64::consts::LN_2 / self.t_half_min
    }

    /// Index of the sink cell; always the last cell of the geometry.
    pub fn cell(&self) -> usize {
        self.cell
    }

    pub fn set_cell(&mut self, cell: usize) {
        self.cell = cell;
    }

    pub fn shift_cell_down(&mut self, count: usize) {
        debug_assert!(self.cell >= count);
        self.cell -= count;
    }
}
