//! Time-series loggers for integrated mass and concentration profiles.
//!
//! A [`MassLog`] records one scalar per sample (integrated compartment mass
//! or sink concentration); a [`ProfileLog`] records the bound compartment's
//! concentration slice together with the cell positions. Loggers reference
//! compartments by index into the engine's compartment list, never by
//! pointer, so the engine stays the single owner and can rewire bindings
//! when the vehicle is removed.
//!
//! Files are tab-separated with value-exact float formatting and can be
//! gzip-compressed.

use std::fs::File;
use std::io::{BufWriter, Write};

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::sim::compartment::{Compartment, Sink};
use crate::sim::geometry::Geometry;
use crate::sim::matrix::Method;

/// What a mass logger is attached to. Binding to one target clears the
/// other; both transitions are idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MassLogBinding {
    #[default]
    Unbound,
    Sink,
    /// Index into the engine's compartment list.
    Compartment(usize),
}

/// Two-column (time, mass) series for one compartment or the sink.
#[derive(Debug, Clone)]
pub struct MassLog {
    name: String,
    filename: String,
    col_sep: String,
    column1: String,
    column2: String,
    binding: MassLogBinding,
    auto_log: bool,
    enabled: bool,
    zip: bool,
    interval: u32,
    time_hint: u32,
    /// Application area [µm²]; the effective sampling area under the
    /// area-merged matrix scheme.
    app_area: f64,
    method: Method,
    times: Vec<f64>,
    values: Vec<f64>,
}

impl MassLog {
    pub fn new(method: Method, app_area: f64) -> Self {
        Self {
            name: String::new(),
            filename: "logger.dat".to_string(),
            col_sep: "\t".to_string(),
            column1: "time".to_string(),
            column2: "mass".to_string(),
            binding: MassLogBinding::Unbound,
            auto_log: true,
            enabled: true,
            zip: false,
            interval: 1,
            time_hint: 0,
            app_area,
            method,
            times: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn set_filename(&mut self, filename: &str) {
        self.filename = filename.to_string();
    }

    pub fn set_column2_name(&mut self, name: &str) {
        self.column2 = name.to_string();
    }

    pub fn binding(&self) -> MassLogBinding {
        self.binding
    }

    pub fn bind_sink(&mut self) {
        self.binding = MassLogBinding::Sink;
    }

    pub fn bind_compartment(&mut self, index: usize) {
        self.binding = MassLogBinding::Compartment(index);
    }

    pub fn unbind(&mut self) {
        self.binding = MassLogBinding::Unbound;
    }

    /// Whether `sample` records anything at matching times.
    pub fn auto_log(&self) -> bool {
        self.auto_log
    }

    pub fn set_auto_log(&mut self, value: bool) {
        self.auto_log = value;
    }

    /// Whether the series is written to its file at the end of a run.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn zip(&self) -> bool {
        self.zip
    }

    pub fn set_zip(&mut self, zip: bool) {
        self.zip = zip;
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    /// Sampling interval in minutes.
    pub fn set_interval(&mut self, interval: u32) {
        debug_assert!(interval >= 1);
        let old = self.interval;
        self.interval = interval;
        if interval < old {
            self.reserve();
        }
    }

    /// Expected simulation length in minutes; pre-allocates the series.
    pub fn set_time_hint(&mut self, time_hint: u32) {
        debug_assert!(time_hint > 0);
        let old = self.time_hint;
        self.time_hint = time_hint;
        if time_hint > old {
            self.reserve();
        }
    }

    fn reserve(&mut self) {
        // The first entry is always logged at time 0.
        let cap = 1 + (self.time_hint / self.interval) as usize;
        self.times.reserve(cap);
        self.values.reserve(cap);
    }

    /// Appends a raw (time, value) pair, bypassing interval gating.
    pub fn record(&mut self, time: f64, value: f64) {
        self.times.push(time);
        self.values.push(value);
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Samples the bound target at whole-minute `time` if it falls on the
    /// logging interval.
    ///
    /// Sink samples store `c·dx·A_eff·scale / Vd`; compartment samples
    /// integrate `c·dx` over the cell range and scale by the effective
    /// area. Under the area-merged scheme the effective area is the
    /// application area, otherwise the bound object's own.
    pub fn sample(
        &mut self,
        time: f64,
        geometry: &Geometry,
        concentrations: &[f64],
        scale: f64,
        compartments: &[Compartment],
        sink: &Sink,
    ) {
        if !self.auto_log || (time as i64) % self.interval as i64 != 0 {
            return;
        }

        match self.binding {
            MassLogBinding::Sink => {
                let area = if self.method == Method::DSkin15 {
                    self.app_area
                } else {
                    sink.area
                };
                let idx = sink.cell();
                let mass =
                    concentrations[idx] * geometry.space_steps()[idx] * area * scale / sink.vd_ml;
                self.record(time, mass);
            }
            MassLogBinding::Compartment(index) => {
                let comp = &compartments[index];
                let area = if self.method == Method::DSkin15 {
                    self.app_area
                } else {
                    comp.area
                };
                let mut mass = 0.0;
                for i in comp.cell_from()..=comp.cell_to() {
                    mass += concentrations[i] * geometry.space_steps()[i];
                }
                self.record(time, mass * scale * area);
            }
            MassLogBinding::Unbound => {
                self.record(time, 0.0);
            }
        }
    }

    /// Writes the series to the configured file, gzip-compressed when the
    /// zip flag is set (with a `.gz` suffix appended).
    pub fn write_to_file(&self) -> Result<()> {
        if self.zip {
            let path = format!("{}.gz", self.filename);
            let file =
                File::create(&path).with_context(|| format!("failed to create {path}"))?;
            let mut writer = BufWriter::new(GzEncoder::new(file, Compression::default()));
            self.write_table(&mut writer)?;
            writer
                .into_inner()
                .map_err(|e| anyhow::anyhow!("failed to flush {path}: {e}"))?
                .finish()
                .with_context(|| format!("failed to finish gzip stream {path}"))?;
        } else {
            let file = File::create(&self.filename)
                .with_context(|| format!("failed to create {}", self.filename))?;
            let mut writer = BufWriter::new(file);
            self.write_table(&mut writer)?;
        }
        Ok(())
    }

    fn write_table<W: Write>(&self, out: &mut W) -> Result<()> {
        let sep = &self.col_sep;
        writeln!(out, "{}{sep}{}", self.column1, self.column2)?;
        for (t, v) in self.times.iter().zip(&self.values) {
            writeln!(out, "{t}{sep}{v}")?;
        }
        Ok(())
    }
}

/// Where a profile sample's x position sits within its cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodePosition {
    /// Left cell edge.
    Left,
    /// Cell midpoint.
    Center,
    /// Right cell edge.
    Right,
}

impl NodePosition {
    /// Node placement implied by the matrix scheme. All current schemes
    /// sample cell centers.
    pub fn from_method(method: Method) -> Self {
        match method {
            Method::DSkin13 | Method::DSkin14 | Method::DSkin15 => NodePosition::Center,
        }
    }
}

/// (time, concentration-vector) series over one compartment's cell range.
#[derive(Debug, Clone)]
pub struct ProfileLog {
    name: String,
    filename: String,
    col_sep: String,
    position: NodePosition,
    /// Index into the engine's compartment list.
    binding: Option<usize>,
    auto_log: bool,
    enabled: bool,
    zip: bool,
    interval: u32,
    time_hint: u32,
    step_sizes: Vec<f64>,
    times: Vec<f64>,
    data: Vec<Vec<f64>>,
}

impl Default for ProfileLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileLog {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            filename: "unknown.dat".to_string(),
            col_sep: "\t".to_string(),
            position: NodePosition::Left,
            binding: None,
            auto_log: true,
            enabled: false,
            zip: true,
            interval: 1,
            time_hint: 0,
            step_sizes: Vec::new(),
            times: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn set_filename(&mut self, filename: &str) {
        self.filename = filename.to_string();
    }

    pub fn position(&self) -> NodePosition {
        self.position
    }

    pub fn set_position(&mut self, position: NodePosition) {
        self.position = position;
    }

    pub fn binding(&self) -> Option<usize> {
        self.binding
    }

    pub fn bind_compartment(&mut self, index: usize) {
        self.binding = Some(index);
    }

    pub fn unbind(&mut self) {
        self.binding = None;
    }

    pub fn auto_log(&self) -> bool {
        self.auto_log
    }

    pub fn set_auto_log(&mut self, value: bool) {
        self.auto_log = value;
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn zip(&self) -> bool {
        self.zip
    }

    pub fn set_zip(&mut self, zip: bool) {
        self.zip = zip;
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    pub fn set_interval(&mut self, interval: u32) {
        debug_assert!(interval >= 1);
        let old = self.interval;
        self.interval = interval;
        if interval < old {
            self.reserve();
        }
    }

    pub fn set_time_hint(&mut self, time_hint: u32) {
        debug_assert!(time_hint > 0);
        let old = self.time_hint;
        self.time_hint = time_hint;
        if time_hint > old {
            self.reserve();
        }
    }

    fn reserve(&mut self) {
        let cap = 1 + (self.time_hint / self.interval) as usize;
        self.times.reserve(cap);
        self.data.reserve(cap);
    }

    /// The reference space steps of the bound cell range.
    pub fn set_step_sizes(&mut self, steps: &[f64]) {
        self.step_sizes = steps.to_vec();
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn data(&self) -> &[Vec<f64>] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Sample x positions derived from the step sizes and the node
    /// placement policy.
    pub fn positions(&self) -> Vec<f64> {
        let mut result = Vec::with_capacity(self.step_sizes.len());
        let mut x = 0.0;
        for &step in &self.step_sizes {
            let (pre, post) = match self.position {
                NodePosition::Left => (0.0, step),
                NodePosition::Center => (step / 2.0, step / 2.0),
                NodePosition::Right => (step, 0.0),
            };
            x += pre;
            result.push(x);
            x += post;
        }
        result
    }

    /// Appends a raw sample, bypassing interval gating.
    pub fn record(&mut self, time: f64, values: Vec<f64>) {
        self.times.push(time);
        self.data.push(values);
    }

    /// Copies the bound compartment's concentration slice, scaled, if
    /// `time` falls on the logging interval.
    pub fn sample(
        &mut self,
        time: f64,
        concentrations: &[f64],
        scale: f64,
        compartments: &[Compartment],
    ) {
        if !self.auto_log || (time as i64) % self.interval as i64 != 0 {
            return;
        }

        let mut values = vec![0.0; self.step_sizes.len()];
        if let Some(index) = self.binding {
            let comp = &compartments[index];
            let from = comp.cell_from();
            let to = comp.cell_to();
            debug_assert_eq!(values.len(), to - from + 1);
            for (slot, &c) in values.iter_mut().zip(&concentrations[from..=to]) {
                *slot = c * scale;
            }
        }
        self.record(time, values);
    }

    pub fn write_to_file(&self) -> Result<()> {
        if self.zip {
            let path = format!("{}.gz", self.filename);
            let file =
                File::create(&path).with_context(|| format!("failed to create {path}"))?;
            let mut writer = BufWriter::new(GzEncoder::new(file, Compression::default()));
            self.write_table(&mut writer)?;
            writer
                .into_inner()
                .map_err(|e| anyhow::anyhow!("failed to flush {path}: {e}"))?
                .finish()
                .with_context(|| format!("failed to finish gzip stream {path}"))?;
        } else {
            let file = File::create(&self.filename)
                .with_context(|| format!("failed to create {}", self.filename))?;
            let mut writer = BufWriter::new(file);
            self.write_table(&mut writer)?;
        }
        Ok(())
    }

    /// Row 0 is `0 <sep> x_1 <sep> x_2 ...`; every following row is
    /// `time <sep> c_1 <sep> c_2 ...`.
    fn write_table<W: Write>(&self, out: &mut W) -> Result<()> {
        let sep = &self.col_sep;
        write!(out, "0")?;
        for x in self.positions() {
            write!(out, "{sep}{x}")?;
        }
        writeln!(out)?;

        for (t, row) in self.times.iter().zip(&self.data) {
            write!(out, "{t}")?;
            for v in row {
                write!(out, "{sep}{v}")?;
            }
            writeln!(out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::compartment::SinkKind;
    use crate::sim::geometry::DiscMethod;
    use approx::assert_relative_eq;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn setup() -> (Vec<Compartment>, Sink, Geometry, Vec<f64>) {
        let mut comps = vec![
            Compartment::new("Donor", 10, 1.0, 1.0, 1.0e8),
            Compartment::new("SC", 10, 1.0, 1.0, 1.0e8),
        ];
        let mut sink = Sink::new("Sink", SinkKind::PerfectSink, 1.0e8, 2.0, 1.0);
        let mut geo = Geometry::new();
        geo.create(DiscMethod::Equidistant, &mut comps, 1, Some(&mut sink));
        let mut conc = vec![0.0; geo.size()];
        for c in conc.iter_mut().take(10) {
            *c = 1.0e-12;
        }
        conc[20] = 3.0e-12;
        (comps, sink, geo, conc)
    }

    #[test]
    fn test_binding_transitions_are_exclusive() {
        let mut log = MassLog::new(Method::DSkin15, 1.0e8);
        assert_eq!(log.binding(), MassLogBinding::Unbound);

        log.bind_compartment(1);
        assert_eq!(log.binding(), MassLogBinding::Compartment(1));

        log.bind_sink();
        assert_eq!(log.binding(), MassLogBinding::Sink);

        log.bind_compartment(0);
        assert_eq!(log.binding(), MassLogBinding::Compartment(0));

        log.unbind();
        assert_eq!(log.binding(), MassLogBinding::Unbound);
    }

    #[test]
    fn test_compartment_mass_sample() {
        let (comps, sink, geo, conc) = setup();
        let mut log = MassLog::new(Method::DSkin15, 1.0e8);
        log.bind_compartment(0);
        log.sample(0.0, &geo, &conc, 1.0, &comps, &sink);

        // 10 cells of 1 µm at 1e-12 mg/µm³ over 1e8 µm².
        assert_eq!(log.len(), 1);
        assert_relative_eq!(log.values()[0], 10.0 * 1.0e-12 * 1.0e8, max_relative = 1e-12);
    }

    #[test]
    fn test_sink_sample_divides_by_distribution_volume() {
        let (comps, sink, geo, conc) = setup();
        let mut log = MassLog::new(Method::DSkin15, 1.0e8);
        log.bind_sink();
        log.sample(0.0, &geo, &conc, 1.0, &comps, &sink);

        // c·dx·A_eff/Vd with Vd = 2 ml.
        assert_relative_eq!(
            log.values()[0],
            3.0e-12 * 1.0 * 1.0e8 / 2.0,
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_effective_area_depends_on_method() {
        let (mut comps, sink, geo, conc) = setup();
        comps[0].area = 0.5e8;

        let mut merged = MassLog::new(Method::DSkin15, 1.0e8);
        merged.bind_compartment(0);
        merged.sample(0.0, &geo, &conc, 1.0, &comps, &sink);

        let mut plain = MassLog::new(Method::DSkin14, 1.0e8);
        plain.bind_compartment(0);
        plain.sample(0.0, &geo, &conc, 1.0, &comps, &sink);

        // The area-merged scheme samples over the application area, the
        // others over the compartment's own.
        assert_relative_eq!(merged.values()[0], 1.0e-3, max_relative = 1e-12);
        assert_relative_eq!(plain.values()[0], 0.5e-3, max_relative = 1e-12);
    }

    #[test]
    fn test_interval_gating() {
        let (comps, sink, geo, conc) = setup();
        let mut log = MassLog::new(Method::DSkin15, 1.0e8);
        log.bind_compartment(0);
        log.set_interval(7);

        for t in 0..=60 {
            log.sample(t as f64, &geo, &conc, 1.0, &comps, &sink);
        }
        // Samples at 0, 7, 14, .., 56.
        assert_eq!(log.len(), 1 + 60 / 7);
    }

    #[test]
    fn test_auto_log_off_suppresses_samples() {
        let (comps, sink, geo, conc) = setup();
        let mut log = MassLog::new(Method::DSkin15, 1.0e8);
        log.bind_compartment(0);
        log.set_auto_log(false);
        log.sample(0.0, &geo, &conc, 1.0, &comps, &sink);
        assert!(log.is_empty());
    }

    #[test]
    fn test_mass_file_output() {
        let (comps, sink, geo, conc) = setup();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("donor_mass.dat");

        let mut log = MassLog::new(Method::DSkin15, 1.0e8);
        log.bind_compartment(0);
        log.set_filename(path.to_str().unwrap());
        log.sample(0.0, &geo, &conc, 1.0, &comps, &sink);
        log.sample(1.0, &geo, &conc, 1.0, &comps, &sink);
        log.write_to_file().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("time\tmass"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("0\t"));
    }

    #[test]
    fn test_mass_file_gzip_roundtrip() {
        let (comps, sink, geo, conc) = setup();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("donor_mass.dat");

        let mut log = MassLog::new(Method::DSkin15, 1.0e8);
        log.bind_compartment(0);
        log.set_filename(path.to_str().unwrap());
        log.set_zip(true);
        log.sample(0.0, &geo, &conc, 1.0, &comps, &sink);
        log.write_to_file().unwrap();

        let gz_path = dir.path().join("donor_mass.dat.gz");
        let mut decoder = GzDecoder::new(File::open(gz_path).unwrap());
        let mut content = String::new();
        decoder.read_to_string(&mut content).unwrap();
        assert!(content.starts_with("time\tmass"));
    }

    #[test]
    fn test_profile_positions_policies() {
        let mut log = ProfileLog::new();
        log.set_step_sizes(&[1.0, 2.0, 3.0]);

        log.set_position(NodePosition::Left);
        assert_eq!(log.positions(), vec![0.0, 1.0, 3.0]);

        log.set_position(NodePosition::Center);
        assert_eq!(log.positions(), vec![0.5, 2.0, 4.5]);

        log.set_position(NodePosition::Right);
        assert_eq!(log.positions(), vec![1.0, 3.0, 6.0]);
    }

    #[test]
    fn test_profile_sample_copies_range() {
        let (comps, _, geo, conc) = setup();
        let mut log = ProfileLog::new();
        log.bind_compartment(1);
        let (from, to) = comps[1].cell_range();
        log.set_step_sizes(&geo.space_steps()[from..=to]);

        log.sample(0.0, &conc, 1.0e12, &comps);
        assert_eq!(log.len(), 1);
        assert_eq!(log.data()[0].len(), 10);
        // Second compartment starts empty in the fixture.
        assert!(log.data()[0].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_profile_file_layout() {
        let (comps, _, geo, conc) = setup();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("donor_cdp.dat");

        let mut log = ProfileLog::new();
        log.bind_compartment(0);
        log.set_position(NodePosition::Center);
        log.set_zip(false);
        let (from, to) = comps[0].cell_range();
        log.set_step_sizes(&geo.space_steps()[from..=to]);
        log.set_filename(path.to_str().unwrap());

        log.sample(0.0, &conc, 1.0e12, &comps);
        log.write_to_file().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        let header: Vec<&str> = lines.next().unwrap().split('\t').collect();
        assert_eq!(header[0], "0");
        assert_eq!(header.len(), 11);
        assert_eq!(header[1], "0.5");

        let row: Vec<&str> = lines.next().unwrap().split('\t').collect();
        assert_eq!(row[0], "0");
        assert_eq!(row.len(), 11);
        assert_eq!(row[1], "1");
    }
}
