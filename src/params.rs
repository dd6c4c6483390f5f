//! Validated parameter snapshot for a simulation run.
//!
//! Parameters are grouped the way the configuration document is: system
//! (discretization and integration knobs), logging, pharmacokinetics, the
//! vehicle, the sink, and the repeated membrane layers. `Params::validate`
//! checks every range rule before any simulation work begins; the numerical
//! core assumes validated inputs and does not re-check in hot paths.

use std::fmt::Write as _;

use thiserror::Error;

use crate::sim::geometry::DiscMethod;
use crate::sim::matrix::Method;

/// Configuration error kinds surfaced to the command line (exit code 1).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Malformed or missing configuration input.
    #[error("configuration parse error: {0}")]
    Parse(String),
    /// Semantic range violation of an otherwise well-formed parameter.
    #[error("invalid parameter: {0}")]
    Validation(String),
}

/// Mass unit used for logged values (base is mg).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scaling {
    #[default]
    Mg,
    Ug,
    Ng,
}

impl Scaling {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scaling::Mg => "mg",
            Scaling::Ug => "ug",
            Scaling::Ng => "ng",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "MG" => Some(Scaling::Mg),
            "UG" => Some(Scaling::Ug),
            "NG" => Some(Scaling::Ng),
            _ => None,
        }
    }

    /// Multiplier applied to logged masses (mg -> unit).
    pub fn factor(&self) -> f64 {
        match self {
            Scaling::Mg => 1.0,
            Scaling::Ug => 1.0e3,
            Scaling::Ng => 1.0e6,
        }
    }
}

/// Discretization and time-integration knobs.
#[derive(Debug, Clone)]
pub struct SystemParams {
    pub disc_method: DiscMethod,
    pub mb_method: Method,
    /// Subdivisions per micrometer (cell width `1/resolution` µm).
    pub resolution: u32,
    /// Largest allowed pre-matrix modulus per sub-step.
    pub max_module: f64,
    /// Requested transition ratio for the refined mesh, in (0, 1].
    pub eta: f64,
    /// Simulated time [min].
    pub sim_time: u32,
}

impl Default for SystemParams {
    fn default() -> Self {
        Self {
            disc_method: DiscMethod::Equidistant,
            mb_method: Method::DSkin13,
            resolution: 1,
            max_module: 50.0,
            eta: 0.6,
            sim_time: 60,
        }
    }
}

impl SystemParams {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.resolution < 1 {
            return Err(ConfigError::Validation("resolution is < 1".into()));
        }
        if self.max_module <= 0.0 {
            return Err(ConfigError::Validation("max_module is <= 0".into()));
        }
        if self.sim_time < 1 {
            return Err(ConfigError::Validation("sim_time is < 1".into()));
        }
        if self.eta <= 0.0 || self.eta > 1.0 {
            return Err(ConfigError::Validation("mb_eta is outside (0, 1]".into()));
        }
        Ok(())
    }

    fn overview(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "System parameters:");
        let _ = writeln!(s, "--------------------------------");
        let _ = writeln!(s, "Discretization method  : {}", self.disc_method.as_str());
        let _ = writeln!(s, "Matrix builder method  : {}", self.mb_method.as_str());
        let _ = writeln!(s, "Sim time     [min]     : {}", self.sim_time);
        let _ = writeln!(s, "Resolution   [1/x um]  : {}", self.resolution);
        let _ = writeln!(s, "Mesh ratio (eta)       : {}", self.eta);
        let _ = writeln!(s, "Max module             : {}", self.max_module);
        s
    }
}

/// Output file and sampling knobs.
#[derive(Debug, Clone)]
pub struct LogParams {
    pub show_progress: bool,
    pub gzip_cdp: bool,
    pub gzip_mass: bool,
    /// Mass sampling interval [min].
    pub mass_interval: u32,
    /// Profile sampling interval [min].
    pub cdp_interval: u32,
    pub mass_postfix: String,
    pub cdp_postfix: String,
    /// File tag prepended to every output file name.
    pub tag: String,
    pub scaling: Scaling,
    pub working_dir: String,
}

impl Default for LogParams {
    fn default() -> Self {
        Self {
            show_progress: true,
            gzip_cdp: true,
            gzip_mass: false,
            mass_interval: 1,
            cdp_interval: 1,
            mass_postfix: "mass".to_string(),
            cdp_postfix: "cdp".to_string(),
            tag: "unknown".to_string(),
            scaling: Scaling::Mg,
            working_dir: String::new(),
        }
    }
}

impl LogParams {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.mass_interval < 1 {
            return Err(ConfigError::Validation("mass_log_interval is < 1".into()));
        }
        if self.cdp_interval < 1 {
            return Err(ConfigError::Validation("cdp_log_interval is < 1".into()));
        }
        if self.mass_postfix.is_empty() {
            return Err(ConfigError::Validation("mass file postfix is empty".into()));
        }
        if self.cdp_postfix.is_empty() {
            return Err(ConfigError::Validation("cdp file postfix is empty".into()));
        }
        if self.tag.is_empty() {
            return Err(ConfigError::Validation("file tag is empty".into()));
        }
        Ok(())
    }

    fn overview(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "Log parameters:");
        let _ = writeln!(s, "--------------------------------");
        let _ = writeln!(s, "File tag               : {}", self.tag);
        let _ = writeln!(s, "Working directory      : {}", self.working_dir);
        let _ = writeln!(s, "Mass logfile postfix   : {}", self.mass_postfix);
        let _ = writeln!(s, "CDP logfile postfix    : {}", self.cdp_postfix);
        let _ = writeln!(s, "Mass logfile gzip      : {}", yes_no(self.gzip_mass));
        let _ = writeln!(s, "CDP logfile gzip       : {}", yes_no(self.gzip_cdp));
        let _ = writeln!(s, "Mass log interv. [min] : {}", self.mass_interval);
        let _ = writeln!(s, "CDP log interv.  [min] : {}", self.cdp_interval);
        let _ = writeln!(s, "Scaling unit           : {}", self.scaling.as_str());
        s
    }
}

/// Pharmacokinetic elimination knobs for the sink.
#[derive(Debug, Clone, Default)]
pub struct PkParams {
    pub enabled: bool,
    /// Elimination half-life [h].
    pub t_half_h: f64,
}

impl PkParams {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.t_half_h <= 0.0 {
            return Err(ConfigError::Validation("PK t_half is <= 0".into()));
        }
        Ok(())
    }

    fn overview(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "PK parameters:");
        let _ = writeln!(s, "--------------------------------");
        let _ = writeln!(s, "Enabled                : {}", yes_no(self.enabled));
        if self.enabled {
            let _ = writeln!(s, "t 1/2       [h]        : {}", self.t_half_h);
        }
        s
    }
}

/// Terminal sink compartment knobs.
#[derive(Debug, Clone)]
pub struct SinkParams {
    pub log: bool,
    pub name: String,
    /// Distribution volume [ml].
    pub vd_ml: f64,
    /// Initial concentration [mg/ml].
    pub c_init: f64,
}

impl Default for SinkParams {
    fn default() -> Self {
        Self {
            log: true,
            name: "Sink".to_string(),
            vd_ml: 1.0,
            c_init: 0.0,
        }
    }
}

impl SinkParams {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Validation("sink name is empty".into()));
        }
        if self.vd_ml <= 0.0 {
            return Err(ConfigError::Validation("sink Vd is <= 0".into()));
        }
        if self.c_init < 0.0 {
            return Err(ConfigError::Validation("sink c_init is < 0".into()));
        }
        Ok(())
    }

    fn overview(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "Sink parameters:");
        let _ = writeln!(s, "--------------------------------");
        let _ = writeln!(s, "Name                   : {}", self.name);
        let _ = writeln!(s, "Vd          [ml]       : {}", self.vd_ml);
        let _ = writeln!(s, "C init      [mg/ml]    : {}", self.c_init);
        let _ = writeln!(s, "Log compartment        : {}", yes_no(self.log));
        s
    }
}

/// Vehicle (donor) compartment knobs.
#[derive(Debug, Clone)]
pub struct VehicleParams {
    pub log: bool,
    pub log_cdp: bool,
    pub name: String,
    /// Initial concentration [mg/ml].
    pub c_init: f64,
    /// Application area [cm²].
    pub app_area: f64,
    /// Diffusion coefficient [µm²/min].
    pub diffusion: f64,
    /// Thickness [µm].
    pub thickness_um: u32,
    /// Refill period [min]; 0 disables.
    pub replace_after: u32,
    /// Removal time [min]; 0 disables.
    pub remove_at: u32,
    pub finite_dose: bool,
}

impl Default for VehicleParams {
    fn default() -> Self {
        Self {
            log: true,
            log_cdp: false,
            name: "Vehicle".to_string(),
            c_init: 1.0,
            app_area: 1.0,
            diffusion: 1.0,
            thickness_um: 10,
            replace_after: 0,
            remove_at: 0,
            finite_dose: true,
        }
    }
}

impl VehicleParams {
    pub fn replace(&self) -> bool {
        self.replace_after > 0
    }

    pub fn remove(&self) -> bool {
        self.remove_at > 0
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Validation("vehicle name is empty".into()));
        }
        if self.c_init < 0.0 {
            return Err(ConfigError::Validation("vehicle c_init is < 0".into()));
        }
        if self.app_area <= 0.0 {
            return Err(ConfigError::Validation("vehicle app_area is <= 0".into()));
        }
        if self.diffusion < 0.0 {
            return Err(ConfigError::Validation("vehicle D is < 0".into()));
        }
        if self.thickness_um <= 2 {
            return Err(ConfigError::Validation("vehicle h is <= 2".into()));
        }
        Ok(())
    }

    fn overview(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "Vehicle parameters:");
        let _ = writeln!(s, "--------------------------------");
        let _ = writeln!(s, "Name                   : {}", self.name);
        let _ = writeln!(s, "Log mass               : {}", yes_no(self.log));
        let _ = writeln!(s, "Log CDP                : {}", yes_no(self.log_cdp));
        let _ = writeln!(s, "C init      [mg/ml]    : {}", self.c_init);
        let _ = writeln!(s, "App area    [cm^2]     : {}", self.app_area);
        let _ = writeln!(s, "h           [um]       : {}", self.thickness_um);
        let _ = writeln!(s, "D           [um^2/min] : {}", self.diffusion);
        let _ = writeln!(s, "Remove vehicle         : {}", yes_no(self.remove()));
        if self.remove() {
            let _ = writeln!(s, "Remove at   [min]      : {}", self.remove_at);
        }
        let _ = writeln!(s, "Replace vehicle        : {}", yes_no(self.replace()));
        if self.replace() {
            let _ = writeln!(s, "Repl. after [min]      : {}", self.replace_after);
        }
        let _ = writeln!(s, "Finite dose            : {}", yes_no(self.finite_dose));
        s
    }
}

/// Membrane layer knobs (repeated, ordered top to bottom).
#[derive(Debug, Clone)]
pub struct LayerParams {
    pub log: bool,
    pub log_cdp: bool,
    pub name: String,
    /// Initial concentration [mg/ml].
    pub c_init: f64,
    /// Diffusion coefficient [µm²/min].
    pub diffusion: f64,
    /// Partition coefficient relative to the vehicle.
    pub partition: f64,
    /// Effective cross section in (0, 1] of the application area.
    pub cross_section: f64,
    /// Thickness [µm].
    pub thickness_um: u32,
}

impl Default for LayerParams {
    fn default() -> Self {
        Self {
            log: true,
            log_cdp: false,
            name: String::new(),
            c_init: 0.0,
            diffusion: 1.0,
            partition: 1.0,
            cross_section: 1.0,
            thickness_um: 10,
        }
    }
}

impl LayerParams {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Validation("layer name is empty".into()));
        }
        if self.c_init < 0.0 {
            return Err(ConfigError::Validation("layer c_init is < 0".into()));
        }
        if self.diffusion < 0.0 {
            return Err(ConfigError::Validation("layer D is < 0".into()));
        }
        if self.partition <= 0.0 {
            return Err(ConfigError::Validation("layer K is <= 0".into()));
        }
        if self.cross_section <= 0.0 || self.cross_section > 1.0 {
            return Err(ConfigError::Validation(
                "layer cross_section is outside (0, 1]".into(),
            ));
        }
        if self.thickness_um <= 2 {
            return Err(ConfigError::Validation("layer h is <= 2".into()));
        }
        Ok(())
    }

    fn overview(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "Layer parameters:");
        let _ = writeln!(s, "--------------------------------");
        let _ = writeln!(s, "Name                   : {}", self.name);
        let _ = writeln!(s, "Log mass               : {}", yes_no(self.log));
        let _ = writeln!(s, "Log CDP                : {}", yes_no(self.log_cdp));
        let _ = writeln!(s, "C init      [mg/ml]    : {}", self.c_init);
        let _ = writeln!(s, "h           [um]       : {}", self.thickness_um);
        let _ = writeln!(s, "D           [um^2/min] : {}", self.diffusion);
        let _ = writeln!(s, "K layer/vehicle        : {}", self.partition);
        let _ = writeln!(s, "Cross section [%]      : {}", self.cross_section * 100.0);
        s
    }
}

/// The complete, immutable parameter snapshot of a run.
#[derive(Debug, Clone, Default)]
pub struct Params {
    pub system: SystemParams,
    pub log: LogParams,
    pub pk: PkParams,
    pub sink: SinkParams,
    pub vehicle: VehicleParams,
    pub layers: Vec<LayerParams>,
}

impl Params {
    /// Checks every semantic range rule, including the cross-section rules
    /// that span parameter groups. Returns the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.system.validate()?;
        self.log.validate()?;
        self.pk.validate()?;
        self.sink.validate()?;
        self.vehicle.validate()?;
        for layer in &self.layers {
            layer.validate()?;
        }

        if self.vehicle.remove() && self.layers.is_empty() {
            return Err(ConfigError::Validation(
                "cannot remove the vehicle when no layer is defined".into(),
            ));
        }
        if self.system.mb_method == Method::DSkin13 && !self.vehicle.finite_dose {
            return Err(ConfigError::Validation(
                "the central-node scheme (DSkin_1_3) requires a finite-dose vehicle".into(),
            ));
        }
        Ok(())
    }

    /// Human-readable multi-section summary, printed before a run.
    pub fn overview(&self) -> String {
        let mut s = self.system.overview();
        s.push('\n');
        s.push_str(&self.log.overview());
        s.push('\n');
        s.push_str(&self.pk.overview());
        s.push('\n');
        s.push_str(&self.vehicle.overview());
        s.push('\n');
        s.push_str(&self.sink.overview());
        for layer in &self.layers {
            s.push('\n');
            s.push_str(&layer.overview());
        }
        s
    }
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}
