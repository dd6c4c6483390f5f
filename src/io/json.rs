//! JSON configuration document.
//!
//! The document has four sections: `sys`, `log`, `PK` and `compartments`
//! (vehicle, sink, layers). Almost everything carries a default; the hard
//! requirements are the vehicle's `c_init`, `h` and `D`, each layer's
//! `name`, `h`, `D` and `K`, and `t_half` whenever a `PK` section is
//! present. The parsed snapshot is range-validated before it is returned.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

use crate::params::{ConfigError, LayerParams, Params, Scaling};
use crate::sim::geometry::DiscMethod;
use crate::sim::matrix::Method;

/// Canonical configuration template written by `--template`.
pub const TEMPLATE: &str = r#"{
    "sys" :
    {
        "disc_scheme" : "BK",
        "mb_method" : "DSkin_1_4",
        "resolution" : 1,
        "max_module" : 50.0,
        "mb_eta" : 0.6,
        "sim_time" : 600
    },

    "log" :
    {
        "file_tag" : "test",
        "mass_file_postfix" : "mass",
        "mass_file_gzip" : false,
        "cdp_file_postfix" : "cdp",
        "cdp_file_gzip" : true,
        "mass_log_interval" : 1,
        "cdp_log_interval" : 1,
        "scaling" : "mg",
        "show_progress" : true,
        "working_dir" : ""
    },

    "PK" :
    {
        "enabled" : true,
        "t_half" : 1.0
    },

    "compartments" :
    {
        "vehicle" :
        {
            "name" : "Donor",
            "finite_dose" : true,
            "c_init" : 1.0,
            "app_area" : 1.0,
            "h" : 30,
            "D" : 1.0,
            "replace_after" : 200,
            "remove_after" : 400,
            "log" : true,
            "log_cdp" : true
        },

        "sink" :
        {
            "name" : "Sink",
            "log" : true,
            "c_init" : 0.0,
            "Vd" : 1.0
        },

        "layers" :
        [
            {
                "name" : "SC",
                "log" : true,
                "log_cdp" : true,
                "c_init" : 0.0,
                "cross_section" : 1.0,
                "h" : 10,
                "D" : 1.0,
                "K" : 1.0
            },

            {
                "name" : "DSL",
                "log" : true,
                "log_cdp" : true,
                "c_init" : 0.0,
                "cross_section" : 1.0,
                "h" : 10,
                "D" : 1.0,
                "K" : 1.0
            }
        ]
    }
}"#;

#[derive(Debug, Deserialize)]
struct ConfigDoc {
    sys: SysSection,
    log: Option<LogSection>,
    #[serde(rename = "PK")]
    pk: Option<PkSection>,
    compartments: CompartmentsSection,
}

#[derive(Debug, Deserialize)]
struct SysSection {
    resolution: Option<u32>,
    sim_time: Option<u32>,
    max_module: Option<f64>,
    mb_eta: Option<f64>,
    disc_scheme: Option<String>,
    mb_method: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LogSection {
    file_tag: Option<String>,
    show_progress: Option<bool>,
    scaling: Option<String>,
    working_dir: Option<String>,
    mass_file_postfix: Option<String>,
    mass_file_gzip: Option<bool>,
    cdp_file_postfix: Option<String>,
    cdp_file_gzip: Option<bool>,
    mass_log_interval: Option<u32>,
    cdp_log_interval: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct PkSection {
    enabled: Option<bool>,
    t_half: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CompartmentsSection {
    vehicle: Option<VehicleSection>,
    sink: Option<SinkSection>,
    layers: Option<Vec<LayerSection>>,
}

#[derive(Debug, Deserialize)]
struct VehicleSection {
    name: Option<String>,
    log: Option<bool>,
    log_cdp: Option<bool>,
    app_area: Option<f64>,
    replace_after: Option<u32>,
    remove_after: Option<u32>,
    finite_dose: Option<bool>,
    c_init: Option<f64>,
    h: Option<u32>,
    #[serde(rename = "D")]
    d: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SinkSection {
    name: Option<String>,
    log: Option<bool>,
    c_init: Option<f64>,
    #[serde(rename = "Vd")]
    vd: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct LayerSection {
    name: Option<String>,
    log: Option<bool>,
    log_cdp: Option<bool>,
    c_init: Option<f64>,
    cross_section: Option<f64>,
    h: Option<u32>,
    #[serde(rename = "D")]
    d: Option<f64>,
    #[serde(rename = "K")]
    k: Option<f64>,
}

/// Parses and validates a configuration file.
pub fn parse_file(path: &Path) -> Result<Params, ConfigError> {
    let file = File::open(path)
        .map_err(|e| ConfigError::Parse(format!("could not open {}: {e}", path.display())))?;
    let doc: ConfigDoc = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| ConfigError::Parse(e.to_string()))?;
    into_params(doc)
}

/// Parses and validates a configuration document from a string.
pub fn parse_str(input: &str) -> Result<Params, ConfigError> {
    let doc: ConfigDoc =
        serde_json::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
    into_params(doc)
}

fn into_params(doc: ConfigDoc) -> Result<Params, ConfigError> {
    let mut params = Params::default();

    let sys = doc.sys;
    params.system.resolution = sys.resolution.unwrap_or(1);
    params.system.sim_time = sys.sim_time.unwrap_or(60);
    params.system.max_module = sys.max_module.unwrap_or(50.0);
    params.system.eta = sys.mb_eta.unwrap_or(0.6);
    params.system.disc_method = match sys.disc_scheme.as_deref() {
        None => DiscMethod::Equidistant,
        Some(s) => DiscMethod::from_str(s)
            .ok_or_else(|| ConfigError::Parse(format!("unknown disc_scheme: {s}")))?,
    };
    params.system.mb_method = match sys.mb_method.as_deref() {
        None => Method::DSkin15,
        Some(s) => Method::from_str(s)
            .ok_or_else(|| ConfigError::Parse(format!("unknown mb_method: {s}")))?,
    };

    if let Some(log) = doc.log {
        params.log.tag = log.file_tag.unwrap_or_else(|| "unknown".to_string());
        params.log.show_progress = log.show_progress.unwrap_or(true);
        params.log.scaling = match log.scaling.as_deref() {
            None => Scaling::Mg,
            Some(s) => Scaling::from_str(s)
                .ok_or_else(|| ConfigError::Parse(format!("unknown scaling: {s}")))?,
        };
        params.log.working_dir = log.working_dir.unwrap_or_default();
        params.log.mass_postfix = log.mass_file_postfix.unwrap_or_else(|| "mass".to_string());
        params.log.gzip_mass = log.mass_file_gzip.unwrap_or(false);
        params.log.cdp_postfix = log.cdp_file_postfix.unwrap_or_else(|| "cdp".to_string());
        params.log.gzip_cdp = log.cdp_file_gzip.unwrap_or(true);
        params.log.mass_interval = log.mass_log_interval.unwrap_or(1);
        params.log.cdp_interval = log.cdp_log_interval.unwrap_or(1);
    }

    if let Some(pk) = doc.pk {
        params.pk.enabled = pk.enabled.unwrap_or(true);
        params.pk.t_half_h = pk
            .t_half
            .ok_or_else(|| ConfigError::Parse("PK section needs a t_half value".into()))?;
    }

    if let Some(sink) = doc.compartments.sink {
        params.sink.name = sink.name.unwrap_or_else(|| "Sink".to_string());
        params.sink.log = sink.log.unwrap_or(true);
        params.sink.c_init = sink.c_init.unwrap_or(0.0);
        params.sink.vd_ml = sink.vd.unwrap_or(1.0);
    }

    if let Some(vehicle) = doc.compartments.vehicle {
        params.vehicle.app_area = vehicle.app_area.unwrap_or(1.0);
        params.vehicle.name = vehicle.name.unwrap_or_else(|| "Vehicle".to_string());
        params.vehicle.log = vehicle.log.unwrap_or(true);
        params.vehicle.log_cdp = vehicle.log_cdp.unwrap_or(false);
        params.vehicle.replace_after = vehicle.replace_after.unwrap_or(0);
        params.vehicle.remove_at = vehicle.remove_after.unwrap_or(0);
        params.vehicle.finite_dose = vehicle.finite_dose.unwrap_or(true);

        let missing =
            || ConfigError::Parse("vehicle section needs values for c_init, h and D".into());
        params.vehicle.c_init = vehicle.c_init.ok_or_else(missing)?;
        params.vehicle.diffusion = vehicle.d.ok_or_else(missing)?;
        params.vehicle.thickness_um = vehicle.h.ok_or_else(missing)?;
    }

    if let Some(layers) = doc.compartments.layers {
        for layer in layers {
            let missing =
                || ConfigError::Parse("layers need values for name, h, D and K".into());
            params.layers.push(LayerParams {
                log: layer.log.unwrap_or(true),
                log_cdp: layer.log_cdp.unwrap_or(false),
                cross_section: layer.cross_section.unwrap_or(1.0),
                c_init: layer.c_init.unwrap_or(0.0),
                name: layer.name.ok_or_else(missing)?,
                thickness_um: layer.h.ok_or_else(missing)?,
                diffusion: layer.d.ok_or_else(missing)?,
                partition: layer.k.ok_or_else(missing)?,
            });
        }
    }

    params.validate()?;
    Ok(params)
}
