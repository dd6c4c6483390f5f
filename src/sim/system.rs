//! The simulation engine.
//!
//! A [`System`] owns everything a run needs: the compartment stack, the
//! sink, the geometry, the Crank–Nicolson matrix pair, the concentration
//! vector and the loggers. Construction performs the full unit-converted
//! setup from a validated [`Params`] snapshot; [`System::run`] advances the
//! outer minute loop with the inner sub-step integration, handles the dose
//! events (vehicle replacement and removal) and samples the loggers.
//!
//! Host integration goes through the [`RunHooks`] capability set: progress
//! reporting and cooperative cancellation are the only yield points of a
//! run, both at the start of each simulated minute.

use anyhow::{ensure, Context, Result};

use crate::num::solve_thomas_cached;
use crate::params::Params;
use crate::sim::compartment::{Compartment, Sink, SinkKind};
use crate::sim::geometry::Geometry;
use crate::sim::logger::{MassLog, NodePosition, ProfileLog};
use crate::sim::matrix::{MatrixBuilder, Method};

/// Outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The full simulated time was integrated.
    Executed,
    /// A host hook rejected the session.
    Failed,
    /// Cancelled cooperatively; all minutes logged so far are valid.
    Stopped,
}

/// Host capability set for a run. All hooks default to no-ops.
pub trait RunHooks {
    /// Called once before the first minute; returning `false` fails the run.
    fn init_run(&mut self) -> bool {
        true
    }

    /// Called once after the last minute; returning `false` fails the run.
    fn tear_down_run(&mut self) -> bool {
        true
    }

    /// Called at the start of every simulated minute.
    fn progress(&mut self, _minute: u32) {}

    /// Cancellation poll; returning `true` stops the run after the minutes
    /// already logged.
    fn should_stop(&mut self, _minute: u32) -> bool {
        false
    }
}

/// Headless default: no progress, never stops.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl RunHooks for NoHooks {}

/// Owns the simulation state for one parameter snapshot.
pub struct System {
    compartments: Vec<Compartment>,
    sink: Sink,
    geometry: Geometry,
    builder: MatrixBuilder,
    concentrations: Vec<f64>,
    sink_log: MassLog,
    mass_logs: Vec<MassLog>,
    profile_logs: Vec<ProfileLog>,
    sim_time: u32,
    replace_after: u32,
    remove_at: u32,
    /// Logged-mass multiplier derived from the mass unit (mg base).
    scale: f64,
}

impl System {
    /// Builds the complete simulation state from a validated parameter
    /// snapshot.
    ///
    /// Construction order matters: compartments, sink, geometry, matrices,
    /// concentrations, loggers. Unit conversions happen here — application
    /// area cm² -> µm², initial concentrations mg/ml -> mg/µm³, half-life
    /// hours -> minutes.
    pub fn new(params: &Params) -> Result<Self> {
        let scale = params.log.scaling.factor();

        // Application area in µm².
        let app_area = params.vehicle.app_area * 1.0e8;

        let mut compartments = Vec::with_capacity(1 + params.layers.len());
        let mut donor = Compartment::new(
            &params.vehicle.name,
            params.vehicle.thickness_um,
            params.vehicle.diffusion,
            1.0,
            app_area,
        );
        donor.c_init = params.vehicle.c_init * 1.0e-12;
        donor.finite_dose = params.vehicle.finite_dose;
        compartments.push(donor);

        for layer in &params.layers {
            let mut comp = Compartment::new(
                &layer.name,
                layer.thickness_um,
                layer.diffusion,
                layer.partition,
                app_area * layer.cross_section,
            );
            comp.c_init = layer.c_init * 1.0e-12;
            compartments.push(comp);
        }

        let sink_kind = if params.pk.enabled {
            SinkKind::PkCompartment
        } else {
            SinkKind::PerfectSink
        };
        let sink_area = app_area
            * params
                .layers
                .last()
                .map(|l| l.cross_section)
                .unwrap_or(1.0);
        let t_half_min = params.pk.t_half_h * 60.0;
        let mut sink = Sink::new(
            &params.sink.name,
            sink_kind,
            sink_area,
            params.sink.vd_ml,
            if t_half_min > 0.0 { t_half_min } else { 1.0 },
        );
        sink.c_init = params.sink.c_init * 1.0e-12;

        let mut geometry = Geometry::new();
        geometry.set_eta(params.system.eta);
        let ok = geometry.create(
            params.system.disc_method,
            &mut compartments,
            params.system.resolution,
            Some(&mut sink),
        );
        ensure!(ok, "geometry construction produced no cells");

        let mut builder = MatrixBuilder::new(params.system.mb_method);
        builder.set_max_module(params.system.max_module);
        builder
            .build(&compartments, &geometry, Some(&sink))
            .context("matrix assembly failed")?;

        let concentrations = initial_concentrations(&geometry, &compartments, &sink);

        log::info!(
            "system initialized: {} cells, {} sub-steps/min, method {}",
            geometry.size(),
            builder.timesteps(),
            params.system.mb_method.as_str()
        );

        let (sink_log, mass_logs, profile_logs) = build_loggers(
            params,
            &compartments,
            &sink,
            &geometry,
            app_area,
            params.system.mb_method,
        );

        Ok(Self {
            compartments,
            sink,
            geometry,
            builder,
            concentrations,
            sink_log,
            mass_logs,
            profile_logs,
            sim_time: params.system.sim_time,
            replace_after: params.vehicle.replace_after,
            remove_at: params.vehicle.remove_at,
            scale,
        })
    }

    pub fn compartments(&self) -> &[Compartment] {
        &self.compartments
    }

    pub fn sink(&self) -> &Sink {
        &self.sink
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn concentrations(&self) -> &[f64] {
        &self.concentrations
    }

    /// Sub-steps integrated per simulated minute.
    pub fn timesteps(&self) -> u32 {
        self.builder.timesteps()
    }

    pub fn sim_time(&self) -> u32 {
        self.sim_time
    }

    pub fn sink_log(&self) -> &MassLog {
        &self.sink_log
    }

    pub fn mass_logs(&self) -> &[MassLog] {
        &self.mass_logs
    }

    pub fn profile_logs(&self) -> &[ProfileLog] {
        &self.profile_logs
    }

    /// Runs the simulation from minute 1 to the configured end.
    ///
    /// Per minute: cancellation poll, progress, `n_ts` sub-steps of
    /// RHS-multiply + cached-Thomas solve, dose events, logger sampling.
    /// Minute 0 is sampled once before the loop. The returned status is the
    /// only failure channel; the engine does not panic on validated input.
    pub fn run(&mut self, hooks: &mut dyn RunHooks) -> RunStatus {
        if !hooks.init_run() {
            return RunStatus::Failed;
        }
        self.apply_time_hints();

        let mut n_ts = self.builder.timesteps();
        let mut rhs = self.builder.rhs().clone();
        let mut lhs = self.builder.lhs().clone();

        let mut vehicle_removed = false;
        let must_replace = self.replace_after != 0;
        let must_remove = self.remove_at != 0;

        self.sample_loggers(0.0);

        for t in 1..=self.sim_time {
            if hooks.should_stop(t) {
                log::info!("run stopped cooperatively at minute {t}");
                return RunStatus::Stopped;
            }
            hooks.progress(t);

            for _ in 0..n_ts {
                rhs.inline_multiply(&mut self.concentrations);
                solve_thomas_cached(&mut lhs, &mut self.concentrations);
            }

            if must_replace && !vehicle_removed && t > 1 && t % self.replace_after == 0 {
                self.reset_compartment_concentration(0);
            }

            if must_remove && t == self.remove_at {
                vehicle_removed = true;
                if let Err(e) = self.remove_top_compartment() {
                    log::error!("vehicle removal failed: {e:#}");
                    return RunStatus::Failed;
                }
                // The rebuild invalidated the cached factorization; pick up
                // the fresh matrix pair and sub-step count.
                rhs = self.builder.rhs().clone();
                lhs = self.builder.lhs().clone();
                n_ts = self.builder.timesteps();
            }

            self.sample_loggers(t as f64);
        }

        if !hooks.tear_down_run() {
            return RunStatus::Failed;
        }
        RunStatus::Executed
    }

    /// Writes every enabled logger to its configured file.
    pub fn write_logs(&self) -> Result<()> {
        if self.sink_log.enabled() {
            self.sink_log.write_to_file()?;
        }
        for logger in &self.mass_logs {
            if logger.enabled() {
                logger.write_to_file()?;
            }
        }
        for logger in &self.profile_logs {
            if logger.enabled() {
                logger.write_to_file()?;
            }
        }
        Ok(())
    }

    fn apply_time_hints(&mut self) {
        let hint = self.sim_time;
        self.sink_log.set_time_hint(hint);
        for logger in &mut self.mass_logs {
            logger.set_time_hint(hint);
        }
        for logger in &mut self.profile_logs {
            logger.set_time_hint(hint);
        }
    }

    fn sample_loggers(&mut self, time: f64) {
        self.sink_log.sample(
            time,
            &self.geometry,
            &self.concentrations,
            self.scale,
            &self.compartments,
            &self.sink,
        );
        for logger in &mut self.mass_logs {
            logger.sample(
                time,
                &self.geometry,
                &self.concentrations,
                self.scale,
                &self.compartments,
                &self.sink,
            );
        }
        // Profiles are logged per volume unit: scale/ml instead of scale/µm³.
        for logger in &mut self.profile_logs {
            logger.sample(time, &self.concentrations, self.scale * 1.0e12, &self.compartments);
        }
    }

    fn reset_compartment_concentration(&mut self, index: usize) {
        let comp = &self.compartments[index];
        for i in comp.cell_from()..=comp.cell_to() {
            self.concentrations[i] = comp.c_init;
        }
    }

    /// Removes the vehicle: drops the first compartment, shifts every
    /// remaining cell range down, splices the geometry and concentration
    /// vector, rewires the logger bindings one down, and rebuilds both
    /// matrices (which also recomputes the sub-step count and clears the
    /// cached factorization).
    fn remove_top_compartment(&mut self) -> Result<()> {
        let top = self.compartments.remove(0);
        let removed_cells = top.cell_to() + 1;

        self.mass_logs[0].unbind();
        self.profile_logs[0].unbind();
        for i in 1..self.mass_logs.len() {
            self.mass_logs[i].bind_compartment(i - 1);
        }
        for i in 1..self.profile_logs.len() {
            self.profile_logs[i].bind_compartment(i - 1);
        }

        self.geometry.remove(top.cell_from(), top.cell_to() + 1);
        self.concentrations.drain(0..removed_cells);

        for comp in &mut self.compartments {
            comp.shift_cells_down(removed_cells);
        }
        self.sink.shift_cell_down(removed_cells);

        self.builder
            .build(&self.compartments, &self.geometry, Some(&self.sink))
            .context("matrix rebuild after vehicle removal failed")?;

        log::debug!(
            "vehicle removed: {} cells spliced, {} sub-steps/min now",
            removed_cells,
            self.builder.timesteps()
        );
        Ok(())
    }
}

/// Fills each compartment's range with its initial concentration and seeds
/// the sink cell so that the integrated sink mass equals `c_init · Vd`.
fn initial_concentrations(geometry: &Geometry, compartments: &[Compartment], sink: &Sink) -> Vec<f64> {
    let mut conc = vec![0.0; geometry.size()];
    for comp in compartments {
        for slot in &mut conc[comp.cell_from()..=comp.cell_to()] {
            *slot = comp.c_init;
        }
    }

    let ss = geometry.space_steps()[sink.cell()];
    let vd_um3 = sink.vd_ml * 1.0e12;
    conc[sink.cell()] = sink.c_init * vd_um3 / (ss * sink.area);
    conc
}

fn build_loggers(
    params: &Params,
    compartments: &[Compartment],
    sink: &Sink,
    geometry: &Geometry,
    app_area: f64,
    method: Method,
) -> (MassLog, Vec<MassLog>, Vec<ProfileLog>) {
    let log_p = &params.log;
    let file = |name: &str, postfix: &str| {
        format!("{}{}_{}_{}.dat", log_p.working_dir, log_p.tag, name, postfix)
    };

    let mut sink_log = MassLog::new(method, app_area);
    sink_log.set_name(&format!("{} logger", sink.name));
    sink_log.set_filename(&file(&sink.name, &log_p.mass_postfix));
    sink_log.bind_sink();
    sink_log.set_auto_log(params.sink.log);
    sink_log.set_enabled(params.sink.log);
    sink_log.set_column2_name("conc");
    sink_log.set_zip(log_p.gzip_mass);
    sink_log.set_interval(log_p.mass_interval);

    let mut mass_logs = Vec::with_capacity(compartments.len());
    for (i, comp) in compartments.iter().enumerate() {
        let mut logger = MassLog::new(method, app_area);
        logger.set_name(&format!("{} logger", comp.name));
        logger.set_filename(&file(&comp.name, &log_p.mass_postfix));
        logger.bind_compartment(i);
        let enabled = if i == 0 {
            params.vehicle.log
        } else {
            params.layers[i - 1].log
        };
        logger.set_auto_log(enabled);
        logger.set_enabled(enabled);
        logger.set_zip(log_p.gzip_mass);
        logger.set_interval(log_p.mass_interval);
        mass_logs.push(logger);
    }

    let mut profile_logs = Vec::with_capacity(compartments.len());
    for (i, comp) in compartments.iter().enumerate() {
        let mut logger = ProfileLog::new();
        logger.set_name(&format!("{} CDP logger", comp.name));
        logger.set_filename(&file(&comp.name, &log_p.cdp_postfix));
        logger.bind_compartment(i);
        let enabled = if i == 0 {
            params.vehicle.log_cdp
        } else {
            params.layers[i - 1].log_cdp
        };
        logger.set_auto_log(enabled);
        logger.set_enabled(enabled);
        logger.set_zip(log_p.gzip_cdp);
        logger.set_interval(log_p.cdp_interval);
        logger.set_position(NodePosition::from_method(method));
        logger.set_step_sizes(&geometry.space_steps()[comp.cell_from()..=comp.cell_to()]);
        profile_logs.push(logger);
    }

    (sink_log, mass_logs, profile_logs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::LayerParams;
    use crate::sim::geometry::DiscMethod;
    use crate::sim::logger::MassLogBinding;
    use approx::assert_relative_eq;

    fn base_params() -> Params {
        let mut p = Params::default();
        p.system.mb_method = Method::DSkin15;
        p.system.disc_method = DiscMethod::Equidistant;
        p.system.sim_time = 10;
        p.vehicle.c_init = 1.0;
        p.layers.push(LayerParams {
            name: "SC".into(),
            ..Default::default()
        });
        p
    }

    #[test]
    fn test_initialization_order_and_units() {
        let p = base_params();
        let sys = System::new(&p).unwrap();

        // 10 µm vehicle + 10 µm layer at resolution 1, plus the sink cell.
        assert_eq!(sys.geometry().size(), 21);
        assert_eq!(sys.compartments().len(), 2);
        assert_eq!(sys.sink().cell(), 20);

        // mg/ml converted to mg/µm³.
        assert_relative_eq!(sys.concentrations()[0], 1.0e-12, max_relative = 1e-12);
        assert_eq!(sys.concentrations()[10], 0.0);

        // cm² converted to µm².
        assert_relative_eq!(sys.compartments()[0].area, 1.0e8, max_relative = 1e-12);
    }

    #[test]
    fn test_sink_cell_seeding_recovers_initial_mass() {
        let mut p = base_params();
        p.sink.c_init = 2.0; // mg/ml
        p.sink.vd_ml = 3.0;
        let sys = System::new(&p).unwrap();

        let idx = sys.sink().cell();
        let ss = sys.geometry().space_steps()[idx];
        let mass = sys.concentrations()[idx] * ss * sys.sink().area;
        // Integrated sink mass must equal c_init · Vd (in mg).
        assert_relative_eq!(mass, 2.0 * 3.0, max_relative = 1e-12);
    }

    #[test]
    fn test_logger_wiring() {
        let p = base_params();
        let sys = System::new(&p).unwrap();

        assert_eq!(sys.mass_logs().len(), 2);
        assert_eq!(sys.profile_logs().len(), 2);
        assert_eq!(sys.sink_log().binding(), MassLogBinding::Sink);
        assert_eq!(sys.mass_logs()[0].binding(), MassLogBinding::Compartment(0));
        assert_eq!(sys.mass_logs()[1].binding(), MassLogBinding::Compartment(1));
        assert!(sys.sink_log().filename().contains("Sink_mass.dat"));
    }

    #[test]
    fn test_run_samples_every_minute() {
        let p = base_params();
        let mut sys = System::new(&p).unwrap();
        let status = sys.run(&mut NoHooks);

        assert_eq!(status, RunStatus::Executed);
        // t = 0 plus minutes 1..=10.
        assert_eq!(sys.sink_log().len(), 11);
        assert_eq!(sys.mass_logs()[0].len(), 11);
    }

    #[test]
    fn test_cooperative_stop_keeps_logged_minutes() {
        struct StopAt(u32);
        impl RunHooks for StopAt {
            fn should_stop(&mut self, minute: u32) -> bool {
                minute == self.0
            }
        }

        let p = base_params();
        let mut sys = System::new(&p).unwrap();
        let status = sys.run(&mut StopAt(5));

        assert_eq!(status, RunStatus::Stopped);
        // Minutes 0..=4 were completed and logged.
        assert_eq!(sys.sink_log().len(), 5);
    }

    #[test]
    fn test_failing_init_hook_fails_the_run() {
        struct RejectInit;
        impl RunHooks for RejectInit {
            fn init_run(&mut self) -> bool {
                false
            }
        }

        let p = base_params();
        let mut sys = System::new(&p).unwrap();
        assert_eq!(sys.run(&mut RejectInit), RunStatus::Failed);
    }

    #[test]
    fn test_vehicle_removal_rewires_and_shrinks() {
        let mut p = base_params();
        p.vehicle.remove_at = 5;
        p.system.sim_time = 8;
        let mut sys = System::new(&p).unwrap();
        let size_before = sys.geometry().size();

        assert_eq!(sys.run(&mut NoHooks), RunStatus::Executed);

        assert_eq!(sys.compartments().len(), 1);
        assert_eq!(sys.geometry().size(), size_before - 10);
        assert_eq!(sys.compartments()[0].cell_range(), (0, 9));
        assert_eq!(sys.sink().cell(), 10);
        assert_eq!(sys.mass_logs()[0].binding(), MassLogBinding::Unbound);
        assert_eq!(sys.mass_logs()[1].binding(), MassLogBinding::Compartment(0));
    }

    #[test]
    fn test_progress_hook_sees_every_minute() {
        struct Count(Vec<u32>);
        impl RunHooks for Count {
            fn progress(&mut self, minute: u32) {
                self.0.push(minute);
            }
        }

        let p = base_params();
        let mut sys = System::new(&p).unwrap();
        let mut hooks = Count(Vec::new());
        sys.run(&mut hooks);
        assert_eq!(hooks.0, (1..=10).collect::<Vec<_>>());
    }
}
