use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};

use permea::io::{args, json};
use permea::params::Params;
use permea::progress::ConsoleHooks;
use permea::sim::system::{RunStatus, System};

const TEMPLATE_FILENAME: &str = "dskin_config.json";

fn main() -> ExitCode {
    env_logger::init();

    let argv: Vec<String> = std::env::args().skip(1).collect();
    match run(&argv) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(argv: &[String]) -> Result<ExitCode> {
    if argv.is_empty() {
        print!("{}", args::usage());
        return Ok(ExitCode::SUCCESS);
    }

    match argv[0].as_str() {
        "--version" => {
            println!("{}", version_banner());
            return Ok(ExitCode::SUCCESS);
        }
        "--template" => {
            std::fs::write(TEMPLATE_FILENAME, json::TEMPLATE)
                .with_context(|| format!("could not write to {TEMPLATE_FILENAME}"))?;
            println!("Wrote configuration template to {TEMPLATE_FILENAME}");
            return Ok(ExitCode::SUCCESS);
        }
        _ => {}
    }

    let params: Params = if argv.len() == 1 {
        json::parse_file(Path::new(&argv[0]))?
    } else {
        args::parse_positional(argv)?
    };

    println!("{}\n", version_banner());
    println!("{}", params.overview());

    let mut system = System::new(&params)?;
    let mut hooks = ConsoleHooks::new(params.system.sim_time, params.log.show_progress);

    match system.run(&mut hooks) {
        RunStatus::Executed | RunStatus::Stopped => {
            system.write_logs().context("failed to write log files")?;
            println!("\nComputation done.");
            Ok(ExitCode::SUCCESS)
        }
        RunStatus::Failed => Ok(ExitCode::FAILURE),
    }
}

fn version_banner() -> String {
    format!(
        "{} {} — transient multi-compartment diffusion simulator",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    )
}
