//! # Rig Runner Binary
//!
//! Runs the built-in test plan against every device of a test rig.
//!
//! # Usage
//!
//! ```bash
//! # Full plan against the default rig description
//! rig_runner
//!
//! # Quick plan, leaving one device and one axis out
//! rig_runner --rig-config rig.toml --skip-boring-tests --ignore odrive1 odrive0.axis1
//!
//! # Verbose logging and a JSON report
//! rig_runner -v --report report.json
//! ```
//!
//! # Exit codes
//!
//! | Code | Meaning                                   |
//! |------|-------------------------------------------|
//! | 0    | all tests succeeded                       |
//! | 1    | a test failed or the run was interrupted  |
//! | 2    | configuration or startup error            |
//! | 3    | the rig could not be secured              |

use clap::Parser;
use rig_common::config::{ConfigLoader, LogLevel, RigConfig};
use rig_common::consts::DEFAULT_RIG_CONFIG_PATH;
use rig_runner::connectors::ConnectorRegistry;
use rig_runner::runner::{EXIT_STARTUP_ERROR, RigRunner};
use rig_runner::suites::{DEFAULT_PLAN, QUICK_PLAN, builtin_catalog};
use rig_runner::{RigContext, RunStatus, TestRegistry};
use std::path::PathBuf;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Rig Runner - motor-controller test rig scheduler
#[derive(Parser, Debug)]
#[command(name = "rig_runner")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Runs the test plan on every device of a motor-controller test rig")]
#[command(long_about = None)]
struct Args {
    /// Path to the rig description (TOML).
    #[arg(long, value_name = "FILE", default_value = DEFAULT_RIG_CONFIG_PATH)]
    rig_config: PathBuf,

    /// Devices or axes to leave out (e.g. `odrive1`, `odrive0.axis1`).
    #[arg(long, num_args = 1.., value_name = "NAME")]
    ignore: Vec<String>,

    /// Run only the quick plan on an already calibrated rig.
    #[arg(long)]
    skip_boring_tests: bool,

    /// Write a JSON run report to this file.
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();

    let config = RigConfig::load(&args.rig_config);
    let level = config
        .as_ref()
        .map(|c| c.runner.log_level)
        .unwrap_or_default();
    setup_tracing(&args, level);

    let code = match config {
        Ok(config) => match run(&args, config) {
            Ok(status) => status.exit_code(),
            Err(e) => {
                error!("Rig runner startup failed: {e}");
                EXIT_STARTUP_ERROR
            }
        },
        Err(e) => {
            error!("Failed to load {}: {e}", args.rig_config.display());
            EXIT_STARTUP_ERROR
        }
    };
    std::process::exit(code);
}

fn run(args: &Args, mut config: RigConfig) -> Result<RunStatus, Box<dyn std::error::Error>> {
    info!("Rig Runner v{} starting...", env!("CARGO_PKG_VERSION"));

    config.ignore.extend(args.ignore.iter().cloned());
    config.validate()?;

    let connectors = ConnectorRegistry::with_builtin();
    let connector = connectors.create(&config.runner.driver)?;
    info!("🔧 Using '{}' device connector", connector.name());

    let rig = RigContext::build(&config, connector.as_ref())?;

    let catalog = builtin_catalog();
    let registry = match &config.runner.tests {
        Some(tests) => TestRegistry::from_names(&catalog, tests),
        None if args.skip_boring_tests => TestRegistry::from_names(&catalog, QUICK_PLAN),
        None => TestRegistry::from_names(&catalog, DEFAULT_PLAN),
    };
    if config.runner.tests.is_some() && args.skip_boring_tests {
        warn!("--skip-boring-tests has no effect: runner.tests is set in the rig description");
    }

    let runner =
        RigRunner::new(rig, registry).secure_after_failure(config.runner.secure_after_failure);

    let token = runner.token();
    ctrlc::set_handler(move || {
        if token.trigger() {
            warn!("Received interrupt, stopping after the running tests");
        }
    })?;

    let report = runner.run();
    if let Some(path) = &args.report {
        match report.write_json(path) {
            Ok(()) => info!("Report written to {}", path.display()),
            Err(e) => error!("Failed to write report to {}: {e}", path.display()),
        }
    }
    Ok(report.status)
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
fn setup_tracing(args: &Args, level: LogLevel) {
    let mut filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_directive()));
    if args.verbose {
        filter = filter.add_directive(Level::DEBUG.into());
    }

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
