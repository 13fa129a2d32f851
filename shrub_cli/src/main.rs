//! `shrub` binary: config loading, logging setup, and command dispatch.

mod cli;
mod error_fmt;
mod run;

use std::path::{Path, PathBuf};

use clap::Parser;
use eyre::WrapErr;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

use cli::{Cli, Commands, FILE_GUARD, JSON_MODE, json_mode};
use error_fmt::{exit_code_for_error, format_error_json, humanize};
use shrub_config::{
    Config, ProbeCalibration, load_or_create_settings, load_probe_calibration,
};

/// Files resolved from the config and the command line.
#[derive(Debug, Clone)]
pub struct Paths {
    pub state: PathBuf,
    pub settings: Option<PathBuf>,
    pub calibration: Option<PathBuf>,
}

fn main() {
    // Installing twice (e.g. in tests) is harmless; ignore the error.
    let _ = color_eyre::install();

    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = real_main(cli) {
        tracing::error!(error = %e, "command failed");
        if json_mode() {
            println!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn real_main(cli: Cli) -> eyre::Result<()> {
    let mut cfg = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .wrap_err_with(|| format!("read config {}", path.display()))?;
            shrub_config::load_toml(&text)
                .wrap_err_with(|| format!("parse config {}", path.display()))?
        }
        None => Config::default(),
    };

    init_tracing(cli.json, &cli.log_level, &cfg.logging)?;

    let paths = Paths {
        state: cli
            .state
            .clone()
            .unwrap_or_else(|| PathBuf::from(&cfg.persistence.state_file)),
        settings: cli
            .settings
            .clone()
            .or_else(|| cfg.persistence.settings_file.as_ref().map(PathBuf::from)),
        calibration: cli
            .calibration
            .clone()
            .or_else(|| cfg.persistence.calibration_file.as_ref().map(PathBuf::from)),
    };

    if let Some(path) = &paths.settings {
        let user = load_or_create_settings(path, cfg.user_settings())?;
        run::apply_user_settings(&mut cfg, &user);
        tracing::info!(path = %path.display(), "operator settings applied");
    }
    if let Some(path) = &paths.calibration
        && path.exists()
    {
        let cal = load_probe_calibration(path, ProbeCalibration::from(&cfg.probes))?;
        cal.apply_to(&mut cfg.probes);
        tracing::info!(path = %path.display(), "probe calibration applied");
    }

    cfg.validate().wrap_err("invalid configuration")?;

    match cli.cmd {
        Commands::Run {
            max_ticks,
            accelerate,
            stdin_events,
        } => run::run(
            &cfg,
            &paths,
            run::RunOptions {
                max_ticks,
                accelerate,
                stdin_events,
            },
        ),
        Commands::Table => run::print_table(&cfg),
        Commands::SelfCheck => run::self_check(&cfg),
        Commands::CalibratePh { mv } => run::calibrate_ph(&cfg, &paths, mv),
        Commands::CalibrateEc { mv, temp_c } => run::calibrate_ec(&cfg, &paths, mv, temp_c),
        Commands::CalibrateReset { probe } => run::calibrate_reset(&cfg, &paths, probe),
    }
}

/// Console layer on stderr (JSON under `--json`) plus an optional JSON file
/// layer from `[logging]`.
fn init_tracing(json: bool, level: &str, log: &shrub_config::Logging) -> eyre::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .wrap_err_with(|| format!("invalid log level {level:?}"))?;

    let console = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed()
    };

    let file = match &log.file {
        Some(path) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file must name a file"))?;
            let appender = match log.rotation.as_deref().unwrap_or("never") {
                "never" => tracing_appender::rolling::never(dir, name),
                "daily" => tracing_appender::rolling::daily(dir, name),
                "hourly" => tracing_appender::rolling::hourly(dir, name),
                other => eyre::bail!("logging.rotation must be never|daily|hourly, got {other:?}"),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            let file_filter = EnvFilter::try_new(log.level.as_deref().unwrap_or("info"))
                .wrap_err("logging.level is not a valid filter")?;
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(file_filter)
                    .boxed(),
            )
        }
        None => None,
    };

    // A subscriber may already be set when embedded; keep the existing one.
    let _ = tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init();
    Ok(())
}
