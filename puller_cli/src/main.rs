mod cli;
mod error_fmt;
mod rig_setup;

use std::collections::VecDeque;
use std::io::{self, BufReader, Write};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::WrapErr;
use puller_config::{Config, Logging};
use puller_core::config::MotionCfg;
use puller_core::error::RigError;
use puller_core::{
    ChannelLines, Command, Completion, RecordingOutput, RigReport, RunOptions, WriterOutput,
};
use puller_traits::{ManualClock, MonotonicClock};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

/// Upper bound on simulated cycles for the self-check homing run.
const SELF_CHECK_MAX_CYCLES: u64 = 500_000;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    let _ = color_eyre::install();

    match real_main(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "exiting with error");
            if JSON_MODE.get().copied().unwrap_or(false) {
                eprintln!("{}", format_error_json(&e));
            } else {
                eprintln!("{}", humanize(&e));
            }
            ExitCode::from(exit_code_for_error(&e))
        }
    }
}

fn real_main(cli: Cli) -> eyre::Result<ExitCode> {
    if let Commands::Parse { line } = &cli.cmd {
        init_tracing(&cli, None)?;
        return parse_line(&cli, line);
    }

    let cfg = rig_setup::load_config(&cli.config, cli.calibration.as_deref())?;
    init_tracing(&cli, Some(&cfg.logging))?;
    tracing::debug!(config = %cli.config.display(), "config loaded");

    match cli.cmd {
        Commands::Run {
            max_cycles,
            until_idle,
            no_telemetry,
        } => run(&cfg, cli.json, max_cycles, until_idle, no_telemetry),
        Commands::SelfCheck => self_check(&cfg, cli.json),
        Commands::Parse { .. } => Ok(ExitCode::SUCCESS),
    }
}

fn init_tracing(cli: &Cli, logging: Option<&Logging>) -> eyre::Result<()> {
    let console_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .wrap_err_with(|| format!("invalid log level '{}'", cli.log_level))?;

    let console = if cli.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_filter(console_filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(io::stderr)
            .with_filter(console_filter)
            .boxed()
    };

    let file_layer = match logging.and_then(|l| l.file.as_deref()) {
        Some(path) => {
            let path = std::path::Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(std::path::Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file has no file name"))?;
            let appender = match logging.and_then(|l| l.rotation.as_deref()) {
                Some("daily") => tracing_appender::rolling::daily(dir, name),
                Some("hourly") => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let level = logging
                .and_then(|l| l.level.as_deref())
                .unwrap_or("info");
            let file_filter = EnvFilter::try_new(level)
                .wrap_err_with(|| format!("invalid logging.level '{level}'"))?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(file_filter),
            )
        }
        None => None,
    };

    // A second init (tests, embedding) is harmless.
    let _ = tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init();
    Ok(())
}

fn parse_line(cli: &Cli, line: &str) -> eyre::Result<ExitCode> {
    let motion = match rig_setup::load_config(&cli.config, None) {
        Ok(cfg) => MotionCfg::from(&cfg.motion),
        Err(e) => {
            tracing::debug!(error = %format!("{e:#}"), "no usable config, using default geometry");
            MotionCfg::default()
        }
    };
    let cmd = puller_core::parse(line);
    let target_steps = match cmd {
        Command::MoveToPosition(mm) => Some(motion.mm_to_steps(mm as f32)),
        _ => None,
    };

    let mut stdout = io::stdout().lock();
    if cmd.is_invalid() {
        if cli.json {
            writeln!(stdout, "{}", serde_json::json!({ "command": null, "message": "Invalid command" }))?;
        } else {
            writeln!(stdout, "Invalid command")?;
        }
        return Ok(ExitCode::from(2));
    }

    if cli.json {
        let obj = serde_json::json!({
            "command": cmd.to_string(),
            "variant": format!("{cmd:?}"),
            "target_steps": target_steps,
        });
        writeln!(stdout, "{obj}")?;
    } else {
        match target_steps {
            Some(steps) => writeln!(stdout, "{cmd:?} target_steps={steps}")?,
            None => writeln!(stdout, "{cmd:?}")?,
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn run(
    cfg: &Config,
    json: bool,
    max_cycles: Option<u64>,
    until_idle: bool,
    no_telemetry: bool,
) -> eyre::Result<ExitCode> {
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = shutdown.clone();
        ctrlc::set_handler(move || {
            flag.store(true, Ordering::Relaxed);
        })
        .wrap_err("installing Ctrl-C handler")?;
    }

    let mut rig = rig_setup::build_run_rig(cfg, Arc::new(MonotonicClock::new()))?;
    rig.startup(&shutdown)?;

    let mut lines = ChannelLines::spawn_reader(BufReader::new(io::stdin()));
    let mut out = WriterOutput::new(io::stdout());
    if no_telemetry {
        out = out.reports_only();
    }

    let summary = rig.run(
        &mut lines,
        &mut out,
        &shutdown,
        RunOptions {
            max_cycles,
            until_idle,
        },
    )?;

    if json {
        let mut stdout = io::stdout().lock();
        writeln!(
            stdout,
            "{}",
            serde_json::json!({
                "cycles": summary.cycles,
                "completed": summary.completed,
                "aborted": summary.aborted,
                "stop": format!("{:?}", summary.stop),
            })
        )?;
    }
    Ok(ExitCode::SUCCESS)
}

fn self_check(cfg: &Config, json: bool) -> eyre::Result<ExitCode> {
    let clock = ManualClock::new();
    let (mut rig, _sim) = rig_setup::build_sim_rig(cfg, Arc::new(clock))?;
    let never = AtomicBool::new(false);
    rig.startup(&never)?;

    let mut lines: VecDeque<String> = VecDeque::from(vec!["home".to_string()]);
    let mut out = RecordingOutput::new();
    let summary = rig.run(
        &mut lines,
        &mut out,
        &never,
        RunOptions {
            max_cycles: Some(SELF_CHECK_MAX_CYCLES),
            until_idle: true,
        },
    )?;

    if let Some(RigReport::Aborted(reason)) = out
        .reports
        .iter()
        .find(|r| matches!(r, RigReport::Aborted(_)))
    {
        return Err(eyre::Report::new(RigError::Abort(*reason))).wrap_err("self-check homing");
    }
    if !out.completions().contains(&Completion::Homed) || rig.actuator().current_position() != 0 {
        return Err(eyre::Report::new(RigError::State(format!(
            "homing did not complete within {} cycles",
            summary.cycles
        ))));
    }

    let mut stdout = io::stdout().lock();
    if json {
        writeln!(
            stdout,
            "{}",
            serde_json::json!({ "status": "ok", "cycles": summary.cycles })
        )?;
    } else {
        writeln!(stdout, "ok")?;
    }
    Ok(ExitCode::SUCCESS)
}
