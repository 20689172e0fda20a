//! Logging setup.
//!
//! Both binaries log through `tracing` and `log`. Everything is written to
//! stderr whatever the format, so stdout only ever carries command output
//! (`config show --json`, the conversation).

use std::env;
use std::io::{self, IsTerminal};

use anyhow::Result;
use log::LevelFilter;
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::opts::{ColorOption, CommonOpts};

/// Level in effect: `--trace`/`--debug` win, then each `-v` raises the
/// configured level one step. An unparsable configured level means `fallback`.
pub fn effective_level(opts: &CommonOpts, configured: &str, fallback: LevelFilter) -> LevelFilter {
    if opts.trace {
        return LevelFilter::Trace;
    }
    if opts.debug {
        return LevelFilter::Debug;
    }
    let mut level = configured.parse().unwrap_or(fallback);
    for _ in 0..opts.verbose {
        level = louder(level);
    }
    level
}

fn louder(level: LevelFilter) -> LevelFilter {
    match level {
        LevelFilter::Off => LevelFilter::Error,
        LevelFilter::Error => LevelFilter::Warn,
        LevelFilter::Warn => LevelFilter::Info,
        LevelFilter::Info => LevelFilter::Debug,
        LevelFilter::Debug | LevelFilter::Trace => LevelFilter::Trace,
    }
}

/// Install the global subscriber and `env_logger`.
///
/// `RUST_LOG` wins over the computed filter, which enables `targets` at the
/// effective level.
pub fn init_logging(
    opts: &CommonOpts,
    configured: &str,
    fallback: LevelFilter,
    targets: &[&str],
) -> Result<()> {
    if opts.quiet {
        log::set_max_level(LevelFilter::Off);
        return Ok(());
    }

    let level = effective_level(opts, configured, fallback);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives(targets, level)));

    build_subscriber(opts, env_filter, io::stderr, use_color(opts))
        .try_init()
        .ok();

    // Records from `log` users when the tracing bridge is not installed.
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(level_name(fallback)),
    );
    builder.filter_level(level);
    builder.target(env_logger::Target::Stderr);
    builder.try_init().ok();

    Ok(())
}

fn directives(targets: &[&str], level: LevelFilter) -> String {
    let level = level_name(level);
    targets
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn level_name(level: LevelFilter) -> String {
    level.as_str().to_ascii_lowercase()
}

fn use_color(opts: &CommonOpts) -> bool {
    let force = opts.color == ColorOption::Always || env::var_os("FORCE_COLOR").is_some();
    let disable = opts.no_color
        || opts.color == ColorOption::Never
        || env::var_os("NO_COLOR").is_some()
        || (!force && !io::stderr().is_terminal());
    !disable
}

fn build_subscriber<W>(
    opts: &CommonOpts,
    filter: EnvFilter,
    writer: W,
    ansi: bool,
) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let registry = tracing_subscriber::registry().with(filter);
    if opts.json {
        Box::new(registry.with(tracing_subscriber::fmt::layer().json().with_writer(writer)))
    } else {
        Box::new(
            registry.with(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(ansi)
                    .with_target(opts.diagnostics)
                    .with_file(opts.diagnostics)
                    .with_line_number(opts.diagnostics),
            ),
        )
    }
}
