//! Subcommands both binaries share.

use std::fmt::Debug;
use std::io;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Subcommand};
use clap_complete::Shell;
use log::info;
use serde::Serialize;

use crate::opts::CommonOpts;

#[derive(Debug, Clone, Args)]
pub struct InitCommand {
    /// Recreate configuration even if it already exists
    #[arg(long = "force")]
    pub force: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum ConfigCommand {
    /// Output the effective configuration
    Show,
    /// Print the resolved config file path
    Path,
    /// Regenerate the default configuration file
    Reset,
}

/// How structured values are printed on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Debug,
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn from_opts(opts: &CommonOpts) -> Self {
        if opts.json {
            Self::Json
        } else if opts.yaml {
            Self::Yaml
        } else {
            Self::Debug
        }
    }

    pub fn render<T: Serialize + Debug>(self, value: &T) -> Result<String> {
        match self {
            Self::Json => serde_json::to_string_pretty(value).context("serializing to JSON"),
            Self::Yaml => serde_yaml::to_string(value).context("serializing to YAML"),
            Self::Debug => Ok(format!("{value:#?}")),
        }
    }
}

/// `init`: write the default config unless one exists.
pub fn run_init(
    opts: &CommonOpts,
    cmd: &InitCommand,
    config_file: &Path,
    write_default: impl FnOnce(&Path) -> Result<()>,
) -> Result<()> {
    if config_file.exists() && !(cmd.force || opts.assume_yes) {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            config_file.display()
        ));
    }

    if opts.dry_run {
        info!("dry-run: would write default config to {}", config_file.display());
        return Ok(());
    }

    write_default(config_file)?;
    println!("{}", config_file.display());
    Ok(())
}

/// `config show|path|reset`. `shown` is the effective config with secrets masked.
pub fn run_config<T: Serialize + Debug>(
    opts: &CommonOpts,
    command: &ConfigCommand,
    config_file: &Path,
    shown: &T,
    write_default: impl FnOnce(&Path) -> Result<()>,
) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            println!("{}", OutputFormat::from_opts(opts).render(shown)?);
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", config_file.display());
            Ok(())
        }
        ConfigCommand::Reset => {
            if opts.dry_run {
                info!("dry-run: would reset config at {}", config_file.display());
                return Ok(());
            }
            write_default(config_file)
        }
    }
}

/// `completions <shell>` for the CLI type `C`.
pub fn print_completions<C: CommandFactory>(shell: Shell, bin_name: &str) {
    let mut cmd = C::command();
    clap_complete::generate(shell, &mut cmd, bin_name, &mut io::stdout());
}
