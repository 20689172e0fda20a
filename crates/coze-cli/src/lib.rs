//! Plumbing shared by the `coze-relay` and `coze-chat` binaries: global
//! command-line flags, logging setup, config file locations and layering, and
//! the `init`/`config`/`completions` subcommands.

pub mod commands;
pub mod logging;
pub mod opts;
pub mod paths;
pub mod settings;

pub use commands::{ConfigCommand, InitCommand, OutputFormat};
pub use opts::{ColorOption, CommonOpts};
