use std::io::{self, Stdout, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use log::{LevelFilter, debug, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::Instant;

use coze_chat::clock::TokioClock;
use coze_chat::config::{
    APP_NAME, ChatConfig, load_config, resolve_config_path, write_default_config,
};
use coze_chat::ingest::{self, IngestError};
use coze_chat::repl::{HELP, LiveView, Renderer, ReplCommand};
use coze_chat::session::{SessionStore, created_at};
use coze_chat::storage::{StorageConfig, create_storage};
use coze_chat::transport::{ChatTransport, RelayClient};
use coze_cli::{CommonOpts, ConfigCommand, InitCommand, OutputFormat, commands, logging};

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

#[tokio::main(flavor = "current_thread")]
async fn async_chat(ctx: RuntimeContext, cmd: ChatCommand) -> Result<()> {
    handle_chat(&ctx, cmd).await
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = RuntimeContext::new(cli.common.clone())?;
    ctx.init_logging()?;
    debug!("resolved config file: {}", ctx.config_file.display());

    match cli.command.unwrap_or(Command::Chat(ChatCommand::default())) {
        Command::Chat(cmd) => async_chat(ctx, cmd),
        Command::Sessions(cmd) => handle_sessions(&ctx, cmd),
        Command::Init(cmd) => {
            commands::run_init(&ctx.common, &cmd, &ctx.config_file, write_default_config)
        }
        Command::Config { command } => commands::run_config(
            &ctx.common,
            &command,
            &ctx.config_file,
            &ctx.config,
            write_default_config,
        ),
        Command::Completions { shell } => {
            commands::print_completions::<Cli>(shell, APP_NAME);
            Ok(())
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Coze chat - terminal client with persistent sessions.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Chat interactively (default)
    Chat(ChatCommand),
    /// List stored sessions
    Sessions(SessionsCommand),
    /// Create the config directory and default file
    Init(InitCommand),
    /// Inspect and manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Default, Args)]
struct ChatCommand {
    /// Open this session on start
    #[arg(long, value_name = "ID")]
    session: Option<String>,
    /// Relay base URL (overrides relay.url)
    #[arg(long, value_name = "URL")]
    relay_url: Option<String>,
    /// Bot to talk to (overrides chat.bot_id)
    #[arg(long, value_name = "ID")]
    bot_id: Option<String>,
    /// Keep sessions in memory only
    #[arg(long)]
    ephemeral: bool,
}

#[derive(Debug, Clone, Args)]
struct SessionsCommand {}

#[derive(Debug, Clone)]
struct RuntimeContext {
    common: CommonOpts,
    config_file: PathBuf,
    config: ChatConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts) -> Result<Self> {
        let config_file = resolve_config_path(common.config.clone())?;
        let config = load_config(&config_file)?;
        Ok(Self {
            common,
            config_file,
            config,
        })
    }

    /// Logs go to stderr; stdout carries the conversation.
    fn init_logging(&self) -> Result<()> {
        logging::init_logging(
            &self.common,
            &self.config.logging.level,
            LevelFilter::Warn,
            &["coze_chat", "coze_protocol"],
        )
    }

    fn open_store(&self, ephemeral: bool) -> Result<SessionStore> {
        let storage = if ephemeral {
            StorageConfig::Memory
        } else {
            let dir = self.config.data_dir()?;
            debug!("session data directory: {}", dir.display());
            StorageConfig::Local(dir)
        };
        Ok(SessionStore::open(
            create_storage(storage),
            Arc::new(TokioClock),
            self.config.store_options(),
        ))
    }
}

async fn handle_chat(ctx: &RuntimeContext, cmd: ChatCommand) -> Result<()> {
    let mut config = ctx.config.clone();
    if let Some(url) = cmd.relay_url {
        config.relay.url = url;
    }
    if let Some(bot_id) = cmd.bot_id {
        config.chat.bot_id = bot_id;
    }
    if config.chat.bot_id.trim().is_empty() {
        return Err(anyhow!(
            "no bot configured: set chat.bot_id in {} or pass --bot-id",
            ctx.config_file.display()
        ));
    }

    let transport = RelayClient::new(config.relay.url.clone(), config.relay.connect_timeout())
        .context("creating relay client")?;
    info!("using relay at {}", transport.base_url());

    let ctx = RuntimeContext {
        config,
        ..ctx.clone()
    };
    let mut store = ctx.open_store(cmd.ephemeral)?;
    let mut renderer = Renderer::new(io::stdout());

    if let Some(id) = cmd.session {
        store.switch_session(&id);
    }
    renderer.line("Type /help for commands.")?;

    let mut interrupts = watch_interrupts();
    let result = chat_loop(&mut store, &mut renderer, &transport, &mut interrupts).await;

    store.flush();
    renderer.render(&mut store)?;
    result
}

/// Forward every Ctrl+C for the lifetime of the process.
///
/// Once `ctrl_c()` has been polled the default handler is gone, so a single
/// listener must own the signal from then on.
fn watch_interrupts() -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for Ctrl+C: {}", e);
                return;
            }
            if tx.send(()).is_err() {
                return;
            }
        }
    });
    rx
}

async fn chat_loop(
    store: &mut SessionStore,
    renderer: &mut Renderer<Stdout>,
    transport: &dyn ChatTransport,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut needs_prompt = true;

    loop {
        renderer.render(store)?;
        if needs_prompt {
            renderer.prompt()?;
            needs_prompt = false;
        }

        let deadline = store.next_deadline();
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("reading input")? else {
                    return Ok(());
                };
                needs_prompt = true;
                if !handle_line(store, renderer, transport, interrupts, &line).await? {
                    return Ok(());
                }
            }
            _ = wait_until(deadline) => store.fire_due(),
            Some(()) = interrupts.recv() => {
                renderer.line("")?;
                return Ok(());
            }
        }
    }
}

/// Returns `false` when the user asked to quit.
async fn handle_line(
    store: &mut SessionStore,
    renderer: &mut Renderer<Stdout>,
    transport: &dyn ChatTransport,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
    line: &str,
) -> Result<bool> {
    match ReplCommand::parse(line) {
        ReplCommand::Say(text) => {
            submit(store, renderer, transport, interrupts, &text).await?;
            if store.history_visible() {
                renderer.session_list(store)?;
            }
        }
        ReplCommand::New => {
            store.create_session();
        }
        ReplCommand::List => renderer.session_list(store)?,
        ReplCommand::Switch(id) => store.switch_session(&id),
        ReplCommand::Rename { id, name } => {
            store.begin_rename(&id);
            store.rename_session(&id, &name);
        }
        ReplCommand::Delete(id) => {
            store.open_menu(&id);
            store.delete_session(&id);
        }
        ReplCommand::History => {
            let visible = store.toggle_history();
            renderer.line(if visible {
                "session list shown after each answer"
            } else {
                "session list hidden"
            })?;
        }
        ReplCommand::Help => renderer.line(HELP)?,
        ReplCommand::Quit => return Ok(false),
        ReplCommand::Usage(usage) => renderer.line(&format!("usage: {usage}"))?,
        ReplCommand::Unknown(name) => {
            renderer.line(&format!("unknown command /{name}, try /help"))?
        }
    }
    Ok(true)
}

/// Submit `text`, rendering the answer as it streams. Ctrl+C abandons the answer.
async fn submit(
    store: &mut SessionStore,
    renderer: &mut Renderer<Stdout>,
    transport: &dyn ChatTransport,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
    text: &str,
) -> Result<()> {
    let Some(request) = store.begin_submission(text) else {
        return Ok(());
    };
    renderer.render(store)?;

    let idle_timeout = store.options().stream_idle_timeout;
    let opened = tokio::select! {
        opened = transport.open_stream(&request) => opened.map_err(IngestError::from),
        Some(()) = interrupts.recv() => Err(IngestError::Interrupted),
    };
    let result = match opened {
        Ok(stream) => {
            let mut view = LiveView {
                store: &mut *store,
                renderer: &mut *renderer,
            };
            let interrupted = async {
                if interrupts.recv().await.is_none() {
                    std::future::pending::<()>().await;
                }
            };
            ingest::drive_until(stream, &mut view, idle_timeout, interrupted).await
        }
        Err(e) => Err(e),
    };
    store.complete_submission(result);
    Ok(())
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

fn handle_sessions(ctx: &RuntimeContext, _cmd: SessionsCommand) -> Result<()> {
    let store = ctx.open_store(false)?;
    let index = store.index();

    let format = OutputFormat::from_opts(&ctx.common);
    if format != OutputFormat::Debug {
        println!("{}", format.render(&index)?);
    } else if index.is_empty() {
        println!("(no sessions)");
    } else {
        for entry in index {
            let started = created_at(&entry.id)
                .map(|at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("{}  {}  {}", entry.id, started, entry.name);
        }
    }
    Ok(())
}
