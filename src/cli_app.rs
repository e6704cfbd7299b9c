//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use clap::{Args, Parser, Subcommand};
use colored::{Colorize, control};
use serde_json::json;
use thiserror::Error;

use daily_text_engine::core::config::Config;
use daily_text_engine::core::date_key::MonthDay;
use daily_text_engine::dispatch::{
    NullRenderSink, StoreSurfaceRegistry, UpdateDispatcher, UpdateTrigger,
};
use daily_text_engine::engine::navigation::Direction;
use daily_text_engine::engine::render::{RenderModel, RenderModelBuilder};
use daily_text_engine::logger::jsonl::ActivityLog;
use daily_text_engine::scheduler::rollover::RolloverScheduler;
use daily_text_engine::scheduler::timer::{NoopTimerHost, ThreadTimerHost, TimerHost};
use daily_text_engine::source::VerseSource;
use daily_text_engine::store::{CursorStore, FileCursorStore, SurfaceId};

/// Daily Text Engine — per-surface daily entries with midnight rollover.
#[derive(Debug, Parser)]
#[command(
    name = "dte",
    author,
    version,
    about = "Daily Text Engine - per-surface daily entries with midnight rollover",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Show the entry a surface currently resolves to.
    Show(ShowArgs),
    /// Step a surface through the entry sequence.
    Nav(NavArgs),
    /// Manage known surfaces.
    Surface(SurfaceArgs),
    /// Force every surface back to today.
    Refresh,
    /// Run the foreground rollover daemon.
    Daemon,
    /// View and validate configuration state.
    Config(ConfigArgs),
    /// Show version metadata.
    Version,
}

#[derive(Debug, Clone, Args)]
struct ShowArgs {
    /// Surface to resolve.
    #[arg(long, default_value_t = 0, value_name = "ID")]
    surface: SurfaceId,
    /// Jump to a specific date key instead of the stored cursor.
    #[arg(long, value_name = "MM-DD")]
    date: Option<String>,
}

#[derive(Debug, Clone, Args)]
struct NavArgs {
    #[command(subcommand)]
    action: NavAction,
}

#[derive(Debug, Clone, Subcommand)]
enum NavAction {
    /// Step to the previous entry (clamps at the first).
    Prev(NavTarget),
    /// Step to the next entry (clamps at the last).
    Next(NavTarget),
    /// Return to today's entry.
    Today(NavTarget),
    /// Jump to an explicit date key.
    Jump(JumpTarget),
}

#[derive(Debug, Clone, Args)]
struct NavTarget {
    /// Surface to navigate.
    #[arg(long, default_value_t = 0, value_name = "ID")]
    surface: SurfaceId,
}

#[derive(Debug, Clone, Args)]
struct JumpTarget {
    /// Date key to jump to.
    #[arg(value_name = "MM-DD")]
    date: String,
    /// Surface to navigate.
    #[arg(long, default_value_t = 0, value_name = "ID")]
    surface: SurfaceId,
}

#[derive(Debug, Clone, Args)]
struct SurfaceArgs {
    #[command(subcommand)]
    command: SurfaceCommand,
}

#[derive(Debug, Clone, Subcommand)]
enum SurfaceCommand {
    /// Register a surface and resolve it to an entry.
    Add {
        #[arg(value_name = "ID")]
        id: SurfaceId,
    },
    /// Remove a surface and its stored cursor.
    Remove {
        #[arg(value_name = "ID")]
        id: SurfaceId,
    },
    /// List known surfaces and their cursors.
    List,
}

#[derive(Debug, Clone, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print the effective config file path.
    Path,
    /// Print the effective configuration.
    Show,
    /// Validate configuration and data sources.
    Validate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    /// Operation partially succeeded.
    #[error("{0}")]
    Partial(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Internal(_) | Self::Json(_) => 3,
            Self::Partial(_) => 4,
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Show(args) => run_show(cli, args),
        Command::Nav(args) => run_nav(cli, args),
        Command::Surface(args) => run_surface(cli, args),
        Command::Refresh => run_refresh(cli),
        Command::Daemon => run_daemon(cli),
        Command::Config(args) => run_config(cli, args),
        Command::Version => emit_version(cli),
    }
}

// ──────────────────── command bodies ────────────────────

fn run_show(cli: &Cli, args: &ShowArgs) -> Result<(), CliError> {
    let requested = args
        .date
        .as_deref()
        .map(parse_date_key)
        .transpose()?;

    let (dispatcher, _log) = build_dispatcher(cli, Arc::new(NoopTimerHost))?;
    let model = dispatcher
        .resolve_surface(args.surface, &Local::now(), requested)
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    emit_model(cli, args.surface, &model)
}

fn run_nav(cli: &Cli, args: &NavArgs) -> Result<(), CliError> {
    let (dispatcher, _log) = build_dispatcher(cli, Arc::new(NoopTimerHost))?;
    let now = Local::now();

    let (surface, model) = match &args.action {
        NavAction::Prev(target) => (
            target.surface,
            dispatcher.navigate(target.surface, Direction::Prev, &now),
        ),
        NavAction::Next(target) => (
            target.surface,
            dispatcher.navigate(target.surface, Direction::Next, &now),
        ),
        NavAction::Today(target) => (
            target.surface,
            dispatcher.navigate(target.surface, Direction::Today, &now),
        ),
        NavAction::Jump(target) => {
            let key = parse_date_key(&target.date)?;
            (
                target.surface,
                dispatcher.resolve_surface(target.surface, &now, Some(key)),
            )
        }
    };

    let model = model.map_err(|e| CliError::Runtime(e.to_string()))?;
    emit_model(cli, surface, &model)
}

fn run_surface(cli: &Cli, args: &SurfaceArgs) -> Result<(), CliError> {
    match &args.command {
        SurfaceCommand::Add { id } => {
            let (dispatcher, _log) = build_dispatcher(cli, Arc::new(NoopTimerHost))?;
            let model = dispatcher
                .on_surface_added(*id, &Local::now())
                .map_err(|e| CliError::Runtime(e.to_string()))?;
            emit_model(cli, *id, &model)
        }
        SurfaceCommand::Remove { id } => {
            let (dispatcher, _log) = build_dispatcher(cli, Arc::new(NoopTimerHost))?;
            dispatcher
                .on_surface_removed(*id)
                .map_err(|e| CliError::Runtime(e.to_string()))?;
            match output_mode(cli) {
                OutputMode::Human => {
                    println!("surface {id} removed");
                    Ok(())
                }
                OutputMode::Json => emit_json(&json!({ "removed": id })),
            }
        }
        SurfaceCommand::List => {
            let config = load_config(cli)?;
            let store = FileCursorStore::open(&config.paths.cursor_file);
            let surfaces: Vec<_> = store
                .surface_ids()
                .into_iter()
                .map(|id| (id, store.get(id)))
                .collect();
            match output_mode(cli) {
                OutputMode::Human => {
                    if surfaces.is_empty() {
                        println!("no known surfaces");
                        return Ok(());
                    }
                    for (id, cursor) in surfaces {
                        let cursor = cursor.map_or_else(|| "-".to_string(), |k| k.to_string());
                        println!("{id:>6}  {cursor}");
                    }
                    Ok(())
                }
                OutputMode::Json => {
                    let entries: Vec<_> = surfaces
                        .into_iter()
                        .map(|(id, cursor)| {
                            json!({ "surface": id, "cursor": cursor.map(|k| k.to_string()) })
                        })
                        .collect();
                    emit_json(&json!({ "surfaces": entries }))
                }
            }
        }
    }
}

fn run_refresh(cli: &Cli) -> Result<(), CliError> {
    let (dispatcher, _log) = build_dispatcher(cli, Arc::new(NoopTimerHost))?;
    let outcome = dispatcher.on_external_trigger(UpdateTrigger::ManualForceToday, &Local::now());

    match output_mode(cli) {
        OutputMode::Human => {
            println!(
                "forced {} surface(s) to {}",
                outcome.updated.len(),
                outcome.today.to_string().bold()
            );
            for (surface, reason) in &outcome.failures {
                eprintln!("{} surface {surface}: {reason}", "warning:".yellow());
            }
            if let Some(warning) = &outcome.schedule_warning {
                eprintln!("{} {warning}", "warning:".yellow());
            }
        }
        OutputMode::Json => {
            emit_json(&json!({
                "trigger": outcome.trigger.label(),
                "today": outcome.today.to_string(),
                "updated": outcome.updated,
                "failures": outcome
                    .failures
                    .iter()
                    .map(|(id, reason)| json!({ "surface": id, "reason": reason }))
                    .collect::<Vec<_>>(),
                "schedule_warning": outcome.schedule_warning,
            }))?;
        }
    }

    if outcome.failures.is_empty() {
        Ok(())
    } else {
        Err(CliError::Partial(format!(
            "{} of {} surfaces failed",
            outcome.failures.len(),
            outcome.failures.len() + outcome.updated.len()
        )))
    }
}

fn run_daemon(cli: &Cli) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let (host, fire_rx) = ThreadTimerHost::new();
    let (dispatcher, log) = build_dispatcher_with(&config, Arc::new(host))?;

    daily_text_engine::daemon::run(&config, &dispatcher, &fire_rx, &log)
        .map_err(|e| CliError::Runtime(e.to_string()))
}

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            let path = cli
                .config
                .clone()
                .unwrap_or_else(Config::default_path);
            println!("{}", path.display());
            Ok(())
        }
        ConfigCommand::Show => {
            let config = load_config(cli)?;
            match output_mode(cli) {
                OutputMode::Human => {
                    let rendered = toml::to_string_pretty(&config)
                        .map_err(|e| CliError::Internal(e.to_string()))?;
                    print!("{rendered}");
                    Ok(())
                }
                OutputMode::Json => emit_json(&serde_json::to_value(&config)?),
            }
        }
        ConfigCommand::Validate => {
            let config = load_config(cli)?;
            let hash = config
                .stable_hash()
                .map_err(|e| CliError::Internal(e.to_string()))?;
            let source = VerseSource::new(&config.paths);
            let entries = source.try_load_index().map(|i| i.len());
            let schedule = source.try_load_schedule().map(|s| s.len());

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{} config hash {hash}", "ok:".green());
                    match &entries {
                        Ok(n) => println!("{} {n} entries", "ok:".green()),
                        Err(e) => println!("{} entries: {e}", "warning:".yellow()),
                    }
                    match &schedule {
                        Ok(n) => println!("{} {n} reading assignments", "ok:".green()),
                        Err(e) => println!("{} reading schedule: {e}", "warning:".yellow()),
                    }
                    Ok(())
                }
                OutputMode::Json => emit_json(&json!({
                    "config_hash": hash,
                    "entries": entries.map_err(|e| e.to_string()).map_or_else(
                        |e| json!({ "error": e }),
                        |n| json!({ "count": n })
                    ),
                    "reading_schedule": schedule.map_err(|e| e.to_string()).map_or_else(
                        |e| json!({ "error": e }),
                        |n| json!({ "count": n })
                    ),
                })),
            }
        }
    }
}

fn emit_version(cli: &Cli) -> Result<(), CliError> {
    match output_mode(cli) {
        OutputMode::Human => {
            println!("dte {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        OutputMode::Json => emit_json(&json!({
            "name": "dte",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    }
}

// ──────────────────── assembly and output helpers ────────────────────

fn load_config(cli: &Cli) -> Result<Config, CliError> {
    Config::load(cli.config.as_deref()).map_err(|e| CliError::User(e.to_string()))
}

fn build_dispatcher(
    cli: &Cli,
    host: Arc<dyn TimerHost>,
) -> Result<(UpdateDispatcher, Arc<ActivityLog>), CliError> {
    let config = load_config(cli)?;
    build_dispatcher_with(&config, host)
}

fn build_dispatcher_with(
    config: &Config,
    host: Arc<dyn TimerHost>,
) -> Result<(UpdateDispatcher, Arc<ActivityLog>), CliError> {
    let store: Arc<dyn CursorStore> = Arc::new(FileCursorStore::open(&config.paths.cursor_file));
    let registry = Arc::new(StoreSurfaceRegistry::new(store.clone()));
    let log = Arc::new(ActivityLog::open(&config.paths.jsonl_log));
    let builder = RenderModelBuilder::new(&config.render)
        .map_err(|e| CliError::Internal(e.to_string()))?;
    let scheduler = Arc::new(RolloverScheduler::new(host, config.scheduler.allow_imprecise));

    let dispatcher = UpdateDispatcher::new(
        VerseSource::new(&config.paths),
        store,
        registry,
        Arc::new(NullRenderSink),
        scheduler,
        builder,
        log.clone(),
    );
    Ok((dispatcher, log))
}

fn parse_date_key(raw: &str) -> Result<MonthDay, CliError> {
    raw.parse()
        .map_err(|_| CliError::User(format!("invalid date key {raw:?}, expected MM-DD")))
}

fn emit_model(cli: &Cli, surface: SurfaceId, model: &RenderModel) -> Result<(), CliError> {
    match output_mode(cli) {
        OutputMode::Human => {
            println!("{}", model.date_label.bold());
            println!("{}", model.title_line.cyan());
            println!();
            println!("{}", strip_markup(&model.body_markup));
            if let (Some(day), Some(range)) = (model.reading_day, model.reading_range.as_deref()) {
                println!();
                println!("reading: day {day} - {range}");
                if let Some(link) = &model.reading_range_link {
                    println!("         {}", link.dimmed());
                }
            }
            println!();
            println!("source: {}", model.source_link.dimmed());
            if model.placeholder {
                eprintln!("{} no entry for {}", "warning:".yellow(), model.key);
            }
            Ok(())
        }
        OutputMode::Json => emit_json(&json!({
            "surface": surface,
            "model": model,
        })),
    }
}

/// Drop the italic/color tags for terminal display.
fn strip_markup(markup: &str) -> String {
    let mut out = String::with_capacity(markup.len());
    let mut in_tag = false;
    for ch in markup.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

fn emit_json(value: &serde_json::Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("DTE_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
