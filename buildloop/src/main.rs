//! Bounded agent build-loop driver.
//!
//! Reads a markdown task list, repeatedly invokes a coding agent on it, and
//! stops on a completion promise, the iteration cap, a timeout, or an
//! unexplained agent failure. Run parameters are snapshotted to
//! `.buildloop/session.json` so an interrupted run can be resumed.

use std::env;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use buildloop::exit_codes;
use buildloop::io::agent::ClaudeAgent;
use buildloop::io::config::{LoopConfig, config_path, load_config, write_config};
use buildloop::io::discovery::resolve_agent_program;
use buildloop::io::notify::{RunReport, notify_run_finished};
use buildloop::io::session::{SessionRecord, load_session, save_session, session_path};
use buildloop::runloop::{RunConfig, run_loop};
use buildloop::validate::{normalize_path, validate_run_config};
use buildloop::{logging, runloop};

#[derive(Parser)]
#[command(
    name = "buildloop",
    version,
    about = "Drive a coding agent through a markdown task list, one task per iteration"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Markdown task list to work through. Prompted for when omitted.
    #[arg(long)]
    tasks: Option<String>,

    /// Additional files the agent should read before planning.
    #[arg(long, num_args = 0..)]
    context: Vec<String>,

    /// Iteration cap for this run.
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Per-iteration timeout in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Skip the completion notification.
    #[arg(long)]
    no_notify: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default `.buildloop/config.toml`.
    Init {
        /// Overwrite an existing config file.
        #[arg(short, long)]
        force: bool,
    },
    /// Re-run with the parameters saved by the previous run.
    Resume {
        /// Skip the confirmation prompt.
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::CONFIG
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let cwd = env::current_dir().context("determine working directory")?;
    let loop_config = load_config(&config_path(&cwd))?;

    match &cli.command {
        Some(Command::Init { force }) => cmd_init(&cwd, *force),
        Some(Command::Resume { yes }) => cmd_resume(&cwd, &loop_config, *yes, &cli),
        None => cmd_run(&cwd, &loop_config, &cli),
    }
}

fn cmd_init(cwd: &Path, force: bool) -> Result<i32> {
    let path = config_path(cwd);
    if !force && path.exists() {
        println!("Config already exists at {}", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(&path, &LoopConfig::default())?;
    println!("Wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_run(cwd: &Path, loop_config: &LoopConfig, cli: &Cli) -> Result<i32> {
    let (tasks, context) = match &cli.tasks {
        Some(tasks) => (tasks.clone(), cli.context.clone()),
        None => prompt_for_inputs()?,
    };
    let max_iterations = match cli.max_iterations {
        Some(n) => n,
        None if cli.tasks.is_some() => loop_config.max_iterations,
        None => prompt_for_max_iterations(loop_config.max_iterations)?,
    };

    let config = RunConfig {
        tasks_file: PathBuf::from(normalize_path(&tasks)),
        context_files: context
            .iter()
            .map(|path| PathBuf::from(normalize_path(path)))
            .collect(),
        max_iterations,
        timeout: effective_timeout(cli.timeout_secs, loop_config.timeout_secs),
    };

    execute(cwd, loop_config, config, cli.no_notify)
}

fn cmd_resume(cwd: &Path, loop_config: &LoopConfig, yes: bool, cli: &Cli) -> Result<i32> {
    let Some(record) = load_session(cwd) else {
        eprintln!("No saved session found at {}", session_path(cwd).display());
        return Ok(exit_codes::CONFIG);
    };

    println!("Resuming previous session:");
    println!("{}", record.describe());
    if !yes && !confirm("Continue?")? {
        println!("Aborted.");
        return Ok(exit_codes::OK);
    }

    let config = RunConfig {
        tasks_file: record.tasks_file,
        context_files: record.context_files,
        max_iterations: record.max_iterations,
        timeout: effective_timeout(cli.timeout_secs, loop_config.timeout_secs),
    };
    execute(cwd, loop_config, config, cli.no_notify)
}

/// CLI flag beats the config file; either side may leave the timeout unset.
fn effective_timeout(flag: Option<u64>, config: Option<u64>) -> Option<Duration> {
    flag.or(config).map(Duration::from_secs)
}

/// Validate, snapshot the session, run the loop, and report.
fn execute(
    cwd: &Path,
    loop_config: &LoopConfig,
    mut config: RunConfig,
    no_notify: bool,
) -> Result<i32> {
    let errors = validate_run_config(&config);
    if !errors.is_empty() {
        for error in &errors {
            eprintln!("error: {error}");
        }
        return Ok(exit_codes::CONFIG);
    }

    // Canonical paths keep the session record valid when resumed from a
    // different working directory.
    config.tasks_file = config
        .tasks_file
        .canonicalize()
        .with_context(|| format!("canonicalize {}", config.tasks_file.display()))?;
    for path in &mut config.context_files {
        *path = path
            .canonicalize()
            .with_context(|| format!("canonicalize {}", path.display()))?;
    }

    let record = SessionRecord::new(
        config.tasks_file.clone(),
        config.context_files.clone(),
        config.max_iterations,
        cwd.to_path_buf(),
    );
    save_session(cwd, &record)?;

    let program = resolve_agent_program(cwd, loop_config.agent_program.as_deref());
    let agent = ClaudeAgent::new(program);

    let outcome = run_loop(&config, &agent, |_| {});

    // Every loop outcome prints a summary; driver-internal errors propagate
    // bare and are rendered by `main`.
    match outcome {
        Ok(outcome) => {
            println!();
            println!("{}", outcome.stats.render_summary());
            let notify_handle = (loop_config.notify && !no_notify).then(|| {
                notify_run_finished(RunReport {
                    project: project_name(cwd),
                    completed: outcome.stats.completed,
                    elapsed: outcome.stats.elapsed_display(),
                    success: outcome.stop.is_success(),
                })
            });
            report_stop(&outcome.stop);
            // `main` calls `process::exit`, which kills any thread still
            // running; the dispatch must finish first.
            if let Some(handle) = notify_handle {
                let _ = handle.join();
            }
            Ok(outcome.stop.exit_code())
        }
        Err(err) => Err(err),
    }
}

fn report_stop(stop: &runloop::RunStop) {
    match stop {
        runloop::RunStop::BuildComplete { iteration } => {
            println!("Finished: build complete after {iteration} iteration(s).");
        }
        runloop::RunStop::Exhausted { max_iterations } => {
            println!("Finished: iteration cap ({max_iterations}) reached, build incomplete.");
        }
        runloop::RunStop::AgentNotFound { program } => {
            println!("Finished: agent '{program}' not found.");
        }
        runloop::RunStop::TimedOut { iteration } => {
            println!("Finished: iteration {iteration} timed out.");
        }
        runloop::RunStop::AgentFailed { iteration, exit_code } => {
            println!("Finished: agent failed on iteration {iteration} (exit code {exit_code}).");
        }
    }
}

fn project_name(cwd: &Path) -> String {
    cwd.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "buildloop".to_string())
}

/// Interactive fallback when `--tasks` is omitted.
fn prompt_for_inputs() -> Result<(String, Vec<String>)> {
    let tasks = loop {
        let answer = ask("Tasks file: ")?;
        if !answer.is_empty() {
            break answer;
        }
        println!("A tasks file is required.");
    };
    let context_answer = ask("Context files (comma-separated, empty for none): ")?;
    let context = context_answer
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    Ok((tasks, context))
}

fn prompt_for_max_iterations(default: u32) -> Result<u32> {
    loop {
        let answer = ask(&format!("Max iterations [{default}]: "))?;
        if answer.is_empty() {
            return Ok(default);
        }
        match answer.parse::<u32>() {
            Ok(n) if n > 0 => return Ok(n),
            _ => println!("Enter a positive number."),
        }
    }
}

fn confirm(question: &str) -> Result<bool> {
    let answer = ask(&format!("{question} [y/N]: "))?;
    Ok(matches!(answer.to_lowercase().as_str(), "y" | "yes"))
}

fn ask(prompt: &str) -> Result<String> {
    print!("{prompt}");
    io::stdout().flush().context("flush stdout")?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("read stdin")?;
    Ok(line.trim().to_string())
}
