use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use hotconsole::banner::{BannerInfo, print_banner, print_session_summary};
use hotconsole::config::{ClosePolicy, ConsoleConfig, Overrides};
use hotconsole::console::{Console, Flow};
use hotconsole::events::ConsoleEvent;
use hotconsole::interpreter::Interpreter;
use hotconsole::interpreter::script::ScriptInterpreter;
use hotconsole::logging;
use hotconsole::terminal::{RecordingTranscript, StdoutTranscript};

#[derive(Parser)]
#[command(name = "hotconsole", version, about = "Every terminal its own warm thread.")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// What to do with a running command when its terminal closes
    #[arg(long, value_enum)]
    close_policy: Option<ClosePolicy>,

    /// Deepest function call nesting before a stack error
    #[arg(long)]
    max_depth: Option<usize>,

    /// Prompt text
    #[arg(long)]
    prompt: Option<String>,

    /// File name shown in failure traces
    #[arg(long)]
    source_label: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log filter when HOTCONSOLE_LOG is unset (e.g. "debug")
    #[arg(long)]
    log_filter: Option<String>,

    /// Evaluate one command, print the result, and exit
    #[arg(short, long)]
    run: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ConsoleConfig::load(
        cli.config.as_deref(),
        Overrides {
            prompt: cli.prompt,
            close_policy: cli.close_policy,
            max_depth: cli.max_depth,
            source_label: cli.source_label,
            log_file: cli.log_file,
            log_filter: cli.log_filter,
        },
    )?;
    logging::init(&config)?;

    let interpreter: Arc<dyn Interpreter> = Arc::new(ScriptInterpreter::new(config.script()));

    // Single command mode
    if let Some(source) = cli.run {
        return run_once(config, interpreter, &source).await;
    }

    let log_label = match &config.log_file {
        Some(path) => path.display().to_string(),
        None => format!("stderr ({})", config.log_filter),
    };
    print_banner(&BannerInfo {
        interpreter: interpreter.name(),
        close_policy: config.close_policy,
        max_depth: config.max_depth,
        log: &log_label,
    });

    let transcript = Arc::new(StdoutTranscript::new(config.prompt.clone()));
    let (mut console, mut events) = Console::new(config, interpreter, transcript)?;

    // Async stdin so Ctrl+C and worker events are handled at the prompt too
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        tokio::select! {
            result = lines.next_line() => {
                match result {
                    Ok(Some(line)) => {
                        if console.handle_line(&line).await == Flow::Quit {
                            break;
                        }
                    }
                    Ok(None) => {
                        // Ctrl+D (EOF)
                        println!();
                        console.shutdown();
                        break;
                    }
                    Err(e) => {
                        eprintln!("input error: {e}");
                        console.shutdown();
                        break;
                    }
                }
            }
            Some(event) = events.recv() => console.handle_event(event),
            _ = tokio::signal::ctrl_c() => {
                println!();
                console.shutdown();
                break;
            }
        }
    }

    print_session_summary(console.stats());
    Ok(())
}

async fn run_once(
    config: ConsoleConfig,
    interpreter: Arc<dyn Interpreter>,
    source: &str,
) -> anyhow::Result<()> {
    anyhow::ensure!(
        !source.trim_start().starts_with('/'),
        "--run takes source text, not a console command"
    );
    if source.trim().is_empty() {
        return Ok(());
    }

    let transcript = Arc::new(RecordingTranscript::new());
    let (mut console, mut events) = Console::new(config, interpreter, transcript.clone())?;
    let id = console.active().context("no terminal to run in")?;

    console.handle_line(source).await;
    while let Some(event) = events.recv().await {
        let done = matches!(
            event,
            ConsoleEvent::Result { .. } | ConsoleEvent::WorkerDied { .. }
        );
        console.handle_event(event);
        if done {
            break;
        }
    }

    print!("{}", transcript.output(id));
    for text in transcript.results(id) {
        print!("{text}");
    }
    console.shutdown();
    Ok(())
}
