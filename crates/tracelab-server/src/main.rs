//! Binary entrypoint for the tracelab server.
//!
//! - `serve` (default): the HTTP/SSE API, configured from `TRACELAB_*`
//!   environment variables (see [`tracelab_server::config`]).
//! - `exec <file>`: interpret a script with stdin/stdout attached. This is
//!   the sandbox child the server spawns for each run.
//! - `trace <file>`: run the whole pipeline locally and print each envelope
//!   as one JSON line.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use tracelab_check::interpreter::{run_script, with_large_stack, InterpreterConfig};
use tracelab_server::config::ServerConfig;
use tracelab_server::pipeline::{ChannelSink, Pipeline, Stage, Submission};
use tracelab_server::router::build_router;
use tracelab_server::schema::common::parse_topic;
use tracelab_server::state::AppState;

/// Instrumented execution and streaming analysis for Tracelang programs.
#[derive(Parser)]
#[command(name = "tracelab-server", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API (the default).
    Serve {
        /// Listen port (overrides TRACELAB_PORT).
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Interpret a script, reading stdin and writing stdout.
    Exec {
        /// Path to the script.
        file: PathBuf,
    },
    /// Run the analysis pipeline on a script and print envelopes as JSON lines.
    Trace {
        /// Path to the script.
        file: PathBuf,

        /// Topic override, e.g. recursion or graph-bfs.
        #[arg(long)]
        topic: Option<String>,

        /// Entry function for the recursion tracers.
        #[arg(long)]
        entry: Option<String>,

        /// Entry arguments as a JSON array, e.g. '[5]'.
        #[arg(long)]
        args: Option<String>,

        /// File whose contents are fed to the program's stdin.
        #[arg(long)]
        input: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let exit_code = match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => {
            init_tracing();
            serve(port).await
        }
        Commands::Exec { file } => exec(&file),
        Commands::Trace {
            file,
            topic,
            entry,
            args,
            input,
        } => {
            init_tracing();
            trace(&file, topic, entry, args, input).await
        }
    };
    process::exit(exit_code);
}

/// Logs go to stderr so `exec` and `trace` keep stdout for program output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn serve(port: Option<u16>) -> i32 {
    let mut config = ServerConfig::from_env();
    if let Some(port) = port {
        config.port = port;
    }
    let addr = format!("0.0.0.0:{}", config.port);

    let state = match AppState::new(config) {
        Ok(state) => state,
        Err(err) => {
            eprintln!("Error: failed to initialize application state: {}", err);
            return 1;
        }
    };
    let app = build_router(state);

    tracing::info!("tracelab server starting on {}", addr);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("Error: failed to bind {}: {}", addr, err);
            return 1;
        }
    };
    if let Err(err) = axum::serve(listener, app).await {
        eprintln!("Error: server failed: {}", err);
        return 1;
    }
    0
}

/// Sandbox child. The parent enforces the deadline, so the interpreter runs
/// without a step or time limit of its own.
fn exec(file: &Path) -> i32 {
    let source = match std::fs::read_to_string(file) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("Error: failed to read '{}': {}", file.display(), err);
            return 2;
        }
    };
    let mut stdin = String::new();
    if let Err(err) = std::io::stdin().read_to_string(&mut stdin) {
        eprintln!("Error: failed to read stdin: {}", err);
        return 2;
    }

    let config = InterpreterConfig {
        max_recursion_depth: ServerConfig::from_env().max_depth,
        max_steps: None,
        time_limit: None,
        ..InterpreterConfig::default()
    };
    let outcome = with_large_stack(|| {
        run_script(&source, &stdin, config, Box::new(std::io::stdout()))
    });
    match outcome {
        Ok(Ok(())) => 0,
        Ok(Err(err)) => {
            eprintln!("{}", err);
            1
        }
        Err(err) => {
            eprintln!("Error: failed to start interpreter thread: {}", err);
            2
        }
    }
}

async fn trace(
    file: &Path,
    topic: Option<String>,
    entry: Option<String>,
    args: Option<String>,
    input: Option<PathBuf>,
) -> i32 {
    let code = match std::fs::read_to_string(file) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: failed to read '{}': {}", file.display(), err);
            return 2;
        }
    };
    let input = match input.map(std::fs::read_to_string).transpose() {
        Ok(input) => input.unwrap_or_default(),
        Err(err) => {
            eprintln!("Error: failed to read input file: {}", err);
            return 2;
        }
    };
    let topic = match parse_topic(topic.as_deref()) {
        Ok(topic) => topic,
        Err(err) => {
            eprintln!("Error: {}", err);
            return 1;
        }
    };
    let entry_args = match args.as_deref().map(serde_json::from_str::<Vec<JsonValue>>) {
        None => None,
        Some(Ok(values)) => Some(values),
        Some(Err(err)) => {
            eprintln!("Error: --args must be a JSON array: {}", err);
            return 1;
        }
    };

    let pipeline = match Pipeline::from_config(&ServerConfig::from_env()) {
        Ok(pipeline) => pipeline,
        Err(err) => {
            eprintln!("Error: failed to build pipeline: {}", err);
            return 1;
        }
    };
    let submission = Submission {
        code,
        input,
        topic,
        entry_function: entry,
        entry_args,
        concise: true,
    };

    let (tx, mut rx) = mpsc::channel(64);
    let worker = tokio::spawn(async move {
        let sink = ChannelSink::new(tx);
        pipeline.run(submission, &sink).await;
    });

    let mut exit_code = 0;
    while let Some(envelope) = rx.recv().await {
        if envelope.stage == Stage::Error {
            exit_code = 1;
        }
        match serde_json::to_string(&envelope) {
            Ok(line) => println!("{}", line),
            Err(err) => eprintln!("Error: failed to encode envelope: {}", err),
        }
    }
    if let Err(err) = worker.await {
        eprintln!("Error: pipeline task failed: {}", err);
        return 1;
    }
    exit_code
}
