mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{RemoteArgs, EXIT_FAILURE};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use stevedore_core::PollOptions;

#[derive(Debug, Parser)]
#[command(
    name = "stevedore",
    version,
    about = "Move applications between control planes as portable bundles"
)]
struct Cli {
    /// Control plane URL (overrides ~/.config/stevedore/remote.json).
    #[arg(long, global = true)]
    remote: Option<String>,

    /// Bearer token for the control plane.
    #[arg(long, global = true)]
    token: Option<String>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Export an application into a bundle file.
    Export {
        /// Application to export.
        app: String,
        /// Bundle path to write (default: <app>.tgz).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Import a bundle file as a new application.
    Import {
        /// Bundle path to read.
        bundle: PathBuf,
        /// Name of the application to create.
        app: String,
        /// Delay between status reads while waiting for the app to settle.
        #[arg(long, default_value_t = 2000)]
        poll_interval_ms: u64,
        /// Give up waiting for the app to settle after this many seconds.
        #[arg(long, default_value_t = 600)]
        timeout_secs: u64,
    },
    /// Show the contents of a bundle and the import plan it produces.
    Info {
        /// Bundle path to read.
        bundle: PathBuf,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("STEVEDORE_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let remote = RemoteArgs {
        url: cli.remote,
        token: cli.token,
    };
    let json_output = cli.json;

    let result = match cli.command {
        Commands::Export { app, output } => {
            commands::export::run(&app, output.as_deref(), &remote, json_output)
        }
        Commands::Import {
            bundle,
            app,
            poll_interval_ms,
            timeout_secs,
        } => commands::import::run(
            &bundle,
            &app,
            &remote,
            PollOptions {
                interval: Duration::from_millis(poll_interval_ms),
                timeout: Duration::from_secs(timeout_secs),
            },
            json_output,
        ),
        Commands::Info { bundle } => commands::info::run(&bundle, json_output),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
