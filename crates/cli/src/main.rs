//! Wannabe CLI, the main entry point.
//!
//! Commands:
//! - `onboard`   Write the default config and project directory
//! - `eval`      Evaluate a template and print the active text
//! - `build`     Print the prompt for a project file
//! - `fit`       Fit a project's prompt against the server
//! - `generate`  Fit, then stream a continuation from the server
//! - `idea`      Brainstorm story details
//! - `doctor`    Check config and server reachability

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "wannabe",
    about = "Wannabe: novel-writing prompt composer for KoboldCpp",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration and project directory
    Onboard,

    /// Evaluate a template (argument, --file, or stdin)
    Eval {
        /// Template text
        text: Option<String>,

        /// Read the template from a file
        #[arg(short, long, conflicts_with = "text")]
        file: Option<PathBuf>,

        /// Report whether this character offset lies in the active region
        #[arg(short, long)]
        position: Option<usize>,

        /// Remove directives only, without choosing alternatives
        #[arg(long)]
        strip: bool,
    },

    /// Print the prompt for a project file
    Build {
        /// Project JSON file
        project: PathBuf,

        /// Generation mode (generate or idea)
        #[arg(short, long, default_value = "generate")]
        mode: String,
    },

    /// Fit a project's prompt into the server's context window
    Fit {
        project: PathBuf,

        #[arg(short, long, default_value = "generate")]
        mode: String,

        /// Tokens reserved for output (defaults to the configured length)
        #[arg(long)]
        max_output: Option<u32>,

        /// Print the fitted prompt as well
        #[arg(long)]
        show_prompt: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fit the prompt, then stream a continuation
    Generate {
        project: PathBuf,

        #[arg(long)]
        max_output: Option<u32>,

        /// Also write the generated text to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Brainstorm story details for a project
    Idea {
        project: PathBuf,

        /// all, title, keywords, genres, synopsis, setting or plot
        #[arg(short, long, default_value = "all")]
        target: String,

        /// safe or fast
        #[arg(short, long, default_value = "safe")]
        method: String,

        /// Write the result back into the project file
        #[arg(long)]
        apply: bool,
    },

    /// Diagnose config and server health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing; logs go to stderr so stdout stays clean for prompts
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Eval {
            text,
            file,
            position,
            strip,
        } => commands::eval::run(text, file, position, strip).await?,
        Commands::Build { project, mode } => commands::build::run(project, mode).await?,
        Commands::Fit {
            project,
            mode,
            max_output,
            show_prompt,
            json,
        } => commands::fit::run(project, mode, max_output, show_prompt, json).await?,
        Commands::Generate {
            project,
            max_output,
            output,
        } => commands::generate::run(project, max_output, output).await?,
        Commands::Idea {
            project,
            target,
            method,
            apply,
        } => commands::idea::run(project, target, method, apply).await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
