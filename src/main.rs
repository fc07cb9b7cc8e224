use anyhow::Context;
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use streamad::config::{PipelineConfig, SourceConfig, StopAction};
use streamad::utils::evaluation::Evaluator;
use streamad::{logging, runtime, StreamProcessor};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Streaming anomaly detection over newline-delimited JSON
#[derive(Parser)]
#[command(name = "streamad")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stream samples through the configured model until input ends or Ctrl-C
    Run {
        /// Pipeline configuration file
        #[arg(short, long, env = "STREAMAD_CONFIG")]
        config: PathBuf,

        /// Evaluate after stopping without asking
        #[arg(long)]
        evaluate: bool,
    },
    /// Score previously written result files against labels
    Evaluate {
        #[arg(short, long, env = "STREAMAD_CONFIG")]
        config: PathBuf,
    },
    /// Load the configuration and build the model without streaming
    Validate {
        #[arg(short, long, env = "STREAMAD_CONFIG")]
        config: PathBuf,
    },
}

fn load(path: &Path) -> anyhow::Result<PipelineConfig> {
    PipelineConfig::load(path).with_context(|| format!("loading {}", path.display()))
}

/// With samples on stdin the answer has to come from the controlling terminal.
fn ask_to_evaluate(samples_on_stdin: bool) -> io::Result<bool> {
    if samples_on_stdin {
        let tty = OpenOptions::new().read(true).write(true).open("/dev/tty")?;
        let mut input = io::BufReader::new(tty.try_clone()?);
        let mut output = tty;
        return runtime::confirm_evaluation(&mut input, &mut output);
    }
    runtime::confirm_evaluation(&mut io::stdin().lock(), &mut io::stdout())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run { config, evaluate } => {
            let config = load(&config)?;
            logging::init(&config.logging)?;

            let stop = CancellationToken::new();
            runtime::cancel_on_ctrl_c(stop.clone());
            let summary = runtime::run(&config, stop).await?;
            info!(?summary, "run complete");

            let action = if evaluate {
                StopAction::Evaluate
            } else {
                config.on_stop
            };
            let samples_on_stdin = matches!(config.source, SourceConfig::Stdin);
            let confirm = || -> io::Result<bool> {
                ask_to_evaluate(samples_on_stdin).or_else(|e| {
                    warn!(error = %e, "no terminal to ask on, exiting without evaluation");
                    Ok(false)
                })
            };

            if let Some(report) = runtime::evaluate_after_stop(&config, action, confirm)? {
                println!("{}", report);
            }
        }
        Command::Evaluate { config } => {
            let config = load(&config)?;
            logging::init(&config.logging)?;
            let eval = config
                .evaluation
                .as_ref()
                .context("configuration has no [evaluation] section")?;
            let report = Evaluator::run(eval)?;
            println!("{}", report);
        }
        Command::Validate { config } => {
            let config = load(&config)?;
            logging::init(&config.logging)?;
            StreamProcessor::from_config(&config)?;
            println!("configuration is valid");
        }
    }
    Ok(())
}
