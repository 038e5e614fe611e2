pub mod commands;
pub mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use lessonscan_core::{CourseWorkKind, ExtractionType, ProgressTracker};

use crate::error::{CommandResult, ResultExt};

#[derive(Parser, Debug)]
#[command(name = "lessonscan")]
#[command(about = "Turn scanned worksheets, quizzes and student work into structured data")]
pub struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run OCR and structured extraction on one or more images
    Process {
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// educational_content, form_data, student_work or general
        #[arg(short = 't', long = "type", default_value = "general")]
        extraction_type: String,

        /// Clean up the image before OCR
        #[arg(long)]
        preprocess: bool,

        /// Write the JSON output to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also save each result as {type}_{timestamp}.json in this directory
        #[arg(long)]
        save_dir: Option<PathBuf>,
    },
    /// Check that an image can be processed
    Validate { image: PathBuf },
    /// List supported extraction types
    Types,
    /// Convert a saved result into a Google Classroom coursework payload
    Coursework {
        result: PathBuf,

        /// material, quiz or assignment
        #[arg(long, default_value = "material")]
        kind: CourseWorkKind,

        /// Due date in days from today
        #[arg(long)]
        due_days: Option<u32>,
    },
}

/// Initialize tracing/logging with the given directives.
///
/// Logs go to stderr so command output on stdout stays valid JSON.
pub fn init_logging(directives: &[&str]) {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in directives {
        match directive.parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("Ignoring log directive '{}': {}", directive, e),
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub async fn run(cli: Cli) -> CommandResult<ExitCode> {
    match cli.command {
        Commands::Process {
            images,
            extraction_type,
            preprocess,
            output,
            save_dir,
        } => {
            let config = commands::load_config(cli.config.as_deref())?;
            let mut pipeline = commands::build_pipeline(config)?;
            let extraction_type = ExtractionType::parse(&extraction_type);

            let reporter = if images.len() > 1 {
                let (tracker, rx) = ProgressTracker::new();
                pipeline = pipeline.with_progress(tracker);
                Some(commands::spawn_progress_reporter(rx))
            } else {
                None
            };

            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());

            let result =
                commands::process(&pipeline, images, extraction_type, preprocess, &cancel).await?;

            // Dropping the pipeline closes the progress channel
            drop(pipeline);
            if let Some(reporter) = reporter {
                let _ = reporter.await;
            }

            if let Some(dir) = save_dir {
                commands::save_results(&dir, extraction_type, result.results(), chrono::Local::now())?;
            }
            match output {
                Some(path) => commands::write_output(&result, &path)?,
                None => print_json(&result)?,
            }

            Ok(if result.all_failed() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
        Commands::Validate { image } => {
            let config = commands::load_config(cli.config.as_deref())?;
            let validation = commands::validate(&config, image).await?;
            print_json(&validation)?;
            Ok(if validation.valid {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Types => {
            print_json(&commands::types())?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Coursework {
            result,
            kind,
            due_days,
        } => {
            let today = chrono::Local::now().date_naive();
            let work = commands::coursework(&result, kind, due_days, today)?;
            print_json(&work)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> CommandResult<()> {
    let json = serde_json::to_string_pretty(value).internal_err()?;
    println!("{}", json);
    Ok(())
}

/// Cancel `token` on the first Ctrl+C
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling remaining work");
            token.cancel();
        }
    });
}
