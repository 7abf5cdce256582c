//! CLI entry point for trialflow
//!
//! Provides a command-line interface for:
//! - Compiling an experiment document into a runnable script
//! - Checking a document for structural problems
//! - Inspecting a document as a JSON summary
//! - Writing a small demo experiment to start from
//!
//! # Usage
//!
//! ```bash
//! trialflow new stroop.tfexp
//! trialflow compile stroop.tfexp -o stroop.py
//! trialflow --config trialflow.toml inspect stroop.tfexp
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indexmap::IndexMap;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

use trialflow::components::code::{CodeComponent, BEGIN_ROUTINE, EACH_FRAME};
use trialflow::config::BuilderConfig;
use trialflow::document::DOCUMENT_EXTENSION;
use trialflow::{logging, Experiment, Routine, TrialHandler, Value};

#[derive(Parser)]
#[command(name = "trialflow")]
#[command(about = "Build experiment scripts from experiment documents", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./trialflow.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the script for an experiment document
    Compile {
        /// Experiment document
        document: PathBuf,

        /// Write the script here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Load a document and check its flow and routines
    Check {
        /// Experiment document
        document: PathBuf,
    },

    /// Print a JSON summary of a document
    Inspect {
        /// Experiment document
        document: PathBuf,
    },

    /// Write a demo experiment document
    New {
        /// Where to write the document (`.tfexp` is added when there is no extension)
        document: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => BuilderConfig::load_from(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => BuilderConfig::load().context("Failed to load configuration")?,
    };
    config.validate().map_err(anyhow::Error::msg)?;
    logging::init_from_config(&config).map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Compile { document, output } => compile(&config, &document, output.as_deref()),
        Commands::Check { document } => check(&config, &document),
        Commands::Inspect { document } => inspect(&config, &document),
        Commands::New { document, force } => new_document(&config, &document, force),
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn load(config: &BuilderConfig, document: &Path) -> Result<Experiment> {
    let mut experiment = Experiment::with_config(config);
    experiment
        .read_xml_file(document)
        .with_context(|| format!("Failed to load {}", document.display()))?;
    Ok(experiment)
}

fn compile(config: &BuilderConfig, document: &Path, output: Option<&Path>) -> Result<()> {
    let experiment = load(config, document)?;
    let script = experiment
        .write_script()
        .with_context(|| format!("Failed to generate script for {}", document.display()))?;
    match output {
        Some(path) => {
            std::fs::write(path, &script)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "wrote script");
        }
        None => print!("{script}"),
    }
    Ok(())
}

fn check(config: &BuilderConfig, document: &Path) -> Result<()> {
    let experiment = load(config, document)?;
    let depth = experiment.flow().validate()?;
    for (name, routine) in experiment.routines() {
        routine
            .max_time()
            .with_context(|| format!("Routine '{name}' has no valid duration"))?;
    }
    experiment.write_script()?;
    println!(
        "{}: ok ({} routines, {} flow elements, loop depth {})",
        document.display(),
        experiment.routines().len(),
        experiment.flow().len(),
        depth
    );
    Ok(())
}

fn inspect(config: &BuilderConfig, document: &Path) -> Result<()> {
    let experiment = load(config, document)?;
    let routines: Vec<_> = experiment
        .routines()
        .iter()
        .map(|(name, routine)| {
            let components: Vec<_> = routine
                .components()
                .iter()
                .map(|c| json!({ "name": c.name(), "type": c.component_type() }))
                .collect();
            json!({
                "name": name,
                "duration": routine.max_time().ok(),
                "components": components,
            })
        })
        .collect();
    let loops: Vec<_> = experiment
        .flow()
        .loops()
        .map(|l| json!({ "name": l.name(), "type": l.loop_type(), "params": l.params() }))
        .collect();

    let summary = json!({
        "name": experiment.name(),
        "version": experiment.version(),
        "libraries": experiment.required_libs(),
        "routines": routines,
        "loops": loops,
        "flow": experiment.flow().elements(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn new_document(config: &BuilderConfig, document: &Path, force: bool) -> Result<()> {
    let document = &document_path(document);
    if document.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", document.display());
    }
    let name = document
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "demo".to_string());
    let experiment = demo_experiment(config, &name);
    experiment
        .save_to_xml(document)
        .with_context(|| format!("Failed to write {}", document.display()))?;
    println!("wrote {}", document.display());
    Ok(())
}

/// `document` with the experiment extension added when it has none.
fn document_path(document: &Path) -> PathBuf {
    if document.extension().is_some() {
        document.to_path_buf()
    } else {
        document.with_extension(DOCUMENT_EXTENSION)
    }
}

/// Instructions, a repeated trial counting its frames, and a goodbye screen.
fn demo_experiment(config: &BuilderConfig, exp_name: &str) -> Experiment {
    let mut experiment = Experiment::with_config(config);
    experiment.set_exp_name(exp_name);

    let mut instructions = Routine::new("instructions");
    instructions.add_component(Box::new(
        CodeComponent::new("intro")
            .with_times(Value::List(vec![Value::Float(0.0), Value::Float(2.0)])),
    ));

    let mut trial = Routine::new("trial");
    trial.add_component(Box::new(
        CodeComponent::new("counter")
            .with_times(Value::List(vec![Value::Float(0.0), Value::Float(1.5)]))
            .with_code(BEGIN_ROUTINE, "frames=0")
            .with_code(EACH_FRAME, "frames+=1"),
    ));

    let thanks = Routine::new("thanks");

    for (pos, routine) in [instructions, trial, thanks].into_iter().enumerate() {
        let name = routine.name().to_string();
        experiment.flow_mut().add_routine(&name, pos);
        experiment.add_routine(&name, Some(routine));
    }

    let conditions = ["left", "right"]
        .into_iter()
        .map(|side| {
            let mut condition = IndexMap::new();
            condition.insert("side".to_string(), Value::from(side));
            condition
        })
        .collect();
    experiment.add_loop(
        TrialHandler::new("trials", "random", 5)
            .with_trial_list(conditions)
            .into(),
        1,
        2,
    );
    experiment
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_documents_get_the_experiment_extension() {
        assert_eq!(document_path(Path::new("stroop")), PathBuf::from("stroop.tfexp"));
        assert_eq!(document_path(Path::new("stroop.xml")), PathBuf::from("stroop.xml"));
    }
}
