use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use phytostat::config::AnalysisConfig;
use phytostat::experiments;
use phytostat::pipeline::{AnalysisPipeline, ValidationStrategy};
use phytostat::report::ReportFormat;

#[derive(Parser)]
#[command(name = "phytostat")]
#[command(version, about = "Mixed-model analysis pipelines for plant-pathology experiments", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one experiment's pipeline, or all of them
    Run {
        /// Experiment name (defaults to every experiment)
        #[arg(long)]
        experiment: Option<String>,

        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory holding the experiment CSVs
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Directory for rendered figures
        #[arg(long)]
        figure_dir: Option<PathBuf>,

        /// Report format: text or json
        #[arg(long, default_value = "text")]
        format: String,

        /// Report validation failures but keep running
        #[arg(long)]
        keep_going: bool,
    },

    /// List the known experiments
    List,
}

fn load_config(
    path: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    figure_dir: Option<PathBuf>,
) -> anyhow::Result<AnalysisConfig> {
    let mut config = match path {
        Some(p) => AnalysisConfig::load(&p)?,
        None => AnalysisConfig::default(),
    };
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }
    if let Some(dir) = figure_dir {
        config.figure_dir = dir;
    }
    config.validate()?;
    Ok(config)
}

fn cmd_run(
    experiment: Option<String>,
    config: AnalysisConfig,
    format: ReportFormat,
    validation: ValidationStrategy,
) -> anyhow::Result<()> {
    let defs = match experiment {
        Some(name) => vec![experiments::by_name(&name)?],
        None => experiments::all(),
    };

    let pipeline = AnalysisPipeline::standard(validation);
    let mut failures = Vec::new();

    for def in defs {
        let name = def.name.clone();
        println!(
            "{} {}",
            "Running".bright_cyan().bold(),
            name.bright_white()
        );
        match pipeline.run(def, config.clone()) {
            Ok(ctx) => {
                if let Some(report) = ctx.report {
                    println!("{}", report.render(format)?);
                }
            }
            Err(e) => {
                eprintln!("{} {}: {:#}", "Failed".bright_red().bold(), name, e);
                failures.push(name);
            }
        }
    }

    if !failures.is_empty() {
        anyhow::bail!("{} experiment(s) failed: {}", failures.len(), failures.join(", "));
    }
    Ok(())
}

fn cmd_list() {
    println!("{}", "Experiments".bright_cyan().bold());
    for def in experiments::all() {
        println!(
            "  {} {}",
            def.name.bright_white().bold(),
            def.description.dimmed()
        );
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter_layer = if cli.debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else if cli.verbose {
        tracing_subscriber::EnvFilter::new("info")
    } else {
        tracing_subscriber::EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("phytostat v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Run {
            experiment,
            config,
            data_dir,
            figure_dir,
            format,
            keep_going,
        } => {
            let config = load_config(config, data_dir, figure_dir)?;
            let format = ReportFormat::from_str(&format)?;
            let validation = if keep_going {
                ValidationStrategy::ContinueOnError
            } else {
                ValidationStrategy::StopOnError
            };
            cmd_run(experiment, config, format, validation)?;
        }
        Commands::List => cmd_list(),
    }

    Ok(())
}
