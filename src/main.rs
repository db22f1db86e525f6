//! SuperGLUE Eval CLI
//!
//! Few-shot SuperGLUE evaluation of a language model reached through a CLI

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use superglue_eval::{
    compose_prompt, parse_task_list, CommandGenerator, DemonstrationSampler, EvalConfig,
    GeneratorConfig, RecordSource, RemoteRecordSource, ReportBuilder, RougeScorer,
    SuperGlueTask, TaskDataset, TaskRunner, TemplateCatalog,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "superglue-eval")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a model on SuperGLUE tasks
    Evaluate {
        /// Model identifier, substituted for `{model}` in the generator arguments
        #[arg(long)]
        model: String,

        /// Comma-separated task ids
        #[arg(long)]
        tasks: Option<String>,

        /// Records per task [default: 1000]
        #[arg(long)]
        firstn: Option<usize>,

        /// Demonstrations per prompt [default: 3]
        #[arg(long)]
        num_demonstrations: Option<usize>,

        /// Sampling seed [default: 42]
        #[arg(long)]
        seed: Option<u64>,

        /// Directory for downloaded archives [default: .]
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Run configuration file (YAML); flags override it
        #[arg(long)]
        config: Option<PathBuf>,

        /// Template catalog file or glob replacing the built-in catalog
        #[arg(long)]
        templates: Option<String>,

        /// Generator executable [default: ollama]
        #[arg(long)]
        command: Option<String>,

        /// Generator arguments; `{prompt}` places the prompt, otherwise it goes to stdin
        #[arg(long, allow_hyphen_values = true)]
        args: Option<String>,

        /// Disable Porter stemming in ROUGE-L
        #[arg(long)]
        no_stemmer: bool,

        /// Hide progress bars
        #[arg(long)]
        no_progress: bool,

        /// Write the JSON report to this file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Print a markdown summary after the run
        #[arg(long)]
        summary: bool,
    },

    /// List tasks with their data source and templates
    Tasks {
        /// Template catalog file or glob replacing the built-in catalog
        #[arg(long)]
        templates: Option<String>,
    },

    /// Build one dataset and show its statistics and a sample prompt
    Inspect {
        /// Task id
        #[arg(long)]
        task: String,

        /// Template name [default: the task's default template]
        #[arg(long)]
        template: Option<String>,

        /// Records to load
        #[arg(long, default_value = "100")]
        firstn: usize,

        /// Demonstrations in the sample prompt
        #[arg(long, default_value = "3")]
        num_demonstrations: usize,

        /// Sampling seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Directory for downloaded archives
        #[arg(long, default_value = ".")]
        cache_dir: PathBuf,

        /// Template catalog file or glob replacing the built-in catalog
        #[arg(long)]
        templates: Option<String>,
    },
}

#[allow(clippy::too_many_lines)]
fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; stdout carries results only
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Evaluate {
            model,
            tasks,
            firstn,
            num_demonstrations,
            seed,
            cache_dir,
            config,
            templates,
            command,
            args,
            no_stemmer,
            no_progress,
            output,
            summary,
        } => {
            let mut eval_config = match &config {
                Some(path) => EvalConfig::load(path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?,
                None => EvalConfig::default(),
            };

            if let Some(tasks) = tasks {
                eval_config.tasks = parse_task_list(&tasks);
            }
            if let Some(firstn) = firstn {
                eval_config.firstn = Some(firstn);
            }
            if let Some(n) = num_demonstrations {
                eval_config.num_demonstrations = n;
            }
            if let Some(seed) = seed {
                eval_config.seed = seed;
            }
            if let Some(dir) = cache_dir {
                eval_config.cache_dir = dir;
            }
            if let Some(command) = command {
                eval_config.generator = GeneratorConfig::custom(
                    &command,
                    args.as_deref().unwrap_or("{prompt}"),
                );
            } else if let Some(args) = args {
                eval_config.generator.args_template = args;
            }
            if no_stemmer {
                eval_config.use_stemmer = false;
            }
            if no_progress {
                eval_config.progress = false;
            }
            eval_config.validate()?;

            let catalog = load_catalog(
                templates
                    .as_deref()
                    .or_else(|| eval_config.templates.as_deref().and_then(Path::to_str)),
            )?;

            tracing::info!(
                model = %model,
                tasks = %eval_config.tasks.join(","),
                firstn = ?eval_config.firstn,
                num_demonstrations = eval_config.num_demonstrations,
                seed = eval_config.seed,
                "Starting evaluation"
            );

            let source = RemoteRecordSource::new(&eval_config.download_config())?;
            let mut generator = CommandGenerator::new(&model, eval_config.generator.clone());
            let scorer = RougeScorer::new(eval_config.use_stemmer);

            let runner = TaskRunner::new(eval_config, catalog);
            let evaluation = runner.run(&source, &mut generator, &scorer)?;

            let report = ReportBuilder::from_evaluation_report(&evaluation)
                .with_config(runner.config())
                .build();

            if let Some(path) = output {
                report
                    .save_json(&path)
                    .with_context(|| format!("Failed to write report {}", path.display()))?;
                tracing::info!(path = %path.display(), "Report written");
            }
            if summary {
                println!();
                println!("{}", report.to_markdown());
            }
        }
        Commands::Tasks { templates } => {
            let catalog = load_catalog(templates.as_deref())?;

            println!("SuperGLUE Tasks");
            println!("===============");
            for task in SuperGlueTask::ALL {
                let names: Vec<&str> = catalog
                    .templates(task.promptsource_id())
                    .iter()
                    .map(|t| t.name.as_str())
                    .collect();
                println!("{} ({})", task.promptsource_id(), task.name());
                println!("  source: {}", task.source());
                println!("  templates ({}): {}", names.len(), names.join(" | "));
            }
        }
        Commands::Inspect {
            task,
            template,
            firstn,
            num_demonstrations,
            seed,
            cache_dir,
            templates,
        } => {
            let task: SuperGlueTask = task.parse().map_err(anyhow::Error::msg)?;
            let catalog = load_catalog(templates.as_deref())?;
            let name = template.as_deref().unwrap_or_else(|| task.default_template());
            let prompt_template = catalog.get(task.promptsource_id(), name)?;

            let config = EvalConfig {
                cache_dir,
                ..EvalConfig::default()
            };
            let source = RemoteRecordSource::new(&config.download_config())?;
            let records = source.load_records(task, Some(firstn))?;
            let dataset = TaskDataset::build(task, prompt_template, &records, Some(firstn))?;
            let stats = dataset.stats();

            println!("Task: {task} ({})", task.name());
            println!("Template: {}", dataset.template());
            println!("Records: {}", records.len());
            println!("Examples: {} ({} dropped)", stats.total_examples, stats.dropped);
            println!();
            println!("Categories:");
            for (category, count) in stats.categories.iter().take(15) {
                println!("  {category:<20} {count}");
            }
            if stats.categories.len() > 15 {
                println!("  ... and {} more", stats.categories.len() - 15);
            }

            let Some(target) = dataset.examples().first() else {
                bail!("Template '{name}' produced no examples for {task}");
            };
            let mut sampler = DemonstrationSampler::seeded(seed, num_demonstrations);
            let demonstrations = sampler.sample(target, dataset.examples())?;
            println!();
            println!("Sample prompt:");
            println!("{}", compose_prompt(target, &demonstrations));
            println!();
            println!("Reference: {}", target.label);
        }
    }

    Ok(())
}

/// Built-in catalog, or the file / glob given
fn load_catalog(templates: Option<&str>) -> Result<TemplateCatalog> {
    let catalog = match templates {
        Some(pattern) if pattern.contains(['*', '?', '[']) => TemplateCatalog::load_glob(pattern)
            .with_context(|| format!("Failed to load templates {pattern}"))?,
        Some(path) => TemplateCatalog::load(path)
            .with_context(|| format!("Failed to load templates {path}"))?,
        None => TemplateCatalog::builtin()?,
    };
    Ok(catalog)
}
