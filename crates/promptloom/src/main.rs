//! Command-line front end for promptloom.
//!
//! # Examples
//!
//! ```sh
//! # One prompt from flags
//! promptloom generate --inspiration "answer in metric units" \
//!     --must-include "Always confirm before deleting files." --seed 7
//!
//! # Five prompts from a request file, one per user context, as JSON
//! promptloom generate --request request.json --contexts users.json --count 5 --json
//!
//! # Check a hand-edited structure
//! promptloom validate structure.txt
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use promptloom::prelude::*;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Structured system prompt generator.
#[derive(Parser)]
#[command(name = "promptloom", version)]
struct Cli {
    /// Log debug detail to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate one or more prompts.
    Generate(GenerateArgs),
    /// Parse a markup structure and report violations and coverage.
    Validate {
        /// Markup file.
        file: PathBuf,
    },
    /// Expand an existing markup structure into prose.
    Populate {
        /// Markup file.
        file: PathBuf,
        #[command(flatten)]
        literals: LiteralArgs,
        /// Reject documents shorter than this many characters.
        #[arg(long)]
        min_chars: Option<usize>,
    },
    /// List every block with its definition.
    Catalog,
    /// Print a JSON Schema.
    Schema {
        #[arg(value_enum, default_value_t = SchemaKind::Structure)]
        kind: SchemaKind,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SchemaKind {
    Structure,
    Request,
    Contexts,
}

/// Request fields settable from flags. They extend or override `--request`.
#[derive(clap::Args)]
struct LiteralArgs {
    /// Literal appended to the last paragraph.
    #[arg(long)]
    must_include: Option<String>,

    /// Name of the user the prompt addresses.
    #[arg(long)]
    persona: Option<String>,

    /// Tool name that must not appear in the document (repeatable).
    #[arg(long = "tool")]
    tools: Vec<String>,
}

#[derive(clap::Args)]
struct GenerateArgs {
    /// JSON request file.
    #[arg(long)]
    request: Option<PathBuf>,

    /// Fragment to embed word for word (repeatable).
    #[arg(long)]
    inspiration: Vec<String>,

    #[command(flatten)]
    literals: LiteralArgs,

    /// System setting folded into the context block (repeatable).
    #[arg(long = "setting")]
    settings: Vec<String>,

    /// JSON file holding five user contexts.
    #[arg(long)]
    contexts: Option<PathBuf>,

    /// Zero-based context to use. With `--count`, contexts rotate from here.
    #[arg(long, default_value_t = 0, requires = "contexts")]
    context_index: usize,

    /// Exact paragraph count (6 to 8). Random within range when unset.
    #[arg(long)]
    paragraphs: Option<usize>,

    /// Base seed for reproducible output.
    #[arg(long)]
    seed: Option<u64>,

    /// Reject documents shorter than this many characters (1500 is a
    /// typical floor). Short documents count as a failed attempt.
    #[arg(long)]
    min_chars: Option<usize>,

    /// Attempt budget per prompt.
    #[arg(long, default_value_t = 5)]
    max_attempts: u32,

    /// Number of prompts to generate concurrently.
    #[arg(long, default_value_t = 1)]
    count: usize,

    /// Print full reports as JSON.
    #[arg(long)]
    json: bool,

    /// Print the markup structure and coverage before each document.
    #[arg(long)]
    show_structure: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(level),
        )
        .init();

    match run(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> promptloom::Result<ExitCode> {
    match command {
        Command::Generate(args) => generate(args).await,
        Command::Validate { file } => validate(&file),
        Command::Populate {
            file,
            literals,
            min_chars,
        } => populate(&file, literals, min_chars),
        Command::Catalog => {
            print!("{}", BlockCatalog::standard());
            Ok(ExitCode::SUCCESS)
        }
        Command::Schema { kind } => {
            let schema = match kind {
                SchemaKind::Structure => json_schema_for::<PromptStructure>(),
                SchemaKind::Request => json_schema_for::<PromptRequest>(),
                SchemaKind::Contexts => json_schema_for::<UserContextSet>(),
            };
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

// ── generate ───────────────────────────────────────────────────────

async fn generate(args: GenerateArgs) -> promptloom::Result<ExitCode> {
    let pipeline = Pipeline::new(pipeline_config(&args));
    let mut request = match &args.request {
        Some(path) => PromptRequest::load(path)?,
        None => PromptRequest::default(),
    };
    request.inspiration.extend(args.inspiration);
    request.tool_names.extend(args.literals.tools);
    request.system_settings.extend(args.settings);
    if args.literals.must_include.is_some() {
        request.must_include = args.literals.must_include;
    }
    if args.literals.persona.is_some() {
        request.persona = args.literals.persona;
    }

    let contexts = args.contexts.as_ref().map(UserContextSet::load).transpose()?;
    if let Some(set) = &contexts {
        set.get(args.context_index)?;
    }

    let count = args.count.max(1);
    let jobs: Vec<BatchJob> = (0..count)
        .map(|i| {
            let user = contexts.as_ref().and_then(|set| {
                set.contexts
                    .get((args.context_index + i) % set.contexts.len().max(1))
                    .cloned()
            });
            BatchJob::new(request.clone()).with_user(user)
        })
        .collect();

    let outcomes = if count == 1 {
        let job = &jobs[0];
        vec![pipeline.run(&job.request, job.user.as_ref())]
    } else {
        let cancel = CancelFlag::new();
        let ctrl_c = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                ctrl_c.cancel();
            }
        });
        run_batch(&pipeline, jobs, cancel).await
    };

    let mut failed = 0;
    let mut reports = Vec::new();
    for (i, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(report) => reports.push(report),
            Err(e) => {
                failed += 1;
                eprintln!("Error: prompt {}: {e}", i + 1);
            }
        }
    }

    if args.json {
        let out = if count == 1 && reports.len() == 1 {
            serde_json::to_string_pretty(&reports[0])?
        } else {
            serde_json::to_string_pretty(&reports)?
        };
        println!("{out}");
    } else {
        for (i, report) in reports.iter().enumerate() {
            if i > 0 {
                println!("\n{}\n", "-".repeat(60));
            }
            if args.show_structure {
                println!("{}\n", report.markup);
                println!("{}\n", CoverageReport::analyze(&report.structure, pipeline.catalog()));
            }
            println!("{}", report.document);
        }
    }

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn pipeline_config(args: &GenerateArgs) -> PipelineConfig {
    let mut config = PipelineConfig::default().with_max_attempts(args.max_attempts);
    if let Some(n) = args.paragraphs {
        config = config.with_exact_paragraphs(n);
    }
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }
    if let Some(min) = args.min_chars {
        config = config.with_min_chars(min);
    }
    config
}

// ── validate / populate ────────────────────────────────────────────

fn validate(file: &Path) -> promptloom::Result<ExitCode> {
    let catalog = BlockCatalog::standard();
    let structure = parse_markup(&std::fs::read_to_string(file)?, catalog)?;
    let violations = validate_structure(&structure, catalog);

    println!("{}", CoverageReport::analyze(&structure, catalog));
    println!();
    if violations.is_empty() {
        println!("✅ Structure valid ({} paragraphs)", structure.len());
        return Ok(ExitCode::SUCCESS);
    }
    println!("❌ {} violation(s):", violations.len());
    for v in &violations {
        println!("  - {v}");
    }
    Ok(ExitCode::from(2))
}

fn populate(file: &Path, literals: LiteralArgs, min_chars: Option<usize>) -> promptloom::Result<ExitCode> {
    let mut config = PipelineConfig::default();
    if let Some(min) = min_chars {
        config = config.with_min_chars(min);
    }
    let pipeline = Pipeline::new(config);
    let structure = parse_markup(&std::fs::read_to_string(file)?, pipeline.catalog())?;
    let request = PromptRequest {
        must_include: literals.must_include,
        persona: literals.persona,
        tool_names: literals.tools,
        ..Default::default()
    };
    request.check(pipeline.catalog())?;
    let options = PopulateOptions::default()
        .with_persona(request.persona)
        .with_must_include(request.must_include)
        .with_tool_names(request.tool_names);
    let (document, _) = pipeline.populate(&structure, &options)?;
    println!("{document}");
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generate_args(argv: &[&str]) -> GenerateArgs {
        let cli = Cli::try_parse_from(["promptloom", "generate"].into_iter().chain(argv.iter().copied())).unwrap();
        match cli.command {
            Command::Generate(args) => args,
            _ => unreachable!(),
        }
    }

    #[test]
    fn min_chars_reaches_the_pipeline() {
        let config = pipeline_config(&generate_args(&["--min-chars", "1500", "--seed", "4"]));
        assert_eq!(config.min_chars, Some(1500));
        assert_eq!(config.seed, Some(4));

        let config = pipeline_config(&generate_args(&[]));
        assert_eq!(config.min_chars, None);
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn populate_accepts_min_chars() {
        let cli = Cli::try_parse_from(["promptloom", "populate", "s.txt", "--min-chars", "800"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Populate {
                min_chars: Some(800),
                ..
            }
        ));
    }
}
