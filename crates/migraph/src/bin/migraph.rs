use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use migraph::config;
use migraph::context;
use migraph::extraction::{self, ExtractionPhase, ExtractionProgress, Extractor};
use migraph::graph::DependencyGraph;
use migraph::knowledge;
use migraph::types::{ContextFormat, MigraphConfig, NodeSummary};
use migraph::{Error, Result};

#[derive(Debug, Parser)]
#[command(name = "migraph")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Structural extraction and dependency graphs for Java migrations")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create .migraph/ with a default config
    Init(InitArgs),
    /// Extract sources, build the graph and export the knowledge base
    Analyze(AnalyzeArgs),
    /// Print the dependency-first migration order
    Order(OrderArgs),
    /// Print circular dependencies
    Cycles(PathArgs),
    /// Print the nodes within a number of hops of a node
    Neighbors(NeighborsArgs),
    /// Print the migration context for a node
    Context(ContextArgs),
    /// Print complexity metrics as JSON
    Metrics(PathArgs),
    /// Attach summaries from a JSON file and re-export
    Summarize(SummarizeArgs),
}

#[derive(Debug, Args)]
struct InitArgs {
    path: Option<PathBuf>,
    /// Extra include glob, repeatable
    #[arg(long = "include")]
    include: Vec<String>,
    /// Extra exclude glob, repeatable
    #[arg(long = "exclude")]
    exclude: Vec<String>,
}

#[derive(Debug, Args)]
struct AnalyzeArgs {
    path: Option<PathBuf>,
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

#[derive(Debug, Args)]
struct PathArgs {
    #[arg(short = 'p', long = "path")]
    path: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct OrderArgs {
    #[arg(short = 'p', long = "path")]
    path: Option<PathBuf>,
    #[arg(short = 'j', long = "json")]
    json: bool,
}

#[derive(Debug, Args)]
struct NeighborsArgs {
    name: String,
    #[arg(short = 'd', long = "depth", default_value_t = 1)]
    depth: usize,
    #[arg(short = 'p', long = "path")]
    path: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ContextArgs {
    name: String,
    #[arg(short = 'd', long = "depth")]
    depth: Option<usize>,
    #[arg(short = 'f', long = "format", default_value = "markdown")]
    format: String,
    #[arg(short = 'p', long = "path")]
    path: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct SummarizeArgs {
    file: PathBuf,
    #[arg(short = 'p', long = "path")]
    path: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Command::Init(args) => run_init(args),
        Command::Analyze(args) => run_analyze(args),
        Command::Order(args) => run_order(args),
        Command::Cycles(args) => run_cycles(args),
        Command::Neighbors(args) => run_neighbors(args),
        Command::Context(args) => run_context(args),
        Command::Metrics(args) => run_metrics(args),
        Command::Summarize(args) => run_summarize(args),
    };

    if let Err(err) = result {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_init(args: InitArgs) -> Result<()> {
    let project_root = resolve_project_root(args.path);

    if is_initialized(&project_root) {
        eprintln!("migraph already initialized in {}", project_root.display());
        return Ok(());
    }

    create_migraph_dir(&project_root)?;
    let mut cfg = config::create_default_config(&project_root);
    config::add_include_patterns(&mut cfg, &args.include);
    config::add_exclude_patterns(&mut cfg, &args.exclude);
    config::save_config(&project_root, &cfg)?;

    println!("Initialized migraph in {}", project_root.display());
    Ok(())
}

fn run_analyze(args: AnalyzeArgs) -> Result<()> {
    let project_root = resolve_project_root(args.path);
    let cfg = config::load_config(&project_root)?;

    let bar = if args.quiet {
        None
    } else {
        Some(progress_bar())
    };
    let on_progress = |progress: ExtractionProgress| {
        if let Some(bar) = &bar {
            update_progress(bar, &progress);
        }
    };

    let extractor = Extractor::new();
    let report = extraction::extract_project(&project_root, &cfg, &extractor, Some(&on_progress));
    if let Some(bar) = &bar {
        bar.finish_and_clear();
    }

    let graph = DependencyGraph::build_with(&report.elements, cfg.key_strategy);
    graph.log_analysis();

    let kb_path = config::knowledge_base_path(&project_root, &cfg);
    knowledge::export(&graph, &kb_path)?;

    if !args.quiet {
        let metrics = graph.complexity_metrics();
        println!("Scanned {} files", report.files_scanned);
        println!("Extracted {} elements", report.elements.len());
        if !report.fallback_files.is_empty() {
            println!("Fallback used for {} files", report.fallback_files.len());
        }
        if !report.skipped_files.is_empty() {
            println!("Skipped {} files", report.skipped_files.len());
        }
        println!("Graph: {} nodes, {} cycles", metrics.total_nodes, metrics.circular_dependencies);
        println!("Knowledge base: {}", kb_path.display());
        println!("Completed in {}ms", report.duration_ms);
    }
    Ok(())
}

fn run_order(args: OrderArgs) -> Result<()> {
    let graph = load_graph(args.path)?.1;
    let order = graph.migration_order();
    let unorderable = graph.unorderable_nodes();

    if args.json {
        let json = serde_json::json!({
            "order": order,
            "unorderable": unorderable,
        });
        println!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
        return Ok(());
    }

    for (index, name) in order.iter().enumerate() {
        println!("{:>4}. {name}", index + 1);
    }
    if !unorderable.is_empty() {
        println!("\nOn or behind a cycle ({}):", unorderable.len());
        for name in unorderable {
            println!("  {name}");
        }
    }
    Ok(())
}

fn run_cycles(args: PathArgs) -> Result<()> {
    let graph = load_graph(args.path)?.1;
    let cycles = graph.find_cycles();
    if cycles.is_empty() {
        println!("No circular dependencies");
        return Ok(());
    }

    println!("Found {} circular dependencies:\n", cycles.len());
    for cycle in cycles {
        println!("  {}", cycle.join(" -> "));
    }
    Ok(())
}

fn run_neighbors(args: NeighborsArgs) -> Result<()> {
    let graph = load_graph(args.path)?.1;
    let neighborhood = graph.neighborhood(&args.name, args.depth);
    if neighborhood.is_empty() {
        println!("No node named \"{}\"", args.name);
        return Ok(());
    }

    for name in neighborhood {
        println!("{name}");
    }
    Ok(())
}

fn run_context(args: ContextArgs) -> Result<()> {
    let (cfg, graph) = load_graph(args.path)?;
    let format = match args.format.to_ascii_lowercase().as_str() {
        "json" => ContextFormat::Json,
        _ => ContextFormat::Markdown,
    };

    let depth = args.depth.unwrap_or(cfg.context_depth);
    let Some(bundle) = graph.context_for(&args.name, depth) else {
        println!("No node named \"{}\"", args.name);
        return Ok(());
    };
    println!("{}", context::render(&bundle, format));
    Ok(())
}

fn run_metrics(args: PathArgs) -> Result<()> {
    let graph = load_graph(args.path)?.1;
    let metrics = graph.complexity_metrics();
    println!(
        "{}",
        serde_json::to_string_pretty(&metrics).unwrap_or_default()
    );
    Ok(())
}

fn run_summarize(args: SummarizeArgs) -> Result<()> {
    let project_root = resolve_project_root(args.path);
    let cfg = config::load_config(&project_root)?;
    let kb_path = config::knowledge_base_path(&project_root, &cfg);
    let mut graph = knowledge::import(&kb_path)?;

    let summaries = read_summaries(&args.file)?;
    let count = summaries.len();
    for summary in summaries {
        if graph.node(&summary.name).is_none() {
            tracing::warn!(name = %summary.name, "summary does not match any node");
        }
        graph.add_summary(summary);
    }

    knowledge::export(&graph, &kb_path)?;
    println!("Attached {count} summaries");
    Ok(())
}

/// A summaries file holds either one summary object or an array of them.
fn read_summaries(path: &Path) -> Result<Vec<NodeSummary>> {
    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum SummaryFile {
        Many(Vec<NodeSummary>),
        One(NodeSummary),
    }

    let raw = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed: SummaryFile = serde_json::from_str(&raw).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(match parsed {
        SummaryFile::Many(summaries) => summaries,
        SummaryFile::One(summary) => vec![summary],
    })
}

fn load_graph(path: Option<PathBuf>) -> Result<(MigraphConfig, DependencyGraph)> {
    let project_root = resolve_project_root(path);
    let cfg = config::load_config(&project_root)?;
    let kb_path = config::knowledge_base_path(&project_root, &cfg);
    if !kb_path.exists() {
        return Err(Error::Config(format!(
            "no knowledge base at {}; run `migraph analyze` first",
            kb_path.display()
        )));
    }
    let graph = knowledge::import(&kb_path)?;
    Ok((cfg, graph))
}

fn resolve_project_root(path: Option<PathBuf>) -> PathBuf {
    path.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn is_initialized(project_root: &Path) -> bool {
    config::config_dir(project_root).is_dir()
}

fn create_migraph_dir(project_root: &Path) -> Result<()> {
    let dir = config::config_dir(project_root);
    fs::create_dir_all(&dir).map_err(|source| Error::Io {
        path: dir.clone(),
        source,
    })?;
    let gitignore_path = dir.join(".gitignore");
    if !gitignore_path.exists() {
        let content = "# migraph data files\n# Regenerate with `migraph analyze`\n\nknowledge_base.json\n*.tmp\n";
        fs::write(&gitignore_path, content).map_err(|source| Error::Io {
            path: gitignore_path.clone(),
            source,
        })?;
    }
    Ok(())
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::with_template("{prefix:>9} [{bar:30}] {pos}/{len} {wide_msg}") {
        bar.set_style(style.progress_chars("=> "));
    }
    bar
}

fn update_progress(bar: &ProgressBar, progress: &ExtractionProgress) {
    let phase = match progress.phase {
        ExtractionPhase::Scanning => "Scanning",
        ExtractionPhase::Parsing => "Parsing",
    };
    bar.set_prefix(phase);
    if progress.total > 0 {
        bar.set_length(progress.total as u64);
    }
    bar.set_position(progress.current as u64);
    if let Some(file) = &progress.current_file {
        bar.set_message(file.clone());
    }
}
