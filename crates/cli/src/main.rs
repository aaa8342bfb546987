use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use lattice_lib::{Node, Runtime};
use lattice_lib::fetch::{ReleaseSpec, fetch_release};
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

// Helper to convert lib errors to anyhow::Error (works around mlua not being
// Send+Sync)
fn map_lib_err<T>(result: lattice_lib::Result<T>) -> Result<T> {
  result.map_err(|e| anyhow::anyhow!("{}", e))
}

/// lattice - mount a source tree as a live object tree and run its scripts
#[derive(Parser)]
#[command(name = "lattice")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Reify a project directory and run its entry-point scripts
  Run {
    /// Path to the project directory
    #[arg(default_value = ".")]
    dir: PathBuf,
  },

  /// Reify a project directory and print its node tree
  Tree {
    /// Path to the project directory
    #[arg(default_value = ".")]
    dir: PathBuf,
  },

  /// Fetch a GitHub release into the cache, optionally running it
  Fetch {
    /// Repository slug (owner/repo)
    repo: String,

    /// Release tag (latest release if omitted)
    #[arg(short, long)]
    tag: Option<String>,

    /// Run the fetched project after extraction
    #[arg(long)]
    run: bool,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let filter = if cli.verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::from_default_env()
  };
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .without_time()
    .init();

  // Interpreter values are not Send, so everything runs on a current-thread
  // runtime inside a LocalSet.
  let runtime = tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()?;
  let local = tokio::task::LocalSet::new();

  match cli.command {
    Commands::Run { dir } => local.block_on(&runtime, cmd_run(&dir)),
    Commands::Tree { dir } => cmd_tree(&dir),
    Commands::Fetch { repo, tag, run } => local.block_on(&runtime, cmd_fetch(&repo, tag, run)),
  }
}

async fn cmd_run(dir: &Path) -> Result<()> {
  if !dir.is_dir() {
    eprintln!(
      "{} not a project directory: {}",
      "error:".red().bold(),
      dir.display()
    );
    std::process::exit(1);
  }

  eprintln!("{} Reifying {}", "::".cyan().bold(), dir.display());

  let runtime = map_lib_err(Runtime::new())?;
  let scope = map_lib_err(runtime.create_scope(dir))?;
  map_lib_err(scope.reify(None))?;

  eprintln!(
    "{} Deploying {} entry point(s)",
    "::".cyan().bold(),
    scope.entry_points().len()
  );

  let finished = map_lib_err(scope.deploy().await)?;

  eprintln!(
    "{} {} script(s) finished",
    "::".green().bold(),
    finished.len()
  );
  Ok(())
}

fn cmd_tree(dir: &Path) -> Result<()> {
  if !dir.is_dir() {
    eprintln!(
      "{} not a project directory: {}",
      "error:".red().bold(),
      dir.display()
    );
    std::process::exit(1);
  }

  let runtime = map_lib_err(Runtime::new())?;
  let scope = map_lib_err(runtime.create_scope(dir))?;
  let root = map_lib_err(scope.reify(None))?;

  print_tree(&root, 0);
  Ok(())
}

async fn cmd_fetch(repo: &str, tag: Option<String>, run: bool) -> Result<()> {
  let Some(spec) = ReleaseSpec::parse(repo, tag) else {
    eprintln!(
      "{} expected an owner/repo slug, got '{}'",
      "error:".red().bold(),
      repo
    );
    std::process::exit(1);
  };

  let cache_root = dirs::cache_dir()
    .unwrap_or_else(std::env::temp_dir)
    .join("lattice")
    .join("releases");

  eprintln!(
    "{} Fetching {}/{}",
    "::".cyan().bold(),
    spec.owner,
    spec.repo
  );

  let dest = fetch_release(&spec, &cache_root)?;
  eprintln!("{} Extracted to {}", "::".green().bold(), dest.display());

  if run {
    cmd_run(&dest).await?;
  }
  Ok(())
}

fn print_tree(node: &Node, depth: usize) {
  let indent = "  ".repeat(depth);
  println!(
    "{}{} {}",
    indent,
    node.name().bold(),
    format!("({})", node.class()).dimmed()
  );
  for child in node.children() {
    print_tree(&child, depth + 1);
  }
}
