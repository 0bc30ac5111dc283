//! pkgtree - Browse the contents of package groups as one lazy tree.
//!
//! Usage:
//!   pkgtree tree <SOURCES>...     Expand and print each group's tree
//!   pkgtree export <SOURCES>...   Expand fully and export to JSON
//!   pkgtree stats <SOURCES>...    Expand fully and print statistics
//!   pkgtree --help                Show help

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Context, Result};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use pkgtree_builder::{
    BuilderConfig, BuilderEvent, ItemReference, ReferenceState, SubmitOutcome, TreeBuilder,
    VirtualItemReference,
};

#[derive(Parser)]
#[command(
    name = "pkgtree",
    version,
    about = "Browse package listfiles as a lazily expanded tree",
    long_about = "pkgtree loads one or more package groups (directories of listfiles, \
                  one per package) and expands their contents one directory level \
                  at a time on background workers."
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Maximum number of concurrent workers
    #[arg(short = 'j', long, global = true)]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Expand and print the tree of each package group
    Tree {
        /// Package group directories
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        /// Number of levels to expand inside each package
        #[arg(short, long, default_value = "2")]
        depth: usize,

        /// Expand every level
        #[arg(short, long)]
        all: bool,
    },

    /// Expand fully and export the tree to JSON
    Export {
        /// Package group directories
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Expand fully and print enumeration statistics
    Stats {
        /// Package group directories
        #[arg(required = true)]
        sources: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Command::Tree {
            sources,
            depth,
            all,
        } => {
            let builder = open(sources, cli.workers)?;
            expand(&builder, if all { None } else { Some(depth) }).await;
            print_tree(&builder);
            builder.shutdown().await;
        }
        Command::Export { sources, output } => {
            let builder = open(sources, cli.workers)?;
            expand(&builder, None).await;
            run_export(&builder, output)?;
            builder.shutdown().await;
        }
        Command::Stats { sources } => {
            let builder = open(sources, cli.workers)?;
            expand(&builder, None).await;
            print_stats(&builder);
            builder.shutdown().await;
        }
    }

    Ok(())
}

fn setup_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("pkgtree=debug,pkgtree_builder=debug,warn")
    } else {
        EnvFilter::new("pkgtree=info,pkgtree_builder=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Load every group and start the engine.
fn open(sources: Vec<PathBuf>, workers: Option<usize>) -> Result<TreeBuilder> {
    let sources = sources
        .iter()
        .map(|source| {
            source
                .canonicalize()
                .with_context(|| format!("Invalid package source {}", source.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let config = BuilderConfig::builder()
        .package_sources(sources)
        .max_workers(workers)
        .build()
        .context("Invalid builder configuration")?;

    let builder = TreeBuilder::new(config);
    builder.reload().context("Failed to load package groups")?;
    builder.start()?;
    Ok(builder)
}

/// Drive the builder the way an interactive front end would: wait for
/// the engine to settle, drain what it found, and submit the directories
/// that should be opened next.
async fn expand(builder: &TreeBuilder, max_depth: Option<usize>) {
    let mut events = builder.subscribe();
    let listener = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(BuilderEvent::EnumerationFailed { reference, message }) => {
                    warn!(reference = %reference.key(), %message, "Expansion failed");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "Event receiver lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    eprintln!("Expanding {} package group(s)...", builder.package_groups().len());

    loop {
        builder.wait_idle().await;
        let discovered = builder.drain_enumerated();
        if discovered.is_empty() {
            break;
        }

        let mut submitted = 0usize;
        for reference in discovered {
            let Some(hard) = reference.as_hard() else {
                continue;
            };
            if !hard.is_directory() || !within_depth(hard, max_depth) {
                continue;
            }
            if builder.submit_work(reference.clone()) == SubmitOutcome::Queued {
                submitted += 1;
            }
        }
        debug!(submitted, "Submitted next level");
    }

    listener.abort();
}

/// Directory levels below the package root.
fn level(hard: &ItemReference) -> usize {
    let separator = hard.group().separator();
    hard.item_path().matches(separator).count()
}

fn within_depth(hard: &ItemReference, max_depth: Option<usize>) -> bool {
    max_depth.is_none_or(|max| level(hard) < max)
}

/// Print each group with its packages and their expanded contents.
fn print_tree(builder: &TreeBuilder) {
    for top in builder.package_groups() {
        let root = top.primary();
        println!();
        println!("{}", "─".repeat(60));
        println!(
            " {} ({} packages, {} entries)",
            root.name(),
            root.group().package_count(),
            root.group().total_entries()
        );
        println!("{}", "─".repeat(60));

        for package in root.children() {
            println!("▼ {}", package.name());
            print_children(builder, &package, 1);
        }
    }
}

fn print_children(builder: &TreeBuilder, parent: &Arc<ItemReference>, depth: usize) {
    let indent = "  ".repeat(depth);
    for child in parent.children() {
        let marker = match (child.is_directory(), child.state()) {
            (false, _) => "  ",
            (true, ReferenceState::Enumerated) => "▼ ",
            (true, _) => "▶ ",
        };
        let suffix = if child.is_directory() { "\\" } else { "" };
        let note = override_note(builder, &child);
        println!("{indent}{marker}{}{suffix}{note}", child.name());
        print_children(builder, &child, depth + 1);
    }
}

/// Annotation for entries another package also provides.
fn override_note(builder: &TreeBuilder, hard: &ItemReference) -> String {
    let Some(overlay) = builder.get_virtual_reference(hard) else {
        return String::new();
    };
    let shown = overlay.display_reference();
    if shown.package_name() == hard.package_name() {
        format!("  [overrides {}]", other_packages(&overlay, hard))
    } else {
        format!("  [overridden by {}]", shown.package_name())
    }
}

fn other_packages(overlay: &VirtualItemReference, hard: &ItemReference) -> String {
    overlay
        .hard_references()
        .iter()
        .filter(|part| part.package_name() != hard.package_name())
        .map(|part| part.package_name().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Serialize)]
struct ExportGroup {
    name: String,
    source: PathBuf,
    packages: Vec<ExportNode>,
}

#[derive(Serialize)]
struct ExportNode {
    name: String,
    path: String,
    directory: bool,
    state: ReferenceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    overridden_by: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<ExportNode>,
}

impl ExportNode {
    fn from_reference(builder: &TreeBuilder, hard: &Arc<ItemReference>) -> Self {
        let overridden_by = builder
            .get_virtual_reference(hard)
            .map(|overlay| overlay.display_reference())
            .filter(|shown| shown.package_name() != hard.package_name())
            .map(|shown| shown.package_name().to_string());

        Self {
            name: hard.name().to_string(),
            path: hard.item_path().to_string(),
            directory: hard.is_directory(),
            state: hard.state(),
            overridden_by,
            children: hard
                .children()
                .iter()
                .map(|child| Self::from_reference(builder, child))
                .collect(),
        }
    }
}

/// Export the expanded tree to JSON.
fn run_export(builder: &TreeBuilder, output: Option<PathBuf>) -> Result<()> {
    let groups: Vec<_> = builder
        .package_groups()
        .iter()
        .map(|top| {
            let root = top.primary();
            ExportGroup {
                name: root.name().to_string(),
                source: root.group().source().to_path_buf(),
                packages: root
                    .children()
                    .iter()
                    .map(|package| ExportNode::from_reference(builder, package))
                    .collect(),
            }
        })
        .collect();

    let json = serde_json::to_string_pretty(&groups)?;

    match output {
        Some(output_path) => {
            std::fs::write(&output_path, json)
                .with_context(|| format!("Failed to write {}", output_path.display()))?;
            eprintln!("Exported to {}", output_path.display());
        }
        None => {
            println!("{}", json);
        }
    }

    Ok(())
}

/// Print enumeration statistics.
fn print_stats(builder: &TreeBuilder) {
    let groups = builder.package_groups();
    let packages: usize = groups
        .iter()
        .map(|top| top.primary().group().package_count())
        .sum();
    let progress = builder.progress();

    println!();
    println!("{}", "─".repeat(60));
    println!(" Enumeration Statistics");
    println!("{}", "─".repeat(60));
    println!(" Groups:               {}", groups.len());
    println!(" Packages:             {}", packages);
    println!(" Workers:              {}", builder.concurrency_ceiling());
    println!(" References expanded:  {}", progress.references_enumerated);
    println!(" Children discovered:  {}", progress.children_discovered);
    println!(" Overlays created:     {}", progress.overlays_created);
    println!(" Failures:             {}", progress.failures);
    println!(
        " Elapsed:              {:.2}s ({:.0} refs/s)",
        progress.elapsed.as_secs_f64(),
        progress.references_per_second()
    );
    println!("{}", "─".repeat(60));
}
