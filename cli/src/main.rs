//! Escalade CLI — run the delta pipeline against local JSON-Lines artifacts
//!
//! `diff` compares two snapshot files, `derive` expands raw edges into abuse
//! edges, `project` replays a change log into an in-memory graph store.

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table};
use escalade::{
    derive_abuse_edges, diff, emit, DiffOptions, EntityRecord, EntityShape, FileWatermarkStore,
    GraphStore, JsonlChangeLog, Projector, ProjectorConfig, RawEdge, RuleTables,
};
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "escalade", version, about = "Tenant security graph indexer")]
struct Cli {
    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, clap::ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Diff a current snapshot against the previous one and emit change events
    Diff {
        /// Previous snapshot (JSON Lines); omit for a cold start
        #[arg(long)]
        previous: Option<PathBuf>,

        /// Current snapshot (JSON Lines)
        #[arg(long)]
        current: PathBuf,

        /// Entity type being diffed
        #[arg(long, default_value = "user")]
        entity_type: String,

        /// Vertex label for emitted events
        #[arg(long, default_value = "User")]
        label: String,

        /// Tenant partition key
        #[arg(long, default_value = "default")]
        tenant: String,

        /// Comma-separated fields compared for modification detection
        #[arg(long, value_delimiter = ',')]
        compare_fields: Vec<String>,

        /// Subset of compare fields treated as order-insensitive arrays
        #[arg(long, value_delimiter = ',')]
        array_fields: Vec<String>,

        /// Append emitted change events to this change log file
        #[arg(long)]
        changelog: Option<PathBuf>,
    },
    /// Derive abuse edges from a raw-edge file
    Derive {
        /// Raw edges (JSON Lines)
        #[arg(long)]
        edges: PathBuf,

        /// Rule table YAML; built-in reference rules when omitted
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Write derived edges to this file (JSON Lines)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Replay a change log into an in-memory graph store
    Project {
        /// Change log file (JSON Lines)
        #[arg(long)]
        changelog: PathBuf,

        /// Watermark document path
        #[arg(long)]
        watermark: PathBuf,

        /// Change-log page size
        #[arg(long, default_value_t = 500)]
        page_size: usize,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Diff {
            previous,
            current,
            entity_type,
            label,
            tenant,
            compare_fields,
            array_fields,
            changelog,
        } => {
            run_diff(
                previous.as_deref(),
                &current,
                &entity_type,
                &label,
                &tenant,
                compare_fields,
                array_fields,
                changelog.as_deref(),
                &cli.format,
            )
        }
        Commands::Derive { edges, rules, output } => {
            run_derive(&edges, rules.as_deref(), output.as_deref(), &cli.format)
        }
        Commands::Project {
            changelog,
            watermark,
            page_size,
        } => run_project(&changelog, &watermark, page_size, &cli.format).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn read_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let mut items = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let item = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}", path.display(), index + 1))?;
        items.push(item);
    }
    Ok(items)
}

#[allow(clippy::too_many_arguments)]
fn run_diff(
    previous: Option<&Path>,
    current: &Path,
    entity_type: &str,
    label: &str,
    tenant: &str,
    compare_fields: Vec<String>,
    array_fields: Vec<String>,
    changelog: Option<&Path>,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let previous_state: FxHashMap<String, EntityRecord> = match previous {
        Some(path) => read_jsonl::<EntityRecord>(path)?
            .into_iter()
            .map(|r| (r.object_id.clone(), r))
            .collect(),
        None => FxHashMap::default(),
    };
    let current_records: Vec<EntityRecord> = read_jsonl(current)?;

    let options = DiffOptions::new(compare_fields).with_array_fields(array_fields);
    let result = diff(&previous_state, &current_records, &options);

    let shape = EntityShape::Vertex {
        label: label.to_string(),
    };
    let out = emit(&result, entity_type, &shape, tenant, Utc::now(), 0);

    if let Some(path) = changelog {
        JsonlChangeLog::new(path).append(&out.events)?;
        println!("{} event(s) appended to {}", out.events.len(), path.display());
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&out.snapshot)?);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["new", "modified", "deleted", "unchanged", "total"]);
            table.add_row(vec![
                out.snapshot.new.to_string(),
                out.snapshot.modified.to_string(),
                out.snapshot.deleted.to_string(),
                out.snapshot.unchanged.to_string(),
                out.snapshot.total.to_string(),
            ]);
            println!("{}", table);
        }
    }
    Ok(())
}

fn run_derive(
    edges: &Path,
    rules: Option<&Path>,
    output: Option<&Path>,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let raw_edges: Vec<RawEdge> = read_jsonl(edges)?;
    let tables = match rules {
        Some(path) => RuleTables::from_yaml_file(path)
            .with_context(|| format!("loading rule table {}", path.display()))?,
        None => RuleTables::builtin(),
    };

    let derivation = derive_abuse_edges(&raw_edges, &tables);

    if let Some(path) = output {
        let mut file = std::fs::File::create(path)
            .with_context(|| format!("creating {}", path.display()))?;
        for edge in &derivation.edges {
            serde_json::to_writer(&mut file, edge)?;
            file.write_all(b"\n")?;
        }
        println!("{} derived edge(s) written to {}", derivation.edges.len(), path.display());
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&derivation.counts)?);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec![
                "permissionGrants",
                "directoryRoles",
                "ownership",
                "azureRbac",
                "skipped",
            ]);
            table.add_row(vec![
                derivation.counts.permission_grants.to_string(),
                derivation.counts.directory_roles.to_string(),
                derivation.counts.ownership.to_string(),
                derivation.counts.azure_rbac.to_string(),
                derivation.skipped.to_string(),
            ]);
            println!("{}", table);
        }
    }
    Ok(())
}

async fn run_project(
    changelog: &Path,
    watermark: &Path,
    page_size: usize,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let log = JsonlChangeLog::new(changelog);
    let watermarks = FileWatermarkStore::new(watermark);
    let store = GraphStore::new();

    let config = ProjectorConfig {
        page_size,
        ..ProjectorConfig::default()
    };
    let projector = Projector::new(&log, &store, &watermarks, config);
    let report = projector.run().await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["pages", "vertices", "edges", "deletes", "errors", "success"]);
            table.add_row(vec![
                report.pages.to_string(),
                report.vertices_applied.to_string(),
                report.edges_applied.to_string(),
                report.deletes_applied.to_string(),
                report.errors.to_string(),
                report.success.to_string(),
            ]);
            println!("{}", table);
            if let Some(watermark) = report.final_watermark {
                println!("watermark: {}", watermark.to_rfc3339());
            }
            println!(
                "store: {} vertice(s), {} edge(s)",
                store.vertex_count(),
                store.edge_count()
            );
        }
    }

    Ok(())
}
