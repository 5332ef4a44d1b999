#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line host for the Canopy tree map.

mod config;
mod session;

use std::{path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};
use canopy_core::{layers, EntityCandidate, Feature, MapEngine, QueryRegion};
use canopy_remote::{Dataset, MemoryRemote};
use canopy_rendering::GridEngine;
use canopy_world::query;
use clap::{Parser, Subcommand};
use glam::Vec2;
use tracing_subscriber::EnvFilter;

use crate::{config::CanopyConfig, session::Session};

/// Explore and edit a clustered map of street trees.
#[derive(Debug, Parser)]
#[command(name = "canopy", version)]
struct Cli {
    /// Path to a `canopy.toml` configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// JSON dataset served by the in-memory tree API.
    #[arg(long, global = true)]
    dataset: Option<PathBuf>,
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Print the sidebar categories for the configured viewport.
    Categories,
    /// Highlight a category and print what the overlays mark.
    Highlight {
        /// Category to highlight, e.g. "Red Maple".
        category: String,
    },
    /// Run a scripted session: load, long press, add and remove a tree.
    Demo,
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let cli = Cli::parse();
    let config = CanopyConfig::load(cli.config.as_deref())?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("failed to start the async runtime")?;
    runtime.block_on(execute(cli, config))
}

async fn execute(cli: Cli, config: CanopyConfig) -> Result<()> {
    let viewport = config.viewport();
    let dataset = match cli.dataset.as_ref().or(config.data.dataset.as_ref()) {
        Some(path) => Dataset::load(path)?,
        None => Dataset::synthetic(
            config.data.seed,
            config.data.synthetic_count,
            viewport.center,
        ),
    };
    let remote = MemoryRemote::new(dataset);
    let engine = GridEngine::new(viewport);
    let mut session = Session::boot(&engine, &remote, config.sync()).await?;

    match cli.command {
        CliCommand::Categories => print_categories(&session),
        CliCommand::Highlight { category } => {
            let change = session.toggle_highlight(&category).await?;
            tracing::debug!(?change, "highlight applied");
            print_highlight(&session, &category);
        }
        CliCommand::Demo => demo(&mut session, config.timing.dwell_ms).await?,
    }

    session.teardown();
    Ok(())
}

fn print_categories(session: &Session<'_>) {
    let Some(snapshot) = session.sync().latest() else {
        println!("no trees in view");
        return;
    };
    if snapshot.aggregation.is_empty() {
        println!("no trees in view");
    }
    for entry in snapshot.aggregation.entries() {
        println!("{:>5}  {}", entry.feature_count(), entry.category());
    }
}

fn print_highlight(session: &Session<'_>, category: &str) {
    let engine = session.engine();
    let points =
        engine.query_rendered_features(QueryRegion::Viewport, &[layers::HIGHLIGHTED_POINTS]);
    let clusters =
        engine.query_rendered_features(QueryRegion::Viewport, &[layers::HIGHLIGHTED_CLUSTERS]);

    println!(
        "{category}: {} points, {} clusters highlighted",
        points.len(),
        clusters.len()
    );
    for feature in points.iter().chain(&clusters) {
        match feature {
            Feature::Point(entity) => println!(
                "  point   {}  ({:.5}, {:.5})",
                entity.location_id,
                entity.coordinate.lat(),
                entity.coordinate.lon()
            ),
            Feature::Cluster(cluster) => println!(
                "  cluster {}  {} trees",
                cluster.id, cluster.point_count
            ),
        }
    }
}

async fn demo(session: &mut Session<'_>, dwell_ms: u64) -> Result<()> {
    println!("== visible categories");
    print_categories(session);

    let corner = Vec2::new(8.0, 8.0);
    session.hold(corner, Duration::from_millis(dwell_ms)).await?;
    let Some(coordinate) = query::creation_form(session.world()) else {
        bail!("long press did not open the creation form");
    };
    println!(
        "== long press opened the form at ({:.5}, {:.5})",
        coordinate.lat(),
        coordinate.lon()
    );

    let Some(template) = query::entities(session.world()).first().cloned() else {
        bail!("the inventory is empty, nothing to copy a species from");
    };
    let candidate = EntityCandidate {
        tree_id: template.tree_id,
        category: template.category,
        coordinate,
        source: "canopy demo".to_owned(),
        is_native: template.is_native,
    };
    let location_id = session.add(&candidate).await?;
    print_notice(session);

    session.remove(location_id, "canopy demo").await?;
    print_notice(session);

    println!("== visible categories");
    print_categories(session);
    Ok(())
}

fn print_notice(session: &Session<'_>) {
    if let Some(notice) = query::notice(session.world()) {
        println!("== {notice}");
    }
}
