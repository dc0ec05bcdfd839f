mod config;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::{fs, process::ExitCode};

use crate::config::Config;
use scenesplit::{
    FootprintIndex, Group, LocalDirSink, LocalSceneStore, RunInputs, RunReport, SceneStore,
};

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

fn write_report(config: &Config, report: &RunReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialise run report")?;
    match &config.report {
        Some(path) => {
            fs::write(path, format!("{json}\n"))
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            info!("Run report written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn main() -> Result<ExitCode> {
    let config = Config::parse();
    init_logging(config.verbose);

    if config.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .build_global()
            .context("Failed to configure worker pool")?;
    }

    // Vector inputs are loaded once, before any scene is touched.
    let inputs = RunInputs::load(&config.region, &config.labels)
        .context("Failed to load region and labels")?;

    let index = FootprintIndex::from_path(&config.scene_index)
        .with_context(|| format!("Failed to load scene index {}", config.scene_index.display()))?;
    info!(
        "Scene index {} lists {} footprints",
        config.scene_index.display(),
        index.len()
    );

    let local_store = config
        .scene_dir
        .as_ref()
        .map(|dir| LocalSceneStore::new(dir).with_extensions(&config.scene_extensions));
    let store: &dyn SceneStore = match &local_store {
        Some(store) => store,
        None => &index,
    };

    let mut sink = LocalDirSink::new(&config.output_dir);
    if let Some(prefix) = &config.label_uri_prefix {
        sink = sink.with_locator_prefix(prefix.as_str());
    }

    let report = scenesplit::run(&config.pipeline(), &inputs, store, &index, &sink)
        .context("Manifest run failed")?;

    let validation = report
        .scenes
        .iter()
        .filter(|s| s.group == Group::Validation)
        .count();
    info!(
        "{} of {} scenes selected: {} training, {} validation",
        report.intersecting,
        report.candidates,
        report.scenes.len() - validation,
        validation,
    );
    write_report(&config, &report)?;

    if !report.warnings.is_empty() {
        for warning in &report.warnings {
            warn!("Degenerate split: {warning}");
        }
        if config.fail_on_degenerate {
            return Ok(ExitCode::from(2));
        }
    }

    Ok(ExitCode::SUCCESS)
}
