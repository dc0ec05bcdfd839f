//! Persisting per-scene label files and the training/validation manifests.
//!
//! Manifests are CSV rows of `"<scene_locator>","<label_locator>"` with no
//! header, one per line, in split order. They are only written once every
//! label file they reference has been persisted.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::{
    error::{ArtifactFailure, Error, Result},
    partition::SceneLabels,
    split::{SceneCoverage, SplitPlan},
};

/// Destination for output artifacts.
pub trait ArtifactSink: Sync {
    /// Stores `bytes` under `name`, replacing any previous artifact of that
    /// name, and returns the locator that manifests should reference.
    fn put(&self, name: &str, bytes: &[u8]) -> io::Result<String>;
}

/// Writes artifacts into a local directory.
///
/// Each artifact is written to a hidden temporary sibling and renamed into
/// place, so a re-run replaces files whole.
#[derive(Debug, Clone)]
pub struct LocalDirSink {
    dir: PathBuf,
    locator_prefix: Option<String>,
}

impl LocalDirSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locator_prefix: None,
        }
    }

    /// Reports locators as `<prefix>/<name>` instead of local paths, for
    /// outputs that will be uploaded elsewhere afterwards.
    pub fn with_locator_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.locator_prefix = Some(prefix.into().trim_end_matches('/').to_string());
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArtifactSink for LocalDirSink {
    fn put(&self, name: &str, bytes: &[u8]) -> io::Result<String> {
        fs::create_dir_all(&self.dir)?;
        let target = self.dir.join(name);
        let staging = self.dir.join(format!(".{name}.partial"));

        fs::write(&staging, bytes)?;
        if let Err(err) = fs::rename(&staging, &target) {
            let _ = fs::remove_file(&staging);
            return Err(err);
        }

        Ok(match &self.locator_prefix {
            Some(prefix) => format!("{prefix}/{name}"),
            None => target.display().to_string(),
        })
    }
}

/// File names and extension used by the emitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestNames {
    pub training: String,
    pub validation: String,
    /// Extension of per-scene label files, without the dot.
    pub label_extension: String,
}

impl Default for ManifestNames {
    fn default() -> Self {
        Self {
            training: "train-scenes.csv".into(),
            validation: "val-scenes.csv".into(),
            label_extension: "geojson".into(),
        }
    }
}

/// One manifest row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestRow {
    pub scene: String,
    pub label: String,
}

/// What the emitter wrote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmittedManifests {
    /// Label locator per scene locator.
    pub labels: BTreeMap<String, String>,
    pub training: Vec<ManifestRow>,
    pub validation: Vec<ManifestRow>,
    pub training_manifest: String,
    pub validation_manifest: String,
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Renders rows as `"scene","label"\n` lines.
pub fn render_manifest(rows: &[ManifestRow]) -> String {
    rows.iter()
        .map(|row| format!("{},{}\n", quote(&row.scene), quote(&row.label)))
        .collect()
}

/// Label file name for a scene: `<scene id>.<extension>`.
pub fn label_file_name(scene_id: &str, names: &ManifestNames) -> String {
    format!("{scene_id}.{}", names.label_extension)
}

/// Writes one label file per scene, then the two manifests.
///
/// Label files are written in parallel. If any of them fails, no manifest is
/// written and the error lists every failed label file plus both manifests as
/// skipped. Manifest failures are reported the same way.
pub fn emit(
    scene_labels: &[SceneLabels<'_>],
    plan: &SplitPlan,
    sink: &dyn ArtifactSink,
    names: &ManifestNames,
) -> Result<EmittedManifests> {
    let mut by_name: BTreeMap<String, &str> = BTreeMap::new();
    for labels in scene_labels {
        let name = label_file_name(&labels.scene.id, names);
        if let Some(first) = by_name.insert(name.clone(), &labels.scene.locator) {
            return Err(Error::NameCollision {
                name,
                first: first.to_string(),
                second: labels.scene.locator.clone(),
            });
        }
    }

    let written: Vec<(String, std::result::Result<String, ArtifactFailure>)> = scene_labels
        .par_iter()
        .map(|labels| {
            let name = label_file_name(&labels.scene.id, names);
            let outcome = labels
                .to_geojson()
                .map_err(|err| err.to_string())
                .and_then(|bytes| sink.put(&name, &bytes).map_err(|err| err.to_string()))
                .map_err(|reason| ArtifactFailure {
                    name: name.clone(),
                    reason,
                });
            (labels.scene.locator.clone(), outcome)
        })
        .collect();

    let mut label_locators = BTreeMap::new();
    let mut failed = Vec::new();
    for (scene, outcome) in written {
        match outcome {
            Ok(locator) => {
                debug!("{scene}: labels -> {locator}");
                label_locators.insert(scene, locator);
            }
            Err(failure) => {
                warn!("Failed to write {failure}");
                failed.push(failure);
            }
        }
    }
    if !failed.is_empty() {
        return Err(Error::PartialWrite {
            failed,
            skipped: vec![names.training.clone(), names.validation.clone()],
        });
    }
    info!("Wrote {} label files", label_locators.len());

    let rows = |group: &[SceneCoverage]| -> Result<Vec<ManifestRow>> {
        group
            .iter()
            .map(|scene| {
                let label = label_locators
                    .get(&scene.locator)
                    .ok_or_else(|| Error::UnknownScene(scene.locator.clone()))?;
                Ok(ManifestRow {
                    scene: scene.locator.clone(),
                    label: label.clone(),
                })
            })
            .collect()
    };
    let training = rows(&plan.training)?;
    let validation = rows(&plan.validation)?;

    let mut manifest_locators = Vec::with_capacity(2);
    let mut failed = Vec::new();
    for (name, group) in [(&names.training, &training), (&names.validation, &validation)] {
        match sink.put(name, render_manifest(group).as_bytes()) {
            Ok(locator) => {
                info!("Wrote {} rows to {locator}", group.len());
                manifest_locators.push(locator);
            }
            Err(err) => {
                let failure = ArtifactFailure {
                    name: name.clone(),
                    reason: err.to_string(),
                };
                warn!("Failed to write {failure}");
                failed.push(failure);
            }
        }
    }
    if !failed.is_empty() {
        return Err(Error::PartialWrite {
            failed,
            skipped: Vec::new(),
        });
    }

    let validation_manifest = manifest_locators.pop().unwrap_or_default();
    let training_manifest = manifest_locators.pop().unwrap_or_default();
    Ok(EmittedManifests {
        labels: label_locators,
        training,
        validation,
        training_manifest,
        validation_manifest,
    })
}
