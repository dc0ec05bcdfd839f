//! A complete run: scene index, CRS check, filter, split, partition, emit.

use std::{collections::HashMap, path::Path};

use log::{info, warn};
use serde::Serialize;

use crate::{
    error::{Error, Result},
    filter::intersecting_scenes,
    manifest::{emit, ArtifactSink, ManifestNames},
    partition::partition_labels,
    region::{ClassTag, Crs, LabelCollection, RegionOfInterest},
    scene::{build_scene_index, BoundsReader, SceneStore},
    split::{plan_split, Group, SceneAssignment, SplitWarning, DEFAULT_TRAIN_RATIO},
};

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub train_ratio: f64,
    pub class: ClassTag,
    pub names: ManifestNames,
    /// Prefix query passed to the scene store.
    pub scene_prefix: String,
    /// Require every source to declare a CRS.
    pub strict_crs: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            train_ratio: DEFAULT_TRAIN_RATIO,
            class: ClassTag::default(),
            names: ManifestNames::default(),
            scene_prefix: String::new(),
            strict_crs: false,
        }
    }
}

/// The two vector inputs, loaded once and read-only for the rest of the run.
#[derive(Debug, Clone)]
pub struct RunInputs {
    pub region: RegionOfInterest,
    pub labels: LabelCollection,
}

impl RunInputs {
    pub fn load(region: impl AsRef<Path>, labels: impl AsRef<Path>) -> Result<Self> {
        let region = RegionOfInterest::from_path(region)?;
        let labels = LabelCollection::from_path(labels)?;
        info!(
            "Loaded region (area {:.3}) and {} label features",
            region.area(),
            labels.features.len()
        );
        Ok(Self { region, labels })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneReport {
    pub id: String,
    pub locator: String,
    pub coverage: f64,
    pub group: Group,
    pub label_count: usize,
    pub label_locator: String,
}

/// Summary of a finished run, scenes listed in split order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub candidates: usize,
    pub intersecting: usize,
    pub label_features: usize,
    pub region_area: f64,
    pub crs: Option<String>,
    pub train_ratio: f64,
    pub training_coverage: f64,
    pub validation_coverage: f64,
    pub warnings: Vec<SplitWarning>,
    pub scenes: Vec<SceneReport>,
    pub training_manifest: String,
    pub validation_manifest: String,
}

/// Compares every declared CRS against the first one found.
///
/// Returns the common CRS, or `None` when no source declares one. Undeclared
/// sources are accepted unless `strict` is set.
pub fn check_crs<'a, I>(sources: I, strict: bool) -> Result<Option<Crs>>
where
    I: IntoIterator<Item = (&'a str, Option<&'a Crs>)>,
{
    let mut reference: Option<(&str, &Crs)> = None;
    let mut undeclared = Vec::new();

    for (name, crs) in sources {
        match (crs, reference) {
            (None, _) if strict => {
                return Err(Error::MissingCrs {
                    source_name: name.to_string(),
                })
            }
            (None, _) => undeclared.push(name),
            (Some(crs), None) => reference = Some((name, crs)),
            (Some(crs), Some((first, expected))) if crs != expected => {
                return Err(Error::CrsMismatch {
                    expected: format!("{expected} (from {first})"),
                    found: crs.to_string(),
                    source_name: name.to_string(),
                })
            }
            (Some(_), Some(_)) => {}
        }
    }

    if !undeclared.is_empty() {
        warn!(
            "{} source(s) declare no CRS and are assumed to match: {}",
            undeclared.len(),
            undeclared.join(", ")
        );
    }
    Ok(reference.map(|(_, crs)| crs.clone()))
}

pub fn run(
    config: &PipelineConfig,
    inputs: &RunInputs,
    store: &dyn SceneStore,
    reader: &dyn BoundsReader,
    sink: &dyn ArtifactSink,
) -> Result<RunReport> {
    if !(config.train_ratio.is_finite() && (0.0..=1.0).contains(&config.train_ratio)) {
        return Err(Error::InvalidRatio(config.train_ratio));
    }

    let scenes = build_scene_index(store, reader, &config.scene_prefix)?;

    let crs = check_crs(
        [
            ("region", inputs.region.crs()),
            ("labels", inputs.labels.crs.as_ref()),
        ]
        .into_iter()
        .chain(scenes.iter().map(|s| (s.locator.as_str(), s.crs.as_ref()))),
        config.strict_crs,
    )?;

    let labels = inputs.labels.with_class(&config.class);
    let selected = intersecting_scenes(&scenes, &inputs.region)?;
    let plan = plan_split(&selected, &inputs.region, config.train_ratio)?;
    let partitions = partition_labels(&selected, &labels);
    let emitted = emit(&partitions, &plan, sink, &config.names)?;

    let label_counts: HashMap<&str, usize> = partitions
        .iter()
        .map(|p| (p.scene.locator.as_str(), p.len()))
        .collect();
    let scene_reports = plan
        .assignments()
        .map(|SceneAssignment { scene, group }| SceneReport {
            id: scene.id.clone(),
            locator: scene.locator.clone(),
            coverage: scene.coverage,
            group,
            label_count: label_counts.get(scene.locator.as_str()).copied().unwrap_or(0),
            label_locator: emitted.labels.get(&scene.locator).cloned().unwrap_or_default(),
        })
        .collect();

    Ok(RunReport {
        candidates: scenes.len(),
        intersecting: selected.len(),
        label_features: labels.len(),
        region_area: inputs.region.area(),
        crs: crs.map(|c| c.key().to_string()),
        train_ratio: config.train_ratio,
        training_coverage: plan.training_coverage,
        validation_coverage: plan.validation_coverage(),
        warnings: plan.warnings(),
        scenes: scene_reports,
        training_manifest: emitted.training_manifest,
        validation_manifest: emitted.validation_manifest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crs_check_accepts_equivalent_names() {
        let a = Crs::named("urn:ogc:def:crs:EPSG::32633");
        let b = Crs::named("EPSG:32633");
        let common = check_crs([("region", Some(&a)), ("labels", None), ("scene", Some(&b))], false)
            .unwrap()
            .unwrap();
        assert_eq!(common.key(), "EPSG:32633");
    }

    #[test]
    fn crs_check_fails_fast_on_mismatch() {
        let utm = Crs::named("EPSG:32633");
        let wgs = Crs::named("EPSG:4326");
        match check_crs([("region", Some(&utm)), ("s3://b/x.tif", Some(&wgs))], false) {
            Err(Error::CrsMismatch { source_name, found, .. }) => {
                assert_eq!(source_name, "s3://b/x.tif");
                assert_eq!(found, "EPSG:4326");
            }
            other => panic!("expected CrsMismatch, got {other:?}"),
        }
    }

    #[test]
    fn strict_mode_requires_declarations() {
        let utm = Crs::named("EPSG:32633");
        assert!(matches!(
            check_crs([("region", Some(&utm)), ("labels", None)], true),
            Err(Error::MissingCrs { .. })
        ));
        assert_eq!(check_crs([("region", None), ("labels", None)], false).unwrap(), None);
    }
}
