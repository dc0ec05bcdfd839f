//! Coverage-weighted greedy split of scenes into training and validation.
//!
//! Each scene's coverage is `area(bbox ∩ region) / area(region)`. Scenes are
//! visited from largest to smallest coverage; a scene goes to training while
//! the coverage accumulated *before* it is still below the target ratio, so
//! training may overshoot the ratio by at most one scene's coverage.

use std::cmp::Ordering;

use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    error::{Error, Result},
    region::RegionOfInterest,
    scene::SceneRecord,
};

pub const DEFAULT_TRAIN_RATIO: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Group {
    Training,
    Validation,
}

/// A scene with its share of the region's area.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneCoverage {
    pub id: String,
    pub locator: String,
    pub coverage: f64,
}

/// A scene of the plan together with the group it was assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SceneAssignment<'a> {
    pub scene: &'a SceneCoverage,
    pub group: Group,
}

/// A split that is valid but probably not what the caller wanted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitWarning {
    /// Coverage never reached the ratio, so every scene went to training.
    ValidationEmpty,
    /// No scene was assigned to training.
    TrainingEmpty,
}

impl std::fmt::Display for SplitWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SplitWarning::ValidationEmpty => f.write_str("validation group is empty"),
            SplitWarning::TrainingEmpty => f.write_str("training group is empty"),
        }
    }
}

/// Both groups in descending-coverage order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SplitPlan {
    pub ratio: f64,
    pub training: Vec<SceneCoverage>,
    pub validation: Vec<SceneCoverage>,
    /// Sum of the training scenes' coverage.
    pub training_coverage: f64,
}

impl SplitPlan {
    pub fn warnings(&self) -> Vec<SplitWarning> {
        let mut warnings = Vec::new();
        if self.training.is_empty() {
            warnings.push(SplitWarning::TrainingEmpty);
        }
        if self.validation.is_empty() {
            warnings.push(SplitWarning::ValidationEmpty);
        }
        warnings
    }

    pub fn is_degenerate(&self) -> bool {
        self.training.is_empty() || self.validation.is_empty()
    }

    pub fn validation_coverage(&self) -> f64 {
        self.validation.iter().map(|s| s.coverage).sum()
    }

    /// Every scene with its group, training first, each in split order.
    /// Training scenes then validation scenes, each in split order.
    pub fn assignments(&self) -> impl Iterator<Item = SceneAssignment<'_>> {
        let training = self.training.iter().map(|scene| SceneAssignment {
            scene,
            group: Group::Training,
        });
        let validation = self.validation.iter().map(|scene| SceneAssignment {
            scene,
            group: Group::Validation,
        });
        training.chain(validation)
    }
}

/// `area(scene bbox ∩ region) / area(region)`.
pub fn coverage_fraction(scene: &SceneRecord, region: &RegionOfInterest) -> f64 {
    region.polygon().intersection(&scene.footprint).area() / region.area()
}

/// Descending coverage, then ascending id, then ascending locator.
fn split_order(a: &SceneCoverage, b: &SceneCoverage) -> Ordering {
    b.coverage
        .total_cmp(&a.coverage)
        .then_with(|| a.id.cmp(&b.id))
        .then_with(|| a.locator.cmp(&b.locator))
}

/// Computes each scene's coverage and runs the greedy walk against `ratio`.
pub fn plan_split(
    scenes: &[SceneRecord],
    region: &RegionOfInterest,
    ratio: f64,
) -> Result<SplitPlan> {
    let covered = scenes
        .iter()
        .map(|scene| SceneCoverage {
            id: scene.id.clone(),
            locator: scene.locator.clone(),
            coverage: coverage_fraction(scene, region),
        })
        .collect();
    split_by_coverage(covered, ratio)
}

/// The greedy walk over precomputed coverages.
pub fn split_by_coverage(mut scenes: Vec<SceneCoverage>, ratio: f64) -> Result<SplitPlan> {
    if !(ratio.is_finite() && (0.0..=1.0).contains(&ratio)) {
        return Err(Error::InvalidRatio(ratio));
    }

    scenes.sort_by(split_order);

    let mut accumulated = 0.0;
    let mut training = Vec::new();
    let mut validation = Vec::new();
    for scene in scenes {
        if accumulated < ratio {
            accumulated += scene.coverage;
            debug!(
                "{}: coverage {:.4} -> training (accumulated {:.4})",
                scene.id, scene.coverage, accumulated
            );
            training.push(scene);
        } else {
            debug!("{}: coverage {:.4} -> validation", scene.id, scene.coverage);
            validation.push(scene);
        }
    }

    let plan = SplitPlan {
        ratio,
        training,
        validation,
        training_coverage: accumulated,
    };
    info!(
        "Split {} training / {} validation scenes (training coverage {:.4}, target {:.4})",
        plan.training.len(),
        plan.validation.len(),
        plan.training_coverage,
        ratio
    );
    for warning in plan.warnings() {
        warn!("Degenerate split: {warning}");
    }
    Ok(plan)
}
