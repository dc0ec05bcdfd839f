//! scenesplit: prepares a labeled-scene manifest for chip classification.
//!
//! - Selects the raster scenes whose bounding box intersects a region of interest.
//! - Copies every building footprint into the label file of each scene it touches.
//! - Splits the selected scenes into training and validation groups by the
//!   share of the region each scene covers, largest first.
//!
//! Fetching rasters, listing buckets and uploading results stay outside the
//! core behind the [`SceneStore`], [`BoundsReader`] and [`ArtifactSink`]
//! traits. Local implementations live in [`store`] and [`manifest`].

pub mod error;
pub mod filter;
pub mod geometry;
pub mod manifest;
pub mod partition;
pub mod pipeline;
pub mod region;
pub mod scene;
pub mod split;
pub mod store;

pub use error::{ArtifactFailure, Error, Result};
pub use filter::intersecting_scenes;
pub use geometry::{BoundingBox, Polygon};
pub use manifest::{emit, ArtifactSink, EmittedManifests, LocalDirSink, ManifestNames, ManifestRow};
pub use partition::{partition_labels, SceneLabels};
pub use pipeline::{check_crs, run, PipelineConfig, RunInputs, RunReport, SceneReport};
pub use region::{ClassTag, Crs, FeatureProperties, LabelCollection, LabelFeature, RegionOfInterest, TaggedLabels};
pub use scene::{build_scene_index, scene_id_from_locator, BoundsReader, SceneBounds, SceneRecord, SceneStore};
pub use split::{
    coverage_fraction, plan_split, split_by_coverage, Group, SceneAssignment, SceneCoverage, SplitPlan,
    SplitWarning, DEFAULT_TRAIN_RATIO,
};
pub use store::{FootprintIndex, LocalSceneStore};
