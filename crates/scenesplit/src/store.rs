//! Local implementations of the scene collaborators.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value;
use walkdir::WalkDir;

use crate::{
    error::{Error, Result},
    geometry::{BoundingBox, Polygon},
    region::{read_json, Crs},
    scene::{scene_id_from_locator, BoundsReader, SceneBounds, SceneStore},
};

/// A directory of raster files acting as the scene store.
///
/// Locators are the file paths; the prefix is matched against the path
/// relative to `root`, using `/` separators.
#[derive(Debug, Clone)]
pub struct LocalSceneStore {
    root: PathBuf,
    extensions: Vec<String>,
}

impl LocalSceneStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: vec!["tif".into(), "tiff".into()],
        }
    }

    /// Replaces the accepted extensions (compared case-insensitively, no dot).
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }
}

impl SceneStore for LocalSceneStore {
    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Err(Error::SceneListing(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }

        let mut locators = Vec::new();
        for entry in WalkDir::new(&self.root)
            .follow_links(true)
            .into_iter()
            .filter_map(std::result::Result::ok)
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();

            let ext = path
                .extension()
                .and_then(|s| s.to_str())
                .map(|s| s.to_ascii_lowercase())
                .unwrap_or_default();
            if !self.extensions.iter().any(|e| *e == ext) {
                continue;
            }

            let relative = path
                .strip_prefix(&self.root)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/");
            if relative.starts_with(prefix) {
                locators.push(path.to_string_lossy().into_owned());
            }
        }

        debug!("{}: {} scene files", self.root.display(), locators.len());
        Ok(locators)
    }
}

/// A FeatureCollection of scene footprints: each feature's `properties.url`
/// (or `location`) names a scene, and its geometry outlines the raster.
///
/// Serves both as a listing and as the bounds source. Bounds are the
/// footprint's envelope, in the collection's declared CRS.
#[derive(Debug, Clone)]
pub struct FootprintIndex {
    by_locator: BTreeMap<String, BoundingBox>,
    /// Every indexed locator per scene id, sorted.
    by_id: BTreeMap<String, Vec<String>>,
    crs: Option<Crs>,
}

#[derive(Deserialize)]
struct IndexRoot {
    #[serde(default)]
    crs: Option<Value>,
    features: Vec<IndexFeature>,
}

#[derive(Deserialize)]
struct IndexFeature {
    geometry: Value,
    properties: IndexProperties,
}

#[derive(Deserialize)]
struct IndexProperties {
    #[serde(alias = "location")]
    url: String,
}

impl FootprintIndex {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let value = read_json(path)?;
        Self::from_value(value, &path.display().to_string())
    }

    pub fn from_value(value: Value, source: &str) -> Result<Self> {
        let root: IndexRoot = serde_json::from_value(value).map_err(|err| Error::Parse {
            what: source.to_string(),
            source: err,
        })?;

        let mut by_locator = BTreeMap::new();
        let mut by_id: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (idx, feature) in root.features.into_iter().enumerate() {
            let context = format!("{source} feature {idx}");
            let footprint = Polygon::from_geojson(&feature.geometry, &context)?;
            let bbox = footprint.envelope().ok_or_else(|| Error::InvalidGeometry {
                context: context.clone(),
                reason: "empty footprint".into(),
            })?;

            let locator = feature.properties.url;
            let id = scene_id_from_locator(&locator);
            let shared = by_id.entry(id).or_default();
            if !shared.contains(&locator) {
                shared.push(locator.clone());
            }
            by_locator.insert(locator, bbox);
        }

        for (id, locators) in &mut by_id {
            locators.sort();
            if locators.len() > 1 {
                warn!(
                    "{source}: scene id {id} is shared by {}; lookups by id alone will fail",
                    locators.join(", ")
                );
            }
        }

        Ok(Self {
            by_locator,
            by_id,
            crs: root.crs.filter(|c| !c.is_null()).map(Crs::from_value),
        })
    }

    pub fn crs(&self) -> Option<&Crs> {
        self.crs.as_ref()
    }

    pub fn len(&self) -> usize {
        self.by_locator.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_locator.is_empty()
    }
}

impl SceneStore for FootprintIndex {
    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .by_locator
            .keys()
            .filter(|locator| locator.starts_with(prefix))
            .cloned()
            .collect())
    }
}

impl BoundsReader for FootprintIndex {
    /// Looks up the exact locator first, then falls back to the scene id so a
    /// local listing can be matched against an index of remote URLs. The
    /// fallback fails when several indexed locators share that id.
    fn read_bounds(&self, locator: &str) -> Result<SceneBounds> {
        let indexed = match self.by_locator.get(locator) {
            Some(bbox) => Some(bbox),
            None => match self.by_id.get(&scene_id_from_locator(locator)).map(Vec::as_slice) {
                Some([single]) => self.by_locator.get(single),
                Some(candidates) if candidates.len() > 1 => {
                    return Err(Error::SceneListing(format!(
                        "{locator} matches several footprints by scene id: {}",
                        candidates.join(", ")
                    )))
                }
                _ => None,
            },
        };

        match indexed {
            Some(bbox) => Ok(SceneBounds {
                bbox: *bbox,
                crs: self.crs.clone(),
            }),
            None => Err(Error::SceneListing(format!(
                "{locator} is not in the footprint index"
            ))),
        }
    }
}
