//! Scene records and the collaborators that produce them.

use log::{debug, info};
use rayon::prelude::*;

use crate::{
    error::{Error, Result},
    geometry::{BoundingBox, Polygon},
    region::Crs,
};

/// Derives a scene identifier from its storage locator: the last path
/// segment with any query/fragment and its final extension removed.
///
/// `s3://bucket/imagery/scene_01.tif` gives `scene_01`; `a.b.tif` gives `a.b`;
/// a name with no extension is returned unchanged.
pub fn scene_id_from_locator(locator: &str) -> String {
    let without_suffix = locator
        .split(['?', '#'])
        .next()
        .unwrap_or(locator);
    let basename = without_suffix
        .split(['/', '\\'])
        .filter(|segment| !segment.is_empty())
        .last()
        .unwrap_or("");

    match basename.rfind('.') {
        Some(dot) if dot > 0 => basename[..dot].to_string(),
        _ => basename.to_string(),
    }
}

/// Enumerates scene locators from some store.
pub trait SceneStore {
    /// Locators whose key (relative to the store root) starts with `prefix`.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Bounding box of a scene together with the CRS it is expressed in, if known.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneBounds {
    pub bbox: BoundingBox,
    pub crs: Option<Crs>,
}

/// Resolves a scene locator to its bounds. Must be safe to call from several
/// threads at once.
pub trait BoundsReader: Sync {
    fn read_bounds(&self, locator: &str) -> Result<SceneBounds>;
}

/// One candidate scene.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneRecord {
    pub id: String,
    pub locator: String,
    pub bbox: BoundingBox,
    pub footprint: Polygon,
    pub crs: Option<Crs>,
}

impl SceneRecord {
    pub fn new(locator: impl Into<String>, bounds: SceneBounds) -> Self {
        let locator = locator.into();
        Self {
            id: scene_id_from_locator(&locator),
            footprint: bounds.bbox.to_polygon(),
            bbox: bounds.bbox,
            locator,
            crs: bounds.crs,
        }
    }
}

/// Lists `prefix` in `store`, sorts the locators, and reads every scene's
/// bounds in parallel on the current rayon pool.
///
/// The result is ordered lexicographically by locator. If any read fails, or a
/// locator yields an empty scene id, the whole index fails, naming every
/// locator that could not be resolved.
pub fn build_scene_index(
    store: &dyn SceneStore,
    reader: &dyn BoundsReader,
    prefix: &str,
) -> Result<Vec<SceneRecord>> {
    let mut locators = store.list(prefix)?;
    locators.sort();
    locators.dedup();
    info!("Listed {} candidate scenes under {:?}", locators.len(), prefix);

    let results: Vec<(String, Result<SceneBounds>)> = locators
        .into_par_iter()
        .map(|locator| {
            let bounds = if scene_id_from_locator(&locator).is_empty() {
                Err(Error::SceneListing(format!("{locator:?} has no scene id")))
            } else {
                reader.read_bounds(&locator)
            };
            (locator, bounds)
        })
        .collect();

    let mut records = Vec::with_capacity(results.len());
    let mut failures = Vec::new();
    for (locator, bounds) in results {
        match bounds {
            Ok(bounds) => {
                debug!("{locator}: {:?}", bounds.bbox);
                records.push(SceneRecord::new(locator, bounds));
            }
            Err(err) => failures.push((locator, err.to_string())),
        }
    }

    if !failures.is_empty() {
        return Err(Error::SceneMetadata { failures });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn identifier_strips_directory_and_extension() {
        assert_eq!(scene_id_from_locator("s3://bucket/imagery/scene_01.tif"), "scene_01");
        assert_eq!(scene_id_from_locator("scene_01.tif"), "scene_01");
        assert_eq!(scene_id_from_locator("dir\\sub\\a.b.tif"), "a.b");
        assert_eq!(scene_id_from_locator("https://host/x/scene.tif?sig=abc.def"), "scene");
        assert_eq!(scene_id_from_locator("prefix/noext"), "noext");
        assert_eq!(scene_id_from_locator("prefix/.hidden"), ".hidden");
        assert_eq!(scene_id_from_locator("prefix/dir/"), "dir");
    }

    struct Fixed(BTreeMap<String, Option<BoundingBox>>);

    impl SceneStore for Fixed {
        fn list(&self, prefix: &str) -> Result<Vec<String>> {
            // Reverse order on purpose; the builder must sort.
            Ok(self
                .0
                .keys()
                .rev()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect())
        }
    }

    impl BoundsReader for Fixed {
        fn read_bounds(&self, locator: &str) -> Result<SceneBounds> {
            match self.0.get(locator).copied().flatten() {
                Some(bbox) => Ok(SceneBounds { bbox, crs: None }),
                None => Err(Error::SceneListing(format!("no metadata for {locator}"))),
            }
        }
    }

    fn bbox(l: f64, b: f64, r: f64, t: f64) -> Option<BoundingBox> {
        Some(BoundingBox::new(l, b, r, t).unwrap())
    }

    #[test]
    fn index_is_sorted_and_filtered_by_prefix() {
        let store = Fixed(BTreeMap::from([
            ("scenes/b.tif".to_string(), bbox(1.0, 0.0, 2.0, 1.0)),
            ("scenes/a.tif".to_string(), bbox(0.0, 0.0, 1.0, 1.0)),
            ("other/c.tif".to_string(), bbox(0.0, 0.0, 1.0, 1.0)),
        ]));
        let records = build_scene_index(&store, &store, "scenes/").unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert!((records[1].footprint.area() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn every_failed_read_is_reported() {
        let store = Fixed(BTreeMap::from([
            ("a.tif".to_string(), None),
            ("b.tif".to_string(), bbox(0.0, 0.0, 1.0, 1.0)),
            ("c.tif".to_string(), None),
        ]));
        match build_scene_index(&store, &store, "") {
            Err(Error::SceneMetadata { failures }) => {
                let failed: Vec<_> = failures.iter().map(|(l, _)| l.as_str()).collect();
                assert_eq!(failed, ["a.tif", "c.tif"]);
            }
            other => panic!("expected SceneMetadata error, got {other:?}"),
        }
    }

    #[test]
    fn locators_without_an_id_are_rejected() {
        assert_eq!(scene_id_from_locator(""), "");
        assert_eq!(scene_id_from_locator("bucket//"), "bucket");
        assert_eq!(scene_id_from_locator("/"), "");
        let store = Fixed(BTreeMap::from([
            ("".to_string(), bbox(0.0, 0.0, 1.0, 1.0)),
            ("a.tif".to_string(), bbox(0.0, 0.0, 1.0, 1.0)),
        ]));
        match build_scene_index(&store, &store, "") {
            Err(Error::SceneMetadata { failures }) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].0, "");
                assert!(failures[0].1.contains("no scene id"));
            }
            other => panic!("expected SceneMetadata error, got {other:?}"),
        }
    }
}
