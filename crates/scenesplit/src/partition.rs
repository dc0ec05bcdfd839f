//! Distribution of label features over the scenes they touch.
//!
//! Assignment is many-to-many: a footprint straddling two scenes is copied,
//! unclipped, into both scenes' collections.

use log::debug;
use rstar::{RTree, RTreeObject, AABB};
use serde::Serialize;

use crate::{
    error::{Error, Result},
    geometry::BoundingBox,
    region::{Crs, LabelFeature, TaggedLabels},
    scene::SceneRecord,
};

/// Label features for one scene, ready to be written as a FeatureCollection.
#[derive(Debug, Clone)]
pub struct SceneLabels<'a> {
    pub scene: &'a SceneRecord,
    pub crs: Option<&'a Crs>,
    pub features: Vec<&'a LabelFeature>,
}

impl SceneLabels<'_> {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Pretty-printed GeoJSON with a trailing newline. Key order is stable,
    /// so equal inputs serialise to equal bytes.
    pub fn to_geojson(&self) -> Result<Vec<u8>> {
        #[derive(Serialize)]
        struct Collection<'c> {
            #[serde(rename = "type")]
            kind: &'static str,
            #[serde(skip_serializing_if = "Option::is_none")]
            crs: Option<&'c Crs>,
            features: &'c [&'c LabelFeature],
        }

        let mut bytes = serde_json::to_vec_pretty(&Collection {
            kind: "FeatureCollection",
            crs: self.crs,
            features: &self.features,
        })
        .map_err(|source| Error::Parse {
            what: format!("labels for {}", self.scene.id),
            source,
        })?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

#[derive(Clone)]
struct SceneBox {
    idx: usize,
    env: AABB<[f64; 2]>,
}

impl RTreeObject for SceneBox {
    type Envelope = AABB<[f64; 2]>;

    #[inline]
    fn envelope(&self) -> Self::Envelope {
        self.env
    }
}

fn aabb(bbox: &BoundingBox) -> AABB<[f64; 2]> {
    AABB::from_corners([bbox.left, bbox.bottom], [bbox.right, bbox.top])
}

/// For every scene, in the given order, the features whose geometry
/// intersects that scene's bounding box. Features keep their input order and
/// the collection's CRS member is carried over unchanged.
pub fn partition_labels<'a>(
    scenes: &'a [SceneRecord],
    labels: &'a TaggedLabels,
) -> Vec<SceneLabels<'a>> {
    let tree = RTree::bulk_load(
        scenes
            .iter()
            .enumerate()
            .map(|(idx, scene)| SceneBox {
                idx,
                env: aabb(&scene.bbox),
            })
            .collect(),
    );

    let mut per_scene: Vec<Vec<&LabelFeature>> = vec![Vec::new(); scenes.len()];
    for feature in labels.features() {
        let Some(envelope) = feature.shape.envelope() else {
            continue;
        };

        let mut hits: Vec<usize> = tree
            .locate_in_envelope_intersecting(&aabb(&envelope))
            .filter(|candidate| feature.shape.intersects_box(&scenes[candidate.idx].bbox))
            .map(|candidate| candidate.idx)
            .collect();
        hits.sort_unstable();
        for idx in hits {
            per_scene[idx].push(feature);
        }
    }

    scenes
        .iter()
        .zip(per_scene)
        .map(|(scene, features)| {
            debug!("{}: {} label features", scene.id, features.len());
            SceneLabels {
                scene,
                crs: labels.crs(),
                features,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        region::{ClassTag, LabelCollection},
        scene::SceneBounds,
    };
    use serde_json::{json, Value};

    fn scene(locator: &str, l: f64, b: f64, r: f64, t: f64) -> SceneRecord {
        SceneRecord::new(
            locator,
            SceneBounds {
                bbox: BoundingBox::new(l, b, r, t).unwrap(),
                crs: None,
            },
        )
    }

    fn square(x: f64, y: f64, size: f64) -> Value {
        json!({
            "type": "Polygon",
            "coordinates": [[[x, y], [x + size, y], [x + size, y + size], [x, y + size], [x, y]]]
        })
    }

    fn labels() -> TaggedLabels {
        LabelCollection::from_value(
            json!({
                "type": "FeatureCollection",
                "crs": { "type": "name", "properties": { "name": "EPSG:32633" } },
                "features": [
                    { "type": "Feature", "geometry": square(1.0, 1.0, 1.0), "properties": { "n": 0 } },
                    // Straddles the boundary between the two scenes.
                    { "type": "Feature", "geometry": square(9.0, 4.0, 2.0), "properties": { "n": 1 } },
                    { "type": "Feature", "geometry": square(15.0, 5.0, 1.0), "properties": { "n": 2 } },
                    { "type": "Feature", "geometry": square(50.0, 50.0, 1.0), "properties": { "n": 3 } },
                    // Its envelope reaches scene d in the membership test, its body does not.
                    { "type": "Feature", "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[5.0, 11.0], [9.5, 11.0], [5.0, 15.0], [5.0, 11.0]]]
                    }, "properties": { "n": 4 } }
                ]
            }),
            "labels",
        )
        .unwrap()
        .with_class(&ClassTag::default())
    }

    fn numbers(scene: &SceneLabels<'_>) -> Vec<i64> {
        scene
            .features
            .iter()
            .map(|f| f.properties.extra["n"].as_i64().unwrap())
            .collect()
    }

    #[test]
    fn feature_appears_in_every_scene_it_touches() {
        let scenes = vec![
            scene("a.tif", 0.0, 0.0, 10.0, 10.0),
            scene("b.tif", 10.0, 0.0, 20.0, 10.0),
        ];
        let labels = labels();
        let parts = partition_labels(&scenes, &labels);

        assert_eq!(numbers(&parts[0]), [0, 1]);
        assert_eq!(numbers(&parts[1]), [1, 2]);
        // The straddling footprint is the same unclipped record in both scenes.
        assert_eq!(parts[0].features[1].geometry, parts[1].features[0].geometry);
    }

    #[test]
    fn membership_matches_intersection_test() {
        let scenes = vec![
            scene("a.tif", 0.0, 0.0, 10.0, 10.0),
            scene("b.tif", 10.0, 0.0, 20.0, 10.0),
            scene("c.tif", 0.0, 10.0, 10.0, 20.0),
            scene("d.tif", 9.0, 12.0, 20.0, 20.0),
        ];
        let labels = labels();
        let parts = partition_labels(&scenes, &labels);

        for (scene, part) in scenes.iter().zip(&parts) {
            for feature in labels.features() {
                let expected = feature.shape.intersects_box(&scene.bbox);
                let present = part.features.iter().any(|f| std::ptr::eq(*f, feature));
                assert_eq!(expected, present, "{} / {:?}", scene.id, feature.properties);
            }
        }
        assert_eq!(numbers(&parts[2]), [4]);
        assert!(parts[3].is_empty());
    }

    #[test]
    fn output_collection_keeps_crs_and_class() {
        let scenes = vec![scene("s3://bucket/a.tif", 0.0, 0.0, 10.0, 10.0)];
        let labels = labels();
        let parts = partition_labels(&scenes, &labels);
        let bytes = parts[0].to_geojson().unwrap();
        assert_eq!(bytes.last(), Some(&b'\n'));

        let out: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(out["type"], "FeatureCollection");
        assert_eq!(out["crs"]["properties"]["name"], "EPSG:32633");
        let features = out["features"].as_array().unwrap();
        assert_eq!(features.len(), 2);
        for feature in features {
            assert_eq!(feature["properties"]["class_id"], 1);
            assert_eq!(feature["properties"]["class_name"], "building");
        }
        assert_eq!(features[1]["geometry"], square(9.0, 4.0, 2.0));
    }
}
