//! Loading of the region of interest and the raw label collection.
//!
//! Both inputs are GeoJSON-like FeatureCollections. Geometries are kept
//! verbatim next to their parsed [`Polygon`] so that per-scene label files can
//! re-emit every footprint exactly as it was read.

use std::{fs, path::Path};

use log::{debug, warn};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::{
    error::{Error, Result},
    geometry::Polygon,
};

/// Coordinate reference system as declared by a legacy GeoJSON `crs` member.
///
/// The raw member is preserved for output; comparisons use a normalised
/// authority code so that `urn:ogc:def:crs:EPSG::32633` equals `EPSG:32633`.
#[derive(Debug, Clone)]
pub struct Crs {
    raw: Value,
    key: String,
}

impl Crs {
    pub fn from_value(raw: Value) -> Self {
        let key = match &raw {
            Value::String(name) => normalise_crs_name(name),
            Value::Object(obj) => match obj
                .get("properties")
                .and_then(|p| p.get("name"))
                .and_then(Value::as_str)
            {
                Some(name) => normalise_crs_name(name),
                None => raw.to_string(),
            },
            other => other.to_string(),
        };
        Self { raw, key }
    }

    /// Shorthand for a named CRS, e.g. `Crs::named("EPSG:32633")`.
    pub fn named(name: &str) -> Self {
        Self::from_value(serde_json::json!({
            "type": "name",
            "properties": { "name": name }
        }))
    }

    /// Normalised authority code used for equality.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

impl PartialEq for Crs {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Crs {}

impl std::fmt::Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key)
    }
}

impl Serialize for Crs {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

fn normalise_crs_name(name: &str) -> String {
    let upper = name.trim().to_ascii_uppercase();
    let body = upper
        .strip_prefix("URN:OGC:DEF:CRS:")
        .unwrap_or(upper.as_str());
    let segments: Vec<&str> = body.split(':').filter(|s| !s.is_empty()).collect();

    match segments.as_slice() {
        [] => upper,
        [code] if *code == "CRS84" => "OGC:CRS84".into(),
        [code] => (*code).to_string(),
        [authority, .., code] => format!("{authority}:{code}"),
    }
}

/// Class metadata injected into every label feature before partitioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassTag {
    pub id: i64,
    pub name: String,
}

impl Default for ClassTag {
    fn default() -> Self {
        Self {
            id: 1,
            name: "building".into(),
        }
    }
}

/// Feature properties with the class fields named and everything else passed
/// through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeatureProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FeatureProperties {
    /// Lifts well-typed `class_id`/`class_name` out of a raw property map.
    /// Values of any other type stay in `extra`.
    pub fn from_map(mut map: Map<String, Value>) -> Self {
        let class_id = match map.get("class_id").and_then(Value::as_i64) {
            Some(id) => {
                map.remove("class_id");
                Some(id)
            }
            None => None,
        };
        let class_name = match map.get("class_name").and_then(Value::as_str) {
            Some(name) => {
                let name = name.to_string();
                map.remove("class_name");
                Some(name)
            }
            None => None,
        };

        Self {
            class_id,
            class_name,
            extra: map,
        }
    }

    fn tagged(&self, tag: &ClassTag) -> Self {
        let mut extra = self.extra.clone();
        extra.remove("class_id");
        extra.remove("class_name");
        Self {
            class_id: Some(tag.id),
            class_name: Some(tag.name.clone()),
            extra,
        }
    }
}

/// One label footprint.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelFeature {
    pub id: Option<Value>,
    /// Geometry object exactly as read.
    pub geometry: Value,
    pub shape: Polygon,
    pub properties: FeatureProperties,
}

impl Serialize for LabelFeature {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Out<'a> {
            #[serde(rename = "type")]
            kind: &'static str,
            #[serde(skip_serializing_if = "Option::is_none")]
            id: Option<&'a Value>,
            geometry: &'a Value,
            properties: &'a FeatureProperties,
        }

        Out {
            kind: "Feature",
            id: self.id.as_ref(),
            geometry: &self.geometry,
            properties: &self.properties,
        }
        .serialize(serializer)
    }
}

/// The label FeatureCollection as loaded, before class injection.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelCollection {
    pub crs: Option<Crs>,
    pub features: Vec<LabelFeature>,
}

impl LabelCollection {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let value = read_json(path)?;
        Self::from_value(value, &path.display().to_string())
    }

    /// Features with a `null` geometry are dropped with a warning; any other
    /// non-polygonal geometry is an error.
    pub fn from_value(value: Value, source: &str) -> Result<Self> {
        let raw: RawCollection = serde_json::from_value(value).map_err(|err| Error::Parse {
            what: source.to_string(),
            source: err,
        })?;

        let mut features = Vec::with_capacity(raw.features.len());
        let mut dropped = 0usize;
        for (idx, feature) in raw.features.into_iter().enumerate() {
            let Some(geometry) = feature.geometry.filter(|g| !g.is_null()) else {
                dropped += 1;
                continue;
            };
            let shape = Polygon::from_geojson(&geometry, &format!("{source} feature {idx}"))?;
            features.push(LabelFeature {
                id: feature.id,
                geometry,
                shape,
                properties: FeatureProperties::from_map(feature.properties.unwrap_or_default()),
            });
        }
        if dropped > 0 {
            warn!("{source}: dropped {dropped} feature(s) without geometry");
        }

        let crs = raw.crs.filter(|c| !c.is_null()).map(Crs::from_value);
        debug!(
            "{source}: {} label features, crs {}",
            features.len(),
            crs.as_ref().map_or("undeclared", Crs::key)
        );

        Ok(Self { crs, features })
    }

    /// Returns a new collection with `tag` set on every feature. The source
    /// collection is left untouched.
    pub fn with_class(&self, tag: &ClassTag) -> TaggedLabels {
        TaggedLabels {
            crs: self.crs.clone(),
            features: self
                .features
                .iter()
                .map(|f| LabelFeature {
                    properties: f.properties.tagged(tag),
                    ..f.clone()
                })
                .collect(),
            tag: tag.clone(),
        }
    }
}

/// Label collection after class injection; the only form the partitioner accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedLabels {
    crs: Option<Crs>,
    features: Vec<LabelFeature>,
    tag: ClassTag,
}

impl TaggedLabels {
    pub fn crs(&self) -> Option<&Crs> {
        self.crs.as_ref()
    }

    pub fn features(&self) -> &[LabelFeature] {
        &self.features
    }

    pub fn tag(&self) -> &ClassTag {
        &self.tag
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// The polygon bounding the study area.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionOfInterest {
    polygon: Polygon,
    area: f64,
    crs: Option<Crs>,
}

impl RegionOfInterest {
    /// Fails when the polygon has no positive area, since coverage fractions
    /// divide by it.
    pub fn new(polygon: Polygon, crs: Option<Crs>) -> Result<Self> {
        let area = polygon.area();
        if !(area.is_finite() && area > 0.0) {
            return Err(Error::InvalidGeometry {
                context: "region of interest".into(),
                reason: format!("area must be positive, got {area}"),
            });
        }
        Ok(Self { polygon, area, crs })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let value = read_json(path)?;
        Self::from_value(value, &path.display().to_string())
    }

    /// Uses the first feature carrying a polygonal geometry.
    pub fn from_value(value: Value, source: &str) -> Result<Self> {
        let raw: RawCollection = serde_json::from_value(value).map_err(|err| Error::Parse {
            what: source.to_string(),
            source: err,
        })?;

        let mut polygonal = raw.features.into_iter().enumerate().filter_map(|(idx, f)| {
            let geometry = f.geometry.filter(|g| {
                matches!(
                    g.get("type").and_then(Value::as_str),
                    Some("Polygon" | "MultiPolygon")
                )
            })?;
            Some((idx, geometry))
        });

        let (idx, geometry) = polygonal.next().ok_or_else(|| Error::InvalidGeometry {
            context: source.to_string(),
            reason: "no Polygon or MultiPolygon feature".into(),
        })?;
        let ignored = polygonal.count();
        if ignored > 0 {
            warn!("{source}: using feature {idx} as the region, ignoring {ignored} more");
        }

        let polygon = Polygon::from_geojson(&geometry, &format!("{source} feature {idx}"))?;
        let crs = raw.crs.filter(|c| !c.is_null()).map(Crs::from_value);
        Self::new(polygon, crs)
    }

    pub fn polygon(&self) -> &Polygon {
        &self.polygon
    }

    pub fn area(&self) -> f64 {
        self.area
    }

    pub fn crs(&self) -> Option<&Crs> {
        self.crs.as_ref()
    }
}

#[derive(Deserialize)]
struct RawCollection {
    #[serde(default)]
    crs: Option<Value>,
    features: Vec<RawFeature>,
}

#[derive(Deserialize)]
struct RawFeature {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    geometry: Option<Value>,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

pub(crate) fn read_json(path: &Path) -> Result<Value> {
    let bytes = fs::read(path).map_err(|source| Error::MissingInput {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| Error::Parse {
        what: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn labels_json() -> Value {
        json!({
            "type": "FeatureCollection",
            "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::32633" } },
            "features": [
                {
                    "type": "Feature",
                    "id": 7,
                    "geometry": { "type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 1], [0, 0]]] },
                    "properties": { "height": 12.5, "class_id": "roof" }
                },
                { "type": "Feature", "geometry": null, "properties": {} },
                {
                    "type": "Feature",
                    "geometry": { "type": "MultiPolygon", "coordinates": [[[[2, 2], [3, 2], [3, 3], [2, 2]]]] },
                    "properties": null
                }
            ]
        })
    }

    #[test]
    fn crs_names_normalise() {
        assert_eq!(Crs::named("urn:ogc:def:crs:EPSG::32633"), Crs::named("EPSG:32633"));
        assert_eq!(Crs::named("urn:ogc:def:crs:OGC:1.3:CRS84"), Crs::named("OGC:CRS84"));
        assert_eq!(Crs::from_value(json!("epsg:4326")).key(), "EPSG:4326");
        assert_ne!(Crs::named("EPSG:4326"), Crs::named("EPSG:3857"));
    }

    #[test]
    fn loads_labels_and_drops_null_geometry() {
        let labels = LabelCollection::from_value(labels_json(), "labels").unwrap();
        assert_eq!(labels.features.len(), 2);
        assert_eq!(labels.crs.as_ref().unwrap().key(), "EPSG:32633");
        assert_eq!(labels.features[0].id, Some(json!(7)));
        // A non-integer class_id stays a passthrough property until tagging.
        assert_eq!(labels.features[0].properties.class_id, None);
        assert_eq!(labels.features[0].properties.extra["class_id"], json!("roof"));
    }

    #[test]
    fn class_injection_is_pure_and_uniform() {
        let labels = LabelCollection::from_value(labels_json(), "labels").unwrap();
        let before = labels.clone();
        let tagged = labels.with_class(&ClassTag::default());

        assert_eq!(labels, before);
        assert_eq!(tagged.len(), 2);
        for feature in tagged.features() {
            let props = serde_json::to_value(&feature.properties).unwrap();
            assert_eq!(props["class_id"], json!(1));
            assert_eq!(props["class_name"], json!("building"));
        }
        assert_eq!(tagged.features()[0].properties.extra["height"], json!(12.5));
        assert_eq!(tagged.features()[0].geometry, labels.features[0].geometry);
    }

    #[test]
    fn feature_serialises_as_geojson() {
        let labels = LabelCollection::from_value(labels_json(), "labels").unwrap();
        let tagged = labels.with_class(&ClassTag { id: 3, name: "shed".into() });
        let out = serde_json::to_value(&tagged.features()[0]).unwrap();
        assert_eq!(out["type"], json!("Feature"));
        assert_eq!(out["id"], json!(7));
        assert_eq!(out["properties"], json!({ "class_id": 3, "class_name": "shed", "height": 12.5 }));
    }

    #[test]
    fn region_uses_first_polygon_feature() {
        let region = RegionOfInterest::from_value(
            json!({
                "type": "FeatureCollection",
                "features": [
                    { "type": "Feature", "geometry": { "type": "Point", "coordinates": [0, 0] }, "properties": {} },
                    { "type": "Feature", "geometry": { "type": "Polygon", "coordinates": [[[0, 0], [10, 0], [10, 10], [0, 10], [0, 0]]] } }
                ]
            }),
            "roi",
        )
        .unwrap();
        assert!((region.area() - 100.0).abs() < 1e-9);
        assert!(region.crs().is_none());
    }

    #[test]
    fn region_without_polygon_or_area_is_rejected() {
        let no_polygon = RegionOfInterest::from_value(json!({ "features": [] }), "roi");
        assert!(matches!(no_polygon, Err(Error::InvalidGeometry { .. })));

        let flat = RegionOfInterest::from_value(
            json!({ "features": [
                { "geometry": { "type": "Polygon", "coordinates": [[[0, 0], [1, 1], [2, 2], [0, 0]]] } }
            ]}),
            "roi",
        );
        assert!(matches!(flat, Err(Error::InvalidGeometry { .. })));
    }

    #[test]
    fn missing_file_is_missing_input() {
        let err = RegionOfInterest::from_path("/definitely/not/here.geojson").unwrap_err();
        assert!(matches!(err, Error::MissingInput { .. }));
    }
}
