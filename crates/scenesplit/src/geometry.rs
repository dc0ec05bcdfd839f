//! Planar polygon and bounding-box primitives.
//!
//! All coordinates are assumed to share one coordinate reference system; no
//! reprojection happens here. A [`Polygon`] may have several parts (GeoJSON
//! `MultiPolygon`) and may be empty, which is how an intersection with no
//! overlap is represented.

use geo::{Area, BooleanOps, BoundingRect, Coord, Intersects, LineString, MultiPolygon};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Axis-aligned rectangle in `(left, bottom, right, top)` order.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BoundingBox {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

impl BoundingBox {
    /// Builds a box, normalising swapped edges. Non-finite edges are rejected.
    pub fn new(left: f64, bottom: f64, right: f64, top: f64) -> Result<Self> {
        if ![left, bottom, right, top].iter().all(|v| v.is_finite()) {
            return Err(Error::InvalidGeometry {
                context: "bounding box".into(),
                reason: format!("non-finite edge in ({left}, {bottom}, {right}, {top})"),
            });
        }
        Ok(Self {
            left: left.min(right),
            bottom: bottom.min(top),
            right: left.max(right),
            top: bottom.max(top),
        })
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }

    /// Closed ring, counter-clockwise from the lower-left corner, with the
    /// first vertex repeated as the last.
    pub fn ring(&self) -> [[f64; 2]; 5] {
        [
            [self.left, self.bottom],
            [self.right, self.bottom],
            [self.right, self.top],
            [self.left, self.top],
            [self.left, self.bottom],
        ]
    }

    pub fn to_polygon(&self) -> Polygon {
        Polygon::from_rings(vec![self.ring().to_vec()])
    }

    /// Edge-inclusive overlap test.
    pub fn overlaps(&self, other: &BoundingBox) -> bool {
        self.left <= other.right
            && other.left <= self.right
            && self.bottom <= other.top
            && other.bottom <= self.top
    }

    pub fn contains_box(&self, other: &BoundingBox) -> bool {
        self.left <= other.left
            && self.bottom <= other.bottom
            && self.right >= other.right
            && self.top >= other.top
    }

    fn from_rect(rect: geo::Rect<f64>) -> Self {
        Self {
            left: rect.min().x,
            bottom: rect.min().y,
            right: rect.max().x,
            top: rect.max().y,
        }
    }
}

/// A possibly multi-part polygon with optional holes.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    shape: MultiPolygon<f64>,
}

impl Default for Polygon {
    fn default() -> Self {
        Self::empty()
    }
}

impl Polygon {
    pub fn empty() -> Self {
        Self {
            shape: MultiPolygon::new(Vec::new()),
        }
    }

    /// Single-part polygon: the first ring is the exterior, the rest are holes.
    /// Open rings are closed implicitly.
    pub fn from_rings(rings: Vec<Vec<[f64; 2]>>) -> Self {
        Self::from_parts(vec![rings])
    }

    pub fn from_parts(parts: Vec<Vec<Vec<[f64; 2]>>>) -> Self {
        let polygons = parts
            .into_iter()
            .filter(|rings| !rings.is_empty())
            .map(|mut rings| {
                let exterior = to_line_string(rings.remove(0));
                let interiors = rings.into_iter().map(to_line_string).collect();
                geo::Polygon::new(exterior, interiors)
            })
            .collect();
        Self {
            shape: MultiPolygon::new(polygons),
        }
    }

    /// Parses a GeoJSON `Polygon` or `MultiPolygon` geometry object.
    ///
    /// `context` names the source for error messages (e.g. `labels feature 12`).
    pub fn from_geojson(geometry: &serde_json::Value, context: &str) -> Result<Self> {
        let raw = RawGeometry::deserialize(geometry).map_err(|err| Error::InvalidGeometry {
            context: context.to_string(),
            reason: err.to_string(),
        })?;

        let parts = match raw.kind.as_str() {
            "Polygon" => vec![decode_polygon(raw.coordinates, context)?],
            "MultiPolygon" => {
                let parts: Vec<Vec<Vec<Vec<f64>>>> = serde_json::from_value(raw.coordinates)
                    .map_err(|err| Error::InvalidGeometry {
                        context: context.to_string(),
                        reason: err.to_string(),
                    })?;
                parts
                    .into_iter()
                    .map(|part| decode_rings(part, context))
                    .collect::<Result<Vec<_>>>()?
            }
            other => {
                return Err(Error::InvalidGeometry {
                    context: context.to_string(),
                    reason: format!("expected Polygon or MultiPolygon, found {other}"),
                })
            }
        };

        Ok(Self::from_parts(parts))
    }

    pub fn is_empty(&self) -> bool {
        self.shape.0.is_empty()
    }

    pub fn part_count(&self) -> usize {
        self.shape.0.len()
    }

    /// Unsigned planar area; holes are subtracted, parts are summed.
    pub fn area(&self) -> f64 {
        self.shape.unsigned_area()
    }

    /// Boundary contact counts as intersecting. Empty polygons intersect nothing.
    pub fn intersects(&self, other: &Polygon) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        match (self.envelope(), other.envelope()) {
            (Some(a), Some(b)) if !a.overlaps(&b) => false,
            _ => parts_intersect(&self.shape, &other.shape),
        }
    }

    pub fn intersects_box(&self, bbox: &BoundingBox) -> bool {
        if self.is_empty() {
            return false;
        }
        match self.envelope() {
            Some(env) if !env.overlaps(bbox) => false,
            Some(env) if bbox.contains_box(&env) => true,
            _ => parts_intersect(&self.shape, &bbox.to_polygon().shape),
        }
    }

    /// Overlapping region of the two polygons. Returns an empty polygon when
    /// they are disjoint or only touch along an edge.
    pub fn intersection(&self, other: &Polygon) -> Polygon {
        if self.is_empty() || other.is_empty() {
            return Polygon::empty();
        }
        let (Some(a), Some(b)) = (self.envelope(), other.envelope()) else {
            return Polygon::empty();
        };
        if !a.overlaps(&b) {
            return Polygon::empty();
        }
        // A rectangle fully covering the other operand leaves it unchanged.
        if is_rectangle(&self.shape, &a) && a.contains_box(&b) {
            return other.clone();
        }
        if is_rectangle(&other.shape, &b) && b.contains_box(&a) {
            return self.clone();
        }

        let shape = self.shape.intersection(&other.shape);
        Polygon {
            shape: MultiPolygon::new(
                shape
                    .0
                    .into_iter()
                    .filter(|p| p.unsigned_area() > 0.0)
                    .collect(),
            ),
        }
    }

    /// Axis-aligned envelope, `None` for an empty polygon.
    pub fn envelope(&self) -> Option<BoundingBox> {
        self.shape.bounding_rect().map(BoundingBox::from_rect)
    }

    pub fn as_geo(&self) -> &MultiPolygon<f64> {
        &self.shape
    }
}

impl From<geo::Polygon<f64>> for Polygon {
    fn from(polygon: geo::Polygon<f64>) -> Self {
        Self {
            shape: MultiPolygon::new(vec![polygon]),
        }
    }
}

impl From<MultiPolygon<f64>> for Polygon {
    fn from(shape: MultiPolygon<f64>) -> Self {
        Self { shape }
    }
}

#[derive(Deserialize)]
struct RawGeometry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    coordinates: serde_json::Value,
}

fn decode_polygon(coordinates: serde_json::Value, context: &str) -> Result<Vec<Vec<[f64; 2]>>> {
    let rings: Vec<Vec<Vec<f64>>> =
        serde_json::from_value(coordinates).map_err(|err| Error::InvalidGeometry {
            context: context.to_string(),
            reason: err.to_string(),
        })?;
    decode_rings(rings, context)
}

fn decode_rings(rings: Vec<Vec<Vec<f64>>>, context: &str) -> Result<Vec<Vec<[f64; 2]>>> {
    if rings.is_empty() {
        return Err(Error::InvalidGeometry {
            context: context.to_string(),
            reason: "polygon has no rings".into(),
        });
    }

    rings
        .into_iter()
        .map(|ring| {
            if ring.len() < 3 {
                return Err(Error::InvalidGeometry {
                    context: context.to_string(),
                    reason: format!("ring has {} positions, need at least 3", ring.len()),
                });
            }
            ring.into_iter()
                .map(|position| match position.as_slice() {
                    [x, y, ..] if x.is_finite() && y.is_finite() => Ok([*x, *y]),
                    _ => Err(Error::InvalidGeometry {
                        context: context.to_string(),
                        reason: format!("bad position {position:?}"),
                    }),
                })
                .collect()
        })
        .collect()
}

fn parts_intersect(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> bool {
    a.0.iter().any(|pa| b.0.iter().any(|pb| pa.intersects(pb)))
}

fn to_line_string(ring: Vec<[f64; 2]>) -> LineString<f64> {
    LineString::new(ring.into_iter().map(|[x, y]| Coord { x, y }).collect())
}

/// True when the shape is a single hole-free part whose area fills its envelope,
/// which for a simple polygon means it is that envelope.
fn is_rectangle(shape: &MultiPolygon<f64>, envelope: &BoundingBox) -> bool {
    let [part] = shape.0.as_slice() else {
        return false;
    };
    if !part.interiors().is_empty() {
        return false;
    }
    let expected = envelope.width() * envelope.height();
    expected > 0.0 && (part.unsigned_area() - expected).abs() <= expected * 1e-12
}
