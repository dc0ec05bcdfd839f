//! Selection of the scenes whose footprint intersects the region of interest.

use log::{debug, info};

use crate::{
    error::{Error, Result},
    region::RegionOfInterest,
    scene::SceneRecord,
};

/// Scenes whose footprint intersects the region, in input order.
///
/// An empty result is an error: a run over zero scenes would only produce
/// empty manifests.
pub fn intersecting_scenes(
    scenes: &[SceneRecord],
    region: &RegionOfInterest,
) -> Result<Vec<SceneRecord>> {
    let selected: Vec<SceneRecord> = scenes
        .iter()
        .filter(|scene| {
            let hit = region.polygon().intersects_box(&scene.bbox);
            debug!("{}: intersects region = {hit}", scene.id);
            hit
        })
        .cloned()
        .collect();

    if selected.is_empty() {
        return Err(Error::EmptyIntersection {
            candidates: scenes.len(),
        });
    }

    info!(
        "{} of {} scenes intersect the region",
        selected.len(),
        scenes.len()
    );
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        geometry::{BoundingBox, Polygon},
        scene::SceneBounds,
    };

    fn scene(locator: &str, l: f64, b: f64, r: f64, t: f64) -> SceneRecord {
        SceneRecord::new(
            locator,
            SceneBounds {
                bbox: BoundingBox::new(l, b, r, t).unwrap(),
                crs: None,
            },
        )
    }

    fn triangle_region() -> RegionOfInterest {
        RegionOfInterest::new(
            Polygon::from_rings(vec![vec![[0.0, 0.0], [10.0, 0.0], [0.0, 10.0], [0.0, 0.0]]]),
            None,
        )
        .unwrap()
    }

    #[test]
    fn keeps_intersecting_scenes_in_order() {
        let scenes = vec![
            scene("c.tif", 1.0, 1.0, 2.0, 2.0),
            // Inside the triangle's envelope but beyond its hypotenuse.
            scene("b.tif", 8.0, 8.0, 9.0, 9.0),
            scene("a.tif", -5.0, -5.0, 0.5, 0.5),
        ];
        let selected = intersecting_scenes(&scenes, &triangle_region()).unwrap();
        let ids: Vec<_> = selected.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["c", "a"]);
    }

    #[test]
    fn no_intersection_is_an_error() {
        let scenes = vec![scene("far.tif", 100.0, 100.0, 110.0, 110.0)];
        match intersecting_scenes(&scenes, &triangle_region()) {
            Err(Error::EmptyIntersection { candidates }) => assert_eq!(candidates, 1),
            other => panic!("expected EmptyIntersection, got {other:?}"),
        }
        assert!(matches!(
            intersecting_scenes(&[], &triangle_region()),
            Err(Error::EmptyIntersection { candidates: 0 })
        ));
    }
}
