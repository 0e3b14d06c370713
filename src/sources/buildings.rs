//! Building footprints with heights
//!
//! Height is 3 m per level. Buildings without a usable `building:levels`
//! tag get a level count drawn from the known ones, each known building
//! weighted by its own level count.

use super::osm::{read_closed_ways, OsmWay};
use crate::error::{Result, Sumo2GralError};
use crate::geo::{Feature, FeatureCollection, Geometry, Projection};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

pub const METRES_PER_LEVEL: u32 = 3;
/// Larger `building:levels` values are treated as tagging errors
pub const MAX_LEVELS: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingProperties {
    pub osm_id: i64,
    pub building: String,
    pub levels: u32,
    /// Metres
    pub height: u32,
}

pub type Buildings = FeatureCollection<BuildingProperties>;

/// `building:levels` value; `None` when absent, a list, unparsable or above `MAX_LEVELS`
fn parse_levels(value: Option<&str>) -> Option<u32> {
    let value = value?.trim();
    if value.contains(',') {
        return None;
    }
    let levels = value.parse::<f64>().ok()?.trunc();
    (levels.is_finite() && (0.0..=MAX_LEVELS as f64).contains(&levels)).then(|| levels as u32)
}

/// Zero levels still yields a one-storey height
pub fn height_for_levels(levels: u32) -> u32 {
    match levels.saturating_mul(METRES_PER_LEVEL) {
        0 => METRES_PER_LEVEL,
        h => h,
    }
}

/// Fill unknown level counts from the distribution of the known ones
fn fill_levels(known: &[Option<u32>], rng: &mut StdRng) -> Vec<u32> {
    let sample: Vec<u32> = known.iter().flatten().copied().filter(|&l| l > 0).collect();
    let distribution = WeightedIndex::new(sample.iter().map(|&l| u64::from(l))).ok();

    known
        .iter()
        .map(|levels| match (levels, &distribution) {
            (Some(l), _) => *l,
            (None, Some(dist)) => sample[dist.sample(rng)],
            (None, None) => 1,
        })
        .collect()
}

pub struct BuildingsExtractor {
    projection: Projection,
    rng: StdRng,
}

impl BuildingsExtractor {
    pub fn new(projection: Projection, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        BuildingsExtractor { projection, rng }
    }

    pub fn extract(&mut self, osm_file: &Path) -> Result<Buildings> {
        let ways = read_closed_ways(osm_file, |tags| tags.contains_key("building"))?;
        if ways.is_empty() {
            warn!("No building footprints found in {}", osm_file.display());
        }
        Ok(self.collect_features(ways))
    }

    fn collect_features(&mut self, ways: Vec<OsmWay>) -> Buildings {
        let known: Vec<Option<u32>> = ways
            .iter()
            .map(|w| parse_levels(w.tag("building:levels")))
            .collect();
        let unknown = known.iter().filter(|l| l.is_none()).count();
        let levels = fill_levels(&known, &mut self.rng);
        if unknown > 0 {
            info!("Sampled levels for {} of {} buildings", unknown, ways.len());
        }

        let features = ways
            .into_iter()
            .zip(levels)
            .map(|(way, levels)| {
                let ring = way
                    .ring
                    .iter()
                    .map(|[lon, lat]| {
                        let (x, y) = self.projection.project(*lon, *lat);
                        [x, y]
                    })
                    .collect();
                Feature::new(
                    Geometry::Polygon {
                        coordinates: vec![ring],
                    },
                    BuildingProperties {
                        osm_id: way.id,
                        building: way.tag("building").unwrap_or("yes").to_string(),
                        levels,
                        height: height_for_levels(levels),
                    },
                )
            })
            .collect();

        FeatureCollection::new(self.projection.epsg(), features)
    }
}

/// Extract and write the buildings artifact
pub fn write_buildings(
    osm_file: Option<&Path>,
    online: bool,
    projection: Projection,
    seed: Option<u64>,
    output: &Path,
) -> Result<usize> {
    let osm_file = match (osm_file, online) {
        (_, true) => {
            return Err(Sumo2GralError::Unsupported(
                "downloading buildings from OpenStreetMap (--online); pass --osm-file".into(),
            ))
        }
        (Some(path), false) => path,
        (None, false) => {
            return Err(Sumo2GralError::Config(
                "--osm-file is required to extract buildings".into(),
            ))
        }
    };

    let buildings = BuildingsExtractor::new(projection, seed).extract(osm_file)?;
    buildings.write(output)?;
    info!("✓ {} buildings written to {}", buildings.features.len(), output.display());
    Ok(buildings.features.len())
}
