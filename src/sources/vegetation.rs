use super::osm::read_closed_ways;
use crate::error::{Result, Sumo2GralError};
use crate::geo::{Feature, FeatureCollection, Geometry, Projection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VegetationProperties {
    pub osm_id: i64,
    #[serde(default)]
    pub name: Option<String>,
}

pub type Vegetation = FeatureCollection<VegetationProperties>;

/// Park polygons (`leisure=park`) projected to the target CRS
pub fn extract_vegetation(osm_file: &Path, projection: Projection) -> Result<Vegetation> {
    let ways = read_closed_ways(osm_file, |tags| {
        tags.get("leisure").map(String::as_str) == Some("park")
    })?;
    if ways.is_empty() {
        warn!("No parks found in {}", osm_file.display());
    }

    let features = ways
        .into_iter()
        .map(|way| {
            let ring = way
                .ring
                .iter()
                .map(|[lon, lat]| {
                    let (x, y) = projection.project(*lon, *lat);
                    [x, y]
                })
                .collect();
            Feature::new(
                Geometry::Polygon {
                    coordinates: vec![ring],
                },
                VegetationProperties {
                    osm_id: way.id,
                    name: way.tag("name").map(str::to_string),
                },
            )
        })
        .collect();

    Ok(FeatureCollection::new(projection.epsg(), features))
}

/// Extract and write the vegetation artifact
pub fn write_vegetation(
    osm_file: Option<&Path>,
    online: bool,
    projection: Projection,
    output: &Path,
) -> Result<usize> {
    if online {
        return Err(Sumo2GralError::Unsupported(
            "downloading parks from OpenStreetMap (--online); pass --osm-file".into(),
        ));
    }
    let osm_file = osm_file.ok_or_else(|| {
        Sumo2GralError::Config("--osm-file is required to extract vegetation".into())
    })?;

    let vegetation = extract_vegetation(osm_file, projection)?;
    vegetation.write(output)?;
    info!("✓ {} vegetation areas written to {}", vegetation.features.len(), output.display());
    Ok(vegetation.features.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::fixtures::SAMPLE_OSM;

    #[test]
    fn test_parks_only() {
        let dir = tempfile::tempdir().unwrap();
        let osm = dir.path().join("map.osm");
        std::fs::write(&osm, SAMPLE_OSM).unwrap();
        let out = dir.path().join("vegetation.geojson");

        let n = write_vegetation(
            Some(&osm),
            false,
            Projection::Utm { zone: 30, south: false },
            &out,
        )
        .unwrap();
        assert_eq!(n, 1);

        let back: Vegetation = FeatureCollection::read(&out).unwrap();
        assert_eq!(back.features[0].properties.osm_id, 12);
        let ring = back.features[0].geometry.exterior().unwrap();
        assert_eq!(ring.len(), 4);
        // UTM zone 30 easting near the central meridian
        assert!(ring[0][0] > 400_000.0 && ring[0][0] < 600_000.0);
    }

    #[test]
    fn test_missing_osm_file_is_config_error() {
        let out = std::path::PathBuf::from("unused.geojson");
        assert!(matches!(
            write_vegetation(None, false, Projection::WebMercator, &out),
            Err(Sumo2GralError::Config(_))
        ));
    }
}
