//! Minimal GeoJSON feature collections used as intermediate geometry artifacts
//!
//! Extractors write projected polygons / polylines here; the GRAL input
//! generator reads them back. Coordinates are in the target CRS, named in the
//! collection's `crs` member.

use crate::error::{Result, Sumo2GralError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    /// Rings of [x, y]; the first ring is the exterior
    Polygon { coordinates: Vec<Vec<[f64; 2]>> },
    LineString { coordinates: Vec<[f64; 2]> },
}

impl Geometry {
    /// Envelope as (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let points: Vec<&[f64; 2]> = match self {
            Geometry::Polygon { coordinates } => coordinates.iter().flatten().collect(),
            Geometry::LineString { coordinates } => coordinates.iter().collect(),
        };
        if points.is_empty() {
            return None;
        }
        let mut b = (
            f64::INFINITY,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::NEG_INFINITY,
        );
        for [x, y] in points {
            b.0 = b.0.min(*x);
            b.1 = b.1.min(*y);
            b.2 = b.2.max(*x);
            b.3 = b.3.max(*y);
        }
        Some(b)
    }

    /// Exterior ring of a polygon
    pub fn exterior(&self) -> Option<&[[f64; 2]]> {
        match self {
            Geometry::Polygon { coordinates } => coordinates.first().map(|r| r.as_slice()),
            Geometry::LineString { .. } => None,
        }
    }

    /// Area-weighted centroid of a polygon's exterior ring
    ///
    /// Degenerate rings (zero area) fall back to the vertex mean.
    pub fn centroid(&self) -> Option<(f64, f64)> {
        let ring = match self {
            Geometry::Polygon { .. } => self.exterior()?,
            Geometry::LineString { coordinates } => coordinates.as_slice(),
        };
        if ring.is_empty() {
            return None;
        }

        let mut area2 = 0.0;
        let mut cx = 0.0;
        let mut cy = 0.0;
        for w in ring.windows(2) {
            let ([x0, y0], [x1, y1]) = (w[0], w[1]);
            let cross = x0 * y1 - x1 * y0;
            area2 += cross;
            cx += (x0 + x1) * cross;
            cy += (y0 + y1) * cross;
        }

        if area2.abs() < f64::EPSILON {
            let n = ring.len() as f64;
            let sx: f64 = ring.iter().map(|p| p[0]).sum();
            let sy: f64 = ring.iter().map(|p| p[1]).sum();
            return Some((sx / n, sy / n));
        }
        Some((cx / (3.0 * area2), cy / (3.0 * area2)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature<P> {
    #[serde(rename = "type")]
    pub r#type: String,
    pub geometry: Geometry,
    pub properties: P,
}

impl<P> Feature<P> {
    pub fn new(geometry: Geometry, properties: P) -> Self {
        Feature {
            r#type: "Feature".to_string(),
            geometry,
            properties,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrsName {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Crs {
    #[serde(rename = "type")]
    pub r#type: String,
    pub properties: CrsName,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureCollection<P> {
    #[serde(rename = "type")]
    pub r#type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crs: Option<Crs>,
    pub features: Vec<Feature<P>>,
}

impl<P> FeatureCollection<P> {
    pub fn new(epsg: u32, features: Vec<Feature<P>>) -> Self {
        FeatureCollection {
            r#type: "FeatureCollection".to_string(),
            crs: Some(Crs {
                r#type: "name".to_string(),
                properties: CrsName {
                    name: format!("urn:ogc:def:crs:EPSG::{}", epsg),
                },
            }),
            features,
        }
    }
}

impl<P: Serialize> FeatureCollection<P> {
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Sumo2GralError::io(parent, e))?;
        }
        let file = File::create(path).map_err(|e| Sumo2GralError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)
            .map_err(|e| Sumo2GralError::malformed(path, e.to_string()))?;
        writer.flush().map_err(|e| Sumo2GralError::io(path, e))
    }
}

impl<P: DeserializeOwned> FeatureCollection<P> {
    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Sumo2GralError::io(path, e))?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Sumo2GralError::malformed(path, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, side: f64) -> Geometry {
        Geometry::Polygon {
            coordinates: vec![vec![
                [x0, y0],
                [x0 + side, y0],
                [x0 + side, y0 + side],
                [x0, y0 + side],
                [x0, y0],
            ]],
        }
    }

    #[test]
    fn test_square_centroid() {
        let (cx, cy) = square(100.0, 200.0, 10.0).centroid().unwrap();
        assert!((cx - 105.0).abs() < 1e-9);
        assert!((cy - 205.0).abs() < 1e-9);
    }

    #[test]
    fn test_l_shape_centroid_is_area_weighted() {
        // 2x1 block plus 1x1 block on top of the left cell
        let l = Geometry::Polygon {
            coordinates: vec![vec![
                [0.0, 0.0],
                [2.0, 0.0],
                [2.0, 1.0],
                [1.0, 1.0],
                [1.0, 2.0],
                [0.0, 2.0],
                [0.0, 0.0],
            ]],
        };
        let (cx, cy) = l.centroid().unwrap();
        assert!((cx - 5.0 / 6.0).abs() < 1e-9);
        assert!((cy - 5.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_line_bounds() {
        let line = Geometry::LineString {
            coordinates: vec![[3.0, 9.0], [1.0, 4.0], [7.0, 5.0]],
        };
        assert_eq!(line.bounds(), Some((1.0, 4.0, 7.0, 9.0)));
    }

    #[test]
    fn test_geometry_serializes_with_type_tag() {
        let json = serde_json::to_string(&Geometry::LineString {
            coordinates: vec![[0.0, 1.0], [2.0, 3.0]],
        })
        .unwrap();
        assert_eq!(
            json,
            r#"{"type":"LineString","coordinates":[[0.0,1.0],[2.0,3.0]]}"#
        );
    }

    #[test]
    fn test_collection_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("squares.geojson");
        let fc = FeatureCollection::new(3857, vec![Feature::new(square(0.0, 0.0, 5.0), 7u32)]);
        fc.write(&path).unwrap();

        let back: FeatureCollection<u32> = FeatureCollection::read(&path).unwrap();
        assert_eq!(back.features.len(), 1);
        assert_eq!(back.features[0].properties, 7);
        assert_eq!(back.features[0].geometry, square(0.0, 0.0, 5.0));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_final_write_is_reported() {
        // Buffered output only reaches the device on flush; /dev/full rejects it
        let fc = FeatureCollection::new(3857, vec![Feature::new(square(0.0, 0.0, 5.0), 7u32)]);
        assert!(matches!(
            fc.write(Path::new("/dev/full")),
            Err(Sumo2GralError::Io { .. })
        ));
    }
}
