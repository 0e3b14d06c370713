use super::projection::Projection;
use crate::error::{Result, Sumo2GralError};
use serde::{Deserialize, Serialize};

/// Study area in WGS84 decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl BoundingBox {
    /// Create a validated bounding box
    ///
    /// Requires north > south, east > west and coordinates inside WGS84 limits.
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Result<Self> {
        let bbox = BoundingBox {
            north,
            south,
            east,
            west,
        };
        bbox.validate()?;
        Ok(bbox)
    }

    pub fn validate(&self) -> Result<()> {
        let values = [self.north, self.south, self.east, self.west];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Sumo2GralError::InvalidInput(format!(
                "bounding box coordinates must be finite: {:?}",
                self
            )));
        }
        if !(-90.0..=90.0).contains(&self.north) || !(-90.0..=90.0).contains(&self.south) {
            return Err(Sumo2GralError::InvalidInput(format!(
                "latitudes must lie in [-90, 90] (north {}, south {})",
                self.north, self.south
            )));
        }
        if !(-180.0..=180.0).contains(&self.east) || !(-180.0..=180.0).contains(&self.west) {
            return Err(Sumo2GralError::InvalidInput(format!(
                "longitudes must lie in [-180, 180] (east {}, west {})",
                self.east, self.west
            )));
        }
        if self.north <= self.south {
            return Err(Sumo2GralError::InvalidInput(format!(
                "north ({}) must be greater than south ({})",
                self.north, self.south
            )));
        }
        if self.east <= self.west {
            return Err(Sumo2GralError::InvalidInput(format!(
                "east ({}) must be greater than west ({})",
                self.east, self.west
            )));
        }
        Ok(())
    }

    pub fn mean_latitude(&self) -> f64 {
        (self.north + self.south) / 2.0
    }

    /// Project the box, taking the envelope of all four corners
    pub fn project(&self, projection: &Projection) -> ProjectedBox {
        let corners = [
            projection.project(self.west, self.north),
            projection.project(self.east, self.north),
            projection.project(self.east, self.south),
            projection.project(self.west, self.south),
        ];
        let xs = corners.iter().map(|c| c.0);
        let ys = corners.iter().map(|c| c.1);
        ProjectedBox {
            west: xs.clone().fold(f64::INFINITY, f64::min),
            east: xs.fold(f64::NEG_INFINITY, f64::max),
            south: ys.clone().fold(f64::INFINITY, f64::min),
            north: ys.fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// Study area in projected metres
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_box() {
        let bbox = BoundingBox::new(40.43, 40.41, -3.69, -3.71).unwrap();
        assert!((bbox.mean_latitude() - 40.42).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_inverted_latitudes() {
        assert!(BoundingBox::new(40.41, 40.43, -3.69, -3.71).is_err());
        assert!(BoundingBox::new(40.41, 40.41, -3.69, -3.71).is_err());
    }

    #[test]
    fn test_rejects_inverted_longitudes() {
        assert!(BoundingBox::new(40.43, 40.41, -3.71, -3.69).is_err());
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(BoundingBox::new(91.0, 40.0, 1.0, 0.0).is_err());
        assert!(BoundingBox::new(41.0, 40.0, 181.0, 0.0).is_err());
        assert!(BoundingBox::new(f64::NAN, 40.0, 1.0, 0.0).is_err());
    }

    #[test]
    fn test_project_web_mercator() {
        let bbox = BoundingBox::new(40.43, 40.41, -3.69, -3.71).unwrap();
        let projected = bbox.project(&Projection::WebMercator);
        assert!(projected.north > projected.south);
        assert!(projected.east > projected.west);
        // ~0.02° of longitude at the equator scale is ~2226 m in Web Mercator
        assert!((projected.east - projected.west - 2226.39).abs() < 0.5);
    }
}
