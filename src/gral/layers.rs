use super::format::fmt_height;
use crate::error::{Result, Sumo2GralError};
use serde::{Deserialize, Serialize};

/// Heights (m above ground) of the horizontal concentration slices
///
/// Non-empty, strictly increasing, all heights positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct HorizontalLayers(Vec<f64>);

impl HorizontalLayers {
    pub fn new(heights: Vec<f64>) -> Result<Self> {
        if heights.is_empty() {
            return Err(Sumo2GralError::InvalidInput(
                "at least one horizontal layer is required".into(),
            ));
        }
        if let Some(bad) = heights.iter().find(|h| !h.is_finite() || **h <= 0.0) {
            return Err(Sumo2GralError::InvalidInput(format!(
                "horizontal layer heights must be positive, got {}",
                bad
            )));
        }
        if let Some(w) = heights.windows(2).find(|w| w[1] <= w[0]) {
            return Err(Sumo2GralError::InvalidInput(format!(
                "horizontal layers must be strictly increasing ({} followed by {})",
                w[0], w[1]
            )));
        }
        Ok(HorizontalLayers(heights))
    }

    /// Parse "3,6,9" (whitespace tolerated)
    pub fn parse(value: &str) -> Result<Self> {
        let heights = value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<f64>().map_err(|_| {
                    Sumo2GralError::InvalidInput(format!("invalid layer height '{}'", s))
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        Self::new(heights)
    }

    pub fn heights(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `in.dat` representation: every height followed by a comma
    pub fn to_in_dat(&self) -> String {
        self.0.iter().map(|h| format!("{},", fmt_height(*h))).collect()
    }
}

impl TryFrom<Vec<f64>> for HorizontalLayers {
    type Error = Sumo2GralError;

    fn try_from(value: Vec<f64>) -> Result<Self> {
        Self::new(value)
    }
}

impl From<HorizontalLayers> for Vec<f64> {
    fn from(layers: HorizontalLayers) -> Vec<f64> {
        layers.0
    }
}
