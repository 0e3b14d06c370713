//! Line emission sources: SUMO edges joined with their summed emissions

use super::sumo::{read_edge_emissions, EdgeEmissions, SumoNetwork};
use crate::error::{Result, Sumo2GralError};
use crate::geo::{Feature, FeatureCollection, Geometry, Projection};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

pub const LANE_WIDTH_M: u32 = 3;
pub const SOURCE_GROUP: &str = "highway";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighwayProperties {
    pub edge_id: String,
    pub lanes: u32,
    /// Metres
    pub width: u32,
    /// Metres
    pub length: f64,
    pub emission_src_group: String,
    /// `*_abs` totals in mg, keyed by SUMO attribute name
    #[serde(flatten)]
    pub emissions: BTreeMap<String, f64>,
}

impl HighwayProperties {
    pub fn emission(&self, attribute: &str) -> Option<f64> {
        self.emissions.get(attribute).copied()
    }
}

pub type Highways = FeatureCollection<HighwayProperties>;

/// Join network edges with emissions; edges without emissions are dropped
pub fn build_highways(
    network: &SumoNetwork,
    emissions: &EdgeEmissions,
    projection: Projection,
) -> Result<Highways> {
    let mut features = Vec::new();
    let mut without_emissions = 0usize;

    for edge in &network.edges {
        let Some(values) = emissions.get(&edge.id) else {
            without_emissions += 1;
            continue;
        };

        let coordinates = edge
            .shape
            .iter()
            .map(|[x, y]| {
                let (lon, lat) = network.to_lon_lat(*x, *y)?;
                let (px, py) = projection.project(lon, lat);
                Ok([px, py])
            })
            .collect::<Result<Vec<[f64; 2]>>>()?;

        let lanes = edge.lanes as u32;
        features.push(Feature::new(
            Geometry::LineString { coordinates },
            HighwayProperties {
                edge_id: edge.id.clone(),
                lanes,
                width: lanes * LANE_WIDTH_M,
                length: edge.length,
                emission_src_group: SOURCE_GROUP.to_string(),
                emissions: values.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            },
        ));
    }

    if without_emissions > 0 {
        warn!("{} network edges have no emission data and were dropped", without_emissions);
    }
    let network_ids: HashSet<&str> = network.edges.iter().map(|e| e.id.as_str()).collect();
    let unmatched = emissions
        .keys()
        .filter(|id| !network_ids.contains(id.as_str()))
        .count();
    if unmatched > 0 {
        warn!("{} emission edges are not in the network", unmatched);
    }

    Ok(FeatureCollection::new(projection.epsg(), features))
}

/// Read network and emissions, join them and write the highways artifact
pub fn write_highways(
    net_file: &Path,
    emissions_file: &Path,
    online: bool,
    projection: Projection,
    output: &Path,
) -> Result<usize> {
    if online {
        return Err(Sumo2GralError::Unsupported(
            "matching SUMO edges to downloaded OpenStreetMap highways (--online)".into(),
        ));
    }

    let network = SumoNetwork::read(net_file)?;
    let emissions = read_edge_emissions(emissions_file)?;
    let highways = build_highways(&network, &emissions, projection)?;
    highways.write(output)?;
    info!("✓ {} line sources written to {}", highways.features.len(), output.display());
    Ok(highways.features.len())
}
