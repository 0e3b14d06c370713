//! Geometry extractors
//!
//! Buildings and vegetation come from a local OpenStreetMap file, line
//! emission sources from a SUMO network joined with SUMO edge emissions.
//! Each extractor writes a GeoJSON artifact in the target projected CRS.

pub mod buildings;
pub mod highways;
pub mod osm;
pub mod sumo;
pub mod vegetation;

pub use buildings::{write_buildings, BuildingProperties, Buildings};
pub use highways::{write_highways, HighwayProperties, Highways};
pub use sumo::{read_edge_emissions, SumoNetwork};
pub use vegetation::{write_vegetation, Vegetation, VegetationProperties};
