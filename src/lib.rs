//! sumo2gral library
//!
//! Turns SUMO traffic emissions, OpenStreetMap geometry and weather station
//! data into GRAL input files, runs GRAL and renames its result grids.
//!
//! Module organization:
//! - `sources`: building, vegetation and line-source extraction
//! - `weather`: weather situations and met files
//! - `gral`: input generation, engine invocation, result collation
//! - `geo`: bounding boxes, projections, GeoJSON artifacts
//! - `config`: CLI and config file resolution
//! - `pipeline`: ordered execution of the selected processes

pub mod config;
pub mod error;
pub mod geo;
pub mod gral;
pub mod pipeline;
pub mod sources;
pub mod weather;

pub use error::{Result, Sumo2GralError};
