//! GRAL input generation, engine invocation and result collation

pub mod collate;
pub mod driver;
pub mod files;
pub mod format;
pub mod grid;
pub mod layers;
pub mod pollutant;

pub use collate::collate_results;
pub use driver::{Engine, GralEngine};
pub use files::{GeneratedInputs, GralInputGenerator, GralSettings, GralSources};
pub use grid::{process_result_file, GridSummary, ResultGrid};
pub use layers::HorizontalLayers;
pub use pollutant::Pollutant;
