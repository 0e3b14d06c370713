//! Geographic primitives: study-area bounding box, projections and the
//! GeoJSON artifacts exchanged between extractors and the GRAL generator.

pub mod bbox;
pub mod geojson;
pub mod projection;

pub use bbox::{BoundingBox, ProjectedBox};
pub use geojson::{Feature, FeatureCollection, Geometry};
pub use projection::Projection;
