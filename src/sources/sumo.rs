//! SUMO network and edge-emission readers
//!
//! Network: `location` (netOffset, origBoundary, projParameter) and the
//! non-internal `edge` elements with their lanes. Emissions: edge-based
//! meandata output, `*_abs` attributes summed per edge over all intervals.

use crate::error::{Result, Sumo2GralError};
use crate::geo::{BoundingBox, Projection};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct SumoEdge {
    pub id: String,
    /// Network coordinates (metres, netOffset applied)
    pub shape: Vec<[f64; 2]>,
    pub lanes: usize,
    /// Length of the first lane (m)
    pub length: f64,
}

#[derive(Debug, Clone)]
pub struct SumoNetwork {
    pub path: PathBuf,
    pub net_offset: [f64; 2],
    pub projection: Option<Projection>,
    pub orig_boundary: Option<[f64; 4]>,
    pub edges: Vec<SumoEdge>,
}

/// Summed emission attributes (mg) per edge id
pub type EdgeEmissions = HashMap<String, HashMap<String, f64>>;

fn attribute(element: &BytesStart, key: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn parse_pair(value: &str) -> Option<[f64; 2]> {
    let (x, y) = value.split_once(',')?;
    Some([x.trim().parse().ok()?, y.trim().parse().ok()?])
}

/// `"x1,y1 x2,y2 ..."`
fn parse_shape(value: &str) -> Option<Vec<[f64; 2]>> {
    value.split_whitespace().map(parse_pair).collect()
}

fn parse_boundary(value: &str) -> Option<[f64; 4]> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|p| p.trim().parse().ok())
        .collect::<Option<Vec<f64>>>()?;
    parts.try_into().ok()
}

struct PendingEdge {
    id: String,
    shape: Option<Vec<[f64; 2]>>,
    lanes: usize,
    length: Option<f64>,
    lane_shape: Option<Vec<[f64; 2]>>,
}

impl PendingEdge {
    fn finish(self) -> Option<SumoEdge> {
        let shape = self.shape.or(self.lane_shape)?;
        if shape.len() < 2 {
            return None;
        }
        Some(SumoEdge {
            id: self.id,
            shape,
            lanes: self.lanes,
            length: self.length.unwrap_or(0.0),
        })
    }
}

impl SumoNetwork {
    pub fn read(path: &Path) -> Result<Self> {
        let mut reader =
            Reader::from_file(path).map_err(|e| Sumo2GralError::malformed(path, e.to_string()))?;
        reader.config_mut().trim_text(true);

        let mut network = SumoNetwork {
            path: path.to_path_buf(),
            net_offset: [0.0, 0.0],
            projection: None,
            orig_boundary: None,
            edges: Vec::new(),
        };
        let mut pending: Option<PendingEdge> = None;
        let mut skipped = 0usize;
        let mut buf = Vec::new();

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| Sumo2GralError::malformed(path, e.to_string()))?;
            match event {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let is_empty = matches!(event, Event::Empty(_));
                    match e.name().as_ref() {
                        b"location" => {
                            if let Some(offset) = attribute(e, b"netOffset") {
                                network.net_offset = parse_pair(&offset).ok_or_else(|| {
                                    Sumo2GralError::malformed(path, format!("bad netOffset '{}'", offset))
                                })?;
                            }
                            if let Some(proj) = attribute(e, b"projParameter") {
                                network.projection = Projection::from_proj4(&proj)?;
                            }
                            network.orig_boundary =
                                attribute(e, b"origBoundary").and_then(|b| parse_boundary(&b));
                        }
                        b"edge" => {
                            let internal = attribute(e, b"function").as_deref() == Some("internal");
                            let id = attribute(e, b"id").ok_or_else(|| {
                                Sumo2GralError::malformed(path, "<edge> without an id")
                            })?;
                            if internal || is_empty {
                                skipped += 1;
                            } else {
                                pending = Some(PendingEdge {
                                    id,
                                    shape: attribute(e, b"shape").and_then(|s| parse_shape(&s)),
                                    lanes: 0,
                                    length: None,
                                    lane_shape: None,
                                });
                            }
                        }
                        b"lane" => {
                            if let Some(edge) = pending.as_mut() {
                                edge.lanes += 1;
                                if edge.lanes == 1 {
                                    edge.length = attribute(e, b"length").and_then(|l| l.parse().ok());
                                    edge.lane_shape = attribute(e, b"shape").and_then(|s| parse_shape(&s));
                                }
                            }
                        }
                        _ => {}
                    }
                }
                Event::End(ref e) if e.name().as_ref() == b"edge" => {
                    if let Some(edge) = pending.take() {
                        match edge.finish() {
                            Some(edge) => network.edges.push(edge),
                            None => skipped += 1,
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        debug!("Skipped {} internal or shapeless edges", skipped);
        info!(
            "SUMO network {}: {} edges, projection {}",
            path.display(),
            network.edges.len(),
            network
                .projection
                .map(|p| p.to_string())
                .unwrap_or_else(|| "none".to_string())
        );
        Ok(network)
    }

    /// Network coordinates → WGS84 lon/lat
    pub fn to_lon_lat(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let projection = self.projection.ok_or_else(|| {
            Sumo2GralError::Unsupported(format!(
                "network {} is not geo-referenced (no projParameter)",
                self.path.display()
            ))
        })?;
        Ok(projection.unproject(x - self.net_offset[0], y - self.net_offset[1]))
    }

    /// Study area from `origBoundary` (west, south, east, north in degrees)
    pub fn bounding_box(&self) -> Result<BoundingBox> {
        match (self.projection, self.orig_boundary) {
            (Some(_), Some([west, south, east, north])) => BoundingBox::new(north, south, east, west),
            _ => Err(Sumo2GralError::InvalidInput(format!(
                "no bounding box given and network {} has no geographic origBoundary",
                self.path.display()
            ))),
        }
    }
}

/// Read edge-based emission output, summing `*_abs` attributes per edge
pub fn read_edge_emissions(path: &Path) -> Result<EdgeEmissions> {
    let mut reader =
        Reader::from_file(path).map_err(|e| Sumo2GralError::malformed(path, e.to_string()))?;
    reader.config_mut().trim_text(true);

    let mut emissions = EdgeEmissions::new();
    let mut intervals = 0usize;
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| Sumo2GralError::malformed(path, e.to_string()))?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => match e.name().as_ref() {
                b"interval" => intervals += 1,
                b"edge" => {
                    let mut id = None;
                    let mut values = Vec::new();
                    for attr in e.attributes().flatten() {
                        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                        let value = attr
                            .unescape_value()
                            .map_err(|err| Sumo2GralError::malformed(path, err.to_string()))?;
                        if key == "id" {
                            id = Some(value.into_owned());
                        } else if key.ends_with("_abs") {
                            let v: f64 = value.parse().map_err(|_| {
                                Sumo2GralError::malformed(path, format!("{}='{}' is not a number", key, value))
                            })?;
                            values.push((key, v));
                        }
                    }
                    let id = id.ok_or_else(|| Sumo2GralError::malformed(path, "<edge> without an id"))?;
                    let entry = emissions.entry(id).or_default();
                    for (key, v) in values {
                        *entry.entry(key).or_insert(0.0) += v;
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    info!(
        "SUMO emissions {}: {} edges over {} interval(s)",
        path.display(),
        emissions.len(),
        intervals
    );
    Ok(emissions)
}
