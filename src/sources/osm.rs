//! Local OpenStreetMap reader
//!
//! Collects polygons whose tags pass a filter, from either a `.osm.pbf`
//! extract (osmpbf) or a plain `.osm` XML file (quick-xml). Polygons are
//! closed ways and the outer rings of `type=multipolygon` relations, one
//! polygon per ring. Node coordinates are WGS84 lon/lat.

use crate::error::{Result, Sumo2GralError};
use osmpbf::{Element, ElementReader, RelMemberType};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

pub type Tags = HashMap<String, String>;

/// Closed ring resolved to lon/lat coordinates
///
/// `id` is the way id, or the relation id for multipolygon parts.
#[derive(Debug, Clone, PartialEq)]
pub struct OsmWay {
    pub id: i64,
    pub tags: Tags,
    /// Exterior ring, first point repeated at the end
    pub ring: Vec<[f64; 2]>,
}

impl OsmWay {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

struct RawWay {
    id: i64,
    refs: Vec<i64>,
    tags: Tags,
}

struct RawRelation {
    id: i64,
    /// Way ids with role `outer` (or no role)
    outer: Vec<i64>,
    tags: Tags,
}

#[derive(Default)]
struct OsmData {
    nodes: HashMap<i64, [f64; 2]>,
    /// Matching ways
    ways: Vec<RawWay>,
    /// Node refs of every way, for relation members
    way_refs: HashMap<i64, Vec<i64>>,
    /// Matching multipolygon relations
    relations: Vec<RawRelation>,
}

fn is_closed(refs: &[i64]) -> bool {
    refs.len() >= 4 && refs.first() == refs.last()
}

fn is_multipolygon(tags: &Tags) -> bool {
    tags.get("type").map(String::as_str) == Some("multipolygon")
}

/// Join member ways end to end into closed rings; leftovers that never
/// close are dropped
fn assemble_rings(mut segments: Vec<Vec<i64>>) -> (Vec<Vec<i64>>, usize) {
    let mut rings = Vec::new();
    let mut unclosed = 0usize;

    while let Some(mut ring) = segments.pop() {
        while !is_closed(&ring) {
            let Some(&tail) = ring.last() else { break };
            let next = segments
                .iter()
                .position(|s| s.first() == Some(&tail) || s.last() == Some(&tail));
            let Some(i) = next else { break };
            let mut segment = segments.swap_remove(i);
            if segment.first() != Some(&tail) {
                segment.reverse();
            }
            ring.extend(segment.into_iter().skip(1));
        }
        if is_closed(&ring) {
            rings.push(ring);
        } else {
            unclosed += 1;
        }
    }
    (rings, unclosed)
}

impl OsmData {
    fn resolve(&self, refs: &[i64]) -> Option<Vec<[f64; 2]>> {
        refs.iter().map(|r| self.nodes.get(r).copied()).collect()
    }

    /// Resolve ways and relations to rings; open or incomplete ones are dropped
    fn into_closed_ways(self) -> Vec<OsmWay> {
        let mut dropped = 0usize;
        let mut out = Vec::new();

        for w in &self.ways {
            match self.resolve(&w.refs) {
                Some(ring) if is_closed(&w.refs) => out.push(OsmWay {
                    id: w.id,
                    tags: w.tags.clone(),
                    ring,
                }),
                _ => dropped += 1,
            }
        }

        for r in &self.relations {
            let segments: Vec<Vec<i64>> = r
                .outer
                .iter()
                .filter_map(|id| self.way_refs.get(id).cloned())
                .collect();
            let missing = r.outer.len() - segments.len();
            let (rings, unclosed) = assemble_rings(segments);
            dropped += missing + unclosed;
            for refs in rings {
                match self.resolve(&refs) {
                    Some(ring) => out.push(OsmWay {
                        id: r.id,
                        tags: r.tags.clone(),
                        ring,
                    }),
                    None => dropped += 1,
                }
            }
        }

        if dropped > 0 {
            debug!("Skipped {} open or incomplete ways / relation parts", dropped);
        }
        out
    }
}

/// Read closed ways whose tags satisfy `keep`
pub fn read_closed_ways<F>(path: &Path, keep: F) -> Result<Vec<OsmWay>>
where
    F: Fn(&Tags) -> bool,
{
    let name = path.to_string_lossy().to_lowercase();
    let data = if name.ends_with(".pbf") {
        read_pbf(path, &keep)?
    } else if name.ends_with(".osm") || name.ends_with(".xml") {
        read_xml(path, &keep)?
    } else {
        return Err(Sumo2GralError::InvalidInput(format!(
            "unrecognised OSM file type: {} (expected .osm.pbf or .osm)",
            path.display()
        )));
    };

    info!(
        "OSM {}: {} nodes, {} matching ways, {} matching multipolygons",
        path.display(),
        data.nodes.len(),
        data.ways.len(),
        data.relations.len()
    );
    Ok(data.into_closed_ways())
}

fn read_pbf<F>(path: &Path, keep: &F) -> Result<OsmData>
where
    F: Fn(&Tags) -> bool,
{
    let reader = ElementReader::from_path(path)
        .map_err(|e| Sumo2GralError::malformed(path, e.to_string()))?;

    let mut data = OsmData::default();
    reader
        .for_each(|element| match element {
            Element::Node(n) => {
                data.nodes.insert(n.id(), [n.lon(), n.lat()]);
            }
            Element::DenseNode(dn) => {
                data.nodes.insert(dn.id(), [dn.lon(), dn.lat()]);
            }
            Element::Way(w) => {
                let tags: Tags = w
                    .tags()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();
                let refs: Vec<i64> = w.refs().collect();
                if keep(&tags) {
                    data.ways.push(RawWay {
                        id: w.id(),
                        refs: refs.clone(),
                        tags,
                    });
                }
                data.way_refs.insert(w.id(), refs);
            }
            Element::Relation(r) => {
                let tags: Tags = r
                    .tags()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();
                if is_multipolygon(&tags) && keep(&tags) {
                    let outer = r
                        .members()
                        .filter(|m| matches!(m.member_type, RelMemberType::Way))
                        .filter(|m| matches!(m.role(), Ok("outer" | "")))
                        .map(|m| m.member_id)
                        .collect();
                    data.relations.push(RawRelation {
                        id: r.id(),
                        outer,
                        tags,
                    });
                }
            }
        })
        .map_err(|e| Sumo2GralError::malformed(path, e.to_string()))?;
    Ok(data)
}

fn attribute(element: &BytesStart, key: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn required<T: std::str::FromStr>(path: &Path, element: &BytesStart, key: &str) -> Result<T> {
    attribute(element, key.as_bytes())
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| {
            Sumo2GralError::malformed(
                path,
                format!(
                    "<{}> without a valid '{}' attribute",
                    String::from_utf8_lossy(element.name().as_ref()),
                    key
                ),
            )
        })
}

fn read_xml<F>(path: &Path, keep: &F) -> Result<OsmData>
where
    F: Fn(&Tags) -> bool,
{
    let mut reader =
        Reader::from_file(path).map_err(|e| Sumo2GralError::malformed(path, e.to_string()))?;
    reader.config_mut().trim_text(true);

    let mut data = OsmData::default();
    let mut way: Option<RawWay> = None;
    let mut relation: Option<RawRelation> = None;
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| Sumo2GralError::malformed(path, e.to_string()))?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                match e.name().as_ref() {
                    b"node" => {
                        let id: i64 = required(path, e, "id")?;
                        let lat: f64 = required(path, e, "lat")?;
                        let lon: f64 = required(path, e, "lon")?;
                        data.nodes.insert(id, [lon, lat]);
                    }
                    b"way" => {
                        let pending = RawWay {
                            id: required(path, e, "id")?,
                            refs: Vec::new(),
                            tags: Tags::new(),
                        };
                        if !is_empty {
                            way = Some(pending);
                        }
                    }
                    b"nd" => {
                        if let Some(w) = way.as_mut() {
                            w.refs.push(required(path, e, "ref")?);
                        }
                    }
                    b"relation" => {
                        let pending = RawRelation {
                            id: required(path, e, "id")?,
                            outer: Vec::new(),
                            tags: Tags::new(),
                        };
                        if !is_empty {
                            relation = Some(pending);
                        }
                    }
                    b"member" => {
                        if let Some(r) = relation.as_mut() {
                            let role = attribute(e, b"role").unwrap_or_default();
                            if attribute(e, b"type").as_deref() == Some("way")
                                && (role == "outer" || role.is_empty())
                            {
                                r.outer.push(required(path, e, "ref")?);
                            }
                        }
                    }
                    b"tag" => {
                        if let (Some(k), Some(v)) = (attribute(e, b"k"), attribute(e, b"v")) {
                            if let Some(w) = way.as_mut() {
                                w.tags.insert(k, v);
                            } else if let Some(r) = relation.as_mut() {
                                r.tags.insert(k, v);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::End(ref e) if e.name().as_ref() == b"way" => {
                if let Some(w) = way.take() {
                    if keep(&w.tags) {
                        data.way_refs.insert(w.id, w.refs.clone());
                        data.ways.push(w);
                    } else {
                        data.way_refs.insert(w.id, w.refs);
                    }
                }
            }
            Event::End(ref e) if e.name().as_ref() == b"relation" => {
                if let Some(r) = relation.take() {
                    if is_multipolygon(&r.tags) && keep(&r.tags) {
                        data.relations.push(r);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(data)
}
