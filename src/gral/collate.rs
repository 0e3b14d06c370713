//! Renaming of raw GRAL result matrices
//!
//! GRAL writes one ASCII matrix per (situation, slice, source group) as
//! `{situation:05}-{slice}{group:02}.txt`. These are renamed to
//! `results_weather_{situation}_{pollutant}_{height}m.txt`.

use super::files::layer_label;
use super::{HorizontalLayers, Pollutant};
use crate::error::{Result, Sumo2GralError};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

pub const SOURCE_GROUP: u32 = 1;

/// Raw engine output name for a situation (1-based) and slice (1-based)
pub fn raw_result_name(situation: usize, slice: usize) -> String {
    format!("{:05}-{}{:02}.txt", situation, slice, SOURCE_GROUP)
}

pub fn result_name(situation: usize, pollutant: Pollutant, height: f64) -> String {
    format!(
        "results_weather_{}_{}_{}m.txt",
        situation,
        pollutant.gral_name(),
        layer_label(height)
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rename {
    pub from: PathBuf,
    pub to: PathBuf,
}

/// Every rename for one pollutant run, in situation then slice order
pub fn plan(
    base_directory: &Path,
    situations: usize,
    pollutant: Pollutant,
    layers: &HorizontalLayers,
) -> Vec<Rename> {
    (1..=situations)
        .flat_map(|situation| {
            layers.heights().iter().enumerate().map(move |(i, height)| Rename {
                from: base_directory.join(raw_result_name(situation, i + 1)),
                to: base_directory.join(result_name(situation, pollutant, *height)),
            })
        })
        .collect()
}

/// Every source must exist and no destination may exist or repeat
pub fn validate(renames: &[Rename]) -> Result<()> {
    let missing: Vec<String> = renames
        .iter()
        .filter(|r| !r.from.exists())
        .map(|r| r.from.display().to_string())
        .collect();
    if !missing.is_empty() {
        return Err(Sumo2GralError::Collation(format!(
            "{} expected GRAL result file(s) missing: {}",
            missing.len(),
            missing.join(", ")
        )));
    }

    let mut seen = HashSet::new();
    for r in renames {
        if r.to.exists() {
            return Err(Sumo2GralError::Collation(format!(
                "{} already exists",
                r.to.display()
            )));
        }
        if !seen.insert(&r.to) {
            return Err(Sumo2GralError::Collation(format!(
                "{} is the target of more than one result",
                r.to.display()
            )));
        }
    }
    Ok(())
}

/// Rename the raw results of one pollutant run; nothing is renamed unless
/// the whole plan validates
pub fn collate_results(
    base_directory: &Path,
    situations: usize,
    pollutant: Pollutant,
    layers: &HorizontalLayers,
) -> Result<Vec<PathBuf>> {
    let renames = plan(base_directory, situations, pollutant, layers);
    validate(&renames)?;

    let mut renamed = Vec::with_capacity(renames.len());
    for r in renames {
        std::fs::rename(&r.from, &r.to).map_err(|e| Sumo2GralError::io(&r.from, e))?;
        renamed.push(r.to);
    }
    info!(
        "✓ Renamed {} result file(s) for {} ({} situations x {} layers)",
        renamed.len(),
        pollutant,
        situations,
        layers.len()
    );
    Ok(renamed)
}
