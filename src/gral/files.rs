//! GRAL input file generation
//!
//! Every file is rewritten on each run. Formats follow what the GRAL engine
//! parses: fixed line order, `!` comments after the value, comma separated
//! source lines.

use super::format::{fmt_float, fmt_height, round_to, wind_sector};
use super::{HorizontalLayers, Pollutant};
use crate::error::{Result, Sumo2GralError};
use crate::geo::{BoundingBox, FeatureCollection, ProjectedBox, Projection};
use crate::sources::{BuildingProperties, HighwayProperties, VegetationProperties};
use crate::weather::{read_met_file, WeatherSituation};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const CELL_SIZE_M: u32 = 5;
/// Per-situation frequency written to meteopgt.all (‰)
const SITUATION_FREQUENCY: u32 = 1000;

/// Scalar GRAL run parameters
#[derive(Debug, Clone)]
pub struct GralSettings {
    pub layers: HorizontalLayers,
    pub particles_ps: u32,
    pub dispersion_time: u32,
    pub n_cores: u32,
}

/// Artifacts the generator reads
#[derive(Debug, Clone)]
pub struct GralSources {
    pub met_file: PathBuf,
    pub buildings: PathBuf,
    pub vegetation: PathBuf,
    pub highways: PathBuf,
}

/// Result of one generation pass
#[derive(Debug, Clone)]
pub struct GeneratedInputs {
    pub files: Vec<PathBuf>,
    /// Weather situations in the met file
    pub situations: usize,
    /// Line sources written to line.dat
    pub line_sources: usize,
}

/// Emission rate in kg/(km·h) from a one-hour total in mg over an edge of `length_m`
pub fn emission_rate(mg: f64, length_m: f64) -> f64 {
    let kg = mg / 1_000_000.0;
    let km = length_m / 1000.0;
    kg / km
}

/// Newline-terminate and concatenate
fn join_lines<I: IntoIterator<Item = String>>(lines: I) -> String {
    lines.into_iter().map(|l| l + "\n").collect()
}

pub fn render_geb(area: &ProjectedBox, slices: usize) -> String {
    let west = area.west as i64;
    let east = area.east as i64;
    let south = area.south as i64;
    let north = area.north as i64;
    let nx = (east - west).abs() / CELL_SIZE_M as i64;
    let ny = (north - south).abs() / CELL_SIZE_M as i64;

    join_lines([
        format!("{}              !cell-size for cartesian wind field in GRAL in x-direction", CELL_SIZE_M),
        format!("{}              !cell-size for cartesian wind field in GRAL in y-direction", CELL_SIZE_M),
        "1.0,1.05              !cell-size for cartesian wind field in GRAL in z-direction, streching factor for increasing cells heights with height".to_string(),
        format!("{}              !number of cells for counting grid in GRAL in x-direction", nx),
        format!("{}              !number of cells for counting grid in GRAL in y-direction", ny),
        format!("{}              !Number of horizontal slices", slices),
        "1,              !Source groups to be computed seperated by a comma".to_string(),
        format!("{}               !West border of GRAL model domain [m]", west),
        format!("{}               !East border of GRAL model domain [m]", east),
        format!("{}               !South border of GRAL model domain [m]", south),
        format!("{}              !North border of GRAL model domain [m]", north),
    ])
}

pub fn render_in_dat(settings: &GralSettings, latitude: f64) -> String {
    join_lines([
        format!("{} \t ! Number of released particles per second", settings.particles_ps),
        format!("{} \t ! Dispersion time", settings.dispersion_time),
        "1 \t ! Steady state GRAL mode = 1, Transient GRAL mode = 0".to_string(),
        "4 \t ! Meteorology input: inputzr.dat = 0, meteo.all = 1, elimaeki.prn = 2, SONIC.dat = 3, meteopgt.all = 4".to_string(),
        "0\t ! Receptor points: Yes = 1, No = 0".to_string(),
        "0.5 \t ! Surface roughness in [m]".to_string(),
        format!("{} \t ! Latitude", fmt_float(round_to(latitude, 2))),
        "N \t ! Meandering Effect Off = J, On = N".to_string(),
        "NOx \t ! Pollutant: not used since version 19.01, new: Pollutant.txt".to_string(),
        format!(
            "{} \t ! Horizontal slices [m] seperated by a comma (number of slices need to be defined in GRAL.geb!)",
            settings.layers.to_in_dat()
        ),
        "1 \t ! Vertical grid spacing in [m]".to_string(),
        "1 \t ! Start the calculation with this weather number".to_string(),
        "2,15 \t ! How to take buildings into account? 1 = simple mass conservation, 2 = mass conservation with Poisson equation + advection, Factor for the prognostic sub domain size".to_string(),
        "0 \t ! Stream output for Soundplan 1 = activated, -2 = write buildings height".to_string(),
        "compressed V03 \t ! Write compressed output files".to_string(),
        "nokeystroke \t ! Wait for keystroke when exiting GRAL".to_string(),
        "ASCiiResults 1 \t ! Additional ASCii result files Yes = 1, No = 0".to_string(),
        "1.0\t ! Adaptive surface roughness - max value [m]. Default: 0 = no adaptive surface roughness".to_string(),
        "100\t ! Radius surrounding sources, in which the wind field is to be calculated prognostically; 0 = off, valid values: 50 - 10000 m".to_string(),
        "1 \t ! Use GRAL Online Functions = true".to_string(),
    ])
}

pub fn render_meteopgt(situations: &[WeatherSituation]) -> String {
    let header = [
        "10,0,10,    !Are dispersion situations classified =0 or not =1".to_string(),
        "Wind direction sector,Wind speed class,stability class, frequency".to_string(),
    ];
    let rows = situations.iter().map(|s| {
        format!(
            "{},{},{},{}",
            fmt_float(wind_sector(s.wind_direction)),
            fmt_float(round_to(s.wind_speed, 1)),
            s.stability_class,
            SITUATION_FREQUENCY
        )
    });
    join_lines(header.into_iter().chain(rows))
}

/// `dd.mm,hour,speed,sector,stability` per situation
pub fn render_mettimeseries(situations: &[WeatherSituation]) -> String {
    join_lines(situations.iter().map(|s| {
        format!(
            "{},{},{},{},{}",
            s.date.format("%d.%m"),
            s.time.format("%-H"),
            fmt_float(round_to(s.wind_speed, 1)),
            fmt_float(round_to(wind_sector(s.wind_direction), 1)),
            s.stability_class
        )
    }))
}

pub fn render_pollutant(pollutant: Pollutant) -> String {
    format!(
        "{}\n0\t ! Wet deposition cW setting\n0\t ! Wet deposition alphaW setting\n0\t ! Decay rate for all source groups\n",
        pollutant.gral_name()
    )
}

pub fn render_buildings(buildings: &FeatureCollection<BuildingProperties>) -> String {
    join_lines(buildings.features.iter().filter_map(|feature| {
        match feature.geometry.centroid() {
            Some((x, y)) => Some(format!("{},{},0,{}", x as i64, y as i64, feature.properties.height)),
            None => {
                warn!("Building {} has an empty footprint", feature.properties.osm_id);
                None
            }
        }
    }))
}

pub fn render_vegetation(vegetation: &FeatureCollection<VegetationProperties>) -> String {
    let mut lines = Vec::new();
    for feature in &vegetation.features {
        let Some(ring) = feature.geometry.exterior() else {
            warn!("Vegetation {} is not a polygon", feature.properties.osm_id);
            continue;
        };
        lines.push("D \t15 \t7.5 \t0.1 \t1.25 \t50".to_string());
        lines.extend(ring.iter().map(|[x, y]| format!("{},{}", *x as i64, *y as i64)));
    }
    join_lines(lines)
}

/// line.dat content and the number of sources written
pub fn render_line_sources(
    highways: &FeatureCollection<HighwayProperties>,
    pollutant: Pollutant,
) -> (String, usize) {
    let attribute = pollutant.sumo_attribute();
    let deposition = pollutant.deposition();

    let mut lines = vec!["Generated: ".to_string(); 3];
    lines.push(format!(
        "StrName,Section,Sourcegroup,x1,y1,z1,x2,y2,z2,width,noiseabatementwall,Length[km],--,{}[kg/(km*h)],--,--,--,--,--,deposition data",
        pollutant.line_label()
    ));

    let (share25, share10, dep25, dep10, mode) = match deposition {
        Some(d) => (
            d.share_pm25.to_string(),
            d.share_pm10.to_string(),
            fmt_float(d.velocity_pm25),
            fmt_float(d.velocity_pm10),
            d.mode.to_string(),
        ),
        None => (
            "0".to_string(),
            "0".to_string(),
            "0".to_string(),
            "0".to_string(),
            "0".to_string(),
        ),
    };

    let mut written = 0usize;
    let mut skipped = 0usize;
    for feature in &highways.features {
        let p = &feature.properties;
        let mg = match p.emission(attribute) {
            Some(v) if v >= 0.0 => v,
            _ => {
                skipped += 1;
                continue;
            }
        };
        if p.length <= 0.0 {
            warn!("Line source {} has no length, skipped", p.edge_id);
            skipped += 1;
            continue;
        }
        let Some((minx, miny, maxx, maxy)) = feature.geometry.bounds() else {
            skipped += 1;
            continue;
        };

        lines.push(format!(
            "{},1,1,{},{},0,{},{},0,{},0,0,0,{},0,0,0,0,{},{},0,0,{},{},0,{},0,0,0,0,0,0",
            p.edge_id,
            fmt_float(round_to(minx, 1)),
            fmt_float(round_to(miny, 1)),
            fmt_float(round_to(maxx, 1)),
            fmt_float(round_to(maxy, 1)),
            p.width,
            fmt_float(emission_rate(mg, p.length)),
            share25,
            share10,
            dep25,
            dep10,
            mode
        ));
        written += 1;
    }
    if skipped > 0 {
        debug!("{} line sources without a usable {} value", skipped, attribute);
    }
    (join_lines(lines), written)
}

pub struct GralInputGenerator {
    base_directory: PathBuf,
    settings: GralSettings,
    sources: GralSources,
}

impl GralInputGenerator {
    pub fn new(base_directory: impl Into<PathBuf>, settings: GralSettings, sources: GralSources) -> Self {
        GralInputGenerator {
            base_directory: base_directory.into(),
            settings,
            sources,
        }
    }

    pub fn settings(&self) -> &GralSettings {
        &self.settings
    }

    fn write(&self, name: &str, content: &str, files: &mut Vec<PathBuf>) -> Result<()> {
        let path = self.base_directory.join(name);
        std::fs::write(&path, content).map_err(|e| Sumo2GralError::io(&path, e))?;
        debug!("{} written", path.display());
        files.push(path);
        Ok(())
    }

    fn read_situations(&self) -> Result<Vec<WeatherSituation>> {
        let met = &self.sources.met_file;
        if !met.exists() {
            return Err(Sumo2GralError::InvalidInput(format!(
                "met file {} does not exist; run the weather process first",
                met.display()
            )));
        }
        let situations = read_met_file(met)?;
        if situations.is_empty() {
            return Err(Sumo2GralError::InvalidInput(format!(
                "met file {} contains no weather situations",
                met.display()
            )));
        }
        Ok(situations)
    }

    fn optional_artifact<P: serde::de::DeserializeOwned>(
        path: &Path,
        what: &str,
    ) -> Result<Option<FeatureCollection<P>>> {
        if path.exists() {
            FeatureCollection::read(path).map(Some)
        } else {
            warn!("No {} artifact at {}, {}.dat not written", what, path.display(), what);
            Ok(None)
        }
    }

    /// Write the complete GRAL input set for one pollutant
    pub fn generate(
        &self,
        bbox: &BoundingBox,
        projection: Projection,
        pollutant: Pollutant,
    ) -> Result<GeneratedInputs> {
        std::fs::create_dir_all(&self.base_directory)
            .map_err(|e| Sumo2GralError::io(&self.base_directory, e))?;

        let situations = self.read_situations()?;
        if !self.sources.highways.exists() {
            return Err(Sumo2GralError::InvalidInput(format!(
                "line source artifact {} does not exist; run the highways process first",
                self.sources.highways.display()
            )));
        }
        let highways: FeatureCollection<HighwayProperties> =
            FeatureCollection::read(&self.sources.highways)?;

        let area = bbox.project(&projection);
        let mut files = Vec::new();

        self.write("GRAL.geb", &render_geb(&area, self.settings.layers.len()), &mut files)?;
        self.write("in.dat", &render_in_dat(&self.settings, bbox.mean_latitude()), &mut files)?;
        self.write("meteopgt.all", &render_meteopgt(&situations), &mut files)?;
        self.write("Pollutant.txt", &render_pollutant(pollutant), &mut files)?;
        self.write("Percent.txt", "100", &mut files)?;
        self.write("Max_Proc.txt", &format!("{}\n", self.settings.n_cores), &mut files)?;

        if let Some(buildings) =
            Self::optional_artifact::<BuildingProperties>(&self.sources.buildings, "buildings")?
        {
            self.write("buildings.dat", &render_buildings(&buildings), &mut files)?;
        }
        if let Some(vegetation) =
            Self::optional_artifact::<VegetationProperties>(&self.sources.vegetation, "vegetation")?
        {
            self.write("vegetation.dat", &render_vegetation(&vegetation), &mut files)?;
        }

        let (lines, line_sources) = render_line_sources(&highways, pollutant);
        if line_sources == 0 {
            warn!(
                "No line source carries {} emissions; line.dat has no sources",
                pollutant.sumo_attribute()
            );
        }
        self.write("line.dat", &lines, &mut files)?;

        self.write("mettimeseries.dat", &render_mettimeseries(&situations), &mut files)?;
        self.write("DispNr.txt", "1", &mut files)?;

        info!(
            "✓ GRAL inputs for {} written to {} ({} files, {} situations, {} line sources, domain {:.0} x {:.0} m)",
            pollutant,
            self.base_directory.display(),
            files.len(),
            situations.len(),
            line_sources,
            area.east - area.west,
            area.north - area.south
        );
        Ok(GeneratedInputs {
            files,
            situations: situations.len(),
            line_sources,
        })
    }
}

/// Layer height as used in result names ("3", "1.5")
pub fn layer_label(height: f64) -> String {
    fmt_height(height)
}
