//! Run configuration
//!
//! Resolved once from the command line and an optional JSON config file
//! (`-c`). Values present in the file take precedence over the CLI.
//! Relative file names are resolved against the base directory.

use crate::error::{Result, Sumo2GralError};
use crate::geo::{BoundingBox, Projection};
use crate::gral::{GralSettings, GralSources, HorizontalLayers, Pollutant};
use crate::weather::WeatherOutputs;
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

/// Which part of the pipeline to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessKind {
    All,
    Map,
    Buildings,
    Vegetation,
    Weather,
    Highways,
    Gral,
    Results,
}

impl ProcessKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessKind::All => "all",
            ProcessKind::Map => "map",
            ProcessKind::Buildings => "buildings",
            ProcessKind::Vegetation => "vegetation",
            ProcessKind::Weather => "weather",
            ProcessKind::Highways => "highways",
            ProcessKind::Gral => "gral",
            ProcessKind::Results => "results",
        }
    }
}

impl fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prepare SUMO emissions and OpenStreetMap geometry for GRAL, run it and collect its results
#[derive(Debug, Clone, Parser)]
#[command(name = "sumo2gral", version, about)]
pub struct Cli {
    /// Directory holding inputs, generated artifacts and GRAL files
    #[arg(long, default_value = ".")]
    pub base_directory: PathBuf,

    #[arg(long, value_enum, default_value_t = ProcessKind::All)]
    pub process: ProcessKind,

    /// Study area, WGS84 degrees (defaults to the SUMO network boundary)
    #[arg(long, allow_negative_numbers = true)]
    pub north: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    pub south: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    pub east: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    pub west: Option<f64>,

    /// Target projected CRS (3857 or WGS84 UTM 326xx / 327xx)
    #[arg(long, default_value_t = 3857)]
    pub epsg: u32,

    /// Local OpenStreetMap extract (.osm.pbf or .osm)
    #[arg(long)]
    pub osm_file: Option<PathBuf>,

    #[arg(long, default_value = "net.net.xml")]
    pub net_file: PathBuf,

    /// SUMO edge-data emissions output
    #[arg(long, default_value = "emissions.xml")]
    pub emissions_file: PathBuf,

    /// Tab-separated weather station export
    #[arg(long)]
    pub weather_file: Option<PathBuf>,

    /// Name (without extension) of the cleaned weather CSV
    #[arg(long, default_value = "output_weather_data")]
    pub output_weather_file: String,

    /// Also write a met file restricted to this day (dd.mm.yyyy)
    #[arg(long)]
    pub weather_day: Option<String>,

    /// Also write a met file restricted to this hour of --weather-day (HH:MM)
    #[arg(long)]
    pub weather_hour: Option<String>,

    #[arg(long, default_value = "weather.met")]
    pub met_file: String,

    #[arg(long, default_value = "buildings.geojson")]
    pub buildings_file: PathBuf,

    #[arg(long, default_value = "vegetation.geojson")]
    pub vegetation_file: PathBuf,

    #[arg(long, default_value = "highways.geojson")]
    pub highways_file: PathBuf,

    /// GRAL executable or .NET assembly
    #[arg(long)]
    pub gral_dll: Option<PathBuf>,

    /// Pollutant(s) to simulate, repeatable or comma separated
    #[arg(long, value_delimiter = ',', default_value = "NOx")]
    pub pollutant: Vec<String>,

    /// Horizontal slice heights in metres, comma separated
    #[arg(long, default_value = "3,6,9")]
    pub hor_layers: String,

    /// Particles per second
    #[arg(long, default_value_t = 100)]
    pub particles_ps: u32,

    /// Dispersion time in seconds
    #[arg(long = "dispertion-time", default_value_t = 3600)]
    pub dispersion_time: u32,

    #[arg(long, default_value_t = 4)]
    pub n_cores: u32,

    /// Download geometry instead of reading local files
    #[arg(long)]
    pub online: bool,

    /// Seed for sampling unknown building levels
    #[arg(long)]
    pub seed: Option<u64>,

    /// JSON configuration file
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Result grid to summarise (--process results)
    #[arg(short = 'r', long = "results")]
    pub results: Option<PathBuf>,
}

/// Overrides read from a `-c` JSON file; every key is optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub base_directory: Option<PathBuf>,
    pub process: Option<ProcessKind>,
    pub north: Option<f64>,
    pub south: Option<f64>,
    pub east: Option<f64>,
    pub west: Option<f64>,
    pub epsg: Option<u32>,
    pub osm_file: Option<PathBuf>,
    pub net_file: Option<PathBuf>,
    pub emissions_file: Option<PathBuf>,
    pub weather_file: Option<PathBuf>,
    pub output_weather_file: Option<String>,
    pub weather_day: Option<String>,
    pub weather_hour: Option<String>,
    pub met_file: Option<String>,
    pub buildings_file: Option<PathBuf>,
    pub vegetation_file: Option<PathBuf>,
    pub highways_file: Option<PathBuf>,
    pub gral_dll: Option<PathBuf>,
    pub pollutants: Option<Vec<String>>,
    pub hor_layers: Option<Vec<f64>>,
    pub particles_ps: Option<u32>,
    pub dispersion_time: Option<u32>,
    pub n_cores: Option<u32>,
    pub online: Option<bool>,
    pub seed: Option<u64>,
    pub results: Option<PathBuf>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Sumo2GralError::io(path, e))?;
        serde_json::from_str(&text).map_err(|e| Sumo2GralError::malformed(path, e.to_string()))
    }
}

/// Fully resolved and validated run configuration
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub base_directory: PathBuf,
    pub process: ProcessKind,
    /// `None` until derived from the SUMO network
    pub bbox: Option<BoundingBox>,
    pub projection: Projection,
    pub osm_file: Option<PathBuf>,
    pub net_file: PathBuf,
    pub emissions_file: PathBuf,
    pub weather_file: Option<PathBuf>,
    pub output_weather_file: String,
    pub weather_day: Option<String>,
    pub weather_hour: Option<String>,
    pub met_file: String,
    pub buildings_file: PathBuf,
    pub vegetation_file: PathBuf,
    pub highways_file: PathBuf,
    pub gral_dll: Option<PathBuf>,
    pub pollutants: Vec<Pollutant>,
    pub layers: HorizontalLayers,
    pub particles_ps: u32,
    pub dispersion_time: u32,
    pub n_cores: u32,
    pub online: bool,
    pub seed: Option<u64>,
    pub results: Option<PathBuf>,
}

impl RunConfig {
    /// Resolve the CLI, applying the `-c` file when given
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                FileConfig::load(path)?
            }
            None => FileConfig::default(),
        };
        Self::resolve(cli, file)
    }

    /// Merge CLI values with file overrides and validate the result
    pub fn resolve(cli: Cli, file: FileConfig) -> Result<Self> {
        let base_directory = file.base_directory.unwrap_or(cli.base_directory);

        let corners = (
            file.north.or(cli.north),
            file.south.or(cli.south),
            file.east.or(cli.east),
            file.west.or(cli.west),
        );
        let bbox = match corners {
            (Some(n), Some(s), Some(e), Some(w)) => Some(BoundingBox::new(n, s, e, w)?),
            (None, None, None, None) => None,
            _ => {
                return Err(Sumo2GralError::InvalidInput(
                    "--north, --south, --east and --west must be given together".into(),
                ))
            }
        };

        let projection = Projection::from_epsg(file.epsg.unwrap_or(cli.epsg))?;

        let pollutants = match file.pollutants {
            Some(names) => parse_pollutants(&names)?,
            None => parse_pollutants(&cli.pollutant)?,
        };

        let layers = match file.hor_layers {
            Some(heights) => HorizontalLayers::new(heights)?,
            None => HorizontalLayers::parse(&cli.hor_layers)?,
        };

        let resolve = |p: PathBuf| resolve_path(&base_directory, p);

        let config = RunConfig {
            process: file.process.unwrap_or(cli.process),
            bbox,
            projection,
            osm_file: file.osm_file.or(cli.osm_file).map(resolve),
            net_file: resolve(file.net_file.unwrap_or(cli.net_file)),
            emissions_file: resolve(file.emissions_file.unwrap_or(cli.emissions_file)),
            weather_file: file.weather_file.or(cli.weather_file).map(resolve),
            output_weather_file: file.output_weather_file.unwrap_or(cli.output_weather_file),
            weather_day: file.weather_day.or(cli.weather_day),
            weather_hour: file.weather_hour.or(cli.weather_hour),
            met_file: file.met_file.unwrap_or(cli.met_file),
            buildings_file: resolve(file.buildings_file.unwrap_or(cli.buildings_file)),
            vegetation_file: resolve(file.vegetation_file.unwrap_or(cli.vegetation_file)),
            highways_file: resolve(file.highways_file.unwrap_or(cli.highways_file)),
            gral_dll: file.gral_dll.or(cli.gral_dll),
            pollutants,
            layers,
            particles_ps: file.particles_ps.unwrap_or(cli.particles_ps),
            dispersion_time: file.dispersion_time.unwrap_or(cli.dispersion_time),
            n_cores: file.n_cores.unwrap_or(cli.n_cores),
            online: file.online.unwrap_or(cli.online),
            seed: file.seed.or(cli.seed),
            results: file.results.or(cli.results).map(resolve),
            base_directory,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(bbox) = &self.bbox {
            bbox.validate()?;
        }
        if self.pollutants.is_empty() {
            return Err(Sumo2GralError::InvalidInput("at least one pollutant is required".into()));
        }
        for (name, value) in [
            ("particles-ps", self.particles_ps),
            ("dispertion-time", self.dispersion_time),
            ("n-cores", self.n_cores),
        ] {
            if value == 0 {
                return Err(Sumo2GralError::InvalidInput(format!("--{} must be positive", name)));
            }
        }
        if self.output_weather_file.trim().is_empty() || self.met_file.trim().is_empty() {
            return Err(Sumo2GralError::InvalidInput(
                "weather output names must not be empty".into(),
            ));
        }
        if self.process == ProcessKind::Results && self.results.is_none() {
            return Err(Sumo2GralError::Config(
                "--process results requires -r/--results <file>".into(),
            ));
        }
        Ok(())
    }

    pub fn met_path(&self) -> PathBuf {
        self.base_directory.join(&self.met_file)
    }

    pub fn weather_outputs(&self) -> WeatherOutputs {
        WeatherOutputs {
            output_weather_file: self.output_weather_file.clone(),
            met_file: self.met_file.clone(),
            weather_day: self.weather_day.clone(),
            weather_hour: self.weather_hour.clone(),
        }
    }

    pub fn gral_settings(&self) -> GralSettings {
        GralSettings {
            layers: self.layers.clone(),
            particles_ps: self.particles_ps,
            dispersion_time: self.dispersion_time,
            n_cores: self.n_cores,
        }
    }

    pub fn gral_sources(&self) -> GralSources {
        GralSources {
            met_file: self.met_path(),
            buildings: self.buildings_file.clone(),
            vegetation: self.vegetation_file.clone(),
            highways: self.highways_file.clone(),
        }
    }

    /// Log the resolved configuration
    pub fn log_summary(&self) {
        info!("Configuration:");
        info!("  Base directory: {}", self.base_directory.display());
        info!("  Process: {}", self.process);
        match &self.bbox {
            Some(b) => info!("  Bounding box: N {} S {} E {} W {}", b.north, b.south, b.east, b.west),
            None => info!("  Bounding box: from SUMO network"),
        }
        info!("  Projection: {}", self.projection);
        let names: Vec<&str> = self.pollutants.iter().map(|p| p.gral_name()).collect();
        info!("  Pollutants: {}", names.join(", "));
        info!("  Layers: {} m", self.layers.to_in_dat().trim_end_matches(','));
        info!(
            "  Particles/s: {}, dispersion time: {} s, cores: {}",
            self.particles_ps, self.dispersion_time, self.n_cores
        );
        if self.online {
            info!("  Online mode");
        }
    }
}

fn resolve_path(base: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Parse pollutant names, dropping duplicates while keeping order
fn parse_pollutants(names: &[String]) -> Result<Vec<Pollutant>> {
    let mut pollutants = Vec::new();
    for name in names {
        for pollutant in Pollutant::parse_list(name)? {
            if !pollutants.contains(&pollutant) {
                pollutants.push(pollutant);
            }
        }
    }
    Ok(pollutants)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["sumo2gral"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = RunConfig::resolve(cli(&["--base-directory", "/data"]), FileConfig::default()).unwrap();
        assert_eq!(config.process, ProcessKind::All);
        assert_eq!(config.projection, Projection::WebMercator);
        assert_eq!(config.pollutants, vec![Pollutant::NOx]);
        assert_eq!(config.layers.heights(), &[3.0, 6.0, 9.0]);
        assert_eq!(config.particles_ps, 100);
        assert_eq!(config.dispersion_time, 3600);
        assert_eq!(config.n_cores, 4);
        assert_eq!(config.net_file, Path::new("/data/net.net.xml"));
        assert_eq!(config.met_path(), Path::new("/data/weather.met"));
        assert_eq!(config.highways_file, Path::new("/data/highways.geojson"));
        assert!(config.bbox.is_none());
    }

    #[test]
    fn test_pollutant_lists() {
        let config = RunConfig::resolve(
            cli(&["--pollutant", "NOx,PM10", "--pollutant", "CO", "--pollutant", "NOx"]),
            FileConfig::default(),
        )
        .unwrap();
        assert_eq!(config.pollutants, vec![Pollutant::NOx, Pollutant::PM10, Pollutant::CO]);

        assert!(RunConfig::resolve(cli(&["--pollutant", "O3"]), FileConfig::default()).is_err());
    }

    #[test]
    fn test_bbox_requires_all_corners() {
        let err = RunConfig::resolve(cli(&["--north", "40.5"]), FileConfig::default()).unwrap_err();
        assert!(matches!(err, Sumo2GralError::InvalidInput(_)));

        let config = RunConfig::resolve(
            cli(&["--north", "40.5", "--south", "40.4", "--east", "-3.6", "--west", "-3.7"]),
            FileConfig::default(),
        )
        .unwrap();
        assert_eq!(config.bbox.unwrap().west, -3.7);

        let inverted = cli(&["--north", "40.4", "--south", "40.5", "--east", "-3.6", "--west", "-3.7"]);
        assert!(RunConfig::resolve(inverted, FileConfig::default()).is_err());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(RunConfig::resolve(cli(&["--epsg", "4326"]), FileConfig::default()).is_err());
        assert!(RunConfig::resolve(cli(&["--hor-layers", "6,3"]), FileConfig::default()).is_err());
        assert!(RunConfig::resolve(cli(&["--n-cores", "0"]), FileConfig::default()).is_err());
        assert!(RunConfig::resolve(cli(&["--process", "results"]), FileConfig::default()).is_err());
    }

    #[test]
    fn test_file_overrides_cli() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "base_directory": "/runs/madrid",
                "process": "gral",
                "epsg": 32630,
                "pollutants": ["PM2.5", "NO2"],
                "hor_layers": [1.5, 4],
                "gral_dll": "/opt/gral/GRAL.dll"
            }"#,
        )
        .unwrap();

        let config = RunConfig::from_cli(cli(&[
            "--epsg",
            "3857",
            "--n-cores",
            "8",
            "-c",
            path.to_str().unwrap(),
        ]))
        .unwrap();
        assert_eq!(config.process, ProcessKind::Gral);
        assert_eq!(config.projection.epsg(), 32630);
        assert_eq!(config.pollutants, vec![Pollutant::PM25, Pollutant::NO2]);
        assert_eq!(config.layers.heights(), &[1.5, 4.0]);
        // Untouched by the file
        assert_eq!(config.n_cores, 8);
        assert_eq!(config.emissions_file, Path::new("/runs/madrid/emissions.xml"));
    }

    #[test]
    fn test_unknown_file_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "n_core": 2 }"#).unwrap();
        assert!(matches!(
            FileConfig::load(&path),
            Err(Sumo2GralError::Malformed { .. })
        ));
    }
}
