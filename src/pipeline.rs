//! Run pipeline
//!
//! Runs the processes selected by `--process` in order:
//! 1. Buildings and vegetation artifacts from OpenStreetMap
//! 2. Weather CSV and met file(s)
//! 3. Line sources from the SUMO network and emissions
//! 4. GRAL input files, GRAL itself and result renaming, once per pollutant
//!
//! `results` summarises one renamed result grid; `map` is not provided.

use crate::config::{ProcessKind, RunConfig};
use crate::error::{Result, Sumo2GralError};
use crate::geo::BoundingBox;
use crate::gral::{collate_results, process_result_file, Engine, GralInputGenerator, GridSummary};
use crate::sources::{write_buildings, write_highways, write_vegetation, SumoNetwork};
use crate::weather::WeatherProcessor;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Buildings,
    Vegetation,
    Weather,
    Highways,
    Gral,
    Results,
    Map,
}

impl Step {
    fn label(&self) -> &'static str {
        match self {
            Step::Buildings => "Extracting buildings",
            Step::Vegetation => "Extracting vegetation",
            Step::Weather => "Processing weather data",
            Step::Highways => "Building line sources",
            Step::Gral => "Running GRAL",
            Step::Results => "Reading results",
            Step::Map => "Downloading basemap",
        }
    }
}

fn steps_for(process: ProcessKind) -> Vec<Step> {
    match process {
        ProcessKind::All => vec![
            Step::Buildings,
            Step::Vegetation,
            Step::Weather,
            Step::Highways,
            Step::Gral,
        ],
        ProcessKind::Map => vec![Step::Map],
        ProcessKind::Buildings => vec![Step::Buildings],
        ProcessKind::Vegetation => vec![Step::Vegetation],
        ProcessKind::Weather => vec![Step::Weather],
        ProcessKind::Highways => vec![Step::Highways],
        ProcessKind::Gral => vec![Step::Gral],
        ProcessKind::Results => vec![Step::Results],
    }
}

/// What a run produced
#[derive(Debug, Default)]
pub struct RunSummary {
    pub buildings: Option<usize>,
    pub vegetation: Option<usize>,
    pub weather_files: Vec<PathBuf>,
    pub line_sources: Option<usize>,
    /// Renamed result grids, all pollutants
    pub results: Vec<PathBuf>,
    pub grid: Option<GridSummary>,
}

pub struct Pipeline<E: Engine> {
    config: RunConfig,
    engine: Option<E>,
}

impl<E: Engine> Pipeline<E> {
    /// `engine` is only needed by the gral process
    pub fn new(config: RunConfig, engine: Option<E>) -> Self {
        Pipeline { config, engine }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub async fn run(&self) -> Result<RunSummary> {
        let t0 = Instant::now();
        let steps = steps_for(self.config.process);
        let total = steps.len();
        let mut summary = RunSummary::default();

        std::fs::create_dir_all(&self.config.base_directory)
            .map_err(|e| Sumo2GralError::io(&self.config.base_directory, e))?;

        for (i, step) in steps.iter().enumerate() {
            info!("[{}/{}] {}...", i + 1, total, step.label());
            let t = Instant::now();
            self.run_step(*step, &mut summary).await?;
            info!("✓ {} done in {:.1?}", step.label(), t.elapsed());
        }

        info!("✓ Process '{}' completed in {:.1?}", self.config.process, t0.elapsed());
        Ok(summary)
    }

    async fn run_step(&self, step: Step, summary: &mut RunSummary) -> Result<()> {
        let config = &self.config;
        match step {
            Step::Buildings => {
                summary.buildings = Some(write_buildings(
                    config.osm_file.as_deref(),
                    config.online,
                    config.projection,
                    config.seed,
                    &config.buildings_file,
                )?);
            }
            Step::Vegetation => {
                summary.vegetation = Some(write_vegetation(
                    config.osm_file.as_deref(),
                    config.online,
                    config.projection,
                    &config.vegetation_file,
                )?);
            }
            Step::Weather => {
                let processor = WeatherProcessor::new(&config.base_directory);
                summary.weather_files =
                    processor.process(config.weather_file.as_deref(), &config.weather_outputs())?;
            }
            Step::Highways => {
                summary.line_sources = Some(write_highways(
                    &config.net_file,
                    &config.emissions_file,
                    config.online,
                    config.projection,
                    &config.highways_file,
                )?);
            }
            Step::Gral => {
                summary.results = self.run_gral().await?;
            }
            Step::Results => {
                let result = config.results.as_ref().ok_or_else(|| {
                    Sumo2GralError::Config("--process results requires -r/--results <file>".into())
                })?;
                summary.grid = Some(process_result_file(result, config.projection)?);
            }
            Step::Map => {
                return Err(Sumo2GralError::Unsupported(
                    "basemap download (--process map)".into(),
                ));
            }
        }
        Ok(())
    }

    /// CLI bounding box, or the geographic boundary of the SUMO network
    fn study_area(&self) -> Result<BoundingBox> {
        if let Some(bbox) = self.config.bbox {
            return Ok(bbox);
        }
        let network = SumoNetwork::read(&self.config.net_file)?;
        let bbox = network.bounding_box()?;
        info!(
            "  Bounding box from {}: N {} S {} E {} W {}",
            self.config.net_file.display(),
            bbox.north,
            bbox.south,
            bbox.east,
            bbox.west
        );
        Ok(bbox)
    }

    /// Generate, simulate and collate once per pollutant
    async fn run_gral(&self) -> Result<Vec<PathBuf>> {
        let config = &self.config;
        let engine = self.engine.as_ref().ok_or_else(|| {
            Sumo2GralError::Config("--gral-dll is required to run GRAL".into())
        })?;

        let bbox = self.study_area()?;
        let generator = GralInputGenerator::new(
            &config.base_directory,
            config.gral_settings(),
            config.gral_sources(),
        );

        let mut results = Vec::new();
        let n = config.pollutants.len();
        for (i, pollutant) in config.pollutants.iter().enumerate() {
            info!("  Pollutant {}/{}: {}", i + 1, n, pollutant);
            let inputs = generator.generate(&bbox, config.projection, *pollutant)?;
            engine.run(&config.base_directory).await?;
            let renamed = collate_results(
                &config.base_directory,
                inputs.situations,
                *pollutant,
                &generator.settings().layers,
            )?;
            results.extend(renamed);
        }

        info!(
            "✓ {} result file(s) ({} pollutant(s) x {} layer(s) x situations)",
            results.len(),
            n,
            config.layers.len()
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Cli, FileConfig};
    use crate::gral::collate::raw_result_name;
    use crate::sources::fixtures::{SAMPLE_EMISSIONS, SAMPLE_NET, SAMPLE_OSM};
    use crate::weather::count_situations;
    use clap::Parser;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const GRID: &str = "ncols 2\nnrows 2\nxllcorner 0\nyllcorner 0\ncellsize 5\nNODATA_value -9999\n\
        1.5 -9999\n0.5 2.0\n";

    /// Writes one raw grid per (situation, slice) like GRAL would
    struct FakeEngine {
        met_file: PathBuf,
        slices: usize,
        runs: AtomicUsize,
    }

    impl Engine for FakeEngine {
        async fn run(&self, base_directory: &Path) -> Result<()> {
            assert!(base_directory.join("in.dat").exists());
            assert!(base_directory.join("line.dat").exists());
            let situations = count_situations(&self.met_file)?;
            for s in 1..=situations {
                for l in 1..=self.slices {
                    let path = base_directory.join(raw_result_name(s, l));
                    std::fs::write(&path, GRID).map_err(|e| Sumo2GralError::io(&path, e))?;
                }
            }
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config(base: &Path, args: &[&str]) -> RunConfig {
        let mut argv = vec!["sumo2gral", "--base-directory", base.to_str().unwrap()];
        argv.extend_from_slice(args);
        RunConfig::resolve(Cli::try_parse_from(argv).unwrap(), FileConfig::default()).unwrap()
    }

    fn seed_inputs(base: &Path) {
        std::fs::write(base.join("map.osm"), SAMPLE_OSM).unwrap();
        std::fs::write(base.join("net.net.xml"), SAMPLE_NET).unwrap();
        std::fs::write(base.join("emissions.xml"), SAMPLE_EMISSIONS).unwrap();
    }

    #[test]
    fn test_all_runs_every_step_in_order() {
        assert_eq!(
            steps_for(ProcessKind::All),
            vec![Step::Buildings, Step::Vegetation, Step::Weather, Step::Highways, Step::Gral]
        );
        assert_eq!(steps_for(ProcessKind::Weather), vec![Step::Weather]);
    }

    #[tokio::test]
    async fn test_end_to_end_with_fake_engine() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        seed_inputs(base);

        let config = config(
            base,
            &[
                "--osm-file",
                "map.osm",
                "--pollutant",
                "NOx,CO",
                "--hor-layers",
                "3,6",
                "--seed",
                "7",
            ],
        );
        let engine = FakeEngine {
            met_file: config.met_path(),
            slices: 2,
            runs: AtomicUsize::new(0),
        };
        let pipeline = Pipeline::new(config, Some(engine));
        let summary = pipeline.run().await.unwrap();

        assert_eq!(summary.buildings, Some(1));
        assert_eq!(summary.vegetation, Some(1));
        assert_eq!(summary.line_sources, Some(2));
        assert!(base.join("default_output_weather_data.csv").exists());

        // 1 default situation x 2 pollutants x 2 layers
        assert_eq!(summary.results.len(), 4);
        for name in [
            "results_weather_1_NOx_3m.txt",
            "results_weather_1_NOx_6m.txt",
            "results_weather_1_CO_3m.txt",
            "results_weather_1_CO_6m.txt",
        ] {
            assert!(base.join(name).exists(), "{} missing", name);
        }
        assert!(!base.join(raw_result_name(1, 1)).exists());
        assert_eq!(pipeline.engine.as_ref().unwrap().runs.load(Ordering::SeqCst), 2);

        // The last pollutant's inputs remain in place
        let pollutant = std::fs::read_to_string(base.join("Pollutant.txt")).unwrap();
        assert!(pollutant.starts_with("CO"));
        assert!(base.join("buildings.dat").exists());
        assert!(base.join("vegetation.dat").exists());
    }

    #[tokio::test]
    async fn test_result_count_is_situations_by_pollutants_by_layers() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        seed_inputs(base);
        std::fs::write(
            base.join("weather.met"),
            "02.05.2024,08:00,3.5,270,2\n02.05.2024,09:00,4.0,280,2\n02.05.2024,23:00,1.0,90,5\n",
        )
        .unwrap();
        write_highways(
            &base.join("net.net.xml"),
            &base.join("emissions.xml"),
            false,
            crate::geo::Projection::WebMercator,
            &base.join("highways.geojson"),
        )
        .unwrap();

        let config = config(
            base,
            &["--process", "gral", "--pollutant", "PM10,NO2", "--hor-layers", "1.5,4"],
        );
        let engine = FakeEngine {
            met_file: config.met_path(),
            slices: 2,
            runs: AtomicUsize::new(0),
        };
        let summary = Pipeline::new(config, Some(engine)).run().await.unwrap();

        assert_eq!(summary.results.len(), 12);
        let on_disk = std::fs::read_dir(base)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("results_weather_"))
            .count();
        assert_eq!(on_disk, 12);
        for s in 1..=3 {
            for (p, h) in [("PM10", "1.5"), ("NO2", "4")] {
                let name = format!("results_weather_{}_{}_{}m.txt", s, p, h);
                assert!(base.join(&name).exists(), "{} missing", name);
            }
        }
    }

    #[tokio::test]
    async fn test_results_process() {
        let dir = tempfile::tempdir().unwrap();
        let result = dir.path().join("results_weather_1_NOx_3m.txt");
        std::fs::write(&result, GRID).unwrap();

        let config = config(dir.path(), &["--process", "results", "-r", "results_weather_1_NOx_3m.txt"]);
        let pipeline: Pipeline<FakeEngine> = Pipeline::new(config, None);
        let summary = pipeline.run().await.unwrap();

        let grid = summary.grid.unwrap();
        assert_eq!(grid.non_empty, 3);
        assert!(dir.path().join("results_weather_1_NOx_3m.points.csv").exists());
    }

    #[tokio::test]
    async fn test_gral_requires_engine() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), &["--process", "gral"]);
        let pipeline: Pipeline<FakeEngine> = Pipeline::new(config, None);
        assert!(matches!(pipeline.run().await, Err(Sumo2GralError::Config(_))));
    }

    #[tokio::test]
    async fn test_map_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), &["--process", "map"]);
        let pipeline: Pipeline<FakeEngine> = Pipeline::new(config, None);
        assert!(matches!(pipeline.run().await, Err(Sumo2GralError::Unsupported(_))));
    }

    #[tokio::test]
    async fn test_gral_without_met_file_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        seed_inputs(dir.path());
        let config = config(dir.path(), &["--process", "gral"]);
        let engine = FakeEngine {
            met_file: config.met_path(),
            slices: 3,
            runs: AtomicUsize::new(0),
        };
        let pipeline = Pipeline::new(config, Some(engine));
        assert!(matches!(pipeline.run().await, Err(Sumo2GralError::InvalidInput(_))));
        assert_eq!(pipeline.engine.as_ref().unwrap().runs.load(Ordering::SeqCst), 0);
    }
}
