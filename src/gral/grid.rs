//! ESRI ASCII result grids
//!
//! Header keys (`ncols`, `nrows`, `xllcorner`, `yllcorner`, `cellsize`,
//! `NODATA_value`) are case-insensitive; rows follow, top row first.

use crate::error::{Result, Sumo2GralError};
use crate::geo::Projection;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

const HEADER_KEYS: [&str; 6] = ["ncols", "nrows", "xllcorner", "yllcorner", "cellsize", "nodata_value"];

#[derive(Debug, Clone, PartialEq)]
pub struct ResultGrid {
    pub ncols: usize,
    pub nrows: usize,
    pub xllcorner: f64,
    pub yllcorner: f64,
    pub cellsize: f64,
    pub nodata: f64,
    /// Row-major, top row first
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSummary {
    pub cells: usize,
    pub non_empty: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

#[derive(Debug, Serialize)]
struct PointRecord {
    x: f64,
    y: f64,
    lon: f64,
    lat: f64,
    value: f64,
}

impl ResultGrid {
    pub fn parse(path: &Path, text: &str) -> Result<Self> {
        let mut header: HashMap<&str, f64> = HashMap::new();
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());

        while header.len() < HEADER_KEYS.len() {
            let Some(line) = lines.next() else { break };
            let mut parts = line.split_whitespace();
            let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
                return Err(Sumo2GralError::malformed(path, format!("bad header line '{}'", line)));
            };
            let key = key.to_ascii_lowercase();
            let Some(known) = HEADER_KEYS.iter().find(|k| **k == key) else {
                return Err(Sumo2GralError::malformed(path, format!("unexpected header key '{}'", key)));
            };
            let value: f64 = value
                .parse()
                .map_err(|_| Sumo2GralError::malformed(path, format!("bad {} value '{}'", key, value)))?;
            header.insert(*known, value);
        }

        let get = |key: &str| {
            header
                .get(key)
                .copied()
                .ok_or_else(|| Sumo2GralError::malformed(path, format!("missing header '{}'", key)))
        };
        let dimension = |key: &str| -> Result<usize> {
            let value = get(key)?;
            if value.fract() != 0.0 || !(1.0..=u32::MAX as f64).contains(&value) {
                return Err(Sumo2GralError::malformed(
                    path,
                    format!("{} must be a positive integer, got {}", key, value),
                ));
            }
            Ok(value as usize)
        };
        let ncols = dimension("ncols")?;
        let nrows = dimension("nrows")?;
        let cells = ncols
            .checked_mul(nrows)
            .ok_or_else(|| Sumo2GralError::malformed(path, format!("{} x {} cells overflow", ncols, nrows)))?;
        let cellsize = get("cellsize")?;
        if !(cellsize.is_finite() && cellsize > 0.0) {
            return Err(Sumo2GralError::malformed(path, "cellsize must be positive"));
        }

        let values = lines
            .flat_map(str::split_whitespace)
            .map(|v| {
                v.parse::<f64>()
                    .map_err(|_| Sumo2GralError::malformed(path, format!("bad cell value '{}'", v)))
            })
            .collect::<Result<Vec<f64>>>()?;
        if values.len() != cells {
            return Err(Sumo2GralError::malformed(
                path,
                format!("expected {} x {} cells, found {}", ncols, nrows, values.len()),
            ));
        }

        Ok(ResultGrid {
            ncols,
            nrows,
            xllcorner: get("xllcorner")?,
            yllcorner: get("yllcorner")?,
            cellsize,
            nodata: get("nodata_value")?,
            values,
        })
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Sumo2GralError::io(path, e))?;
        Self::parse(path, &text)
    }

    /// Lower-left corner of the cell at (row from top, column)
    pub fn cell_origin(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.xllcorner + col as f64 * self.cellsize,
            self.yllcorner + (self.nrows - 1 - row) as f64 * self.cellsize,
        )
    }

    /// Cells holding data, as (x, y, value)
    pub fn points(&self) -> impl Iterator<Item = (f64, f64, f64)> + '_ {
        self.values.iter().enumerate().filter_map(move |(i, v)| {
            if *v == self.nodata || !v.is_finite() {
                return None;
            }
            let (x, y) = self.cell_origin(i / self.ncols, i % self.ncols);
            Some((x, y, *v))
        })
    }

    pub fn summary(&self) -> GridSummary {
        let mut non_empty = 0usize;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for (_, _, v) in self.points() {
            non_empty += 1;
            min = min.min(v);
            max = max.max(v);
            sum += v;
        }
        let mean = if non_empty > 0 { sum / non_empty as f64 } else { f64::NAN };
        GridSummary {
            cells: self.values.len(),
            non_empty,
            min,
            max,
            mean,
        }
    }

    /// Write the data cells as `x,y,lon,lat,value`
    pub fn export_points(&self, projection: Projection, path: &Path) -> Result<usize> {
        let mut writer =
            csv::Writer::from_path(path).map_err(|e| Sumo2GralError::malformed(path, e.to_string()))?;
        let mut n = 0usize;
        for (x, y, value) in self.points() {
            let (lon, lat) = projection.unproject(x, y);
            writer
                .serialize(PointRecord { x, y, lon, lat, value })
                .map_err(|e| Sumo2GralError::malformed(path, e.to_string()))?;
            n += 1;
        }
        writer.flush().map_err(|e| Sumo2GralError::io(path, e))?;
        Ok(n)
    }
}

/// `results_weather_1_NOx_3m.txt` → `results_weather_1_NOx_3m.points.csv`
pub fn points_path(result: &Path) -> PathBuf {
    result.with_extension("points.csv")
}

/// Summarise a result grid and export its data cells next to it
pub fn process_result_file(result: &Path, projection: Projection) -> Result<GridSummary> {
    let grid = ResultGrid::read(result)?;
    let summary = grid.summary();
    info!(
        "{}: {} x {} cells of {} m, {} with data, min {:.4e}, max {:.4e}, mean {:.4e}",
        result.display(),
        grid.ncols,
        grid.nrows,
        grid.cellsize,
        summary.non_empty,
        summary.min,
        summary.max,
        summary.mean
    );

    let out = points_path(result);
    let n = grid.export_points(projection, &out)?;
    info!("✓ {} points written to {}", n, out.display());
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRID: &str = "ncols 3\n\
        nrows 2\n\
        xllcorner 1000.0\n\
        yllcorner 5000.0\n\
        cellsize 5\n\
        NODATA_value -9999\n\
        1.0 -9999 3.0\n\
        0.0 2.5 -9999\n";

    #[test]
    fn test_parse_header_and_values() {
        let grid = ResultGrid::parse(Path::new("g.txt"), GRID).unwrap();
        assert_eq!(grid.ncols, 3);
        assert_eq!(grid.nrows, 2);
        assert_eq!(grid.nodata, -9999.0);
        assert_eq!(grid.values.len(), 6);
    }

    #[test]
    fn test_top_row_is_north() {
        let grid = ResultGrid::parse(Path::new("g.txt"), GRID).unwrap();
        assert_eq!(grid.cell_origin(0, 0), (1000.0, 5005.0));
        assert_eq!(grid.cell_origin(1, 2), (1010.0, 5000.0));
        let points: Vec<_> = grid.points().collect();
        assert_eq!(points[0], (1000.0, 5005.0, 1.0));
        assert_eq!(points[1], (1010.0, 5005.0, 3.0));
    }

    #[test]
    fn test_summary() {
        let grid = ResultGrid::parse(Path::new("g.txt"), GRID).unwrap();
        let s = grid.summary();
        assert_eq!(s.cells, 6);
        assert_eq!(s.non_empty, 4);
        assert_eq!(s.min, 0.0);
        assert_eq!(s.max, 3.0);
        assert!((s.mean - 1.625).abs() < 1e-12);
    }

    #[test]
    fn test_wrong_cell_count() {
        let text = GRID.replace("0.0 2.5 -9999\n", "0.0 2.5\n");
        assert!(matches!(
            ResultGrid::parse(Path::new("g.txt"), &text),
            Err(Sumo2GralError::Malformed { .. })
        ));
    }

    #[test]
    fn test_bad_dimensions() {
        for (from, to) in [
            ("ncols 3", "ncols -3"),
            ("ncols 3", "ncols 2.5"),
            ("ncols 3", "ncols NaN"),
            ("nrows 2", "nrows 0"),
            ("nrows 2", "nrows 1e30"),
            ("cellsize 5", "cellsize inf"),
        ] {
            let text = GRID.replace(from, to);
            assert!(
                matches!(
                    ResultGrid::parse(Path::new("g.txt"), &text),
                    Err(Sumo2GralError::Malformed { .. })
                ),
                "{} accepted",
                to
            );
        }
    }

    #[test]
    fn test_export_points() {
        let dir = tempfile::tempdir().unwrap();
        let result = dir.path().join("results_weather_1_NOx_3m.txt");
        std::fs::write(&result, GRID).unwrap();

        let summary = process_result_file(&result, Projection::WebMercator).unwrap();
        assert_eq!(summary.non_empty, 4);

        let csv = std::fs::read_to_string(dir.path().join("results_weather_1_NOx_3m.points.csv")).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("x,y,lon,lat,value"));
        assert_eq!(lines.count(), 4);
    }
}
