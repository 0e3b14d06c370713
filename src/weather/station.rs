//! Weather station export reader
//!
//! Tab-separated, ISO-8859-1 or UTF-8. Lines 0, 1, 2 and 4 are preamble and
//! units, line 3 is the header. Decimal separator is a comma.
//!
//! Columns used: `FECHA` (dd/mm/yyyy), `HORA` (hour or HH:MM), `Veloc.` (m/s),
//! `Direc.` (degrees).

use super::WeatherSituation;
use crate::error::{Result, Sumo2GralError};
use chrono::{NaiveDate, NaiveTime};
use csv::ReaderBuilder;
use std::path::Path;
use tracing::{info, warn};

const HEADER_LINE: usize = 3;
const SKIPPED_LINES: [usize; 4] = [0, 1, 2, 4];

const DATE_COLUMN: &str = "FECHA";
const HOUR_COLUMN: &str = "HORA";
const SPEED_COLUMN: &str = "Veloc.";
const DIRECTION_COLUMN: &str = "Direc.";

/// Decode as UTF-8, falling back to ISO-8859-1 (every byte is one code point)
fn decode(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(value, "%d.%m.%Y"))
        .ok()
}

fn parse_hour(value: &str) -> Option<NaiveTime> {
    if value.contains(':') {
        NaiveTime::parse_from_str(value, "%H:%M").ok()
    } else {
        value
            .parse::<u32>()
            .ok()
            .and_then(|h| NaiveTime::from_hms_opt(h, 0, 0))
    }
}

fn parse_decimal(value: &str) -> Option<f64> {
    value.replace(',', ".").parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Read a station export into time-ordered weather situations
///
/// Rows missing any of the used columns are dropped with a warning.
pub fn read_station_file(path: &Path) -> Result<Vec<WeatherSituation>> {
    let bytes = std::fs::read(path).map_err(|e| Sumo2GralError::io(path, e))?;
    let text = decode(bytes);

    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= HEADER_LINE {
        return Err(Sumo2GralError::malformed(
            path,
            format!("expected a header on line {}", HEADER_LINE + 1),
        ));
    }
    let table: String = lines
        .iter()
        .enumerate()
        .filter(|(i, _)| !SKIPPED_LINES.contains(i))
        .map(|(_, l)| format!("{}\n", l))
        .collect();

    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(table.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| Sumo2GralError::malformed(path, format!("Failed to read headers: {}", e)))?
        .clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| Sumo2GralError::malformed(path, format!("missing column '{}'", name)))
    };
    let date_idx = column(DATE_COLUMN)?;
    let hour_idx = column(HOUR_COLUMN)?;
    let speed_idx = column(SPEED_COLUMN)?;
    let direction_idx = column(DIRECTION_COLUMN)?;

    let mut situations = Vec::new();
    let mut dropped = 0usize;
    for record in reader.records() {
        let record = record.map_err(|e| Sumo2GralError::malformed(path, e.to_string()))?;
        let field = |idx: usize| record.get(idx).unwrap_or("");

        let parsed = (|| {
            let date = parse_date(field(date_idx))?;
            let time = parse_hour(field(hour_idx))?;
            let speed = parse_decimal(field(speed_idx))?;
            let direction = parse_decimal(field(direction_idx))?.trunc();
            Some(WeatherSituation::from_reading(date, time, speed, direction))
        })();

        match parsed {
            Some(s) => situations.push(s),
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        warn!("Dropped {} incomplete weather reading(s) from {}", dropped, path.display());
    }

    situations.sort_by_key(|s| (s.date, s.time));
    info!("Read {} weather reading(s) from {}", situations.len(), path.display());
    Ok(situations)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Estacion: MADRID\n\
        Periodo: 2024\n\
        \n\
        FECHA\tHORA\tVeloc.\tDirec.\tVeloc.máx.\tTemp.\n\
        \t\t(m/s)\t(grados)\t(m/s)\t(ºC)\n\
        02/05/2024\t23\t2,5\t90\t4,0\t12,1\n\
        02/05/2024\t8\t3,5\t270\t5,0\t15,3\n\
        01/05/2024\t12\t\t180\t1,0\t20,0\n\
        01/05/2024\t14\t6,2\t45\t9,0\t21,0\n";

    fn write_sample(bytes: &[u8]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("station.txt");
        std::fs::write(&path, bytes).unwrap();
        (dir, path)
    }

    #[test]
    fn test_reads_sorts_and_drops() {
        let (_dir, path) = write_sample(SAMPLE.as_bytes());
        let situations = read_station_file(&path).unwrap();

        // Row with missing speed dropped
        assert_eq!(situations.len(), 3);

        // Sorted by date then time
        assert_eq!(situations[0].date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(situations[0].wind_speed, 6.2);
        assert_eq!(situations[0].stability_class, 3);
        assert_eq!(situations[1].time, NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        assert_eq!(situations[1].wind_speed, 3.5);
        assert_eq!(situations[2].stability_class, 5);
    }

    #[test]
    fn test_latin1_input() {
        let latin1: Vec<u8> = SAMPLE
            .chars()
            .map(|c| u32::from(c) as u8)
            .collect();
        let (_dir, path) = write_sample(&latin1);
        assert_eq!(read_station_file(&path).unwrap().len(), 3);
    }

    #[test]
    fn test_missing_column() {
        let (_dir, path) = write_sample(b"a\nb\nc\nFECHA\tHORA\n-\n01/01/2024\t1\n");
        assert!(matches!(
            read_station_file(&path),
            Err(Sumo2GralError::Malformed { .. })
        ));
    }
}
