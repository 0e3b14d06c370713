use super::{WeatherSituation, DATE_FORMAT, TIME_FORMAT};
use crate::error::{Result, Sumo2GralError};
use chrono::{NaiveDate, NaiveTime};
use csv::ReaderBuilder;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Write situations as a header-less met file (overwrites)
pub fn write_met_file(path: &Path, situations: &[WeatherSituation]) -> Result<()> {
    let mut out = String::new();
    for s in situations {
        out.push_str(&format!(
            "{},{},{},{},{}\n",
            s.date.format(DATE_FORMAT),
            s.time.format(TIME_FORMAT),
            s.wind_speed,
            s.wind_direction,
            s.stability_class
        ));
    }
    let mut file = fs::File::create(path).map_err(|e| Sumo2GralError::io(path, e))?;
    file.write_all(out.as_bytes())
        .map_err(|e| Sumo2GralError::io(path, e))
}

/// Read a met file back into situations
pub fn read_met_file(path: &Path) -> Result<Vec<WeatherSituation>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| Sumo2GralError::malformed(path, e.to_string()))?;

    let mut situations = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| Sumo2GralError::malformed(path, e.to_string()))?;
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }
        if record.len() != 5 {
            return Err(Sumo2GralError::malformed(
                path,
                format!("line {}: expected 5 fields, found {}", line + 1, record.len()),
            ));
        }
        let field_err = |name: &str, value: &str| {
            Sumo2GralError::malformed(path, format!("line {}: invalid {} '{}'", line + 1, name, value))
        };

        let date = NaiveDate::parse_from_str(&record[0], DATE_FORMAT)
            .map_err(|_| field_err("date", &record[0]))?;
        let time = NaiveTime::parse_from_str(&record[1], TIME_FORMAT)
            .map_err(|_| field_err("time", &record[1]))?;
        let wind_speed: f64 = record[2].parse().map_err(|_| field_err("wind speed", &record[2]))?;
        let wind_direction: f64 = record[3]
            .parse()
            .map_err(|_| field_err("wind direction", &record[3]))?;
        let stability_class: u8 = record[4]
            .parse()
            .map_err(|_| field_err("stability class", &record[4]))?;

        situations.push(WeatherSituation {
            date,
            time,
            wind_speed,
            wind_direction,
            stability_class,
        });
    }
    Ok(situations)
}

/// Number of weather situations (data lines) in a met file
pub fn count_situations(path: &Path) -> Result<usize> {
    let content = fs::read_to_string(path).map_err(|e| Sumo2GralError::io(path, e))?;
    Ok(content.lines().filter(|l| !l.trim().is_empty()).count())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn situation(day: u32, hour: u32, speed: f64, dir: f64) -> WeatherSituation {
        WeatherSituation::from_reading(
            NaiveDate::from_ymd_opt(2024, 5, day).unwrap(),
            NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            speed,
            dir,
        )
    }

    #[test]
    fn test_write_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weather.met");
        write_met_file(&path, &[situation(2, 8, 3.5, 270.0), situation(2, 23, 1.0, 90.0)]).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "02.05.2024,08:00,3.5,270,2\n02.05.2024,23:00,1,90,5\n");
    }

    #[test]
    fn test_read_back_and_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weather.met");
        let written = vec![situation(1, 12, 2.2, 45.0), situation(1, 13, 6.1, 300.0)];
        write_met_file(&path, &written).unwrap();

        assert_eq!(read_met_file(&path).unwrap(), written);
        assert_eq!(count_situations(&path).unwrap(), 2);
    }

    #[test]
    fn test_count_ignores_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weather.met");
        fs::write(&path, "01.01.2024,12:00,3,270,4\n\n01.01.2024,13:00,3,270,4\n").unwrap();
        assert_eq!(count_situations(&path).unwrap(), 2);
    }

    #[test]
    fn test_read_rejects_bad_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weather.met");
        fs::write(&path, "01.01.2024,12:00,fast,270,4\n").unwrap();
        assert!(matches!(
            read_met_file(&path),
            Err(Sumo2GralError::Malformed { .. })
        ));
    }
}
