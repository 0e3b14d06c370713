use super::{
    read_station_file, write_met_file, WeatherRecord, WeatherSituation, DATE_FORMAT, TIME_FORMAT,
};
use crate::error::{Result, Sumo2GralError};
use chrono::{NaiveDate, NaiveTime};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Output naming for the weather step
#[derive(Debug, Clone)]
pub struct WeatherOutputs {
    /// Stem of the cleaned weather CSV
    pub output_weather_file: String,
    /// Met file name, relative to the base directory
    pub met_file: String,
    /// Optional `dd.mm.yyyy` filter for an extra single-day met file
    pub weather_day: Option<String>,
    /// Optional `HH:MM` filter (requires `weather_day`)
    pub weather_hour: Option<String>,
}

pub struct WeatherProcessor {
    base_directory: PathBuf,
}

/// `weather.met` + `01.05.2024` → `weather_01_05_2024.met`
fn derived_met_name(met_file: &str, suffix: &str) -> String {
    let stem = Path::new(met_file)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| met_file.to_string());
    format!("{}_{}.met", stem, suffix.replace(['.', ':'], "_"))
}

impl WeatherProcessor {
    pub fn new(base_directory: impl Into<PathBuf>) -> Self {
        WeatherProcessor {
            base_directory: base_directory.into(),
        }
    }

    /// Convert station data (or the default situation) into the weather CSV
    /// and met file(s). Returns every file written.
    pub fn process(&self, weather_file: Option<&Path>, outputs: &WeatherOutputs) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.base_directory)
            .map_err(|e| Sumo2GralError::io(&self.base_directory, e))?;

        let day = outputs
            .weather_day
            .as_deref()
            .map(|day| {
                NaiveDate::parse_from_str(day, DATE_FORMAT)
                    .map(|date| (date, day))
                    .map_err(|_| {
                        Sumo2GralError::InvalidInput(format!("weather day '{}' is not dd.mm.yyyy", day))
                    })
            })
            .transpose()?;
        let hour = outputs
            .weather_hour
            .as_deref()
            .map(|hour| {
                NaiveTime::parse_from_str(hour, TIME_FORMAT)
                    .map(|time| (time, hour))
                    .map_err(|_| {
                        Sumo2GralError::InvalidInput(format!("weather hour '{}' is not HH:MM", hour))
                    })
            })
            .transpose()?;

        let (situations, csv_name) = match weather_file {
            Some(path) => (
                read_station_file(path)?,
                format!("{}.csv", outputs.output_weather_file),
            ),
            None => {
                info!("No weather file specified, creating default weather and met files...");
                (
                    vec![WeatherSituation::default_situation()],
                    format!("default_{}.csv", outputs.output_weather_file),
                )
            }
        };

        if situations.is_empty() {
            return Err(Sumo2GralError::InvalidInput(
                "weather file contains no usable readings".into(),
            ));
        }

        let mut written = Vec::new();

        let csv_path = self.base_directory.join(csv_name);
        self.write_weather_csv(&csv_path, &situations)?;
        written.push(csv_path);

        let met_path = self.base_directory.join(&outputs.met_file);
        write_met_file(&met_path, &situations)?;
        info!("✓ Met file with {} situation(s) written to {}", situations.len(), met_path.display());
        written.push(met_path);

        match (day, weather_file) {
            (Some(_), None) => {
                warn!("--weather-day only filters station data; ignored for the default situation");
            }
            (Some((date, day_label)), Some(_)) => {
                let day_situations: Vec<WeatherSituation> =
                    situations.iter().filter(|s| s.date == date).cloned().collect();
                written.push(self.write_filtered(&outputs.met_file, day_label, &day_situations)?);

                if let Some((time, hour_label)) = hour {
                    let hour_situations: Vec<WeatherSituation> =
                        day_situations.into_iter().filter(|s| s.time == time).collect();
                    let suffix = format!("{}_{}", day_label, hour_label);
                    written.push(self.write_filtered(&outputs.met_file, &suffix, &hour_situations)?);
                }
            }
            (None, _) => {
                if hour.is_some() {
                    warn!("--weather-hour is ignored without --weather-day");
                }
            }
        }

        Ok(written)
    }

    fn write_filtered(&self, met_file: &str, suffix: &str, situations: &[WeatherSituation]) -> Result<PathBuf> {
        if situations.is_empty() {
            warn!("No weather readings match {}", suffix);
        }
        let path = self.base_directory.join(derived_met_name(met_file, suffix));
        write_met_file(&path, situations)?;
        info!("✓ Filtered met file ({} situation(s)) written to {}", situations.len(), path.display());
        Ok(path)
    }

    fn write_weather_csv(&self, path: &Path, situations: &[WeatherSituation]) -> Result<()> {
        let mut writer =
            csv::Writer::from_path(path).map_err(|e| Sumo2GralError::malformed(path, e.to_string()))?;
        for s in situations {
            writer
                .serialize(WeatherRecord::from(s))
                .map_err(|e| Sumo2GralError::malformed(path, e.to_string()))?;
        }
        writer.flush().map_err(|e| Sumo2GralError::io(path, e))?;
        info!("✓ Weather data written to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weather::{count_situations, read_met_file};

    fn outputs(day: Option<&str>, hour: Option<&str>) -> WeatherOutputs {
        WeatherOutputs {
            output_weather_file: "output_weather_data".into(),
            met_file: "weather.met".into(),
            weather_day: day.map(String::from),
            weather_hour: hour.map(String::from),
        }
    }

    #[test]
    fn test_derived_met_name() {
        assert_eq!(derived_met_name("weather.met", "01.05.2024"), "weather_01_05_2024.met");
        assert_eq!(
            derived_met_name("weather.met", "01.05.2024_08:00"),
            "weather_01_05_2024_08_00.met"
        );
    }

    #[test]
    fn test_default_files() {
        let dir = tempfile::tempdir().unwrap();
        let processor = WeatherProcessor::new(dir.path());
        let written = processor.process(None, &outputs(None, None)).unwrap();

        assert_eq!(written.len(), 2);
        assert!(dir.path().join("default_output_weather_data.csv").exists());
        let met = dir.path().join("weather.met");
        assert_eq!(count_situations(&met).unwrap(), 1);
        assert_eq!(read_met_file(&met).unwrap()[0], WeatherSituation::default_situation());
    }

    #[test]
    fn test_day_and_hour_filters() {
        let dir = tempfile::tempdir().unwrap();
        let station = dir.path().join("station.txt");
        std::fs::write(
            &station,
            "x\ny\nz\nFECHA\tHORA\tVeloc.\tDirec.\n-\n\
             01/05/2024\t8\t1,0\t90\n\
             01/05/2024\t9\t2,0\t100\n\
             02/05/2024\t8\t3,0\t110\n",
        )
        .unwrap();

        let processor = WeatherProcessor::new(dir.path());
        let written = processor
            .process(Some(&station), &outputs(Some("01.05.2024"), Some("09:00")))
            .unwrap();
        assert_eq!(written.len(), 4);

        let csv = std::fs::read_to_string(dir.path().join("output_weather_data.csv")).unwrap();
        assert!(csv.starts_with("fecha,hora,wind_speed,wind_direction,stability_class\n"));
        assert_eq!(count_situations(&dir.path().join("weather.met")).unwrap(), 3);
        assert_eq!(
            count_situations(&dir.path().join("weather_01_05_2024.met")).unwrap(),
            2
        );
        let hour = read_met_file(&dir.path().join("weather_01_05_2024_09_00.met")).unwrap();
        assert_eq!(hour.len(), 1);
        assert_eq!(hour[0].wind_direction, 100.0);
    }

    #[test]
    fn test_default_situation_is_not_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let processor = WeatherProcessor::new(dir.path());
        let written = processor
            .process(None, &outputs(Some("02.05.2024"), Some("08:00")))
            .unwrap();

        assert_eq!(written.len(), 2);
        assert!(!dir.path().join("weather_02_05_2024.met").exists());
        assert_eq!(count_situations(&dir.path().join("weather.met")).unwrap(), 1);
    }

    #[test]
    fn test_bad_day_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let processor = WeatherProcessor::new(dir.path());
        assert!(processor
            .process(None, &outputs(Some("2024-05-01"), None))
            .is_err());
        assert!(processor
            .process(None, &outputs(Some("01.05.2024"), Some("8h")))
            .is_err());
    }
}
