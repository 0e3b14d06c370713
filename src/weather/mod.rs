//! Meteorology: station readings → weather situations → met file
//!
//! A weather situation is one averaged condition GRAL simulates as a steady
//! state. The met file holds one situation per line, in time order:
//! `dd.mm.yyyy,HH:MM,wind_speed,wind_direction,stability_class`.

pub mod met;
pub mod processor;
pub mod station;

pub use met::{count_situations, read_met_file, write_met_file};
pub use processor::{WeatherOutputs, WeatherProcessor};
pub use station::read_station_file;

use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::Serialize;

/// Date format used in met files and the `--weather-day` flag
pub const DATE_FORMAT: &str = "%d.%m.%Y";
/// Time format used in met files and the `--weather-hour` flag
pub const TIME_FORMAT: &str = "%H:%M";

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherSituation {
    pub date: NaiveDate,
    pub time: NaiveTime,
    /// m/s
    pub wind_speed: f64,
    /// Degrees, meteorological convention (direction the wind comes from)
    pub wind_direction: f64,
    /// Pasquill-type class, 1 (very unstable) to 7 (very stable)
    pub stability_class: u8,
}

impl WeatherSituation {
    /// Situation with the stability class derived from wind speed and hour
    pub fn from_reading(date: NaiveDate, time: NaiveTime, wind_speed: f64, wind_direction: f64) -> Self {
        WeatherSituation {
            date,
            time,
            wind_speed,
            wind_direction,
            stability_class: stability_class(wind_speed, time),
        }
    }

    /// Single situation used when no station data is supplied
    pub fn default_situation() -> Self {
        WeatherSituation {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            time: NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default(),
            wind_speed: 3.0,
            wind_direction: 270.0,
            stability_class: 4,
        }
    }
}

/// Row of the cleaned weather CSV
#[derive(Debug, Serialize)]
pub struct WeatherRecord {
    pub fecha: String,
    pub hora: String,
    pub wind_speed: f64,
    pub wind_direction: f64,
    pub stability_class: u8,
}

impl From<&WeatherSituation> for WeatherRecord {
    fn from(s: &WeatherSituation) -> Self {
        WeatherRecord {
            fecha: s.date.format(DATE_FORMAT).to_string(),
            hora: s.time.format(TIME_FORMAT).to_string(),
            wind_speed: s.wind_speed,
            wind_direction: s.wind_direction,
            stability_class: s.stability_class,
        }
    }
}

/// Night is 21:00 through 06:59
fn is_night(time: NaiveTime) -> bool {
    let hour = time.hour();
    hour >= 21 || hour <= 6
}

/// Stability class from wind speed (m/s) and time of day
///
/// Day:   < 2 → 1, [2, 5) → 2, ≥ 5 → 3
/// Night: < 3 → 5, ≥ 3 → 6
pub fn stability_class(wind_speed: f64, time: NaiveTime) -> u8 {
    if is_night(time) {
        if wind_speed < 3.0 {
            5
        } else {
            6
        }
    } else if wind_speed < 2.0 {
        1
    } else if wind_speed < 5.0 {
        2
    } else {
        3
    }
}
