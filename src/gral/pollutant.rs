//! Pollutants GRAL can be asked to disperse
//!
//! Each pollutant knows the SUMO edge-data attribute its line-source emission
//! is taken from and, for particulate matter, the deposition parameters GRAL
//! expects in `line.dat`.

use crate::error::{Result, Sumo2GralError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Pollutant {
    NOx,
    NO2,
    PM10,
    PM25,
    CO,
    SO2,
}

/// Dry deposition settings written per line source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deposition {
    pub share_pm25: u32,
    pub share_pm10: u32,
    pub velocity_pm25: f64,
    pub velocity_pm10: f64,
    pub mode: u32,
}

impl Pollutant {
    pub const ALL: [Pollutant; 6] = [
        Pollutant::NOx,
        Pollutant::NO2,
        Pollutant::PM10,
        Pollutant::PM25,
        Pollutant::CO,
        Pollutant::SO2,
    ];

    /// Name as written to `Pollutant.txt` and result file names
    pub fn gral_name(&self) -> &'static str {
        match self {
            Pollutant::NOx => "NOx",
            Pollutant::NO2 => "NO2",
            Pollutant::PM10 => "PM10",
            Pollutant::PM25 => "PM2.5",
            Pollutant::CO => "CO",
            Pollutant::SO2 => "SO2",
        }
    }

    /// SUMO edge-data attribute (mg per interval) holding this pollutant's emission
    pub fn sumo_attribute(&self) -> &'static str {
        match self {
            Pollutant::NOx | Pollutant::NO2 => "NOx_abs",
            Pollutant::PM10 | Pollutant::PM25 => "PMx_abs",
            Pollutant::CO => "CO_abs",
            Pollutant::SO2 => "SO2_abs",
        }
    }

    /// Label used in the `line.dat` emission column header
    pub fn line_label(&self) -> &'static str {
        match self {
            Pollutant::PM10 | Pollutant::PM25 => "PMx",
            other => other.gral_name(),
        }
    }

    pub fn deposition(&self) -> Option<Deposition> {
        match self {
            Pollutant::PM10 | Pollutant::PM25 => Some(Deposition {
                share_pm25: 60,
                share_pm10: 100,
                velocity_pm25: 0.0032,
                velocity_pm10: 0.032,
                mode: 2,
            }),
            _ => None,
        }
    }

    /// Parse a comma separated list, rejecting empty lists and duplicates
    pub fn parse_list(value: &str) -> Result<Vec<Pollutant>> {
        let mut pollutants = Vec::new();
        for item in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let pollutant: Pollutant = item.parse()?;
            if pollutants.contains(&pollutant) {
                return Err(Sumo2GralError::InvalidInput(format!(
                    "pollutant {} requested twice",
                    pollutant
                )));
            }
            pollutants.push(pollutant);
        }
        if pollutants.is_empty() {
            return Err(Sumo2GralError::InvalidInput(
                "at least one pollutant is required".into(),
            ));
        }
        Ok(pollutants)
    }
}

impl FromStr for Pollutant {
    type Err = Sumo2GralError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "NOx" | "NOX" | "HC/NOx" => Ok(Pollutant::NOx),
            "NO2" => Ok(Pollutant::NO2),
            "PM10" => Ok(Pollutant::PM10),
            "PM2.5" | "PM25" => Ok(Pollutant::PM25),
            "CO" => Ok(Pollutant::CO),
            "SO2" => Ok(Pollutant::SO2),
            other => Err(Sumo2GralError::InvalidInput(format!(
                "The pollutant '{}' is not valid. Valid pollutants are: {}",
                other,
                Pollutant::ALL
                    .iter()
                    .map(|p| p.gral_name())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }
}

impl TryFrom<String> for Pollutant {
    type Error = Sumo2GralError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Pollutant> for String {
    fn from(p: Pollutant) -> String {
        p.gral_name().to_string()
    }
}

impl std::fmt::Display for Pollutant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.gral_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_names_parse_back() {
        for p in Pollutant::ALL {
            assert_eq!(p.gral_name().parse::<Pollutant>().unwrap(), p);
        }
    }

    #[test]
    fn test_aliases() {
        assert_eq!("HC/NOx".parse::<Pollutant>().unwrap(), Pollutant::NOx);
        assert_eq!("PM25".parse::<Pollutant>().unwrap(), Pollutant::PM25);
    }

    #[test]
    fn test_unsupported_rejected() {
        for bad in ["O3", "", "pm10", "benzene"] {
            assert!(bad.parse::<Pollutant>().is_err(), "{} accepted", bad);
        }
    }

    #[test]
    fn test_particulates_use_pmx_with_deposition() {
        assert_eq!(Pollutant::PM10.sumo_attribute(), "PMx_abs");
        assert_eq!(Pollutant::PM25.line_label(), "PMx");
        assert_eq!(Pollutant::PM10.deposition().unwrap().mode, 2);
        assert!(Pollutant::CO.deposition().is_none());
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(
            Pollutant::parse_list("NOx, PM10").unwrap(),
            vec![Pollutant::NOx, Pollutant::PM10]
        );
        assert!(Pollutant::parse_list("NOx,NOx").is_err());
        assert!(Pollutant::parse_list(" , ").is_err());
        assert!(Pollutant::parse_list("NOx,XYZ").is_err());
    }

    #[test]
    fn test_serde_uses_gral_name() {
        let json = serde_json::to_string(&vec![Pollutant::PM25]).unwrap();
        assert_eq!(json, r#"["PM2.5"]"#);
        let back: Vec<Pollutant> = serde_json::from_str(r#"["CO","HC/NOx"]"#).unwrap();
        assert_eq!(back, vec![Pollutant::CO, Pollutant::NOx]);
        assert!(serde_json::from_str::<Pollutant>(r#""O3""#).is_err());
    }
}
