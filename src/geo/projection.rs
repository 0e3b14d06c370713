//! Map projections between WGS84 (EPSG:4326) and the projected CRS GRAL works in
//!
//! Supported targets:
//! - EPSG:3857 (Web Mercator, spherical)
//! - EPSG:32601-32660 / 32701-32760 (WGS84 UTM north / south)
//!
//! UTM uses the Krüger series to third order in the third flattening, which is
//! accurate to well below a millimetre inside a zone.

use crate::error::{Result, Sumo2GralError};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

const WGS84_A: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;
const UTM_K0: f64 = 0.9996;
const UTM_FALSE_EASTING: f64 = 500_000.0;
const UTM_FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Geographic coordinate system every input bounding box is expressed in
pub const WGS84_EPSG: u32 = 4326;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    WebMercator,
    Utm { zone: u8, south: bool },
}

impl Projection {
    /// Resolve an EPSG code into a projection
    ///
    /// EPSG:4326 is rejected: GRAL needs metric coordinates.
    pub fn from_epsg(code: u32) -> Result<Self> {
        match code {
            WGS84_EPSG => Err(Sumo2GralError::InvalidInput(
                "EPSG code must differ from 4326; GRAL requires a projected (metric) CRS".into(),
            )),
            3857 => Ok(Projection::WebMercator),
            32601..=32660 => Ok(Projection::Utm {
                zone: (code - 32600) as u8,
                south: false,
            }),
            32701..=32760 => Ok(Projection::Utm {
                zone: (code - 32700) as u8,
                south: true,
            }),
            other => Err(Sumo2GralError::InvalidInput(format!(
                "Unsupported EPSG code {}. Supported: 3857, 32601-32660, 32701-32760",
                other
            ))),
        }
    }

    /// Parse a proj4 definition as found in SUMO `location/@projParameter`
    ///
    /// Returns `Ok(None)` for `!` (network without geo-reference).
    pub fn from_proj4(definition: &str) -> Result<Option<Self>> {
        let definition = definition.trim();
        if definition == "!" || definition.is_empty() {
            return Ok(None);
        }

        let mut proj = None;
        let mut zone = None;
        let mut south = false;
        for token in definition.split_whitespace() {
            let token = token.trim_start_matches('+');
            let (key, value) = token.split_once('=').unwrap_or((token, ""));
            match key {
                "proj" => proj = Some(value.to_string()),
                "zone" => zone = value.parse::<u8>().ok(),
                "south" => south = true,
                _ => {}
            }
        }

        match (proj.as_deref(), zone) {
            (Some("utm"), Some(zone)) if (1..=60).contains(&zone) => {
                Ok(Some(Projection::Utm { zone, south }))
            }
            (Some("merc"), _) => Ok(Some(Projection::WebMercator)),
            _ => Err(Sumo2GralError::Unsupported(format!(
                "network projection '{}'",
                definition
            ))),
        }
    }

    pub fn epsg(&self) -> u32 {
        match self {
            Projection::WebMercator => 3857,
            Projection::Utm { zone, south: false } => 32600 + *zone as u32,
            Projection::Utm { zone, south: true } => 32700 + *zone as u32,
        }
    }

    /// Project WGS84 longitude/latitude (degrees) to easting/northing (metres)
    pub fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        match *self {
            Projection::WebMercator => {
                let x = WGS84_A * lon.to_radians();
                let y = WGS84_A * (FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
                (x, y)
            }
            Projection::Utm { zone, south } => utm_forward(lon, lat, zone, south),
        }
    }

    /// Inverse of [`Projection::project`]
    pub fn unproject(&self, x: f64, y: f64) -> (f64, f64) {
        match *self {
            Projection::WebMercator => {
                let lon = (x / WGS84_A).to_degrees();
                let lat = (2.0 * (y / WGS84_A).exp().atan() - FRAC_PI_2).to_degrees();
                (lon, lat)
            }
            Projection::Utm { zone, south } => utm_inverse(x, y, zone, south),
        }
    }
}

impl std::fmt::Display for Projection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

struct KruegerSeries {
    a_rect: f64,
    alpha: [f64; 3],
    beta: [f64; 3],
    delta: [f64; 3],
    n: f64,
}

fn krueger() -> KruegerSeries {
    let n = WGS84_F / (2.0 - WGS84_F);
    let n2 = n * n;
    let n3 = n2 * n;
    KruegerSeries {
        a_rect: WGS84_A / (1.0 + n) * (1.0 + n2 / 4.0 + n2 * n2 / 64.0),
        alpha: [
            n / 2.0 - 2.0 * n2 / 3.0 + 5.0 * n3 / 16.0,
            13.0 * n2 / 48.0 - 3.0 * n3 / 5.0,
            61.0 * n3 / 240.0,
        ],
        beta: [
            n / 2.0 - 2.0 * n2 / 3.0 + 37.0 * n3 / 96.0,
            n2 / 48.0 + n3 / 15.0,
            17.0 * n3 / 480.0,
        ],
        delta: [
            2.0 * n - 2.0 * n2 / 3.0 - 2.0 * n3,
            7.0 * n2 / 3.0 - 8.0 * n3 / 5.0,
            56.0 * n3 / 15.0,
        ],
        n,
    }
}

fn central_meridian(zone: u8) -> f64 {
    (zone as f64 * 6.0 - 183.0).to_radians()
}

fn utm_forward(lon: f64, lat: f64, zone: u8, south: bool) -> (f64, f64) {
    let k = krueger();
    let phi = lat.to_radians();
    let dlambda = lon.to_radians() - central_meridian(zone);

    let c = 2.0 * k.n.sqrt() / (1.0 + k.n);
    let t = (phi.sin().atanh() - c * (c * phi.sin()).atanh()).sinh();
    let xi_p = (t / dlambda.cos()).atan();
    let eta_p = (dlambda.sin() / (1.0 + t * t).sqrt()).atanh();

    let mut xi = xi_p;
    let mut eta = eta_p;
    for (j, alpha) in k.alpha.iter().enumerate() {
        let m = 2.0 * (j + 1) as f64;
        xi += alpha * (m * xi_p).sin() * (m * eta_p).cosh();
        eta += alpha * (m * xi_p).cos() * (m * eta_p).sinh();
    }

    let easting = UTM_FALSE_EASTING + UTM_K0 * k.a_rect * eta;
    let northing = UTM_K0 * k.a_rect * xi + if south { UTM_FALSE_NORTHING_SOUTH } else { 0.0 };
    (easting, northing)
}

fn utm_inverse(x: f64, y: f64, zone: u8, south: bool) -> (f64, f64) {
    let k = krueger();
    let northing = if south { y - UTM_FALSE_NORTHING_SOUTH } else { y };
    let xi = northing / (UTM_K0 * k.a_rect);
    let eta = (x - UTM_FALSE_EASTING) / (UTM_K0 * k.a_rect);

    let mut xi_p = xi;
    let mut eta_p = eta;
    for (j, beta) in k.beta.iter().enumerate() {
        let m = 2.0 * (j + 1) as f64;
        xi_p -= beta * (m * xi).sin() * (m * eta).cosh();
        eta_p -= beta * (m * xi).cos() * (m * eta).sinh();
    }

    let chi = (xi_p.sin() / eta_p.cosh()).asin();
    let mut phi = chi;
    for (j, delta) in k.delta.iter().enumerate() {
        phi += delta * (2.0 * (j + 1) as f64 * chi).sin();
    }
    let lambda = central_meridian(zone) + (eta_p.sinh() / xi_p.cos()).atan();

    (lambda.to_degrees(), phi.to_degrees())
}
