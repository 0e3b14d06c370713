//! Number formatting shared by the GRAL text files

/// Round half away from zero to `decimals` places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Float with at least one decimal place ("27.0", "2.5", "0.0032")
pub fn fmt_float(value: f64) -> String {
    format!("{:?}", value)
}

/// Height without a trailing ".0" for whole metres ("3", "1.5")
pub fn fmt_height(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// GRAL wind sector: direction snapped to half of a 10° sector
///
/// 270° → 27.0, 275° → 27.5, 273° → 27.5, 272° → 27.0
pub fn wind_sector(direction_deg: f64) -> f64 {
    (direction_deg / 10.0 * 2.0).round() / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_float() {
        assert_eq!(fmt_float(27.0), "27.0");
        assert_eq!(fmt_float(2.5), "2.5");
        assert_eq!(fmt_float(0.0032), "0.0032");
    }

    #[test]
    fn test_fmt_height() {
        assert_eq!(fmt_height(3.0), "3");
        assert_eq!(fmt_height(1.5), "1.5");
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(40.41678, 2), 40.42);
        assert_eq!(round_to(3.14159, 1), 3.1);
        assert_eq!(round_to(-1.25, 1), -1.3);
    }

    #[test]
    fn test_wind_sector() {
        assert_eq!(wind_sector(270.0), 27.0);
        assert_eq!(wind_sector(275.0), 27.5);
        assert_eq!(wind_sector(273.0), 27.5);
        assert_eq!(wind_sector(272.0), 27.0);
        assert_eq!(wind_sector(0.0), 0.0);
        assert_eq!(wind_sector(359.0), 36.0);
    }
}
