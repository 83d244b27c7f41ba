//! Correlated colour temperature from XYZ tristimulus values

use serde::{Deserialize, Serialize};

/// Approximation used to derive CCT from chromaticity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CctMethod {
    /// McCamy's cubic (1992)
    #[default]
    McCamy,
    /// Hernández-Andrés et al. exponential fit (1999)
    Hernandez1999,
}

/// CCT in kelvin using McCamy's approximation.
///
/// Returns 0.0 when any of the tristimulus values is exactly zero.
pub fn get_cct(x: f64, y: f64, z: f64) -> f64 {
    cct_with(CctMethod::McCamy, x, y, z)
}

/// CCT in kelvin with an explicit method; 0.0 for degenerate input
pub fn cct_with(method: CctMethod, x: f64, y: f64, z: f64) -> f64 {
    if x == 0.0 || y == 0.0 || z == 0.0 {
        return 0.0;
    }

    let sum = x + y + z;
    let xn = x / sum;
    let yn = y / sum;

    match method {
        CctMethod::McCamy => {
            let n = (xn - 0.3320) / (0.1858 - yn);
            437.0 * n.powi(3) + 3601.0 * n.powi(2) + 6861.0 * n + 5517.0
        }
        CctMethod::Hernandez1999 => {
            let n = (xn - 0.3366) / (yn - 0.1735);
            -949.86315
                + 6253.80338 * (-n / 0.92159).exp()
                + 28.70599 * (-n / 0.20039).exp()
                + 0.00004 * (-n / 0.07125).exp()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mccamy_reference_point() {
        let cct = get_cct(0.3, 0.3, 0.4);
        assert!((cct - 7731.878886628698).abs() < 1e-6, "{}", cct);
    }

    #[test]
    fn test_degenerate_input() {
        assert_eq!(get_cct(0.0, 1.0, 1.0), 0.0);
        assert_eq!(get_cct(1.0, 0.0, 1.0), 0.0);
        assert_eq!(get_cct(1.0, 1.0, 0.0), 0.0);
        assert_eq!(cct_with(CctMethod::Hernandez1999, 0.0, 1.0, 1.0), 0.0);
    }

    #[test]
    fn test_scale_invariant() {
        let a = get_cct(95.04, 100.0, 108.88);
        let b = get_cct(9.504, 10.0, 10.888);
        assert!((a - b).abs() < 1e-6);
    }

    #[test]
    fn test_methods_agree_near_d65() {
        // D65 white point, about 6504 K
        let mccamy = get_cct(95.047, 100.0, 108.883);
        let hernandez = cct_with(CctMethod::Hernandez1999, 95.047, 100.0, 108.883);
        assert!((mccamy - 6504.0).abs() < 50.0, "{}", mccamy);
        assert!((hernandez - 6504.0).abs() < 50.0, "{}", hernandez);
    }
}
