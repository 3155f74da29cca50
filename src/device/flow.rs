//! Pressure drop to flow rate conversion.
//!
//! Flow through an inhaler follows `Q = sqrt(ΔP) / R`, with `ΔP` in pascal and
//! `R` the device resistance in Pa^0.5·s·L⁻¹, giving litres per second.

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConversionError {
    #[error("Invalid pressure drop: {0} kPa")]
    InvalidPressureDrop(f64),

    #[error("Invalid resistance: {0} Pa^0.5·s/L")]
    InvalidResistance(f64),
}

/// Flow rate in L/min for a pressure drop in kPa, rounded to 2 decimals.
pub fn flow_rate_lpm(pressure_drop_kpa: f64, resistance: f64) -> Result<f64, ConversionError> {
    if !resistance.is_finite() || resistance <= 0.0 {
        return Err(ConversionError::InvalidResistance(resistance));
    }
    if !pressure_drop_kpa.is_finite() || pressure_drop_kpa < 0.0 {
        return Err(ConversionError::InvalidPressureDrop(pressure_drop_kpa));
    }

    let pressure_drop_pa = pressure_drop_kpa * 1000.0;
    let flow_rate = pressure_drop_pa.sqrt() / resistance * 60.0;
    Ok(round_to_hundredths(flow_rate))
}

fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_conversion() {
        assert_eq!(flow_rate_lpm(2.0, 66.8), Ok(40.17));
        assert_eq!(flow_rate_lpm(2.0, 1.0), Ok(2683.28));
    }

    #[test]
    fn test_builtin_inhaler_resistances() {
        assert_eq!(flow_rate_lpm(0.5, 1.0), Ok(1341.64));
        assert_eq!(flow_rate_lpm(1.0, 1.2), Ok(1581.14));
        assert_eq!(flow_rate_lpm(2.5, 1.5), Ok(2000.0));
    }

    #[test]
    fn test_exact_ties_round_away_from_zero() {
        // 12.5 and 62.5 are exact in binary, so these are true ties
        assert_eq!(round_to_hundredths(0.125), 0.13);
        assert_eq!(round_to_hundredths(0.625), 0.63);
        assert_eq!(round_to_hundredths(40.169), 40.17);
    }

    #[test]
    fn test_zero_pressure_drop_is_zero_flow() {
        assert_eq!(flow_rate_lpm(0.0, 1.2), Ok(0.0));
    }

    #[test]
    fn test_rejects_non_positive_resistance() {
        assert_eq!(flow_rate_lpm(1.0, 0.0), Err(ConversionError::InvalidResistance(0.0)));
        assert_eq!(flow_rate_lpm(1.0, -1.5), Err(ConversionError::InvalidResistance(-1.5)));
        assert!(matches!(
            flow_rate_lpm(1.0, f64::NAN),
            Err(ConversionError::InvalidResistance(_))
        ));
    }

    #[test]
    fn test_rejects_negative_pressure_drop() {
        assert_eq!(flow_rate_lpm(-1.0, 1.0), Err(ConversionError::InvalidPressureDrop(-1.0)));
        assert!(matches!(
            flow_rate_lpm(f64::INFINITY, 1.0),
            Err(ConversionError::InvalidPressureDrop(_))
        ));
    }
}
