// libpump-rs/libpump/src/minimed/pump_model.rs

//! Pump model numbers and the record-format capabilities they imply.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::Error;

/// A supported pump model, e.g. `523`.
///
/// The last two digits are the generation; the leading digit is the
/// reservoir size class (5 or 7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PumpModel(u16);

const KNOWN_MODELS: &[u16] = &[
    508, 511, 711, 512, 712, 515, 715, 522, 722, 523, 723, 530, 730, 540, 740, 551, 751, 554, 754,
];

impl PumpModel {
    /// Paradigm 515.
    pub const MODEL_515: PumpModel = PumpModel(515);
    /// Paradigm 522.
    pub const MODEL_522: PumpModel = PumpModel(522);
    /// Paradigm 523.
    pub const MODEL_523: PumpModel = PumpModel(523);
    /// Paradigm 551.
    pub const MODEL_551: PumpModel = PumpModel(551);
    /// Paradigm 723.
    pub const MODEL_723: PumpModel = PumpModel(723);

    /// Validate a model number.
    pub fn new(number: u16) -> crate::Result<Self> {
        if KNOWN_MODELS.contains(&number) {
            Ok(Self(number))
        } else {
            Err(Error::UnknownPumpModel(number.to_string()))
        }
    }

    /// Model number.
    pub fn number(&self) -> u16 {
        self.0
    }

    fn generation(&self) -> u16 {
        self.0 % 100
    }

    fn size(&self) -> u16 {
        self.0 / 100
    }

    /// x23 and later records use the larger history layouts.
    pub fn larger(&self) -> bool {
        self.generation() >= 23
    }

    /// Newer pumps write a square wave bolus at start of delivery and update it in place.
    pub fn appends_square_wave_to_history_on_start_of_delivery(&self) -> bool {
        self.generation() >= 23
    }

    /// Sends MySentry broadcasts.
    pub fn has_my_sentry(&self) -> bool {
        self.generation() >= 23
    }

    /// Has low glucose suspend.
    pub fn has_low_suspend(&self) -> bool {
        self.generation() >= 51
    }

    /// Writes a record at each basal segment start.
    pub fn records_basal_profile_start_events(&self) -> bool {
        self.generation() >= 23
    }

    /// x15 pumps answer a bolus with an error although it is delivered.
    pub fn returns_error_on_bolus(&self) -> bool {
        self.generation() == 15
    }

    /// Strokes per unit used when packing insulin amounts into records.
    pub fn insulin_bit_packing_scale(&self) -> u32 {
        if self.generation() >= 23 { 40 } else { 10 }
    }

    /// Alias kept for reservoir and bolus messages, which use the same scale.
    pub fn strokes_per_unit(&self) -> u32 {
        self.insulin_bit_packing_scale()
    }

    /// Delivery pulses per unit.
    pub fn pulses_per_unit(&self) -> u32 {
        if self.generation() >= 23 { 40 } else { 20 }
    }

    /// Reservoir capacity in units.
    pub fn reservoir_capacity(&self) -> u32 {
        if self.size() == 7 { 300 } else { 176 }
    }

    /// Bolus speed depends on the amount.
    pub fn is_delivery_rate_variable(&self) -> bool {
        self.generation() >= 23
    }

    /// Largest bolus the pump accepts.
    pub fn maximum_bolus_volume(&self) -> f64 {
        25.0
    }

    /// Largest basal rate the pump accepts.
    pub fn maximum_basal_rate(&self) -> f64 {
        35.0
    }

    /// Expected time the pump takes to deliver a normal bolus of `units`.
    pub fn bolus_delivery_time(&self, units: f64) -> Duration {
        let units_per_minute = if self.is_delivery_rate_variable() {
            if units < 1.0 {
                0.75
            } else if units > 7.5 {
                units / 5.0
            } else {
                1.5
            }
        } else {
            1.5
        };
        Duration::from_secs_f64((units / units_per_minute * 60.0).max(0.0))
    }
}

impl FromStr for PumpModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n: u16 = s
            .trim()
            .parse()
            .map_err(|_| Error::UnknownPumpModel(s.to_string()))?;
        Self::new(n).map_err(|_| Error::UnknownPumpModel(s.to_string()))
    }
}

impl fmt::Display for PumpModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_by_generation() {
        let m522: PumpModel = "522".parse().unwrap();
        assert!(!m522.larger());
        assert_eq!(m522.strokes_per_unit(), 10);
        assert_eq!(m522.pulses_per_unit(), 20);
        assert_eq!(m522.reservoir_capacity(), 176);

        let m723: PumpModel = "723".parse().unwrap();
        assert!(m723.larger());
        assert!(m723.has_my_sentry());
        assert!(!m723.has_low_suspend());
        assert_eq!(m723.strokes_per_unit(), 40);
        assert_eq!(m723.reservoir_capacity(), 300);

        assert!(PumpModel::MODEL_551.has_low_suspend());
        assert!(PumpModel::MODEL_515.returns_error_on_bolus());
    }

    #[test]
    fn unknown_models_are_rejected() {
        assert!(matches!("600".parse::<PumpModel>(), Err(Error::UnknownPumpModel(_))));
        assert!(matches!("abc".parse::<PumpModel>(), Err(Error::UnknownPumpModel(_))));
    }

    #[test]
    fn bolus_delivery_time_tiers() {
        assert_eq!(PumpModel::MODEL_523.bolus_delivery_time(1.5).as_secs(), 60);
        assert_eq!(PumpModel::MODEL_523.bolus_delivery_time(0.75).as_secs(), 60);
        // 10 U at 2 U/min on variable-rate pumps
        assert_eq!(PumpModel::MODEL_523.bolus_delivery_time(10.0).as_secs(), 300);
        assert_eq!(PumpModel::MODEL_522.bolus_delivery_time(0.75).as_secs(), 30);
    }
}
