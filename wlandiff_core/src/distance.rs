use wlandiff_common::Position;

/// Real-world displacement of a matched pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Displacement {
    /// Displacement in plan units
    pub units: f64,
    /// Displacement in meters; `None` when the floor is uncalibrated
    pub meters: Option<f64>,
    /// `meters > move_threshold`, false when `meters` is unavailable
    pub exceeds_threshold: bool,
}

impl Displacement {
    /// Meters rounded to two decimals, as reported in change records
    pub fn reported_meters(&self) -> Option<f64> {
        self.meters.map(round_centimeters)
    }
}

/// Converts plan-unit movement into meters using one floor's calibration
#[derive(Debug, Clone, Copy)]
pub struct DistanceCalculator {
    meters_per_unit: Option<f64>,
    move_threshold_m: f64,
}

impl DistanceCalculator {
    /// `meters_per_unit` is ignored unless finite and positive
    pub fn new(meters_per_unit: Option<f64>, move_threshold_m: f64) -> Self {
        Self {
            meters_per_unit: meters_per_unit.filter(|m| m.is_finite() && *m > 0.0),
            move_threshold_m,
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.meters_per_unit.is_some()
    }

    pub fn measure(&self, old: &Position, new: &Position) -> Displacement {
        let units = old.distance_to(new);
        let meters = self.meters_per_unit.map(|mpu| units * mpu);
        // Strictly greater: a displacement equal to the threshold is not a move
        let exceeds_threshold = meters.map_or(false, |m| m > self.move_threshold_m);

        Displacement {
            units,
            meters,
            exceeds_threshold,
        }
    }

    /// Convert a length in meters into plan units on this floor
    pub fn meters_to_units(&self, meters: f64) -> Option<f64> {
        self.meters_per_unit.map(|mpu| meters / mpu)
    }
}

pub fn round_centimeters(meters: f64) -> f64 {
    (meters * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calibrated_distance() {
        let calc = DistanceCalculator::new(Some(0.0215), 0.5);
        let d = calc.measure(&Position::new(685.6, 127.3), &Position::new(833.8, 109.3));

        assert!((d.units - 149.29).abs() < 0.01);
        assert_eq!(d.reported_meters(), Some(3.21));
        assert!(d.exceeds_threshold);
    }

    #[test]
    fn test_threshold_is_strict() {
        let calc = DistanceCalculator::new(Some(0.25), 0.5);

        let at = calc.measure(&Position::new(10.0, 10.0), &Position::new(12.0, 10.0));
        assert_eq!(at.meters, Some(0.5));
        assert!(!at.exceeds_threshold);

        let above = calc.measure(&Position::new(10.0, 10.0), &Position::new(12.04, 10.0));
        assert!(above.exceeds_threshold);
    }

    #[test]
    fn test_uncalibrated_floor() {
        for mpu in [None, Some(0.0), Some(f64::NAN), Some(-0.1)] {
            let calc = DistanceCalculator::new(mpu, 0.5);
            assert!(!calc.is_calibrated());

            let d = calc.measure(&Position::new(0.0, 0.0), &Position::new(1000.0, 0.0));
            assert_eq!(d.units, 1000.0);
            assert_eq!(d.meters, None);
            assert!(!d.exceeds_threshold);
            assert_eq!(calc.meters_to_units(1.0), None);
        }
    }

    #[test]
    fn test_meters_to_units() {
        let calc = DistanceCalculator::new(Some(0.05), 0.5);
        let units = calc.meters_to_units(0.5).unwrap();
        assert!((units - 10.0).abs() < 1e-9);
    }
}
