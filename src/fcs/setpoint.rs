#[cfg(not(any(test, feature = "std")))]
use micromath::F32Ext;

use super::gains::Gains;
use super::TickInput;
use crate::types::{Axis, FlightMode};

/// Slew-rate limit: the shaped setpoint may move at most `max_velocity`
/// deg/s away from the previous tick's value.
pub(crate) fn limit_acceleration(previous: &mut f32, setpoint: f32, max_velocity: f32) -> f32 {
    let velocity = setpoint - *previous;
    let setpoint = if velocity.abs() > max_velocity {
        if velocity > 0.0 {
            *previous + max_velocity
        } else {
            *previous - max_velocity
        }
    } else {
        setpoint
    };
    *previous = setpoint;
    setpoint
}

/// Self-level fade: full strength with sticks centered, fading to zero as the
/// larger roll/pitch deflection approaches full, scaled by the transition.
pub(crate) fn horizon_strength(gains: &Gains, input: &TickInput) -> f32 {
    if gains.horizon_transition <= 0.0 {
        return 0.0;
    }
    let most_deflected = f32::max(input.stick[0].abs(), input.stick[1].abs());
    (1.0 - most_deflected * gains.horizon_transition).clamp(0.0, 1.0)
}

/// Angle/horizon blending for roll and pitch. Angle mode closes the loop on
/// the angle error alone; horizon mode mixes a fading self-level correction
/// into the rate setpoint.
pub(crate) fn level(axis: Axis, gains: &Gains, input: &TickInput, setpoint: f32) -> f32 {
    let index = axis as usize;
    let mut error_angle = gains.level_sensitivity * input.stick[index] + input.nav_angle[index];
    error_angle = error_angle.clamp(-gains.level_angle_limit, gains.level_angle_limit);
    error_angle -= input.attitude.axis(axis) - input.angle_trim.axis(axis);
    match input.mode {
        FlightMode::Angle => error_angle * gains.level_gain,
        FlightMode::Horizon => {
            setpoint + error_angle * gains.horizon_gain * horizon_strength(gains, input)
        }
        FlightMode::Rate => setpoint,
    }
}

mod test {
    #[cfg(test)]
    use nalgebra::Vector3;

    #[test]
    fn test_limit_acceleration() {
        use super::limit_acceleration;

        let mut previous = 0.0;
        // Within the limit the raw setpoint passes through
        assert_eq!(limit_acceleration(&mut previous, 3.0, 5.0), 3.0);
        assert_eq!(previous, 3.0);
        // Beyond the limit the change is clamped, both directions
        assert_eq!(limit_acceleration(&mut previous, 20.0, 5.0), 8.0);
        assert_eq!(limit_acceleration(&mut previous, -20.0, 5.0), 3.0);
        assert_eq!(previous, 3.0);
    }

    #[test]
    fn test_horizon_strength() {
        use super::horizon_strength;
        use crate::config::PidProfile;
        use crate::fcs::gains::Gains;
        use crate::fcs::TickInput;

        let mut profile = PidProfile::default();
        profile.level.gains.d = 50; // transition 2.0
        let gains = Gains::derive(&profile, 0.001, false);
        let mut input = TickInput::default();

        input.stick = Vector3::new(0.0, 0.0, 0.0);
        assert_eq!(horizon_strength(&gains, &input), 1.0);
        input.stick = Vector3::new(0.5, 0.0, 0.0);
        assert_eq!(horizon_strength(&gains, &input), 0.0);
        input.stick = Vector3::new(0.0, -0.25, 0.0);
        assert_eq!(horizon_strength(&gains, &input), 0.5);
        // Yaw deflection never affects self-leveling
        input.stick = Vector3::new(0.0, 0.0, 1.0);
        assert_eq!(horizon_strength(&gains, &input), 1.0);

        // Zero transition disables self-level entirely
        profile.level.gains.d = 0;
        let gains = Gains::derive(&profile, 0.001, false);
        input.stick = Vector3::new(0.0, 0.0, 0.0);
        assert_eq!(horizon_strength(&gains, &input), 0.0);
    }

    #[test]
    fn test_level_angle_mode() {
        use super::level;
        use crate::config::PidProfile;
        use crate::fcs::gains::Gains;
        use crate::fcs::TickInput;
        use crate::types::{Attitude, Axis, FlightMode};

        let gains = Gains::derive(&PidProfile::default(), 0.001, false);
        let mut input = TickInput::default();
        input.mode = FlightMode::Angle;

        // Half stick requests 27.5°, vehicle level: error × level gain
        input.stick = Vector3::new(0.5, 0.0, 0.0);
        assert_eq!(level(Axis::Roll, &gains, &input, 100.0), 27.5 * 5.0);

        // Attitude error closes the loop toward level
        input.stick = Vector3::new(0.0, 0.0, 0.0);
        input.attitude = Attitude::new(10.0, 0.0);
        assert_eq!(level(Axis::Roll, &gains, &input, 0.0), -10.0 * 5.0);

        // Trim offsets the attitude reference
        input.angle_trim = Attitude::new(10.0, 0.0);
        assert_eq!(level(Axis::Roll, &gains, &input, 0.0), 0.0);

        // Requested angle clamps at the inclination limit
        input.attitude = Attitude::default();
        input.angle_trim = Attitude::default();
        input.stick = Vector3::new(0.0, 1.0, 0.0);
        input.nav_angle = [0.0, 30.0];
        assert_eq!(level(Axis::Pitch, &gains, &input, 0.0), 55.0 * 5.0);
    }

    #[test]
    fn test_level_horizon_mode() {
        use super::level;
        use crate::config::PidProfile;
        use crate::fcs::gains::Gains;
        use crate::fcs::TickInput;
        use crate::types::{Attitude, Axis, FlightMode};

        let gains = Gains::derive(&PidProfile::default(), 0.001, false);
        let mut input = TickInput::default();
        input.mode = FlightMode::Horizon;

        // Sticks centered, leaning 10°: rate setpoint plus full-strength
        // self-level correction
        input.attitude = Attitude::new(10.0, 0.0);
        assert_eq!(level(Axis::Roll, &gains, &input, 100.0), 100.0 - 10.0 * 5.0);

        // Full deflection, default transition 1.0: self-level fully faded
        input.stick = Vector3::new(1.0, 0.0, 0.0);
        input.attitude = Attitude::default();
        assert_eq!(level(Axis::Roll, &gains, &input, 100.0), 100.0);
    }
}
