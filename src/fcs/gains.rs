use crate::config::PidProfile;
use crate::types::Axis;

// Scale from profile tuning bytes to working gains
pub(crate) const PTERM_SCALE: f32 = 0.032029;
pub(crate) const ITERM_SCALE: f32 = 0.244381;
pub(crate) const DTERM_SCALE: f32 = 0.000529;

/// Working gains and derived constants, recomputed on profile or loop-period
/// change and read-only in between.
#[derive(Copy, Clone, Debug)]
pub struct Gains {
    pub kp: [f32; 3],
    pub ki: [f32; 3],
    pub kd: [f32; 3],
    /// Max setpoint change per tick, deg/s; zero disables slew limiting.
    pub max_velocity: [f32; 3],
    pub dterm_setpoint_weight: f32,
    pub relax_ratio: u8,
    pub relax_factor: f32,
    pub level_gain: f32,
    pub horizon_gain: f32,
    /// Zero disables horizon self-leveling outright.
    pub horizon_transition: f32,
    pub windup_point_inv: f32,
    pub level_sensitivity: f32,
    pub level_angle_limit: f32,
    /// Tail-servo mixing: yaw skips TPA and gets a derivative term.
    pub tri_mixer: bool,
}

impl Gains {
    pub fn derive(profile: &PidProfile, dt: f32, tri_mixer: bool) -> Self {
        let mut kp = [0.0; 3];
        let mut ki = [0.0; 3];
        let mut kd = [0.0; 3];
        for axis in Axis::LIST {
            let pid = profile.gains(axis);
            kp[axis as usize] = PTERM_SCALE * pid.p as f32;
            ki[axis as usize] = ITERM_SCALE * pid.i as f32;
            kd[axis as usize] = DTERM_SCALE * pid.d as f32;
        }

        let roll_pitch_velocity = profile.rate_accel_limit as f32 * 1000.0 * dt;
        let yaw_velocity = profile.yaw_rate_accel_limit as f32 * 1000.0 * dt;

        let relax_ratio = profile.setpoint_relax_ratio;
        let relax_factor =
            if relax_ratio > 0 { 100.0 / relax_ratio as f32 } else { f32::MAX };

        let level = profile.level.gains;
        let horizon_transition =
            if level.d > 0 { 100.0 / level.d as f32 } else { 0.0 };

        // A 100% windup point has no headroom left; saturate the reciprocal
        // complement instead of dividing by zero.
        let windup_point = profile.iterm_windup_point.min(100) as f32 / 100.0;
        let windup_point_inv =
            if windup_point < 1.0 { 1.0 / (1.0 - windup_point) } else { f32::MAX };

        Self {
            kp,
            ki,
            kd,
            max_velocity: [roll_pitch_velocity, roll_pitch_velocity, yaw_velocity],
            dterm_setpoint_weight: profile.dterm_setpoint_weight as f32 / 127.0,
            relax_ratio,
            relax_factor,
            level_gain: level.p as f32 / 10.0,
            horizon_gain: level.i as f32 / 10.0,
            horizon_transition,
            windup_point_inv,
            level_sensitivity: profile.level.sensitivity as f32,
            level_angle_limit: profile.level.angle_limit as f32,
            tri_mixer,
        }
    }
}

mod test {
    #[test]
    fn test_derive() {
        use super::{Gains, DTERM_SCALE, ITERM_SCALE, PTERM_SCALE};
        use crate::config::PidProfile;

        let profile = PidProfile::default();
        let gains = Gains::derive(&profile, 0.001, false);
        assert_eq!(gains.kp[0], PTERM_SCALE * 44.0);
        assert_eq!(gains.ki[1], ITERM_SCALE * 50.0);
        assert_eq!(gains.kd[2], DTERM_SCALE * 20.0);
        // Roll/pitch slew limit disabled by default, yaw at 10k deg/s²
        assert_eq!(gains.max_velocity[0], 0.0);
        assert_eq!(gains.max_velocity[2], 10_000.0 * 0.001);
        assert_eq!(gains.level_gain, 5.0);
        assert_eq!(gains.horizon_gain, 5.0);
        assert_eq!(gains.horizon_transition, 1.0);
        assert_eq!(gains.windup_point_inv, 2.0);
        assert!(!gains.tri_mixer);
    }

    #[test]
    fn test_derive_guards() {
        use super::Gains;
        use crate::config::PidProfile;

        let mut profile = PidProfile::default();
        profile.iterm_windup_point = 100;
        profile.setpoint_relax_ratio = 0;
        profile.level.gains.d = 0;
        let gains = Gains::derive(&profile, 0.000125, true);
        // Guarded divisions saturate or disable instead of producing inf/NaN
        assert_eq!(gains.windup_point_inv, f32::MAX);
        assert_eq!(gains.relax_factor, f32::MAX);
        assert_eq!(gains.horizon_transition, 0.0);
        assert!(gains.tri_mixer);
    }
}
