//! Attitude-rate control loop: a two-degree-of-freedom PID per axis with
//! throttle attenuation, integrator windup gating, setpoint shaping and a
//! configurable filter chain on the derivative path.
//!
//!            ┌────────────┐   ┌──────────────┐   ┌───────────┐
//!  setpoint ─>│ accel limit │──>│ angle/horizon │──>│           │──> P
//!            └────────────┘   └──────────────┘   │  2DOF PID │──> I
//!  gyro ─────────────────────────────────────────>│           │──> D
//!                                                 └───────────┘

pub mod filters;
pub mod gains;
mod setpoint;

#[cfg(not(any(test, feature = "std")))]
use micromath::F32Ext;
use nalgebra::Vector3;

use crate::config::PidProfile;
use crate::types::{Attitude, Axis, FlightMode};

pub use filters::FilterBank;
pub use gains::Gains;

/// Snapshot of every external input consumed during one tick. Collaborators
/// fill it once per tick so the whole computation sees consistent values.
#[derive(Copy, Clone, Debug)]
pub struct TickInput {
    /// Requested angular rates, deg/s.
    pub setpoint: Vector3<f32>,
    /// Measured angular rates, deg/s, bias and scale corrected.
    pub gyro: Vector3<f32>,
    /// Normalized stick deflection per axis in [-1, 1].
    pub stick: Vector3<f32>,
    pub attitude: Attitude,
    pub angle_trim: Attitude,
    /// Navigation angle bias for roll and pitch, deg, zero when absent.
    pub nav_angle: [f32; 2],
    pub mode: FlightMode,
    /// Throttle-PID attenuation in (0, 1].
    pub tpa_factor: f32,
    /// Motor-mix saturation degree in [0, 1].
    pub motor_mix_range: f32,
    /// Whether the mixer output is saturated in the direction of increasing
    /// error, per axis.
    pub output_saturated: [bool; 3],
    pub stabilization: bool,
}

impl Default for TickInput {
    fn default() -> Self {
        Self {
            setpoint: Vector3::zeros(),
            gyro: Vector3::zeros(),
            stick: Vector3::zeros(),
            attitude: Attitude::default(),
            angle_trim: Attitude::default(),
            nav_angle: [0.0; 2],
            mode: FlightMode::Rate,
            tpa_factor: 1.0,
            motor_mix_range: 0.0,
            output_saturated: [false; 3],
            stabilization: true,
        }
    }
}

/// Per-axis control contributions, overwritten every tick and read-only to
/// the mixer in between.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Terms {
    pub p: Vector3<f32>,
    pub i: Vector3<f32>,
    pub d: Vector3<f32>,
}

#[derive(Copy, Clone, Debug, Default)]
struct AxisState {
    iterm: f32,
    previous_setpoint: f32,
    previous_rate_error: f32,
    expected_gyro_error: f32,
}

pub struct RateController {
    dt: f32,
    gains: Gains,
    filters: FilterBank,
    state: [AxisState; 3],
    iterm_accelerator: f32,
    terms: Terms,
    faults: u32,
}

impl RateController {
    pub fn new(profile: &PidProfile, looptime_us: u32, tri_mixer: bool) -> Self {
        let dt = looptime_us as f32 * 0.000_001;
        Self {
            dt,
            gains: Gains::derive(profile, dt, tri_mixer),
            filters: FilterBank::new(profile, looptime_us, tri_mixer),
            state: [AxisState::default(); 3],
            iterm_accelerator: 1.0,
            terms: Terms::default(),
            faults: 0,
        }
    }

    /// Rebuild gains and filter bank for a changed profile or loop period.
    /// Must be called between ticks; controller state is preserved.
    pub fn reconfigure(&mut self, profile: &PidProfile, looptime_us: u32, tri_mixer: bool) {
        self.dt = looptime_us as f32 * 0.000_001;
        self.gains = Gains::derive(profile, self.dt, tri_mixer);
        self.filters = FilterBank::new(profile, looptime_us, tri_mixer);
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    /// External boost applied to the integral gain, e.g. during fast throttle
    /// transients. Identity is 1.0.
    pub fn set_iterm_accelerator(&mut self, accelerator: f32) {
        self.iterm_accelerator = accelerator;
    }

    /// Feed-forward bias added to the rate error, for compensating known
    /// disturbances.
    pub fn set_expected_gyro_error(&mut self, axis: Axis, error: f32) {
        self.state[axis as usize].expected_gyro_error = error;
    }

    pub fn reset_iterm(&mut self) {
        for state in self.state.iter_mut() {
            state.iterm = 0.0;
        }
    }

    pub fn reset_iterm_axis(&mut self, axis: Axis) {
        self.state[axis as usize].iterm = 0.0;
    }

    /// Output terms of the most recent tick.
    pub fn terms(&self) -> &Terms {
        &self.terms
    }

    /// Number of non-finite terms clamped to zero so far.
    pub fn fault_count(&self) -> u32 {
        self.faults
    }

    /// One control tick. State always advances, but the published terms are
    /// masked to zero while stabilization is off, so re-enabling resumes
    /// exactly where an uninterrupted run would be.
    pub fn update(&mut self, input: &TickInput) -> Terms {
        let gains = self.gains;
        // Integration shrinks as motor-mix authority runs out
        let dyn_ki = ((1.0 - input.motor_mix_range) * gains.windup_point_inv).min(1.0);
        let mut terms = Terms::default();

        for axis in Axis::LIST {
            let index = axis as usize;
            let state = &mut self.state[index];

            let mut setpoint = input.setpoint[index];
            if gains.max_velocity[index] > 0.0 {
                setpoint = setpoint::limit_acceleration(
                    &mut state.previous_setpoint,
                    setpoint,
                    gains.max_velocity[index],
                );
            }
            if axis != Axis::Yaw && input.mode != FlightMode::Rate {
                setpoint = setpoint::level(axis, &gains, input, setpoint);
            }

            let gyro_rate = input.gyro[index];
            let error_rate = setpoint - gyro_rate + state.expected_gyro_error;

            let mut p = gains.kp[index] * error_rate;
            if axis == Axis::Yaw {
                // Tail-servo mixing compensates throttle on its own
                if !gains.tri_mixer {
                    p *= input.tpa_factor;
                }
                p = self.filters.yaw_lpf.apply(p);
                if !p.is_finite() {
                    self.filters.yaw_lpf.reset();
                }
            } else {
                p *= input.tpa_factor;
            }

            let iterm = state.iterm;
            let new_iterm = iterm
                + gains.ki[index] * error_rate * self.dt * dyn_ki * self.iterm_accelerator;
            // The integrator may unwind while saturated but never grow
            if !input.output_saturated[index] || new_iterm.abs() < iterm.abs() {
                state.iterm = new_iterm;
            }
            if !state.iterm.is_finite() {
                warn!("non-finite integrator on axis {}, reset", index);
                state.iterm = 0.0;
                self.faults += 1;
            }

            let mut d = 0.0;
            if axis != Axis::Yaw || gains.tri_mixer {
                let mut weight = gains.dterm_setpoint_weight;
                if gains.relax_ratio < 100 {
                    weight *= (input.stick[index].abs() * gains.relax_factor).min(1.0);
                }
                let rate_error = weight * setpoint - gyro_rate;
                let delta = (rate_error - state.previous_rate_error) / self.dt;
                state.previous_rate_error = rate_error;
                d = gains.kd[index] * delta * input.tpa_factor;
                // Notch strips the resonance band before broader smoothing
                d = self.filters.dterm_notch[index].apply(d);
                d = self.filters.dterm_lpf[index].apply(d);
                // A non-finite sample must not linger in the delay registers,
                // otherwise this axis would lose its D term for good
                if !d.is_finite() {
                    self.filters.dterm_notch[index].reset();
                    self.filters.dterm_lpf[index].reset();
                }
            }

            terms.p[index] = finite_or_zero(p, &mut self.faults);
            terms.i[index] = state.iterm;
            terms.d[index] = finite_or_zero(d, &mut self.faults);
        }

        if !input.stabilization {
            terms = Terms::default();
        }
        self.terms = terms;
        terms
    }
}

fn finite_or_zero(value: f32, faults: &mut u32) -> f32 {
    if value.is_finite() {
        value
    } else {
        warn!("non-finite control term clamped to zero");
        *faults += 1;
        0.0
    }
}

mod test {
    #[cfg(test)]
    use nalgebra::Vector3;

    #[cfg(test)]
    use super::{RateController, TickInput};
    #[cfg(test)]
    use crate::config::PidProfile;

    /// Profile with filters and slew limits disabled, for exact arithmetic.
    #[cfg(test)]
    fn bare_profile() -> PidProfile {
        let mut profile = PidProfile::default();
        profile.filters.dterm_notch_hz = 0;
        profile.filters.dterm_lpf_hz = 0;
        profile.filters.yaw_lpf_hz = 0;
        profile.rate_accel_limit = 0;
        profile.yaw_rate_accel_limit = 0;
        profile
    }

    #[cfg(test)]
    fn input_at(tick: usize) -> TickInput {
        let mut input = TickInput::default();
        input.setpoint = Vector3::new(tick as f32 * 3.0, -(tick as f32), 20.0);
        input.gyro = Vector3::new(tick as f32 * 2.5, -(tick as f32) * 0.5, 15.0);
        input.stick = Vector3::new(0.2, -0.1, 0.3);
        input
    }

    #[test]
    fn test_determinism() {
        let profile = PidProfile::default();
        let mut first = RateController::new(&profile, 1000, false);
        let mut second = RateController::new(&profile, 1000, false);
        for tick in 0..500 {
            let input = input_at(tick);
            assert_eq!(first.update(&input), second.update(&input));
        }
    }

    #[test]
    fn test_first_tick_terms() {
        use crate::fcs::gains::{DTERM_SCALE, ITERM_SCALE, PTERM_SCALE};

        let profile = bare_profile();
        let mut controller = RateController::new(&profile, 1000, false);
        let mut input = TickInput::default();
        input.setpoint = Vector3::new(100.0, 0.0, 0.0);

        let terms = controller.update(&input);
        assert_eq!(terms.p[0], PTERM_SCALE * 44.0 * 100.0);
        // Windup point 50% with no saturation leaves dynamic Ki at 1
        assert_eq!(terms.i[0], ITERM_SCALE * 40.0 * 100.0 * 0.001);
        let weight = 60.0f32 / 127.0;
        assert_eq!(terms.d[0], DTERM_SCALE * 20.0 * (weight * 100.0 / 0.001));
    }

    #[test]
    fn test_convergence_on_tracking() {
        let profile = bare_profile();
        let mut controller = RateController::new(&profile, 1000, false);
        let mut input = TickInput::default();
        input.setpoint = Vector3::new(100.0, 100.0, 100.0);

        let first = controller.update(&input);
        assert!(first.i[0] > 0.0);

        // Gyro now tracks the setpoint exactly, error goes to zero
        input.gyro = Vector3::new(100.0, 100.0, 100.0);
        let mut terms = controller.update(&input);
        for _ in 0..1000 {
            terms = controller.update(&input);
        }
        assert_eq!(terms.p[0], 0.0);
        assert_eq!(terms.d[0], 0.0);
        assert_eq!(terms.i[0], first.i[0]);
    }

    #[test]
    fn test_windup_containment() {
        let profile = bare_profile();
        let mut controller = RateController::new(&profile, 1000, false);
        let mut input = TickInput::default();
        input.setpoint = Vector3::new(100.0, 0.0, 0.0);

        let grown = controller.update(&input).i[0];
        assert!(grown > 0.0);

        // Saturated in the error direction with the error still pushing:
        // the integrator must not grow
        input.output_saturated = [true; 3];
        for _ in 0..100 {
            assert_eq!(controller.update(&input).i[0], grown);
        }

        // Reversed error unwinds even while saturated
        input.setpoint = Vector3::new(-100.0, 0.0, 0.0);
        let unwound = controller.update(&input).i[0];
        assert!(unwound < grown);

        // Unsaturated growth is monotonic
        input.setpoint = Vector3::new(100.0, 0.0, 0.0);
        input.output_saturated = [false; 3];
        let mut previous = unwound;
        for _ in 0..100 {
            let iterm = controller.update(&input).i[0];
            assert!(iterm > previous);
            previous = iterm;
        }
    }

    #[test]
    fn test_windup_sign_combinations() {
        let profile = bare_profile();
        let saturated = {
            let mut input = TickInput::default();
            input.output_saturated = [true; 3];
            input
        };

        // Positive integrator
        let mut controller = RateController::new(&profile, 1000, false);
        let mut charge = TickInput::default();
        charge.setpoint = Vector3::new(100.0, 0.0, 0.0);
        let positive = controller.update(&charge).i[0];
        assert!(positive > 0.0);

        // (error +, iterm +): blocked
        let mut input = saturated;
        input.setpoint = Vector3::new(100.0, 0.0, 0.0);
        assert_eq!(controller.update(&input).i[0], positive);
        // (error -, iterm +): unwinds
        input.setpoint = Vector3::new(-100.0, 0.0, 0.0);
        assert!(controller.update(&input).i[0] < positive);

        // Negative integrator
        let mut controller = RateController::new(&profile, 1000, false);
        charge.setpoint = Vector3::new(-100.0, 0.0, 0.0);
        let negative = controller.update(&charge).i[0];
        assert!(negative < 0.0);

        // (error -, iterm -): blocked
        let mut input = saturated;
        input.setpoint = Vector3::new(-100.0, 0.0, 0.0);
        assert_eq!(controller.update(&input).i[0], negative);
        // (error +, iterm -): unwinds toward zero
        input.setpoint = Vector3::new(100.0, 0.0, 0.0);
        assert!(controller.update(&input).i[0] > negative);
    }

    #[test]
    fn test_dynamic_ki_scaling() {
        let profile = bare_profile();
        let mut full = RateController::new(&profile, 1000, false);
        let mut scaled = RateController::new(&profile, 1000, false);
        let mut input = TickInput::default();
        input.setpoint = Vector3::new(100.0, 0.0, 0.0);

        let reference = full.update(&input).i[0];
        // Windup point 50% gives reciprocal 2: (1 - 0.75) × 2 = 0.5
        input.motor_mix_range = 0.75;
        assert_eq!(scaled.update(&input).i[0], reference * 0.5);
    }

    #[test]
    fn test_acceleration_limiting() {
        let mut profile = bare_profile();
        profile.rate_accel_limit = 5; // 5 deg/s per 1ms tick
        profile.yaw_rate_accel_limit = 2;
        let mut controller = RateController::new(&profile, 1000, false);
        let mut input = TickInput::default();
        let gains = crate::fcs::gains::Gains::derive(&profile, 0.001, false);

        let mut previous = Vector3::new(0.0, 0.0, 0.0);
        let raw = [3.0, 200.0, -150.0, -1.0, 80.0, 80.0];
        for (tick, &value) in raw.iter().enumerate() {
            input.setpoint = Vector3::new(value, value, value);
            let terms = controller.update(&input);
            // P = Kp × shaped setpoint with gyro at zero, recover the shaped
            // value and check the per-tick change never exceeds the limit
            let shaped = Vector3::new(
                terms.p[0] / gains.kp[0],
                terms.p[1] / gains.kp[1],
                terms.p[2] / gains.kp[2],
            );
            if tick > 0 {
                assert!((shaped[0] - previous[0]).abs() <= 5.0 + 1e-3);
                assert!((shaped[1] - previous[1]).abs() <= 5.0 + 1e-3);
                assert!((shaped[2] - previous[2]).abs() <= 2.0 + 1e-3);
            }
            previous = shaped;
        }
        // Recovered setpoint matches the slew state the controller carries
        assert!((previous[2] - controller.state[2].previous_setpoint).abs() < 1e-3);
    }

    #[test]
    fn test_stabilization_gate_masks_without_corrupting() {
        let profile = bare_profile();
        let mut uninterrupted = RateController::new(&profile, 1000, false);
        let mut gated = RateController::new(&profile, 1000, false);

        for tick in 0..20 {
            let mut input = input_at(tick);
            let reference = uninterrupted.update(&input);
            input.stabilization = !(5..10).contains(&tick);
            let terms = gated.update(&input);
            if (5..10).contains(&tick) {
                assert_eq!(terms, super::Terms::default());
            } else {
                // Identical to the never-disabled run, integrator included
                assert_eq!(terms, reference);
            }
        }
    }

    #[test]
    fn test_yaw_dterm_exemption() {
        let profile = bare_profile();
        let mut plain = RateController::new(&profile, 1000, false);
        let mut tri = RateController::new(&profile, 1000, true);

        for tick in 0..50 {
            let input = input_at(tick);
            assert_eq!(plain.update(&input).d[2], 0.0);
            let terms = tri.update(&input);
            // Yaw inputs are constant, so only the first derivative is nonzero
            if tick == 0 {
                assert!(terms.d[2] != 0.0);
            }
        }
    }

    #[test]
    fn test_yaw_tpa_exemption() {
        let profile = bare_profile();
        let mut input = TickInput::default();
        input.setpoint = Vector3::new(100.0, 100.0, 100.0);
        input.tpa_factor = 0.5;

        let mut controller = RateController::new(&profile, 1000, false);
        let attenuated = controller.update(&input);
        let mut controller = RateController::new(&profile, 1000, true);
        let exempt = controller.update(&input);

        // Roll P attenuated either way, yaw P only without the tri mixer
        assert_eq!(attenuated.p[0], exempt.p[0]);
        assert_eq!(exempt.p[2], attenuated.p[2] * 2.0);
    }

    #[test]
    fn test_setpoint_relax() {
        let mut profile = bare_profile();
        profile.setpoint_relax_ratio = 50;
        let mut controller = RateController::new(&profile, 1000, false);
        let mut input = TickInput::default();
        input.setpoint = Vector3::new(100.0, 0.0, 0.0);

        // Stick at 0.25 with relax factor 2 halves the setpoint weight
        input.stick = Vector3::new(0.25, 0.0, 0.0);
        let relaxed = controller.update(&input).d[0];
        let mut controller = RateController::new(&bare_profile(), 1000, false);
        let full = controller.update(&input).d[0];

        use crate::fcs::gains::DTERM_SCALE;
        let weight = 60.0f32 / 127.0;
        assert_eq!(full, DTERM_SCALE * 20.0 * (weight * 100.0 / 0.001));
        assert_eq!(relaxed, full * 0.5);
    }

    #[test]
    fn test_expected_gyro_error_bias() {
        use crate::types::Axis;

        let profile = bare_profile();
        let mut controller = RateController::new(&profile, 1000, false);
        controller.set_expected_gyro_error(Axis::Roll, 10.0);
        let terms = controller.update(&TickInput::default());
        // Zero setpoint and gyro still yield P from the bias
        assert_eq!(terms.p[0], crate::fcs::gains::PTERM_SCALE * 44.0 * 10.0);
        assert_eq!(terms.p[1], 0.0);
    }

    #[test]
    fn test_iterm_accelerator() {
        let profile = bare_profile();
        let mut plain = RateController::new(&profile, 1000, false);
        let mut boosted = RateController::new(&profile, 1000, false);
        boosted.set_iterm_accelerator(2.0);
        let mut input = TickInput::default();
        input.setpoint = Vector3::new(100.0, 0.0, 0.0);
        assert_eq!(boosted.update(&input).i[0], plain.update(&input).i[0] * 2.0);
    }

    #[test]
    fn test_iterm_reset() {
        use crate::types::Axis;

        let profile = bare_profile();
        let mut controller = RateController::new(&profile, 1000, false);
        let mut input = TickInput::default();
        input.setpoint = Vector3::new(100.0, 100.0, 100.0);
        controller.update(&input);
        assert!(controller.terms().i[0] > 0.0);

        controller.reset_iterm_axis(Axis::Roll);
        assert_eq!(controller.state[0].iterm, 0.0);
        assert!(controller.state[1].iterm > 0.0);

        controller.reset_iterm();
        assert_eq!(controller.state[1].iterm, 0.0);
        assert_eq!(controller.state[2].iterm, 0.0);
    }

    #[test]
    fn test_reconfigure_preserves_state() {
        let profile = bare_profile();
        let mut controller = RateController::new(&profile, 1000, false);
        let mut input = TickInput::default();
        input.setpoint = Vector3::new(100.0, 0.0, 0.0);
        let iterm = controller.update(&input).i[0];

        let mut retuned = bare_profile();
        retuned.roll.p = 88;
        controller.reconfigure(&retuned, 1000, false);
        assert_eq!(controller.state[0].iterm, iterm);
        assert_eq!(controller.dt(), 0.001);

        input.gyro = Vector3::new(100.0, 0.0, 0.0);
        input.setpoint = Vector3::zeros();
        let terms = controller.update(&input);
        assert_eq!(terms.p[0], crate::fcs::gains::PTERM_SCALE * 88.0 * -100.0);
    }

    #[test]
    fn test_nan_clamped_and_counted() {
        let profile = bare_profile();
        let mut controller = RateController::new(&profile, 1000, false);
        let mut input = TickInput::default();
        input.gyro = Vector3::new(f32::NAN, 0.0, 0.0);

        let terms = controller.update(&input);
        assert_eq!(terms.p[0], 0.0);
        assert_eq!(terms.i[0], 0.0);
        assert_eq!(terms.d[0], 0.0);
        assert!(controller.fault_count() > 0);

        // Clean inputs recover on the next tick
        input.gyro = Vector3::zeros();
        input.setpoint = Vector3::new(100.0, 0.0, 0.0);
        let terms = controller.update(&input);
        assert!(terms.p[0] > 0.0 && terms.p[0].is_finite());
        assert!(terms.i[0] > 0.0 && terms.i[0].is_finite());
    }

    #[test]
    fn test_filters_recover_after_nan() {
        let mut profile = PidProfile::default();
        profile.filters.yaw_lpf_hz = 100;
        let mut controller = RateController::new(&profile, 1000, false);
        let mut input = TickInput::default();
        input.setpoint = Vector3::new(0.0, 0.0, 40.0);
        input.gyro = Vector3::new(f32::NAN, 0.0, f32::NAN);
        controller.update(&input);

        // One clean tick flushes the poisoned derivative history
        input.gyro = Vector3::zeros();
        controller.update(&input);
        let faults = controller.fault_count();

        let mut d_seen = false;
        for tick in 0..100 {
            // A moving gyro keeps the raw derivative nonzero
            input.gyro = Vector3::new(tick as f32, 0.0, 0.0);
            let terms = controller.update(&input);
            assert!(terms.d[0].is_finite());
            assert!(terms.p[2].is_finite());
            if terms.d[0] != 0.0 && terms.p[2] != 0.0 {
                d_seen = true;
            }
        }
        assert!(d_seen);
        // The fault counter settles once the bad sample has drained
        assert_eq!(controller.fault_count(), faults);
    }
}
