use core::str::FromStr;

/// Per-axis tuning bytes, scaled into working gains by the gain deriver.
#[derive(Copy, Clone, Default, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pid {
    pub p: u8,
    pub i: u8,
    pub d: u8,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum DtermFilterType {
    Pt1,
    Biquad,
    Denoise,
}

impl Default for DtermFilterType {
    fn default() -> Self {
        Self::Biquad
    }
}

impl FromStr for DtermFilterType {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, ()> {
        match string {
            "pt1" => Ok(Self::Pt1),
            "biquad" => Ok(Self::Biquad),
            "denoise" => Ok(Self::Denoise),
            _ => Err(()),
        }
    }
}

/// D-term and yaw P-term filtering, frequencies in Hz. A zero frequency
/// disables the path.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FilterConfig {
    pub dterm_notch_hz: u16,
    pub dterm_notch_cutoff: u16,
    pub dterm_lpf_hz: u16,
    pub dterm_filter_type: DtermFilterType,
    pub yaw_lpf_hz: u16,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            dterm_notch_hz: 260,
            dterm_notch_cutoff: 160,
            dterm_lpf_hz: 100,
            dterm_filter_type: DtermFilterType::Biquad,
            yaw_lpf_hz: 0,
        }
    }
}

/// Angle/horizon self-leveling: gain bytes plus stick-to-angle scaling.
/// `gains.d` sets the horizon fade-out, zero keeps self-level at full
/// strength regardless of stick deflection.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LevelConfig {
    pub gains: Pid,
    /// Desired lean angle per full stick deflection, degrees.
    pub sensitivity: u8,
    /// Maximum commanded inclination, degrees.
    pub angle_limit: u8,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self { gains: Pid { p: 50, i: 50, d: 100 }, sensitivity: 55, angle_limit: 55 }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PidProfile {
    pub roll: Pid,
    pub pitch: Pid,
    pub yaw: Pid,
    pub level: LevelConfig,
    pub filters: FilterConfig,
    /// Derivative setpoint weight byte, 127 ≙ weight 1.0.
    pub dterm_setpoint_weight: u8,
    /// Percentage; below 100 the setpoint weight is relaxed by stick deflection.
    pub setpoint_relax_ratio: u8,
    /// Percentage of motor-mix authority at which integration starts shrinking.
    pub iterm_windup_point: u8,
    /// Roll/pitch setpoint slew limit, thousands of deg/s², zero disables.
    pub rate_accel_limit: u16,
    /// Yaw setpoint slew limit, thousands of deg/s², zero disables.
    pub yaw_rate_accel_limit: u16,
}

impl Default for PidProfile {
    fn default() -> Self {
        Self {
            roll: Pid { p: 44, i: 40, d: 20 },
            pitch: Pid { p: 58, i: 50, d: 22 },
            yaw: Pid { p: 70, i: 45, d: 20 },
            level: LevelConfig::default(),
            filters: FilterConfig::default(),
            dterm_setpoint_weight: 60,
            setpoint_relax_ratio: 100,
            iterm_windup_point: 50,
            rate_accel_limit: 0,
            yaw_rate_accel_limit: 10,
        }
    }
}

impl PidProfile {
    pub fn gains(&self, axis: crate::types::Axis) -> Pid {
        match axis {
            crate::types::Axis::Roll => self.roll,
            crate::types::Axis::Pitch => self.pitch,
            crate::types::Axis::Yaw => self.yaw,
        }
    }
}

mod test {
    #[test]
    fn test_filter_type_from_str() {
        use core::str::FromStr;

        use super::DtermFilterType;

        assert_eq!(DtermFilterType::from_str("pt1"), Ok(DtermFilterType::Pt1));
        assert_eq!(DtermFilterType::from_str("biquad"), Ok(DtermFilterType::Biquad));
        assert_eq!(DtermFilterType::from_str("denoise"), Ok(DtermFilterType::Denoise));
        assert_eq!(DtermFilterType::from_str("fir"), Err(()));
    }
}
