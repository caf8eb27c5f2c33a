use core::str::FromStr;

#[derive(Copy, Clone, Eq, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(usize)]
pub enum Axis {
    Roll = 0,
    Pitch,
    Yaw,
}

impl Axis {
    pub const LIST: [Axis; 3] = [Axis::Roll, Axis::Pitch, Axis::Yaw];
}

impl FromStr for Axis {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, ()> {
        match string {
            "roll" => Ok(Self::Roll),
            "pitch" => Ok(Self::Pitch),
            "yaw" => Ok(Self::Yaw),
            _ => Err(()),
        }
    }
}

#[derive(Copy, Clone, Eq, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlightMode {
    Rate,
    Angle,
    Horizon,
}

impl Default for FlightMode {
    fn default() -> Self {
        Self::Rate
    }
}

impl FromStr for FlightMode {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, ()> {
        match string {
            "rate" => Ok(Self::Rate),
            "angle" => Ok(Self::Angle),
            "horizon" => Ok(Self::Horizon),
            _ => Err(()),
        }
    }
}

/// Estimated orientation in degrees, roll and pitch only. Yaw is rate-only
/// and never consulted for leveling.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Attitude {
    pub roll: f32,
    pub pitch: f32,
}

impl Attitude {
    pub fn new(roll: f32, pitch: f32) -> Self {
        Self { roll, pitch }
    }

    pub fn axis(&self, axis: Axis) -> f32 {
        match axis {
            Axis::Roll => self.roll,
            _ => self.pitch,
        }
    }
}
