pub mod clock;

pub use clock::{Clock, MonotonicClock, TestClock};

use thiserror::Error;

/// Error type for actuator calls crossing the trait boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure reading a physical sensor.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SensorError {
    #[error("{0} not detected")]
    NotDetected(&'static str),
    #[error("{0} read timed out")]
    Timeout(&'static str),
    #[error("{sensor}: {reason}")]
    Io { sensor: &'static str, reason: String },
}

/// Unit requested from the temperature probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TempUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TempUnit {
    pub fn from_celsius(self, c: f64) -> f64 {
        match self {
            TempUnit::Celsius => c,
            TempUnit::Fahrenheit => c * 9.0 / 5.0 + 32.0,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            TempUnit::Celsius => "C",
            TempUnit::Fahrenheit => "F",
        }
    }
}

/// The two drain valves of the grow channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Valve {
    Top,
    Bottom,
}

/// The three conditioning pumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DosePump {
    Acid,
    Base,
    Nutrient,
}

impl DosePump {
    pub const ALL: [DosePump; 3] = [DosePump::Acid, DosePump::Base, DosePump::Nutrient];

    pub fn name(self) -> &'static str {
        match self {
            DosePump::Acid => "acid",
            DosePump::Base => "base",
            DosePump::Nutrient => "nutrient",
        }
    }
}

/// Raw sensor provider. Every read may fail; callers substitute fallbacks.
pub trait Sensors {
    /// Distance from the sonar to the water surface in cm.
    fn read_distance(&mut self) -> Result<f64, SensorError>;
    /// pH probe output in millivolts.
    fn read_ph_voltage(&mut self) -> Result<f64, SensorError>;
    /// Conductivity probe output in millivolts.
    fn read_ec_voltage(&mut self) -> Result<f64, SensorError>;
    fn read_temperature(&mut self, unit: TempUnit) -> Result<f64, SensorError>;
}

/// Outputs owned by the flood/drain machine.
pub trait HydroActuators {
    /// Channel pump drive in percent, `0..=100`.
    fn set_pump(&mut self, power_percent: u8) -> Result<(), BoxError>;
    fn set_valve(&mut self, which: Valve, open: bool) -> Result<(), BoxError>;
    fn set_lamp(&mut self, on: bool) -> Result<(), BoxError>;
}

/// Outputs owned by the conditioner.
pub trait DoseActuators {
    fn set_dose_pump(&mut self, which: DosePump, on: bool) -> Result<(), BoxError>;
}

impl<T: Sensors + ?Sized> Sensors for Box<T> {
    fn read_distance(&mut self) -> Result<f64, SensorError> {
        (**self).read_distance()
    }
    fn read_ph_voltage(&mut self) -> Result<f64, SensorError> {
        (**self).read_ph_voltage()
    }
    fn read_ec_voltage(&mut self) -> Result<f64, SensorError> {
        (**self).read_ec_voltage()
    }
    fn read_temperature(&mut self, unit: TempUnit) -> Result<f64, SensorError> {
        (**self).read_temperature(unit)
    }
}

impl<T: HydroActuators + ?Sized> HydroActuators for Box<T> {
    fn set_pump(&mut self, power_percent: u8) -> Result<(), BoxError> {
        (**self).set_pump(power_percent)
    }
    fn set_valve(&mut self, which: Valve, open: bool) -> Result<(), BoxError> {
        (**self).set_valve(which, open)
    }
    fn set_lamp(&mut self, on: bool) -> Result<(), BoxError> {
        (**self).set_lamp(on)
    }
}

impl<T: DoseActuators + ?Sized> DoseActuators for Box<T> {
    fn set_dose_pump(&mut self, which: DosePump, on: bool) -> Result<(), BoxError> {
        (**self).set_dose_pump(which, on)
    }
}
