//! Test doubles for shrub_core.
//!
//! Each double is a cheap handle over shared state, so a test can keep a
//! clone while the controller owns another and inspect what was commanded.

use std::cell::RefCell;
use std::rc::Rc;

use shrub_traits::{
    BoxError, DoseActuators, DosePump, HydroActuators, SensorError, Sensors, TempUnit, Valve,
};

/// Probe voltage that reads exactly pH 7 with default calibration.
pub const NEUTRAL_PH_MV: f64 = 1500.0;

/// Conductivity probe voltage for `ms_per_cm` at 25 °C with K = 1.
pub fn ec_mv_for(ms_per_cm: f64) -> f64 {
    ms_per_cm * 820.0 * 200.0 / 1000.0
}

/// Distance reading that puts the water `height_cm` above the floor.
pub fn distance_for_height(height_cm: f64) -> f64 {
    crate::level::HOLE_DEPTH_CM - height_cm
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct SensorValues {
    distance_cm: Option<f64>,
    ph_mv: Option<f64>,
    ec_mv: Option<f64>,
    temp_c: Option<f64>,
}

/// Sensors returning whatever the test last set; `None` means a failed read.
#[derive(Debug, Clone)]
pub struct FixedSensors {
    values: Rc<RefCell<SensorValues>>,
}

impl FixedSensors {
    pub fn new(distance_cm: f64, ph_mv: f64, ec_mv: f64, temp_c: f64) -> Self {
        Self {
            values: Rc::new(RefCell::new(SensorValues {
                distance_cm: Some(distance_cm),
                ph_mv: Some(ph_mv),
                ec_mv: Some(ec_mv),
                temp_c: Some(temp_c),
            })),
        }
    }

    /// Low water, pH 7, EC 1.0 mS/cm, 25 °C.
    pub fn healthy() -> Self {
        Self::new(distance_for_height(5.0), NEUTRAL_PH_MV, ec_mv_for(1.0), 25.0)
    }

    pub fn set_distance(&self, cm: Option<f64>) {
        self.values.borrow_mut().distance_cm = cm;
    }

    pub fn set_height(&self, cm: f64) {
        self.set_distance(Some(distance_for_height(cm)));
    }

    pub fn set_ph_mv(&self, mv: Option<f64>) {
        self.values.borrow_mut().ph_mv = mv;
    }

    pub fn set_ec_mv(&self, mv: Option<f64>) {
        self.values.borrow_mut().ec_mv = mv;
    }

    pub fn set_temp_c(&self, c: Option<f64>) {
        self.values.borrow_mut().temp_c = c;
    }
}

impl Sensors for FixedSensors {
    fn read_distance(&mut self) -> Result<f64, SensorError> {
        self.values
            .borrow()
            .distance_cm
            .ok_or(SensorError::NotDetected("sonar"))
    }
    fn read_ph_voltage(&mut self) -> Result<f64, SensorError> {
        self.values
            .borrow()
            .ph_mv
            .ok_or(SensorError::NotDetected("pH probe"))
    }
    fn read_ec_voltage(&mut self) -> Result<f64, SensorError> {
        self.values
            .borrow()
            .ec_mv
            .ok_or(SensorError::NotDetected("EC probe"))
    }
    fn read_temperature(&mut self, unit: TempUnit) -> Result<f64, SensorError> {
        self.values
            .borrow()
            .temp_c
            .map(|c| unit.from_celsius(c))
            .ok_or(SensorError::NotDetected("temperature probe"))
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HydroLog {
    pub pump_percent: u8,
    pub top_valve: bool,
    pub bottom_valve: bool,
    pub lamp: bool,
    pub writes: usize,
    pub failures: usize,
}

/// Hydro actuators that remember the last command; optionally fail.
#[derive(Debug, Default, Clone)]
pub struct RecordingHydro {
    log: Rc<RefCell<HydroLog>>,
    fail: Rc<RefCell<bool>>,
}

impl RecordingHydro {
    pub fn state(&self) -> HydroLog {
        self.log.borrow().clone()
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.borrow_mut() = fail;
    }

    fn record(&self, f: impl FnOnce(&mut HydroLog)) -> Result<(), BoxError> {
        let mut log = self.log.borrow_mut();
        log.writes += 1;
        if *self.fail.borrow() {
            log.failures += 1;
            return Err("relay board not responding".into());
        }
        f(&mut log);
        Ok(())
    }
}

impl HydroActuators for RecordingHydro {
    fn set_pump(&mut self, power_percent: u8) -> Result<(), BoxError> {
        self.record(|l| l.pump_percent = power_percent)
    }
    fn set_valve(&mut self, which: Valve, open: bool) -> Result<(), BoxError> {
        self.record(|l| match which {
            Valve::Top => l.top_valve = open,
            Valve::Bottom => l.bottom_valve = open,
        })
    }
    fn set_lamp(&mut self, on: bool) -> Result<(), BoxError> {
        self.record(|l| l.lamp = on)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DoseLog {
    pub acid: bool,
    pub base: bool,
    pub nutrient: bool,
    /// Every transition to on, in order.
    pub activations: Vec<DosePump>,
    /// Most pumps ever on at the same time.
    pub peak_on: usize,
}

impl DoseLog {
    pub fn is_on(&self, pump: DosePump) -> bool {
        match pump {
            DosePump::Acid => self.acid,
            DosePump::Base => self.base,
            DosePump::Nutrient => self.nutrient,
        }
    }

    pub fn on_count(&self) -> usize {
        [self.acid, self.base, self.nutrient]
            .iter()
            .filter(|on| **on)
            .count()
    }
}

#[derive(Debug, Default, Clone)]
pub struct RecordingDose {
    log: Rc<RefCell<DoseLog>>,
}

impl RecordingDose {
    pub fn state(&self) -> DoseLog {
        self.log.borrow().clone()
    }
}

impl DoseActuators for RecordingDose {
    fn set_dose_pump(&mut self, which: DosePump, on: bool) -> Result<(), BoxError> {
        let mut log = self.log.borrow_mut();
        let slot = match which {
            DosePump::Acid => &mut log.acid,
            DosePump::Base => &mut log.base,
            DosePump::Nutrient => &mut log.nutrient,
        };
        let was_on = *slot;
        *slot = on;
        if on && !was_on {
            log.activations.push(which);
        }
        log.peak_on = log.peak_on.max(log.on_count());
        Ok(())
    }
}
