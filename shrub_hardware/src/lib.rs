//! Reservoir I/O drivers.
//!
//! `SimulatedReservoir` stands in for the whole rig: one shared water model
//! behind three handles implementing `Sensors`, `HydroActuators`, and
//! `DoseActuators`. With the `hardware` feature, `pi` drives the real
//! Raspberry Pi peripherals.
pub mod error;
pub mod util;

#[cfg(feature = "hardware")]
pub mod pi;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use shrub_traits::{
    BoxError, Clock, DoseActuators, DosePump, HydroActuators, SensorError, Sensors, TempUnit,
    Valve,
};

use crate::error::HwError;

/// Rates and starting point of the simulated water model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimParams {
    pub hole_depth_cm: f64,
    /// Rise at 100 % pump power, cm/s.
    pub fill_cm_per_s: f64,
    /// Fall per open valve, cm/s.
    pub drain_cm_per_s: f64,
    /// pH change per second of acid or base pumping.
    pub ph_per_s: f64,
    /// EC rise per second of nutrient pumping, mS/cm.
    pub ec_per_s: f64,
    /// Nutrient uptake, mS/cm per second.
    pub ec_uptake_per_s: f64,
    pub start_height_cm: f64,
    pub start_ph: f64,
    pub start_ec: f64,
    pub temp_c: f64,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            hole_depth_cm: 35.0 * 2.54,
            fill_cm_per_s: 0.2,
            drain_cm_per_s: 0.1,
            ph_per_s: 0.05,
            ec_per_s: 0.02,
            ec_uptake_per_s: 0.000_01,
            start_height_cm: 2.0,
            start_ph: 6.5,
            start_ec: 1.2,
            temp_c: 22.0,
        }
    }
}

/// Which simulated part should start failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimFault {
    Sonar,
    Ph,
    Ec,
    Temp,
    Actuators,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Faults {
    sonar: bool,
    ph: bool,
    ec: bool,
    temp: bool,
    actuators: bool,
}

/// Commanded outputs, as last written by the controller.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SimOutputs {
    pub pump_percent: u8,
    pub top_valve: bool,
    pub bottom_valve: bool,
    pub lamp: bool,
    pub acid: bool,
    pub base: bool,
    pub nutrient: bool,
}

#[derive(Debug)]
struct World {
    params: SimParams,
    height_cm: f64,
    ph: f64,
    ec: f64,
    outputs: SimOutputs,
    faults: Faults,
    last: Instant,
}

impl World {
    fn integrate(&mut self, now: Instant) {
        let dt = now.saturating_duration_since(self.last).as_secs_f64();
        self.last = now;
        if dt == 0.0 {
            return;
        }
        let p = &self.params;
        let o = &self.outputs;
        let open = u8::from(o.top_valve) + u8::from(o.bottom_valve);
        let rise = p.fill_cm_per_s * f64::from(o.pump_percent) / 100.0;
        let fall = p.drain_cm_per_s * f64::from(open);
        self.height_cm = (self.height_cm + (rise - fall) * dt).clamp(0.0, p.hole_depth_cm);

        if o.acid {
            self.ph -= p.ph_per_s * dt;
        }
        if o.base {
            self.ph += p.ph_per_s * dt;
        }
        self.ph = self.ph.clamp(0.0, 14.0);
        if o.nutrient {
            self.ec += p.ec_per_s * dt;
        }
        self.ec = (self.ec - p.ec_uptake_per_s * dt).max(0.0);
    }
}

/// Simulated flood bed with pH and EC probes.
///
/// The model advances lazily from the injected clock whenever a handle is
/// used, so it follows accelerated clocks in tests and dry runs.
#[derive(Clone)]
pub struct SimulatedReservoir {
    world: Rc<RefCell<World>>,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl SimulatedReservoir {
    pub fn new(params: SimParams, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        let world = World {
            params,
            height_cm: params.start_height_cm,
            ph: params.start_ph,
            ec: params.start_ec,
            outputs: SimOutputs::default(),
            faults: Faults::default(),
            last: clock.now(),
        };
        Self {
            world: Rc::new(RefCell::new(world)),
            clock,
        }
    }

    pub fn sensors(&self) -> SimSensors {
        SimSensors(self.clone())
    }

    pub fn hydro(&self) -> SimHydro {
        SimHydro(self.clone())
    }

    pub fn dose(&self) -> SimDose {
        SimDose(self.clone())
    }

    pub fn set_fault(&self, fault: SimFault, failing: bool) {
        let mut w = self.world.borrow_mut();
        let slot = match fault {
            SimFault::Sonar => &mut w.faults.sonar,
            SimFault::Ph => &mut w.faults.ph,
            SimFault::Ec => &mut w.faults.ec,
            SimFault::Temp => &mut w.faults.temp,
            SimFault::Actuators => &mut w.faults.actuators,
        };
        *slot = failing;
        tracing::info!(?fault, failing, "simulated fault changed");
    }

    pub fn set_height_cm(&self, cm: f64) {
        self.with_world(|w| w.height_cm = cm.clamp(0.0, w.params.hole_depth_cm));
    }

    pub fn set_ph(&self, ph: f64) {
        self.with_world(|w| w.ph = ph.clamp(0.0, 14.0));
    }

    pub fn set_ec(&self, ec: f64) {
        self.with_world(|w| w.ec = ec.max(0.0));
    }

    pub fn height_cm(&self) -> f64 {
        self.with_world(|w| w.height_cm)
    }

    pub fn ph(&self) -> f64 {
        self.with_world(|w| w.ph)
    }

    pub fn ec(&self) -> f64 {
        self.with_world(|w| w.ec)
    }

    pub fn outputs(&self) -> SimOutputs {
        self.with_world(|w| w.outputs)
    }

    fn with_world<T>(&self, f: impl FnOnce(&mut World) -> T) -> T {
        let now = self.clock.now();
        let mut w = self.world.borrow_mut();
        w.integrate(now);
        f(&mut w)
    }

    fn command(&self, f: impl FnOnce(&mut SimOutputs)) -> Result<(), BoxError> {
        self.with_world(|w| {
            if w.faults.actuators {
                return Err(Box::new(HwError::Gpio("simulated relay fault".into())) as BoxError);
            }
            f(&mut w.outputs);
            Ok(())
        })
    }
}

impl std::fmt::Debug for SimulatedReservoir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedReservoir")
            .field("world", &self.world.borrow())
            .finish()
    }
}

/// Probe millivolts per pH unit at the default calibration.
const PH_MV_PER_UNIT: f64 = (2032.44 - 1500.0) / 3.0;

#[derive(Debug, Clone)]
pub struct SimSensors(SimulatedReservoir);

impl Sensors for SimSensors {
    fn read_distance(&mut self) -> Result<f64, SensorError> {
        self.0.with_world(|w| {
            if w.faults.sonar {
                return Err(SensorError::Timeout("sonar"));
            }
            Ok(w.params.hole_depth_cm - w.height_cm)
        })
    }

    fn read_ph_voltage(&mut self) -> Result<f64, SensorError> {
        self.0.with_world(|w| {
            if w.faults.ph {
                return Err(SensorError::NotDetected("pH probe"));
            }
            Ok(1500.0 + (7.0 - w.ph) * PH_MV_PER_UNIT)
        })
    }

    fn read_ec_voltage(&mut self) -> Result<f64, SensorError> {
        self.0.with_world(|w| {
            if w.faults.ec {
                return Err(SensorError::NotDetected("EC probe"));
            }
            let at_temp = w.ec * (1.0 + 0.0185 * (w.params.temp_c - 25.0));
            Ok(at_temp * 820.0 * 200.0 / 1000.0)
        })
    }

    fn read_temperature(&mut self, unit: TempUnit) -> Result<f64, SensorError> {
        self.0.with_world(|w| {
            if w.faults.temp {
                return Err(SensorError::Io {
                    sensor: "DS18B20",
                    reason: "CRC check failed".into(),
                });
            }
            Ok(unit.from_celsius(w.params.temp_c))
        })
    }
}

#[derive(Debug, Clone)]
pub struct SimHydro(SimulatedReservoir);

impl HydroActuators for SimHydro {
    fn set_pump(&mut self, power_percent: u8) -> Result<(), BoxError> {
        self.0.command(|o| o.pump_percent = power_percent.min(100))
    }
    fn set_valve(&mut self, which: Valve, open: bool) -> Result<(), BoxError> {
        self.0.command(|o| match which {
            Valve::Top => o.top_valve = open,
            Valve::Bottom => o.bottom_valve = open,
        })
    }
    fn set_lamp(&mut self, on: bool) -> Result<(), BoxError> {
        self.0.command(|o| o.lamp = on)
    }
}

#[derive(Debug, Clone)]
pub struct SimDose(SimulatedReservoir);

impl DoseActuators for SimDose {
    fn set_dose_pump(&mut self, which: DosePump, on: bool) -> Result<(), BoxError> {
        self.0.command(|o| match which {
            DosePump::Acid => o.acid = on,
            DosePump::Base => o.base = on,
            DosePump::Nutrient => o.nutrient = on,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shrub_traits::TestClock;

    #[test]
    fn probes_read_default_calibration_values() {
        let clock = TestClock::new();
        let sim = SimulatedReservoir::new(SimParams::default(), Arc::new(clock));
        sim.set_ph(7.0);
        let mut s = sim.sensors();
        assert!((s.read_ph_voltage().unwrap() - 1500.0).abs() < 1e-9);
        sim.set_ph(4.0);
        assert!((s.read_ph_voltage().unwrap() - 2032.44).abs() < 1e-9);
    }
}
