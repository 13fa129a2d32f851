//! Raspberry Pi drivers: relays and PWM on GPIO, HC-SR04 sonar, ADS1115 ADC
//! for the pH and EC probes, DS18B20 over the kernel 1-wire driver.
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use rppal::gpio::{Gpio, InputPin, OutputPin};
use rppal::i2c::I2c;
use shrub_traits::{
    BoxError, DoseActuators, DosePump, HydroActuators, SensorError, Sensors, TempUnit, Valve,
};

use crate::error::{HwError, Result};
use crate::util::{ads1115_counts_to_mv, echo_to_cm, find_ds18b20, read_w1_slave, wait_while};

const PWM_HZ: f64 = 100.0;
const W1_DEVICES: &str = "/sys/bus/w1/devices";

/// Pin and bus assignments.
#[derive(Debug, Clone)]
pub struct PiPins {
    pub pump: u8,
    pub top_valve: u8,
    pub bottom_valve: u8,
    pub lamp: u8,
    pub acid_pump: u8,
    pub base_pump: u8,
    pub nutrient_pump: u8,
    pub sonar_trigger: u8,
    pub sonar_echo: u8,
    pub sonar_timeout: Duration,
    pub adc_address: u16,
    pub ph_channel: u8,
    pub ec_channel: u8,
    pub onewire_device: Option<String>,
}

fn gpio_err(e: rppal::gpio::Error) -> HwError {
    HwError::Gpio(e.to_string())
}

fn i2c_err(e: rppal::i2c::Error) -> HwError {
    HwError::I2c(e.to_string())
}

fn output(gpio: &Gpio, pin: u8) -> Result<OutputPin> {
    let mut p = gpio.get(pin).map_err(gpio_err)?.into_output();
    p.set_low();
    Ok(p)
}

fn set(pin: &mut OutputPin, on: bool) {
    if on {
        pin.set_high();
    } else {
        pin.set_low();
    }
}

pub struct PiHydro {
    pump: OutputPin,
    top: OutputPin,
    bottom: OutputPin,
    lamp: OutputPin,
}

impl PiHydro {
    pub fn new(gpio: &Gpio, pins: &PiPins) -> Result<Self> {
        Ok(Self {
            pump: output(gpio, pins.pump)?,
            top: output(gpio, pins.top_valve)?,
            bottom: output(gpio, pins.bottom_valve)?,
            lamp: output(gpio, pins.lamp)?,
        })
    }
}

impl HydroActuators for PiHydro {
    fn set_pump(&mut self, power_percent: u8) -> std::result::Result<(), BoxError> {
        let duty = f64::from(power_percent.min(100)) / 100.0;
        if duty == 0.0 {
            self.pump.clear_pwm().map_err(gpio_err)?;
            self.pump.set_low();
        } else {
            self.pump
                .set_pwm_frequency(PWM_HZ, duty)
                .map_err(gpio_err)?;
        }
        tracing::debug!(power_percent, "channel pump set");
        Ok(())
    }

    fn set_valve(&mut self, which: Valve, open: bool) -> std::result::Result<(), BoxError> {
        match which {
            Valve::Top => set(&mut self.top, open),
            Valve::Bottom => set(&mut self.bottom, open),
        }
        Ok(())
    }

    fn set_lamp(&mut self, on: bool) -> std::result::Result<(), BoxError> {
        set(&mut self.lamp, on);
        Ok(())
    }
}

pub struct PiDose {
    acid: OutputPin,
    base: OutputPin,
    nutrient: OutputPin,
}

impl PiDose {
    pub fn new(gpio: &Gpio, pins: &PiPins) -> Result<Self> {
        Ok(Self {
            acid: output(gpio, pins.acid_pump)?,
            base: output(gpio, pins.base_pump)?,
            nutrient: output(gpio, pins.nutrient_pump)?,
        })
    }
}

impl DoseActuators for PiDose {
    fn set_dose_pump(&mut self, which: DosePump, on: bool) -> std::result::Result<(), BoxError> {
        let pin = match which {
            DosePump::Acid => &mut self.acid,
            DosePump::Base => &mut self.base,
            DosePump::Nutrient => &mut self.nutrient,
        };
        set(pin, on);
        Ok(())
    }
}

/// Single-shot ADS1115 reads at ±4.096 V, 128 SPS.
struct Ads1115 {
    i2c: I2c,
}

impl Ads1115 {
    fn new(address: u16) -> Result<Self> {
        let mut i2c = I2c::new().map_err(i2c_err)?;
        i2c.set_slave_address(address).map_err(i2c_err)?;
        Ok(Self { i2c })
    }

    fn read_mv(&mut self, channel: u8) -> Result<f64> {
        // OS start | single-ended AINx | PGA 4.096 V | single-shot | 128 SPS | comparator off
        let config: u16 =
            0x8000 | (u16::from(4 + (channel & 0x3)) << 12) | (1 << 9) | (1 << 8) | (4 << 5) | 0x3;
        let [hi, lo] = config.to_be_bytes();
        self.i2c.write(&[0x01, hi, lo]).map_err(i2c_err)?;
        sleep(Duration::from_millis(9));
        let mut buf = [0u8; 2];
        self.i2c.write_read(&[0x00], &mut buf).map_err(i2c_err)?;
        Ok(ads1115_counts_to_mv(i16::from_be_bytes(buf)))
    }
}

pub struct PiSensors {
    trigger: OutputPin,
    echo: InputPin,
    echo_timeout: Duration,
    adc: Ads1115,
    ph_channel: u8,
    ec_channel: u8,
    onewire_device: Option<String>,
    // looked up again on each read until the probe shows up
    w1_slave: Option<PathBuf>,
}

impl PiSensors {
    pub fn new(gpio: &Gpio, pins: &PiPins) -> Result<Self> {
        let w1_slave = match find_ds18b20(Path::new(W1_DEVICES), pins.onewire_device.as_deref()) {
            Ok(path) => {
                tracing::info!(path = %path.display(), "DS18B20 selected");
                Some(path)
            }
            Err(e) => {
                tracing::warn!(error = %e, "DS18B20 not found; temperature falls back until it appears");
                None
            }
        };
        Ok(Self {
            trigger: output(gpio, pins.sonar_trigger)?,
            echo: gpio.get(pins.sonar_echo).map_err(gpio_err)?.into_input(),
            echo_timeout: pins.sonar_timeout,
            adc: Ads1115::new(pins.adc_address)?,
            ph_channel: pins.ph_channel,
            ec_channel: pins.ec_channel,
            onewire_device: pins.onewire_device.clone(),
            w1_slave,
        })
    }

    fn read_celsius(&mut self) -> Result<f64> {
        let path = match &self.w1_slave {
            Some(path) => path.clone(),
            None => {
                let path = find_ds18b20(Path::new(W1_DEVICES), self.onewire_device.as_deref())?;
                tracing::info!(path = %path.display(), "DS18B20 selected");
                self.w1_slave = Some(path.clone());
                path
            }
        };
        let reading = read_w1_slave(&path);
        if matches!(reading, Err(HwError::NoDevice(_))) {
            self.w1_slave = None;
        }
        reading
    }

    fn ping(&mut self) -> Result<f64> {
        self.trigger.set_high();
        sleep(Duration::from_micros(10));
        self.trigger.set_low();
        let echo = &self.echo;
        let start = wait_while(
            || echo.is_low(),
            self.echo_timeout,
            Duration::ZERO,
            || HwError::EchoTimeout,
        )?;
        let end = wait_while(
            || echo.is_high(),
            self.echo_timeout,
            Duration::ZERO,
            || HwError::EchoTimeout,
        )?;
        Ok(echo_to_cm(end - start))
    }
}

fn sensor_err(sensor: &'static str, e: HwError) -> SensorError {
    match e {
        HwError::EchoTimeout | HwError::Timeout => SensorError::Timeout(sensor),
        HwError::NoDevice(_) => SensorError::NotDetected(sensor),
        other => SensorError::Io {
            sensor,
            reason: other.to_string(),
        },
    }
}

impl Sensors for PiSensors {
    fn read_distance(&mut self) -> std::result::Result<f64, SensorError> {
        self.ping().map_err(|e| sensor_err("sonar", e))
    }

    fn read_ph_voltage(&mut self) -> std::result::Result<f64, SensorError> {
        self.adc
            .read_mv(self.ph_channel)
            .map_err(|e| sensor_err("pH probe", e))
    }

    fn read_ec_voltage(&mut self) -> std::result::Result<f64, SensorError> {
        self.adc
            .read_mv(self.ec_channel)
            .map_err(|e| sensor_err("EC probe", e))
    }

    fn read_temperature(&mut self, unit: TempUnit) -> std::result::Result<f64, SensorError> {
        self.read_celsius()
            .map(|c| unit.from_celsius(c))
            .map_err(|e| sensor_err("DS18B20", e))
    }
}

/// Open the GPIO controller and build all three driver sets.
pub fn open(pins: &PiPins) -> Result<(PiSensors, PiHydro, PiDose)> {
    let gpio = Gpio::new().map_err(gpio_err)?;
    let sensors = PiSensors::new(&gpio, pins)?;
    let hydro = PiHydro::new(&gpio, pins)?;
    let dose = PiDose::new(&gpio, pins)?;
    tracing::info!(adc = pins.adc_address, "Raspberry Pi I/O ready");
    Ok((sensors, hydro, dose))
}
