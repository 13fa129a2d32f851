#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core reservoir control logic (hardware-agnostic).
//!
//! This crate provides the flood/drain scheduler, the nutrient conditioner,
//! and the signal chain feeding them. All hardware interactions go through
//! the `shrub_traits::Sensors`, `HydroActuators`, and `DoseActuators` traits.
//!
//! ## Architecture
//!
//! - **Timing**: one-shot interval timers driven by an injected clock (`timer`)
//! - **Filtering**: Butterworth low-pass per sensor signal (`filter`)
//! - **Level**: distance-to-height conversion and overflow latch (`level`)
//! - **Hydro**: ten-entry phase table and its state machine (`phase`, `hydro`)
//! - **Dosing**: range checks and dose/settle sequencing (`conditioner`)
//! - **Probes**: pH and EC voltage conversion and calibration (`probe`)
//! - **Controller**: sampling, event routing, and persistence cadence
//!   (`controller`, built via `builder`)
//!
//! Overflow, user override, and test mode are shared between the two state
//! machines only through events routed by the controller.

pub mod builder;
pub mod conditioner;
pub mod config;
pub mod controller;
pub mod conversions;
pub mod error;
pub mod filter;
pub mod hw_error;
pub mod hydro;
pub mod level;
pub mod mocks;
pub mod phase;
pub mod probe;
pub mod safety;
pub mod status;
pub mod timer;
pub mod util;

pub use builder::{Controller, ControllerBuilder, Missing, Set, build_controller};
pub use conditioner::{
    Conditioner, DoseEvent, DoseSettings, DoseState, DoseThresholds, RangeCondition,
};
pub use config::{ControllerCfg, FilterCfg, LevelCfg, ProbeCfg, Settings};
pub use controller::{ControllerCore, Dispatched, TickOutcome};
pub use error::{BuildError, FilterError, Report, Result, ShrubError, TimerError};
pub use filter::LowPassFilter;
pub use hydro::{CycleSnapshot, HydroConfig, HydroEvent, HydroMachine, HydroView};
pub use phase::{HydroSettings, PhaseEntry, PhaseTable, Stage, SubCycle};
pub use probe::{EcBuffer, EcProbe, PhBuffer, PhProbe};
pub use safety::SafetyFlags;
pub use status::{SensorFaults, SensorSnapshot};
pub use timer::{Timer, TimerPoll};
