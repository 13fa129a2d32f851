//! Command implementations: hardware assembly, the scheduler loop, and the
//! one-shot table / self-check / calibration commands.

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel as xch;
use eyre::WrapErr;
use serde_json::json;

use crate::Paths;
use crate::cli::{ProbeKind, json_mode};
use shrub_config::{
    Config, CycleState, ProbeCalibration, UserSettings, load_cycle_state, load_settings_csv,
    save_cycle_state, save_probe_calibration,
};
use shrub_core::error::ShrubError;
use shrub_core::util::format_hms;
use shrub_core::{
    Controller, ControllerCfg, CycleSnapshot, HydroSettings, PhaseTable, ProbeCfg, Settings,
    Timer,
};
use shrub_hardware::{SimFault, SimParams, SimulatedReservoir};
use shrub_traits::{Clock, MonotonicClock, TestClock};

/// UI event queue depth; extra lines block the stdin reader until drained.
const EVENT_QUEUE: usize = 16;

/// Comma-separated simulated faults injected at startup, e.g. `sonar,ph`.
pub const SIM_FAULTS_ENV: &str = "SHRUB_SIM_FAULTS";

/// Upper bound on ticks spent by `self-check` waiting for a usable sample.
const SELF_CHECK_MAX_TICKS: u32 = 100_000;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub max_ticks: Option<u64>,
    pub accelerate: Option<f64>,
    pub stdin_events: bool,
}

/// Time source of the loop and how it waits between ticks.
#[derive(Debug, Clone)]
enum LoopClock {
    Real(MonotonicClock),
    /// Simulated time advanced by one tick per iteration; the loop sleeps
    /// `tick / factor` of real time.
    Accelerated { clock: TestClock, factor: f64 },
}

impl LoopClock {
    fn from_factor(accelerate: Option<f64>) -> eyre::Result<Self> {
        match accelerate {
            None => Ok(Self::Real(MonotonicClock::new())),
            Some(x) if x.is_finite() && x >= 1.0 => Ok(Self::Accelerated {
                clock: TestClock::new(),
                factor: x,
            }),
            Some(x) => eyre::bail!("--accelerate must be a finite factor >= 1, got {x}"),
        }
    }

    fn shared(&self) -> Arc<dyn Clock + Send + Sync> {
        match self {
            Self::Real(c) => Arc::new(*c),
            Self::Accelerated { clock, .. } => Arc::new(clock.clone()),
        }
    }

    fn boxed(&self) -> Box<dyn Clock + Send + Sync> {
        match self {
            Self::Real(c) => Box::new(*c),
            Self::Accelerated { clock, .. } => Box::new(clock.clone()),
        }
    }

    fn pause(&self, tick: Duration) {
        match self {
            Self::Real(c) => c.sleep(tick),
            Self::Accelerated { clock, factor } => {
                clock.advance(tick);
                let real = tick.div_f64(*factor);
                if !real.is_zero() {
                    std::thread::sleep(real);
                }
            }
        }
    }
}

#[cfg(feature = "hardware")]
fn pi_pins(p: &shrub_config::Pins) -> shrub_hardware::pi::PiPins {
    shrub_hardware::pi::PiPins {
        pump: p.pump,
        top_valve: p.top_valve,
        bottom_valve: p.bottom_valve,
        lamp: p.lamp,
        acid_pump: p.acid_pump,
        base_pump: p.base_pump,
        nutrient_pump: p.nutrient_pump,
        sonar_trigger: p.sonar_trigger,
        sonar_echo: p.sonar_echo,
        sonar_timeout: Duration::from_millis(p.sonar_timeout_ms),
        adc_address: p.adc_address,
        ph_channel: p.ph_channel,
        ec_channel: p.ec_channel,
        onewire_device: p.onewire_device.clone(),
    }
}

fn parse_sim_faults(list: &str) -> eyre::Result<Vec<SimFault>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|name| match name.to_ascii_lowercase().as_str() {
            "sonar" => Ok(SimFault::Sonar),
            "ph" => Ok(SimFault::Ph),
            "ec" => Ok(SimFault::Ec),
            "temp" => Ok(SimFault::Temp),
            "actuators" => Ok(SimFault::Actuators),
            _ => eyre::bail!("{SIM_FAULTS_ENV}: unknown fault {name:?}"),
        })
        .collect()
}

/// Build the controller on the Pi when the hardware build has `[pins]`,
/// otherwise on the simulated reservoir.
fn assemble(cfg: &Config, clock: &LoopClock) -> eyre::Result<Controller> {
    let builder = Controller::builder()
        .with_config(ControllerCfg::from(cfg))
        .with_clock(clock.boxed());

    #[cfg(feature = "hardware")]
    if let Some(pins) = &cfg.pins {
        if matches!(clock, LoopClock::Accelerated { .. }) {
            eyre::bail!("--accelerate is only available with the simulated reservoir");
        }
        let (sensors, hydro, dose) =
            shrub_hardware::pi::open(&pi_pins(pins)).wrap_err("open hardware pins")?;
        return builder
            .with_sensors(sensors)
            .with_hydro_actuators(hydro)
            .with_dose_actuators(dose)
            .build();
    }

    let params = SimParams {
        hole_depth_cm: cfg.level.hole_depth_cm,
        ..SimParams::default()
    };
    let sim = SimulatedReservoir::new(params, clock.shared());
    if let Ok(list) = std::env::var(SIM_FAULTS_ENV) {
        for fault in parse_sim_faults(&list)? {
            sim.set_fault(fault, true);
        }
    }
    tracing::info!(hole_depth_cm = params.hole_depth_cm, "using simulated reservoir");
    builder
        .with_sensors(sim.sensors())
        .with_hydro_actuators(sim.hydro())
        .with_dose_actuators(sim.dose())
        .build()
}

fn save_snapshot(path: &Path, snap: CycleSnapshot) -> eyre::Result<()> {
    save_cycle_state(
        path,
        &CycleState {
            phase_index: snap.phase_index,
            remaining_secs: snap.remaining_secs,
        },
    )
}

/// Lines from stdin, trimmed, on a bounded channel. The reader thread exits
/// at EOF or once the receiver is dropped.
fn spawn_stdin_events() -> eyre::Result<xch::Receiver<String>> {
    let (tx, rx) = xch::bounded::<String>(EVENT_QUEUE);
    std::thread::Builder::new()
        .name("shrub-stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                let name = line.trim();
                if name.is_empty() {
                    continue;
                }
                if tx.send(name.to_string()).is_err() {
                    break;
                }
            }
        })
        .wrap_err("spawn stdin reader")?;
    Ok(rx)
}

fn print_status(ctl: &Controller) {
    let lines = ctl.status_lines();
    if json_mode() {
        let snap = ctl.snapshot();
        let s = ctl.last_sample();
        println!(
            "{}",
            json!({
                "phase_index": snap.phase_index,
                "remaining_secs": snap.remaining_secs,
                "height_cm": s.height_cm,
                "ph": s.ph,
                "ec": s.ec,
                "temp_c": s.temp_c,
                "faults": s.faults.names(),
                "lines": lines,
            })
        );
    } else {
        for line in lines {
            println!("{line}");
        }
    }
}

/// Overlay operator settings on `cfg`, warning about every value that had to
/// be pulled into range. Used at startup and on `RELOAD`.
pub fn apply_user_settings(cfg: &mut Config, user: &UserSettings) {
    for c in cfg.apply_settings(user) {
        tracing::warn!(setting = c.label, from = c.from, to = c.to, "operator setting clamped");
    }
}

/// Re-read the operator settings file and hand the result to the controller.
fn reload_settings(ctl: &mut Controller, cfg: &Config, paths: &Paths) -> eyre::Result<()> {
    let path = paths
        .settings
        .as_ref()
        .ok_or_else(|| eyre::eyre!("no settings file configured"))?;
    let user = load_settings_csv(path, cfg.user_settings())?;
    let mut next = cfg.clone();
    apply_user_settings(&mut next, &user);
    ctl.update_settings(Settings::from(&next));
    tracing::info!(path = %path.display(), "operator settings reloaded");
    Ok(())
}

pub fn run(cfg: &Config, paths: &Paths, opts: RunOptions) -> eyre::Result<()> {
    let clock = LoopClock::from_factor(opts.accelerate)?;
    let mut ctl = assemble(cfg, &clock)?;

    match load_cycle_state(&paths.state) {
        Ok(Some(state)) => {
            tracing::info!(
                phase = state.phase_index,
                remaining_s = state.remaining_secs,
                "resuming saved cycle"
            );
            ctl.resume(CycleSnapshot {
                phase_index: state.phase_index,
                remaining_secs: state.remaining_secs,
            });
        }
        Ok(None) => {
            tracing::info!("no saved cycle; starting at phase 0");
            ctl.begin();
        }
        Err(e) => {
            tracing::warn!(error = %e, "saved cycle unreadable; starting at phase 0");
            ctl.begin();
        }
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = shutdown.clone();
        ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
            .wrap_err("install Ctrl-C handler")?;
    }

    let events = if opts.stdin_events {
        Some(spawn_stdin_events()?)
    } else {
        None
    };

    let tick = Duration::from_millis(cfg.runner.tick_ms);
    let shared = clock.shared();
    let mut status = (cfg.runner.status_every_secs > 0)
        .then(|| Timer::new(Duration::from_secs(cfg.runner.status_every_secs)));
    if let Some(t) = status.as_mut() {
        t.start(shared.now());
    }

    let mut ticks: u64 = 0;
    let mut saves: u64 = 0;
    let mut dispatched: u64 = 0;

    while !shutdown.load(Ordering::Relaxed) {
        if let Some(max) = opts.max_ticks
            && ticks >= max
        {
            break;
        }

        if let Some(rx) = &events {
            for name in rx.try_iter() {
                if name.eq_ignore_ascii_case("RELOAD") {
                    if let Err(e) = reload_settings(&mut ctl, cfg, paths) {
                        tracing::warn!(error = %e, "settings reload failed");
                    }
                    continue;
                }
                let routed = ctl.dispatch_named(&name);
                tracing::info!(event = %name, routed = routed.len(), "UI event");
                dispatched += routed.len() as u64;
            }
        }

        let outcome = ctl.tick();
        ticks += 1;
        dispatched += outcome.dispatched.len() as u64;

        if let Some(snap) = outcome.save {
            match save_snapshot(&paths.state, snap) {
                Ok(()) => saves += 1,
                Err(e) => tracing::warn!(error = %e, "cycle state not saved"),
            }
        }

        if let Some(t) = status.as_mut() {
            let now = shared.now();
            if t.poll(now).is_due() {
                t.start(now);
                print_status(&ctl);
            }
        }

        clock.pause(tick);
    }

    let snap = ctl.shutdown();
    save_snapshot(&paths.state, snap).wrap_err("save cycle state on shutdown")?;
    saves += 1;

    if json_mode() {
        println!(
            "{}",
            json!({
                "event": "stopped",
                "ticks": ticks,
                "dispatched": dispatched,
                "saves": saves,
                "phase_index": snap.phase_index,
                "remaining_secs": snap.remaining_secs,
            })
        );
    } else {
        println!(
            "stopped after {ticks} ticks: phase {} with {:.0} s left, state saved to {}",
            snap.phase_index + 1,
            snap.remaining_secs,
            paths.state.display()
        );
    }
    Ok(())
}

pub fn print_table(cfg: &Config) -> eyre::Result<()> {
    let (settings, clamped) = HydroSettings::from(&cfg.hydro).sanitized();
    for c in &clamped {
        tracing::warn!(field = c.field, from = c.from, to = c.to, "timing clamped");
    }
    let table = PhaseTable::build(&settings);

    if json_mode() {
        let rows: Vec<_> = table
            .entries()
            .iter()
            .enumerate()
            .map(|(i, e)| {
                json!({
                    "index": i,
                    "sub_cycle": format!("{:?}", e.sub_cycle),
                    "stage": e.stage.name(),
                    "pump": e.pump_on,
                    "top_valve": e.top_valve,
                    "bottom_valve": e.bottom_valve,
                    "secs": e.duration.as_secs_f64(),
                })
            })
            .collect();
        println!("{}", serde_json::Value::Array(rows));
        return Ok(());
    }

    let on = |b: bool| if b { "on" } else { "-" };
    println!("  # sub stage     pump top bottom duration");
    for (i, e) in table.entries().iter().enumerate() {
        println!(
            "{:>3} {:<3} {:<9} {:<4} {:<3} {:<6} {}",
            i + 1,
            format!("{:?}", e.sub_cycle),
            e.stage.name(),
            on(e.pump_on),
            on(e.top_valve),
            on(e.bottom_valve),
            format_hms(e.duration)
        );
    }
    println!("cycle: {}", format_hms(table.cycle_duration()));
    Ok(())
}

/// Warm the filters, take one full sample, print the status, and fail if any
/// sensor could not be read.
pub fn self_check(cfg: &Config) -> eyre::Result<()> {
    let clock = LoopClock::Accelerated {
        clock: TestClock::new(),
        factor: f64::INFINITY,
    };
    #[cfg(feature = "hardware")]
    let clock = if cfg.pins.is_some() {
        LoopClock::Real(MonotonicClock::new())
    } else {
        clock
    };

    let mut ctl = assemble(cfg, &clock)?;
    ctl.begin();

    let tick = Duration::from_millis(cfg.runner.tick_ms);
    let mut sampled = false;
    for _ in 0..SELF_CHECK_MAX_TICKS {
        let warming = ctl.is_warming_up();
        let outcome = ctl.tick();
        if outcome.sampled && !warming {
            sampled = true;
            break;
        }
        clock.pause(tick);
    }
    ctl.shutdown();

    if !sampled {
        return Err(eyre::Report::new(ShrubError::Sensor(
            "no sample taken; check filter.sample_rate_hz and runner.tick_ms".into(),
        )));
    }

    print_status(&ctl);
    let faults = ctl.last_sample().faults;
    if faults.any() {
        return Err(eyre::Report::new(ShrubError::Sensor(format!(
            "failed: {}",
            faults.names().join(", ")
        ))));
    }
    if !json_mode() {
        println!("self-check OK");
    }
    Ok(())
}

fn calibration_path(paths: &Paths) -> eyre::Result<&Path> {
    paths.calibration.as_deref().ok_or_else(|| {
        eyre::eyre!("no calibration file; pass --calibration or set persistence.calibration_file")
    })
}

fn store(path: &Path, probes: &ProbeCfg) -> eyre::Result<()> {
    save_probe_calibration(
        path,
        &ProbeCalibration {
            ph_neutral_mv: probes.ph.neutral_mv,
            ph_acid_mv: probes.ph.acid_mv,
            ec_k_low: probes.ec.k_low,
            ec_k_high: probes.ec.k_high,
        },
    )
}

pub fn calibrate_ph(cfg: &Config, paths: &Paths, mv: f64) -> eyre::Result<()> {
    let path = calibration_path(paths)?;
    let mut probes = ProbeCfg::from(&cfg.probes);
    let buffer = probes.ph.calibrate(mv)?;
    store(path, &probes)?;
    tracing::info!(buffer = ?buffer, mv, path = %path.display(), "pH calibration saved");

    if json_mode() {
        println!(
            "{}",
            json!({ "probe": "ph", "buffer_ph": buffer.ph(), "mv": mv })
        );
    } else {
        println!("pH {:.2} buffer recorded at {mv:.1} mV", buffer.ph());
    }
    Ok(())
}

pub fn calibrate_ec(cfg: &Config, paths: &Paths, mv: f64, temp_c: f64) -> eyre::Result<()> {
    let path = calibration_path(paths)?;
    let mut probes = ProbeCfg::from(&cfg.probes);
    let buffer = probes.ec.calibrate(mv, temp_c)?;
    store(path, &probes)?;
    tracing::info!(buffer = ?buffer, mv, temp_c, path = %path.display(), "EC calibration saved");

    let k = match buffer {
        shrub_core::EcBuffer::Low => probes.ec.k_low,
        shrub_core::EcBuffer::High => probes.ec.k_high,
    };
    if json_mode() {
        println!(
            "{}",
            json!({ "probe": "ec", "buffer_ms_per_cm": buffer.ms_per_cm(), "mv": mv, "k": k })
        );
    } else {
        println!(
            "EC {:.3} mS/cm buffer recorded at {mv:.1} mV (K = {k:.3})",
            buffer.ms_per_cm()
        );
    }
    Ok(())
}

pub fn calibrate_reset(cfg: &Config, paths: &Paths, probe: ProbeKind) -> eyre::Result<()> {
    let path = calibration_path(paths)?;
    let mut probes = ProbeCfg::from(&cfg.probes);
    let reset_ph = matches!(probe, ProbeKind::Ph | ProbeKind::All);
    let reset_ec = matches!(probe, ProbeKind::Ec | ProbeKind::All);
    if reset_ph {
        probes.ph.reset();
    }
    if reset_ec {
        probes.ec.reset();
    }
    store(path, &probes)?;
    tracing::info!(?probe, path = %path.display(), "probe calibration reset");

    if json_mode() {
        println!(
            "{}",
            json!({ "reset_ph": reset_ph, "reset_ec": reset_ec, "path": path.display().to_string() })
        );
    } else {
        if reset_ph {
            println!(
                "pH calibration reset: neutral {:.2} mV, acid {:.2} mV",
                probes.ph.neutral_mv, probes.ph.acid_mv
            );
        }
        if reset_ec {
            println!(
                "EC calibration reset: K low {:.3}, K high {:.3}",
                probes.ec.k_low, probes.ec.k_high
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_fault_list_parses() {
        assert_eq!(
            parse_sim_faults(" Sonar, ec ,").unwrap(),
            vec![SimFault::Sonar, SimFault::Ec]
        );
        assert!(parse_sim_faults("").unwrap().is_empty());
        assert!(parse_sim_faults("pump").is_err());
    }

    #[test]
    fn accelerate_must_be_at_least_real_time() {
        assert!(LoopClock::from_factor(Some(0.5)).is_err());
        assert!(LoopClock::from_factor(Some(f64::NAN)).is_err());
        assert!(matches!(
            LoopClock::from_factor(Some(10.0)),
            Ok(LoopClock::Accelerated { .. })
        ));
    }

    #[test]
    fn accelerated_pause_advances_simulated_time() {
        let clock = LoopClock::from_factor(Some(1000.0)).unwrap();
        let shared = clock.shared();
        let t0 = shared.now();
        clock.pause(Duration::from_millis(500));
        assert_eq!(shared.now() - t0, Duration::from_millis(500));
    }
}
