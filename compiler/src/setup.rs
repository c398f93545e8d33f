// setup.rs — Hardware setup model
//
// Instruments, ports and frames describing the AWG hardware a program
// compiles against. Loaded from JSON; ports are immutable after load,
// frames carry mutable phase/frequency/time state that the interpreter
// advances while walking the program.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::ast::TimeUnit;
use crate::awg::CoreType;
use crate::diag::{Error, ErrorKind, Result};
use crate::duration::Duration;

// ── Instruments and ports ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub serial: String,
}

/// Which sequencing core (and channels on it) a port is wired to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreRef {
    #[serde(rename = "type")]
    pub ty: CoreType,
    pub index: u32,
    pub channels: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub name: String,
    pub instrument: String,
    pub core: CoreRef,
}

// ── Frames ───────────────────────────────────────────────────────────────

/// A software frame tracking phase, frequency and elapsed time on a port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub name: String,
    pub port: String,
    pub frequency: f64,
    pub phase: f64,
    #[serde(default)]
    pub time: Duration,
}

impl Frame {
    pub fn set_phase(&mut self, phase: f64) {
        self.phase = phase;
    }

    pub fn shift_phase(&mut self, delta: f64) {
        self.phase += delta;
    }

    pub fn set_frequency(&mut self, frequency: f64) {
        self.frequency = frequency;
    }

    pub fn shift_frequency(&mut self, delta: f64) {
        self.frequency += delta;
    }

    /// Advance the frame clock by a duration.
    pub fn advance(&mut self, duration: Duration) {
        self.time = self.time + duration;
    }

    /// Advance the frame clock to an absolute time. Going backwards is
    /// an error.
    pub fn advance_to(&mut self, time: Duration) -> Result<()> {
        if time < self.time {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!(
                    "frame '{}' cannot advance backwards: at {}, target {}",
                    self.name, self.time, time
                ),
            ));
        }
        self.time = time;
        Ok(())
    }
}

// ── Setup ────────────────────────────────────────────────────────────────

/// The full hardware description a compilation runs against.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Setup {
    pub instruments: BTreeMap<String, Instrument>,
    pub ports: BTreeMap<String, Port>,
    pub frames: BTreeMap<String, Frame>,
}

impl Setup {
    /// Deserialize and validate a setup from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let setup: Setup = serde_json::from_str(text).map_err(|e| {
            Error::new(ErrorKind::InvalidArgument, format!("malformed setup json: {e}"))
        })?;
        setup.validate()?;
        Ok(setup)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::new(ErrorKind::Unhandled, format!("setup serialization: {e}")))
    }

    /// Cross-reference checks: ports name existing instruments and stay
    /// within their core's channel capacity; frames name existing ports.
    pub fn validate(&self) -> Result<()> {
        for port in self.ports.values() {
            if !self.instruments.contains_key(&port.instrument) {
                return Err(Error::new(
                    ErrorKind::InstrumentNotFound,
                    format!("port '{}' names instrument '{}'", port.name, port.instrument),
                ));
            }
            let capacity = port.core.ty.n_channels();
            for &channel in &port.core.channels {
                if channel == 0 || channel > capacity {
                    return Err(Error::new(
                        ErrorKind::InvalidArgument,
                        format!(
                            "port '{}' channel {} out of range for {} core (1..={})",
                            port.name,
                            channel,
                            port.core.ty.as_str(),
                            capacity
                        ),
                    ));
                }
            }
        }
        for frame in self.frames.values() {
            if !self.ports.contains_key(&frame.port) {
                return Err(Error::new(
                    ErrorKind::PortNotFound,
                    format!("frame '{}' names port '{}'", frame.name, frame.port),
                ));
            }
        }
        Ok(())
    }

    pub fn port(&self, name: &str) -> Result<&Port> {
        self.ports
            .get(name)
            .ok_or_else(|| Error::new(ErrorKind::PortNotFound, format!("'{name}'")))
    }

    pub fn frame(&self, name: &str) -> Result<&Frame> {
        self.frames
            .get(name)
            .ok_or_else(|| Error::new(ErrorKind::IdentifierNotFound, format!("frame '{name}'")))
    }

    pub fn frame_mut(&mut self, name: &str) -> Result<&mut Frame> {
        self.frames
            .get_mut(name)
            .ok_or_else(|| Error::new(ErrorKind::IdentifierNotFound, format!("frame '{name}'")))
    }

    /// The deduplicated set of sequencing cores the ports are wired to.
    pub fn cores(&self) -> BTreeSet<(String, u32, CoreType)> {
        self.ports
            .values()
            .map(|p| (p.instrument.clone(), p.core.index, p.core.ty))
            .collect()
    }

    /// Names of the ports wired to one core.
    pub fn ports_for_core(
        &self,
        instrument: &str,
        index: u32,
        ty: CoreType,
    ) -> BTreeSet<String> {
        self.ports
            .values()
            .filter(|p| p.instrument == instrument && p.core.index == index && p.core.ty == ty)
            .map(|p| p.name.clone())
            .collect()
    }

    /// Advance every listed frame to the latest time among them.
    pub fn barrier(&mut self, frame_names: &[String]) -> Result<()> {
        let latest = frame_names
            .iter()
            .filter_map(|n| self.frames.get(n))
            .map(|f| f.time)
            .fold(Duration::new(0.0, TimeUnit::Dt), |acc, t| {
                if t > acc {
                    t
                } else {
                    acc
                }
            });
        for name in frame_names {
            self.frame_mut(name)?.advance_to(latest)?;
        }
        Ok(())
    }
}
