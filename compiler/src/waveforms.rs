// waveforms.rs — Sampled waveform catalog and complex samples
//
// Waveform-generating builtins are sampled at compile time so the
// printer can size placeholders and the settings layer can upload
// generator/integrator envelopes. Samples are complex: QA cores carry
// complex envelopes, everything else uses the real part.

use std::f64::consts::PI;
use std::ops::{Add, Div, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

use crate::diag::{Error, ErrorKind, Result};

// ── Complex samples ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    pub fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    pub fn real(re: f64) -> Self {
        Self { re, im: 0.0 }
    }

    pub fn abs(self) -> f64 {
        self.re.hypot(self.im)
    }
}

impl Add for Complex {
    type Output = Complex;
    fn add(self, rhs: Complex) -> Complex {
        Complex::new(self.re + rhs.re, self.im + rhs.im)
    }
}

impl Sub for Complex {
    type Output = Complex;
    fn sub(self, rhs: Complex) -> Complex {
        Complex::new(self.re - rhs.re, self.im - rhs.im)
    }
}

impl Mul for Complex {
    type Output = Complex;
    fn mul(self, rhs: Complex) -> Complex {
        Complex::new(
            self.re * rhs.re - self.im * rhs.im,
            self.re * rhs.im + self.im * rhs.re,
        )
    }
}

impl Div for Complex {
    type Output = Complex;
    fn div(self, rhs: Complex) -> Complex {
        let d = rhs.re * rhs.re + rhs.im * rhs.im;
        Complex::new(
            (self.re * rhs.re + self.im * rhs.im) / d,
            (self.im * rhs.re - self.re * rhs.im) / d,
        )
    }
}

impl Neg for Complex {
    type Output = Complex;
    fn neg(self) -> Complex {
        Complex::new(-self.re, -self.im)
    }
}

/// Lift a real sample vector into complex samples.
pub fn to_complex(samples: Vec<f64>) -> Vec<Complex> {
    samples.into_iter().map(Complex::real).collect()
}

// ── Builtin catalogs ─────────────────────────────────────────────────────

/// openpulse builtin functions (frame/pulse level).
pub const OPENPULSE_FUNCTIONS: &[&str] = &[
    "newframe",
    "play",
    "capture_v1",
    "capture_v2",
    "capture_v3",
    "capture_v1_spectrum",
    "set_phase",
    "shift_phase",
    "get_phase",
    "set_frequency",
    "shift_frequency",
    "get_frequency",
];

/// SEQC waveform-generating functions sampled at compile time.
pub const WAVEFORM_FUNCTIONS: &[&str] = &[
    "blackman",
    "chirp",
    "cosine",
    "drag",
    "gauss",
    "hamming",
    "hann",
    "ones",
    "placeholder",
    "ramp",
    "rect",
    "rrc",
    "sawtooth",
    "sinc",
    "sine",
    "triangle",
    "zeros",
];

/// SEQC runtime functions that pass through to the sequencer untouched.
pub const SEQC_FUNCTIONS: &[&str] = &[
    "executeTableEntry",
    "assignWaveIndex",
    "playWave",
    "playZero",
    "playHold",
    "setTrigger",
    "startQA",
    "getZSyncData",
    "join",
    "cut",
];

pub fn is_openpulse_function(name: &str) -> bool {
    OPENPULSE_FUNCTIONS.contains(&name)
}

pub fn is_waveform_function(name: &str) -> bool {
    WAVEFORM_FUNCTIONS.contains(&name)
}

// ── Sampling ─────────────────────────────────────────────────────────────

fn arity(name: &str, args: &[f64], expected: usize) -> Result<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(Error::new(
            ErrorKind::InvalidArgument,
            format!(
                "'{}' expects {} arguments, got {}",
                name,
                expected,
                args.len()
            ),
        ))
    }
}

fn n_samples(name: &str, args: &[f64]) -> Result<usize> {
    let n = *args.first().ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidArgument,
            format!("'{}' requires a sample count", name),
        )
    })?;
    if n < 0.0 || n.fract() != 0.0 {
        return Err(Error::new(
            ErrorKind::InvalidArgument,
            format!("'{}' sample count must be a non-negative integer, got {}", name, n),
        ));
    }
    Ok(n as usize)
}

/// Sample a waveform builtin with numeric arguments.
///
/// The first argument is always the sample count; remaining arguments
/// follow the SEQC convention for each function.
pub fn sample(name: &str, args: &[f64]) -> Result<Vec<f64>> {
    let n = n_samples(name, args)?;
    let grid = |i: usize| i as f64;
    let phase_grid = |i: usize, phase: f64, periods: f64| {
        2.0 * PI * periods * (i as f64) / (n as f64) + phase
    };

    let samples = match name {
        "zeros" | "placeholder" => {
            arity(name, args, 1)?;
            vec![0.0; n]
        }
        "ones" => {
            arity(name, args, 1)?;
            vec![1.0; n]
        }
        "rect" => {
            arity(name, args, 2)?;
            vec![args[1]; n]
        }
        "ramp" => {
            arity(name, args, 3)?;
            let (start, stop) = (args[1], args[2]);
            let step = if n > 1 {
                (stop - start) / (n as f64 - 1.0)
            } else {
                0.0
            };
            (0..n).map(|i| start + step * grid(i)).collect()
        }
        "gauss" => {
            arity(name, args, 4)?;
            let (amp, pos, width) = (args[1], args[2], args[3]);
            (0..n)
                .map(|i| amp * (-((grid(i) - pos).powi(2)) / (2.0 * width * width)).exp())
                .collect()
        }
        "drag" => {
            arity(name, args, 4)?;
            let (amp, pos, width) = (args[1], args[2], args[3]);
            (0..n)
                .map(|i| {
                    let x = grid(i) - pos;
                    -amp * x / width * (-(x * x) / (2.0 * width * width)).exp()
                })
                .collect()
        }
        "sine" => {
            arity(name, args, 4)?;
            let (amp, phase, periods) = (args[1], args[2], args[3]);
            (0..n)
                .map(|i| amp * phase_grid(i, phase, periods).sin())
                .collect()
        }
        "cosine" => {
            arity(name, args, 4)?;
            let (amp, phase, periods) = (args[1], args[2], args[3]);
            (0..n)
                .map(|i| amp * phase_grid(i, phase, periods).cos())
                .collect()
        }
        "sawtooth" => {
            arity(name, args, 4)?;
            let (amp, phase, periods) = (args[1], args[2], args[3]);
            (0..n)
                .map(|i| {
                    let t = phase_grid(i, phase, periods) / (2.0 * PI);
                    amp * 2.0 * (t - (t + 0.5).floor())
                })
                .collect()
        }
        "triangle" => {
            arity(name, args, 4)?;
            let (amp, phase, periods) = (args[1], args[2], args[3]);
            (0..n)
                .map(|i| {
                    let t = phase_grid(i, phase, periods) / (2.0 * PI);
                    amp * (2.0 * (2.0 * (t - (t + 0.5).floor())).abs() - 1.0)
                })
                .collect()
        }
        "sinc" => {
            arity(name, args, 4)?;
            let (amp, pos, beta) = (args[1], args[2], args[3]);
            (0..n)
                .map(|i| {
                    let x = (grid(i) - pos) * beta;
                    if x == 0.0 {
                        amp
                    } else {
                        amp * (PI * x).sin() / (PI * x)
                    }
                })
                .collect()
        }
        "blackman" => {
            arity(name, args, 3)?;
            let (amp, alpha) = (args[1], args[2]);
            let (a0, a1, a2) = ((1.0 - alpha) / 2.0, 0.5, alpha / 2.0);
            (0..n)
                .map(|i| {
                    let x = 2.0 * PI * grid(i) / (n as f64 - 1.0).max(1.0);
                    amp * (a0 - a1 * x.cos() + a2 * (2.0 * x).cos())
                })
                .collect()
        }
        "hamming" => {
            arity(name, args, 2)?;
            let amp = args[1];
            (0..n)
                .map(|i| {
                    let x = 2.0 * PI * grid(i) / (n as f64 - 1.0).max(1.0);
                    amp * (0.54 - 0.46 * x.cos())
                })
                .collect()
        }
        "hann" => {
            arity(name, args, 2)?;
            let amp = args[1];
            (0..n)
                .map(|i| {
                    let x = PI * grid(i) / (n as f64 - 1.0).max(1.0);
                    amp * x.sin() * x.sin()
                })
                .collect()
        }
        "rrc" => {
            arity(name, args, 5)?;
            let (amp, pos, beta, width) = (args[1], args[2], args[3], args[4]);
            (0..n)
                .map(|i| {
                    let t = (grid(i) - pos) / width;
                    let denom = PI * t * (1.0 - (4.0 * beta * t).powi(2));
                    let v = if t == 0.0 {
                        1.0 - beta + 4.0 * beta / PI
                    } else if denom == 0.0 {
                        beta / 2.0_f64.sqrt()
                            * ((1.0 + 2.0 / PI) * (PI / (4.0 * beta)).sin()
                                + (1.0 - 2.0 / PI) * (PI / (4.0 * beta)).cos())
                    } else {
                        ((PI * t * (1.0 - beta)).sin()
                            + 4.0 * beta * t * (PI * t * (1.0 + beta)).cos())
                            / denom
                    };
                    amp * v
                })
                .collect()
        }
        "chirp" => {
            arity(name, args, 5)?;
            let (amp, f_start, f_stop, phase) = (args[1], args[2], args[3], args[4]);
            let rate = (f_stop - f_start) / (2.0 * n as f64);
            (0..n)
                .map(|i| {
                    let t = grid(i);
                    amp * (2.0 * PI * (f_start + rate * t) * t / (n as f64) + phase).sin()
                })
                .collect()
        }
        other => {
            return Err(Error::new(
                ErrorKind::UndeterminedCall,
                format!("attempted sampling an unsupported function: {other}"),
            ))
        }
    };
    Ok(samples)
}
