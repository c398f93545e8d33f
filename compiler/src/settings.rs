// settings.rs — Instrument settings that cannot be expressed in SEQC
//
// Each sequencing core carries configuration the sequencer program
// itself cannot set: operation modes, result lengths, integration
// weights, output routing. These are emitted as node-path/value pairs
// ready for upload to the instrument alongside the compiled program.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::waveforms::Complex;

// ── Value model ──────────────────────────────────────────────────────────

/// Value of a single instrument node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SettingValue {
    Int(i64),
    Float(f64),
    Samples(Vec<Complex>),
}

impl From<i64> for SettingValue {
    fn from(v: i64) -> Self {
        SettingValue::Int(v)
    }
}

impl From<f64> for SettingValue {
    fn from(v: f64) -> Self {
        SettingValue::Float(v)
    }
}

impl From<Vec<Complex>> for SettingValue {
    fn from(v: Vec<Complex>) -> Self {
        SettingValue::Samples(v)
    }
}

pub type Setting = (String, SettingValue);

// ── Enumerated node values ───────────────────────────────────────────────

/// Source of the QA readout result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadoutSource {
    /// Complex-valued weighted-integration results.
    Integration,
    /// Results after state discrimination.
    Discrimination,
}

impl ReadoutSource {
    fn value(self) -> i64 {
        match self {
            ReadoutSource::Integration => 1,
            ReadoutSource::Discrimination => 3,
        }
    }
}

/// Operation mode of a QA core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Spectroscopy,
    Readout,
}

impl Mode {
    fn value(self) -> i64 {
        match self {
            Mode::Spectroscopy => 0,
            Mode::Readout => 1,
        }
    }

    fn node_name(self) -> &'static str {
        match self {
            Mode::Spectroscopy => "SPECTROSCOPY",
            Mode::Readout => "READOUT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpectroscopyMode {
    Continuous,
    Pulsed,
}

impl SpectroscopyMode {
    fn value(self) -> i64 {
        match self {
            SpectroscopyMode::Continuous => 0,
            SpectroscopyMode::Pulsed => 1,
        }
    }
}

/// Cyclic: record a full sweep, then average with the next sweep.
/// Sequential: average each point before moving to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AveragingMode {
    Cyclic,
    Sequential,
}

impl AveragingMode {
    fn value(self) -> i64 {
        match self {
            AveragingMode::Cyclic => 0,
            AveragingMode::Sequential => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClockSource {
    Internal,
    External,
    Zsync,
}

impl ClockSource {
    fn value(self) -> i64 {
        match self {
            ClockSource::Internal => 0,
            ClockSource::External => 1,
            ClockSource::Zsync => 2,
        }
    }
}

/// HDAWG output signal path after the DAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputPath {
    Amplified,
    Direct,
}

impl OutputPath {
    fn value(self) -> i64 {
        match self {
            OutputPath::Amplified => 0,
            OutputPath::Direct => 1,
        }
    }
}

// ── SHFQA ────────────────────────────────────────────────────────────────

/// Per-discriminator readout configuration, populated while printing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Readout {
    pub index: i64,
    pub generator_wfm: Vec<Complex>,
    pub integrator_wfm: Vec<Complex>,
    /// Only the real component of the integration result is thresholded.
    pub threshold: f64,
}

impl Readout {
    fn settings(&self) -> Vec<Setting> {
        vec![
            (
                format!("/GENERATOR/WAVEFORMS/{}/WAVE", self.index),
                self.generator_wfm.clone().into(),
            ),
            (
                format!("/READOUT/INTEGRATION/WEIGHTS/{}/WAVE", self.index),
                self.integrator_wfm.clone().into(),
            ),
            (
                format!("/READOUT/DISCRIMINATORS/{}/THRESHOLD", self.index),
                self.threshold.into(),
            ),
        ]
    }
}

/// Spectroscopy envelope and acquisition window, used for waveform
/// capture (`capture_v3`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    pub envelope_wfm: Vec<Complex>,
    /// Number of samples to acquire at 2 GS/s.
    pub integration_time: i64,
    pub mode: SpectroscopyMode,
}

impl Spectrum {
    fn settings(&self) -> Vec<Setting> {
        vec![
            ("/SPECTROSCOPY/ENVELOPE/ENABLE".to_string(), self.mode.value().into()),
            (
                "/SPECTROSCOPY/ENVELOPE/WAVE".to_string(),
                self.envelope_wfm.clone().into(),
            ),
            ("/SPECTROSCOPY/LENGTH".to_string(), self.integration_time.into()),
        ]
    }
}

/// Settings for one SHFQA qachannel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShfqaCore {
    /// qachannel number (1-4).
    pub channel: u32,
    pub readouts: BTreeMap<i64, Readout>,
    pub spectra: BTreeMap<i64, Spectrum>,
    pub generator_delay: f64,
    pub integrator_delay: f64,
    pub mode: Mode,
    pub num_averages: i64,
    pub points_to_record: i64,
    pub averaging_mode: AveragingMode,
    pub readout_source: ReadoutSource,
    pub enable_scope: bool,
    /// When false the acquisition records every shot and the hardware
    /// averager is disabled.
    pub average_shots: bool,
    pub clock_source: ClockSource,
}

impl ShfqaCore {
    pub fn new(channel: u32) -> Self {
        Self {
            channel,
            readouts: BTreeMap::new(),
            spectra: BTreeMap::new(),
            generator_delay: 0.0,
            integrator_delay: 0.0,
            mode: Mode::Readout,
            num_averages: 1,
            points_to_record: 1,
            averaging_mode: AveragingMode::Sequential,
            readout_source: ReadoutSource::Discrimination,
            enable_scope: false,
            average_shots: true,
            clock_source: ClockSource::Zsync,
        }
    }

    pub fn settings(&self) -> Vec<Setting> {
        let prefix = format!("/QACHANNELS/{}", self.channel - 1);
        let mode_str = self.mode.node_name();
        let result_length = if self.average_shots {
            self.points_to_record
        } else {
            self.points_to_record * self.num_averages
        };
        let mut settings: Vec<Setting> = vec![
            (format!("{prefix}/MODE"), self.mode.value().into()),
            (format!("{prefix}/INPUT/ON"), 1.into()),
            (format!("{prefix}/OUTPUT/ON"), 1.into()),
            (format!("{prefix}/{mode_str}/RESULT/LENGTH"), result_length.into()),
            (
                format!("{prefix}/{mode_str}/RESULT/MODE"),
                self.averaging_mode.value().into(),
            ),
            (
                format!("{prefix}/{mode_str}/RESULT/AVERAGES"),
                if self.average_shots { self.num_averages } else { 1 }.into(),
            ),
            (
                "/SYSTEM/CLOCKS/REFERENCECLOCK/IN/SOURCE".to_string(),
                self.clock_source.value().into(),
            ),
        ];
        let trigger_channel = 32 + i64::from(self.channel) - 1;
        let integration_time = match self.mode {
            Mode::Readout => {
                let integration_time = self
                    .readouts
                    .values()
                    .map(|r| r.generator_wfm.len() as i64)
                    .max()
                    .unwrap_or(1);
                settings.extend([
                    (
                        format!("{prefix}/GENERATOR/AUXTRIGGERS/0/CHANNEL"),
                        trigger_channel.into(),
                    ),
                    (format!("{prefix}/GENERATOR/CLEARWAVE"), 1.into()),
                    (format!("{prefix}/GENERATOR/DELAY"), self.generator_delay.into()),
                    (format!("{prefix}/READOUT/INTEGRATION/CLEARWEIGHT"), 1.into()),
                    (
                        format!("{prefix}/READOUT/INTEGRATION/DELAY"),
                        self.integrator_delay.into(),
                    ),
                    (
                        format!("{prefix}/READOUT/INTEGRATION/LENGTH"),
                        integration_time.into(),
                    ),
                    (
                        format!("{prefix}/READOUT/RESULT/SOURCE"),
                        self.readout_source.value().into(),
                    ),
                    (format!("{prefix}/READOUT/RESULT/ENABLE"), 1.into()),
                ]);
                integration_time
            }
            Mode::Spectroscopy => {
                settings.extend([
                    (
                        format!("{prefix}/SPECTROSCOPY/TRIGGER/CHANNEL"),
                        trigger_channel.into(),
                    ),
                    (
                        format!("{prefix}/SPECTROSCOPY/ENVELOPE/DELAY"),
                        self.generator_delay.into(),
                    ),
                    (format!("{prefix}/SPECTROSCOPY/DELAY"), self.integrator_delay.into()),
                    (format!("{prefix}/SPECTROSCOPY/RESULT/ENABLE"), 1.into()),
                ]);
                self.spectra
                    .values()
                    .map(|s| s.integration_time)
                    .max()
                    .unwrap_or(1)
            }
        };
        if self.enable_scope {
            let scope_trigger = match self.mode {
                Mode::Readout => 64,
                Mode::Spectroscopy => 32,
            } + i64::from(self.channel)
                - 1;
            settings.extend([
                ("/SCOPES/0/SINGLE".to_string(), 1.into()),
                ("/SCOPES/0/LENGTH".to_string(), integration_time.into()),
                (
                    "/SCOPES/0/SEGMENTS/ENABLE".to_string(),
                    self.points_to_record.into(),
                ),
                (
                    "/SCOPES/0/SEGMENTS/COUNT".to_string(),
                    self.points_to_record.into(),
                ),
                (
                    format!("/SCOPES/0/CHANNELS/{}/INPUTSELECT", self.channel - 1),
                    i64::from(self.channel - 1).into(),
                ),
                ("/SCOPES/0/TRIGGER/CHANNEL".to_string(), scope_trigger.into()),
                (
                    "/SCOPES/0/TRIGGER/DELAY".to_string(),
                    self.integrator_delay.into(),
                ),
            ]);
        }
        match self.mode {
            Mode::Readout => {
                for readout in self.readouts.values() {
                    for (path, value) in readout.settings() {
                        settings.push((format!("{prefix}{path}"), value));
                    }
                }
            }
            Mode::Spectroscopy => {
                for spectrum in self.spectra.values() {
                    for (path, value) in spectrum.settings() {
                        settings.push((format!("{prefix}{path}"), value));
                    }
                }
            }
        }
        settings
    }
}

// ── SHFSG ────────────────────────────────────────────────────────────────

/// Settings for one SHFSG sgchannel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShfsgCore {
    /// sgchannel number (1-4).
    pub channel: u32,
    pub on: bool,
    pub clock_source: ClockSource,
}

impl ShfsgCore {
    pub fn new(channel: u32) -> Self {
        Self {
            channel,
            on: true,
            clock_source: ClockSource::Zsync,
        }
    }

    pub fn settings(&self) -> Vec<Setting> {
        let ch = self.channel - 1;
        vec![
            (
                format!("/SGCHANNELS/{ch}/OUTPUT/ON"),
                i64::from(self.on).into(),
            ),
            (format!("/SGCHANNELS/{ch}/AWG/DIOZSYNCSWITCH"), 1.into()),
            (format!("/SGCHANNELS/{ch}/AWG/MODULATION/ENABLE"), 1.into()),
            (format!("/SGCHANNELS/{ch}/SINES/0/HARMONIC"), 1.into()),
            (
                "/SYSTEM/CLOCKS/REFERENCECLOCK/IN/SOURCE".to_string(),
                self.clock_source.value().into(),
            ),
        ]
    }
}

// ── HDAWG ────────────────────────────────────────────────────────────────

/// Output routing for one of the two outputs of an HDAWG core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HdawgOutput {
    /// Output within the core, 1 or 2.
    pub output: u32,
    pub on: bool,
    pub path: OutputPath,
    /// Output range in volts; the instrument snaps to the nearest
    /// settable range above this value.
    pub range: f64,
    /// Hold the last played value instead of returning to 0 V.
    pub hold: bool,
}

impl HdawgOutput {
    pub fn new(output: u32) -> Self {
        Self {
            output,
            on: true,
            path: OutputPath::Amplified,
            range: 5.0,
            hold: true,
        }
    }

    fn settings(&self, core: u32) -> Vec<Setting> {
        let physical_channel = 2 * (core - 1) + self.output - 1;
        let sigout = format!("/SIGOUTS/{physical_channel}");
        vec![
            (format!("{sigout}/ON"), i64::from(self.on).into()),
            (format!("{sigout}/RANGE"), self.range.into()),
            (format!("{sigout}/DIRECT"), self.path.value().into()),
            (
                format!("/AWGS/{}/OUTPUTS/{}/HOLD", core - 1, self.output - 1),
                i64::from(self.hold).into(),
            ),
        ]
    }
}

/// Settings for one HDAWG core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HdawgCore {
    /// AWG core number (1-4).
    pub channel: u32,
    pub outputs: BTreeMap<u32, HdawgOutput>,
    pub clock_source: ClockSource,
    pub sample_frequency: f64,
}

impl HdawgCore {
    pub fn new(channel: u32) -> Self {
        Self {
            channel,
            outputs: BTreeMap::new(),
            clock_source: ClockSource::Zsync,
            sample_frequency: 2.0e9,
        }
    }

    pub fn settings(&self) -> Vec<Setting> {
        let mut settings: Vec<Setting> = self
            .outputs
            .values()
            .flat_map(|output| output.settings(self.channel))
            .collect();
        settings.extend([
            (
                "/SYSTEM/CLOCKS/REFERENCECLOCK/SOURCE".to_string(),
                self.clock_source.value().into(),
            ),
            (
                "/SYSTEM/CLOCKS/SAMPLECLOCK/FREQ".to_string(),
                self.sample_frequency.into(),
            ),
            ("/DIOS/0/MODE".to_string(), 3.into()),
        ]);
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(settings: &'a [Setting], path: &str) -> &'a SettingValue {
        settings
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, v)| v)
            .unwrap_or_else(|| panic!("missing node {path}"))
    }

    #[test]
    fn qa_readout_core_settings() {
        let mut core = ShfqaCore::new(1);
        core.num_averages = 100;
        core.points_to_record = 5;
        core.readouts.insert(
            0,
            Readout {
                index: 0,
                generator_wfm: vec![Complex::real(1.0); 2048],
                integrator_wfm: vec![Complex::real(1.0); 2048],
                threshold: 0.0,
            },
        );
        let settings = core.settings();
        assert_eq!(lookup(&settings, "/QACHANNELS/0/MODE"), &SettingValue::Int(1));
        assert_eq!(
            lookup(&settings, "/QACHANNELS/0/READOUT/RESULT/LENGTH"),
            &SettingValue::Int(5)
        );
        assert_eq!(
            lookup(&settings, "/QACHANNELS/0/READOUT/RESULT/AVERAGES"),
            &SettingValue::Int(100)
        );
        assert_eq!(
            lookup(&settings, "/QACHANNELS/0/READOUT/INTEGRATION/LENGTH"),
            &SettingValue::Int(2048)
        );
        assert_eq!(
            lookup(&settings, "/QACHANNELS/0/GENERATOR/AUXTRIGGERS/0/CHANNEL"),
            &SettingValue::Int(32)
        );
        assert!(matches!(
            lookup(&settings, "/QACHANNELS/0/GENERATOR/WAVEFORMS/0/WAVE"),
            SettingValue::Samples(s) if s.len() == 2048
        ));
    }

    #[test]
    fn qa_unaveraged_shots_expand_result_length() {
        let mut core = ShfqaCore::new(1);
        core.num_averages = 100;
        core.points_to_record = 5;
        core.average_shots = false;
        let settings = core.settings();
        assert_eq!(
            lookup(&settings, "/QACHANNELS/0/READOUT/RESULT/LENGTH"),
            &SettingValue::Int(500)
        );
        assert_eq!(
            lookup(&settings, "/QACHANNELS/0/READOUT/RESULT/AVERAGES"),
            &SettingValue::Int(1)
        );
    }

    #[test]
    fn qa_spectroscopy_settings() {
        let mut core = ShfqaCore::new(2);
        core.mode = Mode::Spectroscopy;
        core.spectra.insert(
            0,
            Spectrum {
                envelope_wfm: vec![Complex::real(1.0); 4096],
                integration_time: 4096,
                mode: SpectroscopyMode::Pulsed,
            },
        );
        let settings = core.settings();
        assert_eq!(lookup(&settings, "/QACHANNELS/1/MODE"), &SettingValue::Int(0));
        assert_eq!(
            lookup(&settings, "/QACHANNELS/1/SPECTROSCOPY/TRIGGER/CHANNEL"),
            &SettingValue::Int(33)
        );
        assert_eq!(
            lookup(&settings, "/QACHANNELS/1/SPECTROSCOPY/LENGTH"),
            &SettingValue::Int(4096)
        );
        assert_eq!(
            lookup(&settings, "/QACHANNELS/1/SPECTROSCOPY/ENVELOPE/ENABLE"),
            &SettingValue::Int(1)
        );
    }

    #[test]
    fn qa_scope_settings_follow_mode() {
        let mut core = ShfqaCore::new(1);
        core.enable_scope = true;
        core.points_to_record = 3;
        let settings = core.settings();
        assert_eq!(
            lookup(&settings, "/SCOPES/0/TRIGGER/CHANNEL"),
            &SettingValue::Int(64)
        );
        assert_eq!(
            lookup(&settings, "/SCOPES/0/SEGMENTS/COUNT"),
            &SettingValue::Int(3)
        );
    }

    #[test]
    fn sg_core_settings() {
        let settings = ShfsgCore::new(3).settings();
        assert_eq!(
            lookup(&settings, "/SGCHANNELS/2/OUTPUT/ON"),
            &SettingValue::Int(1)
        );
        assert_eq!(
            lookup(&settings, "/SYSTEM/CLOCKS/REFERENCECLOCK/IN/SOURCE"),
            &SettingValue::Int(2)
        );
    }

    #[test]
    fn hdawg_output_maps_to_physical_channel() {
        let mut core = HdawgCore::new(2);
        core.outputs.insert(2, HdawgOutput::new(2));
        let settings = core.settings();
        // core 2, output 2 lands on sigout 3
        assert_eq!(lookup(&settings, "/SIGOUTS/3/ON"), &SettingValue::Int(1));
        assert_eq!(
            lookup(&settings, "/AWGS/1/OUTPUTS/1/HOLD"),
            &SettingValue::Int(1)
        );
        assert_eq!(lookup(&settings, "/DIOS/0/MODE"), &SettingValue::Int(3));
        assert_eq!(
            lookup(&settings, "/SYSTEM/CLOCKS/SAMPLECLOCK/FREQ"),
            &SettingValue::Float(2.0e9)
        );
    }
}
