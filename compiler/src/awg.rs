// awg.rs — Per-core-type SEQC translation strategies
//
// Each sequencing core type (HD, QA, SG) supports a different subset of
// the pulse operations and renders them differently. The printer
// dispatches play/capture/phase/frequency statements here; unsupported
// combinations are NoSeqcEquivalent errors.

use serde::{Deserialize, Serialize};

use crate::ast::{BinaryOperator, Expression};
use crate::diag::{Error, ErrorKind, Result};
use crate::seqc::{expr_seqc, SeqcStream};

// ── Core types ───────────────────────────────────────────────────────────

/// Waveform sample type a core consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WfmDatatype {
    Real,
    Complex,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum CoreType {
    Hd,
    Qa,
    Sg,
}

impl CoreType {
    pub fn n_channels(self) -> u32 {
        match self {
            CoreType::Hd => 2,
            CoreType::Qa => 2,
            CoreType::Sg => 1,
        }
    }

    pub fn datatype(self) -> WfmDatatype {
        match self {
            CoreType::Hd | CoreType::Sg => WfmDatatype::Real,
            CoreType::Qa => WfmDatatype::Complex,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CoreType::Hd => "HD",
            CoreType::Qa => "QA",
            CoreType::Sg => "SG",
        }
    }
}

fn unsupported(core: CoreType, what: &str) -> Error {
    Error::new(
        ErrorKind::NoSeqcEquivalent,
        format!("{} cores do not support {}", core.as_str(), what),
    )
}

// ── IQ pattern detection ─────────────────────────────────────────────────

fn is_imag_unit(expr: &Expression) -> bool {
    matches!(expr, Expression::Identifier(name) if name == "ii")
}

/// `w * ii` or `ii * w`, the quadrature-only form.
fn imag_component(expr: &Expression) -> Option<&Expression> {
    match expr {
        Expression::Binary {
            op: BinaryOperator::Times,
            lhs,
            rhs,
        } => {
            if is_imag_unit(lhs) {
                Some(rhs)
            } else if is_imag_unit(rhs) {
                Some(lhs)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// `w_real + ii * w_imag` (either multiplication order), the SSB IQ form.
fn iq_components(expr: &Expression) -> Option<(&Expression, &Expression)> {
    match expr {
        Expression::Binary {
            op: BinaryOperator::Plus,
            lhs,
            rhs,
        } => imag_component(rhs).map(|imag| (lhs.as_ref(), imag)),
        _ => None,
    }
}

// ── Play ─────────────────────────────────────────────────────────────────

/// Render the waveform argument of a `play(frame, wfm)` call.
///
/// HD and SG cores share the IQ forms; baseband waveforms go to the
/// port's channel on HD cores (`playWave(1, w)` / `playWave(1, "", 2, w)`)
/// and always to the single SG channel pair.
pub fn play(core: CoreType, wfm: &Expression, channel: u32, stream: &mut SeqcStream) -> Result<()> {
    if core == CoreType::Qa {
        return Err(unsupported(core, "play statements directly"));
    }
    if let Some((real, imag)) = iq_components(wfm) {
        stream.line(format!(
            "playWave(1, 2, {}, 1, 2, {});",
            expr_seqc(real),
            expr_seqc(imag)
        ));
        return Ok(());
    }
    if let Some(imag) = imag_component(wfm) {
        stream.line(format!(
            "playWave(1, 2, 0 * {}, 1, 2, {});",
            expr_seqc(imag),
            expr_seqc(imag)
        ));
        return Ok(());
    }
    match (core, channel) {
        (CoreType::Sg, _) => stream.line(format!("playWave(1, 2, {});", expr_seqc(wfm))),
        (CoreType::Hd, 2) => stream.line(format!("playWave(1, \"\", 2, {});", expr_seqc(wfm))),
        (CoreType::Hd, _) => stream.line(format!("playWave(1, {});", expr_seqc(wfm))),
        (CoreType::Qa, _) => unreachable!(),
    }
    Ok(())
}

// ── Capture ──────────────────────────────────────────────────────────────

/// Render a `capture_v3`/`capture_v1_spectrum` duration on a QA core:
/// hold the sequencer for the acquisition window and pulse the trigger.
pub fn capture(core: CoreType, duration: &Expression, stream: &mut SeqcStream) -> Result<()> {
    if core != CoreType::Qa {
        return Err(unsupported(core, "capture"));
    }
    stream.line(format!("playZero({});", expr_seqc(duration)));
    stream.line("setTrigger(1);");
    stream.line("setTrigger(0);");
    Ok(())
}

// ── Phase ────────────────────────────────────────────────────────────────

pub fn set_phase(core: CoreType, phase: &Expression, stream: &mut SeqcStream) -> Result<()> {
    match core {
        CoreType::Hd => {
            stream.line(format!("setSinePhase(0, {});", expr_seqc(phase)));
            stream.line(format!("setSinePhase(1, {});", expr_seqc(phase)));
            Ok(())
        }
        CoreType::Sg => {
            stream.line(format!("setSinePhase({});", expr_seqc(phase)));
            Ok(())
        }
        CoreType::Qa => Err(unsupported(core, "setting phase of oscillators")),
    }
}

pub fn shift_phase(core: CoreType, phase: &Expression, stream: &mut SeqcStream) -> Result<()> {
    match core {
        CoreType::Hd => {
            stream.line(format!("incrementSinePhase(0, {});", expr_seqc(phase)));
            stream.line(format!("incrementSinePhase(1, {});", expr_seqc(phase)));
            Ok(())
        }
        CoreType::Sg => {
            stream.line(format!("incrementSinePhase({});", expr_seqc(phase)));
            Ok(())
        }
        CoreType::Qa => Err(unsupported(core, "shifting phase of oscillators")),
    }
}

// ── Frequency ────────────────────────────────────────────────────────────

pub fn set_frequency(core: CoreType, frequency: &Expression, stream: &mut SeqcStream) -> Result<()> {
    match core {
        CoreType::Sg | CoreType::Qa => {
            stream.line(format!("setOscFreq(0, {});", expr_seqc(frequency)));
            Ok(())
        }
        CoreType::Hd => Err(unsupported(core, "setting frequency of oscillators")),
    }
}

pub fn shift_frequency(core: CoreType, _frequency: &Expression, _stream: &mut SeqcStream) -> Result<()> {
    Err(unsupported(core, "shifting frequency of oscillators"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expression as E;

    fn render<F: FnOnce(&mut SeqcStream) -> Result<()>>(f: F) -> String {
        let mut stream = SeqcStream::new();
        f(&mut stream).unwrap();
        stream.finish()
    }

    #[test]
    fn hd_iq_play() {
        let wfm = E::binary(
            BinaryOperator::Plus,
            E::ident("w_real"),
            E::binary(BinaryOperator::Times, E::ident("ii"), E::ident("w_imag")),
        );
        let out = render(|s| play(CoreType::Hd, &wfm, 1, s));
        assert_eq!(out, "playWave(1, 2, w_real, 1, 2, w_imag);\n");
    }

    #[test]
    fn hd_quadrature_only_play() {
        let wfm = E::binary(BinaryOperator::Times, E::ident("w_imag"), E::ident("ii"));
        let out = render(|s| play(CoreType::Hd, &wfm, 1, s));
        assert_eq!(out, "playWave(1, 2, 0 * w_imag, 1, 2, w_imag);\n");
    }

    #[test]
    fn hd_baseband_channel_two() {
        let wfm = E::ident("w");
        let out = render(|s| play(CoreType::Hd, &wfm, 2, s));
        assert_eq!(out, "playWave(1, \"\", 2, w);\n");
    }

    #[test]
    fn sg_baseband_play() {
        let wfm = E::ident("w");
        let out = render(|s| play(CoreType::Sg, &wfm, 1, s));
        assert_eq!(out, "playWave(1, 2, w);\n");
    }

    #[test]
    fn qa_play_is_rejected() {
        let mut stream = SeqcStream::new();
        let err = play(CoreType::Qa, &E::ident("w"), 1, &mut stream).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NoSeqcEquivalent);
    }

    #[test]
    fn qa_capture_holds_and_triggers() {
        let out = render(|s| capture(CoreType::Qa, &E::int(2048), s));
        assert_eq!(out, "playZero(2048);\nsetTrigger(1);\nsetTrigger(0);\n");
    }

    #[test]
    fn hd_shift_phase_hits_both_sines() {
        let out = render(|s| shift_phase(CoreType::Hd, &E::float(1.1), s));
        assert_eq!(out, "incrementSinePhase(0, 1.1);\nincrementSinePhase(1, 1.1);\n");
    }

    #[test]
    fn sg_set_frequency() {
        let out = render(|s| set_frequency(CoreType::Sg, &E::float(1.1), s));
        assert_eq!(out, "setOscFreq(0, 1.1);\n");
    }

    #[test]
    fn hd_set_frequency_is_rejected() {
        let mut stream = SeqcStream::new();
        let err = set_frequency(CoreType::Hd, &E::float(1.0), &mut stream).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NoSeqcEquivalent);
    }
}
