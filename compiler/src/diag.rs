// diag.rs — Compiler error model
//
// A closed taxonomy of error kinds with stable codes, shared by every
// pass. Passes return `Result<_, Error>` and propagate with `?`; the
// pipeline reports the first failure per compilation.

use std::fmt;

// ── Error kinds ──────────────────────────────────────────────────────────

/// Stable classification of every failure the compiler can report.
///
/// Once assigned, a code must never be reassigned to a different semantic
/// meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    IdentifierNotFound,
    DuplicateIdentifier,
    NotInGlobalScope,
    InvalidDefcalArgument,
    ExpressionInDefcal,
    InvalidGatecallArgument,
    Unhandled,
    UndeterminedCall,
    NoSeqcEquivalent,
    CompileOut,
    PortNotFound,
    InstrumentNotFound,
    InputNotFound,
    OutputNotSupported,
    InputTypeNotSupported,
    InvalidArgument,
    InvalidWaveform,
    IncludeError,
}

impl ErrorKind {
    /// Stable diagnostic code for this kind (e.g. `E0101`).
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::IdentifierNotFound => "E0101",
            ErrorKind::DuplicateIdentifier => "E0102",
            ErrorKind::NotInGlobalScope => "E0103",
            ErrorKind::InvalidDefcalArgument => "E0104",
            ErrorKind::ExpressionInDefcal => "E0105",
            ErrorKind::InvalidGatecallArgument => "E0106",
            ErrorKind::Unhandled => "E0107",
            ErrorKind::UndeterminedCall => "E0108",
            ErrorKind::NoSeqcEquivalent => "E0109",
            ErrorKind::CompileOut => "E0110",
            ErrorKind::PortNotFound => "E0111",
            ErrorKind::InstrumentNotFound => "E0112",
            ErrorKind::InputNotFound => "E0113",
            ErrorKind::OutputNotSupported => "E0114",
            ErrorKind::InputTypeNotSupported => "E0115",
            ErrorKind::InvalidArgument => "E0116",
            ErrorKind::InvalidWaveform => "E0117",
            ErrorKind::IncludeError => "E0118",
        }
    }

    /// Human-readable name of the kind.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::IdentifierNotFound => "identifier not found",
            ErrorKind::DuplicateIdentifier => "duplicate identifier",
            ErrorKind::NotInGlobalScope => "statement not in global scope",
            ErrorKind::InvalidDefcalArgument => "invalid defcal argument",
            ErrorKind::ExpressionInDefcal => "expression in defcal not supported",
            ErrorKind::InvalidGatecallArgument => "invalid gate call argument",
            ErrorKind::Unhandled => "unhandled construct",
            ErrorKind::UndeterminedCall => "could not determine call",
            ErrorKind::NoSeqcEquivalent => "no SEQC equivalent",
            ErrorKind::CompileOut => "statement should have been compiled out",
            ErrorKind::PortNotFound => "port not found in setup",
            ErrorKind::InstrumentNotFound => "instrument not found in setup",
            ErrorKind::InputNotFound => "input value not provided",
            ErrorKind::OutputNotSupported => "output declarations not supported",
            ErrorKind::InputTypeNotSupported => "input type not supported",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::InvalidWaveform => "waveform violates timing constraints",
            ErrorKind::IncludeError => "include failed",
        }
    }
}

// ── Error ────────────────────────────────────────────────────────────────

/// A compilation failure: a kind plus a message, with optional detail
/// lines accumulated by the builder.
#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    pub details: Vec<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: Vec::new(),
        }
    }

    /// Attach a detail line (rendered indented below the message).
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.details.push(detail.into());
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "error[{}]: {}: {}",
            self.kind.code(),
            self.kind.name(),
            self.message
        )?;
        for detail in &self.details {
            write!(f, "\n  {}", detail)?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

/// Shorthand result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_renders_code_and_message() {
        let e = Error::new(ErrorKind::IdentifierNotFound, "'q0_frame'");
        assert_eq!(
            format!("{e}"),
            "error[E0101]: identifier not found: 'q0_frame'"
        );
    }

    #[test]
    fn details_render_indented() {
        let e = Error::new(ErrorKind::InvalidWaveform, "2 waveforms flagged")
            .with_detail("w1: length 20 below minimum 32")
            .with_detail("w2: length 40 not a multiple of 16");
        let text = format!("{e}");
        assert!(text.contains("\n  w1: length 20 below minimum 32"));
        assert!(text.contains("\n  w2: length 40 not a multiple of 16"));
    }

    #[test]
    fn codes_are_unique() {
        use std::collections::HashSet;
        let kinds = [
            ErrorKind::IdentifierNotFound,
            ErrorKind::DuplicateIdentifier,
            ErrorKind::NotInGlobalScope,
            ErrorKind::InvalidDefcalArgument,
            ErrorKind::ExpressionInDefcal,
            ErrorKind::InvalidGatecallArgument,
            ErrorKind::Unhandled,
            ErrorKind::UndeterminedCall,
            ErrorKind::NoSeqcEquivalent,
            ErrorKind::CompileOut,
            ErrorKind::PortNotFound,
            ErrorKind::InstrumentNotFound,
            ErrorKind::InputNotFound,
            ErrorKind::OutputNotSupported,
            ErrorKind::InputTypeNotSupported,
            ErrorKind::InvalidArgument,
            ErrorKind::InvalidWaveform,
            ErrorKind::IncludeError,
        ];
        let codes: HashSet<_> = kinds.iter().map(|k| k.code()).collect();
        assert_eq!(codes.len(), kinds.len());
    }
}
