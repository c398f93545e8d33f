// symbols.rs — Symbol variants and builtin catalogs
//
// Symbols are what the semantic analyzer stores in its scoped tables:
// declared names tagged with what kind of thing they are. Builtin type
// names and the openpulse/waveform function symbols seed the root and
// calibration scopes.

use crate::waveforms::{OPENPULSE_FUNCTIONS, SEQC_FUNCTIONS, WAVEFORM_FUNCTIONS};

/// Builtin openQASM type names.
pub const BUILTIN_TYPES: &[&str] = &[
    "ANGLE",
    "ARRAY",
    "BIT",
    "BITSTRING",
    "BOOL",
    "COMPLEX",
    "DURATION",
    "FLOAT",
    "IMAGINARY",
    "INT",
    "QUBIT",
    "STRETCH",
    "UINT",
];

/// Builtin openpulse calibration type names.
pub const BUILTIN_CAL_TYPES: &[&str] = &["PORT", "FRAME", "WAVEFORM"];

#[derive(Debug, Clone, PartialEq)]
pub enum Symbol {
    Builtin {
        name: String,
    },
    BuiltinCal {
        name: String,
    },
    Classical {
        name: String,
        ty: String,
    },
    Literal {
        name: String,
        ty: String,
    },
    Constant {
        name: String,
        ty: String,
    },
    Io {
        name: String,
        ty: String,
    },
    Quantum {
        name: String,
    },
    Array {
        name: String,
        base: String,
        dims: Vec<usize>,
    },
    Alias {
        name: String,
    },
    Subroutine {
        name: String,
        params: Vec<String>,
        return_type: Option<String>,
    },
    Extern {
        name: String,
        params: Vec<String>,
        return_type: Option<String>,
    },
    Gate {
        name: String,
        params: Vec<String>,
        qubits: Vec<String>,
    },
    Defcal {
        name: String,
    },
}

impl Symbol {
    pub fn name(&self) -> &str {
        match self {
            Symbol::Builtin { name }
            | Symbol::BuiltinCal { name }
            | Symbol::Classical { name, .. }
            | Symbol::Literal { name, .. }
            | Symbol::Constant { name, .. }
            | Symbol::Io { name, .. }
            | Symbol::Quantum { name }
            | Symbol::Array { name, .. }
            | Symbol::Alias { name }
            | Symbol::Subroutine { name, .. }
            | Symbol::Extern { name, .. }
            | Symbol::Gate { name, .. }
            | Symbol::Defcal { name } => name,
        }
    }
}

/// Symbols seeding the root (global) scope: builtin types plus the
/// sequencer functions usable from any scope.
pub fn builtin_symbols() -> Vec<Symbol> {
    let mut symbols: Vec<Symbol> = BUILTIN_TYPES
        .iter()
        .map(|t| Symbol::Builtin {
            name: t.to_string(),
        })
        .collect();
    for f in SEQC_FUNCTIONS {
        symbols.push(Symbol::Extern {
            name: f.to_string(),
            params: Vec::new(),
            return_type: None,
        });
    }
    symbols
}

/// Symbols seeding the calibration scope: cal types plus the openpulse
/// and waveform function catalogs.
pub fn builtin_cal_symbols() -> Vec<Symbol> {
    let mut symbols: Vec<Symbol> = BUILTIN_CAL_TYPES
        .iter()
        .map(|t| Symbol::BuiltinCal {
            name: t.to_string(),
        })
        .collect();
    for f in OPENPULSE_FUNCTIONS.iter().chain(WAVEFORM_FUNCTIONS) {
        symbols.push(Symbol::Extern {
            name: f.to_string(),
            params: Vec::new(),
            return_type: None,
        });
    }
    symbols
}
