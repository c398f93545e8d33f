// mangle.rs — Defcal signature mangling and call matching
//
// Defcal definitions are registered under mangled names so that several
// definitions of the same gate (different literal arguments, different
// physical qubits) can coexist. Gate calls are matched against the
// registered names by scoring: exact literal and physical-qubit matches
// outrank wildcard parameters and unbound qubits, and a definition
// pinned to a different value or qubit is never selected.
//
// Mangled form: `_ZN{len}{name}_PN{n}[_p…]_QN{m}[_q…]_R{ret}`.
// Ties are resolved by the caller taking the first match in candidate
// order.

use crate::ast::{self, Defcal, DefcalArg, Expression, GateCall};
use crate::diag::{Error, ErrorKind, Result};

// ── Signature ────────────────────────────────────────────────────────────

/// Symbolic signature of a defcal definition or a gate call. Parameters
/// and qubits are kept as source tokens (`"90"`, `"theta"`, `"$0"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    pub name: String,
    pub params: Vec<String>,
    pub qubits: Vec<String>,
    pub return_type: String,
}

impl FunctionSignature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            qubits: Vec::new(),
            return_type: String::new(),
        }
    }

    /// Encode the signature into its mangled name.
    pub fn mangle(&self) -> String {
        let mut out = format!("_ZN{}{}", self.name.len(), self.name);
        out.push_str(&format!("_PN{}", self.params.len()));
        for p in &self.params {
            out.push('_');
            out.push_str(p);
        }
        out.push_str(&format!("_QN{}", self.qubits.len()));
        for q in &self.qubits {
            out.push('_');
            out.push_str(q);
        }
        out.push_str("_R");
        out.push_str(&self.return_type);
        out
    }
}

/// Source token used for a call argument when matching against defcal
/// candidates.
pub fn expression_token(expr: &Expression) -> String {
    match expr {
        Expression::Identifier(name) => name.clone(),
        other => format!("{other}"),
    }
}

/// Signature of a defcal definition. Literal arguments become their
/// token; classical parameters become their name.
pub fn defcal_signature(defcal: &Defcal) -> FunctionSignature {
    FunctionSignature {
        name: defcal.name.clone(),
        params: defcal
            .args
            .iter()
            .map(|arg| match arg {
                DefcalArg::Classical { name, .. } => name.clone(),
                DefcalArg::Literal(expr) => expression_token(expr),
            })
            .collect(),
        qubits: defcal.qubits.clone(),
        return_type: defcal
            .return_type
            .as_ref()
            .map(|t| t.type_name().to_string())
            .unwrap_or_default(),
    }
}

/// Signature of a gate call site.
pub fn gate_call_signature(call: &GateCall) -> FunctionSignature {
    FunctionSignature {
        name: call.name.clone(),
        params: call.args.iter().map(expression_token).collect(),
        qubits: call
            .qubits
            .iter()
            .map(expression_token)
            .collect(),
        return_type: String::new(),
    }
}

/// Signature of a measure call site on one qubit.
pub fn measurement_signature(qubit: &Expression) -> FunctionSignature {
    FunctionSignature {
        name: "measure".to_string(),
        params: Vec::new(),
        qubits: vec![expression_token(qubit)],
        return_type: String::new(),
    }
}

// ── Demangling ───────────────────────────────────────────────────────────

fn split_tokens(section: &str) -> Vec<String> {
    section
        .split('_')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Decode a mangled name back into its signature.
pub fn demangle(mangled: &str) -> Result<FunctionSignature> {
    let bad = |why: &str| {
        Error::new(
            ErrorKind::Unhandled,
            format!("cannot demangle '{mangled}': {why}"),
        )
    };

    let rest = mangled
        .strip_prefix("_ZN")
        .ok_or_else(|| bad("missing _ZN prefix"))?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    let name_len: usize = digits.parse().map_err(|_| bad("missing name length"))?;
    let after_len = &rest[digits.len()..];
    if after_len.len() < name_len {
        return Err(bad("name shorter than its length prefix"));
    }
    let name = &after_len[..name_len];
    let after_name = &after_len[name_len..];

    let pn = after_name
        .strip_prefix("_PN")
        .ok_or_else(|| bad("missing _PN section"))?;
    let qn_at = pn.find("_QN").ok_or_else(|| bad("missing _QN section"))?;
    let (param_section, rest) = pn.split_at(qn_at);
    let param_digits: String = param_section
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let n_params: usize = param_digits
        .parse()
        .map_err(|_| bad("missing parameter count"))?;
    let params = split_tokens(&param_section[param_digits.len()..]);
    if params.len() != n_params {
        return Err(bad("parameter count mismatch"));
    }

    let qn = &rest[3..]; // past "_QN"
    let r_at = qn.find("_R").ok_or_else(|| bad("missing _R section"))?;
    let (qubit_section, ret_section) = qn.split_at(r_at);
    let qubit_digits: String = qubit_section
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let n_qubits: usize = qubit_digits
        .parse()
        .map_err(|_| bad("missing qubit count"))?;
    let qubits = split_tokens(&qubit_section[qubit_digits.len()..]);
    if qubits.len() != n_qubits {
        return Err(bad("qubit count mismatch"));
    }

    Ok(FunctionSignature {
        name: name.to_string(),
        params,
        qubits,
        return_type: ret_section[2..].to_string(),
    })
}

// ── Matching ─────────────────────────────────────────────────────────────

fn is_number(token: &str) -> bool {
    token.parse::<f64>().is_ok()
}

/// Score one candidate signature against a call signature. Negative
/// scores mark candidates that must not be selected.
fn score(call: &FunctionSignature, candidate: &FunctionSignature) -> f64 {
    let n_params = call.params.len() as f64;
    let n_qubits = call.qubits.len() as f64;
    let mut total = 0.0;

    for (call_tok, cand_tok) in call.params.iter().zip(&candidate.params) {
        if is_number(cand_tok) {
            // Definition pinned to a literal value.
            if call_tok == cand_tok {
                total += 1.0;
            } else {
                total += -100.0;
            }
        } else if is_number(call_tok) {
            // Wildcard parameter absorbing a literal argument.
            total += 1.0 / (n_params + 1.0);
        }
    }

    for (call_q, cand_q) in call.qubits.iter().zip(&candidate.qubits) {
        let call_physical = ast::is_physical_qubit(call_q);
        let cand_physical = ast::is_physical_qubit(cand_q);
        if call_q == cand_q {
            total += 1.0;
        } else if !call_physical && !cand_physical {
            total += 1.0;
        } else if call_physical && !cand_physical {
            total += 1.0 / ((n_params + 1.0) * (n_qubits + 1.0));
        } else if cand_physical {
            total += -1000.0;
        }
    }

    total
}

/// Select the best-matching candidates for a call.
///
/// Candidates that fail the hard structural filters (name, parameter
/// count, qubit count) or score negative are discarded; all candidates
/// tied at the maximum score are returned in candidate order.
pub fn match_signature(call: &FunctionSignature, candidates: &[String]) -> Vec<String> {
    let name_key = format!("_ZN{}{}", call.name.len(), call.name);
    let param_key = format!("_PN{}", call.params.len());
    let qubit_key = format!("_QN{}", call.qubits.len());

    let mut scored: Vec<(String, f64)> = Vec::new();
    for cand in candidates {
        if !cand.contains(&name_key) || !cand.contains(&param_key) || !cand.contains(&qubit_key) {
            continue;
        }
        let Ok(sig) = demangle(cand) else { continue };
        let s = score(call, &sig);
        if s >= 0.0 {
            scored.push((cand.clone(), s));
        }
    }

    let Some(max) = scored
        .iter()
        .map(|(_, s)| *s)
        .fold(None::<f64>, |acc, s| match acc {
            Some(m) if m >= s => Some(m),
            _ => Some(s),
        })
    else {
        return Vec::new();
    };

    scored
        .into_iter()
        .filter(|(_, s)| *s == max)
        .map(|(name, _)| name)
        .collect()
}

/// First best match in candidate order, or an `UndeterminedCall` error
/// when nothing is left after filtering.
pub fn first_match(call: &FunctionSignature, candidates: &[String]) -> Result<String> {
    match_signature(call, candidates)
        .into_iter()
        .next()
        .ok_or_else(|| {
            Error::new(
                ErrorKind::UndeterminedCall,
                format!(
                    "no defcal matches call '{}' on qubits [{}]",
                    call.name,
                    call.qubits.join(", ")
                ),
            )
        })
}
