// pipeline.rs — Compiler driver: run the lowering passes per core
//
// Orchestrates the program-level passes once, then the core-level
// passes for every sequencing core the setup declares. Each core
// receives its own program slice and its own SEQC output.
//
// Preconditions: the program is a resolvable AST and the setup is
// internally consistent (validated up front).
// Postconditions: every core present in the setup has an entry in the
// result, even when its slice compiles to an empty sequence.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde_json::Value as Json;
use sha2::{Digest, Sha256};

use crate::ast::Program;
use crate::awg::CoreType;
use crate::ct_waveforms::insert_ct_waveforms;
use crate::diag::Result;
use crate::include::resolve_includes;
use crate::io_resolve::resolve_io;
use crate::max_delay::{determine_max_delay, equalize_measure_delays};
use crate::pass::{descriptor, PassId};
use crate::remove_unused::remove_unused;
use crate::semantics;
use crate::seqc::{SeqcOutput, SeqcPrinter};
use crate::setup::Setup;
use crate::shots::{extract_shots, ShotsSignature};
use crate::splitter::split_for_ports;
use crate::timing::check_timing_constraints;
use crate::transform::transform_durations;

// ── Provenance ───────────────────────────────────────────────────────────

/// Provenance metadata for hermetic builds and cache-key use.
///
/// `source_hash`: SHA-256 of the program's canonical JSON.
/// `setup_fingerprint`: SHA-256 of the setup's JSON serialization.
/// `compiler_version`: crate version from `Cargo.toml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub source_hash: [u8; 32],
    pub setup_fingerprint: [u8; 32],
    pub compiler_version: &'static str,
}

impl Provenance {
    /// Hex string of the source hash (64 characters).
    pub fn source_hash_hex(&self) -> String {
        bytes_to_hex(&self.source_hash)
    }

    /// Hex string of the setup fingerprint (64 characters).
    pub fn setup_fingerprint_hex(&self) -> String {
        bytes_to_hex(&self.setup_fingerprint)
    }

    pub fn to_json(&self) -> String {
        format!(
            "{{\n  \"source_hash\": \"{}\",\n  \"setup_fingerprint\": \"{}\",\n  \"compiler_version\": \"{}\"\n}}\n",
            self.source_hash_hex(),
            self.setup_fingerprint_hex(),
            self.compiler_version,
        )
    }
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Compute provenance from the program AST and the setup. Both are
/// hashed over their compact JSON form so the fingerprint is stable
/// across formatting.
pub fn compute_provenance(program: &Program, setup: &Setup) -> Result<Provenance> {
    let source = serde_json::to_string(program).map_err(|e| {
        crate::diag::Error::new(
            crate::diag::ErrorKind::Unhandled,
            format!("program serialization: {e}"),
        )
    })?;
    let setup_json = setup.to_json()?;
    Ok(Provenance {
        source_hash: sha256(source.as_bytes()),
        setup_fingerprint: sha256(setup_json.as_bytes()),
        compiler_version: env!("CARGO_PKG_VERSION"),
    })
}

// ── Compiler ─────────────────────────────────────────────────────────────

/// Identifies one sequencing core of the setup.
pub type CoreKey = (String, u32, CoreType);

/// Everything the pipeline produces for one program + setup pair.
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    /// SEQC text, settings and waveform indices, one entry per core.
    pub cores: BTreeMap<CoreKey, SeqcOutput>,
    pub signature: ShotsSignature,
    pub provenance: Provenance,
}

pub struct Compiler {
    program: Program,
    setup: Setup,
    source_path: PathBuf,
    inputs: HashMap<String, Json>,
    ct_waveforms: BTreeSet<(i64, i64)>,
    average_shots: bool,
    verbose: bool,
}

impl Compiler {
    pub fn new(program: Program, setup: Setup) -> Self {
        Self {
            program,
            setup,
            source_path: PathBuf::from("."),
            inputs: HashMap::new(),
            ct_waveforms: BTreeSet::new(),
            average_shots: true,
            verbose: false,
        }
    }

    /// Runtime values for the program's `input` declarations.
    pub fn inputs(mut self, inputs: HashMap<String, Json>) -> Self {
        self.inputs = inputs;
        self
    }

    /// Directory against which relative include filenames resolve.
    pub fn source_path(mut self, path: impl AsRef<Path>) -> Self {
        self.source_path = path.as_ref().to_path_buf();
        self
    }

    /// `(index, length)` pairs to pre-declare as command-table
    /// placeholder waveforms on every core.
    pub fn ct_waveforms(mut self, waveforms: BTreeSet<(i64, i64)>) -> Self {
        self.ct_waveforms = waveforms;
        self
    }

    /// When false every shot is recorded instead of hardware-averaged.
    pub fn average_shots(mut self, average: bool) -> Self {
        self.average_shots = average;
        self
    }

    /// Print per-pass timing to stderr.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn finish_pass(&self, id: PassId, started: Instant) {
        if self.verbose {
            eprintln!(
                "pqc: {} complete, {:.1}ms",
                descriptor(id).name,
                started.elapsed().as_secs_f64() * 1000.0
            );
        }
    }

    pub fn compile(mut self) -> Result<CompiledProgram> {
        self.setup.validate()?;
        let provenance = compute_provenance(&self.program, &self.setup)?;

        let t = Instant::now();
        resolve_io(&mut self.program, &self.inputs)?;
        self.finish_pass(PassId::ResolveIo, t);

        let t = Instant::now();
        resolve_includes(&mut self.program, &self.source_path)?;
        self.finish_pass(PassId::ResolveIncludes, t);

        let t = Instant::now();
        semantics::analyze(&self.program)?;
        self.finish_pass(PassId::Analyze, t);

        let t = Instant::now();
        transform_durations(&mut self.program);
        self.finish_pass(PassId::TransformDurations, t);

        let t = Instant::now();
        check_timing_constraints(&self.program, &self.setup)?;
        self.finish_pass(PassId::CheckTimings, t);

        let t = Instant::now();
        let max_delay = determine_max_delay(&self.program, &self.setup)?;
        equalize_measure_delays(&mut self.program, &self.setup)?;
        self.finish_pass(PassId::DetermineDelays, t);

        let t = Instant::now();
        let signature = extract_shots(&self.program)?;
        self.finish_pass(PassId::ExtractSignature, t);

        let mut cores = BTreeMap::new();
        for (instrument, index, ty) in self.setup.cores() {
            let ports = self.setup.ports_for_core(&instrument, index, ty);

            let t = Instant::now();
            let mut core_program = split_for_ports(&self.program, ports)?;
            self.finish_pass(PassId::SplitCores, t);

            // Pruning empty defcals can orphan the declarations they
            // referenced, so the pass runs to a fixed point (two
            // rounds suffice for one level of defcal nesting).
            let t = Instant::now();
            remove_unused(&mut core_program);
            remove_unused(&mut core_program);
            self.finish_pass(PassId::RemoveUnused, t);

            let t = Instant::now();
            insert_ct_waveforms(&mut core_program, &self.ct_waveforms);
            self.finish_pass(PassId::InsertCtWaveforms, t);

            let t = Instant::now();
            let mut printer = SeqcPrinter::new(self.setup.clone(), signature.clone())
                .average_shots(self.average_shots);
            if let Some(delay) = max_delay {
                printer = printer.measurement_delay(delay);
            }
            let output = printer.print(&core_program)?;
            self.finish_pass(PassId::PrintSeqc, t);

            cores.insert((instrument, index, ty), output);
        }

        Ok(CompiledProgram {
            cores,
            signature,
            provenance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{
        ClassicalType, Defcal, Expression as E, GateCall, Statement, TimeUnit,
    };
    use crate::setup::test_fixtures::basic_setup;

    fn x_gate_program() -> Program {
        Program::new(vec![
            Statement::Calibration {
                body: vec![
                    Statement::ClassicalDeclaration {
                        ty: ClassicalType::Port,
                        name: "ch1".to_string(),
                        init: None,
                    },
                    Statement::ClassicalDeclaration {
                        ty: ClassicalType::Frame,
                        name: "drive_frame".to_string(),
                        init: Some(E::call(
                            "newframe",
                            vec![E::ident("ch1"), E::float(5.0e9), E::float(0.0)],
                        )),
                    },
                    Statement::Defcal(Defcal {
                        name: "x".to_string(),
                        args: vec![],
                        qubits: vec!["$0".to_string()],
                        return_type: None,
                        body: vec![Statement::Expression(E::call(
                            "play",
                            vec![
                                E::ident("drive_frame"),
                                E::call("ones", vec![E::duration(24.0, TimeUnit::Ns)]),
                            ],
                        ))],
                    }),
                ],
            },
            Statement::GateCall(GateCall {
                modifiers: vec![],
                name: "x".to_string(),
                args: vec![],
                qubits: vec![E::ident("$0")],
            }),
        ])
    }

    #[test]
    fn compiles_one_output_per_core() {
        let compiled = Compiler::new(x_gate_program(), basic_setup())
            .compile()
            .unwrap();
        // basic_setup wires one HDAWG core and one SHFQA core
        assert_eq!(compiled.cores.len(), 2);
        let hd = &compiled.cores[&("hdawg1".to_string(), 1, CoreType::Hd)];
        // 24 ns at 2 GS/s is 48 samples, below the playHold threshold
        assert_eq!(
            hd.seqc,
            "void _ZN1x_PN0_QN1__0_R() {\n  playWave(1, ones(48));\n}\n_ZN1x_PN0_QN1__0_R();\n"
        );
        let qa = &compiled.cores[&("shfqa1".to_string(), 1, CoreType::Qa)];
        assert_eq!(qa.seqc, "");
    }

    #[test]
    fn shots_signature_is_extracted() {
        let mut program = x_gate_program();
        program.statements.insert(
            0,
            Statement::ConstantDeclaration {
                ty: ClassicalType::Int { size: None },
                name: "n_shots".to_string(),
                init: E::int(512),
            },
        );
        let compiled = Compiler::new(program, basic_setup()).compile().unwrap();
        assert_eq!(compiled.signature.shots, 512);
    }

    #[test]
    fn provenance_is_stable_and_version_tagged() {
        let a = compute_provenance(&x_gate_program(), &basic_setup()).unwrap();
        let b = compute_provenance(&x_gate_program(), &basic_setup()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.compiler_version, env!("CARGO_PKG_VERSION"));
        assert_eq!(a.source_hash_hex().len(), 64);
        let json = a.to_json();
        assert!(json.contains("\"source_hash\""));
        assert!(json.contains(&a.setup_fingerprint_hex()));
    }

    #[test]
    fn provenance_tracks_program_changes() {
        let a = compute_provenance(&x_gate_program(), &basic_setup()).unwrap();
        let mut changed = x_gate_program();
        changed.statements.push(Statement::Barrier { qubits: vec![] });
        let b = compute_provenance(&changed, &basic_setup()).unwrap();
        assert_ne!(a.source_hash, b.source_hash);
        assert_eq!(a.setup_fingerprint, b.setup_fingerprint);
    }

    #[test]
    fn ct_waveforms_are_predeclared() {
        let compiled = Compiler::new(x_gate_program(), basic_setup())
            .ct_waveforms([(0, 64)].into_iter().collect())
            .compile()
            .unwrap();
        let hd = &compiled.cores[&("hdawg1".to_string(), 1, CoreType::Hd)];
        assert!(hd
            .seqc
            .contains("assignWaveIndex(placeholder(64), 0);"));
    }
}
