// pass.rs — Pass descriptor module: metadata and dependency resolution
//
// Declares the compiler's 11 lowering passes, their dependency edges,
// and the artifacts they produce. Used by the pipeline driver to
// compute minimal pass subsets for a given terminal artifact.

use std::collections::HashSet;

// ── Pass and Artifact identifiers ──────────────────────────────────────────

/// Identifies each compiler pass. The first seven run once per program;
/// the last four run once per sequencing core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    ResolveIo,
    ResolveIncludes,
    Analyze,
    TransformDurations,
    CheckTimings,
    DetermineDelays,
    ExtractSignature,
    SplitCores,
    RemoveUnused,
    InsertCtWaveforms,
    PrintSeqc,
}

/// Machine-readable artifact identifiers. Each maps to a concrete type
/// in the compilation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactId {
    Resolved,     // Program with io declarations substituted
    Flattened,    // Program with includes inlined
    Analyzed,     // semantic tables checked, no output mutation
    Normalized,   // Program with durations in dt
    TimingCert,   // waveform granularity/length verdict
    DelayAligned, // Program with measure delays equalized
    Signature,    // ShotsSignature
    CoreProgram,  // per-core Program slice
    Pruned,       // per-core Program without dead declarations
    CtPrepared,   // per-core Program with command-table waveforms
    Seqc,         // SeqcProgram (text + settings + wfm mapping)
}

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about a compiler pass.
pub struct PassDescriptor {
    /// Human-readable name for diagnostics/verbose output.
    pub name: &'static str,
    /// Pass dependencies (other passes whose outputs this pass consumes).
    pub inputs: &'static [PassId],
    /// Artifacts this pass produces.
    pub outputs: &'static [ArtifactId],
    /// Pre/post conditions (documentation only).
    pub invariants: &'static str,
}

/// Return the static descriptor for a given pass.
pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::ResolveIo => PassDescriptor {
            name: "resolve_io",
            inputs: &[],
            outputs: &[ArtifactId::Resolved],
            invariants: "no io declarations remain, inputs substituted as literals",
        },
        PassId::ResolveIncludes => PassDescriptor {
            name: "resolve_includes",
            inputs: &[PassId::ResolveIo],
            outputs: &[ArtifactId::Flattened],
            invariants: "no include statements remain, recursion bottoms out",
        },
        PassId::Analyze => PassDescriptor {
            name: "analyze",
            inputs: &[PassId::ResolveIncludes],
            outputs: &[ArtifactId::Analyzed],
            invariants: "all identifiers resolved, gate calls match a defcal",
        },
        PassId::TransformDurations => PassDescriptor {
            name: "transform_durations",
            inputs: &[PassId::Analyze],
            outputs: &[ArtifactId::Normalized],
            invariants: "every duration literal is in dt at 2 GS/s",
        },
        PassId::CheckTimings => PassDescriptor {
            name: "check_timings",
            inputs: &[PassId::TransformDurations],
            outputs: &[ArtifactId::TimingCert],
            invariants: "all waveforms >= 32 samples and 16-sample aligned",
        },
        PassId::DetermineDelays => PassDescriptor {
            name: "determine_delays",
            inputs: &[PassId::TransformDurations],
            outputs: &[ArtifactId::DelayAligned],
            invariants: "all measure defcals share one delay duration",
        },
        PassId::ExtractSignature => PassDescriptor {
            name: "extract_signature",
            inputs: &[PassId::TransformDurations],
            outputs: &[ArtifactId::Signature],
            invariants: "n_shots/n_steps constants captured",
        },
        PassId::SplitCores => PassDescriptor {
            name: "split_cores",
            inputs: &[PassId::CheckTimings, PassId::DetermineDelays],
            outputs: &[ArtifactId::CoreProgram],
            invariants: "each slice references only frames on its core's ports",
        },
        PassId::RemoveUnused => PassDescriptor {
            name: "remove_unused",
            inputs: &[PassId::SplitCores],
            outputs: &[ArtifactId::Pruned],
            invariants: "no unreferenced declarations or empty defcals remain",
        },
        PassId::InsertCtWaveforms => PassDescriptor {
            name: "insert_ct_waveforms",
            inputs: &[PassId::RemoveUnused],
            outputs: &[ArtifactId::CtPrepared],
            invariants: "command-table indices have placeholder declarations",
        },
        PassId::PrintSeqc => PassDescriptor {
            name: "print_seqc",
            inputs: &[PassId::InsertCtWaveforms],
            outputs: &[ArtifactId::Seqc],
            invariants: "valid SEQC emitted with settings and wfm mapping",
        },
    }
}

// ── Dependency resolution ──────────────────────────────────────────────────

/// All 11 pass IDs in declaration order (used for iteration).
pub const ALL_PASSES: [PassId; 11] = [
    PassId::ResolveIo,
    PassId::ResolveIncludes,
    PassId::Analyze,
    PassId::TransformDurations,
    PassId::CheckTimings,
    PassId::DetermineDelays,
    PassId::ExtractSignature,
    PassId::SplitCores,
    PassId::RemoveUnused,
    PassId::InsertCtWaveforms,
    PassId::PrintSeqc,
];

/// Compute the minimal ordered set of passes needed to produce `terminal`.
/// Returns passes in topological (execution) order.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, &mut visited, &mut order);
    order
}

fn visit(id: PassId, visited: &mut HashSet<PassId>, order: &mut Vec<PassId>) {
    if !visited.insert(id) {
        return;
    }
    for &dep in descriptor(id).inputs {
        visit(dep, visited, order);
    }
    order.push(id);
}

// ── Tests ──────────────────────────────────────────────────────────────────
