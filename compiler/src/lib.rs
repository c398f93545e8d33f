// lib.rs — Pulse Qasm Compiler library root

pub mod ast;
pub mod awg;
pub mod call_stack;
pub mod ct_waveforms;
pub mod diag;
pub mod duration;
pub mod include;
pub mod interpreter;
pub mod io_resolve;
pub mod mangle;
pub mod max_delay;
pub mod pass;
pub mod pipeline;
pub mod remove_unused;
pub mod scope;
pub mod semantics;
pub mod seqc;
pub mod settings;
pub mod setup;
pub mod shots;
pub mod splitter;
pub mod stack_analysis;
pub mod symbols;
pub mod timing;
pub mod transform;
pub mod waveforms;
