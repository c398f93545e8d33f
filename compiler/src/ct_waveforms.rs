// ct_waveforms.rs — Declare command-table waveform placeholders
//
// Command-table playback references waveforms by index, so the
// sequencer program must bind each index to a placeholder of the right
// length up front. A cal block of assignWaveIndex(placeholder(len), idx)
// statements is inserted near the top of the program.

use std::collections::BTreeSet;

use crate::ast::{Expression, Program, Statement};

/// Build the cal block binding each `(index, length)` pair to a
/// placeholder waveform.
fn assign_wave_indices(waveforms: &BTreeSet<(i64, i64)>) -> Statement {
    let body = waveforms
        .iter()
        .map(|&(index, length)| {
            Statement::Expression(Expression::call(
                "assignWaveIndex",
                vec![
                    Expression::call("placeholder", vec![Expression::int(length)]),
                    Expression::int(index),
                ],
            ))
        })
        .collect();
    Statement::Calibration { body }
}

/// Insert placeholder bindings for `waveforms` after the program's
/// first statement. No-op when the set is empty.
pub fn insert_ct_waveforms(program: &mut Program, waveforms: &BTreeSet<(i64, i64)>) {
    if waveforms.is_empty() {
        return;
    }
    let at = program.statements.len().min(1);
    program
        .statements
        .insert(at, assign_wave_indices(waveforms));
}
