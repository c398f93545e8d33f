// max_delay.rs — Equalize delays across measure definitions
//
// Measurement defcals on different cores must take the same wall-clock
// time, so every delay inside a `measure` defcal is rewritten to the
// maximum delay found across all of them. Durations are evaluated with
// the interpreter in analysis mode (loops skipped); run after duration
// normalization so all values are in dt.

use crate::ast::{Expression, Program, Statement, TimeUnit};
use crate::call_stack::{ARType, ActivationRecord};
use crate::diag::Result;
use crate::interpreter::Interpreter;
use crate::setup::Setup;

/// Largest delay duration (in dt) appearing in the body of any
/// `measure` defcal, or `None` when no measure defcal has a delay.
pub fn determine_max_delay(program: &Program, setup: &Setup) -> Result<Option<f64>> {
    let mut interp = Interpreter::without_loops(setup.clone());
    interp
        .call_stack
        .push(ActivationRecord::new("main", ARType::Program, 1));

    let mut delays: Vec<f64> = Vec::new();
    for statement in &program.statements {
        match statement {
            Statement::ClassicalDeclaration { .. }
            | Statement::ConstantDeclaration { .. }
            | Statement::Calibration { .. }
            | Statement::Subroutine(_) => {
                interp.exec_stmt(statement)?;
            }
            Statement::Defcal(defcal) => {
                interp.exec_stmt(statement)?;
                if defcal.name != "measure" {
                    continue;
                }
                let outer = ActivationRecord::with_members(
                    "calibration",
                    ARType::Calibration,
                    interp.call_stack.nesting_level() + 1,
                    interp.calibration_scope.clone(),
                );
                let body = defcal.body.clone();
                let body_delays = interp.with_record(outer, |interp| {
                    let inner = ActivationRecord::new(
                        "defcal",
                        ARType::Defcal,
                        interp.call_stack.nesting_level() + 1,
                    );
                    interp.with_record(inner, |interp| {
                        let mut found = Vec::new();
                        for statement in &body {
                            if let Statement::Delay { duration, .. } = statement {
                                found.push(interp.eval(duration)?.as_f64()?);
                            }
                        }
                        Ok(found)
                    })
                })?;
                delays.extend(body_delays);
            }
            _ => {}
        }
    }
    Ok(delays.into_iter().reduce(f64::max))
}

/// Rewrite every delay inside `measure` defcals to the program-wide
/// maximum. No-op when no measure defcal contains a delay.
pub fn equalize_measure_delays(program: &mut Program, setup: &Setup) -> Result<()> {
    let Some(max_delay) = determine_max_delay(program, setup)? else {
        return Ok(());
    };
    for statement in &mut program.statements {
        let Statement::Defcal(defcal) = statement else {
            continue;
        };
        if defcal.name != "measure" {
            continue;
        }
        for body_statement in &mut defcal.body {
            if let Statement::Delay { duration, .. } = body_statement {
                *duration = Expression::DurationLiteral {
                    value: max_delay,
                    unit: TimeUnit::Dt,
                };
            }
        }
    }
    Ok(())
}
