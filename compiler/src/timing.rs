// timing.rs — Waveform timing constraint checks
//
// AWG waveforms must be at least 32 samples long and a multiple of the
// 16-sample granularity. The program is executed with an observer on
// pulse and delay sites; for-loops are probed at the first, second and
// last loop value only. All violations are collected and reported in a
// single error.

use std::cell::RefCell;
use std::rc::Rc;

use crate::ast::{Expression, Program};
use crate::diag::{Error, ErrorKind, Result};
use crate::interpreter::{Interpreter, PulseObserver, Value};
use crate::setup::Setup;

pub const MINIMUM_LENGTH: i64 = 32;
pub const GRANULARITY: i64 = 16;

struct FlaggedWaveform {
    text: String,
    length: i64,
}

struct WaveformChecker {
    minimum_length: i64,
    granularity: i64,
    flagged: Rc<RefCell<Vec<FlaggedWaveform>>>,
}

impl WaveformChecker {
    fn check(&self, expr: &Expression, length: i64) {
        if length < self.minimum_length || length % self.granularity != 0 {
            self.flagged.borrow_mut().push(FlaggedWaveform {
                text: expr.to_string(),
                length,
            });
        }
    }
}

impl PulseObserver for WaveformChecker {
    fn pulse(&mut self, interp: &mut Interpreter, _name: &str, args: &[Expression]) -> Result<()> {
        let Some(arg) = args.get(1) else {
            return Ok(());
        };
        // Command-table playback is checked when the table is built.
        if matches!(arg, Expression::Call { name, .. } if name == "executeTableEntry") {
            return Ok(());
        }
        let length = match interp.eval(arg)? {
            Value::Waveform(samples) => samples.len() as i64,
            Value::None => return Ok(()),
            value => value.as_f64()? as i64,
        };
        self.check(arg, length);
        Ok(())
    }

    fn delay(&mut self, interp: &mut Interpreter, duration: &Expression) -> Result<()> {
        let length = interp.eval(duration)?.as_f64()? as i64;
        self.check(duration, length);
        Ok(())
    }
}

/// Check every played/captured waveform and delay against the default
/// hardware limits.
pub fn check_timing_constraints(program: &Program, setup: &Setup) -> Result<()> {
    check_with_limits(program, setup, MINIMUM_LENGTH, GRANULARITY)
}

pub fn check_with_limits(
    program: &Program,
    setup: &Setup,
    minimum_length: i64,
    granularity: i64,
) -> Result<()> {
    let flagged = Rc::new(RefCell::new(Vec::new()));
    let mut interp = Interpreter::new(setup.clone());
    interp.probe_loops = true;
    interp.observer = Some(Box::new(WaveformChecker {
        minimum_length,
        granularity,
        flagged: flagged.clone(),
    }));
    interp.run(program)?;

    let flagged = flagged.borrow();
    if flagged.is_empty() {
        return Ok(());
    }
    let mut error = Error::new(
        ErrorKind::InvalidWaveform,
        "waveform(s) do not meet timing constraints",
    );
    for wf in flagged.iter() {
        error = error.with_detail(format!(
            "{}: length {}, sufficient length: {}, correct granularity: {}",
            wf.text,
            wf.length,
            wf.length >= minimum_length,
            wf.length % granularity == 0
        ));
    }
    Err(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ClassicalType, Expression as E, Statement, TimeUnit};
    use crate::setup::test_fixtures::basic_setup;

    fn play_stmt(wfm: Expression) -> Statement {
        Statement::Expression(E::call("play", vec![E::ident("$0"), wfm]))
    }

    fn cal_program(body: Vec<Statement>) -> Program {
        Program::new(vec![Statement::Calibration { body }])
    }

    #[test]
    fn conforming_waveform_passes() {
        let program = cal_program(vec![play_stmt(E::call("ones", vec![E::int(64)]))]);
        check_timing_constraints(&program, &basic_setup()).unwrap();
    }

    #[test]
    fn short_waveform_is_flagged() {
        let program = cal_program(vec![play_stmt(E::call("ones", vec![E::int(24)]))]);
        let err = check_timing_constraints(&program, &basic_setup()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidWaveform);
        assert!(err.to_string().contains("length 24"));
    }

    #[test]
    fn granularity_violation_is_flagged() {
        let program = cal_program(vec![play_stmt(E::call("ones", vec![E::int(40)]))]);
        let err = check_timing_constraints(&program, &basic_setup()).unwrap_err();
        assert!(err.to_string().contains("correct granularity: false"));
        assert!(err.to_string().contains("sufficient length: true"));
    }

    #[test]
    fn violations_are_aggregated_into_one_error() {
        let program = cal_program(vec![
            play_stmt(E::call("ones", vec![E::int(8)])),
            play_stmt(E::call("ones", vec![E::int(40)])),
        ]);
        let err = check_timing_constraints(&program, &basic_setup()).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("length 8"));
        assert!(text.contains("length 40"));
    }

    #[test]
    fn execute_table_entry_argument_is_skipped() {
        let program = cal_program(vec![play_stmt(E::call(
            "executeTableEntry",
            vec![E::int(0)],
        ))]);
        check_timing_constraints(&program, &basic_setup()).unwrap();
    }

    #[test]
    fn for_loop_probes_first_second_and_last_value() {
        // lengths 32 and 48 are fine, the end value 72 breaks granularity
        let program = cal_program(vec![Statement::ForIn(crate::ast::ForIn {
            ty: ClassicalType::Int { size: None },
            variable: "n".to_string(),
            set: Expression::Range {
                start: Some(Box::new(E::int(32))),
                end: Some(Box::new(E::int(72))),
                step: Some(Box::new(E::int(16))),
            },
            block: vec![play_stmt(E::call("ones", vec![E::ident("n")]))],
        })]);
        let err = check_timing_constraints(&program, &basic_setup()).unwrap_err();
        assert!(err.to_string().contains("length 72"));
    }

    #[test]
    fn delay_duration_is_checked() {
        let program = Program::new(vec![Statement::Delay {
            duration: E::duration(20.0, TimeUnit::Dt),
            qubits: vec![E::ident("$0")],
        }]);
        let err = check_timing_constraints(&program, &basic_setup()).unwrap_err();
        assert!(err.to_string().contains("length 20"));
    }
}
