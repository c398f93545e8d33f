// transform.rs — AST walking helpers and duration normalization
//
// `walk_expressions`/`walk_statement_expressions` apply a closure to
// every expression reachable from a statement, including type size
// expressions and nested blocks. The duration pass rewrites every
// duration literal into dt at the 2 GS/s sample clock.

use crate::ast::{ClassicalType, Expression, Program, Statement, TimeUnit};

/// Apply `f` to `expr` and every expression nested inside it.
pub fn walk_expressions(expr: &mut Expression, f: &mut impl FnMut(&mut Expression)) {
    match expr {
        Expression::Unary { expr, .. } => walk_expressions(expr, f),
        Expression::Binary { lhs, rhs, .. } | Expression::Concatenation { lhs, rhs } => {
            walk_expressions(lhs, f);
            walk_expressions(rhs, f);
        }
        Expression::Call { args, .. } => {
            for arg in args {
                walk_expressions(arg, f);
            }
        }
        Expression::ArrayLiteral(items) | Expression::DiscreteSet(items) => {
            for item in items {
                walk_expressions(item, f);
            }
        }
        Expression::Index { collection, index } => {
            walk_expressions(collection, f);
            for i in index {
                walk_expressions(i, f);
            }
        }
        Expression::Range { start, end, step } => {
            for part in [start, end, step].into_iter().flatten() {
                walk_expressions(part, f);
            }
        }
        Expression::SizeOf { target, dim } => {
            walk_expressions(target, f);
            if let Some(dim) = dim {
                walk_expressions(dim, f);
            }
        }
        _ => {}
    }
    f(expr);
}

fn walk_type_expressions(ty: &mut ClassicalType, f: &mut impl FnMut(&mut Expression)) {
    match ty {
        ClassicalType::Bit { size: Some(size) } => walk_expressions(size, f),
        ClassicalType::Array { base, dims } => {
            walk_type_expressions(base, f);
            for dim in dims {
                walk_expressions(dim, f);
            }
        }
        _ => {}
    }
}

/// Apply `f` to every expression in `statement`, recursing into nested
/// blocks and bodies.
pub fn walk_statement_expressions(statement: &mut Statement, f: &mut impl FnMut(&mut Expression)) {
    match statement {
        Statement::ClassicalDeclaration { ty, init, .. } => {
            walk_type_expressions(ty, f);
            if let Some(init) = init {
                walk_expressions(init, f);
            }
        }
        Statement::ConstantDeclaration { ty, init, .. } => {
            walk_type_expressions(ty, f);
            walk_expressions(init, f);
        }
        Statement::IoDeclaration { ty, .. } => walk_type_expressions(ty, f),
        Statement::QubitDeclaration { size, .. } => {
            if let Some(size) = size {
                walk_expressions(size, f);
            }
        }
        Statement::Expression(expr) => walk_expressions(expr, f),
        Statement::GateCall(call) => {
            for arg in &mut call.args {
                walk_expressions(arg, f);
            }
            for qubit in &mut call.qubits {
                walk_expressions(qubit, f);
            }
        }
        Statement::GateDefinition { body, .. } => {
            for s in body {
                walk_statement_expressions(s, f);
            }
        }
        Statement::Measurement(measurement) => {
            walk_expressions(&mut measurement.qubit, f);
            if let Some(target) = &mut measurement.target {
                walk_expressions(target, f);
            }
        }
        Statement::Reset { qubits } | Statement::Barrier { qubits } => {
            for qubit in qubits {
                walk_expressions(qubit, f);
            }
        }
        Statement::Delay { duration, qubits } => {
            walk_expressions(duration, f);
            for qubit in qubits {
                walk_expressions(qubit, f);
            }
        }
        Statement::Calibration { body } => {
            for s in body {
                walk_statement_expressions(s, f);
            }
        }
        Statement::Defcal(defcal) => {
            for arg in &mut defcal.args {
                if let crate::ast::DefcalArg::Literal(expr) = arg {
                    walk_expressions(expr, f);
                }
            }
            for s in &mut defcal.body {
                walk_statement_expressions(s, f);
            }
        }
        Statement::Subroutine(sub) => {
            for s in &mut sub.body {
                walk_statement_expressions(s, f);
            }
        }
        Statement::Return(Some(expr)) => walk_expressions(expr, f),
        Statement::Branch {
            condition,
            if_block,
            else_block,
        } => {
            walk_expressions(condition, f);
            for s in if_block.iter_mut().chain(else_block.iter_mut()) {
                walk_statement_expressions(s, f);
            }
        }
        Statement::ForIn(for_in) => {
            walk_expressions(&mut for_in.set, f);
            for s in &mut for_in.block {
                walk_statement_expressions(s, f);
            }
        }
        Statement::While { condition, block } => {
            walk_expressions(condition, f);
            for s in block {
                walk_statement_expressions(s, f);
            }
        }
        Statement::Assignment { lvalue, rvalue, .. } => {
            walk_expressions(lvalue, f);
            walk_expressions(rvalue, f);
        }
        Statement::Alias { value, .. } => walk_expressions(value, f),
        Statement::Include { .. }
        | Statement::ExternDeclaration { .. }
        | Statement::Return(None)
        | Statement::Break
        | Statement::Continue
        | Statement::End => {}
    }
}

/// Apply `f` to every expression in the program.
pub fn walk_program_expressions(program: &mut Program, f: &mut impl FnMut(&mut Expression)) {
    for statement in &mut program.statements {
        walk_statement_expressions(statement, f);
    }
}

// ── Duration normalization ───────────────────────────────────────────────

/// Sample clock all durations are normalized against.
pub const SAMPLE_RATE: f64 = 2e9;

/// Rewrite every duration literal into an integer number of dt samples.
pub fn transform_durations(program: &mut Program) {
    walk_program_expressions(program, &mut |expr| {
        if let Expression::DurationLiteral { value, unit } = expr {
            if *unit != TimeUnit::Dt {
                *value = (*value * unit.in_seconds() * SAMPLE_RATE).round();
                *unit = TimeUnit::Dt;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expression as E;

    #[test]
    fn ns_duration_becomes_dt() {
        let mut program = Program::new(vec![Statement::Delay {
            duration: E::duration(32.0, TimeUnit::Ns),
            qubits: vec![E::ident("$0")],
        }]);
        transform_durations(&mut program);
        let Statement::Delay { duration, .. } = &program.statements[0] else {
            panic!("expected delay");
        };
        assert_eq!(*duration, E::duration(64.0, TimeUnit::Dt));
    }

    #[test]
    fn dt_duration_is_untouched() {
        let mut program = Program::new(vec![Statement::Delay {
            duration: E::duration(48.0, TimeUnit::Dt),
            qubits: vec![],
        }]);
        transform_durations(&mut program);
        let Statement::Delay { duration, .. } = &program.statements[0] else {
            panic!("expected delay");
        };
        assert_eq!(*duration, E::duration(48.0, TimeUnit::Dt));
    }

    #[test]
    fn durations_inside_defcal_bodies_are_rewritten() {
        let mut program = Program::new(vec![Statement::Defcal(crate::ast::Defcal {
            name: "measure".to_string(),
            args: vec![],
            qubits: vec!["$0".to_string()],
            return_type: None,
            body: vec![Statement::Delay {
                duration: E::duration(1.0, TimeUnit::Us),
                qubits: vec![E::ident("rx_frame")],
            }],
        })]);
        transform_durations(&mut program);
        let Statement::Defcal(defcal) = &program.statements[0] else {
            panic!("expected defcal");
        };
        let Statement::Delay { duration, .. } = &defcal.body[0] else {
            panic!("expected delay");
        };
        assert_eq!(*duration, E::duration(2000.0, TimeUnit::Dt));
    }

    #[test]
    fn walker_reaches_range_bounds() {
        let mut program = Program::new(vec![Statement::ForIn(crate::ast::ForIn {
            ty: ClassicalType::Int { size: None },
            variable: "i".to_string(),
            set: Expression::Range {
                start: Some(Box::new(E::duration(16.0, TimeUnit::Ns))),
                end: Some(Box::new(E::int(10))),
                step: None,
            },
            block: vec![],
        })]);
        transform_durations(&mut program);
        let Statement::ForIn(for_in) = &program.statements[0] else {
            panic!("expected for");
        };
        let Expression::Range { start: Some(start), .. } = &for_in.set else {
            panic!("expected range");
        };
        assert_eq!(**start, E::duration(32.0, TimeUnit::Dt));
    }
}
