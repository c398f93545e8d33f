// stack_analysis.rs — Classify for-loop variables as cvar or var
//
// SEQC distinguishes compile-time `cvar` loop variables from runtime
// `var` ones. A loop variable that reaches a function call argument
// must be a cvar so the compiler can unroll the call. Calls the printer
// handles specially (e.g. `ones`) are skipped; declaration initializers
// never force a cvar.

use crate::ast::{DefcalArg, Expression, ForIn, Statement};

pub struct StackAnalyzer<'a> {
    variable: &'a str,
    skip_calls: &'a [&'a str],
    constant: bool,
}

/// True when `for_in`'s loop variable must be emitted as a `cvar`.
pub fn needs_constant_variable(for_in: &ForIn, skip_calls: &[&str]) -> bool {
    let mut analyzer = StackAnalyzer {
        variable: &for_in.variable,
        skip_calls,
        constant: false,
    };
    analyzer.scan_block(&for_in.block);
    analyzer.constant
}

impl StackAnalyzer<'_> {
    fn scan_block(&mut self, statements: &[Statement]) {
        for statement in statements {
            self.scan_statement(statement);
        }
    }

    fn scan_statement(&mut self, statement: &Statement) {
        match statement {
            // Initializers are printed verbatim and never unrolled.
            Statement::ClassicalDeclaration { .. } | Statement::ConstantDeclaration { .. } => {}
            Statement::Expression(expr) => self.scan_expression(expr),
            Statement::GateCall(call) => {
                for arg in call.args.iter().chain(&call.qubits) {
                    self.scan_expression(arg);
                }
            }
            Statement::Measurement(measurement) => {
                self.scan_expression(&measurement.qubit);
                if let Some(target) = &measurement.target {
                    self.scan_expression(target);
                }
            }
            Statement::Reset { qubits } | Statement::Barrier { qubits } => {
                for qubit in qubits {
                    self.scan_expression(qubit);
                }
            }
            Statement::Delay { duration, qubits } => {
                self.scan_expression(duration);
                for qubit in qubits {
                    self.scan_expression(qubit);
                }
            }
            Statement::Calibration { body } => self.scan_block(body),
            Statement::Defcal(defcal) => {
                for arg in &defcal.args {
                    if let DefcalArg::Literal(expr) = arg {
                        self.scan_expression(expr);
                    }
                }
                self.scan_block(&defcal.body);
            }
            Statement::Subroutine(sub) => self.scan_block(&sub.body),
            Statement::Return(Some(expr)) => self.scan_expression(expr),
            Statement::Branch {
                condition,
                if_block,
                else_block,
            } => {
                self.scan_expression(condition);
                self.scan_block(if_block);
                self.scan_block(else_block);
            }
            Statement::ForIn(inner) => {
                self.scan_expression(&inner.set);
                self.scan_block(&inner.block);
            }
            Statement::While { condition, block } => {
                self.scan_expression(condition);
                self.scan_block(block);
            }
            Statement::Assignment { lvalue, rvalue, .. } => {
                self.scan_expression(lvalue);
                self.scan_expression(rvalue);
            }
            Statement::Alias { value, .. } => self.scan_expression(value),
            _ => {}
        }
    }

    fn scan_expression(&mut self, expr: &Expression) {
        match expr {
            Expression::Identifier(name) => {
                if name == self.variable {
                    self.constant = true;
                }
            }
            Expression::Call { name, args } => {
                if !self.skip_calls.contains(&name.as_str()) {
                    for arg in args {
                        self.scan_expression(arg);
                    }
                }
            }
            Expression::Unary { expr, .. } => self.scan_expression(expr),
            Expression::Binary { lhs, rhs, .. } | Expression::Concatenation { lhs, rhs } => {
                self.scan_expression(lhs);
                self.scan_expression(rhs);
            }
            Expression::Index { collection, index } => {
                self.scan_expression(collection);
                for i in index {
                    self.scan_expression(i);
                }
            }
            Expression::ArrayLiteral(values) | Expression::DiscreteSet(values) => {
                for value in values {
                    self.scan_expression(value);
                }
            }
            Expression::Range { start, end, step } => {
                for bound in [start, end, step].into_iter().flatten() {
                    self.scan_expression(bound);
                }
            }
            Expression::SizeOf { target, dim } => {
                self.scan_expression(target);
                if let Some(dim) = dim {
                    self.scan_expression(dim);
                }
            }
            _ => {}
        }
    }
}
