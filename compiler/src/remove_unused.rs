// remove_unused.rs — Dead declaration elimination
//
// Two phases: a visitor collects declared names and the subset never
// referenced, then a transformer drops unused declarations,
// subroutines and defcals, gate calls with no declared defcal, and
// measurement assignments whose defcal lost its return statement.
// Run twice per core: removing a statement can orphan the
// declarations it referenced.

use std::collections::BTreeSet;

use crate::ast::{Defcal, Expression, Program, Statement};
use crate::mangle::{self, FunctionSignature};

/// Remove declarations, defcals and calls with no remaining use.
pub fn remove_unused(program: &mut Program) {
    let (unused, declared) = determine_unused(program);
    let mut remover = Remover {
        unused,
        declared,
        remove_assignment: BTreeSet::new(),
    };
    let statements = std::mem::take(&mut program.statements);
    program.statements = remover.filter_block(statements);
}

fn reset_signature(qubits: &[Expression]) -> FunctionSignature {
    FunctionSignature {
        name: "reset".to_string(),
        params: Vec::new(),
        qubits: qubits.iter().map(mangle::expression_token).collect(),
        return_type: String::new(),
    }
}

// ── Phase one: usage collection ──────────────────────────────────────────

/// Returns (unused, declared) name sets. Defcals are tracked by their
/// mangled names.
pub fn determine_unused(program: &Program) -> (BTreeSet<String>, BTreeSet<String>) {
    let mut visitor = DetermineUnused::default();
    visitor.visit_block(&program.statements);
    (visitor.unused, visitor.declared)
}

#[derive(Default)]
struct DetermineUnused {
    declared: BTreeSet<String>,
    unused: BTreeSet<String>,
}

impl DetermineUnused {
    fn visit_block(&mut self, statements: &[Statement]) {
        for statement in statements {
            self.visit_statement(statement);
        }
    }

    fn declare(&mut self, name: &str) {
        self.declared.insert(name.to_string());
        self.unused.insert(name.to_string());
    }

    fn discard_match(&mut self, signature: &FunctionSignature) {
        let candidates: Vec<String> = self.unused.iter().cloned().collect();
        if let Some(first) = mangle::match_signature(signature, &candidates).first() {
            self.unused.remove(first);
        }
    }

    /// Every identifier mentioned in an expression counts as a use,
    /// including function call names.
    fn use_expression(&mut self, expr: &Expression) {
        match expr {
            Expression::Identifier(name) => {
                self.unused.remove(name);
            }
            Expression::Unary { expr, .. } => self.use_expression(expr),
            Expression::Binary { lhs, rhs, .. } | Expression::Concatenation { lhs, rhs } => {
                self.use_expression(lhs);
                self.use_expression(rhs);
            }
            Expression::Call { name, args } => {
                self.unused.remove(name);
                for arg in args {
                    self.use_expression(arg);
                }
            }
            Expression::ArrayLiteral(items) | Expression::DiscreteSet(items) => {
                for item in items {
                    self.use_expression(item);
                }
            }
            Expression::Index { collection, index } => {
                self.use_expression(collection);
                for i in index {
                    self.use_expression(i);
                }
            }
            Expression::Range { start, end, step } => {
                for part in [start, end, step].into_iter().flatten() {
                    self.use_expression(part);
                }
            }
            Expression::SizeOf { target, dim } => {
                self.use_expression(target);
                if let Some(dim) = dim {
                    self.use_expression(dim);
                }
            }
            _ => {}
        }
    }

    fn visit_statement(&mut self, statement: &Statement) {
        match statement {
            Statement::ClassicalDeclaration { name, init, .. } => {
                self.declare(name);
                if let Some(init) = init {
                    self.use_expression(init);
                }
            }
            Statement::ConstantDeclaration { name, init, .. } => {
                self.declare(name);
                self.use_expression(init);
            }
            Statement::Subroutine(sub) => {
                self.declare(&sub.name);
                self.visit_block(&sub.body);
            }
            Statement::Defcal(defcal) => {
                let mangled = mangle::defcal_signature(defcal).mangle();
                self.declare(&mangled);
                self.visit_block(&defcal.body);
            }
            Statement::GateCall(call) => {
                self.discard_match(&mangle::gate_call_signature(call));
                for arg in &call.args {
                    self.use_expression(arg);
                }
            }
            Statement::Measurement(measurement) => {
                self.discard_match(&mangle::measurement_signature(&measurement.qubit));
                if let Some(target) = &measurement.target {
                    self.use_expression(target);
                }
            }
            Statement::Reset { qubits } => {
                self.discard_match(&reset_signature(qubits));
            }
            Statement::Calibration { body } => self.visit_block(body),
            Statement::Expression(expr) => self.use_expression(expr),
            Statement::Return(Some(expr)) => self.use_expression(expr),
            Statement::Delay { duration, qubits } => {
                self.use_expression(duration);
                for qubit in qubits {
                    self.use_expression(qubit);
                }
            }
            Statement::Barrier { qubits } => {
                for qubit in qubits {
                    self.use_expression(qubit);
                }
            }
            Statement::Assignment { lvalue, rvalue, .. } => {
                self.use_expression(lvalue);
                self.use_expression(rvalue);
            }
            Statement::Alias { target, value } => {
                self.declare(target);
                self.use_expression(value);
            }
            Statement::Branch {
                condition,
                if_block,
                else_block,
            } => {
                self.use_expression(condition);
                self.visit_block(if_block);
                self.visit_block(else_block);
            }
            Statement::ForIn(for_in) => {
                self.use_expression(&for_in.set);
                self.visit_block(&for_in.block);
            }
            Statement::While { condition, block } => {
                self.use_expression(condition);
                self.visit_block(block);
            }
            Statement::GateDefinition { body, .. } => self.visit_block(body),
            _ => {}
        }
    }
}

// ── Phase two: removal ───────────────────────────────────────────────────

struct Remover {
    unused: BTreeSet<String>,
    declared: BTreeSet<String>,
    /// Mangled measure signatures whose assignment target must go
    /// because the defcal lost its return statement.
    remove_assignment: BTreeSet<String>,
}

impl Remover {
    fn candidates(set: &BTreeSet<String>) -> Vec<String> {
        set.iter().cloned().collect()
    }

    fn matches(&self, signature: &FunctionSignature, set: &BTreeSet<String>) -> bool {
        !mangle::match_signature(signature, &Self::candidates(set)).is_empty()
    }

    fn filter_block(&mut self, statements: Vec<Statement>) -> Vec<Statement> {
        let mut out = Vec::with_capacity(statements.len());
        for statement in statements {
            if let Some(kept) = self.filter_statement(statement) {
                out.push(kept);
            }
        }
        out
    }

    fn filter_statement(&mut self, statement: Statement) -> Option<Statement> {
        match statement {
            Statement::ClassicalDeclaration { ref name, .. }
            | Statement::ConstantDeclaration { ref name, .. } => {
                if self.unused.contains(name) {
                    None
                } else {
                    Some(statement)
                }
            }
            Statement::Subroutine(mut sub) => {
                sub.body = self.filter_block(sub.body);
                if self.unused.contains(&sub.name) {
                    None
                } else {
                    Some(Statement::Subroutine(sub))
                }
            }
            Statement::Defcal(defcal) => self.filter_defcal(defcal).map(Statement::Defcal),
            Statement::GateCall(call) => {
                if self.matches(&mangle::gate_call_signature(&call), &self.declared) {
                    Some(Statement::GateCall(call))
                } else {
                    None
                }
            }
            Statement::Measurement(mut measurement) => {
                let signature = mangle::measurement_signature(&measurement.qubit);
                if self.remove_assignment.contains(&signature.mangle()) {
                    measurement.target = None;
                }
                if self.matches(&signature, &self.declared) {
                    Some(Statement::Measurement(measurement))
                } else {
                    None
                }
            }
            Statement::Reset { qubits } => {
                if self.matches(&reset_signature(&qubits), &self.declared) {
                    Some(Statement::Reset { qubits })
                } else {
                    None
                }
            }
            Statement::Calibration { body } => Some(Statement::Calibration {
                body: self.filter_block(body),
            }),
            Statement::Branch {
                condition,
                if_block,
                else_block,
            } => Some(Statement::Branch {
                condition,
                if_block: self.filter_block(if_block),
                else_block: self.filter_block(else_block),
            }),
            Statement::ForIn(mut for_in) => {
                for_in.block = self.filter_block(for_in.block);
                Some(Statement::ForIn(for_in))
            }
            Statement::While { condition, block } => Some(Statement::While {
                condition,
                block: self.filter_block(block),
            }),
            other => Some(other),
        }
    }

    fn filter_defcal(&mut self, mut defcal: Defcal) -> Option<Defcal> {
        defcal.body = self.filter_block(defcal.body);
        let used = !self.matches(&mangle::defcal_signature(&defcal), &self.unused);
        // Measure defcals survive regardless: the printer needs them to
        // derive readout settings.
        if (used && !defcal.body.is_empty()) || defcal.name == "measure" {
            if defcal.return_type.is_some() {
                let has_return = defcal
                    .body
                    .iter()
                    .any(|s| matches!(s, Statement::Return(_)));
                if !has_return {
                    defcal.return_type = None;
                    self.remove_assignment
                        .insert(mangle::defcal_signature(&defcal).mangle());
                }
            }
            Some(defcal)
        } else {
            None
        }
    }
}
