// semantics.rs — Semantic analysis of pulse programs
//
// Walks a program with two scoped symbol tables: the main chain rooted
// at the global scope, and a calibration chain created lazily on the
// first `cal`/`defcal` statement. Declarations are checked for
// duplicates, identifiers for existence, and gate calls are matched
// against mangled defcal names. The program itself is not mutated.

use crate::ast::{
    self, ClassicalType, Defcal, DefcalArg, Expression, GateCall, Program, Statement,
};
use crate::diag::{Error, ErrorKind, Result};
use crate::mangle;
use crate::scope::{ScopeContext, ScopedSymbolTable};
use crate::symbols::{builtin_cal_symbols, builtin_symbols, Symbol};

/// Check a whole program. Convenience wrapper over [`SemanticAnalyzer`].
pub fn analyze(program: &Program) -> Result<()> {
    SemanticAnalyzer::new().run(program)
}

pub struct SemanticAnalyzer {
    table: ScopedSymbolTable,
    cal_table: Option<ScopedSymbolTable>,
    context: ScopeContext,
    /// Declarations and scope pushes target the calibration chain.
    in_cal: bool,
}

impl Default for SemanticAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SemanticAnalyzer {
    pub fn new() -> Self {
        Self {
            table: ScopedSymbolTable::new("global", builtin_symbols()),
            cal_table: None,
            context: ScopeContext::Global,
            in_cal: false,
        }
    }

    pub fn run(&mut self, program: &Program) -> Result<()> {
        for statement in &program.statements {
            self.check_statement(statement)?;
        }
        Ok(())
    }

    // ── Scope helpers ────────────────────────────────────────────────

    fn cal_table_mut(&mut self) -> Result<&mut ScopedSymbolTable> {
        if self.cal_table.is_none() {
            self.ensure_in_global_scope("init cal scope")?;
            self.cal_table = Some(ScopedSymbolTable::new("cal_scope", builtin_cal_symbols()));
        }
        Ok(self.cal_table.as_mut().ok_or_else(|| {
            Error::new(ErrorKind::Unhandled, "calibration scope initialization")
        })?)
    }

    fn declare(&mut self, symbol: Symbol) -> Result<()> {
        if self.in_cal {
            self.cal_table_mut()?.insert(symbol)
        } else {
            self.table.insert(symbol)
        }
    }

    fn lookup(&self, name: &str) -> bool {
        if self.in_cal {
            if let Some(cal) = &self.cal_table {
                if cal.lookup(name).is_some() {
                    return true;
                }
            }
        }
        self.table.lookup(name).is_some()
    }

    /// Names visible from the current position, innermost first.
    fn visible_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        if self.in_cal {
            if let Some(cal) = &self.cal_table {
                keys.extend(cal.keys());
            }
        }
        for key in self.table.keys() {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    fn cal_keys(&self) -> Vec<String> {
        self.cal_table.as_ref().map(|t| t.keys()).unwrap_or_default()
    }

    fn ensure_in_global_scope(&self, name: &str) -> Result<()> {
        if self.context != ScopeContext::Global {
            return Err(Error::new(
                ErrorKind::NotInGlobalScope,
                format!("'{name}' is only allowed in global scope"),
            ));
        }
        Ok(())
    }

    fn with_local_scope(
        &mut self,
        name: &str,
        context: ScopeContext,
        f: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<()> {
        if self.in_cal {
            self.cal_table_mut()?.push_scope(name);
        } else {
            self.table.push_scope(name);
        }
        let enclosing = self.context;
        self.context = context;
        let result = f(self);
        self.context = enclosing;
        if self.in_cal {
            if let Some(cal) = self.cal_table.as_mut() {
                cal.pop_scope();
            }
        } else {
            self.table.pop_scope();
        }
        result
    }

    /// Local blocks (if/else, loops) keep the enclosing context unless
    /// it was global.
    fn local_context(&self) -> ScopeContext {
        match self.context {
            ScopeContext::Global => ScopeContext::Local,
            other => other,
        }
    }

    // ── Statements ───────────────────────────────────────────────────

    fn check_statement(&mut self, statement: &Statement) -> Result<()> {
        match statement {
            Statement::ClassicalDeclaration { ty, name, init } => {
                if matches!(ty, ClassicalType::Array { .. }) {
                    self.ensure_in_global_scope(name)?;
                }
                if let Some(init) = init {
                    self.check_expression(init)?;
                }
                self.declare(Symbol::Classical {
                    name: name.clone(),
                    ty: ty.type_name().to_string(),
                })
            }
            Statement::ConstantDeclaration { ty, name, init } => {
                self.check_expression(init)?;
                self.declare(Symbol::Constant {
                    name: name.clone(),
                    ty: ty.type_name().to_string(),
                })
            }
            Statement::IoDeclaration { ty, name, .. } => self.declare(Symbol::Io {
                name: name.clone(),
                ty: ty.type_name().to_string(),
            }),
            Statement::QubitDeclaration { name, .. } => {
                self.ensure_in_global_scope(name)?;
                self.declare(Symbol::Quantum { name: name.clone() })
            }
            Statement::ExternDeclaration {
                name,
                params,
                return_type,
            } => self.declare(Symbol::Extern {
                name: name.clone(),
                params: params.iter().map(|p| p.type_name().to_string()).collect(),
                return_type: return_type.as_ref().map(|t| t.type_name().to_string()),
            }),
            Statement::Subroutine(sub) => {
                self.ensure_in_global_scope(&sub.name)?;
                self.declare(Symbol::Subroutine {
                    name: sub.name.clone(),
                    params: sub
                        .params
                        .iter()
                        .map(|p| p.ty.type_name().to_string())
                        .collect(),
                    return_type: sub.return_type.as_ref().map(|t| t.type_name().to_string()),
                })?;
                let params = sub.params.clone();
                let body = sub.body.clone();
                self.with_local_scope(&sub.name, ScopeContext::Subroutine, |this| {
                    for param in &params {
                        this.declare(Symbol::Classical {
                            name: param.name.clone(),
                            ty: param.ty.type_name().to_string(),
                        })?;
                    }
                    for statement in &body {
                        this.check_statement(statement)?;
                    }
                    Ok(())
                })
            }
            Statement::GateDefinition {
                name,
                params,
                qubits,
                body,
            } => {
                self.ensure_in_global_scope(name)?;
                self.declare(Symbol::Gate {
                    name: name.clone(),
                    params: params.clone(),
                    qubits: qubits.clone(),
                })?;
                let params = params.clone();
                let qubits = qubits.clone();
                let body = body.clone();
                self.with_local_scope(name, ScopeContext::Subroutine, |this| {
                    for param in &params {
                        this.declare(Symbol::Classical {
                            name: param.clone(),
                            ty: "ANGLE".to_string(),
                        })?;
                    }
                    for qubit in &qubits {
                        this.declare(Symbol::Quantum {
                            name: qubit.clone(),
                        })?;
                    }
                    for statement in &body {
                        this.check_statement(statement)?;
                    }
                    Ok(())
                })
            }
            Statement::Defcal(defcal) => self.check_defcal(defcal),
            Statement::Calibration { body } => {
                self.ensure_in_global_scope("cal")?;
                self.cal_table_mut()?;
                let was_in_cal = self.in_cal;
                let enclosing = self.context;
                self.in_cal = true;
                self.context = ScopeContext::Defcal;
                let result = body.iter().try_for_each(|s| self.check_statement(s));
                self.in_cal = was_in_cal;
                self.context = enclosing;
                result
            }
            Statement::GateCall(call) => self.check_gate_call(call),
            Statement::Measurement(measurement) => {
                let signature = mangle::measurement_signature(&measurement.qubit);
                self.match_signature(&signature, &measurement.qubit.to_string())?;
                if let Some(target) = &measurement.target {
                    self.check_expression(target)?;
                }
                Ok(())
            }
            Statement::Reset { qubits } | Statement::Barrier { qubits } => {
                qubits.iter().try_for_each(|q| self.check_expression(q))
            }
            Statement::Delay { duration, qubits } => {
                self.check_expression(duration)?;
                qubits.iter().try_for_each(|q| self.check_expression(q))
            }
            Statement::Branch {
                condition,
                if_block,
                else_block,
            } => {
                self.check_expression(condition)?;
                let context = self.local_context();
                let if_block = if_block.clone();
                self.with_local_scope("if_scope", context, |this| {
                    if_block.iter().try_for_each(|s| this.check_statement(s))
                })?;
                let else_block = else_block.clone();
                self.with_local_scope("else_scope", context, |this| {
                    else_block.iter().try_for_each(|s| this.check_statement(s))
                })
            }
            Statement::ForIn(for_in) => {
                self.check_expression(&for_in.set)?;
                let context = self.local_context();
                let symbol = Symbol::Classical {
                    name: for_in.variable.clone(),
                    ty: for_in.ty.type_name().to_string(),
                };
                let block = for_in.block.clone();
                self.with_local_scope("for_loop_scope", context, |this| {
                    this.declare(symbol)?;
                    block.iter().try_for_each(|s| this.check_statement(s))
                })
            }
            Statement::While { condition, block } => {
                self.check_expression(condition)?;
                let context = self.local_context();
                let block = block.clone();
                self.with_local_scope("while_scope", context, |this| {
                    block.iter().try_for_each(|s| this.check_statement(s))
                })
            }
            Statement::Assignment { lvalue, rvalue, .. } => {
                self.check_expression(lvalue)?;
                self.check_expression(rvalue)
            }
            Statement::Alias { target, value } => {
                self.declare(Symbol::Alias {
                    name: target.clone(),
                })?;
                self.check_expression(value)
            }
            Statement::Expression(expr) => self.check_expression(expr),
            Statement::Return(expr) => match expr {
                Some(e) => self.check_expression(e),
                None => Ok(()),
            },
            Statement::Include { .. }
            | Statement::Break
            | Statement::Continue
            | Statement::End => Ok(()),
        }
    }

    fn check_defcal(&mut self, defcal: &Defcal) -> Result<()> {
        self.ensure_in_global_scope(&defcal.name)?;
        let mangled = mangle::defcal_signature(defcal).mangle();
        {
            let was_in_cal = self.in_cal;
            self.in_cal = true;
            let result = self.declare(Symbol::Defcal { name: mangled });
            self.in_cal = was_in_cal;
            result?;
        }

        let args = defcal.args.clone();
        let qubits = defcal.qubits.clone();
        let body = defcal.body.clone();
        let was_in_cal = self.in_cal;
        self.in_cal = true;
        let result = self.with_local_scope(&defcal.name, ScopeContext::Defcal, |this| {
            for arg in &args {
                if let DefcalArg::Classical { ty, name } = arg {
                    this.declare(Symbol::Classical {
                        name: name.clone(),
                        ty: ty.type_name().to_string(),
                    })?;
                }
            }
            for qubit in &qubits {
                if !ast::is_physical_qubit(qubit) {
                    this.declare(Symbol::Quantum {
                        name: qubit.clone(),
                    })?;
                }
            }
            body.iter().try_for_each(|s| this.check_statement(s))
        });
        self.in_cal = was_in_cal;
        result
    }

    fn check_gate_call(&mut self, call: &GateCall) -> Result<()> {
        let signature = mangle::gate_call_signature(call);
        self.match_signature(&signature, &call.name)
    }

    fn match_signature(
        &self,
        signature: &mangle::FunctionSignature,
        display_name: &str,
    ) -> Result<()> {
        let matches = mangle::match_signature(signature, &self.visible_keys());
        if !matches.is_empty() {
            return Ok(());
        }
        let matches = mangle::match_signature(signature, &self.cal_keys());
        if !matches.is_empty() {
            return Ok(());
        }
        Err(Error::new(
            ErrorKind::IdentifierNotFound,
            format!("no defcal matches '{display_name}'"),
        ))
    }

    // ── Expressions ──────────────────────────────────────────────────

    fn check_identifier(&self, name: &str) -> Result<()> {
        // Physical qubits and the openQASM constants need no declaration.
        if ast::is_physical_qubit(name)
            || matches!(name, "pi" | "π" | "tau" | "τ" | "euler" | "ℇ" | "ii")
        {
            return Ok(());
        }
        if self.lookup(name) {
            Ok(())
        } else {
            Err(Error::new(
                ErrorKind::IdentifierNotFound,
                format!("'{name}'"),
            ))
        }
    }

    fn check_expression(&mut self, expr: &Expression) -> Result<()> {
        match expr {
            Expression::Identifier(name) => self.check_identifier(name),
            Expression::IntegerLiteral(_)
            | Expression::FloatLiteral(_)
            | Expression::ImaginaryLiteral(_)
            | Expression::BooleanLiteral(_)
            | Expression::BitstringLiteral { .. }
            | Expression::DurationLiteral { .. } => Ok(()),
            Expression::ArrayLiteral(items) | Expression::DiscreteSet(items) => {
                items.iter().try_for_each(|e| self.check_expression(e))
            }
            Expression::Unary { expr, .. } => self.check_expression(expr),
            Expression::Binary { lhs, rhs, .. }
            | Expression::Concatenation { lhs, rhs } => {
                self.check_expression(lhs)?;
                self.check_expression(rhs)
            }
            Expression::Call { name, args } => {
                self.check_identifier(name)?;
                args.iter().try_for_each(|a| self.check_expression(a))
            }
            Expression::Index { collection, index } => {
                self.check_expression(collection)?;
                index.iter().try_for_each(|e| self.check_expression(e))
            }
            Expression::Range { start, end, step } => {
                for part in [start, end, step].into_iter().flatten() {
                    self.check_expression(part)?;
                }
                Ok(())
            }
            Expression::DurationOf { .. } => Ok(()),
            Expression::SizeOf { target, .. } => self.check_expression(target),
        }
    }
}
