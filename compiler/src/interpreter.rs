// interpreter.rs — Tree-walking evaluation of pulse programs
//
// Executes the classical fragment of a program against a hardware
// setup: declarations, arithmetic, loops, subroutines, defcal dispatch
// and frame phase/frequency bookkeeping. Pulse emission itself
// (play/capture) is a no-op here; the printer and analysis passes drive
// this evaluator and add their own behavior at those points.

use std::collections::HashMap;
use std::f64::consts::PI;

use crate::ast::{
    BinaryOperator, ClassicalType, Defcal, DefcalArg, Expression, GateCall, Program, Statement,
    Subroutine, TimeUnit, UnaryOperator,
};
use crate::call_stack::{ARType, ActivationRecord, CallStack, Members};
use crate::diag::{Error, ErrorKind, Result};
use crate::duration::Duration;
use crate::mangle::{self, FunctionSignature};
use crate::setup::{Frame, Setup};
use crate::waveforms::{self, Complex};

// ── Values ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Int(i64),
    Float(f64),
    Complex(Complex),
    Bool(bool),
    Waveform(Vec<Complex>),
    Array(Vec<Value>),
    Port(String),
    Frame(String),
}

impl Value {
    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Value::Int(v) => Ok(*v as f64),
            Value::Float(v) => Ok(*v),
            Value::Bool(v) => Ok(if *v { 1.0 } else { 0.0 }),
            other => Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("expected a number, got {other:?}"),
            )),
        }
    }

    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Value::Int(v) => Ok(*v),
            Value::Float(v) if v.fract() == 0.0 => Ok(*v as i64),
            other => Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("expected an integer, got {other:?}"),
            )),
        }
    }

    pub fn truthy(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Int(v) => Ok(*v != 0),
            Value::Float(v) => Ok(*v != 0.0),
            other => Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("expected a condition, got {other:?}"),
            )),
        }
    }

    /// Sample count of a waveform value, if this is one.
    pub fn waveform_len(&self) -> Option<usize> {
        match self {
            Value::Waveform(samples) => Some(samples.len()),
            _ => None,
        }
    }
}

/// Control-flow outcome of executing a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

pub type ExternFn = Box<dyn Fn(&[Value]) -> Result<Value>>;

/// Hook invoked at pulse emission points. The interpreter itself treats
/// play/capture and delays as no-ops; analysis passes install an
/// observer to inspect the arguments with full evaluation context.
pub trait PulseObserver {
    fn pulse(&mut self, _interp: &mut Interpreter, _name: &str, _args: &[Expression]) -> Result<()> {
        Ok(())
    }

    fn delay(&mut self, _interp: &mut Interpreter, _duration: &Expression) -> Result<()> {
        Ok(())
    }
}

/// Wrap a phase into (−π, π].
pub fn wrap_phase(phase: f64) -> f64 {
    (phase + PI).rem_euclid(2.0 * PI) - PI
}

const WHILE_ITERATION_CAP: usize = 1_000_000;

// ── Interpreter ──────────────────────────────────────────────────────────

pub struct Interpreter {
    pub call_stack: CallStack,
    pub setup: Setup,
    pub calibration_scope: Members,
    pub defcal_nodes: HashMap<String, Defcal>,
    pub defcal_names: Vec<String>,
    pub subroutines: HashMap<String, Subroutine>,
    pub external_funcs: HashMap<String, ExternFn>,
    /// When false, loop bodies are not executed (analysis mode).
    pub visit_loops: bool,
    /// When true, for-loops run only for the probe values
    /// [start, start + step, end] instead of the full range.
    pub probe_loops: bool,
    pub observer: Option<Box<dyn PulseObserver>>,
}

impl Interpreter {
    pub fn new(setup: Setup) -> Self {
        Self {
            call_stack: CallStack::new(),
            setup,
            calibration_scope: Members::default(),
            defcal_nodes: HashMap::new(),
            defcal_names: Vec::new(),
            subroutines: HashMap::new(),
            external_funcs: HashMap::new(),
            visit_loops: true,
            probe_loops: false,
            observer: None,
        }
    }

    pub fn without_loops(setup: Setup) -> Self {
        let mut interp = Self::new(setup);
        interp.visit_loops = false;
        interp
    }

    pub fn register_extern(&mut self, name: impl Into<String>, f: ExternFn) {
        self.external_funcs.insert(name.into(), f);
    }

    /// Execute a whole program inside a fresh PROGRAM record.
    pub fn run(&mut self, program: &Program) -> Result<()> {
        let record = ActivationRecord::new("main", ARType::Program, 1);
        self.with_record(record, |interp| {
            for statement in &program.statements {
                interp.exec_stmt(statement)?;
            }
            Ok(())
        })
    }

    pub fn with_record<T>(
        &mut self,
        record: ActivationRecord,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.call_stack.push(record);
        let result = f(self);
        self.call_stack.pop();
        result
    }

    // ── Statements ───────────────────────────────────────────────────

    pub fn exec_block(&mut self, statements: &[Statement]) -> Result<Flow> {
        for statement in statements {
            match self.exec_stmt(statement)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    pub fn exec_stmt(&mut self, statement: &Statement) -> Result<Flow> {
        match statement {
            Statement::ClassicalDeclaration { ty, name, init } => {
                let value = self.declaration_value(ty, name, init.as_ref())?;
                self.call_stack.declare(name.clone(), value)?;
                Ok(Flow::Normal)
            }
            Statement::ConstantDeclaration { name, init, .. } => {
                let value = self.eval(init)?;
                self.call_stack.declare(name.clone(), value)?;
                Ok(Flow::Normal)
            }
            Statement::QubitDeclaration { name, .. } => {
                self.call_stack.declare(name.clone(), Value::None)?;
                Ok(Flow::Normal)
            }
            Statement::Expression(expr) => {
                self.eval(expr)?;
                Ok(Flow::Normal)
            }
            Statement::Assignment { lvalue, op, rvalue } => {
                self.exec_assignment(lvalue, *op, rvalue)?;
                Ok(Flow::Normal)
            }
            Statement::Alias { target, value } => {
                let v = self.eval_alias_value(value)?;
                self.call_stack.declare(target.clone(), v)?;
                Ok(Flow::Normal)
            }
            Statement::Return(expr) => {
                let value = match expr {
                    Some(e) => self.eval(e)?,
                    None => Value::None,
                };
                Ok(Flow::Return(value))
            }
            Statement::Break => Ok(Flow::Break),
            Statement::Continue => Ok(Flow::Continue),
            Statement::End => Ok(Flow::Return(Value::None)),
            Statement::Branch {
                condition,
                if_block,
                else_block,
            } => {
                if self.eval(condition)?.truthy()? {
                    self.exec_block(if_block)
                } else {
                    self.exec_block(else_block)
                }
            }
            Statement::ForIn(for_in) => self.exec_for(for_in),
            Statement::While { condition, block } => self.exec_while(condition, block),
            Statement::Subroutine(sub) => {
                self.subroutines.insert(sub.name.clone(), sub.clone());
                Ok(Flow::Normal)
            }
            Statement::ExternDeclaration { .. } => Ok(Flow::Normal),
            Statement::Defcal(defcal) => {
                let mangled = mangle::defcal_signature(defcal).mangle();
                self.defcal_nodes.insert(mangled.clone(), defcal.clone());
                if !self.defcal_names.contains(&mangled) {
                    self.defcal_names.push(mangled);
                }
                Ok(Flow::Normal)
            }
            Statement::Calibration { body } => {
                self.exec_cal_block(body)?;
                Ok(Flow::Normal)
            }
            Statement::GateCall(call) => {
                self.execute_gate_call(call)?;
                Ok(Flow::Normal)
            }
            Statement::Measurement(measurement) => {
                let value = self.execute_measurement(&measurement.qubit)?;
                if let Some(Expression::Identifier(target)) = &measurement.target {
                    self.call_stack.assign(target, value)?;
                }
                Ok(Flow::Normal)
            }
            Statement::Reset { qubits } => {
                for qubit in qubits {
                    let call = GateCall {
                        modifiers: Vec::new(),
                        name: "reset".to_string(),
                        args: Vec::new(),
                        qubits: vec![qubit.clone()],
                    };
                    self.execute_gate_call(&call)?;
                }
                Ok(Flow::Normal)
            }
            Statement::Delay { duration, .. } => {
                if let Some(mut observer) = self.observer.take() {
                    let result = observer.delay(self, duration);
                    self.observer = Some(observer);
                    result?;
                }
                Ok(Flow::Normal)
            }
            Statement::Barrier { qubits } => {
                let frames: Vec<String> = qubits
                    .iter()
                    .filter_map(|q| q.as_identifier())
                    .filter(|n| self.setup.frames.contains_key(*n))
                    .map(str::to_string)
                    .collect();
                if !frames.is_empty() {
                    self.setup.barrier(&frames)?;
                }
                Ok(Flow::Normal)
            }
            Statement::Include { filename } => Err(Error::new(
                ErrorKind::CompileOut,
                format!("include '{filename}' should have been resolved"),
            )),
            Statement::IoDeclaration { name, .. } => Err(Error::new(
                ErrorKind::CompileOut,
                format!("io declaration '{name}' should have been resolved"),
            )),
            Statement::GateDefinition { name, .. } => Err(Error::new(
                ErrorKind::CompileOut,
                format!("gate definition '{name}' has no runtime form"),
            )),
        }
    }

    fn declaration_value(
        &mut self,
        ty: &ClassicalType,
        name: &str,
        init: Option<&Expression>,
    ) -> Result<Value> {
        match ty {
            ClassicalType::Port => {
                self.setup.port(name)?;
                Ok(Value::Port(name.to_string()))
            }
            ClassicalType::Frame => {
                let Some(Expression::Call { name: func, args }) = init else {
                    return Err(Error::new(
                        ErrorKind::Unhandled,
                        format!("frame '{name}' must be initialized with newframe(port, frequency, phase)"),
                    ));
                };
                if func != "newframe" || args.len() != 3 {
                    return Err(Error::new(
                        ErrorKind::Unhandled,
                        format!("frame '{name}' must be initialized with newframe(port, frequency, phase)"),
                    ));
                }
                let port = match self.eval(&args[0])? {
                    Value::Port(p) => p,
                    other => {
                        return Err(Error::new(
                            ErrorKind::InvalidArgument,
                            format!("newframe first argument must be a port, got {other:?}"),
                        ))
                    }
                };
                let frequency = self.eval(&args[1])?.as_f64()?;
                let phase = self.eval(&args[2])?.as_f64()?;
                self.setup.frames.insert(
                    name.to_string(),
                    Frame {
                        name: name.to_string(),
                        port,
                        frequency,
                        phase,
                        time: Duration::new(0.0, TimeUnit::Dt),
                    },
                );
                Ok(Value::Frame(name.to_string()))
            }
            ClassicalType::Array { dims, .. } => match init {
                Some(expr) => self.eval(expr),
                None => {
                    let mut value = Value::Int(0);
                    for dim in dims.iter().rev() {
                        let n = self.eval(dim)?.as_i64()?;
                        value = Value::Array(vec![value; n.max(0) as usize]);
                    }
                    Ok(value)
                }
            },
            ClassicalType::Bit { size } => match init {
                Some(expr) => self.eval(expr),
                None => match size {
                    Some(expr) => {
                        let size_expr = expr.as_ref().clone();
                        let n = self.eval(&size_expr)?.as_i64()?;
                        Ok(Value::Array(vec![Value::Int(0); n.max(0) as usize]))
                    }
                    None => Ok(Value::Int(0)),
                },
            },
            ClassicalType::Waveform => match init {
                Some(expr) => self.eval(expr),
                None => Ok(Value::None),
            },
            _ => match init {
                Some(expr) => self.eval(expr),
                None => Ok(Value::None),
            },
        }
    }

    /// Alias values allow one extra form over plain expressions: a
    /// collection sliced by a range, `w[start:end]`. Range ends are
    /// exclusive, matching for-loop ranges.
    fn eval_alias_value(&mut self, value: &Expression) -> Result<Value> {
        let Expression::Index { collection, index } = value else {
            return self.eval(value);
        };
        let [Expression::Range { start, end, step }] = index.as_slice() else {
            return self.eval(value);
        };
        let collection = self.eval(collection)?;
        let start = match start {
            Some(e) => self.eval(e)?.as_i64()?,
            None => 0,
        };
        let step = match step {
            Some(e) => self.eval(e)?.as_i64()?,
            None => 1,
        };
        if step <= 0 {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "alias range step must be positive",
            ));
        }
        match collection {
            Value::Waveform(samples) => {
                let end = match end {
                    Some(e) => self.eval(e)?.as_i64()?,
                    None => samples.len() as i64,
                };
                Ok(Value::Waveform(slice_values(&samples, start, end, step)))
            }
            Value::Array(items) => {
                let end = match end {
                    Some(e) => self.eval(e)?.as_i64()?,
                    None => items.len() as i64,
                };
                Ok(Value::Array(slice_values(&items, start, end, step)))
            }
            other => Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("cannot slice {other:?}"),
            )),
        }
    }

    fn exec_assignment(
        &mut self,
        lvalue: &Expression,
        op: crate::ast::AssignmentOperator,
        rvalue: &Expression,
    ) -> Result<()> {
        use crate::ast::AssignmentOperator as Op;
        let name = match lvalue {
            Expression::Identifier(name) => name.clone(),
            other => {
                return Err(Error::new(
                    ErrorKind::Unhandled,
                    format!("unsupported assignment target: {other}"),
                ))
            }
        };
        let rhs = self.eval(rvalue)?;
        let value = match op {
            Op::Assign => rhs,
            compound => {
                let current = self.call_stack.lookup(&name)?;
                let binop = match compound {
                    Op::PlusAssign => BinaryOperator::Plus,
                    Op::MinusAssign => BinaryOperator::Minus,
                    Op::TimesAssign => BinaryOperator::Times,
                    Op::DivAssign => BinaryOperator::Div,
                    Op::Assign => unreachable!(),
                };
                binary_op(binop, current, rhs)?
            }
        };
        self.call_stack.assign(&name, value)
    }

    fn exec_for(&mut self, for_in: &crate::ast::ForIn) -> Result<Flow> {
        if !self.visit_loops {
            return Ok(Flow::Normal);
        }
        let items = self.loop_values(&for_in.set)?;
        for item in items {
            let record = ActivationRecord::new(
                "for loop",
                ARType::Loop,
                self.call_stack.nesting_level() + 1,
            );
            record.set(for_in.variable.clone(), item);
            let flow = self.with_record(record, |interp| interp.exec_block(&for_in.block))?;
            match flow {
                Flow::Break => break,
                Flow::Continue | Flow::Normal => {}
                Flow::Return(v) => return Ok(Flow::Return(v)),
            }
        }
        Ok(Flow::Normal)
    }

    /// Values a for-loop iterates over: an exclusive-end range or a
    /// discrete set.
    pub fn loop_values(&mut self, set: &Expression) -> Result<Vec<Value>> {
        match set {
            Expression::Range { start, end, step } => {
                let start = match start {
                    Some(e) => self.eval(e)?.as_i64()?,
                    None => 0,
                };
                let end = match end {
                    Some(e) => self.eval(e)?.as_i64()?,
                    None => {
                        return Err(Error::new(
                            ErrorKind::Unhandled,
                            "for-loop range requires an end value",
                        ))
                    }
                };
                let step = match step {
                    Some(e) => self.eval(e)?.as_i64()?,
                    None => 1,
                };
                if step == 0 {
                    return Err(Error::new(ErrorKind::InvalidArgument, "range step of 0"));
                }
                if self.probe_loops {
                    return Ok(vec![
                        Value::Int(start),
                        Value::Int(start + step),
                        Value::Int(end),
                    ]);
                }
                let mut values = Vec::new();
                let mut i = start;
                while (step > 0 && i < end) || (step < 0 && i > end) {
                    values.push(Value::Int(i));
                    i += step;
                }
                Ok(values)
            }
            Expression::DiscreteSet(items) => {
                if self.probe_loops {
                    return Err(Error::new(
                        ErrorKind::Unhandled,
                        "for-in over a discrete set cannot be probed",
                    ));
                }
                items.iter().map(|e| self.eval(e)).collect()
            }
            other => Err(Error::new(
                ErrorKind::Unhandled,
                format!("for-in over unsupported collection: {other}"),
            )),
        }
    }

    fn exec_while(&mut self, condition: &Expression, block: &[Statement]) -> Result<Flow> {
        if !self.visit_loops {
            return Ok(Flow::Normal);
        }
        let mut iterations = 0usize;
        while self.eval(condition)?.truthy()? {
            iterations += 1;
            if iterations > WHILE_ITERATION_CAP {
                return Err(Error::new(
                    ErrorKind::Unhandled,
                    format!("while loop exceeded {WHILE_ITERATION_CAP} iterations"),
                ));
            }
            let record = ActivationRecord::new(
                "while loop",
                ARType::Loop,
                self.call_stack.nesting_level() + 1,
            );
            let flow = self.with_record(record, |interp| interp.exec_block(block))?;
            match flow {
                Flow::Break => break,
                Flow::Continue | Flow::Normal => {}
                Flow::Return(v) => return Ok(Flow::Return(v)),
            }
        }
        Ok(Flow::Normal)
    }

    /// A `cal { … }` block: the body runs in a scratch scope layered on
    /// the shared calibration scope, then its bindings merge back.
    pub fn exec_cal_block(&mut self, body: &[Statement]) -> Result<()> {
        let outer = ActivationRecord::with_members(
            "calibration",
            ARType::Calibration,
            self.call_stack.nesting_level() + 1,
            self.calibration_scope.clone(),
        );
        self.with_record(outer, |interp| {
            let inner = ActivationRecord::new(
                "cal block",
                ARType::Calibration,
                interp.call_stack.nesting_level() + 1,
            );
            let inner_members = inner.members.clone();
            interp.with_record(inner, |interp| {
                interp.exec_block(body)?;
                Ok(())
            })?;
            for (name, value) in inner_members.borrow().iter() {
                interp
                    .calibration_scope
                    .borrow_mut()
                    .insert(name.clone(), value.clone());
            }
            Ok(())
        })
    }

    // ── Defcal dispatch ──────────────────────────────────────────────

    /// Mangled name of the first defcal matching a call signature.
    pub fn find_defcal(&self, signature: &FunctionSignature) -> Result<String> {
        mangle::first_match(signature, &self.defcal_names)
    }

    pub fn execute_gate_call(&mut self, call: &GateCall) -> Result<Value> {
        let signature = mangle::gate_call_signature(call);
        let mangled = self.find_defcal(&signature)?;
        let defcal = self.defcal_nodes.get(&mangled).cloned().ok_or_else(|| {
            Error::new(ErrorKind::IdentifierNotFound, format!("defcal '{mangled}'"))
        })?;
        self.execute_defcal(&defcal, &call.args)
    }

    pub fn execute_measurement(&mut self, qubit: &Expression) -> Result<Value> {
        let signature = mangle::measurement_signature(qubit);
        let mangled = self.find_defcal(&signature)?;
        let defcal = self.defcal_nodes.get(&mangled).cloned().ok_or_else(|| {
            Error::new(ErrorKind::IdentifierNotFound, format!("defcal '{mangled}'"))
        })?;
        self.execute_defcal(&defcal, &[])
    }

    /// Run a defcal body: calibration record (shared scope) + defcal
    /// record with classical arguments bound positionally. Literal
    /// defcal arguments are pinned and bind nothing.
    pub fn execute_defcal(&mut self, defcal: &Defcal, call_args: &[Expression]) -> Result<Value> {
        let mut bindings = Vec::new();
        for (i, arg) in defcal.args.iter().enumerate() {
            if let DefcalArg::Classical { name, .. } = arg {
                let call_arg = call_args.get(i).ok_or_else(|| {
                    Error::new(
                        ErrorKind::InvalidGatecallArgument,
                        format!("'{}' missing argument {}", defcal.name, i),
                    )
                })?;
                bindings.push((name.clone(), self.eval(call_arg)?));
            }
        }

        let outer = ActivationRecord::with_members(
            "calibration",
            ARType::Calibration,
            self.call_stack.nesting_level() + 1,
            self.calibration_scope.clone(),
        );
        let body = defcal.body.clone();
        self.with_record(outer, |interp| {
            let record = ActivationRecord::new(
                defcal.name.clone(),
                ARType::Defcal,
                interp.call_stack.nesting_level() + 1,
            );
            for (name, value) in bindings {
                record.set(name, value);
            }
            interp.with_record(record, |interp| match interp.exec_block(&body)? {
                Flow::Return(value) => Ok(value),
                _ => Ok(Value::None),
            })
        })
    }

    // ── Expressions ──────────────────────────────────────────────────

    pub fn eval(&mut self, expr: &Expression) -> Result<Value> {
        match expr {
            Expression::IntegerLiteral(v) => Ok(Value::Int(*v)),
            Expression::FloatLiteral(v) => Ok(Value::Float(*v)),
            Expression::ImaginaryLiteral(v) => Ok(Value::Complex(Complex::new(0.0, *v))),
            Expression::BooleanLiteral(v) => Ok(Value::Bool(*v)),
            Expression::BitstringLiteral { value, .. } => Ok(Value::Int(*value as i64)),
            Expression::DurationLiteral { value, unit } => match unit {
                TimeUnit::Dt => Ok(Value::Float(*value)),
                other => Ok(Value::Float(
                    Duration::new(*value, *other).samples(2e9) as f64
                )),
            },
            Expression::ArrayLiteral(items) => Ok(Value::Array(
                items.iter().map(|e| self.eval(e)).collect::<Result<_>>()?,
            )),
            Expression::Identifier(name) => self.eval_identifier(name),
            Expression::Unary { op, expr } => {
                let value = self.eval(expr)?;
                unary_op(*op, value)
            }
            Expression::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                binary_op(*op, lhs, rhs)
            }
            Expression::Call { name, args } => self.call_function(name, args),
            Expression::Index { collection, index } => {
                let value = self.eval(collection)?;
                let items = match value {
                    Value::Array(items) => items,
                    Value::Waveform(samples) => {
                        samples.into_iter().map(Value::Complex).collect()
                    }
                    other => {
                        return Err(Error::new(
                            ErrorKind::InvalidArgument,
                            format!("cannot index into {other:?}"),
                        ))
                    }
                };
                let [index_expr] = index.as_slice() else {
                    return Err(Error::new(
                        ErrorKind::Unhandled,
                        "multi-dimensional indexing not supported",
                    ));
                };
                let i = self.eval(index_expr)?.as_i64()?;
                items.get(i as usize).cloned().ok_or_else(|| {
                    Error::new(
                        ErrorKind::InvalidArgument,
                        format!("index {i} out of bounds (length {})", items.len()),
                    )
                })
            }
            Expression::Concatenation { lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                match (lhs, rhs) {
                    (Value::Waveform(mut a), Value::Waveform(b)) => {
                        a.extend(b);
                        Ok(Value::Waveform(a))
                    }
                    (Value::Array(mut a), Value::Array(b)) => {
                        a.extend(b);
                        Ok(Value::Array(a))
                    }
                    (a, b) => Err(Error::new(
                        ErrorKind::InvalidArgument,
                        format!("cannot concatenate {a:?} and {b:?}"),
                    )),
                }
            }
            Expression::Range { .. } | Expression::DiscreteSet(_) => Err(Error::new(
                ErrorKind::Unhandled,
                "range expression outside a for-loop",
            )),
            Expression::DurationOf { .. } | Expression::SizeOf { .. } => Err(Error::new(
                ErrorKind::CompileOut,
                format!("'{expr}' should have been resolved before interpretation"),
            )),
        }
    }

    fn eval_identifier(&mut self, name: &str) -> Result<Value> {
        match name {
            "pi" | "π" => return Ok(Value::Float(PI)),
            "tau" | "τ" => return Ok(Value::Float(2.0 * PI)),
            "euler" | "ℇ" => return Ok(Value::Float(std::f64::consts::E)),
            "ii" => return Ok(Value::Complex(Complex::new(0.0, 1.0))),
            _ => {}
        }
        match self.call_stack.lookup(name) {
            Ok(value) => Ok(value),
            // Physical qubits need no declaration.
            Err(_) if crate::ast::is_physical_qubit(name) => Ok(Value::None),
            Err(e) => Err(e),
        }
    }

    /// Resolve a frame-valued argument to the frame name in the setup.
    pub fn frame_name(&mut self, expr: &Expression) -> Result<String> {
        if let Expression::Identifier(name) = expr {
            if let Ok(Value::Frame(frame)) = self.call_stack.lookup(name) {
                return Ok(frame);
            }
            if self.setup.frames.contains_key(name) {
                return Ok(name.clone());
            }
        }
        Err(Error::new(
            ErrorKind::IdentifierNotFound,
            format!("frame '{expr}'"),
        ))
    }

    fn call_function(&mut self, name: &str, args: &[Expression]) -> Result<Value> {
        match name {
            // Pulse emission: no runtime effect at interpretation level.
            "play" | "capture_v1" | "capture_v2" | "capture_v3" | "capture_v1_spectrum" => {
                if let Some(mut observer) = self.observer.take() {
                    let result = observer.pulse(self, name, args);
                    self.observer = Some(observer);
                    result?;
                }
                Ok(Value::None)
            }
            "executeTableEntry" | "assignWaveIndex" => Ok(Value::None),
            "set_phase" => {
                let frame = self.frame_name(&args[0])?;
                let phase = self.eval(&args[1])?.as_f64()?;
                self.setup.frame_mut(&frame)?.set_phase(wrap_phase(phase));
                Ok(Value::None)
            }
            "shift_phase" => {
                let frame = self.frame_name(&args[0])?;
                let delta = self.eval(&args[1])?.as_f64()?;
                let frame = self.setup.frame_mut(&frame)?;
                let phase = wrap_phase(frame.phase + delta);
                frame.set_phase(phase);
                Ok(Value::None)
            }
            "set_frequency" => {
                let frame = self.frame_name(&args[0])?;
                let frequency = self.eval(&args[1])?.as_f64()?;
                self.setup.frame_mut(&frame)?.set_frequency(frequency);
                Ok(Value::None)
            }
            "shift_frequency" => {
                let frame = self.frame_name(&args[0])?;
                let delta = self.eval(&args[1])?.as_f64()?;
                self.setup.frame_mut(&frame)?.shift_frequency(delta);
                Ok(Value::None)
            }
            "get_phase" => {
                let frame = self.frame_name(&args[0])?;
                Ok(Value::Float(self.setup.frame(&frame)?.phase))
            }
            "get_frequency" => {
                let frame = self.frame_name(&args[0])?;
                Ok(Value::Float(self.setup.frame(&frame)?.frequency))
            }
            "newframe" => Err(Error::new(
                ErrorKind::Unhandled,
                "newframe is only valid as a frame declaration initializer",
            )),
            _ if waveforms::is_waveform_function(name) => {
                let numeric: Vec<f64> = args
                    .iter()
                    .map(|a| self.eval(a).and_then(|v| v.as_f64()))
                    .collect::<Result<_>>()?;
                Ok(Value::Waveform(waveforms::to_complex(waveforms::sample(
                    name, &numeric,
                )?)))
            }
            _ => {
                if let Some(sub) = self.subroutines.get(name).cloned() {
                    return self.call_subroutine(&sub, args);
                }
                if self.external_funcs.contains_key(name) {
                    let values: Vec<Value> =
                        args.iter().map(|a| self.eval(a)).collect::<Result<_>>()?;
                    let f = &self.external_funcs[name];
                    return f(&values);
                }
                Err(Error::new(
                    ErrorKind::IdentifierNotFound,
                    format!("function '{name}'"),
                ))
            }
        }
    }

    fn call_subroutine(&mut self, sub: &Subroutine, args: &[Expression]) -> Result<Value> {
        if args.len() != sub.params.len() {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!(
                    "'{}' expects {} arguments, got {}",
                    sub.name,
                    sub.params.len(),
                    args.len()
                ),
            ));
        }
        let mut bindings = Vec::new();
        for (param, arg) in sub.params.iter().zip(args) {
            bindings.push((param.name.clone(), self.eval(arg)?));
        }
        let record = ActivationRecord::new(
            sub.name.clone(),
            ARType::Subroutine,
            self.call_stack.nesting_level() + 1,
        );
        for (name, value) in bindings {
            record.set(name, value);
        }
        let body = sub.body.clone();
        self.with_record(record, |interp| match interp.exec_block(&body)? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::None),
        })
    }
}

fn slice_values<T: Clone>(items: &[T], start: i64, end: i64, step: i64) -> Vec<T> {
    let end = end.min(items.len() as i64);
    let mut out = Vec::new();
    let mut i = start.max(0);
    while i < end {
        out.push(items[i as usize].clone());
        i += step;
    }
    out
}

// ── Operators ────────────────────────────────────────────────────────────

pub fn unary_op(op: UnaryOperator, value: Value) -> Result<Value> {
    match (op, value) {
        (UnaryOperator::Neg, Value::Int(v)) => Ok(Value::Int(-v)),
        (UnaryOperator::Neg, Value::Float(v)) => Ok(Value::Float(-v)),
        (UnaryOperator::Neg, Value::Complex(v)) => Ok(Value::Complex(-v)),
        (UnaryOperator::Neg, Value::Waveform(w)) => {
            Ok(Value::Waveform(w.into_iter().map(|c| -c).collect()))
        }
        (UnaryOperator::Not, Value::Bool(v)) => Ok(Value::Bool(!v)),
        (UnaryOperator::Invert, Value::Int(v)) => Ok(Value::Int(!v)),
        (op, value) => Err(Error::new(
            ErrorKind::InvalidArgument,
            format!("cannot apply '{}' to {value:?}", op.symbol()),
        )),
    }
}

fn complex_of(value: &Value) -> Option<Complex> {
    match value {
        Value::Int(v) => Some(Complex::real(*v as f64)),
        Value::Float(v) => Some(Complex::real(*v)),
        Value::Complex(v) => Some(*v),
        _ => None,
    }
}

fn waveform_zip(
    op: BinaryOperator,
    lhs: Vec<Complex>,
    rhs: Vec<Complex>,
) -> Result<Vec<Complex>> {
    if lhs.len() != rhs.len() {
        return Err(Error::new(
            ErrorKind::InvalidArgument,
            format!(
                "waveform length mismatch: {} vs {}",
                lhs.len(),
                rhs.len()
            ),
        ));
    }
    lhs.into_iter()
        .zip(rhs)
        .map(|(a, b)| complex_scalar_op(op, a, b))
        .collect()
}

fn complex_scalar_op(op: BinaryOperator, a: Complex, b: Complex) -> Result<Complex> {
    match op {
        BinaryOperator::Plus => Ok(a + b),
        BinaryOperator::Minus => Ok(a - b),
        BinaryOperator::Times => Ok(a * b),
        BinaryOperator::Div => Ok(a / b),
        other => Err(Error::new(
            ErrorKind::InvalidArgument,
            format!("operator '{}' not defined on waveforms", other.symbol()),
        )),
    }
}

pub fn binary_op(op: BinaryOperator, lhs: Value, rhs: Value) -> Result<Value> {
    use BinaryOperator as B;

    // Waveform broadcasting.
    match (&lhs, &rhs) {
        (Value::Waveform(a), Value::Waveform(b)) => {
            return Ok(Value::Waveform(waveform_zip(op, a.clone(), b.clone())?));
        }
        (Value::Waveform(a), other) => {
            if let Some(scalar) = complex_of(other) {
                let samples = a
                    .iter()
                    .map(|&s| complex_scalar_op(op, s, scalar))
                    .collect::<Result<_>>()?;
                return Ok(Value::Waveform(samples));
            }
        }
        (other, Value::Waveform(b)) => {
            if let Some(scalar) = complex_of(other) {
                let samples = b
                    .iter()
                    .map(|&s| complex_scalar_op(op, scalar, s))
                    .collect::<Result<_>>()?;
                return Ok(Value::Waveform(samples));
            }
        }
        _ => {}
    }

    match op {
        B::AndAnd => return Ok(Value::Bool(lhs.truthy()? && rhs.truthy()?)),
        B::OrOr => return Ok(Value::Bool(lhs.truthy()? || rhs.truthy()?)),
        B::BitOr | B::BitXor | B::BitAnd | B::Shl | B::Shr => {
            let a = lhs.as_i64()?;
            let b = rhs.as_i64()?;
            let v = match op {
                B::BitOr => a | b,
                B::BitXor => a ^ b,
                B::BitAnd => a & b,
                B::Shl => a << b,
                B::Shr => a >> b,
                _ => unreachable!(),
            };
            return Ok(Value::Int(v));
        }
        _ => {}
    }

    // Complex arithmetic when either side is complex.
    if matches!(lhs, Value::Complex(_)) || matches!(rhs, Value::Complex(_)) {
        let (a, b) = match (complex_of(&lhs), complex_of(&rhs)) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                return Err(Error::new(
                    ErrorKind::InvalidArgument,
                    format!("cannot apply '{}' to {lhs:?} and {rhs:?}", op.symbol()),
                ))
            }
        };
        return match op {
            B::Eq => Ok(Value::Bool(a == b)),
            B::Ne => Ok(Value::Bool(a != b)),
            _ => Ok(Value::Complex(complex_scalar_op(op, a, b)?)),
        };
    }

    // Integer arithmetic stays integral.
    if let (Value::Int(a), Value::Int(b)) = (&lhs, &rhs) {
        let (a, b) = (*a, *b);
        let v = match op {
            B::Gt => return Ok(Value::Bool(a > b)),
            B::Lt => return Ok(Value::Bool(a < b)),
            B::Ge => return Ok(Value::Bool(a >= b)),
            B::Le => return Ok(Value::Bool(a <= b)),
            B::Eq => return Ok(Value::Bool(a == b)),
            B::Ne => return Ok(Value::Bool(a != b)),
            B::Plus => a + b,
            B::Minus => a - b,
            B::Times => a * b,
            B::Div => {
                if b == 0 {
                    return Err(Error::new(ErrorKind::InvalidArgument, "division by zero"));
                }
                return Ok(Value::Float(a as f64 / b as f64));
            }
            B::Mod => {
                if b == 0 {
                    return Err(Error::new(ErrorKind::InvalidArgument, "modulo by zero"));
                }
                a.rem_euclid(b)
            }
            B::Pow => {
                if b >= 0 {
                    (a as f64).powi(b as i32) as i64
                } else {
                    return Ok(Value::Float((a as f64).powi(b as i32)));
                }
            }
            _ => unreachable!(),
        };
        return Ok(Value::Int(v));
    }

    let a = lhs.as_f64()?;
    let b = rhs.as_f64()?;
    let v = match op {
        B::Gt => return Ok(Value::Bool(a > b)),
        B::Lt => return Ok(Value::Bool(a < b)),
        B::Ge => return Ok(Value::Bool(a >= b)),
        B::Le => return Ok(Value::Bool(a <= b)),
        B::Eq => return Ok(Value::Bool(a == b)),
        B::Ne => return Ok(Value::Bool(a != b)),
        B::Plus => a + b,
        B::Minus => a - b,
        B::Times => a * b,
        B::Div => a / b,
        B::Mod => a.rem_euclid(b),
        B::Pow => a.powf(b),
        _ => unreachable!(),
    };
    Ok(Value::Float(v))
}
