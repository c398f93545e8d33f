// seqc.rs — Lower a pulse program to SEQC sequencer code
//
// The printer walks a program statement by statement, interpreting the
// classical fragment as it goes so that durations, loop variables and
// waveforms have concrete values at print time. Alongside the text it
// accumulates the instrument settings the program implies (readout
// weights, spectroscopy envelopes, output routing) and the waveform
// index table for command-table playback.
//
// Interpretation is suspended inside defcal bodies, subroutine bodies
// and for-loop bodies: those run at sequencer runtime, the printer only
// needs their text.

use std::collections::BTreeMap;

use crate::ast::{
    BinaryOperator, ClassicalType, DefcalArg, Expression, Program, Statement, TimeUnit,
};
use crate::awg::{self, CoreType};
use crate::call_stack::{ARType, ActivationRecord, Members};
use crate::diag::{Error, ErrorKind, Result};
use crate::interpreter::{ExternFn, Interpreter, Value};
use crate::mangle::{self, FunctionSignature};
use crate::settings::{
    HdawgCore, HdawgOutput, Mode, Readout, ReadoutSource, Setting, ShfqaCore, ShfsgCore, Spectrum,
    SpectroscopyMode,
};
use crate::setup::{Port, Setup};
use crate::shots::ShotsSignature;
use crate::stack_analysis::needs_constant_variable;
use crate::waveforms;

// ── Output stream ────────────────────────────────────────────────────────

/// Line-oriented SEQC text accumulator with block indentation.
#[derive(Debug, Default)]
pub struct SeqcStream {
    out: String,
    indent: usize,
}

impl SeqcStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }

    pub fn indent(&mut self) {
        self.indent += 1;
    }

    pub fn dedent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    pub fn finish(self) -> String {
        self.out
    }
}

// ── Expression rendering ─────────────────────────────────────────────────

fn flatten_concat<'a>(expr: &'a Expression, out: &mut Vec<&'a Expression>) {
    match expr {
        Expression::Concatenation { lhs, rhs } => {
            flatten_concat(lhs, out);
            flatten_concat(rhs, out);
        }
        other => out.push(other),
    }
}

fn group(expr: &Expression) -> String {
    match expr {
        Expression::Binary { .. } => format!("({})", expr_seqc(expr)),
        _ => expr_seqc(expr),
    }
}

fn join_args(args: &[Expression]) -> String {
    args.iter().map(expr_seqc).collect::<Vec<_>>().join(", ")
}

/// Render an expression as SEQC source text. Duration literals print as
/// their sample count, array literals become `vect(…)` and waveform
/// concatenation becomes `join(…)`.
pub fn expr_seqc(expr: &Expression) -> String {
    match expr {
        Expression::IntegerLiteral(v) => v.to_string(),
        Expression::FloatLiteral(v) => v.to_string(),
        Expression::BooleanLiteral(v) => if *v { "true" } else { "false" }.to_string(),
        Expression::DurationLiteral { value, .. } => format!("{value}"),
        Expression::ArrayLiteral(items) => format!("vect({})", join_args(items)),
        Expression::Identifier(name) => name.clone(),
        Expression::Unary { op, expr } => format!("{}{}", op.symbol(), group(expr)),
        Expression::Binary { op, lhs, rhs } => {
            format!("{} {} {}", group(lhs), op.symbol(), group(rhs))
        }
        Expression::Call { name, args } => format!("{name}({})", join_args(args)),
        Expression::Index { collection, index } => {
            format!("{}[{}]", expr_seqc(collection), join_args(index))
        }
        Expression::Concatenation { .. } => {
            let mut parts = Vec::new();
            flatten_concat(expr, &mut parts);
            let joined = parts.iter().map(|p| expr_seqc(p)).collect::<Vec<_>>().join(", ");
            format!("join({joined})")
        }
        other => other.to_string(),
    }
}

/// SEQC identifiers cannot contain `$`; mangled defcal names carry the
/// physical qubit tokens verbatim.
fn legal(name: &str) -> String {
    name.replace('$', "_")
}

// ── Printer ──────────────────────────────────────────────────────────────

/// Settings object for the single core a split program targets.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreSettings {
    Hd(HdawgCore),
    Qa(Box<ShfqaCore>),
    Sg(ShfsgCore),
}

impl CoreSettings {
    fn settings(&self) -> Vec<Setting> {
        match self {
            CoreSettings::Hd(core) => core.settings(),
            CoreSettings::Qa(core) => core.settings(),
            CoreSettings::Sg(core) => core.settings(),
        }
    }
}

/// Result of printing one core's program.
#[derive(Debug, Clone, PartialEq)]
pub struct SeqcOutput {
    pub seqc: String,
    pub settings: Vec<Setting>,
    /// Waveform index assignments from placeholder declarations, for
    /// command-table upload.
    pub wfm_indices: BTreeMap<i64, String>,
}

pub struct SeqcPrinter {
    stream: SeqcStream,
    interp: Interpreter,
    sig: ShotsSignature,
    meas_delay: Option<f64>,
    average_shots: bool,
    interpret: bool,
    core: Option<CoreSettings>,
    placeholder_index: i64,
    wfm_indices: BTreeMap<i64, String>,
    multi_measure_bit: Option<String>,
}

fn unary_math(f: fn(f64) -> f64) -> ExternFn {
    Box::new(move |args: &[Value]| {
        let x = args
            .first()
            .ok_or_else(|| Error::new(ErrorKind::InvalidArgument, "missing argument"))?
            .as_f64()?;
        Ok(Value::Float(f(x)))
    })
}

fn sign(x: f64) -> f64 {
    if x == 0.0 {
        0.0
    } else {
        x.signum()
    }
}

const UNARY_MATH: &[(&str, fn(f64) -> f64)] = &[
    ("abs", f64::abs),
    ("acos", f64::acos),
    ("asin", f64::asin),
    ("atan", f64::atan),
    ("ceil", f64::ceil),
    ("cos", f64::cos),
    ("cosh", f64::cosh),
    ("exp", f64::exp),
    ("floor", f64::floor),
    ("ln", f64::ln),
    ("log2", f64::log2),
    ("log10", f64::log10),
    ("round", f64::round),
    ("sign", sign),
    ("sin", f64::sin),
    ("sinh", f64::sinh),
    ("sqrt", f64::sqrt),
    ("tan", f64::tan),
    ("tanh", f64::tanh),
];

impl SeqcPrinter {
    pub fn new(setup: Setup, sig: ShotsSignature) -> Self {
        let mut interp = Interpreter::new(setup);
        for (name, f) in UNARY_MATH {
            interp.register_extern(*name, unary_math(*f));
        }
        interp.register_extern(
            "pow",
            Box::new(|args: &[Value]| {
                let [base, exp] = args else {
                    return Err(Error::new(
                        ErrorKind::InvalidArgument,
                        "pow expects two arguments",
                    ));
                };
                Ok(Value::Float(base.as_f64()?.powf(exp.as_f64()?)))
            }),
        );
        Self {
            stream: SeqcStream::new(),
            interp,
            sig,
            meas_delay: None,
            average_shots: true,
            interpret: true,
            core: None,
            placeholder_index: 0,
            wfm_indices: BTreeMap::new(),
            multi_measure_bit: None,
        }
    }

    /// Padding in samples before multi-qubit measurements, from the
    /// measurement-delay equalization pass.
    pub fn measurement_delay(mut self, samples: f64) -> Self {
        self.meas_delay = Some(samples);
        self
    }

    /// When false every shot is recorded instead of hardware-averaged.
    pub fn average_shots(mut self, average: bool) -> Self {
        self.average_shots = average;
        self
    }

    pub fn print(mut self, program: &Program) -> Result<SeqcOutput> {
        self.interp
            .call_stack
            .push(ActivationRecord::new("main", ARType::Program, 1));
        let result = program
            .statements
            .iter()
            .try_for_each(|statement| self.print_stmt(statement));
        self.interp.call_stack.pop();
        result?;
        let settings = self.core.as_ref().map(CoreSettings::settings).unwrap_or_default();
        Ok(SeqcOutput {
            seqc: self.stream.finish(),
            settings,
            wfm_indices: self.wfm_indices,
        })
    }

    fn points_to_record(&self) -> i64 {
        self.sig.steps.iter().product()
    }

    fn interp_stmt(&mut self, statement: &Statement) -> Result<()> {
        if self.interpret {
            self.interp.exec_stmt(statement)?;
        }
        Ok(())
    }

    fn interp_expr(&mut self, expr: &Expression) -> Result<()> {
        if self.interpret {
            // Sequencer-native calls have no interpretation.
            if let Expression::Call { name, .. } = expr {
                if waveforms::SEQC_FUNCTIONS.contains(&name.as_str()) {
                    return Ok(());
                }
            }
            self.interp.eval(expr)?;
        }
        Ok(())
    }

    fn with_interpret_off(&mut self, f: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        let saved = self.interpret;
        self.interpret = false;
        let result = f(self);
        self.interpret = saved;
        result
    }

    /// Port driving the frame an openpulse call is applied to.
    fn frame_port(&mut self, frame_arg: &Expression) -> Result<Port> {
        let frame = self.interp.frame_name(frame_arg)?;
        let port = self.interp.setup.frame(&frame)?.port.clone();
        Ok(self.interp.setup.port(&port)?.clone())
    }

    /// QA settings object for the target core, created on first use.
    fn qa_core_mut(&mut self, channel: u32) -> Result<&mut ShfqaCore> {
        if self.core.is_none() {
            let mut core = ShfqaCore::new(channel);
            core.num_averages = self.sig.shots;
            core.points_to_record = self.points_to_record();
            core.average_shots = self.average_shots;
            self.core = Some(CoreSettings::Qa(Box::new(core)));
        }
        match self.core.as_mut() {
            Some(CoreSettings::Qa(core)) => Ok(core),
            _ => Err(Error::new(
                ErrorKind::InvalidArgument,
                "measurement requires a QA core",
            )),
        }
    }

    // ── Statements ───────────────────────────────────────────────────

    fn print_stmt(&mut self, statement: &Statement) -> Result<()> {
        match statement {
            Statement::ClassicalDeclaration { ty, name, init } => {
                self.interp_stmt(statement)?;
                self.print_declaration(ty, name, init.as_ref())
            }
            Statement::ConstantDeclaration { name, init, .. } => {
                self.interp_stmt(statement)?;
                // The imaginary unit exists only at compile time.
                if name != "ii" {
                    self.stream.line(format!("const {name} = {};", expr_seqc(init)));
                }
                Ok(())
            }
            Statement::QubitDeclaration { .. } | Statement::ExternDeclaration { .. } => {
                self.interp_stmt(statement)
            }
            Statement::Expression(expr) => self.print_expr_stmt(expr),
            Statement::Assignment { lvalue, op, rvalue } => {
                self.interp_stmt(statement)?;
                if let Expression::Call { name, args } = rvalue {
                    if name == "measure_func" {
                        self.multi_measure_bit = Some(expr_seqc(lvalue));
                        return self.print_measure_func(args);
                    }
                }
                self.stream.line(format!(
                    "{} {} {};",
                    expr_seqc(lvalue),
                    op.symbol(),
                    expr_seqc(rvalue)
                ));
                Ok(())
            }
            Statement::Alias { target, value } => {
                self.interp_stmt(statement)?;
                self.print_alias(target, value)
            }
            Statement::Calibration { body } => {
                body.iter().try_for_each(|s| self.print_stmt(s))
            }
            Statement::Defcal(defcal) => {
                self.interp_stmt(statement)?;
                self.print_defcal(defcal)
            }
            Statement::Subroutine(sub) => {
                self.interp_stmt(statement)?;
                // measure_func is expanded at its call sites.
                if sub.name == "measure_func" {
                    return Ok(());
                }
                let ret = if sub.return_type.is_some() { "var" } else { "void" };
                let params = sub
                    .params
                    .iter()
                    .map(|p| format!("var {}", p.name))
                    .collect::<Vec<_>>()
                    .join(", ");
                self.stream.line(format!("{ret} {}({params}) {{", sub.name));
                self.stream.indent();
                let result =
                    self.with_interpret_off(|p| sub.body.iter().try_for_each(|s| p.print_stmt(s)));
                self.stream.dedent();
                self.stream.line("}");
                result
            }
            Statement::Return(expr) => {
                match expr {
                    Some(e) => self.stream.line(format!("return {};", expr_seqc(e))),
                    None => self.stream.line("return;"),
                }
                Ok(())
            }
            Statement::GateCall(call) => {
                if !call.modifiers.is_empty() {
                    return Err(Error::new(
                        ErrorKind::CompileOut,
                        format!("gate modifiers on '{}' should have been resolved", call.name),
                    ));
                }
                self.interp_stmt(statement)?;
                let mangled = self.interp.find_defcal(&mangle::gate_call_signature(call))?;
                self.stream
                    .line(format!("{}({});", legal(&mangled), join_args(&call.args)));
                Ok(())
            }
            Statement::Measurement(measurement) => {
                self.interp_stmt(statement)?;
                let mangled = self
                    .interp
                    .find_defcal(&mangle::measurement_signature(&measurement.qubit))?;
                match &measurement.target {
                    Some(target) => self
                        .stream
                        .line(format!("{} = {}();", expr_seqc(target), legal(&mangled))),
                    None => self.stream.line(format!("{}();", legal(&mangled))),
                }
                Ok(())
            }
            Statement::Reset { qubits } => {
                self.interp_stmt(statement)?;
                for qubit in qubits {
                    let mut signature = FunctionSignature::new("reset");
                    signature.qubits = vec![mangle::expression_token(qubit)];
                    let mangled = self.interp.find_defcal(&signature)?;
                    self.stream.line(format!("{}();", legal(&mangled)));
                }
                Ok(())
            }
            Statement::Barrier { qubits } => {
                self.interp_stmt(statement)?;
                if qubits.is_empty() {
                    self.stream.line("waitZSyncTrigger();");
                    Ok(())
                } else {
                    Err(Error::new(
                        ErrorKind::CompileOut,
                        "frame barriers should have been resolved into delays",
                    ))
                }
            }
            Statement::Delay { duration, .. } => {
                self.interp_stmt(statement)?;
                self.stream.line(format!("playZero({});", expr_seqc(duration)));
                Ok(())
            }
            Statement::Branch {
                condition,
                if_block,
                else_block,
            } => {
                self.stream.line(format!("if ({}) {{", expr_seqc(condition)));
                self.stream.indent();
                let result = if_block.iter().try_for_each(|s| self.print_stmt(s));
                self.stream.dedent();
                result?;
                if else_block.is_empty() {
                    self.stream.line("}");
                    return Ok(());
                }
                self.stream.line("} else {");
                self.stream.indent();
                let result = else_block.iter().try_for_each(|s| self.print_stmt(s));
                self.stream.dedent();
                self.stream.line("}");
                result
            }
            Statement::ForIn(for_in) => self.print_for(for_in),
            Statement::While { condition, block } => {
                self.stream.line(format!("while ({}) {{", expr_seqc(condition)));
                self.stream.indent();
                let result = block.iter().try_for_each(|s| self.print_stmt(s));
                self.stream.dedent();
                self.stream.line("}");
                result
            }
            Statement::Break => Err(Error::new(
                ErrorKind::NoSeqcEquivalent,
                "SEQC has no break statement",
            )),
            Statement::Continue => Err(Error::new(
                ErrorKind::NoSeqcEquivalent,
                "SEQC has no continue statement",
            )),
            Statement::End => Err(Error::new(
                ErrorKind::NoSeqcEquivalent,
                "SEQC has no end statement",
            )),
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
                format!("gate definition '{name}' has no sequencer form"),
            )),
        }
    }

    fn print_declaration(
        &mut self,
        ty: &ClassicalType,
        name: &str,
        init: Option<&Expression>,
    ) -> Result<()> {
        match ty {
            ClassicalType::Port => {
                let port = self.interp.setup.port(name)?.clone();
                match port.core.ty {
                    CoreType::Hd => {
                        if self.core.is_none() {
                            self.core = Some(CoreSettings::Hd(HdawgCore::new(port.core.index)));
                        }
                        if let Some(CoreSettings::Hd(core)) = &mut self.core {
                            let output = port.core.channels.first().copied().unwrap_or(1);
                            core.outputs
                                .entry(output)
                                .or_insert_with(|| HdawgOutput::new(output));
                        }
                    }
                    CoreType::Sg => {
                        if self.core.is_none() {
                            self.core = Some(CoreSettings::Sg(ShfsgCore::new(port.core.index)));
                        }
                    }
                    // QA settings are created by the first measurement
                    // or capture on the core.
                    CoreType::Qa => {}
                }
                Ok(())
            }
            // Validated by the interpreter, nothing to emit.
            ClassicalType::Frame => Ok(()),
            ClassicalType::Array { dims, .. } => {
                match init {
                    Some(expr) => self
                        .stream
                        .line(format!("wave {name} = {};", expr_seqc(expr))),
                    None => self
                        .stream
                        .line(format!("wave {name} = zeros({});", join_args(dims))),
                }
                Ok(())
            }
            ClassicalType::Waveform => {
                if let Some(Expression::Call { name: func, args }) = init {
                    if func == "placeholder" {
                        self.stream
                            .line(format!("wave {name} = placeholder({});", join_args(args)));
                        self.stream
                            .line(format!("assignWaveIndex({name}, {});", self.placeholder_index));
                        self.wfm_indices
                            .insert(self.placeholder_index, name.to_string());
                        self.placeholder_index += 1;
                        return Ok(());
                    }
                }
                match init {
                    Some(expr) => self
                        .stream
                        .line(format!("wave {name} = {};", expr_seqc(expr))),
                    None => self.stream.line(format!("wave {name};")),
                }
                Ok(())
            }
            _ => {
                match init {
                    Some(expr) => self
                        .stream
                        .line(format!("var {name} = {};", expr_seqc(expr))),
                    None => self.stream.line(format!("var {name};")),
                }
                Ok(())
            }
        }
    }

    fn print_alias(&mut self, target: &str, value: &Expression) -> Result<()> {
        match value {
            Expression::Index { collection, index } => {
                let (Some(name), [Expression::Range { start: Some(start), end: Some(end), step: None }]) =
                    (collection.as_identifier(), index.as_slice())
                else {
                    return Err(Error::new(
                        ErrorKind::CompileOut,
                        format!("alias value '{value}' has no SEQC form"),
                    ));
                };
                if !matches!(start.as_ref(), Expression::IntegerLiteral(_))
                    || !matches!(end.as_ref(), Expression::IntegerLiteral(_))
                {
                    return Err(Error::new(
                        ErrorKind::CompileOut,
                        format!("alias value '{value}' has no SEQC form"),
                    ));
                }
                self.stream.line(format!(
                    "wave {target} = cut({name}, {}, {});",
                    expr_seqc(start),
                    expr_seqc(end)
                ));
                Ok(())
            }
            Expression::Concatenation { .. } => {
                let mut parts = Vec::new();
                flatten_concat(value, &mut parts);
                let joined = parts.iter().map(|p| expr_seqc(p)).collect::<Vec<_>>().join(", ");
                self.stream.line(format!("wave {target} = join({joined});"));
                Ok(())
            }
            other => Err(Error::new(
                ErrorKind::CompileOut,
                format!("alias value '{other}' has no SEQC form"),
            )),
        }
    }

    fn print_defcal(&mut self, defcal: &crate::ast::Defcal) -> Result<()> {
        let mangled = legal(&mangle::defcal_signature(defcal).mangle());
        let ret = if defcal.return_type.is_some() { "var" } else { "void" };
        let mut params = Vec::new();
        let mut literals = 0;
        for arg in &defcal.args {
            match arg {
                DefcalArg::Classical { name, .. } => params.push(format!("var {name}")),
                DefcalArg::Literal(_) => {
                    params.push(format!("var lit_{literals}"));
                    literals += 1;
                }
            }
        }
        self.stream
            .line(format!("{ret} {mangled}({}) {{", params.join(", ")));
        self.stream.indent();
        let result = self.with_interpret_off(|p| match readout_shape(&defcal.body) {
            Some((play_args, capture_args, discriminated)) => {
                p.print_readout(play_args, capture_args, discriminated)
            }
            None => defcal.body.iter().try_for_each(|s| p.print_stmt(s)),
        });
        self.stream.dedent();
        self.stream.line("}");
        result
    }

    fn print_for(&mut self, for_in: &crate::ast::ForIn) -> Result<()> {
        let constant = needs_constant_variable(for_in, &["ones"]);
        let name = &for_in.variable;
        self.stream
            .line(format!("{} {name};", if constant { "cvar" } else { "var" }));
        let Expression::Range { start, end, step } = &for_in.set else {
            return Err(Error::new(
                ErrorKind::Unhandled,
                format!("for-in over unsupported collection: {}", for_in.set),
            ));
        };
        let start_txt = match start {
            Some(e) => loop_bound(e)?,
            None => "0".to_string(),
        };
        let Some(end) = end else {
            return Err(Error::new(
                ErrorKind::Unhandled,
                "for-loop range requires an end value",
            ));
        };
        let end_txt = loop_bound(end)?;
        let step_txt = match step {
            Some(e) => loop_bound(e)?,
            None => "1".to_string(),
        };
        let start_value = match start {
            Some(e) => self.interp.eval(e)?,
            None => Value::Int(0),
        };
        // The loop record stays on the stack while the body prints so
        // waveform durations depending on the loop variable evaluate.
        let record = ActivationRecord::new(
            "for loop",
            ARType::Loop,
            self.interp.call_stack.nesting_level() + 1,
        );
        record.set(name.clone(), start_value);
        self.interp.call_stack.push(record);
        self.stream.line(format!(
            "for ( {name} = {start_txt}; {name} < {end_txt}; {name} = {name} + {step_txt} ) {{"
        ));
        self.stream.indent();
        let result =
            self.with_interpret_off(|p| for_in.block.iter().try_for_each(|s| p.print_stmt(s)));
        self.stream.dedent();
        self.stream.line("}");
        self.interp.call_stack.pop();
        result
    }

    // ── Expression statements ────────────────────────────────────────

    fn print_expr_stmt(&mut self, expr: &Expression) -> Result<()> {
        if let Expression::Call { name, args } = expr {
            match name.as_str() {
                "play" => {
                    self.interp_expr(expr)?;
                    return self.print_play(expr);
                }
                "set_phase" | "shift_phase" => {
                    self.interp_expr(expr)?;
                    let port = self.frame_port(&args[0])?;
                    return if name == "set_phase" {
                        awg::set_phase(port.core.ty, &args[1], &mut self.stream)
                    } else {
                        awg::shift_phase(port.core.ty, &args[1], &mut self.stream)
                    };
                }
                "set_frequency" => {
                    self.interp_expr(expr)?;
                    let port = self.frame_port(&args[0])?;
                    return awg::set_frequency(port.core.ty, &args[1], &mut self.stream);
                }
                "shift_frequency" => {
                    self.interp_expr(expr)?;
                    let port = self.frame_port(&args[0])?;
                    return awg::shift_frequency(port.core.ty, &args[1], &mut self.stream);
                }
                "capture_v3" | "capture_v1_spectrum" => {
                    let enable_scope = name == "capture_v3";
                    self.interp_expr(expr)?;
                    return self.print_spectrum_capture(args, enable_scope);
                }
                "measure_func" => {
                    self.interp_expr(expr)?;
                    return self.print_measure_func(args);
                }
                "assignWaveIndex" => {
                    if let Some(Expression::Call { name: func, args: inner }) = args.first() {
                        if func == "placeholder" {
                            let length = self.interp.eval(&inner[0])?.as_i64()?;
                            let index = self.interp.eval(&args[1])?.as_i64()?;
                            self.stream
                                .line(format!("assignWaveIndex(placeholder({length}), {index});"));
                        }
                    }
                    return Ok(());
                }
                _ => {}
            }
        }
        self.interp_expr(expr)?;
        self.stream.line(format!("{};", expr_seqc(expr)));
        Ok(())
    }

    fn play_frame(&mut self, port: &Port, wfm: &Expression) -> Result<()> {
        let channel = port.core.channels.first().copied().unwrap_or(1);
        awg::play(port.core.ty, wfm, channel, &mut self.stream)
    }

    /// Loop variables whose value changes the duration of a `ones`
    /// waveform, from innermost for-loop records on the call stack.
    fn loop_parameters(
        &mut self,
        duration_arg: &Expression,
    ) -> Result<Option<(Members, String, i64)>> {
        let duration = self.interp.eval(duration_arg)?.as_f64()? as i64;
        let records: Vec<Members> = self
            .interp
            .call_stack
            .records()
            .iter()
            .filter(|r| r.name == "for loop")
            .map(|r| r.members.clone())
            .collect();
        for members in records {
            let binding = members
                .borrow()
                .iter()
                .next()
                .map(|(k, v)| (k.clone(), v.clone()));
            let Some((variable, value)) = binding else { continue };
            let value = value.as_i64()?;
            members
                .borrow_mut()
                .insert(variable.clone(), Value::Int(value + 1));
            let new_duration = self.interp.eval(duration_arg)?.as_f64()? as i64;
            members
                .borrow_mut()
                .insert(variable.clone(), Value::Int(value));
            if new_duration != duration {
                return Ok(Some((members, variable, value)));
            }
        }
        Ok(None)
    }

    /// A `play(frame, wfm)` call. `ones` waveforms shorter than 64
    /// samples inside loops are unrolled into branches on the loop
    /// variable; longer ones split into a 32-sample playWave followed
    /// by playHold for the remainder.
    fn print_play(&mut self, play: &Expression) -> Result<()> {
        let Expression::Call { args, .. } = play else {
            return Err(Error::new(
                ErrorKind::Unhandled,
                format!("format of play call: {play}"),
            ));
        };
        let [frame_arg, wfm] = args.as_slice() else {
            return Err(Error::new(
                ErrorKind::Unhandled,
                format!("format of play call: {play}"),
            ));
        };
        let port = self.frame_port(frame_arg)?;

        if let Some(duration_arg) = ones_duration(wfm) {
            // A duration that cannot be evaluated is assumed long
            // enough to take the playHold path.
            let duration = match self.interp.eval(duration_arg).and_then(|v| v.as_f64()) {
                Ok(v) => v as i64,
                Err(_) => 64,
            };
            if duration < 64 {
                let Some((members, variable, value)) = self.loop_parameters(duration_arg)? else {
                    return self.play_frame(&port, wfm);
                };
                let literal =
                    with_ones_duration(wfm, Expression::duration(duration as f64, TimeUnit::Dt));
                let branch = Statement::Branch {
                    condition: Expression::binary(
                        BinaryOperator::Gt,
                        Expression::ident(variable.clone()),
                        Expression::int(value),
                    ),
                    if_block: vec![Statement::Expression(play.clone())],
                    else_block: if duration > 0 {
                        vec![Statement::Expression(Expression::call(
                            "play",
                            vec![frame_arg.clone(), literal],
                        ))]
                    } else {
                        Vec::new()
                    },
                };
                members
                    .borrow_mut()
                    .insert(variable.clone(), Value::Int(value + 1));
                let result = self.print_stmt(&branch);
                members.borrow_mut().insert(variable, Value::Int(value));
                return result;
            }
            let short = with_ones_duration(wfm, Expression::duration(32.0, TimeUnit::Dt));
            self.play_frame(&port, &short)?;
            let hold = Expression::binary(
                BinaryOperator::Minus,
                duration_arg.clone(),
                Expression::int(32),
            );
            self.stream.line(format!("playHold({});", expr_seqc(&hold)));
            return Ok(());
        }
        if let Expression::Call { name, args } = wfm {
            if name == "executeTableEntry" {
                self.stream
                    .line(format!("executeTableEntry({});", join_args(args)));
                return Ok(());
            }
        }
        self.play_frame(&port, wfm)
    }

    /// The body of a measurement defcal: arm the readout generator and
    /// integrator, pulse the acquisition trigger and, for discriminated
    /// readout, fetch the result over ZSync.
    fn print_readout(
        &mut self,
        play_args: &[Expression],
        capture_args: &[Expression],
        discriminated: bool,
    ) -> Result<()> {
        let play_port = self.frame_port(&play_args[0])?;
        let capture_port = self.frame_port(&capture_args[0])?;
        if play_port.instrument != capture_port.instrument {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "measurement play and capture frames must share an instrument",
            ));
        }
        if play_port.core.ty != CoreType::Qa || capture_port.core.ty != CoreType::Qa {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "measurement defcals require QA cores",
            ));
        }
        if play_port.core.channels != [1] {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "the readout generator must drive channel 1",
            ));
        }
        if capture_port.core.channels != [2] {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "readout integration must use channel 2",
            ));
        }
        let Value::Waveform(generator) = self.interp.eval(&play_args[1])? else {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "the readout generator argument must be a waveform",
            ));
        };
        let Value::Waveform(integrator) = self.interp.eval(&capture_args[1])? else {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "the readout integration argument must be a waveform",
            ));
        };
        let generator_len = generator.len();
        let source = if discriminated {
            ReadoutSource::Discrimination
        } else {
            ReadoutSource::Integration
        };
        let core = self.qa_core_mut(play_port.core.index)?;
        core.readout_source = source;
        let index = core.readouts.len() as i64;
        core.readouts.insert(
            index,
            Readout {
                index,
                generator_wfm: generator,
                integrator_wfm: integrator,
                threshold: 0.0,
            },
        );
        self.stream.line(format!("playZero({generator_len});"));
        self.stream.line(format!(
            "startQA(QA_GEN_{index}, QA_INT_{index}, true, 0x{index:x}, 0b0);"
        ));
        if discriminated {
            self.stream.line("return getZSyncData(ZSYNC_DATA_RAW);");
        }
        Ok(())
    }

    /// `capture_v3` / `capture_v1_spectrum`: acquire the raw signal in
    /// spectroscopy mode with a flat envelope over the capture window.
    fn print_spectrum_capture(&mut self, args: &[Expression], enable_scope: bool) -> Result<()> {
        let port = self.frame_port(&args[0])?;
        let capture_time = self.interp.eval(&args[1])?.as_f64()? as i64;
        awg::capture(port.core.ty, &args[1], &mut self.stream)?;
        let envelope = waveforms::to_complex(waveforms::sample("ones", &[capture_time as f64])?);
        let points = self.points_to_record();
        let shots = self.sig.shots;
        let average_shots = self.average_shots;
        let core = self.qa_core_mut(port.core.index)?;
        core.mode = Mode::Spectroscopy;
        core.points_to_record = points;
        core.num_averages = shots;
        core.average_shots = average_shots;
        core.enable_scope = enable_scope;
        let key = core.spectra.len() as i64 + 1;
        core.spectra.insert(
            key,
            Spectrum {
                envelope_wfm: envelope,
                integration_time: capture_time,
                mode: SpectroscopyMode::Pulsed,
            },
        );
        Ok(())
    }

    /// A `measure_func(qubits, n)` call site: simultaneous readout of
    /// up to 16 qubits, each qubit given as an (index, discriminator)
    /// tuple.
    fn print_measure_func(&mut self, args: &[Expression]) -> Result<()> {
        let values: Vec<Value> = args
            .iter()
            .map(|a| self.interp.eval(a))
            .collect::<Result<_>>()?;
        let Some(Value::Array(qubits)) = values.first() else {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "measure_func expects an array of qubit tuples",
            ));
        };
        let expected = values
            .get(1)
            .ok_or_else(|| {
                Error::new(ErrorKind::InvalidArgument, "measure_func expects a qubit count")
            })?
            .as_i64()?;
        if qubits.len() as i64 != expected {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!(
                    "measure_func qubit count mismatch: {} tuples, count {expected}",
                    qubits.len()
                ),
            ));
        }
        if qubits.len() > 16 {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "cannot simultaneously measure more than 16 qubits",
            ));
        }
        let is_qa = matches!(self.core, Some(CoreSettings::Qa(_)));
        if let Some(delay) = self.meas_delay {
            self.stream.line(format!(
                "play{}({delay});",
                if is_qa { "Zero" } else { "Hold" }
            ));
        }
        if is_qa {
            let mut generators = Vec::new();
            let mut integrators = Vec::new();
            for qubit in qubits {
                let Value::Array(tuple) = qubit else {
                    return Err(Error::new(
                        ErrorKind::InvalidArgument,
                        "measure_func qubits must be (index, discriminator) tuples",
                    ));
                };
                let discriminator = tuple
                    .get(1)
                    .ok_or_else(|| {
                        Error::new(
                            ErrorKind::InvalidArgument,
                            "measure_func qubits must be (index, discriminator) tuples",
                        )
                    })?
                    .as_i64()?;
                generators.push(format!("QA_GEN_{discriminator}"));
                integrators.push(format!("QA_INT_{discriminator}"));
            }
            self.stream.line(format!(
                "startQA({}, {}, true, 0x0, 0b0);",
                generators.join(" | "),
                integrators.join(" | ")
            ));
            if let Some(bit) = &self.multi_measure_bit {
                self.stream.line(format!("{bit} = getZSyncData(ZSYNC_DATA_RAW);"));
            }
        }
        Ok(())
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn direct_ones(expr: &Expression) -> Option<&Expression> {
    match expr {
        Expression::Call { name, args } if name == "ones" => args.first(),
        _ => None,
    }
}

/// Duration argument of a `ones` call, either standalone or as a direct
/// operand of a binary expression (scaled or offset waveforms).
fn ones_duration(wfm: &Expression) -> Option<&Expression> {
    direct_ones(wfm).or_else(|| match wfm {
        Expression::Binary { lhs, rhs, .. } => direct_ones(lhs).or_else(|| direct_ones(rhs)),
        _ => None,
    })
}

/// Clone `wfm` with the duration argument of its `ones` call replaced.
fn with_ones_duration(wfm: &Expression, duration: Expression) -> Expression {
    fn replaced(expr: &Expression, duration: &Expression) -> Option<Expression> {
        if let Expression::Call { name, args } = expr {
            if name == "ones" && !args.is_empty() {
                let mut args = args.clone();
                args[0] = duration.clone();
                return Some(Expression::call("ones", args));
            }
        }
        None
    }
    if let Some(r) = replaced(wfm, &duration) {
        return r;
    }
    if let Expression::Binary { op, lhs, rhs } = wfm {
        if let Some(l) = replaced(lhs, &duration) {
            return Expression::Binary {
                op: *op,
                lhs: Box::new(l),
                rhs: rhs.clone(),
            };
        }
        if let Some(r) = replaced(rhs, &duration) {
            return Expression::Binary {
                op: *op,
                lhs: lhs.clone(),
                rhs: Box::new(r),
            };
        }
    }
    wfm.clone()
}

/// Loop bounds must survive to sequencer runtime unevaluated.
fn loop_bound(expr: &Expression) -> Result<String> {
    match expr {
        Expression::IntegerLiteral(_) | Expression::Identifier(_) | Expression::Index { .. } => {
            Ok(expr_seqc(expr))
        }
        other => Err(Error::new(
            ErrorKind::Unhandled,
            format!("unsupported for-loop bound: {other}"),
        )),
    }
}

/// Match the canonical measurement defcal body: a readout pulse
/// followed by a capture, discriminated (`capture_v2` returned) or
/// integrated (`capture_v1` as a bare statement).
fn readout_shape(body: &[Statement]) -> Option<(&[Expression], &[Expression], bool)> {
    let [Statement::Expression(Expression::Call { name: play, args: play_args }), second] = body
    else {
        return None;
    };
    if play != "play" {
        return None;
    }
    match second {
        Statement::Return(Some(Expression::Call { name, args })) if name == "capture_v2" => {
            Some((play_args, args, true))
        }
        Statement::Expression(Expression::Call { name, args }) if name == "capture_v1" => {
            Some((play_args, args, false))
        }
        _ => None,
    }
}
