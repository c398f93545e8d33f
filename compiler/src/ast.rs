// ast.rs — openQASM3/openpulse abstract syntax
//
// Data-only module: node definitions, constructor helpers and a QASM-ish
// Display used in error messages. Programs enter the compiler as values
// of these types, either built directly or deserialized from JSON
// (include files). No behavior lives here.

use std::fmt;

use serde::{Deserialize, Serialize};

// ── Time units ───────────────────────────────────────────────────────────

/// Units a duration literal can carry. `Dt` is one sample at 2 GS/s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeUnit {
    Dt,
    Ns,
    Us,
    Ms,
    S,
}

impl TimeUnit {
    /// Length of one unit in seconds.
    pub fn in_seconds(self) -> f64 {
        match self {
            TimeUnit::Dt => 0.5e-9,
            TimeUnit::Ns => 1e-9,
            TimeUnit::Us => 1e-6,
            TimeUnit::Ms => 1e-3,
            TimeUnit::S => 1.0,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            TimeUnit::Dt => "dt",
            TimeUnit::Ns => "ns",
            TimeUnit::Us => "us",
            TimeUnit::Ms => "ms",
            TimeUnit::S => "s",
        }
    }
}

// ── Operators ────────────────────────────────────────────────────────────

/// Binary operators in openQASM declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOperator {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
    AndAnd,
    OrOr,
    BitOr,
    BitXor,
    BitAnd,
    Shl,
    Shr,
    Plus,
    Minus,
    Times,
    Div,
    Mod,
    Pow,
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Gt => ">",
            BinaryOperator::Lt => "<",
            BinaryOperator::Ge => ">=",
            BinaryOperator::Le => "<=",
            BinaryOperator::Eq => "==",
            BinaryOperator::Ne => "!=",
            BinaryOperator::AndAnd => "&&",
            BinaryOperator::OrOr => "||",
            BinaryOperator::BitOr => "|",
            BinaryOperator::BitXor => "^",
            BinaryOperator::BitAnd => "&",
            BinaryOperator::Shl => "<<",
            BinaryOperator::Shr => ">>",
            BinaryOperator::Plus => "+",
            BinaryOperator::Minus => "-",
            BinaryOperator::Times => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
            BinaryOperator::Pow => "**",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOperator {
    Invert,
    Not,
    Neg,
}

impl UnaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOperator::Invert => "~",
            UnaryOperator::Not => "!",
            UnaryOperator::Neg => "-",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentOperator {
    Assign,
    PlusAssign,
    MinusAssign,
    TimesAssign,
    DivAssign,
}

impl AssignmentOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            AssignmentOperator::Assign => "=",
            AssignmentOperator::PlusAssign => "+=",
            AssignmentOperator::MinusAssign => "-=",
            AssignmentOperator::TimesAssign => "*=",
            AssignmentOperator::DivAssign => "/=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IoKeyword {
    Input,
    Output,
}

// ── Classical types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClassicalType {
    Int { size: Option<u32> },
    Uint { size: Option<u32> },
    Float { size: Option<u32> },
    Angle { size: Option<u32> },
    Bit { size: Option<Box<Expression>> },
    Bool,
    Complex,
    Duration,
    Stretch,
    Array { base: Box<ClassicalType>, dims: Vec<Expression> },
    Port,
    Frame,
    Waveform,
}

impl ClassicalType {
    /// Canonical type name, as used in mangled signatures.
    pub fn type_name(&self) -> &'static str {
        match self {
            ClassicalType::Int { .. } => "INT",
            ClassicalType::Uint { .. } => "UINT",
            ClassicalType::Float { .. } => "FLOAT",
            ClassicalType::Angle { .. } => "ANGLE",
            ClassicalType::Bit { .. } => "BIT",
            ClassicalType::Bool => "BOOL",
            ClassicalType::Complex => "COMPLEX",
            ClassicalType::Duration => "DURATION",
            ClassicalType::Stretch => "STRETCH",
            ClassicalType::Array { .. } => "ARRAY",
            ClassicalType::Port => "PORT",
            ClassicalType::Frame => "FRAME",
            ClassicalType::Waveform => "WAVEFORM",
        }
    }
}

// ── Expressions ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    IntegerLiteral(i64),
    FloatLiteral(f64),
    ImaginaryLiteral(f64),
    BooleanLiteral(bool),
    BitstringLiteral { value: u64, width: u32 },
    DurationLiteral { value: f64, unit: TimeUnit },
    ArrayLiteral(Vec<Expression>),
    Identifier(String),
    Unary {
        op: UnaryOperator,
        expr: Box<Expression>,
    },
    Binary {
        op: BinaryOperator,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    Call {
        name: String,
        args: Vec<Expression>,
    },
    Index {
        collection: Box<Expression>,
        index: Vec<Expression>,
    },
    Range {
        start: Option<Box<Expression>>,
        end: Option<Box<Expression>>,
        step: Option<Box<Expression>>,
    },
    DiscreteSet(Vec<Expression>),
    Concatenation {
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    DurationOf {
        target: String,
    },
    SizeOf {
        target: Box<Expression>,
        dim: Option<Box<Expression>>,
    },
}

impl Expression {
    pub fn int(value: i64) -> Self {
        Expression::IntegerLiteral(value)
    }

    pub fn float(value: f64) -> Self {
        Expression::FloatLiteral(value)
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Expression::Identifier(name.into())
    }

    pub fn call(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::Call {
            name: name.into(),
            args,
        }
    }

    pub fn duration(value: f64, unit: TimeUnit) -> Self {
        Expression::DurationLiteral { value, unit }
    }

    pub fn binary(op: BinaryOperator, lhs: Expression, rhs: Expression) -> Self {
        Expression::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// The identifier name, if this expression is a plain identifier.
    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            Expression::Identifier(name) => Some(name),
            _ => None,
        }
    }

    /// True for integer, float and imaginary literals.
    pub fn is_numeric_literal(&self) -> bool {
        matches!(
            self,
            Expression::IntegerLiteral(_)
                | Expression::FloatLiteral(_)
                | Expression::ImaginaryLiteral(_)
        )
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::IntegerLiteral(v) => write!(f, "{v}"),
            Expression::FloatLiteral(v) => write!(f, "{v}"),
            Expression::ImaginaryLiteral(v) => write!(f, "{v}im"),
            Expression::BooleanLiteral(v) => write!(f, "{}", if *v { "true" } else { "false" }),
            Expression::BitstringLiteral { value, width } => {
                write!(f, "\"{:0width$b}\"", value, width = *width as usize)
            }
            Expression::DurationLiteral { value, unit } => {
                write!(f, "{}{}", value, unit.suffix())
            }
            Expression::ArrayLiteral(values) => {
                write!(f, "{{")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "}}")
            }
            Expression::Identifier(name) => write!(f, "{name}"),
            Expression::Unary { op, expr } => write!(f, "{}{}", op.symbol(), expr),
            Expression::Binary { op, lhs, rhs } => {
                write!(f, "{} {} {}", lhs, op.symbol(), rhs)
            }
            Expression::Call { name, args } => {
                write!(f, "{name}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
            Expression::Index { collection, index } => {
                write!(f, "{collection}[")?;
                for (i, e) in index.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{e}")?;
                }
                write!(f, "]")
            }
            Expression::Range { start, end, step } => {
                if let Some(s) = start {
                    write!(f, "{s}")?;
                }
                if let Some(s) = step {
                    write!(f, ":{s}")?;
                }
                write!(f, ":")?;
                if let Some(e) = end {
                    write!(f, "{e}")?;
                }
                Ok(())
            }
            Expression::DiscreteSet(values) => {
                write!(f, "{{")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "}}")
            }
            Expression::Concatenation { lhs, rhs } => write!(f, "{lhs} ++ {rhs}"),
            Expression::DurationOf { target } => write!(f, "durationof({target})"),
            Expression::SizeOf { target, dim } => match dim {
                Some(d) => write!(f, "sizeof({target}, {d})"),
                None => write!(f, "sizeof({target})"),
            },
        }
    }
}

// ── Statements ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GateModifier {
    Inv,
    Pow(Expression),
    Ctrl(Option<Expression>),
    NegCtrl(Option<Expression>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateCall {
    pub modifiers: Vec<GateModifier>,
    pub name: String,
    pub args: Vec<Expression>,
    pub qubits: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub qubit: Expression,
    pub target: Option<Expression>,
}

/// A defcal argument: either a typed classical parameter or a literal
/// pinning the defcal to a concrete value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DefcalArg {
    Classical { ty: ClassicalType, name: String },
    Literal(Expression),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Defcal {
    pub name: String,
    pub args: Vec<DefcalArg>,
    pub qubits: Vec<String>,
    pub return_type: Option<ClassicalType>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedParam {
    pub ty: ClassicalType,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subroutine {
    pub name: String,
    pub params: Vec<TypedParam>,
    pub return_type: Option<ClassicalType>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForIn {
    pub ty: ClassicalType,
    pub variable: String,
    pub set: Expression,
    pub block: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    ClassicalDeclaration {
        ty: ClassicalType,
        name: String,
        init: Option<Expression>,
    },
    ConstantDeclaration {
        ty: ClassicalType,
        name: String,
        init: Expression,
    },
    IoDeclaration {
        io: IoKeyword,
        ty: ClassicalType,
        name: String,
    },
    QubitDeclaration {
        name: String,
        size: Option<Expression>,
    },
    Include {
        filename: String,
    },
    Expression(Expression),
    GateCall(GateCall),
    GateDefinition {
        name: String,
        params: Vec<String>,
        qubits: Vec<String>,
        body: Vec<Statement>,
    },
    Measurement(Measurement),
    Reset {
        qubits: Vec<Expression>,
    },
    Barrier {
        qubits: Vec<Expression>,
    },
    Delay {
        duration: Expression,
        qubits: Vec<Expression>,
    },
    Calibration {
        body: Vec<Statement>,
    },
    Defcal(Defcal),
    Subroutine(Subroutine),
    ExternDeclaration {
        name: String,
        params: Vec<ClassicalType>,
        return_type: Option<ClassicalType>,
    },
    Return(Option<Expression>),
    Branch {
        condition: Expression,
        if_block: Vec<Statement>,
        else_block: Vec<Statement>,
    },
    ForIn(ForIn),
    While {
        condition: Expression,
        block: Vec<Statement>,
    },
    Break,
    Continue,
    End,
    Assignment {
        lvalue: Expression,
        op: AssignmentOperator,
        rvalue: Expression,
    },
    Alias {
        target: String,
        value: Expression,
    },
}

// ── Program ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub version: Option<String>,
    pub statements: Vec<Statement>,
}

impl Program {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self {
            version: Some("3.0".to_string()),
            statements,
        }
    }
}

/// True if the qubit name refers to a physical qubit (`$` prefix).
pub fn is_physical_qubit(name: &str) -> bool {
    name.starts_with('$')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_call_and_binary() {
        let e = Expression::binary(
            BinaryOperator::Plus,
            Expression::ident("w_real"),
            Expression::binary(
                BinaryOperator::Times,
                Expression::ident("ii"),
                Expression::ident("w_imag"),
            ),
        );
        assert_eq!(format!("{e}"), "w_real + ii * w_imag");

        let c = Expression::call("gauss", vec![Expression::int(640), Expression::float(0.2)]);
        assert_eq!(format!("{c}"), "gauss(640, 0.2)");
    }

    #[test]
    fn display_duration_literal() {
        let d = Expression::duration(32.0, TimeUnit::Ns);
        assert_eq!(format!("{d}"), "32ns");
    }

    #[test]
    fn physical_qubit_detection() {
        assert!(is_physical_qubit("$0"));
        assert!(!is_physical_qubit("q1"));
    }

    #[test]
    fn program_round_trips_through_json() {
        let p = Program::new(vec![Statement::ClassicalDeclaration {
            ty: ClassicalType::Int { size: None },
            name: "n".to_string(),
            init: Some(Expression::int(4)),
        }]);
        let text = serde_json::to_string(&p).unwrap();
        let back: Program = serde_json::from_str(&text).unwrap();
        assert_eq!(p, back);
    }
}
