// call_stack.rs — Activation records for interpretation
//
// Each activation record binds names to runtime values for one frame of
// execution (program, subroutine, defcal body, loop iteration…).
// Members are shared maps so the calibration scope can sit on the stack
// in several frames at once and mutations stay visible everywhere.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::diag::{Error, ErrorKind, Result};
use crate::interpreter::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ARType {
    Program,
    Extern,
    Subroutine,
    Calibration,
    Defcal,
    Gate,
    Loop,
}

impl fmt::Display for ARType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ARType::Program => "PROGRAM",
            ARType::Extern => "EXTERN",
            ARType::Subroutine => "SUBROUTINE",
            ARType::Calibration => "CALIBRATION",
            ARType::Defcal => "DEFCAL",
            ARType::Gate => "GATE",
            ARType::Loop => "LOOP",
        };
        write!(f, "{s}")
    }
}

pub type Members = Rc<RefCell<HashMap<String, Value>>>;

#[derive(Debug, Clone)]
pub struct ActivationRecord {
    pub name: String,
    pub ar_type: ARType,
    pub nesting_level: usize,
    pub members: Members,
}

impl ActivationRecord {
    pub fn new(name: impl Into<String>, ar_type: ARType, nesting_level: usize) -> Self {
        Self {
            name: name.into(),
            ar_type,
            nesting_level,
            members: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    /// Record sharing an existing members map (calibration scope).
    pub fn with_members(
        name: impl Into<String>,
        ar_type: ARType,
        nesting_level: usize,
        members: Members,
    ) -> Self {
        Self {
            name: name.into(),
            ar_type,
            nesting_level,
            members,
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.members.borrow().get(name).cloned()
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.members.borrow_mut().insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.borrow().contains_key(name)
    }
}

#[derive(Debug, Default)]
pub struct CallStack {
    records: Vec<ActivationRecord>,
}

impl CallStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: ActivationRecord) {
        self.records.push(record);
    }

    pub fn pop(&mut self) -> Option<ActivationRecord> {
        self.records.pop()
    }

    pub fn peek(&self) -> Option<&ActivationRecord> {
        self.records.last()
    }

    pub fn nesting_level(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> &[ActivationRecord] {
        &self.records
    }

    /// Innermost record binding `name`, searching top-down.
    pub fn record_with(&self, name: &str) -> Option<&ActivationRecord> {
        self.records.iter().rev().find(|r| r.contains(name))
    }

    /// Value bound to `name` in the innermost record that has it.
    pub fn lookup(&self, name: &str) -> Result<Value> {
        self.record_with(name)
            .and_then(|r| r.get(name))
            .ok_or_else(|| Error::new(ErrorKind::IdentifierNotFound, format!("'{name}'")))
    }

    /// Overwrite the innermost binding of `name`.
    pub fn assign(&self, name: &str, value: Value) -> Result<()> {
        match self.record_with(name) {
            Some(record) => {
                record.set(name, value);
                Ok(())
            }
            None => Err(Error::new(
                ErrorKind::IdentifierNotFound,
                format!("cannot assign to undeclared '{name}'"),
            )),
        }
    }

    /// Bind `name` in the top record.
    pub fn declare(&self, name: impl Into<String>, value: Value) -> Result<()> {
        match self.peek() {
            Some(record) => {
                record.set(name, value);
                Ok(())
            }
            None => Err(Error::new(
                ErrorKind::Unhandled,
                "declaration outside any activation record",
            )),
        }
    }
}
