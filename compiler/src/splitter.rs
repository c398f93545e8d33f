// splitter.rs — Slice a program down to one sequencing core
//
// Produces a copy of the program that only references frames living on
// a set of target ports. Frame and port declarations for other cores
// are dropped, as are pulse operations on dropped frames, delays on
// foreign frames inside defcal bodies, and defcals whose bodies end up
// empty.

use std::collections::BTreeSet;

use crate::ast::{ClassicalType, Defcal, Expression, Program, Statement};
use crate::diag::{Error, ErrorKind, Result};

/// Pulse operations tied to a frame by their first argument.
const FRAME_CALLS: &[&str] = &[
    "play",
    "capture_v1",
    "capture_v2",
    "capture_v3",
    "capture_v1_spectrum",
    "set_frequency",
    "shift_frequency",
    "set_phase",
    "shift_phase",
];

pub struct CoreSplitter {
    target_ports: BTreeSet<String>,
    frames: BTreeSet<String>,
}

/// Slice `program` down to the statements relevant for `target_ports`.
pub fn split_for_ports(program: &Program, target_ports: BTreeSet<String>) -> Result<Program> {
    CoreSplitter::new(target_ports).split(program)
}

impl CoreSplitter {
    pub fn new(target_ports: BTreeSet<String>) -> Self {
        Self {
            target_ports,
            frames: BTreeSet::new(),
        }
    }

    pub fn split(&mut self, program: &Program) -> Result<Program> {
        let statements = self.split_block(&program.statements, false)?;
        Ok(Program {
            version: program.version.clone(),
            statements,
        })
    }

    fn split_block(&mut self, statements: &[Statement], in_defcal: bool) -> Result<Vec<Statement>> {
        let mut out = Vec::with_capacity(statements.len());
        for statement in statements {
            if let Some(kept) = self.split_statement(statement, in_defcal)? {
                out.push(kept);
            }
        }
        Ok(out)
    }

    fn split_statement(
        &mut self,
        statement: &Statement,
        in_defcal: bool,
    ) -> Result<Option<Statement>> {
        match statement {
            Statement::ClassicalDeclaration {
                ty: ClassicalType::Frame,
                name,
                init,
            } => {
                let port = frame_port(init).ok_or_else(|| {
                    Error::new(
                        ErrorKind::Unhandled,
                        format!("frame declaration '{name}' is not newframe(port, frequency, phase)"),
                    )
                })?;
                if self.target_ports.contains(port) {
                    self.frames.insert(name.clone());
                    Ok(Some(statement.clone()))
                } else {
                    Ok(None)
                }
            }
            Statement::ClassicalDeclaration {
                ty: ClassicalType::Port,
                name,
                ..
            } => {
                if self.target_ports.contains(name) {
                    Ok(Some(statement.clone()))
                } else {
                    Ok(None)
                }
            }
            Statement::Expression(expr) => {
                if self.keeps_call(expr) {
                    Ok(Some(statement.clone()))
                } else {
                    Ok(None)
                }
            }
            Statement::Return(Some(expr)) => {
                if self.keeps_call(expr) {
                    Ok(Some(statement.clone()))
                } else {
                    Ok(None)
                }
            }
            Statement::Delay { qubits, .. } if in_defcal => {
                let on_frame = qubits
                    .first()
                    .and_then(|q| q.as_identifier())
                    .is_some_and(|name| self.frames.contains(name));
                if on_frame {
                    Ok(Some(statement.clone()))
                } else {
                    Ok(None)
                }
            }
            Statement::Calibration { body } => {
                let body = self.split_block(body, true)?;
                Ok(Some(Statement::Calibration { body }))
            }
            Statement::Defcal(defcal) => {
                let body = self.split_block(&defcal.body, true)?;
                if body.is_empty() {
                    return Ok(None);
                }
                Ok(Some(Statement::Defcal(Defcal {
                    body,
                    ..defcal.clone()
                })))
            }
            Statement::Subroutine(sub) => {
                let body = self.split_block(&sub.body, in_defcal)?;
                Ok(Some(Statement::Subroutine(crate::ast::Subroutine {
                    body,
                    ..sub.clone()
                })))
            }
            Statement::Branch {
                condition,
                if_block,
                else_block,
            } => Ok(Some(Statement::Branch {
                condition: condition.clone(),
                if_block: self.split_block(if_block, in_defcal)?,
                else_block: self.split_block(else_block, in_defcal)?,
            })),
            Statement::ForIn(for_in) => Ok(Some(Statement::ForIn(crate::ast::ForIn {
                block: self.split_block(&for_in.block, in_defcal)?,
                ..for_in.clone()
            }))),
            Statement::While { condition, block } => Ok(Some(Statement::While {
                condition: condition.clone(),
                block: self.split_block(block, in_defcal)?,
            })),
            other => Ok(Some(other.clone())),
        }
    }

    /// False when `expr` is a frame-bound pulse call on a dropped frame.
    fn keeps_call(&self, expr: &Expression) -> bool {
        if let Expression::Call { name, args } = expr {
            if FRAME_CALLS.contains(&name.as_str()) && args.len() == 2 {
                if let Some(frame) = args[0].as_identifier() {
                    return self.frames.contains(frame);
                }
            }
        }
        true
    }
}

fn frame_port(init: &Option<Expression>) -> Option<&str> {
    match init {
        Some(Expression::Call { name, args }) if name == "newframe" && args.len() == 3 => {
            args[0].as_identifier()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expression as E;

    fn port_decl(name: &str) -> Statement {
        Statement::ClassicalDeclaration {
            ty: ClassicalType::Port,
            name: name.to_string(),
            init: None,
        }
    }

    fn frame_decl(name: &str, port: &str) -> Statement {
        Statement::ClassicalDeclaration {
            ty: ClassicalType::Frame,
            name: name.to_string(),
            init: Some(E::call(
                "newframe",
                vec![E::ident(port), E::float(5e9), E::float(0.0)],
            )),
        }
    }

    fn targets(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn foreign_ports_and_frames_are_dropped() {
        let program = Program::new(vec![
            port_decl("ch1"),
            port_decl("ch2"),
            frame_decl("f1", "ch1"),
            frame_decl("f2", "ch2"),
        ]);
        let split = split_for_ports(&program, targets(&["ch1"])).unwrap();
        assert_eq!(split.statements, vec![port_decl("ch1"), frame_decl("f1", "ch1")]);
    }

    #[test]
    fn pulse_calls_on_dropped_frames_are_removed() {
        let program = Program::new(vec![
            port_decl("ch1"),
            frame_decl("f1", "ch1"),
            frame_decl("f2", "ch2"),
            Statement::Expression(E::call("play", vec![E::ident("f1"), E::ident("w")])),
            Statement::Expression(E::call("play", vec![E::ident("f2"), E::ident("w")])),
            Statement::Expression(E::call("shift_phase", vec![E::ident("f2"), E::float(0.3)])),
        ]);
        let split = split_for_ports(&program, targets(&["ch1"])).unwrap();
        assert_eq!(
            split.statements,
            vec![
                port_decl("ch1"),
                frame_decl("f1", "ch1"),
                Statement::Expression(E::call("play", vec![E::ident("f1"), E::ident("w")])),
            ]
        );
    }

    #[test]
    fn malformed_frame_declaration_is_unhandled() {
        let program = Program::new(vec![Statement::ClassicalDeclaration {
            ty: ClassicalType::Frame,
            name: "f".to_string(),
            init: Some(E::int(1)),
        }]);
        let err = split_for_ports(&program, targets(&["ch1"])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unhandled);
    }

    #[test]
    fn empty_defcal_is_removed() {
        let program = Program::new(vec![
            Statement::Calibration {
                body: vec![frame_decl("f2", "ch2")],
            },
            Statement::Defcal(Defcal {
                name: "x".to_string(),
                args: vec![],
                qubits: vec!["$0".to_string()],
                return_type: None,
                body: vec![Statement::Expression(E::call(
                    "play",
                    vec![E::ident("f2"), E::ident("w")],
                ))],
            }),
        ]);
        let split = split_for_ports(&program, targets(&["ch1"])).unwrap();
        assert_eq!(split.statements, vec![Statement::Calibration { body: vec![] }]);
    }

    #[test]
    fn defcal_return_of_dropped_capture_is_removed() {
        let program = Program::new(vec![
            Statement::Calibration {
                body: vec![frame_decl("rx", "ch2")],
            },
            Statement::Defcal(Defcal {
                name: "measure".to_string(),
                args: vec![],
                qubits: vec!["$0".to_string()],
                return_type: Some(ClassicalType::Bit { size: None }),
                body: vec![
                    Statement::Expression(E::call("play", vec![E::ident("rx"), E::ident("w")])),
                    Statement::Return(Some(E::call(
                        "capture_v2",
                        vec![E::ident("rx"), E::ident("weights")],
                    ))),
                ],
            }),
        ]);
        // ch1 is not the readout port; everything measurement-related goes.
        let split = split_for_ports(&program, targets(&["ch1"])).unwrap();
        assert_eq!(split.statements, vec![Statement::Calibration { body: vec![] }]);
    }

    #[test]
    fn delay_on_foreign_frame_in_defcal_is_dropped() {
        let program = Program::new(vec![
            Statement::Calibration {
                body: vec![frame_decl("f1", "ch1")],
            },
            Statement::Defcal(Defcal {
                name: "measure".to_string(),
                args: vec![],
                qubits: vec!["$0".to_string()],
                return_type: None,
                body: vec![
                    Statement::Delay {
                        duration: E::int(64),
                        qubits: vec![E::ident("f1")],
                    },
                    Statement::Delay {
                        duration: E::int(64),
                        qubits: vec![E::ident("f2")],
                    },
                ],
            }),
        ]);
        let split = split_for_ports(&program, targets(&["ch1"])).unwrap();
        let Statement::Defcal(defcal) = &split.statements[1] else {
            panic!("expected defcal");
        };
        assert_eq!(defcal.body.len(), 1);
    }
}
