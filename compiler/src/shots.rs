// shots.rs — Extract shot and sweep-step counts from a program
//
// Programs declare `const int n_shots` and either `const int n_steps`
// or an `array[int, N] n_steps = {...}` sweep. The extracted signature
// drives the measurement result shape reported alongside the compiled
// cores.

use serde::{Deserialize, Serialize};

use crate::ast::{ClassicalType, Expression, Program, Statement};
use crate::diag::{Error, ErrorKind, Result};

/// Number of shots and sweep steps declared by a program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShotsSignature {
    pub steps: Vec<i64>,
    pub shots: i64,
}

impl Default for ShotsSignature {
    fn default() -> Self {
        Self {
            steps: vec![1],
            shots: 1,
        }
    }
}

/// Scan top-level declarations for `n_shots` and `n_steps`.
pub fn extract_shots(program: &Program) -> Result<ShotsSignature> {
    let mut signature = ShotsSignature::default();
    for statement in &program.statements {
        match statement {
            Statement::ConstantDeclaration { name, init, .. } => match name.as_str() {
                "n_shots" => signature.shots = int_literal(init, name)?,
                "n_steps" => signature.steps = vec![int_literal(init, name)?],
                _ => {}
            },
            Statement::ClassicalDeclaration {
                ty,
                name,
                init: Some(init),
            } if name == "n_steps" => {
                if !matches!(ty, ClassicalType::Array { .. }) {
                    return Err(Error::new(
                        ErrorKind::InvalidArgument,
                        "n_steps must be declared as an array",
                    ));
                }
                let Expression::ArrayLiteral(values) = init else {
                    return Err(Error::new(
                        ErrorKind::InvalidArgument,
                        "n_steps must be initialized with an array literal",
                    ));
                };
                signature.steps = values
                    .iter()
                    .map(|v| int_literal(v, name))
                    .collect::<Result<Vec<_>>>()?;
            }
            _ => {}
        }
    }
    Ok(signature)
}

fn int_literal(expr: &Expression, name: &str) -> Result<i64> {
    match expr {
        Expression::IntegerLiteral(v) => Ok(*v),
        other => Err(Error::new(
            ErrorKind::InvalidArgument,
            format!("{name} must be an integer literal, found '{other}'"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expression as E;

    fn const_int(name: &str, value: i64) -> Statement {
        Statement::ConstantDeclaration {
            ty: ClassicalType::Int { size: None },
            name: name.to_string(),
            init: E::int(value),
        }
    }

    #[test]
    fn defaults_to_one_shot_one_step() {
        let signature = extract_shots(&Program::new(vec![])).unwrap();
        assert_eq!(signature, ShotsSignature::default());
        assert_eq!(signature.steps, vec![1]);
        assert_eq!(signature.shots, 1);
    }

    #[test]
    fn scalar_shots_and_steps() {
        let program = Program::new(vec![const_int("n_shots", 100), const_int("n_steps", 5)]);
        let signature = extract_shots(&program).unwrap();
        assert_eq!(signature.shots, 100);
        assert_eq!(signature.steps, vec![5]);
    }

    #[test]
    fn array_steps() {
        let program = Program::new(vec![
            const_int("n_shots", 200),
            Statement::ClassicalDeclaration {
                ty: ClassicalType::Array {
                    base: Box::new(ClassicalType::Int { size: None }),
                    dims: vec![E::int(4)],
                },
                name: "n_steps".to_string(),
                init: Some(E::ArrayLiteral(vec![
                    E::int(5),
                    E::int(6),
                    E::int(7),
                    E::int(8),
                ])),
            },
        ]);
        let signature = extract_shots(&program).unwrap();
        assert_eq!(signature.steps, vec![5, 6, 7, 8]);
    }

    #[test]
    fn non_array_classical_steps_is_rejected() {
        let program = Program::new(vec![Statement::ClassicalDeclaration {
            ty: ClassicalType::Int { size: None },
            name: "n_steps".to_string(),
            init: Some(E::int(5)),
        }]);
        let err = extract_shots(&program).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn unrelated_declarations_are_ignored() {
        let program = Program::new(vec![const_int("n_other", 7)]);
        let signature = extract_shots(&program).unwrap();
        assert_eq!(signature, ShotsSignature::default());
    }
}
