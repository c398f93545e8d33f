// io_resolve.rs — Substitute `input` declarations with literal values
//
// Runtime parameters arrive as JSON values keyed by name. Each `input`
// declaration becomes a plain classical declaration initialized with a
// literal of the declared type. `output` declarations are not supported
// by the sequencer targets.

use std::collections::HashMap;

use serde_json::Value as Json;

use crate::ast::{ClassicalType, Expression, IoKeyword, Program, Statement, TimeUnit};
use crate::diag::{Error, ErrorKind, Result};

/// Replace every io declaration in `program` with a literal-initialized
/// classical declaration.
pub fn resolve_io(program: &mut Program, inputs: &HashMap<String, Json>) -> Result<()> {
    for statement in &mut program.statements {
        if let Statement::IoDeclaration { io, ty, name } = statement {
            match io {
                IoKeyword::Output => {
                    return Err(Error::new(
                        ErrorKind::OutputNotSupported,
                        format!("output declaration '{name}'"),
                    ));
                }
                IoKeyword::Input => {
                    let value = inputs.get(name.as_str()).ok_or_else(|| {
                        Error::new(
                            ErrorKind::InputNotFound,
                            format!("no value supplied for input '{name}'"),
                        )
                    })?;
                    let init = literal_for(ty, name, value)?;
                    *statement = Statement::ClassicalDeclaration {
                        ty: ty.clone(),
                        name: name.clone(),
                        init: Some(init),
                    };
                }
            }
        }
    }
    Ok(())
}

fn literal_for(ty: &ClassicalType, name: &str, value: &Json) -> Result<Expression> {
    let mismatch = || {
        Error::new(
            ErrorKind::InputTypeNotSupported,
            format!(
                "input '{name}' declared as {} cannot take value {value}",
                ty.type_name()
            ),
        )
    };
    match ty {
        ClassicalType::Int { .. } | ClassicalType::Uint { .. } => value
            .as_i64()
            .map(Expression::IntegerLiteral)
            .ok_or_else(mismatch),
        // Input durations are supplied in seconds.
        ClassicalType::Duration => value
            .as_f64()
            .map(|v| Expression::DurationLiteral {
                value: v * 1e9,
                unit: TimeUnit::Ns,
            })
            .ok_or_else(mismatch),
        ClassicalType::Float { .. } | ClassicalType::Angle { .. } => value
            .as_f64()
            .map(Expression::FloatLiteral)
            .ok_or_else(mismatch),
        ClassicalType::Bool => value
            .as_bool()
            .map(Expression::BooleanLiteral)
            .ok_or_else(mismatch),
        ClassicalType::Bit { .. } => match value {
            Json::Array(items) => {
                let bits = items
                    .iter()
                    .map(|item| item.as_i64().map(Expression::IntegerLiteral))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(mismatch)?;
                Ok(Expression::ArrayLiteral(bits))
            }
            other => other
                .as_i64()
                .map(Expression::IntegerLiteral)
                .ok_or_else(mismatch),
        },
        _ => Err(Error::new(
            ErrorKind::InputTypeNotSupported,
            format!("input '{name}' has unsupported type {}", ty.type_name()),
        )),
    }
}
