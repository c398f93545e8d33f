// include.rs — Inline `include` statements from JSON program files
//
// Included calibration files are JSON-serialized programs. Each include
// statement is replaced in place by the included file's statements,
// recursively. File contents are cached by SHA-256 digest so a file
// pulled in from several places is parsed once. Cycles are detected by
// canonical path.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::ast::{Program, Statement};
use crate::diag::{Error, ErrorKind, Result};

/// Replace all include statements in `program`. Relative filenames are
/// resolved against the directory of `source_path`.
pub fn resolve_includes(program: &mut Program, source_path: &Path) -> Result<()> {
    IncludeResolver::new().resolve(program, source_path)
}

#[derive(Default)]
pub struct IncludeResolver {
    /// Parsed programs keyed by content digest.
    cache: HashMap<[u8; 32], Program>,
    /// Files currently being expanded, for cycle detection.
    in_flight: HashSet<PathBuf>,
}

impl IncludeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&mut self, program: &mut Program, source_path: &Path) -> Result<()> {
        let dir = source_path.parent().unwrap_or_else(|| Path::new("."));
        let statements = std::mem::take(&mut program.statements);
        program.statements = self.flatten(statements, dir)?;
        Ok(())
    }

    fn flatten(&mut self, statements: Vec<Statement>, dir: &Path) -> Result<Vec<Statement>> {
        let mut out = Vec::with_capacity(statements.len());
        for statement in statements {
            match statement {
                Statement::Include { filename } => {
                    out.extend(self.expand(&filename, dir)?);
                }
                other => out.push(other),
            }
        }
        Ok(out)
    }

    fn expand(&mut self, filename: &str, dir: &Path) -> Result<Vec<Statement>> {
        let raw = Path::new(filename);
        let path = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            dir.join(raw)
        };
        if !path.exists() {
            return Err(Error::new(
                ErrorKind::IncludeError,
                format!("include file {} does not exist", path.display()),
            ));
        }
        let canonical = path.canonicalize().map_err(|e| {
            Error::new(
                ErrorKind::IncludeError,
                format!("cannot resolve {}: {e}", path.display()),
            )
        })?;
        if !self.in_flight.insert(canonical.clone()) {
            return Err(Error::new(
                ErrorKind::IncludeError,
                format!("include cycle through {}", canonical.display()),
            ));
        }

        let result = self.load_and_flatten(&canonical);
        self.in_flight.remove(&canonical);
        result
    }

    fn load_and_flatten(&mut self, path: &Path) -> Result<Vec<Statement>> {
        let program = self.load_program(path)?;
        let inner_dir = path.parent().unwrap_or_else(|| Path::new("."));
        self.flatten(program.statements, inner_dir)
    }

    fn load_program(&mut self, path: &Path) -> Result<Program> {
        let bytes = fs::read(path).map_err(|e| {
            Error::new(
                ErrorKind::IncludeError,
                format!("cannot read {}: {e}", path.display()),
            )
        })?;
        let digest: [u8; 32] = Sha256::digest(&bytes).into();
        if let Some(program) = self.cache.get(&digest) {
            return Ok(program.clone());
        }
        let program: Program = serde_json::from_slice(&bytes).map_err(|e| {
            Error::new(
                ErrorKind::IncludeError,
                format!("cannot parse {}: {e}", path.display()),
            )
        })?;
        self.cache.insert(digest, program.clone());
        Ok(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ClassicalType, Expression};
    use std::sync::atomic::{AtomicU32, Ordering};

    static DIR_SEQ: AtomicU32 = AtomicU32::new(0);

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "pqc-include-{}-{}",
            std::process::id(),
            DIR_SEQ.fetch_add(1, Ordering::SeqCst)
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_program(path: &Path, program: &Program) {
        fs::write(path, serde_json::to_vec(program).unwrap()).unwrap();
    }

    fn int_decl(name: &str, value: i64) -> Statement {
        Statement::ClassicalDeclaration {
            ty: ClassicalType::Int { size: None },
            name: name.to_string(),
            init: Some(Expression::int(value)),
        }
    }

    #[test]
    fn include_is_spliced_in_place() {
        let dir = scratch_dir();
        write_program(&dir.join("cal.json"), &Program::new(vec![int_decl("a", 1)]));

        let mut program = Program::new(vec![
            int_decl("before", 0),
            Statement::Include {
                filename: "cal.json".to_string(),
            },
            int_decl("after", 2),
        ]);
        resolve_includes(&mut program, &dir.join("main.qasm")).unwrap();
        assert_eq!(
            program.statements,
            vec![int_decl("before", 0), int_decl("a", 1), int_decl("after", 2)]
        );
    }

    #[test]
    fn nested_includes_resolve_recursively() {
        let dir = scratch_dir();
        write_program(&dir.join("leaf.json"), &Program::new(vec![int_decl("leaf", 3)]));
        write_program(
            &dir.join("mid.json"),
            &Program::new(vec![Statement::Include {
                filename: "leaf.json".to_string(),
            }]),
        );

        let mut program = Program::new(vec![Statement::Include {
            filename: "mid.json".to_string(),
        }]);
        resolve_includes(&mut program, &dir.join("main.qasm")).unwrap();
        assert_eq!(program.statements, vec![int_decl("leaf", 3)]);
    }

    #[test]
    fn missing_file_is_include_error() {
        let dir = scratch_dir();
        let mut program = Program::new(vec![Statement::Include {
            filename: "ghost.json".to_string(),
        }]);
        let err = resolve_includes(&mut program, &dir.join("main.qasm")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IncludeError);
    }

    #[test]
    fn self_include_cycle_is_detected() {
        let dir = scratch_dir();
        write_program(
            &dir.join("loop.json"),
            &Program::new(vec![Statement::Include {
                filename: "loop.json".to_string(),
            }]),
        );
        let mut program = Program::new(vec![Statement::Include {
            filename: "loop.json".to_string(),
        }]);
        let err = resolve_includes(&mut program, &dir.join("main.qasm")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IncludeError);
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn repeated_include_hits_the_cache() {
        let dir = scratch_dir();
        write_program(&dir.join("cal.json"), &Program::new(vec![int_decl("a", 1)]));
        let mut resolver = IncludeResolver::new();
        let mut program = Program::new(vec![
            Statement::Include {
                filename: "cal.json".to_string(),
            },
            Statement::Include {
                filename: "cal.json".to_string(),
            },
        ]);
        resolver
            .resolve(&mut program, &dir.join("main.qasm"))
            .unwrap();
        assert_eq!(program.statements.len(), 2);
        assert_eq!(resolver.cache.len(), 1);
    }
}
