//! Global symbol table: functions (with parameter types and variadic flag)
//! and global variables, keyed by name.

use std::collections::HashMap;

use crate::error::{CompileError, Result};
use crate::types::Type;

#[derive(Debug, Clone)]
pub enum Global {
    Variable {
        ty: Type,
    },
    Function {
        return_type: Type,
        params: Vec<Type>,
        variadic: bool,
    },
}

impl Global {
    pub fn is_function(&self) -> bool {
        matches!(self, Global::Function { .. })
    }
}

#[derive(Default)]
pub struct GlobalTable {
    entries: HashMap<String, Global>,
}

impl GlobalTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, name: &str) -> Option<&Global> {
        self.entries.get(name)
    }

    /// Adds a global, matching it against any existing declaration of the
    /// same name. A mismatch (kind, type, parameter list, or variadic flag)
    /// is fatal; a matching re-declaration is accepted and the existing
    /// entry is kept.
    pub fn add(&mut self, name: String, global: Global) -> Result<()> {
        match self.entries.get(&name) {
            None => {
                self.entries.insert(name, global);
                Ok(())
            }
            Some(existing) => {
                check_match(&name, existing, &global)?;
                Ok(())
            }
        }
    }

    /// Sets the variadic flag on an already-added function. Mirrors the
    /// original's two-step "declare, then mark variadic once `...` is seen"
    /// sequence.
    pub fn set_variadic(&mut self, name: &str, variadic: bool) {
        if let Some(Global::Function { variadic: v, .. }) = self.entries.get_mut(name) {
            *v = variadic;
        }
    }
}

fn check_match(name: &str, left: &Global, right: &Global) -> Result<()> {
    match (left, right) {
        (Global::Variable { ty: a }, Global::Variable { ty: b }) => {
            if !a.equal(b) {
                return Err(CompileError::fatal(format!(
                    "Global variable `{name}` re-declared with a different type."
                )));
            }
            Ok(())
        }
        (
            Global::Function {
                return_type: ra,
                params: pa,
                variadic: va,
            },
            Global::Function {
                return_type: rb,
                params: pb,
                variadic: vb,
            },
        ) => {
            if !ra.equal(rb) {
                return Err(CompileError::fatal(format!(
                    "Function `{name}` re-declared with a different return type."
                )));
            }
            if pa.len() != pb.len() {
                return Err(CompileError::fatal(format!(
                    "Function `{name}` re-declared with a different number of arguments."
                )));
            }
            if pa.iter().zip(pb).any(|(x, y)| !x.equal(y)) {
                return Err(CompileError::fatal(format!(
                    "Function `{name}` re-declared with different argument types."
                )));
            }
            if va != vb {
                return Err(CompileError::fatal(format!(
                    "Function `{name}` re-declared with a different variadic argument."
                )));
            }
            Ok(())
        }
        _ => Err(CompileError::fatal(format!(
            "`{name}` re-declared as a different kind of symbol."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BaseKind;

    #[test]
    fn matching_redeclaration_is_accepted() {
        let mut table = GlobalTable::new();
        let ty = Type::new_base(BaseKind::SignedInt);
        table
            .add("x".into(), Global::Variable { ty })
            .unwrap();
        table
            .add("x".into(), Global::Variable { ty })
            .unwrap();
        assert!(table.find("x").is_some());
    }

    #[test]
    fn mismatched_redeclaration_is_fatal() {
        let mut table = GlobalTable::new();
        table
            .add(
                "x".into(),
                Global::Variable {
                    ty: Type::new_base(BaseKind::SignedInt),
                },
            )
            .unwrap();
        let result = table.add(
            "x".into(),
            Global::Variable {
                ty: Type::new_base(BaseKind::SignedChar),
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn variable_and_function_kind_mismatch_is_fatal() {
        let mut table = GlobalTable::new();
        table
            .add(
                "x".into(),
                Global::Variable {
                    ty: Type::new_base(BaseKind::SignedInt),
                },
            )
            .unwrap();
        let result = table.add(
            "x".into(),
            Global::Function {
                return_type: Type::new_base(BaseKind::SignedInt),
                params: vec![],
                variadic: false,
            },
        );
        assert!(result.is_err());
    }
}
