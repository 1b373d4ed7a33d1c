use std::collections::HashSet;

use crate::compiler::{
    ast::{ExprKind, Expression, FunctionDef, Program, Stmt, StmtKind},
    error::SemanticError,
};

pub fn check_semantics(filename: &str, src: &str, ast: &Program) -> Result<(), SemanticError> {
    let mut checker = Checker {
        filename,
        src,
        in_function: false,
        loop_depth: 0,
    };
    checker.block(&ast.body)
}

struct Checker<'s> {
    filename: &'s str,
    src: &'s str,
    in_function: bool,
    loop_depth: usize,
}

impl Checker<'_> {
    fn error(&self, span: miette::SourceSpan, label: &str, message: String) -> SemanticError {
        SemanticError::new(self.filename, self.src, span, label, message)
    }

    fn block(&mut self, body: &[Stmt]) -> Result<(), SemanticError> {
        body.iter().try_for_each(|stmt| self.stmt(stmt))
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<(), SemanticError> {
        match &stmt.kind {
            StmtKind::Return(_) if !self.in_function => Err(self.error(
                stmt.span,
                "not inside a function",
                "'return' outside function".to_string(),
            )),
            StmtKind::Break if self.loop_depth == 0 => Err(self.error(
                stmt.span,
                "not inside a loop",
                "'break' outside loop".to_string(),
            )),
            StmtKind::Continue if self.loop_depth == 0 => Err(self.error(
                stmt.span,
                "not inside a loop",
                "'continue' not properly in loop".to_string(),
            )),
            StmtKind::Assign(assign) => check_target(&assign.target)
                .map_err(|what| {
                    self.error(
                        assign.target.span,
                        "cannot be assigned to",
                        format!("cannot assign to {what}"),
                    )
                }),
            StmtKind::If(if_stmt) => {
                for branch in &if_stmt.branches {
                    self.block(&branch.body)?;
                }
                match &if_stmt.orelse {
                    Some(body) => self.block(body),
                    None => Ok(()),
                }
            }
            StmtKind::While(while_stmt) => {
                self.loop_depth += 1;
                let result = self.block(&while_stmt.body);
                self.loop_depth -= 1;
                result
            }
            StmtKind::Def(def) => self.function(def),
            _ => Ok(()),
        }
    }

    fn function(&mut self, def: &FunctionDef) -> Result<(), SemanticError> {
        let mut seen = HashSet::new();
        for param in &def.params {
            if !seen.insert(param.name) {
                return Err(self.error(
                    param.span,
                    "repeated here",
                    format!(
                        "duplicate argument '{}' in function definition",
                        param.name
                    ),
                ));
            }
        }

        // Loops do not extend into nested function bodies.
        let saved = (self.in_function, self.loop_depth);
        self.in_function = true;
        self.loop_depth = 0;
        let result = self.block(&def.body);
        (self.in_function, self.loop_depth) = saved;
        result
    }
}

/// `Err` names what kind of expression was found instead of a plain name.
fn check_target(target: &Expression) -> Result<(), &'static str> {
    match target.kind {
        ExprKind::Identifier(_) => Ok(()),
        ExprKind::Literal(_) => Err("literal"),
        ExprKind::Call(_) => Err("function call"),
        ExprKind::Attribute(_) => Err("attribute"),
        _ => Err("expression"),
    }
}
