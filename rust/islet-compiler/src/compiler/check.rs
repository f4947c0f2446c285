//! Structural checks run after parsing: control flow placement and parameter lists.

use crate::compiler::ast::*;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CheckError {
    #[error("'{keyword}' outside loop at line {line}")]
    OutsideLoop { keyword: String, line: usize },
    #[error("'return' outside function at line {line}")]
    ReturnOutsideFunction { line: usize },
    #[error("duplicate parameter '{name}' in function '{function}' at line {line}")]
    DuplicateParam { name: String, function: String, line: usize },
    #[error("name '{name}' is parameter and global at line {line}")]
    ParamDeclaredGlobal { name: String, line: usize },
}

impl CheckError {
    pub fn line(&self) -> usize {
        match self {
            CheckError::OutsideLoop { line, .. }
            | CheckError::ReturnOutsideFunction { line }
            | CheckError::DuplicateParam { line, .. }
            | CheckError::ParamDeclaredGlobal { line, .. } => *line,
        }
    }
}

#[derive(Default)]
struct Scope<'a> {
    in_loop: bool,
    function: Option<&'a FunctionDef>,
}

/// Check a parsed program, returning every problem found in source order.
pub fn check(program: &Program) -> Result<(), Vec<CheckError>> {
    let mut errors = Vec::new();
    check_block(&program.body, &Scope::default(), &mut errors);
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn check_block(stmts: &[Stmt], scope: &Scope<'_>, errors: &mut Vec<CheckError>) {
    for stmt in stmts {
        check_stmt(stmt, scope, errors);
    }
}

fn check_stmt(stmt: &Stmt, scope: &Scope<'_>, errors: &mut Vec<CheckError>) {
    match stmt {
        Stmt::Break(span) if !scope.in_loop => {
            errors.push(CheckError::OutsideLoop { keyword: "break".into(), line: span.line });
        }
        Stmt::Continue(span) if !scope.in_loop => {
            errors.push(CheckError::OutsideLoop { keyword: "continue".into(), line: span.line });
        }
        Stmt::Return(r) if scope.function.is_none() => {
            errors.push(CheckError::ReturnOutsideFunction { line: r.span.line });
        }
        Stmt::Global(g) => {
            if let Some(func) = scope.function {
                for name in &g.names {
                    if func.params.iter().any(|p| &p.name == name) {
                        errors.push(CheckError::ParamDeclaredGlobal { name: name.clone(), line: g.span.line });
                    }
                }
            }
        }
        Stmt::If(s) => {
            for (_, body) in &s.branches {
                check_block(body, scope, errors);
            }
            if let Some(body) = &s.else_body {
                check_block(body, scope, errors);
            }
        }
        Stmt::While(s) => {
            check_block(&s.body, &Scope { in_loop: true, function: scope.function }, errors);
        }
        Stmt::For(s) => {
            check_block(&s.body, &Scope { in_loop: true, function: scope.function }, errors);
        }
        Stmt::Def(def) => {
            let mut seen = HashSet::new();
            for p in &def.params {
                if !seen.insert(p.name.as_str()) {
                    errors.push(CheckError::DuplicateParam {
                        name: p.name.clone(),
                        function: def.name.clone(),
                        line: p.span.line,
                    });
                }
            }
            // Loops do not extend into nested function bodies
            check_block(&def.body, &Scope { in_loop: false, function: Some(def) }, errors);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::lexer::Lexer;
    use crate::compiler::parser::Parser;

    fn check_src(src: &str) -> Result<(), Vec<CheckError>> {
        let tokens = Lexer::new(src).tokenize().unwrap();
        let program = Parser::new(tokens).parse_program().unwrap();
        check(&program)
    }

    #[test]
    fn test_loop_control_inside_loops() {
        assert!(check_src("while True:\n    break\nfor i in xs:\n    if i:\n        continue\n").is_ok());
    }

    #[test]
    fn test_break_outside_loop() {
        let errs = check_src("x = 1\nbreak\n").unwrap_err();
        assert_eq!(errs, vec![CheckError::OutsideLoop { keyword: "break".into(), line: 2 }]);
    }

    #[test]
    fn test_loop_does_not_leak_into_def() {
        let errs = check_src("while True:\n    def f():\n        continue\n").unwrap_err();
        assert!(matches!(&errs[0], CheckError::OutsideLoop { keyword, line: 3 } if keyword == "continue"));
    }

    #[test]
    fn test_return_outside_function() {
        let errs = check_src("return 1").unwrap_err();
        assert_eq!(errs[0].line(), 1);
        assert!(check_src("def f():\n    return 1\n").is_ok());
    }

    #[test]
    fn test_duplicate_params() {
        let errs = check_src("def f(a, a):\n    pass\n").unwrap_err();
        assert!(matches!(&errs[0], CheckError::DuplicateParam { name, .. } if name == "a"));
    }

    #[test]
    fn test_param_declared_global() {
        let errs = check_src("def f(a):\n    global a\n").unwrap_err();
        assert!(matches!(&errs[0], CheckError::ParamDeclaredGlobal { name, line: 2 } if name == "a"));
    }

    #[test]
    fn test_collects_all_errors() {
        let errs = check_src("break\ncontinue\nreturn\n").unwrap_err();
        assert_eq!(errs.len(), 3);
    }
}
