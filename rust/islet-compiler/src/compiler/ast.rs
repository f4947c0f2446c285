use crate::compiler::tokens::Span;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::{AsRefStr, Display};

/// One compiled unit: the statements of a single submitted source string
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub body: Vec<Stmt>,
    pub span: Span,
}

impl Program {
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

// ── Statements ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Stmt {
    Expr(ExprStmt),
    Assign(AssignStmt),
    AugAssign(AugAssignStmt),
    If(IfStmt),
    While(WhileStmt),
    For(ForStmt),
    Def(Arc<FunctionDef>),
    Return(ReturnStmt),
    Break(Span),
    Continue(Span),
    Pass(Span),
    Import(ImportStmt),
    FromImport(FromImportStmt),
    Global(GlobalStmt),
    Raise(RaiseStmt),
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Expr(s) => s.span,
            Stmt::Assign(s) => s.span,
            Stmt::AugAssign(s) => s.span,
            Stmt::If(s) => s.span,
            Stmt::While(s) => s.span,
            Stmt::For(s) => s.span,
            Stmt::Def(d) => d.span,
            Stmt::Return(s) => s.span,
            Stmt::Break(s) | Stmt::Continue(s) | Stmt::Pass(s) => *s,
            Stmt::Import(s) => s.span,
            Stmt::FromImport(s) => s.span,
            Stmt::Global(s) => s.span,
            Stmt::Raise(s) => s.span,
        }
    }

    /// Compound statements own nested blocks; everything else is a simple statement.
    pub fn is_compound(&self) -> bool {
        matches!(self, Stmt::If(_) | Stmt::While(_) | Stmt::For(_) | Stmt::Def(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExprStmt {
    pub expr: Expr,
    pub span: Span,
}

/// `a = b = value`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignStmt {
    pub targets: Vec<Target>,
    pub value: Expr,
    pub span: Span,
}

/// `target op= value`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AugAssignStmt {
    pub target: Target,
    pub op: BinOp,
    pub value: Expr,
    pub span: Span,
}

/// Assignable place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Target {
    /// `name = ...`
    Name(String, Span),
    /// `base[index] = ...`, where `base` is itself a name or an index chain
    Index(Box<Expr>, Box<Expr>, Span),
}

impl Target {
    pub fn span(&self) -> Span {
        match self {
            Target::Name(_, s) | Target::Index(_, _, s) => *s,
        }
    }

    /// The variable at the root of the place (`xs` for `xs[0][1]`).
    pub fn root_name(&self) -> Option<&str> {
        match self {
            Target::Name(n, _) => Some(n),
            Target::Index(base, _, _) => base.root_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IfStmt {
    /// `if` followed by any `elif` arms, in source order
    pub branches: Vec<(Expr, Vec<Stmt>)>,
    pub else_body: Option<Vec<Stmt>>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhileStmt {
    pub condition: Expr,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForStmt {
    pub var: String,
    pub iter: Expr,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

impl FunctionDef {
    /// Number of parameters without a default value.
    pub fn required_params(&self) -> usize {
        self.params.iter().filter(|p| p.default.is_none()).count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnStmt {
    pub value: Option<Expr>,
    pub span: Span,
}

/// `import a` / `import a as b, c`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportStmt {
    /// Module names with their optional aliases
    pub names: Vec<(String, Option<String>)>,
    pub span: Span,
}

/// `from a import b, c as d`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FromImportStmt {
    pub module: String,
    pub names: Vec<(String, Option<String>)>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalStmt {
    pub names: Vec<String>,
    pub span: Span,
}

/// `raise` / `raise expr`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaiseStmt {
    pub value: Option<Expr>,
    pub span: Span,
}

// ── Expressions ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
pub enum BinOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "//")]
    FloorDiv,
    #[strum(serialize = "%")]
    Mod,
    #[strum(serialize = "**")]
    Pow,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    NotEq,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    LtEq,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    GtEq,
    #[strum(serialize = "in")]
    In,
    #[strum(serialize = "not in")]
    NotIn,
    #[strum(serialize = "and")]
    And,
    #[strum(serialize = "or")]
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum UnaryOp {
    #[strum(serialize = "-")]
    Neg,
    #[strum(serialize = "+")]
    Pos,
    #[strum(serialize = "not")]
    Not,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CallArg {
    Positional(Expr),
    Keyword(String, Expr, Span),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    IntLit(i64, Span),
    FloatLit(f64, Span),
    StringLit(String, Span),
    BoolLit(bool, Span),
    NoneLit(Span),
    Ident(String, Span),
    ListLit(Vec<Expr>, Span),
    DictLit(Vec<(Expr, Expr)>, Span),
    BinOp(Box<Expr>, BinOp, Box<Expr>, Span),
    UnaryOp(UnaryOp, Box<Expr>, Span),
    /// `body if condition else orelse`, stored as (condition, body, orelse)
    IfExpr(Box<Expr>, Box<Expr>, Box<Expr>, Span),
    Call(Box<Expr>, Vec<CallArg>, Span),
    Attribute(Box<Expr>, String, Span),
    Index(Box<Expr>, Box<Expr>, Span),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::IntLit(_, s)
            | Expr::FloatLit(_, s)
            | Expr::StringLit(_, s)
            | Expr::BoolLit(_, s)
            | Expr::NoneLit(s)
            | Expr::Ident(_, s)
            | Expr::ListLit(_, s)
            | Expr::DictLit(_, s)
            | Expr::BinOp(_, _, _, s)
            | Expr::UnaryOp(_, _, s)
            | Expr::IfExpr(_, _, _, s)
            | Expr::Call(_, _, s)
            | Expr::Attribute(_, _, s)
            | Expr::Index(_, _, s) => *s,
        }
    }

    /// The variable at the root of a name / index chain, if the expression is one.
    pub fn root_name(&self) -> Option<&str> {
        match self {
            Expr::Ident(n, _) => Some(n),
            Expr::Index(base, _, _) => base.root_name(),
            _ => None,
        }
    }
}
