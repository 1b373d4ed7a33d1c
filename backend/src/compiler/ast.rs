use miette::SourceSpan;
use serde::{Deserialize, Serialize};

pub type Identifier<'a> = &'a str;

#[derive(Debug, Clone, PartialEq)]
pub struct Program<'a> {
    pub body: Vec<Stmt<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt<'a> {
    pub kind: StmtKind<'a>,
    pub span: SourceSpan,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind<'a> {
    Expr(Expression<'a>),
    Assign(Assignment<'a>),
    If(IfStmt<'a>),
    While(WhileStmt<'a>),
    Def(FunctionDef<'a>),
    Return(Option<Expression<'a>>),
    Import(Identifier<'a>),
    Assert(AssertStmt<'a>),
    Pass,
    Break,
    Continue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment<'a> {
    /// Anything on the left of `=`; only plain names are assignable.
    pub target: Expression<'a>,
    pub value: Expression<'a>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Branch<'a> {
    pub condition: Expression<'a>,
    pub body: Vec<Stmt<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStmt<'a> {
    /// The `if` branch followed by every `elif`.
    pub branches: Vec<Branch<'a>>,
    pub orelse: Option<Vec<Stmt<'a>>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileStmt<'a> {
    pub condition: Expression<'a>,
    pub body: Vec<Stmt<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param<'a> {
    pub name: Identifier<'a>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef<'a> {
    pub name: Identifier<'a>,
    pub params: Vec<Param<'a>>,
    pub body: Vec<Stmt<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssertStmt<'a> {
    pub test: Expression<'a>,
    pub message: Option<Expression<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expression<'a> {
    pub kind: ExprKind<'a>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind<'a> {
    Literal(Literal),
    Identifier(Identifier<'a>),
    Binary(Box<BinaryExpr<'a>>),
    Unary(Box<UnaryExpr<'a>>),
    Compare(Box<CompareExpr<'a>>),
    Logical(Box<LogicalExpr<'a>>),
    Call(Box<Call<'a>>),
    Attribute(Box<Attribute<'a>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpr<'a> {
    pub lhs: Expression<'a>,
    pub op: BinOp,
    pub rhs: Expression<'a>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnaryExpr<'a> {
    pub op: UnaryOp,
    pub operand: Expression<'a>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompareExpr<'a> {
    pub lhs: Expression<'a>,
    pub op: CompOp,
    pub rhs: Expression<'a>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogicalExpr<'a> {
    pub lhs: Expression<'a>,
    pub op: LogicalOp,
    pub rhs: Expression<'a>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call<'a> {
    pub callee: Expression<'a>,
    pub args: Vec<Expression<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute<'a> {
    pub value: Expression<'a>,
    pub name: Identifier<'a>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Str(String),
    Bool(bool),
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    FloorDiv,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}
