//! All lexical categories recognised by the lexer.

use miette::SourceSpan;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    pub offset: usize, // byte offset into the source
    pub len: usize,    // byte length of the lexeme
    pub line: usize,   // 1-based
    pub column: usize, // 1-based (UTF-8 byte offset is also fine)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind<'a> {
    Identifier(&'a str),
    Int(i64),
    Str(String),

    Def,      // def
    Return,   // return
    If,       // if
    Elif,     // elif
    Else,     // else
    While,    // while
    Break,    // break
    Continue, // continue
    Pass,     // pass
    Import,   // import
    Assert,   // assert
    And,      // and
    Or,       // or
    Not,      // not
    True,     // True
    False,    // False
    None,     // None

    Comma,  // ,
    Colon,  // :
    Dot,    // .
    LParen, // (
    RParen, // )

    Assign,      // =
    Plus,        // +
    Minus,       // -
    Star,        // *
    DoubleSlash, // //
    Percent,     // %

    EqEq,  // ==
    NotEq, // !=
    Lt,    // <
    Le,    // <=
    Gt,    // >
    Ge,    // >=

    Newline,
    Indent,
    Dedent,
    Eof,
}

impl<'a> TokenKind<'a> {
    pub fn keyword(word: &str) -> Option<TokenKind<'a>> {
        Some(match word {
            "def" => TokenKind::Def,
            "return" => TokenKind::Return,
            "if" => TokenKind::If,
            "elif" => TokenKind::Elif,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "pass" => TokenKind::Pass,
            "import" => TokenKind::Import,
            "assert" => TokenKind::Assert,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "True" => TokenKind::True,
            "False" => TokenKind::False,
            "None" => TokenKind::None,
            _ => return None,
        })
    }

    /// Human readable description used in parser diagnostics.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Identifier(name) => format!("identifier `{name}`"),
            TokenKind::Int(i) => format!("integer `{i}`"),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Newline => "end of line".to_string(),
            TokenKind::Indent => "indent".to_string(),
            TokenKind::Dedent => "dedent".to_string(),
            TokenKind::Eof => "end of file".to_string(),
            other => format!("`{}`", other.lexeme()),
        }
    }

    fn lexeme(&self) -> &'static str {
        match self {
            TokenKind::Def => "def",
            TokenKind::Return => "return",
            TokenKind::If => "if",
            TokenKind::Elif => "elif",
            TokenKind::Else => "else",
            TokenKind::While => "while",
            TokenKind::Break => "break",
            TokenKind::Continue => "continue",
            TokenKind::Pass => "pass",
            TokenKind::Import => "import",
            TokenKind::Assert => "assert",
            TokenKind::And => "and",
            TokenKind::Or => "or",
            TokenKind::Not => "not",
            TokenKind::True => "True",
            TokenKind::False => "False",
            TokenKind::None => "None",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Dot => ".",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::Assign => "=",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::DoubleSlash => "//",
            TokenKind::Percent => "%",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::Le => "<=",
            TokenKind::Gt => ">",
            TokenKind::Ge => ">=",
            _ => "",
        }
    }
}

impl<'a> Token<'a> {
    pub fn new(kind: TokenKind<'a>, offset: usize, len: usize, line: usize, column: usize) -> Self {
        Self {
            kind,
            offset,
            len,
            line,
            column,
        }
    }

    pub fn span(&self) -> SourceSpan {
        SourceSpan::from((self.offset, self.len))
    }
}
