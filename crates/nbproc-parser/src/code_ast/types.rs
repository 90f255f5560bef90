//! Top-level statement outline of a code cell.

use std::fmt::{Display, Formatter};

/// The kinds of definition the documentation passes care about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DefKind {
    Function,
    AsyncFunction,
    Class,
}

/// An expression, reduced to what call-target matching needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    Name(String),
    Attribute { value: Box<Expr>, attr: String },
    Other(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Call {
    pub func: Expr,
    pub args: Vec<Expr>,
}

/// A top-level statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Stmt {
    /// `import a` or `from a import b`.
    Import { module: String },
    Def { kind: DefKind, name: String },
    /// An expression statement consisting of a single call.
    Call(Call),
    Other,
}

impl Expr {
    /// Parses a dotted name such as `a.b.c`. Anything else is kept verbatim as [Expr::Other].
    pub fn parse(src: &str) -> Expr {
        let src = src.trim();
        let is_ident = |s: &str| {
            let mut chars = s.chars();
            matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
                && chars.all(|c| c.is_alphanumeric() || c == '_')
        };

        let parts: Vec<&str> = src.split('.').map(str::trim).collect();
        if !parts.iter().all(|p| is_ident(p)) {
            return Expr::Other(src.to_string());
        }

        let mut parts = parts.into_iter();
        let first = Expr::Name(parts.next().unwrap_or_default().to_string());
        parts.fold(first, |value, attr| Expr::Attribute {
            value: Box::new(value),
            attr: attr.to_string(),
        })
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Expr::Name(n) => Some(n),
            _ => None,
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Name(n) => write!(f, "{}", n),
            Expr::Attribute { value, attr } => write!(f, "{}.{}", value, attr),
            Expr::Other(s) => write!(f, "{}", s),
        }
    }
}

impl Call {
    /// `true` if this calls the plain function `name` (not an attribute of something else).
    pub fn calls(&self, name: &str) -> bool {
        self.func.as_name() == Some(name)
    }
}

impl Stmt {
    pub fn def_name(&self) -> Option<&str> {
        match self {
            Stmt::Def { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn is_import(&self) -> bool {
        matches!(self, Stmt::Import { .. })
    }

    pub fn as_call(&self) -> Option<&Call> {
        match self {
            Stmt::Call(c) => Some(c),
            _ => None,
        }
    }
}
