pub mod types;

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

pub use types::{Call, DefKind, Expr, Stmt};

/// Turns a code cell's source into its top-level statements.
///
/// The documentation passes only look at the top level of a cell, so an implementation is free
/// to skip everything nested inside blocks.
pub trait CodeParser: Send + Sync {
    fn parse(&self, source: &str) -> Result<Vec<Stmt>, ParseError>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("syntax error on line {line}: {kind}")]
pub struct ParseError {
    pub line: usize,
    pub kind: ParseErrorKind,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    #[error("'{}' was never closed", .0)]
    UnclosedBracket(char),
    #[error("unmatched '{}'", .0)]
    UnmatchedBracket(char),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unexpected indent")]
    UnexpectedIndent,
}

/// Outlines Python sources without a full grammar: it splits the source into logical lines
/// (brackets, strings and backslash continuations join physical lines) and classifies the
/// unindented ones.
#[derive(Debug, Default, Clone, Copy)]
pub struct PythonOutline;

impl CodeParser for PythonOutline {
    fn parse(&self, source: &str) -> Result<Vec<Stmt>, ParseError> {
        outline_source(source)
    }
}

lazy_static! {
    static ref IMPORT: Regex =
        Regex::new(r"^(?:import\s+([\w.]+)|from\s+(\.*[\w.]*)\s+import\b)").unwrap();
    static ref DEF: Regex = Regex::new(r"^(async\s+)?def\s+([A-Za-z_]\w*)\s*\(").unwrap();
    static ref CLASS: Regex = Regex::new(r"^class\s+([A-Za-z_]\w*)\s*[(:]").unwrap();
    static ref CALL: Regex =
        Regex::new(r"^([A-Za-z_]\w*(?:\s*\.\s*[A-Za-z_]\w*)*)\s*\((.*)\)$").unwrap();
}

pub fn outline_source(source: &str) -> Result<Vec<Stmt>, ParseError> {
    if matches!(source.trim_start().chars().next(), Some('%') | Some('!')) {
        return Ok(vec![]);
    }

    let mut stmts = Vec::new();
    let mut in_block = false;
    for line in logical_lines(source)? {
        if line.indent > 0 {
            if !in_block {
                return Err(ParseError {
                    line: line.line,
                    kind: ParseErrorKind::UnexpectedIndent,
                });
            }
            continue;
        }

        in_block = line.text.ends_with(':');
        if let Some(stmt) = classify(&line.text) {
            stmts.push(stmt);
        }
    }

    Ok(stmts)
}

fn classify(text: &str) -> Option<Stmt> {
    if text.starts_with('@') {
        return None;
    }
    if text.starts_with('%') || text.starts_with('!') {
        return Some(Stmt::Other);
    }

    if let Some(caps) = IMPORT.captures(text) {
        let module = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
        return Some(Stmt::Import {
            module: module.to_string(),
        });
    }

    if let Some(caps) = DEF.captures(text) {
        let kind = if caps.get(1).is_some() {
            DefKind::AsyncFunction
        } else {
            DefKind::Function
        };
        return Some(Stmt::Def {
            kind,
            name: caps[2].to_string(),
        });
    }

    if let Some(caps) = CLASS.captures(text) {
        return Some(Stmt::Def {
            kind: DefKind::Class,
            name: caps[1].to_string(),
        });
    }

    if let Some(caps) = CALL.captures(text) {
        if let Some(args) = split_args(&caps[2]) {
            return Some(Stmt::Call(Call {
                func: Expr::parse(&caps[1]),
                args: args.into_iter().map(Expr::parse).collect(),
            }));
        }
    }

    Some(Stmt::Other)
}

/// Splits call arguments on top-level commas. `None` if the parentheses don't belong to a
/// single call, as in `f(a)(b)`.
fn split_args(args: &str) -> Option<Vec<&str>> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in args.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '"' | '\'' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            ',' if depth == 0 => {
                out.push(&args[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    let last = args[start..].trim();
    if !last.is_empty() {
        out.push(&args[start..]);
    }
    Some(out.into_iter().map(str::trim).collect())
}

#[derive(Debug, PartialEq)]
struct LogicalLine {
    line: usize,
    indent: usize,
    text: String,
}

struct Quote {
    ch: char,
    triple: bool,
    line: usize,
}

#[derive(Default)]
struct LineBuffer {
    text: String,
    start: Option<usize>,
    indent: Option<usize>,
    lines: Vec<LogicalLine>,
}

impl LineBuffer {
    fn push(&mut self, c: char, line: usize) {
        if self.start.is_none() && !c.is_whitespace() {
            self.start = Some(line);
        }
        self.text.push(c);
    }

    /// Ends the current logical line and returns its indentation.
    fn finish(&mut self) -> usize {
        let indent = self.indent.take().unwrap_or_else(|| {
            self.text
                .chars()
                .take_while(|c| *c == ' ' || *c == '\t')
                .count()
        });
        let text = self.text.trim();
        if let (false, Some(line)) = (text.is_empty(), self.start) {
            self.lines.push(LogicalLine {
                line,
                indent,
                text: text.to_string(),
            });
        }
        self.text.clear();
        self.start = None;
        indent
    }
}

fn logical_lines(source: &str) -> Result<Vec<LogicalLine>, ParseError> {
    let chars: Vec<char> = source.chars().collect();
    let mut buf = LineBuffer::default();
    let mut brackets: Vec<(char, usize)> = Vec::new();
    let mut quote: Option<Quote> = None;
    let mut line = 1;
    let mut i = 0;

    let is_triple = |i: usize, q: char| chars.get(i + 1) == Some(&q) && chars.get(i + 2) == Some(&q);

    while i < chars.len() {
        let c = chars[i];

        if let Some(q) = &quote {
            if c == '\\' {
                buf.push(c, line);
                if let Some(&next) = chars.get(i + 1) {
                    if next == '\n' {
                        line += 1;
                    }
                    buf.push(next, line);
                }
                i += 2;
                continue;
            }
            if c == q.ch && (!q.triple || is_triple(i, c)) {
                let width = if q.triple { 3 } else { 1 };
                (0..width).for_each(|_| buf.push(c, line));
                quote = None;
                i += width;
                continue;
            }
            if c == '\n' {
                if !q.triple {
                    return Err(ParseError {
                        line: q.line,
                        kind: ParseErrorKind::UnterminatedString,
                    });
                }
                line += 1;
            }
            buf.push(c, line);
            i += 1;
            continue;
        }

        match c {
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            '"' | '\'' => {
                let triple = is_triple(i, c);
                let width = if triple { 3 } else { 1 };
                (0..width).for_each(|_| buf.push(c, line));
                quote = Some(Quote { ch: c, triple, line });
                i += width;
                continue;
            }
            '(' | '[' | '{' => {
                brackets.push((c, line));
                buf.push(c, line);
            }
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match brackets.pop() {
                    Some((open, _)) if open == expected => buf.push(c, line),
                    _ => {
                        return Err(ParseError {
                            line,
                            kind: ParseErrorKind::UnmatchedBracket(c),
                        })
                    }
                }
            }
            '\\' if chars.get(i + 1) == Some(&'\n') => {
                buf.push(' ', line);
                line += 1;
                i += 2;
                continue;
            }
            ';' if brackets.is_empty() => {
                let indent = buf.finish();
                buf.indent = Some(indent);
            }
            '\n' => {
                if brackets.is_empty() {
                    buf.finish();
                } else {
                    buf.push(' ', line);
                }
                line += 1;
            }
            _ => buf.push(c, line),
        }
        i += 1;
    }

    if let Some(q) = quote {
        return Err(ParseError {
            line: q.line,
            kind: ParseErrorKind::UnterminatedString,
        });
    }
    if let Some((open, line)) = brackets.pop() {
        return Err(ParseError {
            line,
            kind: ParseErrorKind::UnclosedBracket(open),
        });
    }

    buf.finish();
    Ok(buf.lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use paste::paste;

    fn def(kind: DefKind, name: &str) -> Stmt {
        Stmt::Def {
            kind,
            name: name.to_string(),
        }
    }

    fn call(func: &str, args: &[&str]) -> Stmt {
        Stmt::Call(Call {
            func: Expr::parse(func),
            args: args.iter().map(|a| Expr::parse(a)).collect(),
        })
    }

    macro_rules! outline_tests {
        ($($name:ident: $src:expr => $expected:expr,)*) => {
            $(
                paste! {
                    #[test]
                    fn [<outline_ $name>]() {
                        let expected: Vec<Stmt> = $expected;
                        assert_eq!(outline_source($src).unwrap(), expected);
                    }
                }
            )*
        };
    }

    outline_tests! {
        empty: "" => vec![],
        magic_cell: "%%time\nimport os" => vec![],
        imports: "import os.path\nfrom . import x\nfrom a.b import (c,\n  d)" => vec![
            Stmt::Import { module: "os.path".into() },
            Stmt::Import { module: ".".into() },
            Stmt::Import { module: "a.b".into() },
        ],
        defs: "def f(x):\n    def inner(): pass\n    return x\n\nasync def g():\n    pass\nclass A(B):\n    def m(self): ...\nclass C: pass" => vec![
            def(DefKind::Function, "f"),
            def(DefKind::AsyncFunction, "g"),
            def(DefKind::Class, "A"),
            def(DefKind::Class, "C"),
        ],
        decorated: "@patch\ndef _h(self):\n    pass" => vec![def(DefKind::Function, "_h")],
        calls: "show_doc(f)\nshow_doc(mod.g, title_level=3)\nx = show_doc(h)" => vec![
            call("show_doc", &["f"]),
            call("show_doc", &["mod.g", "title_level=3"]),
            Stmt::Other,
        ],
        chained_call_is_not_a_call: "f(a)(b)" => vec![Stmt::Other],
        strings_and_comments: "s = '''\ndef not_a_def():\n'''  # def nope()\nprint(\"a, (b\")" => vec![
            Stmt::Other,
            call("print", &["\"a, (b\""]),
        ],
        semicolons: "import os; show_doc(os)" => vec![
            Stmt::Import { module: "os".into() },
            call("show_doc", &["os"]),
        ],
        continuation: "x = 1 + \\\n    2\ndef f(): pass" => vec![Stmt::Other, def(DefKind::Function, "f")],
        directives_are_comments: "#| export\ndef f(): pass" => vec![def(DefKind::Function, "f")],
    }

    #[test]
    fn test_unclosed_bracket() {
        let err = outline_source("x = 1\nf(a,\n  b").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.kind, ParseErrorKind::UnclosedBracket('('));
    }

    #[test]
    fn test_unmatched_bracket() {
        let err = outline_source("x = [1, 2)").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnmatchedBracket(')'));
    }

    #[test]
    fn test_unterminated_string() {
        let err = outline_source("a = 1\ns = 'abc\nb = 2").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.kind, ParseErrorKind::UnterminatedString);

        let err = outline_source("s = \"\"\"abc").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnterminatedString);
    }

    #[test]
    fn test_unexpected_indent() {
        let err = outline_source("x = 1\n    y = 2").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.kind, ParseErrorKind::UnexpectedIndent);
    }

    #[test]
    fn test_expr_parse() {
        assert_eq!(Expr::parse("a"), Expr::Name("a".into()));
        assert_eq!(Expr::parse("a.b").to_string(), "a.b");
        assert!(matches!(Expr::parse("a.b"), Expr::Attribute { .. }));
        assert_eq!(Expr::parse("f(x)"), Expr::Other("f(x)".into()));
    }
}
