//! Cell directives: comment lines of the form `#| name[:] args...`.

use linked_hash_map::LinkedHashMap;
use pest::Parser;
use pest_derive::Parser;
use thiserror::Error;

/// The parser for a single directive line.
#[derive(Parser)]
#[grammar = "grammars/directives.pest"]
pub struct DirectiveParser;

#[derive(Error, Debug)]
pub enum DirectiveError {
    #[error("not a directive: {}", .0)]
    Syntax(#[from] Box<pest::error::Error<Rule>>),
}

/// Directive names mapped to the argument lists of every occurrence, in source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Directives(LinkedHashMap<String, Vec<Vec<String>>>);

impl Directives {
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn contains_any(&self, names: &[&str]) -> bool {
        names.iter().any(|n| self.contains(n))
    }

    /// Arguments of the first occurrence of `name`.
    pub fn first(&self, name: &str) -> Option<&[String]> {
        self.0.get(name).and_then(|v| v.first()).map(Vec::as_slice)
    }

    pub fn all(&self, name: &str) -> &[Vec<String>] {
        self.0.get(name).map_or(&[], Vec::as_slice)
    }

    /// `true` when the directive is present with a first argument of `false` (any case).
    pub fn is_false(&self, name: &str) -> bool {
        self.first(name)
            .and_then(|args| args.first())
            .map_or(false, |a| a.eq_ignore_ascii_case("false"))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    fn push(&mut self, name: String, args: Vec<String>) {
        self.0.entry(name).or_insert_with(Vec::new).push(args);
    }
}

/// Parses one line as a directive, returning its name and arguments.
pub fn parse_directive_line(line: &str) -> Result<(String, Vec<String>), DirectiveError> {
    let pairs = DirectiveParser::parse(Rule::directive, line).map_err(Box::new)?;

    let mut name = String::new();
    let mut args = Vec::new();
    for pair in pairs.flat_map(|directive| directive.into_inner()) {
        match pair.as_rule() {
            Rule::name => name = pair.as_str().to_string(),
            Rule::args => args = pair.into_inner().map(|a| a.as_str().to_string()).collect(),
            Rule::EOI => {}
            _ => unreachable!(),
        }
    }

    Ok((name, args))
}

/// Collects every line-leading directive in `source`. Lines that don't parse are ordinary code.
pub fn parse_directives(source: &str) -> Directives {
    let mut directives = Directives::default();
    for line in source.lines() {
        if !line.trim_start().starts_with("#|") {
            continue;
        }
        match parse_directive_line(line) {
            Ok((name, args)) => directives.push(name, args),
            Err(e) => tracing::trace!("skipping directive-like line {:?}: {}", line, e),
        }
    }
    directives
}
