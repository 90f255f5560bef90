//! Notebook cell model and the text-level parsers used by the nbproc processors.

pub mod code_ast;
pub mod directives;
pub mod frontmatter;
pub mod notebook;

pub use directives::Directives;
pub use notebook::{Cell, CellType, Notebook, Output};
