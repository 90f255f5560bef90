use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

use dyn_clone::DynClone;
use nbproc_parser::code_ast::{CodeParser, ParseError, PythonOutline};
use nbproc_parser::{Cell, Notebook};
use thiserror::Error;

use exec::SessionFactory;

pub mod exec;
pub mod filters;
pub mod frontmatter;
pub mod showdoc;

/// Directives that mark a cell's content for export to a module.
pub const EXPORT_DIRECTIVES: [&str; 2] = ["export", "exporti"];
/// Directives whose cells never appear in rendered documentation.
pub const HIDDEN_DIRECTIVES: [&str; 4] = ["export", "exporti", "hide", "default_exp"];
/// The doc-invocation function.
pub const SHOW_DOC: &str = "show_doc";

/// Error raised by an execution session. Kept boxed so the session's own error type survives.
pub type SessionError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("could not parse cell {index}")]
    Parse {
        index: usize,
        #[source]
        source: ParseError,
    },

    #[error("cell {index} raised an error during execution")]
    Execution {
        index: usize,
        #[source]
        source: SessionError,
    },

    #[error("could not prepare execution session")]
    Session(#[source] SessionError),

    #[error("execution session was aborted by an earlier failure")]
    Aborted,

    #[error("processor `{processor}` needs {capability}, which is not available")]
    MissingCapability {
        processor: &'static str,
        capability: &'static str,
    },

    #[error("processor `{earlier}` must run before `{later}`")]
    Ordering {
        earlier: &'static str,
        later: &'static str,
    },

    #[error("invalid filter pattern: {}", .0)]
    Pattern(#[from] regex::Error),

    #[error(transparent)]
    Any(#[from] anyhow::Error),
}

/// Rewrites markdown with links to documented symbols. Backed by an external symbol index.
pub trait SymbolLinker: Send + Sync {
    fn linkify(&self, markdown: &str) -> String;

    fn link_line(&self, line: &str) -> String {
        self.linkify(line)
    }
}

/// External capabilities available to processors when they are built.
#[derive(Clone)]
pub struct ProcessorContext {
    pub parser: Arc<dyn CodeParser>,
    pub sessions: Option<Arc<dyn SessionFactory>>,
    pub linker: Option<Arc<dyn SymbolLinker>>,
}

impl Default for ProcessorContext {
    fn default() -> Self {
        ProcessorContext {
            parser: Arc::new(PythonOutline),
            sessions: None,
            linker: None,
        }
    }
}

impl ProcessorContext {
    pub fn with_sessions(mut self, sessions: Arc<dyn SessionFactory>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn with_linker(mut self, linker: Arc<dyn SymbolLinker>) -> Self {
        self.linker = Some(linker);
        self
    }
}

/// Works on one cell at a time. Must leave cells it doesn't apply to untouched.
pub trait CellProcessor {
    fn name(&self) -> &'static str;
    fn process_cell(&mut self, index: usize, cell: &mut Cell) -> Result<(), Error>;
}

/// Works on the whole cell sequence, and may insert, remove or reorder cells.
pub trait NotebookProcessor {
    fn name(&self) -> &'static str;
    fn process(&mut self, nb: &mut Notebook) -> Result<(), Error>;
}

/// A built processor of either shape.
pub enum Pass {
    Cell(Box<dyn CellProcessor>),
    Notebook(Box<dyn NotebookProcessor>),
}

impl Pass {
    pub fn name(&self) -> &'static str {
        match self {
            Pass::Cell(p) => p.name(),
            Pass::Notebook(p) => p.name(),
        }
    }

    pub fn apply(&mut self, nb: &mut Notebook) -> Result<(), Error> {
        match self {
            Pass::Cell(p) => nb
                .cells
                .iter_mut()
                .enumerate()
                .try_for_each(|(i, cell)| p.process_cell(i, cell)),
            Pass::Notebook(p) => p.process(nb),
        }
    }
}

impl Display for Pass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Serializable description of a processor, tagged by `type` in configuration files.
#[typetag::serde(tag = "type")]
pub trait ProcessorConfig: Debug + Send + Sync + DynClone {
    fn build(&self, ctx: &ProcessorContext) -> Result<Pass, Error>;
}

dyn_clone::clone_trait_object!(ProcessorConfig);
