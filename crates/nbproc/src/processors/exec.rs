//! Executes the cells documentation depends on: definitions, imports and `show_doc` calls.

use std::sync::Arc;
use std::time::Duration;

use nbproc_parser::code_ast::{CodeParser, Stmt};
use nbproc_parser::Cell;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::processors::{
    CellProcessor, Error, Pass, ProcessorConfig, ProcessorContext, SessionError,
    EXPORT_DIRECTIVES, SHOW_DOC,
};

/// A live interpreter that keeps its state across the cells it runs.
pub trait ExecutionSession {
    /// Runs code that isn't part of the notebook.
    fn run_source(&mut self, source: &str) -> Result<(), SessionError>;

    /// Runs a cell and replaces its outputs with the captured ones.
    fn run_cell(&mut self, cell: &mut Cell) -> Result<(), SessionError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// How long a single cell may run. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

/// Creates a fresh, isolated session for each notebook.
pub trait SessionFactory: Send + Sync {
    fn create(&self, options: &SessionOptions) -> Result<Box<dyn ExecutionSession>, SessionError>;
}

fn default_preamble() -> String {
    "from nbprocess.showdoc import show_doc".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecShowDocsConfig {
    /// Run in every new session before any cell, so that `show_doc` calls resolve.
    #[serde(default = "default_preamble")]
    pub preamble: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for ExecShowDocsConfig {
    fn default() -> Self {
        ExecShowDocsConfig {
            preamble: default_preamble(),
            timeout_secs: None,
        }
    }
}

#[typetag::serde(name = "exec_show_docs")]
impl ProcessorConfig for ExecShowDocsConfig {
    fn build(&self, ctx: &ProcessorContext) -> Result<Pass, Error> {
        let factory = ctx.sessions.as_ref().ok_or(Error::MissingCapability {
            processor: "exec_show_docs",
            capability: "an execution session",
        })?;
        let options = SessionOptions {
            timeout: self.timeout_secs.map(Duration::from_secs),
        };
        let session = factory.create(&options).map_err(Error::Session)?;
        let exec = ExecShowDocs::new(session, ctx.parser.clone(), &self.preamble)?;
        Ok(Pass::Cell(Box::new(exec)))
    }
}

/// Runs the cells needed for `show_doc` output in one shared session. The first failure aborts
/// the pass: the error is returned and the session is never used again.
pub struct ExecShowDocs {
    session: Box<dyn ExecutionSession>,
    parser: Arc<dyn CodeParser>,
    failed: bool,
}

impl ExecShowDocs {
    pub fn new(
        mut session: Box<dyn ExecutionSession>,
        parser: Arc<dyn CodeParser>,
        preamble: &str,
    ) -> Result<Self, Error> {
        session.run_source(preamble).map_err(Error::Session)?;
        Ok(ExecShowDocs {
            session,
            parser,
            failed: false,
        })
    }
}

/// Decides whether a cell has to run for its notebook's documentation to render.
pub fn needs_execution(index: usize, cell: &Cell, parser: &dyn CodeParser) -> Result<bool, Error> {
    let source = match (cell.is_code(), cell.source()) {
        (true, Some(src)) => src,
        _ => return Ok(false),
    };

    let directives = cell.directives();
    if directives.is_false("eval") {
        return Ok(false);
    }

    let stmts = parser
        .parse(source)
        .map_err(|source| Error::Parse { index, source })?;
    if stmts.is_empty() {
        return Ok(false);
    }

    Ok(directives.contains_any(&EXPORT_DIRECTIVES)
        || stmts.iter().any(Stmt::is_import)
        || stmts
            .iter()
            .filter_map(Stmt::as_call)
            .any(|c| c.calls(SHOW_DOC)))
}

impl CellProcessor for ExecShowDocs {
    fn name(&self) -> &'static str {
        "exec_show_docs"
    }

    fn process_cell(&mut self, index: usize, cell: &mut Cell) -> Result<(), Error> {
        if self.failed {
            return Err(Error::Aborted);
        }
        if !needs_execution(index, cell, self.parser.as_ref())? {
            return Ok(());
        }

        debug!("executing cell {}", index);
        self.session.run_cell(cell).map_err(|source| {
            self.failed = true;
            Error::Execution { index, source }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbproc_parser::code_ast::PythonOutline;
    use nbproc_parser::{Notebook, Output};
    use std::error::Error as StdError;
    use std::fmt::{Display, Formatter};
    use std::sync::Mutex;

    #[derive(Debug)]
    pub struct Raised(pub String);

    impl Display for Raised {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            write!(f, "raised {}", self.0)
        }
    }

    impl StdError for Raised {}

    /// Records what it runs, fails on sources containing `raise`, and prints "ran" for cells.
    #[derive(Clone, Default)]
    pub struct Recorder {
        pub ran: Arc<Mutex<Vec<String>>>,
    }

    impl ExecutionSession for Recorder {
        fn run_source(&mut self, source: &str) -> Result<(), SessionError> {
            self.ran.lock().unwrap().push(source.to_string());
            Ok(())
        }

        fn run_cell(&mut self, cell: &mut Cell) -> Result<(), SessionError> {
            let source = cell.source().unwrap_or_default().to_string();
            self.ran.lock().unwrap().push(source.clone());
            if source.contains("raise") {
                return Err(Box::new(Raised(source)));
            }
            if let Some(outputs) = cell.outputs_mut() {
                *outputs = vec![Output::stream("stdout", "ran\n")];
            }
            Ok(())
        }
    }

    impl SessionFactory for Recorder {
        fn create(&self, _options: &SessionOptions) -> Result<Box<dyn ExecutionSession>, SessionError> {
            Ok(Box::new(self.clone()))
        }
    }

    fn run(cells: Vec<Cell>, recorder: &Recorder) -> Result<Notebook, Error> {
        let mut nb = Notebook::new(cells);
        let ctx = ProcessorContext::default().with_sessions(Arc::new(recorder.clone()));
        let mut pass = ExecShowDocsConfig::default().build(&ctx)?;
        pass.apply(&mut nb)?;
        Ok(nb)
    }

    #[test]
    fn test_preamble_runs_first() {
        let recorder = Recorder::default();
        run(vec![Cell::code("import os")], &recorder).unwrap();
        let ran = recorder.ran.lock().unwrap();
        assert_eq!(ran[0], default_preamble());
        assert_eq!(ran[1], "import os");
    }

    #[test]
    fn test_selects_cells() {
        let recorder = Recorder::default();
        let nb = run(
            vec![
                Cell::code("#| export\ndef f(): pass"),
                Cell::code("x = 1"),
                Cell::code("from a import b"),
                Cell::code("show_doc(f)"),
                Cell::code("#| eval: false\nimport os"),
                Cell::code("#| export\n"),
                Cell::markdown("import os"),
                Cell::code("%%bash\nimport"),
            ],
            &recorder,
        )
        .unwrap();

        let ran = recorder.ran.lock().unwrap();
        assert_eq!(
            ran[1..],
            ["#| export\ndef f(): pass", "from a import b", "show_doc(f)"]
        );
        assert_eq!(nb.cells[0].outputs()[0].text, Some(vec!["ran\n".to_string()]));
        assert!(nb.cells[1].outputs().is_empty());
    }

    #[test]
    fn test_eval_false_skips_unparseable() {
        let recorder = Recorder::default();
        run(vec![Cell::code("#| eval: false\nimport (")], &recorder).unwrap();
        assert_eq!(recorder.ran.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_parse_error_names_cell() {
        let recorder = Recorder::default();
        let err = run(vec![Cell::code("x = 1"), Cell::code("import (")], &recorder).unwrap_err();
        assert!(matches!(err, Error::Parse { index: 1, .. }));
    }

    #[test]
    fn test_failure_aborts() {
        let recorder = Recorder::default();
        let err = run(
            vec![
                Cell::code("import os"),
                Cell::code("import raise_me"),
                Cell::code("import sys"),
            ],
            &recorder,
        )
        .unwrap_err();

        match &err {
            Error::Execution { index, .. } => assert_eq!(*index, 1),
            other => panic!("unexpected error {:?}", other),
        }
        let cause = err.source().unwrap().downcast_ref::<Raised>().unwrap();
        assert_eq!(cause.0, "import raise_me");
        assert!(!recorder.ran.lock().unwrap().contains(&"import sys".to_string()));
    }

    #[test]
    fn test_no_reuse_after_failure() {
        let mut exec = ExecShowDocs::new(
            Box::new(Recorder::default()),
            Arc::new(PythonOutline),
            "",
        )
        .unwrap();
        assert!(exec.process_cell(0, &mut Cell::code("import raise_it")).is_err());
        assert!(matches!(
            exec.process_cell(1, &mut Cell::code("import os")),
            Err(Error::Aborted)
        ));
    }

    #[test]
    fn test_needs_session_factory() {
        assert!(matches!(
            ExecShowDocsConfig::default().build(&ProcessorContext::default()),
            Err(Error::MissingCapability { .. })
        ));
    }
}
