//! Generated documentation cells: one `show_doc(name)` call after each exported definition.

use std::collections::HashSet;
use std::sync::Arc;

use lazy_static::lazy_static;
use nbproc_parser::code_ast::{CodeParser, Expr, Stmt};
use nbproc_parser::{Cell, Notebook};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::processors::{
    CellProcessor, Error, NotebookProcessor, Pass, ProcessorConfig, ProcessorContext,
    EXPORT_DIRECTIVES, SHOW_DOC,
};

lazy_static! {
    static ref SHOW_DOC_LINE: Regex = Regex::new(r"(?m)^show_doc").unwrap();
}

/// Cells to insert right after the cell at `anchor`, in order.
pub type Insertion = (usize, Vec<Cell>);

fn documented_name(arg: &Expr) -> Option<String> {
    match arg {
        Expr::Name(name) => Some(name.clone()),
        Expr::Attribute { value, attr } => value.as_name().map(|m| format!("{}.{}", m, attr)),
        Expr::Other(_) => None,
    }
}

fn parse_code(
    index: usize,
    cell: &Cell,
    parser: &dyn CodeParser,
) -> Result<Option<Vec<Stmt>>, Error> {
    match (cell.is_code(), cell.source()) {
        (true, Some(src)) => parser
            .parse(src)
            .map(Some)
            .map_err(|source| Error::Parse { index, source }),
        _ => Ok(None),
    }
}

/// Names already passed to a top-level `show_doc` call somewhere in the notebook. Attribute
/// arguments are recorded as `module.name`.
pub fn documented_names(nb: &Notebook, parser: &dyn CodeParser) -> Result<HashSet<String>, Error> {
    let mut names = HashSet::new();
    for (index, cell) in nb.cells.iter().enumerate() {
        let Some(stmts) = parse_code(index, cell, parser)? else {
            continue;
        };
        names.extend(
            stmts
                .iter()
                .filter_map(Stmt::as_call)
                .filter(|call| call.calls(SHOW_DOC))
                .filter_map(|call| call.args.first())
                .filter_map(documented_name),
        );
    }
    Ok(names)
}

/// Works out which `show_doc` cells are missing. Each public definition in an `export` or
/// `exporti` cell that no existing call documents gets one cell, anchored on its export cell.
/// Anchors are ascending.
pub fn plan_show_docs(nb: &Notebook, parser: &dyn CodeParser) -> Result<Vec<Insertion>, Error> {
    let documented = documented_names(nb, parser)?;
    let mut plan = Vec::new();

    for (index, cell) in nb.cells.iter().enumerate() {
        if !cell.directives().contains_any(&EXPORT_DIRECTIVES) {
            continue;
        }
        let Some(stmts) = parse_code(index, cell, parser)? else {
            continue;
        };

        let cells: Vec<Cell> = stmts
            .iter()
            .filter_map(Stmt::def_name)
            .filter(|name| !name.starts_with('_'))
            .filter(|name| !documented.contains(*name))
            .map(|name| Cell::code(format!("{}({})", SHOW_DOC, name)))
            .collect();

        if !cells.is_empty() {
            plan.push((index, cells));
        }
    }

    Ok(plan)
}

/// Applies insertions from the highest anchor to the lowest, so earlier anchors stay valid.
pub fn apply_insertions(nb: &mut Notebook, mut plan: Vec<Insertion>) -> usize {
    plan.sort_by_key(|(anchor, _)| *anchor);
    let mut inserted = 0;
    for (anchor, cells) in plan.into_iter().rev() {
        let at = (anchor + 1).min(nb.cells.len());
        inserted += cells.len();
        nb.cells.splice(at..at, cells);
    }
    inserted
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddShowDocsConfig {}

#[typetag::serde(name = "add_show_docs")]
impl ProcessorConfig for AddShowDocsConfig {
    fn build(&self, ctx: &ProcessorContext) -> Result<Pass, Error> {
        Ok(Pass::Notebook(Box::new(AddShowDocs {
            parser: ctx.parser.clone(),
        })))
    }
}

pub struct AddShowDocs {
    parser: Arc<dyn CodeParser>,
}

impl NotebookProcessor for AddShowDocs {
    fn name(&self) -> &'static str {
        "add_show_docs"
    }

    fn process(&mut self, nb: &mut Notebook) -> Result<(), Error> {
        let plan = plan_show_docs(nb, self.parser.as_ref())?;
        if plan.is_empty() {
            debug!("no show_doc cells missing");
            return Ok(());
        }
        let inserted = apply_insertions(nb, plan);
        info!("inserted {} show_doc cells", inserted);
        Ok(())
    }
}

/// Hides the `show_doc` call itself, leaving only its output in the rendered page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanShowDoc {}

#[typetag::serde(name = "clean_show_doc")]
impl ProcessorConfig for CleanShowDoc {
    fn build(&self, _ctx: &ProcessorContext) -> Result<Pass, Error> {
        Ok(Pass::Cell(Box::new(self.clone())))
    }
}

impl CellProcessor for CleanShowDoc {
    fn name(&self) -> &'static str {
        "clean_show_doc"
    }

    fn process_cell(&mut self, _index: usize, cell: &mut Cell) -> Result<(), Error> {
        let source = match (cell.is_code(), cell.source()) {
            (true, Some(src)) if SHOW_DOC_LINE.is_match(src) => src,
            _ => return Ok(()),
        };
        if cell.directives().contains("echo") {
            return Ok(());
        }
        let cleaned = format!("#| echo: false\n{}", source);
        cell.set_source(cleaned);
        Ok(())
    }
}
