//! Front matter inferred from the notebook's title cell and its `default_exp` directive.

use nbproc_parser::frontmatter::{
    extract_fields, has_title, is_frontmatter_block, FrontMatter, DEFAULT_FM_KEYS,
};
use nbproc_parser::{Cell, CellType, Notebook};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::processors::{Error, NotebookProcessor, Pass, ProcessorConfig, ProcessorContext};

/// `true` if a raw cell already holds a `---` front matter block.
pub fn is_frontmatter(nb: &Notebook) -> bool {
    nb.cells_of(CellType::Raw)
        .filter_map(|(_, c)| c.source())
        .any(is_frontmatter_block)
}

/// Module named by the first `default_exp` directive.
pub fn default_exp(nb: &Notebook) -> Option<String> {
    nb.cells_of(CellType::Code).find_map(|(_, c)| {
        c.directives()
            .first("default_exp")
            .and_then(|args| args.first())
            .cloned()
    })
}

/// Fields of the first markdown cell that has a title heading. With `remove`, that cell's source
/// is deleted once read. Empty if no cell has a title.
pub fn nb_fmdict(nb: &mut Notebook, remove: bool) -> FrontMatter {
    let found = nb
        .cells_of(CellType::Markdown)
        .find(|(_, c)| c.source().map_or(false, has_title))
        .map(|(i, _)| i);

    let Some(index) = found else {
        return FrontMatter::default();
    };
    let cell = &mut nb.cells[index];
    let fm = cell.source().and_then(extract_fields).unwrap_or_default();
    if remove {
        cell.delete_source();
    }
    fm
}

/// Inserts a raw cell at the top holding the entries of `fm` named in `keys`. Returns whether a
/// cell was inserted.
pub fn insert_frontmatter<S: AsRef<str>>(nb: &mut Notebook, fm: &FrontMatter, keys: &[S]) -> bool {
    match fm.render(keys) {
        Some(block) => {
            nb.cells.insert(0, Cell::raw(block));
            true
        }
        None => false,
    }
}

fn default_keys() -> Vec<String> {
    DEFAULT_FM_KEYS.iter().map(|k| k.to_string()).collect()
}

const fn default_remove() -> bool {
    true
}

/// Synthesizes front matter unless the notebook already has some. Only a notebook with a title
/// gets a block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferFrontmatter {
    /// Keys written to the block, in order.
    #[serde(default = "default_keys")]
    pub keys: Vec<String>,
    #[serde(default = "default_remove")]
    pub remove_title_cell: bool,
}

impl Default for InferFrontmatter {
    fn default() -> Self {
        InferFrontmatter {
            keys: default_keys(),
            remove_title_cell: default_remove(),
        }
    }
}

#[typetag::serde(name = "infer_frontmatter")]
impl ProcessorConfig for InferFrontmatter {
    fn build(&self, _ctx: &ProcessorContext) -> Result<Pass, Error> {
        Ok(Pass::Notebook(Box::new(self.clone())))
    }
}

impl InferFrontmatter {
    /// The front matter this processor would produce, without touching `nb`.
    pub fn infer(&self, nb: &Notebook) -> Option<String> {
        if is_frontmatter(nb) {
            return None;
        }
        let mut scratch = nb.clone();
        let fm = self.fields(&mut scratch, false);
        fm.contains_key("title").then(|| fm.render(&self.keys)).flatten()
    }

    fn fields(&self, nb: &mut Notebook, remove: bool) -> FrontMatter {
        let module = default_exp(nb);
        let mut fm = nb_fmdict(nb, remove);
        if let Some(module) = module {
            if !fm.contains_key("output-file") {
                fm.insert("output-file", module);
            }
        }
        fm
    }
}

impl NotebookProcessor for InferFrontmatter {
    fn name(&self) -> &'static str {
        "infer_frontmatter"
    }

    fn process(&mut self, nb: &mut Notebook) -> Result<(), Error> {
        if is_frontmatter(nb) {
            debug!("front matter already present");
            return Ok(());
        }

        let titled = nb
            .cells_of(CellType::Markdown)
            .any(|(_, c)| c.source().map_or(false, has_title));
        if !titled {
            debug!("no title cell, skipping front matter");
            return Ok(());
        }

        let fm = self.fields(nb, self.remove_title_cell);
        if insert_frontmatter(nb, &fm, &self.keys) {
            info!("inserted front matter");
        }
        Ok(())
    }
}
