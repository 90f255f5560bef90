//! Single-cell filters. Each one is its own configuration: building it just clones the settings.

use std::sync::Arc;

use lazy_static::lazy_static;
use nbproc_parser::notebook::WIDGET_VIEW_MIME;
use nbproc_parser::{Cell, CellType, Notebook};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::processors::{
    CellProcessor, Error, NotebookProcessor, Pass, ProcessorConfig, ProcessorContext,
    SymbolLinker, HIDDEN_DIRECTIVES,
};

lazy_static! {
    static ref ANSI_ESCAPE: Regex = Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").unwrap();
    static ref HIDE_LINE: Regex = Regex::new(r"#\|[ \t]*hide_line[ \t]*$").unwrap();
    static ref MAGIC_LINE: Regex = Regex::new(r"(?m)^[ \t]*%.*$").unwrap();
    static ref LANG_MAGIC: Regex = Regex::new(
        r"(?m)\A\s*%%[ \t]*(bash|html|javascript|js|latex|markdown|perl|ruby|sh|svg)[ \t]*$"
    )
    .unwrap();
}

pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}

/// Removes terminal escape codes from `stdout` stream output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StripAnsi {}

#[typetag::serde(name = "strip_ansi")]
impl ProcessorConfig for StripAnsi {
    fn build(&self, _ctx: &ProcessorContext) -> Result<Pass, Error> {
        Ok(Pass::Cell(Box::new(self.clone())))
    }
}

impl CellProcessor for StripAnsi {
    fn name(&self) -> &'static str {
        "strip_ansi"
    }

    fn process_cell(&mut self, _index: usize, cell: &mut Cell) -> Result<(), Error> {
        let Some(outputs) = cell.outputs_mut() else {
            return Ok(());
        };
        for output in outputs.iter_mut() {
            if output.name.as_deref() != Some("stdout") {
                continue;
            }
            if let Some(text) = output.text.as_mut() {
                text.iter_mut().for_each(|line| *line = strip_ansi(line));
            }
        }
        Ok(())
    }
}

/// Deletes the source of cells carrying the `hide` directive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Hide {}

#[typetag::serde(name = "hide")]
impl ProcessorConfig for Hide {
    fn build(&self, _ctx: &ProcessorContext) -> Result<Pass, Error> {
        Ok(Pass::Cell(Box::new(self.clone())))
    }
}

impl CellProcessor for Hide {
    fn name(&self) -> &'static str {
        "hide"
    }

    fn process_cell(&mut self, _index: usize, cell: &mut Cell) -> Result<(), Error> {
        if cell.directives().contains("hide") {
            cell.delete_source();
        }
        Ok(())
    }
}

/// Drops code lines that end in `#| hide_line`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HideLine {}

#[typetag::serde(name = "hide_line")]
impl ProcessorConfig for HideLine {
    fn build(&self, _ctx: &ProcessorContext) -> Result<Pass, Error> {
        Ok(Pass::Cell(Box::new(self.clone())))
    }
}

impl CellProcessor for HideLine {
    fn name(&self) -> &'static str {
        "hide_line"
    }

    fn process_cell(&mut self, _index: usize, cell: &mut Cell) -> Result<(), Error> {
        let source = match (cell.is_code(), cell.source()) {
            (true, Some(src)) if src.lines().any(|l| HIDE_LINE.is_match(l)) => src,
            _ => return Ok(()),
        };

        let kept = source
            .lines()
            .filter(|l| !HIDE_LINE.is_match(l))
            .collect::<Vec<_>>()
            .join("\n");
        cell.set_source(kept);
        Ok(())
    }
}

/// Removes stream output lines matching any of `words`, plus any words given to the cell's own
/// `filter_stream` directive. Words are regular expressions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterStream {
    #[serde(default)]
    pub words: Vec<String>,
}

impl FilterStream {
    fn pattern_for(&self, cell: &Cell) -> Result<Option<Regex>, Error> {
        let directives = cell.directives();
        let words: Vec<&str> = self
            .words
            .iter()
            .map(String::as_str)
            .chain(directives.all("filter_stream").iter().flatten().map(String::as_str))
            .collect();

        if words.is_empty() {
            return Ok(None);
        }
        Ok(Some(Regex::new(&words.join("|"))?))
    }
}

#[typetag::serde(name = "filter_stream")]
impl ProcessorConfig for FilterStream {
    fn build(&self, _ctx: &ProcessorContext) -> Result<Pass, Error> {
        if !self.words.is_empty() {
            Regex::new(&self.words.join("|"))?;
        }
        Ok(Pass::Cell(Box::new(self.clone())))
    }
}

impl CellProcessor for FilterStream {
    fn name(&self) -> &'static str {
        "filter_stream"
    }

    fn process_cell(&mut self, _index: usize, cell: &mut Cell) -> Result<(), Error> {
        if cell.outputs().iter().all(|o| !o.is_stream()) {
            return Ok(());
        }
        let Some(pattern) = self.pattern_for(cell)? else {
            return Ok(());
        };

        for output in cell.outputs_mut().into_iter().flatten() {
            if let (true, Some(text)) = (output.is_stream(), output.text.as_mut()) {
                text.retain(|line| !pattern.is_match(line));
            }
        }
        Ok(())
    }
}

/// Strips `%` and `%%` magic lines from code cells.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanMagics {}

#[typetag::serde(name = "clean_magics")]
impl ProcessorConfig for CleanMagics {
    fn build(&self, _ctx: &ProcessorContext) -> Result<Pass, Error> {
        Ok(Pass::Cell(Box::new(self.clone())))
    }
}

impl CellProcessor for CleanMagics {
    fn name(&self) -> &'static str {
        "clean_magics"
    }

    fn process_cell(&mut self, _index: usize, cell: &mut Cell) -> Result<(), Error> {
        let source = match (cell.is_code(), cell.source()) {
            (true, Some(src)) if MAGIC_LINE.is_match(src) => src,
            _ => return Ok(()),
        };

        let cleaned = MAGIC_LINE.replace_all(source, "").trim().to_string();
        cell.set_source(cleaned);
        Ok(())
    }
}

/// Tags code cells written in another language through a `%%<lang>` cell magic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LangIdentify {}

#[typetag::serde(name = "lang_identify")]
impl ProcessorConfig for LangIdentify {
    fn build(&self, _ctx: &ProcessorContext) -> Result<Pass, Error> {
        Ok(Pass::Cell(Box::new(self.clone())))
    }
}

impl CellProcessor for LangIdentify {
    fn name(&self) -> &'static str {
        "lang_identify"
    }

    fn process_cell(&mut self, _index: usize, cell: &mut Cell) -> Result<(), Error> {
        if !cell.is_code() {
            return Ok(());
        }
        let lang = match cell.source().and_then(|s| LANG_MAGIC.captures(s)) {
            Some(caps) => match &caps[1] {
                "js" => "javascript".to_string(),
                other => other.to_string(),
            },
            None => return Ok(()),
        };

        cell.metadata_mut().language = Some(lang);
        Ok(())
    }
}

/// Deletes markdown headings written as `# Heading -`. They structure the source notebook but
/// shouldn't show up on the page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RmHeaderDash {}

#[typetag::serde(name = "rm_header_dash")]
impl ProcessorConfig for RmHeaderDash {
    fn build(&self, _ctx: &ProcessorContext) -> Result<Pass, Error> {
        Ok(Pass::Cell(Box::new(self.clone())))
    }
}

impl CellProcessor for RmHeaderDash {
    fn name(&self) -> &'static str {
        "rm_header_dash"
    }

    fn process_cell(&mut self, _index: usize, cell: &mut Cell) -> Result<(), Error> {
        let dashed = match (cell.cell_type(), cell.source()) {
            (CellType::Markdown, Some(src)) => {
                let src = src.trim();
                src.starts_with('#') && src.ends_with(" -")
            }
            _ => false,
        };
        if dashed {
            cell.delete_source();
        }
        Ok(())
    }
}

/// Deletes the source of exported and hidden cells.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RmExport {}

#[typetag::serde(name = "rm_export")]
impl ProcessorConfig for RmExport {
    fn build(&self, _ctx: &ProcessorContext) -> Result<Pass, Error> {
        Ok(Pass::Cell(Box::new(self.clone())))
    }
}

impl CellProcessor for RmExport {
    fn name(&self) -> &'static str {
        "rm_export"
    }

    fn process_cell(&mut self, _index: usize, cell: &mut Cell) -> Result<(), Error> {
        if cell.directives().contains_any(&HIDDEN_DIRECTIVES) {
            cell.delete_source();
        }
        Ok(())
    }
}

/// Drops interactive widget views from code cell outputs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoveWidgetState {}

#[typetag::serde(name = "remove_widget_state")]
impl ProcessorConfig for RemoveWidgetState {
    fn build(&self, _ctx: &ProcessorContext) -> Result<Pass, Error> {
        Ok(Pass::Cell(Box::new(self.clone())))
    }
}

impl CellProcessor for RemoveWidgetState {
    fn name(&self) -> &'static str {
        "remove_widget_state"
    }

    fn process_cell(&mut self, _index: usize, cell: &mut Cell) -> Result<(), Error> {
        if let Some(outputs) = cell.outputs_mut() {
            outputs.retain(|o| !o.has_mime(WIDGET_VIEW_MIME));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddLinksConfig {}

#[typetag::serde(name = "add_links")]
impl ProcessorConfig for AddLinksConfig {
    fn build(&self, ctx: &ProcessorContext) -> Result<Pass, Error> {
        let linker = ctx.linker.clone().ok_or(Error::MissingCapability {
            processor: "add_links",
            capability: "a symbol index",
        })?;
        Ok(Pass::Cell(Box::new(AddLinks { linker })))
    }
}

/// Links symbol references in markdown cells and markdown outputs.
pub struct AddLinks {
    linker: Arc<dyn SymbolLinker>,
}

impl CellProcessor for AddLinks {
    fn name(&self) -> &'static str {
        "add_links"
    }

    fn process_cell(&mut self, _index: usize, cell: &mut Cell) -> Result<(), Error> {
        let linked = match (cell.cell_type(), cell.source()) {
            (CellType::Markdown, Some(src)) => Some(self.linker.linkify(src)),
            _ => None,
        };
        if let Some(linked) = linked {
            cell.set_source(linked);
        }

        let markdown = cell
            .outputs_mut()
            .into_iter()
            .flatten()
            .filter_map(|o| o.data.as_mut())
            .filter_map(|data| data.get_mut("text/markdown"));
        for value in markdown {
            match value {
                Value::String(s) => *s = self.linker.link_line(s),
                Value::Array(lines) => lines.iter_mut().for_each(|line| {
                    if let Value::String(s) = line {
                        *s = self.linker.link_line(s);
                    }
                }),
                _ => {}
            }
        }
        Ok(())
    }
}

pub const WARNING: &str = "<!-- WARNING: THIS FILE WAS AUTOGENERATED! DO NOT EDIT! -->";

/// Inserts a do-not-edit warning after the first cell.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsertWarning {}

#[typetag::serde(name = "insert_warning")]
impl ProcessorConfig for InsertWarning {
    fn build(&self, _ctx: &ProcessorContext) -> Result<Pass, Error> {
        Ok(Pass::Notebook(Box::new(self.clone())))
    }
}

impl NotebookProcessor for InsertWarning {
    fn name(&self) -> &'static str {
        "insert_warning"
    }

    fn process(&mut self, nb: &mut Notebook) -> Result<(), Error> {
        if nb.cells.get(1).and_then(Cell::source) == Some(WARNING) {
            return Ok(());
        }
        let at = nb.cells.len().min(1);
        nb.cells.insert(at, Cell::markdown(WARNING));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbproc_parser::Output;

    fn apply<P: CellProcessor>(mut p: P, cell: &mut Cell) {
        p.process_cell(0, cell).unwrap();
    }

    fn with_outputs(src: &str, outputs: Vec<Output>) -> Cell {
        let mut cell = Cell::code(src);
        *cell.outputs_mut().unwrap() = outputs;
        cell
    }

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi("\x1b[31mERROR\x1b[0m"), "ERROR");
        assert_eq!(strip_ansi("plain text"), "plain text");

        let mut cell = with_outputs(
            "x",
            vec![
                Output::stream("stdout", "\x1b[1;32mok\x1b[0m\n"),
                Output::stream("stderr", "\x1b[31mkept\x1b[0m"),
            ],
        );
        apply(StripAnsi {}, &mut cell);

        assert_eq!(cell.outputs()[0].text, Some(vec!["ok\n".to_string()]));
        assert_eq!(
            cell.outputs()[1].text,
            Some(vec!["\x1b[31mkept\x1b[0m".to_string()])
        );
    }

    #[test]
    fn test_hide_line() {
        let mut cell = Cell::code("a = 1\nb = 2  #| hide_line\nc = 3");
        apply(HideLine {}, &mut cell);
        assert_eq!(cell.source(), Some("a = 1\nc = 3"));

        let mut md = Cell::markdown("a #| hide_line");
        apply(HideLine {}, &mut md);
        assert_eq!(md.source(), Some("a #| hide_line"));
    }

    #[test]
    fn test_filter_stream() {
        let outputs = vec![Output::stream("stdout", "keep\nwarning: x\nalso keep\nnoise\n")];
        let mut cell = with_outputs("x", outputs.clone());
        apply(
            FilterStream {
                words: vec!["warning".into()],
            },
            &mut cell,
        );
        assert_eq!(
            cell.outputs()[0].text,
            Some(vec!["keep\n".to_string(), "also keep\n".to_string(), "noise\n".to_string()])
        );

        let mut cell = with_outputs("#| filter_stream noise warn\nx", outputs.clone());
        apply(FilterStream::default(), &mut cell);
        assert_eq!(
            cell.outputs()[0].text,
            Some(vec!["keep\n".to_string(), "also keep\n".to_string()])
        );

        let mut cell = with_outputs("x", outputs.clone());
        apply(FilterStream::default(), &mut cell);
        assert_eq!(cell.outputs(), &outputs[..]);
    }

    #[test]
    fn test_filter_stream_bad_pattern() {
        let config = FilterStream {
            words: vec!["(".into()],
        };
        assert!(matches!(
            config.build(&ProcessorContext::default()),
            Err(Error::Pattern(_))
        ));
    }

    #[test]
    fn test_clean_magics() {
        let mut cell = Cell::code("%%time\nx = 1\n%matplotlib inline\ny = 2\n");
        apply(CleanMagics {}, &mut cell);
        assert_eq!(cell.source(), Some("x = 1\n\ny = 2"));

        let mut md = Cell::markdown("%not a magic");
        apply(CleanMagics {}, &mut md);
        assert_eq!(md.source(), Some("%not a magic"));
    }

    #[test]
    fn test_lang_identify() {
        let mut cell = Cell::code("%%js\nconsole.log(1)");
        apply(LangIdentify {}, &mut cell);
        assert_eq!(cell.common().metadata.language.as_deref(), Some("javascript"));

        let mut cell = Cell::code("%%bash\nls");
        apply(LangIdentify {}, &mut cell);
        assert_eq!(cell.common().metadata.language.as_deref(), Some("bash"));

        let mut cell = Cell::code("%%time\nx = 1");
        apply(LangIdentify {}, &mut cell);
        assert_eq!(cell.common().metadata.language, None);

        let mut cell = Cell::code("x = 1\n%%bash");
        apply(LangIdentify {}, &mut cell);
        assert_eq!(cell.common().metadata.language, None);
    }

    #[test]
    fn test_rm_header_dash() {
        let mut cell = Cell::markdown("## Internals -\n");
        apply(RmHeaderDash {}, &mut cell);
        assert_eq!(cell.source(), None);

        let mut cell = Cell::markdown("## Pre-processing");
        apply(RmHeaderDash {}, &mut cell);
        assert!(cell.source().is_some());

        let mut cell = Cell::code("# comment -");
        apply(RmHeaderDash {}, &mut cell);
        assert!(cell.source().is_some());
    }

    #[test]
    fn test_rm_export() {
        for src in ["#| export\nx = 1", "#| exporti\nx", "#| hide\nx", "#| default_exp core"] {
            let mut cell = Cell::code(src);
            apply(RmExport {}, &mut cell);
            assert_eq!(cell.source(), None, "{}", src);
        }

        let mut cell = Cell::code("#| eval: false\nx = 1");
        apply(RmExport {}, &mut cell);
        assert!(cell.source().is_some());
    }

    #[test]
    fn test_hide() {
        let mut cell = Cell::code("#| hide\nx = 1");
        apply(Hide {}, &mut cell);
        assert_eq!(cell.source(), None);

        let mut cell = Cell::code("#| export\nx = 1");
        apply(Hide {}, &mut cell);
        assert!(cell.source().is_some());
    }

    #[test]
    fn test_remove_widget_state() {
        let mut widget = linked_hash_map::LinkedHashMap::new();
        widget.insert(WIDGET_VIEW_MIME.to_string(), Value::Null);
        let mut plain = linked_hash_map::LinkedHashMap::new();
        plain.insert("text/plain".to_string(), Value::from("1"));

        let mut cell = with_outputs(
            "w",
            vec![Output::display_data(widget), Output::display_data(plain)],
        );
        apply(RemoveWidgetState {}, &mut cell);
        assert_eq!(cell.outputs().len(), 1);
        assert!(cell.outputs()[0].has_mime("text/plain"));
    }

    struct Brackets;

    impl SymbolLinker for Brackets {
        fn linkify(&self, markdown: &str) -> String {
            markdown.replace("`f`", "[`f`](core.html#f)")
        }
    }

    #[test]
    fn test_add_links() {
        let ctx = ProcessorContext::default().with_linker(Arc::new(Brackets));
        let Pass::Cell(mut p) = AddLinksConfig {}.build(&ctx).unwrap() else {
            panic!("expected a cell processor");
        };

        let mut md = Cell::markdown("see `f`");
        p.process_cell(0, &mut md).unwrap();
        assert_eq!(md.source(), Some("see [`f`](core.html#f)"));

        let mut data = linked_hash_map::LinkedHashMap::new();
        data.insert("text/markdown".to_string(), serde_json::json!(["a `f`\n", "b"]));
        let mut code = with_outputs("show_doc(f)", vec![Output::display_data(data)]);
        p.process_cell(0, &mut code).unwrap();
        assert_eq!(
            code.outputs()[0].data.as_ref().unwrap()["text/markdown"],
            serde_json::json!(["a [`f`](core.html#f)\n", "b"])
        );
        assert_eq!(code.source(), Some("show_doc(f)"));
    }

    #[test]
    fn test_add_links_needs_linker() {
        assert!(matches!(
            AddLinksConfig {}.build(&ProcessorContext::default()),
            Err(Error::MissingCapability { .. })
        ));
    }

    #[test]
    fn test_insert_warning() {
        let mut nb = Notebook::new(vec![Cell::raw("---\ntitle: T\n---"), Cell::code("x")]);
        InsertWarning {}.process(&mut nb).unwrap();
        InsertWarning {}.process(&mut nb).unwrap();

        assert_eq!(nb.cells.len(), 3);
        assert_eq!(nb.cells[1].source(), Some(WARNING));

        let mut empty = Notebook::new(vec![]);
        InsertWarning {}.process(&mut empty).unwrap();
        assert_eq!(empty.cells.len(), 1);
    }
}
