use linked_hash_map::LinkedHashMap;
use nanoid::nanoid;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::directives::{parse_directives, Directives};

pub type Dict = LinkedHashMap<String, Value>;

/// MIME type of interactive widget views. Their state is meaningless once the kernel is gone.
pub const WIDGET_VIEW_MIME: &str = "application/vnd.jupyter.widget-view+json";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Notebook {
    #[serde(default)]
    pub metadata: NotebookMeta,
    #[serde(default = "default_nbformat")]
    pub nbformat: i64,
    #[serde(default = "default_nbformat_minor")]
    pub nbformat_minor: i64,
    pub cells: Vec<Cell>,
}

const fn default_nbformat() -> i64 {
    4
}

const fn default_nbformat_minor() -> i64 {
    5
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct NotebookMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kernelspec: Option<Dict>,
    #[serde(flatten)]
    pub optional: Dict,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "cell_type")]
pub enum Cell {
    #[serde(rename = "markdown")]
    Markdown {
        #[serde(flatten)]
        common: CellCommon,
    },
    #[serde(rename = "code")]
    Code {
        #[serde(flatten)]
        common: CellCommon,

        #[serde(default)]
        execution_count: Option<i64>,

        #[serde(default)]
        outputs: Vec<Output>,
    },
    #[serde(rename = "raw")]
    Raw {
        #[serde(flatten)]
        common: CellCommon,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellType {
    Markdown,
    Code,
    Raw,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct CellCommon {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub metadata: CellMeta,
    /// `None` once a processor has deleted the cell's content.
    #[serde(
        default,
        deserialize_with = "concatenate_deserialize",
        serialize_with = "concatenate_serialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub source: Option<String>,
    #[serde(flatten)]
    pub additional: Dict,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct CellMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collapsed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(flatten)]
    pub additional: Dict,
}

/// One entry of a code cell's output list. Kept as a loose record so that output kinds the
/// processors don't touch survive a round trip unchanged.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Output {
    pub output_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        default,
        deserialize_with = "lines_deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub text: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Dict>,
    #[serde(flatten)]
    pub additional: Dict,
}

impl Output {
    pub fn stream(name: &str, text: &str) -> Self {
        Output {
            output_type: "stream".to_string(),
            name: Some(name.to_string()),
            text: Some(split_lines(text)),
            data: None,
            additional: Dict::new(),
        }
    }

    pub fn display_data(data: Dict) -> Self {
        let mut additional = Dict::new();
        additional.insert("metadata".to_string(), Value::Object(Default::default()));
        Output {
            output_type: "display_data".to_string(),
            name: None,
            text: None,
            data: Some(data),
            additional,
        }
    }

    pub fn is_stream(&self) -> bool {
        self.output_type == "stream"
    }

    pub fn has_mime(&self, mime: &str) -> bool {
        self.data.as_ref().map_or(false, |d| d.contains_key(mime))
    }
}

impl Notebook {
    pub fn new(cells: Vec<Cell>) -> Self {
        Notebook {
            metadata: NotebookMeta::default(),
            nbformat: default_nbformat(),
            nbformat_minor: default_nbformat_minor(),
            cells,
        }
    }

    pub fn cells_of(&self, cell_type: CellType) -> impl Iterator<Item = (usize, &Cell)> {
        self.cells
            .iter()
            .enumerate()
            .filter(move |(_, c)| c.cell_type() == cell_type)
    }

    /// Removes every cell whose source was deleted. Returns how many were removed.
    pub fn prune_deleted(&mut self) -> usize {
        let before = self.cells.len();
        self.cells.retain(|c| c.source().is_some());
        before - self.cells.len()
    }
}

impl Cell {
    pub fn code(source: impl Into<String>) -> Self {
        Cell::Code {
            common: CellCommon::new(source.into()),
            execution_count: None,
            outputs: Vec::new(),
        }
    }

    pub fn markdown(source: impl Into<String>) -> Self {
        Cell::Markdown {
            common: CellCommon::new(source.into()),
        }
    }

    pub fn raw(source: impl Into<String>) -> Self {
        Cell::Raw {
            common: CellCommon::new(source.into()),
        }
    }

    pub fn cell_type(&self) -> CellType {
        match self {
            Cell::Markdown { .. } => CellType::Markdown,
            Cell::Code { .. } => CellType::Code,
            Cell::Raw { .. } => CellType::Raw,
        }
    }

    pub fn is_code(&self) -> bool {
        matches!(self, Cell::Code { .. })
    }

    pub fn common(&self) -> &CellCommon {
        match self {
            Cell::Markdown { common } | Cell::Code { common, .. } | Cell::Raw { common } => common,
        }
    }

    pub fn common_mut(&mut self) -> &mut CellCommon {
        match self {
            Cell::Markdown { common } | Cell::Code { common, .. } | Cell::Raw { common } => common,
        }
    }

    pub fn source(&self) -> Option<&str> {
        self.common().source.as_deref()
    }

    pub fn set_source(&mut self, source: impl Into<String>) {
        self.common_mut().source = Some(source.into());
    }

    /// Soft delete: the cell keeps its position but renders nothing.
    pub fn delete_source(&mut self) {
        self.common_mut().source = None;
    }

    pub fn metadata_mut(&mut self) -> &mut CellMeta {
        &mut self.common_mut().metadata
    }

    pub fn outputs(&self) -> &[Output] {
        match self {
            Cell::Code { outputs, .. } => outputs,
            _ => &[],
        }
    }

    pub fn outputs_mut(&mut self) -> Option<&mut Vec<Output>> {
        match self {
            Cell::Code { outputs, .. } => Some(outputs),
            _ => None,
        }
    }

    /// Directives of a code cell. Other cell types, and deleted cells, have none.
    pub fn directives(&self) -> Directives {
        match (self, self.source()) {
            (Cell::Code { .. }, Some(src)) => parse_directives(src),
            _ => Directives::default(),
        }
    }
}

impl CellCommon {
    fn new(source: String) -> Self {
        CellCommon {
            id: Some(nanoid!()),
            metadata: CellMeta::default(),
            source: Some(source),
            additional: Dict::new(),
        }
    }
}

/// Splits text into lines that keep their terminating newline, as the ipynb format stores them.
pub fn split_lines(text: &str) -> Vec<String> {
    text.split_inclusive('\n').map(str::to_string).collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MultiLine {
    Joined(String),
    Lines(Vec<String>),
}

fn concatenate_deserialize<'de, D>(input: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let base: Option<MultiLine> = Deserialize::deserialize(input)?;
    Ok(base.map(|m| match m {
        MultiLine::Joined(s) => s,
        MultiLine::Lines(lines) => lines.into_iter().collect(),
    }))
}

fn concatenate_serialize<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(s) => serializer.collect_seq(s.split_inclusive('\n')),
        None => serializer.serialize_none(),
    }
}

fn lines_deserialize<'de, D>(input: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let base: Option<MultiLine> = Deserialize::deserialize(input)?;
    Ok(base.map(|m| match m {
        MultiLine::Joined(s) => split_lines(&s),
        MultiLine::Lines(lines) => lines,
    }))
}
