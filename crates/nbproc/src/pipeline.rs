use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use nbproc_parser::Notebook;

use crate::processors::exec::ExecShowDocsConfig;
use crate::processors::filters::{
    CleanMagics, FilterStream, HideLine, InsertWarning, LangIdentify, RemoveWidgetState,
    RmExport, RmHeaderDash, StripAnsi,
};
use crate::processors::frontmatter::InferFrontmatter;
use crate::processors::showdoc::{AddShowDocsConfig, CleanShowDoc};
use crate::processors::{Error, Pass, ProcessorConfig, ProcessorContext};

/// Pairs of processors that must run in this order when both are present: the later one
/// destroys something the earlier one reads.
pub const ORDERING: [(&str, &str); 10] = [
    ("infer_frontmatter", "rm_export"),
    ("add_show_docs", "rm_export"),
    ("exec_show_docs", "rm_export"),
    ("add_show_docs", "exec_show_docs"),
    ("exec_show_docs", "hide"),
    ("exec_show_docs", "hide_line"),
    ("exec_show_docs", "clean_magics"),
    ("exec_show_docs", "clean_show_doc"),
    ("lang_identify", "clean_magics"),
    ("infer_frontmatter", "insert_warning"),
];

/// A declared sequence of processors and the settings that apply to the whole run.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Pipeline {
    #[serde(default = "default_processors")]
    pub processors: Vec<Box<dyn ProcessorConfig>>,
    #[serde(default, flatten)]
    pub settings: PipelineSettings,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Leave soft-deleted cells in the output instead of removing them.
    #[serde(default)]
    pub keep_deleted: bool,
}

/// The processors run when none are configured. Those needing an execution session or a
/// symbol index are left out.
pub fn default_processors() -> Vec<Box<dyn ProcessorConfig>> {
    vec![
        Box::new(InferFrontmatter::default()),
        Box::new(AddShowDocsConfig::default()),
        Box::new(StripAnsi::default()),
        Box::new(HideLine::default()),
        Box::new(FilterStream::default()),
        Box::new(LangIdentify::default()),
        Box::new(CleanMagics::default()),
        Box::new(RmHeaderDash::default()),
        Box::new(RemoveWidgetState::default()),
        Box::new(CleanShowDoc::default()),
        Box::new(InsertWarning::default()),
        Box::new(RmExport::default()),
    ]
}

impl Default for Pipeline {
    fn default() -> Self {
        Pipeline {
            processors: default_processors(),
            settings: PipelineSettings::default(),
        }
    }
}

/// Checks the names of a processor sequence against [ORDERING].
pub fn validate_order(names: &[&'static str]) -> Result<(), Error> {
    for (earlier, later) in ORDERING {
        let first_later = names.iter().position(|n| *n == later);
        let last_earlier = names.iter().rposition(|n| *n == earlier);
        if let (Some(l), Some(e)) = (first_later, last_earlier) {
            if l < e {
                return Err(Error::Ordering { earlier, later });
            }
        }
    }
    Ok(())
}

impl Pipeline {
    /// A pipeline with the default processors plus execution of documentation cells, placed
    /// right after show_doc synthesis.
    pub fn with_execution() -> Self {
        let mut pipeline = Pipeline::default();
        let at = pipeline.processors.len().min(2);
        pipeline
            .processors
            .insert(at, Box::new(ExecShowDocsConfig::default()));
        pipeline
    }

    /// Builds every processor and checks their order. Each call yields fresh processors, so
    /// execution sessions are never shared between notebooks.
    pub fn build(&self, ctx: &ProcessorContext) -> Result<Vec<Pass>, Error> {
        let passes = self
            .processors
            .iter()
            .map(|p| p.build(ctx))
            .collect::<Result<Vec<Pass>, Error>>()?;

        let names: Vec<&'static str> = passes.iter().map(Pass::name).collect();
        validate_order(&names)?;
        Ok(passes)
    }

    pub fn run(&self, nb: &mut Notebook, ctx: &ProcessorContext) -> Result<(), Error> {
        let mut passes = self.build(ctx)?;
        passes.iter_mut().try_for_each(|pass| {
            debug!("running {}", pass);
            pass.apply(nb)
        })?;

        if !self.settings.keep_deleted {
            let pruned = nb.prune_deleted();
            if pruned > 0 {
                info!("removed {} deleted cells", pruned);
            }
        }
        Ok(())
    }
}
