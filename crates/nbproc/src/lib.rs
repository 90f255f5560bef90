//! Processors that turn notebooks into documentation-ready notebooks.
//!
//! A [pipeline::Pipeline] is a list of [processors::ProcessorConfig]s, usually read from YAML by
//! their `type` name. Building it against a [processors::ProcessorContext] yields one
//! [processors::Pass] per processor, which are applied to the whole notebook in turn.

pub mod pipeline;
pub mod processors;

pub use nbproc_parser::{Cell, CellType, Notebook};
pub use pipeline::Pipeline;
pub use processors::{Error, ProcessorContext};
