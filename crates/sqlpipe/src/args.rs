use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use sqlpipe_core::config::{ChunkSize, Setting, SqlConfig, StrictNumeric, StrictSql};
use sqlpipe_core::dialect::Backend;
use sqlpipe_core::errors::Result;

/// Which statement to render for a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum RenderMode {
    /// The query as written.
    #[default]
    Plain,
    /// Ungrouped, ordered by the grouping columns. This is what grouped
    /// traversal fetches.
    Groups,
    /// One row per group key.
    Labels,
}

#[derive(Debug, Clone, Parser)]
pub struct CompileOpts {
    /// Error on functions without a known translation.
    #[clap(long)]
    pub strict_sql: bool,

    /// Render every numeric literal with a decimal point.
    #[clap(long)]
    pub strict_numeric: bool,
}

impl CompileOpts {
    /// Flags only ever turn settings on, leaving plan file values otherwise.
    pub fn apply(&self, config: &mut SqlConfig) -> Result<()> {
        if self.strict_sql {
            config.set_from_scalar(StrictSql::NAME, true.into())?;
        }
        if self.strict_numeric {
            config.set_from_scalar(StrictNumeric::NAME, true.into())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Parser)]
pub struct RenderArgs {
    /// JSON plan file.
    #[clap(long, value_parser)]
    pub plan: PathBuf,

    /// Backend to render for. Defaults to the plan's dialect, then ansi.
    #[clap(long)]
    pub dialect: Option<Backend>,

    #[clap(long, value_enum, default_value_t = RenderMode::Plain)]
    pub mode: RenderMode,

    #[clap(flatten)]
    pub opts: CompileOpts,
}

#[derive(Debug, Clone, Parser)]
pub struct CountArgs {
    /// Sqlite database file, opened read only.
    #[clap(long, value_parser)]
    pub db: PathBuf,

    /// JSON plan file.
    #[clap(long, value_parser)]
    pub plan: PathBuf,

    /// Rows fetched per page.
    #[clap(long)]
    pub chunk_size: Option<usize>,

    /// Render window functions as subqueries even though sqlite supports them.
    #[clap(long)]
    pub emulate_windows: bool,

    #[clap(flatten)]
    pub opts: CompileOpts,
}

impl CountArgs {
    pub fn apply(&self, config: &mut SqlConfig) -> Result<()> {
        self.opts.apply(config)?;
        if let Some(chunk_size) = self.chunk_size {
            config.set_from_scalar(ChunkSize::NAME, chunk_size.into())?;
        }
        Ok(())
    }
}
