use std::io::Write;

use anyhow::Result;
use clap::Subcommand;
use sqlpipe_core::chunk::{ChunkedExecutor, Computation, Group};
use sqlpipe_core::config::SqlConfig;
use sqlpipe_core::connection::Connection;
use sqlpipe_core::dialect::Backend;
use sqlpipe_core::scalar::ScalarValue;
use sqlpipe_sqlite::SqliteConnection;
use tracing::{info, warn};

use crate::args::{CountArgs, RenderArgs, RenderMode};
use crate::plan::PlanFile;

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the SQL for a plan.
    Render(RenderArgs),
    /// Count rows per group of a plan against a sqlite database.
    Count(CountArgs),
    /// List settings with their defaults.
    Settings,
}

impl Commands {
    pub fn run(self, out: &mut dyn Write) -> Result<()> {
        match self {
            Commands::Render(args) => args.run(out),
            Commands::Count(args) => args.run(out),
            Commands::Settings => list_settings(out),
        }
    }
}

trait RunCommand {
    fn run(self, out: &mut dyn Write) -> Result<()>;
}

impl RunCommand for RenderArgs {
    fn run(self, out: &mut dyn Write) -> Result<()> {
        let mut plan = PlanFile::load(&self.plan)?;
        self.opts.apply(&mut plan.config)?;

        let backend = self.dialect.or(plan.dialect).unwrap_or_default();
        let dialect = backend.dialect();
        let rendered = match self.mode {
            RenderMode::Plain => plan.query.render(dialect, &plan.config)?,
            RenderMode::Groups => plan.query.render_group_ordered(dialect, &plan.config)?,
            RenderMode::Labels => plan.query.render_labels(dialect, &plan.config)?,
        };

        writeln!(out, "{}", rendered.sql)?;
        writeln!(out, "-- columns: {}", rendered.vars.join(", "))?;
        if !rendered.groups.is_empty() {
            writeln!(out, "-- groups: {}", rendered.groups.join(", "))?;
        }
        for warning in &rendered.warnings {
            writeln!(out, "-- warning: {warning}")?;
        }

        Ok(())
    }
}

impl RunCommand for CountArgs {
    fn run(self, out: &mut dyn Write) -> Result<()> {
        let mut plan = PlanFile::load(&self.plan)?;
        self.apply(&mut plan.config)?;

        if let Some(backend) = plan.dialect.filter(|b| *b != Backend::Sqlite) {
            warn!(%backend, "ignoring plan dialect, counting against sqlite");
        }

        let mut conn = SqliteConnection::open_read_only(&self.db)?;
        if self.emulate_windows {
            conn = conn.without_window_functions();
        }
        info!(db = %self.db.display(), dialect = conn.dialect().name, "opened database");

        let count = Computation::named("n", |group: &Group| {
            Ok(ScalarValue::from(group.rows.num_rows()).into())
        });
        let result = ChunkedExecutor::new(&conn, plan.config).execute(&plan.query, vec![count])?;

        write!(out, "{}", result.output.into_row_set()?)?;
        Ok(())
    }
}

fn list_settings(out: &mut dyn Write) -> Result<()> {
    for (name, description, value) in SqlConfig::default().list_settings() {
        writeln!(out, "{name}\t{value}\t{description}")?;
    }
    Ok(())
}
