//! `perks init` — create `.perks/` with a default config and an empty store.

use crate::output::{OutputMode, pretty_kv, render_mode};
use anyhow::{Context as _, Result};
use clap::Args;
use perks_core::config::{self, PROJECT_DIR};
use perks_core::db::{self, migrations};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Rewrite `config.toml` even if `.perks/` already exists.
    #[arg(long)]
    pub force: bool,
}

const GITIGNORE: &str = "perks.db\nperks.db-wal\nperks.db-shm\n";

#[derive(Debug, Serialize)]
struct InitReport {
    config: PathBuf,
    database: PathBuf,
    schema_version: u32,
}

/// Execute `perks init`. Creates:
///
/// ```text
/// .perks/
///   config.toml   (default store settings)
///   .gitignore    (database files)
///   perks.db      (migrated store, unless PERKS_DB points elsewhere)
/// ```
///
/// # Errors
///
/// Returns an error if `.perks/` already exists and `--force` is not set, or
/// if any filesystem or database operation fails.
pub fn run_init(args: &InitArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let perks_dir = project_root.join(PROJECT_DIR);

    if perks_dir.exists() && !args.force {
        anyhow::bail!(".perks/ already exists. Use `perks init --force` to reinitialize.");
    }

    std::fs::create_dir_all(&perks_dir)
        .with_context(|| format!("Failed to create {}", perks_dir.display()))?;

    let config_path = perks_dir.join("config.toml");
    std::fs::write(&config_path, config::default_project_config_toml()?)
        .with_context(|| format!("Failed to write config: {}", config_path.display()))?;

    let gitignore_path = perks_dir.join(".gitignore");
    std::fs::write(&gitignore_path, GITIGNORE)
        .with_context(|| format!("Failed to write .gitignore: {}", gitignore_path.display()))?;

    let cfg = config::resolve_config(project_root)?;
    let conn = db::open_store(&cfg.db_path, cfg.project.store.busy_timeout())?;
    let schema_version = migrations::current_schema_version(&conn)?;
    tracing::info!(path = %cfg.db_path.display(), schema_version, "initialized store");

    let report = InitReport {
        config: config_path,
        database: cfg.db_path,
        schema_version,
    };

    render_mode(
        output,
        &report,
        |r, w| {
            writeln!(w, "config\t{}", r.config.display())?;
            writeln!(w, "database\t{}", r.database.display())
        },
        |r, w| {
            writeln!(w, "✓ Initialized .perks/")?;
            pretty_kv(w, "config", r.config.display().to_string())?;
            pretty_kv(w, "database", r.database.display().to_string())?;
            pretty_kv(w, "schema", format!("v{}", r.schema_version))?;
            writeln!(w)?;
            writeln!(w, "Next steps:")?;
            writeln!(w, "  perks reward create --name Welcome --expires 2030-01-01T00:00:00Z")?;
            writeln!(w, "  perks user create --name Ada --email ada@example.com")?;
            writeln!(w, "  perks apply 1 ada@example.com")
        },
    )
}
