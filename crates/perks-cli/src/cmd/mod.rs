pub mod completions;
pub mod init;
pub mod lifecycle;
pub mod reward;
pub mod user;

use crate::output::{CliError, OutputMode, render_error};
use perks_core::ErrorCode;
use perks_core::RewardStore;
use perks_core::config;
use perks_core::db;
use std::path::Path;

/// Open the project's store, rendering a structured error when it is missing
/// or its config cannot be read.
///
/// # Errors
///
/// Returns an error if the config is malformed or the store is not initialized.
pub fn open_store(output: OutputMode, project_root: &Path) -> anyhow::Result<RewardStore> {
    let cfg = match config::resolve_config(project_root) {
        Ok(cfg) => cfg,
        Err(err) => {
            let code = ErrorCode::ConfigParseError;
            render_error(
                output,
                &CliError::with_details(
                    format!("{err:#}"),
                    code.hint().unwrap_or_default(),
                    code.code(),
                ),
            )?;
            return Err(err);
        }
    };

    match db::try_open_store(&cfg.db_path, cfg.project.store.busy_timeout())? {
        Some(conn) => Ok(RewardStore::new(conn)),
        None => {
            let code = ErrorCode::NotInitialized;
            render_error(
                output,
                &CliError::with_details(
                    format!("no perks store at {}", cfg.db_path.display()),
                    code.hint().unwrap_or_default(),
                    code.code(),
                ),
            )?;
            anyhow::bail!("store not initialized: {}", cfg.db_path.display());
        }
    }
}
