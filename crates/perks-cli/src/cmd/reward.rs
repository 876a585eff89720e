//! `perks reward …` — the reward catalog.

use crate::output::{
    OrRender, OutputMode, Renderable, pretty_kv, pretty_section, render_item, render_list,
    render_mode, render_row, render_rows,
};
use chrono::{DateTime, SecondsFormat, Utc};
use clap::{Args, Subcommand};
use perks_core::fields::{Projection, RewardField, RewardSearchColumn, validate_column};
use perks_core::model::{NewReward, Reward, RewardId, RewardPatch};
use serde::Serialize;
use std::io::{self, Write};
use std::path::Path;

#[derive(Args, Debug)]
pub struct RewardArgs {
    #[command(subcommand)]
    pub command: RewardCommand,
}

#[derive(Subcommand, Debug)]
pub enum RewardCommand {
    /// Add a reward to the catalog.
    Create(CreateArgs),
    /// Show one reward by id.
    Show(IdArgs),
    /// Projected read of one reward by name; the lowest id wins on duplicates.
    Find(FindArgs),
    /// Patch name, description, or expiry.
    Update(UpdateArgs),
    /// Delete a reward and remove it from every user.
    Delete(IdArgs),
    /// List every reward.
    List,
    /// Substring search on `name` or `description`.
    Search(SearchArgs),
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long, default_value = "")]
    pub description: String,
    /// Expiry instant, RFC 3339 (e.g. `2030-01-01T00:00:00Z`).
    #[arg(long)]
    pub expires: DateTime<Utc>,
}

#[derive(Args, Debug)]
pub struct IdArgs {
    pub id: i64,
}

#[derive(Args, Debug)]
pub struct FindArgs {
    pub name: String,
    /// Comma-separated fields to return (default: all).
    #[arg(long, value_delimiter = ',')]
    pub fields: Vec<String>,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    pub id: i64,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub expires: Option<DateTime<Utc>>,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Column to search: `name` or `description`.
    pub column: String,
    /// Literal substring; `%` and `_` are not wildcards.
    pub needle: String,
    /// Comma-separated fields to return (default: all).
    #[arg(long, value_delimiter = ',')]
    pub fields: Vec<String>,
}

#[derive(Debug, Serialize)]
struct DeleteReport {
    deleted: RewardId,
    users_updated: usize,
}

fn format_expiry(expires: DateTime<Utc>) -> String {
    expires.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl Renderable for Reward {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        pretty_section(w, &format!("Reward {} {}", self.id, self.name))?;
        if !self.description.is_empty() {
            writeln!(w, "{}", self.description)?;
        }
        let expired = if self.is_expired_at(Utc::now()) {
            " (expired)"
        } else {
            ""
        };
        pretty_kv(w, "expires", format!("{}{expired}", format_expiry(self.expires)))?;
        writeln!(w)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{}\t{}\t{}\t{}",
            self.id,
            self.name,
            format_expiry(self.expires),
            self.description
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["ID", "NAME", "EXPIRES", "DESCRIPTION"]
    }
}

/// Execute `perks reward <command>`.
///
/// # Errors
///
/// Returns an error if validation fails, the store is unavailable, the
/// target reward is missing, or output rendering fails.
pub fn run_reward(args: &RewardArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    match &args.command {
        RewardCommand::Create(create) => {
            let store = super::open_store(output, project_root)?;
            let reward = store
                .create_reward(&NewReward {
                    name: create.name.clone(),
                    description: create.description.clone(),
                    expires: create.expires,
                })
                .or_render(output)?;
            render_item(&reward, output)
        }
        RewardCommand::Show(show) => {
            let store = super::open_store(output, project_root)?;
            let reward = store.get_reward(RewardId::new(show.id)).or_render(output)?;
            render_item(&reward, output)
        }
        RewardCommand::Find(find) => {
            let projection = Projection::<RewardField>::parse(&find.fields).or_render(output)?;
            let store = super::open_store(output, project_root)?;
            let row = store
                .read_reward_by_name(&find.name, &projection)
                .or_render(output)?;
            render_row(output, &projection.output_names(), &row)
        }
        RewardCommand::Update(update) => {
            let patch = RewardPatch {
                name: update.name.clone(),
                description: update.description.clone(),
                expires: update.expires,
            };
            let store = super::open_store(output, project_root)?;
            let reward = store
                .update_reward(RewardId::new(update.id), &patch)
                .or_render(output)?;
            render_item(&reward, output)
        }
        RewardCommand::Delete(delete) => {
            let mut store = super::open_store(output, project_root)?;
            let id = RewardId::new(delete.id);
            let users_updated = store.delete_reward(id).or_render(output)?;
            let report = DeleteReport {
                deleted: id,
                users_updated,
            };
            render_mode(
                output,
                &report,
                |r, w| writeln!(w, "deleted\t{}\tusers_updated\t{}", r.deleted, r.users_updated),
                |r, w| {
                    writeln!(
                        w,
                        "✓ deleted reward {} (removed from {} user(s))",
                        r.deleted, r.users_updated
                    )
                },
            )
        }
        RewardCommand::List => {
            let store = super::open_store(output, project_root)?;
            let rewards = store.list_rewards().or_render(output)?;
            render_list(&rewards, output)
        }
        RewardCommand::Search(search) => {
            let column =
                validate_column::<RewardSearchColumn>(&search.column).or_render(output)?;
            let projection = Projection::<RewardField>::parse(&search.fields).or_render(output)?;
            let store = super::open_store(output, project_root)?;
            let rows = store
                .search_rewards(column, &search.needle, &projection)
                .or_render(output)?;
            render_rows(output, &projection.output_names(), &rows)
        }
    }
}
