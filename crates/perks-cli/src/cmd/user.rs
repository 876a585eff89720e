//! `perks user …` — user records and projected user reads.

use crate::output::{
    OrRender, OutputMode, Renderable, pretty_kv, pretty_section, render_item, render_list,
    render_row, render_rows, render_success,
};
use chrono::NaiveDate;
use clap::{Args, Subcommand};
use perks_core::fields::{UserSearchColumn, UserSelection, validate_column};
use perks_core::model::{NewUser, User, UserPatch, UserRef};
use std::io::{self, Write};
use std::path::Path;

#[derive(Args, Debug)]
pub struct UserArgs {
    #[command(subcommand)]
    pub command: UserCommand,
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    /// Create a user with an empty reward map.
    Create(CreateArgs),
    /// Show one user and the status of each applied reward.
    Show(ShowArgs),
    /// Projected read of one user by id or email.
    Find(FindArgs),
    /// Patch name, email, or date of birth.
    Update(UpdateArgs),
    /// Delete a user.
    Delete(DeleteArgs),
    /// List every user.
    List,
    /// Substring search on `name` or `email`.
    Search(SearchArgs),
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub email: String,
    /// Date of birth, `YYYY-MM-DD`.
    #[arg(long)]
    pub dob: Option<NaiveDate>,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Numeric id or email address.
    pub user: String,
}

/// Field selection shared by `find` and `search`.
#[derive(Args, Debug)]
pub struct SelectionArgs {
    /// Comma-separated fields to return (default: all).
    #[arg(long, value_delimiter = ',')]
    pub fields: Vec<String>,

    /// Inline each applied reward's name, description, and claimed flag.
    #[arg(long)]
    pub resolve: bool,
}

#[derive(Args, Debug)]
pub struct FindArgs {
    /// Numeric id or email address. With duplicate emails the lowest id wins.
    pub user: String,
    #[command(flatten)]
    pub selection: SelectionArgs,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    pub id: i64,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub email: Option<String>,
    #[arg(long, conflicts_with = "clear_dob")]
    pub dob: Option<NaiveDate>,
    /// Remove the stored date of birth.
    #[arg(long)]
    pub clear_dob: bool,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    pub id: i64,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Column to search: `name` or `email`.
    pub column: String,
    /// Literal substring; `%` and `_` are not wildcards.
    pub needle: String,
    #[command(flatten)]
    pub selection: SelectionArgs,
}

impl Renderable for User {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        pretty_section(w, &format!("User {}", self.id))?;
        pretty_kv(w, "name", &self.name)?;
        pretty_kv(w, "email", &self.email)?;
        if let Some(dob) = self.dob {
            pretty_kv(w, "dob", dob.to_string())?;
        }
        if self.rewards().is_empty() {
            pretty_kv(w, "rewards", "none")?;
        } else {
            writeln!(w, "rewards:")?;
            for (reward, status) in self.rewards().iter() {
                writeln!(w, "  #{:<8} {status}", reward.to_string())?;
            }
        }
        writeln!(w)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        let dob = self.dob.map_or_else(|| "-".to_string(), |d| d.to_string());
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}",
            self.id,
            self.name,
            self.email,
            dob,
            self.rewards().len()
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["ID", "NAME", "EMAIL", "DOB", "REWARDS"]
    }
}

/// Execute `perks user <command>`.
///
/// Field lists, search columns, and user references are validated before the
/// store is opened.
///
/// # Errors
///
/// Returns an error if validation fails, the store is unavailable, the
/// target user is missing, or output rendering fails.
pub fn run_user(args: &UserArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    match &args.command {
        UserCommand::Create(create) => {
            let store = super::open_store(output, project_root)?;
            let user = store
                .create_user(&NewUser {
                    name: create.name.clone(),
                    email: create.email.clone(),
                    dob: create.dob,
                })
                .or_render(output)?;
            render_item(&user, output)
        }
        UserCommand::Show(show) => {
            let user_ref = show.user.parse::<UserRef>().or_render(output)?;
            let store = super::open_store(output, project_root)?;
            let user = store.find_user(&user_ref).or_render(output)?;
            render_item(&user, output)
        }
        UserCommand::Find(find) => {
            let user_ref = find.user.parse::<UserRef>().or_render(output)?;
            let selection = UserSelection::parse(&find.selection.fields, find.selection.resolve)
                .or_render(output)?;
            let store = super::open_store(output, project_root)?;
            let row = store.read_user(&user_ref, &selection).or_render(output)?;
            render_row(output, &selection.output_names(), &row)
        }
        UserCommand::Update(update) => {
            let patch = UserPatch {
                name: update.name.clone(),
                email: update.email.clone(),
                dob: if update.clear_dob {
                    Some(None)
                } else {
                    update.dob.map(Some)
                },
            };
            let store = super::open_store(output, project_root)?;
            let user = store.update_user(update.id, &patch).or_render(output)?;
            render_item(&user, output)
        }
        UserCommand::Delete(delete) => {
            let store = super::open_store(output, project_root)?;
            store.delete_user(delete.id).or_render(output)?;
            render_success(output, &format!("deleted user {}", delete.id))
        }
        UserCommand::List => {
            let store = super::open_store(output, project_root)?;
            let users = store.list_users().or_render(output)?;
            render_list(&users, output)
        }
        UserCommand::Search(search) => {
            let column = validate_column::<UserSearchColumn>(&search.column).or_render(output)?;
            let selection =
                UserSelection::parse(&search.selection.fields, search.selection.resolve)
                    .or_render(output)?;
            let store = super::open_store(output, project_root)?;
            let rows = store
                .search_users(column, &search.needle, &selection)
                .or_render(output)?;
            render_rows(output, &selection.output_names(), &rows)
        }
    }
}
