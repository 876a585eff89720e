//! `perks apply|revoke|claim <reward-id> <user>` — reward lifecycle transitions.

use crate::output::{OrRender, OutputMode, pretty_kv, render_mode};
use chrono::Utc;
use clap::Args;
use perks_core::TransitionOutcome;
use perks_core::model::{RewardId, UserRef};
use std::fmt;
use std::path::Path;

/// Arguments shared by `apply`, `revoke`, and `claim`.
#[derive(Args, Debug)]
pub struct LifecycleArgs {
    /// Reward id.
    pub reward: i64,
    /// Numeric user id or email address.
    pub user: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOp {
    Apply,
    Revoke,
    Claim,
}

impl LifecycleOp {
    const fn past_tense(self) -> &'static str {
        match self {
            Self::Apply => "applied",
            Self::Revoke => "revoked",
            Self::Claim => "claimed",
        }
    }
}

impl fmt::Display for LifecycleOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Apply => "apply",
            Self::Revoke => "revoke",
            Self::Claim => "claim",
        })
    }
}

/// Run one lifecycle transition against the project store.
///
/// The user reference is parsed before the store is opened. Claims are
/// checked against the current wall-clock time.
///
/// # Errors
///
/// Returns an error if the user reference is malformed, the store is
/// unavailable, the user or reward is missing, or the transition is rejected.
pub fn run_lifecycle(
    op: LifecycleOp,
    args: &LifecycleArgs,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let user = args.user.parse::<UserRef>().or_render(output)?;
    let reward = RewardId::new(args.reward);
    let mut store = super::open_store(output, project_root)?;

    let outcome = match op {
        LifecycleOp::Apply => store.apply_reward(reward, &user),
        LifecycleOp::Revoke => store.revoke_reward(reward, &user),
        LifecycleOp::Claim => store.claim_reward(reward, &user, Utc::now()),
    }
    .or_render(output)?;

    render_outcome(op, &outcome, output)
}

fn render_outcome(
    op: LifecycleOp,
    outcome: &TransitionOutcome,
    output: OutputMode,
) -> anyhow::Result<()> {
    render_mode(
        output,
        outcome,
        |o, w| writeln!(w, "{op}\t{}\t{}\t{}", o.reward, o.user, o.status),
        |o, w| {
            writeln!(w, "✓ reward {} {} for user {}", o.reward, op.past_tense(), o.user)?;
            pretty_kv(w, "status", o.status.as_str())
        },
    )
}
