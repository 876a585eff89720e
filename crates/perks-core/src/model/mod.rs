//! Domain records: users, rewards, and the per-user reward lifecycle.

pub mod reward;
pub mod reward_state;
pub mod user;

pub use reward::{NewReward, Reward, RewardPatch};
pub use reward_state::{RewardId, RewardStates, RewardStatus, Transition, is_expired};
pub use user::{NewUser, User, UserPatch, UserRef, validate_email};
