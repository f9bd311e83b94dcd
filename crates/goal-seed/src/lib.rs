//! Goal seed library
//!
//! Populates the `goal_tracking` collection of `goals_db` with the two
//! starter goals every fresh environment ships with.

pub mod models;
pub mod seed;
pub mod store;

pub use models::{Goal, GoalStatus, NewGoal};
pub use seed::{seed, seed_documents, SeedMode, SeedReport};
pub use store::{GoalStore, MemoryGoalStore, PgGoalStore};
