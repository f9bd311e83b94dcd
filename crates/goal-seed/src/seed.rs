//! Starter goals for a fresh `goals_db`

use chrono::NaiveDate;
use serde::Serialize;
use shared::{Error, Result};

use crate::models::{GoalStatus, NewGoal};
use crate::store::{GoalStore, GOAL_COLLECTION};

/// Target date shared by both starter goals
const SEED_TARGET_DATE: &str = "2025-12-31";

/// How the seed treats an already populated collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeedMode {
    /// Insert unconditionally. Every run adds another two documents.
    #[default]
    Always,
    /// Insert only when the collection holds no documents
    IfEmpty,
}

/// Outcome of a seed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    /// Documents inserted by this run
    pub inserted: usize,
    /// Documents in the collection after the run
    pub total: i64,
    /// True when `IfEmpty` found existing documents
    pub skipped: bool,
}

/// The two starter goals, with their literal field values
pub fn seed_documents() -> Result<Vec<NewGoal>> {
    let target_date = NaiveDate::parse_from_str(SEED_TARGET_DATE, "%Y-%m-%d")
        .map_err(|e| Error::internal(format!("Invalid seed target date: {}", e)))?;

    Ok(vec![
        NewGoal {
            title: "Meditate Daily".to_string(),
            description: "Practice mindfulness meditation for 10 minutes".to_string(),
            target_date,
            status: GoalStatus::InProgress,
            category: "mindfulness".to_string(),
        },
        NewGoal {
            title: "Exercise Weekly".to_string(),
            description: "Complete 3 workout sessions per week".to_string(),
            target_date,
            status: GoalStatus::InProgress,
            category: "fitness".to_string(),
        },
    ])
}

/// Create the goal collection and insert the starter goals
///
/// With [`SeedMode::Always`] no existence check precedes the insert, so a
/// second run duplicates the documents.
///
/// # Errors
///
/// Returns an error if the store is unreachable or rejects the insert.
pub async fn seed<S>(store: &S, mode: SeedMode) -> Result<SeedReport>
where
    S: GoalStore + ?Sized,
{
    store.ensure_collection().await?;

    if mode == SeedMode::IfEmpty {
        let existing = store.count().await?;
        if existing > 0 {
            tracing::info!(
                collection = GOAL_COLLECTION,
                existing,
                "Collection already populated, skipping seed"
            );
            return Ok(SeedReport {
                inserted: 0,
                total: existing,
                skipped: true,
            });
        }
    }

    let inserted = store.insert_many(&seed_documents()?).await?;
    let total = store.count().await?;

    for goal in &inserted {
        tracing::debug!(goal_id = %goal.goal_id, title = %goal.title, "Inserted goal");
    }
    tracing::info!(inserted = inserted.len(), total, "Goals database initialized");

    Ok(SeedReport {
        inserted: inserted.len(),
        total,
        skipped: false,
    })
}
