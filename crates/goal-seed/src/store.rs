//! Goal storage backends
//!
//! `PgGoalStore` writes to the `goal_tracking` table of `goals_db`.
//! `MemoryGoalStore` keeps documents in process and backs the tests.

use async_trait::async_trait;
use chrono::NaiveDate;
use shared::{DbPool, Error, Result};
use sqlx::FromRow;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{Goal, NewGoal};

/// Name of the collection (table) holding goals
pub const GOAL_COLLECTION: &str = "goal_tracking";

/// Storage for goal documents
#[async_trait]
pub trait GoalStore: Send + Sync {
    /// Create the goal collection if it does not exist yet
    async fn ensure_collection(&self) -> Result<()>;

    /// Insert every goal, assigning fresh identifiers. No existence check is made.
    async fn insert_many(&self, goals: &[NewGoal]) -> Result<Vec<Goal>>;

    /// Number of stored goals
    async fn count(&self) -> Result<i64>;

    /// All stored goals in insertion order
    async fn list(&self) -> Result<Vec<Goal>>;
}

#[derive(Debug, FromRow)]
struct GoalRow {
    goal_id: String,
    title: String,
    description: String,
    target_date: NaiveDate,
    status: String,
    category: String,
}

impl TryFrom<GoalRow> for Goal {
    type Error = Error;

    fn try_from(row: GoalRow) -> Result<Self> {
        Ok(Self {
            goal_id: row.goal_id,
            title: row.title,
            description: row.description,
            target_date: row.target_date,
            status: row.status.parse()?,
            category: row.category,
        })
    }
}

/// PostgreSQL-backed goal store
pub struct PgGoalStore {
    pool: DbPool,
}

impl PgGoalStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GoalStore for PgGoalStore {
    async fn ensure_collection(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS goal_tracking (
                seq BIGSERIAL UNIQUE,
                goal_id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                target_date DATE NOT NULL,
                status TEXT NOT NULL,
                category TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        tracing::debug!(collection = GOAL_COLLECTION, "Collection ensured");
        Ok(())
    }

    async fn insert_many(&self, goals: &[NewGoal]) -> Result<Vec<Goal>> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = Vec::with_capacity(goals.len());

        for goal in goals {
            let row = sqlx::query_as::<_, GoalRow>(
                r#"
                INSERT INTO goal_tracking (goal_id, title, description, target_date, status, category)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING goal_id, title, description, target_date, status, category
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&goal.title)
            .bind(&goal.description)
            .bind(goal.target_date)
            .bind(goal.status.as_str())
            .bind(&goal.category)
            .fetch_one(&mut *tx)
            .await?;

            inserted.push(Goal::try_from(row)?);
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn count(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM goal_tracking")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn list(&self) -> Result<Vec<Goal>> {
        let rows = sqlx::query_as::<_, GoalRow>(
            r#"
            SELECT goal_id, title, description, target_date, status, category
            FROM goal_tracking
            ORDER BY seq
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Goal::try_from).collect()
    }
}

/// In-process goal store
#[derive(Default)]
pub struct MemoryGoalStore {
    collection: Mutex<Option<Vec<Goal>>>,
}

impl MemoryGoalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GoalStore for MemoryGoalStore {
    async fn ensure_collection(&self) -> Result<()> {
        let mut collection = self.collection.lock().await;
        if collection.is_none() {
            *collection = Some(Vec::new());
        }
        Ok(())
    }

    async fn insert_many(&self, goals: &[NewGoal]) -> Result<Vec<Goal>> {
        let mut collection = self.collection.lock().await;
        let docs = collection
            .as_mut()
            .ok_or_else(|| Error::not_found("Collection", GOAL_COLLECTION))?;

        let inserted: Vec<Goal> = goals
            .iter()
            .cloned()
            .map(|goal| Goal::from_new(Uuid::new_v4().to_string(), goal))
            .collect();
        docs.extend(inserted.iter().cloned());
        Ok(inserted)
    }

    async fn count(&self) -> Result<i64> {
        let collection = self.collection.lock().await;
        Ok(collection.as_ref().map_or(0, |docs| docs.len() as i64))
    }

    async fn list(&self) -> Result<Vec<Goal>> {
        let collection = self.collection.lock().await;
        Ok(collection.clone().unwrap_or_default())
    }
}
