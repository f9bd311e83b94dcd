//! Seed behaviour against the in-process store

use chrono::NaiveDate;
use goal_seed::{seed, GoalStatus, GoalStore, MemoryGoalStore, SeedMode};

#[tokio::test]
async fn test_single_run_inserts_the_two_literal_goals() {
    let store = MemoryGoalStore::new();

    let report = seed(&store, SeedMode::Always).await.unwrap();
    assert_eq!(report.inserted, 2);
    assert_eq!(report.total, 2);
    assert!(!report.skipped);

    let goals = store.list().await.unwrap();
    assert_eq!(goals.len(), 2);

    let meditate = &goals[0];
    assert_eq!(meditate.title, "Meditate Daily");
    assert_eq!(
        meditate.description,
        "Practice mindfulness meditation for 10 minutes"
    );
    assert_eq!(meditate.status, GoalStatus::InProgress);
    assert_eq!(meditate.category, "mindfulness");

    let exercise = &goals[1];
    assert_eq!(exercise.title, "Exercise Weekly");
    assert_eq!(exercise.description, "Complete 3 workout sessions per week");
    assert_eq!(exercise.status, GoalStatus::InProgress);
    assert_eq!(exercise.category, "fitness");
}

#[tokio::test]
async fn test_second_run_duplicates_documents() {
    let store = MemoryGoalStore::new();

    seed(&store, SeedMode::Always).await.unwrap();
    let report = seed(&store, SeedMode::Always).await.unwrap();

    assert_eq!(report.inserted, 2);
    assert_eq!(report.total, 4);

    let goals = store.list().await.unwrap();
    let meditate_count = goals.iter().filter(|g| g.title == "Meditate Daily").count();
    assert_eq!(meditate_count, 2);
}

#[tokio::test]
async fn test_if_empty_guard_skips_populated_collection() {
    let store = MemoryGoalStore::new();

    seed(&store, SeedMode::IfEmpty).await.unwrap();
    let report = seed(&store, SeedMode::IfEmpty).await.unwrap();

    assert!(report.skipped);
    assert_eq!(report.inserted, 0);
    assert_eq!(report.total, 2);
    assert_eq!(store.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_target_dates_are_new_years_eve_2025() {
    let store = MemoryGoalStore::new();
    seed(&store, SeedMode::Always).await.unwrap();

    let expected = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
    for goal in store.list().await.unwrap() {
        assert_eq!(goal.target_date, expected);
        let json = serde_json::to_value(&goal).unwrap();
        assert_eq!(json["targetDate"], "2025-12-31");
    }
}
