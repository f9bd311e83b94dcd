//! Goal documents stored in `goal_tracking`

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use shared::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a goal, stored as kebab-case text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GoalStatus {
    InProgress,
    Completed,
    Pending,
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalStatus::InProgress => "in-progress",
            GoalStatus::Completed => "completed",
            GoalStatus::Pending => "pending",
        }
    }
}

impl fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GoalStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "in-progress" => Ok(GoalStatus::InProgress),
            "completed" => Ok(GoalStatus::Completed),
            "pending" => Ok(GoalStatus::Pending),
            other => Err(Error::validation(format!("Unknown goal status: {}", other))),
        }
    }
}

/// A goal before it has been assigned an identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGoal {
    pub title: String,
    pub description: String,
    pub target_date: NaiveDate,
    pub status: GoalStatus,
    pub category: String,
}

/// A stored goal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub goal_id: String,
    pub title: String,
    pub description: String,
    pub target_date: NaiveDate,
    pub status: GoalStatus,
    pub category: String,
}

impl Goal {
    /// Attach an identifier to a new goal
    pub fn from_new(goal_id: String, new: NewGoal) -> Self {
        Self {
            goal_id,
            title: new.title,
            description: new.description,
            target_date: new.target_date,
            status: new.status,
            category: new.category,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_text_round_trips() {
        for status in [GoalStatus::InProgress, GoalStatus::Completed, GoalStatus::Pending] {
            assert_eq!(status.as_str().parse::<GoalStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_unknown_status_rejected() {
        assert!("IN_PROGRESS".parse::<GoalStatus>().is_err());
        assert!("done".parse::<GoalStatus>().is_err());
    }

    #[test]
    fn test_goal_serializes_with_document_field_names() {
        let goal = Goal {
            goal_id: "g-1".to_string(),
            title: "Meditate Daily".to_string(),
            description: "Practice mindfulness meditation for 10 minutes".to_string(),
            target_date: NaiveDate::from_ymd_opt(2025, 12, 31).unwrap(),
            status: GoalStatus::InProgress,
            category: "mindfulness".to_string(),
        };

        let json = serde_json::to_value(&goal).unwrap();
        assert_eq!(json["goalId"], "g-1");
        assert_eq!(json["targetDate"], "2025-12-31");
        assert_eq!(json["status"], "in-progress");
    }
}
