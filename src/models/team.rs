//! Canonical team model resolved from the registry.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

/// One of the tracked meal slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MealSlot {
    Breakfast,
    Lunch,
    Dinner,
}

impl MealSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            MealSlot::Breakfast => "BREAKFAST",
            MealSlot::Lunch => "LUNCH",
            MealSlot::Dinner => "DINNER",
        }
    }
}

/// A person on a team. Identified by email within the team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Emails that already received each meal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct FoodStatus {
    #[serde(default)]
    pub breakfast: BTreeSet<String>,
    #[serde(default)]
    pub lunch: BTreeSet<String>,
    #[serde(default)]
    pub dinner: BTreeSet<String>,
}

impl FoodStatus {
    pub fn served(&self, meal: MealSlot) -> &BTreeSet<String> {
        match meal {
            MealSlot::Breakfast => &self.breakfast,
            MealSlot::Lunch => &self.lunch,
            MealSlot::Dinner => &self.dinner,
        }
    }

    fn served_mut(&mut self, meal: MealSlot) -> &mut BTreeSet<String> {
        match meal {
            MealSlot::Breakfast => &mut self.breakfast,
            MealSlot::Lunch => &mut self.lunch,
            MealSlot::Dinner => &mut self.dinner,
        }
    }
}

/// What a commit marks: attendance, or one meal slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "meal")]
pub enum Target {
    Attendance,
    Meal(MealSlot),
}

/// A write against the registry. Every variant is a set-union.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Commit {
    Attendance { team_code: String, emails: Vec<String> },
    AllPresent { team_code: String },
    Food { team_code: String, meal: MealSlot, emails: Vec<String> },
}

impl Commit {
    pub fn team_code(&self) -> &str {
        match self {
            Commit::Attendance { team_code, .. }
            | Commit::AllPresent { team_code }
            | Commit::Food { team_code, .. } => team_code,
        }
    }
}

/// A team as last resolved from the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamRecord {
    pub team_id: String,
    pub team_code: String,
    pub team_name: String,
    pub leader: TeamMember,
    pub members: Vec<TeamMember>,
    pub total_members: u32,
    pub attendance: bool,
    /// Members checked in individually. `attendance` covers the whole roster.
    #[serde(default)]
    pub present_members: BTreeSet<String>,
    #[serde(default)]
    pub food_status: FoodStatus,
}

impl TeamRecord {
    /// Key the ledger files this team under.
    pub fn ledger_key(&self) -> &str {
        if self.team_code.trim().is_empty() {
            &self.team_id
        } else {
            &self.team_code
        }
    }

    /// Leader first, then members, without repeated emails.
    pub fn roster(&self) -> Vec<&TeamMember> {
        let mut seen = HashSet::new();
        std::iter::once(&self.leader)
            .chain(self.members.iter())
            .filter(|m| seen.insert(m.email.as_str()))
            .collect()
    }

    pub fn is_on_roster(&self, email: &str) -> bool {
        self.leader.email == email || self.members.iter().any(|m| m.email == email)
    }

    pub fn has_attended(&self, email: &str) -> bool {
        self.attendance || self.present_members.contains(email)
    }

    pub fn is_completed(&self, target: Target, email: &str) -> bool {
        match target {
            Target::Attendance => self.has_attended(email),
            Target::Meal(meal) => self.food_status.served(meal).contains(email),
        }
    }

    /// Roster emails still outstanding for `target`.
    pub fn outstanding(&self, target: Target) -> Vec<String> {
        self.roster()
            .into_iter()
            .filter(|m| !self.is_completed(target, &m.email))
            .map(|m| m.email.clone())
            .collect()
    }

    /// Fold a successful commit into this snapshot. Never removes a mark.
    pub fn apply(&mut self, commit: &Commit) {
        match commit {
            Commit::Attendance { emails, .. } => {
                self.present_members.extend(emails.iter().cloned());
            }
            Commit::AllPresent { .. } => self.attendance = true,
            Commit::Food { meal, emails, .. } => {
                self.food_status
                    .served_mut(*meal)
                    .extend(emails.iter().cloned());
            }
        }
    }
}
