//! Registry wire shapes and their translation into [`TeamRecord`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{FoodStatus, MealSlot, TeamMember, TeamRecord};

/// Team leader as the registry reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryLead {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Team member as the registry reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryMember {
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Body of `GET /verify/{teamCode}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryTeam {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub team_code: Option<String>,
    pub team_name: String,
    pub lead: RegistryLead,
    #[serde(default)]
    pub members: Vec<RegistryMember>,
    #[serde(default)]
    pub total_members: Option<u32>,
    #[serde(default)]
    pub attendance: Option<bool>,
    #[serde(default)]
    pub present_members: Option<Vec<String>>,
    #[serde(default)]
    pub food_status: Option<FoodStatus>,
}

impl From<RegistryTeam> for TeamRecord {
    fn from(wire: RegistryTeam) -> Self {
        let members: Vec<TeamMember> = wire
            .members
            .into_iter()
            .map(|m| TeamMember {
                name: m.full_name,
                email: m.email,
                phone: m.phone,
            })
            .collect();

        let mut team = TeamRecord {
            team_id: wire.id,
            team_code: wire.team_code.unwrap_or_default(),
            team_name: wire.team_name,
            leader: TeamMember {
                name: wire.lead.name,
                email: wire.lead.email,
                phone: wire.lead.phone,
            },
            members,
            total_members: 0,
            attendance: wire.attendance.unwrap_or(false),
            present_members: wire
                .present_members
                .map(|p| p.into_iter().collect())
                .unwrap_or_else(BTreeSet::new),
            food_status: wire.food_status.unwrap_or_default(),
        };

        let derived = team.roster().len() as u32;
        if let Some(reported) = wire.total_members {
            if reported != derived {
                tracing::warn!(
                    team_id = %team.team_id,
                    reported,
                    derived,
                    "Registry member count disagrees with roster, using roster"
                );
            }
        }
        team.total_members = derived;
        team
    }
}

/// Body of `PATCH /member-attendance`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberAttendanceRequest {
    pub team_code: String,
    pub present_members: Vec<String>,
}

/// Body of `PATCH /food`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodRequest {
    pub team_code: String,
    pub meal_type: MealSlot,
    pub members: Vec<String>,
}
