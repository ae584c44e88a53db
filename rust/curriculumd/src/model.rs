use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// The system of record sends `null` for empty collections; treat it as empty.
fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Criterion {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Competence {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub description: String,
    #[serde(
        default,
        alias = "evaluation_criteria",
        deserialize_with = "null_as_default"
    )]
    pub evaluation_criteria: Vec<Criterion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(
        default,
        alias = "specific_competences",
        deserialize_with = "null_as_default"
    )]
    pub specific_competences: Vec<String>,
    /// Competence id -> criterion ids selected within that competence.
    #[serde(
        default,
        alias = "selected_criteria",
        deserialize_with = "null_as_default"
    )]
    pub selected_criteria: BTreeMap<String, Vec<String>>,
}

impl Module {
    pub fn addresses(&self, competence_id: &str) -> bool {
        self.specific_competences.iter().any(|c| c == competence_id)
    }

    pub fn criteria_for(&self, competence_id: &str) -> &[String] {
        self.selected_criteria
            .get(competence_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

/// A learning situation's module entry: either the full module or a bare id
/// that the fetch layer has not resolved yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModuleRef {
    Resolved(Module),
    Unresolved(String),
}

impl ModuleRef {
    pub fn id(&self) -> &str {
        match self {
            ModuleRef::Resolved(m) => &m.id,
            ModuleRef::Unresolved(id) => id,
        }
    }

    pub fn resolved(&self) -> Option<&Module> {
        match self {
            ModuleRef::Resolved(m) => Some(m),
            ModuleRef::Unresolved(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningSituation {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub modules: Vec<ModuleRef>,
}

impl LearningSituation {
    pub fn summary(&self) -> SituationSummary {
        SituationSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SituationSummary {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// One term slot of a subject's plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanningUnit {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(alias = "unit_number")]
    pub unit_number: u32,
    #[serde(default, alias = "learning_situation")]
    pub learning_situation: Option<String>,
    #[serde(default, alias = "start_date")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, alias = "end_date")]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(
        default,
        alias = "learning_situation_details",
        skip_serializing_if = "Option::is_none"
    )]
    pub learning_situation_details: Option<SituationSummary>,
}
