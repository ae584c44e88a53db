use crate::model::{LearningSituation, PlanningUnit};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const UNNAMED_SITUATION: &str = "Unnamed situation";

/// Highest slot index a plan may use. Indices above it are rejected at the
/// IPC boundary and ignored when the sequence is built.
pub const MAX_UNIT_INDEX: u32 = 999;

/// Spacing of automatically dated units. Each new unit starts
/// `cadence_days` after the previous one and lasts `span_days` more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitCadence {
    pub cadence_days: i64,
    pub span_days: i64,
}

impl Default for UnitCadence {
    fn default() -> Self {
        Self {
            cadence_days: 14,
            span_days: 13,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateWindow {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotSituation {
    pub id: String,
    pub title: String,
    pub description: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Slot {
    #[serde(rename_all = "camelCase")]
    Filled {
        index: u32,
        unit_id: Option<String>,
        situation: SlotSituation,
    },
    #[serde(rename_all = "camelCase")]
    Empty {
        index: u32,
        unit: Option<PlanningUnit>,
    },
}

impl Slot {
    pub fn index(&self) -> u32 {
        match self {
            Slot::Filled { index, .. } | Slot::Empty { index, .. } => *index,
        }
    }

    pub fn is_filled(&self) -> bool {
        matches!(self, Slot::Filled { .. })
    }
}

/// Units ordered by `unit_number`. The sort is stable, so among records
/// sharing a number the earliest in input order comes first.
fn sorted_units(planning_units: &[PlanningUnit]) -> Vec<&PlanningUnit> {
    let mut sorted: Vec<&PlanningUnit> = planning_units.iter().collect();
    sorted.sort_by_key(|u| u.unit_number);
    sorted
}

/// The record that owns slot `index`. With duplicate unit numbers the first
/// record in input order wins.
pub fn unit_at(planning_units: &[PlanningUnit], index: u32) -> Option<&PlanningUnit> {
    planning_units.iter().find(|u| u.unit_number == index)
}

/// Dense slot sequence for a subject's plan: one slot per index from 0 up to
/// one past the highest known unit number, so there is always a trailing
/// empty drop target.
///
/// Units numbered above `MAX_UNIT_INDEX` are left out, and the sequence never
/// extends past that index, so a plan filled up to the cap has no trailing
/// slot.
pub fn build_unit_sequence(planning_units: &[PlanningUnit]) -> Vec<Slot> {
    let mut sorted = sorted_units(planning_units);
    sorted.retain(|u| u.unit_number <= MAX_UNIT_INDEX);
    let last_index = sorted
        .last()
        .map(|u| u.unit_number.saturating_add(1))
        .unwrap_or(0)
        .min(MAX_UNIT_INDEX);
    let slot_count = last_index + 1;

    let mut slots = Vec::with_capacity(slot_count as usize);
    let mut cursor = sorted.into_iter().peekable();
    for index in 0..slot_count {
        let mut owner: Option<&PlanningUnit> = None;
        while let Some(unit) = cursor.next_if(|u| u.unit_number == index) {
            owner.get_or_insert(unit);
        }
        let slot = match owner {
            Some(unit) => match unit.learning_situation.as_ref() {
                Some(situation_id) => {
                    let details = unit.learning_situation_details.as_ref();
                    Slot::Filled {
                        index,
                        unit_id: unit.id.clone(),
                        situation: SlotSituation {
                            id: situation_id.clone(),
                            title: details
                                .map(|d| d.title.clone())
                                .filter(|t| !t.is_empty())
                                .unwrap_or_else(|| UNNAMED_SITUATION.to_string()),
                            description: details
                                .map(|d| d.description.clone())
                                .unwrap_or_default(),
                            start_date: unit.start_date,
                            end_date: unit.end_date,
                        },
                    }
                }
                None => Slot::Empty {
                    index,
                    unit: Some(unit.clone()),
                },
            },
            None => Slot::Empty { index, unit: None },
        };
        slots.push(slot);
    }
    slots
}

/// Default calendar window for a unit placed at `index`, counted from
/// `today` rather than from a term start. `None` when the window falls
/// outside the representable calendar.
pub fn default_unit_window(today: NaiveDate, index: u32, cadence: &UnitCadence) -> Option<DateWindow> {
    let offset = i64::from(index).checked_mul(cadence.cadence_days)?;
    let start_date = today.checked_add_signed(Duration::try_days(offset)?)?;
    let end_date = start_date.checked_add_signed(Duration::try_days(cadence.span_days)?)?;
    Some(DateWindow {
        start_date,
        end_date,
    })
}

/// One entry of a bulk planning-unit update, keyed by unit number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitUpsert {
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
}

/// Upsert that places `situation_id` into slot `index`.
///
/// A slot without a record, or whose record lacks either date, gets the
/// default window. A fully dated record keeps its dates, title and notes.
/// `None` when the default window cannot be computed.
pub fn plan_assignment(
    planning_units: &[PlanningUnit],
    index: u32,
    situation_id: &str,
    today: NaiveDate,
    cadence: &UnitCadence,
) -> Option<UnitUpsert> {
    let existing = unit_at(planning_units, index);
    let (start_date, end_date) = match existing {
        Some(PlanningUnit {
            start_date: Some(start),
            end_date: Some(end),
            ..
        }) => (*start, *end),
        _ => {
            let window = default_unit_window(today, index, cadence)?;
            (window.start_date, window.end_date)
        }
    };
    Some(UnitUpsert {
        unit_number: index,
        learning_situation: Some(situation_id.to_string()),
        start_date: Some(start_date),
        end_date: Some(end_date),
        title: existing.and_then(|u| u.title.clone()),
        notes: existing.and_then(|u| u.notes.clone()),
    })
}

fn check_date_order(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<(), String> {
    match (start, end) {
        (Some(s), Some(e)) if e < s => Err(format!(
            "endDate {} is before startDate {}",
            e.format("%Y-%m-%d"),
            s.format("%Y-%m-%d")
        )),
        _ => Ok(()),
    }
}

/// Rejects an upsert whose unit number is above `MAX_UNIT_INDEX` or whose
/// end date precedes its start date.
pub fn validate_upsert(upsert: &UnitUpsert) -> Result<(), String> {
    if upsert.unit_number > MAX_UNIT_INDEX {
        return Err(format!(
            "unitNumber {} exceeds {}",
            upsert.unit_number, MAX_UNIT_INDEX
        ));
    }
    check_date_order(upsert.start_date, upsert.end_date)
}

/// Detach the learning situation; the record and its dates stay.
pub fn clear_situation(unit: &PlanningUnit) -> PlanningUnit {
    PlanningUnit {
        learning_situation: None,
        learning_situation_details: None,
        ..unit.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum RemovalAction {
    #[serde(rename = "deleted", rename_all = "camelCase")]
    DeleteRecord { unit_id: String },
    RemovedFromView,
}

/// What removing slot `index` means: delete the persisted record if there is
/// one, otherwise the slot only existed in the view.
pub fn plan_removal(planning_units: &[PlanningUnit], index: u32) -> RemovalAction {
    match unit_at(planning_units, index).and_then(|u| u.id.clone()) {
        Some(unit_id) => RemovalAction::DeleteRecord { unit_id },
        None => RemovalAction::RemovedFromView,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateField {
    Start,
    End,
}

impl DateField {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "startDate" | "start_date" => Some(Self::Start),
            "endDate" | "end_date" => Some(Self::End),
            _ => None,
        }
    }
}

/// Sets one bound of the unit's window. Fails when the edit would leave the
/// end before the start.
pub fn apply_date_edit(unit: &PlanningUnit, field: DateField, date: NaiveDate) -> Result<PlanningUnit, String> {
    let mut out = unit.clone();
    match field {
        DateField::Start => out.start_date = Some(date),
        DateField::End => out.end_date = Some(date),
    }
    check_date_order(out.start_date, out.end_date)?;
    Ok(out)
}

/// Learning situations not yet placed in any unit, in input order.
pub fn available_situations<'a>(
    learning_situations: &'a [LearningSituation],
    planning_units: &[PlanningUnit],
) -> Vec<&'a LearningSituation> {
    let planned: HashSet<&str> = planning_units
        .iter()
        .filter_map(|u| u.learning_situation.as_deref())
        .collect();
    learning_situations
        .iter()
        .filter(|ls| !planned.contains(ls.id.as_str()))
        .collect()
}
