use crate::model::{Competence, Criterion, LearningSituation, Module};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageStatus {
    NotCovered,
    PartiallyCovered,
    FullyCovered,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetenceCoverage {
    pub competence_id: String,
    pub competence_code: String,
    pub total_criteria_count: usize,
    pub covered_criteria_count: usize,
    pub coverage_percentage: f64,
    pub status: CoverageStatus,
    pub is_addressed: bool,
    pub covered_criteria_ids: BTreeSet<String>,
    pub missing_criteria: Vec<Criterion>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageStats {
    pub total_competences: usize,
    pub fully_covered_count: usize,
    pub partially_covered_count: usize,
    pub uncovered_count: usize,
    pub total_criteria: usize,
    pub total_covered_criteria: usize,
    pub overall_coverage_percentage: f64,
    /// Share of competences that are fully covered, rounded to a whole percent.
    pub competences_percentage: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageReport {
    pub per_competence: Vec<CompetenceCoverage>,
    pub stats: CoverageStats,
}

fn resolved_modules(learning_situations: &[LearningSituation]) -> Vec<&Module> {
    learning_situations
        .iter()
        .flat_map(|ls| ls.modules.iter())
        .filter_map(|m| m.resolved())
        .collect()
}

fn competence_coverage(competence: &Competence, modules: &[&Module]) -> CompetenceCoverage {
    let known: BTreeSet<&str> = competence
        .evaluation_criteria
        .iter()
        .map(|c| c.id.as_str())
        .collect();

    let mut is_addressed = false;
    let mut covered: BTreeSet<String> = BTreeSet::new();
    for module in modules.iter().filter(|m| m.addresses(&competence.id)) {
        is_addressed = true;
        covered.extend(
            module
                .criteria_for(&competence.id)
                .iter()
                .filter(|id| known.contains(id.as_str()))
                .cloned(),
        );
    }

    let total = competence.evaluation_criteria.len();
    let covered_count = covered.len();
    let (status, coverage_percentage) = if !is_addressed {
        (CoverageStatus::NotCovered, 0.0)
    } else if total == 0 {
        // Nothing to partially satisfy: being addressed is full coverage.
        (CoverageStatus::FullyCovered, 100.0)
    } else if covered_count == 0 {
        (CoverageStatus::NotCovered, 0.0)
    } else if covered_count == total {
        (CoverageStatus::FullyCovered, 100.0)
    } else {
        (
            CoverageStatus::PartiallyCovered,
            100.0 * covered_count as f64 / total as f64,
        )
    };

    let missing_criteria = competence
        .evaluation_criteria
        .iter()
        .filter(|c| !covered.contains(&c.id))
        .cloned()
        .collect();

    CompetenceCoverage {
        competence_id: competence.id.clone(),
        competence_code: competence.code.clone(),
        total_criteria_count: total,
        covered_criteria_count: covered_count,
        coverage_percentage,
        status,
        is_addressed,
        covered_criteria_ids: covered,
        missing_criteria,
    }
}

fn summarize(per_competence: &[CompetenceCoverage]) -> CoverageStats {
    let count = |status: CoverageStatus| per_competence.iter().filter(|c| c.status == status).count();
    let total_competences = per_competence.len();
    let fully_covered_count = count(CoverageStatus::FullyCovered);
    let total_criteria: usize = per_competence.iter().map(|c| c.total_criteria_count).sum();
    let total_covered_criteria: usize = per_competence
        .iter()
        .map(|c| c.covered_criteria_count)
        .sum();
    let overall_coverage_percentage = if total_criteria > 0 {
        100.0 * total_covered_criteria as f64 / total_criteria as f64
    } else {
        0.0
    };
    let competences_percentage = if total_competences > 0 {
        (100.0 * fully_covered_count as f64 / total_competences as f64).round() as i64
    } else {
        0
    };

    CoverageStats {
        total_competences,
        fully_covered_count,
        partially_covered_count: count(CoverageStatus::PartiallyCovered),
        uncovered_count: count(CoverageStatus::NotCovered),
        total_criteria,
        total_covered_criteria,
        overall_coverage_percentage,
        competences_percentage,
    }
}

/// Which of `all_competences` the given learning situations cover, and how
/// much of each competence's evaluation criteria.
///
/// Only criterion ids the competence itself lists count as covered; a
/// selection naming a retired criterion is ignored, which keeps every
/// percentage within 0..=100.
///
/// Module entries that are still bare ids are skipped. Every competence is
/// evaluated independently against the flattened module list, so duplicate
/// modules do not change the result.
pub fn compute_coverage(
    all_competences: &[Competence],
    learning_situations: &[LearningSituation],
) -> CoverageReport {
    if all_competences.is_empty() {
        return CoverageReport::default();
    }
    let modules = resolved_modules(learning_situations);
    let per_competence: Vec<CompetenceCoverage> = all_competences
        .iter()
        .map(|c| competence_coverage(c, &modules))
        .collect();
    let stats = summarize(&per_competence);
    CoverageReport {
        per_competence,
        stats,
    }
}

/// Competences a module addresses, in `all_competences` order. Returns new
/// values; the fetched module is left untouched.
pub fn module_competence_details(module: &Module, all_competences: &[Competence]) -> Vec<Competence> {
    all_competences
        .iter()
        .filter(|c| module.addresses(&c.id))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RadarGeometry {
    pub center: f64,
    pub max_radius: f64,
    pub label_offset: f64,
}

impl Default for RadarGeometry {
    fn default() -> Self {
        Self {
            center: 175.0,
            max_radius: 120.0,
            label_offset: 40.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RadarPoint {
    pub index: usize,
    pub competence_id: String,
    pub angle: f64,
    pub radius: f64,
    pub x: f64,
    pub y: f64,
    pub label_x: f64,
    pub label_y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridRing {
    pub radius: f64,
    pub percentage: f64,
}

/// Polygon vertices for the radar chart: first competence at the top, then
/// clockwise. An empty slice yields no points.
pub fn radar_points(per_competence: &[CompetenceCoverage], geometry: &RadarGeometry) -> Vec<RadarPoint> {
    let n = per_competence.len();
    if n == 0 {
        return Vec::new();
    }
    let step = 2.0 * PI / n as f64;
    let label_radius = geometry.max_radius + geometry.label_offset;
    per_competence
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let angle = i as f64 * step - PI / 2.0;
            let radius = (c.coverage_percentage / 100.0) * geometry.max_radius;
            RadarPoint {
                index: i,
                competence_id: c.competence_id.clone(),
                angle,
                radius,
                x: geometry.center + radius * angle.cos(),
                y: geometry.center + radius * angle.sin(),
                label_x: geometry.center + label_radius * angle.cos(),
                label_y: geometry.center + label_radius * angle.sin(),
            }
        })
        .collect()
}

pub fn grid_rings(geometry: &RadarGeometry, levels: u32) -> Vec<GridRing> {
    (1..=levels)
        .map(|i| {
            let frac = i as f64 / levels as f64;
            GridRing {
                radius: frac * geometry.max_radius,
                percentage: frac * 100.0,
            }
        })
        .collect()
}
