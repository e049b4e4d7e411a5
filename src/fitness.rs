use crate::conflict::{self, ConflictReport};
use crate::data::{Constraints, ScheduleEntry, SchedulingSnapshot, SubjectId, TeacherId};
use itertools::Itertools;
use std::collections::{HashMap, HashSet};

/// Scoring outcome for one candidate. `raw` is the unclamped score used to
/// rank candidates against each other; `fitness` is the reported 0-100 value.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub raw: f64,
    pub fitness: f64,
    pub report: ConflictReport,
}

const HARD_CONFLICT_PENALTY: f64 = 10.0;
const COVERAGE_CREDIT: f64 = 1.0;
const PREFERRED_SLOT_BONUS: f64 = 2.0;

/// Scores a candidate. Stateless and deterministic: identical inputs always
/// produce identical scores, so candidates can be compared fairly across
/// strategies and assertions can be exact.
///
/// Committed out-of-scope entries participate in conflict detection only;
/// the distribution/workload/preference terms score the candidate itself.
pub fn evaluate(
    entries: &[ScheduleEntry],
    snapshot: &SchedulingSnapshot,
    constraints: &Constraints,
) -> Evaluation {
    let report = conflict::check(entries, &snapshot.existing, &snapshot.classes, constraints);

    let raw = COVERAGE_CREDIT * entries.len() as f64
        + distribution_score(entries, snapshot)
        + workload_score(entries, snapshot)
        + preference_score(entries, constraints)
        - HARD_CONFLICT_PENALTY * report.hard_error_count() as f64;

    Evaluation {
        raw,
        fitness: raw.clamp(0.0, 100.0),
        report,
    }
}

/// Per class-day: +5 when the number of distinct subjects lands in [4, 6],
/// -3 below 3, -2 above 7. The under-spread penalty is waived for classes
/// whose assigned subject pool could never reach 3 distinct subjects a day.
fn distribution_score(entries: &[ScheduleEntry], snapshot: &SchedulingSnapshot) -> f64 {
    let mut assigned_subjects: HashMap<u32, HashSet<SubjectId>> = HashMap::new();
    for a in &snapshot.assignments {
        assigned_subjects
            .entry(a.class_id)
            .or_default()
            .insert(a.subject_id);
    }

    let mut per_class_day: HashMap<(u32, u8), HashSet<SubjectId>> = HashMap::new();
    for e in entries {
        per_class_day
            .entry((e.class_id, e.day))
            .or_default()
            .insert(e.subject_id);
    }

    let mut score = 0.0;
    for ((class_id, _day), subjects) in per_class_day {
        let assigned = assigned_subjects
            .get(&class_id)
            .map(HashSet::len)
            .unwrap_or(0);
        match subjects.len() {
            4..=6 => score += 5.0,
            n if n < 3 && assigned >= 3 => score -= 3.0,
            n if n > 7 => score -= 2.0,
            _ => {}
        }
    }
    score
}

/// Per teacher-day: +3 for a balanced load of 3-6 periods, -5 above 7,
/// -2 below 2. The underload penalty is waived for teachers whose weekly
/// assigned hours cannot reach 2 in the first place.
fn workload_score(entries: &[ScheduleEntry], snapshot: &SchedulingSnapshot) -> f64 {
    let mut weekly_hours: HashMap<TeacherId, u32> = HashMap::new();
    for a in &snapshot.assignments {
        *weekly_hours.entry(a.teacher_id).or_default() += u32::from(a.credit_hours);
    }

    let per_teacher_day = entries
        .iter()
        .map(|e| ((e.teacher_id, e.day), e))
        .into_group_map();

    let mut score = 0.0;
    for ((teacher_id, _day), lessons) in per_teacher_day {
        let assigned = weekly_hours.get(&teacher_id).copied().unwrap_or(0);
        match lessons.len() {
            3..=6 => score += 3.0,
            n if n > 7 => score -= 5.0,
            n if n < 2 && assigned >= 2 => score -= 2.0,
            _ => {}
        }
    }
    score
}

/// +2 for every entry sitting in one of its subject's preferred periods.
fn preference_score(entries: &[ScheduleEntry], constraints: &Constraints) -> f64 {
    entries
        .iter()
        .filter(|e| {
            constraints
                .preferred_time_slots
                .get(&e.subject_id)
                .is_some_and(|periods| periods.contains(&e.period))
        })
        .count() as f64
        * PREFERRED_SLOT_BONUS
}
