use crate::data::{
    Candidate, ClassId, Constraints, Day, Period, ScheduleEntry, SchedulingSnapshot, SubjectId,
    TeacherId,
};
use crate::timegrid;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

/// Remaining weekly demand for one qualification fact.
struct Demand {
    teacher_id: TeacherId,
    subject_id: SubjectId,
    credit_hours: u8,
    remaining: u8,
}

enum FillMode<'r> {
    /// Shuffle the eligible assignments at every slot (injected rng keeps
    /// runs reproducible under a fixed seed).
    Shuffle(&'r mut StdRng),
    /// Keep assignments sorted by weekly hours descending, so the subjects
    /// hardest to place late get the first pick of slots.
    CreditDesc,
}

/// Greedy constraint-satisfaction pass: walks (class, day, period) in order,
/// placing the first randomly-drawn conflict-free assignment at each slot and
/// leaving the slot empty when none qualifies. Produces exactly one candidate.
pub fn greedy_fill(
    snapshot: &SchedulingSnapshot,
    constraints: &Constraints,
    rng: &mut StdRng,
) -> Candidate {
    fill(snapshot, constraints, FillMode::Shuffle(rng))
}

/// Same slot walk as the greedy pass, but assignments are pre-sorted by
/// credit hours descending (most-constrained-first). Fully deterministic.
pub fn heuristic_fill(snapshot: &SchedulingSnapshot, constraints: &Constraints) -> Candidate {
    fill(snapshot, constraints, FillMode::CreditDesc)
}

fn fill(snapshot: &SchedulingSnapshot, constraints: &Constraints, mut mode: FillMode) -> Candidate {
    let mut demands = group_demands(snapshot);
    if matches!(mode, FillMode::CreditDesc) {
        for pool in demands.values_mut() {
            pool.sort_by_key(|d| Reverse(d.credit_hours));
        }
    }

    // Committed entries of out-of-scope classes block slots too.
    let mut teacher_busy: HashSet<(TeacherId, Day, Period)> = HashSet::new();
    let mut room_busy: HashSet<(String, Day, Period)> = HashSet::new();
    let mut class_busy: HashSet<(ClassId, Day, Period)> = HashSet::new();
    for e in &snapshot.existing {
        teacher_busy.insert((e.teacher_id, e.day, e.period));
        if let Some(room) = &e.room_number {
            room_busy.insert((room.clone(), e.day, e.period));
        }
        class_busy.insert((e.class_id, e.day, e.period));
    }

    let mut entries = Vec::new();
    for class in &snapshot.classes {
        let Some(pool) = demands.get_mut(&class.id) else {
            continue;
        };
        for day in 1..=constraints.days_per_week {
            for period in 1..=constraints.max_periods_for(class) {
                if constraints.break_periods.contains(&period) {
                    continue;
                }
                if class_busy.contains(&(class.id, day, period)) {
                    continue;
                }

                let mut eligible: Vec<usize> = pool
                    .iter()
                    .enumerate()
                    .filter(|(_, d)| {
                        d.remaining > 0 && constraints.teacher_available(d.teacher_id, period)
                    })
                    .map(|(i, _)| i)
                    .collect();
                if let FillMode::Shuffle(rng) = &mut mode {
                    eligible.shuffle(*rng);
                }

                let room = class.room_number.as_deref();
                let pick = eligible.into_iter().find(|&i| {
                    let d = &pool[i];
                    !teacher_busy.contains(&(d.teacher_id, day, period))
                        && room.is_none_or(|r| !room_busy.contains(&(r.to_string(), day, period)))
                });
                let Some(i) = pick else {
                    continue; // no conflict-free assignment, slot stays empty
                };

                let demand = &mut pool[i];
                demand.remaining -= 1;
                teacher_busy.insert((demand.teacher_id, day, period));
                if let Some(r) = room {
                    room_busy.insert((r.to_string(), day, period));
                }
                class_busy.insert((class.id, day, period));
                entries.push(ScheduleEntry {
                    school_id: snapshot.school_id,
                    class_id: class.id,
                    subject_id: demand.subject_id,
                    teacher_id: demand.teacher_id,
                    day,
                    period,
                    room_number: class.room_number.clone(),
                    start_time: timegrid::start_time(period),
                    end_time: timegrid::end_time(period),
                });
            }
        }
    }

    Candidate::new(entries)
}

fn group_demands(snapshot: &SchedulingSnapshot) -> HashMap<ClassId, Vec<Demand>> {
    let mut by_class: HashMap<ClassId, Vec<Demand>> = HashMap::new();
    for a in &snapshot.assignments {
        by_class.entry(a.class_id).or_default().push(Demand {
            teacher_id: a.teacher_id,
            subject_id: a.subject_id,
            credit_hours: a.credit_hours,
            remaining: a.credit_hours,
        });
    }
    by_class
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict;
    use crate::data::{ClassInfo, TeacherAssignment};
    use crate::fitness;
    use rand::SeedableRng;

    fn class(id: u32, room: Option<&str>) -> ClassInfo {
        ClassInfo {
            id,
            name: format!("class {id}"),
            room_number: room.map(str::to_string),
            max_periods_per_day: None,
        }
    }

    fn assignment(teacher_id: u32, class_id: u32, subject_id: u32, credit_hours: u8) -> TeacherAssignment {
        TeacherAssignment {
            teacher_id,
            class_id,
            subject_id,
            school_id: 1,
            credit_hours,
        }
    }

    #[test]
    fn places_small_demand_without_conflicts() {
        // One class, two teachers with one single-hour subject each, a whole
        // week of free slots: both lessons land, cleanly, with fitness > 0.
        let snapshot = SchedulingSnapshot {
            school_id: 1,
            classes: vec![class(1, Some("R1"))],
            assignments: vec![assignment(100, 1, 10, 1), assignment(101, 1, 11, 1)],
            existing: Vec::new(),
        };
        let constraints = Constraints {
            max_periods_per_day: 5,
            ..Constraints::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let candidate = greedy_fill(&snapshot, &constraints, &mut rng);
        assert_eq!(candidate.entries.len(), 2);
        let eval = fitness::evaluate(&candidate.entries, &snapshot, &constraints);
        assert!(eval.report.errors.is_empty());
        assert!(eval.fitness > 0.0);
    }

    #[test]
    fn weekly_demand_bounds_placements() {
        let snapshot = SchedulingSnapshot {
            school_id: 1,
            classes: vec![class(1, None)],
            assignments: vec![assignment(100, 1, 10, 2)],
            existing: Vec::new(),
        };
        let mut rng = StdRng::seed_from_u64(5);
        let candidate = greedy_fill(&snapshot, &Constraints::default(), &mut rng);
        assert_eq!(candidate.entries.len(), 2);
    }

    #[test]
    fn fixed_seed_reproduces_the_schedule() {
        let snapshot = SchedulingSnapshot {
            school_id: 1,
            classes: vec![class(1, None), class(2, None)],
            assignments: vec![
                assignment(100, 1, 10, 3),
                assignment(101, 1, 11, 2),
                assignment(100, 2, 10, 3),
                assignment(102, 2, 12, 4),
            ],
            existing: Vec::new(),
        };
        let constraints = Constraints::default();
        let run = || {
            let mut rng = StdRng::seed_from_u64(99);
            greedy_fill(&snapshot, &constraints, &mut rng)
        };
        assert_eq!(run().entries, run().entries);
    }

    #[test]
    fn never_double_books_a_shared_teacher() {
        // Two classes share one teacher and there is exactly one slot:
        // the second class's demand is left unplaced instead of clashing.
        let snapshot = SchedulingSnapshot {
            school_id: 1,
            classes: vec![class(1, None), class(2, None)],
            assignments: vec![assignment(100, 1, 10, 1), assignment(100, 2, 10, 1)],
            existing: Vec::new(),
        };
        let constraints = Constraints {
            max_periods_per_day: 1,
            days_per_week: 1,
            ..Constraints::default()
        };
        let mut rng = StdRng::seed_from_u64(2);
        let candidate = greedy_fill(&snapshot, &constraints, &mut rng);
        assert_eq!(candidate.entries.len(), 1);
        let report = conflict::check(&candidate.entries, &[], &snapshot.classes, &constraints);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn committed_entries_block_their_slots() {
        let committed = ScheduleEntry {
            school_id: 1,
            class_id: 9,
            subject_id: 50,
            teacher_id: 100,
            day: 1,
            period: 1,
            room_number: None,
            start_time: timegrid::start_time(1),
            end_time: timegrid::end_time(1),
        };
        let snapshot = SchedulingSnapshot {
            school_id: 1,
            classes: vec![class(1, None)],
            assignments: vec![assignment(100, 1, 10, 1)],
            existing: vec![committed],
        };
        let constraints = Constraints {
            max_periods_per_day: 1,
            days_per_week: 2,
            ..Constraints::default()
        };
        let mut rng = StdRng::seed_from_u64(4);
        let candidate = greedy_fill(&snapshot, &constraints, &mut rng);
        // Day 1 period 1 is taken by the committed lesson, so the only
        // placement lands on day 2.
        assert_eq!(candidate.entries.len(), 1);
        assert_eq!(candidate.entries[0].day, 2);
    }

    #[test]
    fn respects_teacher_availability() {
        let mut constraints = Constraints {
            max_periods_per_day: 3,
            days_per_week: 1,
            ..Constraints::default()
        };
        constraints
            .teacher_availability
            .insert(100, [2].into_iter().collect());
        let snapshot = SchedulingSnapshot {
            school_id: 1,
            classes: vec![class(1, None)],
            assignments: vec![assignment(100, 1, 10, 1)],
            existing: Vec::new(),
        };
        let mut rng = StdRng::seed_from_u64(6);
        let candidate = greedy_fill(&snapshot, &constraints, &mut rng);
        assert_eq!(candidate.entries.len(), 1);
        assert_eq!(candidate.entries[0].period, 2);
    }

    #[test]
    fn heuristic_places_heavier_subjects_first() {
        let snapshot = SchedulingSnapshot {
            school_id: 1,
            classes: vec![class(1, None)],
            assignments: vec![assignment(100, 1, 10, 1), assignment(101, 1, 11, 5)],
            existing: Vec::new(),
        };
        let candidate = heuristic_fill(&snapshot, &Constraints::default());
        // The five-hour subject owns the first slot of the week.
        assert_eq!(candidate.entries[0].subject_id, 11);
        assert_eq!(candidate.entries[0].day, 1);
        assert_eq!(candidate.entries[0].period, 1);
    }

    #[test]
    fn heuristic_is_deterministic() {
        let snapshot = SchedulingSnapshot {
            school_id: 1,
            classes: vec![class(1, None), class(2, None)],
            assignments: vec![
                assignment(100, 1, 10, 2),
                assignment(101, 1, 11, 3),
                assignment(101, 2, 11, 2),
            ],
            existing: Vec::new(),
        };
        let constraints = Constraints::default();
        let first = heuristic_fill(&snapshot, &constraints);
        let second = heuristic_fill(&snapshot, &constraints);
        assert_eq!(first.entries, second.entries);
    }

    #[test]
    fn skips_break_periods() {
        let constraints = Constraints {
            max_periods_per_day: 3,
            days_per_week: 1,
            break_periods: [2].into_iter().collect(),
            ..Constraints::default()
        };
        let snapshot = SchedulingSnapshot {
            school_id: 1,
            classes: vec![class(1, None)],
            assignments: vec![assignment(100, 1, 10, 5)],
            existing: Vec::new(),
        };
        let candidate = heuristic_fill(&snapshot, &constraints);
        assert!(candidate.entries.iter().all(|e| e.period != 2));
        assert_eq!(candidate.entries.len(), 2);
    }
}
