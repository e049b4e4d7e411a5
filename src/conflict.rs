use crate::data::{ClassInfo, Constraints, ScheduleEntry};
use itertools::Itertools;
use std::collections::{HashMap, HashSet};

/// Outcome of checking one candidate against the committed timetable.
/// `errors` are hard violations (double-bookings) that invalidate a schedule;
/// `warnings` are soft-constraint findings surfaced to the caller.
#[derive(Debug, Clone, Default)]
pub struct ConflictReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ConflictReport {
    pub fn hard_error_count(&self) -> usize {
        self.errors.len()
    }
}

/// Checks a candidate's entries together with the already-committed entries
/// of out-of-scope classes. The committed set is read-only here; it can make
/// a candidate conflict but is never itself reported as the offender.
pub fn check(
    candidate: &[ScheduleEntry],
    existing: &[ScheduleEntry],
    classes: &[ClassInfo],
    constraints: &Constraints,
) -> ConflictReport {
    let mut report = ConflictReport::default();
    let combined: Vec<&ScheduleEntry> = candidate.iter().chain(existing.iter()).collect();

    // Hard: teacher double-booked in a slot.
    let by_teacher: HashMap<_, Vec<_>> = combined
        .iter()
        .map(|e| ((e.teacher_id, e.day, e.period), *e))
        .into_group_map();
    for ((teacher_id, day, period), hits) in by_teacher.into_iter().sorted_by_key(|(k, _)| *k) {
        if hits.len() > 1 {
            report.errors.push(format!(
                "teacher {} is booked {} times on day {} period {}",
                teacher_id,
                hits.len(),
                day,
                period
            ));
        }
    }

    // Hard: room double-booked in a slot. Entries without a room never collide.
    let by_room: HashMap<_, Vec<_>> = combined
        .iter()
        .filter_map(|e| {
            e.room_number
                .as_ref()
                .map(|room| ((room.clone(), e.day, e.period), *e))
        })
        .into_group_map();
    for ((room, day, period), hits) in by_room.into_iter().sorted_by_key(|(k, _)| k.clone()) {
        if hits.len() > 1 {
            report.errors.push(format!(
                "room {} is booked {} times on day {} period {}",
                room,
                hits.len(),
                day,
                period
            ));
        }
    }

    // Hard: a class with two simultaneous lessons.
    let by_class: HashMap<_, Vec<_>> = combined
        .iter()
        .map(|e| ((e.class_id, e.day, e.period), *e))
        .into_group_map();
    for ((class_id, day, period), hits) in by_class.into_iter().sorted_by_key(|(k, _)| *k) {
        if hits.len() > 1 {
            report.errors.push(format!(
                "class {} has {} simultaneous lessons on day {} period {}",
                class_id,
                hits.len(),
                day,
                period
            ));
        }
    }

    // Soft: same subject repeated for a class within one day.
    let by_class_subject_day: HashMap<_, Vec<_>> = combined
        .iter()
        .map(|e| ((e.class_id, e.subject_id, e.day), *e))
        .into_group_map();
    for ((class_id, subject_id, day), hits) in
        by_class_subject_day.into_iter().sorted_by_key(|(k, _)| *k)
    {
        if hits.len() > 1 {
            report.warnings.push(format!(
                "subject {} appears {} times for class {} on day {}",
                subject_id,
                hits.len(),
                class_id,
                day
            ));
        }
    }

    // Soft: teacher-day load above the daily period limit.
    let by_teacher_day: HashMap<_, Vec<_>> = combined
        .iter()
        .map(|e| ((e.teacher_id, e.day), *e))
        .into_group_map();
    for ((teacher_id, day), hits) in by_teacher_day.into_iter().sorted_by_key(|(k, _)| *k) {
        if hits.len() > usize::from(constraints.max_periods_per_day) {
            report.warnings.push(format!(
                "teacher {} teaches {} periods on day {} (limit {})",
                teacher_id,
                hits.len(),
                day,
                constraints.max_periods_per_day
            ));
        }
    }

    // Soft: more distinct subjects in a class-day than the variety limit.
    let mut subjects_per_class_day: HashMap<(u32, u8), HashSet<u32>> = HashMap::new();
    for e in &combined {
        subjects_per_class_day
            .entry((e.class_id, e.day))
            .or_default()
            .insert(e.subject_id);
    }
    for ((class_id, day), subjects) in subjects_per_class_day.into_iter().sorted_by_key(|(k, _)| *k)
    {
        if subjects.len() > usize::from(constraints.max_subjects_per_day) {
            report.warnings.push(format!(
                "class {} has {} distinct subjects on day {} (limit {})",
                class_id,
                subjects.len(),
                day,
                constraints.max_subjects_per_day
            ));
        }
    }

    // Per-entry soft checks apply only to what this run produced.
    for e in candidate {
        if let Some(avoid) = constraints.avoid_time_slots.get(&e.subject_id) {
            if avoid.contains(&e.period) {
                report.warnings.push(format!(
                    "subject {} for class {} sits in avoided period {} on day {}",
                    e.subject_id, e.class_id, e.period, e.day
                ));
            }
        }
        if !constraints.teacher_available(e.teacher_id, e.period) {
            report.warnings.push(format!(
                "teacher {} is scheduled outside their availability (day {} period {})",
                e.teacher_id, e.day, e.period
            ));
        }
        if let Some(room) = &e.room_number {
            if let Some(allowed) = constraints.room_constraints.get(room) {
                if !allowed.contains(&e.subject_id) {
                    report.warnings.push(format!(
                        "room {} does not admit subject {} (class {}, day {} period {})",
                        room, e.subject_id, e.class_id, e.day, e.period
                    ));
                }
            }
        }
    }

    if !constraints.allow_gaps {
        report_gaps(candidate, classes, constraints, &mut report);
    }

    report
}

/// With gaps disallowed, every schedulable slot of an in-scope class that
/// ended up empty becomes a warning so the caller can reject partial output.
fn report_gaps(
    candidate: &[ScheduleEntry],
    classes: &[ClassInfo],
    constraints: &Constraints,
    report: &mut ConflictReport,
) {
    let occupied: HashSet<(u32, u8, u8)> = candidate
        .iter()
        .map(|e| (e.class_id, e.day, e.period))
        .collect();
    for class in classes {
        for day in 1..=constraints.days_per_week {
            for period in 1..=constraints.max_periods_for(class) {
                if constraints.break_periods.contains(&period) {
                    continue;
                }
                if !occupied.contains(&(class.id, day, period)) {
                    report.warnings.push(format!(
                        "class {} has no lesson on day {} period {}",
                        class.id, day, period
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timegrid;

    fn entry(
        class_id: u32,
        subject_id: u32,
        teacher_id: u32,
        day: u8,
        period: u8,
        room: Option<&str>,
    ) -> ScheduleEntry {
        ScheduleEntry {
            school_id: 1,
            class_id,
            subject_id,
            teacher_id,
            day,
            period,
            room_number: room.map(str::to_string),
            start_time: timegrid::start_time(period),
            end_time: timegrid::end_time(period),
        }
    }

    fn class(id: u32) -> ClassInfo {
        ClassInfo {
            id,
            name: format!("class {id}"),
            room_number: None,
            max_periods_per_day: None,
        }
    }

    #[test]
    fn clean_schedule_has_no_findings() {
        let entries = vec![
            entry(1, 10, 100, 1, 1, Some("A1")),
            entry(1, 11, 101, 1, 2, Some("A1")),
        ];
        let report = check(&entries, &[], &[class(1)], &Constraints::default());
        assert!(report.errors.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn detects_teacher_double_booking() {
        let entries = vec![
            entry(1, 10, 100, 1, 1, None),
            entry(2, 11, 100, 1, 1, None),
        ];
        let report = check(&entries, &[], &[], &Constraints::default());
        assert_eq!(report.hard_error_count(), 1);
        assert!(report.errors[0].contains("teacher 100"));
    }

    #[test]
    fn detects_room_double_booking() {
        let entries = vec![
            entry(1, 10, 100, 2, 3, Some("B2")),
            entry(2, 11, 101, 2, 3, Some("B2")),
        ];
        let report = check(&entries, &[], &[], &Constraints::default());
        assert_eq!(report.hard_error_count(), 1);
        assert!(report.errors[0].contains("room B2"));
    }

    #[test]
    fn roomless_entries_never_collide_on_rooms() {
        let entries = vec![
            entry(1, 10, 100, 2, 3, None),
            entry(2, 11, 101, 2, 3, None),
        ];
        let report = check(&entries, &[], &[], &Constraints::default());
        assert!(report.errors.is_empty());
    }

    #[test]
    fn detects_class_double_booking() {
        let entries = vec![
            entry(1, 10, 100, 3, 2, None),
            entry(1, 11, 101, 3, 2, None),
        ];
        let report = check(&entries, &[], &[], &Constraints::default());
        assert_eq!(report.hard_error_count(), 1);
        assert!(report.errors[0].contains("class 1"));
    }

    #[test]
    fn committed_entries_participate_in_conflicts() {
        let committed = vec![entry(9, 50, 100, 1, 1, None)];
        let candidate = vec![entry(1, 10, 100, 1, 1, None)];
        let report = check(&candidate, &committed, &[], &Constraints::default());
        assert_eq!(report.hard_error_count(), 1);
    }

    #[test]
    fn warns_on_repeated_subject_per_day() {
        let entries = vec![
            entry(1, 10, 100, 1, 1, None),
            entry(1, 10, 100, 1, 3, None),
        ];
        let report = check(&entries, &[], &[], &Constraints::default());
        assert!(report.errors.is_empty());
        assert!(report.warnings.iter().any(|w| w.contains("subject 10")));
    }

    #[test]
    fn warns_on_overloaded_teacher_day() {
        let constraints = Constraints {
            max_periods_per_day: 2,
            ..Constraints::default()
        };
        let entries = vec![
            entry(1, 10, 100, 1, 1, None),
            entry(1, 11, 100, 1, 2, None),
            entry(2, 12, 100, 1, 3, None),
        ];
        let report = check(&entries, &[], &[], &constraints);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("teacher 100 teaches 3 periods")));
    }

    #[test]
    fn warns_on_avoided_and_unavailable_slots() {
        let mut constraints = Constraints::default();
        constraints
            .avoid_time_slots
            .insert(10, [2].into_iter().collect());
        constraints
            .teacher_availability
            .insert(100, [1].into_iter().collect());
        let entries = vec![entry(1, 10, 100, 1, 2, None)];
        let report = check(&entries, &[], &[], &constraints);
        assert!(report.warnings.iter().any(|w| w.contains("avoided period")));
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("outside their availability")));
    }

    #[test]
    fn warns_on_room_subject_mismatch() {
        let mut constraints = Constraints::default();
        constraints
            .room_constraints
            .insert("LAB".to_string(), [30].into_iter().collect());
        let entries = vec![entry(1, 10, 100, 1, 1, Some("LAB"))];
        let report = check(&entries, &[], &[], &constraints);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("room LAB does not admit subject 10")));
    }

    #[test]
    fn reports_gaps_only_when_disallowed() {
        let constraints = Constraints {
            max_periods_per_day: 2,
            days_per_week: 1,
            allow_gaps: false,
            ..Constraints::default()
        };
        let entries = vec![entry(1, 10, 100, 1, 1, None)];
        let report = check(&entries, &[], &[class(1)], &constraints);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("class 1 has no lesson on day 1 period 2")));

        let lenient = Constraints {
            allow_gaps: true,
            ..constraints
        };
        let report = check(&entries, &[], &[class(1)], &lenient);
        assert!(report.warnings.is_empty());
    }
}
