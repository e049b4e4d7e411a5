use crate::data::{
    Candidate, ClassId, Constraints, Day, OptimizationParams, Period, ScheduleEntry,
    SchedulingSnapshot, TeacherAssignment,
};
use crate::fitness::{self, Evaluation};
use crate::timegrid;
use log::{debug, info};
use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

/// Stop evolving once the reported fitness clears this bar (0-100 scale).
pub const EARLY_EXIT_FITNESS: f64 = 95.0;
/// Chance that a schedulable slot receives a lesson during initialization;
/// the rest stay empty on purpose as an exploration seed.
const SLOT_FILL_PROBABILITY: f64 = 0.7;
const ELITE_FRACTION: f64 = 0.1;
const TOURNAMENT_SIZE: usize = 3;

/// Best candidate of an evolutionary run, with the generation count actually
/// executed (early exit and cancellation can stop short of the budget).
pub struct GeneticOutcome {
    pub candidate: Candidate,
    pub evaluation: Evaluation,
    pub generations: u32,
}

/// Per-class placement domain: which periods are schedulable and which room
/// gets stamped onto placed lessons.
struct ClassSlots {
    class_id: ClassId,
    room_number: Option<String>,
    valid_periods: Vec<Period>,
}

/// Evolves a population of candidate timetables. Always returns a result,
/// even one with unresolved hard conflicts; the caller inspects the fitness
/// and conflict list to judge it.
pub fn optimize(
    snapshot: &SchedulingSnapshot,
    constraints: &Constraints,
    params: &OptimizationParams,
    rng: &mut StdRng,
    cancel: &AtomicBool,
) -> GeneticOutcome {
    let class_slots = build_class_slots(snapshot, constraints);
    let slots_by_class: HashMap<ClassId, &ClassSlots> =
        class_slots.iter().map(|s| (s.class_id, s)).collect();
    let assignments_by_class = group_assignments(snapshot);

    let population_size = params.population_size.max(1);
    let max_iterations = params.max_iterations.max(1);
    let mut population: Vec<Candidate> = (0..population_size)
        .map(|_| random_candidate(snapshot, constraints, &class_slots, &assignments_by_class, rng))
        .collect();

    let mut best: Option<(Candidate, Evaluation)> = None;
    let mut generations = 0u32;

    for generation in 1..=max_iterations {
        if cancel.load(Ordering::Relaxed) {
            debug!("generation {generation}: cancelled, returning best found so far");
            break;
        }

        // Candidates are independent and read the snapshot immutably, so the
        // whole population is scored in parallel.
        let evaluations: Vec<Evaluation> = population
            .par_iter()
            .map(|c| fitness::evaluate(&c.entries, snapshot, constraints))
            .collect();
        let mut scored: Vec<(Candidate, Evaluation)> =
            population.drain(..).zip(evaluations).collect();
        scored.sort_by(|a, b| {
            b.1.raw
                .partial_cmp(&a.1.raw)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        generations = generation;

        if best
            .as_ref()
            .is_none_or(|(_, e)| scored[0].1.raw > e.raw)
        {
            best = Some((scored[0].0.clone(), scored[0].1.clone()));
        }

        let leader = &scored[0].1;
        if leader.fitness > EARLY_EXIT_FITNESS {
            info!(
                "generation {generation}: fitness {:.1} clears {EARLY_EXIT_FITNESS}, stopping early",
                leader.fitness
            );
            break;
        }
        if generation == max_iterations {
            break;
        }

        let elite_count = ((scored.len() as f64 * ELITE_FRACTION).ceil() as usize).max(1);
        let mut next: Vec<Candidate> = scored
            .iter()
            .take(elite_count)
            .map(|(c, _)| c.clone())
            .collect();
        while next.len() < population_size {
            let parent_a = tournament(&scored, rng);
            let parent_b = tournament(&scored, rng);
            let mut child = if rng.random_bool(params.crossover_rate.clamp(0.0, 1.0)) {
                crossover(parent_a, parent_b, rng)
            } else {
                parent_a.clone()
            };
            mutate(&mut child, &slots_by_class, constraints, params, rng);
            next.push(child);
        }
        population = next;
    }

    // Cancellation can fire before the first evaluation; score one candidate
    // so the run still completes with a result.
    let (candidate, evaluation) = best.unwrap_or_else(|| {
        let candidate = population.into_iter().next().unwrap_or_default();
        let evaluation = fitness::evaluate(&candidate.entries, snapshot, constraints);
        (candidate, evaluation)
    });

    GeneticOutcome {
        candidate,
        evaluation,
        generations,
    }
}

fn build_class_slots(snapshot: &SchedulingSnapshot, constraints: &Constraints) -> Vec<ClassSlots> {
    snapshot
        .classes
        .iter()
        .map(|class| ClassSlots {
            class_id: class.id,
            room_number: class.room_number.clone(),
            valid_periods: (1..=constraints.max_periods_for(class))
                .filter(|p| !constraints.break_periods.contains(p))
                .collect(),
        })
        .collect()
}

fn group_assignments(snapshot: &SchedulingSnapshot) -> HashMap<ClassId, Vec<&TeacherAssignment>> {
    let mut by_class: HashMap<ClassId, Vec<&TeacherAssignment>> = HashMap::new();
    for a in &snapshot.assignments {
        by_class.entry(a.class_id).or_default().push(a);
    }
    by_class
}

/// Seeds one candidate: every schedulable slot of every class gets a lesson
/// with probability `SLOT_FILL_PROBABILITY`, drawn uniformly from the class's
/// qualification facts.
fn random_candidate(
    snapshot: &SchedulingSnapshot,
    constraints: &Constraints,
    class_slots: &[ClassSlots],
    assignments_by_class: &HashMap<ClassId, Vec<&TeacherAssignment>>,
    rng: &mut StdRng,
) -> Candidate {
    let days = constraints.days_per_week.max(1);
    let mut entries = Vec::new();
    for class in class_slots {
        let Some(pool) = assignments_by_class.get(&class.class_id) else {
            continue;
        };
        if pool.is_empty() {
            continue;
        }
        for day in 1..=days {
            for &period in &class.valid_periods {
                if !rng.random_bool(SLOT_FILL_PROBABILITY) {
                    continue;
                }
                if let Some(assignment) = pool.choose(rng) {
                    entries.push(make_entry(snapshot, class, assignment, day, period));
                }
            }
        }
    }
    Candidate::new(entries)
}

fn make_entry(
    snapshot: &SchedulingSnapshot,
    class: &ClassSlots,
    assignment: &TeacherAssignment,
    day: Day,
    period: Period,
) -> ScheduleEntry {
    ScheduleEntry {
        school_id: snapshot.school_id,
        class_id: class.class_id,
        subject_id: assignment.subject_id,
        teacher_id: assignment.teacher_id,
        day,
        period,
        room_number: class.room_number.clone(),
        start_time: timegrid::start_time(period),
        end_time: timegrid::end_time(period),
    }
}

/// Picks the fittest of `TOURNAMENT_SIZE` uniformly drawn candidates.
fn tournament<'a>(scored: &'a [(Candidate, Evaluation)], rng: &mut StdRng) -> &'a Candidate {
    let mut winner = &scored[rng.random_range(0..scored.len())];
    for _ in 1..TOURNAMENT_SIZE {
        let challenger = &scored[rng.random_range(0..scored.len())];
        if challenger.1.raw > winner.1.raw {
            winner = challenger;
        }
    }
    &winner.0
}

/// Single-point crossover keyed by (class, day, period): a prefix of parent A
/// plus every entry of parent B whose slot key is still unoccupied.
fn crossover(parent_a: &Candidate, parent_b: &Candidate, rng: &mut StdRng) -> Candidate {
    let cut = if parent_a.entries.is_empty() {
        0
    } else {
        rng.random_range(0..=parent_a.entries.len())
    };
    let mut entries: Vec<ScheduleEntry> = parent_a.entries[..cut].to_vec();
    let mut occupied: HashSet<(ClassId, Day, Period)> = entries
        .iter()
        .map(|e| (e.class_id, e.day, e.period))
        .collect();
    for e in &parent_b.entries {
        if occupied.insert((e.class_id, e.day, e.period)) {
            entries.push(e.clone());
        }
    }
    Candidate::new(entries)
}

/// Per-entry mutation: with probability `mutation_rate`, reassign either the
/// day or the period uniformly within the entry's valid range, recomputing
/// the derived times on a period change.
fn mutate(
    candidate: &mut Candidate,
    slots_by_class: &HashMap<ClassId, &ClassSlots>,
    constraints: &Constraints,
    params: &OptimizationParams,
    rng: &mut StdRng,
) {
    let rate = params.mutation_rate.clamp(0.0, 1.0);
    for entry in &mut candidate.entries {
        if !rng.random_bool(rate) {
            continue;
        }
        if rng.random_bool(0.5) {
            entry.day = rng.random_range(1..=constraints.days_per_week.max(1));
        } else if let Some(slots) = slots_by_class.get(&entry.class_id) {
            if let Some(&period) = slots.valid_periods.choose(rng) {
                entry.period = period;
                entry.start_time = timegrid::start_time(period);
                entry.end_time = timegrid::end_time(period);
            }
        }
    }
}
