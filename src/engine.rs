use crate::data::{
    Algorithm, Constraints, GenerationRequest, GenerationResult, OptimizationParams,
    SchedulingSnapshot,
};
use crate::error::EngineError;
use crate::filler;
use crate::fitness;
use crate::genetic;
use log::info;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

/// Rejects malformed requests before any generation work starts: a failed
/// run never begins, and a begun run never fails over its input.
pub fn validate(request: &GenerationRequest, snapshot: &SchedulingSnapshot) -> Result<(), EngineError> {
    if request.school_id == 0 {
        return Err(EngineError::InvalidInput("schoolId must be non-zero".into()));
    }

    if let Some(params) = &request.optimization {
        if params.max_iterations == 0 {
            return Err(EngineError::InvalidInput("maxIterations must be at least 1".into()));
        }
        if params.population_size == 0 {
            return Err(EngineError::InvalidInput("populationSize must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&params.mutation_rate) {
            return Err(EngineError::InvalidInput("mutationRate must lie in [0, 1]".into()));
        }
        if !(0.0..=1.0).contains(&params.crossover_rate) {
            return Err(EngineError::InvalidInput("crossoverRate must lie in [0, 1]".into()));
        }
    }

    if let Some(constraints) = &request.constraints {
        if constraints.max_periods_per_day == 0 {
            return Err(EngineError::InvalidInput("maxPeriodsPerDay must be at least 1".into()));
        }
        if constraints.days_per_week == 0 || constraints.days_per_week > 7 {
            return Err(EngineError::InvalidInput("daysPerWeek must lie in 1..=7".into()));
        }
    }

    let known: HashSet<u32> = snapshot.classes.iter().map(|c| c.id).collect();
    if let Some(requested) = &request.class_ids {
        if let Some(missing) = requested.iter().copied().find(|id| !known.contains(id)) {
            return Err(EngineError::UnknownClass(missing));
        }
    }
    if snapshot.classes.is_empty() {
        return Err(EngineError::EmptyScope(request.school_id));
    }

    Ok(())
}

/// Runs the selected strategy over the snapshot and wraps the winner into a
/// `GenerationResult`. Always completes with a result: leftover hard
/// conflicts are reported in it, never raised.
pub fn generate(
    snapshot: &SchedulingSnapshot,
    constraints: &Constraints,
    params: &OptimizationParams,
    cancel: &AtomicBool,
) -> GenerationResult {
    let started = Instant::now();
    let mut rng = match params.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let (candidate, evaluation, iterations) = match params.algorithm {
        Algorithm::Genetic => {
            let outcome = genetic::optimize(snapshot, constraints, params, &mut rng, cancel);
            (outcome.candidate, outcome.evaluation, outcome.generations)
        }
        Algorithm::ConstraintSatisfaction => {
            let candidate = filler::greedy_fill(snapshot, constraints, &mut rng);
            let evaluation = fitness::evaluate(&candidate.entries, snapshot, constraints);
            (candidate, evaluation, 1)
        }
        Algorithm::Heuristic => {
            let candidate = filler::heuristic_fill(snapshot, constraints);
            let evaluation = fitness::evaluate(&candidate.entries, snapshot, constraints);
            (candidate, evaluation, 1)
        }
    };

    info!(
        "{} run for school {}: {} lessons, fitness {:.1}, {} conflicts, {} iterations in {:.2?}",
        params.algorithm.name(),
        snapshot.school_id,
        candidate.entries.len(),
        evaluation.fitness,
        evaluation.report.errors.len(),
        iterations,
        started.elapsed()
    );

    GenerationResult {
        timetable: candidate.entries,
        fitness: evaluation.fitness,
        algorithm: params.algorithm.name().to_string(),
        iterations,
        conflicts: evaluation.report.errors,
        warnings: evaluation.report.warnings,
    }
}
