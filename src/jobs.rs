use crate::data::{Constraints, GenerationResult, JobId, OptimizationParams, SchedulingSnapshot};
use crate::engine;
use crate::error::EngineError;
use log::{info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Lifecycle of a submitted generation run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum JobState {
    Queued,
    Running,
    Completed { result: GenerationResult },
    Failed { message: String },
}

/// Poll response for one job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub job_id: JobId,
    #[serde(flatten)]
    pub state: JobState,
}

struct JobSlot {
    state: JobState,
    cancel: Arc<AtomicBool>,
}

/// Runs generation off the request path: submissions land on a dedicated
/// worker pool sized to the machine's cores and are polled by id. Each run
/// owns its snapshot and population; jobs share nothing but this registry.
pub struct JobManager {
    pool: rayon::ThreadPool,
    jobs: Arc<Mutex<HashMap<JobId, JobSlot>>>,
    next_id: AtomicU64,
}

impl JobManager {
    pub fn new() -> Self {
        let workers = num_cpus::get();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("timetable-worker-{i}"))
            .build()
            .expect("failed to build the generation worker pool");
        info!("generation worker pool started with {workers} threads");
        Self {
            pool,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Enqueues a generation run and returns its id immediately.
    pub fn submit(
        &self,
        snapshot: SchedulingSnapshot,
        constraints: Constraints,
        params: OptimizationParams,
    ) -> JobId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = Arc::new(AtomicBool::new(false));
        self.lock().insert(
            id,
            JobSlot {
                state: JobState::Queued,
                cancel: Arc::clone(&cancel),
            },
        );

        let jobs = Arc::clone(&self.jobs);
        self.pool.spawn(move || {
            set_state(&jobs, id, JobState::Running);
            let run = catch_unwind(AssertUnwindSafe(|| {
                engine::generate(&snapshot, &constraints, &params, &cancel)
            }));
            match run {
                Ok(result) => set_state(&jobs, id, JobState::Completed { result }),
                Err(_) => {
                    warn!("generation job {id} panicked");
                    set_state(
                        &jobs,
                        id,
                        JobState::Failed {
                            message: "generation run panicked".to_string(),
                        },
                    );
                }
            }
        });
        id
    }

    pub fn status(&self, id: JobId) -> Result<JobStatus, EngineError> {
        let jobs = self.lock();
        let slot = jobs.get(&id).ok_or(EngineError::JobNotFound(id))?;
        Ok(JobStatus {
            job_id: id,
            state: slot.state.clone(),
        })
    }

    /// Requests cancellation. The run notices at its next generation boundary
    /// and completes with the best candidate found so far.
    pub fn cancel(&self, id: JobId) -> Result<(), EngineError> {
        let jobs = self.lock();
        let slot = jobs.get(&id).ok_or(EngineError::JobNotFound(id))?;
        slot.cancel.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// The finished result of a job, for persistence. Unfinished jobs are an
    /// input error; failed jobs surface their message.
    pub fn result(&self, id: JobId) -> Result<GenerationResult, EngineError> {
        let jobs = self.lock();
        let slot = jobs.get(&id).ok_or(EngineError::JobNotFound(id))?;
        match &slot.state {
            JobState::Completed { result } => Ok(result.clone()),
            JobState::Failed { message } => Err(EngineError::Persistence(message.clone())),
            _ => Err(EngineError::InvalidInput(format!(
                "job {id} has not finished yet"
            ))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, JobSlot>> {
        self.jobs.lock().expect("job registry lock poisoned")
    }
}

impl Default for JobManager {
    fn default() -> Self {
        Self::new()
    }
}

fn set_state(jobs: &Mutex<HashMap<JobId, JobSlot>>, id: JobId, state: JobState) {
    if let Some(slot) = jobs.lock().expect("job registry lock poisoned").get_mut(&id) {
        slot.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Algorithm, ClassInfo, TeacherAssignment};
    use std::time::Duration;

    fn snapshot() -> SchedulingSnapshot {
        SchedulingSnapshot {
            school_id: 1,
            classes: vec![ClassInfo {
                id: 1,
                name: "7A".to_string(),
                room_number: None,
                max_periods_per_day: None,
            }],
            assignments: vec![TeacherAssignment {
                teacher_id: 100,
                class_id: 1,
                subject_id: 10,
                school_id: 1,
                credit_hours: 2,
            }],
            existing: Vec::new(),
        }
    }

    fn wait_until_done(manager: &JobManager, id: JobId) -> GenerationResult {
        for _ in 0..1000 {
            match manager.status(id).expect("job must exist").state {
                JobState::Completed { result } => return result,
                JobState::Failed { message } => panic!("job failed: {message}"),
                _ => std::thread::sleep(Duration::from_millis(5)),
            }
        }
        panic!("job {id} did not finish in time");
    }

    #[test]
    fn submitted_job_completes_and_is_pollable() {
        let manager = JobManager::new();
        let params = OptimizationParams {
            algorithm: Algorithm::ConstraintSatisfaction,
            seed: Some(1),
            ..OptimizationParams::default()
        };
        let id = manager.submit(snapshot(), Constraints::default(), params);
        let result = wait_until_done(&manager, id);
        assert_eq!(result.algorithm, "constraint-satisfaction");
        assert_eq!(result.timetable.len(), 2);
    }

    #[test]
    fn cancelled_job_still_completes_with_a_result() {
        let manager = JobManager::new();
        let params = OptimizationParams {
            algorithm: Algorithm::Genetic,
            max_iterations: 1_000_000,
            population_size: 20,
            seed: Some(2),
            ..OptimizationParams::default()
        };
        let id = manager.submit(snapshot(), Constraints::default(), params);
        manager.cancel(id).expect("job must exist");
        let result = wait_until_done(&manager, id);
        assert!(result.iterations < 1_000_000);
    }

    #[test]
    fn unknown_jobs_are_reported() {
        let manager = JobManager::new();
        assert!(matches!(
            manager.status(404),
            Err(EngineError::JobNotFound(404))
        ));
        assert!(matches!(
            manager.cancel(404),
            Err(EngineError::JobNotFound(404))
        ));
    }

    #[test]
    fn unfinished_job_result_is_an_input_error() {
        let manager = JobManager::new();
        let params = OptimizationParams {
            algorithm: Algorithm::Genetic,
            max_iterations: 1_000_000,
            population_size: 20,
            seed: Some(3),
            ..OptimizationParams::default()
        };
        let id = manager.submit(snapshot(), Constraints::default(), params);
        // The run was just submitted with a huge budget; it cannot be done.
        assert!(matches!(
            manager.result(id),
            Err(EngineError::InvalidInput(_))
        ));
        manager.cancel(id).expect("job must exist");
        wait_until_done(&manager, id);
    }
}
