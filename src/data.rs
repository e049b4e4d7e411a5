use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

// Type aliases for clarity
pub type SchoolId = u32;
pub type ClassId = u32;
pub type SubjectId = u32;
pub type TeacherId = u32;
pub type Day = u8;
pub type Period = u8;
pub type JobId = u64;

/// One placed lesson: a class meets a teacher for a subject in a (day, period) slot.
/// `start_time`/`end_time` are derived wall-clock strings ("HH:MM:SS").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub school_id: SchoolId,
    pub class_id: ClassId,
    pub subject_id: SubjectId,
    pub teacher_id: TeacherId,
    pub day: Day,
    pub period: Period,
    pub room_number: Option<String>,
    pub start_time: String,
    pub end_time: String,
}

/// A class in scope for generation, with its home room and an optional
/// per-class override of the daily period limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassInfo {
    pub id: ClassId,
    pub name: String,
    pub room_number: Option<String>,
    pub max_periods_per_day: Option<Period>,
}

/// A fixed qualification fact: this teacher may teach this subject to this
/// class, for `credit_hours` lessons per week. Generators only place entries
/// whose (teacher, class, subject) triple matches one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherAssignment {
    pub teacher_id: TeacherId,
    pub class_id: ClassId,
    pub subject_id: SubjectId,
    pub school_id: SchoolId,
    pub credit_hours: u8,
}

/// Scheduling constraints supplied with a generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Constraints {
    pub max_periods_per_day: Period,
    pub max_subjects_per_day: u8,
    pub days_per_week: Day,
    pub break_periods: HashSet<Period>,
    pub preferred_time_slots: HashMap<SubjectId, HashSet<Period>>,
    pub avoid_time_slots: HashMap<SubjectId, HashSet<Period>>,
    pub teacher_availability: HashMap<TeacherId, HashSet<Period>>,
    pub room_constraints: HashMap<String, HashSet<SubjectId>>,
    /// When false, every schedulable slot left unfilled is reported as a
    /// warning on the result; generation itself never fails over gaps.
    pub allow_gaps: bool,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            max_periods_per_day: 8,
            max_subjects_per_day: 6,
            days_per_week: 5,
            break_periods: HashSet::new(),
            preferred_time_slots: HashMap::new(),
            avoid_time_slots: HashMap::new(),
            teacher_availability: HashMap::new(),
            room_constraints: HashMap::new(),
            allow_gaps: true,
        }
    }
}

impl Constraints {
    /// Daily period limit for a class, honoring its per-class override.
    pub fn max_periods_for(&self, class: &ClassInfo) -> Period {
        class.max_periods_per_day.unwrap_or(self.max_periods_per_day)
    }

    /// True if a teacher may teach in the given period. Teachers without an
    /// availability entry are available everywhere.
    pub fn teacher_available(&self, teacher_id: TeacherId, period: Period) -> bool {
        match self.teacher_availability.get(&teacher_id) {
            Some(periods) => periods.contains(&period),
            None => true,
        }
    }
}

/// A consistent point-in-time view of everything a generation run reads:
/// the classes in scope, the qualification facts, and committed entries of
/// out-of-scope classes (used only for conflict detection).
#[derive(Debug, Clone)]
pub struct SchedulingSnapshot {
    pub school_id: SchoolId,
    pub classes: Vec<ClassInfo>,
    pub assignments: Vec<TeacherAssignment>,
    pub existing: Vec<ScheduleEntry>,
}

/// One full trial schedule for the requested scope. Has no identity beyond
/// its entries; candidates are compared only via fitness.
#[derive(Debug, Clone, Default)]
pub struct Candidate {
    pub entries: Vec<ScheduleEntry>,
}

impl Candidate {
    pub fn new(entries: Vec<ScheduleEntry>) -> Self {
        Self { entries }
    }
}

/// Which generation strategy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "genetic")]
    Genetic,
    #[serde(rename = "constraint-satisfaction")]
    ConstraintSatisfaction,
    #[serde(rename = "heuristic")]
    Heuristic,
}

impl Algorithm {
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Genetic => "genetic",
            Algorithm::ConstraintSatisfaction => "constraint-satisfaction",
            Algorithm::Heuristic => "heuristic",
        }
    }
}

/// Tuning knobs for a generation run. The genetic strategy uses all of them;
/// the fillers only read `seed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OptimizationParams {
    pub algorithm: Algorithm,
    pub max_iterations: u32,
    pub population_size: usize,
    pub mutation_rate: f64,
    pub crossover_rate: f64,
    /// Fixed seed for reproducible runs; entropy-seeded when absent.
    pub seed: Option<u64>,
}

impl Default for OptimizationParams {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Genetic,
            max_iterations: 100,
            population_size: 50,
            mutation_rate: 0.1,
            crossover_rate: 0.8,
            seed: None,
        }
    }
}

/// The complete input for a generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub school_id: SchoolId,
    pub class_ids: Option<Vec<ClassId>>,
    pub constraints: Option<Constraints>,
    pub optimization: Option<OptimizationParams>,
}

/// The final output of a generation run: the best candidate found within the
/// budget, its fitness on the 0-100 scale, and any hard conflicts or soft
/// warnings left in it. Hard conflicts are reported, never raised.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub timetable: Vec<ScheduleEntry>,
    pub fitness: f64,
    pub algorithm: String,
    pub iterations: u32,
    pub conflicts: Vec<String>,
    pub warnings: Vec<String>,
}
