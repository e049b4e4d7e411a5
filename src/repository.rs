use crate::data::{
    ClassId, ClassInfo, Day, GenerationResult, ScheduleEntry, SchedulingSnapshot, SchoolId,
    SubjectId, TeacherAssignment, TeacherId,
};
use crate::error::EngineError;
use log::{debug, info};
use rusqlite::types::Value;
use rusqlite::{Connection, params, params_from_iter};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Which related names to join into a query result. The typed replacement
/// for free-form "include" strings on the read path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelationSet {
    pub class: bool,
    pub subject: bool,
    pub teacher: bool,
}

impl RelationSet {
    pub fn all() -> Self {
        Self {
            class: true,
            subject: true,
            teacher: true,
        }
    }

    /// Parses a comma-separated list such as "class,teacher". Unknown names
    /// are ignored.
    pub fn parse(list: &str) -> Self {
        let mut set = Self::default();
        for token in list.split(',') {
            match token.trim() {
                "class" => set.class = true,
                "subject" => set.subject = true,
                "teacher" => set.teacher = true,
                _ => {}
            }
        }
        set
    }
}

/// Filters for the display/export read path.
#[derive(Debug, Clone, Default)]
pub struct QueryFilters {
    pub class_id: Option<ClassId>,
    pub teacher_id: Option<TeacherId>,
    pub day: Option<Day>,
    pub include: RelationSet,
}

/// One queried lesson, with related names joined in when requested.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRow {
    #[serde(flatten)]
    pub entry: ScheduleEntry,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teacher_name: Option<String>,
}

/// Storage contract around the engine: supplies the read-only input snapshot
/// and persists chosen candidates with replace semantics.
pub trait ScheduleRepository: Send + Sync {
    /// A consistent point-in-time view for one school, optionally narrowed to
    /// a set of classes. Committed entries of classes outside the scope come
    /// along for conflict detection.
    fn fetch_snapshot(
        &self,
        school_id: SchoolId,
        class_ids: Option<&[ClassId]>,
    ) -> Result<SchedulingSnapshot, EngineError>;

    /// Atomically replaces the schedule of the result's class scope: every
    /// non-deleted entry of those classes is soft-deleted and the new entries
    /// are inserted, tagged with the generating actor, in one transaction.
    /// Returns the number of rows written.
    fn replace_schedule(
        &self,
        result: &GenerationResult,
        school_id: SchoolId,
        actor: &str,
    ) -> Result<usize, EngineError>;

    /// Read path for display and export; not part of the optimization loop.
    fn query(
        &self,
        school_id: SchoolId,
        filters: &QueryFilters,
    ) -> Result<Vec<ScheduleRow>, EngineError>;
}

/// SQLite-backed repository. The connection is serialized behind a mutex;
/// the engine touches storage only before a run (snapshot) and after it
/// (commit), so contention is not a concern.
pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS classes (
                school_id INTEGER NOT NULL,
                id INTEGER NOT NULL,
                name TEXT NOT NULL,
                room_number TEXT,
                max_periods_per_day INTEGER,
                PRIMARY KEY (school_id, id)
            );
            CREATE TABLE IF NOT EXISTS subjects (
                school_id INTEGER NOT NULL,
                id INTEGER NOT NULL,
                name TEXT NOT NULL,
                PRIMARY KEY (school_id, id)
            );
            CREATE TABLE IF NOT EXISTS teachers (
                school_id INTEGER NOT NULL,
                id INTEGER NOT NULL,
                name TEXT NOT NULL,
                PRIMARY KEY (school_id, id)
            );
            CREATE TABLE IF NOT EXISTS teacher_assignments (
                school_id INTEGER NOT NULL,
                class_id INTEGER NOT NULL,
                subject_id INTEGER NOT NULL,
                teacher_id INTEGER NOT NULL,
                credit_hours INTEGER NOT NULL,
                PRIMARY KEY (school_id, class_id, subject_id, teacher_id)
            );
            CREATE TABLE IF NOT EXISTS schedule_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                school_id INTEGER NOT NULL,
                class_id INTEGER NOT NULL,
                subject_id INTEGER NOT NULL,
                teacher_id INTEGER NOT NULL,
                day INTEGER NOT NULL CHECK (day BETWEEN 1 AND 7),
                period INTEGER NOT NULL CHECK (period >= 1),
                room_number TEXT,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                created_by TEXT NOT NULL,
                deleted INTEGER NOT NULL DEFAULT 0
            );",
        )
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("repository connection lock poisoned")
    }

    pub fn save_class(&self, school_id: SchoolId, class: &ClassInfo) -> Result<(), EngineError> {
        self.lock().execute(
            "INSERT OR REPLACE INTO classes (school_id, id, name, room_number, max_periods_per_day)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                school_id,
                class.id,
                class.name,
                class.room_number,
                class.max_periods_per_day
            ],
        )?;
        Ok(())
    }

    pub fn save_subject(
        &self,
        school_id: SchoolId,
        id: SubjectId,
        name: &str,
    ) -> Result<(), EngineError> {
        self.lock().execute(
            "INSERT OR REPLACE INTO subjects (school_id, id, name) VALUES (?1, ?2, ?3)",
            params![school_id, id, name],
        )?;
        Ok(())
    }

    pub fn save_teacher(
        &self,
        school_id: SchoolId,
        id: TeacherId,
        name: &str,
    ) -> Result<(), EngineError> {
        self.lock().execute(
            "INSERT OR REPLACE INTO teachers (school_id, id, name) VALUES (?1, ?2, ?3)",
            params![school_id, id, name],
        )?;
        Ok(())
    }

    pub fn save_assignment(&self, assignment: &TeacherAssignment) -> Result<(), EngineError> {
        self.lock().execute(
            "INSERT OR REPLACE INTO teacher_assignments
             (school_id, class_id, subject_id, teacher_id, credit_hours)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                assignment.school_id,
                assignment.class_id,
                assignment.subject_id,
                assignment.teacher_id,
                assignment.credit_hours
            ],
        )?;
        Ok(())
    }
}

impl ScheduleRepository for SqliteRepository {
    fn fetch_snapshot(
        &self,
        school_id: SchoolId,
        class_ids: Option<&[ClassId]>,
    ) -> Result<SchedulingSnapshot, EngineError> {
        let conn = self.lock();

        let mut stmt = conn.prepare(
            "SELECT id, name, room_number, max_periods_per_day
             FROM classes WHERE school_id = ?1 ORDER BY id",
        )?;
        let all_classes = stmt
            .query_map(params![school_id], |row| {
                Ok(ClassInfo {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    room_number: row.get(2)?,
                    max_periods_per_day: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let classes: Vec<ClassInfo> = match class_ids {
            Some(requested) => {
                let wanted: HashSet<ClassId> = requested.iter().copied().collect();
                all_classes
                    .into_iter()
                    .filter(|c| wanted.contains(&c.id))
                    .collect()
            }
            None => all_classes,
        };
        let in_scope: HashSet<ClassId> = classes.iter().map(|c| c.id).collect();

        let mut stmt = conn.prepare(
            "SELECT teacher_id, class_id, subject_id, credit_hours
             FROM teacher_assignments WHERE school_id = ?1
             ORDER BY class_id, subject_id, teacher_id",
        )?;
        let assignments = stmt
            .query_map(params![school_id], |row| {
                Ok(TeacherAssignment {
                    teacher_id: row.get(0)?,
                    class_id: row.get(1)?,
                    subject_id: row.get(2)?,
                    school_id,
                    credit_hours: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .filter(|a| in_scope.contains(&a.class_id))
            .collect();

        let mut stmt = conn.prepare(
            "SELECT class_id, subject_id, teacher_id, day, period, room_number,
                    start_time, end_time
             FROM schedule_entries WHERE school_id = ?1 AND deleted = 0
             ORDER BY class_id, day, period",
        )?;
        let existing = stmt
            .query_map(params![school_id], |row| {
                Ok(ScheduleEntry {
                    school_id,
                    class_id: row.get(0)?,
                    subject_id: row.get(1)?,
                    teacher_id: row.get(2)?,
                    day: row.get(3)?,
                    period: row.get(4)?,
                    room_number: row.get(5)?,
                    start_time: row.get(6)?,
                    end_time: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .filter(|e| !in_scope.contains(&e.class_id))
            .collect();

        debug!(
            "snapshot for school {school_id}: {} classes in scope",
            classes.len()
        );
        Ok(SchedulingSnapshot {
            school_id,
            classes,
            assignments,
            existing,
        })
    }

    fn replace_schedule(
        &self,
        result: &GenerationResult,
        school_id: SchoolId,
        actor: &str,
    ) -> Result<usize, EngineError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let scope: HashSet<ClassId> = result.timetable.iter().map(|e| e.class_id).collect();
        for class_id in &scope {
            tx.execute(
                "UPDATE schedule_entries SET deleted = 1
                 WHERE school_id = ?1 AND class_id = ?2 AND deleted = 0",
                params![school_id, class_id],
            )?;
        }

        let mut written = 0usize;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO schedule_entries
                 (school_id, class_id, subject_id, teacher_id, day, period,
                  room_number, start_time, end_time, created_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for e in &result.timetable {
                stmt.execute(params![
                    school_id,
                    e.class_id,
                    e.subject_id,
                    e.teacher_id,
                    e.day,
                    e.period,
                    e.room_number,
                    e.start_time,
                    e.end_time,
                    actor
                ])?;
                written += 1;
            }
        }

        tx.commit()?;
        info!(
            "replaced schedule for school {school_id}: {} classes, {written} rows (actor {actor})",
            scope.len()
        );
        Ok(written)
    }

    fn query(
        &self,
        school_id: SchoolId,
        filters: &QueryFilters,
    ) -> Result<Vec<ScheduleRow>, EngineError> {
        let conn = self.lock();
        let mut sql = String::from(
            "SELECT e.class_id, e.subject_id, e.teacher_id, e.day, e.period,
                    e.room_number, e.start_time, e.end_time,
                    c.name, s.name, t.name
             FROM schedule_entries e
             LEFT JOIN classes c ON c.school_id = e.school_id AND c.id = e.class_id
             LEFT JOIN subjects s ON s.school_id = e.school_id AND s.id = e.subject_id
             LEFT JOIN teachers t ON t.school_id = e.school_id AND t.id = e.teacher_id
             WHERE e.school_id = ?1 AND e.deleted = 0",
        );
        let mut values: Vec<Value> = vec![Value::Integer(i64::from(school_id))];
        if let Some(class_id) = filters.class_id {
            values.push(Value::Integer(i64::from(class_id)));
            sql.push_str(&format!(" AND e.class_id = ?{}", values.len()));
        }
        if let Some(teacher_id) = filters.teacher_id {
            values.push(Value::Integer(i64::from(teacher_id)));
            sql.push_str(&format!(" AND e.teacher_id = ?{}", values.len()));
        }
        if let Some(day) = filters.day {
            values.push(Value::Integer(i64::from(day)));
            sql.push_str(&format!(" AND e.day = ?{}", values.len()));
        }
        sql.push_str(" ORDER BY e.class_id, e.day, e.period");

        let include = filters.include;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| {
                Ok(ScheduleRow {
                    entry: ScheduleEntry {
                        school_id,
                        class_id: row.get(0)?,
                        subject_id: row.get(1)?,
                        teacher_id: row.get(2)?,
                        day: row.get(3)?,
                        period: row.get(4)?,
                        room_number: row.get(5)?,
                        start_time: row.get(6)?,
                        end_time: row.get(7)?,
                    },
                    class_name: if include.class { row.get(8)? } else { None },
                    subject_name: if include.subject { row.get(9)? } else { None },
                    teacher_name: if include.teacher { row.get(10)? } else { None },
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

/// Explicit snapshot memoization, owned by the serving layer and passed into
/// request handling; invalidated after every successful commit. Keys are the
/// (school, normalized class scope) pair.
#[derive(Default)]
pub struct SnapshotCache {
    entries: Mutex<HashMap<(SchoolId, Option<Vec<ClassId>>), Arc<SchedulingSnapshot>>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fetch(
        &self,
        repository: &dyn ScheduleRepository,
        school_id: SchoolId,
        class_ids: Option<&[ClassId]>,
    ) -> Result<Arc<SchedulingSnapshot>, EngineError> {
        let key = (
            school_id,
            class_ids.map(|ids| {
                let mut ids = ids.to_vec();
                ids.sort_unstable();
                ids.dedup();
                ids
            }),
        );
        if let Some(hit) = self.lock().get(&key) {
            return Ok(Arc::clone(hit));
        }
        let snapshot = Arc::new(repository.fetch_snapshot(school_id, class_ids)?);
        self.lock().insert(key, Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Drops every cached scope of the school; called after `replace_schedule`.
    pub fn invalidate(&self, school_id: SchoolId) {
        self.lock().retain(|(school, _), _| *school != school_id);
    }

    fn lock(
        &self,
    ) -> MutexGuard<'_, HashMap<(SchoolId, Option<Vec<ClassId>>), Arc<SchedulingSnapshot>>> {
        self.entries.lock().expect("snapshot cache lock poisoned")
    }
}
