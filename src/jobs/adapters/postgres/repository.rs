//! `PostgreSQL` store implementation for code import coordination.
//!
//! Claims lock the machine row first so the capacity check and the claim of
//! one machine are serialised, then pick the oldest due job with
//! `FOR UPDATE SKIP LOCKED` so competing machines never block on, or both
//! take, the same job.

use super::{
    models::{
        EventRow, ImportChangeset, ImportRow, JobRow, MachineRow, NewEventRow, NewImportRow,
        NewJobRow, NewMachineRow, ResultRow,
    },
    schema::{
        code_import_events, code_import_jobs, code_import_machines, code_import_results,
        code_imports,
    },
};
use crate::jobs::{
    domain::{
        CodeImportEvent, CodeImportEventKind, CodeImportJob, CodeImportMachine, CodeImportResult,
        EventId, Hostname, ImportConfiguration, ImportId, ImportSource, JobId, JobResultStatus,
        JobState, LogArtifactId, LogTail, MachineCommand, MachineId, MachineState, NewImport,
        PersistedImportData, PersistedJobData, PersistedMachineData, ResultId, ReviewStatus,
        TargetBranch,
    },
    ports::{
        ClaimOutcome, CodeImportStore, CodeImportStoreError, CodeImportStoreResult, CompletedJob,
        DrainCheck, JobCompletion,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorKind, Error as DieselError};

/// `PostgreSQL` connection pool type used by the code import store.
pub type CodeImportPgPool = Pool<ConnectionManager<PgConnection>>;

const PENDING: &str = "pending";
const RUNNING: &str = "running";

/// `PostgreSQL`-backed code import store.
#[derive(Debug, Clone)]
pub struct PostgresCodeImportStore {
    pool: CodeImportPgPool,
}

impl PostgresCodeImportStore {
    /// Creates a new store from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: CodeImportPgPool) -> Self {
        Self { pool }
    }

    /// Builds a pool of at most `max_size` connections to `database_url`
    /// and wraps it. Blocks while the first connections are established.
    ///
    /// # Errors
    ///
    /// Returns [`CodeImportStoreError::Persistence`] when the database
    /// cannot be reached.
    pub fn connect(database_url: &str, max_size: u32) -> CodeImportStoreResult<Self> {
        let manager = ConnectionManager::<PgConnection>::new(database_url);
        let pool = Pool::builder()
            .max_size(max_size)
            .build(manager)
            .map_err(CodeImportStoreError::persistence)?;
        Ok(Self::new(pool))
    }

    async fn run_blocking<F, T>(&self, f: F) -> CodeImportStoreResult<T>
    where
        F: FnOnce(&mut PgConnection) -> CodeImportStoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(CodeImportStoreError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(CodeImportStoreError::persistence)?
    }
}

impl From<DieselError> for CodeImportStoreError {
    fn from(err: DieselError) -> Self {
        Self::persistence(err)
    }
}

#[async_trait]
impl CodeImportStore for PostgresCodeImportStore {
    async fn register_machine(
        &self,
        hostname: &Hostname,
        state: MachineState,
        now: DateTime<Utc>,
    ) -> CodeImportStoreResult<CodeImportMachine> {
        let hostname = hostname.clone();
        self.run_blocking(move |connection| {
            let new_row = NewMachineRow {
                hostname: hostname.as_str().to_owned(),
                state: state.as_str().to_owned(),
                created_at: now,
                updated_at: now,
            };
            let row = diesel::insert_into(code_import_machines::table)
                .values(&new_row)
                .returning(MachineRow::as_returning())
                .get_result(connection)
                .map_err(|err| {
                    if is_unique_violation(&err) {
                        CodeImportStoreError::DuplicateMachine(hostname.clone())
                    } else {
                        CodeImportStoreError::persistence(err)
                    }
                })?;
            row_to_machine(row)
        })
        .await
    }

    async fn find_machine_by_hostname(
        &self,
        hostname: &Hostname,
    ) -> CodeImportStoreResult<Option<CodeImportMachine>> {
        let hostname = hostname.as_str().to_owned();
        self.run_blocking(move |connection| {
            let row = code_import_machines::table
                .filter(code_import_machines::hostname.eq(hostname))
                .select(MachineRow::as_select())
                .first(connection)
                .optional()?;
            row.map(row_to_machine).transpose()
        })
        .await
    }

    async fn find_machine(
        &self,
        id: MachineId,
    ) -> CodeImportStoreResult<Option<CodeImportMachine>> {
        self.run_blocking(move |connection| {
            let row = code_import_machines::table
                .find(id.value())
                .select(MachineRow::as_select())
                .first(connection)
                .optional()?;
            row.map(row_to_machine).transpose()
        })
        .await
    }

    async fn list_machines(&self) -> CodeImportStoreResult<Vec<CodeImportMachine>> {
        self.run_blocking(move |connection| {
            code_import_machines::table
                .order(code_import_machines::hostname.asc())
                .select(MachineRow::as_select())
                .load(connection)?
                .into_iter()
                .map(row_to_machine)
                .collect()
        })
        .await
    }

    async fn transition_machine(
        &self,
        machine_id: MachineId,
        command: MachineCommand,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> CodeImportStoreResult<CodeImportMachine> {
        self.run_blocking(move |connection| {
            connection.transaction::<_, CodeImportStoreError, _>(|tx| {
                let mut machine = lock_machine(tx, machine_id)?;
                machine
                    .apply(command, now)
                    .map_err(CodeImportStoreError::Transition)?;
                write_machine(tx, &machine)?;
                insert_event(
                    tx,
                    &event_to_row(&CodeImportEvent::machine(
                        command.event_kind(),
                        machine_id,
                        reason,
                        now,
                    )),
                )?;
                Ok(machine)
            })
        })
        .await
    }

    async fn count_running_jobs(&self, machine_id: MachineId) -> CodeImportStoreResult<usize> {
        self.run_blocking(move |connection| count_running(connection, machine_id))
            .await
    }

    async fn list_running_jobs(
        &self,
        machine_id: MachineId,
    ) -> CodeImportStoreResult<Vec<CodeImportJob>> {
        self.run_blocking(move |connection| {
            code_import_jobs::table
                .filter(code_import_jobs::machine_id.eq(machine_id.value()))
                .filter(code_import_jobs::state.eq(RUNNING))
                .order((
                    code_import_jobs::date_started.asc(),
                    code_import_jobs::id.asc(),
                ))
                .select(JobRow::as_select())
                .load(connection)?
                .into_iter()
                .map(row_to_job)
                .collect()
        })
        .await
    }

    async fn offline_if_drained(
        &self,
        machine_id: MachineId,
        now: DateTime<Utc>,
    ) -> CodeImportStoreResult<DrainCheck> {
        self.run_blocking(move |connection| {
            connection.transaction::<_, CodeImportStoreError, _>(|tx| {
                let mut machine = lock_machine(tx, machine_id)?;
                if machine.state() != MachineState::Quiescing {
                    return Ok(DrainCheck::NotQuiescing(machine.state()));
                }
                let running = count_running(tx, machine_id)?;
                if running > 0 {
                    return Ok(DrainCheck::StillRunning(running));
                }
                machine
                    .set_offline(running, now)
                    .map_err(CodeImportStoreError::persistence)?;
                write_machine(tx, &machine)?;
                insert_event(
                    tx,
                    &event_to_row(&CodeImportEvent::machine(
                        CodeImportEventKind::MachineOffline,
                        machine_id,
                        None,
                        now,
                    )),
                )?;
                Ok(DrainCheck::WentOffline(machine))
            })
        })
        .await
    }

    async fn store_import(
        &self,
        import: NewImport,
        now: DateTime<Utc>,
    ) -> CodeImportStoreResult<ImportConfiguration> {
        let source =
            serde_json::to_value(&import.source).map_err(CodeImportStoreError::persistence)?;
        let new_row = NewImportRow {
            source,
            target_branch: import.target.as_str().to_owned(),
            review_status: ReviewStatus::New.as_str().to_owned(),
            update_interval_seconds: import.update_interval.map(|interval| interval.num_seconds()),
            consecutive_failure_count: 0,
            created_at: now,
            updated_at: now,
        };
        let target = import.target;
        self.run_blocking(move |connection| {
            let row = diesel::insert_into(code_imports::table)
                .values(&new_row)
                .returning(ImportRow::as_returning())
                .get_result(connection)
                .map_err(|err| {
                    if is_unique_violation(&err) {
                        CodeImportStoreError::DuplicateImportTarget(target.clone())
                    } else {
                        CodeImportStoreError::persistence(err)
                    }
                })?;
            row_to_import(row)
        })
        .await
    }

    async fn find_import(
        &self,
        id: ImportId,
    ) -> CodeImportStoreResult<Option<ImportConfiguration>> {
        self.run_blocking(move |connection| {
            let row = code_imports::table
                .find(id.value())
                .select(ImportRow::as_select())
                .first(connection)
                .optional()?;
            row.map(row_to_import).transpose()
        })
        .await
    }

    async fn update_import(&self, import: &ImportConfiguration) -> CodeImportStoreResult<()> {
        let import_id = import.id();
        let changeset = import_changeset(import)?;
        self.run_blocking(move |connection| write_import(connection, import_id, &changeset))
            .await
    }

    async fn list_imports_without_job(&self) -> CodeImportStoreResult<Vec<ImportConfiguration>> {
        self.run_blocking(move |connection| {
            code_imports::table
                .filter(diesel::dsl::not(diesel::dsl::exists(
                    code_import_jobs::table
                        .filter(code_import_jobs::import_id.eq(code_imports::id)),
                )))
                .order(code_imports::id.asc())
                .select(ImportRow::as_select())
                .load(connection)?
                .into_iter()
                .map(row_to_import)
                .collect()
        })
        .await
    }

    async fn insert_job(
        &self,
        import_id: ImportId,
        date_due: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> CodeImportStoreResult<CodeImportJob> {
        self.run_blocking(move |connection| {
            connection.transaction::<_, CodeImportStoreError, _>(|tx| {
                let exists: i64 = code_imports::table
                    .find(import_id.value())
                    .count()
                    .get_result(tx)?;
                if exists == 0 {
                    return Err(CodeImportStoreError::ImportNotFound(import_id));
                }
                insert_pending_job(tx, import_id, date_due, now)
            })
        })
        .await
    }

    async fn find_job(&self, id: JobId) -> CodeImportStoreResult<Option<CodeImportJob>> {
        self.run_blocking(move |connection| {
            let row = code_import_jobs::table
                .find(id.value())
                .select(JobRow::as_select())
                .first(connection)
                .optional()?;
            row.map(row_to_job).transpose()
        })
        .await
    }

    async fn find_job_for_import(
        &self,
        import_id: ImportId,
    ) -> CodeImportStoreResult<Option<CodeImportJob>> {
        self.run_blocking(move |connection| {
            let row = code_import_jobs::table
                .filter(code_import_jobs::import_id.eq(import_id.value()))
                .select(JobRow::as_select())
                .first(connection)
                .optional()?;
            row.map(row_to_job).transpose()
        })
        .await
    }

    async fn bring_job_forward(
        &self,
        job_id: JobId,
        date_due: DateTime<Utc>,
    ) -> CodeImportStoreResult<bool> {
        self.run_blocking(move |connection| {
            let updated = diesel::update(
                code_import_jobs::table
                    .filter(code_import_jobs::id.eq(job_id.value()))
                    .filter(code_import_jobs::state.eq(PENDING))
                    .filter(code_import_jobs::date_due.gt(date_due)),
            )
            .set(code_import_jobs::date_due.eq(date_due))
            .execute(connection)?;
            if updated > 0 {
                return Ok(true);
            }
            ensure_job_exists(connection, job_id)?;
            Ok(false)
        })
        .await
    }

    async fn claim_next_job(
        &self,
        machine_id: MachineId,
        worker_limit: usize,
        now: DateTime<Utc>,
    ) -> CodeImportStoreResult<ClaimOutcome> {
        self.run_blocking(move |connection| {
            connection.transaction::<_, CodeImportStoreError, _>(|tx| {
                let mut machine = lock_machine(tx, machine_id)?;
                machine.record_heartbeat(now);
                write_machine(tx, &machine)?;
                if !machine.state().accepts_work() {
                    return Ok(ClaimOutcome::MachineUnavailable(machine.state()));
                }
                let running = count_running(tx, machine_id)?;
                if running >= worker_limit {
                    return Ok(ClaimOutcome::AtCapacity { running });
                }
                let Some(row) = select_oldest_due_job(tx, now)? else {
                    return Ok(ClaimOutcome::NoneDue);
                };
                let mut job = row_to_job(row)?;
                job.claim(machine_id, now)
                    .map_err(CodeImportStoreError::persistence)?;
                diesel::update(code_import_jobs::table.find(job.id().value()))
                    .set((
                        code_import_jobs::state.eq(RUNNING),
                        code_import_jobs::machine_id.eq(Some(machine_id.value())),
                        code_import_jobs::date_started.eq(job.date_started()),
                        code_import_jobs::heartbeat.eq(job.heartbeat()),
                    ))
                    .execute(tx)?;
                insert_event(
                    tx,
                    &event_to_row(&CodeImportEvent::job(
                        CodeImportEventKind::JobStart,
                        job.import_id(),
                        Some(machine_id),
                        None,
                        now,
                    )),
                )?;
                Ok(ClaimOutcome::Claimed(job))
            })
        })
        .await
    }

    async fn record_heartbeat(
        &self,
        job_id: JobId,
        log_tail: &LogTail,
        now: DateTime<Utc>,
    ) -> CodeImportStoreResult<()> {
        let log_tail = log_tail.as_str().to_owned();
        self.run_blocking(move |connection| {
            let updated = diesel::update(
                code_import_jobs::table
                    .filter(code_import_jobs::id.eq(job_id.value()))
                    .filter(code_import_jobs::state.eq(RUNNING)),
            )
            .set((
                code_import_jobs::heartbeat.eq(Some(now)),
                code_import_jobs::log_tail.eq(log_tail),
            ))
            .execute(connection)?;
            if updated > 0 {
                return Ok(());
            }
            ensure_job_exists(connection, job_id)?;
            Err(CodeImportStoreError::JobNotRunning(job_id))
        })
        .await
    }

    async fn complete_job(
        &self,
        completion: JobCompletion,
    ) -> CodeImportStoreResult<CompletedJob> {
        let result_row = result_to_row(&completion.result);
        let event_row = event_to_row(&completion.event);
        let job_id = completion.job_id;
        let finished_at = completion.result.date_finished;
        self.run_blocking(move |connection| {
            connection.transaction::<_, CodeImportStoreError, _>(|tx| {
                let row = code_import_jobs::table
                    .find(job_id.value())
                    .select(JobRow::as_select())
                    .for_update()
                    .first(tx)
                    .optional()?
                    .ok_or(CodeImportStoreError::JobNotFound(job_id))?;
                if row.state != RUNNING {
                    return Err(CodeImportStoreError::JobNotRunning(job_id));
                }
                let import_id =
                    ImportId::new(row.import_id).map_err(CodeImportStoreError::persistence)?;
                let mut import = lock_import(tx, import_id)?;
                let next_due = completion.update_import(&mut import);

                diesel::delete(code_import_jobs::table.find(job_id.value())).execute(tx)?;
                diesel::insert_into(code_import_results::table)
                    .values(&result_row)
                    .execute(tx)?;
                write_import(tx, import_id, &import_changeset(&import)?)?;
                insert_event(tx, &event_row)?;
                let next_job = next_due
                    .map(|date_due| insert_pending_job(tx, import_id, date_due, finished_at))
                    .transpose()?;
                Ok(CompletedJob { import, next_job })
            })
        })
        .await
    }

    async fn record_event(&self, event: &CodeImportEvent) -> CodeImportStoreResult<()> {
        let event_row = event_to_row(event);
        self.run_blocking(move |connection| insert_event(connection, &event_row))
            .await
    }

    async fn list_events(&self) -> CodeImportStoreResult<Vec<CodeImportEvent>> {
        self.run_blocking(move |connection| {
            code_import_events::table
                .order(code_import_events::sequence.asc())
                .select(EventRow::as_select())
                .load(connection)?
                .into_iter()
                .map(row_to_event)
                .collect()
        })
        .await
    }

    async fn list_results(
        &self,
        import_id: ImportId,
    ) -> CodeImportStoreResult<Vec<CodeImportResult>> {
        self.run_blocking(move |connection| {
            code_import_results::table
                .filter(code_import_results::import_id.eq(import_id.value()))
                .order(code_import_results::date_finished.desc())
                .select(ResultRow::as_select())
                .load(connection)?
                .into_iter()
                .map(row_to_result)
                .collect()
        })
        .await
    }
}

fn is_unique_violation(err: &DieselError) -> bool {
    matches!(
        err,
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)
    )
}

fn lock_machine(
    connection: &mut PgConnection,
    machine_id: MachineId,
) -> CodeImportStoreResult<CodeImportMachine> {
    let row = code_import_machines::table
        .find(machine_id.value())
        .select(MachineRow::as_select())
        .for_update()
        .first(connection)
        .optional()?
        .ok_or(CodeImportStoreError::MachineNotFound(machine_id))?;
    row_to_machine(row)
}

fn write_machine(
    connection: &mut PgConnection,
    machine: &CodeImportMachine,
) -> CodeImportStoreResult<()> {
    let updated = diesel::update(code_import_machines::table.find(machine.id().value()))
        .set((
            code_import_machines::state.eq(machine.state().as_str()),
            code_import_machines::heartbeat.eq(machine.heartbeat()),
            code_import_machines::updated_at.eq(machine.updated_at()),
        ))
        .execute(connection)?;
    if updated == 0 {
        return Err(CodeImportStoreError::MachineNotFound(machine.id()));
    }
    Ok(())
}

fn count_running(
    connection: &mut PgConnection,
    machine_id: MachineId,
) -> CodeImportStoreResult<usize> {
    let running: i64 = code_import_jobs::table
        .filter(code_import_jobs::machine_id.eq(machine_id.value()))
        .filter(code_import_jobs::state.eq(RUNNING))
        .count()
        .get_result(connection)?;
    usize::try_from(running).map_err(CodeImportStoreError::persistence)
}

fn select_oldest_due_job(
    connection: &mut PgConnection,
    now: DateTime<Utc>,
) -> CodeImportStoreResult<Option<JobRow>> {
    let query = diesel::sql_query(concat!(
        "SELECT j.id, j.import_id, j.state, j.machine_id, j.date_due, j.date_created, ",
        "j.date_started, j.heartbeat, j.log_tail ",
        "FROM code_import_jobs j ",
        "JOIN code_imports i ON i.id = j.import_id ",
        "WHERE j.state = 'pending' AND j.date_due <= $1 AND i.review_status = 'reviewed' ",
        "ORDER BY j.date_due, j.id ",
        "LIMIT 1 ",
        "FOR UPDATE OF j SKIP LOCKED",
    ))
    .bind::<diesel::sql_types::Timestamptz, _>(now);
    Ok(query.get_result::<JobRow>(connection).optional()?)
}

fn insert_pending_job(
    connection: &mut PgConnection,
    import_id: ImportId,
    date_due: DateTime<Utc>,
    now: DateTime<Utc>,
) -> CodeImportStoreResult<CodeImportJob> {
    let new_row = NewJobRow {
        import_id: import_id.value(),
        state: PENDING.to_owned(),
        date_due,
        date_created: now,
        log_tail: String::new(),
    };
    let row = diesel::insert_into(code_import_jobs::table)
        .values(&new_row)
        .returning(JobRow::as_returning())
        .get_result(connection)
        .map_err(|err| {
            if is_unique_violation(&err) {
                CodeImportStoreError::DuplicateJobForImport(import_id)
            } else {
                CodeImportStoreError::persistence(err)
            }
        })?;
    row_to_job(row)
}

fn ensure_job_exists(connection: &mut PgConnection, job_id: JobId) -> CodeImportStoreResult<()> {
    let exists: i64 = code_import_jobs::table
        .find(job_id.value())
        .count()
        .get_result(connection)?;
    if exists == 0 {
        return Err(CodeImportStoreError::JobNotFound(job_id));
    }
    Ok(())
}

fn lock_import(
    connection: &mut PgConnection,
    import_id: ImportId,
) -> CodeImportStoreResult<ImportConfiguration> {
    let row = code_imports::table
        .find(import_id.value())
        .select(ImportRow::as_select())
        .for_update()
        .first(connection)
        .optional()?
        .ok_or(CodeImportStoreError::ImportNotFound(import_id))?;
    row_to_import(row)
}

fn write_import(
    connection: &mut PgConnection,
    import_id: ImportId,
    changeset: &ImportChangeset,
) -> CodeImportStoreResult<()> {
    let updated = diesel::update(code_imports::table.find(import_id.value()))
        .set(changeset)
        .execute(connection)?;
    if updated == 0 {
        return Err(CodeImportStoreError::ImportNotFound(import_id));
    }
    Ok(())
}

fn insert_event(connection: &mut PgConnection, row: &NewEventRow) -> CodeImportStoreResult<()> {
    diesel::insert_into(code_import_events::table)
        .values(row)
        .execute(connection)?;
    Ok(())
}

fn row_to_machine(row: MachineRow) -> CodeImportStoreResult<CodeImportMachine> {
    let MachineRow {
        id,
        hostname,
        state,
        heartbeat,
        created_at,
        updated_at,
    } = row;
    Ok(CodeImportMachine::from_persisted(PersistedMachineData {
        id: MachineId::new(id).map_err(CodeImportStoreError::persistence)?,
        hostname: Hostname::new(hostname).map_err(CodeImportStoreError::persistence)?,
        state: MachineState::try_from(state.as_str()).map_err(CodeImportStoreError::persistence)?,
        heartbeat,
        created_at,
        updated_at,
    }))
}

fn row_to_import(row: ImportRow) -> CodeImportStoreResult<ImportConfiguration> {
    let ImportRow {
        id,
        source,
        target_branch,
        review_status,
        update_interval_seconds,
        consecutive_failure_count,
        date_last_successful,
        created_at,
        updated_at,
    } = row;
    let update_interval = update_interval_seconds
        .map(|seconds| {
            TimeDelta::try_seconds(seconds).ok_or_else(|| {
                CodeImportStoreError::persistence(std::io::Error::other(format!(
                    "update interval out of range: {seconds}s"
                )))
            })
        })
        .transpose()?;
    Ok(ImportConfiguration::from_persisted(PersistedImportData {
        id: ImportId::new(id).map_err(CodeImportStoreError::persistence)?,
        source: serde_json::from_value::<ImportSource>(source)
            .map_err(CodeImportStoreError::persistence)?,
        target: TargetBranch::new(target_branch).map_err(CodeImportStoreError::persistence)?,
        review_status: ReviewStatus::try_from(review_status.as_str())
            .map_err(CodeImportStoreError::persistence)?,
        update_interval,
        consecutive_failure_count: u32::try_from(consecutive_failure_count)
            .map_err(CodeImportStoreError::persistence)?,
        date_last_successful,
        created_at,
        updated_at,
    }))
}

fn import_changeset(import: &ImportConfiguration) -> CodeImportStoreResult<ImportChangeset> {
    Ok(ImportChangeset {
        review_status: import.review_status().as_str().to_owned(),
        update_interval_seconds: import
            .update_interval()
            .map(|interval| interval.num_seconds()),
        consecutive_failure_count: i32::try_from(import.consecutive_failure_count())
            .map_err(CodeImportStoreError::persistence)?,
        date_last_successful: import.date_last_successful(),
        updated_at: import.updated_at(),
    })
}

fn row_to_job(row: JobRow) -> CodeImportStoreResult<CodeImportJob> {
    let JobRow {
        id,
        import_id,
        state,
        machine_id,
        date_due,
        date_created,
        date_started,
        heartbeat,
        log_tail,
    } = row;
    Ok(CodeImportJob::from_persisted(PersistedJobData {
        id: JobId::new(id).map_err(CodeImportStoreError::persistence)?,
        import_id: ImportId::new(import_id).map_err(CodeImportStoreError::persistence)?,
        state: JobState::try_from(state.as_str()).map_err(CodeImportStoreError::persistence)?,
        machine_id: machine_id
            .map(MachineId::new)
            .transpose()
            .map_err(CodeImportStoreError::persistence)?,
        date_due,
        date_created,
        date_started,
        heartbeat,
        log_tail: LogTail::new(log_tail),
    }))
}

fn result_to_row(result: &CodeImportResult) -> ResultRow {
    ResultRow {
        id: result.id.into_inner(),
        import_id: result.import_id.value(),
        machine_id: result.machine_id.map(MachineId::value),
        status: result.status.as_str().to_owned(),
        log_tail: result.log_tail.as_str().to_owned(),
        log_artifact_id: result.log_artifact.map(LogArtifactId::value),
        date_job_started: result.date_job_started,
        date_finished: result.date_finished,
    }
}

fn row_to_result(row: ResultRow) -> CodeImportStoreResult<CodeImportResult> {
    Ok(CodeImportResult {
        id: ResultId::from_uuid(row.id),
        import_id: ImportId::new(row.import_id).map_err(CodeImportStoreError::persistence)?,
        machine_id: row
            .machine_id
            .map(MachineId::new)
            .transpose()
            .map_err(CodeImportStoreError::persistence)?,
        status: JobResultStatus::try_from(row.status.as_str())
            .map_err(CodeImportStoreError::persistence)?,
        log_tail: LogTail::new(row.log_tail),
        log_artifact: row
            .log_artifact_id
            .map(LogArtifactId::new)
            .transpose()
            .map_err(CodeImportStoreError::persistence)?,
        date_job_started: row.date_job_started,
        date_finished: row.date_finished,
    })
}

fn event_to_row(event: &CodeImportEvent) -> NewEventRow {
    NewEventRow {
        id: event.id.into_inner(),
        kind: event.kind.as_str().to_owned(),
        machine_id: event.machine_id.map(MachineId::value),
        import_id: event.import_id.map(ImportId::value),
        detail: event.detail.clone(),
        recorded_at: event.recorded_at,
    }
}

fn row_to_event(row: EventRow) -> CodeImportStoreResult<CodeImportEvent> {
    Ok(CodeImportEvent {
        id: EventId::from_uuid(row.id),
        kind: CodeImportEventKind::try_from(row.kind.as_str())
            .map_err(CodeImportStoreError::persistence)?,
        machine_id: row
            .machine_id
            .map(MachineId::new)
            .transpose()
            .map_err(CodeImportStoreError::persistence)?,
        import_id: row
            .import_id
            .map(ImportId::new)
            .transpose()
            .map_err(CodeImportStoreError::persistence)?,
        detail: row.detail,
        recorded_at: row.recorded_at,
    })
}
