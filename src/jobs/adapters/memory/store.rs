//! In-memory code import store for tests and single-process deployments.
//!
//! A single write lock serialises every mutating call, which gives the same
//! at-most-once claim guarantee the `PostgreSQL` adapter gets from row locks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::jobs::{
    domain::{
        CodeImportEvent, CodeImportEventKind, CodeImportJob, CodeImportMachine, CodeImportResult,
        Hostname, ImportConfiguration, ImportId, JobId, JobState, LogTail, MachineCommand,
        MachineId, MachineState, NewImport, PersistedImportData, PersistedMachineData, ReviewStatus,
    },
    ports::{
        ClaimOutcome, CodeImportStore, CodeImportStoreError, CodeImportStoreResult, CompletedJob,
        DrainCheck, JobCompletion,
    },
};

/// Thread-safe in-memory code import store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCodeImportStore {
    state: Arc<RwLock<InMemoryStoreState>>,
}

#[derive(Debug, Default)]
struct InMemoryStoreState {
    machines: BTreeMap<MachineId, CodeImportMachine>,
    imports: BTreeMap<ImportId, ImportConfiguration>,
    jobs: BTreeMap<JobId, CodeImportJob>,
    results: Vec<CodeImportResult>,
    events: Vec<CodeImportEvent>,
    last_machine_id: i64,
    last_import_id: i64,
    last_job_id: i64,
}

impl InMemoryCodeImportStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> CodeImportStoreResult<RwLockReadGuard<'_, InMemoryStoreState>> {
        self.state.read().map_err(|err| {
            CodeImportStoreError::persistence(std::io::Error::other(err.to_string()))
        })
    }

    fn write(&self) -> CodeImportStoreResult<RwLockWriteGuard<'_, InMemoryStoreState>> {
        self.state.write().map_err(|err| {
            CodeImportStoreError::persistence(std::io::Error::other(err.to_string()))
        })
    }
}

impl InMemoryStoreState {
    fn running_jobs(&self, machine_id: MachineId) -> impl Iterator<Item = &CodeImportJob> {
        self.jobs.values().filter(move |job| {
            job.state() == JobState::Running && job.machine_id() == Some(machine_id)
        })
    }

    fn insert_pending_job(
        &mut self,
        import_id: ImportId,
        date_due: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> CodeImportStoreResult<CodeImportJob> {
        if !self.imports.contains_key(&import_id) {
            return Err(CodeImportStoreError::ImportNotFound(import_id));
        }
        if self.jobs.values().any(|job| job.import_id() == import_id) {
            return Err(CodeImportStoreError::DuplicateJobForImport(import_id));
        }
        let id = JobId::new(self.last_job_id + 1).map_err(CodeImportStoreError::persistence)?;
        self.last_job_id = id.value();
        let job = CodeImportJob::pending(id, import_id, date_due, now);
        self.jobs.insert(id, job.clone());
        Ok(job)
    }

    fn oldest_due_job(&self, now: DateTime<Utc>) -> Option<JobId> {
        self.jobs
            .values()
            .filter(|job| job.is_due(now))
            .filter(|job| {
                self.imports
                    .get(&job.import_id())
                    .is_some_and(|import| import.review_status().is_schedulable())
            })
            .min_by_key(|job| (job.date_due(), job.id()))
            .map(CodeImportJob::id)
    }
}

#[async_trait]
impl CodeImportStore for InMemoryCodeImportStore {
    async fn register_machine(
        &self,
        hostname: &Hostname,
        state: MachineState,
        now: DateTime<Utc>,
    ) -> CodeImportStoreResult<CodeImportMachine> {
        let mut guard = self.write()?;
        if guard
            .machines
            .values()
            .any(|machine| machine.hostname() == hostname)
        {
            return Err(CodeImportStoreError::DuplicateMachine(hostname.clone()));
        }
        let id = MachineId::new(guard.last_machine_id + 1)
            .map_err(CodeImportStoreError::persistence)?;
        guard.last_machine_id = id.value();
        let machine = CodeImportMachine::from_persisted(PersistedMachineData {
            id,
            hostname: hostname.clone(),
            state,
            heartbeat: None,
            created_at: now,
            updated_at: now,
        });
        guard.machines.insert(id, machine.clone());
        Ok(machine)
    }

    async fn find_machine_by_hostname(
        &self,
        hostname: &Hostname,
    ) -> CodeImportStoreResult<Option<CodeImportMachine>> {
        let guard = self.read()?;
        Ok(guard
            .machines
            .values()
            .find(|machine| machine.hostname() == hostname)
            .cloned())
    }

    async fn find_machine(
        &self,
        id: MachineId,
    ) -> CodeImportStoreResult<Option<CodeImportMachine>> {
        Ok(self.read()?.machines.get(&id).cloned())
    }

    async fn list_machines(&self) -> CodeImportStoreResult<Vec<CodeImportMachine>> {
        let guard = self.read()?;
        let mut machines: Vec<_> = guard.machines.values().cloned().collect();
        machines.sort_by(|left, right| left.hostname().as_str().cmp(right.hostname().as_str()));
        Ok(machines)
    }

    async fn transition_machine(
        &self,
        machine_id: MachineId,
        command: MachineCommand,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> CodeImportStoreResult<CodeImportMachine> {
        let mut guard = self.write()?;
        let machine = guard
            .machines
            .get_mut(&machine_id)
            .ok_or(CodeImportStoreError::MachineNotFound(machine_id))?;
        machine
            .apply(command, now)
            .map_err(CodeImportStoreError::Transition)?;
        let changed = machine.clone();
        guard.events.push(CodeImportEvent::machine(
            command.event_kind(),
            machine_id,
            reason,
            now,
        ));
        Ok(changed)
    }

    async fn count_running_jobs(&self, machine_id: MachineId) -> CodeImportStoreResult<usize> {
        Ok(self.read()?.running_jobs(machine_id).count())
    }

    async fn list_running_jobs(
        &self,
        machine_id: MachineId,
    ) -> CodeImportStoreResult<Vec<CodeImportJob>> {
        let guard = self.read()?;
        let mut jobs: Vec<_> = guard.running_jobs(machine_id).cloned().collect();
        jobs.sort_by_key(|job| (job.date_started(), job.id()));
        Ok(jobs)
    }

    async fn offline_if_drained(
        &self,
        machine_id: MachineId,
        now: DateTime<Utc>,
    ) -> CodeImportStoreResult<DrainCheck> {
        let mut guard = self.write()?;
        let running = guard.running_jobs(machine_id).count();
        let machine = guard
            .machines
            .get_mut(&machine_id)
            .ok_or(CodeImportStoreError::MachineNotFound(machine_id))?;
        if machine.state() != MachineState::Quiescing {
            return Ok(DrainCheck::NotQuiescing(machine.state()));
        }
        if running > 0 {
            return Ok(DrainCheck::StillRunning(running));
        }
        machine
            .set_offline(running, now)
            .map_err(CodeImportStoreError::persistence)?;
        let offline = machine.clone();
        guard.events.push(CodeImportEvent::machine(
            CodeImportEventKind::MachineOffline,
            machine_id,
            None,
            now,
        ));
        Ok(DrainCheck::WentOffline(offline))
    }

    async fn store_import(
        &self,
        import: NewImport,
        now: DateTime<Utc>,
    ) -> CodeImportStoreResult<ImportConfiguration> {
        let mut guard = self.write()?;
        if guard
            .imports
            .values()
            .any(|existing| existing.target() == &import.target)
        {
            return Err(CodeImportStoreError::DuplicateImportTarget(import.target));
        }
        let id =
            ImportId::new(guard.last_import_id + 1).map_err(CodeImportStoreError::persistence)?;
        guard.last_import_id = id.value();
        let configuration = ImportConfiguration::from_persisted(PersistedImportData {
            id,
            source: import.source,
            target: import.target,
            review_status: ReviewStatus::New,
            update_interval: import.update_interval,
            consecutive_failure_count: 0,
            date_last_successful: None,
            created_at: now,
            updated_at: now,
        });
        guard.imports.insert(id, configuration.clone());
        Ok(configuration)
    }

    async fn find_import(
        &self,
        id: ImportId,
    ) -> CodeImportStoreResult<Option<ImportConfiguration>> {
        Ok(self.read()?.imports.get(&id).cloned())
    }

    async fn update_import(&self, import: &ImportConfiguration) -> CodeImportStoreResult<()> {
        let mut guard = self.write()?;
        let slot = guard
            .imports
            .get_mut(&import.id())
            .ok_or(CodeImportStoreError::ImportNotFound(import.id()))?;
        *slot = import.clone();
        Ok(())
    }

    async fn list_imports_without_job(&self) -> CodeImportStoreResult<Vec<ImportConfiguration>> {
        let guard = self.read()?;
        Ok(guard
            .imports
            .values()
            .filter(|import| !guard.jobs.values().any(|job| job.import_id() == import.id()))
            .cloned()
            .collect())
    }

    async fn insert_job(
        &self,
        import_id: ImportId,
        date_due: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> CodeImportStoreResult<CodeImportJob> {
        self.write()?.insert_pending_job(import_id, date_due, now)
    }

    async fn find_job(&self, id: JobId) -> CodeImportStoreResult<Option<CodeImportJob>> {
        Ok(self.read()?.jobs.get(&id).cloned())
    }

    async fn find_job_for_import(
        &self,
        import_id: ImportId,
    ) -> CodeImportStoreResult<Option<CodeImportJob>> {
        let guard = self.read()?;
        Ok(guard
            .jobs
            .values()
            .find(|job| job.import_id() == import_id)
            .cloned())
    }

    async fn bring_job_forward(
        &self,
        job_id: JobId,
        date_due: DateTime<Utc>,
    ) -> CodeImportStoreResult<bool> {
        let mut guard = self.write()?;
        let job = guard
            .jobs
            .get_mut(&job_id)
            .ok_or(CodeImportStoreError::JobNotFound(job_id))?;
        Ok(job.request_now(date_due))
    }

    async fn claim_next_job(
        &self,
        machine_id: MachineId,
        worker_limit: usize,
        now: DateTime<Utc>,
    ) -> CodeImportStoreResult<ClaimOutcome> {
        let mut guard = self.write()?;
        let machine = guard
            .machines
            .get_mut(&machine_id)
            .ok_or(CodeImportStoreError::MachineNotFound(machine_id))?;
        machine.record_heartbeat(now);
        let machine_state = machine.state();
        if !machine_state.accepts_work() {
            return Ok(ClaimOutcome::MachineUnavailable(machine_state));
        }
        let running = guard.running_jobs(machine_id).count();
        if running >= worker_limit {
            return Ok(ClaimOutcome::AtCapacity { running });
        }
        let Some(job_id) = guard.oldest_due_job(now) else {
            return Ok(ClaimOutcome::NoneDue);
        };
        let job = guard
            .jobs
            .get_mut(&job_id)
            .ok_or(CodeImportStoreError::JobNotFound(job_id))?;
        job.claim(machine_id, now)
            .map_err(CodeImportStoreError::persistence)?;
        let claimed = job.clone();
        guard.events.push(CodeImportEvent::job(
            CodeImportEventKind::JobStart,
            claimed.import_id(),
            Some(machine_id),
            None,
            now,
        ));
        Ok(ClaimOutcome::Claimed(claimed))
    }

    async fn record_heartbeat(
        &self,
        job_id: JobId,
        log_tail: &LogTail,
        now: DateTime<Utc>,
    ) -> CodeImportStoreResult<()> {
        let mut guard = self.write()?;
        let job = guard
            .jobs
            .get_mut(&job_id)
            .ok_or(CodeImportStoreError::JobNotFound(job_id))?;
        job.record_heartbeat(log_tail.clone(), now)
            .map_err(|_| CodeImportStoreError::JobNotRunning(job_id))
    }

    async fn complete_job(
        &self,
        completion: JobCompletion,
    ) -> CodeImportStoreResult<CompletedJob> {
        let mut guard = self.write()?;
        let job = guard
            .jobs
            .get(&completion.job_id)
            .ok_or(CodeImportStoreError::JobNotFound(completion.job_id))?;
        if job.state() != JobState::Running {
            return Err(CodeImportStoreError::JobNotRunning(completion.job_id));
        }
        let import_id = job.import_id();
        let mut import = guard
            .imports
            .get(&import_id)
            .cloned()
            .ok_or(CodeImportStoreError::ImportNotFound(import_id))?;
        let next_due = completion.update_import(&mut import);

        guard.jobs.remove(&completion.job_id);
        guard.imports.insert(import_id, import.clone());
        guard.events.push(completion.event);
        let finished_at = completion.result.date_finished;
        guard.results.push(completion.result);
        let next_job = next_due
            .map(|date_due| guard.insert_pending_job(import_id, date_due, finished_at))
            .transpose()?;
        Ok(CompletedJob { import, next_job })
    }

    async fn record_event(&self, event: &CodeImportEvent) -> CodeImportStoreResult<()> {
        self.write()?.events.push(event.clone());
        Ok(())
    }

    async fn list_events(&self) -> CodeImportStoreResult<Vec<CodeImportEvent>> {
        Ok(self.read()?.events.clone())
    }

    async fn list_results(
        &self,
        import_id: ImportId,
    ) -> CodeImportStoreResult<Vec<CodeImportResult>> {
        let guard = self.read()?;
        Ok(guard
            .results
            .iter()
            .rev()
            .filter(|result| result.import_id == import_id)
            .cloned()
            .collect())
    }
}
