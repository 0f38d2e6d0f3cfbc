//! Domain model for code import coordination.
//!
//! Machines, import configurations and jobs are modelled as aggregates with
//! validated state transitions. Timestamps are always passed in by the
//! caller so the domain never reads the system clock.

mod arguments;
mod error;
mod event;
mod ids;
mod import;
mod job;
mod machine;
mod result;

pub use arguments::ImportSourceDetails;
pub use error::{
    JobDomainError, ParseJobStateError, ParseMachineStateError, ParseRegistryValueError,
    ParseResultStatusError, ParseVcsKindError,
};
pub use event::{CodeImportEvent, CodeImportEventKind};
pub use ids::{EventId, Hostname, ImportId, JobId, LogArtifactId, MachineId, ResultId};
pub use import::{
    ImportConfiguration, ImportSource, NewImport, PersistedImportData, ReviewStatus,
    TargetBranch, VcsKind,
};
pub use job::{CodeImportJob, JobState, LogTail, PersistedJobData};
pub use machine::{CodeImportMachine, MachineCommand, MachineState, PersistedMachineData};
pub use result::{CodeImportResult, JobResultStatus};
