//! Identifier and validated scalar types for the code import domain.

use super::JobDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Declares a positive integer identifier backed by a `BIGSERIAL` column.
macro_rules! serial_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Creates a validated identifier.
            ///
            /// # Errors
            ///
            /// Returns [`JobDomainError::InvalidIdentifier`] when the value is
            /// zero or negative.
            pub const fn new(value: i64) -> Result<Self, JobDomainError> {
                if value <= 0 {
                    return Err(JobDomainError::InvalidIdentifier {
                        kind: $kind,
                        value,
                    });
                }
                Ok(Self(value))
            }

            /// Returns the underlying numeric value.
            #[must_use]
            pub const fn value(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }

        impl TryFrom<i64> for $name {
            type Error = JobDomainError;

            fn try_from(value: i64) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }
    };
}

serial_id!(
    /// Identifier of a code import job.
    JobId,
    "job"
);

serial_id!(
    /// Identifier of a worker machine.
    MachineId,
    "machine"
);

serial_id!(
    /// Identifier of an import configuration.
    ImportId,
    "import"
);

serial_id!(
    /// Opaque reference to an uploaded worker log in the artifact store.
    LogArtifactId,
    "log artifact"
);

impl JobId {
    /// Decodes a job identifier from its wire form, where `0` means "no job".
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::InvalidIdentifier`] for negative values.
    pub fn from_wire(value: i64) -> Result<Option<Self>, JobDomainError> {
        if value == 0 {
            return Ok(None);
        }
        Self::new(value).map(Some)
    }

    /// Encodes an optional job identifier in its wire form.
    #[must_use]
    pub const fn to_wire(job_id: Option<Self>) -> i64 {
        match job_id {
            Some(id) => id.0,
            None => 0,
        }
    }
}

/// Validated machine hostname.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hostname(String);

impl Hostname {
    /// Creates a validated hostname.
    ///
    /// The input is trimmed. Hostnames are compared case-sensitively, the way
    /// the machine was registered.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::EmptyHostname`] or
    /// [`JobDomainError::InvalidHostname`] when validation fails.
    pub fn new(value: impl Into<String>) -> Result<Self, JobDomainError> {
        let raw = value.into();
        let normalized = raw.trim();
        if normalized.is_empty() {
            return Err(JobDomainError::EmptyHostname);
        }
        if normalized.chars().any(|character| character.is_whitespace() || character == '/') {
            return Err(JobDomainError::InvalidHostname(raw));
        }
        Ok(Self(normalized.to_owned()))
    }

    /// Returns the hostname as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Hostname {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for Hostname {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Unique identifier for a finished-job result record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultId(Uuid);

impl ResultId {
    /// Creates a new random result identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a result identifier from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the wrapped UUID.
    #[must_use]
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for ResultId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ResultId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Unique identifier for an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event identifier from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the wrapped UUID.
    #[must_use]
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}
