//! Positional worker arguments describing what an import job mirrors.

use super::{ImportSource, JobDomainError, TargetBranch, VcsKind};

/// Decoded worker arguments: the target branch and the foreign source.
///
/// The argument vector is `[target, kind, url]` for URL-based systems and
/// `[target, "cvs", root, module]` for CVS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSourceDetails {
    /// Branch the import mirrors into.
    pub target: TargetBranch,
    /// Foreign repository location.
    pub source: ImportSource,
}

impl ImportSourceDetails {
    /// Creates details from their parts.
    #[must_use]
    pub const fn new(target: TargetBranch, source: ImportSource) -> Self {
        Self { target, source }
    }

    /// Encodes the details as worker arguments.
    #[must_use]
    pub fn to_arguments(&self) -> Vec<String> {
        let mut arguments = vec![
            self.target.as_str().to_owned(),
            self.source.kind().as_str().to_owned(),
        ];
        match &self.source {
            ImportSource::Cvs { root, module } => {
                arguments.push(root.clone());
                arguments.push(module.clone());
            }
            ImportSource::Svn { url } | ImportSource::Git { url } | ImportSource::Bzr { url } => {
                arguments.push(url.clone());
            }
        }
        arguments
    }

    /// Decodes worker arguments.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::InvalidWorkerArguments`] when the vector has
    /// the wrong shape or names an unknown VCS, and the relevant validation
    /// error when the target or source values are malformed.
    pub fn from_arguments<S: AsRef<str>>(arguments: &[S]) -> Result<Self, JobDomainError> {
        let values: Vec<&str> = arguments.iter().map(AsRef::as_ref).collect();
        let (target, kind_name, rest) = match values.as_slice() {
            [target, kind_name, rest @ ..] => (*target, *kind_name, rest),
            _ => {
                return Err(JobDomainError::InvalidWorkerArguments(format!(
                    "expected at least 3 arguments, got {}",
                    values.len()
                )));
            }
        };
        let kind = VcsKind::try_from(kind_name)
            .map_err(|err| JobDomainError::InvalidWorkerArguments(err.to_string()))?;
        let source = match (kind, rest) {
            (VcsKind::Cvs, [root, module]) => ImportSource::cvs(*root, *module)?,
            (VcsKind::Svn | VcsKind::Git | VcsKind::Bzr, [url]) => {
                ImportSource::from_url(kind, *url)?
            }
            _ => {
                return Err(JobDomainError::InvalidWorkerArguments(format!(
                    "{} imports take {} source argument(s), got {}",
                    kind,
                    if kind == VcsKind::Cvs { 2 } else { 1 },
                    rest.len()
                )));
            }
        };
        Ok(Self {
            target: TargetBranch::new(target)?,
            source,
        })
    }
}
