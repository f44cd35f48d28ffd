use std::io;
use std::sync::Arc;

use thiserror::Error;

use super::apply::{ApplyError, ChangeApplier};
use super::confirm::Confirm;
use super::model::FileMetadata;
use super::paths::PathError;
use super::remote::{RemoteError, RemoteTree};
use super::resolver::{ChangeResolver, ResolveError};
use crate::context::SyncContext;

#[derive(Debug, Error)]
pub enum PullError {
    #[error("not inside a sync root; run `yadisk-pull init` first")]
    NoContext,
    #[error("remote lookup failed: {0}")]
    Remote(#[from] RemoteError),
    #[error("failed to resolve changes: {0}")]
    Resolve(#[from] ResolveError),
    #[error("failed to apply changes: {0}")]
    Apply(#[from] ApplyError),
    #[error("path error: {0}")]
    Path(#[from] PathError),
    #[error("failed to stat local entry: {0}")]
    LocalStat(#[source] io::Error),
}

/// How a successful pull ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// The remote path does not exist.
    NothingToPull,
    /// Remote and local already agree.
    UpToDate,
    /// The operator rejected the change list; nothing was touched.
    Declined,
    Applied(usize),
}

/// Drives one pull: remote lookup, local snapshot, resolution, confirmation
/// and apply.
pub struct Puller {
    context: Option<SyncContext>,
    remote: Arc<dyn RemoteTree>,
    resolver: Arc<dyn ChangeResolver>,
    applier: ChangeApplier,
    confirm: Box<dyn Confirm>,
}

impl Puller {
    pub fn new(
        context: Option<SyncContext>,
        remote: Arc<dyn RemoteTree>,
        resolver: Arc<dyn ChangeResolver>,
        applier: ChangeApplier,
        confirm: Box<dyn Confirm>,
    ) -> Self {
        Self {
            context,
            remote,
            resolver,
            applier,
            confirm,
        }
    }

    pub async fn pull(&self, path: &str) -> Result<PullOutcome, PullError> {
        let context = self.context.as_ref().ok_or(PullError::NoContext)?;

        let Some(remote) = self.remote.find_by_path(path).await? else {
            tracing::info!(path, "nothing to pull: remote entry does not exist");
            return Ok(PullOutcome::NothingToPull);
        };

        let abs_path = context.abs_path_of(path)?;
        let local = match tokio::fs::metadata(&abs_path).await {
            Ok(meta) => Some(FileMetadata::local(path, &meta)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => return Err(PullError::LocalStat(err)),
        };

        tracing::info!(path, "resolving changes");
        let changes = self
            .resolver
            .resolve_changes(true, path, Some(&remote), local.as_ref())
            .await?;
        if changes.is_empty() {
            tracing::info!(path, "already up to date");
            return Ok(PullOutcome::UpToDate);
        }

        if !self.confirm.confirm(&changes) {
            tracing::info!(path, changes = changes.len(), "pull declined by operator");
            return Ok(PullOutcome::Declined);
        }

        self.applier.apply(&changes).await?;
        Ok(PullOutcome::Applied(changes.len()))
    }
}
