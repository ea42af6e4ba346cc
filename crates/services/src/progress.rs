//! Hybrid progress persistence: device-local first, remote mirror best effort.
//!
//! Writes always land in local storage; the remote mirror is attempted after
//! and its failures are logged, never surfaced. Reads ask the remote store
//! first and fall back to local state when it cannot answer (including when
//! nobody is signed in).

use mcq_core::model::{
    Institute, InstituteId, InstituteStats, SectionId, SectionProgress, TestId, is_fully_completed,
    percentage,
};
use storage::local::LocalProgressStore;
use tracing::{debug, info, warn};

use crate::auth::AuthSession;
use crate::error::{ProgressError, RemoteError};
use crate::remote_progress::{RemoteProgressStore, UserProgress};

/// Outcome of replaying local progress to the remote store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub sections_synced: usize,
    pub tests_synced: usize,
    pub failures: usize,
}

#[derive(Clone)]
pub struct ProgressSync {
    auth: AuthSession,
    local: LocalProgressStore,
    remote: RemoteProgressStore,
}

impl ProgressSync {
    #[must_use]
    pub fn new(auth: AuthSession, local: LocalProgressStore, remote: RemoteProgressStore) -> Self {
        Self {
            auth,
            local,
            remote,
        }
    }

    #[must_use]
    pub fn local(&self) -> &LocalProgressStore {
        &self.local
    }

    #[must_use]
    pub fn remote(&self) -> &RemoteProgressStore {
        &self.remote
    }

    //
    // ─── WRITES ────────────────────────────────────────────────────────────────
    //

    /// Flip a section's completion flag and mirror the new value.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Local` if local storage cannot be written.
    pub async fn toggle_section_completion(
        &self,
        coaching_id: &InstituteId,
        test_id: &TestId,
        section_id: &SectionId,
    ) -> Result<bool, ProgressError> {
        let completed = self
            .local
            .toggle_section_completion(coaching_id, test_id, section_id)?;
        if let Err(err) = self
            .remote
            .save_section_progress(coaching_id, test_id, section_id, completed)
            .await
        {
            warn!(%coaching_id, %test_id, %section_id, error = %err, "section progress not mirrored");
        }
        Ok(completed)
    }

    /// # Errors
    ///
    /// Returns `ProgressError::Local` if local storage cannot be written.
    pub async fn mark_test_complete(
        &self,
        coaching_id: &InstituteId,
        test_id: &TestId,
    ) -> Result<(), ProgressError> {
        self.local.mark_test_complete(coaching_id, test_id)?;
        if let Err(err) = self.remote.save_test_complete(coaching_id, test_id).await {
            warn!(%coaching_id, %test_id, error = %err, "test completion not mirrored");
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `ProgressError::Local` if local storage cannot be written.
    pub async fn unmark_test_complete(
        &self,
        coaching_id: &InstituteId,
        test_id: &TestId,
    ) -> Result<(), ProgressError> {
        self.local.unmark_test_complete(coaching_id, test_id)?;
        if let Err(err) = self.remote.unmark_test_complete(coaching_id, test_id).await {
            warn!(%coaching_id, %test_id, error = %err, "test un-completion not mirrored");
        }
        Ok(())
    }

    //
    // ─── READS ─────────────────────────────────────────────────────────────────
    //

    pub async fn is_test_complete_hybrid(&self, coaching_id: &InstituteId, test_id: &TestId) -> bool {
        match self.remote.is_test_complete(coaching_id, test_id).await {
            Ok(done) => done,
            Err(err) => {
                log_fallback(&err);
                self.local.is_test_complete(coaching_id, test_id)
            }
        }
    }

    pub async fn is_section_completed_hybrid(
        &self,
        coaching_id: &InstituteId,
        test_id: &TestId,
        section_id: &SectionId,
    ) -> bool {
        match self
            .remote
            .is_section_completed(coaching_id, test_id, section_id)
            .await
        {
            Ok(done) => done,
            Err(err) => {
                log_fallback(&err);
                self.local
                    .is_section_completed(coaching_id, test_id, section_id)
            }
        }
    }

    #[must_use]
    pub fn is_test_complete(&self, coaching_id: &InstituteId, test_id: &TestId) -> bool {
        self.local.is_test_complete(coaching_id, test_id)
    }

    #[must_use]
    pub fn is_section_completed(
        &self,
        coaching_id: &InstituteId,
        test_id: &TestId,
        section_id: &SectionId,
    ) -> bool {
        self.local
            .is_section_completed(coaching_id, test_id, section_id)
    }

    #[must_use]
    pub fn test_section_progress(
        &self,
        coaching_id: &InstituteId,
        test_id: &TestId,
        total_sections: usize,
    ) -> SectionProgress {
        self.local
            .test_section_progress(coaching_id, test_id, total_sections)
    }

    /// Remote per-test progress; zeroes when the remote store cannot answer.
    pub async fn remote_test_progress(
        &self,
        coaching_id: &InstituteId,
        test_id: &TestId,
    ) -> SectionProgress {
        self.remote
            .test_progress(coaching_id, test_id)
            .await
            .unwrap_or_else(|err| {
                warn!(%coaching_id, %test_id, error = %err, "remote test progress unavailable");
                SectionProgress::from_remote(0, 0)
            })
    }

    /// The current user's remote records; empty when unavailable.
    pub async fn all_user_progress(&self) -> UserProgress {
        self.remote.all_user_progress().await.unwrap_or_else(|err| {
            warn!(error = %err, "remote progress unavailable");
            UserProgress::default()
        })
    }

    //
    // ─── BULK ──────────────────────────────────────────────────────────────────
    //

    /// Replay local completions to the remote store for the signed-in user.
    ///
    /// Each record is pushed on its own; one failure does not stop the rest.
    pub async fn initialize_progress_sync(&self) -> SyncReport {
        let mut report = SyncReport::default();
        if self.auth.user_id().is_none() {
            debug!("progress sync skipped, nobody signed in");
            return report;
        }

        for completion in self
            .local
            .section_completions()
            .into_iter()
            .filter(|c| c.is_completed)
        {
            match self
                .remote
                .save_section_progress(
                    &completion.coaching_id,
                    &completion.test_id,
                    &completion.section_id,
                    true,
                )
                .await
            {
                Ok(()) => report.sections_synced += 1,
                Err(err) => {
                    report.failures += 1;
                    warn!(section_id = %completion.section_id, error = %err, "section sync failed");
                }
            }
        }

        for key in self.local.completed_tests() {
            match self
                .remote
                .save_test_complete(&key.coaching_id, &key.test_id)
                .await
            {
                Ok(()) => report.tests_synced += 1,
                Err(err) => {
                    report.failures += 1;
                    warn!(test_id = %key.test_id, error = %err, "test sync failed");
                }
            }
        }

        info!(
            sections = report.sections_synced,
            tests = report.tests_synced,
            failures = report.failures,
            "progress synced to remote store"
        );
        report
    }

    /// Complete every section of a test; returns how many were flipped.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Local` if local storage cannot be written.
    pub async fn mark_all_sections(
        &self,
        institute: &Institute,
        test_id: &TestId,
    ) -> Result<usize, ProgressError> {
        self.set_all_sections(institute, test_id, true).await
    }

    /// Clear every completed section of a test; returns how many were flipped.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Local` if local storage cannot be written.
    pub async fn reset_test(
        &self,
        institute: &Institute,
        test_id: &TestId,
    ) -> Result<usize, ProgressError> {
        self.set_all_sections(institute, test_id, false).await
    }

    async fn set_all_sections(
        &self,
        institute: &Institute,
        test_id: &TestId,
        completed: bool,
    ) -> Result<usize, ProgressError> {
        let mut flipped = 0;
        for section in institute.sections() {
            if self.is_section_completed(institute.id(), test_id, &section.id) != completed {
                self.toggle_section_completion(institute.id(), test_id, &section.id)
                    .await?;
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    /// Local completion across the institute's test × section grid.
    #[must_use]
    pub fn institute_stats(&self, institute: &Institute) -> InstituteStats {
        let sections = institute.sections();
        let total_cells = institute.tests().len() * sections.len();
        let mut completed_cells = 0;
        let mut completed_tests = 0;

        for test in institute.tests() {
            let done = sections
                .iter()
                .filter(|s| self.is_section_completed(institute.id(), &test.id, &s.id))
                .count();
            completed_cells += done;
            if is_fully_completed(done, sections.len()) {
                completed_tests += 1;
            }
        }

        InstituteStats {
            total_cells,
            completed_cells,
            overall_percentage: percentage(completed_cells, total_cells),
            completed_tests,
        }
    }
}

fn log_fallback(err: &RemoteError) {
    match err {
        RemoteError::NotAuthenticated => debug!("not signed in, reading local progress"),
        other => warn!(error = %other, "remote progress read failed, reading local progress"),
    }
}
