use super::ApiClient;
use crate::error::Error;
use crate::models::{Page, Report};
use crate::types::ReportId;

// Role is enforced by the server; a non-admin session gets a 403, which is
// handled like any other authorization failure.
impl ApiClient {
    /// All reports, for moderation.
    ///
    /// # Errors
    ///
    /// See the [module documentation](super) for the failure classes.
    pub async fn admin_reports(&self, page: u32, size: u32) -> Result<Page<Report>, Error> {
        let request = self
            .get("admin/reports")?
            .query(&[("page", page), ("size", size)]);
        self.send(request).await
    }

    /// Mark a report as verified.
    ///
    /// # Errors
    ///
    /// See the [module documentation](super) for the failure classes.
    pub async fn approve_report(&self, id: ReportId) -> Result<Report, Error> {
        let request = self.post(&format!("admin/reports/{id}/approve"))?;
        self.send(request).await
    }

    /// Mark a report as rejected.
    ///
    /// # Errors
    ///
    /// See the [module documentation](super) for the failure classes.
    pub async fn reject_report(&self, id: ReportId) -> Result<Report, Error> {
        let request = self.post(&format!("admin/reports/{id}/reject"))?;
        self.send(request).await
    }
}
