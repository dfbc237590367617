use reqwest::multipart::{Form, Part};

use super::ApiClient;
use crate::error::Error;
use crate::location::LocationSelection;
use crate::models::{Page, Report};
use crate::report::{ReportDraft, ValidatedReport};

/// Search radius used by `/reports/nearby` when none is given, in metres.
pub const DEFAULT_NEARBY_RADIUS: f64 = 5000.0;

pub(super) const FEED_PAGE_SIZE: u32 = 10;

impl ApiClient {
    /// Community reports, newest first.
    ///
    /// # Errors
    ///
    /// See the [module documentation](super) for the failure classes.
    pub async fn reports(&self, page: u32, size: u32) -> Result<Page<Report>, Error> {
        let request = self.get("reports")?.query(&[("page", page), ("size", size)]);
        self.send(request).await
    }

    /// Reports submitted by the signed-in user.
    ///
    /// # Errors
    ///
    /// See the [module documentation](super) for the failure classes.
    pub async fn my_reports(&self, page: u32, size: u32) -> Result<Page<Report>, Error> {
        let request = self.get("reports/my")?.query(&[("page", page), ("size", size)]);
        self.send(request).await
    }

    /// Reports within `radius` metres of a point
    /// (default [`DEFAULT_NEARBY_RADIUS`]).
    ///
    /// # Errors
    ///
    /// See the [module documentation](super) for the failure classes.
    pub async fn nearby_reports(
        &self,
        latitude: f64,
        longitude: f64,
        radius: Option<f64>,
    ) -> Result<Vec<Report>, Error> {
        let request = self.get("reports/nearby")?.query(&[
            ("latitude", latitude),
            ("longitude", longitude),
            ("radius", radius.unwrap_or(DEFAULT_NEARBY_RADIUS)),
        ]);
        self.send(request).await
    }

    /// High and extreme severity reports near `location`.
    pub(super) async fn alerts_near(
        &self,
        location: &LocationSelection,
    ) -> Result<Vec<Report>, Error> {
        let reports = self
            .nearby_reports(location.latitude(), location.longitude(), None)
            .await?;
        Ok(reports
            .into_iter()
            .filter(|r| r.severity.is_alert())
            .collect())
    }

    /// Validates `draft` and submits it as a multipart form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] without touching the network if the
    /// draft is invalid; otherwise see the [module documentation](super).
    pub async fn submit_report(&self, draft: ReportDraft) -> Result<Report, Error> {
        let report = draft.validate()?;
        let form = multipart_form(report)?;
        let request = self.post("reports")?.multipart(form);
        self.send(request).await
    }
}

fn multipart_form(report: ValidatedReport) -> Result<Form, Error> {
    let mut form = Form::new()
        .text("title", report.title)
        .text("description", report.description)
        .text("latitude", report.latitude.to_string())
        .text("longitude", report.longitude.to_string())
        .text("severity", report.severity.as_str());

    if let Some(image) = report.image {
        let mut part = Part::bytes(image.bytes).file_name(image.file_name);
        if let Some(content_type) = image.content_type {
            part = part.mime_str(&content_type)?;
        }
        form = form.part("image", part);
    }
    Ok(form)
}
