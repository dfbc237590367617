//! Client-side validation of flood report submissions.
//!
//! A [`ReportDraft`] only reaches the network as a [`ValidatedReport`], so a
//! draft that fails these checks can never be sent.

use crate::error::Error;
use crate::models::Severity;

pub const MIN_TITLE_CHARS: usize = 5;
pub const MIN_DESCRIPTION_CHARS: usize = 20;
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Photo attached to a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportImage {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Report as entered by the user, not yet checked.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportDraft {
    pub title: String,
    pub description: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub severity: Severity,
    pub image: Option<ReportImage>,
}

impl ReportDraft {
    #[must_use]
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_position(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    #[must_use]
    pub fn with_image(mut self, image: ReportImage) -> Self {
        self.image = Some(image);
        self
    }

    /// Checks every field and reports all failures at once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] listing each offending field.
    pub fn validate(self) -> Result<ValidatedReport, Error> {
        let mut errors = ValidationErrors::default();

        if self.title.trim().is_empty() {
            errors.push("title", "Title is required");
        } else if self.title.chars().count() < MIN_TITLE_CHARS {
            errors.push("title", "Title must be at least 5 characters long");
        }

        if self.description.trim().is_empty() {
            errors.push("description", "Description is required");
        } else if self.description.chars().count() < MIN_DESCRIPTION_CHARS {
            errors.push("description", "Description must be at least 20 characters long");
        }

        match self.latitude {
            None => errors.push("latitude", "Latitude is required"),
            Some(lat) if !(-90.0..=90.0).contains(&lat) => {
                errors.push("latitude", "Invalid latitude value");
            }
            Some(_) => {}
        }

        match self.longitude {
            None => errors.push("longitude", "Longitude is required"),
            Some(lon) if !(-180.0..=180.0).contains(&lon) => {
                errors.push("longitude", "Invalid longitude value");
            }
            Some(_) => {}
        }

        if self.image.as_ref().is_some_and(|img| img.bytes.len() > MAX_IMAGE_BYTES) {
            errors.push("image", "Image size must be less than 5MB");
        }

        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) if errors.is_empty() => Ok(ValidatedReport {
                title: self.title,
                description: self.description,
                latitude,
                longitude,
                severity: self.severity,
                image: self.image,
            }),
            _ => Err(Error::Validation(errors)),
        }
    }
}

/// A report that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedReport {
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) latitude: f64,
    pub(crate) longitude: f64,
    pub(crate) severity: Severity,
    pub(crate) image: Option<ReportImage>,
}

impl ValidatedReport {
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    #[must_use]
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Field-level validation failures, in field order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    fn push(&mut self, field: &'static str, message: &str) {
        self.errors.push(FieldError {
            field,
            message: message.to_owned(),
        });
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Message for `field`, if it failed.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.errors
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.errors.iter()
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, e) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", e.field, e.message)?;
        }
        Ok(())
    }
}
