#![doc = include_str!("../README.md")]

pub mod api;
pub mod client;
pub mod config;
pub mod credential;
pub mod error;
pub mod location;
pub mod models;
pub mod poll;
pub mod report;
pub mod route;
pub mod session;
pub mod token;
pub mod types;

// Re-exports for convenient access
pub use api::{
    ApiClient, AuthApi, AuthResponse, DEFAULT_NEARBY_RADIUS, PasswordChange, ProfileUpdate,
    RegisterRequest, UserProfile,
};
pub use client::FloodGuard;
pub use config::ClientConfig;
pub use credential::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use error::Error;
pub use location::{
    Geocoder, Geolocator, LocationSelection, LocationSource, LocationStream, LocationWatcher,
    NominatimGeocoder, Place,
};
pub use models::{FloodRisk, Page, Report, ReportStatus, Severity, WeatherData};
pub use poll::{
    DataKind, Fetcher, PollData, PollScheduler, PollSubscription, PollUpdate, RequestTag,
};
pub use report::{FieldError, ReportDraft, ReportImage, ValidatedReport, ValidationErrors};
pub use route::{Decision, Destination, Navigator, decide};
pub use session::{Session, SessionEvent, SessionManager, SessionStatus, SessionView};
pub use token::{Identity, decode_identity};
pub use types::{ReportId, Role, UserId};
