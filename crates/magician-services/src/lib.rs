//! Remote collaborators for magician VCR runs
//!
//! Cassette and log storage on Google Cloud Storage (through `gsutil`) and
//! the GitHub review platform, each behind an async trait so orchestration
//! can be driven against in-memory fakes.

pub mod error;
pub mod fakes;
pub mod gcs;
pub mod github;
pub mod traits;

pub use error::{ServiceError, ServiceResult};
pub use gcs::{GcsBuckets, GsutilStore};
pub use github::{GithubClient, GithubConfig, RetryConfig};
pub use traits::{
    CassetteStore, LogDestination, LogStore, LogUpload, ReviewPlatform, UploadTarget,
    MAJOR_RELEASE_BRANCH,
};
