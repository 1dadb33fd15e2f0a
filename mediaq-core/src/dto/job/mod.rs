//! Job DTOs

use serde::{Deserialize, Serialize};

/// Request to register a new download job
///
/// `download_type` stays a plain string so an unknown value is reported by
/// the validator instead of a deserialization rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJob {
    pub url: String,
    pub download_type: String,
    #[serde(default)]
    pub extra_options: Option<String>,
}
