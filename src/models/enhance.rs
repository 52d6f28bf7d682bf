use serde::Deserialize;

/// Why a photo submission was refused before any upstream call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Denial {
    NotRegistered,
    OutOfCredits,
    QuotaExhausted,
}

/// Steps after authorization; used to tag upstream failures in the logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Resolve,
    Upload,
    Relay,
    Enhance,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Resolve => "resolve",
            Stage::Upload => "upload",
            Stage::Relay => "relay",
            Stage::Enhance => "enhance",
        };
        f.write_str(name)
    }
}

/// A photo as submitted over chat.
#[derive(Clone, Debug)]
pub struct Submission {
    pub user_id: i64,
    pub display_name: String,
    pub file_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnhancedPhoto {
    pub url: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct EnhancerResponse {
    pub result: Option<String>,
}
