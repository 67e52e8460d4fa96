use serde::{Deserialize, Serialize};

use crate::error::RecorderError;

/// Study context attached to every recording
///
/// Supplied by the host before `start()`; the recorder treats a missing
/// value as a caller error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialContext {
    /// Participant identifier (e.g., "P-014")
    pub participant_id: String,

    /// Trial the participant is currently in (e.g., "Trial_1")
    pub trial_type: String,
}

impl TrialContext {
    pub fn new(participant_id: impl Into<String>, trial_type: impl Into<String>) -> Self {
        Self {
            participant_id: participant_id.into(),
            trial_type: trial_type.into(),
        }
    }

    pub fn validate(&self) -> Result<(), RecorderError> {
        if self.participant_id.trim().is_empty() {
            return Err(RecorderError::MissingContext("participant_id"));
        }
        if self.trial_type.trim().is_empty() {
            return Err(RecorderError::MissingContext("trial_type"));
        }
        Ok(())
    }
}
