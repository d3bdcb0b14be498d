//! The patch artifact: forward, reverse, and validation scripts plus the
//! approval state the coordinator gates on.
//!
//! Scripts are opaque payloads intended for a POSIX shell on the target.
//! Any syntactic validation happened upstream in the generation pipeline;
//! the core never inspects script content beyond splitting reverse scripts
//! into lines at rollback time.

use crate::ids::PatchId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata key naming the service to verify after rollback.
pub const META_SERVICE_NAME: &str = "service_name";
/// Metadata key naming the package touched by the patch.
pub const META_PACKAGE_NAME: &str = "package_name";
/// Metadata key holding the package version expected after rollback.
pub const META_PREVIOUS_VERSION: &str = "previous_version";

/// Approval state of a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalState {
    /// Awaiting human or policy approval.
    Pending,
    /// Approved for deployment.
    Approved,
    /// Rejected; must never be deployed.
    Rejected,
}

/// Outcome of the upstream sandbox test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    /// Patch has not been through the testing harness.
    NotTested,
    /// Patch passed its sandbox test run.
    Passed,
    /// Patch failed its sandbox test run.
    Failed,
}

/// The immutable artifact to deploy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    /// Stable identifier.
    pub id: PatchId,
    /// Forward script applied to each asset.
    pub forward_script: String,
    /// Reverse script used for rollback, if one was generated.
    pub reverse_script: Option<String>,
    /// Validation script run after a successful forward apply.
    pub validation_script: Option<String>,
    /// Free-form metadata; `service_name`, `package_name`, and
    /// `previous_version` are consumed by rollback verification.
    pub metadata: HashMap<String, String>,
    /// Generator confidence score, clamped to 0-100.
    pub confidence: u8,
    /// Approval state.
    pub approval: ApprovalState,
    /// Sandbox test outcome.
    pub test_status: TestStatus,
}

impl Patch {
    /// Creates a new pending, untested patch with a forward script.
    #[must_use]
    pub fn new(id: impl Into<PatchId>, forward_script: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            forward_script: forward_script.into(),
            reverse_script: None,
            validation_script: None,
            metadata: HashMap::new(),
            confidence: 0,
            approval: ApprovalState::Pending,
            test_status: TestStatus::NotTested,
        }
    }

    /// Sets the reverse script.
    #[must_use]
    pub fn with_reverse_script(mut self, script: impl Into<String>) -> Self {
        self.reverse_script = Some(script.into());
        self
    }

    /// Sets the validation script.
    #[must_use]
    pub fn with_validation_script(mut self, script: impl Into<String>) -> Self {
        self.validation_script = Some(script.into());
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Sets the confidence score, clamped to 100.
    #[must_use]
    pub fn with_confidence(mut self, confidence: u8) -> Self {
        self.confidence = confidence.min(100);
        self
    }

    /// Marks the patch approved and test-passed.
    ///
    /// Convenience for tests and fixtures; production patches arrive with
    /// their states already set by the approval pipeline.
    #[must_use]
    pub fn approved(mut self) -> Self {
        self.approval = ApprovalState::Approved;
        self.test_status = TestStatus::Passed;
        self
    }

    /// Checks whether this patch may be deployed.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the patch is not deployable:
    /// not approved, not test-passed, or carrying an empty forward script.
    pub fn deployable(&self) -> Result<(), String> {
        if self.forward_script.trim().is_empty() {
            return Err("patch forward script is empty".to_string());
        }
        if self.approval != ApprovalState::Approved {
            return Err(format!("patch approval state is {:?}", self.approval));
        }
        if self.test_status != TestStatus::Passed {
            return Err(format!("patch test status is {:?}", self.test_status));
        }
        Ok(())
    }

    /// Returns true if a reverse script is present and non-empty.
    #[must_use]
    pub fn has_reverse_script(&self) -> bool {
        self.reverse_script
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
    }

    /// Service name used by rollback verification, if set.
    #[must_use]
    pub fn service_name(&self) -> Option<&str> {
        self.metadata.get(META_SERVICE_NAME).map(String::as_str)
    }

    /// Package name used by rollback verification, if set.
    #[must_use]
    pub fn package_name(&self) -> Option<&str> {
        self.metadata.get(META_PACKAGE_NAME).map(String::as_str)
    }

    /// Expected post-rollback package version, if set.
    #[must_use]
    pub fn previous_version(&self) -> Option<&str> {
        self.metadata.get(META_PREVIOUS_VERSION).map(String::as_str)
    }
}
