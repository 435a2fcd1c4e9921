//! The JSON object every driver invocation prints.

use serde::Serialize;

/// Outcome of a driver call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    /// The operation completed
    Success,
    /// The operation failed; `message` says why
    Failure,
    /// The verb is not implemented by this driver
    #[serde(rename = "Not supported")]
    NotSupported,
}

/// Capabilities reported by `init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    /// Whether the driver implements attach/detach
    pub attach: bool,
}

/// Result object written to stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriverResult {
    /// Outcome
    pub status: Status,
    /// Human-readable detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Unique volume name, only for `getvolumename`
    #[serde(rename = "volumeName", skip_serializing_if = "Option::is_none")]
    pub volume_name: Option<String>,
    /// Only for `init`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,
}

impl DriverResult {
    /// Plain success.
    pub fn success() -> Self {
        Self {
            status: Status::Success,
            message: None,
            volume_name: None,
            capabilities: None,
        }
    }

    /// The `init` reply: success without attach support.
    pub fn init() -> Self {
        Self {
            capabilities: Some(Capabilities { attach: false }),
            ..Self::success()
        }
    }

    /// Reply for verbs this driver does not implement.
    pub fn not_supported() -> Self {
        Self {
            status: Status::NotSupported,
            ..Self::success()
        }
    }

    /// Failure with a reason.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: Status::Failure,
            message: Some(message.into()),
            ..Self::success()
        }
    }

    /// Attach a volume name.
    #[must_use]
    pub fn with_volume_name(mut self, name: impl Into<String>) -> Self {
        self.volume_name = Some(name.into());
        self
    }
}
