//! Exit codes for the driver.
//!
//! The kubelet only distinguishes zero from non-zero and reads the JSON
//! result for details. The finer codes are for operators running the
//! driver by hand.

/// Success, or a verb this driver does not implement
pub const SUCCESS: u8 = 0;

/// General/unspecified error
pub const GENERAL_ERROR: u8 = 1;

/// Bad arguments, malformed options or an unusable mount path
pub const USAGE_ERROR: u8 = 2;

/// Permission denied
pub const PERMISSION_DENIED: u8 = 5;

/// ossfs or fusermount failed
pub const MOUNT_FAILED: u8 = 6;

/// File or directory not found
pub const NOT_FOUND: u8 = 7;
