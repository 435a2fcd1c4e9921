//! Fakes and fixtures for exercising the driver without FUSE or root.
//!
//! - **Host**: [`FakeHost`], a scripted subprocess runner that also serves
//!   as the mount table, so `ossfs` calls show up as mounts
//! - **Fixture**: [`DriverFixture`], a temporary directory laid out like a
//!   node with a kubelet tree and a shared mount root
//! - **Credentials**: [`StaticCredentials`], a fixed ambient key pair
//!
//! # Usage
//!
//! ```
//! use ossflex_mount::testing::{DriverFixture, FakeHost};
//! use ossflex_mount::{FuseTools, Orchestrator};
//!
//! let fixture = DriverFixture::new();
//! let host = FakeHost::new();
//! let orchestrator = Orchestrator::new(
//!     fixture.paths().clone(),
//!     FuseTools::default(),
//!     host.clone(),
//!     host.clone(),
//! );
//! # let _ = orchestrator;
//! ```

mod fixture;
mod host;

pub use fixture::{DriverFixture, StaticCredentials};
pub use host::FakeHost;
