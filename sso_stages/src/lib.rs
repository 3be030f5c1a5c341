//! Deployment stages of the identity service
//!
//! Every environment the identity service is deployed to is named by a
//! _stage_. The stage decides which hosts the clients in the `sso` family
//! talk to, with production being served from a host that does not carry
//! the stage name.
//!
//! ```
//! use sso_stages::{Stage, StageRef};
//!
//! let stage = Stage::from_static(sso_stages::TEST);
//! assert!(!stage.is_prod());
//! assert!(StageRef::from_str("prod").is_prod());
//! ```

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

use aliri_braid::braid;

/// The sandbox stage
pub const SANDBOX: &str = "sandbox";
/// The test stage
pub const TEST: &str = "test";
/// The staging stage
pub const STAGING: &str = "staging";
/// The verification stage
pub const VERIFY: &str = "verify";
/// The production stage
pub const PROD: &str = "prod";

/// All stages the identity service is known to be deployed to
pub const ALL: &[&str] = &[SANDBOX, TEST, STAGING, VERIFY, PROD];

/// The name of a deployment stage
#[braid(serde, ref_doc = "A borrowed reference to a deployment stage ([`Stage`])")]
pub struct Stage;

impl StageRef {
    /// Whether this is the production stage
    #[inline]
    pub fn is_prod(&self) -> bool {
        self.as_str() == PROD
    }

    /// Whether this is one of the stages in [`ALL`]
    pub fn is_well_known(&self) -> bool {
        ALL.contains(&self.as_str())
    }
}
