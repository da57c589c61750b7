//! # Projects and Pledges
//!
//! The crowdfunding layer proper: project descriptors and their identity,
//! the interchange messages, pledge verification, owner authentication,
//! and contract assembly. Everything here is pure protocol logic over the
//! chain primitives; wallet state lives in `crate::wallet`.

pub mod auth;
pub mod contract;
pub mod descriptor;
pub mod messages;
pub mod verifier;

#[cfg(test)]
pub(crate) mod testutil;

pub use auth::OwnerAuthError;
pub use descriptor::{title_to_url_slug, Project, ProjectError};
pub use messages::{PledgeContact, PledgeHash, PledgeMessage, ProjectDetails, ProjectEnvelope};
pub use verifier::{VerificationError, VerifiedPledge};
