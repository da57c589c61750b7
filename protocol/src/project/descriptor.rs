//! The project descriptor: parsed details plus a stable identity.
//!
//! A [`Project`] is constructed once from its envelope and immutable
//! thereafter. Its id hashes the serialized details bytes exactly as they
//! were received, so re-wrapping or re-parsing a project never changes its
//! identity, and two parties holding the same file always agree on the id.

use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

use super::messages::{ProjectDetails, ProjectEnvelope};
use crate::chain::{Address, Amount, AmountError, TxOutput};
use crate::crypto::{domain_separated_hash, BeaconPublicKey};

/// Domain tag for project ids.
const PROJECT_ID_CONTEXT: &str = "beacon.project.id.v1";

/// Errors from project construction.
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("malformed project details: {0}")]
    MalformedDetails(#[from] serde_json::Error),

    #[error("project declares no outputs")]
    NoOutputs,

    #[error("project goal is not representable: {0}")]
    Goal(#[from] AmountError),
}

/// An immutable, validated project.
#[derive(Clone)]
pub struct Project {
    envelope: ProjectEnvelope,
    details: ProjectDetails,
    goal: Amount,
    id: String,
}

impl Project {
    /// Parse and validate a project from its envelope.
    pub fn from_envelope(envelope: ProjectEnvelope) -> Result<Self, ProjectError> {
        let details = envelope.parse_details()?;
        if details.outputs.is_empty() {
            return Err(ProjectError::NoOutputs);
        }
        let goal = details.goal()?;
        let id = hex::encode(domain_separated_hash(
            PROJECT_ID_CONTEXT,
            &envelope.serialized_details,
        ));
        Ok(Self {
            envelope,
            details,
            goal,
            id,
        })
    }

    /// Wrap freshly built details into an envelope and validate.
    pub fn from_details(details: &ProjectDetails) -> Result<Self, ProjectError> {
        Self::from_envelope(ProjectEnvelope::from_details(details)?)
    }

    /// Build the details for a new project with a single required output
    /// paying `goal` to `destination`.
    ///
    /// The message format supports multiple outputs; this default builder
    /// creates one.
    pub fn make_details(
        title: &str,
        memo: &str,
        destination: &Address,
        goal: Amount,
        auth_key: &BeaconPublicKey,
        auth_key_index: u32,
        now: u64,
    ) -> ProjectDetails {
        ProjectDetails {
            network: "unittest".into(),
            title: title.to_owned(),
            memo: memo.to_owned(),
            outputs: vec![TxOutput::pay_to_address(goal, destination)],
            payment_url: None,
            merchant_data: None,
            expires: None,
            time: now,
            auth_key: *auth_key,
            auth_key_index,
        }
    }

    /// The project id: a stable hash of the serialized details bytes.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.details.title
    }

    pub fn memo(&self) -> &str {
        &self.details.memo
    }

    /// The sum of all required outputs.
    pub fn goal_amount(&self) -> Amount {
        self.goal
    }

    /// The outputs a claim transaction must pay, in order.
    pub fn outputs(&self) -> &[TxOutput] {
        &self.details.outputs
    }

    /// The owner's authentication key.
    pub fn auth_key(&self) -> &BeaconPublicKey {
        &self.details.auth_key
    }

    /// The keychain index recorded for the auth key.
    pub fn auth_key_index(&self) -> u32 {
        self.details.auth_key_index
    }

    /// The parsed details.
    pub fn details(&self) -> &ProjectDetails {
        &self.details
    }

    /// The envelope this project was constructed from.
    pub fn envelope(&self) -> &ProjectEnvelope {
        &self.envelope
    }

    /// URL-safe slug derived from the title.
    pub fn slug(&self) -> String {
        title_to_url_slug(&self.details.title)
    }
}

impl PartialEq for Project {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Project {}

impl Hash for Project {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Project")
            .field("id", &self.id)
            .field("title", &self.details.title)
            .field("goal", &self.goal)
            .finish()
    }
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.details.title, self.id)
    }
}

/// Derive a URL slug from a project title.
///
/// Lowercase the title, turn each whitespace run into a single hyphen,
/// then drop every remaining character outside `[a-z0-9-]` and trim
/// leading and trailing hyphens. Punctuation adjacent to spaces therefore
/// leaves its hyphens behind ("weird // chars" becomes "weird--chars"),
/// which keeps the mapping stable and trivially reversible to eyeball.
pub fn title_to_url_slug(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut in_whitespace = false;
    for c in title.to_lowercase().chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                slug.push('-');
                in_whitespace = true;
            }
        } else {
            in_whitespace = false;
            if c.is_ascii_alphanumeric() || c == '-' {
                slug.push(c);
            }
        }
    }
    slug.trim_matches('-').to_owned()
}
