//! Chaoscenter account credentials
//!
//! The administrator creates a secret with `admin_password` and
//! `charm_password`, grants it to the application and sets its id in the
//! `user-secret-id` option. Every pass makes sure chaoscenter's `admin` user
//! and the `charm` bot account use those passwords, so a redeployed
//! chaoscenter pointed at the same secret keeps access to its database.

use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::controller::collector::parse_databag;
use crate::model::{Databag, DatabagEncoding, Model};
use crate::workload::litmusctl::Litmusctl;

pub const SECRET_PREFIX: &str = "secret:";
pub const ADMIN_USER: &str = "admin";
pub const CHARM_USER: &str = "charm";

/// Unit state key holding the fingerprint of the last applied secret content
const APPLIED_STATE: &str = "user-secret-applied";

#[derive(Clone, Deserialize)]
struct UserSecret {
    admin_password: String,
    charm_password: String,
}

/// What a user sync pass did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserSyncOutcome {
    /// No secret configured
    NotConfigured,
    /// The id is malformed, the secret is missing or its content is invalid
    Skipped,
    /// New content was applied and is now tracked
    Updated,
    /// Tracked content was re-applied
    Reapplied,
    /// litmusctl failed; retried on the next pass
    Failed,
}

fn fingerprint(content: &Databag) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in content {
        hasher.update(key.as_bytes());
        hasher.update([0]);
        hasher.update(value.as_bytes());
        hasher.update([0]);
    }
    hex::encode(hasher.finalize())
}

/// The configured secret's content, if it can be used
fn secret_content(model: &Model) -> Option<&Databag> {
    let secret_id = model.config.user_secret_id.as_deref()?;
    if !secret_id.starts_with(SECRET_PREFIX) {
        warn!(
            "Invalid secret identifier '{}' in config; expected format 'secret:<...>'",
            secret_id
        );
        return None;
    }
    let content = model.secrets.get(secret_id);
    if content.is_none() {
        warn!(
            "Secret '{}' not found; ensure it exists, was granted to this application and the identifier is correct",
            secret_id
        );
    }
    content
}

fn apply(litmusctl: &mut Litmusctl<'_>, secret: &UserSecret) -> bool {
    let result = litmusctl
        .set_account(ADMIN_USER, &secret.admin_password)
        .and_then(|_| litmusctl.set_account(CHARM_USER, &secret.charm_password));
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to apply user credentials: {}", e);
            false
        }
    }
}

/// Bring chaoscenter's accounts in line with the user secret
pub fn reconcile(model: &mut Model, litmusctl: &mut Litmusctl<'_>) -> UserSyncOutcome {
    if model.config.user_secret_id.is_none() {
        return UserSyncOutcome::NotConfigured;
    }
    let Some(content) = secret_content(model) else {
        return UserSyncOutcome::Skipped;
    };
    let latest = fingerprint(content);
    let Some(secret) = parse_databag::<UserSecret>(content, DatabagEncoding::Plain) else {
        warn!("Invalid user secret content; expected admin_password and charm_password");
        return UserSyncOutcome::Skipped;
    };

    let changed = model.unit_state.get(APPLIED_STATE) != Some(&latest);
    if changed {
        info!("User secret changed; applying new credentials");
    } else {
        debug!("User secret unchanged; ensuring credentials are applied");
    }
    if !apply(litmusctl, &secret) {
        warn!("Will retry applying user credentials on the next pass");
        return UserSyncOutcome::Failed;
    }
    if changed {
        model.unit_state.insert(APPLIED_STATE.to_string(), latest);
        UserSyncOutcome::Updated
    } else {
        UserSyncOutcome::Reapplied
    }
}
