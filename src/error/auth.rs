//! Detection of credential failures in error text.

use std::sync::OnceLock;

use regex::Regex;

use crate::types::RemediationAction;

/// Command the UI runs to open API key configuration.
pub const CONFIGURE_API_KEY_COMMAND: &str = "weft.configureApiKey";
/// Command the UI runs to resubmit the last turn.
pub const RETRY_COMMAND: &str = "weft.retry";

fn auth_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"(?i)(api[ _-]?key|x-api-key|unauthori[sz]ed|unauthenticated|authentication|\b401\b)",
            )
            .ok()
        })
        .as_ref()
}

/// Whether an error message looks like a missing or rejected credential.
pub fn is_authentication_error(message: &str) -> bool {
    auth_pattern().is_some_and(|pattern| pattern.is_match(message))
}

/// Remediation actions to attach to an error message.
///
/// Authentication failures get actionable buttons; other errors get none.
pub fn remediation_actions(message: &str) -> Vec<RemediationAction> {
    if !is_authentication_error(message) {
        return Vec::new();
    }
    vec![
        RemediationAction::new("Configure API key", CONFIGURE_API_KEY_COMMAND),
        RemediationAction::new("Retry", RETRY_COMMAND),
    ]
}
