//! Request identifiers

use uuid::Uuid;

/// Generate a fresh opaque request id.
///
/// Ids are `req-` followed by a simple (hyphen-free) v4 UUID so they are safe
/// to embed in URLs and log lines.
#[must_use]
pub fn generate_request_id() -> String {
    format!("req-{}", Uuid::new_v4().simple())
}
