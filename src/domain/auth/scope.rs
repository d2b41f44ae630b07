//! Scope matching rules

use std::collections::BTreeSet;

/// Scope that grants every other scope
pub const WILDCARD_SCOPE: &str = "*";

/// Scope required by key-management endpoints
pub const ADMIN_SCOPE: &str = "admin";

/// Whether a granted scope set satisfies `required`
///
/// Admin identities satisfy everything. Otherwise the required scope must be
/// granted exactly, by `*`, or by a namespace wildcard such as `quiz:*`.
pub fn scope_satisfies(granted: &BTreeSet<String>, admin: bool, required: &str) -> bool {
    if admin || granted.contains(required) || granted.contains(WILDCARD_SCOPE) {
        return true;
    }

    granted.iter().any(|scope| {
        scope
            .strip_suffix('*')
            .filter(|ns| ns.ends_with(':'))
            .is_some_and(|ns| required.starts_with(ns) && required.len() > ns.len())
    })
}
