//! Scope vocabulary advertised by the metadata documents.

/// Every scope this server can grant, in advertisement order.
pub const SUPPORTED_SCOPES: &[&str] = &[
    "wiki:read",
    "wiki:write",
    "projects:read",
    "projects:write",
    "schedules:read",
    "schedules:write",
    "invoices:read",
    "invoices:write",
    "etf:read",
    "dashboard:read",
    "admin:read",
    "admin:write",
];

/// Prefix of scopes reserved for trusted clients.
const ADMIN_PREFIX: &str = "admin:";

#[must_use]
pub fn is_supported(scope: &str) -> bool {
    SUPPORTED_SCOPES.contains(&scope)
}

#[must_use]
pub fn is_admin(scope: &str) -> bool {
    scope.starts_with(ADMIN_PREFIX)
}

/// Split a space-delimited scope string, dropping duplicates but keeping order.
#[must_use]
pub fn parse(raw: &str) -> Vec<String> {
    let mut scopes: Vec<String> = Vec::new();
    for s in raw.split_ascii_whitespace() {
        if !scopes.iter().any(|existing| existing == s) {
            scopes.push(s.to_string());
        }
    }
    scopes
}

#[must_use]
pub fn join(scopes: &[String]) -> String {
    scopes.join(" ")
}

/// Scopes a client may hold at registration time.
///
/// Unknown scopes are dropped. Untrusted clients never hold admin scopes.
/// An empty request yields every scope the client is eligible for.
#[must_use]
pub fn eligible(requested: &[String], trusted: bool) -> Vec<String> {
    let allowed = |s: &str| is_supported(s) && (trusted || !is_admin(s));

    if requested.is_empty() {
        return SUPPORTED_SCOPES
            .iter()
            .filter(|s| allowed(s))
            .map(|s| (*s).to_string())
            .collect();
    }

    requested.iter().filter(|s| allowed(s)).cloned().collect()
}

/// Intersect a request with what the client holds.
///
/// An empty request is granted everything the client holds.
#[must_use]
pub fn grant(requested: &[String], held: &[String]) -> Vec<String> {
    if requested.is_empty() {
        return held.to_vec();
    }
    requested.iter().filter(|s| held.contains(s)).cloned().collect()
}

/// Check that every requested scope is already held.
#[must_use]
pub fn is_subset(requested: &[String], held: &[String]) -> bool {
    requested.iter().all(|s| held.contains(s))
}
