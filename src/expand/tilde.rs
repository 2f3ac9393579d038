//! Tilde expansion — spec §4.3 step 2.

use super::ExpansionHost;

/// `name` is `None` for a bare `~`. Unknown named users resolve to the
/// session's user table, defaulting to an empty mapping (spec: "unchanged").
pub fn expand_tilde(host: &mut dyn ExpansionHost, name: Option<&str>) -> String {
    match name {
        None => host.get_scalar("HOME").unwrap_or_default(),
        Some(n) => host.lookup_user_home(n).unwrap_or_else(|| format!("~{n}")),
    }
}
