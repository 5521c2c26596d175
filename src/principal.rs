//! The authenticated principal associated with a request, if any.
//!
//! The gateway does not authenticate anyone itself. It trusts identity
//! headers stamped onto the request by the authentication layer in front
//! of it: `X-Auth-User`, `X-Auth-Superuser`, `X-Auth-Staff`, and
//! `X-Auth-Groups`. Requests without these headers are anonymous.
//!
//! A malformed or unreadable group header never fails the request; it is
//! treated as "no groups" so that a bad value downstream cannot take the
//! whole pipeline down.

use hyper::header::HeaderMap;

/// Header carrying the authenticated username.
pub const USER_HEADER: &str = "x-auth-user";

/// Header flagging the principal as a superuser.
pub const SUPERUSER_HEADER: &str = "x-auth-superuser";

/// Header flagging the principal as staff.
pub const STAFF_HEADER: &str = "x-auth-staff";

/// Header carrying the principal's comma-separated group names.
pub const GROUPS_HEADER: &str = "x-auth-groups";

/// An authenticated identity with its permission flags and groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Opaque username, used for request logging and diagnostics.
    pub username: String,
    /// Whether the identity was actually authenticated. Header-extracted
    /// principals are always authenticated; tests may construct others.
    pub authenticated: bool,
    /// Superusers bypass role checks entirely.
    pub superuser: bool,
    /// Staff flag, honored when "staff" is among the allowed roles.
    pub staff: bool,
    /// Group names, lower-cased for comparison against allowed roles.
    pub groups: Vec<String>,
}

impl Principal {
    /// Extracts the principal from trusted identity headers.
    ///
    /// Returns `None` when no (non-empty) username header is present,
    /// i.e. the request is anonymous.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let username = headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|u| !u.is_empty())?
            .to_owned();

        Some(Self {
            username,
            authenticated: true,
            superuser: flag(headers, SUPERUSER_HEADER),
            staff: flag(headers, STAFF_HEADER),
            groups: groups(headers),
        })
    }

    /// Returns `true` if any of the principal's groups appears in `roles`.
    ///
    /// Both sides are expected to be lower-cased already.
    pub fn in_any_role(&self, roles: &[String]) -> bool {
        self.groups.iter().any(|g| roles.iter().any(|r| r == g))
    }
}

/// Reads a boolean flag header. Accepts `1`, `true`, or `yes` in any case;
/// anything else (including an unreadable value) is `false`.
fn flag(headers: &HeaderMap, name: &str) -> bool {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            let v = v.trim();
            v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes")
        })
        .unwrap_or(false)
}

/// Reads the comma-separated group header, lower-casing entries and
/// dropping empties. Unreadable values yield an empty list.
fn groups(headers: &HeaderMap) -> Vec<String> {
    headers
        .get(GROUPS_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split(',')
                .map(|g| g.trim().to_ascii_lowercase())
                .filter(|g| !g.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
