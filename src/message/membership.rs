//! Membership prefix splitting for NAMES/WHO style nick lists.

/// Membership prefixes used when the server has not sent ISUPPORT `PREFIX`.
pub const STD_MEMBERSHIPS: &str = "~&@%+";

/// Split a leading run of membership prefix characters from a name.
///
/// Returns `(prefixes, nick)`. `allowed` is the prefix character table,
/// normally taken from ISUPPORT `PREFIX`; pass [`STD_MEMBERSHIPS`] when
/// that is unavailable.
///
/// ```
/// use slirc_client::message::parse_membership;
///
/// assert_eq!(parse_membership("@+alice", "~&@%+"), ("@+", "alice"));
/// assert_eq!(parse_membership("bob", "~&@%+"), ("", "bob"));
/// ```
pub fn parse_membership<'a>(s: &'a str, allowed: &str) -> (&'a str, &'a str) {
    let split = s
        .char_indices()
        .find(|(_, c)| !allowed.contains(*c))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    s.split_at(split)
}
