/// Placeholder standing for the supplied identity in bind and filter templates.
pub const IDENTITY_PLACEHOLDER: &str = "%u";

/// Replace every `%u` in `template` with `identity`.
///
/// This is plain text substitution. The identity is inserted as-is, so
/// callers accepting untrusted user names should pass them through
/// [`escape_filter_value`] first.
pub fn substitute(template: &str, identity: &str) -> String {
    template.replace(IDENTITY_PLACEHOLDER, identity)
}

/// Escape a value for use inside an LDAP search filter (RFC 4515).
pub fn escape_filter_value(value: &str) -> String {
    value.replace('\\', "\\5c")
         .replace('*', "\\2a")
         .replace('(', "\\28")
         .replace(')', "\\29")
         .replace('\0', "\\00")
}
