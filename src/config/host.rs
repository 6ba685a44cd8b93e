//! Backend host normalization.
//!
//! Users paste all sorts of things into the host attribute: full URLs,
//! `host:port` pairs, hosts with a trailing path. These helpers reduce that
//! input to a bare host and remember whether the scheme asked for TLS.
//!
//! All functions are pure and idempotent: feeding the bare host back through
//! [`strip_scheme_and_suffix`] returns it unchanged.

/// Schemes that imply a TLS transport.
const TLS_SCHEMES: [&str; 2] = ["wss://", "https://"];

/// Schemes that imply a plaintext transport.
const PLAIN_SCHEMES: [&str; 2] = ["ws://", "http://"];

/// Ports that are assumed to speak TLS when no scheme says otherwise.
const TLS_PORTS: [u16; 2] = [443, 8443];

/// Case-insensitive prefix strip.
fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

/// Remove a recognized scheme prefix, then any path and any `:port` suffix.
///
/// Returns the bare host and whether the scheme hinted at TLS.
pub fn strip_scheme_and_suffix(raw: &str) -> (String, bool) {
    let mut rest = raw.trim();
    let mut tls_hinted = false;

    if let Some(r) = TLS_SCHEMES
        .iter()
        .find_map(|scheme| strip_prefix_ignore_case(rest, scheme))
    {
        tls_hinted = true;
        rest = r;
    } else if let Some(r) = PLAIN_SCHEMES
        .iter()
        .find_map(|scheme| strip_prefix_ignore_case(rest, scheme))
    {
        rest = r;
    }

    if let Some(slash) = rest.find('/') {
        rest = &rest[..slash];
    }
    if let Some(colon) = rest.find(':') {
        rest = &rest[..colon];
    }

    (rest.trim().to_string(), tls_hinted)
}

/// Check that a bare host only contains `[A-Za-z0-9.-]` and is not empty.
pub fn is_valid_bare_host(host: &str) -> bool {
    !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

/// Normalize and validate in one step.
pub fn is_valid_host(raw: &str) -> bool {
    let (bare, _) = strip_scheme_and_suffix(raw);
    is_valid_bare_host(&bare)
}

/// Decide whether the stream must use TLS.
///
/// A TLS scheme wins; otherwise the well-known TLS ports decide.
pub fn infer_transport_security(raw_host: &str, port: u16) -> bool {
    let (_, tls_hinted) = strip_scheme_and_suffix(raw_host);
    tls_hinted || TLS_PORTS.contains(&port)
}
