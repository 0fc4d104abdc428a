//! Request context: the immutable bag of facts the condition evaluator reads
//! from. Kept as a plain struct, with no behavior beyond accessors.

use std::collections::BTreeMap;

use serde_json::Value;

/// Everything a [`crate::condition::Receiver`] can resolve against, for the
/// lifetime of a single request evaluation.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestContext {
    /// The HTTP protocol version string, e.g. `"HTTP/1.1"` or `"HTTP/2.0"`.
    pub proto: String,
    pub socket_remote_addr: String,
    /// Header names are stored lower-cased; lookups lower-case their input.
    pub headers: BTreeMap<String, String>,
    /// Claims from a verified JWT. Empty object when there is none (header
    /// identity mode, or no token).
    pub jwt_claims: Value,
    /// GraphQL `variables` from the request body, as parsed JSON. Empty
    /// object when the request carried none.
    pub variables: Value,
    pub raw_query: String,
}

impl RequestContext {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.as_object().and_then(|m| m.get(name))
    }

    pub fn jwt_claim(&self, name: &str) -> Option<&Value> {
        self.jwt_claims.as_object().and_then(|m| m.get(name))
    }

    /// `X-Forwarded-For` if present, else the socket address. Both host and
    /// port share this precedence rule.
    fn effective_remote_addr(&self) -> &str {
        self.header("x-forwarded-for")
            .map(|v| v.split(',').next().unwrap_or(v).trim())
            .unwrap_or(&self.socket_remote_addr)
    }

    pub fn remote_host(&self) -> &str {
        let addr = self.effective_remote_addr();
        split_host_port(addr).0
    }

    pub fn remote_port(&self) -> Option<&str> {
        let addr = self.effective_remote_addr();
        split_host_port(addr).1
    }
}

/// Splits `host:port` or bracketed `[host]:port` (IPv6) into `(host, port)`.
/// A bare host with no port returns `(host, None)`.
fn split_host_port(addr: &str) -> (&str, Option<&str>) {
    if let Some(rest) = addr.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            let host = &rest[..end];
            let after = &rest[end + 1..];
            let port = after.strip_prefix(':');
            return (host, port);
        }
    }
    match addr.rsplit_once(':') {
        // Guard against bare IPv6 addresses with multiple colons and no brackets.
        Some((host, port)) if !host.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => {
            (host, Some(port))
        }
        _ => (addr, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(headers: &[(&str, &str)], socket: &str) -> RequestContext {
        RequestContext {
            proto: "HTTP/1.1".into(),
            socket_remote_addr: socket.into(),
            headers: headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            jwt_claims: Value::Object(Default::default()),
            variables: Value::Object(Default::default()),
            raw_query: String::new(),
        }
    }

    #[test]
    fn forwarded_for_takes_precedence_over_socket() {
        let c = ctx(&[("x-forwarded-for", "203.0.113.5:4000")], "10.0.0.1:9999");
        assert_eq!(c.remote_host(), "203.0.113.5");
        assert_eq!(c.remote_port(), Some("4000"));
    }

    #[test]
    fn falls_back_to_socket_when_no_forwarded_for() {
        let c = ctx(&[], "10.0.0.1:9999");
        assert_eq!(c.remote_host(), "10.0.0.1");
        assert_eq!(c.remote_port(), Some("9999"));
    }

    #[test]
    fn forwarded_for_takes_first_of_a_list() {
        let c = ctx(&[("x-forwarded-for", "203.0.113.5, 70.41.3.18")], "10.0.0.1:9999");
        assert_eq!(c.remote_host(), "203.0.113.5");
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let c = ctx(&[("x-test", "value")], "10.0.0.1:1");
        assert_eq!(c.header("X-Test"), Some("value"));
    }
}
