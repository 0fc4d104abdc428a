//! The condition sub-language: receivers, the operator dispatch table, and
//! `evaluate`. This never raises — every resolution failure, type mismatch,
//! or parse failure collapses the offending clause to `false`, so a
//! malformed condition can never accidentally grant access.

use chrono::{DateTime, TimeZone, Utc};
use ipnetwork::IpNetwork;
use serde_json::Value;
use std::net::IpAddr;

use crate::context::RequestContext;
use crate::model::{Condition, ConditionParams};

/// A parsed `kind:path` receiver expression. Parsed once per clause entry,
/// not re-split per operator.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Receiver {
    Header(String),
    Var(String),
    Jwt(String),
    RequestProto,
    RequestRemoteAddr,
    RequestPort,
    MetaTimeUnix,
    MetaTime,
}

impl Receiver {
    fn parse(expr: &str) -> Option<Receiver> {
        let (kind, path) = expr.split_once(':')?;
        match kind {
            "header" => Some(Receiver::Header(path.to_string())),
            "var" => Some(Receiver::Var(path.to_string())),
            "jwt" => Some(Receiver::Jwt(path.to_string())),
            "request" => match path {
                "proto" => Some(Receiver::RequestProto),
                "remoteAddr" => Some(Receiver::RequestRemoteAddr),
                "port" => Some(Receiver::RequestPort),
                _ => None,
            },
            "meta" => match path {
                "time_unix" => Some(Receiver::MetaTimeUnix),
                "time" => Some(Receiver::MetaTime),
                _ => None,
            },
            _ => None,
        }
    }
}

/// A resolved receiver value, kept heterogeneous because receivers surface
/// header strings, arbitrary JSON (vars/claims), or wall-clock readings.
#[derive(Debug, Clone)]
enum Resolved {
    Missing,
    Str(String),
    Json(Value),
    Int(i64),
    Timestamp(DateTime<Utc>),
}

fn resolve(receiver: &Receiver, ctx: &RequestContext) -> Resolved {
    match receiver {
        Receiver::Header(name) => ctx
            .header(name)
            .map(|v| Resolved::Str(v.to_string()))
            .unwrap_or(Resolved::Missing),
        Receiver::Var(name) => {
            ctx.variable(name).cloned().map(Resolved::Json).unwrap_or(Resolved::Missing)
        }
        Receiver::Jwt(name) => {
            ctx.jwt_claim(name).cloned().map(Resolved::Json).unwrap_or(Resolved::Missing)
        }
        Receiver::RequestProto => Resolved::Str(ctx.proto.clone()),
        Receiver::RequestRemoteAddr => Resolved::Str(ctx.remote_host().to_string()),
        Receiver::RequestPort => {
            ctx.remote_port().map(|p| Resolved::Str(p.to_string())).unwrap_or(Resolved::Missing)
        }
        Receiver::MetaTimeUnix => Resolved::Int(Utc::now().timestamp()),
        Receiver::MetaTime => Resolved::Timestamp(Utc::now()),
    }
}

fn as_string(resolved: &Resolved) -> Option<String> {
    match resolved {
        Resolved::Str(s) => Some(s.clone()),
        Resolved::Json(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

fn as_number(resolved: &Resolved) -> Option<f64> {
    match resolved {
        Resolved::Str(s) => s.parse().ok(),
        Resolved::Json(Value::String(s)) => s.parse().ok(),
        Resolved::Json(Value::Number(n)) => n.as_f64(),
        Resolved::Int(i) => Some(*i as f64),
        _ => None,
    }
}

fn as_datetime(resolved: &Resolved) -> Option<DateTime<Utc>> {
    match resolved {
        Resolved::Str(s) => parse_date_permissive(s),
        Resolved::Json(Value::String(s)) => parse_date_permissive(s),
        Resolved::Json(Value::Number(n)) => n.as_i64().and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        Resolved::Int(i) => Utc.timestamp_opt(*i, 0).single(),
        Resolved::Timestamp(t) => Some(*t),
        Resolved::Missing | Resolved::Json(_) => None,
    }
}

fn parse_bool_literal(s: &str) -> Option<bool> {
    match s {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn is_absent(resolved: &Resolved) -> bool {
    matches!(resolved, Resolved::Missing | Resolved::Json(Value::Null))
}

/// Permissively parse a date literal/receiver string: RFC 3339, RFC 2822,
/// then a handful of common bare formats.
fn parse_date_permissive(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d"] {
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
        if let Ok(date) = chrono::NaiveDate::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap()));
        }
    }
    s.parse::<i64>().ok().and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

fn parse_ip(s: &str) -> Option<IpAddr> {
    s.parse().ok()
}

fn parse_ip_or_cidr(s: &str) -> Option<IpNetwork> {
    if let Ok(net) = s.parse::<IpNetwork>() {
        return Some(net);
    }
    s.parse::<IpAddr>().ok().map(IpNetwork::from)
}

/// Every entry in `params` must hold, per a resolver of a single receiver.
fn all_entries(params: &ConditionParams, ctx: &RequestContext, check: impl Fn(Resolved, &str) -> bool) -> bool {
    params.0.iter().all(|(receiver_expr, literal)| match Receiver::parse(receiver_expr) {
        Some(receiver) => check(resolve(&receiver, ctx), literal),
        None => false,
    })
}

fn op_string_equals(params: &ConditionParams, ctx: &RequestContext) -> bool {
    all_entries(params, ctx, |r, lit| as_string(&r).is_some_and(|s| s == lit))
}

fn op_string_not_equals(params: &ConditionParams, ctx: &RequestContext) -> bool {
    all_entries(params, ctx, |r, lit| as_string(&r).is_some_and(|s| s != lit))
}

fn op_string_equals_ignore_case(params: &ConditionParams, ctx: &RequestContext) -> bool {
    all_entries(params, ctx, |r, lit| as_string(&r).is_some_and(|s| s.eq_ignore_ascii_case(lit)))
}

fn op_string_not_equals_ignore_case(params: &ConditionParams, ctx: &RequestContext) -> bool {
    all_entries(params, ctx, |r, lit| as_string(&r).is_some_and(|s| !s.eq_ignore_ascii_case(lit)))
}

fn op_string_like(params: &ConditionParams, ctx: &RequestContext) -> bool {
    all_entries(params, ctx, |r, lit| as_string(&r).is_some_and(|s| crate::glob::flat_matches(lit, &s)))
}

fn op_string_not_like(params: &ConditionParams, ctx: &RequestContext) -> bool {
    all_entries(params, ctx, |r, lit| as_string(&r).is_some_and(|s| !crate::glob::flat_matches(lit, &s)))
}

fn op_date_equals(params: &ConditionParams, ctx: &RequestContext) -> bool {
    all_entries(params, ctx, |r, lit| {
        matches!((as_datetime(&r), parse_date_permissive(lit)), (Some(a), Some(b)) if a == b)
    })
}

fn op_date_not_equals(params: &ConditionParams, ctx: &RequestContext) -> bool {
    all_entries(params, ctx, |r, lit| {
        matches!((as_datetime(&r), parse_date_permissive(lit)), (Some(a), Some(b)) if a != b)
    })
}

fn op_date_less_than(params: &ConditionParams, ctx: &RequestContext) -> bool {
    all_entries(params, ctx, |r, lit| {
        matches!((as_datetime(&r), parse_date_permissive(lit)), (Some(a), Some(b)) if a < b)
    })
}

fn op_date_less_than_equals(params: &ConditionParams, ctx: &RequestContext) -> bool {
    all_entries(params, ctx, |r, lit| {
        matches!((as_datetime(&r), parse_date_permissive(lit)), (Some(a), Some(b)) if a <= b)
    })
}

fn op_date_greater_than(params: &ConditionParams, ctx: &RequestContext) -> bool {
    all_entries(params, ctx, |r, lit| {
        matches!((as_datetime(&r), parse_date_permissive(lit)), (Some(a), Some(b)) if a > b)
    })
}

fn op_date_greater_than_equals(params: &ConditionParams, ctx: &RequestContext) -> bool {
    all_entries(params, ctx, |r, lit| {
        matches!((as_datetime(&r), parse_date_permissive(lit)), (Some(a), Some(b)) if a >= b)
    })
}

fn op_numeric_equals(params: &ConditionParams, ctx: &RequestContext) -> bool {
    all_entries(params, ctx, |r, lit| {
        matches!((as_number(&r), lit.parse::<f64>().ok()), (Some(a), Some(b)) if a == b)
    })
}

fn op_numeric_less_than(params: &ConditionParams, ctx: &RequestContext) -> bool {
    all_entries(params, ctx, |r, lit| {
        matches!((as_number(&r), lit.parse::<f64>().ok()), (Some(a), Some(b)) if a < b)
    })
}

fn op_numeric_less_than_equals(params: &ConditionParams, ctx: &RequestContext) -> bool {
    all_entries(params, ctx, |r, lit| {
        matches!((as_number(&r), lit.parse::<f64>().ok()), (Some(a), Some(b)) if a <= b)
    })
}

fn op_numeric_greater_than(params: &ConditionParams, ctx: &RequestContext) -> bool {
    all_entries(params, ctx, |r, lit| {
        matches!((as_number(&r), lit.parse::<f64>().ok()), (Some(a), Some(b)) if a > b)
    })
}

fn op_numeric_greater_than_equals(params: &ConditionParams, ctx: &RequestContext) -> bool {
    all_entries(params, ctx, |r, lit| {
        matches!((as_number(&r), lit.parse::<f64>().ok()), (Some(a), Some(b)) if a >= b)
    })
}

fn op_bool(params: &ConditionParams, ctx: &RequestContext) -> bool {
    all_entries(params, ctx, |r, lit| {
        let literal = parse_bool_literal(lit);
        let receiver = as_string(&r).as_deref().and_then(parse_bool_literal);
        matches!((literal, receiver), (Some(a), Some(b)) if a == b)
    })
}

fn op_null(params: &ConditionParams, ctx: &RequestContext) -> bool {
    all_entries(params, ctx, |r, lit| match parse_bool_literal(lit) {
        Some(expect_absent) => is_absent(&r) == expect_absent,
        None => false,
    })
}

fn op_ip_address(params: &ConditionParams, ctx: &RequestContext) -> bool {
    all_entries(params, ctx, |r, lit| {
        match (as_string(&r).as_deref().and_then(parse_ip), parse_ip_or_cidr(lit)) {
            (Some(ip), Some(net)) => net.contains(ip),
            _ => false,
        }
    })
}

fn op_not_ip_address(params: &ConditionParams, ctx: &RequestContext) -> bool {
    all_entries(params, ctx, |r, lit| {
        match (as_string(&r).as_deref().and_then(parse_ip), parse_ip_or_cidr(lit)) {
            (Some(ip), Some(net)) => !net.contains(ip),
            _ => false,
        }
    })
}

type OperatorFn = fn(&ConditionParams, &RequestContext) -> bool;

/// Dispatch table from operator name to a pure `(params, context) -> bool`
/// function — no trait object hierarchy, just data.
const OPERATORS: &[(&str, OperatorFn)] = &[
    ("StringEquals", op_string_equals),
    ("StringNotEquals", op_string_not_equals),
    ("StringEqualsIgnoreCase", op_string_equals_ignore_case),
    ("StringNotEqualsIgnoreCase", op_string_not_equals_ignore_case),
    ("StringLike", op_string_like),
    ("StringNotLike", op_string_not_like),
    ("DateEquals", op_date_equals),
    ("DateNotEquals", op_date_not_equals),
    ("DateLessThan", op_date_less_than),
    ("DateLessThanEquals", op_date_less_than_equals),
    ("DateGreaterThan", op_date_greater_than),
    ("DateGreaterThanEquals", op_date_greater_than_equals),
    ("NumericEquals", op_numeric_equals),
    ("NumericLessThan", op_numeric_less_than),
    ("NumericLessThanEquals", op_numeric_less_than_equals),
    ("NumericGreaterThan", op_numeric_greater_than),
    ("NumericGreaterThanEquals", op_numeric_greater_than_equals),
    ("Bool", op_bool),
    ("Null", op_null),
    ("IpAddress", op_ip_address),
    ("NotIpAddress", op_not_ip_address),
];

fn lookup(operator: &str) -> Option<OperatorFn> {
    OPERATORS.iter().find(|(name, _)| *name == operator).map(|(_, f)| *f)
}

/// Evaluate a full `Condition` block: every operator clause must hold.
/// Never raises; an empty condition is vacuously true (callers treat "no
/// condition" the same way).
pub fn evaluate(condition: &Condition, ctx: &RequestContext) -> bool {
    condition.0.iter().all(|(operator, params)| match lookup(operator) {
        Some(f) => f(params, ctx),
        None => {
            tracing::debug!(operator, "unknown condition operator, treating as false");
            false
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConditionParams;
    use std::collections::BTreeMap;

    fn ctx_with_header(name: &str, value: &str) -> RequestContext {
        let mut headers = BTreeMap::new();
        headers.insert(name.to_ascii_lowercase(), value.to_string());
        RequestContext {
            proto: "HTTP/1.1".into(),
            socket_remote_addr: "127.0.0.1:1234".into(),
            headers,
            jwt_claims: Value::Object(Default::default()),
            variables: Value::Object(Default::default()),
            raw_query: String::new(),
        }
    }

    fn params(entries: &[(&str, &str)]) -> ConditionParams {
        ConditionParams(entries.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    #[test]
    fn string_equals_header() {
        let ctx = ctx_with_header("X-Test", "test-val");
        assert!(op_string_equals(&params(&[("header:X-Test", "test-val")]), &ctx));
        assert!(!op_string_equals(&params(&[("header:X-Test", "other")]), &ctx));
    }

    #[test]
    fn unresolvable_receiver_is_false_not_panic() {
        let ctx = ctx_with_header("X-Test", "test-val");
        assert!(!op_string_equals(&params(&[("banana:X-Test", "test-val")]), &ctx));
        assert!(!op_string_equals(&params(&[("header:Missing", "test-val")]), &ctx));
    }

    #[test]
    fn unknown_operator_is_false() {
        let ctx = ctx_with_header("X-Test", "test-val");
        let mut condition = Condition::default();
        condition.0.insert("TotallyMadeUp".to_string(), params(&[("header:X-Test", "test-val")]));
        assert!(!evaluate(&condition, &ctx));
    }

    #[test]
    fn empty_condition_is_vacuously_true() {
        let ctx = ctx_with_header("X-Test", "test-val");
        assert!(evaluate(&Condition::default(), &ctx));
    }

    #[test]
    fn numeric_less_than_equals_and_greater_than_equals_are_distinct() {
        let mut headers = BTreeMap::new();
        headers.insert("x-n".to_string(), "5".to_string());
        let ctx = RequestContext {
            proto: "HTTP/1.1".into(),
            socket_remote_addr: "127.0.0.1:1".into(),
            headers,
            jwt_claims: Value::Object(Default::default()),
            variables: Value::Object(Default::default()),
            raw_query: String::new(),
        };
        assert!(op_numeric_less_than_equals(&params(&[("header:x-n", "5")]), &ctx));
        assert!(!op_numeric_less_than_equals(&params(&[("header:x-n", "4")]), &ctx));
        assert!(op_numeric_greater_than_equals(&params(&[("header:x-n", "5")]), &ctx));
        assert!(!op_numeric_greater_than_equals(&params(&[("header:x-n", "6")]), &ctx));
    }

    #[test]
    fn ip_address_cidr_containment() {
        let ctx = ctx_with_header("X-Ip", "10.1.2.3");
        assert!(op_ip_address(&params(&[("header:X-Ip", "10.1.0.0/16")]), &ctx));
        assert!(!op_ip_address(&params(&[("header:X-Ip", "10.2.0.0/16")]), &ctx));
        assert!(op_not_ip_address(&params(&[("header:X-Ip", "10.2.0.0/16")]), &ctx));
    }

    #[test]
    fn null_operator_checks_absence() {
        let ctx = ctx_with_header("X-Present", "yes");
        assert!(op_null(&params(&[("header:X-Missing", "true")]), &ctx));
        assert!(!op_null(&params(&[("header:X-Present", "true")]), &ctx));
        assert!(op_null(&params(&[("header:X-Present", "false")]), &ctx));
    }

    #[test]
    fn bool_operator_accepts_numeric_forms() {
        let ctx = ctx_with_header("X-Flag", "1");
        assert!(op_bool(&params(&[("header:X-Flag", "true")]), &ctx));
    }
}
