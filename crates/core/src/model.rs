//! The value types shared by the policy evaluator, the condition evaluator,
//! and the role cache: plain serde structs, no behavior beyond construction
//! helpers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One IAM-style rule inside a [`Policy`].
///
/// A malformed `action` or `resource` glob does not make the whole statement
/// an error; it just never matches (see [`crate::policy::evaluate_roles`]).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub sid: String,
    pub action: String,
    pub effect: Effect,
    pub resource: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub condition: Option<Condition>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Allow,
    Deny,
}

/// A named, versioned bundle of statements. Statement order is irrelevant to
/// the evaluation result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub name: String,
    pub version: String,
    pub statements: Vec<Statement>,
}

/// A named bundle of policies granted to a caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub policies: Vec<Policy>,
}

/// `{ OperatorName: { receiver-expr: literal, ... }, ... }`
///
/// All operator clauses are conjunctive (AND); within one operator clause,
/// every receiver entry must also hold (AND). Unknown operator names are
/// preserved (so a document round-trips) but always evaluate to `false`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition(pub BTreeMap<String, ConditionParams>);

/// `{ receiver-expr: string-literal, ... }`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionParams(pub BTreeMap<String, String>);

/// `operation-type -> dotted field paths`, as produced by the query
/// analyzer and consumed by the policy evaluator.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResourceSet(pub BTreeMap<String, Vec<String>>);

impl ActionResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, operation_type: impl Into<String>, paths: Vec<String>) {
        self.0.insert(operation_type.into(), paths);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }
}

impl Role {
    /// Collapse a list of roles into a deduplicated-by-name set: duplicates
    /// collapse by `name`, keeping the first occurrence.
    pub fn dedupe(roles: Vec<Role>) -> Vec<Role> {
        let mut seen = std::collections::BTreeSet::new();
        let mut out = Vec::with_capacity(roles.len());
        for role in roles {
            if seen.insert(role.name.clone()) {
                out.push(role);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_role(name: &str) -> Role {
        Role {
            name: name.to_string(),
            policies: vec![Policy {
                id: "p1".into(),
                name: "read-only".into(),
                version: "1".into(),
                statements: vec![Statement {
                    sid: "s1".into(),
                    action: "query".into(),
                    effect: Effect::Allow,
                    resource: "testData**".into(),
                    condition: None,
                }],
            }],
        }
    }

    #[test]
    fn dedupe_keeps_first_occurrence_and_drops_later_duplicates() {
        let roles = vec![sample_role("admin"), sample_role("auditor"), sample_role("admin")];
        let deduped = Role::dedupe(roles);
        assert_eq!(deduped.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(), vec!["admin", "auditor"]);
    }

    #[test]
    fn role_document_schema_matches_the_wire_format() {
        insta::assert_json_snapshot!(sample_role("admin"), @r###"
        {
          "name": "admin",
          "policies": [
            {
              "id": "p1",
              "name": "read-only",
              "version": "1",
              "statements": [
                {
                  "sid": "s1",
                  "action": "query",
                  "effect": "allow",
                  "resource": "testData**"
                }
              ]
            }
          ]
        }
        "###);
    }
}
