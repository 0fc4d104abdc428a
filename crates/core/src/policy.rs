//! The policy evaluator: deny-overrides over a set of roles, via a fixed
//! five-step per-`(action, resources)` decision procedure. The allow/deny
//! asymmetry between steps is deliberate, not a bug to "fix".

use crate::condition;
use crate::context::RequestContext;
use crate::glob;
use crate::model::{ActionResourceSet, Effect, Policy, Role, Statement};

/// `EvaluateRoles`: `true` iff *any* role grants every `(action, resources)`
/// pair the query extracted.
pub fn evaluate_roles(
    actions: &ActionResourceSet,
    roles: &[Role],
    ctx: &RequestContext,
) -> bool {
    roles.iter().any(|role| role_grants(role, actions, ctx))
}

/// A role grants iff every policy it carries grants.
fn role_grants(role: &Role, actions: &ActionResourceSet, ctx: &RequestContext) -> bool {
    role.policies.iter().all(|policy| policy_grants(policy, actions, ctx))
}

/// A policy grants iff, for every extracted `(action, resources)` pair, the
/// statement set satisfies the deny-overrides rule.
fn policy_grants(policy: &Policy, actions: &ActionResourceSet, ctx: &RequestContext) -> bool {
    actions
        .iter()
        .all(|(action, resources)| pair_grants(action, resources, &policy.statements, ctx))
}

/// The five-step decision procedure, applied to one `(action, resources)`
/// pair against one policy's statement list.
fn pair_grants(action: &str, resources: &[String], statements: &[Statement], ctx: &RequestContext) -> bool {
    let applicable: Vec<&Statement> =
        statements.iter().filter(|s| glob::flat_matches(&s.action, action)).collect();

    let deny_matches = |s: &&Statement| {
        s.effect == Effect::Deny
            && resources.iter().any(|r| glob::segmented_matches(&s.resource, r))
            && condition_holds(s, ctx)
    };
    let any_denied = applicable.iter().any(deny_matches);

    let allow_matches = |s: &&Statement| {
        s.effect == Effect::Allow
            && resources.iter().all(|r| glob::segmented_matches(&s.resource, r))
            && condition_holds(s, ctx)
    };
    let all_allowed = applicable.iter().filter(|s| s.effect == Effect::Allow).all(allow_matches);

    !any_denied && all_allowed
}

fn condition_holds(statement: &Statement, ctx: &RequestContext) -> bool {
    match &statement.condition {
        None => true,
        Some(condition) => condition::evaluate(condition, ctx),
    }
}
