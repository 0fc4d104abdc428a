//! The query analyzer: parses a GraphQL document and flattens each
//! operation's selection set into dotted field paths, without resolving
//! fragment definitions -- an intentional limitation, not an oversight.

use async_graphql_parser::types::{
    DocumentOperations, ExecutableDocument, OperationType, Selection, SelectionSet,
};
use async_graphql_parser::{parse_query, Error as GraphqlSyntaxError};
use gqiam_core::ActionResourceSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("GraphQL document failed to parse: {0}")]
    Syntax(#[from] GraphqlSyntaxError),
}

/// `Parse`: `document -> { operation-type -> [dotted field paths] }`.
pub fn analyze(document: &str) -> Result<ActionResourceSet, ParseError> {
    let parsed = parse_query(document).map_err(|err| {
        tracing::debug!(error = %err, "GraphQL document failed to parse");
        err
    })?;
    let mut result = ActionResourceSet::new();
    for (operation_type, selection_set) in operations(&parsed) {
        let mut paths = Vec::new();
        walk(selection_set, "", &mut paths);
        result.insert(operation_key(operation_type), paths);
    }
    Ok(result)
}

fn operation_key(ty: OperationType) -> &'static str {
    match ty {
        OperationType::Query => "query",
        OperationType::Mutation => "mutation",
        OperationType::Subscription => "subscription",
    }
}

/// Later operations of the same kind intentionally overwrite earlier ones —
/// `ActionResourceSet::insert` already does that, so this just needs to
/// preserve document order.
fn operations(doc: &ExecutableDocument) -> Vec<(OperationType, &SelectionSet)> {
    match &doc.operations {
        DocumentOperations::Single(op) => vec![(op.node.ty, &op.node.selection_set.node)],
        DocumentOperations::Multiple(ops) => {
            ops.values().map(|op| (op.node.ty, &op.node.selection_set.node)).collect()
        }
    }
}

fn walk(selection_set: &SelectionSet, prefix: &str, out: &mut Vec<String>) {
    for selection in &selection_set.items {
        match &selection.node {
            Selection::Field(field) => {
                let field = &field.node;
                let name = &field.name.node;
                if field.selection_set.node.items.is_empty() {
                    out.push(format!("{prefix}{name}"));
                } else {
                    let nested_prefix = format!("{prefix}{name}.");
                    walk(&field.selection_set.node, &nested_prefix, out);
                }
            }
            // Inline fragments are transparent: same prefix, no path segment.
            Selection::InlineFragment(inline) => {
                walk(&inline.node.selection_set.node, prefix, out);
            }
            // Fragment definitions are not resolved; the spread itself
            // becomes a leaf named after the spread, at its point of use.
            Selection::FragmentSpread(spread) => {
                out.push(format!("{prefix}{}", spread.node.fragment_name.node));
            }
        }
    }
}
