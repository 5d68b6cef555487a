//! Static pre-execution query analysis.
//!
//! Runs at the parse stage, before validation and before any resolver is
//! invoked: a rejected document causes zero resolver invocations and zero
//! database access. The walk expands both inline fragments and named fragment
//! spreads into the depth and node counts - a fragment-unaware analyzer can
//! be bypassed by hiding nesting inside a spread, so expansion is a
//! correctness requirement here, not an optimization.

use std::fmt;
use std::sync::Arc;

use async_graphql::{
    extensions::{Extension, ExtensionContext, ExtensionFactory, NextParseQuery},
    parser::types::{ExecutableDocument, FragmentDefinition, Selection, SelectionSet},
    Name, Positioned, ServerError, ServerResult, Variables,
};
use std::collections::HashMap;
use tracing::warn;

/// Limits applied to every incoming document.
#[derive(Debug, Clone, Copy)]
pub struct QueryLimits {
    /// Maximum selection-set nesting depth
    pub max_depth: usize,
    /// Maximum total number of selections (fields, spreads, inline fragments)
    pub max_tokens: usize,
}

/// Why a document was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardViolation {
    DepthExceeded { depth: usize, max: usize },
    TokensExceeded { max: usize },
    FragmentCycle { name: String },
    UnknownFragment { name: String },
}

impl fmt::Display for GuardViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardViolation::DepthExceeded { depth, max } => {
                write!(f, "Query is too complex: nesting depth {depth} exceeds the maximum of {max}")
            }
            GuardViolation::TokensExceeded { max } => {
                write!(f, "Query is too complex: selection count exceeds the maximum of {max}")
            }
            GuardViolation::FragmentCycle { name } => {
                write!(f, "Query is too complex: fragment cycle through \"{name}\"")
            }
            GuardViolation::UnknownFragment { name } => {
                write!(f, "Unknown fragment \"{name}\"")
            }
        }
    }
}

/// Measured shape of an accepted document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryStats {
    pub depth: usize,
    pub tokens: usize,
}

/// Walk the document and enforce the limits.
///
/// Depth is the deepest field nesting across all operations (a top-level
/// field sits at depth 1). Every field, inline fragment, and fragment spread
/// counts one token; spreads are expanded in place, so the selections inside
/// a fragment count at the depth of the spread.
pub fn analyze(doc: &ExecutableDocument, limits: &QueryLimits) -> Result<QueryStats, GuardViolation> {
    let mut walker = Walker {
        fragments: &doc.fragments,
        limits,
        tokens: 0,
        max_depth: 0,
    };

    for (_name, operation) in doc.operations.iter() {
        let mut stack = Vec::new();
        walker.walk_set(&operation.node.selection_set.node, 1, &mut stack)?;
    }

    Ok(QueryStats {
        depth: walker.max_depth,
        tokens: walker.tokens,
    })
}

struct Walker<'a> {
    fragments: &'a HashMap<Name, Positioned<FragmentDefinition>>,
    limits: &'a QueryLimits,
    tokens: usize,
    max_depth: usize,
}

impl Walker<'_> {
    fn count_token(&mut self) -> Result<(), GuardViolation> {
        self.tokens += 1;
        if self.tokens > self.limits.max_tokens {
            return Err(GuardViolation::TokensExceeded {
                max: self.limits.max_tokens,
            });
        }
        Ok(())
    }

    fn walk_set(&mut self, set: &SelectionSet, depth: usize, stack: &mut Vec<Name>) -> Result<(), GuardViolation> {
        for selection in &set.items {
            match &selection.node {
                Selection::Field(field) => {
                    self.count_token()?;
                    if depth > self.max_depth {
                        self.max_depth = depth;
                    }
                    if depth > self.limits.max_depth {
                        return Err(GuardViolation::DepthExceeded {
                            depth,
                            max: self.limits.max_depth,
                        });
                    }
                    if !field.node.selection_set.node.items.is_empty() {
                        self.walk_set(&field.node.selection_set.node, depth + 1, stack)?;
                    }
                }
                Selection::InlineFragment(fragment) => {
                    self.count_token()?;
                    // Transparent for depth: the fragment's fields sit at the
                    // enclosing level
                    self.walk_set(&fragment.node.selection_set.node, depth, stack)?;
                }
                Selection::FragmentSpread(spread) => {
                    self.count_token()?;
                    let name = spread.node.fragment_name.node.clone();
                    if stack.contains(&name) {
                        return Err(GuardViolation::FragmentCycle {
                            name: name.to_string(),
                        });
                    }
                    let definition = self.fragments.get(&name).ok_or_else(|| GuardViolation::UnknownFragment {
                        name: name.to_string(),
                    })?;
                    stack.push(name);
                    self.walk_set(&definition.node.selection_set.node, depth, stack)?;
                    stack.pop();
                }
            }
        }
        Ok(())
    }
}

/// The safety guard as an async-graphql extension, hooked at the parse stage.
pub struct QuerySafetyGuard {
    limits: QueryLimits,
}

impl QuerySafetyGuard {
    pub fn new(limits: QueryLimits) -> Self {
        Self { limits }
    }
}

impl ExtensionFactory for QuerySafetyGuard {
    fn create(&self) -> Arc<dyn Extension> {
        Arc::new(QuerySafetyGuardExtension { limits: self.limits })
    }
}

struct QuerySafetyGuardExtension {
    limits: QueryLimits,
}

#[async_trait::async_trait]
impl Extension for QuerySafetyGuardExtension {
    async fn parse_query(
        &self,
        ctx: &ExtensionContext<'_>,
        query: &str,
        variables: &Variables,
        next: NextParseQuery<'_>,
    ) -> ServerResult<ExecutableDocument> {
        let doc = next.run(ctx, query, variables).await?;

        if let Err(violation) = analyze(&doc, &self.limits) {
            warn!(%violation, "rejecting query before execution");
            return Err(ServerError::new(violation.to_string(), None));
        }

        Ok(doc)
    }
}
