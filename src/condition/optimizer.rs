use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use bson::Bson;
use crate::condition::index::IndexMetadata;
use crate::condition::outcome::{classify, Outcome};
use crate::condition::part::{compare_values, ConditionPart, Side};
use crate::query::tree_node::TreeNode;
use crate::query::{Bindings, BsonValue, ComparisonOperator, Expr, Variable};
use crate::util::bson_utils;

/// Result of the optimization of a condition in disjunctive normal form.
#[derive(Debug)]
pub struct OptimizedCondition {
    /// The optimized `OR(AND(...))` tree, `None` if the condition turned out to be always true.
    pub root: Option<Arc<Expr>>,
    /// Number of AND clauses dropped because they could never match.
    pub impossible_clauses: usize,
}

/// Simplifies each AND clause of a condition in disjunctive normal form by removing redundant,
/// contradictory or mergeable comparisons.
pub struct ConjunctionOptimizer<'a> {
    /// Treat every attribute as multi valued
    multivalued: bool,
    bindings: &'a Bindings,
}

enum Step {
    Unchanged,
    Changed(Vec<Arc<Expr>>),
    Impossible,
}

enum Merge {
    Keep,
    Impossible,
    /// Replace (`Some`) or drop (`None`) the clause members at the given positions.
    Rewrite(Vec<(usize, Option<Arc<Expr>>)>),
}

impl<'a> ConjunctionOptimizer<'a> {
    pub fn new(multivalued: bool, bindings: &'a Bindings) -> Self {
        ConjunctionOptimizer { multivalued, bindings }
    }

    pub fn optimize(&self, root: &Arc<Expr>) -> OptimizedCondition {
        let clauses: &[Arc<Expr>] = match root.as_ref() {
            Expr::Or(clauses) => clauses,
            _ => std::slice::from_ref(root),
        };

        let mut impossible_clauses = 0;
        let mut seen = HashSet::new();
        let mut optimized = Vec::with_capacity(clauses.len());

        for clause in clauses {
            let members: &[Arc<Expr>] = match clause.as_ref() {
                Expr::And(members) => members,
                _ => std::slice::from_ref(clause),
            };

            match self.optimize_clause(members) {
                None => impossible_clauses += 1,
                Some(members) if members.is_empty() => {
                    return OptimizedCondition { root: None, impossible_clauses };
                }
                Some(members) => {
                    let clause = Arc::new(Expr::And(members));
                    if seen.insert(clause.clone()) {
                        optimized.push(clause);
                    }
                }
            }
        }

        OptimizedCondition {
            root: Some(Arc::new(Expr::Or(optimized))),
            impossible_clauses,
        }
    }

    /// Optimizes the members of an AND clause, returns `None` if the clause can never match.
    fn optimize_clause(&self, members: &[Arc<Expr>]) -> Option<Vec<Arc<Expr>>> {
        let mut members = normalize_in_lists(members)?;

        let mut seen = HashSet::new();
        members.retain(|m| seen.insert(m.clone()));

        loop {
            match self.merge_step(&members) {
                Step::Unchanged => break,
                Step::Changed(merged) => members = merged,
                Step::Impossible => return None,
            }
        }

        members.sort_by_key(|m| priority(m));
        Some(members)
    }

    /// Looks for the first pair of comparisons on the same attribute which can be merged.
    fn merge_step(&self, members: &[Arc<Expr>]) -> Step {
        let mut parts: Vec<ConditionPart> = members
            .iter()
            .enumerate()
            .filter_map(|(i, m)| ConditionPart::from_leaf(m, None, self.bindings, i))
            .filter(|p| p.quantifier.is_none() && p.is_constant())
            .collect();

        // IN lists are visited first
        parts.sort_by_key(|p| p.operator != ComparisonOperator::In);

        for (i, p) in parts.iter().enumerate() {
            for q in parts.iter().skip(i + 1).filter(|q| p.same_attribute(q)) {
                match self.merge(p, q) {
                    Merge::Keep => {}
                    Merge::Impossible => return Step::Impossible,
                    Merge::Rewrite(changes) => {
                        let merged = members
                            .iter()
                            .enumerate()
                            .filter_map(|(pos, m)| match changes.iter().find(|(index, _)| *index == pos) {
                                Some((_, replacement)) => replacement.clone(),
                                None => Some(m.clone()),
                            })
                            .collect();
                        return Step::Changed(merged);
                    }
                }
            }
        }
        Step::Unchanged
    }

    fn merge(&self, p: &ConditionPart, q: &ConditionPart) -> Merge {
        use ComparisonOperator::*;

        let multivalued = self.multivalued || p.expanded;

        if !multivalued {
            match (p.operator, q.operator) {
                (In, In) => {
                    let (Some(values), Some(others)) = (p.constant_values(), q.constant_values()) else {
                        return Merge::Keep;
                    };
                    let intersection: Vec<Bson> = values
                        .iter()
                        .filter(|v| others.iter().any(|o| bson_utils::bson_eq(v, o)))
                        .cloned()
                        .collect();
                    return replace_list(p, intersection, q.tag);
                }
                (In, Nin) | (Nin, In) => {
                    let (list, excluded) = if p.operator == In { (p, q) } else { (q, p) };
                    let (Some(values), Some(others)) = (list.constant_values(), excluded.constant_values()) else {
                        return Merge::Keep;
                    };
                    let remaining: Vec<Bson> = values
                        .iter()
                        .filter(|v| !others.iter().any(|o| bson_utils::bson_eq(v, o)))
                        .cloned()
                        .collect();
                    return replace_list(list, remaining, excluded.tag);
                }
                (Nin, Eq) | (Eq, Nin) => {
                    let (excluded, equality) = if p.operator == Nin { (p, q) } else { (q, p) };
                    let (Some(others), Some(value)) = (excluded.constant_values(), equality.value.literal()) else {
                        return Merge::Keep;
                    };
                    return if others.iter().any(|o| bson_utils::bson_eq(value, o)) {
                        Merge::Impossible
                    } else {
                        Merge::Rewrite(vec![(excluded.tag, None)])
                    };
                }
                (In, Eq | Ne | Lt | Lte | Gte | Gt) | (Eq | Ne | Lt | Lte | Gte | Gt, In) => {
                    let (list, comparison) = if p.operator == In { (p, q) } else { (q, p) };
                    let Some(values) = list.constant_values() else {
                        return Merge::Keep;
                    };
                    let remaining: Vec<Bson> = values
                        .iter()
                        .filter(|v| comparison.accepts(v))
                        .cloned()
                        .collect();
                    return replace_list(list, remaining, comparison.tag);
                }
                _ => {}
            }
        }

        let Some(sign) = compare_values(&p.value, &q.value) else {
            return Merge::Keep;
        };

        match classify(multivalued, sign, p.compare_op(), q.compare_op()) {
            Outcome::Impossible => Merge::Impossible,
            Outcome::SelfContainedInOther => Merge::Rewrite(vec![(p.tag, None)]),
            Outcome::OtherContainedInSelf => Merge::Rewrite(vec![(q.tag, None)]),
            Outcome::ConvertEqual => Merge::Rewrite(vec![
                (p.tag, Some(rebuild(p, ComparisonOperator::Eq, p.value.clone()))),
                (q.tag, None),
            ]),
            Outcome::Disjoint | Outcome::Unknown => Merge::Keep,
        }
    }
}

/// Replaces the IN list of `list` by `values` and drops the member at `merged`.
fn replace_list(list: &ConditionPart, values: Vec<Bson>, merged: usize) -> Merge {
    if values.is_empty() {
        return Merge::Impossible;
    }
    let value = Arc::new(Expr::Literal(BsonValue(Bson::Array(values))));
    Merge::Rewrite(vec![
        (list.tag, Some(rebuild(list, ComparisonOperator::In, value))),
        (merged, None),
    ])
}

/// Builds `attribute operator value` using the attribute operand of the part's source leaf.
fn rebuild(part: &ConditionPart, operator: ComparisonOperator, value: Arc<Expr>) -> Arc<Expr> {
    let attribute = match (part.source.as_ref(), part.side) {
        (Expr::Comparison { left, .. }, Side::Left) => left.clone(),
        (Expr::Comparison { right, .. }, Side::Right) => right.clone(),
        _ => Arc::new(Expr::Attribute {
            variable: part.variable.clone(),
            path: part.path.clone(),
        }),
    };
    Arc::new(Expr::Comparison {
        operator,
        left: attribute,
        right: value,
    })
}

/// Evaluation priority of a clause member, conditions excluding `null` come first.
fn priority(expr: &Expr) -> u8 {
    match expr {
        Expr::Comparison { operator, .. } => match operator {
            ComparisonOperator::Ne => 1,
            ComparisonOperator::Gt => 2,
            ComparisonOperator::Gte => 3,
            ComparisonOperator::Eq => 4,
            ComparisonOperator::In => 5,
            ComparisonOperator::Nin => 6,
            ComparisonOperator::Lt => 7,
            ComparisonOperator::Lte => 8,
        },
        _ => 9,
    }
}

/// Sorts and deduplicates a list of values, `None` if some values cannot be ordered.
pub fn sort_values(values: &[Bson]) -> Option<Vec<Bson>> {
    if !values.iter().all(bson_utils::is_comparable) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| bson_utils::try_cmp_bson(a, b).unwrap_or(Ordering::Equal));
    sorted.dedup_by(|a, b| bson_utils::bson_eq(a, b));
    Some(sorted)
}

/// Returns the leaf with its constant IN / NOT IN list sorted and deduplicated.
fn sort_in_list(leaf: &Arc<Expr>) -> Option<Arc<Expr>> {
    let Expr::Comparison { operator, left, right } = leaf.as_ref() else {
        return None;
    };
    if !matches!(operator, ComparisonOperator::In | ComparisonOperator::Nin) {
        return None;
    }
    let Some(Bson::Array(values)) = right.literal() else {
        return None;
    };
    let sorted = sort_values(values)?;
    if sorted.len() == values.len() && sorted.iter().zip(values).all(|(a, b)| a == b) {
        return None;
    }
    Some(Arc::new(Expr::Comparison {
        operator: *operator,
        left: left.clone(),
        right: Arc::new(Expr::Literal(BsonValue(Bson::Array(sorted)))),
    }))
}

/// Sorts the constant IN lists of a clause. `IN []` makes the clause impossible (`None`),
/// `NOT IN []` always holds and is dropped.
fn normalize_in_lists(members: &[Arc<Expr>]) -> Option<Vec<Arc<Expr>>> {
    let mut normalized = Vec::with_capacity(members.len());
    for member in members {
        let member = sort_in_list(member).unwrap_or_else(|| member.clone());
        if let Expr::Comparison { operator, right, .. } = member.as_ref() {
            if let Some(Bson::Array(values)) = right.literal() {
                if values.is_empty() {
                    match operator {
                        ComparisonOperator::In => return None,
                        ComparisonOperator::Nin => continue,
                        _ => {}
                    }
                }
            }
        }
        normalized.push(member);
    }
    Some(normalized)
}

/// Light optimization pass which only sorts and deduplicates the constant IN lists, keeping the
/// tree structure untouched.
pub fn sort_in_lists(root: Arc<Expr>) -> Arc<Expr> {
    root.transform_up(&|e| sort_in_list(&e).unwrap_or(e))
}

/// Drops the `attr != null` and `attr > null` members of a clause when `attr` is the single field
/// of a sparse index, since such an index never contains `null` values.
pub fn strip_sparse_null_checks(
    members: &[Arc<Expr>],
    variable: &Variable,
    index: &IndexMetadata,
    bindings: &Bindings,
) -> Vec<Arc<Expr>> {
    let Some(field) = index.single_sparse_field() else {
        return members.to_vec();
    };
    members
        .iter()
        .filter(|m| {
            !ConditionPart::from_leaf(m, Some(variable), bindings, 0)
                .is_some_and(|p| p.is_null_excluding() && p.path.as_slice() == field)
        })
        .cloned()
        .collect()
}
