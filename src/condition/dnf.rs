use std::sync::Arc;
use crate::error::{Error, Result};
use crate::query::tree_node::TreeNode;
use crate::query::Expr;

/// Rewrites boolean expressions into disjunctive normal form: `OR(AND(leaf, ...), ...)`.
pub struct DnfTransformer {
    /// Whether NOT nodes are pushed down to the leaves using De Morgan's laws.
    push_negations: bool,
    /// Number of AND clauses at which the distribution gives up.
    max_conditions: usize,
}

impl DnfTransformer {
    pub fn new(push_negations: bool, max_conditions: usize) -> Self {
        DnfTransformer {
            push_negations,
            max_conditions,
        }
    }

    /// Transforms `root` into `OR(AND(leaf, ...), ...)`.
    ///
    /// Returns `None` if the expression is always true and an OR without members if it can never
    /// be true. Fails with [`Error::TooComplex`] if the distribution of the ANDs over the ORs
    /// would produce `max_conditions` clauses or more. Nothing is materialized in that case.
    pub fn transform(&self, root: Arc<Expr>) -> Result<Option<Arc<Expr>>> {
        let push_negations = self.push_negations;
        let expr = root.transform_down(&|e| Self::preorder(e, push_negations));
        let expr = expr.try_transform_up(&|e| self.postorder(e))?;
        Ok(Self::root_fixup(expr))
    }

    /// Degraded form of a condition which could not be transformed: the original tree evaluated
    /// as a whole.
    pub fn fallback(original: Arc<Expr>) -> Arc<Expr> {
        Arc::new(Expr::Or(vec![Arc::new(Expr::And(vec![Arc::new(Expr::NoOptimize(original))]))]))
    }

    fn preorder(expr: Arc<Expr>, push_negations: bool) -> Arc<Expr> {
        match expr.as_ref() {
            Expr::Not(inner) => {
                let mut inner = inner.clone();
                let mut negated = true;
                while let Expr::Not(next) = inner.as_ref() {
                    inner = next.clone();
                    negated = !negated;
                }

                if !negated {
                    return Self::preorder(inner, push_negations);
                }

                if push_negations || matches!(inner.as_ref(), Expr::Literal(_)) {
                    let pushed = inner.negate();
                    if matches!(pushed.as_ref(), Expr::Not(_)) {
                        return pushed;
                    }
                    return Self::preorder(pushed, push_negations);
                }
                Arc::new(Expr::Not(inner))
            }
            Expr::Comparison { operator, left, right } if operator.is_reversible() => {
                let swap = match (left.is_attribute(), right.is_attribute()) {
                    (false, true) => true,
                    (true, true) => left.to_string() > right.to_string(),
                    _ => false,
                };
                if swap {
                    Arc::new(Expr::Comparison {
                        operator: operator.reverse(),
                        left: right.clone(),
                        right: left.clone(),
                    })
                } else {
                    expr
                }
            }
            _ => expr,
        }
    }

    fn postorder(&self, expr: Arc<Expr>) -> Result<Arc<Expr>> {
        match expr.as_ref() {
            Expr::Or(members) => {
                let mut flattened = Vec::with_capacity(members.len());
                for member in members {
                    if member.is_true() {
                        return Ok(Arc::new(Expr::Literal(true.into())));
                    }
                    match member.as_ref() {
                        Expr::Or(nested) => flattened.extend(nested.iter().cloned()),
                        _ if member.is_false() => {}
                        _ => flattened.push(member.clone()),
                    }
                }
                if flattened.is_empty() {
                    return Ok(Arc::new(Expr::Literal(false.into())));
                }
                Ok(Arc::new(Expr::Or(flattened)))
            }
            Expr::And(members) => {
                let mut flattened = Vec::with_capacity(members.len());
                for member in members {
                    if member.is_false() {
                        return Ok(Arc::new(Expr::Literal(false.into())));
                    }
                    match member.as_ref() {
                        Expr::And(nested) => flattened.extend(nested.iter().cloned()),
                        _ if member.is_true() => {}
                        _ => flattened.push(member.clone()),
                    }
                }
                if flattened.is_empty() {
                    return Ok(Arc::new(Expr::Literal(true.into())));
                }
                if flattened.iter().any(|m| matches!(m.as_ref(), Expr::Or(_))) {
                    return self.distribute(&flattened);
                }
                Ok(Arc::new(Expr::And(flattened)))
            }
            _ => Ok(expr),
        }
    }

    /// Distributes the AND members over their OR members: `a && (b || c)` -> `(a && b) || (a && c)`.
    fn distribute(&self, members: &[Arc<Expr>]) -> Result<Arc<Expr>> {
        let mut conditions: usize = 1;
        for member in members {
            if let Expr::Or(branches) = member.as_ref() {
                conditions = conditions.checked_mul(branches.len()).unwrap_or(usize::MAX);
            }
        }

        if conditions >= self.max_conditions {
            return Err(Error::TooComplex {
                conditions,
                limit: self.max_conditions,
            });
        }

        let mut clauses: Vec<Vec<Arc<Expr>>> = vec![Vec::new()];
        for member in members {
            match member.as_ref() {
                Expr::Or(branches) => {
                    let mut product = Vec::with_capacity(clauses.len() * branches.len());
                    for clause in &clauses {
                        for branch in branches {
                            let mut combined = clause.clone();
                            match branch.as_ref() {
                                Expr::And(nested) => combined.extend(nested.iter().cloned()),
                                _ => combined.push(branch.clone()),
                            }
                            product.push(combined);
                        }
                    }
                    clauses = product;
                }
                _ => clauses.iter_mut().for_each(|clause| clause.push(member.clone())),
            }
        }

        Ok(Arc::new(Expr::Or(
            clauses.into_iter().map(|c| Arc::new(Expr::And(c))).collect(),
        )))
    }

    fn root_fixup(expr: Arc<Expr>) -> Option<Arc<Expr>> {
        if expr.is_true() {
            return None;
        }
        if expr.is_false() {
            return Some(Arc::new(Expr::Or(Vec::new())));
        }

        let as_clause = |e: &Arc<Expr>| match e.as_ref() {
            Expr::And(_) => e.clone(),
            _ => Arc::new(Expr::And(vec![e.clone()])),
        };

        let root = match expr.as_ref() {
            Expr::Or(members) => Expr::Or(members.iter().map(as_clause).collect()),
            _ => Expr::Or(vec![as_clause(&expr)]),
        };
        Some(Arc::new(root))
    }
}
