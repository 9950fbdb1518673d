pub mod dnf;
pub mod index;
pub mod optimizer;
pub mod outcome;
pub mod part;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use bson::{Bson, Document};
use crate::condition::dnf::DnfTransformer;
use crate::condition::index::{CollectionStatistics, IndexMetadata, IndexSelector, SortCondition, Usability};
use crate::condition::optimizer::{sort_in_lists, strip_sparse_null_checks, ConjunctionOptimizer};
use crate::condition::part::ConditionPart;
use crate::error::Result;
use crate::obs::logger::LoggerAndTracer;
use crate::obs::metrics::ConditionMetrics;
use crate::options::options::{OptimizationMode, OptimizerOptions};
use crate::query::{document, Bindings, ComparisonOperator, Expr, PathComponent, Variable};
use crate::{debug, event, warn};

/// The three possible states of a filter condition.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionState {
    /// No filter at all: every document matches.
    Unconditional,
    /// A filter expression. Once normalized, it is an `OR(AND(...))` tree with at least one
    /// branch.
    Expression(Arc<Expr>),
    /// A filter that no document can match.
    Unsatisfiable,
}

impl ConditionState {
    fn from_root(root: Option<Arc<Expr>>) -> Self {
        match root {
            None => ConditionState::Unconditional,
            Some(root) => match root.as_ref() {
                Expr::Or(branches) if branches.is_empty() => ConditionState::Unsatisfiable,
                _ => ConditionState::Expression(root),
            },
        }
    }
}

/// The filter condition applied to the documents of a query, normalized into disjunctive
/// normal form for index selection.
#[derive(Clone)]
pub struct Condition {
    state: ConditionState,
    normalized: bool,
    bindings: Bindings,
    logger: Arc<dyn LoggerAndTracer>,
    metrics: ConditionMetrics,
}

impl Condition {
    pub fn new(logger: Arc<dyn LoggerAndTracer>) -> Self {
        Condition {
            state: ConditionState::Unconditional,
            normalized: false,
            bindings: Bindings::new(),
            logger,
            metrics: ConditionMetrics::new(),
        }
    }

    /// Let-bound variables used to resolve references while comparing conditions.
    pub fn with_bindings(mut self, bindings: Bindings) -> Self {
        self.bindings = bindings;
        self
    }

    /// Shares the given metrics instead of the condition's own ones.
    pub fn with_metrics(mut self, metrics: ConditionMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    pub fn metrics(&self) -> &ConditionMetrics {
        &self.metrics
    }

    pub fn state(&self) -> &ConditionState {
        &self.state
    }

    /// The root of the condition. `None` if the condition is unconditional, an OR without
    /// branches if it is unsatisfiable.
    pub fn root(&self) -> Option<Arc<Expr>> {
        match &self.state {
            ConditionState::Unconditional => None,
            ConditionState::Expression(root) => Some(root.clone()),
            ConditionState::Unsatisfiable => Some(Arc::new(Expr::Or(Vec::new()))),
        }
    }

    /// Returns `true` if there is no filter at all.
    pub fn is_empty(&self) -> bool {
        self.state == ConditionState::Unconditional
    }

    pub fn is_unsatisfiable(&self) -> bool {
        self.state == ConditionState::Unsatisfiable
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    /// Returns `true` if the condition has at most one OR branch, in which case the documents
    /// produced by an index scan keep the index order.
    pub fn is_sorted(&self) -> bool {
        match &self.state {
            ConditionState::Expression(root) => match root.as_ref() {
                Expr::Or(branches) => branches.len() <= 1,
                _ => true,
            },
            _ => true,
        }
    }

    /// ANDs `expr` with the current condition.
    pub fn and_combine(&mut self, expr: Arc<Expr>) {
        self.state = match &self.state {
            ConditionState::Unconditional => ConditionState::Expression(expr),
            ConditionState::Expression(root) => {
                ConditionState::Expression(Arc::new(Expr::And(vec![root.clone(), expr])))
            }
            ConditionState::Unsatisfiable => ConditionState::Unsatisfiable,
        };
        self.normalized = false;
    }

    /// Rewrites the condition into disjunctive normal form and, in `Auto` mode, simplifies each of
    /// its AND clauses. Does nothing if the condition is already normalized.
    ///
    /// `multivalued` makes the optimizer consider every attribute as possibly holding several
    /// values.
    ///
    /// In `Auto` mode a condition too complex to be distributed is kept as a whole and evaluated
    /// unoptimized. Other modes return [`crate::error::Error::TooComplex`] in that case.
    pub fn normalize(&mut self, multivalued: bool, options: &OptimizerOptions) -> Result<()> {
        if self.normalized {
            return Ok(());
        }

        let root = match &self.state {
            ConditionState::Expression(root) => root.clone(),
            _ => {
                self.normalized = true;
                return Ok(());
            }
        };

        let start = Instant::now();
        let mode = options.optimization_mode();
        let transformer = DnfTransformer::new(
            mode != OptimizationMode::NoNegationPush,
            options.max_dnf_conditions(),
        );

        let (dnf, fallback) = match transformer.transform(root.clone()) {
            Ok(dnf) => (dnf, false),
            Err(e) if e.is_too_complex() && mode == OptimizationMode::Auto => {
                warn!(self.logger, "Condition not optimized: {}", e);
                self.metrics.dnf_fallbacks.inc();
                (Some(DnfTransformer::fallback(root)), true)
            }
            Err(e) => return Err(e),
        };

        let normalized = match dnf {
            Some(dnf) if fallback => Some(dnf),
            Some(dnf) if mode == OptimizationMode::Auto => {
                let optimized = ConjunctionOptimizer::new(multivalued, &self.bindings).optimize(&dnf);
                self.metrics.impossible_branches.inc_by(optimized.impossible_clauses as u64);
                optimized.root
            }
            Some(dnf) => Some(sort_in_lists(dnf)),
            None => None,
        };

        self.state = ConditionState::from_root(normalized);
        self.normalized = true;

        let branches = match &self.state {
            ConditionState::Expression(root) => match root.as_ref() {
                Expr::Or(branches) => branches.len(),
                _ => 1,
            },
            _ => 0,
        };
        self.metrics.normalizations.inc();
        self.metrics.branches.record(branches as u64);

        event!(
            self.logger,
            "event: normalize done, mode={:?}, branches={}, fallback={}, duration={}µs",
            mode,
            branches,
            fallback,
            start.elapsed().as_micros()
        );
        Ok(())
    }

    /// Asks `selector` whether some index can be used to filter and/or sort the documents.
    ///
    /// # Panics
    /// Panics if the condition has not been normalized.
    pub fn find_usability(
        &self,
        selector: &dyn IndexSelector,
        statistics: &CollectionStatistics,
        sort: Option<&SortCondition>,
    ) -> Usability {
        assert!(self.normalized, "find_usability called on a condition which is not normalized");

        let root = self
            .root()
            .unwrap_or_else(|| Arc::new(Expr::Or(vec![Arc::new(Expr::And(Vec::new()))])));
        selector.usability(&root, statistics, sort)
    }

    /// Removes the members of the condition on `variable` already guaranteed by `other`, the
    /// condition of an index lookup on `index`. A sparse single field index also guarantees that
    /// its field is not `null`.
    ///
    /// Both conditions must have a single AND branch, otherwise the root is returned unchanged.
    /// Returns the AND of the remaining members, `None` if nothing remains.
    pub fn remove_index_condition(
        &self,
        variable: &Variable,
        other: &Condition,
        index: &IndexMetadata,
    ) -> Option<Arc<Expr>> {
        self.remove_covered(variable, other, false, |members| {
            strip_sparse_null_checks(members, variable, index, &self.bindings)
        })
    }

    /// Removes the members of the condition on `variable` already guaranteed by `other`, the
    /// condition of a graph traversal. For path conditions only identical members are removed.
    ///
    /// Both conditions must have a single AND branch, otherwise the root is returned unchanged.
    /// Returns the AND of the remaining members, `None` if nothing remains.
    pub fn remove_traversal_condition(
        &self,
        variable: &Variable,
        other: &Condition,
        is_path_condition: bool,
    ) -> Option<Arc<Expr>> {
        self.remove_covered(variable, other, is_path_condition, |members| members.to_vec())
    }

    fn remove_covered<F>(
        &self,
        variable: &Variable,
        other: &Condition,
        identical_only: bool,
        prefilter: F,
    ) -> Option<Arc<Expr>>
    where
        F: Fn(&[Arc<Expr>]) -> Vec<Arc<Expr>>,
    {
        let root = self.root()?;
        let Some(members) = single_clause(&root) else {
            return Some(root);
        };

        let other_root = other.root();
        let other_members: &[Arc<Expr>] = match &other_root {
            None => &[],
            Some(other_root) => match single_clause(other_root) {
                Some(other_members) => other_members,
                None => return Some(root),
            },
        };

        let other_parts: Vec<ConditionPart> = other_members
            .iter()
            .enumerate()
            .filter_map(|(i, m)| ConditionPart::from_leaf(m, Some(variable), &other.bindings, i))
            .collect();

        let residual: Vec<Arc<Expr>> = prefilter(members)
            .into_iter()
            .filter(|member| {
                let covered = if identical_only {
                    member.variables().contains(variable) && other_members.contains(member)
                } else {
                    ConditionPart::from_leaf(member, Some(variable), &self.bindings, 0).is_some_and(|part| {
                        other_parts
                            .iter()
                            .any(|other_part| part.is_covered_by(other_part, part.side != other_part.side))
                    })
                };
                if covered {
                    debug!(self.logger, "Member already covered, member={}", member);
                }
                !covered
            })
            .collect();

        if residual.is_empty() {
            None
        } else {
            Some(Arc::new(Expr::And(residual)))
        }
    }

    /// Drops the AND members referencing a variable outside of `valid_variables`. Returns `true`
    /// if an AND clause lost all its members. Such a clause is kept empty.
    pub fn remove_invalid_variables(&mut self, valid_variables: &HashSet<Variable>) -> bool {
        let ConditionState::Expression(root) = &self.state else {
            return false;
        };

        let clauses: &[Arc<Expr>] = match root.as_ref() {
            Expr::Or(clauses) => clauses,
            _ => std::slice::from_ref(root),
        };

        let mut became_empty = false;
        let mut changed = false;
        let mut filtered = Vec::with_capacity(clauses.len());
        for clause in clauses {
            let members: &[Arc<Expr>] = match clause.as_ref() {
                Expr::And(members) => members,
                _ => std::slice::from_ref(clause),
            };
            let valid: Vec<Arc<Expr>> = members
                .iter()
                .filter(|m| m.variables().is_subset(valid_variables))
                .cloned()
                .collect();

            if valid.len() == members.len() {
                filtered.push(clause.clone());
                continue;
            }
            changed = true;
            became_empty |= valid.is_empty();
            filtered.push(Arc::new(Expr::And(valid)));
        }

        if changed {
            self.state = ConditionState::Expression(Arc::new(Expr::Or(filtered)));
        }
        became_empty
    }

    /// Returns the attributes of `variable` compared for equality with a constant. `null`
    /// constants are only considered if `include_null` is set.
    ///
    /// Only conditions with a single OR branch are inspected, an empty list is returned otherwise.
    pub fn get_const_attributes(&self, variable: &Variable, include_null: bool) -> Vec<Vec<PathComponent>> {
        self.collect_attributes(variable, |part| {
            part.operator == ComparisonOperator::Eq
                && (include_null || !matches!(part.value.literal(), Some(Bson::Null)))
        })
    }

    /// Returns the attributes of `variable` which cannot be `null` when the condition holds.
    ///
    /// Only conditions with a single OR branch are inspected, an empty list is returned otherwise.
    pub fn get_non_null_attributes(&self, variable: &Variable) -> Vec<Vec<PathComponent>> {
        self.collect_attributes(variable, |part| !part.accepts(&Bson::Null))
    }

    fn collect_attributes<F>(&self, variable: &Variable, predicate: F) -> Vec<Vec<PathComponent>>
    where
        F: Fn(&ConditionPart) -> bool,
    {
        let ConditionState::Expression(root) = &self.state else {
            return Vec::new();
        };
        let Some(members) = single_clause(root) else {
            return Vec::new();
        };

        let mut attributes: Vec<Vec<PathComponent>> = Vec::new();
        for (i, member) in members.iter().enumerate() {
            let Some(part) = ConditionPart::from_leaf(member, Some(variable), &self.bindings, i) else {
                continue;
            };
            if part.quantifier.is_none()
                && !part.expanded
                && part.is_constant()
                && predicate(&part)
                && !attributes.contains(&part.path)
            {
                attributes.push(part.path);
            }
        }
        attributes
    }

    /// Serializes the condition. An unconditional condition is an empty document.
    pub fn to_document(&self, verbose: bool) -> Document {
        match self.root() {
            None => Document::new(),
            Some(root) => document::to_document(&root, verbose),
        }
    }

    /// Reads a condition serialized by [`Condition::to_document`]. A condition already in
    /// disjunctive normal form is considered normalized.
    pub fn from_document(doc: &Document, logger: Arc<dyn LoggerAndTracer>) -> Result<Condition> {
        let mut condition = Condition::new(logger);
        if doc.is_empty() {
            condition.normalized = true;
            return Ok(condition);
        }

        let root = document::from_document(doc)?;
        condition.normalized = is_dnf(&root);
        condition.state = ConditionState::from_root(Some(root));
        Ok(condition)
    }
}

/// Returns the members of the single AND clause of an `OR(AND(...))` tree.
fn single_clause(root: &Arc<Expr>) -> Option<&[Arc<Expr>]> {
    match root.as_ref() {
        Expr::Or(clauses) if clauses.len() == 1 => match clauses[0].as_ref() {
            Expr::And(members) => Some(members),
            _ => None,
        },
        _ => None,
    }
}

fn is_dnf(root: &Expr) -> bool {
    let Expr::Or(clauses) = root else {
        return false;
    };
    clauses.iter().all(|clause| match clause.as_ref() {
        Expr::And(members) => members
            .iter()
            .all(|m| !matches!(m.as_ref(), Expr::And(_) | Expr::Or(_))),
        _ => false,
    })
}
