use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use bson::Bson;
use crate::condition::optimizer::sort_values;
use crate::condition::outcome::{classify, CompareOp, Outcome};
use crate::query::{is_expanded, Bindings, BsonValue, ComparisonOperator, Expr, PathComponent, Quantifier, Variable};
use crate::util::bson_utils;

/// Above this number of pairwise comparisons, IN lists are compared through a hash set.
const MAX_PAIRWISE_COMPARISONS: usize = 2048;

/// The operand position the attribute access occupied in the source comparison.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum Side {
    Left,
    Right,
}

/// A leaf comparison normalized around one attribute access: `variable.path operator value`.
///
/// The operator is always expressed as if the attribute was the left operand.
#[derive(Debug, Clone)]
pub struct ConditionPart {
    pub variable: Variable,
    pub path: Vec<PathComponent>,
    pub operator: ComparisonOperator,
    /// Set for array comparisons only.
    pub quantifier: Option<Quantifier>,
    pub value: Arc<Expr>,
    pub side: Side,
    pub expanded: bool,
    /// The leaf this part was built from.
    pub source: Arc<Expr>,
    /// Opaque caller data, usually the position of the leaf in its AND clause.
    pub tag: usize,
}

impl ConditionPart {

    /// Builds the part of `leaf` for the attribute `variable.path` located on `side`.
    /// Returns `None` if the leaf is not a comparison.
    ///
    /// # Panics
    /// Panics if the attribute is on the right side of a non reversible operator (`IN`, `NOT IN`)
    /// or of an array comparison.
    pub fn new(
        variable: Variable,
        path: Vec<PathComponent>,
        leaf: &Arc<Expr>,
        side: Side,
        tag: usize,
    ) -> Option<ConditionPart> {
        let (operator, quantifier, left, right) = match leaf.as_ref() {
            Expr::Comparison { operator, left, right } => (*operator, None, left, right),
            Expr::ArrayComparison { operator, quantifier, left, right } => {
                assert_eq!(side, Side::Left, "Array comparisons cannot be reversed");
                (*operator, Some(*quantifier), left, right)
            }
            _ => return None,
        };

        let (operator, value) = match side {
            Side::Left => (operator, right.clone()),
            Side::Right => (operator.reverse(), left.clone()),
        };

        let expanded = is_expanded(&path);
        Some(ConditionPart {
            variable,
            path,
            operator,
            quantifier,
            value,
            side,
            expanded,
            source: leaf.clone(),
            tag,
        })
    }

    /// Builds the part of a leaf comparison, locating the attribute access and resolving the
    /// operands through `bindings`. If `variable` is specified only attributes of that variable
    /// are considered. The left operand is preferred when both operands are attribute accesses.
    pub fn from_leaf(
        leaf: &Arc<Expr>,
        variable: Option<&Variable>,
        bindings: &Bindings,
        tag: usize,
    ) -> Option<ConditionPart> {
        let attribute_of = |expr: &Arc<Expr>| -> Option<(Variable, Vec<PathComponent>)> {
            let resolved = bindings.resolve(expr);
            let (v, path) = resolved.attribute()?;
            if variable.map_or(true, |variable| variable == v) {
                Some((v.clone(), path.to_vec()))
            } else {
                None
            }
        };

        let (attribute, side, value) = match leaf.as_ref() {
            Expr::Comparison { operator, left, right } => {
                if let Some(attribute) = attribute_of(left) {
                    (attribute, Side::Left, right)
                } else if operator.is_reversible() {
                    (attribute_of(right)?, Side::Right, left)
                } else {
                    return None;
                }
            }
            Expr::ArrayComparison { left, right, .. } => (attribute_of(left)?, Side::Left, right),
            _ => return None,
        };

        let mut part = ConditionPart::new(attribute.0, attribute.1, leaf, side, tag)?;
        let resolved = bindings.resolve(value);
        part.value = if Arc::ptr_eq(&resolved, value) {
            resolved
        } else {
            sort_bound_list(part.operator, resolved)
        };
        Some(part)
    }

    /// Stable ordinal of the comparison kind: Eq=0, Ne=1, Lt=2, Lte=3, Gte=4, Gt=5, other=6.
    pub fn which_compare_operation(&self) -> usize {
        self.compare_op().ordinal()
    }

    pub fn compare_op(&self) -> CompareOp {
        CompareOp::from(self.operator)
    }

    pub fn is_constant(&self) -> bool {
        self.value.is_constant()
    }

    /// Returns the elements of a constant `IN` / `NOT IN` list.
    pub fn constant_values(&self) -> Option<&Vec<Bson>> {
        match (self.operator, self.value.literal()) {
            (ComparisonOperator::In | ComparisonOperator::Nin, Some(Bson::Array(values))) => Some(values),
            _ => None,
        }
    }

    /// Lower bound implied by the comparison. `IN` lists must be sorted.
    pub fn lower_bound(&self) -> Option<&Bson> {
        if self.quantifier.is_some() {
            return None;
        }
        match self.operator {
            ComparisonOperator::Gt | ComparisonOperator::Gte | ComparisonOperator::Eq => self.value.literal(),
            ComparisonOperator::In => self.constant_values()?.first(),
            _ => None,
        }
    }

    /// Upper bound implied by the comparison. `IN` lists must be sorted.
    pub fn upper_bound(&self) -> Option<&Bson> {
        if self.quantifier.is_some() {
            return None;
        }
        match self.operator {
            ComparisonOperator::Lt | ComparisonOperator::Lte | ComparisonOperator::Eq => self.value.literal(),
            ComparisonOperator::In => self.constant_values()?.last(),
            _ => None,
        }
    }

    pub fn is_lower_inclusive(&self) -> bool {
        matches!(self.operator, ComparisonOperator::Gte | ComparisonOperator::Eq | ComparisonOperator::In)
    }

    pub fn is_upper_inclusive(&self) -> bool {
        matches!(self.operator, ComparisonOperator::Lte | ComparisonOperator::Eq | ComparisonOperator::In)
    }

    /// Returns `true` for `attr != null` and `attr > null`, which a sparse index satisfies.
    pub fn is_null_excluding(&self) -> bool {
        self.quantifier.is_none()
            && matches!(self.operator, ComparisonOperator::Ne | ComparisonOperator::Gt)
            && matches!(self.value.literal(), Some(Bson::Null))
    }

    /// Returns `true` if both parts constrain the same attribute.
    pub fn same_attribute(&self, other: &ConditionPart) -> bool {
        self.variable == other.variable && self.path == other.path
    }

    /// Returns `true` if every value satisfying `other` also satisfies `self`, meaning that `self`
    /// can be discarded once `other` has been applied. `is_reversed` indicates that the two
    /// parts were built from opposite operand sides.
    pub fn is_covered_by(&self, other: &ConditionPart, is_reversed: bool) -> bool {
        if !self.same_attribute(other) {
            return false;
        }

        if !self.expanded
            && !other.expanded
            && other.operator == ComparisonOperator::In
            && other.constant_values().is_some()
            && is_reversed
        {
            return self.operator == ComparisonOperator::In && values_equal(&self.value, &other.value);
        }

        if self.operator == other.operator
            && self.quantifier == other.quantifier
            && values_equal(&self.value, &other.value)
        {
            return true;
        }

        if !self.expanded && self.quantifier.is_none() && other.quantifier.is_none() {
            if let Some(candidates) = other.possible_values() {
                if candidates.is_empty() {
                    return false;
                }
                return match (self.operator, self.constant_values()) {
                    (ComparisonOperator::In, Some(values)) => is_subset(candidates, values),
                    _ => candidates.iter().all(|v| self.accepts(v)),
                };
            }
        }

        if self.expanded && other.expanded {
            if let (ComparisonOperator::In, ComparisonOperator::In) = (self.operator, other.operator) {
                return match (self.constant_values(), other.constant_values()) {
                    (Some(values), Some(other_values)) => {
                        is_subset(values, other_values) && is_subset(other_values, values)
                    }
                    _ => false,
                };
            }
        }

        let (self_op, other_op) = match (self.effective_array_operator(), other.effective_array_operator()) {
            (None, None) => (self.compare_op(), other.compare_op()),
            (Some((self_op, quantifier)), Some((other_op, other_quantifier))) => {
                if quantifier != other_quantifier || quantifier == Quantifier::Any {
                    return false;
                }
                (CompareOp::from(self_op), CompareOp::from(other_op))
            }
            _ => return false,
        };

        match compare_values(&other.value, &self.value) {
            Some(sign) => {
                let multivalued = self.expanded || other.expanded;
                classify(multivalued, sign, other_op, self_op) == Outcome::OtherContainedInSelf
            }
            None => false,
        }
    }

    /// For an array comparison, the operator and quantifier with `NONE x op v` rewritten as
    /// `ALL x !op v`.
    fn effective_array_operator(&self) -> Option<(ComparisonOperator, Quantifier)> {
        match self.quantifier? {
            Quantifier::None => Some((self.operator.negate(), Quantifier::All)),
            quantifier => Some((self.operator, quantifier)),
        }
    }

    /// The finite set of values a single valued attribute can take when the part holds.
    fn possible_values(&self) -> Option<&[Bson]> {
        match (self.operator, self.value.literal()) {
            (ComparisonOperator::In, Some(Bson::Array(values))) => Some(values.as_slice()),
            (ComparisonOperator::Eq, Some(value)) => Some(std::slice::from_ref(value)),
            _ => None,
        }
    }

    /// Returns `true` if `attribute == value` implies this part.
    pub fn accepts(&self, value: &Bson) -> bool {
        match self.operator {
            ComparisonOperator::In => self
                .constant_values()
                .is_some_and(|values| values.iter().any(|v| bson_utils::bson_eq(v, value))),
            ComparisonOperator::Nin => self
                .constant_values()
                .is_some_and(|values| values.iter().all(|v| is_distinct(v, value))),
            _ => match self.value.literal().and_then(|v| bson_utils::try_cmp_bson(value, v)) {
                Some(sign) => {
                    classify(false, sign, CompareOp::Eq, self.compare_op()) == Outcome::OtherContainedInSelf
                }
                None => false,
            },
        }
    }
}

/// Returns `true` if the two values are provably different.
/// Sorts the constant `IN` / `NOT IN` list a bound variable resolved to. Literal lists are
/// sorted by the optimizer before any part is built.
fn sort_bound_list(operator: ComparisonOperator, value: Arc<Expr>) -> Arc<Expr> {
    if !matches!(operator, ComparisonOperator::In | ComparisonOperator::Nin) {
        return value;
    }
    let sorted = match value.literal() {
        Some(Bson::Array(values)) => sort_values(values),
        _ => None,
    };
    match sorted {
        Some(sorted) => Arc::new(Expr::Literal(BsonValue(Bson::Array(sorted)))),
        None => value,
    }
}

fn is_distinct(a: &Bson, b: &Bson) -> bool {
    bson_utils::try_cmp_bson(a, b).is_some_and(|ord| ord != Ordering::Equal)
}

/// Equality of two operands: BSON equality for constants, identical rendering otherwise.
pub fn values_equal(a: &Expr, b: &Expr) -> bool {
    match (a.literal(), b.literal()) {
        (Some(a), Some(b)) => bson_utils::bson_eq(a, b),
        (None, None) => a.to_string() == b.to_string(),
        _ => false,
    }
}

/// Three-way comparison of two operands, `None` if they cannot be compared.
pub fn compare_values(a: &Expr, b: &Expr) -> Option<Ordering> {
    match (a.literal(), b.literal()) {
        (Some(a), Some(b)) => bson_utils::try_cmp_bson(a, b),
        (None, None) if a.to_string() == b.to_string() => Some(Ordering::Equal),
        _ => None,
    }
}

/// Returns `true` if every element of `values` equals some element of `container`.
pub fn is_subset(values: &[Bson], container: &[Bson]) -> bool {
    if values.len().saturating_mul(container.len()) <= MAX_PAIRWISE_COMPARISONS {
        return values
            .iter()
            .all(|v| container.iter().any(|c| bson_utils::bson_eq(v, c)));
    }
    let set: HashSet<BsonValue> = container.iter().cloned().map(BsonValue).collect();
    values.iter().all(|v| set.contains(&BsonValue(v.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::expr_fn::*;

    fn part(leaf: &Arc<Expr>) -> ConditionPart {
        ConditionPart::from_leaf(leaf, None, &Bindings::new(), 0).unwrap()
    }

    fn doc() -> Variable {
        var(1, "doc")
    }

    fn a() -> Arc<Expr> {
        attr(&doc(), ["a"])
    }

    fn covered(leaf: Arc<Expr>, by: Arc<Expr>) -> bool {
        part(&leaf).is_covered_by(&part(&by), false)
    }

    #[test]
    fn test_attribute_on_the_right_is_reversed() {
        let p = part(&lt(lit(5), a()));
        assert_eq!(p.operator, ComparisonOperator::Gt);
        assert_eq!(p.side, Side::Right);
        assert_eq!(p.value, lit(5));
        assert_eq!(p.which_compare_operation(), 5);
    }

    #[test]
    fn test_in_with_attribute_on_the_right_has_no_part() {
        let leaf = within(lit(1), a());
        assert!(ConditionPart::from_leaf(&leaf, None, &Bindings::new(), 0).is_none());
        assert!(ConditionPart::from_leaf(&func("F", [a()]), None, &Bindings::new(), 0).is_none());
    }

    #[test]
    #[should_panic]
    fn test_reversing_in_panics() {
        let leaf = within(lit(1), a());
        ConditionPart::new(doc(), vec!["a".into()], &leaf, Side::Right, 0);
    }

    #[test]
    fn test_from_leaf_with_variable_and_bindings() {
        let other = var(2, "other");
        let alias = var(3, "alias");
        let mut bindings = Bindings::new();
        bindings.bind(&alias, attr(&other, ["b"]));

        let leaf = eq(a(), reference(&alias));
        let p = ConditionPart::from_leaf(&leaf, Some(&other), &bindings, 7).unwrap();
        assert_eq!(p.variable, other);
        assert_eq!(p.path, vec![PathComponent::from("b")]);
        assert_eq!(p.side, Side::Right);
        assert_eq!(p.value, a());
        assert_eq!(p.tag, 7);
    }

    #[test]
    fn test_bound_in_list_is_sorted() {
        let alias = var(3, "alias");
        let mut bindings = Bindings::new();
        bindings.bind(&alias, lit(vec![9, 1, 4]));

        let p = ConditionPart::from_leaf(&within(a(), reference(&alias)), None, &bindings, 0).unwrap();
        assert_eq!(p.value, lit(vec![1, 4, 9]));
        assert_eq!(p.lower_bound(), Some(&Bson::Int32(1)));
        assert_eq!(p.upper_bound(), Some(&Bson::Int32(9)));
    }

    #[test]
    fn test_bounds() {
        let p = part(&gt(a(), lit(5)));
        assert_eq!(p.lower_bound(), Some(&Bson::Int32(5)));
        assert_eq!(p.upper_bound(), None);
        assert!(!p.is_lower_inclusive());

        let p = part(&within(a(), lit(vec![1, 4, 9])));
        assert_eq!(p.lower_bound(), Some(&Bson::Int32(1)));
        assert_eq!(p.upper_bound(), Some(&Bson::Int32(9)));
        assert!(p.is_lower_inclusive() && p.is_upper_inclusive());

        let p = part(&eq(a(), lit("x")));
        assert_eq!(p.lower_bound(), p.upper_bound());

        let p = part(&ne(a(), lit(1)));
        assert_eq!(p.lower_bound(), None);
        assert!(!p.is_upper_inclusive());
    }

    #[test]
    fn test_covered_by_simple_comparisons() {
        assert!(covered(gt(a(), lit(3)), gt(a(), lit(5))));
        assert!(!covered(gt(a(), lit(5)), gt(a(), lit(3))));
        assert!(covered(lte(a(), lit(5)), eq(a(), lit(5))));
        assert!(covered(ne(a(), lit(4)), eq(a(), lit(5))));
        assert!(!covered(lte(a(), lit(5)), gte(a(), lit(5))));
        assert!(!covered(eq(a(), lit(5)), eq(a(), lit(6))));
        assert!(covered(eq(a(), attr(&doc(), ["b"])), eq(a(), attr(&doc(), ["b"]))));
        assert!(!covered(eq(a(), attr(&doc(), ["b"])), eq(a(), attr(&doc(), ["c"]))));
    }

    #[test]
    fn test_covered_by_other_attribute() {
        let b = attr(&doc(), ["b"]);
        assert!(!covered(gt(a(), lit(3)), gt(b, lit(5))));
    }

    #[test]
    fn test_covered_by_in_lists() {
        assert!(covered(within(a(), lit(vec![1, 2, 3])), within(a(), lit(vec![1, 3]))));
        assert!(!covered(within(a(), lit(vec![1, 3])), within(a(), lit(vec![1, 2, 3]))));
        assert!(covered(within(a(), lit(vec![1, 2, 3])), eq(a(), lit(2))));
        assert!(covered(gt(a(), lit(0)), within(a(), lit(vec![1, 2, 3]))));
        assert!(!covered(gt(a(), lit(1)), within(a(), lit(vec![1, 2, 3]))));
        assert!(covered(nin(a(), lit(vec![7, 8])), within(a(), lit(vec![1, 2]))));
        assert!(!covered(nin(a(), lit(vec![2, 8])), within(a(), lit(vec![1, 2]))));
    }

    #[test]
    fn test_covered_by_large_in_lists() {
        let large: Vec<i32> = (0..100).collect();
        let subset: Vec<i32> = (10..60).collect();
        assert!(covered(within(a(), lit(large.clone())), within(a(), lit(subset.clone()))));
        assert!(!covered(within(a(), lit(subset)), within(a(), lit(large))));
    }

    #[test]
    fn test_covered_by_reversed_in() {
        let list = within(a(), lit(vec![1, 2]));
        let p = part(&list);
        assert!(p.is_covered_by(&part(&list), true));
        assert!(!part(&within(a(), lit(vec![1, 3]))).is_covered_by(&p, true));
        assert!(!part(&eq(a(), lit(vec![1, 2]))).is_covered_by(&p, true));
    }

    #[test]
    fn test_covered_expanded() {
        let tags = || attr(&doc(), ["tags", "[*]"]);
        assert!(covered(within(tags(), lit(vec![1, 2])), within(tags(), lit(vec![2, 1]))));
        assert!(!covered(within(tags(), lit(vec![1, 2, 3])), within(tags(), lit(vec![1, 2]))));
        assert!(covered(gt(tags(), lit(3)), gt(tags(), lit(5))));
    }

    #[test]
    fn test_covered_array_comparisons() {
        use ComparisonOperator::*;
        let t = || attr(&doc(), ["tags"]);
        let all = |op, v: i32| array_cmp(op, Quantifier::All, t(), lit(v));
        let any = |op, v: i32| array_cmp(op, Quantifier::Any, t(), lit(v));
        let none = |op, v: i32| array_cmp(op, Quantifier::None, t(), lit(v));

        assert!(covered(all(Gt, 3), all(Gt, 5)));
        assert!(!covered(all(Gt, 5), all(Gt, 3)));
        assert!(!covered(any(Gt, 3), any(Gt, 5)));
        assert!(!covered(all(Gt, 3), any(Gt, 5)));
        // NONE > 5 is ALL <= 5
        assert!(covered(none(Gt, 5), none(Gt, 3)));
        assert!(!covered(gt(t(), lit(3)), all(Gt, 5)));
    }

    #[test]
    fn test_sparse_null_detection() {
        assert!(part(&ne(a(), lit(Bson::Null))).is_null_excluding());
        assert!(part(&gt(a(), lit(Bson::Null))).is_null_excluding());
        assert!(!part(&gte(a(), lit(Bson::Null))).is_null_excluding());
        assert!(!part(&ne(a(), lit(1))).is_null_excluding());
    }

    #[test]
    fn test_is_subset() {
        let values = vec![Bson::Int32(1), Bson::Double(2.0)];
        let container = vec![Bson::Int64(2), Bson::Int32(1), Bson::Int32(5)];
        assert!(is_subset(&values, &container));
        assert!(!is_subset(&container, &values));
    }
}
