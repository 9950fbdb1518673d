use std::cmp::Ordering;
use std::fmt;
use crate::query::ComparisonOperator;

/// Comparison kinds understood by the classifier, in the order of their ordinals.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gte,
    Gt,
    /// Anything the classifier cannot reason about (IN, NOT IN, functions...)
    Other,
}

impl CompareOp {
    pub const ALL: [CompareOp; 7] = [
        CompareOp::Eq,
        CompareOp::Ne,
        CompareOp::Lt,
        CompareOp::Lte,
        CompareOp::Gte,
        CompareOp::Gt,
        CompareOp::Other,
    ];

    pub fn ordinal(&self) -> usize {
        match self {
            CompareOp::Eq => 0,
            CompareOp::Ne => 1,
            CompareOp::Lt => 2,
            CompareOp::Lte => 3,
            CompareOp::Gte => 4,
            CompareOp::Gt => 5,
            CompareOp::Other => 6,
        }
    }

    pub fn from_ordinal(ordinal: usize) -> CompareOp {
        Self::ALL.get(ordinal).copied().unwrap_or(CompareOp::Other)
    }
}

impl From<ComparisonOperator> for CompareOp {
    fn from(operator: ComparisonOperator) -> Self {
        match operator {
            ComparisonOperator::Eq => CompareOp::Eq,
            ComparisonOperator::Ne => CompareOp::Ne,
            ComparisonOperator::Lt => CompareOp::Lt,
            ComparisonOperator::Lte => CompareOp::Lte,
            ComparisonOperator::Gte => CompareOp::Gte,
            ComparisonOperator::Gt => CompareOp::Gt,
            ComparisonOperator::In | ComparisonOperator::Nin => CompareOp::Other,
        }
    }
}

/// Relation between two comparisons `x op1 v1` (self) and `x op2 v2` (other) on the same attribute.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum Outcome {
    /// The two comparisons can never hold at the same time.
    Impossible,
    /// `self` is implied by `other` and can be dropped.
    SelfContainedInOther,
    /// `other` is implied by `self` and can be dropped.
    OtherContainedInSelf,
    /// Neither comparison implies the other.
    Disjoint,
    /// Together the comparisons are equivalent to `x == v`.
    ConvertEqual,
    /// At least one of the comparisons cannot be classified.
    Unknown,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Outcome::Impossible => "impossible",
            Outcome::SelfContainedInOther => "self contained in other",
            Outcome::OtherContainedInSelf => "other contained in self",
            Outcome::Disjoint => "disjoint",
            Outcome::ConvertEqual => "convert equal",
            Outcome::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// Picks the outcome matching `sign = cmp(v1, v2)` among the `[less, equal, greater]` triple.
fn pick(sign: Ordering, outcomes: [Outcome; 3]) -> Outcome {
    match sign {
        Ordering::Less => outcomes[0],
        Ordering::Equal => outcomes[1],
        Ordering::Greater => outcomes[2],
    }
}

/// Classifies `x op1 v1` against `x op2 v2` for a single valued attribute, where
/// `sign = cmp(v1, v2)`.
pub fn classify_single(sign: Ordering, op1: CompareOp, op2: CompareOp) -> Outcome {
    use CompareOp::*;
    use Outcome::{
        ConvertEqual as C, Disjoint as D, Impossible as I, OtherContainedInSelf as O,
        SelfContainedInOther as S,
    };

    let outcomes = match (op1, op2) {
        (Other, _) | (_, Other) => return Outcome::Unknown,

        (Eq, Eq) => [I, O, I],
        (Eq, Ne) => [O, I, O],
        (Eq, Lt) => [O, I, I],
        (Eq, Lte) => [O, O, I],
        (Eq, Gte) => [I, O, O],
        (Eq, Gt) => [I, I, O],

        (Ne, Eq) => [S, I, S],
        (Ne, Ne) => [D, O, D],
        (Ne, Lt) => [D, S, S],
        (Ne, Lte) => [D, D, S],
        (Ne, Gte) => [S, D, D],
        (Ne, Gt) => [S, S, D],

        (Lt, Eq) => [I, I, S],
        (Lt, Ne) => [O, O, D],
        (Lt, Lt) => [O, O, S],
        (Lt, Lte) => [O, O, S],
        (Lt, Gte) => [I, I, D],
        (Lt, Gt) => [I, I, D],

        (Lte, Eq) => [I, S, S],
        (Lte, Ne) => [O, D, D],
        (Lte, Lt) => [O, S, S],
        (Lte, Lte) => [O, O, S],
        (Lte, Gte) => [I, C, D],
        (Lte, Gt) => [I, I, D],

        (Gte, Eq) => [S, S, I],
        (Gte, Ne) => [D, D, O],
        (Gte, Lt) => [D, I, I],
        (Gte, Lte) => [D, C, I],
        (Gte, Gte) => [S, O, O],
        (Gte, Gt) => [S, S, O],

        (Gt, Eq) => [S, I, I],
        (Gt, Ne) => [D, O, O],
        (Gt, Lt) => [D, I, I],
        (Gt, Lte) => [D, I, I],
        (Gt, Gte) => [S, O, O],
        (Gt, Gt) => [S, O, O],
    };
    pick(sign, outcomes)
}

/// Classifies `x op1 v1` against `x op2 v2` for a multi valued (expanded) attribute.
///
/// Each comparison may be satisfied by a different array element, so two comparisons never
/// contradict each other nor merge into an equality. Implications still hold element-wise.
pub fn classify_multi(sign: Ordering, op1: CompareOp, op2: CompareOp) -> Outcome {
    match classify_single(sign, op1, op2) {
        Outcome::Impossible | Outcome::ConvertEqual => Outcome::Disjoint,
        outcome => outcome,
    }
}

pub fn classify(multivalued: bool, sign: Ordering, op1: CompareOp, op2: CompareOp) -> Outcome {
    if multivalued {
        classify_multi(sign, op1, op2)
    } else {
        classify_single(sign, op1, op2)
    }
}
