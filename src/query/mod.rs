use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use bson::Bson;
use crate::query::tree_node::TreeNode;
use crate::util::bson_utils;

pub mod document;
pub mod expr_fn;
pub mod tree_node;

/// A query variable (a collection iteration, a let binding, a traversal vertex...).
///
/// Two variables are the same variable if they share the same id; the name is only used
/// for rendering.
#[derive(Debug, Clone)]
pub struct Variable {
    pub id: u32,
    pub name: String,
}

impl Variable {
    pub fn new(id: u32, name: &str) -> Self {
        Variable { id, name: name.to_string() }
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Variable {}

impl Hash for Variable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Variable {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Variable {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Debug, Clone, Eq, Hash, PartialEq)]
pub enum Expr {
    /// Attribute access on a variable (e.g. `doc.a.b`, `doc.a[*].b`)
    Attribute {
        variable: Variable,
        path: Vec<PathComponent>,
    },
    /// Reference to a variable as a whole
    Reference(Variable),
    /// Literal values
    Literal(BsonValue),
    /// A binary comparison (e.g. `doc.a > 5`, `doc.a IN [1, 2]`)
    Comparison {
        operator: ComparisonOperator,
        left: Arc<Expr>,
        right: Arc<Expr>,
    },
    /// A quantified comparison between the elements of the left array and the right value
    /// (e.g. `doc.tags ALL == "x"`)
    ArrayComparison {
        operator: ComparisonOperator,
        quantifier: Quantifier,
        left: Arc<Expr>,
        right: Arc<Expr>,
    },
    And(Vec<Arc<Expr>>),
    Or(Vec<Arc<Expr>>),
    Not(Arc<Expr>),
    /// Opaque function call. Filters using them are never restructured.
    Function {
        name: String,
        args: Vec<Arc<Expr>>,
    },
    /// Wrapper marking a sub-tree which must be evaluated as is.
    NoOptimize(Arc<Expr>),
}

/// The tree structure exposed to the rewriting passes is the boolean structure: junctions
/// and negations have children, every other node (comparisons included) is a leaf.
impl TreeNode for Expr {

    fn children(&self) -> Vec<Arc<Self>> {
        match self {
            Expr::And(elements) => elements.to_vec(),
            Expr::Or(elements) => elements.to_vec(),
            Expr::Not(expr) => vec![expr.clone()],
            _ => vec![], // Leaf nodes have no children
        }
    }

    fn with_new_children(self: Arc<Self>, children: Vec<Arc<Self>>) -> Arc<Self> {
        match self.as_ref() {
            Expr::And(_) => Arc::new(Expr::And(children)),
            Expr::Or(_) => Arc::new(Expr::Or(children)),
            Expr::Not(_) => {
                assert_eq!(children.len(), 1, "Not operator should have exactly one child");
                match children.into_iter().next() {
                    Some(child) => Arc::new(Expr::Not(child)),
                    None => self,
                }
            }
            _ => self, // No changes needed for leaf nodes
        }
    }
}

impl Expr {

    /// Returns `true` for nodes whose value is known at planning time.
    pub fn is_constant(&self) -> bool {
        matches!(self, Expr::Literal(_))
    }

    pub fn literal(&self) -> Option<&Bson> {
        match self {
            Expr::Literal(BsonValue(value)) => Some(value),
            _ => None,
        }
    }

    /// Returns the variable and path of an attribute access.
    pub fn attribute(&self) -> Option<(&Variable, &[PathComponent])> {
        match self {
            Expr::Attribute { variable, path } => Some((variable, path)),
            _ => None,
        }
    }

    pub fn is_attribute(&self) -> bool {
        matches!(self, Expr::Attribute { .. })
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Expr::Literal(BsonValue(Bson::Boolean(true))))
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Expr::Literal(BsonValue(Bson::Boolean(false))))
    }

    /// Returns `true` if the node is a plain or array comparison.
    pub fn is_comparison(&self) -> bool {
        matches!(self, Expr::Comparison { .. } | Expr::ArrayComparison { .. })
    }

    pub fn negate(&self) -> Arc<Expr> {
        match self {
            Expr::Not(expr) => expr.clone(),
            Expr::And(exprs) => Arc::new(Expr::Or(exprs.iter().map(|e| e.negate()).collect())),
            Expr::Or(exprs) => Arc::new(Expr::And(exprs.iter().map(|e| e.negate()).collect())),
            Expr::Comparison { operator, left, right } => Arc::new(Expr::Comparison {
                operator: operator.negate(),
                left: left.clone(),
                right: right.clone(),
            }),
            Expr::ArrayComparison { operator, quantifier, left, right } => {
                // !(NONE x op v) is ANY x op v, for the other quantifiers the operator flips
                let (operator, quantifier) = match quantifier {
                    Quantifier::All => (operator.negate(), Quantifier::Any),
                    Quantifier::Any => (operator.negate(), Quantifier::All),
                    Quantifier::None => (*operator, Quantifier::Any),
                };
                Arc::new(Expr::ArrayComparison {
                    operator,
                    quantifier,
                    left: left.clone(),
                    right: right.clone(),
                })
            }
            Expr::Literal(BsonValue(Bson::Boolean(b))) => Arc::new(Expr::Literal((!*b).into())),
            _ => Arc::new(Expr::Not(Arc::new(self.clone()))),
        }
    }

    /// Collects every variable referenced by this expression.
    pub fn collect_variables(&self, variables: &mut HashSet<Variable>) {
        match self {
            Expr::Attribute { variable, .. } | Expr::Reference(variable) => {
                variables.insert(variable.clone());
            }
            Expr::Literal(_) => {}
            Expr::Comparison { left, right, .. } | Expr::ArrayComparison { left, right, .. } => {
                left.collect_variables(variables);
                right.collect_variables(variables);
            }
            Expr::And(exprs) | Expr::Or(exprs) | Expr::Function { args: exprs, .. } => {
                exprs.iter().for_each(|e| e.collect_variables(variables));
            }
            Expr::Not(expr) | Expr::NoOptimize(expr) => expr.collect_variables(variables),
        }
    }

    pub fn variables(&self) -> HashSet<Variable> {
        let mut variables = HashSet::new();
        self.collect_variables(&mut variables);
        variables
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Attribute { variable, path } => write!(f, "{}{}", variable, format_path(path)),
            Expr::Reference(variable) => write!(f, "{}", variable),
            Expr::Literal(value) => write!(f, "{}", value.0),
            Expr::Comparison { operator, left, right } => {
                write!(f, "{} {} {}", left, operator, right)
            }
            Expr::ArrayComparison { operator, quantifier, left, right } => {
                write!(f, "{} {} {} {}", left, quantifier, operator, right)
            }
            Expr::And(exprs) => write_junction(f, exprs, " && ", "true"),
            Expr::Or(exprs) => write_junction(f, exprs, " || ", "false"),
            Expr::Not(expr) => write!(f, "!{}", expr),
            Expr::Function { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expr::NoOptimize(expr) => write!(f, "NOOPT({})", expr),
        }
    }
}

fn write_junction(f: &mut fmt::Formatter<'_>, exprs: &[Arc<Expr>], separator: &str, empty: &str) -> fmt::Result {
    if exprs.is_empty() {
        return write!(f, "{}", empty);
    }
    write!(f, "(")?;
    for (i, expr) in exprs.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", separator)?;
        }
        write!(f, "{}", expr)?;
    }
    write!(f, ")")
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Hash, Eq)]
pub struct SortField {
    pub field: Arc<Expr>,
    pub order: SortOrder,
}

impl SortField {
    pub fn new(field: Arc<Expr>, order: SortOrder) -> Self {
        SortField { field, order }
    }
}

#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub enum ComparisonOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
}

impl ComparisonOperator {
    pub fn negate(&self) -> ComparisonOperator {
        match self {
            ComparisonOperator::Eq => ComparisonOperator::Ne,
            ComparisonOperator::Ne => ComparisonOperator::Eq,
            ComparisonOperator::Gt => ComparisonOperator::Lte,
            ComparisonOperator::Gte => ComparisonOperator::Lt,
            ComparisonOperator::Lt => ComparisonOperator::Gte,
            ComparisonOperator::Lte => ComparisonOperator::Gt,
            ComparisonOperator::In => ComparisonOperator::Nin,
            ComparisonOperator::Nin => ComparisonOperator::In,
        }
    }

    /// Returns `true` if `a op b` can be rewritten as `b op' a`.
    pub fn is_reversible(&self) -> bool {
        !matches!(self, ComparisonOperator::In | ComparisonOperator::Nin)
    }

    /// Returns the operator to use once the operands have been swapped.
    ///
    /// # Panics
    /// Panics for `In` and `Nin`, which are not reversible.
    pub fn reverse(&self) -> ComparisonOperator {
        match self {
            ComparisonOperator::Eq => ComparisonOperator::Eq,
            ComparisonOperator::Ne => ComparisonOperator::Ne,
            ComparisonOperator::Gt => ComparisonOperator::Lt,
            ComparisonOperator::Gte => ComparisonOperator::Lte,
            ComparisonOperator::Lt => ComparisonOperator::Gt,
            ComparisonOperator::Lte => ComparisonOperator::Gte,
            ComparisonOperator::In | ComparisonOperator::Nin => {
                panic!("Operator {} cannot be reversed", self)
            }
        }
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            ComparisonOperator::Eq => "==",
            ComparisonOperator::Ne => "!=",
            ComparisonOperator::Gt => ">",
            ComparisonOperator::Gte => ">=",
            ComparisonOperator::Lt => "<",
            ComparisonOperator::Lte => "<=",
            ComparisonOperator::In => "IN",
            ComparisonOperator::Nin => "NOT IN",
        };
        write!(f, "{}", symbol)
    }
}

/// How an array comparison applies to the elements of its left operand.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum Quantifier {
    All,
    Any,
    None,
}

impl fmt::Display for Quantifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantifier::All => write!(f, "ALL"),
            Quantifier::Any => write!(f, "ANY"),
            Quantifier::None => write!(f, "NONE"),
        }
    }
}

/// Represents a component in an attribute path
#[derive(Debug, Clone, Eq, Hash, PartialEq)]
pub enum PathComponent {
    FieldName(String),   // A named field (e.g., "field" in "doc.field")
    ArrayElement(usize), // An array index (e.g., "0" in "doc.array[0]")
    Expansion,           // Traversal of all the array elements (`[*]`)
}

impl PartialOrd for PathComponent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PathComponent {
    fn cmp(&self, other: &Self) -> Ordering {
        use PathComponent::*;
        fn rank(c: &PathComponent) -> u8 {
            match c {
                FieldName(_) => 0,
                ArrayElement(_) => 1,
                Expansion => 2,
            }
        }
        match (self, other) {
            (FieldName(a), FieldName(b)) => a.cmp(b),
            (ArrayElement(a), ArrayElement(b)) => a.cmp(b),
            _ => rank(self).cmp(&rank(other)),
        }
    }
}

impl From<&str> for PathComponent {
    fn from(value: &str) -> Self {
        if value == "[*]" {
            PathComponent::Expansion
        } else {
            PathComponent::FieldName(value.to_string())
        }
    }
}

impl From<usize> for PathComponent {
    fn from(index: usize) -> Self {
        PathComponent::ArrayElement(index)
    }
}

impl fmt::Display for PathComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathComponent::FieldName(name) => write!(f, "{}", name),
            PathComponent::ArrayElement(index) => write!(f, "{}", index),
            PathComponent::Expansion => write!(f, "[*]"),
        }
    }
}

/// Renders a path the way it is written after a variable: `.a[0][*].b`
pub fn format_path(path: &[PathComponent]) -> String {
    let mut s = String::new();
    for component in path {
        match component {
            PathComponent::FieldName(name) => {
                s.push('.');
                s.push_str(name);
            }
            PathComponent::ArrayElement(index) => s.push_str(&format!("[{}]", index)),
            PathComponent::Expansion => s.push_str("[*]"),
        }
    }
    s
}

/// Returns `true` if the path traverses array elements.
pub fn is_expanded(path: &[PathComponent]) -> bool {
    path.iter().any(|c| matches!(c, PathComponent::Expansion))
}

#[derive(Debug, Clone)]
pub struct BsonValue(pub Bson);

impl BsonValue {
    pub fn to_bson(&self) -> Bson {
        self.0.clone()
    }
}

impl PartialEq for BsonValue {
    fn eq(&self, other: &Self) -> bool {
        bson_utils::bson_eq(&self.0, &other.0)
    }
}

impl Eq for BsonValue {}

impl Hash for BsonValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        bson_utils::bson_hash(&self.0, state);
    }
}

impl PartialOrd for BsonValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        bson_utils::try_cmp_bson(&self.0, &other.0)
    }
}

impl From<Bson> for BsonValue {
    fn from(value: Bson) -> Self {
        BsonValue(value)
    }
}

impl From<i32> for BsonValue {
    fn from(value: i32) -> Self {
        BsonValue(Bson::Int32(value))
    }
}

impl From<i64> for BsonValue {
    fn from(value: i64) -> Self {
        BsonValue(Bson::Int64(value))
    }
}

impl From<f64> for BsonValue {
    fn from(value: f64) -> Self {
        BsonValue(Bson::Double(value))
    }
}

impl From<&str> for BsonValue {
    fn from(value: &str) -> Self {
        BsonValue(Bson::String(value.to_string()))
    }
}

impl From<bool> for BsonValue {
    fn from(value: bool) -> Self {
        BsonValue(Bson::Boolean(value))
    }
}

impl<T> From<Vec<T>> for BsonValue
where
    T: Into<Bson>
{
    fn from(values: Vec<T>) -> Self {
        BsonValue(Bson::Array(values.into_iter().map(|v| v.into()).collect()))
    }
}

/// Values of the let-bound variables visible to a condition.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: HashMap<u32, Arc<Expr>>,
}

impl Bindings {
    /// Chains of references longer than this are left unresolved.
    const MAX_DEPTH: usize = 16;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, variable: &Variable, value: Arc<Expr>) {
        self.values.insert(variable.id, value);
    }

    pub fn get(&self, variable: &Variable) -> Option<&Arc<Expr>> {
        self.values.get(&variable.id)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Follows variable references until reaching an expression which is not a bound reference.
    pub fn resolve(&self, expr: &Arc<Expr>) -> Arc<Expr> {
        let mut current = expr.clone();
        for _ in 0..Self::MAX_DEPTH {
            let next = match current.as_ref() {
                Expr::Reference(variable) => match self.get(variable) {
                    Some(value) => value.clone(),
                    None => return current,
                },
                _ => return current,
            };
            current = next;
        }
        current
    }
}
