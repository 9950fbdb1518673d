use crate::query::{BsonValue, ComparisonOperator, Expr, PathComponent, Quantifier, SortField, SortOrder, Variable};
use std::sync::Arc;

pub fn var(id: u32, name: &str) -> Variable {
    Variable::new(id, name)
}

pub fn attr<T, U>(variable: &Variable, path: T) -> Arc<Expr>
where
    T: IntoIterator<Item = U>,
    U: Into<PathComponent>,
{
    Arc::new(Expr::Attribute {
        variable: variable.clone(),
        path: path.into_iter().map(|c| c.into()).collect(),
    })
}

pub fn reference(variable: &Variable) -> Arc<Expr> {
    Arc::new(Expr::Reference(variable.clone()))
}

pub fn lit(value: impl Into<BsonValue>) -> Arc<Expr> {
    Arc::new(Expr::Literal(value.into()))
}

pub fn cmp(operator: ComparisonOperator, left: Arc<Expr>, right: Arc<Expr>) -> Arc<Expr> {
    Arc::new(Expr::Comparison { operator, left, right })
}

pub fn eq(left: Arc<Expr>, right: Arc<Expr>) -> Arc<Expr> {
    cmp(ComparisonOperator::Eq, left, right)
}

pub fn ne(left: Arc<Expr>, right: Arc<Expr>) -> Arc<Expr> {
    cmp(ComparisonOperator::Ne, left, right)
}

pub fn gt(left: Arc<Expr>, right: Arc<Expr>) -> Arc<Expr> {
    cmp(ComparisonOperator::Gt, left, right)
}

pub fn gte(left: Arc<Expr>, right: Arc<Expr>) -> Arc<Expr> {
    cmp(ComparisonOperator::Gte, left, right)
}

pub fn lt(left: Arc<Expr>, right: Arc<Expr>) -> Arc<Expr> {
    cmp(ComparisonOperator::Lt, left, right)
}

pub fn lte(left: Arc<Expr>, right: Arc<Expr>) -> Arc<Expr> {
    cmp(ComparisonOperator::Lte, left, right)
}

/// `left IN right`
pub fn within(left: Arc<Expr>, right: Arc<Expr>) -> Arc<Expr> {
    cmp(ComparisonOperator::In, left, right)
}

/// `left NOT IN right`
pub fn nin(left: Arc<Expr>, right: Arc<Expr>) -> Arc<Expr> {
    cmp(ComparisonOperator::Nin, left, right)
}

pub fn array_cmp(
    operator: ComparisonOperator,
    quantifier: Quantifier,
    left: Arc<Expr>,
    right: Arc<Expr>,
) -> Arc<Expr> {
    Arc::new(Expr::ArrayComparison { operator, quantifier, left, right })
}

pub fn and<T>(exprs: T) -> Arc<Expr>
where
    T: IntoIterator<Item = Arc<Expr>>,
{
    Arc::new(Expr::And(exprs.into_iter().collect()))
}

pub fn or<T>(exprs: T) -> Arc<Expr>
where
    T: IntoIterator<Item = Arc<Expr>>,
{
    Arc::new(Expr::Or(exprs.into_iter().collect()))
}

pub fn not(expr: Arc<Expr>) -> Arc<Expr> {
    Arc::new(Expr::Not(expr))
}

pub fn func<T>(name: &str, args: T) -> Arc<Expr>
where
    T: IntoIterator<Item = Arc<Expr>>,
{
    Arc::new(Expr::Function {
        name: name.to_string(),
        args: args.into_iter().collect(),
    })
}

pub fn no_optimize(expr: Arc<Expr>) -> Arc<Expr> {
    Arc::new(Expr::NoOptimize(expr))
}

pub fn sort(field: Arc<Expr>, order: SortOrder) -> SortField {
    SortField::new(field, order)
}
