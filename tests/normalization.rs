use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use bson::Bson;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use quokkadb_condition::obs::logger::{LogLevel, NoOpLogger, StdoutLogger};
use quokkadb_condition::query::expr_fn::*;
use quokkadb_condition::query::{ComparisonOperator, Expr, PathComponent, Variable};
use quokkadb_condition::util::bson_utils::try_cmp_bson;
use quokkadb_condition::{Condition, Error, OptimizationMode, OptimizerOptions};

const FIELDS: [&str; 3] = ["a", "b", "c"];

fn doc() -> Variable {
    var(1, "doc")
}

fn field(name: &str) -> Arc<Expr> {
    attr(&doc(), [name])
}

fn normalize(expr: Arc<Expr>, options: &OptimizerOptions) -> Condition {
    let mut condition = Condition::new(NoOpLogger::new());
    condition.and_combine(expr);
    condition.normalize(false, options).unwrap();
    condition
}

type Row = HashMap<&'static str, Bson>;

fn value_of(expr: &Expr, row: &Row) -> Bson {
    match expr {
        Expr::Attribute { path, .. } => match path.as_slice() {
            [PathComponent::FieldName(name)] => row.get(name.as_str()).cloned().unwrap_or(Bson::Null),
            _ => Bson::Null,
        },
        Expr::Literal(value) => value.to_bson(),
        other => panic!("Unexpected operand: {}", other),
    }
}

fn compare(operator: ComparisonOperator, left: &Bson, right: &Bson) -> bool {
    let ordering = try_cmp_bson(left, right);
    match operator {
        ComparisonOperator::Eq => ordering == Some(Ordering::Equal),
        ComparisonOperator::Ne => ordering != Some(Ordering::Equal),
        ComparisonOperator::Lt => ordering == Some(Ordering::Less),
        ComparisonOperator::Lte => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        ComparisonOperator::Gt => ordering == Some(Ordering::Greater),
        ComparisonOperator::Gte => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        ComparisonOperator::In | ComparisonOperator::Nin => {
            let found = match right {
                Bson::Array(values) => values.iter().any(|v| try_cmp_bson(left, v) == Some(Ordering::Equal)),
                _ => false,
            };
            found == (operator == ComparisonOperator::In)
        }
    }
}

/// Reference evaluation of a filter over a single document.
fn evaluate(expr: &Expr, row: &Row) -> bool {
    match expr {
        Expr::Literal(value) => matches!(value.to_bson(), Bson::Boolean(true)),
        Expr::Comparison { operator, left, right } => {
            compare(*operator, &value_of(left, row), &value_of(right, row))
        }
        Expr::And(members) => members.iter().all(|m| evaluate(m, row)),
        Expr::Or(members) => members.iter().any(|m| evaluate(m, row)),
        Expr::Not(inner) => !evaluate(inner, row),
        Expr::NoOptimize(inner) => evaluate(inner, row),
        other => panic!("Unexpected node: {}", other),
    }
}

fn evaluate_condition(condition: &Condition, row: &Row) -> bool {
    condition.root().map_or(true, |root| evaluate(&root, row))
}

fn domain() -> Vec<Bson> {
    let mut values = vec![Bson::Null, Bson::Double(1.5)];
    values.extend((0..=5).map(Bson::Int32));
    values
}

fn rows() -> Vec<Row> {
    let domain = domain();
    let mut rows = Vec::new();
    for a in &domain {
        for b in &domain {
            for c in &domain {
                rows.push(HashMap::from([("a", a.clone()), ("b", b.clone()), ("c", c.clone())]));
            }
        }
    }
    rows
}

fn random_constant(rng: &mut StdRng) -> Arc<Expr> {
    if rng.gen_ratio(1, 6) {
        lit(Bson::Null)
    } else {
        lit(rng.gen_range(0..=5_i32))
    }
}

fn random_leaf(rng: &mut StdRng) -> Arc<Expr> {
    if rng.gen_ratio(1, 20) {
        return lit(rng.gen_bool(0.5));
    }
    let attribute = field(FIELDS[rng.gen_range(0..FIELDS.len())]);
    let operators = [
        ComparisonOperator::Eq,
        ComparisonOperator::Ne,
        ComparisonOperator::Lt,
        ComparisonOperator::Lte,
        ComparisonOperator::Gt,
        ComparisonOperator::Gte,
        ComparisonOperator::In,
        ComparisonOperator::Nin,
    ];
    let operator = operators[rng.gen_range(0..operators.len())];

    match operator {
        ComparisonOperator::In | ComparisonOperator::Nin => {
            let size = rng.gen_range(0..=3);
            let values: Vec<i32> = (0..size).map(|_| rng.gen_range(0..=5_i32)).collect();
            cmp(operator, attribute, lit(values))
        }
        _ if rng.gen_ratio(1, 10) => {
            cmp(operator, attribute, field(FIELDS[rng.gen_range(0..FIELDS.len())]))
        }
        _ if rng.gen_ratio(1, 4) => cmp(operator, random_constant(rng), attribute),
        _ => cmp(operator, attribute, random_constant(rng)),
    }
}

fn random_expr(rng: &mut StdRng, depth: usize) -> Arc<Expr> {
    if depth == 0 || rng.gen_ratio(1, 4) {
        return random_leaf(rng);
    }
    match rng.gen_range(0..5) {
        0 | 1 => and((0..rng.gen_range(2..=3)).map(|_| random_expr(rng, depth - 1)).collect::<Vec<_>>()),
        2 | 3 => or((0..rng.gen_range(2..=3)).map(|_| random_expr(rng, depth - 1)).collect::<Vec<_>>()),
        _ => not(random_expr(rng, depth - 1)),
    }
}

fn assert_equivalent(original: &Arc<Expr>, condition: &Condition, rows: &[Row]) {
    for row in rows {
        assert_eq!(
            evaluate(original, row),
            evaluate_condition(condition, row),
            "original: {}, normalized: {:?}, row: {:?}",
            original,
            condition.root().map(|r| r.to_string()),
            row
        );
    }
}

#[test]
fn normalization_preserves_results() {
    let mut rng = StdRng::seed_from_u64(42);
    let rows = rows();
    let modes = [OptimizationMode::Auto, OptimizationMode::None, OptimizationMode::NoNegationPush];

    for _ in 0..300 {
        let expr = random_expr(&mut rng, 3);
        for mode in modes {
            let options = OptimizerOptions::default().with_optimization_mode(mode);
            let condition = normalize(expr.clone(), &options);
            assert_equivalent(&expr, &condition, &rows);
        }
    }
}

#[test]
fn fallback_preserves_results() {
    let mut rng = StdRng::seed_from_u64(7);
    let rows = rows();
    let options = OptimizerOptions::default().with_max_dnf_conditions(4);
    let mut fallbacks = 0;

    for _ in 0..100 {
        let expr = random_expr(&mut rng, 4);
        let condition = normalize(expr.clone(), &options);
        fallbacks += condition.metrics().dnf_fallbacks.get();
        assert_equivalent(&expr, &condition, &rows);
    }
    assert!(fallbacks > 0);
}

#[test]
fn normalization_is_idempotent() {
    let mut rng = StdRng::seed_from_u64(1234);
    let options = OptimizerOptions::default();

    for _ in 0..200 {
        let expr = random_expr(&mut rng, 3);
        let first = normalize(expr, &options);
        let Some(root) = first.root() else {
            continue;
        };
        let second = normalize(root, &options);
        assert_eq!(first.root(), second.root());
        assert_eq!(first.state(), second.state());
    }
}

#[test]
fn in_list_is_sorted_and_deduplicated() {
    let condition = normalize(within(field("x"), lit(vec![3, 1, 2, 1])), &OptimizerOptions::default());
    assert_eq!(condition.root(), Some(or([and([within(field("x"), lit(vec![1, 2, 3]))])])));
}

#[test]
fn redundant_comparisons_are_merged() {
    let options = OptimizerOptions::default();

    let condition = normalize(and([gt(field("x"), lit(5)), gt(field("x"), lit(3))]), &options);
    assert_eq!(condition.root(), Some(or([and([gt(field("x"), lit(5))])])));

    let condition = normalize(and([gte(field("x"), lit(5)), lte(field("x"), lit(5))]), &options);
    assert_eq!(condition.root(), Some(or([and([eq(field("x"), lit(5))])])));
}

#[test]
fn contradictory_branch_is_dropped() {
    let options = OptimizerOptions::default();

    let condition = normalize(
        or([and([eq(field("x"), lit(5)), eq(field("x"), lit(6))]), eq(field("y"), lit(1))]),
        &options,
    );
    assert_eq!(condition.root(), Some(or([and([eq(field("y"), lit(1))])])));

    let condition = normalize(and([eq(field("x"), lit(5)), eq(field("x"), lit(6))]), &options);
    assert!(condition.is_unsatisfiable());
    assert!(!condition.is_empty());

    let condition = Condition::new(NoOpLogger::new());
    assert!(condition.is_empty());
    assert!(!condition.is_unsatisfiable());
}

#[test]
fn explosion_falls_back_in_auto_mode() {
    let expr = and((0..10).map(|i| or([eq(field("x"), lit(i)), eq(field("y"), lit(i))])).collect::<Vec<_>>());
    let options = OptimizerOptions::default().with_max_dnf_conditions(1000);

    let condition = normalize(expr.clone(), &options);
    assert_eq!(condition.root(), Some(or([and([no_optimize(expr.clone())])])));
    assert_eq!(condition.metrics().dnf_fallbacks.get(), 1);
    assert!(condition.is_sorted());
    assert_equivalent(&expr, &condition, &rows_xy());

    for mode in [OptimizationMode::None, OptimizationMode::NoNegationPush] {
        let mut condition = Condition::new(StdoutLogger::new(LogLevel::Warn, false));
        condition.and_combine(expr.clone());
        let result = condition.normalize(false, &options.clone().with_optimization_mode(mode));
        match result {
            Err(Error::TooComplex { conditions, limit }) => {
                assert_eq!(conditions, 1024);
                assert_eq!(limit, 1000);
            }
            other => panic!("Expected a too complex error, got {:?}", other),
        }
    }
}

fn rows_xy() -> Vec<Row> {
    let mut rows = Vec::new();
    for x in 0..=10 {
        for y in 0..=10 {
            rows.push(HashMap::from([("x", Bson::Int32(x)), ("y", Bson::Int32(y))]));
        }
    }
    rows
}

#[test]
fn members_are_ordered_by_priority() {
    let members = vec![
        lte(field("g"), lit(1)),
        lt(field("f"), lit(1)),
        within(field("e"), lit(vec![1, 2])),
        eq(field("d"), lit(1)),
        gte(field("c"), lit(1)),
        gt(field("b"), lit(1)),
        ne(field("a"), lit(1)),
    ];
    let condition = normalize(and(members), &OptimizerOptions::default());

    let root = condition.root().unwrap();
    let Expr::Or(clauses) = root.as_ref() else {
        panic!("Expected an OR, got {}", root);
    };
    let Expr::And(members) = clauses[0].as_ref() else {
        panic!("Expected an AND, got {}", clauses[0]);
    };
    let operators: Vec<ComparisonOperator> = members
        .iter()
        .map(|m| match m.as_ref() {
            Expr::Comparison { operator, .. } => *operator,
            other => panic!("Expected a comparison, got {}", other),
        })
        .collect();
    assert_eq!(
        operators,
        vec![
            ComparisonOperator::Ne,
            ComparisonOperator::Gt,
            ComparisonOperator::Gte,
            ComparisonOperator::Eq,
            ComparisonOperator::In,
            ComparisonOperator::Lt,
            ComparisonOperator::Lte,
        ]
    );
}

#[test]
fn multivalued_attributes_are_not_merged() {
    let options = OptimizerOptions::default();
    let tags = attr(&doc(), ["tags", "[*]"]);

    let mut condition = Condition::new(NoOpLogger::new());
    condition.and_combine(and([eq(tags.clone(), lit(5)), eq(tags.clone(), lit(6))]));
    condition.normalize(true, &options).unwrap();
    assert_eq!(
        condition.root(),
        Some(or([and([eq(tags.clone(), lit(5)), eq(tags.clone(), lit(6))])]))
    );

    let mut condition = Condition::new(NoOpLogger::new());
    condition.and_combine(and([gt(tags.clone(), lit(5)), gt(tags.clone(), lit(3))]));
    condition.normalize(true, &options).unwrap();
    assert_eq!(condition.root(), Some(or([and([gt(tags, lit(5))])])));
}
