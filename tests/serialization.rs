use std::sync::Arc;
use bson::{doc, Bson, Document};
use quokkadb_condition::obs::logger::{NoOpLogger, TracingLogger};
use quokkadb_condition::query::expr_fn::*;
use quokkadb_condition::query::{ComparisonOperator, Expr, Quantifier, Variable};
use quokkadb_condition::{Condition, Error, OptimizationMode, OptimizerOptions};

fn doc() -> Variable {
    var(1, "doc")
}

fn field(name: &str) -> Arc<Expr> {
    attr(&doc(), [name])
}

fn normalized(expr: Arc<Expr>, options: &OptimizerOptions) -> Condition {
    let mut condition = Condition::new(NoOpLogger::new());
    condition.and_combine(expr);
    condition.normalize(false, options).unwrap();
    condition
}

#[test]
fn condition_document_layout() {
    let condition = normalized(eq(field("a"), lit(1)), &OptimizerOptions::default());
    let document = condition.to_document(false);

    assert_eq!(document.get_str("type").unwrap(), "n-ary or");
    let clauses = document.get_array("subNodes").unwrap();
    assert_eq!(clauses.len(), 1);

    let Bson::Document(clause) = &clauses[0] else {
        panic!("Expected a document, got {:?}", clauses[0]);
    };
    assert_eq!(clause.get_str("type").unwrap(), "n-ary and");

    let Bson::Document(comparison) = &clause.get_array("subNodes").unwrap()[0] else {
        panic!("Expected a document");
    };
    assert_eq!(comparison.get_str("type").unwrap(), "compare ==");
    assert!(!comparison.contains_key("rendered"));

    let verbose = condition.to_document(true);
    assert_eq!(verbose.get_str("rendered").unwrap(), "((doc.a == 1))");
}

#[test]
fn round_trips() {
    let options = OptimizerOptions::default();
    let conditions = vec![
        normalized(or([and([gt(field("a"), lit(1)), lt(field("b"), lit(2))]), within(field("c"), lit(vec!["x", "y"]))]), &options),
        normalized(array_cmp(ComparisonOperator::Eq, Quantifier::None, attr(&doc(), ["tags", "[*]"]), lit("x")), &options),
        normalized(not(func("LIKE", [field("name"), lit("a%")])), &options),
        normalized(lit(false), &options),
        normalized(lit(true), &options),
        normalized(
            and((0..8).map(|i| or([eq(field("a"), lit(i)), eq(field("b"), lit(i))]))),
            &options.clone().with_max_dnf_conditions(100),
        ),
    ];

    for condition in conditions {
        let restored = Condition::from_document(&condition.to_document(true), TracingLogger::new()).unwrap();
        assert_eq!(restored.state(), condition.state());
        assert!(restored.is_normalized());
    }
}

#[test]
fn not_normalized_documents() {
    let condition = {
        let mut condition = Condition::new(NoOpLogger::new());
        condition.and_combine(and([eq(field("a"), lit(1)), or([eq(field("b"), lit(1)), eq(field("b"), lit(2))])]));
        condition
    };
    let mut restored = Condition::from_document(&condition.to_document(false), NoOpLogger::new()).unwrap();
    assert!(!restored.is_normalized());

    restored.normalize(false, &OptimizerOptions::default()).unwrap();
    assert_eq!(
        restored.root(),
        Some(or([
            and([eq(field("a"), lit(1)), eq(field("b"), lit(1))]),
            and([eq(field("a"), lit(1)), eq(field("b"), lit(2))]),
        ]))
    );
}

#[test]
fn invalid_documents() {
    let invalid: Vec<Document> = vec![
        doc! { "subNodes": [] },
        doc! { "type": "compare ~", "subNodes": [] },
        doc! { "type": "compare ==", "subNodes": [ { "type": "value", "value": 1 } ] },
        doc! { "type": "attribute access", "variable": { "id": 1_i64, "name": "doc" } },
        doc! { "type": "unknown node" },
    ];
    for document in invalid {
        let result = Condition::from_document(&document, NoOpLogger::new());
        assert!(matches!(result, Err(Error::InvalidDocument(_))), "document: {}", document);
    }
}

#[test]
fn options_from_document() {
    let options = OptimizerOptions::from_document(&doc! {
        "optimizationMode": "none",
        "maxDnfConditions": 16_i64,
    })
    .unwrap();
    assert_eq!(options.optimization_mode(), OptimizationMode::None);
    assert_eq!(options.max_dnf_conditions(), 16);

    let mut condition = Condition::new(NoOpLogger::new());
    condition.and_combine(and((0..4).map(|i| or([eq(field("a"), lit(i)), eq(field("b"), lit(i))]))));
    assert!(condition.normalize(false, &options).unwrap_err().is_too_complex());

    let result = OptimizerOptions::from_document(&doc! { "maxDnfConditions": "many" });
    assert!(matches!(result, Err(Error::BsonDeError(_))));
}
