use std::sync::Arc;
use bson::{doc, Bson, Document};
use crate::error::{Error, Result};
use crate::query::{BsonValue, ComparisonOperator, Expr, PathComponent, Quantifier, Variable};

/// Serializes an expression tree into its structured document form:
///
/// `{ "type": "n-ary and", "subNodes": [ { "type": "compare ==", "subNodes": [...] }, ... ] }`
///
/// When `verbose` is set, every node also carries its canonical rendering under `"rendered"`.
pub fn to_document(expr: &Expr, verbose: bool) -> Document {
    let mut doc = match expr {
        Expr::Attribute { variable, path } => doc! {
            "type": "attribute access",
            "variable": variable_to_document(variable),
            "path": path.iter().map(path_component_to_bson).collect::<Vec<_>>(),
        },
        Expr::Reference(variable) => doc! {
            "type": "reference",
            "variable": variable_to_document(variable),
        },
        Expr::Literal(value) => doc! {
            "type": "value",
            "value": value.to_bson(),
        },
        Expr::Comparison { operator, left, right } => doc! {
            "type": format!("compare {}", operator_name(operator)),
            "subNodes": sub_nodes(&[left.clone(), right.clone()], verbose),
        },
        Expr::ArrayComparison { operator, quantifier, left, right } => doc! {
            "type": format!("array compare {}", operator_name(operator)),
            "quantifier": quantifier_name(quantifier),
            "subNodes": sub_nodes(&[left.clone(), right.clone()], verbose),
        },
        Expr::And(exprs) => doc! {
            "type": "n-ary and",
            "subNodes": sub_nodes(exprs, verbose),
        },
        Expr::Or(exprs) => doc! {
            "type": "n-ary or",
            "subNodes": sub_nodes(exprs, verbose),
        },
        Expr::Not(expr) => doc! {
            "type": "unary not",
            "subNodes": sub_nodes(&[expr.clone()], verbose),
        },
        Expr::Function { name, args } => doc! {
            "type": "function call",
            "name": name.as_str(),
            "subNodes": sub_nodes(args, verbose),
        },
        Expr::NoOptimize(expr) => doc! {
            "type": "no-optimize",
            "subNodes": sub_nodes(&[expr.clone()], verbose),
        },
    };

    if verbose {
        doc.insert("rendered", expr.to_string());
    }
    doc
}

/// Rebuilds an expression tree from the document produced by [`to_document`].
pub fn from_document(doc: &Document) -> Result<Arc<Expr>> {
    let node_type = doc
        .get_str("type")
        .map_err(|_| invalid("Expression node without a 'type' attribute", doc))?;

    let expr = match node_type {
        "attribute access" => {
            let variable = variable_from_document(doc)?;
            let path = match doc.get("path") {
                Some(Bson::Array(components)) => components
                    .iter()
                    .map(path_component_from_bson)
                    .collect::<Result<Vec<_>>>()?,
                _ => return Err(invalid("Attribute access without a 'path' array", doc)),
            };
            Expr::Attribute { variable, path }
        }
        "reference" => Expr::Reference(variable_from_document(doc)?),
        "value" => match doc.get("value") {
            Some(value) => Expr::Literal(BsonValue(value.clone())),
            None => return Err(invalid("Value node without a 'value' attribute", doc)),
        },
        "n-ary and" => Expr::And(parse_sub_nodes(doc)?),
        "n-ary or" => Expr::Or(parse_sub_nodes(doc)?),
        "unary not" => Expr::Not(single_sub_node(doc)?),
        "no-optimize" => Expr::NoOptimize(single_sub_node(doc)?),
        "function call" => {
            let name = doc
                .get_str("name")
                .map_err(|_| invalid("Function call without a 'name' attribute", doc))?;
            Expr::Function {
                name: name.to_string(),
                args: parse_sub_nodes(doc)?,
            }
        }
        other => {
            if let Some(name) = other.strip_prefix("array compare ") {
                let operator = parse_operator(name, doc)?;
                let quantifier = match doc.get_str("quantifier") {
                    Ok("all") => Quantifier::All,
                    Ok("any") => Quantifier::Any,
                    Ok("none") => Quantifier::None,
                    _ => return Err(invalid("Array comparison without a valid 'quantifier'", doc)),
                };
                let (left, right) = binary_sub_nodes(doc)?;
                Expr::ArrayComparison { operator, quantifier, left, right }
            } else if let Some(name) = other.strip_prefix("compare ") {
                let operator = parse_operator(name, doc)?;
                let (left, right) = binary_sub_nodes(doc)?;
                Expr::Comparison { operator, left, right }
            } else {
                return Err(Error::InvalidDocument(format!("Unknown expression node type: {}", other)));
            }
        }
    };
    Ok(Arc::new(expr))
}

fn sub_nodes(exprs: &[Arc<Expr>], verbose: bool) -> Vec<Document> {
    exprs.iter().map(|e| to_document(e, verbose)).collect()
}

fn variable_to_document(variable: &Variable) -> Document {
    doc! { "id": variable.id as i64, "name": variable.name.as_str() }
}

fn path_component_to_bson(component: &PathComponent) -> Bson {
    match component {
        PathComponent::FieldName(name) => Bson::String(name.clone()),
        PathComponent::ArrayElement(index) => Bson::Int64(*index as i64),
        PathComponent::Expansion => Bson::Null,
    }
}

fn operator_name(operator: &ComparisonOperator) -> &'static str {
    match operator {
        ComparisonOperator::Eq => "==",
        ComparisonOperator::Ne => "!=",
        ComparisonOperator::Gt => ">",
        ComparisonOperator::Gte => ">=",
        ComparisonOperator::Lt => "<",
        ComparisonOperator::Lte => "<=",
        ComparisonOperator::In => "in",
        ComparisonOperator::Nin => "not in",
    }
}

fn quantifier_name(quantifier: &Quantifier) -> &'static str {
    match quantifier {
        Quantifier::All => "all",
        Quantifier::Any => "any",
        Quantifier::None => "none",
    }
}

fn parse_operator(name: &str, doc: &Document) -> Result<ComparisonOperator> {
    let operator = match name {
        "==" => ComparisonOperator::Eq,
        "!=" => ComparisonOperator::Ne,
        ">" => ComparisonOperator::Gt,
        ">=" => ComparisonOperator::Gte,
        "<" => ComparisonOperator::Lt,
        "<=" => ComparisonOperator::Lte,
        "in" => ComparisonOperator::In,
        "not in" => ComparisonOperator::Nin,
        _ => return Err(invalid(&format!("Unknown comparison operator '{}'", name), doc)),
    };
    Ok(operator)
}

fn variable_from_document(doc: &Document) -> Result<Variable> {
    let variable = doc
        .get_document("variable")
        .map_err(|_| invalid("Missing 'variable' attribute", doc))?;
    let id = as_index(variable.get("id"))
        .and_then(|id| u32::try_from(id).ok())
        .ok_or_else(|| invalid("Variable without a valid 'id'", doc))?;
    let name = variable
        .get_str("name")
        .map_err(|_| invalid("Variable without a 'name'", doc))?;
    Ok(Variable::new(id, name))
}

fn path_component_from_bson(component: &Bson) -> Result<PathComponent> {
    match component {
        Bson::String(name) => Ok(PathComponent::FieldName(name.clone())),
        Bson::Null => Ok(PathComponent::Expansion),
        other => as_index(Some(other))
            .and_then(|index| usize::try_from(index).ok())
            .map(PathComponent::ArrayElement)
            .ok_or_else(|| Error::InvalidDocument(format!("Invalid path component: {}", other))),
    }
}

fn as_index(value: Option<&Bson>) -> Option<i64> {
    match value? {
        Bson::Int32(i) => Some(*i as i64),
        Bson::Int64(i) => Some(*i),
        _ => None,
    }
}

fn parse_sub_nodes(doc: &Document) -> Result<Vec<Arc<Expr>>> {
    match doc.get("subNodes") {
        Some(Bson::Array(nodes)) => nodes
            .iter()
            .map(|node| match node {
                Bson::Document(node) => from_document(node),
                _ => Err(invalid("Sub-nodes must be documents", doc)),
            })
            .collect(),
        _ => Err(invalid("Missing 'subNodes' array", doc)),
    }
}

fn single_sub_node(doc: &Document) -> Result<Arc<Expr>> {
    let mut nodes = parse_sub_nodes(doc)?;
    if nodes.len() != 1 {
        return Err(invalid("Expected exactly one sub-node", doc));
    }
    Ok(nodes.remove(0))
}

fn binary_sub_nodes(doc: &Document) -> Result<(Arc<Expr>, Arc<Expr>)> {
    let nodes = parse_sub_nodes(doc)?;
    match <[Arc<Expr>; 2]>::try_from(nodes) {
        Ok([left, right]) => Ok((left, right)),
        Err(_) => Err(invalid("Expected exactly two sub-nodes", doc)),
    }
}

fn invalid(reason: &str, doc: &Document) -> Error {
    Error::InvalidDocument(format!("{}: {}", reason, doc))
}
