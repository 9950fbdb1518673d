use std::sync::Arc;
use bson::Bson;
use crate::condition::part::ConditionPart;
use crate::query::{format_path, Bindings, Expr, PathComponent, SortField, Variable};

/// Describes a single index of a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMetadata {
    /// Name of the index (e.g., "by_name").
    name: String,
    /// Indexed attribute paths, in index order.
    fields: Vec<Vec<PathComponent>>,
    /// Sparse indexes do not contain the documents whose indexed field is `null` or missing.
    sparse: bool,
}

impl IndexMetadata {
    pub fn new(name: &str, fields: Vec<Vec<PathComponent>>, sparse: bool) -> Self {
        IndexMetadata {
            name: name.to_string(),
            fields,
            sparse,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[Vec<PathComponent>] {
        &self.fields
    }

    pub fn is_sparse(&self) -> bool {
        self.sparse
    }

    /// Returns the indexed field of a sparse index on a single field.
    pub fn single_sparse_field(&self) -> Option<&[PathComponent]> {
        match self.fields.as_slice() {
            [field] if self.sparse => Some(field),
            _ => None,
        }
    }
}

/// What index selection knows about the collection a condition applies to.
#[derive(Debug, Clone, Default)]
pub struct CollectionStatistics {
    pub document_count: u64,
    pub indexes: Vec<IndexMetadata>,
}

/// Requested output order of the documents of a variable.
#[derive(Debug, Clone)]
pub struct SortCondition {
    pub variable: Variable,
    pub fields: Vec<SortField>,
}

/// Whether indexes can be used to filter and/or to sort.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Usability {
    pub filterable: bool,
    pub sortable: bool,
}

/// Decides which indexes can serve a normalized condition. The root is always an
/// `OR(AND(...))` tree.
pub trait IndexSelector {
    fn usability(
        &self,
        root: &Arc<Expr>,
        statistics: &CollectionStatistics,
        sort: Option<&SortCondition>,
    ) -> Usability;
}

/// Index selection considering an index usable for filtering when every AND clause bounds its
/// first field, and for sorting when the sort fields are a prefix of its fields.
pub struct LeadingFieldSelector {
    variable: Variable,
    bindings: Bindings,
}

impl LeadingFieldSelector {
    pub fn new(variable: Variable, bindings: Bindings) -> Self {
        LeadingFieldSelector { variable, bindings }
    }

    fn can_filter(&self, root: &Arc<Expr>, index: &IndexMetadata) -> bool {
        let (Expr::Or(clauses), Some(field)) = (root.as_ref(), index.fields().first()) else {
            return false;
        };
        !clauses.is_empty() && clauses.iter().all(|clause| self.clause_bounds(clause, field, index.is_sparse()))
    }

    fn clause_bounds(&self, clause: &Arc<Expr>, field: &[PathComponent], sparse: bool) -> bool {
        let Expr::And(members) = clause.as_ref() else {
            return false;
        };
        let parts: Vec<ConditionPart> = members
            .iter()
            .enumerate()
            .filter_map(|(i, m)| ConditionPart::from_leaf(m, Some(&self.variable), &self.bindings, i))
            .filter(|p| p.path.as_slice() == field && p.quantifier.is_none())
            .collect();

        let bounded = parts
            .iter()
            .any(|p| p.lower_bound().is_some() || p.upper_bound().is_some());
        // a sparse index can only serve the clause if null is excluded
        let excludes_null = !sparse || parts.iter().any(|p| !p.accepts(&Bson::Null) && p.is_constant());
        bounded && excludes_null
    }

    fn can_sort(&self, sort: &SortCondition, index: &IndexMetadata) -> bool {
        if sort.variable != self.variable || sort.fields.is_empty() || sort.fields.len() > index.fields().len() {
            return false;
        }
        let order = &sort.fields[0].order;
        sort.fields.iter().zip(index.fields()).all(|(sort_field, index_field)| {
            sort_field.order == *order
                && matches!(
                    self.bindings.resolve(&sort_field.field).attribute(),
                    Some((variable, path)) if *variable == self.variable && path == index_field.as_slice()
                )
        })
    }
}

impl IndexSelector for LeadingFieldSelector {
    fn usability(
        &self,
        root: &Arc<Expr>,
        statistics: &CollectionStatistics,
        sort: Option<&SortCondition>,
    ) -> Usability {
        let mut usability = Usability::default();
        for index in &statistics.indexes {
            let filterable = self.can_filter(root, index);
            usability.filterable |= filterable;
            if let Some(sort) = sort {
                usability.sortable |= self.can_sort(sort, index) && (!index.is_sparse() || filterable);
            }
        }
        usability
    }
}

impl std::fmt::Display for IndexMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fields: Vec<String> = self.fields.iter().map(|p| format_path(p)).collect();
        write!(f, "{} [{}]{}", self.name, fields.join(", "), if self.sparse { " sparse" } else { "" })
    }
}
