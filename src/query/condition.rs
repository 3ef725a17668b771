// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Query model and its JSON form.
//!
//! ```text
//! Query      = [Clause]
//! Clause     = Field(name, Predicate) | And([Query]) | Or([Query])
//! Predicate  = Equals(literal) | Condition | Nested(Query)
//! Condition  = Eq(v) | Not(Predicate) | And([Predicate]) | Or([Predicate]) | Range
//! ```
//!
//! # JSON Form
//!
//! | JSON | Parsed as |
//! |------|-----------|
//! | `{"f": 5}` | `Field(f, Equals(5))` |
//! | `{"f": {"$eq": 5}}` | `Field(f, Condition(Eq(5)))` |
//! | `{"f": {"$not": {"$gt": 3}}}` | `Field(f, Condition(Not(Condition(Range))))` |
//! | `{"f": {"$or": [1, {"$gt": 9}]}}` | predicates on the value at `f` |
//! | `{"f": {"$and": [{"g": 1}]}}` | sub-query against the document at `f` |
//! | `{"$or": [{"a": 1}, {"b": 2}]}` | sub-queries against the whole document |
//!
//! An operator object holds exactly one operator family: `$eq`, `$not`, `$and`,
//! `$or`, or any of the range operators `$gt`/`$gte`/`$lt`/`$lte`. Anything else
//! is a [`DocMeshError::QueryEvaluation`].

use crate::error::{DocMeshError, Result};
use crate::value::Value;
use serde_json::Map;

/// An ordered list of clauses. The empty query matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    clauses: Vec<Clause>,
}

/// One query clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// The value at the field must satisfy the predicate.
    Field(String, Predicate),
    /// Every sub-query must match the whole document.
    And(Vec<Query>),
    /// At least one sub-query must match the whole document.
    Or(Vec<Query>),
}

/// What a field value is tested against.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Structural equality with a literal.
    Equals(Value),
    Condition(Condition),
    /// A sub-query evaluated against the field value as a document.
    Nested(Query),
}

/// Operator applied to the value at a field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Value),
    Not(Box<Predicate>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Range(Range),
}

/// A range bound value, inclusive or not.
#[derive(Debug, Clone, PartialEq)]
pub enum Bound {
    Inclusive(Value),
    Exclusive(Value),
}

impl Bound {
    pub fn value(&self) -> &Value {
        match self {
            Bound::Inclusive(v) | Bound::Exclusive(v) => v,
        }
    }
}

/// Lower and upper bounds on a field value. A range with no bounds passes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Range {
    pub lower: Option<Bound>,
    pub upper: Option<Bound>,
}

impl Range {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gt(mut self, value: impl Into<Value>) -> Self {
        self.lower = Some(Bound::Exclusive(value.into()));
        self
    }

    pub fn gte(mut self, value: impl Into<Value>) -> Self {
        self.lower = Some(Bound::Inclusive(value.into()));
        self
    }

    pub fn lt(mut self, value: impl Into<Value>) -> Self {
        self.upper = Some(Bound::Exclusive(value.into()));
        self
    }

    pub fn lte(mut self, value: impl Into<Value>) -> Self {
        self.upper = Some(Bound::Inclusive(value.into()));
        self
    }

    pub fn is_unbounded(&self) -> bool {
        self.lower.is_none() && self.upper.is_none()
    }
}

impl Condition {
    pub fn eq(value: impl Into<Value>) -> Self {
        Condition::Eq(value.into())
    }

    pub fn not(predicate: impl Into<Predicate>) -> Self {
        Condition::Not(Box::new(predicate.into()))
    }

    pub fn all(predicates: Vec<Predicate>) -> Self {
        Condition::And(predicates)
    }

    pub fn any(predicates: Vec<Predicate>) -> Self {
        Condition::Or(predicates)
    }
}

impl From<Condition> for Predicate {
    fn from(condition: Condition) -> Self {
        Predicate::Condition(condition)
    }
}

impl From<Range> for Predicate {
    fn from(range: Range) -> Self {
        Predicate::Condition(Condition::Range(range))
    }
}

impl From<Query> for Predicate {
    fn from(query: Query) -> Self {
        Predicate::Nested(query)
    }
}

impl From<Value> for Predicate {
    fn from(value: Value) -> Self {
        Predicate::Equals(value)
    }
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field` to equal `value`.
    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.field(field, Predicate::Equals(value.into()))
    }

    /// Require the value at `field` to satisfy `predicate`.
    pub fn field(mut self, field: impl Into<String>, predicate: impl Into<Predicate>) -> Self {
        self.clauses.push(Clause::Field(field.into(), predicate.into()));
        self
    }

    /// Require every sub-query to match the whole document.
    pub fn and(mut self, queries: Vec<Query>) -> Self {
        self.clauses.push(Clause::And(queries));
        self
    }

    /// Require at least one sub-query to match the whole document.
    pub fn or(mut self, queries: Vec<Query>) -> Self {
        self.clauses.push(Clause::Or(queries));
        self
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Parse the JSON query form described in the module docs.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        let map = json
            .as_object()
            .ok_or_else(|| DocMeshError::query(format!("query must be an object, got {}", json)))?;
        parse_query(map)
    }
}

fn parse_query(map: &Map<String, serde_json::Value>) -> Result<Query> {
    let mut query = Query::new();
    for (key, operand) in map {
        let clause = match key.as_str() {
            "$and" => Clause::And(parse_sub_queries(key, operand)?),
            "$or" => Clause::Or(parse_sub_queries(key, operand)?),
            op if op.starts_with('$') => {
                return Err(DocMeshError::query(format!("unknown top-level operator {}", op)));
            }
            field => Clause::Field(field.to_string(), parse_field_predicate(operand)?),
        };
        query.clauses.push(clause);
    }
    Ok(query)
}

fn parse_sub_queries(op: &str, operand: &serde_json::Value) -> Result<Vec<Query>> {
    let items = operand
        .as_array()
        .ok_or_else(|| DocMeshError::query(format!("{} expects an array of queries", op)))?;
    items.iter().map(Query::from_json).collect()
}

/// A field operand: an operator object, or a literal compared for equality.
fn parse_field_predicate(operand: &serde_json::Value) -> Result<Predicate> {
    match operand.as_object() {
        Some(map) if has_operators(map) => Ok(Predicate::Condition(parse_condition(map)?)),
        _ => Ok(Predicate::Equals(Value::from_json(operand))),
    }
}

/// An operand inside `$not`/`$and`/`$or`: a plain object is a sub-query.
fn parse_inner_predicate(operand: &serde_json::Value) -> Result<Predicate> {
    match operand.as_object() {
        Some(map) if has_operators(map) => Ok(Predicate::Condition(parse_condition(map)?)),
        Some(map) => Ok(Predicate::Nested(parse_query(map)?)),
        None => Ok(Predicate::Equals(Value::from_json(operand))),
    }
}

fn has_operators(map: &Map<String, serde_json::Value>) -> bool {
    map.keys().any(|k| k.starts_with('$'))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Eq,
    Not,
    And,
    Or,
    Range,
}

fn family_of(op: &str) -> Option<Family> {
    match op {
        "$eq" => Some(Family::Eq),
        "$not" => Some(Family::Not),
        "$and" => Some(Family::And),
        "$or" => Some(Family::Or),
        "$gt" | "$gte" | "$lt" | "$lte" => Some(Family::Range),
        _ => None,
    }
}

fn parse_condition(map: &Map<String, serde_json::Value>) -> Result<Condition> {
    let mut family = None;
    for op in map.keys() {
        if !op.starts_with('$') {
            return Err(DocMeshError::query(format!(
                "field name {} mixed with operators in one condition",
                op
            )));
        }
        let this = family_of(op).ok_or_else(|| DocMeshError::query(format!("unknown operator {}", op)))?;
        match family {
            None => family = Some(this),
            Some(seen) if seen == this => {}
            Some(_) => {
                return Err(DocMeshError::query(format!(
                    "operator {} cannot be combined with the other operators in this condition",
                    op
                )));
            }
        }
    }

    // has_operators guarantees at least one key
    let family = family.ok_or_else(|| DocMeshError::query("empty condition"))?;

    match family {
        Family::Eq => Ok(Condition::Eq(Value::from_json(operand(map, "$eq")?))),
        Family::Not => Ok(Condition::Not(Box::new(parse_inner_predicate(operand(map, "$not")?)?))),
        Family::And => Ok(Condition::And(parse_predicate_list("$and", operand(map, "$and")?)?)),
        Family::Or => Ok(Condition::Or(parse_predicate_list("$or", operand(map, "$or")?)?)),
        Family::Range => parse_range(map).map(Condition::Range),
    }
}

fn operand<'a>(map: &'a Map<String, serde_json::Value>, op: &str) -> Result<&'a serde_json::Value> {
    map.get(op)
        .ok_or_else(|| DocMeshError::Internal(format!("operator {} missing after classification", op)))
}

fn parse_predicate_list(op: &str, operand: &serde_json::Value) -> Result<Vec<Predicate>> {
    let items = operand
        .as_array()
        .ok_or_else(|| DocMeshError::query(format!("{} expects an array", op)))?;
    items.iter().map(parse_inner_predicate).collect()
}

fn parse_range(map: &Map<String, serde_json::Value>) -> Result<Range> {
    if map.contains_key("$gt") && map.contains_key("$gte") {
        return Err(DocMeshError::query("$gt and $gte are mutually exclusive"));
    }
    if map.contains_key("$lt") && map.contains_key("$lte") {
        return Err(DocMeshError::query("$lt and $lte are mutually exclusive"));
    }

    let mut range = Range::new();
    for (op, operand) in map {
        let value = Value::from_json(operand);
        range = match op.as_str() {
            "$gt" => range.gt(value),
            "$gte" => range.gte(value),
            "$lt" => range.lt(value),
            "$lte" => range.lte(value),
            other => return Err(DocMeshError::query(format!("unknown operator {}", other))),
        };
    }
    Ok(range)
}
