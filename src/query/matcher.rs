//! Query evaluation against a single document.
//!
//! Evaluation short-circuits: the first failing clause rejects the document.
//! A missing field never equals anything, and only satisfies a condition whose
//! meaning does not depend on a value (`$not` of something false, an unbounded
//! range, an empty `$and`).

use super::condition::{Bound, Clause, Condition, Predicate, Query, Range};
use super::sort::compare_same_type;
use crate::value::{Document, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// How the present bounds of a range combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeSemantics {
    /// Every present bound must hold.
    #[default]
    Conjunctive,
    /// At least one present bound must hold.
    Lenient,
}

/// Evaluates queries under a fixed [`RangeSemantics`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Matcher {
    range: RangeSemantics,
}

/// Evaluate `query` against `doc` with conjunctive ranges.
pub fn matches(doc: &Document, query: &Query) -> bool {
    Matcher::default().matches(doc, query)
}

impl Matcher {
    pub fn new(range: RangeSemantics) -> Self {
        Self { range }
    }

    pub fn matches(&self, doc: &Document, query: &Query) -> bool {
        query.clauses().iter().all(|clause| self.clause_holds(doc, clause))
    }

    fn clause_holds(&self, doc: &Document, clause: &Clause) -> bool {
        match clause {
            Clause::Field(field, predicate) => self.predicate_holds(doc.get(field), predicate),
            Clause::And(queries) => queries.iter().all(|q| self.matches(doc, q)),
            Clause::Or(queries) => queries.iter().any(|q| self.matches(doc, q)),
        }
    }

    fn predicate_holds(&self, value: Option<&Value>, predicate: &Predicate) -> bool {
        match predicate {
            Predicate::Equals(literal) => value == Some(literal),
            Predicate::Condition(condition) => self.condition_holds(value, condition),
            Predicate::Nested(query) => match value {
                Some(Value::Object(doc)) => self.matches(doc, query),
                _ => self.matches(&Document::new(), query),
            },
        }
    }

    fn condition_holds(&self, value: Option<&Value>, condition: &Condition) -> bool {
        match condition {
            Condition::Eq(literal) => value == Some(literal),
            Condition::Not(inner) => !self.predicate_holds(value, inner),
            Condition::And(predicates) => predicates.iter().all(|p| self.predicate_holds(value, p)),
            Condition::Or(predicates) => predicates.iter().any(|p| self.predicate_holds(value, p)),
            Condition::Range(range) => self.range_holds(value, range),
        }
    }

    fn range_holds(&self, value: Option<&Value>, range: &Range) -> bool {
        if range.is_unbounded() {
            return true;
        }

        let lower = range.lower.as_ref().map(|bound| {
            bound_holds(value, bound, |ord| match bound {
                Bound::Inclusive(_) => ord != Ordering::Less,
                Bound::Exclusive(_) => ord == Ordering::Greater,
            })
        });
        let upper = range.upper.as_ref().map(|bound| {
            bound_holds(value, bound, |ord| match bound {
                Bound::Inclusive(_) => ord != Ordering::Greater,
                Bound::Exclusive(_) => ord == Ordering::Less,
            })
        });

        let mut present = lower.into_iter().chain(upper);
        match self.range {
            RangeSemantics::Conjunctive => present.all(|ok| ok),
            RangeSemantics::Lenient => present.any(|ok| ok),
        }
    }
}

/// Compare `value` to the bound; incomparable values fail the bound.
fn bound_holds(value: Option<&Value>, bound: &Bound, accept: impl Fn(Ordering) -> bool) -> bool {
    value
        .and_then(|v| compare_same_type(v, bound.value()))
        .map(accept)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn q(json: serde_json::Value) -> Query {
        Query::from_json(&json).unwrap()
    }

    fn d(json: serde_json::Value) -> Document {
        Document::from_wire(json).unwrap()
    }

    #[test]
    fn test_empty_query_matches_everything() {
        assert!(matches(&Document::new(), &Query::new()));
        assert!(matches(&d(json!({"a": 1})), &Query::new()));
    }

    #[test]
    fn test_literal_equality() {
        let doc = d(json!({"name": "x", "n": 3, "tags": ["a", "b"]}));
        assert!(matches(&doc, &q(json!({"name": "x"}))));
        assert!(matches(&doc, &q(json!({"n": 3.0}))));
        assert!(matches(&doc, &q(json!({"tags": ["a", "b"]}))));
        assert!(!matches(&doc, &q(json!({"n": "3"}))));
        assert!(!matches(&doc, &q(json!({"name": "x", "n": 4}))));
    }

    #[test]
    fn test_missing_field_never_equals() {
        let doc = d(json!({"a": 1}));
        assert!(!matches(&doc, &q(json!({"b": null}))));
        assert!(!matches(&doc, &q(json!({"b": {"$eq": null}}))));
        assert!(matches(&doc, &q(json!({"b": {"$not": null}}))));
    }

    #[test]
    fn test_not_is_complement() {
        let doc = d(json!({"n": 5}));
        assert!(matches(&doc, &q(json!({"n": {"$not": {"$lt": 3}}}))));
        assert!(!matches(&doc, &q(json!({"n": {"$not": {"$gt": 3}}}))));
        assert!(!matches(&doc, &q(json!({"n": {"$not": 5}}))));
    }

    #[test]
    fn test_field_level_and_or() {
        let doc = d(json!({"n": 5}));
        assert!(matches(&doc, &q(json!({"n": {"$or": [1, 5]}}))));
        assert!(!matches(&doc, &q(json!({"n": {"$or": [1, 2]}}))));
        assert!(matches(&doc, &q(json!({"n": {"$and": [{"$gt": 1}, {"$lt": 9}]}}))));
        assert!(!matches(&doc, &q(json!({"n": {"$and": [{"$gt": 1}, {"$lt": 4}]}}))));
    }

    #[test]
    fn test_sub_query_on_nested_document() {
        let doc = d(json!({"addr": {"city": "Oslo", "zip": 150}}));
        assert!(matches(&doc, &q(json!({"addr": {"$and": [{"city": "Oslo"}, {"zip": {"$gt": 100}}]}}))));
        assert!(!matches(&doc, &q(json!({"addr": {"$or": [{"city": "Rome"}]}}))));
    }

    #[test]
    fn test_sub_query_on_scalar_uses_empty_document() {
        let doc = d(json!({"addr": "nowhere"}));
        assert!(matches(&doc, &q(json!({"addr": {"$and": [{}]}}))));
        assert!(!matches(&doc, &q(json!({"addr": {"$and": [{"city": "Oslo"}]}}))));
    }

    #[test]
    fn test_top_level_and_or() {
        let doc = d(json!({"a": 1, "b": 2}));
        assert!(matches(&doc, &q(json!({"$or": [{"a": 9}, {"b": 2}]}))));
        assert!(!matches(&doc, &q(json!({"$and": [{"a": 1}, {"b": 3}]}))));
        assert!(!matches(&doc, &q(json!({"$or": []}))));
        assert!(matches(&doc, &q(json!({"$and": []}))));
    }

    #[test]
    fn test_range_conjunctive_vs_lenient() {
        let query = q(json!({"f": {"$gte": 2, "$lte": 4}}));
        let conjunctive: Vec<i32> = (1..=5)
            .filter(|n| matches(&Document::new().with("f", *n), &query))
            .collect();
        assert_eq!(conjunctive, vec![2, 3, 4]);

        let lenient = Matcher::new(RangeSemantics::Lenient);
        let lenient: Vec<i32> = (1..=5)
            .filter(|n| lenient.matches(&Document::new().with("f", *n), &query))
            .collect();
        assert_eq!(lenient, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_exclusive_bounds() {
        let query = q(json!({"f": {"$gt": 2, "$lt": 4}}));
        let hits: Vec<i32> = (1..=5)
            .filter(|n| matches(&Document::new().with("f", *n), &query))
            .collect();
        assert_eq!(hits, vec![3]);
    }

    #[test]
    fn test_zero_bound_is_honored() {
        let query = q(json!({"f": {"$gt": 0}}));
        assert!(!matches(&Document::new().with("f", -1), &query));
        assert!(matches(&Document::new().with("f", 1), &query));
    }

    #[test]
    fn test_range_on_strings_and_mixed_types() {
        let query = q(json!({"name": {"$gte": "b"}}));
        assert!(matches(&Document::new().with("name", "bob"), &query));
        assert!(!matches(&Document::new().with("name", "al"), &query));
        assert!(!matches(&Document::new().with("name", 5), &query));
        assert!(!matches(&Document::new(), &query));
    }

    #[test]
    fn test_unbounded_range_passes() {
        let query = Query::new().field("f", Range::new());
        assert!(matches(&Document::new(), &query));
    }

    #[test]
    fn test_range_semantics_serde() {
        let parsed: RangeSemantics = serde_json::from_str("\"lenient\"").unwrap();
        assert_eq!(parsed, RangeSemantics::Lenient);
        assert_eq!(RangeSemantics::default(), RangeSemantics::Conjunctive);
    }
}
