//! Comparison of index values against a binary-expression operand.
//!
//! A [`ComparisonVisitor`] walks one [`SearchValue`] and records one deferred
//! check per comparable projection of that value. [`ComparisonVisitor::compare`]
//! requires every recorded check to pass, while a single check passes when any
//! of its candidates satisfies the operator. Tokens therefore match when their
//! text, system or code matches, and composites require a match from every
//! nested value.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::expression::BinaryOperator;

use super::search_value::{
    CompositeSearchValue, DateTimeSearchValue, NumberSearchValue, QuantitySearchValue,
    ReferenceSearchValue, SearchValue, SearchValueVisitor, StringSearchValue, TokenSearchValue,
    UriSearchValue,
};

/// A literal operand of a binary expression.
///
/// Values of different variants are never ordered against each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Comparable {
    /// Numeric operand.
    Decimal(Decimal),
    /// Instant operand.
    DateTime(DateTime<Utc>),
    /// Textual operand, compared ordinally.
    String(String),
}

impl PartialOrd for Comparable {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Decimal(a), Comparable::Decimal(b)) => Some(a.cmp(b)),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => Some(a.cmp(b)),
            (Comparable::String(a), Comparable::String(b)) => Some(a.as_str().cmp(b.as_str())),
            _ => None,
        }
    }
}

impl Comparable {
    /// Returns true if `self <op> operand` holds.
    pub fn satisfies(&self, operator: BinaryOperator, operand: &Comparable) -> bool {
        self.partial_cmp(operand)
            .is_some_and(|ordering| operator.accepts(ordering))
    }
}

impl fmt::Display for Comparable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparable::Decimal(d) => write!(f, "{}", d),
            Comparable::DateTime(d) => {
                write!(f, "{}", d.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            Comparable::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<Decimal> for Comparable {
    fn from(value: Decimal) -> Self {
        Comparable::Decimal(value)
    }
}

impl From<DateTime<Utc>> for Comparable {
    fn from(value: DateTime<Utc>) -> Self {
        Comparable::DateTime(value)
    }
}

impl From<&str> for Comparable {
    fn from(value: &str) -> Self {
        Comparable::String(value.to_string())
    }
}

impl From<String> for Comparable {
    fn from(value: String) -> Self {
        Comparable::String(value)
    }
}

type Check<'a> = Box<dyn Fn() -> bool + Send + Sync + 'a>;

/// Collects deferred comparisons of a search value against an operand.
pub struct ComparisonVisitor<'a> {
    operator: BinaryOperator,
    operand: &'a Comparable,
    checks: Vec<Check<'a>>,
}

impl<'a> ComparisonVisitor<'a> {
    /// Creates a visitor comparing against `operand` with `operator`.
    pub fn new(operator: BinaryOperator, operand: &'a Comparable) -> Self {
        Self {
            operator,
            operand,
            checks: Vec::new(),
        }
    }

    /// Visits `value` and evaluates the recorded checks.
    pub fn matches(operator: BinaryOperator, operand: &'a Comparable, value: &SearchValue) -> bool {
        let mut visitor = Self::new(operator, operand);
        value.accept(&mut visitor);
        visitor.compare()
    }

    /// Number of checks recorded so far.
    pub fn check_count(&self) -> usize {
        self.checks.len()
    }

    /// Returns true if every recorded check passes.
    pub fn compare(&self) -> bool {
        self.checks.iter().all(|check| check())
    }

    fn add_check(&mut self, candidates: Vec<Option<Comparable>>) {
        let operator = self.operator;
        let operand = self.operand;
        self.checks.push(Box::new(move || {
            candidates
                .iter()
                .flatten()
                .any(|candidate| candidate.satisfies(operator, operand))
        }));
    }
}

impl SearchValueVisitor for ComparisonVisitor<'_> {
    fn visit_composite(&mut self, value: &CompositeSearchValue) {
        for component in &value.components {
            for inner in component {
                inner.accept(self);
            }
        }
    }

    fn visit_date_time(&mut self, value: &DateTimeSearchValue) {
        self.add_check(vec![Some(Comparable::DateTime(value.start))]);
    }

    fn visit_number(&mut self, value: &NumberSearchValue) {
        self.add_check(vec![value.high.map(Comparable::Decimal)]);
    }

    fn visit_quantity(&mut self, value: &QuantitySearchValue) {
        self.add_check(vec![value.high.map(Comparable::Decimal)]);
    }

    fn visit_reference(&mut self, value: &ReferenceSearchValue) {
        self.add_check(vec![Some(Comparable::String(value.resource_id.clone()))]);
    }

    fn visit_string(&mut self, value: &StringSearchValue) {
        self.add_check(vec![Some(Comparable::String(value.text.clone()))]);
    }

    fn visit_token(&mut self, value: &TokenSearchValue) {
        self.add_check(vec![
            value.text.clone().map(Comparable::String),
            value.system.clone().map(Comparable::String),
            value.code.clone().map(Comparable::String),
        ]);
    }

    fn visit_uri(&mut self, value: &UriSearchValue) {
        self.add_check(vec![Some(Comparable::String(value.value.clone()))]);
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn dec(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    #[test]
    fn test_mismatched_operand_types_never_match() {
        let operand = Comparable::from("5");
        let value = SearchValue::number(dec(5));
        for op in BinaryOperator::ALL {
            assert!(!ComparisonVisitor::matches(op, &operand, &value));
        }
    }

    #[test]
    fn test_number_compares_high_bound() {
        let range = SearchValue::number_range(Some(dec(1)), Some(dec(10)));
        assert!(ComparisonVisitor::matches(
            BinaryOperator::Equal,
            &Comparable::from(dec(10)),
            &range
        ));
        assert!(!ComparisonVisitor::matches(
            BinaryOperator::Equal,
            &Comparable::from(dec(1)),
            &range
        ));
        assert!(ComparisonVisitor::matches(
            BinaryOperator::GreaterThan,
            &Comparable::from(dec(9)),
            &range
        ));
    }

    #[test]
    fn test_open_high_bound_fails() {
        let range = SearchValue::number_range(Some(dec(1)), None);
        assert!(!ComparisonVisitor::matches(
            BinaryOperator::GreaterThanOrEqual,
            &Comparable::from(dec(0)),
            &range
        ));
    }

    #[test]
    fn test_date_time_compares_start() {
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2020, 12, 31, 23, 59, 59).unwrap();
        let value = SearchValue::date_time(start, end);
        assert!(ComparisonVisitor::matches(
            BinaryOperator::Equal,
            &Comparable::from(start),
            &value
        ));
        assert!(ComparisonVisitor::matches(
            BinaryOperator::LessThan,
            &Comparable::from(Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap()),
            &value
        ));
    }

    #[test]
    fn test_token_matches_any_part() {
        let token = SearchValue::token(Some("http://loinc.org"), Some("8867-4"), Some("Heart rate"));
        for candidate in ["http://loinc.org", "8867-4", "Heart rate"] {
            assert!(ComparisonVisitor::matches(
                BinaryOperator::Equal,
                &Comparable::from(candidate),
                &token
            ));
        }
        assert!(!ComparisonVisitor::matches(
            BinaryOperator::Equal,
            &Comparable::from("other"),
            &token
        ));
    }

    #[test]
    fn test_token_any_part_holds_for_ordering_operators() {
        // only the text sorts after "n"
        let token = SearchValue::token(Some("alpha"), Some("mike"), Some("zulu"));
        assert!(ComparisonVisitor::matches(
            BinaryOperator::GreaterThan,
            &Comparable::from("n"),
            &token
        ));
        assert!(!ComparisonVisitor::matches(
            BinaryOperator::GreaterThan,
            &Comparable::from("zulu"),
            &token
        ));

        // only the code differs from "x"
        let mostly_x = SearchValue::token(Some("x"), Some("y"), Some("x"));
        assert!(ComparisonVisitor::matches(
            BinaryOperator::NotEqual,
            &Comparable::from("x"),
            &mostly_x
        ));
        let all_x = SearchValue::token(Some("x"), Some("x"), Some("x"));
        assert!(!ComparisonVisitor::matches(
            BinaryOperator::NotEqual,
            &Comparable::from("x"),
            &all_x
        ));
    }

    #[test]
    fn test_token_records_single_check() {
        let token = SearchValue::token(Some("s"), Some("c"), None);
        let operand = Comparable::from("c");
        let mut visitor = ComparisonVisitor::new(BinaryOperator::Equal, &operand);
        token.accept(&mut visitor);
        assert_eq!(visitor.check_count(), 1);
    }

    #[test]
    fn test_composite_requires_every_nested_value() {
        let operand = Comparable::from("a");
        let all_a = SearchValue::composite(vec![
            vec![SearchValue::string("a")],
            vec![SearchValue::token(None, Some("a"), None)],
        ]);
        let mixed = SearchValue::composite(vec![
            vec![SearchValue::string("a")],
            vec![SearchValue::string("b")],
        ]);

        let mut visitor = ComparisonVisitor::new(BinaryOperator::Equal, &operand);
        mixed.accept(&mut visitor);
        assert_eq!(visitor.check_count(), 2);
        assert!(!visitor.compare());

        assert!(ComparisonVisitor::matches(
            BinaryOperator::Equal,
            &operand,
            &all_a
        ));
    }

    #[test]
    fn test_reference_compares_resource_id() {
        let reference = SearchValue::reference("Patient", "123");
        assert!(ComparisonVisitor::matches(
            BinaryOperator::Equal,
            &Comparable::from("123"),
            &reference
        ));
        assert!(ComparisonVisitor::matches(
            BinaryOperator::NotEqual,
            &Comparable::from("Patient"),
            &reference
        ));
    }
}
