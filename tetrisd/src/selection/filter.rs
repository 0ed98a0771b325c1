//! Runtime-configurable mapping predicates and orderings.
//!
//! Clients steer selection with two small values keyed by characteristic
//! name: a [`Filter`] ("only mappings with `executionTime<100`") and a
//! [`Comparator`] ("prefer lower `energyConsumption`").  Both arrive as
//! strings over the wire and are held by value inside the client state.

use std::fmt;

use tracing::warn;

use crate::mapping::Mapping;

// ── Filter ────────────────────────────────────────────────────────────────────

/// Comparison operator of a filter predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    Equal,
    NotEqual,
}

impl FilterOp {
    fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            FilterOp::Greater => lhs > rhs,
            FilterOp::GreaterEqual => lhs >= rhs,
            FilterOp::Less => lhs < rhs,
            FilterOp::LessEqual => lhs <= rhs,
            FilterOp::Equal => lhs == rhs,
            FilterOp::NotEqual => lhs != rhs,
        }
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FilterOp::Greater => ">",
            FilterOp::GreaterEqual => ">=",
            FilterOp::Less => "<",
            FilterOp::LessEqual => "<=",
            FilterOp::Equal => "==",
            FilterOp::NotEqual => "!=",
        };
        write!(f, "{s}")
    }
}

/// Predicate over mappings: `characteristic ⊙ literal`, or the trivial
/// always-true predicate.
///
/// A mapping that lacks the characteristic is rejected.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Filter {
    #[default]
    Always,
    Predicate {
        criterion: String,
        op: FilterOp,
        literal: f64,
    },
}

impl Filter {
    /// Parse a filter string like `"executionTime <= 120"`.
    ///
    /// The string is split at the first occurrence of one of `>`, `>=`, `<`,
    /// `<=`, `=`, `==`, `!=`; criterion and literal are whitespace-stripped.
    /// An unparsable string falls back to [`Filter::Always`] (logged).
    pub fn parse(input: &str) -> Filter {
        match Self::try_parse(input) {
            Some(filter) => filter,
            None => {
                warn!(input, "unparsable filter criteria, filtering nothing");
                Filter::Always
            }
        }
    }

    fn try_parse(input: &str) -> Option<Filter> {
        let bytes = input.as_bytes();

        for i in 0..bytes.len() {
            let (op, op_len) = match bytes[i] {
                b'>' if bytes.get(i + 1) == Some(&b'=') => (FilterOp::GreaterEqual, 2),
                b'>' => (FilterOp::Greater, 1),
                b'<' if bytes.get(i + 1) == Some(&b'=') => (FilterOp::LessEqual, 2),
                b'<' => (FilterOp::Less, 1),
                b'=' if bytes.get(i + 1) == Some(&b'=') => (FilterOp::Equal, 2),
                b'=' => (FilterOp::Equal, 1),
                b'!' if bytes.get(i + 1) == Some(&b'=') => (FilterOp::NotEqual, 2),
                _ => continue,
            };

            let criterion = input[..i].trim().to_string();
            let literal: f64 = input[i + op_len..].trim().parse().ok()?;

            return Some(Filter::Predicate {
                criterion,
                op,
                literal,
            });
        }

        None
    }

    /// `true` iff `mapping` passes the predicate.
    pub fn accepts(&self, mapping: &Mapping) -> bool {
        match self {
            Filter::Always => true,
            Filter::Predicate {
                criterion,
                op,
                literal,
            } => match mapping.characteristic(criterion) {
                Some(value) => op.apply(value, *literal),
                None => false,
            },
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Always => write!(f, "none"),
            Filter::Predicate {
                criterion,
                op,
                literal,
            } => write!(f, "{criterion}{op}{literal}"),
        }
    }
}

// ── Comparator ────────────────────────────────────────────────────────────────

/// Total preference order over mappings by one characteristic.
///
/// The default prefers lower values of the empty characteristic, which no
/// mapping carries; under it no mapping beats another and selection keeps the
/// first candidate it sees.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Comparator {
    criterion: String,
    more_is_better: bool,
}

impl Comparator {
    pub fn new(criterion: impl Into<String>, more_is_better: bool) -> Self {
        Comparator {
            criterion: criterion.into(),
            more_is_better,
        }
    }

    pub fn criterion(&self) -> &str {
        &self.criterion
    }

    /// `true` iff `candidate` is strictly better than `incumbent`.  If either
    /// side lacks the characteristic, neither is better.
    pub fn better_than(&self, candidate: &Mapping, incumbent: &Mapping) -> bool {
        let (Some(a), Some(b)) = (
            candidate.characteristic(&self.criterion),
            incumbent.characteristic(&self.criterion),
        ) else {
            return false;
        };

        if self.more_is_better {
            a > b
        } else {
            a < b
        }
    }
}

impl fmt::Display for Comparator {
    /// `"executionTime(<)"` — the criterion and preference direction.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = if self.more_is_better { ">" } else { "<" };
        write!(f, "{}({direction})", self.criterion)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping_with(characteristics: &[(&str, f64)]) -> Mapping {
        Mapping::new(
            "m",
            [("t".to_string(), 0)],
            characteristics
                .iter()
                .map(|&(name, value)| (name.to_string(), value)),
        )
    }

    // ── Filter parsing ────────────────────────────────────────────────────────

    #[test]
    fn parses_every_operator() {
        for (input, op) in [
            ("x>1", FilterOp::Greater),
            ("x>=1", FilterOp::GreaterEqual),
            ("x<1", FilterOp::Less),
            ("x<=1", FilterOp::LessEqual),
            ("x=1", FilterOp::Equal),
            ("x==1", FilterOp::Equal),
            ("x!=1", FilterOp::NotEqual),
        ] {
            match Filter::parse(input) {
                Filter::Predicate { op: parsed, .. } => assert_eq!(parsed, op, "{input}"),
                other => panic!("{input} parsed to {other:?}"),
            }
        }
    }

    #[test]
    fn parsing_strips_whitespace() {
        let filter = Filter::parse("  executionTime  <=  120.5  ");
        assert_eq!(
            filter,
            Filter::Predicate {
                criterion: "executionTime".to_string(),
                op: FilterOp::LessEqual,
                literal: 120.5,
            }
        );
    }

    #[test]
    fn unparsable_input_falls_back_to_always() {
        assert_eq!(Filter::parse("no operator here"), Filter::Always);
        assert_eq!(Filter::parse("x < banana"), Filter::Always);
        assert_eq!(Filter::parse(""), Filter::Always);
    }

    #[test]
    fn splits_at_the_first_operator() {
        // The '<' wins over the later '='.
        let filter = Filter::parse("a<5");
        assert!(matches!(
            filter,
            Filter::Predicate {
                op: FilterOp::Less,
                ..
            }
        ));
    }

    // ── Filter evaluation ─────────────────────────────────────────────────────

    #[test]
    fn predicate_compares_the_characteristic() {
        let filter = Filter::parse("executionTime<100");
        assert!(filter.accepts(&mapping_with(&[("executionTime", 50.0)])));
        assert!(!filter.accepts(&mapping_with(&[("executionTime", 150.0)])));
    }

    #[test]
    fn missing_characteristic_is_rejected() {
        let filter = Filter::parse("energyConsumption<100");
        assert!(!filter.accepts(&mapping_with(&[("executionTime", 50.0)])));
    }

    #[test]
    fn always_accepts_everything() {
        assert!(Filter::Always.accepts(&mapping_with(&[])));
    }

    // ── Comparator ────────────────────────────────────────────────────────────

    #[test]
    fn less_is_better_prefers_smaller_values() {
        let comp = Comparator::new("executionTime", false);
        let fast = mapping_with(&[("executionTime", 50.0)]);
        let slow = mapping_with(&[("executionTime", 100.0)]);

        assert!(comp.better_than(&fast, &slow));
        assert!(!comp.better_than(&slow, &fast));
        assert!(!comp.better_than(&fast, &fast), "strict order: ties are not better");
    }

    #[test]
    fn more_is_better_prefers_larger_values() {
        let comp = Comparator::new("throughput", true);
        let high = mapping_with(&[("throughput", 9.0)]);
        let low = mapping_with(&[("throughput", 3.0)]);

        assert!(comp.better_than(&high, &low));
        assert!(!comp.better_than(&low, &high));
    }

    #[test]
    fn missing_characteristic_makes_neither_better() {
        let comp = Comparator::new("executionTime", false);
        let labelled = mapping_with(&[("executionTime", 50.0)]);
        let unlabelled = mapping_with(&[]);

        assert!(!comp.better_than(&labelled, &unlabelled));
        assert!(!comp.better_than(&unlabelled, &labelled));
    }

    #[test]
    fn default_comparator_never_prefers() {
        let comp = Comparator::default();
        let a = mapping_with(&[("executionTime", 1.0)]);
        let b = mapping_with(&[("executionTime", 2.0)]);
        assert!(!comp.better_than(&a, &b));
        assert!(!comp.better_than(&b, &a));
    }
}
