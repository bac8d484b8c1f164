//! Import constraints and the interval algebra behind them.
//!
//! A constraint is either the `==latest` sentinel or an operator applied to a
//! version. Every non-latest constraint maps onto a [`Bound`]; intersecting
//! bounds detects conflicting requirements on a shared dependency.

use std::cmp::Ordering;
use std::fmt;

use crate::error::{ModError, Result};
use crate::version::{compare, parse_version, Version};

/// Constraint operators other than the latest sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// No operator: exactly this version.
    Exact,
    /// `>=`
    Gte,
    /// `>`
    Gt,
    /// `^`: same major.
    Caret,
    /// `~`: same major and minor.
    Tilde,
}

impl Op {
    pub fn symbol(self) -> &'static str {
        match self {
            Op::Exact => "",
            Op::Gte => ">=",
            Op::Gt => ">",
            Op::Caret => "^",
            Op::Tilde => "~",
        }
    }
}

/// A parsed version constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Constraint {
    /// `==latest`: the highest available release.
    #[default]
    Latest,
    /// An operator applied to a version.
    Versioned { op: Op, version: Version },
}

impl Constraint {
    pub fn is_latest(&self) -> bool {
        matches!(self, Constraint::Latest)
    }

    /// The version named by the constraint, if any.
    pub fn version(&self) -> Option<&Version> {
        match self {
            Constraint::Latest => None,
            Constraint::Versioned { version, .. } => Some(version),
        }
    }

    /// Whether the constraint explicitly names a prerelease.
    pub fn names_prerelease(&self) -> bool {
        self.version().is_some_and(Version::is_prerelease)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Latest => f.write_str(LATEST),
            Constraint::Versioned { op, version } => write!(f, "{}{}", op.symbol(), version),
        }
    }
}

impl std::str::FromStr for Constraint {
    type Err = ModError;

    fn from_str(s: &str) -> Result<Self> {
        parse_constraint(s)
    }
}

const LATEST: &str = "==latest";
const LATEST_KEYWORD: &str = "latest";

/// Operator prefixes that are recognizable but deliberately unsupported.
const UNSUPPORTED_OPERATORS: [&str; 6] = ["<=", "<", "==", "!=", "=", "~>"];

/// Parse a constraint such as `^1.2.3`, `>= 1.2.3`, `v1.2.3` or `==latest`.
pub fn parse_constraint(s: &str) -> Result<Constraint> {
    let trimmed = s.trim();
    if trimmed
        .strip_prefix("==")
        .is_some_and(|rest| rest.trim_start() == LATEST_KEYWORD)
    {
        return Ok(Constraint::Latest);
    }

    for operator in UNSUPPORTED_OPERATORS {
        if trimmed.starts_with(operator) {
            return Err(ModError::UnsupportedConstraintOperator {
                constraint: s.to_string(),
                operator: operator.to_string(),
            });
        }
    }

    let (op, rest) = if let Some(rest) = trimmed.strip_prefix(">=") {
        (Op::Gte, rest)
    } else if let Some(rest) = trimmed.strip_prefix('>') {
        (Op::Gt, rest)
    } else if let Some(rest) = trimmed.strip_prefix('^') {
        (Op::Caret, rest)
    } else if let Some(rest) = trimmed.strip_prefix('~') {
        (Op::Tilde, rest)
    } else {
        (Op::Exact, trimmed)
    };

    // Whitespace is only allowed between the operator and the version.
    let version = parse_version(rest.trim_start())
        .map_err(|_| ModError::InvalidConstraint(s.to_string()))?;
    Ok(Constraint::Versioned { op, version })
}

/// An interval of versions. `upper == None` is unbounded above.
///
/// An exclusive upper bound without a prerelease also excludes prereleases of
/// the same numeric triple, so `[1.2.3, 2.0.0)` does not contain
/// `2.0.0-rc.1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bound {
    pub lower: Version,
    pub lower_inclusive: bool,
    pub upper: Option<Version>,
    pub upper_inclusive: bool,
}

impl Bound {
    pub fn contains(&self, v: &Version) -> bool {
        let above_lower = match compare(v, &self.lower) {
            Ordering::Greater => true,
            Ordering::Equal => self.lower_inclusive,
            Ordering::Less => false,
        };
        if !above_lower {
            return false;
        }
        match &self.upper {
            None => true,
            Some(upper) => {
                if !self.upper_inclusive
                    && !upper.is_prerelease()
                    && v.is_prerelease()
                    && v.same_triple(upper)
                {
                    return false;
                }
                match compare(v, upper) {
                    Ordering::Less => true,
                    Ordering::Equal => self.upper_inclusive,
                    Ordering::Greater => false,
                }
            }
        }
    }

    /// Whether no version can fall inside the interval.
    pub fn is_empty(&self) -> bool {
        let Some(upper) = &self.upper else {
            return false;
        };
        match compare(&self.lower, upper) {
            Ordering::Greater => true,
            Ordering::Equal => !(self.lower_inclusive && self.upper_inclusive),
            Ordering::Less => {
                // Only prereleases of the upper triple would remain, and the
                // exclusive upper bound rules those out.
                !self.upper_inclusive
                    && !upper.is_prerelease()
                    && self.lower.is_prerelease()
                    && self.lower.same_triple(upper)
            }
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open = if self.lower_inclusive { '[' } else { '(' };
        match &self.upper {
            None => write!(f, "{open}{}, +inf)", self.lower),
            Some(upper) => {
                let close = if self.upper_inclusive { ']' } else { ')' };
                write!(f, "{open}{}, {upper}{close}", self.lower)
            }
        }
    }
}

/// The interval a constraint accepts. `None` for `==latest`.
pub fn bounds(c: &Constraint) -> Option<Bound> {
    let Constraint::Versioned { op, version } = c else {
        return None;
    };
    let v = version.clone();
    let bound = match op {
        Op::Exact => Bound {
            lower: v.clone(),
            lower_inclusive: true,
            upper: Some(v),
            upper_inclusive: true,
        },
        Op::Gte => Bound {
            lower: v,
            lower_inclusive: true,
            upper: None,
            upper_inclusive: false,
        },
        Op::Gt => Bound {
            lower: v,
            lower_inclusive: false,
            upper: None,
            upper_inclusive: false,
        },
        Op::Caret => Bound {
            upper: v.next_major(),
            lower: v,
            lower_inclusive: true,
            upper_inclusive: false,
        },
        Op::Tilde => Bound {
            upper: v.next_minor().or_else(|| v.next_major()),
            lower: v,
            lower_inclusive: true,
            upper_inclusive: false,
        },
    };
    Some(bound)
}

/// Intersect two intervals. `None` when the result is empty.
pub fn intersect(a: &Bound, b: &Bound) -> Option<Bound> {
    let (lower, lower_inclusive) = match compare(&a.lower, &b.lower) {
        Ordering::Greater => (a.lower.clone(), a.lower_inclusive),
        Ordering::Less => (b.lower.clone(), b.lower_inclusive),
        Ordering::Equal => (a.lower.clone(), a.lower_inclusive && b.lower_inclusive),
    };

    let (upper, upper_inclusive) = match (&a.upper, &b.upper) {
        (None, None) => (None, false),
        (Some(u), None) => (Some(u.clone()), a.upper_inclusive),
        (None, Some(u)) => (Some(u.clone()), b.upper_inclusive),
        (Some(ua), Some(ub)) => match compare(ua, ub) {
            Ordering::Less => (Some(ua.clone()), a.upper_inclusive),
            Ordering::Greater => (Some(ub.clone()), b.upper_inclusive),
            Ordering::Equal => (Some(ua.clone()), a.upper_inclusive && b.upper_inclusive),
        },
    };

    let bound = Bound {
        lower,
        lower_inclusive,
        upper,
        upper_inclusive,
    };
    if bound.is_empty() {
        None
    } else {
        Some(bound)
    }
}

/// Whether `v` satisfies `c`.
pub fn satisfies(v: &Version, c: &Constraint) -> bool {
    let Constraint::Versioned { op, version: base } = c else {
        return true;
    };
    let ord = compare(v, base);
    match op {
        Op::Exact => ord == Ordering::Equal,
        Op::Gte => ord != Ordering::Less,
        Op::Gt => ord == Ordering::Greater,
        Op::Caret => {
            v.major == base.major
                && ord != Ordering::Less
                && below(v, base.next_major())
        }
        Op::Tilde => {
            v.major == base.major
                && v.minor == base.minor
                && ord != Ordering::Less
                && below(v, base.next_minor())
        }
    }
}

/// Strictly below an exclusive upper bound; `None` is unbounded.
fn below(v: &Version, upper: Option<Version>) -> bool {
    upper.map_or(true, |u| compare(v, &u) == Ordering::Less)
}

/// Pick the highest tag that satisfies every constraint.
///
/// Tags that are not versions are ignored. Prereleases are only candidates
/// when one of the constraints names a prerelease. The returned string is the
/// tag as spelled by the source (e.g. with its `v` prefix).
pub fn select_tag<'a, I>(tags: I, constraints: &[Constraint]) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let allow_prerelease = constraints.iter().any(Constraint::names_prerelease);
    tags.into_iter()
        .filter_map(|tag| parse_version(tag).ok().map(|v| (v, tag)))
        .filter(|(v, _)| allow_prerelease || !v.is_prerelease())
        .filter(|(v, _)| constraints.iter().all(|c| satisfies(v, c)))
        .max_by(|(a, _), (b, _)| compare(a, b))
        .map(|(_, tag)| tag.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(s: &str) -> Constraint {
        parse_constraint(s).unwrap()
    }

    fn v(s: &str) -> Version {
        parse_version(s).unwrap()
    }

    #[test]
    fn parse_each_operator() {
        assert_eq!(c("==latest"), Constraint::Latest);
        assert_eq!(
            c("1.2.3"),
            Constraint::Versioned {
                op: Op::Exact,
                version: Version::new(1, 2, 3)
            }
        );
        assert!(matches!(c("v1.2.3"), Constraint::Versioned { op: Op::Exact, .. }));
        assert!(matches!(c(">=1.0.0"), Constraint::Versioned { op: Op::Gte, .. }));
        assert!(matches!(c(">= 1.0.0"), Constraint::Versioned { op: Op::Gte, .. }));
        assert!(matches!(c(">1.0.0"), Constraint::Versioned { op: Op::Gt, .. }));
        assert!(matches!(c("^v1.0.0"), Constraint::Versioned { op: Op::Caret, .. }));
        assert!(matches!(c("~1.4.0"), Constraint::Versioned { op: Op::Tilde, .. }));
    }

    #[test]
    fn unsupported_operators_are_distinct_from_garbage() {
        for s in ["<=1.2.3", "<1.0.0", "=1.0.0", "==1.0.0", "!=1.0.0", "~>1.0.0"] {
            assert!(
                matches!(
                    parse_constraint(s),
                    Err(ModError::UnsupportedConstraintOperator { .. })
                ),
                "{s}"
            );
        }
        for s in ["", "^", "latest", "^1.2", "1.2.3.4", "banana", ">=x.y.z"] {
            assert!(
                matches!(parse_constraint(s), Err(ModError::InvalidConstraint(_))),
                "{s}"
            );
        }
    }

    #[test]
    fn whitespace_only_between_operator_and_version() {
        assert_eq!(c("  ^1.2.3  "), c("^1.2.3"));
        assert_eq!(c(">=   1.2.3"), c(">=1.2.3"));
        assert_eq!(c("== latest"), Constraint::Latest);
        for s in ["1. 2.3", ">= 1 .2.3", "^1.2.3 -rc", "1.2.3 4"] {
            assert!(
                matches!(parse_constraint(s), Err(ModError::InvalidConstraint(_))),
                "{s}"
            );
        }
    }

    #[test]
    fn display_round_trips() {
        for s in ["==latest", "1.2.3", ">=1.0.0", ">2.0.0", "^1.2.3", "~0.4.1-rc.1"] {
            assert_eq!(c(s).to_string(), s);
        }
    }

    #[test]
    fn caret_bounds_and_satisfaction() {
        let caret = c("^1.2.3");
        let b = bounds(&caret).unwrap();
        assert_eq!(b.lower, Version::new(1, 2, 3));
        assert!(b.lower_inclusive);
        assert_eq!(b.upper, Some(Version::new(2, 0, 0)));
        assert!(!b.upper_inclusive);
        assert!(satisfies(&v("1.9.9"), &caret));
        assert!(!satisfies(&v("2.0.0"), &caret));
        assert!(!satisfies(&v("1.2.2"), &caret));
    }

    #[test]
    fn tilde_locks_minor() {
        let tilde = c("~1.4.0");
        assert!(satisfies(&v("1.4.9"), &tilde));
        assert!(!satisfies(&v("1.5.0"), &tilde));
        assert_eq!(bounds(&tilde).unwrap().upper, Some(Version::new(1, 5, 0)));
    }

    #[test]
    fn latest_has_no_bound_and_accepts_everything() {
        assert!(bounds(&Constraint::Latest).is_none());
        assert!(satisfies(&v("0.0.1-pre"), &Constraint::Latest));
    }

    #[test]
    fn bounds_agree_with_satisfies() {
        let constraints = [
            "1.2.3", ">=1.2.3", ">1.2.3", "^1.2.3", "~1.2.3", "^0.1.0", "~2.0.0-rc.1",
            ">=1.0.0-beta",
            "^18446744073709551615.0.0",
            "~1.18446744073709551615.0",
            "~18446744073709551615.18446744073709551615.0",
        ];
        let versions = [
            "0.0.0", "0.1.0", "0.1.5", "1.0.0-alpha", "1.0.0", "1.2.2", "1.2.3-rc.1", "1.2.3",
            "1.2.4", "1.3.0-rc.1", "1.3.0", "1.9.9", "2.0.0-rc.1", "2.0.0-rc.2", "2.0.0",
            "2.0.1", "2.1.0-pre", "10.0.0",
            "1.18446744073709551615.0",
            "1.18446744073709551615.7",
            "18446744073709551615.0.0-rc",
            "18446744073709551615.0.0",
            "18446744073709551615.0.1",
            "18446744073709551615.18446744073709551615.0",
        ];
        for cs in constraints {
            let con = c(cs);
            let b = bounds(&con).unwrap();
            for vs in versions {
                let ver = v(vs);
                assert_eq!(
                    b.contains(&ver),
                    satisfies(&ver, &con),
                    "constraint {cs}, version {vs}, bound {b}"
                );
            }
        }
    }

    #[test]
    fn intersect_is_commutative_and_idempotent() {
        let all: Vec<Bound> = ["1.2.3", ">=1.0.0", ">1.2.3", "^1.2.3", "~1.2.3", "^2.0.0", ">=3.0.0"]
            .iter()
            .map(|s| bounds(&c(s)).unwrap())
            .collect();
        for a in &all {
            assert_eq!(intersect(a, a), Some(a.clone()));
            for b in &all {
                assert_eq!(intersect(a, b), intersect(b, a), "{a} ∩ {b}");
            }
        }
    }

    #[test]
    fn intersect_narrows_and_detects_conflicts() {
        let caret = bounds(&c("^1.2.0")).unwrap();
        let tilde = bounds(&c("~1.4.0")).unwrap();
        let both = intersect(&caret, &tilde).unwrap();
        assert_eq!(both.lower, Version::new(1, 4, 0));
        assert_eq!(both.upper, Some(Version::new(1, 5, 0)));

        let two = bounds(&c("^2.0.0")).unwrap();
        assert!(intersect(&caret, &two).is_none());

        // Touching at an exclusive endpoint is empty.
        let gt = bounds(&c(">1.2.3")).unwrap();
        let exact = bounds(&c("1.2.3")).unwrap();
        assert!(intersect(&gt, &exact).is_none());
    }

    #[test]
    fn intersect_unbounded_uppers() {
        let a = bounds(&c(">=1.0.0")).unwrap();
        let b = bounds(&c(">1.5.0")).unwrap();
        let r = intersect(&a, &b).unwrap();
        assert_eq!(r.lower, Version::new(1, 5, 0));
        assert!(!r.lower_inclusive);
        assert!(r.upper.is_none());
    }

    #[test]
    fn select_highest_matching_tag() {
        let tags = ["v1.0.0", "v1.1.0", "v1.2.0-rc.1", "v2.0.0", "not-a-tag", "release"];
        let pick = |s: &str| select_tag(tags.iter().copied(), &[c(s)]);
        assert_eq!(pick("^v1.0.0").as_deref(), Some("v1.1.0"));
        assert_eq!(pick("~v1.0.0").as_deref(), Some("v1.0.0"));
        assert_eq!(pick("==latest").as_deref(), Some("v2.0.0"));
        assert_eq!(pick("1.1.0").as_deref(), Some("v1.1.0"));
        assert_eq!(pick(">=3.0.0"), None);
    }

    #[test]
    fn prereleases_only_when_requested() {
        let tags = ["1.0.0", "1.1.0-rc.1"];
        assert_eq!(
            select_tag(tags.iter().copied(), &[c(">=1.0.0")]).as_deref(),
            Some("1.0.0")
        );
        assert_eq!(
            select_tag(tags.iter().copied(), &[c(">=1.1.0-rc.0")]).as_deref(),
            Some("1.1.0-rc.1")
        );
        assert_eq!(select_tag(["2.0.0-beta"].iter().copied(), &[Constraint::Latest]), None);
    }

    #[test]
    fn select_with_several_constraints() {
        let tags = ["1.0.0", "1.4.2", "1.5.0", "2.0.0"];
        let cs = [c("^1.0.0"), c("~1.4.0"), Constraint::Latest];
        assert_eq!(select_tag(tags.iter().copied(), &cs).as_deref(), Some("1.4.2"));
    }
}
