//! Reusable member predicates.

use crate::query::{CompareOp, Predicate};

/// Members with exactly this username.
pub fn username(name: &str) -> Predicate {
    Predicate::compare("username", CompareOp::Eq, name)
}

/// Members whose team has this name; neutral when the name is absent or
/// empty, so it can be chained unconditionally.
pub fn team_name(name: Option<&str>) -> Predicate {
    match name {
        Some(name) if !name.is_empty() => {
            Predicate::join_on("team", "Team", Predicate::equals("name", name))
        }
        _ => Predicate::Always,
    }
}

/// Members at least `age` years old.
pub fn age_at_least(age: i32) -> Predicate {
    Predicate::greater_than_or_equal("age", age)
}

#[cfg(test)]
mod tests {
    use super::{team_name, username};
    use crate::query::Predicate;

    #[test]
    fn absent_team_name_is_neutral() {
        assert!(team_name(None).is_always());
        assert!(team_name(Some("")).is_always());
        assert_eq!(username("m1").and(team_name(None)), username("m1"));
    }

    #[test]
    fn team_name_joins_through_relation() {
        assert!(matches!(team_name(Some("teamA")), Predicate::Join { .. }));
    }
}
