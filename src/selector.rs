//! Test selection from command-line tokens
//!
//! A token containing `/` is *qualified*: the part before the first `/` must
//! equal a descriptor's group and the rest its name. Any other token is
//! *unqualified* and matches a descriptor whose group or name equals it, so
//! a bare group runs every test in that file.
//!
//! Disabled descriptors never match. Matches come back in registry traversal
//! order (newest registration first), and a token that matches nothing simply
//! selects nothing.

use crate::registry::{TestDescriptor, TestRegistry};

const SEPARATOR: char = '/';

/// A parsed selection token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection<'a> {
    Qualified { group: &'a str, name: &'a str },
    Unqualified(&'a str),
}

impl<'a> Selection<'a> {
    pub fn parse(token: &'a str) -> Self {
        match token.split_once(SEPARATOR) {
            Some((group, name)) => Selection::Qualified { group, name },
            None => Selection::Unqualified(token),
        }
    }

    /// Whether `descriptor` is selected by this token.
    pub fn matches(&self, descriptor: &TestDescriptor) -> bool {
        if !descriptor.enabled() {
            return false;
        }
        match self {
            Selection::Qualified { group, name } => descriptor.group() == *group && descriptor.name() == *name,
            Selection::Unqualified(token) => descriptor.group() == *token || descriptor.name() == *token,
        }
    }
}

/// Every descriptor selected by `token`, in traversal order.
pub fn select<'r>(registry: &'r TestRegistry, token: &str) -> Vec<&'r TestDescriptor> {
    let selection = Selection::parse(token);
    registry.iter().filter(|d| selection.matches(d)).collect()
}

/// `group/name` of every descriptor, oldest registration first.
///
/// This is the mirror of traversal order and includes disabled tests. Tools
/// that drive the harness one test at a time parse this output.
pub fn list(registry: &TestRegistry) -> Vec<String> {
    let mut names: Vec<String> = registry.iter().map(TestDescriptor::qualified_name).collect();
    names.reverse();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() {}

    fn registry() -> TestRegistry {
        let mut registry = TestRegistry::new();
        registry.register(TestDescriptor::new("tests/math.rs", "add", noop));
        registry.register(TestDescriptor::new("tests/math.rs", "sub", noop));
        registry.register(TestDescriptor::new("tests/str.rs", "concat", noop));
        registry.register(TestDescriptor::new("tests/str.rs", "math", noop));
        registry.register(TestDescriptor::new("tests/math.rs", "div", noop).disabled());
        registry
    }

    fn names(selected: &[&TestDescriptor]) -> Vec<String> {
        selected.iter().map(|d| d.qualified_name()).collect()
    }

    #[test]
    fn test_parse_qualified_splits_at_first_separator() {
        assert_eq!(
            Selection::parse("math/add"),
            Selection::Qualified {
                group: "math",
                name: "add"
            }
        );
        assert_eq!(
            Selection::parse("a/b/c"),
            Selection::Qualified { group: "a", name: "b/c" }
        );
        assert_eq!(Selection::parse("math"), Selection::Unqualified("math"));
    }

    #[test]
    fn test_qualified_is_exact() {
        let registry = registry();
        assert_eq!(names(&select(&registry, "math/add")), vec!["math/add"]);
        assert!(select(&registry, "math/concat").is_empty());
    }

    #[test]
    fn test_unqualified_matches_group_or_name() {
        let registry = registry();
        // group `math` plus the test named `math` in group `str`
        assert_eq!(
            names(&select(&registry, "math")),
            vec!["str/math", "math/sub", "math/add"]
        );
        assert_eq!(names(&select(&registry, "concat")), vec!["str/concat"]);
    }

    #[test]
    fn test_disabled_never_selected() {
        let registry = registry();
        assert!(select(&registry, "math/div").is_empty());
        assert!(select(&registry, "div").is_empty());
    }

    #[test]
    fn test_unknown_token_selects_nothing() {
        let registry = registry();
        assert!(select(&registry, "nope").is_empty());
        assert!(select(&registry, "nope/add").is_empty());
        assert!(select(&registry, "").is_empty());
    }

    #[test]
    fn test_duplicate_pairs_all_selected() {
        let mut registry = registry();
        registry.register(TestDescriptor::new("other/math.rs", "add", noop));
        assert_eq!(names(&select(&registry, "math/add")), vec!["math/add", "math/add"]);
    }

    #[test]
    fn test_list_is_registration_order_with_disabled() {
        let registry = registry();
        assert_eq!(
            list(&registry),
            vec!["math/add", "math/sub", "str/concat", "str/math", "math/div"]
        );
    }
}
