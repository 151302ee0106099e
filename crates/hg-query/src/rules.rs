//! Path restrictions carried by edges.
//!
//! A restriction is a `/`-separated glob relative to the vertex the
//! restricted edge points at. `*` matches within one segment, `**` matches
//! any number of segments. While a rule is active, `out()` only follows a
//! label if the path walked since the rule was pushed, extended by that
//! label, matches the glob or can still grow into a match.

use hg_graph::Restriction;

/// Restrictions pushed at a given depth of a traversal path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryRule {
    restrictions: Vec<Restriction>,
    depth: usize,
}

impl QueryRule {
    /// Rule whose paths are relative to traversal depth `depth`.
    pub fn new(restrictions: Vec<Restriction>, depth: usize) -> Self {
        Self {
            restrictions,
            depth,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn restrictions(&self) -> &[Restriction] {
        &self.restrictions
    }

    /// Whether the full label path `labels` may be followed.
    ///
    /// Only the labels past [`depth`](QueryRule::depth) count. A rule
    /// without restrictions admits nothing.
    pub fn allows(&self, labels: &[&str]) -> bool {
        let relative = labels.get(self.depth..).unwrap_or(&[]);
        self.restrictions
            .iter()
            .any(|r| admits(r, relative, true))
    }
}

/// Whether `restriction` admits `path`, or a longer path starting with it
/// when `prefix` is set.
pub fn admits(restriction: &Restriction, path: &[&str], prefix: bool) -> bool {
    let pattern = split(&restriction.rule);
    if !glob(&pattern, path, prefix) {
        return false;
    }
    match &restriction.except {
        Some(except) => !admits(except, path, false),
        None => true,
    }
}

fn split(rule: &str) -> Vec<&str> {
    rule.split('/').filter(|s| !s.is_empty()).collect()
}

fn glob(pattern: &[&str], path: &[&str], prefix: bool) -> bool {
    let Some((segment, rest)) = path.split_first() else {
        return prefix || pattern.iter().all(|p| *p == "**");
    };
    match pattern.split_first() {
        None => false,
        Some((&"**", after)) => glob(after, path, prefix) || glob(pattern, rest, prefix),
        Some((head, after)) => wildcard(head, segment) && glob(after, rest, prefix),
    }
}

/// Single-segment match where `*` stands for any run of characters.
fn wildcard(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, t));
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some((star, mark)) = backtrack {
            p = star + 1;
            t = mark + 1;
            backtrack = Some((star, mark + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rule(glob: &str) -> QueryRule {
        QueryRule::new(vec![Restriction::new(glob)], 0)
    }

    #[test]
    fn wildcards_within_a_segment() {
        assert!(wildcard("*.txt", "notes.txt"));
        assert!(wildcard("a*b*c", "aXXbYc"));
        assert!(!wildcard("*.txt", "notes.md"));
        assert!(wildcard("*", ""));
        assert!(wildcard("exact", "exact"));
    }

    #[test]
    fn prefixes_of_allowed_paths_are_followed() {
        let r = rule("docs/public/*.md");
        assert!(r.allows(&["docs"]));
        assert!(r.allows(&["docs", "public"]));
        assert!(r.allows(&["docs", "public", "a.md"]));
        assert!(!r.allows(&["docs", "private"]));
        assert!(!r.allows(&["docs", "public", "a.md", "deeper"]));
    }

    #[test]
    fn double_star_spans_segments() {
        let r = rule("photos/**/*.jpg");
        assert!(r.allows(&["photos", "2024", "june", "beach.jpg"]));
        assert!(r.allows(&["photos", "x.jpg"]));
        assert!(r.allows(&["photos", "anything"]));
        assert!(!r.allows(&["music"]));
    }

    #[test]
    fn except_removes_full_matches_only() {
        let restriction = Restriction::new("docs/**").except(Restriction::new("docs/secret"));
        let r = QueryRule::new(vec![restriction], 0);
        assert!(r.allows(&["docs", "public"]));
        assert!(!r.allows(&["docs", "secret"]));
        assert!(r.allows(&["docs"]));
    }

    #[test]
    fn depth_makes_paths_relative() {
        let r = QueryRule::new(vec![Restriction::new("b")], 1);
        assert!(r.allows(&["a", "b"]));
        assert!(!r.allows(&["a", "c"]));
    }

    #[test]
    fn empty_rule_admits_nothing() {
        assert!(!QueryRule::new(Vec::new(), 0).allows(&["a"]));
    }

    proptest! {
        #[test]
        fn literal_paths_admit_themselves(path in proptest::collection::vec("[a-z]{1,8}", 1..5)) {
            let labels: Vec<&str> = path.iter().map(String::as_str).collect();
            let restriction = Restriction::new(path.join("/"));
            prop_assert!(admits(&restriction, &labels, false));
            for len in 1..labels.len() {
                prop_assert!(admits(&restriction, &labels[..len], true));
                prop_assert!(!admits(&restriction, &labels[..len], false));
            }
        }

        #[test]
        fn double_star_admits_everything(path in proptest::collection::vec("[a-z.]{0,8}", 0..6)) {
            let labels: Vec<&str> = path.iter().map(String::as_str).collect();
            prop_assert!(admits(&Restriction::new("**"), &labels, false));
        }
    }
}
