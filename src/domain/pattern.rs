//! Glob matching of service patterns against discovered service names.
//!
//! `*` matches any run of characters (including none), `?` exactly one
//! character, everything else itself. Matching is case-sensitive and no
//! character (`.`, `/`, `[`) is special beyond the two wildcards.

use std::collections::BTreeSet;

pub fn glob_match(pattern: &str, candidate: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let c: Vec<char> = candidate.chars().collect();

    let (mut pi, mut ci) = (0, 0);
    // Position of the last `*` seen, and the candidate index it was tried at
    let mut backtrack: Option<(usize, usize)> = None;

    while ci < c.len() {
        if pi < p.len() && p[pi] == '*' {
            backtrack = Some((pi, ci));
            pi += 1;
        } else if pi < p.len() && (p[pi] == '?' || p[pi] == c[ci]) {
            pi += 1;
            ci += 1;
        } else if let Some((star, tried)) = backtrack {
            // Let the last star swallow one more character
            pi = star + 1;
            ci = tried + 1;
            backtrack = Some((star, tried + 1));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|&ch| ch == '*')
}

/// Every candidate matched by at least one pattern (set union).
pub fn match_all<P: AsRef<str>>(patterns: &[P], candidates: &BTreeSet<String>) -> BTreeSet<String> {
    let mut matched = BTreeSet::new();
    for pattern in patterns {
        matched.extend(
            candidates
                .iter()
                .filter(|name| glob_match(pattern.as_ref(), name))
                .cloned(),
        );
    }
    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn substring_wildcards() {
        assert!(glob_match("*sql*", "mysqld"));
        assert!(glob_match("*sql*", "postgresql"));
        assert!(!glob_match("*sql*", "sshd"));
    }

    #[test]
    fn literal_pattern_matches_only_itself() {
        assert!(glob_match("sshd", "sshd"));
        assert!(!glob_match("sshd", "sshd-keygen"));
        assert!(!glob_match("sshd", "openssh-sshd"));
    }

    #[test]
    fn case_sensitive() {
        assert!(!glob_match("*sql*", "MSSQLSERVER"));
        assert!(glob_match("*SQL*", "MSSQLSERVER"));
    }

    #[test]
    fn question_mark_is_exactly_one_char() {
        assert!(glob_match("tty?", "tty1"));
        assert!(!glob_match("tty?", "tty"));
        assert!(!glob_match("tty?", "tty10"));
    }

    #[test]
    fn dots_slashes_and_brackets_are_literal() {
        assert!(glob_match("a.b", "a.b"));
        assert!(!glob_match("a.b", "axb"));
        assert!(glob_match("*/x", "dir/x"));
        assert!(glob_match("[a]", "[a]"));
        assert!(!glob_match("[a]", "a"));
    }

    #[test]
    fn star_backtracks() {
        assert!(glob_match("*ssh*d", "openssh-sshd"));
        assert!(glob_match("a*b*c", "aXbYbZc"));
        assert!(!glob_match("a*b*c", "aXbYbZ"));
        assert!(glob_match("*", ""));
        assert!(!glob_match("?", ""));
    }

    #[test]
    fn union_has_no_duplicates() {
        let available = set(&["sshd", "sshd-keygen", "mysqld", "cron"]);
        let matched = match_all(&["*ssh*", "sshd", "*sql*"], &available);
        assert_eq!(matched, set(&["mysqld", "sshd", "sshd-keygen"]));
    }

    #[test]
    fn empty_pattern_list_matches_nothing() {
        let available = set(&["sshd"]);
        assert!(match_all::<&str>(&[], &available).is_empty());
    }

    proptest! {
        #[test]
        fn literal_names_match_themselves(name in "[a-zA-Z0-9@._:-]{1,24}") {
            prop_assert!(glob_match(&name, &name));
            let wrapped = format!("*{}*", name);
            prop_assert!(glob_match(&wrapped, &name));
        }

        #[test]
        fn duplicate_patterns_do_not_change_the_match(
            names in prop::collection::btree_set("[a-z]{1,8}", 0..12),
            patterns in prop::collection::vec("[a-z*?]{1,4}", 1..5),
            dup in any::<prop::sample::Index>(),
        ) {
            let mut with_dup = patterns.clone();
            with_dup.push(patterns[dup.index(patterns.len())].clone());
            prop_assert_eq!(match_all(&patterns, &names), match_all(&with_dup, &names));
        }
    }
}
