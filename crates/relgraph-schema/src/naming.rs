//! Name derivation for tables, columns and relationships.
//!
//! Every function is pure and memoized in a process-wide table guarded by a
//! mutex, so deriving the same name twice costs one map lookup.

use regex::Regex;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

type Memo = OnceLock<Mutex<HashMap<String, String>>>;

fn memoized(memo: &'static Memo, input: &str, derive: impl FnOnce(&str) -> String) -> String {
    let table = memo.get_or_init(|| Mutex::new(HashMap::new()));
    if let Some(hit) = table.lock().expect("lock poisoned").get(input) {
        return hit.clone();
    }
    let derived = derive(input);
    table
        .lock()
        .expect("lock poisoned")
        .insert(input.to_string(), derived.clone());
    derived
}

/// Case-normalize a catalog name: trimmed and lowercased.
pub fn normalize(name: &str) -> String {
    static MEMO: Memo = OnceLock::new();
    memoized(&MEMO, name, |s| s.trim().to_lowercase())
}

/// `account_project` -> `AccountProject`.
pub fn camelize(name: &str) -> String {
    static MEMO: Memo = OnceLock::new();
    memoized(&MEMO, name, |s| {
        s.split(['_', '-', ' '])
            .filter(|part| !part.is_empty())
            .map(|part| {
                let mut chars = part.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect()
    })
}

/// `AccountProject` -> `account_project`, `ownerID` -> `owner_id`.
pub fn underscore(name: &str) -> String {
    static MEMO: Memo = OnceLock::new();
    memoized(&MEMO, name, |s| {
        let mut out = String::with_capacity(s.len() + 4);
        let chars: Vec<char> = s.trim().chars().collect();
        for (i, &c) in chars.iter().enumerate() {
            if c == '-' || c == ' ' {
                out.push('_');
                continue;
            }
            if c.is_uppercase() && i > 0 {
                let prev = chars[i - 1];
                let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
                if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_lower) {
                    out.push('_');
                }
            }
            out.extend(c.to_lowercase());
        }
        out
    })
}

struct Rule {
    pattern: Regex,
    replacement: &'static str,
}

fn plural_rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            (r"(?i)(quiz)$", "${1}zes"),
            (r"(?i)(matr|vert|ind)(ix|ex)$", "${1}ices"),
            (r"(?i)(x|ch|ss|sh|z)$", "${1}es"),
            (r"(?i)([^aeiouy]|qu)y$", "${1}ies"),
            (r"(?i)(hive)$", "${1}s"),
            (r"(?i)([lr])f$", "${1}ves"),
            (r"(?i)([^f])fe$", "${1}ves"),
            (r"(?i)sis$", "ses"),
            (r"(?i)([ti])um$", "${1}a"),
            (r"(?i)(bu|statu|alia)s$", "${1}ses"),
            (r"(?i)(octop|vir)us$", "${1}i"),
            (r"(?i)s$", "s"),
        ]
        .into_iter()
        .filter_map(|(pattern, replacement)| {
            Regex::new(pattern).ok().map(|pattern| Rule {
                pattern,
                replacement,
            })
        })
        .collect()
    })
}

const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("man", "men"),
    ("child", "children"),
    ("sex", "sexes"),
    ("move", "moves"),
];

const UNCOUNTABLE: &[&str] = &[
    "equipment",
    "information",
    "rice",
    "money",
    "species",
    "series",
    "fish",
    "sheep",
    "data",
];

/// English plural of the last word in a snake_case name.
///
/// ```
/// use relgraph_schema::naming::pluralize;
///
/// assert_eq!(pluralize("account"), "accounts");
/// assert_eq!(pluralize("category"), "categories");
/// assert_eq!(pluralize("team_person"), "team_people");
/// ```
pub fn pluralize(name: &str) -> String {
    static MEMO: Memo = OnceLock::new();
    memoized(&MEMO, name, |s| {
        let (head, word) = match s.rfind('_') {
            Some(i) => s.split_at(i + 1),
            None => ("", s),
        };
        let lower = word.to_lowercase();
        if word.is_empty() || UNCOUNTABLE.contains(&lower.as_str()) {
            return s.to_string();
        }
        if let Some((_, plural)) = IRREGULAR.iter().find(|(single, _)| *single == lower) {
            return format!("{head}{plural}");
        }
        for rule in plural_rules() {
            if rule.pattern.is_match(word) {
                return format!("{head}{}", rule.pattern.replace(word, rule.replacement));
            }
        }
        format!("{head}{word}s")
    })
}
