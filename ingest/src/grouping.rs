//! Deterministic grouping of records for presentation.
//!
//! Grouping is a pure function of the record set and a strategy: no state,
//! no ordering memory (that is the ordering layer's job). Records are first
//! deduplicated by canonical URL, since overlapping time windows or scopes
//! can redeliver the same pull request.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::types::PullRequest;

/// Sentinel author used when a record has no resolvable author.
const UNKNOWN_AUTHOR: &str = "unknown";

/// Conventional-commit types stripped from titles before normalization.
const CONVENTIONAL_TYPES: &[&str] = &[
    "fix", "chore", "feat", "docs", "style", "refactor", "perf", "test", "build", "ci", "revert",
];

/// How records are partitioned into groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingStrategy {
    /// By normalized update title and author: the primary view, collapsing
    /// the many phrasings bots use for the same dependency bump.
    Dependency,
    /// By repository full name.
    Repository,
    /// By author login.
    Author,
}

impl fmt::Display for GroupingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupingStrategy::Dependency => f.write_str("dependency"),
            GroupingStrategy::Repository => f.write_str("repository"),
            GroupingStrategy::Author => f.write_str("author"),
        }
    }
}

impl FromStr for GroupingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dependency" => Ok(GroupingStrategy::Dependency),
            "repository" => Ok(GroupingStrategy::Repository),
            "author" => Ok(GroupingStrategy::Author),
            other => Err(format!("unknown grouping strategy `{other}`")),
        }
    }
}

impl GroupingStrategy {
    fn key_and_label(&self, record: &PullRequest) -> (String, String) {
        match self {
            GroupingStrategy::Dependency => {
                let label = normalize_title(&record.title);
                let author = record.author_login().unwrap_or(UNKNOWN_AUTHOR);
                (format!("{label}|{author}"), label)
            }
            GroupingStrategy::Repository => {
                let name = record.repository.full_name.clone();
                (name.clone(), name)
            }
            GroupingStrategy::Author => {
                let login = record
                    .author_login()
                    .unwrap_or(UNKNOWN_AUTHOR)
                    .to_owned();
                (login.clone(), login)
            }
        }
    }
}

/// One group of records produced by a strategy.
#[derive(Debug, Clone, Serialize)]
pub struct Group {
    /// Stable identity of the group under its strategy.
    pub key: String,
    /// Human-facing label.
    pub label: String,
    /// Normalized base branch of the group's records.
    pub base_ref: String,
    /// Sorted union of member label names.
    pub labels: Vec<String>,
    /// The member records.
    pub records: Vec<PullRequest>,
    /// Member count, always `records.len()`.
    pub count: usize,
}

/// Groups `records` under `strategy`.
///
/// Output is sorted by member count descending, ties broken by label
/// ascending (case-insensitive). Grouping the same record set twice yields
/// identical keys, counts and order.
pub fn group_records(records: &[PullRequest], strategy: GroupingStrategy) -> Vec<Group> {
    let mut seen_urls = HashSet::new();
    let mut insertion_order = Vec::new();
    let mut groups: HashMap<String, Group> = HashMap::new();

    for record in records {
        // Overlapping windows and scopes can deliver the same pull request
        // more than once; the canonical URL identifies it across scopes.
        if !seen_urls.insert(record.url.as_str()) {
            continue;
        }

        let (key, label) = strategy.key_and_label(record);

        let group = groups.entry(key.clone()).or_insert_with(|| {
            insertion_order.push(key.clone());
            Group {
                key,
                label,
                base_ref: normalize_base_ref(&record.base_ref).to_owned(),
                labels: Vec::new(),
                records: Vec::new(),
                count: 0,
            }
        });

        group.records.push(record.clone());
        group.count += 1;
    }

    let mut output: Vec<Group> = insertion_order
        .into_iter()
        .map(|key| groups.remove(&key).expect("group exists for every key"))
        .collect();

    for group in &mut output {
        group.labels = label_union(&group.records);
    }

    output.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| caseless_cmp(&a.label, &b.label))
    });

    output
}

/// Sorted union of member label names.
fn label_union(records: &[PullRequest]) -> Vec<String> {
    let names: BTreeSet<&str> = records
        .iter()
        .flat_map(|record| record.labels.iter())
        .map(|label| label.name.as_str())
        .collect();

    names.into_iter().map(str::to_owned).collect()
}

/// Treats the two conventional default-branch names as equivalent.
pub fn normalize_base_ref(base_ref: &str) -> &str {
    if base_ref == "master" { "main" } else { base_ref }
}

/// Collapses equivalent dependency-update phrasings into one label.
///
/// `Update dependency react to v18`, `chore(deps): update react` and
/// `Bump react from 17 to 18` all normalize to `update react`. Titles that
/// do not look like an update keep their (lowercased) text.
pub fn normalize_title(title: &str) -> String {
    let cleaned = strip_conventional_prefix(title).to_lowercase();

    match extract_package(&cleaned) {
        Some(package) => format!("update {package}"),
        None => cleaned.trim().to_owned(),
    }
}

/// Strips a leading conventional-commit prefix like `chore(deps):`.
fn strip_conventional_prefix(title: &str) -> &str {
    let Some(colon) = title.find(':') else {
        return title;
    };

    let head = title[..colon].trim();
    let type_part = head.split('(').next().unwrap_or(head).trim();

    let known_type = CONVENTIONAL_TYPES
        .iter()
        .any(|candidate| type_part.eq_ignore_ascii_case(candidate));
    let well_formed_scope = !head.contains('(') || head.ends_with(')');

    if known_type && well_formed_scope {
        title[colon + 1..].trim_start()
    } else {
        title
    }
}

/// Extracts the updated package name from a lowercased title.
fn extract_package(cleaned: &str) -> Option<&str> {
    let mut words = cleaned.split_whitespace();

    match words.next()? {
        "update" => match words.next()? {
            // "update dependency react to v18", "update module tailscale.com"
            "dependency" | "module" => words.next(),
            // "update react monorepo", "update actions/checkout action to v4"
            package => Some(package),
        },
        // "bump serde from 1.0.1 to 1.0.2"
        "bump" | "upgrade" => words.next(),
        _ => None,
    }
}

/// Case-insensitive label comparison used for tie-breaking.
fn caseless_cmp(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}
