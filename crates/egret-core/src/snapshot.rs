// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! ARIA snapshot + ref system. Parses the backend's text-based accessibility
//! tree dump and assigns deterministic refs (`@e1`, `@e2`, ...) to
//! interactive and named content elements. Line-parsing algorithm is a
//! direct port of `original_source/snapshot.py::process_aria_text`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::backend::CursorInteractiveElement;

static INTERACTIVE_ROLES: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        "button", "link", "textbox", "checkbox", "radio", "combobox",
        "listbox", "menuitem", "option", "searchbox", "slider",
        "spinbutton", "switch", "tab", "treeitem", "menuitemcheckbox",
        "menuitemradio",
    ])
});

static CONTENT_ROLES: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        "heading", "cell", "gridcell", "columnheader", "rowheader",
        "listitem", "article", "region", "main", "navigation",
        "complementary", "banner", "contentinfo", "form", "search",
        "feed", "figure", "img", "math", "note", "status", "timer",
        "alert", "log", "marquee", "progressbar", "meter",
    ])
});

static STRUCTURAL_ROLES: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        "generic", "group", "list", "table", "row", "rowgroup",
        "menu", "toolbar", "tablist", "tabpanel", "tree", "treegrid",
        "grid", "presentation", "none", "separator", "dialog",
        "alertdialog", "application", "document", "directory",
        "paragraph",
    ])
});

const SKIP_PREFIXES: &[&str] = &["- /url:", "- /src:", "- /alt:"];

static LINE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(\s*)-\s+(\w+)(?:\s+"((?:[^"\\]|\\.)*)")?((?:\s+\[\w+=\w+\])*)\s*:?\s*$"#,
    )
    .unwrap()
});

static ATTR_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[(\w+)=(\w+)\]").unwrap());

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefEntry {
    pub role: String,
    pub name: Option<String>,
    pub selector: String,
    pub nth: Option<usize>,
}

impl RefEntry {
    /// Stable identity key used for cross-snapshot diffing, independent of
    /// the numeric ref assigned this round.
    pub fn stable_key(&self) -> String {
        match self.nth {
            Some(n) => format!("{}:{}:{}", self.role, self.name.clone().unwrap_or_default(), n),
            None => format!("{}:{}", self.role, self.name.clone().unwrap_or_default()),
        }
    }
}

#[derive(Default)]
struct RoleNameTracker {
    counts: HashMap<String, usize>,
    refs_by_key: HashMap<String, Vec<String>>,
}

impl RoleNameTracker {
    fn key(role: &str, name: Option<&str>) -> String {
        format!("{}:{}", role, name.unwrap_or(""))
    }

    fn next_index(&mut self, role: &str, name: Option<&str>) -> usize {
        let k = Self::key(role, name);
        let idx = *self.counts.get(&k).unwrap_or(&0);
        self.counts.insert(k, idx + 1);
        idx
    }

    fn track(&mut self, role: &str, name: Option<&str>, reference: &str) {
        self.refs_by_key
            .entry(Self::key(role, name))
            .or_default()
            .push(reference.to_string());
    }

    fn duplicate_keys(&self) -> HashSet<String> {
        self.refs_by_key
            .iter()
            .filter(|(_, v)| v.len() > 1)
            .map(|(k, _)| k.clone())
            .collect()
    }
}

fn build_selector(role: &str, name: Option<&str>) -> String {
    match name {
        Some(n) => format!(r#"getByRole("{}", name="{}", exact=True)"#, role, n.replace('"', "\\\"")),
        None => format!(r#"getByRole("{}")"#, role),
    }
}

fn indent_level(line: &str) -> usize {
    let spaces = line.len() - line.trim_start_matches(' ').len();
    spaces / 2
}

fn subtree_has_interactive(lines: &[&str], start: usize, parent_indent: usize) -> bool {
    for line in lines.iter().skip(start + 1) {
        if line.trim().is_empty() {
            continue;
        }
        let indent = indent_level(line);
        if indent <= parent_indent {
            break;
        }
        if let Some(caps) = LINE_PATTERN.captures(line) {
            let role = caps.get(2).unwrap().as_str().to_lowercase();
            let name = caps.get(3).map(|m| m.as_str());
            if INTERACTIVE_ROLES.contains(role.as_str()) {
                return true;
            }
            if CONTENT_ROLES.contains(role.as_str()) && name.is_some() {
                return true;
            }
        }
    }
    false
}

/// Parse a raw accessibility-tree text dump into an annotated tree plus ref
/// map. `next_ref` supplies the next numeric ref id, shared across calls so
/// cursor-interactive refs can continue numbering after ARIA refs.
pub fn process_aria_text(
    raw: &str,
    compact: bool,
    max_depth: usize,
    next_ref: &mut impl FnMut() -> u64,
) -> (String, BTreeMap<String, RefEntry>) {
    let mut refs: BTreeMap<String, RefEntry> = BTreeMap::new();
    let mut tracker = RoleNameTracker::default();
    let mut out_lines: Vec<String> = Vec::new();
    let raw_lines: Vec<&str> = raw.lines().collect();

    for (i, line) in raw_lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let stripped = line.trim();
        if SKIP_PREFIXES.iter().any(|p| stripped.starts_with(*p)) {
            continue;
        }
        if let Some(text_content) = stripped.strip_prefix("- text:") {
            let text_content = text_content.trim().trim_matches('"');
            if !text_content.is_empty() && !compact {
                let indent = "  ".repeat(indent_level(line));
                out_lines.push(format!("{}- text \"{}\"", indent, text_content));
            }
            continue;
        }

        let indent = indent_level(line);
        if indent > max_depth {
            continue;
        }

        let caps = match LINE_PATTERN.captures(line) {
            Some(c) => c,
            None => {
                if !compact && stripped.starts_with("- ") {
                    out_lines.push((*line).to_string());
                }
                continue;
            }
        };

        let role = caps.get(2).unwrap().as_str().to_lowercase();
        let name = caps.get(3).map(|m| m.as_str().to_string());
        let attrs_str = caps.get(4).map(|m| m.as_str()).unwrap_or("");
        let attrs: Vec<(String, String)> = ATTR_PATTERN
            .captures_iter(attrs_str)
            .map(|c| (c[1].to_string(), c[2].to_string()))
            .collect();

        let is_interactive = INTERACTIVE_ROLES.contains(role.as_str());
        let is_content = CONTENT_ROLES.contains(role.as_str());
        let is_structural = STRUCTURAL_ROLES.contains(role.as_str());

        if compact && is_structural && name.is_none() {
            // Nameless structural nodes are flattened regardless of whether
            // their subtree has interactive descendants — those descendants
            // are still emitted as their own lines.
            let _ = subtree_has_interactive(&raw_lines, i, indent);
            continue;
        }

        let should_ref = is_interactive || (is_content && name.is_some());
        let mut parts = vec![format!("{}- {}", "  ".repeat(indent), role)];

        if should_ref {
            let r = next_ref();
            let ref_id = format!("e{}", r);
            let nth = tracker.next_index(&role, name.as_deref());
            tracker.track(&role, name.as_deref(), &ref_id);
            refs.insert(
                format!("@{}", ref_id),
                RefEntry {
                    role: role.clone(),
                    name: name.clone(),
                    selector: build_selector(&role, name.as_deref()),
                    nth: Some(nth),
                },
            );
            if let Some(n) = &name {
                parts.push(format!("\"{}\"", n));
            }
            parts.push(format!("@{}", ref_id));
        } else if let Some(n) = &name {
            parts.push(format!("\"{}\"", n));
        }

        for (attr_name, attr_val) in &attrs {
            parts.push(format!("[{}={}]", attr_name, attr_val));
        }
        out_lines.push(parts.join(" "));
    }

    let dup_keys = tracker.duplicate_keys();
    for entry in refs.values_mut() {
        let k = RoleNameTracker::key(&entry.role, entry.name.as_deref());
        if !dup_keys.contains(&k) {
            entry.nth = None;
        }
    }

    (out_lines.join("\n"), refs)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotResult {
    pub success: bool,
    pub tree: String,
    pub refs: BTreeMap<String, RefEntry>,
    pub url: String,
    pub title: String,
    pub tab_count: usize,
    pub tab_index: usize,
    pub error: Option<String>,
    /// Populated only when this snapshot was diffed against a previous one
    /// for the same session (see [`mark_diff`]); zero on a cold snapshot.
    #[serde(default)]
    pub new_element_count: usize,
    #[serde(default)]
    pub changed_element_count: usize,
    #[serde(default)]
    pub removed_element_count: usize,
}

/// Diff against a previous snapshot by stable `(role,name,nth?)` keys.
/// Returns lines prefixed `*` for refs that are new or whose line text
/// changed, matching spec.md's oversize-truncation-preserving convention.
pub fn diff_against(current: &SnapshotResult, previous: &SnapshotResult) -> Vec<String> {
    let prev_by_key: HashMap<String, &str> = previous
        .refs
        .iter()
        .map(|(id, e)| (e.stable_key(), id.as_str()))
        .collect();

    let mut out = Vec::new();
    for (id, entry) in &current.refs {
        let key = entry.stable_key();
        match prev_by_key.get(&key) {
            None => out.push(format!("* new: {} ({})", id, entry.role)),
            Some(prev_id) if *prev_id != id.as_str() => {
                out.push(format!("* changed: {} (was {})", id, prev_id))
            }
            _ => {}
        }
    }
    let current_keys: HashSet<String> = current.refs.values().map(|e| e.stable_key()).collect();
    for entry in previous.refs.values() {
        if !current_keys.contains(&entry.stable_key()) {
            out.push(format!("* removed: {}", entry.stable_key()));
        }
    }
    out
}

/// Take a full snapshot: parse the backend's raw ARIA dump, then merge in
/// cursor-interactive elements (clickable/focusable nodes lacking ARIA
/// roles), continuing ref numbering from the ARIA pass.
pub fn take_snapshot(
    raw_aria: &str,
    url: &str,
    title: &str,
    tab_count: usize,
    tab_index: usize,
    compact: bool,
    max_depth: usize,
    cursor_interactive: &[CursorInteractiveElement],
) -> SnapshotResult {
    if raw_aria.is_empty() {
        return SnapshotResult {
            success: false,
            tree: String::new(),
            refs: BTreeMap::new(),
            url: url.to_string(),
            title: title.to_string(),
            tab_count,
            tab_index,
            error: Some("Empty ARIA snapshot — page may still be loading.".to_string()),
            new_element_count: 0,
            changed_element_count: 0,
            removed_element_count: 0,
        };
    }

    let mut counter: u64 = 0;
    let (mut tree_text, mut refs) =
        process_aria_text(raw_aria, compact, max_depth, &mut || {
            counter += 1;
            counter
        });

    let existing_names: HashSet<String> = refs
        .values()
        .filter_map(|e| e.name.as_ref())
        .map(|n| n.to_lowercase())
        .collect();

    for el in cursor_interactive {
        if existing_names.contains(&el.text.to_lowercase()) {
            continue;
        }
        counter += 1;
        let ref_id = format!("e{}", counter);
        let role = if el.cursor_pointer { "clickable" } else { "focusable" };
        refs.insert(
            format!("@{}", ref_id),
            RefEntry {
                role: role.to_string(),
                name: Some(el.text.clone()),
                selector: el.selector.clone(),
                nth: None,
            },
        );
        tree_text.push_str(&format!("\n- [cursor-interactive] \"{}\" @{}", el.text, ref_id));
    }

    let header = format!("Page: {} | Title: {}\nTab {} of {}\n\n", url, title, tab_index, tab_count);

    SnapshotResult {
        success: true,
        tree: header + &tree_text,
        refs,
        url: url.to_string(),
        title: title.to_string(),
        tab_count,
        tab_index,
        error: None,
        new_element_count: 0,
        changed_element_count: 0,
        removed_element_count: 0,
    }
}

/// Diff `current` against `previous` (the prior snapshot for this session),
/// filling in the element-count fields and prefixing new/changed lines in
/// `current.tree` with `*`. No-op when `current` has no refs to mark.
pub fn mark_diff(current: &mut SnapshotResult, previous: &SnapshotResult) {
    let prev_by_key: HashMap<String, &str> =
        previous.refs.iter().map(|(id, e)| (e.stable_key(), id.as_str())).collect();

    let mut changed_ids: HashSet<String> = HashSet::new();
    let mut new_count = 0;
    let mut changed_count = 0;
    for (id, entry) in &current.refs {
        let key = entry.stable_key();
        match prev_by_key.get(&key) {
            None => {
                new_count += 1;
                changed_ids.insert(id.clone());
            }
            Some(prev_id) if *prev_id != id.as_str() => {
                changed_count += 1;
                changed_ids.insert(id.clone());
            }
            _ => {}
        }
    }

    let current_keys: HashSet<String> = current.refs.values().map(|e| e.stable_key()).collect();
    let removed_count = previous
        .refs
        .values()
        .filter(|e| !current_keys.contains(&e.stable_key()))
        .count();

    if !changed_ids.is_empty() {
        current.tree = current
            .tree
            .lines()
            .map(|line| {
                let marked = changed_ids.iter().any(|id| line.contains(id.as_str()));
                if marked { format!("*{line}") } else { line.to_string() }
            })
            .collect::<Vec<_>>()
            .join("\n");
    }

    current.new_element_count = new_count;
    current.changed_element_count = changed_count;
    current.removed_element_count = removed_count;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs_counter() -> impl FnMut() -> u64 {
        let mut n = 0u64;
        move || {
            n += 1;
            n
        }
    }

    #[test]
    fn interactive_role_gets_a_ref() {
        let raw = "- button \"Submit\"";
        let (tree, refs) = process_aria_text(raw, true, 10, &mut refs_counter());
        assert_eq!(refs.len(), 1);
        assert!(tree.contains("@e1"));
        assert_eq!(refs["@e1"].role, "button");
        assert_eq!(refs["@e1"].name.as_deref(), Some("Submit"));
    }

    #[test]
    fn nameless_content_role_is_not_referenced() {
        let raw = "- heading";
        let (_tree, refs) = process_aria_text(raw, true, 10, &mut refs_counter());
        assert!(refs.is_empty());
    }

    #[test]
    fn named_content_role_is_referenced() {
        let raw = "- heading \"Welcome\"";
        let (_tree, refs) = process_aria_text(raw, true, 10, &mut refs_counter());
        assert_eq!(refs.len(), 1);
    }

    #[test]
    fn duplicate_role_name_pairs_get_nth_index() {
        let raw = "- link \"Home\"\n- link \"Home\"";
        let (_tree, refs) = process_aria_text(raw, true, 10, &mut refs_counter());
        assert_eq!(refs.len(), 2);
        let mut nths: Vec<_> = refs.values().map(|e| e.nth).collect();
        nths.sort();
        assert_eq!(nths, vec![Some(0), Some(1)]);
    }

    #[test]
    fn unique_role_name_pair_drops_nth() {
        let raw = "- button \"Only one\"";
        let (_tree, refs) = process_aria_text(raw, true, 10, &mut refs_counter());
        assert_eq!(refs["@e1"].nth, None);
    }

    #[test]
    fn compact_mode_flattens_nameless_structural_role() {
        let raw = "- generic\n  - button \"OK\"";
        let (tree, refs) = process_aria_text(raw, true, 10, &mut refs_counter());
        assert!(!tree.contains("- generic"));
        assert_eq!(refs.len(), 1);
    }

    #[test]
    fn url_metadata_lines_are_skipped() {
        let raw = "- link \"Home\"\n  - /url: https://example.com";
        let (tree, _refs) = process_aria_text(raw, true, 10, &mut refs_counter());
        assert!(!tree.contains("/url"));
    }

    #[test]
    fn depth_beyond_max_is_dropped() {
        let raw = "- generic\n  - generic\n    - generic\n      - generic\n        - generic\n          - button \"Deep\"";
        let (_tree, refs) = process_aria_text(raw, true, 2, &mut refs_counter());
        assert!(refs.is_empty());
    }

    #[test]
    fn empty_raw_snapshot_reports_error() {
        let result = take_snapshot("", "https://x.test", "X", 1, 1, true, 10, &[]);
        assert!(!result.success);
        assert!(result.error.is_some());
    }

    #[test]
    fn cursor_interactive_elements_continue_ref_numbering() {
        let raw = "- button \"Submit\"";
        let el = CursorInteractiveElement {
            text: "Custom widget".to_string(),
            selector: "div.widget".to_string(),
            cursor_pointer: true,
        };
        let result = take_snapshot(raw, "https://x.test", "X", 1, 1, true, 10, &[el]);
        assert!(result.refs.contains_key("@e2"));
        assert_eq!(result.refs["@e2"].role, "clickable");
    }

    #[test]
    fn cursor_interactive_skips_names_already_present() {
        let raw = "- button \"Submit\"";
        let el = CursorInteractiveElement {
            text: "Submit".to_string(),
            selector: "div".to_string(),
            cursor_pointer: true,
        };
        let result = take_snapshot(raw, "https://x.test", "X", 1, 1, true, 10, &[el]);
        assert_eq!(result.refs.len(), 1);
    }

    #[test]
    fn mark_diff_counts_new_elements_and_marks_tree() {
        let previous = take_snapshot("- button \"A\"", "https://x.test", "X", 1, 1, true, 10, &[]);
        let mut current = take_snapshot("- button \"A\"\n- link \"B\"", "https://x.test", "X", 1, 1, true, 10, &[]);
        mark_diff(&mut current, &previous);
        assert_eq!(current.new_element_count, 1);
        assert_eq!(current.changed_element_count, 0);
        assert_eq!(current.removed_element_count, 0);
        assert!(current.tree.lines().any(|l| l.starts_with('*') && l.contains("@e2")));
    }

    #[test]
    fn mark_diff_counts_removed_elements() {
        let previous = take_snapshot("- button \"A\"\n- link \"B\"", "https://x.test", "X", 1, 1, true, 10, &[]);
        let mut current = take_snapshot("- button \"A\"", "https://x.test", "X", 1, 1, true, 10, &[]);
        mark_diff(&mut current, &previous);
        assert_eq!(current.removed_element_count, 1);
        assert_eq!(current.new_element_count, 0);
    }

    #[test]
    fn diff_reports_new_and_removed_refs() {
        let prev = take_snapshot("- button \"A\"", "https://x.test", "X", 1, 1, true, 10, &[]);
        let curr = take_snapshot("- button \"B\"", "https://x.test", "X", 1, 1, true, 10, &[]);
        let diffs = diff_against(&curr, &prev);
        assert!(diffs.iter().any(|d| d.contains("new")));
        assert!(diffs.iter().any(|d| d.contains("removed")));
    }
}
