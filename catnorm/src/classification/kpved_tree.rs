//! KPVED classifier tree source
//!
//! Builds a [`CategoryTree`] from flat `(code, name, parent_code)` rows.
//! Codes follow the economic-activity classifier layout: a section letter
//! (`G`), a two-digit class (`46`), then dotted subclasses (`46.9`, `46.90`,
//! `46.90.1`). When a row has no parent code the parent is derived from the
//! code itself; a class takes the most recent section letter in row order.

use crate::classification::CategoryTree;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// One taxonomy row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpvedRow {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub parent_code: Option<String>,
}

impl KpvedRow {
    pub fn new(code: impl Into<String>, name: impl Into<String>, parent_code: Option<&str>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            parent_code: parent_code.map(str::to_string),
        }
    }
}

/// Candidate parent codes for a code, most specific first
///
/// `46.90` → `46.9`, `46`; `46.9` → `46`. Classes (`46`) and sections (`G`)
/// have no parent derivable from the code alone; see [`build_tree`].
pub fn derive_parent_codes(code: &str) -> Vec<String> {
    let Some((head, last)) = code.rsplit_once('.') else {
        return Vec::new();
    };

    let mut candidates = Vec::new();
    if last.chars().count() > 1 {
        let shorter: String = last.chars().take(last.chars().count() - 1).collect();
        candidates.push(format!("{}.{}", head, shorter));
    }
    candidates.push(head.to_string());
    candidates
}

fn is_section_code(code: &str) -> bool {
    code.len() == 1 && code.chars().all(|c| c.is_ascii_uppercase())
}

fn is_class_code(code: &str) -> bool {
    code.len() == 2 && code.chars().all(|c| c.is_ascii_digit())
}

/// Build a category tree from taxonomy rows
///
/// Dotted codes may arrive in any order. A two-digit class without an
/// explicit parent belongs to the last section letter seen before it. Rows
/// whose parent never appears are attached at the top level with a warning.
pub fn build_tree(rows: &[KpvedRow]) -> Result<CategoryTree> {
    let mut seen = HashSet::new();
    for row in rows {
        if row.code.trim().is_empty() {
            return Err(PipelineError::InvalidInput("taxonomy row with empty code".to_string()));
        }
        if !seen.insert(row.code.trim()) {
            return Err(PipelineError::InvalidInput(format!(
                "duplicate taxonomy code '{}'",
                row.code
            )));
        }
    }

    let codes: HashSet<&str> = rows.iter().map(|r| r.code.trim()).collect();
    let mut current_section: Option<&str> = None;
    let mut pending: Vec<(&KpvedRow, Option<String>)> = Vec::with_capacity(rows.len());
    for row in rows {
        let code = row.code.trim();
        if is_section_code(code) {
            current_section = Some(code);
        }

        let explicit = row
            .parent_code
            .as_deref()
            .map(str::trim)
            .filter(|parent| !parent.is_empty())
            .map(str::to_string);
        let parent = explicit.or_else(|| {
            if is_class_code(code) {
                return current_section.map(str::to_string);
            }
            derive_parent_codes(code)
                .into_iter()
                .find(|candidate| codes.contains(candidate.as_str()))
        });
        pending.push((row, parent));
    }

    let mut tree = CategoryTree::new();

    // Insert parents before children without requiring sorted input
    loop {
        let before = pending.len();
        let mut remaining = Vec::new();
        for (row, parent) in pending {
            let ready = match &parent {
                None => true,
                Some(p) => tree.code_exists(p),
            };
            if ready {
                tree.add_node(row.code.trim(), row.name.trim(), parent.as_deref())?;
            } else {
                remaining.push((row, parent));
            }
        }
        pending = remaining;
        if pending.is_empty() || pending.len() == before {
            break;
        }
    }

    for (row, parent) in pending {
        warn!(
            code = %row.code,
            parent = ?parent,
            "Parent code not found, attaching at top level"
        );
        tree.add_node(row.code.trim(), row.name.trim(), None)?;
    }

    debug!(nodes = tree.len(), "Built classifier tree");
    Ok(tree)
}

/// Parse tab-separated rows: `code<TAB>name[<TAB>parent_code]`
///
/// Blank lines and lines starting with `#` are skipped.
pub fn parse_tsv(text: &str) -> Result<Vec<KpvedRow>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty() && !line.trim_start().starts_with('#'))
        .map(|(number, line)| {
            let mut fields = line.split('\t');
            let code = fields.next().unwrap_or_default().trim();
            let name = fields.next().map(str::trim).unwrap_or_default();
            let parent = fields.next().map(str::trim).filter(|p| !p.is_empty());
            if code.is_empty() || name.is_empty() {
                return Err(PipelineError::InvalidInput(format!(
                    "line {}: expected code and name",
                    number + 1
                )));
            }
            Ok(KpvedRow::new(code, name, parent))
        })
        .collect()
}

/// Load a tree from JSON (array of rows) or TSV text
pub fn load_tree(text: &str) -> Result<CategoryTree> {
    let rows = if text.trim_start().starts_with('[') {
        serde_json::from_str::<Vec<KpvedRow>>(text)
            .map_err(|e| PipelineError::InvalidInput(format!("invalid taxonomy JSON: {}", e)))?
    } else {
        parse_tsv(text)?
    };
    build_tree(&rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_parent_codes() {
        assert_eq!(derive_parent_codes("46.90"), vec!["46.9", "46"]);
        assert_eq!(derive_parent_codes("46.9"), vec!["46"]);
        assert_eq!(derive_parent_codes("46.90.10"), vec!["46.90.1", "46.90"]);
        assert!(derive_parent_codes("G").is_empty());
    }

    #[test]
    fn test_class_takes_preceding_section() {
        // Given: a TSV file without parent columns
        let tsv = "G\tТорговля\n46\tОптовая торговля\n46.90\tНеспециализированная\nH\tТранспорт\n49\tСухопутный транспорт\n";

        // When: the tree is loaded
        let tree = load_tree(tsv).unwrap();

        // Then: each class hangs under the section listed before it
        assert_eq!(tree.get("46").unwrap().parent_id.as_deref(), Some("G"));
        assert_eq!(tree.get("49").unwrap().parent_id.as_deref(), Some("H"));
        assert_eq!(
            tree.path_labels("46.90").unwrap(),
            vec!["Торговля", "Оптовая торговля", "Неспециализированная"]
        );
        assert_eq!(tree.get("46.90").unwrap().level, 3);
    }

    #[test]
    fn test_class_before_any_section_is_root() {
        let rows = vec![
            KpvedRow::new("46", "Оптовая торговля", None),
            KpvedRow::new("G", "Торговля", None),
        ];
        let tree = build_tree(&rows).unwrap();
        assert!(tree.get("46").unwrap().parent_id.is_none());
    }

    #[test]
    fn test_build_from_unsorted_rows() {
        let rows = vec![
            KpvedRow::new("46.90", "Неспециализированная оптовая торговля", None),
            KpvedRow::new("46", "Оптовая торговля", Some("G")),
            KpvedRow::new("G", "Торговля", None),
            KpvedRow::new("46.9", "Прочая оптовая торговля", None),
        ];
        let tree = build_tree(&rows).unwrap();

        assert_eq!(tree.len(), 4);
        assert_eq!(tree.get("46.90").unwrap().parent_id.as_deref(), Some("46.9"));
        assert_eq!(tree.get("46.9").unwrap().parent_id.as_deref(), Some("46"));
        assert_eq!(tree.get("46.90").unwrap().level, 4);
    }

    #[test]
    fn test_skips_missing_intermediate_level() {
        let rows = vec![
            KpvedRow::new("46", "Оптовая торговля", None),
            KpvedRow::new("46.90", "Неспециализированная", None),
        ];
        let tree = build_tree(&rows).unwrap();
        assert_eq!(tree.get("46.90").unwrap().parent_id.as_deref(), Some("46"));
    }

    #[test]
    fn test_orphan_attached_at_top_level() {
        let rows = vec![KpvedRow::new("47.11", "Розница", Some("47.1"))];
        let tree = build_tree(&rows).unwrap();
        assert_eq!(tree.get("47.11").unwrap().level, 1);
    }

    #[test]
    fn test_duplicate_codes_rejected() {
        let rows = vec![KpvedRow::new("46", "a", None), KpvedRow::new("46", "b", None)];
        assert!(build_tree(&rows).is_err());
    }

    #[test]
    fn test_load_tsv_and_json() {
        let tsv = "# code\tname\tparent\nG\tТорговля\n46\tОптовая торговля\tG\n46.90\tНеспециализированная\n";
        let tree = load_tree(tsv).unwrap();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.get("46.90").unwrap().parent_id.as_deref(), Some("46"));

        let json = r#"[{"code": "C", "name": "Обработка"}, {"code": "25", "name": "Металл", "parent_code": "C"}]"#;
        let tree = load_tree(json).unwrap();
        assert_eq!(tree.path_labels("25").unwrap(), vec!["Обработка", "Металл"]);

        assert!(parse_tsv("46").is_err());
    }
}
