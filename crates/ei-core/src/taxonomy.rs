//! Taxonomy slugging and tolerant LLM-response parsing (spec §4.2, §9).

use crate::types::Tier1Category;

/// Lowercase, ascii, hyphen-joined slug. Non-alphanumeric runs collapse to
/// a single `-`; leading/trailing hyphens are trimmed.
pub fn slugify(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_sep = true;
    for c in s.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('-');
            last_was_sep = true;
        }
    }
    if out.ends_with('-') {
        out.pop();
    }
    out
}

/// `slugify(parent) || "--" || slugify(child)`.
pub fn tier2_slug(parent_slug: &str, child_name: &str) -> String {
    format!("{}--{}", parent_slug, slugify(child_name))
}

const META_PREFIXES: &[&str] = &["note:", "reason:", "explanation:", "context:", "caveat:"];
const LABEL_PREFIXES: &[&str] = &["category:", "tier-1 category:", "tier 1 category:"];
const SUBCATEGORY_PREFIXES: &[&str] = &["tier-2 subcategory:", "tier 2 subcategory:", "subcategory:"];
const MAX_SUBCATEGORY_LEN: usize = 80;

fn strip_known_prefix<'a>(line: &'a str, prefixes: &[&str]) -> &'a str {
    let trimmed = line.trim();
    let lower = trimmed.to_ascii_lowercase();
    for prefix in prefixes {
        if lower.starts_with(prefix) {
            return trimmed[prefix.len()..].trim();
        }
    }
    trimmed.trim_start_matches(['-', '*', '•']).trim()
}

/// Result of parsing a labeling response against the closed Tier-1 set and
/// the current Tier-2 vocabulary known to the taxonomy store.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLabel {
    pub tier1: Tier1Category,
    pub tier2_name: Option<String>,
}

/// Tolerant parse of the model's two-line response (spec §4.2 step 7).
///
/// `known_tier2` maps a lowercase Tier-2 name to its parent Tier-1, so that
/// a response containing only a Tier-2 name can still resolve its Tier-1.
pub fn parse_label_response(
    response: &str,
    known_tier2: &[(String, Tier1Category)],
) -> Option<ParsedLabel> {
    let lines: Vec<&str> = response.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if lines.is_empty() {
        return None;
    }

    let mut tier1 = None;
    let mut tier1_line_index = None;
    for (i, line) in lines.iter().enumerate() {
        let candidate = strip_known_prefix(line, LABEL_PREFIXES);
        if let Some(cat) = match_tier1(candidate) {
            tier1 = Some(cat);
            tier1_line_index = Some(i);
            break;
        }
    }

    let mut tier2_name = None;
    for (i, line) in lines.iter().enumerate() {
        if Some(i) == tier1_line_index {
            continue;
        }
        let candidate = strip_known_prefix(line, SUBCATEGORY_PREFIXES);
        if candidate.eq_ignore_ascii_case("none") || candidate.is_empty() {
            continue;
        }
        if is_rejected_subcategory(candidate) {
            continue;
        }
        tier2_name = Some(candidate.to_string());
        break;
    }

    if tier1.is_none() {
        if let Some(name) = &tier2_name {
            tier1 = known_tier2
                .iter()
                .find(|(known, _)| known.eq_ignore_ascii_case(name))
                .map(|(_, parent)| *parent);
        }
    }

    tier1.map(|tier1| ParsedLabel { tier1, tier2_name })
}

fn match_tier1(candidate: &str) -> Option<Tier1Category> {
    Tier1Category::ALL
        .into_iter()
        .find(|c| c.as_str_title().eq_ignore_ascii_case(candidate))
}

/// Rejects subcategory text that is empty, multi-line, over the length
/// bound, or begins with a meta-commentary prefix (spec §4.2 step 7).
pub fn is_rejected_subcategory(candidate: &str) -> bool {
    let trimmed = candidate.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_SUBCATEGORY_LEN {
        return true;
    }
    if trimmed.contains('\n') {
        return true;
    }
    let lower = trimmed.to_ascii_lowercase();
    META_PREFIXES.iter().any(|p| lower.starts_with(p))
}
