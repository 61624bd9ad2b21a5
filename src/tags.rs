//! Resource tagging and output normalization.
//!
//! Every artifact, whether it came from the completion service, a fallback
//! template or the cache, is passed through [`normalize`] before it is
//! written anywhere. Normalization:
//!
//! 1. strips Markdown code fences ([`strip_fences`]);
//! 2. makes sure every top-level `resource` block carries the tags of the
//!    [`TagPolicy`], merging into an existing `tags` map without touching
//!    keys that are already there, or injecting a new map;
//! 3. ends the text with exactly one newline.
//!
//! The transformation is idempotent: normalizing a normalized artifact
//! returns it unchanged.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::ops::Range;

use crate::config::TagsConfig;
use crate::hcl::{self, Document};

/// Tag key marking the tool that manages a resource.
pub const MANAGED_BY_KEY: &str = "ManagedBy";
/// Tag key recording the day the artifact was produced.
pub const CREATED_AT_KEY: &str = "CreatedAt";

/// Ordered set of tags every resource must carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagPolicy {
    tags: Vec<(String, String)>,
}

impl TagPolicy {
    /// Build a policy with the two mandatory tags followed by `extra`.
    /// Extra entries that reuse a mandatory key are ignored.
    pub fn new(owner: &str, created_at: NaiveDate, extra: &BTreeMap<String, String>) -> Self {
        let mut tags = vec![
            (MANAGED_BY_KEY.to_string(), owner.to_string()),
            (
                CREATED_AT_KEY.to_string(),
                created_at.format("%Y-%m-%d").to_string(),
            ),
        ];
        for (key, value) in extra {
            if key != MANAGED_BY_KEY && key != CREATED_AT_KEY {
                tags.push((key.clone(), value.clone()));
            }
        }
        Self { tags }
    }

    pub fn from_config(config: &TagsConfig, created_at: NaiveDate) -> Self {
        Self::new(&config.owner, created_at, &config.extra)
    }

    pub fn tags(&self) -> &[(String, String)] {
        &self.tags
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(|(k, _)| k.as_str())
    }
}

/// Remove Markdown code fences.
///
/// When the text contains a ```` ``` ```` fence, only the content between
/// the first fence and the next one (or the end of the text) is kept; a
/// language tag on the opening fence line is dropped. The result is
/// trimmed either way.
pub fn strip_fences(text: &str) -> String {
    let Some(open) = text.find("```") else {
        return text.trim().to_string();
    };
    let after = &text[open + 3..];
    let first_line_end = after.find('\n').unwrap_or(after.len());
    let is_language_tag = after[..first_line_end]
        .trim()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    let body = if is_language_tag {
        &after[(first_line_end + 1).min(after.len())..]
    } else {
        after
    };
    let body = match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    };
    body.trim().to_string()
}

/// A replacement of `range` in the source by `text`.
struct Edit {
    range: Range<usize>,
    text: String,
}

/// Normalize an artifact under `policy`. See the module docs.
pub fn normalize(artifact: &str, policy: &TagPolicy) -> String {
    let code = strip_fences(artifact);
    let doc = Document::parse(&code);

    let mut edits = Vec::new();
    for block in doc.resources() {
        match doc.attribute(block.open, block.close, "tags") {
            Some(attr) => match doc.object_literal(&attr) {
                Some((open, close)) => {
                    let present: Vec<String> = doc
                        .object_keys(open, close)
                        .into_iter()
                        .map(|(_, k)| k)
                        .collect();
                    let missing = missing_tags(policy, |key| present.iter().any(|p| p == key));
                    if !missing.is_empty() {
                        edits.push(extend_object(&doc, attr.name, open, close, &missing));
                    }
                }
                None => {
                    let missing =
                        missing_tags(policy, |key| doc.mentions_key(attr.value.clone(), key));
                    if !missing.is_empty() {
                        edits.extend(wrap_in_merge(doc.value_span(&attr), &missing));
                    }
                }
            },
            None => {
                edits.push(inject_tags(&doc, block.start, block.open, block.close, policy.tags()));
            }
        }
    }

    let mut out = code.clone();
    edits.sort_by(|a, b| b.range.start.cmp(&a.range.start));
    for edit in edits {
        out.replace_range(edit.range, &edit.text);
    }

    let mut out = out.trim_end().to_string();
    out.push('\n');
    out
}

fn missing_tags<'p>(
    policy: &'p TagPolicy,
    present: impl Fn(&str) -> bool,
) -> Vec<&'p (String, String)> {
    policy.tags.iter().filter(|(k, _)| !present(k)).collect()
}

fn tag_line(indent: &str, (key, value): &(String, String)) -> String {
    format!("{}{} = {}\n", indent, hcl::object_key(key), hcl::quote(value))
}

/// Append `missing` entries to the object literal between `open` and
/// `close` (token indices) of the attribute named by token `name`.
fn extend_object(
    doc: &Document<'_>,
    name: usize,
    open: usize,
    close: usize,
    missing: &[&(String, String)],
) -> Edit {
    let src = doc.src();
    let attr_indent = hcl::indent_at(src, doc.token(name).start);
    let close_pos = doc.token(close).start;

    let key_indent = doc
        .object_keys(open, close)
        .first()
        .map(|&(tok, _)| doc.token(tok).start)
        .filter(|&pos| hcl::starts_line(src, pos))
        .map(|pos| hcl::indent_at(src, pos).to_string())
        .unwrap_or_else(|| format!("{}  ", attr_indent));

    let lines: String = missing.iter().map(|t| tag_line(&key_indent, t)).collect();

    if hcl::starts_line(src, close_pos) {
        let at = hcl::line_start(src, close_pos);
        return Edit {
            range: at..at,
            text: lines,
        };
    }

    // Single-line map: spread it over several lines.
    let body_start = doc.token(open).end;
    let existing = src[body_start..close_pos].trim();
    let mut text = String::from("\n");
    if !existing.is_empty() {
        text.push_str(&key_indent);
        text.push_str(existing);
        text.push('\n');
    }
    text.push_str(&lines);
    text.push_str(attr_indent);
    Edit {
        range: body_start..close_pos,
        text,
    }
}

/// Turn a non-literal `tags` expression into `merge(<expr>, { ... })`.
fn wrap_in_merge(span: Range<usize>, missing: &[&(String, String)]) -> [Edit; 2] {
    let entries: Vec<String> = missing
        .iter()
        .map(|(k, v)| format!("{} = {}", hcl::object_key(k), hcl::quote(v)))
        .collect();
    [
        Edit {
            range: span.start..span.start,
            text: "merge(".to_string(),
        },
        Edit {
            range: span.end..span.end,
            text: format!(", {{ {} }})", entries.join(", ")),
        },
    ]
}

/// Add a `tags` map to a resource block that has none.
fn inject_tags(
    doc: &Document<'_>,
    block_start: usize,
    open: usize,
    close: usize,
    tags: &[(String, String)],
) -> Edit {
    let src = doc.src();
    let block_indent = hcl::indent_at(src, block_start);
    let inner = format!("{}  ", block_indent);
    let close_pos = doc.token(close).start;
    let body_start = doc.token(open).end;

    let mut map = format!("{}tags = {{\n", inner);
    for tag in tags {
        map.push_str(&tag_line(&format!("{}  ", inner), tag));
    }
    map.push_str(&inner);
    map.push_str("}\n");

    if hcl::starts_line(src, close_pos) {
        let at = hcl::line_start(src, close_pos);
        let body_empty = src[body_start..at].trim().is_empty();
        let after_blank_line = src[..at].trim_end_matches([' ', '\t']).ends_with("\n\n");
        let text = if body_empty || after_blank_line {
            map
        } else {
            format!("\n{}", map)
        };
        return Edit {
            range: at..at,
            text,
        };
    }

    // Single-line block: HCL requires a newline after `{` once the body
    // holds more than one attribute.
    let existing = src[body_start..close_pos].trim();
    let mut text = String::from("\n");
    if !existing.is_empty() {
        text.push_str(&inner);
        text.push_str(existing);
        text.push_str("\n\n");
    }
    text.push_str(&map);
    text.push_str(block_indent);
    Edit {
        range: body_start..close_pos,
        text,
    }
}

/// Whether every resource block in `artifact` carries all policy keys.
pub fn is_fully_tagged(artifact: &str, policy: &TagPolicy) -> bool {
    let doc = Document::parse(artifact);
    doc.resources().iter().all(|block| {
        let Some(attr) = doc.attribute(block.open, block.close, "tags") else {
            return false;
        };
        match doc.object_literal(&attr) {
            Some((open, close)) => {
                let keys = doc.object_keys(open, close);
                policy.keys().all(|k| keys.iter().any(|(_, p)| p == k))
            }
            None => policy
                .keys()
                .all(|k| doc.mentions_key(attr.value.clone(), k)),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> TagPolicy {
        let mut extra = BTreeMap::new();
        extra.insert("Environment".to_string(), "development".to_string());
        TagPolicy::new(
            "promptinfra",
            NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
            &extra,
        )
    }

    const UNTAGGED: &str = r#"resource "aws_instance" "web" {
  ami           = "ami-123"
  instance_type = "t2.micro"
}
"#;

    const PARTIAL: &str = r#"resource "aws_s3_bucket" "logs" {
  bucket = "logs"

  tags = {
    Name      = "logs"
    ManagedBy = "platform-team"
  }
}
"#;

    fn fixtures() -> Vec<&'static str> {
        vec![
            UNTAGGED,
            PARTIAL,
            "",
            "terraform {\n  required_version = \">= 1.5\"\n}\n",
            "resource \"aws_eip\" \"ip\" {}\n",
            "resource \"aws_eip\" \"ip\" { domain = \"vpc\" }\n",
            "resource \"aws_vpc\" \"v\" {\n  tags = {}\n}\n",
            "resource \"aws_vpc\" \"v\" {\n  tags = { Name = \"v\" }\n}\n",
            "resource \"aws_vpc\" \"v\" {\n  tags = merge(local.common_tags, {\n    Name = \"v\"\n  })\n}\n",
            "resource \"aws_vpc\" \"v\" {\n  tags = local.common_tags\n}\n",
            "```hcl\nresource \"aws_vpc\" \"v\" {\n  cidr_block = \"10.0.0.0/16\"\n}\n```\n",
            "  module \"x\" {\n    source = \"./x\"\n  }\n  resource \"aws_vpc\" \"v\" {\n    cidr_block = \"10.0.0.0/16\"\n  }\n",
            "resource \"aws_instance\" \"w\" {\n  user_data = <<-EOT\n    #!/bin/bash\n    echo \"${var.x}\" }\n  EOT\n}\n",
        ]
    }

    #[test]
    fn test_injects_tags_when_missing() {
        let out = normalize(UNTAGGED, &policy());
        assert_eq!(
            out,
            r#"resource "aws_instance" "web" {
  ami           = "ami-123"
  instance_type = "t2.micro"

  tags = {
    ManagedBy = "promptinfra"
    CreatedAt = "2025-10-01"
    Environment = "development"
  }
}
"#
        );
    }

    #[test]
    fn test_merges_without_clobbering() {
        let out = normalize(PARTIAL, &policy());
        assert!(out.contains("ManagedBy = \"platform-team\""));
        assert!(!out.contains("ManagedBy = \"promptinfra\""));
        assert!(out.contains("    CreatedAt = \"2025-10-01\"\n"));
        assert!(out.contains("    Environment = \"development\"\n"));
        assert_eq!(out.matches("tags = {").count(), 1);
    }

    #[test]
    fn test_quoted_keys_count_as_present() {
        let src = "resource \"a\" \"b\" {\n  tags = {\n    \"ManagedBy\" = \"me\"\n  }\n}\n";
        let out = normalize(src, &policy());
        assert_eq!(out.matches("ManagedBy").count(), 1);
        assert!(out.contains("CreatedAt"));
    }

    #[test]
    fn test_single_line_map_is_expanded() {
        let src = "resource \"aws_vpc\" \"v\" {\n  tags = { Name = \"v\" }\n}\n";
        let out = normalize(src, &policy());
        assert_eq!(
            out,
            "resource \"aws_vpc\" \"v\" {\n  tags = {\n    Name = \"v\"\n    ManagedBy = \"promptinfra\"\n    CreatedAt = \"2025-10-01\"\n    Environment = \"development\"\n  }\n}\n"
        );
    }

    #[test]
    fn test_single_line_block_is_expanded() {
        let src = "resource \"aws_eip\" \"ip\" { domain = \"vpc\" }";
        let out = normalize(src, &policy());
        assert!(out.starts_with("resource \"aws_eip\" \"ip\" {\n  domain = \"vpc\"\n\n  tags = {\n"));
        assert!(out.ends_with("  }\n}\n"));
    }

    #[test]
    fn test_non_literal_tags_wrapped_in_merge() {
        let src = "resource \"aws_vpc\" \"v\" {\n  tags = local.common_tags\n}\n";
        let out = normalize(src, &policy());
        assert!(out.contains(
            "tags = merge(local.common_tags, { ManagedBy = \"promptinfra\", CreatedAt = \"2025-10-01\", Environment = \"development\" })"
        ));
    }

    #[test]
    fn test_fences_stripped() {
        let out = normalize("Sure!\n```terraform\nresource \"a\" \"b\" {\n}\n```\nDone.", &policy());
        assert!(out.starts_with("resource \"a\" \"b\" {"));
        assert!(!out.contains("```"));
        assert!(!out.contains("Sure"));
    }

    #[test]
    fn test_strip_fences_variants() {
        assert_eq!(strip_fences("  plain  "), "plain");
        assert_eq!(strip_fences("```\ncode\n```"), "code");
        assert_eq!(strip_fences("```hcl\ncode\n"), "code");
        assert_eq!(strip_fences("```resource {}```"), "resource {}");
    }

    #[test]
    fn test_heredoc_braces_do_not_confuse_injection() {
        let src = fixtures()[12];
        let out = normalize(src, &policy());
        assert!(out.contains("  EOT\n\n  tags = {\n"));
        assert!(out.ends_with("  }\n}\n"));
    }

    #[test]
    fn test_idempotent() {
        let p = policy();
        for src in fixtures() {
            let once = normalize(src, &p);
            let twice = normalize(&once, &p);
            assert_eq!(once, twice, "not idempotent for:\n{}", src);
        }
    }

    #[test]
    fn test_complete() {
        let p = policy();
        for src in fixtures() {
            let out = normalize(src, &p);
            assert!(is_fully_tagged(&out, &p), "missing tags in:\n{}", out);
        }
    }

    #[test]
    fn test_every_resource_tagged() {
        let src = format!("{}\n{}", UNTAGGED, PARTIAL);
        let out = normalize(&src, &policy());
        let doc = Document::parse(&out);
        assert_eq!(doc.resources().len(), 2);
        assert!(is_fully_tagged(&out, &policy()));
    }

    #[test]
    fn test_non_identifier_keys_are_quoted() {
        let mut extra = BTreeMap::new();
        extra.insert("cost-center/team".to_string(), "x".to_string());
        extra.insert("kubernetes.io/role/elb".to_string(), "1".to_string());
        let p = TagPolicy::new("promptinfra", NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(), &extra);

        for src in [
            UNTAGGED,
            PARTIAL,
            "resource \"aws_vpc\" \"v\" {\n  tags = local.common_tags\n}\n",
        ] {
            let once = normalize(src, &p);
            assert!(once.contains("\"cost-center/team\" = \"x\""), "{}", once);
            assert!(once.contains("\"kubernetes.io/role/elb\" = \"1\""), "{}", once);
            assert!(!once.contains("\n    cost-center/team"));
            assert!(is_fully_tagged(&once, &p));

            let twice = normalize(&once, &p);
            assert_eq!(once, twice);
            assert_eq!(twice.matches("cost-center/team").count(), 1);
        }
    }

    #[test]
    fn test_policy_ignores_extra_mandatory_keys() {
        let mut extra = BTreeMap::new();
        extra.insert("ManagedBy".to_string(), "other".to_string());
        let p = TagPolicy::new("promptinfra", NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(), &extra);
        assert_eq!(p.tags().len(), 2);
        assert_eq!(p.tags()[0].1, "promptinfra");
        assert_eq!(p.tags()[1].1, "2025-01-02");
    }
}
