use crate::error::BuildWarning;
use crate::model::MessageNode;
use crate::policy::PolicyKind;
use crate::tree::ConversationTree;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;

pub const FORMAT_VERSION: &str = "1.0.0";

/// Which branches the Markdown rendering includes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BranchScope {
    /// Active thread plus every alternate branch.
    #[default]
    All,
    /// Active thread only.
    Active,
}

/// Options that change what gets written.
///
/// Stored in every export; a rerun with different settings rewrites the files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSettings {
    pub policy: PolicyKind,
    pub root_label: String,
    pub tolerant: bool,
    pub branch_scope: BranchScope,
}

/// Everything written for one conversation.
///
/// Warnings sit next to the tree, never inside it.
#[derive(Debug, Serialize)]
pub struct ExportDocument<'a> {
    pub format_version: &'static str,
    pub conversation_id: &'a str,
    pub title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    pub settings: &'a ExportSettings,
    pub tree: &'a ConversationTree,
    pub warnings: &'a [BuildWarning],
}

#[derive(Serialize)]
struct Frontmatter<'a> {
    title: &'a str,
    conversation_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
    active_branch: &'a str,
    messages: usize,
    branches: usize,
    settings: &'a ExportSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<&'a [String]>,
}

pub fn write_tree_json<W: Write>(
    writer: &mut W,
    doc: &ExportDocument<'_>,
    pretty: bool,
) -> std::io::Result<()> {
    if pretty {
        serde_json::to_writer_pretty(&mut *writer, doc)?;
    } else {
        serde_json::to_writer(&mut *writer, doc)?;
    }
    writeln!(writer)
}

pub fn write_tree_markdown<W: Write>(
    writer: &mut W,
    doc: &ExportDocument<'_>,
    tags: Option<&[String]>,
) -> std::io::Result<()> {
    let tree = doc.tree;
    let fm = Frontmatter {
        title: doc.title,
        conversation_id: doc.conversation_id,
        updated_at: doc.updated_at,
        active_branch: &tree.active_branch,
        messages: tree.metrics.total_messages,
        branches: tree.metrics.total_branches,
        settings: doc.settings,
        tags,
    };

    writeln!(writer, "---")?;
    let yaml = serde_yaml::to_string(&fm).map_err(std::io::Error::other)?;
    write!(writer, "{}", yaml)?;
    writeln!(writer, "---")?;
    writeln!(writer)?;

    writeln!(writer, "# {}", doc.title)?;
    writeln!(writer)?;
    write_statistics(writer, tree)?;
    write_structure(writer, tree)?;

    for node in tree.active_messages() {
        write_message(writer, node, "##")?;
    }

    if doc.settings.branch_scope == BranchScope::Active {
        return Ok(());
    }
    let alternates = tree.alternate_branches();
    if alternates.is_empty() {
        return Ok(());
    }

    writeln!(writer, "# Alternate branches")?;
    writeln!(writer)?;
    for (branch_id, ids) in alternates {
        match tree.branch_origin(branch_id) {
            Some(origin) => writeln!(writer, "## `{}` (forks after `{}`)", branch_id, origin)?,
            None => writeln!(writer, "## `{}`", branch_id)?,
        }
        writeln!(writer)?;
        for node in ids.iter().filter_map(|id| tree.node(id)) {
            write_message(writer, node, "###")?;
        }
    }

    Ok(())
}

fn write_statistics<W: Write>(writer: &mut W, tree: &ConversationTree) -> std::io::Result<()> {
    let m = &tree.metrics;
    let rows = [
        ("Messages", m.total_messages),
        ("User messages", m.user_messages),
        ("Assistant messages", m.assistant_messages),
        ("System messages", m.system_messages),
        ("Branches", m.total_branches),
        ("Branch points", m.branch_points),
        ("Leaves", m.leaf_count),
        ("Max depth", m.max_depth),
        ("Active depth", m.active_depth),
    ];

    writeln!(writer, "| Metric | Value |")?;
    writeln!(writer, "|--------|-------|")?;
    for (label, value) in rows {
        writeln!(writer, "| {} | {} |", label, value)?;
    }
    writeln!(writer)
}

/// Mermaid diagram of branch segments; omitted for single-thread conversations.
fn write_structure<W: Write>(writer: &mut W, tree: &ConversationTree) -> std::io::Result<()> {
    let alternates = tree.alternate_branches();
    if alternates.is_empty() {
        return Ok(());
    }
    let root_branch = tree
        .node(&tree.root_id)
        .map_or(tree.active_branch.as_str(), |n| n.branch_id.as_str());
    let mut order = vec![root_branch];
    order.extend(alternates.iter().map(|(name, _)| *name));
    let key = |name: &str| order.iter().position(|b| *b == name);

    writeln!(writer, "```mermaid")?;
    writeln!(writer, "graph TD")?;
    for (i, name) in order.iter().enumerate() {
        let size = tree.metrics.branch_distribution.get(*name).copied().unwrap_or(0);
        writeln!(
            writer,
            "    B{}[\"{} ({} messages)\"]",
            i,
            name.replace('"', "'"),
            size
        )?;
    }
    for (i, name) in order.iter().enumerate().skip(1) {
        let parent = tree
            .branch_origin(name)
            .and_then(|origin| tree.node(origin))
            .and_then(|node| key(node.branch_id.as_str()));
        if let Some(parent) = parent {
            writeln!(writer, "    B{} --> B{}", parent, i)?;
        }
    }
    writeln!(writer, "```")?;
    writeln!(writer)
}

fn write_message<W: Write>(writer: &mut W, node: &MessageNode, level: &str) -> std::io::Result<()> {
    writeln!(writer, "{} {}", level, node.record.role.heading())?;
    writeln!(writer)?;
    if !node.record.content.is_empty() {
        writeln!(writer, "{}", node.record.content)?;
        writeln!(writer)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MessageRecord, Role};
    use crate::tree::{BuildOptions, DEFAULT_ROOT_LABEL, build_tree};
    use crate::utils::ExportStamp;

    fn record(id: &str, parent: Option<&str>, role: Role, text: &str, ts: i64) -> MessageRecord {
        MessageRecord::new(id, parent, role, text, DateTime::from_timestamp(ts, 0).unwrap())
    }

    fn sample_tree() -> ConversationTree {
        build_tree(
            vec![
                record("q", None, Role::User, "What is a lifetime?", 0),
                record("a1", Some("q"), Role::Assistant, "First try.", 1),
                record("a2", Some("q"), Role::Assistant, "Second try.", 2),
                record("q2", Some("a1"), Role::User, "Go on.", 3),
            ],
            &BuildOptions::default(),
        )
        .unwrap()
        .tree
    }

    fn settings(branch_scope: BranchScope) -> ExportSettings {
        ExportSettings {
            policy: PolicyKind::Latest,
            root_label: DEFAULT_ROOT_LABEL.to_string(),
            tolerant: false,
            branch_scope,
        }
    }

    fn document<'a>(tree: &'a ConversationTree, settings: &'a ExportSettings) -> ExportDocument<'a> {
        ExportDocument {
            format_version: FORMAT_VERSION,
            conversation_id: "conv-1",
            title: "Lifetimes",
            created_at: None,
            updated_at: DateTime::from_timestamp(100, 0),
            settings,
            tree,
            warnings: &[],
        }
    }

    fn render(scope: BranchScope) -> String {
        let tree = sample_tree();
        let settings = settings(scope);
        let mut out = Vec::new();
        let tags = vec!["chat".to_string()];
        write_tree_markdown(&mut out, &document(&tree, &settings), Some(tags.as_slice())).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn markdown_renders_active_thread_and_alternates() {
        let md = render(BranchScope::All);

        assert!(md.starts_with("---\ntitle: Lifetimes\nconversation_id: conv-1\n"));
        assert!(md.contains("active_branch: main\n"));
        assert!(md.contains("- chat\n"));
        let active = md.find("Second try.").unwrap();
        let alternate_header = md.find("# Alternate branches").unwrap();
        let alternate = md.find("First try.").unwrap();
        assert!(active < alternate_header && alternate_header < alternate);
        assert!(md.contains("## `branch_1` (forks after `q`)"));
        assert!(md.contains("### Assistant\n\nFirst try."));
    }

    #[test]
    fn markdown_active_scope_skips_alternates() {
        let md = render(BranchScope::Active);
        assert!(md.contains("## User\n\nWhat is a lifetime?"));
        assert!(md.contains("Second try."));
        assert!(!md.contains("First try."));
        assert!(!md.contains("Alternate branches"));
    }

    #[test]
    fn markdown_summarises_tree_shape() {
        let md = render(BranchScope::All);

        assert!(md.contains("| Messages | 4 |\n"));
        assert!(md.contains("| User messages | 2 |\n"));
        assert!(md.contains("| Branch points | 1 |\n"));
        assert!(md.contains("| Leaves | 2 |\n"));
        assert!(md.contains("| Max depth | 2 |\n"));
        assert!(md.contains("| Active depth | 1 |\n"));

        assert!(md.contains("```mermaid\ngraph TD\n"));
        assert!(md.contains("    B0[\"main (2 messages)\"]\n"));
        assert!(md.contains("    B1[\"branch_1 (2 messages)\"]\n"));
        assert!(md.contains("    B0 --> B1\n"));
    }

    #[test]
    fn frontmatter_round_trips_settings() {
        let md = render(BranchScope::Active);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.md");
        std::fs::write(&path, &md).unwrap();

        let stamp = crate::utils::parse_existing_frontmatter(&path).unwrap();
        assert_eq!(stamp.conversation_id.as_deref(), Some("conv-1"));
        assert_eq!(stamp.updated_at.timestamp(), 100);
        assert_eq!(stamp.settings, settings(BranchScope::Active));
        assert_eq!(stamp.tags, Some(vec!["chat".to_string()]));
    }

    #[test]
    fn json_document_keeps_warnings_beside_tree() {
        let tree = sample_tree();
        let settings = settings(BranchScope::All);
        let warnings = [BuildWarning::DuplicateId {
            id: "a1".into(),
            dropped: 1,
        }];
        let doc = ExportDocument {
            warnings: &warnings,
            ..document(&tree, &settings)
        };
        let mut out = Vec::new();
        write_tree_json(&mut out, &doc, false).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(value["format_version"], FORMAT_VERSION);
        assert_eq!(value["tree"]["root_id"], "q");
        assert_eq!(value["warnings"][0]["kind"], "duplicate_id");
        assert_eq!(value["settings"]["policy"], "latest");
        assert!(value["tree"].get("warnings").is_none());
        assert!(value.get("created_at").is_none());

        let stamp: ExportStamp = crate::utils::extract_json_stamp(&out).unwrap();
        assert_eq!(stamp.updated_at.timestamp(), 100);
        assert_eq!(stamp.settings, settings);
    }
}
