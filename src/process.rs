use crate::exporter::{self, ExportDocument, ExportSettings, FORMAT_VERSION};
use crate::importer::RawConversation;
use crate::normalize::normalize_messages;
use crate::tree::build_tree;
use crate::utils::{
    ExportConfig, ProcessResult, allocate_filename, extract_json_stamp, parse_existing_frontmatter,
    short_id,
};
use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, warn};

/// Pairs every conversation with its output file stem.
///
/// Stems are allocated in input order so repeated runs over the same export
/// land on the same files.
pub fn plan_exports(conversations: Vec<RawConversation>) -> Vec<(RawConversation, String)> {
    let mut registry: HashMap<String, String> = HashMap::new();
    conversations
        .into_iter()
        .map(|conv| {
            let stem = allocate_filename(conv.id(), conv.title(), &mut registry);
            (conv, stem)
        })
        .collect()
}

/// Rebuilds one conversation's tree and writes it under `config.target_dir`.
pub fn export_conversation(
    conv: &RawConversation,
    stem: &str,
    config: &ExportConfig,
) -> Result<ProcessResult> {
    let json_path = config.target_dir.join(format!("{}.json", stem));
    let md_path = config.target_dir.join(format!("{}.md", stem));
    let existed = (config.format.json() && json_path.exists())
        || (config.format.markdown() && md_path.exists());

    let settings = config.settings();
    if !config.force
        && let Some(source_ts) = conv.updated_at()
        && is_up_to_date(conv.id(), source_ts, &settings, config, &json_path, &md_path)
    {
        debug!("Skipped: {}", stem);
        return Ok(ProcessResult::Skipped);
    }

    let records = normalize_messages(conv.messages()).wrap_err("Failed to normalize messages")?;
    let outcome = build_tree(records, &config.build_options())
        .wrap_err("Failed to rebuild conversation tree")?;
    for warning in &outcome.warnings {
        warn!("[{}] {}", short_id(conv.id()), warning);
    }

    let doc = ExportDocument {
        format_version: FORMAT_VERSION,
        conversation_id: conv.id(),
        title: conv.title(),
        created_at: conv.created_at(),
        updated_at: conv.updated_at(),
        settings: &settings,
        tree: &outcome.tree,
        warnings: &outcome.warnings,
    };

    if config.format.json() {
        write_file(&json_path, |w| exporter::write_tree_json(w, &doc, config.pretty))?;
    }
    if config.format.markdown() {
        write_file(&md_path, |w| {
            exporter::write_tree_markdown(w, &doc, config.tags.as_deref())
        })?;
    }

    let result = if existed {
        ProcessResult::Updated
    } else {
        ProcessResult::Created
    };
    match result {
        ProcessResult::Created => debug!("Created: {}", stem),
        ProcessResult::Updated => debug!("Updated: {}", stem),
        ProcessResult::Skipped => {}
    }
    Ok(result)
}

/// Every file the format asks for exists and was written from the same
/// conversation, data at least as new, and the same settings.
fn is_up_to_date(
    conversation_id: &str,
    source_ts: DateTime<Utc>,
    settings: &ExportSettings,
    config: &ExportConfig,
    json_path: &Path,
    md_path: &Path,
) -> bool {
    let json_ok = !config.format.json()
        || fs::read(json_path)
            .ok()
            .and_then(|bytes| extract_json_stamp(&bytes))
            .is_some_and(|stamp| stamp.is_current(conversation_id, source_ts, settings));
    let md_ok = !config.format.markdown()
        || parse_existing_frontmatter(md_path).is_some_and(|stamp| {
            stamp.is_current(conversation_id, source_ts, settings) && stamp.tags == config.tags
        });
    json_ok && md_ok
}

fn write_file<F>(path: &Path, render: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
{
    let file =
        File::create(path).wrap_err_with(|| format!("Failed to create: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    render(&mut writer).wrap_err_with(|| format!("Failed to write: {}", path.display()))?;
    writer
        .flush()
        .wrap_err_with(|| format!("Failed to flush: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::parse_export;
    use crate::policy::PolicyKind;
    use crate::utils::ExportFormat;

    const EXPORT: &str = r#"[{
        "uuid": "conv-1",
        "name": "Borrow checker",
        "updated_at": "2024-11-14T10:05:00Z",
        "chat_messages": [
            {"uuid": "q", "sender": "human", "text": "Why?", "created_at": "2024-11-14T10:00:00Z"},
            {"uuid": "a1", "parent_message_uuid": "q", "sender": "assistant", "text": "Because.", "created_at": "2024-11-14T10:01:00Z"},
            {"uuid": "a2", "parent_message_uuid": "q", "sender": "assistant", "text": "Aliasing.", "created_at": "2024-11-14T10:02:00Z"}
        ]
    }]"#;

    fn conversation() -> RawConversation {
        parse_export(EXPORT).unwrap().remove(0)
    }

    #[test]
    fn plans_stems_in_input_order() {
        let convs = parse_export(
            r#"[{"uuid": "same-prefix-1", "name": "A", "messages": []},
                {"uuid": "same-prefix-2", "name": "A", "messages": []}]"#,
        )
        .unwrap();
        let plan = plan_exports(convs);
        assert_eq!(plan[0].1, "same-pre_a");
        assert_eq!(plan[1].1, "same-prefix-_a");
    }

    #[test]
    fn writes_then_skips_until_source_is_newer() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExportConfig::new(dir.path());
        let mut conv = conversation();

        let first = export_conversation(&conv, "conv-1", &config).unwrap();
        assert_eq!(first, ProcessResult::Created);
        assert!(dir.path().join("conv-1.json").exists());
        assert!(dir.path().join("conv-1.md").exists());

        let second = export_conversation(&conv, "conv-1", &config).unwrap();
        assert_eq!(second, ProcessResult::Skipped);

        conv.updated_at = Some(serde_json::json!(1_800_000_000));
        let third = export_conversation(&conv, "conv-1", &config).unwrap();
        assert_eq!(third, ProcessResult::Updated);
    }

    #[test]
    fn missing_markdown_is_written_again() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExportConfig::new(dir.path());
        let conv = conversation();

        export_conversation(&conv, "c", &config).unwrap();
        fs::remove_file(dir.path().join("c.md")).unwrap();

        assert_eq!(
            export_conversation(&conv, "c", &config).unwrap(),
            ProcessResult::Updated
        );
        assert!(dir.path().join("c.md").exists());
    }

    fn active_path_on_disk(dir: &Path) -> serde_json::Value {
        let json = fs::read_to_string(dir.join("c.json")).unwrap();
        serde_json::from_str::<serde_json::Value>(&json).unwrap()["tree"]["active_path"].clone()
    }

    #[test]
    fn changed_settings_rewrite_up_to_date_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ExportConfig::new(dir.path());
        let conv = conversation();

        export_conversation(&conv, "c", &config).unwrap();
        assert_eq!(active_path_on_disk(dir.path()), serde_json::json!(["q", "a2"]));

        config.policy = PolicyKind::Earliest;
        assert_eq!(
            export_conversation(&conv, "c", &config).unwrap(),
            ProcessResult::Updated
        );
        assert_eq!(active_path_on_disk(dir.path()), serde_json::json!(["q", "a1"]));
        assert_eq!(
            export_conversation(&conv, "c", &config).unwrap(),
            ProcessResult::Skipped
        );

        config.tags = Some(vec!["chat".into()]);
        assert_eq!(
            export_conversation(&conv, "c", &config).unwrap(),
            ProcessResult::Updated
        );
    }

    #[test]
    fn file_owned_by_another_conversation_is_not_trusted() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExportConfig::new(dir.path());
        let conv = conversation();
        let mut other = conversation();
        other.uuid = Some("conv-2".into());

        export_conversation(&other, "c", &config).unwrap();
        assert_eq!(
            export_conversation(&conv, "c", &config).unwrap(),
            ProcessResult::Updated
        );
    }

    #[test]
    fn markdown_only_uses_frontmatter_for_skips() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ExportConfig::new(dir.path());
        config.format = ExportFormat::Markdown;
        let conv = conversation();

        assert_eq!(
            export_conversation(&conv, "c", &config).unwrap(),
            ProcessResult::Created
        );
        assert!(!dir.path().join("c.json").exists());
        assert_eq!(
            export_conversation(&conv, "c", &config).unwrap(),
            ProcessResult::Skipped
        );

        config.force = true;
        assert_eq!(
            export_conversation(&conv, "c", &config).unwrap(),
            ProcessResult::Updated
        );
    }

    #[test]
    fn structural_errors_fail_the_conversation() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExportConfig::new(dir.path());
        let mut conv = conversation();
        conv.chat_messages[1].parent_message_uuid = Some("ghost".into());

        let err = export_conversation(&conv, "broken", &config).unwrap_err();
        assert!(format!("{:#}", err).contains("ghost"));
        assert!(!dir.path().join("broken.json").exists());

        let tolerant = ExportConfig {
            tolerant: true,
            ..ExportConfig::new(dir.path())
        };
        assert_eq!(
            export_conversation(&conv, "broken", &tolerant).unwrap(),
            ProcessResult::Created
        );
        let json = fs::read_to_string(dir.path().join("broken.json")).unwrap();
        assert!(json.contains("\"kind\": \"missing_parent\""));
    }
}
