use crate::exporter::{BranchScope, ExportSettings};
use crate::policy::PolicyKind;
use crate::tree::{BuildOptions, DEFAULT_ROOT_LABEL};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Which files to write per conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Markdown,
    #[default]
    Both,
}

impl ExportFormat {
    pub fn json(self) -> bool {
        matches!(self, ExportFormat::Json | ExportFormat::Both)
    }

    pub fn markdown(self) -> bool {
        matches!(self, ExportFormat::Markdown | ExportFormat::Both)
    }
}

/// Configuration required to run the export process.
/// This decouples the logic from how the arguments were parsed (CLI/Config file).
#[derive(Clone, Debug)]
pub struct ExportConfig {
    pub target_dir: PathBuf,
    pub format: ExportFormat,
    pub branches: BranchScope,
    pub tolerant: bool,
    pub policy: PolicyKind,
    pub root_label: String,
    pub tags: Option<Vec<String>>,
    pub pretty: bool,
    pub force: bool,
    pub quiet: bool,
}

impl ExportConfig {
    pub fn new(target_dir: impl Into<PathBuf>) -> Self {
        Self {
            target_dir: target_dir.into(),
            format: ExportFormat::default(),
            branches: BranchScope::default(),
            tolerant: false,
            policy: PolicyKind::default(),
            root_label: DEFAULT_ROOT_LABEL.to_string(),
            tags: None,
            pretty: true,
            force: false,
            quiet: false,
        }
    }

    pub fn build_options(&self) -> BuildOptions {
        BuildOptions::default()
            .tolerant(self.tolerant)
            .with_root_label(self.root_label.clone())
            .with_policy(self.policy.policy())
    }

    pub fn settings(&self) -> ExportSettings {
        ExportSettings {
            policy: self.policy,
            root_label: self.root_label.clone(),
            tolerant: self.tolerant,
            branch_scope: self.branches,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessResult {
    Created,
    Updated,
    Skipped,
}

/// Per-run counters reported at the end of an export.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl ExportSummary {
    pub fn record(&mut self, result: ProcessResult) {
        match result {
            ProcessResult::Created => self.created += 1,
            ProcessResult::Updated => self.updated += 1,
            ProcessResult::Skipped => self.skipped += 1,
        }
    }
}

impl fmt::Display for ExportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Done. {} created, {} updated, {} skipped.",
            self.created, self.updated, self.skipped
        )?;
        if self.errors > 0 {
            write!(f, " Completed with {} error(s).", self.errors)?;
        }
        Ok(())
    }
}

/// What a previous export recorded about itself.
#[derive(Clone, Debug, Deserialize)]
pub struct ExportStamp {
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub settings: ExportSettings,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl ExportStamp {
    /// Written for `conversation_id` from data at least as new as `source_ts`,
    /// with the same settings.
    pub fn is_current(
        &self,
        conversation_id: &str,
        source_ts: DateTime<Utc>,
        settings: &ExportSettings,
    ) -> bool {
        self.conversation_id.as_deref() == Some(conversation_id)
            && self.updated_at >= source_ts
            && &self.settings == settings
    }
}

/// Pick a stable file stem: a short id prefix plus a slug of the title.
/// The prefix grows (8, 12, full id) until it no longer collides with another conversation.
pub fn allocate_filename(id: &str, title: &str, registry: &mut HashMap<String, String>) -> String {
    let raw_slug = slug::slugify(title);
    // Truncate slug to 60 chars (slug output is ASCII-only, so byte == char)
    let slug = raw_slug[..raw_slug.len().min(60)]
        .trim_end_matches('-')
        .to_string();
    let with_slug = |prefix: &str| {
        if slug.is_empty() {
            prefix.to_string()
        } else {
            format!("{}_{}", prefix, slug)
        }
    };

    let safe_id = slug::slugify(id);
    let safe_id = if safe_id.is_empty() {
        "untitled".to_string()
    } else {
        safe_id
    };
    for &len in &[8usize, 12usize, safe_id.len()] {
        let candidate = &safe_id[..len.min(safe_id.len())];
        match registry.get(candidate) {
            None => {
                registry.insert(candidate.to_string(), id.to_string());
                return with_slug(candidate);
            }
            Some(existing) if existing == id => return with_slug(candidate),
            Some(_) => continue,
        }
    }
    // Ids that slugify identically: number them until a free slot turns up.
    let mut n = 2usize;
    loop {
        let fallback = format!("{}-{}", safe_id, n);
        match registry.get(&fallback) {
            None => {
                registry.insert(fallback.clone(), id.to_string());
                return with_slug(&fallback);
            }
            Some(existing) if existing == id => return with_slug(&fallback),
            Some(_) => n += 1,
        }
    }
}

/// First eight characters of an id, for log lines.
pub fn short_id(id: &str) -> &str {
    id.char_indices().nth(8).map_or(id, |(end, _)| &id[..end])
}

/// Read the header fields of a JSON export, ignoring the tree.
pub fn extract_json_stamp(json_bytes: &[u8]) -> Option<ExportStamp> {
    serde_json::from_slice(json_bytes).ok()
}

/// Read the YAML frontmatter from an existing .md file.
pub fn parse_existing_frontmatter(path: &Path) -> Option<ExportStamp> {
    let file = File::open(path).ok()?;
    let mut lines = BufReader::new(file).lines();
    if lines.next()?.ok()?.trim() != "---" {
        return None;
    }

    let mut yaml = String::new();
    for line in lines {
        let line = line.ok()?;
        if line.trim() == "---" {
            return serde_yaml::from_str(&yaml).ok();
        }
        if yaml.len() > 8192 {
            break;
        }
        yaml.push_str(&line);
        yaml.push('\n');
    }
    None
}
