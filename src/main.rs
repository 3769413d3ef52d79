use chat_tree_export::exporter::BranchScope;
use chat_tree_export::importer::{self, Selection};
use chat_tree_export::policy::PolicyKind;
use chat_tree_export::tree::DEFAULT_ROOT_LABEL;
use chat_tree_export::utils::{ExportConfig, ExportFormat};
use clap::Parser;
use eyre::{Context, Result, eyre};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Rebuild branching chat conversations from a flat export
/// and write them as JSON trees and Markdown transcripts.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Export file: a list of conversations (e.g. Claude.ai conversations.json)
    /// or a single conversation object.
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Directory to write exports to.
    /// Defaults to ./chat-tree-export if not set in config.
    #[arg(value_name = "TARGET_DIR")]
    target_dir: Option<PathBuf>,

    /// Path to a specific configuration file.
    /// Defaults to $XDG_CONFIG_HOME/chat-tree-export/config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Which files to write per conversation.
    #[arg(long, value_enum)]
    format: Option<ExportFormat>,

    /// Which branches the Markdown transcript includes.
    #[arg(long, value_enum)]
    branches: Option<BranchScope>,

    /// Which child continues a branch at a fork.
    #[arg(long, value_enum)]
    policy: Option<PolicyKind>,

    /// Name of the branch that starts at the root message.
    #[arg(long, value_name = "NAME")]
    root_label: Option<String>,

    /// Drop duplicates, dangling subtrees and extra roots instead of failing.
    #[arg(long)]
    tolerant: bool,

    /// Export only the conversation with this id.
    #[arg(long, value_name = "ID", conflicts_with = "index")]
    conversation: Option<String>,

    /// Export only the conversation at this position in the file.
    #[arg(long, value_name = "N")]
    index: Option<usize>,

    /// List the conversations in the export and exit.
    #[arg(long)]
    list: bool,

    /// Comma-separated tags to add to frontmatter (e.g. "chat,llm").
    #[arg(long, value_name = "TAGS", value_delimiter = ',')]
    tags: Option<Vec<String>>,

    /// Write single-line JSON instead of pretty-printed.
    #[arg(long)]
    compact: bool,

    /// Overwrite existing files even if they are newer.
    #[arg(short, long)]
    force: bool,

    /// Print each file written or skipped.
    #[arg(short, long)]
    verbose: bool,

    /// Only print warnings and errors.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Deserialize, Default)]
struct FileConfig {
    target_dir: Option<PathBuf>,
    format: Option<ExportFormat>,
    branches: Option<BranchScope>,
    policy: Option<PolicyKind>,
    root_label: Option<String>,
    tolerant: Option<bool>,
    pretty: Option<bool>,
    tags: Option<Vec<String>>,
}

fn load_file_config(explicit_path: Option<&Path>) -> Result<FileConfig> {
    let path = if let Some(p) = explicit_path {
        if !p.exists() {
            return Err(eyre!("Config file not found: {}", p.display()));
        }
        Some(p.to_path_buf())
    } else {
        dirs::config_dir()
            .map(|d| d.join("chat-tree-export/config.toml"))
            .filter(|p| p.exists())
    };

    match path {
        None => Ok(FileConfig::default()),
        Some(p) => {
            let content = fs::read_to_string(&p)
                .wrap_err_with(|| format!("Failed to read config: {}", p.display()))?;
            toml::from_str(&content)
                .wrap_err_with(|| format!("Failed to parse config: {}", p.display()))
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if quiet {
        Level::WARN
    } else if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    // 1. Load config file (CLI path > default path)
    let file_cfg = load_file_config(cli.config.as_deref())?;

    // 2. Load the export and narrow it down
    let conversations = importer::load_export(&cli.input)?;
    if cli.list {
        print!("{}", importer::list_conversations(&conversations, 50));
        return Ok(());
    }
    let selection = match (cli.conversation, cli.index) {
        (Some(id), _) => Selection::Id(id),
        (None, Some(index)) => Selection::Index(index),
        (None, None) => Selection::All,
    };
    let conversations = importer::select(conversations, &selection)?;

    // 3. Resolve everything else (CLI > Config > Default)
    let config = ExportConfig {
        target_dir: cli
            .target_dir
            .or(file_cfg.target_dir)
            .unwrap_or_else(|| PathBuf::from("chat-tree-export")),
        format: cli.format.or(file_cfg.format).unwrap_or_default(),
        branches: cli.branches.or(file_cfg.branches).unwrap_or_default(),
        tolerant: cli.tolerant || file_cfg.tolerant.unwrap_or(false),
        policy: cli.policy.or(file_cfg.policy).unwrap_or_default(),
        root_label: cli
            .root_label
            .or(file_cfg.root_label)
            .unwrap_or_else(|| DEFAULT_ROOT_LABEL.to_string()),
        tags: cli.tags.or(file_cfg.tags),
        pretty: !cli.compact && file_cfg.pretty.unwrap_or(true),
        force: cli.force,
        quiet: cli.quiet,
    };

    // 4. Run the export
    #[cfg(feature = "sequential")]
    let summary = chat_tree_export::sequential::execute(&config, conversations)?;

    #[cfg(not(feature = "sequential"))]
    let summary = chat_tree_export::parallel::execute(&config, conversations)?;

    if summary.errors > 0 {
        return Err(eyre!("{} conversation(s) failed to export", summary.errors));
    }
    Ok(())
}
