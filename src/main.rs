mod actions;
mod config;
mod engine;
mod error;
mod fields;
mod predicates;
mod rules;
mod store;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mail-triage")]
#[command(about = "Rule-based triage for stored emails")]
struct Cli {
    /// Dry run mode - show what would happen without making changes
    #[arg(long, global = true)]
    dry_run: bool,

    /// Email store to use (defaults to $MAIL_TRIAGE_STORE or the configured store)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure settings
    Config {
        /// Set default email store
        #[arg(long)]
        default_store: Option<PathBuf>,
        /// Set default rules file
        #[arg(long)]
        default_rules: Option<PathBuf>,
    },
    /// Apply rules to every stored email
    Process {
        /// Rules file (defaults to the configured file, then rules.json)
        rules: Option<PathBuf>,
    },
    /// Validate and show a rules file
    Rules {
        /// Rules file (defaults to the configured file, then rules.json)
        rules: Option<PathBuf>,
    },
    /// Import fetched emails (JSON array) into the store
    Import {
        /// JSON file with the emails
        file: PathBuf,
    },
    /// List stored emails, newest first
    List {
        /// Maximum number of emails to show
        #[arg(short = 'n', long)]
        max: Option<usize>,
    },
    /// Remove all stored emails
    Clear,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let dry_run = cli.dry_run;
    let cfg = config::Config::load()?;
    let store_path = cfg.store_path(cli.store);

    if dry_run {
        println!("🔍 DRY RUN MODE - no changes will be made\n");
    }

    match cli.command {
        Commands::Config {
            default_store,
            default_rules,
        } => {
            commands::config(cfg, default_store, default_rules)?;
        }
        Commands::Process { rules } => {
            commands::process(&cfg.rules_file(rules), &store_path, dry_run)?;
        }
        Commands::Rules { rules } => {
            commands::show_rules(&cfg.rules_file(rules))?;
        }
        Commands::Import { file } => {
            commands::import(&file, &store_path, dry_run)?;
        }
        Commands::List { max } => {
            commands::list(&store_path, max)?;
        }
        Commands::Clear => {
            commands::clear(&store_path, dry_run)?;
        }
    }

    Ok(())
}

mod commands {
    use crate::config::Config;
    use crate::engine::{RuleEngine, RuleOutcome, RunReport};
    use crate::rules::{self, Rule};
    use crate::store::{DryRun, EmailRecord, JsonStore, RecordStore};
    use anyhow::{Context, Result};
    use std::fs;
    use std::path::{Path, PathBuf};

    pub fn config(mut cfg: Config, store: Option<PathBuf>, rules: Option<PathBuf>) -> Result<()> {
        if store.is_none() && rules.is_none() {
            println!("Current settings:");
            println!("  store: {}", cfg.store_path(None).display());
            println!("  rules: {}", cfg.rules_file(None).display());
            return Ok(());
        }

        if let Some(store) = store {
            println!("Default store set to: {}", store.display());
            cfg.store_path = Some(store);
        }
        if let Some(rules) = rules {
            println!("Default rules file set to: {}", rules.display());
            cfg.rules_file = Some(rules);
        }
        cfg.save()
    }

    fn open_store(path: &Path) -> Result<JsonStore> {
        JsonStore::open(path).with_context(|| format!("Failed to open email store {}", path.display()))
    }

    fn load_rules(path: &Path) -> Result<Vec<Rule>> {
        rules::load_rules(path).with_context(|| format!("Refusing to run rules from {}", path.display()))
    }

    pub fn process(rules_path: &Path, store_path: &Path, dry_run: bool) -> Result<()> {
        println!("Loading rules...");
        let rules = load_rules(rules_path)?;
        if rules.is_empty() {
            println!("No rules found in {}.", rules_path.display());
            return Ok(());
        }
        println!("Loaded {} rule(s)", rules.len());

        let mut store = open_store(store_path)?;
        let engine = RuleEngine::new(&rules);
        let report = if dry_run {
            engine.process(&mut DryRun::new(&store))?
        } else {
            engine.process(&mut store)?
        };

        print_report(&rules, &report, dry_run);
        Ok(())
    }

    fn print_report(rules: &[Rule], report: &RunReport, dry_run: bool) {
        for (index, rule) in rules.iter().enumerate() {
            println!("\nRule: {}", rule.name);
            println!("  Found {} matching email(s)", report.matches_for(index));
        }

        let failures: Vec<_> = report.failures().collect();
        if !failures.is_empty() {
            println!("\n{} problem(s):", failures.len());
            for run in failures {
                match &run.outcome {
                    RuleOutcome::Errored(e) => {
                        println!("  ✗ {} | {} | {}", run.rule, run.email_id, e);
                    }
                    RuleOutcome::PartiallyFailed { failures, .. } => {
                        for (action, e) in failures {
                            println!("  ✗ {} | {} | {}: {}", run.rule, run.email_id, action, e);
                        }
                    }
                    _ => {}
                }
            }
        }

        let verb = if dry_run { "Would apply" } else { "Applied" };
        println!(
            "\nProcessing complete. Processed {} email(s), {} rule match(es). {} {} action(s).",
            report.emails_processed,
            report.matches().count(),
            verb,
            report.actions_applied()
        );
        if report.emails_skipped > 0 {
            println!("Skipped {} email(s) with corrupt data.", report.emails_skipped);
        }
    }

    pub fn show_rules(rules_path: &Path) -> Result<()> {
        let rules = load_rules(rules_path)?;
        print!("{}", rules::format_rules_for_display(&rules));
        Ok(())
    }

    pub fn import(file: &Path, store_path: &Path, dry_run: bool) -> Result<()> {
        let content = fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        let emails: Vec<EmailRecord> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse emails from {}", file.display()))?;

        if dry_run {
            println!("Would import {} email(s) into {}", emails.len(), store_path.display());
            return Ok(());
        }

        let mut store = open_store(store_path)?;
        let count = emails.len();
        for email in emails {
            store.insert_email(email);
        }
        store.save()?;
        println!("Imported {} email(s). Store now holds {}.", count, store.len());
        Ok(())
    }

    pub fn list(store_path: &Path, max: Option<usize>) -> Result<()> {
        let store = open_store(store_path)?;
        let emails = store.get_all_emails()?;
        if emails.is_empty() {
            println!("No stored emails.");
            return Ok(());
        }

        for email in emails.iter().take(max.unwrap_or(usize::MAX)) {
            println!(
                "{} {} | {} | {} | {:?}",
                email.id,
                build_status_indicators(email),
                email.received_date,
                email.subject.chars().take(50).collect::<String>(),
                email.labels
            );
        }
        Ok(())
    }

    pub fn clear(store_path: &Path, dry_run: bool) -> Result<()> {
        let mut store = open_store(store_path)?;
        if store.is_empty() {
            println!("Store is already empty.");
            return Ok(());
        }
        if dry_run {
            println!("Would remove {} email(s)", store.len());
            return Ok(());
        }
        let count = store.len();
        store.clear();
        store.save()?;
        println!("Removed {} email(s)", count);
        Ok(())
    }

    /// Build status indicators from read state and labels
    /// Returns a string like "[●A]" for unread and archived
    fn build_status_indicators(email: &EmailRecord) -> String {
        let c1 = if email.is_read { " " } else { "●" };
        let c2 = if email.has_label("INBOX") { " " } else { "A" };
        format!("[{}{}]", c1, c2)
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::store::make_email;

        #[test]
        fn test_status_indicators() {
            let mut email = make_email("a", "2024-01-01");
            assert_eq!(build_status_indicators(&email), "[● ]");

            email.is_read = true;
            email.labels = vec!["ARCHIVE".to_string()];
            assert_eq!(build_status_indicators(&email), "[ A]");
        }

        #[test]
        fn test_import_then_process() {
            let dir = tempfile::tempdir().unwrap();
            let store_path = dir.path().join("emails.json");
            let emails_path = dir.path().join("fetched.json");
            let rules_path = dir.path().join("rules.json");

            fs::write(
                &emails_path,
                r#"[
                    {"id": "m1", "from": "boss@example.com", "subject": "Urgent: report",
                     "received_date": "2024-01-01T12:00:00", "labels": ["INBOX", "UNREAD"]},
                    {"id": "m2", "from": "friend@example.com", "subject": "Lunch?",
                     "received_date": "2024-01-02T12:00:00", "labels": ["INBOX", "UNREAD"]}
                ]"#,
            )
            .unwrap();
            fs::write(
                &rules_path,
                r#"{"rules": [{"name": "Boss", "predicate": "Any",
                    "conditions": [{"field": "From", "predicate": "Contains", "value": "boss"}],
                    "actions": [{"action": "Mark as Read"}, {"action": "Move Message", "destination": "Work"}]}]}"#,
            )
            .unwrap();

            import(&emails_path, &store_path, false).unwrap();
            process(&rules_path, &store_path, true).unwrap();
            let store = JsonStore::open(&store_path).unwrap();
            assert!(!store.get_email("m1").unwrap().is_read);

            process(&rules_path, &store_path, false).unwrap();
            let store = JsonStore::open(&store_path).unwrap();
            let boss = store.get_email("m1").unwrap();
            assert!(boss.is_read);
            assert_eq!(boss.labels, vec!["Work"]);
            assert!(!store.get_email("m2").unwrap().is_read);
        }

        #[test]
        fn test_process_rejects_invalid_rules_before_touching_store() {
            let dir = tempfile::tempdir().unwrap();
            let store_path = dir.path().join("emails.json");
            let rules_path = dir.path().join("rules.json");
            fs::write(
                &rules_path,
                r#"{"rules": [{"name": "Bad", "conditions": [], "actions": [{"action": "Move Message"}]}]}"#,
            )
            .unwrap();

            assert!(process(&rules_path, &store_path, false).is_err());
            assert!(!store_path.exists());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_process_rules_argument_is_optional() {
        let cli = Cli::try_parse_from(["mail-triage", "--dry-run", "process"]).unwrap();
        assert!(cli.dry_run);
        assert!(matches!(cli.command, Commands::Process { rules: None }));

        let cli = Cli::try_parse_from(["mail-triage", "process", "my-rules.json", "--store", "e.json"]).unwrap();
        assert_eq!(cli.store, Some(PathBuf::from("e.json")));
        assert!(matches!(cli.command, Commands::Process { rules: Some(ref p) } if p == &PathBuf::from("my-rules.json")));
    }
}
