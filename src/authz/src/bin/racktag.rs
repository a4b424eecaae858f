//! RackTag command line tool
//!
//! - `init`: stamp a fresh policy store with the schema version
//! - `compile`: check a rule file and print the compiled table
//! - `install`: validate a rule file and write it to the policy store
//! - `check`: answer a single authorization question
//! - `tags`: print the tag hierarchy

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::info;

use racktag_authz::policy::CompiledPolicyTable;
use racktag_authz::{
    compile, AttrValue, AuthzError, Directory, EngineConfig, NavigationContext, Operation,
    PolicyRuntime, RuleSource, SledScriptStore, TagTree, Target,
};

/// RackTag policy tool
#[derive(Parser)]
#[command(name = "racktag")]
#[command(about = "Compile, install and test tag-based access rules")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "RACKTAG_CONFIG")]
    config: Option<PathBuf>,

    /// Policy store directory (overrides config)
    #[arg(long, env = "RACKTAG_STORE")]
    store: Option<PathBuf>,

    /// Tag and account directory file (overrides config)
    #[arg(long, env = "RACKTAG_DIRECTORY")]
    directory: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Prepare a new policy store
    Init,

    /// Parse and compile a rule file
    Compile {
        /// Rule file
        file: PathBuf,

        /// Print the table as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a rule file and make it the active rule source
    Install {
        /// Rule file
        file: PathBuf,
    },

    /// Evaluate one request against the installed rules
    Check {
        /// Account login name
        #[arg(short, long)]
        user: String,

        /// Page (module) being visited
        #[arg(long)]
        page: Option<String>,

        /// Tab within the page
        #[arg(long)]
        tab: Option<String>,

        /// Operation name
        #[arg(long)]
        op: Option<String>,

        /// Target realm (e.g. object, rack)
        #[arg(long)]
        realm: Option<String>,

        /// Target entity id
        #[arg(long)]
        entity_id: Option<u64>,

        /// Target tag name (repeatable)
        #[arg(long = "entity-tag")]
        entity_tags: Vec<String>,

        /// Target attribute as key=value (repeatable)
        #[arg(long = "attr")]
        attrs: Vec<String>,

        /// Session tag granted to the subject (repeatable)
        #[arg(long = "give")]
        given: Vec<String>,

        /// Print the decision as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the tag hierarchy
    Tags,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},racktag_authz=info", log_level).into()),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Loading configuration from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(store) = cli.store {
        config.storage.path = store;
    }
    if let Some(directory) = cli.directory {
        config.directory.path = directory;
    }
    config.validate()?;

    match cli.command {
        Command::Init => {
            PolicyRuntime::prepare_store(&config, &open_store(&config)?)?;
            println!("Policy store ready at {}", config.storage.path.display());
        }
        Command::Compile { file, json } => {
            let text = read_rules(&file)?;
            let source = RuleSource::new(text, config.engine.expected_schema_version.clone());
            let table = report_syntax(&file, compile(&source))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&table)?);
            } else {
                print_table(&table);
            }
        }
        Command::Install { file } => install(&file, &config)?,
        Command::Check {
            user,
            page,
            tab,
            op,
            realm,
            entity_id,
            entity_tags,
            attrs,
            given,
            json,
        } => {
            let store = open_store(&config)?;
            let directory = Directory::load(&config.directory.path)?;
            let runtime = PolicyRuntime::initialize(&config, &store, &directory)?;
            let contexts = runtime.context_builder(&directory);

            let identity = match directory.account(&user) {
                Some(identity) => identity,
                None => bail!("Unknown account `{user}`"),
            };
            let mut subject = contexts.subject_context(identity, NavigationContext { page, tab })?;
            for tag in given {
                subject = subject.grant(tag);
            }

            let mut target = Target::new(realm.unwrap_or_default());
            target.id = entity_id;
            for name in entity_tags {
                match directory.tag_id(&name) {
                    Some(id) => target = target.with_tag(id),
                    None => bail!("Unknown tag `{name}`"),
                }
            }
            for pair in attrs {
                let Some((key, value)) = pair.split_once('=') else {
                    bail!("Attribute `{pair}` is not key=value");
                };
                target = target.with_attribute(key.trim(), AttrValue::infer(value.trim()));
            }
            let target = contexts.target_context(&target);

            let op = op.map(Operation::new).unwrap_or_else(Operation::none);
            let decision = runtime.engine().authorize(&subject, &target, &op);

            if json {
                println!("{}", serde_json::to_string_pretty(&decision)?);
            } else {
                match decision.matched_rule {
                    Some(order) => println!("{} (rule #{order})", decision.effect),
                    None => println!("{} (no rule matched)", decision.effect),
                }
            }
            if !decision.is_allowed() {
                std::process::exit(2);
            }
        }
        Command::Tags => {
            let directory = Directory::load(&config.directory.path)?;
            let tree = TagTree::build(directory.tags.clone())?;
            for node in tree.depth_first() {
                println!("{}{} ({})", "  ".repeat(node.depth()), node.tag.name, node.tag.id);
            }
        }
    }

    Ok(())
}

fn open_store(config: &EngineConfig) -> Result<SledScriptStore> {
    SledScriptStore::open(&config.storage.path)
        .with_context(|| format!("Opening policy store at {}", config.storage.path.display()))
}

fn read_rules(file: &Path) -> Result<String> {
    std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read rule file {}", file.display()))
}

/// Syntax errors are reported as `file:line:column: message` and end the process
fn report_syntax<T>(file: &Path, result: racktag_authz::Result<T>) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(AuthzError::Syntax(e)) => {
            eprintln!("{}:{e}", file.display());
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

fn install(file: &Path, config: &EngineConfig) -> Result<()> {
    let text = read_rules(file)?;
    let store = open_store(config)?;
    let table = report_syntax(file, PolicyRuntime::install_into(config, &store, &text))?;
    info!(rules = table.len(), "Rule source installed");

    println!("Installed {} rule(s) from {}", table.len(), file.display());
    Ok(())
}

fn print_table(table: &CompiledPolicyTable) {
    if table.is_empty() {
        println!("(no rules: every request is denied)");
        return;
    }
    for rule in &table.entries {
        println!(
            "#{:<3} line {:<4} {:<5} {}",
            rule.declaration_order,
            rule.line,
            rule.decision,
            table.describe(&rule.condition)
        );
    }
}
