use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rpassword::prompt_password;
use std::path::{Path, PathBuf};
use tagvault_core::{
    accounts::{self, DEFAULT_ADMIN_PASSWORD, DEFAULT_ADMIN_USERNAME},
    backup, filter_records,
    import_export::{export_to_csv, import_from_csv},
    AppContext, Config, CredentialRecord, RecordInput, SearchQuery, Tag, TagInput,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use zeroize::Zeroize;

/// TagVault - local password manager with tagged entries
#[derive(Parser)]
#[command(name = "tagvault", version)]
#[command(about = "Local password manager with tagged entries", long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Account to log in as
    #[arg(long, short, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the configuration and create the first administrator
    Init {
        /// Administrator username
        #[arg(long, default_value = DEFAULT_ADMIN_USERNAME)]
        admin: String,
    },

    /// Manage credential entries
    #[command(subcommand)]
    Record(RecordCommand),

    /// Manage tags
    #[command(subcommand)]
    Tag(TagCommand),

    /// Search entries by text and tags
    Search {
        /// Text matched against site, username, notes and tag names
        #[arg(long)]
        text: Option<String>,

        /// Only entries carrying every given tag
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        show_passwords: bool,
    },

    /// Export entries to a CSV file
    Export { file: PathBuf },

    /// Import entries from a CSV file
    Import { file: PathBuf },

    /// Manage user accounts
    #[command(subcommand)]
    User(UserCommand),

    /// Snapshot the current user's data to the backup store
    Backup {
        /// Fill missing data from the backup instead
        #[arg(long)]
        restore: bool,
    },
}

#[derive(Args)]
struct RecordFields {
    #[arg(long)]
    site: Option<String>,

    #[arg(long)]
    username: Option<String>,

    /// Prompt for the entry password
    #[arg(long)]
    password: bool,

    /// Tag names (repeatable)
    #[arg(long = "tag")]
    tags: Vec<String>,

    #[arg(long)]
    notes: Option<String>,
}

#[derive(Subcommand)]
enum RecordCommand {
    /// Add an entry; the password is always prompted
    Add {
        #[command(flatten)]
        fields: RecordFields,
    },
    /// Change an entry; only the given fields are replaced
    Edit {
        id: Uuid,

        #[command(flatten)]
        fields: RecordFields,

        /// Remove all tags
        #[arg(long, conflicts_with = "tags")]
        clear_tags: bool,
    },
    /// Delete an entry
    Rm { id: Uuid },
    /// List entries
    List {
        #[arg(long)]
        show_passwords: bool,
    },
    /// Show one entry, including its password
    Show { id: Uuid },
}

#[derive(Subcommand)]
enum TagCommand {
    Add {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Color as #rrggbb
        #[arg(long, default_value = "")]
        color: String,
    },
    Edit {
        /// Tag name or id
        tag: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },
    Rm {
        /// Tag name or id
        tag: String,
    },
    List,
}

#[derive(Subcommand)]
enum UserCommand {
    List,
    Add {
        username: String,
        #[arg(long)]
        admin: bool,
    },
    Rm {
        username: String,
    },
    /// Grant or revoke administrator rights
    Admin {
        username: String,
        #[arg(long)]
        revoke: bool,
    },
    /// Change your own password
    Passwd,
    /// Set another user's password
    Reset {
        username: String,
    },
}

fn prompt_secret(prompt: &str) -> Result<String> {
    prompt_password(prompt).context("Failed to read password")
}

/// Prompt twice and require both entries to match
fn prompt_new_secret(prompt: &str) -> Result<String> {
    let mut first = prompt_secret(prompt)?;
    let mut second = prompt_secret("Confirm: ")?;
    let matches = first == second;
    second.zeroize();
    if !matches {
        first.zeroize();
        bail!("Passwords do not match");
    }
    Ok(first)
}

fn init(config: &Config, config_path: &Path, admin: &str) -> Result<()> {
    if !config_path.exists() {
        config.save(config_path)?;
        info!("Wrote configuration to {:?}", config_path);
    }

    let ctx = AppContext::open(config.clone())?;
    if !ctx.repository().get_users()?.is_empty() {
        println!("Already initialized; users exist.");
        return Ok(());
    }

    let mut password = prompt_secret("Administrator password (empty for default): ")?;
    if password.is_empty() {
        warn!("Using the default administrator password");
        password = DEFAULT_ADMIN_PASSWORD.to_string();
    }
    let seeded = accounts::seed_default_admin(ctx.repository(), admin, &password);
    password.zeroize();

    if let Some(user) = seeded? {
        println!("Created administrator {}", user.username);
    }
    Ok(())
}

fn login(config: Config, username: &str) -> Result<AppContext> {
    let ctx = AppContext::open(config)?;
    let mut password = prompt_secret(&format!("Password for {}: ", username))?;
    let result = ctx.login(username, &password);
    password.zeroize();
    result?;
    Ok(ctx)
}

fn resolve_tag_ids(tags: &[Tag], names: &[String]) -> Result<Vec<Uuid>> {
    names
        .iter()
        .map(|name| {
            let wanted = name.trim().to_lowercase();
            tags.iter()
                .find(|t| t.name.to_lowercase() == wanted)
                .map(|t| t.id)
                .ok_or_else(|| anyhow!("Unknown tag: {}", name))
        })
        .collect()
}

fn find_tag(tags: &[Tag], key: &str) -> Result<Tag> {
    let by_id = Uuid::parse_str(key).ok();
    tags.iter()
        .find(|t| Some(t.id) == by_id || t.name.to_lowercase() == key.trim().to_lowercase())
        .cloned()
        .ok_or_else(|| anyhow!("Unknown tag: {}", key))
}

fn tag_names(record: &CredentialRecord, tags: &[Tag]) -> String {
    record
        .tag_ids
        .iter()
        .filter_map(|id| tags.iter().find(|t| t.id == *id))
        .map(|t| t.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_record(record: &CredentialRecord, tags: &[Tag], show_password: bool) {
    let password = if show_password {
        record.password.as_str()
    } else {
        "********"
    };
    println!(
        "{}  {:<30} {:<24} {:<16} [{}]",
        record.id,
        record.site,
        record.username,
        password,
        tag_names(record, tags)
    );
}

fn record_command(ctx: &AppContext, command: RecordCommand) -> Result<bool> {
    let store = ctx.records()?;
    let tags = ctx.tags()?.list()?;

    match command {
        RecordCommand::Add { fields } => {
            let mut password = prompt_secret("Entry password: ")?;
            let input = RecordInput {
                site: fields.site.unwrap_or_default(),
                username: fields.username.unwrap_or_default(),
                password: password.clone(),
                tag_ids: resolve_tag_ids(&tags, &fields.tags)?,
                notes: fields.notes.unwrap_or_default(),
            };
            password.zeroize();

            let record = store.create(input)?;
            println!("Added {}", record.id);
            Ok(true)
        }
        RecordCommand::Edit {
            id,
            fields,
            clear_tags,
        } => {
            let current = store.get(id)?;
            let tag_ids = if clear_tags {
                Vec::new()
            } else if fields.tags.is_empty() {
                current.tag_ids
            } else {
                resolve_tag_ids(&tags, &fields.tags)?
            };
            let password = if fields.password {
                prompt_secret("New entry password: ")?
            } else {
                current.password
            };

            let input = RecordInput {
                site: fields.site.unwrap_or(current.site),
                username: fields.username.unwrap_or(current.username),
                password,
                tag_ids,
                notes: fields.notes.unwrap_or(current.notes),
            };
            store.update(id, input)?;
            println!("Updated {}", id);
            Ok(true)
        }
        RecordCommand::Rm { id } => {
            store.delete(id)?;
            println!("Deleted {}", id);
            Ok(true)
        }
        RecordCommand::List { show_passwords } => {
            let records = store.list()?;
            for record in &records {
                print_record(record, &tags, show_passwords);
            }
            println!("{} entr{}", records.len(), if records.len() == 1 { "y" } else { "ies" });
            Ok(false)
        }
        RecordCommand::Show { id } => {
            let record = store.get(id)?;
            println!("Site:     {}", record.site);
            println!("Username: {}", record.username);
            println!("Password: {}", record.password);
            println!("Tags:     {}", tag_names(&record, &tags));
            if !record.notes.is_empty() {
                println!("Notes:    {}", record.notes);
            }
            println!("Created:  {}", record.created_at.to_rfc3339());
            println!("Updated:  {}", record.updated_at.to_rfc3339());
            Ok(false)
        }
    }
}

fn tag_command(ctx: &AppContext, command: TagCommand) -> Result<bool> {
    let store = ctx.tags()?;

    match command {
        TagCommand::Add {
            name,
            description,
            color,
        } => {
            let tag = store.create(TagInput {
                name,
                description,
                color,
            })?;
            println!("Added tag {} ({})", tag.name, tag.id);
            Ok(true)
        }
        TagCommand::Edit {
            tag,
            name,
            description,
            color,
        } => {
            let current = find_tag(&store.list()?, &tag)?;
            let updated = store.update(
                current.id,
                TagInput {
                    name: name.unwrap_or(current.name),
                    description: description.unwrap_or(current.description),
                    color: color.unwrap_or(current.color),
                },
            )?;
            println!("Updated tag {}", updated.name);
            Ok(true)
        }
        TagCommand::Rm { tag } => {
            let current = find_tag(&store.list()?, &tag)?;
            store.delete(current.id)?;
            println!("Deleted tag {}", current.name);
            Ok(true)
        }
        TagCommand::List => {
            for tag in store.list()? {
                println!("{}  {} {:<40} {}", tag.id, tag.color, tag.name, tag.description);
            }
            Ok(false)
        }
    }
}

fn user_command(ctx: &AppContext, command: UserCommand) -> Result<bool> {
    match command {
        UserCommand::List => {
            for user in accounts::list_users(ctx)? {
                let last_login = user
                    .last_login
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{:<24} {:<6} last login: {}",
                    user.username,
                    if user.is_admin { "admin" } else { "user" },
                    last_login
                );
            }
            Ok(false)
        }
        UserCommand::Add { username, admin } => {
            let mut password = prompt_new_secret(&format!("Password for {}: ", username))?;
            let created = accounts::create_user(ctx, &username, &password, admin);
            password.zeroize();
            println!("Created user {}", created?.username);
            Ok(true)
        }
        UserCommand::Rm { username } => {
            let user = accounts::find_user(ctx, &username)?;
            accounts::delete_user(ctx, user.id)?;
            println!("Deleted user {}", user.username);
            Ok(true)
        }
        UserCommand::Admin { username, revoke } => {
            let user = accounts::find_user(ctx, &username)?;
            let user = accounts::set_admin(ctx, user.id, !revoke)?;
            println!(
                "{} is {}an administrator",
                user.username,
                if user.is_admin { "" } else { "no longer " }
            );
            Ok(true)
        }
        UserCommand::Passwd => {
            let mut current = prompt_secret("Current password: ")?;
            let mut new = prompt_new_secret("New password: ")?;
            let result = accounts::change_password(ctx, &current, &new);
            current.zeroize();
            new.zeroize();
            result?;
            println!("Password changed");
            Ok(true)
        }
        UserCommand::Reset { username } => {
            let user = accounts::find_user(ctx, &username)?;
            let mut new = prompt_new_secret(&format!("New password for {}: ", user.username))?;
            let result = accounts::reset_password(ctx, user.id, &new);
            new.zeroize();
            result?;
            println!("Password reset for {}", user.username);
            Ok(true)
        }
    }
}

/// Copy the logged-in user's data to the backup store off the async runtime
async fn snapshot(ctx: &AppContext) -> Result<()> {
    let primary = ctx.repository_handle();
    let secondary = ctx.config().backup.open()?;
    let user_id = ctx.current_user()?.id;

    let summary = tokio::task::spawn_blocking(move || {
        backup::snapshot_user(primary.as_ref(), secondary.as_ref(), user_id)
    })
    .await??;

    info!(
        "Backup holds {} record(s) and {} tag(s)",
        summary.records, summary.tags
    );
    Ok(())
}

async fn run(ctx: &AppContext, command: Commands) -> Result<()> {
    let modified = match command {
        Commands::Init { .. } => bail!("init does not take --user"),
        Commands::Record(command) => record_command(ctx, command)?,
        Commands::Tag(command) => tag_command(ctx, command)?,
        Commands::User(command) => user_command(ctx, command)?,
        Commands::Search {
            text,
            tags: tag_filter,
            limit,
            show_passwords,
        } => {
            let records = ctx.records()?.list()?;
            let tags = ctx.tags()?.list()?;
            let query = SearchQuery {
                text: text.unwrap_or_default(),
                required_tag_ids: resolve_tag_ids(&tags, &tag_filter)?,
                limit: limit.unwrap_or(ctx.config().search.result_limit),
            };

            let found = filter_records(&records, &tags, &query);
            for record in &found {
                print_record(record, &tags, show_passwords);
            }
            println!("{} match(es)", found.len());
            false
        }
        Commands::Export { file } => {
            let tags = ctx.tags()?.list()?;
            let count = export_to_csv(&ctx.records()?, &tags, &file)?;
            println!("Exported {} entries to {}", count, file.display());
            false
        }
        Commands::Import { file } => {
            let summary = import_from_csv(&ctx.records()?, &file)?;
            println!(
                "Imported {} entries ({} skipped, {} new tags)",
                summary.imported, summary.skipped, summary.created_tags
            );
            true
        }
        Commands::Backup { restore } => {
            if restore {
                let user_id = ctx.current_user()?.id;
                let secondary = ctx.config().backup.open()?;
                let summary =
                    backup::restore_missing(ctx.repository(), secondary.as_ref(), user_id)?;
                println!(
                    "Restored {} user(s), {} record(s), {} tag(s){}",
                    summary.users,
                    summary.records,
                    summary.tags,
                    if summary.key_restored { " and the key" } else { "" }
                );
            } else {
                snapshot(ctx).await?;
                println!("Backup complete");
            }
            false
        }
    };

    if modified && ctx.config().backup.enabled {
        if let Err(e) = snapshot(ctx).await {
            warn!("Automatic backup failed: {}", e);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .unwrap_or_else(tagvault_core::get_default_config_path);
    let config = Config::load(&config_path)?;

    if let Commands::Init { admin } = &cli.command {
        return init(&config, &config_path, admin);
    }

    let username = cli
        .user
        .ok_or_else(|| anyhow!("--user is required for this command"))?;
    let ctx = login(config, &username)?;
    let outcome = run(&ctx, cli.command).await;
    ctx.logout();
    outcome
}
