//! pathmap command-line tool.
//!
//! Inspects how configured mappers translate traversal path segments into
//! stored users and groups, and manages the object store those lookups run
//! against.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::Table;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use pathmap_core::config::AppConfig;
use pathmap_core::db::Database;
use pathmap_core::mapper::{Mapped, ObjectId};
use pathmap_core::models::User;
use pathmap_core::slug;
use pathmap_core::traversal::{resolve_segment, MapperRegistry, Resolved};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// pathmap command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "pathmap",
    version,
    about = "Inspect URL traversal path <-> object id mappings"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, default_value = "./pathmap.toml")]
    config: PathBuf,

    /// Log at debug level (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./pathmap.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,

    /// Resolve a path segment to an object or a view name.
    Resolve {
        /// Resource name, e.g. `users`.
        resource: String,
        /// Path segment to resolve.
        segment: String,
    },

    /// Print the path segment of a stored object.
    Path {
        /// Resource name, e.g. `users`.
        resource: String,
        /// Row id of the object.
        id: i64,
    },

    /// Manage stored users.
    Users {
        #[command(subcommand)]
        action: UsersAction,
    },

    /// Encode or decode UUID slugs.
    Slug {
        #[command(subcommand)]
        action: SlugAction,
    },
}

#[derive(Subcommand, Debug)]
enum UsersAction {
    /// Add a user. The first user added becomes an admin.
    Add {
        email: String,
        #[arg(long)]
        full_name: Option<String>,
        /// Mark the user as activated immediately.
        #[arg(long)]
        activate: bool,
    },
    /// List stored users.
    List {
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
    /// Show one user as JSON.
    Show { id: i64 },
}

#[derive(Subcommand, Debug)]
enum SlugAction {
    /// UUID to slug.
    Encode { uuid: uuid::Uuid },
    /// Slug to UUID.
    Decode { slug: String },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose.
    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .without_time()
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { output } => cmd_init(&output),
        Commands::Validate => cmd_validate(&cli.config),
        Commands::Slug { action } => cmd_slug(action),
        command => {
            let config = load_config(&cli.config)?;
            let db = open_database(&config)?;
            let registry = MapperRegistry::from_config(&config);

            match command {
                Commands::Resolve { resource, segment } => {
                    cmd_resolve(&db, &registry, &resource, &segment)
                }
                Commands::Path { resource, id } => cmd_path(&db, &registry, &resource, id),
                Commands::Users { action } => cmd_users(&db, action),
                Commands::Init { .. } | Commands::Validate | Commands::Slug { .. } => {
                    unreachable!()
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<AppConfig> {
    let config = AppConfig::load_and_validate(path).context("failed to load configuration file")?;
    debug!(resources = config.resources.len(), "configuration loaded");
    Ok(config)
}

fn open_database(config: &AppConfig) -> Result<Database> {
    let db = Database::new(config.database_path()).context("failed to open database")?;
    db.initialize().context("failed to initialize database")?;
    Ok(db)
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_init(output: &Path) -> Result<()> {
    let default_config = r#"# pathmap configuration

[store]
data_dir = "/var/lib/pathmap"

# One entry per traversable resource.
# mapper = "id"           integer ids, numeric segments only
# mapper = "base64_uuid"  UUID slugs, every segment is looked up
[resources.users]
mapper = "id"

[resources.groups]
mapper = "base64_uuid"
"#;

    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, default_config).context("failed to write config file")?;

    println!("Default configuration written to {}", output.display());
    println!("Validate with: pathmap validate --config {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let config = AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    match config.validate() {
        Ok(()) => println!("  [OK] All required fields are valid"),
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    let registry = MapperRegistry::from_config(&config);
    println!();
    println!("Resources:");
    for name in registry.resource_names() {
        let mapper = registry.get(name)?;
        println!("  {:<12}: {:?} (attribute '{}')", name, config.resources[name].mapper, mapper.mapping_attribute());
    }
    println!();
    println!("  Database      : {}", config.database_path().display());
    println!();
    println!("Configuration is valid.");
    Ok(())
}

fn cmd_resolve(db: &Database, registry: &MapperRegistry, resource: &str, segment: &str) -> Result<()> {
    let mapper = registry.get(resource)?;

    let rendered = match resource {
        "users" => match resolve_segment(mapper.as_ref(), &db.users(), segment)? {
            Resolved::Object(user) => Some(serde_json::to_string_pretty(&user)?),
            Resolved::View(_) => None,
        },
        "groups" => match resolve_segment(mapper.as_ref(), &db.groups(), segment)? {
            Resolved::Object(group) => Some(serde_json::to_string_pretty(&group)?),
            Resolved::View(_) => None,
        },
        other => anyhow::bail!("resource '{}' has no object store", other),
    };

    match rendered {
        Some(json) => println!("{}", json),
        None => println!("view: {}", segment),
    }
    Ok(())
}

fn cmd_path(db: &Database, registry: &MapperRegistry, resource: &str, id: i64) -> Result<()> {
    let mapper = registry.get(resource)?;
    let key = ObjectId::Int(id);

    let object: Box<dyn Mapped> = match resource {
        "users" => Box::new(
            db.find_user("id", &key)?
                .with_context(|| format!("user {} not found", id))?,
        ),
        "groups" => Box::new(
            db.find_group("id", &key)?
                .with_context(|| format!("group {} not found", id))?,
        ),
        other => anyhow::bail!("resource '{}' has no object store", other),
    };

    let segment = mapper
        .get_path_from_object(object.as_ref())
        .context("failed to map object to path")?;
    println!("/{}/{}", resource, segment);
    Ok(())
}

fn cmd_users(db: &Database, action: UsersAction) -> Result<()> {
    match action {
        UsersAction::Add {
            email,
            full_name,
            activate,
        } => {
            let mut user = User::new(email);
            user.full_name = full_name;
            user.registration_source = Some(User::USER_MEDIA_DUMMY.to_string());

            let (stored, admin) = db
                .register_user(&user, activate)
                .context("failed to add user")?;

            println!("Added user {} ({})", stored.id, stored.friendly_name());
            if admin {
                println!("First user on the site: granted '{}' group", User::GROUP_ADMIN);
            }
            Ok(())
        }
        UsersAction::List { limit } => {
            let users = db.list_users(limit).context("failed to list users")?;
            if users.is_empty() {
                println!("No users.");
                return Ok(());
            }

            let mut table = Table::new();
            table.set_header(vec!["ID", "Slug", "Name", "Email", "Can login", "Admin"]);
            for user in &users {
                table.add_row(vec![
                    user.id.to_string(),
                    slug::uuid_to_slug(&user.uuid),
                    user.friendly_name().to_string(),
                    user.email.clone(),
                    yes_no(user.can_login()).to_string(),
                    yes_no(user.is_admin()).to_string(),
                ]);
            }
            println!("{table}");
            Ok(())
        }
        UsersAction::Show { id } => {
            let user = db.get_user(id).context("failed to load user")?;
            println!("{}", serde_json::to_string_pretty(&user)?);
            Ok(())
        }
    }
}

fn cmd_slug(action: SlugAction) -> Result<()> {
    match action {
        SlugAction::Encode { uuid } => println!("{}", slug::uuid_to_slug(&uuid)),
        SlugAction::Decode { slug: s } => {
            let uuid = slug::slug_to_uuid(&s).context("not a valid slug")?;
            println!("{}", uuid);
        }
    }
    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
