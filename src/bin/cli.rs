//! RBAC Manager CLI - Main entry point for the CLI binary
//!
//! Manages roles, permissions, hierarchy and user assignments stored in a
//! project's SQLite database.

use anyhow::{bail, Context, Result};
use clap::Parser;
use rbac_manager_lib::engine::{
    cli::{
        formatter::{describe, CliFormatter},
        ChildAction, Cli, Commands, ItemAction, OutputFormat,
    },
    config::{RbacConfig, CONFIG_FILE},
    database::Database,
    rbac::{
        AuthItem, DefaultRoles, Item, ItemFactory, ItemType, Manager, Parameters, SqliteStorage,
        Storage,
    },
};
use serde_json::json;
use std::path::Path;
use tracing_subscriber::EnvFilter;

type SqliteManager = Manager<SqliteStorage>;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run_cli(cli) {
        CliFormatter::error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn run_cli(cli: Cli) -> Result<()> {
    let project_dir = cli.get_project_dir();
    let json_output = cli.format == OutputFormat::Json;
    let open = || open_manager(&project_dir);

    match cli.command {
        Commands::Init { default_roles } => cmd_init(&project_dir, &default_roles, json_output),
        Commands::Role { action } => cmd_item(&open()?, ItemType::Role, action, json_output),
        Commands::Permission { action } => cmd_item(&open()?, ItemType::Permission, action, json_output),
        Commands::Child { action } => cmd_child(&open()?, action, json_output),
        Commands::Assign { user, item } => cmd_assign(&open()?, &user, &item, json_output),
        Commands::Revoke { user, item, all } => cmd_revoke(&open()?, &user, item.as_deref(), all, json_output),
        Commands::Check { user, permission } => cmd_check(&open()?, &user, &permission, json_output),
        Commands::User { user } => cmd_user(&open()?, &user, json_output),
        Commands::Members { role } => cmd_members(&open()?, &role, json_output),
    }
}

fn open_manager(project_dir: &Path) -> Result<SqliteManager> {
    let config = RbacConfig::load(project_dir)
        .with_context(|| format!("No RBAC project in {} (run `rbac init`)", project_dir.display()))?;

    let db = Database::new(&config.database_path(project_dir), config.tables.clone())?;
    let manager = Manager::with_default_roles(SqliteStorage::new(db), DefaultRoles::Value(config.default_roles))?;
    Ok(manager)
}

fn lookup(manager: &SqliteManager, name: &str) -> Result<Item> {
    manager
        .storage()
        .get_item_by_name(name)?
        .with_context(|| format!("Unknown item \"{}\"", name))
}

fn lookup_typed(manager: &SqliteManager, item_type: ItemType, name: &str) -> Result<Item> {
    manager
        .storage()
        .get_item_by_name(name)?
        .filter(|item| item.item_type() == item_type)
        .with_context(|| format!("Unknown {} \"{}\"", item_type, name))
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_init(project_dir: &Path, default_roles: &[String], json: bool) -> Result<()> {
    if project_dir.join(CONFIG_FILE).exists() {
        bail!("Project already initialized: {}", project_dir.display());
    }
    std::fs::create_dir_all(project_dir)?;

    let mut config = RbacConfig::default_for_project();
    config.default_roles = json!(default_roles);
    config.save(project_dir)?;

    let db_path = config.database_path(project_dir);
    Database::new(&db_path, config.tables.clone())?;

    if json {
        print_json(&json!({
            "success": true,
            "project_dir": project_dir.display().to_string(),
            "database": db_path.display().to_string(),
        }))
    } else {
        CliFormatter::success(&format!("Initialized RBAC project in {}", project_dir.display()));
        CliFormatter::info(&format!("Database: {}", db_path.display()));
        Ok(())
    }
}

fn cmd_item(manager: &SqliteManager, item_type: ItemType, action: ItemAction, json: bool) -> Result<()> {
    match action {
        ItemAction::Add { name, description } => {
            let item = ItemFactory::create(item_type.as_str(), &name)?.with_description(description);
            match item {
                Item::Role(role) => manager.add_role(role)?,
                Item::Permission(permission) => manager.add_permission(permission)?,
            }
            report(json, &format!("Added {} \"{}\"", item_type, name))
        }
        ItemAction::Remove { name } => {
            match lookup_typed(manager, item_type, &name)? {
                Item::Role(role) => manager.remove_role(&role)?,
                Item::Permission(permission) => manager.remove_permission(&permission)?,
            }
            report(json, &format!("Removed {} \"{}\"", item_type, name))
        }
        ItemAction::Rename { name, new_name } => {
            match lookup_typed(manager, item_type, &name)?.with_name(new_name.as_str()) {
                Item::Role(role) => manager.update_role(&name, role)?,
                Item::Permission(permission) => manager.update_permission(&name, permission)?,
            }
            report(json, &format!("Renamed {} \"{}\" to \"{}\"", item_type, name, new_name))
        }
        ItemAction::List => {
            let items: Vec<Item> = match item_type {
                ItemType::Role => manager.storage().get_roles()?.into_values().map(Item::from).collect(),
                ItemType::Permission => manager
                    .storage()
                    .get_permissions()?
                    .into_values()
                    .map(Item::from)
                    .collect(),
            };

            if json {
                return print_json(&serde_json::to_value(&items)?);
            }
            CliFormatter::header(if item_type == ItemType::Role { "Roles" } else { "Permissions" });
            if items.is_empty() {
                CliFormatter::item("(none)");
            }
            for item in &items {
                CliFormatter::item(&describe(item.name(), item.description()));
            }
            Ok(())
        }
    }
}

fn cmd_child(manager: &SqliteManager, action: ChildAction, json: bool) -> Result<()> {
    match action {
        ChildAction::Add { parent, child } => {
            manager.add_child(&lookup(manager, &parent)?, &lookup(manager, &child)?)?;
            report(json, &format!("\"{}\" is now a child of \"{}\"", child, parent))
        }
        ChildAction::Remove { parent, child } => {
            manager.remove_child(&lookup(manager, &parent)?, &lookup(manager, &child)?)?;
            report(json, &format!("\"{}\" is no longer a child of \"{}\"", child, parent))
        }
        ChildAction::Clear { parent } => {
            manager.remove_children(&lookup(manager, &parent)?)?;
            report(json, &format!("Removed all children of \"{}\"", parent))
        }
        ChildAction::List { role } => {
            let roles = manager.get_child_roles(&role)?;
            let permissions = manager.get_permissions_by_role(&role)?;

            if json {
                return print_json(&json!({
                    "role": role,
                    "roles": roles.keys().collect::<Vec<_>>(),
                    "permissions": permissions.keys().collect::<Vec<_>>(),
                }));
            }
            CliFormatter::header(&format!("Roles under {}", role));
            CliFormatter::names(roles.keys());
            CliFormatter::header(&format!("Permissions under {}", role));
            CliFormatter::names(permissions.keys());
            Ok(())
        }
    }
}

fn cmd_assign(manager: &SqliteManager, user: &str, item: &str, json: bool) -> Result<()> {
    let assignment = manager.assign(&lookup(manager, item)?, user)?;

    if json {
        print_json(&serde_json::to_value(&assignment)?)
    } else {
        CliFormatter::success(&format!("Assigned \"{}\" to user {}", assignment.item_name, user));
        Ok(())
    }
}

fn cmd_revoke(manager: &SqliteManager, user: &str, item: Option<&str>, all: bool, json: bool) -> Result<()> {
    match item {
        Some(name) if !all => {
            manager.revoke(&lookup(manager, name)?, user)?;
            report(json, &format!("Revoked \"{}\" from user {}", name, user))
        }
        _ => {
            manager.revoke_all(user)?;
            report(json, &format!("Revoked all assignments from user {}", user))
        }
    }
}

fn cmd_check(manager: &SqliteManager, user: &str, permission: &str, json: bool) -> Result<()> {
    let allowed = manager.user_has_permission(user, permission, &Parameters::new())?;

    if json {
        return print_json(&json!({
            "user": user,
            "permission": permission,
            "allowed": allowed,
        }));
    }
    if allowed {
        CliFormatter::success(&format!("User {} has \"{}\"", user, permission));
    } else {
        CliFormatter::denied(&format!("User {} does not have \"{}\"", user, permission));
    }
    Ok(())
}

fn cmd_user(manager: &SqliteManager, user: &str, json: bool) -> Result<()> {
    let roles = manager.get_roles_by_user(user)?;
    let permissions = manager.get_grouped_permissions_by_user(user)?;

    if json {
        return print_json(&json!({
            "user": user,
            "roles": roles.keys().collect::<Vec<_>>(),
            "direct_permissions": permissions.direct.keys().collect::<Vec<_>>(),
            "inherited_permissions": permissions.inherited.keys().collect::<Vec<_>>(),
        }));
    }
    CliFormatter::header(&format!("User {}", user));
    CliFormatter::info("Roles");
    CliFormatter::names(roles.keys());
    CliFormatter::info("Direct permissions");
    CliFormatter::names(permissions.direct.keys());
    CliFormatter::info("Inherited permissions");
    CliFormatter::names(permissions.inherited.keys());
    Ok(())
}

fn cmd_members(manager: &SqliteManager, role: &str, json: bool) -> Result<()> {
    let users = manager.get_user_ids_by_role(role)?;

    if json {
        return print_json(&json!({ "role": role, "users": users }));
    }
    CliFormatter::header(&format!("Users holding {}", role));
    CliFormatter::names(users.iter());
    Ok(())
}

fn report(json: bool, message: &str) -> Result<()> {
    if json {
        print_json(&json!({ "success": true, "message": message }))
    } else {
        CliFormatter::success(message);
        Ok(())
    }
}
