//! Rolegate CLI - Main entry point for CLI binary
//!
//! This binary provides the `rolegate` CLI tool for provisioning modules and
//! managing roles, and serves the REST API.

use clap::Parser;
use rolegate_lib::engine::{
    api::{create_router, ApiState},
    cli::{
        formatter::{format_flags, format_mask, CliFormatter},
        Cli, Commands, ModuleAction, OutputFormat, ResourceAction, RoleAction,
    },
    config::{Config, CONFIG_FILE},
    database::Database,
    logging::init_logging,
    rbac::{ModuleRegistry, RegistryAdmin, RoleInput, RoleService, RoleUpdate, RoleView},
};
use serde_json::Value;
use std::path::Path;

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn main() {
    let cli = Cli::parse();

    let default_filter = match cli.command {
        Commands::Serve { .. } => "info",
        _ => "warn",
    };
    init_logging(default_filter);

    if let Err(e) = run_cli(cli) {
        CliFormatter::error(&format!("Error: {}", e));
        std::process::exit(1);
    }
}

fn run_cli(cli: Cli) -> CliResult {
    let project_dir = cli.get_project_dir();
    let json_output = cli.format == OutputFormat::Json;

    match cli.command {
        Commands::Init { name } => {
            cmd_init(&project_dir, name, json_output)?;
        }
        Commands::Serve { port, host } => {
            cmd_serve(&project_dir, host, port)?;
        }
        Commands::Status => {
            cmd_status(&project_dir, json_output)?;
        }
        Commands::Module { action } => {
            cmd_module(action, &project_dir, json_output)?;
        }
        Commands::Resource { action } => {
            cmd_resource(action, &project_dir, json_output)?;
        }
        Commands::Role { action } => {
            cmd_role(action, &project_dir, json_output)?;
        }
    }

    Ok(())
}

fn open_project(project_dir: &Path) -> Result<(Config, Database), Box<dyn std::error::Error>> {
    let config = Config::load(project_dir)?;
    let db = Database::new(&config.database_path(project_dir))?;
    Ok((config, db))
}

fn open_service(project_dir: &Path) -> Result<RoleService, Box<dyn std::error::Error>> {
    let (config, db) = open_project(project_dir)?;
    Ok(RoleService::new(db, config.permissions.codenames)?)
}

fn print_json(value: &impl serde::Serialize) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_init(project_dir: &Path, name: Option<String>, json: bool) -> CliResult {
    if project_dir.join(CONFIG_FILE).exists() {
        return Err(format!("Project already initialized: {}", project_dir.display()).into());
    }

    std::fs::create_dir_all(project_dir)?;
    let name = match name {
        Some(name) => name,
        None => project_dir
            .canonicalize()?
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or("Could not derive a project name, pass --name")?,
    };

    let config = Config::default_for_project(&name);
    config.save(project_dir)?;

    let gitignore = "# Rolegate\ndata/*.db\ndata/*.db-*\n*.log\n";
    std::fs::write(project_dir.join(".gitignore"), gitignore)?;

    let db_path = config.database_path(project_dir);
    let _db = Database::new(&db_path)?;

    if json {
        println!("{}", serde_json::json!({
            "success": true,
            "project_dir": project_dir.display().to_string(),
            "name": name,
            "database": db_path.display().to_string(),
        }));
    } else {
        CliFormatter::success(&format!("Created Rolegate project: {}", name));
        CliFormatter::kv("Directory", &project_dir.display().to_string());
        CliFormatter::kv("Database", &db_path.display().to_string());
        CliFormatter::header("Next steps");
        CliFormatter::item("rolegate module add Billing");
        CliFormatter::item("rolegate resource add billing.invoice --module Billing");
        CliFormatter::item("rolegate serve");
    }

    Ok(())
}

#[tokio::main]
async fn cmd_serve(project_dir: &Path, host: Option<String>, port: Option<u16>) -> CliResult {
    let (config, db) = open_project(project_dir)?;
    let roles = RoleService::new(db, config.permissions.codenames.clone())?;
    let modules = roles.registry()?.len();

    let state = ApiState::new(roles);
    let app = create_router(state);

    let addr = format!(
        "{}:{}",
        host.unwrap_or(config.api.host),
        port.unwrap_or(config.api.port)
    );
    CliFormatter::header("Rolegate API Server");
    CliFormatter::kv("Project", &config.project.name);
    CliFormatter::kv("Modules", &modules.to_string());
    CliFormatter::kv("Listening", &format!("http://{}", addr));
    CliFormatter::info("Press Ctrl+C to stop");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn cmd_status(project_dir: &Path, json: bool) -> CliResult {
    let (config, db) = open_project(project_dir)?;
    let stats = db.stats()?;

    if json {
        println!("{}", serde_json::json!({
            "project": config.project.name,
            "database": config.database.db_type,
            "database_path": config.database.path.display().to_string(),
            "api_port": config.api.port,
            "codenames": config.permissions.codenames,
            "counts": stats,
        }));
    } else {
        CliFormatter::header("Rolegate Project Status");
        CliFormatter::kv("Project", &config.project.name);
        CliFormatter::kv(
            "Database",
            &format!("{} ({})", config.database.db_type, config.database.path.display()),
        );
        CliFormatter::kv("API Port", &config.api.port.to_string());
        CliFormatter::kv("Roles", &stats.roles.to_string());
        CliFormatter::kv("Modules", &stats.modules.to_string());
        CliFormatter::kv("Resource types", &stats.resource_types.to_string());
        CliFormatter::kv("Access grants", &stats.grants.to_string());
        CliFormatter::kv("Role permissions", &stats.role_permissions.to_string());
    }

    Ok(())
}

fn cmd_module(action: ModuleAction, project_dir: &Path, json: bool) -> CliResult {
    let (config, db) = open_project(project_dir)?;
    let admin = RegistryAdmin::new(&config.permissions.codenames);
    let mut conn = db.get_connection()?;

    match action {
        ModuleAction::List => {
            let registry = ModuleRegistry::load(&conn)?;
            if json {
                print_json(&registry.modules().collect::<Vec<_>>())?;
            } else if registry.is_empty() {
                CliFormatter::info("No modules registered");
            } else {
                CliFormatter::table_header(&["Module", "Resource types"]);
                for module in registry.modules() {
                    let resource_types = module
                        .resource_types
                        .iter()
                        .map(|rt| rt.to_string())
                        .collect::<Vec<_>>()
                        .join(", ");
                    CliFormatter::table_row(&[&module.name, &resource_types]);
                }
            }
        }
        ModuleAction::Add { name } => {
            let id = admin.create_module(&conn, &name)?;
            if json {
                println!("{}", serde_json::json!({ "success": true, "id": id, "name": name.trim() }));
            } else {
                CliFormatter::success(&format!("Created module {}", name.trim()));
            }
        }
        ModuleAction::Remove { name } => {
            let report = admin.delete_module(&mut conn, &name)?;
            if json {
                println!("{}", serde_json::json!({ "success": true, "name": name, "revoked": report.revoked }));
            } else {
                CliFormatter::success(&format!(
                    "Deleted module {} ({} permission(s) revoked)",
                    name, report.revoked
                ));
            }
        }
        ModuleAction::Assign { module, resource_type } => {
            let report = admin.assign(&mut conn, &module, &resource_type)?;
            if json {
                println!("{}", serde_json::json!({
                    "success": true,
                    "module": module,
                    "resource_type": resource_type.to_string(),
                    "granted": report.granted,
                }));
            } else {
                CliFormatter::success(&format!(
                    "Assigned {} to {} ({} permission(s) granted)",
                    resource_type, module, report.granted
                ));
            }
        }
        ModuleAction::Unassign { module, resource_type } => {
            let report = admin.unassign(&mut conn, &module, &resource_type)?;
            if json {
                println!("{}", serde_json::json!({
                    "success": true,
                    "module": module,
                    "resource_type": resource_type.to_string(),
                    "revoked": report.revoked,
                }));
            } else {
                CliFormatter::success(&format!(
                    "Unassigned {} from {} ({} permission(s) revoked)",
                    resource_type, module, report.revoked
                ));
            }
        }
    }

    Ok(())
}

fn cmd_resource(action: ResourceAction, project_dir: &Path, json: bool) -> CliResult {
    let (config, db) = open_project(project_dir)?;
    let admin = RegistryAdmin::new(&config.permissions.codenames);
    let mut conn = db.get_connection()?;

    match action {
        ResourceAction::Add { resource_type, module } => {
            let codenames = admin.register_resource_type(&mut conn, &resource_type)?;
            if let Some(module) = &module {
                admin.assign(&mut conn, module, &resource_type)?;
            }
            if json {
                println!("{}", serde_json::json!({
                    "success": true,
                    "resource_type": resource_type.to_string(),
                    "module": module,
                    "codenames": codenames,
                }));
            } else {
                CliFormatter::success(&format!("Registered {}", resource_type));
                for codename in &codenames {
                    CliFormatter::item(codename);
                }
                if let Some(module) = module {
                    CliFormatter::kv("Module", &module);
                }
            }
        }
        ResourceAction::List => {
            let entries = admin.list_resource_types(&conn)?;
            if json {
                print_json(&entries)?;
            } else if entries.is_empty() {
                CliFormatter::info("No resource types registered");
            } else {
                CliFormatter::table_header(&["Resource type", "Module"]);
                for entry in &entries {
                    CliFormatter::table_row(&[
                        &entry.resource_type.to_string(),
                        entry.module.as_deref().unwrap_or("-"),
                    ]);
                }
            }
        }
    }

    Ok(())
}

fn cmd_role(action: RoleAction, project_dir: &Path, json: bool) -> CliResult {
    let service = open_service(project_dir)?;

    match action {
        RoleAction::List => {
            let roles = service.list_roles()?;
            if json {
                print_json(&roles)?;
            } else if roles.is_empty() {
                CliFormatter::info("No roles defined");
            } else {
                CliFormatter::table_header(&["ID", "Name", "Modules"]);
                for role in &roles {
                    let modules = role.access.keys().cloned().collect::<Vec<_>>().join(", ");
                    CliFormatter::table_row(&[&role.id.to_string(), &role.name, &modules]);
                }
            }
        }
        RoleAction::Show { id } => {
            let role = service.get_role(id)?;
            if json {
                print_json(&role)?;
            } else {
                print_role(&role);
            }
        }
        RoleAction::Create { name, access } => {
            let access = access.as_deref().map(parse_access).transpose()?;
            let role = service.create_role(RoleInput { name, access })?;
            if json {
                print_json(&role)?;
            } else {
                CliFormatter::success(&format!("Created role {} (id {})", role.name, role.id));
                print_role(&role);
            }
        }
        RoleAction::SetAccess { id, access, module, actions } => {
            let changes = match (access, module, actions) {
                (Some(access), _, _) => {
                    let decoded = service.decode(&parse_access(&access)?)?;
                    service.apply_access(id, &decoded)?
                }
                (None, Some(module), Some(mask)) => vec![service.set_module_access(id, &module, mask)?],
                _ => return Err("Pass --access, or --module together with --actions".into()),
            };
            if json {
                print_json(&changes)?;
            } else {
                for change in &changes {
                    CliFormatter::success(&format!(
                        "{}: {} [{}] (+{} / -{})",
                        change.module,
                        change.outcome,
                        format_mask(change.mask),
                        change.report.granted,
                        change.report.revoked
                    ));
                }
            }
        }
        RoleAction::Rename { id, name } => {
            let role = service.update_role(id, RoleUpdate { name: Some(name), access: None })?;
            if json {
                print_json(&role)?;
            } else {
                CliFormatter::success(&format!("Renamed role {} to {}", role.id, role.name));
            }
        }
        RoleAction::Delete { id } => {
            service.delete_role(id)?;
            if json {
                println!("{}", serde_json::json!({ "success": true, "id": id }));
            } else {
                CliFormatter::success(&format!("Deleted role {}", id));
            }
        }
    }

    Ok(())
}

fn parse_access(raw: &str) -> Result<Value, Box<dyn std::error::Error>> {
    serde_json::from_str(raw).map_err(|e| format!("Access payload is not valid JSON: {}", e).into())
}

fn print_role(role: &RoleView) {
    CliFormatter::header(&format!("{} (id {})", role.name, role.id));
    if role.access.is_empty() {
        CliFormatter::info("No module access");
        return;
    }
    for (module, flags) in &role.access {
        CliFormatter::kv(module, &format_flags(flags));
    }
}
