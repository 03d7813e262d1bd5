use clap::Args;
use serde_json::json;

use crate::cli::utils::output_success;
use crate::cli::{connect, OutputFormat};
use crate::services::role_service::SeedAdmin;
use crate::validation::normalize_email;

#[derive(Args, Debug)]
pub struct SeedArgs {
    #[arg(long, env = "ADMIN_EMAIL", default_value = "admin@bidashboard.com")]
    pub admin_email: String,

    #[arg(long, env = "ADMIN_PASSWORD", default_value = "admin123456", hide_env_values = true)]
    pub admin_password: String,

    #[arg(long, env = "ADMIN_NAME", default_value = "Super Administrator")]
    pub admin_name: String,
}

/// Safe to repeat: existing permissions, roles and the admin account are reused
pub async fn handle(args: SeedArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let (manager, services) = connect()?;

    let admin = SeedAdmin {
        email: normalize_email(&args.admin_email),
        password: args.admin_password,
        full_name: args.admin_name,
    };
    let result = services.roles.seed(&admin).await;
    manager.close().await;
    let report = result?;

    tracing::info!(
        "seeded {} permissions, created roles {:?}",
        report.permissions,
        report.roles_created
    );

    let message = if report.admin_created {
        format!("Seed complete. Super administrator {} created", admin.email)
    } else {
        format!("Seed complete. Super administrator {} already present", admin.email)
    };
    output_success(&output_format, &message, Some(json!({ "seed": report })))
}
