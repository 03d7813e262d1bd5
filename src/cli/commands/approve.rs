use clap::Args;
use serde_json::json;

use crate::cli::utils::output_success;
use crate::cli::{connect, OutputFormat};
use crate::validation::normalize_email;

#[derive(Args, Debug)]
pub struct ApproveArgs {
    /// Email of the pending account
    pub email: String,
}

pub async fn handle(args: ApproveArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let (manager, services) = connect()?;
    let email = normalize_email(&args.email);

    let result = services.users.approve_email(&email).await;
    manager.close().await;
    let user = result?;

    output_success(
        &output_format,
        &format!("Approved {}", user.email),
        Some(json!({ "user": { "id": user.id, "email": user.email, "status": user.status } })),
    )
}
