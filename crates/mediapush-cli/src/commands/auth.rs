//! Auth commands - login, logout and status
//!
//! `login` runs the OAuth2 PKCE flow against the configured authorization
//! server and stores the resulting credential in the state database.

use anyhow::Result;
use clap::Subcommand;
use serde_json::json;

use mediapush_core::domain::CredentialState;

use crate::context::AppContext;
use crate::output::{OutputFormat, OutputFormatter};

#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Authorize MediaPush with the content store
    Login,
    /// Remove the stored credential
    Logout,
    /// Show the credential state
    Status,
}

impl AuthCommand {
    pub async fn execute(
        &self,
        ctx: &AppContext,
        format: OutputFormat,
        fmt: &dyn OutputFormatter,
    ) -> Result<()> {
        match self {
            AuthCommand::Login => Self::login(ctx, format, fmt).await,
            AuthCommand::Logout => Self::logout(ctx, format, fmt).await,
            AuthCommand::Status => Self::status(ctx, format, fmt).await,
        }
    }

    async fn login(ctx: &AppContext, format: OutputFormat, fmt: &dyn OutputFormatter) -> Result<()> {
        let settings = ctx.oauth_settings()?;
        let credentials = ctx.credentials()?;

        let credential = mediapush_remote::auth::login(&settings).await?;
        let expires_at = credential.expires_at();
        credentials.authorize(credential).await?;

        if format == OutputFormat::Json {
            fmt.print_json(&json!({
                "state": CredentialState::Authenticated.as_str(),
                "expires_at": expires_at.to_rfc3339(),
            }));
        } else {
            fmt.success("Logged in");
            fmt.info(&format!(
                "Access token valid until {}",
                expires_at.format("%Y-%m-%d %H:%M:%S UTC")
            ));
        }
        Ok(())
    }

    async fn logout(ctx: &AppContext, format: OutputFormat, fmt: &dyn OutputFormatter) -> Result<()> {
        ctx.offline_credentials().logout().await?;
        if format == OutputFormat::Json {
            fmt.print_json(&json!({ "state": CredentialState::Unauthenticated.as_str() }));
        } else {
            fmt.success("Logged out");
        }
        Ok(())
    }

    async fn status(ctx: &AppContext, format: OutputFormat, fmt: &dyn OutputFormatter) -> Result<()> {
        let state = ctx.offline_credentials().state().await;
        let client_configured = ctx.oauth_settings().is_ok();

        if format == OutputFormat::Json {
            fmt.print_json(&json!({
                "state": state.as_str(),
                "can_upload": state.can_upload(),
                "client_configured": client_configured,
            }));
            return Ok(());
        }

        if state.can_upload() {
            fmt.success(&format!("Credential: {state}"));
        } else {
            fmt.warn(&format!("Credential: {state}"));
            fmt.info("Run 'mediapush auth login' to authorize");
        }
        if !client_configured {
            fmt.warn("auth.client_id is not configured");
        }
        Ok(())
    }
}
