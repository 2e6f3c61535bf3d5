//! `user` subcommand: operator accounts and their tokens.

use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand, ValueEnum};
use serial_vault::auth::{JwtManager, Role};
use serial_vault::storage::{UserParams, VaultDatabase};
use serial_vault_crypto::random::generate_api_key;
use tracing::info;

#[derive(Debug, Args)]
pub struct UserArgs {
    #[command(subcommand)]
    pub command: UserCommand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RoleArg {
    Standard,
    Admin,
    Superuser,
    Syncuser,
}

impl From<RoleArg> for Role {
    fn from(arg: RoleArg) -> Self {
        match arg {
            RoleArg::Standard => Self::Standard,
            RoleArg::Admin => Self::Admin,
            RoleArg::Superuser => Self::Superuser,
            RoleArg::Syncuser => Self::SyncUser,
        }
    }
}

#[derive(Debug, Args)]
pub struct UserFields {
    /// Display name
    #[arg(long, default_value = "")]
    pub name: String,

    #[arg(long, default_value = "")]
    pub email: String,

    #[arg(long, value_enum, default_value = "standard")]
    pub role: RoleArg,

    /// Comma-separated authority ids the user may act for
    #[arg(long, value_delimiter = ',')]
    pub accounts: Vec<String>,

    /// API key for sync and device calls (generated when omitted)
    #[arg(long)]
    pub api_key: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum UserCommand {
    /// Create a user
    Add {
        username: String,
        #[command(flatten)]
        fields: UserFields,
    },
    /// List users
    List,
    /// Replace a user's details
    Update {
        username: String,
        #[command(flatten)]
        fields: UserFields,
    },
    /// Delete a user
    Delete { username: String },
    /// Issue an operator token for a user
    Token { username: String },
}

fn params(username: &str, fields: UserFields, current_key: Option<String>) -> Result<UserParams> {
    let username = username.trim();
    if username.is_empty() {
        bail!("username must not be empty");
    }
    let api_key = fields
        .api_key
        .filter(|k| !k.is_empty())
        .or(current_key)
        .unwrap_or_else(generate_api_key);
    Ok(UserParams {
        username: username.to_string(),
        name: fields.name,
        email: fields.email,
        role: Role::from(fields.role).level(),
        api_key,
        accounts: fields.accounts.into_iter().filter(|a| !a.is_empty()).collect(),
    })
}

/// Apply one user command against `db`.
pub async fn execute(command: UserCommand, db: &VaultDatabase, jwt: &JwtManager) -> Result<Vec<String>> {
    let mut out = Vec::new();
    match command {
        UserCommand::Add { username, fields } => {
            let user = db.create_user(&params(&username, fields, None)?).await?;
            info!(username = %user.username, "User created");
            out.push(format!("{} {}", user.username, user.api_key));
        }
        UserCommand::List => {
            for user in db.list_users().await? {
                let accounts = db.list_user_accounts(user.id).await?;
                out.push(format!(
                    "{}\t{:?}\t{}\t{}",
                    user.username,
                    user.role(),
                    user.email,
                    accounts.join(",")
                ));
            }
        }
        UserCommand::Update { username, fields } => {
            let existing = db.get_user_by_username(&username).await?;
            let params = params(&username, fields, Some(existing.api_key))?;
            db.update_user(existing.id, &params).await?;
            info!(username = %username, "User updated");
        }
        UserCommand::Delete { username } => {
            let existing = db.get_user_by_username(&username).await?;
            db.delete_user(existing.id).await?;
            info!(username = %username, "User deleted");
        }
        UserCommand::Token { username } => {
            let user = db.get_user_by_username(&username).await?;
            let (token, _exp) = jwt.issue_token(&user).context("Failed to issue token")?;
            out.push(token);
        }
    }
    Ok(out)
}

#[allow(clippy::print_stdout)]
pub async fn run(args: UserArgs, config_path: Option<&Path>) -> Result<()> {
    let (config, db) = crate::database::open(config_path).await?;
    if matches!(args.command, UserCommand::Token { .. }) && config.server.jwt_secret.is_empty() {
        bail!("server.jwt_secret must be set to issue tokens");
    }
    let jwt = JwtManager::new(config.server.jwt_secret.as_bytes(), config.server.jwt_ttl_secs);
    for line in execute(args.command, &db, &jwt).await? {
        println!("{line}");
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn fields(role: RoleArg, accounts: &[&str]) -> UserFields {
        UserFields {
            name: "Ops".into(),
            email: "ops@example.com".into(),
            role,
            accounts: accounts.iter().map(|a| (*a).to_string()).collect(),
            api_key: None,
        }
    }

    #[tokio::test]
    async fn add_generates_api_key_and_token_validates() {
        let db = VaultDatabase::open_in_memory().await.unwrap();
        db.put_account("system", "text", false).await.unwrap();
        let jwt = JwtManager::new(b"secret", 60);

        let out = execute(
            UserCommand::Add {
                username: "ops".into(),
                fields: fields(RoleArg::Admin, &["system"]),
            },
            &db,
            &jwt,
        )
        .await
        .unwrap();
        let api_key = out[0].split(' ').nth(1).unwrap();
        assert_eq!(api_key.len(), 40);

        let user = db.get_user_by_username("ops").await.unwrap();
        assert_eq!(user.role(), Role::Admin);
        assert_eq!(db.list_user_accounts(user.id).await.unwrap(), vec!["system"]);

        let out = execute(UserCommand::Token { username: "ops".into() }, &db, &jwt)
            .await
            .unwrap();
        let claims = jwt.validate(&out[0]).unwrap();
        assert_eq!(claims.sub, user.id.to_string());
    }

    #[tokio::test]
    async fn update_keeps_api_key_when_omitted() {
        let db = VaultDatabase::open_in_memory().await.unwrap();
        let jwt = JwtManager::new(b"secret", 60);
        execute(
            UserCommand::Add {
                username: "ops".into(),
                fields: fields(RoleArg::Standard, &[]),
            },
            &db,
            &jwt,
        )
        .await
        .unwrap();
        let before = db.get_user_by_username("ops").await.unwrap();

        execute(
            UserCommand::Update {
                username: "ops".into(),
                fields: fields(RoleArg::Syncuser, &[]),
            },
            &db,
            &jwt,
        )
        .await
        .unwrap();
        let after = db.get_user_by_username("ops").await.unwrap();
        assert_eq!(after.api_key, before.api_key);
        assert_eq!(after.role(), Role::SyncUser);
    }

    #[tokio::test]
    async fn delete_unknown_user_fails() {
        let db = VaultDatabase::open_in_memory().await.unwrap();
        let jwt = JwtManager::new(b"secret", 60);
        let result = execute(UserCommand::Delete { username: "ghost".into() }, &db, &jwt).await;
        assert!(result.is_err());
    }
}
