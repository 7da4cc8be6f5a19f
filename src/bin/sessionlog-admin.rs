use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sessionlog::auth::password::{hash_password, validate_password_strength};
use sessionlog::config::DatabaseConfig;
use sessionlog::storage::{self, StorageError};

#[derive(Parser)]
#[command(name = "sessionlog-admin")]
#[command(about = "Sessionlog user management CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a user account
    CreateUser {
        username: String,
        password: String,
        /// File name under the profile picture directory
        #[arg(long)]
        profile_pic: Option<String>,
        /// Grant analytics dashboard access
        #[arg(long)]
        admin: bool,
    },
    /// Replace a user's password
    SetPassword { username: String, password: String },
    /// Grant analytics dashboard access
    Promote { username: String },
    /// Revoke analytics dashboard access
    Demote { username: String },
    /// List all users
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let storage = storage::connect(&DatabaseConfig::from_env()).await?;
    storage.init().await?;

    match cli.command {
        Commands::CreateUser {
            username,
            password,
            profile_pic,
            admin,
        } => {
            validate_password_strength(&password)?;
            let hash = hash_password(&password)?;
            let user = match storage
                .create_user(&username, &hash, profile_pic.as_deref())
                .await
            {
                Ok(user) => user,
                Err(StorageError::Conflict) => bail!("user '{}' already exists", username),
                Err(StorageError::Other(e)) => return Err(e.context("failed to create user")),
            };
            if admin {
                storage.set_admin(&username, true).await?;
            }
            println!(
                "✓ Created user '{}' (id {}){}",
                user.username,
                user.id,
                if admin { " as admin" } else { "" }
            );
        }
        Commands::SetPassword { username, password } => {
            validate_password_strength(&password)?;
            let hash = hash_password(&password)?;
            let updated = storage
                .set_password(&username, &hash)
                .await
                .context("failed to update password")?;
            if updated {
                println!("✓ Updated password for '{}'", username);
            } else {
                bail!("no such user '{}'", username);
            }
        }
        Commands::Promote { username } => {
            if storage.set_admin(&username, true).await? {
                println!("✓ Promoted '{}' to admin", username);
            } else {
                bail!("no such user '{}'", username);
            }
        }
        Commands::Demote { username } => {
            if storage.set_admin(&username, false).await? {
                println!("✓ Demoted '{}' from admin", username);
            } else {
                bail!("no such user '{}'", username);
            }
        }
        Commands::List => {
            let users = storage.list_users().await?;
            if users.is_empty() {
                println!("No users found.");
            } else {
                println!("{:<8} {:<24} {:<8} {}", "ID", "Username", "Admin", "Profile picture");
                println!("{}", "-".repeat(64));
                for user in users {
                    println!(
                        "{:<8} {:<24} {:<8} {}",
                        user.id,
                        user.username,
                        if user.is_admin { "yes" } else { "no" },
                        user.profile_pic.as_deref().unwrap_or("-")
                    );
                }
            }
        }
    }

    Ok(())
}
