//! Password repository commands

use std::io::{BufRead, IsTerminal};

use anyhow::{bail, Context, Result};
use dialoguer::{Confirm, Password};
use engage_core::DeploymentHome;
use engage_secrets::master::write_master_password_file;
use engage_secrets::{PasswordRepository, SecretsError, SecureString};
use tracing::info;

use super::{master_password, resolve_home};
use crate::cli::{GlobalArgs, PasswordCommands, PasswordInitArgs, PasswordSetArgs};
use crate::output;

pub fn run(command: PasswordCommands, global: &GlobalArgs) -> Result<()> {
    let home = resolve_home(global)?;
    match command {
        PasswordCommands::Init(args) => init(args, global, &home),
        PasswordCommands::Set(args) => set(args, global, &home),
        PasswordCommands::List => list(global, &home),
    }
}

fn init(args: PasswordInitArgs, global: &GlobalArgs, home: &DeploymentHome) -> Result<()> {
    let repo_file = home.password_repository_file();
    if repo_file.exists() && !args.force {
        let replace = std::io::stdin().is_terminal()
            && Confirm::new()
                .with_prompt(format!("{} exists. Replace it?", repo_file.display()))
                .default(false)
                .interact()?;
        if !replace {
            bail!(
                "Password repository {} already exists (use --force to replace it)",
                repo_file.display()
            );
        }
    }

    let master = match master_password(global, home)? {
        Some(master) => master,
        None => SecureString::new(
            Password::new()
                .with_prompt("New master password")
                .with_confirmation("Confirm master password", "Passwords do not match")
                .interact()?,
        ),
    };

    home.ensure_dirs()
        .with_context(|| format!("Failed to create {}", home.config_dir().display()))?;
    let repo = PasswordRepository::new(&master).map_err(secrets_error)?;
    repo.save_to_file(&repo_file, &home.password_salt_file())
        .map_err(secrets_error)?;
    output::success(&format!("Created password repository {}", repo_file.display()));

    if args.save_master_password {
        let path = home.master_password_file();
        write_master_password_file(&path, &master).map_err(secrets_error)?;
        output::kv("Master password file", &path.display().to_string());
    }
    Ok(())
}

fn set(args: PasswordSetArgs, global: &GlobalArgs, home: &DeploymentHome) -> Result<()> {
    let master = require_master(global, home)?;
    let mut repo = open(home, &master)?;

    let value = read_value(&args.key)?;
    if value.is_empty() {
        bail!("Refusing to store an empty value for {}", args.key);
    }
    let replaced = repo.has_key(&args.key);
    repo.update_key(&args.key, value);
    repo.save_to_file(&home.password_repository_file(), &home.password_salt_file())
        .map_err(secrets_error)?;

    info!("Stored [REDACTED] under {}", args.key);
    if replaced {
        output::success(&format!("Updated {}", args.key));
    } else {
        output::success(&format!("Added {}", args.key));
    }
    Ok(())
}

fn list(global: &GlobalArgs, home: &DeploymentHome) -> Result<()> {
    let master = require_master(global, home)?;
    let repo = open(home, &master)?;

    if repo.is_empty() {
        output::info("Password repository is empty");
        return Ok(());
    }
    output::header(&format!("Stored keys ({})", repo.len()));
    for key in repo.keys() {
        println!("  {}", key);
    }
    Ok(())
}

fn require_master(global: &GlobalArgs, home: &DeploymentHome) -> Result<SecureString> {
    if let Some(master) = master_password(global, home)? {
        return Ok(master);
    }
    if !std::io::stdin().is_terminal() {
        return Err(secrets_error(SecretsError::MasterPasswordRequired {
            key: "password repository".to_string(),
        }));
    }
    Ok(SecureString::new(
        Password::new().with_prompt("Master password").interact()?,
    ))
}

fn open(home: &DeploymentHome, master: &SecureString) -> Result<PasswordRepository> {
    let repo_file = home.password_repository_file();
    if !repo_file.exists() {
        bail!(
            "No password repository at {} (run `engage password init` first)",
            repo_file.display()
        );
    }
    PasswordRepository::load_from_file(&repo_file, &home.password_salt_file(), master).map_err(secrets_error)
}

/// Secret value for `key`: prompted on a terminal, otherwise the first line of stdin
fn read_value(key: &str) -> Result<SecureString> {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        let value = Password::new().with_prompt(format!("Value for {}", key)).interact()?;
        return Ok(SecureString::new(value));
    }
    let mut line = String::new();
    stdin.lock().read_line(&mut line).context("Failed to read value from stdin")?;
    Ok(SecureString::new(line.trim_end_matches(['\r', '\n']).to_string()))
}

fn secrets_error(e: SecretsError) -> anyhow::Error {
    e.to_user_error().into()
}
