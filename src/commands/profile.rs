//! `syscheck profile list` / `show <name>` / `delete <name>`

use anyhow::{Context, Result};
use colored::Colorize;

use crate::profile::{Profile, ProfileStore};

pub fn list(store: &ProfileStore) -> Result<()> {
    let names = store.list().context("listing profiles")?;

    if names.is_empty() {
        println!(
            "{} No profiles in {}",
            "::".blue().bold(),
            store.dir().display()
        );
        println!("   Create one with `syscheck collect --save-profile <name>`.");
        return Ok(());
    }

    println!("{}", "Saved profiles:".bold());
    println!();
    for name in &names {
        match store.load(name) {
            Ok(profile) => println!("  {} {}", name.green().bold(), summary(&profile).dimmed()),
            Err(e) => println!("  {} {}", name.red().bold(), e),
        }
    }
    println!();
    println!(
        "{} Use `syscheck profile show <name>` for details.",
        "::".blue().bold()
    );
    Ok(())
}

fn summary(profile: &Profile) -> String {
    let who = match (&profile.user, &profile.host) {
        (Some(user), Some(host)) => format!("{user}@{host}"),
        (None, Some(host)) => host.clone(),
        _ => "(no host)".to_string(),
    };
    match &profile.os {
        Some(os) => format!("({who}, {os})"),
        None => format!("({who})"),
    }
}

pub fn show(store: &ProfileStore, name: &str) -> Result<()> {
    let profile = store
        .load(name)
        .with_context(|| format!("loading profile '{name}'"))?;

    let field = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());

    println!("{} {}", "Profile:".bold(), name.green().bold());
    println!("{} {}", "Host:".bold(), field(&profile.host));
    println!("{} {}", "User:".bold(), field(&profile.user));
    println!("{} {}", "OS:".bold(), field(&profile.os));
    println!("{} {}", "Key:".bold(), field(&profile.key));
    println!("{} {}", "Domain:".bold(), field(&profile.domain));
    println!(
        "{} {}",
        "Output:".bold(),
        profile.output.map(|o| o.to_string()).unwrap_or_else(|| "-".into())
    );
    if profile.services.is_empty() {
        println!("{} -", "Services:".bold());
    } else {
        println!("{}", "Services:".bold());
        for pattern in &profile.services {
            println!("  {} {}", "+".green().bold(), pattern);
        }
    }
    Ok(())
}

pub fn delete(store: &ProfileStore, name: &str) -> Result<()> {
    let path = store
        .delete(name)
        .with_context(|| format!("deleting profile '{name}'"))?;
    println!("{} Deleted {}", "ok".green().bold(), path.display());
    Ok(())
}
