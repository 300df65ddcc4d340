//! `pilot config`

use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use crate::cli::ConfigArgs;
use crate::console::{print_success, print_warning};
use crate::errors::PilotError;
use crate::storage::profiles::{Profile, ProfileStore};
use crate::storage::stack::DEFAULT_PROFILE;

#[derive(Tabled)]
struct ProfileRow {
    #[tabled(rename = "Profile")]
    name: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Stage")]
    stage: String,
    #[tabled(rename = "Host")]
    host: String,
    #[tabled(rename = "Port")]
    port: String,
    #[tabled(rename = "Keep")]
    keep: String,
}

fn or_dash(value: Option<String>) -> String {
    value.unwrap_or_else(|| "-".to_string())
}

/// Render stored profiles
pub fn profile_table(store: &ProfileStore) -> String {
    let rows: Vec<ProfileRow> = store
        .profiles()
        .iter()
        .map(|(name, profile)| ProfileRow {
            name: name.clone(),
            mode: profile.mode().to_string(),
            stage: or_dash(profile.stage.clone()),
            host: or_dash(profile.host.clone()),
            port: or_dash(profile.port.map(|p| p.to_string())),
            keep: profile.keep().to_string(),
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Save the given fields over the stored profile, or list profiles when none are given
pub async fn execute(args: &ConfigArgs, store: &mut ProfileStore) -> Result<(), PilotError> {
    let name = args.name.as_deref().unwrap_or(DEFAULT_PROFILE);

    if !args.has_changes() {
        if store.profiles().is_empty() {
            print_warning(&format!("No profiles saved in {}", store.path().display()));
            return Ok(());
        }
        println!("{}", format!("Profiles in {}", store.path().display()).bold());
        println!("{}", profile_table(store));
        return Ok(());
    }

    let update = Profile {
        mode: args.mode.clone(),
        stage: args.stage.clone(),
        host: args.host.clone(),
        port: args.port,
        keep: args.keep,
        ..Default::default()
    };
    let existing = store.get(name).cloned().unwrap_or_default();
    store.save(name, update.layered_over(&existing)).await?;

    print_success(&format!("Saved profile '{}' to {}", name, store.path().display()));
    Ok(())
}
