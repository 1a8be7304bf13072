//! Policy inspection commands.

use std::path::Path;

use snipbox_core::{PackagePolicy, load_policy, user_policy_path};

use crate::colors::{Style, paint};

/// Print the resolved policy.
pub fn show(explicit: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let policy = load_policy(explicit);

    if json {
        println!("{}", serde_json::to_string_pretty(&*policy)?);
        return Ok(());
    }

    println!("{} ({})", paint(Style::Bold, "Package policy"), policy.source);
    if let Some(path) = user_policy_path() {
        let state = if path.exists() { "present" } else { "absent" };
        println!("{}", paint(Style::Dim, format!("user file: {} ({})", path.display(), state)));
    }
    print_set("blocked", Style::Error, policy.blocked.iter());
    print_set("safe", Style::Ok, policy.safe.iter());
    print_set("whitelisted", Style::Ok, policy.whitelisted.iter());

    if !policy.aliases.is_empty() {
        println!("\n{}", paint(Style::Bold, "aliases"));
        for (name, distribution) in &policy.aliases {
            println!("  {} -> {}", name, distribution);
        }
    }

    Ok(())
}

/// Explain how the policy treats one name.
pub fn check(explicit: Option<&Path>, name: &str) {
    let policy = load_policy(explicit);
    println!("{}", verdict(&policy, name));
}

fn verdict(policy: &PackagePolicy, name: &str) -> String {
    if policy.is_blocked(name) {
        format!("{}: blocked, snippets may not import it", paint(Style::Error, name))
    } else if policy.safe.contains(name) {
        format!("{}: safe standard-library module", paint(Style::Ok, name))
    } else if policy.whitelisted.contains(name) {
        let distribution = policy.distribution_name(name);
        let installs_as = if distribution == name {
            String::new()
        } else {
            format!(" as '{}'", distribution)
        };
        format!("{}: whitelisted, installed on demand{}", paint(Style::Ok, name), installs_as)
    } else {
        format!("{}: not in policy, never installed", paint(Style::Warn, name))
    }
}

fn print_set<'a>(label: &str, style: Style, names: impl Iterator<Item = &'a String>) {
    let names: Vec<&str> = names.map(String::as_str).collect();
    println!("\n{} ({})", paint(style, label), names.len());
    if !names.is_empty() {
        println!("  {}", names.join(", "));
    }
}
