//! Install and uninstall commands.

use snipbox_core::{InstallStatus, Sandbox, UninstallStatus};

use crate::colors::{Style, paint};

pub fn install(sandbox: &Sandbox, name: &str) -> anyhow::Result<()> {
    match sandbox.policy().install(name)? {
        InstallStatus::AlreadyInstalled => {
            println!("{}", paint(Style::Dim, format!("{} is already installed", name)));
        }
        InstallStatus::Installed => {
            println!("{} {}", paint(Style::Ok, "Installed"), name);
        }
    }
    Ok(())
}

pub fn uninstall(sandbox: &Sandbox, name: &str) -> anyhow::Result<()> {
    match sandbox.uninstall(name)? {
        UninstallStatus::NotInstalled => {
            println!("{}", paint(Style::Dim, format!("{} is not installed", name)));
        }
        UninstallStatus::Uninstalled => {
            println!("{} {}", paint(Style::Ok, "Uninstalled"), name);
        }
    }
    Ok(())
}
