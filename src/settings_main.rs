// SPDX-License-Identifier: MPL-2.0

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use netweather_monitor::Config;

#[derive(Debug, Parser)]
#[command(version, about = "Inspect and create the monitor configuration")]
struct Cli {
    /// Config file to use instead of the platform default
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print where the config file is read from
    Path,
    /// Print the effective configuration as TOML
    Show,
    /// Write a config file with every default filled in
    Init {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let path = match cli.config {
        Some(path) => path,
        None => Config::default_path()?,
    };

    match cli.command {
        Command::Path => println!("{}", path.display()),
        Command::Show => {
            let config = if path.exists() {
                Config::load(Some(&path))?
            } else {
                Config::default()
            };
            print!("{}", config.to_toml()?);
        }
        Command::Init { force } => {
            write_default(&path, force)?;
            println!("wrote {}", path.display());
        }
    }
    Ok(())
}

/// Write the default config to `path`, refusing to replace an existing file
/// unless `force` is set.
fn write_default(path: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() && !force {
        return Err(format!("{} already exists, use --force to replace it", path.display()).into());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, Config::default().to_toml()?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        write_default(&path, false).unwrap();

        let written = Config::load(Some(&path)).unwrap();
        assert_eq!(written, Config::default());
    }

    #[test]
    fn init_keeps_an_existing_file_unless_forced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "network_interval_secs = 30\n").unwrap();

        let err = write_default(&path, false).unwrap_err();
        assert!(err.to_string().contains("--force"));
        assert_eq!(Config::load(Some(&path)).unwrap().network_interval_secs, 30);

        write_default(&path, true).unwrap();
        assert_eq!(Config::load(Some(&path)).unwrap(), Config::default());
    }

    #[test]
    fn cli_parses_init_with_force() {
        let cli = Cli::try_parse_from(["netweather-settings", "init", "--force", "-c", "x.toml"]).unwrap();
        assert!(matches!(cli.command, Command::Init { force: true }));
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
    }
}
