use crate::config::generate::generate_starter_config;
use crate::config::user_config_path;
use console::style;
use std::fs;
use std::path::Path;

pub fn init(stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_content = generate_starter_config();

    if stdout {
        print!("{}", config_content);
        return Ok(());
    }

    let config_path = user_config_path().ok_or("could not determine the home directory")?;
    write_config(&config_content, &config_path)?;

    println!(
        "{} {}",
        style("✓ Config written to").green(),
        config_path.display()
    );
    println!("Edit it to set the analysis service, then run: logsift <logfile>");
    Ok(())
}

/// Write a new config file, refusing to replace an existing one
fn write_config(config_content: &str, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        return Err(format!(
            "config file already exists at {}; remove it first or use --stdout",
            path.display()
        )
        .into());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("failed to create directory {}: {}", parent.display(), e))?;
    }

    fs::write(path, config_content)
        .map_err(|e| format!("failed to write config file {}: {}", path.display(), e))?;
    Ok(())
}
