use crate::defaults::CONFIG_FILE_NAME;
use crate::io::Configuration;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

pub fn read_input() -> Result<Configuration> {
    // The configuration file is read, if it does not exist in the directory
    // the program initializes the default settings and writes a configuration file
    // to the directory. The filename of the configuration file
    // is set in the defaults.rs file to "qsmix.toml"
    let config_file_path: &Path = Path::new(CONFIG_FILE_NAME);
    let config_string: String = if config_file_path.exists() {
        fs::read_to_string(config_file_path).context("Unable to read config file")?
    } else {
        String::from("")
    };
    // Load the configuration.
    let config: Configuration = toml::from_str(&config_string)
        .with_context(|| format!("Invalid configuration in {}", CONFIG_FILE_NAME))?;
    // The configuration file is saved if it does not exist already so that the user can see
    // all the used options.
    if !config_file_path.exists() {
        let config_string: String =
            toml::to_string(&config).context("Unable to serialize the configuration")?;
        fs::write(config_file_path, config_string).context("Unable to write config file")?;
    }
    Ok(config)
}
