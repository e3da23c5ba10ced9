//! Validates and prints the configuration.

use crate::config::HearthConfig;
use std::error::Error;

/// Prints the resolved configuration with secrets masked.
pub fn run(config: &HearthConfig) -> Result<(), Box<dyn Error>> {
    config.validate()?;
    println!("{}", render(config)?);
    Ok(())
}

fn render(config: &HearthConfig) -> Result<String, toml::ser::Error> {
    let mut shown = config.clone();
    if let Some(mqtt) = shown.mqtt.as_mut() {
        if mqtt.password.is_some() {
            mqtt.password = Some("********".to_string());
        }
    }
    toml::to_string_pretty(&shown)
}
