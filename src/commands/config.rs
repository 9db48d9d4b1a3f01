use crate::core::config::{get_config_path, Config};
use crate::error::Result;

pub fn show_config() -> Result<()> {
    let config = Config::load()?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

pub fn show_config_path() -> Result<()> {
    println!("{}", get_config_path()?.display());
    Ok(())
}

pub fn set_config_value(key: &str, value: &str) -> Result<()> {
    let mut config = Config::load()?;
    config.set(key, value)?;
    config.save()?;
    println!("✅ {key} = {value}");
    Ok(())
}
