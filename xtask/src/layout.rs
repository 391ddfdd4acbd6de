// Licensed under the Apache-2.0 license

use anyhow::{anyhow, Result};
use mcu_config::FlashLayout;
use std::path::Path;

/// Reads a layout from TOML. Missing keys keep their reference values.
pub(crate) fn load(path: Option<&Path>) -> Result<FlashLayout> {
    let Some(path) = path else {
        return Ok(FlashLayout::default());
    };
    let text = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("Cannot read layout '{}': {}", path.display(), e))?;
    parse(&text).map_err(|e| anyhow!("Bad layout '{}': {}", path.display(), e))
}

fn parse(text: &str) -> Result<FlashLayout> {
    let layout: FlashLayout = toml::from_str(text)?;
    layout.check()?;
    Ok(layout)
}

pub(crate) fn print_default() -> Result<()> {
    print!("{}", toml::to_string(&FlashLayout::default())?);
    Ok(())
}
