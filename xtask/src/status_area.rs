// Licensed under the Apache-2.0 license

//! Host-side access to the status area of a flash dump file.

use anyhow::{anyhow, bail, Result};
use mcu_config::FlashLayout;
use mcu_rom_common::flash::sim::SimWordFlash;
use mcu_rom_common::status::{Region, SaltedAes128, AREA_SIZE, MAX_VALUE_SIZE};
use mcu_rom_common::{InternalFlash, StatusStore};
use std::path::Path;

type DumpFlash = InternalFlash<'static, SimWordFlash>;

fn open(path: &Path, layout: &FlashLayout) -> Result<DumpFlash> {
    let image =
        std::fs::read(path).map_err(|e| anyhow!("Cannot read '{}': {}", path.display(), e))?;
    let needed = layout.pong_offset()? as usize + AREA_SIZE;
    if image.len() < needed {
        bail!(
            "'{}' is {:#x} bytes, the status area ends at {:#x}",
            path.display(),
            image.len(),
            needed
        );
    }
    Ok(InternalFlash::new(SimWordFlash::from_image(image)))
}

fn save(path: &Path, flash: &DumpFlash) -> Result<()> {
    std::fs::write(path, flash.device().image())
        .map_err(|e| anyhow!("Cannot write '{}': {}", path.display(), e))
}

fn store<'a>(flash: &'a DumpFlash, layout: &FlashLayout) -> Result<StatusStore<'a>> {
    Ok(StatusStore::new(flash, layout, SaltedAes128::default())?)
}

/// Provisions the status area the way the bootloader does on first boot.
/// A missing dump file is created erased.
pub(crate) fn init(path: &Path, layout: &FlashLayout, size: usize) -> Result<()> {
    if !path.exists() {
        std::fs::write(path, vec![0xffu8; size])
            .map_err(|e| anyhow!("Cannot create '{}': {}", path.display(), e))?;
    }
    let flash = open(path, layout)?;
    store(&flash, layout)?.check()?;
    save(path, &flash)?;
    println!("Status area of {} is ready", path.display());
    Ok(())
}

fn render(path: &Path, layout: &FlashLayout, region: Option<Region>) -> Result<String> {
    let flash = open(path, layout)?;
    let store = store(&flash, layout)?;
    let mut text = String::new();
    match region {
        Some(region) => store.dump(region, &mut text)?,
        None => store.show(&mut text)?,
    }
    Ok(text)
}

pub(crate) fn show(path: &Path, layout: &FlashLayout) -> Result<()> {
    print!("{}", render(path, layout, None)?);
    Ok(())
}

pub(crate) fn dump(path: &Path, layout: &FlashLayout, region: Region) -> Result<()> {
    print!("{}", render(path, layout, Some(region))?);
    Ok(())
}

fn parse_hex(value: &str) -> Result<Vec<u8>> {
    let digits = value.trim_start_matches("0x");
    if digits.is_empty() || digits.len() % 2 != 0 {
        bail!("value must be an even number of hex digits");
    }
    let bytes = (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16))
        .collect::<Result<Vec<u8>, _>>()
        .map_err(|e| anyhow!("bad hex value '{}': {}", value, e))?;
    if bytes.len() > MAX_VALUE_SIZE {
        bail!("values are limited to {} bytes", MAX_VALUE_SIZE);
    }
    Ok(bytes)
}

pub(crate) fn set(path: &Path, layout: &FlashLayout, tag: u8, value: &str) -> Result<()> {
    let value = parse_hex(value)?;
    let flash = open(path, layout)?;
    store(&flash, layout)?.set(tag, &value)?;
    save(path, &flash)
}
