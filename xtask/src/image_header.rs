// Licensed under the Apache-2.0 license

use anyhow::{anyhow, bail, Result};
use flash_image::{ImageHeader, IMAGE_HEADER_SIZE, MAX_VER_MAJOR, MAX_VER_MINOR};
use mcu_rom_common::{HeaderVerifier, ImageVerifier};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zerocopy::IntoBytes;

fn load_file(filename: &Path) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    File::open(filename)
        .and_then(|mut file| file.read_to_end(&mut buffer))
        .map_err(|e| anyhow!("Cannot read '{}': {}", filename.display(), e))?;
    Ok(buffer)
}

/// Parses `major.minor.revision`.
pub(crate) fn parse_version(s: &str) -> Result<(u8, u8, u16), String> {
    let parts: Vec<&str> = s.split('.').collect();
    let [major, minor, revision] = parts.as_slice() else {
        return Err(format!("expected major.minor.revision, got '{s}'"));
    };
    let major: u8 = major.parse().map_err(|e| format!("major: {e}"))?;
    let minor: u8 = minor.parse().map_err(|e| format!("minor: {e}"))?;
    let revision: u16 = revision.parse().map_err(|e| format!("revision: {e}"))?;
    if major > MAX_VER_MAJOR || minor > MAX_VER_MINOR {
        return Err(format!("version {s} is out of range"));
    }
    Ok((major, minor, revision))
}

fn wrap_bytes(payload: &[u8], version: (u8, u8, u16), image_type: u8) -> Result<Vec<u8>> {
    let size = u32::try_from(payload.len())
        .ok()
        .filter(|len| len.checked_add(IMAGE_HEADER_SIZE as u32).is_some())
        .ok_or_else(|| anyhow!("image of {} bytes is too large", payload.len()))?;
    let header = ImageHeader::build(image_type, size, version);
    let mut image = Vec::with_capacity(IMAGE_HEADER_SIZE + payload.len());
    image.extend_from_slice(header.as_bytes());
    image.extend_from_slice(payload);
    Ok(image)
}

pub(crate) fn wrap(
    input: &Path,
    output: &Path,
    version: (u8, u8, u16),
    image_type: u8,
) -> Result<()> {
    let payload = load_file(input)?;
    let image = wrap_bytes(&payload, version, image_type)?;
    File::create(output)
        .and_then(|mut file| file.write_all(&image))
        .map_err(|e| anyhow!("Cannot write '{}': {}", output.display(), e))?;
    println!(
        "Wrote {} ({} byte payload, version {}.{}.{})",
        output.display(),
        payload.len(),
        version.0,
        version.1,
        version.2
    );
    Ok(())
}

fn describe(image: &[u8]) -> Result<String> {
    let Some(header) = ImageHeader::parse(image) else {
        bail!("file is shorter than an image header");
    };
    let mut text = format!(
        "magic:          {:#010x}\n\
         total size:     {:#x}\n\
         image type:     {:#04x}\n\
         hash algorithm: {}\n\
         header size:    {}\n\
         image size:     {:#x}\n\
         version:        {}.{}.{} ({:#010x})\n\
         checksum:       {:#010x}\n",
        header.magic,
        header.total_size,
        header.image_type,
        header.hash_algorithm,
        header.header_size,
        header.image_size,
        header.version_major,
        header.version_minor,
        header.version_revision,
        header.version(),
        header.checksum,
    );
    let verdict = match HeaderVerifier::new(header.image_type)
        .verify_header(&image[..IMAGE_HEADER_SIZE], 0)
    {
        Ok(_) if image.len() < header.total_size as usize => {
            format!("truncated: file holds {:#x} bytes", image.len())
        }
        Ok(_) => "valid".to_string(),
        Err(e) => format!("invalid: {e}"),
    };
    text.push_str(&format!("status:         {verdict}\n"));
    Ok(text)
}

pub(crate) fn show(file: &Path) -> Result<()> {
    print!("{}", describe(&load_file(file)?)?);
    Ok(())
}
