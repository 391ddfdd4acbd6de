// Licensed under the Apache-2.0 license

use clap::{Parser, Subcommand, ValueEnum};
use clap_num::maybe_hex;
use std::path::PathBuf;

mod image_header;
mod layout;
mod status_area;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Xtask {
    #[command(subcommand)]
    xtask: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Commands related to image headers
    ImageHeader {
        #[command(subcommand)]
        subcommand: ImageHeaderCommands,
    },
    /// Inspect or prepare the status area of a flash dump
    Status {
        /// Path to the flash dump file
        #[arg(long, value_name = "FLASH")]
        flash: PathBuf,

        /// TOML file describing the flash layout. Default: reference layout
        #[arg(long, value_name = "LAYOUT")]
        layout: Option<PathBuf>,

        #[command(subcommand)]
        subcommand: StatusCommands,
    },
    /// Print the reference flash layout as TOML
    Layout,
}

#[derive(Subcommand)]
enum ImageHeaderCommands {
    /// Prepend an image header to a raw binary
    Wrap {
        /// Path to the raw application binary
        #[arg(long, value_name = "INPUT", required = true)]
        input: PathBuf,

        /// Path of the headered output image
        #[arg(long, value_name = "OUTPUT", required = true)]
        output: PathBuf,

        /// Image version as major.minor.revision
        #[arg(long, value_parser = image_header::parse_version, default_value = "1.0.0")]
        version: (u8, u8, u16),

        /// Image type byte
        #[arg(long, value_parser = maybe_hex::<u8>, default_value_t = flash_image::IMAGE_TYPE_IMG)]
        image_type: u8,
    },
    /// Decode and check the header of an image file
    Show {
        /// Path to the image file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum RegionArg {
    Ping,
    Pong,
}

#[derive(Subcommand)]
enum StatusCommands {
    /// Initialize the status area, creating the dump file if needed
    Init {
        /// Size of a newly created dump file
        #[arg(long, value_parser = maybe_hex::<usize>, default_value_t = 0x20_0000)]
        size: usize,
    },
    /// List the items of the active status record
    Show,
    /// Hex dump one decrypted status region
    Dump {
        #[arg(long, value_enum)]
        region: RegionArg,
    },
    /// Store an item given as hex bytes
    Set {
        #[arg(long, value_parser = maybe_hex::<u8>)]
        tag: u8,

        /// Value as hex digits, e.g. 0a0b
        #[arg(long)]
        value: String,
    },
}

fn main() {
    let cli = Xtask::parse();
    let result = match &cli.xtask {
        Commands::ImageHeader { subcommand } => match subcommand {
            ImageHeaderCommands::Wrap {
                input,
                output,
                version,
                image_type,
            } => image_header::wrap(input, output, *version, *image_type),
            ImageHeaderCommands::Show { file } => image_header::show(file),
        },
        Commands::Status {
            flash,
            layout: layout_file,
            subcommand,
        } => layout::load(layout_file.as_deref()).and_then(|layout| match subcommand {
            StatusCommands::Init { size } => status_area::init(flash, &layout, *size),
            StatusCommands::Show => status_area::show(flash, &layout),
            StatusCommands::Dump { region } => {
                let region = match region {
                    RegionArg::Ping => mcu_rom_common::status::Region::Ping,
                    RegionArg::Pong => mcu_rom_common::status::Region::Pong,
                };
                status_area::dump(flash, &layout, region)
            }
            StatusCommands::Set { tag, value } => status_area::set(flash, &layout, *tag, value),
        }),
        Commands::Layout => layout::print_default(),
    };
    result.unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });
}
