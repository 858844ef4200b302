//! `romprops`: print the properties of a console file

mod config;

use std::fs::File;

use anyhow::Context;
use clap::Parser;
use romprops_formats::{Image, RomData, SystemNameKind, detect_and_open};
use tracing::{debug, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

use crate::config::Cli;

fn init_tracing(level: Option<config::LogLevel>) {
    let filter = match level {
        Some(level) => EnvFilter::default().add_directive(LevelFilter::from(level).into()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn describe_image(image: &Image) -> String {
    let kind = match image {
        Image::Argb32 { .. } => "ARGB32",
        Image::Png(_) => "PNG",
        Image::Xpr0(_) => "XPR0",
    };
    match image.dimensions() {
        Some((w, h)) => format!("{kind} {w}x{h}"),
        None => kind.to_string(),
    }
}

fn print_text(rom: &mut dyn RomData) -> anyhow::Result<()> {
    println!(
        "System: {} ({})",
        rom.system_name(SystemNameKind::Long),
        rom.system_name(SystemNameKind::Abbreviation)
    );
    println!("File Type: {}", rom.file_type());
    print!("{}", rom.fields()?);

    if let Some(anim) = rom.icon_animation()?.filter(|a| a.is_animated()) {
        let delays: Vec<String> = anim.delays.iter().map(|d| format!("{} ms", d.ms)).collect();
        println!(
            "Icon: {} frames ({})",
            anim.frame_count(),
            delays.join(", ")
        );
    } else if let Some(icon) = rom.icon()? {
        println!("Icon: {}", describe_image(&icon));
    }
    Ok(())
}

fn print_json(rom: &mut dyn RomData) -> anyhow::Result<()> {
    let system = rom.system_name(SystemNameKind::Long);
    let file_type = rom.file_type();
    let fields = serde_json::to_value(rom.fields()?)?;
    let icon = rom.icon()?;
    let animation = rom.icon_animation()?;
    let doc = serde_json::json!({
        "system": system,
        "file_type": file_type,
        "fields": fields,
        "icon": icon,
        "icon_animation": animation,
    });
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level);

    let options = cli.parse_options()?;
    let file = File::open(&cli.file)
        .with_context(|| format!("failed to open {}", cli.file.display()))?;
    let mut rom = detect_and_open(file, &options)
        .with_context(|| format!("failed to read {}", cli.file.display()))?;
    debug!(
        "{}: {} {}",
        cli.file.display(),
        rom.system_name(SystemNameKind::Short),
        rom.file_type()
    );

    if cli.json {
        print_json(rom.as_mut())?;
    } else {
        print_text(rom.as_mut())?;
    }
    rom.close();
    Ok(())
}
