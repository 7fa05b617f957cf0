use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{Datelike, Local, Timelike};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use wwboot_core::transport::NusbTransport;
use wwboot_core::{
    ApplicationSession, BootloaderSession, DeviceKind, ExitOutcome, FlashConfig, Flasher,
    WatchTime,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "LED wristwatch bootloader tool", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List attached watches
    List,
    /// Program an Intel HEX image
    Flash {
        /// Image to program (falls back to `image_path` from the config)
        image: Option<PathBuf>,
        /// Skip the bootloader reset before programming
        #[arg(long)]
        no_reset: bool,
        /// Stay in the bootloader afterwards
        #[arg(long)]
        no_exit: bool,
        /// Extra attempts per page after a protocol error
        #[arg(long)]
        retries: Option<u32>,
        /// Accept records with bad checksums
        #[arg(long)]
        no_checksum: bool,
        /// Require the bootloader to echo each page's CRC32s
        #[arg(long)]
        verify_crc: bool,
    },
    /// Print the pages an image would be written as, without a device
    Pages {
        image: PathBuf,
    },
    /// Reset the bootloader
    Reset,
    /// Leave the bootloader and start the application
    Exit {
        /// Vector table address of the application
        #[arg(long, value_parser = parse_u32)]
        vector_table: Option<u32>,
    },
    /// Abandon the update and leave the bootloader
    Abort,
    /// Poll for a pending status report
    Status,
    /// Set the watch clock to the local time
    SetTime,
    /// Reboot a running watch into its bootloader
    EnterBootloader,
}

fn parse_u32(value: &str) -> Result<u32, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| format!("invalid address '{value}': {e}"))
}

fn load_config(path: Option<&PathBuf>) -> Result<FlashConfig> {
    match path {
        Some(path) => FlashConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(FlashConfig::default()),
    }
}

fn open_bootloader(config: &FlashConfig) -> Result<BootloaderSession<NusbTransport>> {
    let transport = NusbTransport::open(DeviceKind::Bootloader)?;
    Ok(BootloaderSession::with_options(
        transport,
        config.session_options(),
    ))
}

fn open_application() -> Result<ApplicationSession<NusbTransport>> {
    Ok(ApplicationSession::new(NusbTransport::open(
        DeviceKind::Application,
    )?))
}

fn report_exit(outcome: ExitOutcome) {
    match outcome {
        ExitOutcome::LeftBootloader => info!("Device left the bootloader"),
        ExitOutcome::RemainedInBootloader(status) => {
            warn!(%status, "Device is still in the bootloader")
        }
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = load_config(args.config.as_ref())?;

    match args.command {
        Commands::List => {
            let watches: Vec<_> = NusbTransport::enumerate()?
                .into_iter()
                .filter_map(|entry| entry.kind().map(|kind| (kind, entry)))
                .collect();
            if watches.is_empty() {
                println!("No watches found");
            }
            for (kind, entry) in watches {
                println!("{kind:<12} {entry}");
            }
        }
        Commands::Flash {
            image,
            no_reset,
            no_exit,
            retries,
            no_checksum,
            verify_crc,
        } => {
            config.reset_before &= !no_reset;
            config.exit_after &= !no_exit;
            config.validate_checksums &= !no_checksum;
            config.verify_crc_echo |= verify_crc;
            if let Some(retries) = retries {
                config.page_retries = retries;
            }
            let image = image
                .or_else(|| config.image_path.as_ref().map(PathBuf::from))
                .ok_or_else(|| anyhow!("No image given on the command line or in the config"))?;

            let flasher = Flasher::new(config);
            let pages = flasher
                .load_image(&image)
                .with_context(|| format!("Failed to load {}", image.display()))?;
            let transport = NusbTransport::open(DeviceKind::Bootloader)?;
            let report = flasher.flash(transport, &pages)?;

            info!(
                pages = report.pages,
                retries = report.retries,
                "Programming finished"
            );
            if let Some(outcome) = report.exit {
                report_exit(outcome);
            }
        }
        Commands::Pages { image } => {
            let flasher = Flasher::new(config);
            let pages = flasher.load_image(&image)?;
            for page in &pages {
                println!(
                    "0x{:08X}  {:3} bytes  crc32 0x{:08X}",
                    page.address(),
                    page.len(),
                    page.crc32()
                );
            }
            println!("{} pages", pages.len());
        }
        Commands::Reset => open_bootloader(&config)?.reset()?,
        Commands::Exit { vector_table } => {
            let vector_table = vector_table.unwrap_or(config.vector_table);
            report_exit(open_bootloader(&config)?.exit(vector_table)?);
        }
        Commands::Abort => report_exit(open_bootloader(&config)?.abort()?),
        Commands::Status => {
            let session = open_bootloader(&config)?;
            match session.poll_status(Duration::from_millis(config.poll_timeout_ms))? {
                Some(status) => println!(
                    "last command 0x{:08X}: {}",
                    status.last_command, status
                ),
                None => println!("No status pending"),
            }
        }
        Commands::SetTime => {
            let now = Local::now();
            let time = WatchTime {
                year: (now.year() % 100) as u8,
                month: now.month() as u8,
                day: now.day() as u8,
                hour: now.hour() as u8,
                minute: now.minute() as u8,
                second: now.second() as u8,
            };
            open_application()?.set_time(time)?;
        }
        Commands::EnterBootloader => open_application()?.enter_bootloader()?,
    }

    Ok(())
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_u32() {
        assert_eq!(parse_u32("0x08002000"), Ok(0x0800_2000));
        assert_eq!(parse_u32("4096"), Ok(4096));
        assert!(parse_u32("0xZZ").is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from(["wwboot", "-v", "flash", "watch.hex", "--retries", "2"])
            .unwrap();
        assert!(args.verbose);
        match args.command {
            Commands::Flash { image, retries, .. } => {
                assert_eq!(image, Some(PathBuf::from("watch.hex")));
                assert_eq!(retries, Some(2));
            }
            other => panic!("unexpected: {other:?}"),
        }

        let args =
            Args::try_parse_from(["wwboot", "exit", "--vector-table", "0x08004000"]).unwrap();
        assert!(matches!(
            args.command,
            Commands::Exit {
                vector_table: Some(0x0800_4000)
            }
        ));
    }
}
