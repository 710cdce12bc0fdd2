use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;
use wesio_media::config::Config;
use wesio_media::media::{FileType, Media, MediaClient, MediaStream, UploadOptions};

#[derive(Debug, Parser)]
#[command(name = "wesio-media")]
#[command(about = "Store chat media and issue expiring share links")]
struct CliArgs {
    /// Load settings from this .env file instead of ./.env
    #[arg(long, value_name = "PATH", global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload a local file
    Upload {
        #[arg(long = "type", value_parser = parse_file_type)]
        file_type: FileType,
        file: PathBuf,
        /// Object name; defaults to a random UUID keeping the file extension
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        content_type: Option<String>,
        /// User metadata as key=value, repeatable
        #[arg(long = "meta", value_parser = parse_metadata_arg)]
        metadata: Vec<(String, String)>,
    },
    /// Download an object to a local file (or stdout)
    Download {
        #[arg(long = "type", value_parser = parse_file_type)]
        file_type: FileType,
        name: String,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Print a presigned download URL
    Url {
        #[arg(long = "type", value_parser = parse_file_type)]
        file_type: FileType,
        name: String,
        /// Lifetime in seconds
        #[arg(long, default_value_t = 3600)]
        ttl: u64,
    },
    /// Print a signed CDN URL
    CdnUrl {
        #[arg(long = "type", value_parser = parse_file_type)]
        file_type: FileType,
        name: String,
        /// Lifetime in seconds
        #[arg(long, default_value_t = 3600)]
        ttl: u64,
    },
    /// Delete an object
    Delete {
        #[arg(long = "type", value_parser = parse_file_type)]
        file_type: FileType,
        name: String,
    },
}

fn parse_file_type(input: &str) -> std::result::Result<FileType, String> {
    Ok(FileType::from(input))
}

fn parse_metadata_arg(input: &str) -> std::result::Result<(String, String), String> {
    match input.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!(
            "Invalid metadata '{}'. Expected format: key=value",
            input
        )),
    }
}

fn generated_name(file: &Path) -> String {
    match file.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
        None => Uuid::new_v4().to_string(),
    }
}

async fn run(media: &dyn Media, command: Command) -> Result<()> {
    match command {
        Command::Upload {
            file_type,
            file,
            name,
            content_type,
            metadata,
        } => {
            let name = name.unwrap_or_else(|| generated_name(&file));
            let handle = tokio::fs::File::open(&file)
                .await
                .with_context(|| format!("Failed to open {}", file.display()))?;
            let options = UploadOptions {
                content_type,
                metadata: metadata.into_iter().collect(),
            };

            let object_path = media
                .upload(file_type, &name, Box::new(handle), Some(options))
                .await?;
            println!("{}", object_path);
        }
        Command::Download {
            file_type,
            name,
            output,
        } => {
            let mut stream: MediaStream = media.download(file_type, &name).await?;
            match output {
                Some(path) => {
                    let mut out = tokio::fs::File::create(&path)
                        .await
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    let copied = tokio::io::copy(&mut stream, &mut out).await?;
                    info!("Wrote {} bytes to {}", copied, path.display());
                }
                None => {
                    tokio::io::copy(&mut stream, &mut tokio::io::stdout()).await?;
                }
            }
        }
        Command::Url {
            file_type,
            name,
            ttl,
        } => {
            let url = media
                .get_url(file_type, &name, Duration::from_secs(ttl))
                .await?;
            println!("{}", url);
        }
        Command::CdnUrl {
            file_type,
            name,
            ttl,
        } => {
            let url = media
                .get_cdn_url(file_type, &name, Duration::from_secs(ttl))
                .await?;
            println!("{}", url);
        }
        Command::Delete { file_type, name } => {
            media.delete(file_type, &name).await?;
            info!("Deleted {}/{}", file_type, name);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let config = match &args.env_file {
        Some(path) => Config::from_env_file(path)?,
        None => Config::from_env()?,
    };
    wesio_media::telemetry::init(&config.log);

    let media = match MediaClient::connect(&config.media).await {
        Ok(media) => media,
        Err(e) => {
            error!("Failed to initialize media client: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&media, args.command).await {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }
    Ok(())
}
