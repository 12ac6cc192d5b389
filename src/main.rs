//! figma-cache - query Figma design files through a local disk cache
//!
//! Thin command-line front end over the library. Results go to stdout as
//! JSON; logs and cache notices go to stderr.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::env;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use figma_cache::cache::{Clock, SystemClock};
use figma_cache::figma::ImageFormat;
use figma_cache::service::{CacheInfo, ImageRequest};
use figma_cache::{Config, FigmaService, RenderOptions};

/// CLI command
#[derive(Debug)]
enum Command {
    /// Print a whole file
    File {
        file_key: String,
        depth: Option<u32>,
    },
    /// Print one or more nodes of a file
    Node {
        file_key: String,
        node_ids: String,
        depth: Option<u32>,
    },
    /// Print image fill URLs
    FillUrls { file_key: String },
    /// Print render URLs for nodes
    RenderUrls {
        file_key: String,
        format: ImageFormat,
        node_ids: Vec<String>,
    },
    /// Download images into a directory
    Download {
        file_key: String,
        dest_dir: PathBuf,
        items: Vec<ImageRequest>,
    },
    /// Show help
    Help,
}

fn print_help() {
    eprintln!(
        r#"figma-cache - Query Figma design files through a local disk cache

USAGE:
    figma-cache file <file_key> [--depth N]
    figma-cache node <file_key> <node_ids> [--depth N]
    figma-cache fill-urls <file_key>
    figma-cache render-urls <file_key> <png|svg> <node_id,node_id,...>
    figma-cache download <file_key> <dest_dir> <ref|node>:<id>:<file_name>...
    figma-cache help

COMMANDS:
    file         Print a file as JSON, optionally limited to N levels
    node         Print nodes of a file; separate several IDs with ';'
    fill-urls    Print download URLs of every image fill
    render-urls  Print export URLs for rendered nodes
    download     Download image fills (ref) or rendered nodes (node)
    help         Show this help message

EXAMPLES:
    figma-cache file AbC123xyz --depth 2
    figma-cache node AbC123xyz "1-23;4:56"
    figma-cache download AbC123xyz assets ref:8f3e...:bg.png node:1:23:logo.svg

ENVIRONMENT:
    FIGMA_API_KEY        Personal access token
    FIGMA_OAUTH_TOKEN    OAuth token (used instead of the API key when set)
    FIGMA_CACHING        Enable disk caching, e.g.
                         {{"cacheDir": "~/.cache/figma", "ttl": {{"value": 30, "unit": "m"}}}}
    FIGMA_API_BASE_URL   Override the API root
    RUST_LOG             Log level (trace, debug, info, warn, error)
"#
    );
}

fn parse_args() -> Result<Command> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        return Ok(Command::Help);
    }

    match args[1].as_str() {
        "file" => {
            let (positional, depth) = split_depth(&args[2..])?;
            let [file_key] = positional.as_slice() else {
                return Err(anyhow!("Usage: figma-cache file <file_key> [--depth N]"));
            };
            Ok(Command::File {
                file_key: file_key.clone(),
                depth,
            })
        }
        "node" => {
            let (positional, depth) = split_depth(&args[2..])?;
            let [file_key, node_ids] = positional.as_slice() else {
                return Err(anyhow!(
                    "Usage: figma-cache node <file_key> <node_ids> [--depth N]"
                ));
            };
            Ok(Command::Node {
                file_key: file_key.clone(),
                // Node IDs copied from Figma URLs use '-' instead of ':'
                node_ids: node_ids.replace('-', ":"),
                depth,
            })
        }
        "fill-urls" => {
            if args.len() != 3 {
                return Err(anyhow!("Usage: figma-cache fill-urls <file_key>"));
            }
            Ok(Command::FillUrls {
                file_key: args[2].clone(),
            })
        }
        "render-urls" => {
            if args.len() != 5 {
                return Err(anyhow!(
                    "Usage: figma-cache render-urls <file_key> <png|svg> <node_ids>"
                ));
            }
            let format = match args[3].as_str() {
                "png" => ImageFormat::Png,
                "svg" => ImageFormat::Svg,
                other => return Err(anyhow!("Unknown format: {}", other)),
            };
            let node_ids = args[4]
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(|id| id.replace('-', ":"))
                .collect();
            Ok(Command::RenderUrls {
                file_key: args[2].clone(),
                format,
                node_ids,
            })
        }
        "download" => {
            if args.len() < 5 {
                return Err(anyhow!(
                    "Usage: figma-cache download <file_key> <dest_dir> <ref|node>:<id>:<file_name>..."
                ));
            }
            let items = args[4..]
                .iter()
                .map(|arg| parse_image_item(arg))
                .collect::<Result<Vec<_>>>()?;
            Ok(Command::Download {
                file_key: args[2].clone(),
                dest_dir: PathBuf::from(&args[3]),
                items,
            })
        }
        "help" | "--help" | "-h" => Ok(Command::Help),
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            Ok(Command::Help)
        }
    }
}

/// Pull `--depth N` out of the argument list
fn split_depth(args: &[String]) -> Result<(Vec<String>, Option<u32>)> {
    let mut positional = Vec::new();
    let mut depth = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--depth" {
            let value = iter.next().ok_or_else(|| anyhow!("--depth needs a value"))?;
            depth = Some(
                value
                    .parse()
                    .with_context(|| format!("Invalid depth: {}", value))?,
            );
        } else {
            positional.push(arg.clone());
        }
    }
    Ok((positional, depth))
}

/// Parse `ref:<imageRef>:<file>` or `node:<nodeId>:<file>`
///
/// Node IDs contain ':' themselves, so the file name is taken after the last one.
fn parse_image_item(arg: &str) -> Result<ImageRequest> {
    let (kind, rest) = arg
        .split_once(':')
        .ok_or_else(|| anyhow!("Invalid image item: {}", arg))?;
    let (id, file_name) = rest
        .rsplit_once(':')
        .filter(|(id, file_name)| !id.is_empty() && !file_name.is_empty())
        .ok_or_else(|| anyhow!("Invalid image item: {}", arg))?;

    match kind {
        "ref" => Ok(ImageRequest::fill(id, file_name)),
        "node" => Ok(ImageRequest::render(id.replace('-', ":"), file_name)),
        other => Err(anyhow!("Unknown image source '{}' in {}", other, arg)),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

fn print_cache_notice(cache_info: &CacheInfo) {
    if let Some(notice) = cache_info.notice(SystemClock.now_millis()) {
        eprintln!("{}", notice);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let log_level = env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Parse command
    let command = match parse_args() {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    if let Command::Help = command {
        print_help();
        return Ok(());
    }

    let config = Config::from_env().context("Invalid configuration")?;
    info!(
        auth = %config.auth.masked(),
        caching = config.caching.is_some(),
        "Loaded configuration"
    );
    let service = FigmaService::from_config(&config)?;

    match command {
        Command::File { file_key, depth } => {
            let result = service.get_file(&file_key, depth).await?;
            print_cache_notice(&result.cache_info);
            print_json(&result.data)?;
        }
        Command::Node {
            file_key,
            node_ids,
            depth,
        } => {
            let result = service.get_node(&file_key, &node_ids, depth).await?;
            print_cache_notice(&result.cache_info);
            print_json(&result.data)?;
        }
        Command::FillUrls { file_key } => {
            let urls = service.get_image_fill_urls(&file_key).await?;
            print_json(&urls)?;
        }
        Command::RenderUrls {
            file_key,
            format,
            node_ids,
        } => {
            let urls = service
                .get_node_render_urls(&file_key, &node_ids, format, &RenderOptions::default())
                .await?;
            print_json(&urls)?;
        }
        Command::Download {
            file_key,
            dest_dir,
            items,
        } => {
            let results = service
                .download_images(&file_key, &dest_dir, &items, &RenderOptions::default())
                .await?;
            info!(count = results.len(), "Download complete");
            print_json(&results)?;
        }
        Command::Help => print_help(),
    }

    Ok(())
}
