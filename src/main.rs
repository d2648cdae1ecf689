//! web2epub command line entry point.

use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use web2epub::{
    Book, ContentDescriptor, ResourceLoader,
    config::{Cli, Command, Config},
    epub::{self, HttpFetcher},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "web2epub=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Find or load config
    let config_path = cli.config.clone().or_else(Config::find_config_file);

    let config = if let Some(ref path) = config_path {
        Config::load(path)?
    } else {
        Config::default()
    };

    match cli.command {
        Command::Init { force } => cmd_init(force),
        Command::Build {
            descriptor,
            output,
            allow_errors,
            strict,
            timeout_ms,
            skip_resources,
        } => {
            let allow_errors = match (allow_errors, strict) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            cmd_build(
                &config,
                &descriptor,
                output,
                allow_errors,
                timeout_ms,
                skip_resources,
            )
            .await
        }
    }
}

/// Write a default config file.
fn cmd_init(force: bool) -> anyhow::Result<()> {
    let config_path = PathBuf::from("web2epub.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    std::fs::write(&config_path, Config::generate_default())?;
    println!("Created config file: {}", config_path.display());

    Ok(())
}

/// Build, load, package and write one book.
async fn cmd_build(
    config: &Config,
    descriptor_path: &Path,
    output: Option<PathBuf>,
    allow_errors: Option<bool>,
    timeout_ms: Option<u64>,
    skip_resources: bool,
) -> anyhow::Result<()> {
    let start = Instant::now();

    let json = std::fs::read_to_string(descriptor_path)?;
    let descriptor = ContentDescriptor::from_json(&json)?;
    let mut book = Book::build(descriptor)?;

    if skip_resources {
        tracing::info!("Skipping resource loading");
    } else {
        let fetcher = HttpFetcher::new(&config.loader.user_agent, config.loader.request_timeout())?;
        let loader = ResourceLoader::new(Arc::new(fetcher));
        let options = config.loader.load_options(allow_errors, timeout_ms);
        book.load_resources(&loader, &options).await?;
    }

    let files = book.assemble_file_list();
    let blob = epub::serialize(&files)?;

    let path = output.unwrap_or_else(|| config.output.directory.join(sanitize_file_name(&book.name)));
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, &blob.bytes)?;

    tracing::info!(
        title = %book.title,
        path = %path.display(),
        entries = files.len(),
        bytes = blob.len(),
        elapsed = ?start.elapsed(),
        "Wrote book"
    );
    println!("{}", path.display());

    Ok(())
}

/// Make a book name safe to use as a file name.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.');

    if cleaned.is_empty() {
        "book.epub".to_string()
    } else {
        cleaned.to_string()
    }
}
