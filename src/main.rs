use anyhow::Context as _;
use clap::Parser;
use opsecret::cli::{Cli, Commands, DelimiterOpts, ExtractOpts, RenderOpts};
use opsecret::config::{read_document, Settings};
use opsecret::infra::context::Context;
use opsecret::infra::secrets::{extract, Extraction};
use opsecret::{apply_hook, logging};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    logging::init(cli.log_json);

    match cli.command {
        Commands::Render(opts) => render(opts).await?,
        Commands::Extract(opts) => extract_value(opts)?,
        Commands::Version => {
            println!("opsecret {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

fn apply_delimiters(settings: &mut Settings, opts: DelimiterOpts) {
    if let Some(prefix) = opts.prefix {
        settings.prefix = prefix;
    }
    if let Some(suffix) = opts.suffix {
        settings.suffix = suffix;
    }
}

async fn render(opts: RenderOpts) -> anyhow::Result<()> {
    let mut settings = Settings::load(opts.settings.as_deref())?;
    apply_delimiters(&mut settings, opts.delimiters);
    if let Some(secs) = opts.timeout {
        settings.timeout_secs = secs;
    }

    let root = Context::background();
    let interrupt = root.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling secret resolution");
            interrupt.cancel();
        }
    });
    let ctx = root.with_timeout(settings.timeout());

    let loader = settings
        .build_loader(&ctx)
        .await
        .context("Failed to initialise the secrets backend")?;
    info!(
        "Rendering {} with backend '{}'",
        opts.file.display(),
        loader.resolver().name()
    );

    let document = read_document(&opts.file)?;
    let resolved = apply_hook(document, &loader.hook(ctx))
        .await
        .with_context(|| format!("Failed to resolve secrets in '{}'", opts.file.display()))?;

    let output = if opts.pretty {
        serde_json::to_string_pretty(&resolved)?
    } else {
        serde_json::to_string(&resolved)?
    };
    println!("{output}");
    Ok(())
}

fn extract_value(opts: ExtractOpts) -> anyhow::Result<()> {
    let mut settings = Settings::default();
    settings.apply_env_overrides();
    apply_delimiters(&mut settings, opts.delimiters);

    match extract(&opts.value, &settings.prefix, &settings.suffix) {
        Extraction::Reference(reference) => println!("reference\t{reference}"),
        Extraction::PassThrough(text) => println!("pass-through\t{text}"),
    }
    Ok(())
}
