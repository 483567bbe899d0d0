//! CLI for GenStudio - run the proxy, or generate and edit images through it.

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use genstudio::image::{decode_data_url, ImageFormat};
use genstudio::prelude::{AspectRatio, RequestHandle, Studio, StudioBackend, StudioClient, StudioState};
use genstudio::ProxyConfig;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "genstudio")]
#[command(about = "Generate and edit images through a credential-holding proxy")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the proxy server
    Serve(ServeArgs),

    /// Generate an image from a text prompt
    Generate(GenerateArgs),

    /// Edit one or more images with a text prompt
    Edit(EditArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Listen address
    #[arg(long, env = "GENSTUDIO_BIND")]
    bind: Option<SocketAddr>,

    /// Model service base URL
    #[arg(long, env = "GENSTUDIO_GEMINI_BASE_URL")]
    base_url: Option<String>,
}

#[derive(Args)]
struct ProxyArgs {
    /// URL of the proxy endpoint
    #[arg(
        long,
        env = "GENSTUDIO_PROXY_URL",
        default_value = "http://127.0.0.1:8787/api/studio"
    )]
    proxy: String,

    /// Output file path
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(Args)]
struct GenerateArgs {
    /// The text prompt describing the image (blank uses a default)
    #[arg(default_value = "")]
    prompt: String,

    #[command(flatten)]
    proxy: ProxyArgs,
}

#[derive(Args)]
struct EditArgs {
    /// The edit instruction (blank uses a default)
    #[arg(default_value = "")]
    prompt: String,

    /// Input image(s), up to 8
    #[arg(short, long = "input", required = true)]
    inputs: Vec<PathBuf>,

    /// Output proportions
    #[arg(long, value_enum)]
    aspect_ratio: Option<AspectRatioArg>,

    #[command(flatten)]
    proxy: ProxyArgs,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AspectRatioArg {
    #[value(name = "1:1")]
    Square,
    #[value(name = "16:9")]
    Landscape,
    #[value(name = "9:16")]
    Portrait,
}

impl From<AspectRatioArg> for AspectRatio {
    fn from(arg: AspectRatioArg) -> Self {
        match arg {
            AspectRatioArg::Square => AspectRatio::Square,
            AspectRatioArg::Landscape => AspectRatio::Landscape,
            AspectRatioArg::Portrait => AspectRatio::Portrait,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("genstudio=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            serve(args).await?;
        }
        Commands::Generate(args) => {
            generate_image(args, cli.json).await?;
        }
        Commands::Edit(args) => {
            edit_image(args, cli.json).await?;
        }
    }

    Ok(())
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = ProxyConfig::from_env()?;
    if let Some(bind) = args.bind {
        config = config.with_bind(bind);
    }
    if let Some(url) = args.base_url {
        config = config.with_base_url(url);
    }

    genstudio::proxy::serve(config, async {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutting down");
        }
    })
    .await
    .context("proxy failed")?;
    Ok(())
}

fn studio_for(proxy: &ProxyArgs) -> anyhow::Result<Studio<StudioClient>> {
    let client = StudioClient::builder().endpoint(&proxy.proxy).build()?;
    Ok(Studio::new(client))
}

/// Waits for the request, turning Ctrl-C into a stop.
async fn run_to_completion<B: StudioBackend>(studio: &Studio<B>, handle: RequestHandle) {
    let finished = handle.finished();
    tokio::pin!(finished);

    tokio::select! {
        _ = &mut finished => {}
        _ = tokio::signal::ctrl_c() => {
            studio.stop();
            finished.await;
        }
    }
}

fn outcome(state: &StudioState) -> anyhow::Result<()> {
    if let Some(ref error) = state.error {
        anyhow::bail!("{}", error);
    }
    if state.generated_image.is_none() && state.edit_result.is_none() {
        anyhow::bail!("{}", state.status_text);
    }
    Ok(())
}

async fn save(image_url: &str, output: &Path) -> anyhow::Result<(String, usize)> {
    let (mime_type, bytes) = decode_data_url(image_url)?;
    if let Some(format) = ImageFormat::from_mime_type(&mime_type) {
        let ext = output.extension().and_then(|e| e.to_str()).unwrap_or("");
        if ImageFormat::from_extension(ext) != Some(format) {
            tracing::warn!(
                output = %output.display(),
                mime_type = %mime_type,
                expected_extension = format.extension(),
                "output extension does not match the image format"
            );
        }
    }
    tokio::fs::write(output, &bytes)
        .await
        .with_context(|| format!("cannot write {}", output.display()))?;
    Ok((mime_type, bytes.len()))
}

fn report(
    kind: &str,
    output: &Path,
    mime_type: &str,
    size: usize,
    text: Option<&str>,
    json_output: bool,
) -> anyhow::Result<()> {
    if json_output {
        let result = serde_json::json!({
            "type": kind,
            "success": true,
            "output": output.display().to_string(),
            "size_bytes": size,
            "mime_type": mime_type,
            "text": text,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "Saved {} image: {} ({} bytes, {})",
            kind,
            output.display(),
            size,
            mime_type
        );
        if let Some(text) = text {
            println!("{}", text);
        }
    }
    Ok(())
}

async fn generate_image(args: GenerateArgs, json_output: bool) -> anyhow::Result<()> {
    let studio = studio_for(&args.proxy)?;

    let handle = studio.start_generate(&args.prompt);
    run_to_completion(&studio, handle).await;

    let state = studio.state();
    outcome(&state)?;
    let image_url = state
        .generated_image
        .context("the proxy did not return an image")?;

    let (mime_type, size) = save(&image_url, &args.proxy.output).await?;
    report("generated", &args.proxy.output, &mime_type, size, None, json_output)
}

async fn edit_image(args: EditArgs, json_output: bool) -> anyhow::Result<()> {
    let studio = studio_for(&args.proxy)?;

    studio.add_source_images(args.inputs.as_slice()).await?;
    studio.set_aspect_ratio(args.aspect_ratio.map(AspectRatio::from));

    let handle = studio.start_edit(&args.prompt)?;
    run_to_completion(&studio, handle).await;

    let state = studio.state();
    outcome(&state)?;
    let result = state.edit_result.context("the proxy did not return an image")?;

    let (mime_type, size) = save(&result.image_url, &args.proxy.output).await?;
    report(
        "edited",
        &args.proxy.output,
        &mime_type,
        size,
        result.text.as_deref(),
        json_output,
    )
}
