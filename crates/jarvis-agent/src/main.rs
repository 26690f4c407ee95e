//! JARVIS — AI bridge for MATHIS OS.
//! Entry point for the `jarvis` binary.

mod config;
mod toolchain;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use jarvis_llm::{build_router, codegen, BackendRouter};
use jarvis_serial::{BridgeLoop, FrameTransport, PtyEndpoint};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "jarvis", version, about = "AI bridge for MATHIS OS")]
struct Cli {
    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Serve the guest over a pseudo-terminal until Ctrl+C (default).
    Bridge,
    /// Route one question and print the full reply.
    Ask {
        #[arg(required = true, trailing_var_arg = true)]
        prompt: Vec<String>,
    },
    /// Generate Mathis assembly for a feature.
    Code {
        #[arg(required = true, trailing_var_arg = true)]
        description: Vec<String>,
        /// Save under the toolchain root (`auto` derives programs/<feature>.masm).
        #[arg(long)]
        save: Option<PathBuf>,
        /// Assemble the saved file to .mbc.
        #[arg(long, requires = "save")]
        assemble: bool,
    },
}

fn build_backend_router(config: &config::Config) -> BackendRouter {
    let backends = config.backends();
    if backends.is_empty() {
        tracing::warn!("No backends enabled in jarvis.toml; every reply will come from the static responder.");
    }
    build_router(backends, config.persona())
}

async fn run_bridge(config: &config::Config, router: Arc<BackendRouter>) -> anyhow::Result<()> {
    let endpoint = PtyEndpoint::open()?;
    let slave = endpoint.slave_path().display().to_string();
    info!("✅ PTY created: {}", slave);
    info!("   Attach the guest serial port to {}", slave);

    let transport = FrameTransport::new(endpoint)
        .with_chunk_size(config.bridge.read_chunk)
        .with_max_frame(config.bridge.max_frame_bytes);
    let bridge = BridgeLoop::new(transport, router, config.bridge_settings());

    info!("⏳ Waiting for MATHIS OS... Press Ctrl+C to stop.");
    let stats = bridge
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Cannot listen for Ctrl+C, stopping: {e}");
            }
        })
        .await?;
    info!("👋 Bridge stopped after {} replies", stats.replies);
    Ok(())
}

async fn run_code(
    config: &config::Config,
    router: &BackendRouter,
    description: &str,
    save: Option<PathBuf>,
    assemble: bool,
) -> anyhow::Result<()> {
    let code = codegen::generate(router, description).await;
    println!("```masm\n{code}\n```");

    let Some(target) = save else { return Ok(()) };
    let relative = if target.as_os_str() == "auto" { toolchain::program_path(description) } else { target };
    let path = toolchain::save(&config.toolchain.root, &relative, &code)?;
    println!("💾 Saved: {}", path.display());

    if assemble {
        let outcome = toolchain::assemble(&config.assembler_path(), &path).await?;
        if outcome.success() {
            println!("✅ Compiled: {}", outcome.output.display());
        } else {
            anyhow::bail!("Compile error ({}): {}", outcome.status, outcome.stderr);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    // Logs go to stderr so `ask`/`code` output stays clean on stdout.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = config::Config::load()?;
    let router = Arc::new(build_backend_router(&config));
    info!(
        backends = ?router.registered_backends(),
        cap = config.bridge.response_cap,
        "Router ready"
    );

    match cli.command.unwrap_or(Cmd::Bridge) {
        Cmd::Bridge => run_bridge(&config, router).await,
        Cmd::Ask { prompt } => {
            println!("{}", router.route(&prompt.join(" ")).await);
            Ok(())
        }
        Cmd::Code { description, save, assemble } => {
            run_code(&config, &router, &description.join(" "), save, assemble).await
        }
    }
}
