use std::sync::Arc;

use checkin_dispatch::channels::{self, cli};
use checkin_dispatch::config::{DispatchConfig, RuntimeBackend};
use checkin_dispatch::dispatcher::Dispatcher;
use checkin_dispatch::error::Result;
use checkin_dispatch::runtime::{DockerCli, FakeRuntime, WorkerRuntime};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = DispatchConfig::from_env()?;

    let runtime: Arc<dyn WorkerRuntime> = match config.runtime {
        RuntimeBackend::Docker => Arc::new(DockerCli::with_binary(config.docker_bin.clone())),
        RuntimeBackend::Fake => Arc::new(FakeRuntime::new()),
    };
    let dispatcher = Arc::new(Dispatcher::from_config(&config, Arc::clone(&runtime)));

    // One-shot mode: `checkin-dispatch ABC123 Jane Doe`
    let args: Vec<String> = std::env::args().skip(1).collect();
    if !args.is_empty() {
        if let Some(reply) = cli::run_once(&dispatcher, &args.join(" ")).await {
            println!("{reply}");
        }
        return Ok(());
    }

    eprintln!("Check-in dispatch v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Runtime: {}", runtime.name());
    eprintln!("   Worker image: {}", config.worker_image);
    eprintln!("   Verify: {:?}", config.verify);
    eprintln!("   Webhook: http://0.0.0.0:{}/hook", config.port);

    channels::serve(config.port, dispatcher).await?;
    Ok(())
}
