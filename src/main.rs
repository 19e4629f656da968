use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use processengine_runtime::recovery::ResumeRequest;
use processengine_runtime::{
    BootstrapOptions, BootstrapSequencer, ChannelEngine, EnvOverrides, NativeConnector,
    RuntimeModule,
};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "processengine-runtime")]
#[command(about = "Process engine runtime: migrates the repositories and starts the engine")]
struct Cli {
    /// Directory for the embedded store files.
    #[arg(long)]
    sqlite_path: Option<PathBuf>,

    /// Config root; takes precedence over CONFIG_PATH.
    #[arg(long)]
    config_path: Option<PathBuf>,

    /// Environment to load; takes precedence over PROCESS_ENGINE_ENV.
    #[arg(long)]
    environment: Option<String>,

    /// Keep the current working directory.
    #[arg(long)]
    no_chdir: bool,

    /// Also serve the informational routes at `/` and `/security/authority`.
    #[arg(long)]
    http_root_routes: bool,
}

impl Cli {
    fn into_options(self) -> BootstrapOptions {
        let mut env = EnvOverrides::from_env();
        if let Some(path) = self.config_path {
            env.config_path = Some(path.display().to_string());
        }
        if let Some(environment) = self.environment {
            env.environment = Some(environment);
        }

        let mut options = BootstrapOptions::new(env)
            .change_working_dir(!self.no_chdir)
            .use_http_root_routes(self.http_root_routes);
        if let Some(path) = self.sqlite_path {
            options = options.sqlite_path(path);
        }
        options
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %format!("{:#}", err), "process engine runtime failed to start");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let (engine, requests) = ChannelEngine::new(64);
    tokio::spawn(forward_resume_requests(requests));

    let module = RuntimeModule::new(Arc::new(NativeConnector), Arc::new(engine));
    let bootstrapped = BootstrapSequencer::new(cli.into_options())
        .with_module(Arc::new(module))
        .run()
        .await
        .context("bootstrap failed")?;

    info!(
        environment = %bootstrapped.state.environment,
        service_failures = bootstrapped.report.service_failures.len(),
        "process engine runtime started"
    );

    shutdown_signal().await;
    info!("shutting down");
    Ok(())
}

/// Hands resume requests to the execution engine; without one attached they are
/// acknowledged after logging.
async fn forward_resume_requests(mut requests: mpsc::Receiver<ResumeRequest>) {
    while let Some(request) = requests.recv().await {
        info!(
            request_id = %request.request_id,
            process_instance_id = %request.item.process_instance_id,
            correlation_id = %request.item.correlation_id,
            user_id = %request.identity.user_id,
            "resume requested"
        );
        let _ = request.reply.send(Ok(()));
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("processengine_runtime=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install ctrl+c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install sigterm handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
