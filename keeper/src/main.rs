// File: keeper/src/main.rs
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use keeper::archive::{ArchivePipeline, ObjectStore, PipelineOptions, S3Store, SnapshotKind};
use keeper::config::{Config, ConfigManager};
use keeper::rcon::RetryConnect;
use keeper::scheduler::operations::{pause_saves, resume_saves, scheduler_span};
use keeper::scheduler::{SchedulerSettings, SnapshotScheduler};
use keeper::shutdown::install_shutdown_handler;

#[derive(Parser)]
#[command(name = "keeper", version, about = "Game server snapshot keeper")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config/main.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watch the server and capture snapshots until interrupted
    Run,
    /// Capture and publish one snapshot, then exit
    Archive {
        #[arg(short, long, default_value = "server")]
        kind: SnapshotKind,
        /// Files or glob patterns relative to the server directory (misc only)
        files: Vec<String>,
    },
    /// Upload an already-packaged archive
    Publish {
        file: PathBuf,
        #[arg(short, long, default_value = "server")]
        kind: SnapshotKind,
    },
    /// List stored archives for the configured user, oldest first
    List {
        #[arg(short, long)]
        kind: Option<SnapshotKind>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::from_default_env()
        .add_directive("keeper=info".parse()?)
        .add_directive("aws_config=warn".parse()?)
        .add_directive("aws_smithy_runtime=warn".parse()?)
        .add_directive("hyper=warn".parse()?);

    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    let config_manager = ConfigManager::new(&cli.config)
        .await
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let config = config_manager.get_current_config();

    let store: Arc<dyn ObjectStore> = Arc::new(S3Store::new(&config.archive).await);
    let descriptor = Arc::new(config.server_descriptor(store));
    let pipeline = ArchivePipeline::new(
        descriptor,
        PipelineOptions {
            acl: config.archive.acl.clone(),
            staging_directory: config.staging_directory(),
            upload_timeout: config.upload_timeout(),
        },
    );

    match cli.command {
        Command::Run => run(&config, pipeline).await,
        Command::Archive { kind, files } => archive_once(&config, pipeline, kind, files).await,
        Command::Publish { file, kind } => {
            let receipt = pipeline
                .publish_file(&file, kind)
                .await
                .with_context(|| format!("publishing {}", file.display()))?;
            println!("{}", serde_json::to_string_pretty(&receipt)?);
            Ok(())
        }
        Command::List { kind } => {
            let user = pipeline.descriptor().user.clone();
            let archives = pipeline.list_archives(&user, kind).await?;
            for archive in &archives {
                println!("{}\t{}\t{}", archive.timestamp.to_rfc3339(), archive.kind, archive);
            }
            info!("{} archives stored for {}", archives.len(), user);
            Ok(())
        }
    }
}

async fn run(config: &Config, pipeline: ArchivePipeline) -> Result<()> {
    let shutdown = install_shutdown_handler().context("installing signal handlers")?;
    let retry = RetryConnect::from_config(config);
    let settings = SchedulerSettings::from_config(config);

    info!(
        "Starting keeper for {} ({})",
        config.server.name,
        config.server.cluster.as_deref().unwrap_or("no cluster")
    );

    let mut scheduler = tokio::select! {
        _ = shutdown.cancelled() => {
            info!("Shutdown requested before the server answered");
            return Ok(());
        }
        connected = SnapshotScheduler::connect(pipeline, settings, &retry) => {
            connected.context("could not reach the server's control channel")?
        }
    };

    scheduler.run(shutdown).await;
    info!("Keeper stopped");
    Ok(())
}

async fn archive_once(
    config: &Config,
    pipeline: ArchivePipeline,
    kind: SnapshotKind,
    files: Vec<String>,
) -> Result<()> {
    let retry = RetryConnect::from_config(config);
    let descriptor = pipeline.descriptor();
    let span = scheduler_span(descriptor);
    let mut console = retry
        .connect(
            &descriptor.public_ip,
            descriptor.rcon_port,
            &descriptor.rcon_password,
        )
        .await
        .context("could not reach the server's control channel")?;

    let quiesce = config.scheduler.quiesce_saves;
    if quiesce {
        if let Err(e) = pause_saves(&mut console).await {
            resume_saves(&mut console, &span).await;
            return Err(e).context("pausing saves");
        }
    }

    let result = pipeline.capture(kind, &files).await;

    if quiesce {
        resume_saves(&mut console, &span).await;
    }

    match result {
        Ok(receipt) => {
            println!("{}", serde_json::to_string_pretty(&receipt)?);
            Ok(())
        }
        Err(e) => {
            error!("Error creating an archive and publishing: {}", e);
            Err(e.into())
        }
    }
}
