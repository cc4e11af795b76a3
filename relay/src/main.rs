use anyhow::Result;
use clap::Parser;
use relay::catalog::LanguagePairCatalog;
use relay::config::{Args, TranscriberKind};
use relay::origin::OriginPolicy;
use relay::pipeline::Pipeline;
use relay::registry::ArgosRegistry;
use relay::server::RelayServer;
use relay::session::SessionContext;
use relay::transcribe::{Transcriber, WhisperServerTranscriber};
use relay::translate::LibreTranslateTranslator;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn build_transcriber(args: &Args) -> Result<Arc<dyn Transcriber>> {
    match args.transcriber {
        TranscriberKind::WhisperServer => {
            info!("Using whisper server at {}", args.whisper_url);
            Ok(Arc::new(WhisperServerTranscriber::new(&args.whisper_url)))
        }
        #[cfg(feature = "whisper")]
        TranscriberKind::Whisper => {
            use anyhow::Context;
            let model = args
                .model
                .as_ref()
                .context("--model is required for the whisper transcriber")?;
            Ok(Arc::new(relay::transcribe::WhisperTranscriber::load(
                model,
                args.beam_size,
            )?))
        }
        #[cfg(not(feature = "whisper"))]
        TranscriberKind::Whisper => {
            anyhow::bail!("built without the `whisper` feature, use --transcriber whisper-server")
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let addr = args.listen_addr()?;
    let tls = relay::tls::load_acceptor(&args.cert, &args.key)?;

    let transcriber = build_transcriber(&args)?;
    let translator = Arc::new(LibreTranslateTranslator::new(
        &args.translate_url,
        args.translate_api_key.clone(),
    ));

    let registry = ArgosRegistry::new(args.packages_dir(), args.package_index.clone());
    info!("Language packages in {}", registry.packages_dir().display());
    let catalog = Arc::new(LanguagePairCatalog::new(Arc::new(registry)));
    match tokio::time::timeout(args.catalog_timeout(), catalog.refresh()).await {
        Ok(Ok(_)) => info!("Finished checking and installing language packages"),
        Ok(Err(e)) => warn!("Language pair catalog unavailable, starting without it: {}", e),
        Err(_) => warn!(
            "Language pair catalog refresh exceeded {:?}, starting with what is installed",
            args.catalog_timeout()
        ),
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let refresher = args
        .catalog_refresh()
        .map(|every| catalog.clone().spawn_periodic(every, shutdown_rx.clone()));

    let origins = OriginPolicy::for_local_network(
        &args.allow_hosts,
        &args.origin_ports,
        !args.no_absent_origin,
    );
    let ctx = Arc::new(SessionContext {
        pipeline: Pipeline::new(transcriber, translator, args.translation_failure),
        catalog,
        ping_interval: args.ping_interval(),
        ping_timeout: args.ping_timeout(),
    });
    let server = RelayServer::bind(addr, Some(tls), origins, args.websocket_config(), ctx).await?;

    let mut server_task = tokio::spawn(server.run(shutdown_rx));
    tokio::select! {
        done = &mut server_task => return Ok(done??),
        _ = tokio::signal::ctrl_c() => info!("Server stopped by user"),
    }

    let _ = shutdown_tx.send(true);
    server_task.await??;
    if let Some(refresher) = refresher {
        refresher.await?;
    }
    Ok(())
}
