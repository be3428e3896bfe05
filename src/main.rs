use anyhow::Context;
use tokio::io::BufReader;

use tweet_sentiment::config::{PipelineConfig, SinkConfig};
use tweet_sentiment::source::{LineSource, RecordSource};
use tweet_sentiment::window::SentimentRuntime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = PipelineConfig::from_env().context("Invalid pipeline configuration")?;
    let sink_config = SinkConfig::from_env().context("Invalid sink configuration")?;

    eprintln!("📈 Tweet Sentiment v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Topic: {}", config.topic);
    eprintln!(
        "   Window: {} ms (join timeout {} ms)",
        config.window_duration.as_millis(),
        config.join_timeout.as_millis()
    );
    eprintln!("   Language: {}", config.target_language);
    if let Some(dir) = &sink_config.output_dir {
        eprintln!("   Output: {}", dir.display());
    }
    if let Some(path) = &sink_config.db_path {
        eprintln!("   Database: {}", path.display());
    }
    if let Some(url) = &sink_config.notify_url {
        eprintln!("   Notify: {url}");
    }

    // ── Runtime ─────────────────────────────────────────────────────────
    let runtime = SentimentRuntime::from_config(config, &sink_config)
        .await
        .context("Failed to start sentiment runtime")?;

    // ── Source ──────────────────────────────────────────────────────────
    let source: Box<dyn RecordSource> = match std::env::var("SENTIMENT_INPUT") {
        Ok(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("Failed to open input {path}"))?;
            eprintln!("   Input: {path}");
            Box::new(LineSource::new(path, 0, BufReader::new(file)))
        }
        Err(_) => {
            eprintln!("   Input: stdin (one tweet JSON per line)\n");
            Box::new(LineSource::new("stdin", 0, BufReader::new(tokio::io::stdin())))
        }
    };

    let stats = runtime.stats();
    let mut handle = runtime.start(vec![source]);

    let interrupted = tokio::select! {
        _ = handle.wait() => false,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl-C received, shutting down");
            true
        }
    };
    let summaries = handle.shutdown().await;

    let snapshot = stats.snapshot();
    eprintln!();
    for summary in &summaries {
        eprintln!(
            "   Partition {}: {} windows ({} dispatched, {} abandoned)",
            summary.partition,
            summary.windows_closed,
            summary.windows_dispatched,
            summary.windows_abandoned
        );
    }
    eprintln!(
        "   Records: {} received, {} rejected, {} late, {} labeled",
        snapshot.records_received,
        snapshot.rejected_total(),
        snapshot.late_dropped,
        snapshot.records_labeled
    );
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    if interrupted {
        // The stdin reader blocks in a thread the runtime would wait on.
        std::process::exit(0);
    }
    Ok(())
}
