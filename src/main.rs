use bytes::BytesMut;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use app::App;
use clock::SystemClock;
use command::Reply;
use config::Config;
use persistence::{FileKv, KeyValue, MemoryKv};
use store::{ContentStore, LoadOutcome, StoreSettings};
use viewer::{TokioScheduler, Viewer};

mod app;
mod clock;
mod command;
mod config;
mod item;
mod payload;
mod persistence;
mod store;
mod viewer;

fn open_backend(config: &Config) -> anyhow::Result<Box<dyn KeyValue>> {
    let backend: Box<dyn KeyValue> = match config.dir() {
        Some(dir) => {
            let kv = FileKv::open(dir)?;
            info!(dir = %kv.dir().display(), "storing stories on disk");
            Box::new(kv)
        }
        None => {
            info!("no --dir given, stories live in memory only");
            Box::new(MemoryKv::default())
        }
    };
    Ok(backend)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Replies go to stdout, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_args(std::env::args().skip(1))?;
    let settings = StoreSettings {
        key: config.key().to_string(),
        ttl: config.ttl()?,
    };
    let sweep = config.sweep()?;

    let (store, outcome) = ContentStore::init(open_backend(&config)?, SystemClock, settings);
    match &outcome {
        LoadOutcome::Restored(count) => info!(count, "restored stories"),
        LoadOutcome::Empty => info!("no stories stored yet"),
        LoadOutcome::Recovered(e) => warn!(error = %e, "discarded unreadable stories"),
    }
    let (scheduler, mut dwell_elapsed) = TokioScheduler::new();
    let mut app = App::new(store, Viewer::new(scheduler, config.dwell()?));

    let mut sweeper = interval_at(Instant::now() + sweep, sweep);
    sweeper.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Raw segments so a line that is not UTF-8 gets an error reply instead of ending input
    let mut lines = BufReader::new(tokio::io::stdin()).split(b'\n');
    let mut stdout = tokio::io::stdout();
    let mut output_buf = BytesMut::with_capacity(512);

    loop {
        output_buf.clear();
        tokio::select! {
            line = lines.next_segment() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        debug!("stdin closed");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to read stdin");
                        break;
                    }
                };
                let Some(reply) = app.handle_line(&line) else {
                    continue;
                };
                reply.serialize(&mut output_buf);
                stdout.write_all(&output_buf).await?;
                stdout.flush().await?;
                if reply == Reply::Bye {
                    break;
                }
            }
            Some(id) = dwell_elapsed.recv() => {
                if let Some(reply) = app.dwell_elapsed(id) {
                    reply.serialize(&mut output_buf);
                    stdout.write_all(&output_buf).await?;
                    stdout.flush().await?;
                }
            }
            _ = sweeper.tick() => {
                app.sweep();
            }
        }
    }

    app.shutdown();
    Ok(())
}
