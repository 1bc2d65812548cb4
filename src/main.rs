//! trackflow - run a tracking dataflow graph
//!
//! ```text
//! trackflow <graph.toml|graph.json> [--settings settings.toml] [--duration secs]
//! trackflow --list
//! ```
//!
//! The network runs until the duration elapses, Ctrl-C is pressed, or stdin
//! is closed (unless the graph reads stdin itself through `KeyboardEvent`).

use anyhow::{bail, Context};
use std::path::PathBuf;
use std::time::Duration;
use trackflow::config::{GraphConfig, LoggingSettings, Settings};
use trackflow::dataflow::{ComponentFactory, Network};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const USAGE: &str = "usage: trackflow <graph.toml|graph.json> [--settings FILE] [--duration SECS] | --list";

#[derive(Debug, Default)]
struct Args {
    graph: Option<PathBuf>,
    settings: Option<PathBuf>,
    duration: Option<Duration>,
    list: bool,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Args> {
    let mut parsed = Args::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--list" => parsed.list = true,
            "--settings" => {
                let path = args.next().context("--settings needs a file")?;
                parsed.settings = Some(PathBuf::from(path));
            }
            "--duration" => {
                let secs = args.next().context("--duration needs a number of seconds")?;
                let secs: f64 = secs.parse().with_context(|| format!("invalid duration '{secs}'"))?;
                parsed.duration = Some(run_duration(secs)?);
            }
            "-h" | "--help" => bail!("{USAGE}"),
            flag if flag.starts_with("--") => bail!("unknown option {flag}\n{USAGE}"),
            path => {
                if parsed.graph.replace(PathBuf::from(path)).is_some() {
                    bail!("only one graph file can be given\n{USAGE}");
                }
            }
        }
    }
    Ok(parsed)
}

fn run_duration(secs: f64) -> anyhow::Result<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|e| anyhow::anyhow!("invalid duration {secs}: {e}"))
}

/// Terminal logging plus optional daily log files. The returned guard
/// flushes the file writer when dropped.
fn init_tracing(logging: &LoggingSettings) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));
    let (file_layer, guard) = match &logging.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, &logging.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_ansi(logging.ansi))
        .with(file_layer)
        .init();
    guard
}

/// Block until the run should end.
fn wait_for_shutdown(duration: Option<Duration>, watch_stdin: bool) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;
    runtime.block_on(async {
        let elapsed = async {
            match duration {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending().await,
            }
        };
        let stdin_closed = async {
            if !watch_stdin {
                return std::future::pending().await;
            }
            let reader = tokio::task::spawn_blocking(|| {
                use std::io::BufRead;
                for line in std::io::stdin().lock().lines() {
                    if line.is_err() {
                        break;
                    }
                }
            });
            let _ = reader.await;
        };
        tokio::select! {
            _ = elapsed => tracing::info!("Run time elapsed"),
            _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted"),
            _ = stdin_closed => tracing::info!("Input closed"),
        }
    });
    // the stdin reader may still be blocked
    runtime.shutdown_background();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = parse_args(std::env::args().skip(1))?;

    if args.list {
        let factory = ComponentFactory::with_builtins();
        for class in factory.classes() {
            println!("{class}");
        }
        return Ok(());
    }

    let Some(graph_path) = args.graph else {
        bail!("{USAGE}");
    };
    let settings = match &args.settings {
        Some(path) => Settings::load(path).with_context(|| format!("loading settings {}", path.display()))?,
        None => Settings::default(),
    };
    let duration = match args.duration {
        Some(d) => Some(d),
        None => settings.run_duration().context("invalid settings")?,
    };
    let _log_guard = init_tracing(&settings.logging);

    tracing::info!("Starting trackflow with {}", graph_path.display());
    let graph = GraphConfig::load(&graph_path).with_context(|| format!("loading graph {}", graph_path.display()))?;
    let factory = ComponentFactory::with_builtins();
    let network = Network::build(&graph, &factory, settings.dispatch).context("building network")?;
    tracing::info!("Built {} components", network.len());
    network.start().context("starting network")?;

    let keyboard = graph.components.iter().any(|c| c.class == "KeyboardEvent");
    if duration.is_none() && keyboard {
        tracing::info!("Stdin is read by KeyboardEvent; stop with Ctrl-C");
    }
    wait_for_shutdown(duration, !keyboard)?;

    tracing::info!("Shutting down...");
    network.stop();
    drop(network);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> anyhow::Result<Args> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_args() {
        let parsed = args(&["graph.toml", "--duration", "2.5", "--settings", "s.toml"]).unwrap();
        assert_eq!(parsed.graph, Some(PathBuf::from("graph.toml")));
        assert_eq!(parsed.settings, Some(PathBuf::from("s.toml")));
        assert_eq!(parsed.duration, Some(Duration::from_millis(2500)));
        assert!(!parsed.list);
        assert!(args(&["--list"]).unwrap().list);
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(args(&["--duration"]).is_err());
        assert!(args(&["--duration", "-1"]).is_err());
        assert!(args(&["--duration", "NaN"]).is_err());
        assert!(args(&["--duration", "1e300"]).is_err());
        assert!(args(&["a.toml", "b.toml"]).is_err());
        assert!(args(&["--verbose"]).is_err());
    }
}
