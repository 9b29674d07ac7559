//! framehub CLI
//!
//! Drives the distribution pipeline with a synthetic source and simulated
//! consumers so overflow and fan-out behavior can be watched live.

use clap::{Parser, Subcommand};
use framehub::{ConsumerConfig, PipelineBuilder, PipelineConfig, PipelineStats, QueueConfig};
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "framehub")]
#[command(about = "Bounded frame queues and fan-out distribution")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version and queue defaults
    Info,

    /// Print the default configuration as TOML
    Config,

    /// Run a synthetic pipeline and report statistics
    Run {
        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Seconds to run (0 = until Ctrl+C)
        #[arg(short, long, default_value = "10")]
        duration: u64,

        /// Source framerate (overrides config)
        #[arg(short, long)]
        fps: Option<u32>,

        /// Resolution, e.g. 640x480 (overrides config)
        #[arg(short, long)]
        resolution: Option<String>,

        /// Queue cap for the input queue and every subscriber queue (overrides config)
        #[arg(short, long)]
        max_size: Option<usize>,

        /// Abandon new frames on overflow instead of dropping the oldest (all queues)
        #[arg(long)]
        no_drop_oldest: bool,

        /// Consumer as name[:delay_ms]; repeatable, replaces configured consumers
        #[arg(long = "consumer")]
        consumers: Vec<String>,

        /// Seconds between statistics reports
        #[arg(short, long, default_value = "1")]
        interval: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("framehub=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Info => cmd_info(),
        Commands::Config => cmd_config(),
        Commands::Run {
            config,
            duration,
            fps,
            resolution,
            max_size,
            no_drop_oldest,
            consumers,
            interval,
        } => {
            let mut config = match config {
                Some(path) => PipelineConfig::load(path)?,
                None => PipelineConfig::default(),
            };
            apply_overrides(
                &mut config,
                fps,
                resolution,
                max_size,
                no_drop_oldest,
                consumers,
            )?;
            cmd_run(config, duration, interval).await
        }
    }
}

fn cmd_info() -> anyhow::Result<()> {
    let queue = QueueConfig::default();

    println!("framehub {}", framehub::VERSION);
    println!("=============\n");
    println!("Queue defaults:");
    println!("  Initial capacity: {}", queue.initial_capacity);
    println!("  Max size: {}", queue.max_size);
    println!(
        "  Overflow: {}",
        if queue.drop_oldest {
            "drop oldest"
        } else {
            "abandon newest"
        }
    );
    println!("  Receive timeout: {} ms", queue.recv_timeout_ms);

    Ok(())
}

fn cmd_config() -> anyhow::Result<()> {
    print!("{}", PipelineConfig::default().to_toml_string()?);
    Ok(())
}

fn apply_overrides(
    config: &mut PipelineConfig,
    fps: Option<u32>,
    resolution: Option<String>,
    max_size: Option<usize>,
    no_drop_oldest: bool,
    consumers: Vec<String>,
) -> anyhow::Result<()> {
    if let Some(fps) = fps {
        config.source = config.source.clone().with_fps(fps);
    }

    if let Some(res) = resolution {
        let parts: Vec<&str> = res.split('x').collect();
        match parts.as_slice() {
            [w, h] => {
                let (w, h) = (w.parse::<u32>()?, h.parse::<u32>()?);
                config.source = config.source.clone().with_resolution(w, h);
            }
            _ => anyhow::bail!("Invalid resolution: {} (expected WIDTHxHEIGHT)", res),
        }
    }

    if let Some(max_size) = max_size {
        config.queue.max_size = max_size;
    }
    if no_drop_oldest {
        config.queue.drop_oldest = false;
    }

    if !consumers.is_empty() {
        config.consumers = consumers
            .iter()
            .map(|s| parse_consumer(s.as_str()))
            .collect::<anyhow::Result<_>>()?;
    }

    config.validate()?;
    Ok(())
}

fn parse_consumer(spec: &str) -> anyhow::Result<ConsumerConfig> {
    match spec.split_once(':') {
        Some((name, delay)) => Ok(ConsumerConfig::new(name).with_delay_ms(delay.parse()?)),
        None => Ok(ConsumerConfig::new(spec)),
    }
}

async fn cmd_run(config: PipelineConfig, duration: u64, interval: u64) -> anyhow::Result<()> {
    println!("Starting pipeline...\n");
    println!("Configuration:");
    println!(
        "  Source: {} @ {}",
        config.source.resolution, config.source.framerate
    );
    println!(
        "  Queue: max {} ({})",
        config.queue.max_size,
        if config.queue.drop_oldest {
            "drop oldest"
        } else {
            "abandon newest"
        }
    );
    for consumer in &config.consumers {
        println!("  Consumer: {} ({} ms/frame)", consumer.name, consumer.delay_ms);
    }
    println!();

    let mut pipeline = PipelineBuilder::from_config(config).build()?;
    pipeline.start()?;

    if duration == 0 {
        println!("Running. Press Ctrl+C to stop.\n");
    } else {
        println!("Running for {}s. Press Ctrl+C to stop early.\n", duration);
    }

    let started = Instant::now();
    let deadline = (duration > 0).then(|| started + Duration::from_secs(duration));
    let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nStopping...");
                break;
            }
            _ = ticker.tick() => {
                print_stats(&pipeline.stats(), started.elapsed());
                if !pipeline.is_running() {
                    println!("Source exhausted.");
                    break;
                }
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    break;
                }
            }
        }
    }

    let stats = pipeline.stats();
    pipeline.stop()?;

    println!("\nFinal statistics:");
    print_stats(&stats, started.elapsed());

    Ok(())
}

fn print_stats(stats: &PipelineStats, elapsed: Duration) {
    let secs = elapsed.as_secs_f64().max(f64::EPSILON);
    println!(
        "[{:>6.1}s] captured {} ({:.1} fps), distributed {}, subscribers {}",
        elapsed.as_secs_f64(),
        stats.frames_captured,
        stats.frames_captured as f64 / secs,
        stats.frames_distributed,
        stats.subscribers
    );
    for consumer in &stats.consumers {
        println!(
            "  {:<12} processed {:>7}  queued {:>5}  dropped {:>6}  abandoned {:>6}",
            consumer.name,
            consumer.processed,
            consumer.queued,
            consumer.queue.dropped,
            consumer.queue.abandoned
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_consumer() {
        let plain = parse_consumer("viewer").unwrap();
        assert_eq!(plain.name, "viewer");
        assert_eq!(plain.delay_ms, 0);

        let slow = parse_consumer("tracker:40").unwrap();
        assert_eq!(slow.name, "tracker");
        assert_eq!(slow.delay_ms, 40);

        assert!(parse_consumer("tracker:fast").is_err());
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = PipelineConfig::default();
        apply_overrides(
            &mut config,
            Some(15),
            Some("320x240".into()),
            Some(8),
            true,
            vec!["a".into(), "b:10".into()],
        )
        .unwrap();

        assert_eq!(config.source.framerate.num, 15);
        assert_eq!(config.source.resolution.width, 320);
        assert_eq!(config.queue.max_size, 8);
        assert!(!config.queue.drop_oldest);
        assert_eq!(config.consumers.len(), 2);
    }

    #[test]
    fn test_apply_overrides_rejects_bad_input() {
        let mut config = PipelineConfig::default();
        assert!(apply_overrides(&mut config, None, Some("640".into()), None, false, vec![]).is_err());

        let mut config = PipelineConfig::default();
        assert!(apply_overrides(&mut config, None, None, Some(0), false, vec![]).is_err());
    }
}
