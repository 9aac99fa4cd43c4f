//! cycleq CLI: run the consumer and manage its queue.

use clap::{Parser, Subcommand};
use cycleq::config::{Config, ConsumerConfig};
use cycleq::db::Db;
use cycleq::downstream::{CommandCaller, ProtectedCaller};
use cycleq::engine::{Cycle, CycleScheduler};
use cycleq::queue::PgmqGateway;
use cycleq::telemetry::{TelemetryConfig, init_telemetry};
use secrecy::ExposeSecret;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "cycleq", about = "Bounded-cycle queue consumer")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the consumer until Ctrl-C
    Serve {
        /// Executable invoked once per message, payload on stdin
        #[arg(long)]
        command: PathBuf,
        /// TOML file with consumer tuning overrides
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Enqueue messages
    Send {
        /// Message body
        body: String,
        /// How many copies to send
        #[arg(long, default_value_t = 1)]
        count: u32,
        /// Delivery delay in seconds
        #[arg(long, default_value_t = 0)]
        delay: i32,
    },
    /// Queue administration
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
}

#[derive(Subcommand)]
enum QueueAction {
    /// Create the queue (idempotent)
    Create,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Serve {
            command,
            config: consumer,
        } => cmd_serve(config, command, consumer).await,
        Command::Send { body, count, delay } => {
            let db = connect(&config, 2).await?;
            let payload = serde_json::Value::String(body);
            for _ in 0..count {
                let msg_id = db
                    .send_to_queue(&config.queue_name, &payload, delay)
                    .await?;
                println!("Sent: {msg_id}");
            }
            Ok(())
        }
        Command::Queue {
            action: QueueAction::Create,
        } => {
            connect(&config, 1).await?;
            println!("Queue ready: {}", config.queue_name);
            Ok(())
        }
    }
}

async fn connect(config: &Config, max_connections: u32) -> anyhow::Result<Db> {
    let db = Db::connect(config.database_url.expose_secret(), max_connections).await?;
    db.health_check().await?;
    db.ensure_pgmq().await?;
    db.create_queue(&config.queue_name).await?;
    Ok(db)
}

async fn cmd_serve(
    config: Config,
    command: PathBuf,
    consumer: Option<PathBuf>,
) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig {
        log_level: config.log_level.clone(),
        endpoint: config.otel_endpoint.clone(),
        service_name: "cycleq".to_string(),
    })?;

    let consumer = match consumer {
        Some(path) => ConsumerConfig::from_toml_file(&path)?,
        None => {
            let consumer = ConsumerConfig::default();
            consumer.validate()?;
            consumer
        }
    };

    // One connection per in-flight ack/extend plus the receive loop, capped.
    let max_connections = u32::try_from(consumer.batch_size + 1)
        .unwrap_or(u32::MAX)
        .min(32);
    let db = Arc::new(connect(&config, max_connections).await?);

    let queue = Arc::new(PgmqGateway::new(
        db,
        config.queue_name.clone(),
        consumer.visibility_timeout(),
    ));
    let downstream = Arc::new(ProtectedCaller::new(
        CommandCaller::new(&command, config.queue_name.clone())?,
        &consumer.downstream,
    ));

    let scheduler = CycleScheduler::new(Cycle::new(queue, downstream, &consumer));

    let sched = scheduler.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        sched.shutdown();
    });

    scheduler.run().await;
    Ok(())
}
