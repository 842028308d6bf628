use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use lora_gateway_bridge::config::BridgeConfig;
use lora_gateway_bridge::constants::{
    BRIDGE_CONF_DEFAULT, BRIDGE_TOPIC_CONF_DEFAULT, LOG_LEVEL_DEFAULT,
};
use lora_gateway_bridge::logger;
use lora_gateway_bridge::supervisor::{self, RunOptions};

/// Bridge between a Semtech UDP packet forwarder and an MQTT broker
#[derive(Parser, Debug)]
#[command(name = "lora-gateway-bridge")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = BRIDGE_CONF_DEFAULT)]
    config: PathBuf,

    /// Persisted topic record
    #[arg(long, default_value = BRIDGE_TOPIC_CONF_DEFAULT)]
    topic_file: PathBuf,

    /// Log filter (trace, debug, info, warn, error or a RUST_LOG directive),
    /// overrides the configured level
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the configuration file and exit
    Validate,
}

fn cmd_validate(config_path: &Path) -> ExitCode {
    match BridgeConfig::from_file(config_path) {
        Ok(config) => {
            let mqtt = config.mqtt();
            println!("Configuration valid!");
            println!();
            println!("UDP bind:   {}", config.backend.semtech_udp.udp_bind);
            println!("Interface:  {}", config.general.interface);
            println!("Marshaler:  {:?}", config.integration.marshaler);
            println!("Broker:     {}", mqtt.server);
            println!("QoS:        {}", mqtt.qos);
            println!("TLS:        {}", if mqtt.tls().is_some() { "yes" } else { "no" });
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Some(Commands::Validate) = args.command {
        return cmd_validate(&args.config);
    }

    let options = RunOptions {
        config_path: args.config,
        topic_file: args.topic_file,
        log_filter: args.log_level,
    };
    match supervisor::run(options).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // No-op when the configured logger is already installed.
            let _ = logger::init(LOG_LEVEL_DEFAULT, None, None);
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
