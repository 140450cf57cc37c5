use std::{io::ErrorKind, net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::mpsc};
use tracing::{debug, info, warn};

use leafbridge_common::{
    command_filter, route_command, BridgeConfig, ClimateCommand, CommandRoute,
    CONNECTED_PAYLOAD,
};

use crate::{
    bridge::{forward_command, Bridge, InboundCommand, SharedStatus, Upstream},
    vehicle::SimulatedVehicle,
};

const MAX_MQTT_PAYLOAD_BYTES: usize = 1024;
const COMMAND_QUEUE_DEPTH: usize = 16;

#[derive(Clone)]
struct AppState {
    status: SharedStatus,
    commands: mpsc::Sender<InboundCommand>,
    device_id: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
struct ClimateRequest {
    state: String,
}

/// Where the MQTT pump sends what it receives.
#[derive(Clone)]
struct CommandSink {
    command_topic: String,
    telemetry_topic: String,
    device_id: String,
    commands: mpsc::Sender<InboundCommand>,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = load_config().await?;
    info!(
        "bridging {} to mqtt://{}:{} (commands on {}, telemetry on {})",
        config.device_id,
        config.mqtt_server,
        config.mqtt_port,
        config.command_topic,
        config.telemetry_topic
    );

    let mqtt_config = config.mqtt();
    let mut mqtt_options = MqttOptions::new(
        format!("leafbridge-{}", config.device_id),
        mqtt_config.host,
        mqtt_config.port,
    );
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    if !mqtt_config.user.is_empty() {
        mqtt_options.set_credentials(mqtt_config.user, mqtt_config.pass);
    }

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    let status = SharedStatus::default();

    let upstream = Upstream::new(
        SimulatedVehicle::new(),
        mqtt.clone(),
        config.credentials(),
        config.telemetry_topic.clone(),
    );
    let bridge = Bridge::new(upstream, &config.scheduler, status.clone());

    spawn_mqtt_loop(
        mqtt,
        eventloop,
        CommandSink {
            command_topic: config.command_topic.clone(),
            telemetry_topic: config.telemetry_topic.clone(),
            device_id: config.device_id.clone(),
            commands: commands_tx.clone(),
        },
    );
    tokio::spawn(bridge.run(commands_rx));

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/climate", post(handle_set_climate))
        .with_state(AppState {
            status,
            commands: commands_tx,
            device_id: config.device_id.clone(),
        });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind status server at {addr}"))?;

    info!("status server listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for shutdown signal: {err}");
                std::future::pending::<()>().await;
            }
            info!("shutdown requested");
        })
        .await?;
    Ok(())
}

async fn load_config() -> anyhow::Result<BridgeConfig> {
    let path = std::env::var("LEAFBRIDGE_OPTIONS")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./options.json"));

    let mut config = match tokio::fs::read(&path).await {
        Ok(raw) => BridgeConfig::from_json(&raw)
            .with_context(|| format!("failed to parse options file {}", path.display()))?,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            warn!("options file {} not found; using environment only", path.display());
            BridgeConfig::default()
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read options file {}", path.display()))
        }
    };

    config.apply_overrides(|key| std::env::var(key).ok())?;
    config.scheduler.sanitize();
    config.validate()?;
    Ok(config)
}

fn spawn_mqtt_loop(mqtt: AsyncClient, mut eventloop: rumqttc::EventLoop, sink: CommandSink) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Some(command) =
                        route_message(&sink, &message.topic, message.payload.to_vec())
                    {
                        forward_command(&sink.commands, command).await;
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                    if let Err(err) = announce(&mqtt, &sink).await {
                        warn!("mqtt subscribe/announce failed: {err:#}");
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

async fn announce(mqtt: &AsyncClient, sink: &CommandSink) -> anyhow::Result<()> {
    let filter = command_filter(&sink.command_topic);
    mqtt.subscribe(filter.as_str(), QoS::AtMostOnce)
        .await
        .with_context(|| format!("failed to subscribe to {filter}"))?;
    mqtt.publish(
        sink.telemetry_topic.as_str(),
        QoS::AtLeastOnce,
        false,
        CONNECTED_PAYLOAD,
    )
    .await
    .context("failed to publish connect announcement")?;
    Ok(())
}

fn route_message(sink: &CommandSink, topic: &str, payload: Vec<u8>) -> Option<InboundCommand> {
    match route_command(&sink.command_topic, topic) {
        Some(CommandRoute::Climate) => {}
        Some(CommandRoute::Unknown(subtopic)) => {
            warn!("ignoring message on unknown command subtopic {subtopic:?}");
            return None;
        }
        None => {
            debug!("ignoring message on {topic}");
            return None;
        }
    }

    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return None;
    }

    match String::from_utf8(payload) {
        Ok(payload) => Some(InboundCommand {
            device_id: sink.device_id.clone(),
            payload,
        }),
        Err(err) => {
            warn!("dropping non utf8 payload on {topic}: {err}");
            None
        }
    }
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.status.lock().await.clone();
    Json(status)
}

async fn handle_set_climate(
    State(state): State<AppState>,
    Json(request): Json<ClimateRequest>,
) -> axum::response::Response {
    let Ok(desired) = request.state.to_ascii_uppercase().parse::<ClimateCommand>() else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid state. Use 'ON' or 'OFF'");
    };

    let command = InboundCommand {
        device_id: state.device_id.clone(),
        payload: desired.as_str().to_string(),
    };

    if forward_command(&state.commands, command).await {
        StatusCode::ACCEPTED.into_response()
    } else {
        error_response(StatusCode::SERVICE_UNAVAILABLE, "bridge is not running")
    }
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
