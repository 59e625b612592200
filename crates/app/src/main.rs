use std::io::BufRead;
use std::sync::Arc;
use std::thread;

use clap::Parser;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;

use micbridge_app::bridge::{Bridge, BridgeEvent, EventSink};
use micbridge_app::keys::KeyRelay;
use micbridge_audio::{CaptureController, CpalRecorder, HostPermissions};
use micbridge_foundation::clock::real_clock;
use micbridge_foundation::shutdown::ShutdownHandler;
use micbridge_foundation::timer::TimerService;
use micbridge_routing::{NoopRouteBackend, RouteTiming, RouterController, ScoState};

#[derive(Parser, Debug)]
#[command(name = "micbridge", about = "Microphone capture and Bluetooth SCO routing bridge")]
struct Args {
    /// Capture sample rate in Hz
    #[arg(long, env = "MICBRIDGE_SAMPLE_RATE", default_value_t = 24_000)]
    sample_rate: u32,

    /// Also steer the audio path onto the Bluetooth headset link
    #[arg(long, env = "MICBRIDGE_ROUTE_SCO", default_value_t = false)]
    route_sco: bool,
}

fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all("logs")?;
    let file_appender = RollingFileAppender::new(Rotation::DAILY, "logs", "micbridge.log");
    let (non_blocking_file, _guard) = tracing_appender::non_blocking(file_appender);
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_writer(std::io::stdout.and(non_blocking_file))
        .with_env_filter(log_level)
        .init();
    std::mem::forget(_guard);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging().map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;
    let args = Args::parse();
    tracing::info!("Starting MicBridge");

    // Outbound events. Bounded so a slow consumer throttles the capture
    // thread instead of queueing chunks.
    let (event_tx, event_rx) = crossbeam_channel::bounded::<BridgeEvent>(8);

    // --- Capture engine ---
    let capture = Arc::new(CaptureController::new(
        Arc::new(CpalRecorder::new()),
        Arc::new(HostPermissions),
        Arc::new(EventSink::new(event_tx.clone())),
    ));

    // --- SCO routing ---
    // Desktop hosts have no SCO notification source; the channel stays
    // open and silent.
    let (_sco_tx, sco_rx) = crossbeam_channel::unbounded::<ScoState>();
    let timers = TimerService::new(real_clock());
    let (router, log_rx) = RouterController::new(
        Arc::new(NoopRouteBackend::new()),
        sco_rx,
        timers,
        RouteTiming::default(),
    );
    let bridge = Arc::new(Bridge::new(Arc::clone(&capture), router));

    // Route logs join the same event stream.
    let route_event_tx = event_tx.clone();
    thread::Builder::new()
        .name("route-log".to_string())
        .spawn(move || {
            for log in log_rx.iter() {
                if route_event_tx
                    .send(BridgeEvent::RouterLog {
                        message: log.message,
                    })
                    .is_err()
                {
                    break;
                }
            }
        })?;

    // Mic-key demo feed: "down" / "up" lines on stdin pass through the
    // relay, which strips auto-repeats.
    let key_event_tx = event_tx.clone();
    thread::Builder::new().name("mic-key".to_string()).spawn(move || {
        let mut relay = KeyRelay::new();
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let event = match line.trim() {
                "down" => relay.key_down(),
                "up" => relay.key_up(),
                _ => None,
            };
            if let Some(kind) = event {
                if key_event_tx.send(BridgeEvent::MicKey { kind }).is_err() {
                    break;
                }
            }
        }
    })?;

    // Event consumer: one JSON line per event on stdout.
    thread::Builder::new().name("event-writer".to_string()).spawn(move || {
        for event in event_rx.iter() {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::error!("failed to serialize event: {e}"),
            }
        }
    })?;

    let shutdown = ShutdownHandler::new().install().await;

    if args.route_sco {
        match bridge.enable_route() {
            Ok(report) => tracing::info!(?report, "SCO routing enabled"),
            Err(e) => tracing::warn!("SCO routing failed to enable: {e}"),
        }
    }

    match bridge.start(Some(args.sample_rate)) {
        Ok(payload) => tracing::info!(
            sample_rate_hz = payload.sample_rate_hz,
            buffer_len = payload.buffer_len,
            "capture started"
        ),
        Err(e) => {
            tracing::error!("capture failed to start: {e}");
            return Err(e.into());
        }
    }

    shutdown.wait().await;
    tracing::info!("Beginning graceful shutdown");
    bridge.teardown();
    tracing::info!("MicBridge stopped");
    Ok(())
}
