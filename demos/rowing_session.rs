use bytes::Bytes;
use ergcast::{
    AntChannelConfig, BroadcastScheduler, ChannelSink, ControlChannel, FramingConfig,
    MetricsSnapshot, Result, SessionStatus,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{error, info};

fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("🚣 Ergcast Rowing Session Example");

    // Stand-in for the ANT USB stick: print every message the scheduler emits
    let (radio, mut radio_rx) = ChannelSink::channel();
    let radio_task = tokio::spawn(async move {
        while let Some(message) = radio_rx.recv().await {
            info!("📡 ANT: {}", to_hex(&message));
        }
    });

    let mut scheduler = BroadcastScheduler::new(AntChannelConfig::default(), Arc::new(radio));
    if let Err(e) = scheduler.start().await {
        error!("❌ Failed to start broadcasting: {}", e);
        return Err(e);
    }
    info!("✅ Broadcasting FE-C pages");

    // Simulated rowing engine: one metrics update per second
    let mut metrics = MetricsSnapshot {
        status: SessionStatus::Rowing,
        drag_factor: 110.0,
        drive_length: 1.4,
        ..MetricsSnapshot::default()
    };
    for second in 1..=5u32 {
        metrics.total_moving_time = f64::from(second);
        metrics.total_linear_distance = f64::from(second) * 3.2;
        metrics.total_number_of_strokes = u64::from(second / 2);
        metrics.cycle_linear_velocity = 3.2;
        metrics.cycle_stroke_rate = 24.0;
        metrics.cycle_power = 180.0;

        scheduler.notify_metrics(metrics.clone()).await?;
        sleep(Duration::from_secs(1)).await;
    }

    // A training app connects and terminates the workout
    info!("📱 Central writes terminate workout command");
    let (notify, mut notify_rx) = ChannelSink::channel();
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let control =
        ControlChannel::new(FramingConfig::default(), Arc::new(notify)).with_events(events_tx);

    // BLE writes may arrive fragmented
    let writes = futures::stream::iter(vec![
        Bytes::from_static(&[0xF1, 0x76, 0x04, 0x13]),
        Bytes::from_static(&[0x02, 0x01, 0x02, 0x60, 0xF2]),
    ]);
    control.run(writes).await;

    while let Some(response) = notify_rx.recv().await {
        info!("🔔 Notify: {}", to_hex(&response));
    }
    while let Some(command) = events.recv().await {
        info!("🛑 Control command received: {}", command);
        metrics.status = SessionStatus::Stopped;
        scheduler.notify_metrics(metrics.clone()).await?;
    }

    sleep(Duration::from_secs(1)).await;

    info!("🔌 Closing ANT channel...");
    scheduler.stop().await?;
    drop(scheduler);
    if let Err(e) = radio_task.await {
        error!("❌ Radio task failed: {}", e);
    }

    info!("✅ Session finished");
    Ok(())
}
