use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{error, info};
use velomodes::{
    protocol::ControlPointCommand, BikeData, CommandSink, CyclingDevice, DeviceConfig,
    ManualClock, ModeKind, Result, TrainerClass, TrainerProfile, UpdateRequest,
};

/// Sink that logs every frame instead of writing to a trainer
struct LoggingSink;

#[async_trait]
impl CommandSink for LoggingSink {
    async fn write_control_point(&self, frame: Bytes) -> Result<Option<Bytes>> {
        match ControlPointCommand::from_bytes(&frame) {
            Ok(command) => info!("  -> {:?} {:02X?}", command.opcode, command.payload),
            Err(e) => error!("❌ Unexpected frame {:02X?}: {}", frame.as_ref(), e),
        }
        Ok(None)
    }
}

/// Power the rider holds on a given grade
fn rider_power(slope: f64) -> f64 {
    (180.0 + slope * 25.0).max(60.0)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("🚴 Velomodes Ride Simulation Example");

    let clock = Arc::new(ManualClock::new());
    let adapter = Arc::new(
        TrainerProfile::new("Simulated Trainer", TrainerClass::SimulationTrainer)
            .with_weights(72.0, 9.0),
    );
    let device = CyclingDevice::new(adapter, clock.clone(), Arc::new(LoggingSink), DeviceConfig::default())?;

    info!("🔌 Starting device in {} mode", device.mode_kind().await);
    device.start().await?;

    // A short route: flat, climb, descent
    let route = [(0.0, 60), (4.0, 120), (7.5, 90), (-5.0, 60), (0.0, 30)];
    for (slope, seconds) in route {
        info!("⛰️  Slope {slope:+.1}% for {seconds}s");
        device.send_update(&UpdateRequest::slope(slope)).await?;

        for _ in 0..seconds {
            clock.advance_secs(1);
            device
                .handle_data(&BikeData::sample(rider_power(slope), 88.0, 135.0))
                .await;
        }

        if let Some(data) = device.latest().await {
            info!(
                "📊 {:.0} W, {:.1} km/h, {:.2} km, {:.0} s",
                data.power,
                data.speed,
                data.distance_internal / 1000.0,
                data.time.unwrap_or_default()
            );
        }
    }

    info!("⚡ Switching to ERG for a 2 minute interval");
    device.set_mode(ModeKind::Erg).await?;
    device.send_update(&UpdateRequest::target_power(250.0)).await?;
    for _ in 0..120 {
        clock.advance_secs(1);
        device.handle_data(&BikeData::sample(248.0, 92.0, 160.0)).await;
    }
    if let Some(data) = device.latest().await {
        info!("📊 ERG: {:.0} W, {:.1} km/h", data.power, data.speed);
    }

    device.reset().await?;
    info!("✅ Ride finished");
    Ok(())
}
