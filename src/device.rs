use crate::{
    adapter::{create_default_mode, create_mode, DeviceAdapter},
    clock::Clock,
    error::{CyclingError, Result},
    mode::CyclingMode,
    protocol::{encode_request, ControlPointCommand, ControlPointResponse},
    settings::SettingValue,
    types::{BikeData, ModeKind, UpdateRequest},
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// Timing of control point writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Time allowed for a single write, grown by half on every retry
    pub command_timeout_ms: u64,
    /// Retries after the first failed attempt
    pub max_retry_attempts: u32,
    /// Pause between attempts
    pub retry_delay_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            command_timeout_ms: 3000,
            max_retry_attempts: 3,
            retry_delay_ms: 500,
        }
    }
}

/// Transport that delivers control point frames to a trainer
///
/// Implementations wrap a BLE characteristic, a serial link or, in tests,
/// a plain buffer. A returned frame is treated as the machine's indication
/// and checked for success.
#[async_trait]
pub trait CommandSink: Send + Sync {
    /// Write one frame
    async fn write_control_point(&self, frame: Bytes) -> Result<Option<Bytes>>;
}

/// A trainer driven through a cycling mode
///
/// Telemetry and control requests share one lock on the mode, so a data
/// update never observes a half-applied request and vice versa. Commands
/// hold a separate write lock for their whole normalize-and-write cycle, so
/// frames go out in the order their requests were normalized. The write lock
/// is always taken before the mode lock, and the mode lock is never held
/// across a write.
///
/// # Examples
///
/// ```no_run
/// # use std::sync::Arc;
/// # use velomodes::{
/// #     BikeData, CommandSink, CyclingDevice, DeviceConfig, MonotonicClock, TrainerClass,
/// #     TrainerProfile, UpdateRequest,
/// # };
/// # async fn ride(sink: Arc<dyn CommandSink>) -> velomodes::Result<()> {
/// let adapter = Arc::new(TrainerProfile::new("Kickr", TrainerClass::ErgTrainer));
/// let device = CyclingDevice::new(
///     adapter,
///     Arc::new(MonotonicClock::new()),
///     sink,
///     DeviceConfig::default(),
/// )?;
/// device.start().await?;
/// device.send_update(&UpdateRequest::target_power(180.0)).await?;
/// let data = device.handle_data(&BikeData::sample(178.0, 88.0, 120.0)).await;
/// println!("{:.1} km/h", data.speed);
/// # Ok(())
/// # }
/// ```
pub struct CyclingDevice {
    adapter: Arc<dyn DeviceAdapter>,
    clock: Arc<dyn Clock>,
    mode: Arc<Mutex<Box<dyn CyclingMode>>>,
    sink: Arc<dyn CommandSink>,
    write_lock: Arc<Mutex<()>>,
    latest: Arc<RwLock<Option<BikeData>>>,
    started: Arc<RwLock<bool>>,
    config: DeviceConfig,
}

impl CyclingDevice {
    /// Device running the adapter's default mode
    ///
    /// # Errors
    ///
    /// Returns [`CyclingError::UnsupportedMode`] if the adapter lists no modes.
    pub fn new(
        adapter: Arc<dyn DeviceAdapter>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn CommandSink>,
        config: DeviceConfig,
    ) -> Result<Self> {
        let mode = create_default_mode(adapter.clone(), clock.clone())?;
        Ok(Self::with_mode(adapter, clock, sink, mode, config))
    }

    /// Device running an already built mode
    #[must_use]
    pub fn with_mode(
        adapter: Arc<dyn DeviceAdapter>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn CommandSink>,
        mode: Box<dyn CyclingMode>,
        config: DeviceConfig,
    ) -> Self {
        Self {
            adapter,
            clock,
            mode: Arc::new(Mutex::new(mode)),
            sink,
            write_lock: Arc::new(Mutex::new(())),
            latest: Arc::new(RwLock::new(None)),
            started: Arc::new(RwLock::new(false)),
            config,
        }
    }

    /// Write configuration
    #[must_use]
    pub const fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Take control of the trainer and send the mode's initial request
    ///
    /// # Errors
    ///
    /// Returns an error if any write fails after all retries.
    pub async fn start(&self) -> Result<()> {
        info!(device = self.adapter.name(), "starting device");
        let _writer = self.write_lock.lock().await;
        self.write_with_retry(&ControlPointCommand::request_control()).await?;
        self.write_with_retry(&ControlPointCommand::start()).await?;

        let (init, simulation) = {
            let mode = self.mode.lock().await;
            (mode.bike_init_request(), mode.simulation_parameters())
        };
        for command in encode_request(&init, simulation.as_ref()) {
            self.write_with_retry(&command).await?;
        }

        *self.started.write().await = true;
        Ok(())
    }

    /// Check whether [`CyclingDevice::start`] completed
    pub async fn is_started(&self) -> bool {
        *self.started.read().await
    }

    /// Fold one telemetry sample into the ride state
    pub async fn handle_data(&self, raw: &BikeData) -> BikeData {
        let data = self.mode.lock().await.update_data(raw);
        *self.latest.write().await = Some(data.clone());
        data
    }

    /// Normalize a control request and write it to the trainer
    ///
    /// Returns the normalized request. An empty result writes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`CyclingError::NotReady`] before [`CyclingDevice::start`],
    /// otherwise any write error left after all retries.
    pub async fn send_update(&self, request: &UpdateRequest) -> Result<UpdateRequest> {
        if !self.is_started().await {
            return Err(CyclingError::NotReady {
                reason: "device not started".to_string(),
            });
        }

        let _writer = self.write_lock.lock().await;
        let (normalized, simulation) = {
            let mut mode = self.mode.lock().await;
            let normalized = mode.send_bike_update(request);
            (normalized, mode.simulation_parameters())
        };

        if normalized.reset {
            *self.latest.write().await = None;
        }

        let commands = encode_request(&normalized, simulation.as_ref());
        debug!(
            device = self.adapter.name(),
            ?normalized,
            commands = commands.len(),
            "sending update"
        );
        for command in &commands {
            self.write_with_retry(command).await?;
        }
        Ok(normalized)
    }

    /// Reset both the mode and the trainer
    ///
    /// # Errors
    ///
    /// See [`CyclingDevice::send_update`].
    pub async fn reset(&self) -> Result<()> {
        self.send_update(&UpdateRequest::reset()).await?;
        Ok(())
    }

    /// Switch to another cycling mode
    ///
    /// The new mode starts from a clean state. Once the device is started the
    /// new mode's initial request is written immediately.
    ///
    /// # Errors
    ///
    /// Returns [`CyclingError::UnsupportedMode`] if the adapter does not list
    /// `kind`, or a write error.
    pub async fn set_mode(&self, kind: ModeKind) -> Result<()> {
        let next = create_mode(kind, self.adapter.clone(), self.clock.clone())?;
        let init = next.bike_init_request();
        let simulation = next.simulation_parameters();

        let _writer = self.write_lock.lock().await;
        {
            let mut mode = self.mode.lock().await;
            info!(device = self.adapter.name(), from = %mode.kind(), to = %kind, "switching mode");
            *mode = next;
        }
        *self.latest.write().await = None;

        if self.is_started().await {
            for command in encode_request(&init, simulation.as_ref()) {
                self.write_with_retry(&command).await?;
            }
        }
        Ok(())
    }

    /// Active mode
    pub async fn mode_kind(&self) -> ModeKind {
        self.mode.lock().await.kind()
    }

    /// Change one setting of the active mode
    ///
    /// # Errors
    ///
    /// Returns the mode's validation error.
    pub async fn set_setting(&self, key: &str, value: SettingValue) -> Result<()> {
        self.mode.lock().await.set_setting(key, value)
    }

    /// Last reconciled sample
    pub async fn latest(&self) -> Option<BikeData> {
        self.latest.read().await.clone()
    }

    /// Feed every sample of a telemetry stream through the mode
    ///
    /// Returns the number of samples processed once the stream ends.
    pub async fn run<S>(&self, mut samples: S) -> usize
    where
        S: Stream<Item = BikeData> + Unpin,
    {
        let mut count = 0;
        while let Some(sample) = samples.next().await {
            self.handle_data(&sample).await;
            count += 1;
        }
        info!(device = self.adapter.name(), samples = count, "telemetry stream ended");
        count
    }

    /// Write a command, retrying timeouts and transport failures
    ///
    /// A negative indication from the trainer is final and not retried.
    async fn write_with_retry(&self, command: &ControlPointCommand) -> Result<()> {
        let frame = command.to_bytes();
        let max_retries = self.config.max_retry_attempts;
        let mut current_timeout = self.config.command_timeout_ms;
        let mut attempt = 0;

        loop {
            let outcome = tokio::time::timeout(
                Duration::from_millis(current_timeout),
                self.sink.write_control_point(frame.clone()),
            )
            .await;

            let err = match outcome {
                Ok(Ok(None)) => return Ok(()),
                Ok(Ok(Some(indication))) => {
                    return ControlPointResponse::from_bytes(&indication)?.into_result();
                }
                Ok(Err(e)) => e,
                Err(_) => CyclingError::Timeout {
                    timeout_ms: current_timeout,
                },
            };

            if attempt >= max_retries || !err.is_recoverable() {
                error!(
                    "Command {:?} failed after {} attempts: {}",
                    command.opcode,
                    attempt + 1,
                    err
                );
                return Err(err);
            }

            warn!(
                "Command {:?} failed on attempt {}/{}, retrying in {}ms: {}",
                command.opcode,
                attempt + 1,
                max_retries + 1,
                self.config.retry_delay_ms,
                err
            );
            attempt += 1;
            current_timeout = current_timeout.saturating_mul(3).saturating_div(2);
            tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
        }
    }
}
