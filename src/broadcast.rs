use crate::{
    ant::{encode_page, AntMessage, AntPage, BroadcastCycle, PageFields, PageType, SessionState},
    error::{ErgcastError, Result},
    sink::ByteSink,
    types::{AntChannelConfig, MetricsSnapshot},
};
use bytes::Bytes;
use std::sync::Arc;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::{self, Instant, Interval, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

/// Everything the FE-C broadcast carries from one tick to the next
///
/// Metrics are converted to page units when they arrive, so a tick only
/// selects a page, encodes it and advances the rotation.
#[derive(Debug, Clone)]
pub struct FeBroadcaster {
    channel: u8,
    session: SessionState,
    fields: PageFields,
    cycle: BroadcastCycle,
}

impl FeBroadcaster {
    /// Broadcaster for `channel` using the standard page rotation
    #[must_use]
    pub fn new(channel: u8) -> Self {
        Self::with_cycle(channel, BroadcastCycle::new())
    }

    /// Broadcaster with a custom page rotation
    #[must_use]
    pub fn with_cycle(channel: u8, cycle: BroadcastCycle) -> Self {
        Self {
            channel,
            session: SessionState::new(),
            fields: PageFields::default(),
            cycle,
        }
    }

    /// Take in a metrics update; call once per update, not per tick
    pub fn update_metrics(&mut self, metrics: &MetricsSnapshot) {
        self.fields = PageFields::from(metrics);
        self.session.apply(metrics.status);
    }

    /// Clear all metrics and return the session to Ready with a lap flip
    pub fn reset(&mut self) {
        self.fields = PageFields::default();
        self.session.reset();
    }

    /// Encode the page selected by the rotation and advance it
    ///
    /// The rotation advances even when encoding fails, so the next tick moves on.
    ///
    /// # Errors
    ///
    /// Returns [`ErgcastError::UnknownPage`] if the rotation holds a page id the
    /// encoder does not know. Nothing is produced for that tick.
    pub fn next_page(&mut self) -> Result<AntPage> {
        let page = self.cycle.current();
        self.cycle.advance();

        let page = PageType::try_from(page)?;
        Ok(encode_page(page, self.channel, &self.fields, &self.session))
    }

    /// [`Self::next_page`] wrapped in an ANT broadcast-data message
    ///
    /// # Errors
    ///
    /// See [`Self::next_page`].
    pub fn next_message(&mut self) -> Result<Bytes> {
        let page = self.next_page()?;
        Ok(AntMessage::broadcast_data(&page).to_bytes())
    }

    /// Current session state
    #[must_use]
    pub const fn session(&self) -> &SessionState {
        &self.session
    }

    /// Current position in the rotation
    #[must_use]
    pub const fn cycle(&self) -> &BroadcastCycle {
        &self.cycle
    }

    fn restart_cycle(&mut self) {
        self.cycle.reset();
    }
}

struct RunningBroadcast {
    metrics: mpsc::Sender<MetricsSnapshot>,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<FeBroadcaster>,
}

/// Fixed-rate FE-C broadcaster
///
/// While running, a tokio task owns the [`FeBroadcaster`] and encodes one page
/// per channel period. Metrics updates reach the task through a bounded channel
/// and are applied before any pending tick. Ticks never overlap, and stopping
/// waits for an in-flight tick to finish.
///
/// # Examples
///
/// ```no_run
/// use ergcast::{AntChannelConfig, BroadcastScheduler, ChannelSink, MetricsSnapshot};
/// use std::sync::Arc;
///
/// # async fn example() -> ergcast::Result<()> {
/// let (sink, mut radio) = ChannelSink::channel();
/// let mut scheduler = BroadcastScheduler::new(AntChannelConfig::default(), Arc::new(sink));
///
/// scheduler.start().await?;
/// scheduler.notify_metrics(MetricsSnapshot::default()).await?;
///
/// while let Some(message) = radio.recv().await {
///     // hand the message to the ANT stick
/// #   let _ = message;
/// #   break;
/// }
///
/// scheduler.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct BroadcastScheduler {
    config: AntChannelConfig,
    sink: Arc<dyn ByteSink>,
    rotation: BroadcastCycle,
    idle: Option<FeBroadcaster>,
    running: Option<RunningBroadcast>,
}

impl BroadcastScheduler {
    /// Create a stopped scheduler writing to `sink`
    #[must_use]
    pub fn new(config: AntChannelConfig, sink: Arc<dyn ByteSink>) -> Self {
        let broadcaster = FeBroadcaster::new(config.channel);
        Self::with_broadcaster(config, sink, broadcaster)
    }

    /// Create a stopped scheduler around an existing broadcaster
    #[must_use]
    pub fn with_broadcaster(
        config: AntChannelConfig,
        sink: Arc<dyn ByteSink>,
        broadcaster: FeBroadcaster,
    ) -> Self {
        Self {
            config,
            sink,
            rotation: broadcaster.cycle().clone(),
            idle: Some(broadcaster),
            running: None,
        }
    }

    /// Whether the broadcast task is running
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Broadcaster state, available while stopped
    #[must_use]
    pub const fn broadcaster(&self) -> Option<&FeBroadcaster> {
        self.idle.as_ref()
    }

    /// Open the ANT channel and start broadcasting from the top of the rotation
    ///
    /// # Errors
    ///
    /// Returns [`ErgcastError::AlreadyRunning`] if called twice, or the sink error
    /// if a channel setup message cannot be written.
    pub async fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Err(ErgcastError::AlreadyRunning);
        }
        let mut broadcaster = self.idle.take().ok_or(ErgcastError::AlreadyRunning)?;

        info!(
            "ANT+ broadcast start [device={} channel={}]",
            self.config.device_number, self.config.channel
        );

        for message in AntMessage::channel_setup(&self.config) {
            if let Err(e) = self.sink.write(message.to_bytes()).await {
                error!("ANT+ channel setup failed: {}", e);
                self.idle = Some(broadcaster);
                return Err(e);
            }
        }

        broadcaster.restart_cycle();

        let (metrics_tx, metrics_rx) = mpsc::channel(self.config.metrics_capacity.max(1));
        let (stop_tx, stop_rx) = oneshot::channel();
        let period = self.config.broadcast_interval();
        let ticker = time::interval_at(Instant::now() + period, period);
        let sink = self.sink.clone();

        let handle = tokio::spawn(run_broadcast(broadcaster, sink, metrics_rx, stop_rx, ticker));

        self.running = Some(RunningBroadcast {
            metrics: metrics_tx,
            stop: stop_tx,
            handle,
        });

        Ok(())
    }

    /// Hand a metrics update to the broadcaster
    ///
    /// # Errors
    ///
    /// Returns [`ErgcastError::ChannelClosed`] if the broadcast task has exited.
    pub async fn notify_metrics(&mut self, metrics: MetricsSnapshot) -> Result<()> {
        if let Some(running) = &self.running {
            return running
                .metrics
                .send(metrics)
                .await
                .map_err(|_| ErgcastError::ChannelClosed);
        }

        if let Some(broadcaster) = self.idle.as_mut() {
            broadcaster.update_metrics(&metrics);
        }
        Ok(())
    }

    /// Stop broadcasting, close the ANT channel and reset the session
    ///
    /// # Errors
    ///
    /// Returns [`ErgcastError::NotRunning`] if the scheduler is stopped, or
    /// [`ErgcastError::Task`] if the broadcast task panicked. A panicked task
    /// takes its session with it; the broadcaster is rebuilt on the same
    /// rotation, Ready with the lap bit clear.
    pub async fn stop(&mut self) -> Result<()> {
        let running = self.running.take().ok_or(ErgcastError::NotRunning)?;

        let _ = running.stop.send(());
        let joined = running.handle.await;

        info!(
            "ANT+ broadcast stopped [device={} channel={}]",
            self.config.device_number, self.config.channel
        );

        for message in AntMessage::channel_teardown(&self.config) {
            if let Err(e) = self.sink.write(message.to_bytes()).await {
                warn!("ANT+ channel teardown write failed: {}", e);
            }
        }

        match joined {
            Ok(mut broadcaster) => {
                broadcaster.reset();
                self.idle = Some(broadcaster);
                Ok(())
            }
            Err(e) => {
                error!("ANT+ broadcast task failed: {}", e);
                self.idle = Some(FeBroadcaster::with_cycle(
                    self.config.channel,
                    self.rotation.clone(),
                ));
                Err(e.into())
            }
        }
    }
}

impl Drop for BroadcastScheduler {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.handle.abort();
        }
    }
}

async fn run_broadcast(
    mut broadcaster: FeBroadcaster,
    sink: Arc<dyn ByteSink>,
    mut metrics: mpsc::Receiver<MetricsSnapshot>,
    mut stop: oneshot::Receiver<()>,
    mut ticker: Interval,
) -> FeBroadcaster {
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!("Broadcast task started, period {:?}", ticker.period());

    loop {
        tokio::select! {
            biased;
            _ = &mut stop => break,
            Some(update) = metrics.recv() => broadcaster.update_metrics(&update),
            _ = ticker.tick() => broadcast_tick(&mut broadcaster, sink.as_ref()).await,
        }
    }

    debug!("Broadcast task finished");
    broadcaster
}

async fn broadcast_tick(broadcaster: &mut FeBroadcaster, sink: &dyn ByteSink) {
    let index = broadcaster.cycle().index();

    match broadcaster.next_message() {
        Ok(message) => {
            if let Err(e) = sink.write(message).await {
                warn!("ANT+ page write failed at rotation index {}: {}", index, e);
            }
        }
        Err(e) => error!("Skipping broadcast at rotation index {}: {}", index, e),
    }
}
