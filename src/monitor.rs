//! Polling and broadcast of projector state.
//!
//! A single power poller runs on a fixed period for the life of the
//! process, feeding raw readings into the [`PowerTracker`] and maintaining
//! a deduplicated settled-on signal. That signal gates the secondary
//! pollers (temperature, fan speed, volume, picture mode, the
//! picture-settings triple, lamp hours): while the projector is off they
//! idle and their caches hold `None`, because the device cannot answer
//! meaningfully anyway.
//!
//! Every cache is a watch cell: written only by its own poller, readable by
//! any number of consumers, and a newly attached subscriber immediately
//! sees the latest value instead of waiting a tick. One device round trip
//! per metric per tick, no matter how many readers.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::select;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::client::{PictureSettings, ProjectorClient};
use crate::commands::PictureMode;
use crate::power::{PowerSnapshot, PowerStateInfo, PowerTracker};

/// Period shared by the power poller and the gated metric pollers.
pub const POLL_PERIOD: Duration = Duration::from_secs(2);

// ================================================================================================
// ProjectorMonitor

/// Background pollers and the caches they maintain.
pub struct ProjectorMonitor {
    tracker: Arc<PowerTracker>,
    on_rx: watch::Receiver<bool>,
    temperature: watch::Receiver<Option<u16>>,
    fan_speed: watch::Receiver<Option<u16>>,
    volume: watch::Receiver<Option<u8>>,
    picture_mode: watch::Receiver<Option<PictureMode>>,
    picture_settings: watch::Receiver<Option<PictureSettings>>,
    lamp_hours: watch::Receiver<Option<u32>>,
    tasks: TaskTracker,
    cancel: CancellationToken,
}

impl ProjectorMonitor {
    /// Creates the caches and spawns the pollers. The power poller ticks
    /// immediately, so the first reading lands right after startup.
    pub fn start(client: ProjectorClient) -> ProjectorMonitor {
        ProjectorMonitor::start_with_period(client, POLL_PERIOD)
    }

    pub(crate) fn start_with_period(client: ProjectorClient, period: Duration) -> ProjectorMonitor {
        let tracker = Arc::new(PowerTracker::new());
        let (on_tx, on_rx) = watch::channel(false);
        let (temperature_tx, temperature) = watch::channel(None);
        let (fan_speed_tx, fan_speed) = watch::channel(None);
        let (volume_tx, volume) = watch::channel(None);
        let (picture_mode_tx, picture_mode) = watch::channel(None);
        let (picture_settings_tx, picture_settings) = watch::channel(None);
        let (lamp_hours_tx, lamp_hours) = watch::channel(None);

        let tasks = TaskTracker::new();
        let cancel = CancellationToken::new();

        // Power poller. Unconditional: it is the source the whole gating
        // scheme hangs off, so a failed tick feeds `None` into the tracker
        // and the timer keeps running.
        {
            let client = client.clone();
            let tracker = Arc::clone(&tracker);
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let mut ticks = tokio::time::interval(period);

                loop {
                    select! {
                        _ = cancel.cancelled() => break,

                        _ = ticks.tick() => {
                            let reading = match client.power_status().await {
                                Ok(reading) => reading,
                                Err(e) => {
                                    warn!("Power poll failed: {e}");
                                    None
                                }
                            };

                            let snapshot = tracker.observe_reading(reading);

                            // Re-emitted only on actual change.
                            on_tx.send_if_modified(|on| {
                                let next = snapshot.is_settled_on();
                                if *on == next {
                                    false
                                } else {
                                    *on = next;
                                    true
                                }
                            });
                        },
                    }
                }

                info!("Power poller has shut down");
            });
        }

        spawn_gated_poller(&tasks, &cancel, "Temperature", period, on_rx.clone(), temperature_tx, {
            let client = client.clone();
            move || {
                let client = client.clone();
                async move { client.temperature().await }
            }
        });

        spawn_gated_poller(&tasks, &cancel, "Fan speed", period, on_rx.clone(), fan_speed_tx, {
            let client = client.clone();
            move || {
                let client = client.clone();
                async move { client.fan_speed().await }
            }
        });

        spawn_gated_poller(&tasks, &cancel, "Volume", period, on_rx.clone(), volume_tx, {
            let client = client.clone();
            move || {
                let client = client.clone();
                async move { client.volume().await }
            }
        });

        spawn_gated_poller(&tasks, &cancel, "Picture mode", period, on_rx.clone(), picture_mode_tx, {
            let client = client.clone();
            move || {
                let client = client.clone();
                async move { client.picture_mode().await }
            }
        });

        spawn_gated_poller(
            &tasks,
            &cancel,
            "Picture settings",
            period,
            on_rx.clone(),
            picture_settings_tx,
            {
                let client = client.clone();
                move || {
                    let client = client.clone();
                    async move { client.picture_settings().await }
                }
            },
        );

        spawn_gated_poller(&tasks, &cancel, "Lamp hours", period, on_rx.clone(), lamp_hours_tx, {
            let client = client.clone();
            move || {
                let client = client.clone();
                async move { client.lamp_hours().await }
            }
        });

        ProjectorMonitor {
            tracker,
            on_rx,
            temperature,
            fan_speed,
            volume,
            picture_mode,
            picture_settings,
            lamp_hours,
            tasks,
            cancel,
        }
    }

    /// The tracker driven by the power poller. Operator power requests go
    /// through here as well.
    pub fn tracker(&self) -> &PowerTracker {
        &self.tracker
    }

    /// Latest power snapshot.
    pub fn power_snapshot(&self) -> PowerSnapshot {
        self.tracker.snapshot()
    }

    /// Latest power snapshot enriched with the countdown.
    pub fn power_info(&self) -> PowerStateInfo {
        self.tracker.info()
    }

    /// True while the device reads on with no timed phase running.
    pub fn is_on(&self) -> bool {
        *self.on_rx.borrow()
    }

    /// The deduplicated settled-on signal the gated pollers subscribe to.
    pub fn subscribe_on_signal(&self) -> watch::Receiver<bool> {
        self.on_rx.clone()
    }

    pub fn temperature(&self) -> Option<u16> {
        *self.temperature.borrow()
    }

    pub fn fan_speed(&self) -> Option<u16> {
        *self.fan_speed.borrow()
    }

    pub fn volume(&self) -> Option<u8> {
        *self.volume.borrow()
    }

    pub fn picture_mode(&self) -> Option<PictureMode> {
        *self.picture_mode.borrow()
    }

    pub fn picture_settings(&self) -> Option<PictureSettings> {
        *self.picture_settings.borrow()
    }

    pub fn lamp_hours(&self) -> Option<u32> {
        *self.lamp_hours.borrow()
    }

    pub fn subscribe_temperature(&self) -> watch::Receiver<Option<u16>> {
        self.temperature.clone()
    }

    pub fn subscribe_fan_speed(&self) -> watch::Receiver<Option<u16>> {
        self.fan_speed.clone()
    }

    pub fn subscribe_volume(&self) -> watch::Receiver<Option<u8>> {
        self.volume.clone()
    }

    pub fn subscribe_picture_mode(&self) -> watch::Receiver<Option<PictureMode>> {
        self.picture_mode.clone()
    }

    pub fn subscribe_picture_settings(&self) -> watch::Receiver<Option<PictureSettings>> {
        self.picture_settings.clone()
    }

    pub fn subscribe_lamp_hours(&self) -> watch::Receiver<Option<u32>> {
        self.lamp_hours.clone()
    }

    /// Stops every poller and waits for them to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
    }
}

// ================================================================================================
// Gated poller

/// Spawns one conditional poller: idle while `gate` is false, polling
/// `fetch` on `period` while it is true, with the first poll immediately on
/// the off-to-on flip. A failed tick is logged and cached as `None` without
/// stopping the loop; an on-to-off flip resets the cache to `None`.
fn spawn_gated_poller<T, F, Fut>(
    tasks: &TaskTracker,
    cancel: &CancellationToken,
    label: &'static str,
    period: Duration,
    mut gate: watch::Receiver<bool>,
    cache: watch::Sender<Option<T>>,
    fetch: F,
) where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = crate::error::Result<T>> + Send + 'static,
{
    let cancel = cancel.clone();

    tasks.spawn(async move {
        'idle: loop {
            // Idle until the projector settles on.
            while !*gate.borrow_and_update() {
                select! {
                    _ = cancel.cancelled() => break 'idle,
                    changed = gate.changed() => {
                        if changed.is_err() {
                            break 'idle;
                        }
                    },
                }
            }

            debug!("{label} poller starting");
            let mut ticks = tokio::time::interval(period);

            loop {
                select! {
                    // Gate changes outrank a due tick, so the cache is
                    // cleared before another poll can run against a device
                    // that just went off.
                    biased;

                    _ = cancel.cancelled() => break 'idle,

                    changed = gate.changed() => {
                        if changed.is_err() {
                            break 'idle;
                        }
                        if !*gate.borrow_and_update() {
                            cache.send_replace(None);
                            debug!("{label} poller idling");
                            continue 'idle;
                        }
                    },

                    _ = ticks.tick() => {
                        match fetch().await {
                            Ok(value) => {
                                cache.send_replace(Some(value));
                            }
                            Err(e) => {
                                warn!("{label} poll failed: {e}");
                                cache.send_replace(None);
                            }
                        }
                    },
                }
            }
        }

        info!("{label} poller has shut down");
    });
}

// =================================================================
// Tests
