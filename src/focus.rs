use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::store::FocusLogHandle;
use crate::{log_error, log_info};

const ENABLE_LOGS: bool = false;

pub const MILLIS_PER_TICK: u64 = 500;
const ONE_MINUTE_IN_MILLIS: i64 = 60_000;

/// Per-window focus/idle state machine. All inputs carry their own
/// timestamp, so this type never reads the clock; the driver does.
///
/// Output is a raw chunk to append to the focus log. A focused stretch
/// looks like `\n1226282384020 W0 focus 505 560 488` with one elapsed
/// value per tick, punctuated by `inactive`/`active` marker lines when
/// the user goes idle and comes back.
pub struct FocusSampler {
    window_id: String,
    focused: bool,
    user_active: bool,
    /// -1 while no ticker is running.
    last_tick_millis: i64,
    last_activity_millis: i64,
    last_key_down_millis: i64,
}

impl FocusSampler {
    pub fn new(window_id: &str, now_millis: i64) -> Self {
        Self {
            window_id: window_id.to_string(),
            focused: false,
            user_active: true,
            last_tick_millis: -1,
            last_activity_millis: now_millis,
            last_key_down_millis: 0,
        }
    }

    /// Millis of the last keydown in this window, 0 if none yet. Stamped
    /// onto load-start entries so typed navigations can be told apart from
    /// clicked ones.
    pub fn last_key_down_millis(&self) -> i64 {
        self.last_key_down_millis
    }

    pub fn record_activity(&mut self, now_millis: i64) {
        self.last_activity_millis = now_millis;
    }

    pub fn record_key_down(&mut self, now_millis: i64) {
        self.last_activity_millis = now_millis;
        self.last_key_down_millis = now_millis;
    }

    /// Window gained focus. Returns the chunk to append plus whether a
    /// ticker needs to be started.
    pub fn on_focus(&mut self, now_millis: i64) -> (Option<String>, bool) {
        if self.focused {
            return (None, false);
        }
        self.focused = true;
        let chunk = format!("\n{} {} focus", now_millis, self.window_id);
        let start_ticker = self.last_tick_millis < 0;
        if start_ticker {
            self.last_tick_millis = now_millis;
        }
        (Some(chunk), start_ticker)
    }

    /// Window lost focus. The blur line is stamped with the last tick time
    /// rather than now, so the tick arithmetic on the line stays closed.
    pub fn on_blur(&mut self) -> Option<String> {
        if !self.focused {
            return None;
        }
        self.focused = false;
        let chunk = format!("\n{} {} blur", self.last_tick_millis, self.window_id);
        self.last_tick_millis = -1;
        Some(chunk)
    }

    /// One ticker firing. Returns the chunk to append, or `None` when the
    /// window is no longer focused and the ticker should stop.
    pub fn on_tick(&mut self, now_millis: i64) -> Option<String> {
        if !self.focused {
            self.last_tick_millis = -1;
            return None;
        }

        let mut chunk = format!(" {}", now_millis - self.last_tick_millis);
        self.last_tick_millis = now_millis;

        let millis_since_activity = now_millis - self.last_activity_millis;
        if self.user_active && millis_since_activity >= ONE_MINUTE_IN_MILLIS {
            self.user_active = false;
            chunk.push_str(&format!("\n{} {} inactive", now_millis, self.window_id));
        }
        if !self.user_active && millis_since_activity < ONE_MINUTE_IN_MILLIS {
            self.user_active = true;
            // The timestamp is when activity resumed, not this tick; ticks
            // after it remain relative to the tick cadence
            chunk.push_str(&format!(
                "\n{} {} active",
                self.last_activity_millis, self.window_id
            ));
        }
        Some(chunk)
    }
}

/// Owns the async side of focus sampling: a 500ms ticker per focused
/// window, feeding [`FocusSampler`] and appending its chunks to the
/// shared focus log.
pub struct FocusDriver {
    sampler: Arc<Mutex<FocusSampler>>,
    focus_log: FocusLogHandle,
    /// Replaced with a fresh token each focused stretch; blur burns it.
    cancel: Mutex<CancellationToken>,
}

impl FocusDriver {
    pub fn new(sampler: Arc<Mutex<FocusSampler>>, focus_log: FocusLogHandle) -> Self {
        Self {
            sampler,
            focus_log,
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn on_focus(&self) -> crate::error::Result<()> {
        let (chunk, start_ticker) = self
            .sampler
            .lock()
            .unwrap()
            .on_focus(Utc::now().timestamp_millis());
        if let Some(chunk) = chunk {
            self.focus_log.write(&chunk)?;
        }
        if start_ticker {
            self.spawn_ticker();
        }
        Ok(())
    }

    pub fn on_blur(&self) -> crate::error::Result<()> {
        let chunk = self.sampler.lock().unwrap().on_blur();
        if let Some(chunk) = chunk {
            self.focus_log.write(&chunk)?;
        }
        self.cancel.lock().unwrap().cancel();
        Ok(())
    }

    /// Stop the ticker without writing anything; used on window close.
    pub fn shutdown(&self) {
        self.cancel.lock().unwrap().cancel();
    }

    fn spawn_ticker(&self) {
        let sampler = self.sampler.clone();
        let focus_log = self.focus_log.clone();
        let cancel_token = CancellationToken::new();
        *self.cancel.lock().unwrap() = cancel_token.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(MILLIS_PER_TICK));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first interval tick fires immediately; skip it so elapsed
            // values reflect real cadence
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let chunk = sampler.lock().unwrap().on_tick(Utc::now().timestamp_millis());
                        match chunk {
                            Some(chunk) => {
                                if let Err(err) = focus_log.write(&chunk) {
                                    log_error!("focus log write failed: {err:?}");
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                    _ = cancel_token.cancelled() => {
                        log_info!("focus ticker shutting down");
                        break;
                    }
                }
            }
        });
    }
}
