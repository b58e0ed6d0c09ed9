use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sheetshot_core::capture::CaptureClient;
use sheetshot_core::config::ScheduleConfig;
use sheetshot_core::schedule::{daily_label, parse_slot, plan_for, DailySlot};
use sheetshot_core::{ArchiveStore, Scope};
use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

/// Where scheduled captures get their image bytes.
#[async_trait]
pub trait PageSource: Send + Sync + 'static {
    async fn fetch(&self, url: &str) -> sheetshot_core::Result<Vec<u8>>;
}

#[async_trait]
impl PageSource for CaptureClient {
    async fn fetch(&self, url: &str) -> sheetshot_core::Result<Vec<u8>> {
        self.fetch_image(url).await
    }
}

/// Saves the sheet into the system scope on the configured daily slots.
pub struct Scheduler {
    store: Arc<ArchiveStore>,
    source: Box<dyn PageSource>,
    sheet_url: String,
    check_slot: DailySlot,
    report_slot: DailySlot,
    interval: Duration,
}

impl Scheduler {
    pub fn new(
        config: &ScheduleConfig,
        store: Arc<ArchiveStore>,
        source: Box<dyn PageSource>,
        sheet_url: &str,
    ) -> sheetshot_core::Result<Self> {
        Ok(Self {
            store,
            source,
            sheet_url: sheet_url.to_string(),
            check_slot: DailySlot::new(parse_slot(&config.daily_check_time)?),
            report_slot: DailySlot::new(parse_slot(&config.daily_report_time)?),
            interval: Duration::from_secs(config.poll_interval_seconds.max(1)),
        })
    }

    /// Poll the slots until `shutdown` flips to `true`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "scheduler started");
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick(Utc::now()).await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("scheduler stopped");
    }

    /// Fire whichever slots are due at `now`.
    pub async fn tick(&mut self, now: DateTime<Utc>) {
        let (date, time) = (now.date_naive(), now.time());

        if self.check_slot.poll(date, time) {
            self.daily_check(date).await;
        }
        if self.report_slot.poll(date, time) {
            let label = daily_label(date);
            if self.already_captured(&label).await {
                info!(label = %label, "daily report already captured");
            } else {
                self.capture(&label).await;
            }
        }
    }

    /// Capture the month markers due on `date` plus the daily report, unless
    /// today's report already exists.
    pub async fn daily_check(&self, date: NaiveDate) {
        if self.already_captured(&daily_label(date)).await {
            info!(%date, "daily screenshot already exists");
            return;
        }
        for (i, label) in plan_for(date).iter().enumerate() {
            // Image names carry the save time to the second.
            if i > 0 {
                next_second().await;
            }
            self.capture(label).await;
        }
    }

    /// A failed lookup counts as captured.
    async fn already_captured(&self, label: &str) -> bool {
        let store = self.store.clone();
        let owned = label.to_string();
        let lookup = tokio::task::spawn_blocking(move || {
            !store.get_by_label(&owned, Scope::SYSTEM).is_empty()
        })
        .await;
        found_or_skip(lookup, label)
    }

    async fn capture(&self, label: &str) -> bool {
        debug!(label, "scheduled capture");
        let data = match self.source.fetch(&self.sheet_url).await {
            Ok(data) => data,
            Err(e) => {
                error!(label, error = %e, "scheduled capture failed");
                return false;
            }
        };

        let store = self.store.clone();
        let owned = label.to_string();
        let saved = tokio::task::spawn_blocking(move || store.save(&data, &owned, Scope::SYSTEM))
            .await
            .ok()
            .flatten();

        match saved {
            Some(path) => {
                info!(label, path = %path.display(), "scheduled screenshot saved");
                true
            }
            None => {
                warn!(label, "scheduled screenshot not saved");
                false
            }
        }
    }
}

fn found_or_skip(lookup: Result<bool, JoinError>, label: &str) -> bool {
    lookup.unwrap_or_else(|e| {
        error!(label, error = %e, "label lookup failed, skipping capture");
        true
    })
}

/// Sleep until the wall clock has moved into the next second.
async fn next_second() {
    let elapsed = Utc::now().timestamp_subsec_millis().min(999);
    tokio::time::sleep(Duration::from_millis(u64::from(1000 - elapsed) + 5)).await;
}
