// Settlement Scheduler - runs the settlement pass in the background
//
// Interval mode runs a pass every N seconds, starting immediately.
// Daily mode runs once per day at a fixed UTC hour.

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

use crate::config::Config;
use crate::settlement::SettlementService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementFrequency {
    Interval(Duration),
    /// UTC hour to execute settlement (0-23)
    Daily { hour: u32 },
}

#[derive(Debug, Clone)]
pub struct SettlementScheduleConfig {
    pub frequency: SettlementFrequency,
}

impl SettlementScheduleConfig {
    /// A configured daily hour takes precedence over the interval
    pub fn from_config(config: &Config) -> Self {
        let frequency = match config.settlement_daily_hour {
            Some(hour) => SettlementFrequency::Daily { hour },
            None => SettlementFrequency::Interval(Duration::from_secs(
                config.settlement_interval_secs.max(1),
            )),
        };
        Self { frequency }
    }
}

pub struct SettlementScheduler {
    config: SettlementScheduleConfig,
    service: Arc<SettlementService>,
}

impl SettlementScheduler {
    pub fn new(config: SettlementScheduleConfig, service: Arc<SettlementService>) -> Self {
        Self { config, service }
    }

    /// Start the settlement scheduler (runs in background)
    pub fn start(&self) -> JoinHandle<()> {
        let frequency = self.config.frequency;
        let service = self.service.clone();

        tokio::spawn(async move {
            match frequency {
                SettlementFrequency::Interval(period) => {
                    Self::run_interval_scheduler(period, &service).await
                }
                SettlementFrequency::Daily { hour } => {
                    Self::run_daily_scheduler(hour, &service).await
                }
            }
        })
    }

    async fn run_interval_scheduler(period: Duration, service: &SettlementService) {
        info!("⏰ Settlement scheduled every {}s", period.as_secs());

        let mut interval = interval(period);
        // A slow pass delays the next one instead of bunching them up
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            Self::run_once(service).await;
        }
    }

    async fn run_daily_scheduler(execution_hour: u32, service: &SettlementService) {
        loop {
            let now = Utc::now();
            let next_execution = Self::calculate_next_daily_execution(now, execution_hour);
            let duration_until_execution = next_execution.signed_duration_since(now);

            if let Ok(wait) = duration_until_execution.to_std() {
                info!(
                    "⏰ Next settlement scheduled for: {} UTC",
                    next_execution.format("%Y-%m-%d %H:%M:%S")
                );
                tokio::time::sleep(wait).await;
            }

            Self::run_once(service).await;
        }
    }

    async fn run_once(service: &SettlementService) {
        if let Err(e) = service.run_pass().await {
            error!("❌ Settlement pass failed: {:?}", e);
        }
    }

    /// Calculate next daily execution time
    fn calculate_next_daily_execution(now: DateTime<Utc>, execution_hour: u32) -> DateTime<Utc> {
        let at = NaiveTime::from_hms_opt(execution_hour, 0, 0).unwrap_or_default();
        let today = Utc.from_utc_datetime(&now.date_naive().and_time(at));

        // If execution time has passed today, schedule for tomorrow
        if today <= now {
            today + chrono::Duration::days(1)
        } else {
            today
        }
    }
}
