//! How many machines of each template an environment can still offer in a window

use crate::client::ResourceClient;
use crate::label_selector::LabelSelector;
use crate::resources::{Environment, ScheduledEvent};
use crate::utils::parse_unix_date;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxAvailable {
    /// template name -> machines left
    pub available_count: BTreeMap<String, i32>,
}

#[async_trait]
pub trait AvailabilityOracle: Send + Sync {
    /// `start` and `end` are UnixDate timestamps
    ///
    /// Fails with [`Error::InvalidRequest`] for unparseable bounds and
    /// [`Error::NotFound`] for an unknown environment.
    async fn max_available(&self, environment: &str, start: &str, end: &str) -> Result<MaxAvailable>;
}

/// Capacity minus the machines reserved by overlapping, unfinished scheduled events
#[derive(Clone)]
pub struct ScheduledEventAvailability {
    environments: ResourceClient<Environment>,
    scheduled_events: ResourceClient<ScheduledEvent>,
}

impl ScheduledEventAvailability {
    pub fn new(
        environments: ResourceClient<Environment>,
        scheduled_events: ResourceClient<ScheduledEvent>,
    ) -> Self {
        Self {
            environments,
            scheduled_events,
        }
    }
}

fn parse_bound(name: &str, value: &str) -> Result<DateTime<Utc>> {
    parse_unix_date(value).map_err(|e| Error::InvalidRequest(format!("invalid {} time: {}", name, e)))
}

/// Window of a scheduled event, or `None` if it cannot be read
fn event_window(event: &ScheduledEvent) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = parse_unix_date(&event.spec.start_time).ok()?;
    let end = parse_unix_date(&event.spec.end_time).ok()?;
    Some((start, end))
}

fn is_finished(event: &ScheduledEvent) -> bool {
    event.status.as_ref().is_some_and(|status| status.finished)
}

#[async_trait]
impl AvailabilityOracle for ScheduledEventAvailability {
    async fn max_available(&self, environment: &str, start: &str, end: &str) -> Result<MaxAvailable> {
        let start = parse_bound("start", start)?;
        let end = parse_bound("end", end)?;
        if end < start {
            return Err(Error::InvalidRequest("end time is before start time".to_string()));
        }

        let env = self.environments.get(environment).await?;
        let mut available_count = env.spec.count_capacity.clone();

        for event in self.scheduled_events.list(&LabelSelector::new()).await? {
            if is_finished(&event) {
                continue;
            }
            let Some(required) = event.spec.required_vms.get(environment) else {
                continue;
            };
            let Some((event_start, event_end)) = event_window(&event) else {
                warn!(
                    "Skipping scheduled event {} with unreadable window",
                    event.metadata.name.as_deref().unwrap_or_default()
                );
                continue;
            };
            if event_start > end || event_end < start {
                continue;
            }

            for (template, count) in required {
                if let Some(left) = available_count.get_mut(template) {
                    *left = left.saturating_sub(*count).max(0);
                }
            }
        }

        debug!("Max available in {}: {:?}", environment, available_count);
        Ok(MaxAvailable { available_count })
    }
}
