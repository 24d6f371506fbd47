#[cfg(test)]
mod tests {
    use crate::availability::*;
    use crate::client::ResourceClient;
    use crate::fake::{FakeCluster, FakeClientBuilder};
    use crate::resources::{
        Environment, EnvironmentSpec, ScheduledEvent, ScheduledEventSpec, ScheduledEventStatus,
    };
    use crate::utils::format_unix_date;
    use crate::Error;
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::BTreeMap;

    fn at(day: u32, hour: u32) -> String {
        format_unix_date(&Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap())
    }

    fn environment() -> Environment {
        let mut env = Environment::new(
            "env-a",
            EnvironmentSpec {
                display_name: "Lab1".to_string(),
                count_capacity: BTreeMap::from([("t1".to_string(), 10), ("t2".to_string(), 4)]),
                ..Default::default()
            },
        );
        env.metadata.namespace = Some("hf".to_string());
        env
    }

    fn event(name: &str, env: &str, start: String, end: String, t1: i32, finished: bool) -> ScheduledEvent {
        let mut event = ScheduledEvent::new(
            name,
            ScheduledEventSpec {
                name: name.to_string(),
                start_time: start,
                end_time: end,
                required_vms: BTreeMap::from([(
                    env.to_string(),
                    BTreeMap::from([("t1".to_string(), t1)]),
                )]),
                ..Default::default()
            },
        );
        event.metadata.namespace = Some("hf".to_string());
        event.status = Some(ScheduledEventStatus {
            active: !finished,
            finished,
        });
        event
    }

    async fn oracle(events: &[ScheduledEvent]) -> (FakeCluster, ScheduledEventAvailability) {
        let cluster = FakeClientBuilder::new()
            .with_object(&environment())
            .unwrap()
            .with_objects(events)
            .unwrap()
            .build()
            .await
            .unwrap();
        let oracle = ScheduledEventAvailability::new(
            ResourceClient::namespaced(cluster.client(), "hf"),
            ResourceClient::namespaced(cluster.client(), "hf"),
        );
        (cluster, oracle)
    }

    #[tokio::test]
    async fn test_full_capacity_without_events() {
        let (_cluster, oracle) = oracle(&[]).await;
        let max = oracle.max_available("env-a", &at(1, 9), &at(1, 17)).await.unwrap();
        assert_eq!(max.available_count["t1"], 10);
        assert_eq!(max.available_count["t2"], 4);
    }

    #[tokio::test]
    async fn test_only_overlapping_unfinished_events_count() {
        let events = [
            event("overlapping", "env-a", at(1, 8), at(1, 12), 3, false),
            event("also-overlapping", "env-a", at(1, 16), at(2, 10), 2, false),
            event("finished", "env-a", at(1, 8), at(1, 12), 5, true),
            event("later", "env-a", at(3, 8), at(3, 12), 5, false),
            event("elsewhere", "env-b", at(1, 8), at(1, 12), 5, false),
        ];
        let (_cluster, oracle) = oracle(&events).await;

        let max = oracle.max_available("env-a", &at(1, 9), &at(1, 17)).await.unwrap();
        assert_eq!(max.available_count["t1"], 5);
        assert_eq!(max.available_count["t2"], 4);
    }

    #[tokio::test]
    async fn test_oversubscribed_template_floors_at_zero() {
        let events = [event("big", "env-a", at(1, 0), at(5, 0), 25, false)];
        let (_cluster, oracle) = oracle(&events).await;

        let max = oracle.max_available("env-a", &at(1, 9), &at(1, 17)).await.unwrap();
        assert_eq!(max.available_count["t1"], 0);
    }

    #[tokio::test]
    async fn test_unparseable_bounds_are_invalid_requests() {
        let (_cluster, oracle) = oracle(&[]).await;

        let result = oracle.max_available("env-a", "2024-03-01T09:00:00Z", &at(1, 17)).await;
        assert!(matches!(result, Err(Error::InvalidRequest(_))));

        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let result = oracle
            .max_available(
                "env-a",
                &format_unix_date(&start),
                &format_unix_date(&(start - Duration::hours(1))),
            )
            .await;
        assert!(matches!(result, Err(Error::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_unknown_environment_is_not_found() {
        let (_cluster, oracle) = oracle(&[]).await;
        let result = oracle.max_available("env-missing", &at(1, 9), &at(1, 17)).await;
        assert!(result.unwrap_err().is_not_found());
    }

    #[test]
    fn test_serializes_as_available_count() {
        let max = MaxAvailable {
            available_count: BTreeMap::from([("t1".to_string(), 2)]),
        };
        assert_eq!(
            serde_json::to_value(&max).unwrap(),
            serde_json::json!({ "available_count": { "t1": 2 } })
        );
    }
}
