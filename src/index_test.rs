#[cfg(test)]
mod tests {
    use crate::index::*;
    use crate::resources::{VirtualMachineClaim, VirtualMachineClaimSpec};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn claim(name: &str, user: &str) -> VirtualMachineClaim {
        VirtualMachineClaim::new(
            name,
            VirtualMachineClaimSpec {
                id: name.to_string(),
                user_id: user.to_string(),
                ..Default::default()
            },
        )
    }

    fn by_user() -> ResourceIndex<VirtualMachineClaim> {
        ResourceIndex::new().with_indexer("user", |vmc: &VirtualMachineClaim| {
            vec![vmc.spec.user_id.clone()]
        })
    }

    #[test]
    fn test_apply_and_get() {
        let index = ResourceIndex::new();
        assert!(index.is_empty());

        index.apply(IndexEvent::Apply(claim("vmc-1", "alice")));
        let found = index.get("vmc-1").unwrap();
        assert_eq!(found.spec.user_id, "alice");
        assert!(index.get("vmc-2").is_none());
    }

    #[test]
    fn test_apply_replaces_existing_entry() {
        let index = by_user();
        index.apply(IndexEvent::Apply(claim("vmc-1", "alice")));
        index.apply(IndexEvent::Apply(claim("vmc-1", "bob")));

        assert_eq!(index.len(), 1);
        assert!(index.by_index("user", "alice").is_empty());
        assert_eq!(index.by_index("user", "bob").len(), 1);
    }

    #[test]
    fn test_delete_removes_from_indices() {
        let index = by_user();
        index.apply(IndexEvent::Apply(claim("vmc-1", "alice")));
        index.apply(IndexEvent::Apply(claim("vmc-2", "alice")));
        index.apply(IndexEvent::Delete(claim("vmc-1", "alice")));

        assert!(index.get("vmc-1").is_none());
        let remaining = index.by_index("user", "alice");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].metadata.name.as_deref(), Some("vmc-2"));
    }

    #[test]
    fn test_reset_replaces_contents() {
        let index = by_user();
        index.apply(IndexEvent::Apply(claim("stale", "carol")));
        index.apply(IndexEvent::Reset(vec![claim("vmc-1", "alice"), claim("vmc-2", "bob")]));

        assert_eq!(index.len(), 2);
        assert!(index.get("stale").is_none());
        assert!(index.by_index("user", "carol").is_empty());
        assert_eq!(index.list().len(), 2);
    }

    #[test]
    fn test_unknown_index_is_empty() {
        let index = by_user();
        index.apply(IndexEvent::Apply(claim("vmc-1", "alice")));
        assert!(index.by_index("scheduledevent", "se-1").is_empty());
    }

    #[test]
    fn test_readers_keep_their_snapshot() {
        let index = ResourceIndex::new();
        index.apply(IndexEvent::Apply(claim("vmc-1", "alice")));

        let held = index.get("vmc-1").unwrap();
        index.apply(IndexEvent::Apply(claim("vmc-1", "bob")));

        assert_eq!(held.spec.user_id, "alice");
        assert_eq!(index.get("vmc-1").unwrap().spec.user_id, "bob");
    }

    #[tokio::test]
    async fn test_subscribe_applies_channel_events() {
        let index = Arc::new(by_user());
        let (tx, rx) = mpsc::channel(8);
        let task = index.subscribe(rx);

        tx.send(IndexEvent::Apply(claim("vmc-1", "alice"))).await.unwrap();
        tx.send(IndexEvent::Apply(claim("vmc-2", "bob"))).await.unwrap();
        tx.send(IndexEvent::Delete(claim("vmc-2", "bob"))).await.unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(index.len(), 1);
        assert_eq!(index.by_index("user", "alice").len(), 1);
    }
}
