//! TreeStore Integration Tests
//!
//! Path addressing, scoped expansion notifications, bounded expand-all and
//! ancestor discovery with a single remote retry.

mod common;

#[cfg(test)]
mod tree_store_tests {
    use super::common::{drain, rows, MockTransport};
    use anyhow::Result;
    use gridstore_core::data::RowReader;
    use gridstore_core::db::{StoreConfig, StoreEvent};
    use gridstore_core::models::{
        FieldSet, FieldValue, FilterCondition, FilterMode, FilterSpec, Record, SortDirection,
    };
    use gridstore_core::services::{ExpandDepth, TreeStore};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn config() -> StoreConfig {
        StoreConfig::new().with_primary_keys(["id"])
    }

    fn remote_config() -> StoreConfig {
        config()
            .with_url("/tree")
            .with_expander_url("/tree/children")
            .with_path_finder_url("/tree/path")
    }

    fn nested() -> Vec<Value> {
        vec![json!({
            "id": 1,
            "name": "x",
            "children": [
                {"id": 2, "name": "y", "leaf": true},
                {"id": 3, "name": "z", "children": [{"id": 4, "name": "w"}]}
            ]
        })]
    }

    fn detached(id: i64) -> Result<Record> {
        let reader = RowReader::new(FieldSet::default(), vec!["id".to_string()]);
        Ok(reader.read(&json!({ "id": id }))?)
    }

    #[tokio::test]
    async fn test_path_addressing() {
        let tree = TreeStore::local(config(), nested());
        tree.load().await;

        let z = tree.get_at(&[0, 1]).await.unwrap();
        assert_eq!(z.value("name"), FieldValue::from("z"));
        assert_eq!(
            tree.get_at(&[0, 1, 0]).await.unwrap().value("id"),
            FieldValue::Int(4)
        );
        assert!(tree.get_at(&[0, 2]).await.is_none());
        assert!(tree.get_at(&[0, 0, 0]).await.is_none());
        assert!(tree.get_at(&[3, 0]).await.is_none());
        assert!(tree.get_at(&[]).await.is_none());

        assert_eq!(
            tree.find_index("name", &FieldValue::from("w")).await,
            Some(vec![0, 1, 0])
        );
        assert_eq!(tree.match_index(&z).await, Some(vec![0, 1]));
        assert!(tree.match_record(&detached(99).unwrap()).await.is_none());

        assert_eq!(tree.set_at(&[0, 0], "name", "y2".into()).await, Some(true));
        assert!(tree.set_at(&[0, 9], "name", "nope".into()).await.is_none());
        assert_eq!(
            tree.find("id", &FieldValue::Int(2)).await.unwrap().value("name"),
            FieldValue::from("y2")
        );
        assert_eq!(tree.store().get_updated_records().await.len(), 1);
    }

    #[tokio::test]
    async fn test_tree_filter_keeps_ancestors_of_matches() {
        let tree = TreeStore::local(config(), nested());
        tree.load().await;
        tree.store()
            .set_filter(
                FilterSpec::new().with("name", FilterCondition::eq("w")),
                FilterMode::All,
            )
            .await;

        assert_eq!(
            tree.find_index("name", &FieldValue::from("w")).await,
            Some(vec![0, 0, 0])
        );
        assert!(tree.find("name", &FieldValue::from("y")).await.is_none());
    }

    #[tokio::test]
    async fn test_remote_expand_notifies_one_record() -> Result<()> {
        let transport = MockTransport::new();
        transport
            .push(rows(json!([{"id": 1}, {"id": 2, "leaf": true}])))
            .await;
        transport.push(rows(json!([{"id": 10}, {"id": 11}]))).await;
        let tree = TreeStore::remote(remote_config(), transport.clone());
        tree.load().await;

        let parent = tree.get_at(&[0]).await.unwrap();
        assert!(!parent.has_children_loaded());

        let mut rx = tree.subscribe_to_events();
        assert_eq!(tree.expand(&[0]).await, Some(2));

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], StoreEvent::BeforeUpdate);
        assert_eq!(
            events[1],
            StoreEvent::UpdateChildren {
                hash: parent.hash().clone()
            }
        );

        let request = transport.requests().await.pop().unwrap();
        assert_eq!(request.url, "/tree/children");
        assert_eq!(request.params["id"], json!(1));

        assert_eq!(
            tree.get_at(&[0, 1]).await.unwrap().value("id"),
            FieldValue::Int(11)
        );
        assert!(tree.is_expanded(parent.hash()).await);

        // Known children: no fetch
        assert_eq!(tree.expand(&[1]).await, Some(0));
        assert_eq!(tree.expand(&[0]).await, Some(2));
        assert_eq!(transport.call_count().await, 2);
        assert!(tree.expand(&[7]).await.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_expand_leaves_children_unknown() -> Result<()> {
        let transport = MockTransport::new();
        transport.push(rows(json!([{"id": 1}]))).await;
        transport.push_error("timeout").await;
        let tree = TreeStore::remote(remote_config(), transport.clone());
        tree.load().await;

        assert!(tree.expand(&[0]).await.is_none());
        assert!(!tree.get_at(&[0]).await.unwrap().has_children_loaded());
        Ok(())
    }

    #[tokio::test]
    async fn test_expand_without_child_source_marks_leaf() {
        let tree = TreeStore::local(config(), vec![json!({"id": 1})]);
        tree.load().await;

        assert_eq!(tree.expand(&[0]).await, Some(0));
        assert!(tree.get_at(&[0]).await.unwrap().has_children_loaded());
    }

    #[tokio::test]
    async fn test_expand_keeps_edited_siblings_in_place() {
        let hook = Arc::new(|_: &Record| vec![json!({"id": 9, "name": "child"})]);
        let tree = TreeStore::local_with_children(
            config(),
            vec![
                json!({"id": 1, "name": "a"}),
                json!({"id": 2, "name": "b"}),
                json!({"id": 3, "name": "c"}),
            ],
            hook,
        );
        tree.load().await;
        tree.store().sort("name", SortDirection::Asc).await;

        assert_eq!(tree.set_at(&[0], "name", "zzz".into()).await, Some(true));
        assert_eq!(tree.expand(&[1]).await, Some(1));

        let mut ids = Vec::new();
        for i in 0..3 {
            ids.push(tree.get_at(&[i]).await.unwrap().value("id"));
        }
        assert_eq!(
            ids,
            vec![FieldValue::Int(1), FieldValue::Int(2), FieldValue::Int(3)]
        );
        assert_eq!(
            tree.get_at(&[1, 0]).await.unwrap().value("id"),
            FieldValue::Int(9)
        );
    }

    #[tokio::test]
    async fn test_remote_expand_without_expander_uses_hook() -> Result<()> {
        let transport = MockTransport::new();
        transport.push(rows(json!([{"id": 1}]))).await;
        let hook = Arc::new(|record: &Record| match record.value("id") {
            FieldValue::Int(id) => vec![json!({ "id": id * 10 }), json!({ "id": id * 10 + 1 })],
            _ => Vec::new(),
        });
        let tree =
            TreeStore::remote_with_children(config().with_url("/tree"), transport.clone(), hook);
        tree.load().await;

        assert_eq!(tree.expand(&[0]).await, Some(2));
        assert_eq!(
            tree.get_at(&[0, 1]).await.unwrap().value("id"),
            FieldValue::Int(11)
        );
        assert_eq!(transport.call_count().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_expansion_follows_applied_loads() -> Result<()> {
        let nested_rows = || rows(json!([{"id": 1, "children": [{"id": 2}]}]));
        let transport = MockTransport::new();
        transport.push(nested_rows()).await;
        let tree = TreeStore::remote(remote_config(), transport.clone());
        tree.load().await;

        let root = tree.get_at(&[0]).await.unwrap();
        assert_eq!(tree.expand(&[0]).await, Some(1));
        assert!(tree.is_expanded(root.hash()).await);

        // A superseded load that succeeded, then a failed one: nothing applied
        let release = transport.push_gated(nested_rows()).await;
        transport.push_error("offline").await;
        let stale = tokio::spawn({
            let tree = tree.clone();
            async move { tree.reload().await }
        });
        transport.wait_for_calls(2).await;
        assert!(!tree.store().reload().await.success);
        let _ = release.send(());
        assert!(stale.await?.success);
        assert!(tree.is_expanded(root.hash()).await);

        // A reload started through the flat store still resets expansion
        transport.push(nested_rows()).await;
        assert!(tree.store().reload().await.success);
        assert!(!tree.is_expanded(root.hash()).await);
        assert_eq!(tree.visible_rows().await.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_collapse_keeps_children() {
        let tree = TreeStore::local(config(), nested());
        tree.load().await;
        tree.expand(&[0]).await;
        assert_eq!(tree.visible_rows().await.len(), 3);

        assert!(tree.collapse(&[0]).await);
        assert!(!tree.collapse(&[0]).await);
        assert_eq!(tree.visible_rows().await.len(), 1);
        assert!(tree.get_at(&[0, 1]).await.is_some());
    }

    #[tokio::test]
    async fn test_expand_all_respects_depth() {
        let hook = Arc::new(|record: &Record| match record.value("id") {
            FieldValue::Int(id) => vec![json!({ "id": id * 10 + 1 })],
            _ => Vec::new(),
        });
        let tree = TreeStore::local_with_children(config(), vec![json!({"id": 1})], hook);
        tree.load().await;

        assert_eq!(tree.expand_all(ExpandDepth::Levels(2)).await, 2);
        assert_eq!(
            tree.get_at(&[0, 0]).await.unwrap().value("id"),
            FieldValue::Int(11)
        );

        // The second level was expanded, so the third is attached but unexpanded
        let third = tree.get_at(&[0, 0, 0]).await.unwrap();
        assert_eq!(third.value("id"), FieldValue::Int(111));
        assert!(!third.has_children_loaded());
        assert!(!tree.is_expanded(third.hash()).await);

        let paths: Vec<Vec<usize>> = tree
            .visible_rows()
            .await
            .into_iter()
            .map(|(path, _)| path)
            .collect();
        assert_eq!(paths, vec![vec![0], vec![0, 0], vec![0, 0, 0]]);
    }

    #[tokio::test]
    async fn test_expand_all_terminates_on_cycles() {
        // Every record claims the root as its only child
        let hook = Arc::new(|_: &Record| vec![json!({"id": 1})]);
        let tree = TreeStore::local_with_children(config(), vec![json!({"id": 1})], hook);
        tree.load().await;

        assert_eq!(tree.expand_all(true).await, 1);
    }

    #[tokio::test]
    async fn test_get_parents_resolves_locally() -> Result<()> {
        let tree = TreeStore::local(config(), nested());
        tree.load().await;

        let w = tree.get_at(&[0, 1, 0]).await.unwrap();
        let parents = tree.get_parents(&w).await.unwrap();
        let ids: Vec<FieldValue> = parents.iter().map(|p| p.value("id")).collect();
        assert_eq!(ids, vec![FieldValue::Int(1), FieldValue::Int(3)]);

        let root = tree.get_at(&[0]).await.unwrap();
        assert_eq!(tree.get_parents(&root).await, Some(Vec::new()));

        // Not found and no path finder
        assert!(tree.get_parents(&detached(42)?).await.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_get_parents_fetches_path_once() -> Result<()> {
        let transport = MockTransport::new();
        transport.push(rows(json!([{"id": 1}, {"id": 2}]))).await;
        transport.push(rows(json!([{"id": 1}, {"id": 10}]))).await;
        transport.push(rows(json!([{"id": 10}]))).await;
        transport.push(rows(json!([{"id": 100}, {"id": 101}]))).await;
        let tree = TreeStore::remote(remote_config(), transport.clone());
        tree.load().await;

        let target = detached(100)?;
        let parents = tree.get_parents(&target).await.unwrap();
        let ids: Vec<FieldValue> = parents.iter().map(|p| p.value("id")).collect();
        assert_eq!(ids, vec![FieldValue::Int(1), FieldValue::Int(10)]);

        let urls: Vec<String> = transport
            .requests()
            .await
            .into_iter()
            .map(|r| r.url)
            .collect();
        assert_eq!(
            urls,
            vec!["/tree", "/tree/path", "/tree/children", "/tree/children"]
        );
        assert_eq!(tree.path_of(target.hash()).await, Some(vec![0, 0, 0]));
        Ok(())
    }

    #[tokio::test]
    async fn test_unresolved_parents_retry_only_once() -> Result<()> {
        let transport = MockTransport::new();
        transport.push(rows(json!([{"id": 1, "leaf": true}]))).await;
        transport.push(rows(json!([{"id": 1}]))).await;
        let tree = TreeStore::remote(remote_config(), transport.clone());
        tree.load().await;

        assert!(tree.get_parents(&detached(5)?).await.is_none());
        // load + path finder; the leaf root needs no expander call
        assert_eq!(transport.call_count().await, 2);
        Ok(())
    }
}
