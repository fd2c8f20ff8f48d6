//! Grid Integration Tests
//!
//! Selection persistence across reloads, selection-change suppression and the
//! single-active-editor rule, driven through real stores.

mod common;

#[cfg(test)]
mod grid_tests {
    use super::common::{drain, rows, MockTransport};
    use anyhow::Result;
    use gridstore_core::db::StoreConfig;
    use gridstore_core::grid::{
        CellPosition, ColumnConfig, EditOutcome, Grid, GridConfig, GridEvent, SelectionMode,
    };
    use gridstore_core::models::{FieldValue, RecordHash};
    use gridstore_core::services::{Store, TreeStore};
    use serde_json::json;
    use std::collections::HashSet;

    fn columns() -> Vec<ColumnConfig> {
        vec![
            ColumnConfig::new("id"),
            ColumnConfig::new("name").editable(),
        ]
    }

    fn hash_set(hashes: &[RecordHash]) -> HashSet<RecordHash> {
        hashes.iter().cloned().collect()
    }

    fn selected(grid: &Grid<Store>) -> HashSet<RecordHash> {
        grid.get_selections()
            .iter()
            .map(|r| r.hash().clone())
            .collect()
    }

    async fn remote_grid(
        transport: std::sync::Arc<MockTransport>,
        keepable: bool,
    ) -> Grid<Store> {
        let store = Store::remote(
            StoreConfig::new().with_url("/rows").with_primary_keys(["id"]),
            transport,
        );
        store.load().await;
        let config = GridConfig::new(columns())
            .with_multiple(true)
            .with_keepable(keepable);
        let mut grid = Grid::new(store, config);
        grid.refresh().await;
        grid
    }

    #[tokio::test]
    async fn test_selection_survives_reordering_reload() -> Result<()> {
        let transport = MockTransport::new();
        transport
            .push(rows(json!([{"id": "A"}, {"id": "B"}, {"id": "C"}])))
            .await;
        transport
            .push(rows(json!([{"id": "C"}, {"id": "B"}, {"id": "A"}])))
            .await;
        let mut grid = remote_grid(transport, true).await;

        assert!(grid.select_all());
        let before = selected(&grid);
        let mut rx = grid.subscribe_to_events();

        grid.source().reload().await;
        grid.refresh().await;

        assert_eq!(selected(&grid), before);
        assert!(grid.is_selected(0));
        assert_eq!(grid.row(0).unwrap().value("id"), FieldValue::from("C"));
        assert!(!drain(&mut rx)
            .iter()
            .any(|e| matches!(e, GridEvent::SelectionChange { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_partial_reload_drops_missing_selections() -> Result<()> {
        let transport = MockTransport::new();
        transport
            .push(rows(json!([{"id": "A"}, {"id": "B"}, {"id": "C"}])))
            .await;
        transport.push(rows(json!([{"id": "B"}]))).await;
        let mut grid = remote_grid(transport, true).await;

        grid.select_range(0, 2);
        let b = grid.row(1).unwrap().hash().clone();
        let mut rx = grid.subscribe_to_events();

        grid.source().reload().await;
        grid.refresh().await;

        assert_eq!(selected(&grid), hash_set(&[b.clone()]));
        let events = drain(&mut rx);
        assert_eq!(events, vec![GridEvent::SelectionChange { hashes: vec![b] }]);
        Ok(())
    }

    #[tokio::test]
    async fn test_non_keepable_reload_clears_selection() -> Result<()> {
        let transport = MockTransport::new();
        transport.push(rows(json!([{"id": "A"}]))).await;
        transport.push(rows(json!([{"id": "A"}]))).await;
        let mut grid = remote_grid(transport, false).await;

        grid.select(0, false);
        grid.source().reload().await;
        grid.refresh().await;
        assert!(grid.get_selections().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_identical_selection_does_not_refire() {
        let store = Store::local(
            StoreConfig::new().with_primary_keys(["id"]),
            vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})],
        );
        store.load().await;
        let mut grid = Grid::new(store, GridConfig::new(columns()).with_multiple(true));
        grid.refresh().await;
        let mut rx = grid.subscribe_to_events();

        assert!(grid.select(0, false));
        assert!(!grid.select(0, false));

        assert!(grid.select(2, true));
        let hashes: Vec<RecordHash> = grid
            .get_selections()
            .iter()
            .rev()
            .map(|r| r.hash().clone())
            .collect();
        // Same set in a different order
        assert!(!grid.set_selections(&hashes));
        assert!(!grid.restore_selections());

        let changes = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, GridEvent::SelectionChange { .. }))
            .count();
        assert_eq!(changes, 2);

        assert!(grid.deselect_all());
        assert!(!grid.deselect_all());
    }

    #[tokio::test]
    async fn test_single_active_editor() {
        let store = Store::local(
            StoreConfig::new().with_primary_keys(["id"]),
            vec![json!({"id": 1, "name": "a"}), json!({"id": 2, "name": "b"})],
        );
        store.load().await;
        let mut grid = Grid::new(store, GridConfig::new(columns()));
        grid.refresh().await;
        let mut rx = grid.subscribe_to_events();

        assert!(grid.begin_edit(CellPosition::new(0, 1)).await);
        grid.set_draft("changed");

        // Another cell: the active edit completes and the request is dropped
        assert!(!grid.begin_edit(CellPosition::new(1, 1)).await);
        assert!(!grid.is_editing());
        assert_eq!(grid.focus(), Some(CellPosition::new(0, 1)));

        let first = grid.row(0).unwrap().clone();
        assert_eq!(first.value("name"), FieldValue::from("changed"));
        assert_eq!(first.dirty_fields(), vec!["name"]);
        assert_eq!(grid.source().get_updated_records().await.len(), 1);

        let kinds: Vec<String> = drain(&mut rx)
            .iter()
            .map(|e| e.event_type().to_string())
            .collect();
        assert_eq!(kinds, vec!["beforeEdit", "focusMove", "edit"]);

        // Re-issued request now enters edit
        assert!(grid.begin_edit(CellPosition::new(1, 1)).await);
        assert_eq!(grid.editing().unwrap().cell, CellPosition::new(1, 1));
    }

    #[tokio::test]
    async fn test_unchanged_edit_rolls_back() {
        let store = Store::local(
            StoreConfig::new().with_primary_keys(["id"]),
            vec![json!({"id": 1, "name": "a"})],
        );
        store.load().await;
        let mut grid = Grid::new(store, GridConfig::new(columns()));
        grid.refresh().await;

        grid.begin_edit(CellPosition::new(0, 1)).await;
        grid.set_draft("a");
        let mut rx = grid.subscribe_to_events();
        assert_eq!(grid.complete_edit().await, Some(EditOutcome::RolledBack));
        assert!(grid.source().get_updated_records().await.is_empty());
        assert_eq!(
            drain(&mut rx)[0].event_type(),
            "rollback"
        );
        assert_eq!(grid.complete_edit().await, None);
    }

    #[tokio::test]
    async fn test_edit_compares_against_current_store_value() {
        let store = Store::local(
            StoreConfig::new().with_primary_keys(["id"]),
            vec![json!({"id": 1, "name": "a"})],
        );
        store.load().await;
        let mut grid = Grid::new(store.clone(), GridConfig::new(columns()));
        grid.refresh().await;
        let hash = grid.row(0).unwrap().hash().clone();

        // The store moves on while the grid still caches "a"
        grid.begin_edit(CellPosition::new(0, 1)).await;
        store.set_value(&hash, "name", "x".into()).await;
        grid.set_draft("a");
        assert_eq!(grid.complete_edit().await, Some(EditOutcome::Edited));
        assert_eq!(
            store.get_by_hash(&hash).await.unwrap().value("name"),
            FieldValue::from("a")
        );

        // A draft equal to the store's value rolls back without an edit event
        grid.begin_edit(CellPosition::new(0, 1)).await;
        store.set_value(&hash, "name", "y".into()).await;
        grid.set_draft("y");
        let mut rx = grid.subscribe_to_events();
        assert_eq!(grid.complete_edit().await, Some(EditOutcome::RolledBack));
        let kinds: Vec<String> = drain(&mut rx)
            .iter()
            .map(|e| e.event_type().to_string())
            .collect();
        assert!(kinds.contains(&"rollback".to_string()));
        assert!(!kinds.contains(&"edit".to_string()));
    }

    #[tokio::test]
    async fn test_grid_reconciles_from_store_events() -> Result<()> {
        let transport = MockTransport::new();
        transport
            .push(rows(json!([{"id": "A", "name": "a"}, {"id": "B", "name": "b"}])))
            .await;
        transport.push(rows(json!([{"id": "B", "name": "b"}]))).await;
        let mut grid = remote_grid(transport, true).await;
        assert!(!grid.sync_with_source().await);

        assert!(grid.select(0, false));
        let a = grid.row(0).unwrap().hash().clone();
        grid.source().set_value(&a, "name", "a2".into()).await;

        // Field updates keep the selection and refresh its values
        assert!(grid.sync_with_source().await);
        assert_eq!(
            grid.get_selections()[0].value("name"),
            FieldValue::from("a2")
        );

        grid.begin_edit(CellPosition::new(1, 1)).await;
        let reload = tokio::spawn({
            let store = grid.source().clone();
            async move { store.reload().await }
        });
        assert!(grid.follow_source().await);
        assert!(reload.await?.success);

        assert_eq!(grid.rows().len(), 1);
        assert!(grid.get_selections().is_empty());
        assert_eq!(grid.editing().unwrap().cell, CellPosition::new(0, 1));
        assert!(!grid.sync_with_source().await);
        Ok(())
    }

    #[tokio::test]
    async fn test_edit_dropped_when_record_disappears() -> Result<()> {
        let transport = MockTransport::new();
        transport
            .push(rows(json!([{"id": 1, "name": "a"}, {"id": 2, "name": "b"}])))
            .await;
        transport.push(rows(json!([{"id": 2, "name": "b"}]))).await;
        let mut grid = remote_grid(transport, false).await;

        grid.begin_edit(CellPosition::new(1, 1)).await;
        grid.source().reload().await;
        grid.refresh().await;
        // Record 2 moved up; the edit follows it
        assert_eq!(grid.editing().unwrap().cell, CellPosition::new(0, 1));
        assert_eq!(grid.focus(), Some(CellPosition::new(0, 1)));

        let transport = MockTransport::new();
        transport.push(rows(json!([{"id": 1, "name": "a"}]))).await;
        transport.push(rows(json!([]))).await;
        let mut grid = remote_grid(transport, false).await;
        grid.begin_edit(CellPosition::new(0, 1)).await;
        grid.source().reload().await;
        grid.refresh().await;
        assert!(!grid.is_editing());
        assert_eq!(grid.focus(), None);
        Ok(())
    }

    #[tokio::test]
    async fn test_tree_grid_shows_expanded_branches() {
        let tree = TreeStore::local(
            StoreConfig::new().with_primary_keys(["id"]),
            vec![json!({"id": 1, "name": "root", "children": [{"id": 2, "name": "leaf"}]})],
        );
        tree.load().await;
        let mut grid = Grid::new(
            tree.clone(),
            GridConfig::new(columns()).with_selection_mode(SelectionMode::Check),
        );
        grid.refresh().await;
        assert_eq!(grid.rows().len(), 1);

        tree.expand(&[0]).await;
        grid.refresh().await;
        assert_eq!(grid.rows().len(), 2);
        assert!(grid.toggle_check(1));

        grid.begin_edit(CellPosition::new(1, 1)).await;
        grid.set_draft("renamed");
        assert_eq!(grid.complete_edit().await, Some(EditOutcome::Edited));
        assert_eq!(
            tree.get_at(&[0, 0]).await.unwrap().value("name"),
            FieldValue::from("renamed")
        );
        assert_eq!(
            grid.get_selections()[0].value("name"),
            FieldValue::from("renamed")
        );
    }
}
