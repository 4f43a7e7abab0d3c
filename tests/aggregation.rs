mod common;

use std::error::Error;

use common::{add_order, days_ago, has_ordered, memory_store, ordered_along_with, seed_catalog};
use menugraph::{apply_new_order, rebuild_all, ApplyOutcome, Error as CoreError, RebuildSummary};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn rebuild_sums_quantities_per_user_and_item() -> TestResult {
    let store = memory_store();
    seed_catalog(&store, 2, 8)?;
    add_order(&store, 1, Some(1), days_ago(3), &[(7, 3), (3, 2)])?;
    add_order(&store, 2, Some(1), days_ago(2), &[(7, 2)])?;
    add_order(&store, 3, Some(2), days_ago(1), &[(7, 1)])?;

    let summary = rebuild_all(&store)?;
    assert_eq!(
        summary,
        RebuildSummary {
            has_ordered: 3,
            co_occurring_pairs: 1,
            orders_processed: 3,
        }
    );
    assert_eq!(has_ordered(&store)?, vec![(1, 3, 2), (1, 7, 5), (2, 7, 1)]);
    Ok(())
}

#[test]
fn co_occurrence_counts_orders_and_is_symmetric() -> TestResult {
    let store = memory_store();
    seed_catalog(&store, 2, 5)?;
    add_order(&store, 1, Some(1), days_ago(1), &[(1, 4), (2, 1), (3, 1)])?;
    add_order(&store, 2, Some(2), days_ago(1), &[(1, 1), (2, 9)])?;
    add_order(&store, 3, Some(2), days_ago(1), &[(4, 1)])?;

    rebuild_all(&store)?;
    assert_eq!(
        ordered_along_with(&store)?,
        vec![
            (1, 2, 2),
            (1, 3, 1),
            (2, 1, 2),
            (2, 3, 1),
            (3, 1, 1),
            (3, 2, 1),
        ]
    );
    Ok(())
}

#[test]
fn rebuild_is_repeatable() -> TestResult {
    let store = memory_store();
    seed_catalog(&store, 3, 6)?;
    add_order(&store, 1, Some(1), days_ago(1), &[(1, 1), (2, 2)])?;
    add_order(&store, 2, Some(2), days_ago(4), &[(2, 1), (5, 1), (6, 3)])?;
    add_order(&store, 3, Some(3), days_ago(9), &[(1, 2), (6, 1)])?;

    let first = rebuild_all(&store)?;
    let edges = (has_ordered(&store)?, ordered_along_with(&store)?);
    let second = rebuild_all(&store)?;
    assert_eq!(first, second);
    assert_eq!(edges, (has_ordered(&store)?, ordered_along_with(&store)?));
    Ok(())
}

#[test]
fn applying_an_order_bumps_both_edge_kinds() -> TestResult {
    let store = memory_store();
    seed_catalog(&store, 1, 4)?;
    add_order(&store, 1, Some(1), days_ago(2), &[(1, 1), (2, 1)])?;
    rebuild_all(&store)?;

    add_order(&store, 2, Some(1), days_ago(1), &[(1, 2), (2, 1), (3, 1)])?;
    let outcome = apply_new_order(&store, 2)?;
    assert_eq!(outcome, ApplyOutcome::Applied { items: 3, pairs: 3 });
    assert_eq!(has_ordered(&store)?, vec![(1, 1, 3), (1, 2, 2), (1, 3, 1)]);
    assert_eq!(
        ordered_along_with(&store)?,
        vec![
            (1, 2, 2),
            (1, 3, 1),
            (2, 1, 2),
            (2, 3, 1),
            (3, 1, 1),
            (3, 2, 1),
        ]
    );
    Ok(())
}

#[test]
fn an_order_is_applied_once() -> TestResult {
    let store = memory_store();
    seed_catalog(&store, 1, 3)?;
    add_order(&store, 1, Some(1), days_ago(1), &[(1, 1), (2, 1)])?;

    assert!(matches!(apply_new_order(&store, 1)?, ApplyOutcome::Applied { .. }));
    let after_first = (has_ordered(&store)?, ordered_along_with(&store)?);
    assert_eq!(apply_new_order(&store, 1)?, ApplyOutcome::AlreadyApplied);
    assert_eq!(after_first, (has_ordered(&store)?, ordered_along_with(&store)?));
    Ok(())
}

#[test]
fn rebuild_covers_existing_orders() -> TestResult {
    let store = memory_store();
    seed_catalog(&store, 1, 3)?;
    add_order(&store, 1, Some(1), days_ago(1), &[(1, 1), (2, 1)])?;
    rebuild_all(&store)?;
    assert_eq!(apply_new_order(&store, 1)?, ApplyOutcome::AlreadyApplied);
    Ok(())
}

#[test]
fn apply_then_rebuild_matches_rebuild_alone() -> TestResult {
    let store = memory_store();
    seed_catalog(&store, 2, 5)?;
    add_order(&store, 1, Some(1), days_ago(3), &[(1, 1), (2, 1)])?;
    rebuild_all(&store)?;
    add_order(&store, 2, Some(2), days_ago(1), &[(2, 2), (4, 1), (5, 1)])?;
    add_order(&store, 3, Some(1), days_ago(1), &[(1, 1), (5, 3)])?;
    apply_new_order(&store, 2)?;
    apply_new_order(&store, 3)?;
    let incremental = (has_ordered(&store)?, ordered_along_with(&store)?);

    rebuild_all(&store)?;
    assert_eq!(incremental, (has_ordered(&store)?, ordered_along_with(&store)?));
    Ok(())
}

#[test]
fn single_item_order_creates_no_pairs() -> TestResult {
    let store = memory_store();
    seed_catalog(&store, 1, 2)?;
    add_order(&store, 1, Some(1), days_ago(1), &[(2, 4)])?;
    assert_eq!(
        apply_new_order(&store, 1)?,
        ApplyOutcome::Applied { items: 1, pairs: 0 }
    );
    assert!(ordered_along_with(&store)?.is_empty());
    assert_eq!(has_ordered(&store)?, vec![(1, 2, 4)]);
    Ok(())
}

#[test]
fn order_without_owner_still_counts_for_pairs() -> TestResult {
    let store = memory_store();
    seed_catalog(&store, 1, 3)?;
    add_order(&store, 1, None, days_ago(1), &[(1, 1), (3, 1)])?;
    apply_new_order(&store, 1)?;
    assert!(has_ordered(&store)?.is_empty());
    assert_eq!(ordered_along_with(&store)?, vec![(1, 3, 1), (3, 1, 1)]);
    Ok(())
}

#[test]
fn unknown_order_is_reported() -> TestResult {
    let store = memory_store();
    seed_catalog(&store, 1, 1)?;
    match apply_new_order(&store, 42) {
        Err(CoreError::UnknownOrder(42)) => Ok(()),
        other => panic!("expected UnknownOrder, got {other:?}"),
    }
}

#[test]
fn empty_graph_rebuilds_to_nothing() -> TestResult {
    let store = memory_store();
    assert_eq!(rebuild_all(&store)?, RebuildSummary::default());
    assert!(has_ordered(&store)?.is_empty());
    Ok(())
}
