use super::*;

use crate::CommittedCowPages;

#[test]
fn test_pool_hands_out_exactly_its_credits() {
    let fixture = setup();

    let pool = CommittedCowPages::try_create(3).unwrap();
    assert_eq!(pool.committed_count(), 3);
    assert_eq!(get_committed_frames(), fixture.committed + 3);

    let pages: std::vec::Vec<_> = (0..3).map(|_| pool.allocate_one()).collect();
    assert!(pool.is_empty());
    assert_eq!(get_committed_frames(), fixture.committed);
    assert_eq!(get_allocated_frames(), fixture.allocated + 3);

    drop(pages);
    drop(pool);
    fixture.assert_balanced();
}

#[test]
#[should_panic(expected = "exhausted pool")]
fn test_pool_allocate_past_credit_panics() {
    let _fixture = setup();

    let pool = CommittedCowPages::try_create(1).unwrap();
    let _page = pool.allocate_one();
    let _ = pool.allocate_one();
}

#[test]
fn test_pool_uncommit_one_returns_credit() {
    let fixture = setup();

    let pool = CommittedCowPages::try_create(2).unwrap();
    pool.uncommit_one();
    assert_eq!(pool.committed_count(), 1);
    assert_eq!(get_committed_frames(), fixture.committed + 1);
    assert_eq!(get_allocated_frames(), fixture.allocated);

    drop(pool);
    fixture.assert_balanced();
}

#[test]
fn test_pool_drop_returns_remaining_credits() {
    let fixture = setup();

    let pool = CommittedCowPages::try_create(4).unwrap();
    let sibling = std::sync::Arc::clone(&pool);
    let page = sibling.allocate_one();
    drop(pool);
    assert_eq!(get_committed_frames(), fixture.committed + 3);

    drop(sibling);
    drop(page);
    fixture.assert_balanced();
}

#[test]
fn test_pool_creation_fails_without_memory() {
    let fixture = setup();

    let reserved = exhaust_frames();
    assert!(CommittedCowPages::try_create(1).is_none());
    release_frames(reserved);
    fixture.assert_balanced();
}

#[test]
fn test_pool_try_ops_stop_at_zero() {
    let fixture = setup();

    let pool = CommittedCowPages::try_create(2).unwrap();
    let page = pool.try_allocate_one().unwrap();
    assert!(pool.try_uncommit_one());
    assert!(pool.is_empty());
    assert!(pool.try_allocate_one().is_none());
    assert!(!pool.try_uncommit_one());
    assert_eq!(get_committed_frames(), fixture.committed);
    assert_eq!(get_allocated_frames(), fixture.allocated + 1);

    drop(page);
    drop(pool);
    fixture.assert_balanced();
}
