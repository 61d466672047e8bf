use super::*;

use crate::{PhysicalPage, alloc_committed_frame, alloc_contig_frames, alloc_frame, alloc_frames};

#[test]
fn test_alloc_frame_is_zeroed_and_returned_on_drop() {
    let fixture = setup();

    let frame = alloc_frame().unwrap();
    assert_eq!(get_allocated_frames(), fixture.allocated + 1);

    let page = PhysicalPage::from_frame(frame);
    page.write(0, &[0xAB; 16]);
    drop(page);
    fixture.assert_balanced();

    // Whatever frame comes back next is cleared again.
    let page = PhysicalPage::from_frame(alloc_frame().unwrap());
    let mut buf = [0xFFu8; 16];
    page.read(0, &mut buf);
    assert_eq!(buf, [0; 16]);
    drop(page);
    fixture.assert_balanced();
}

#[test]
fn test_alloc_frames_all_or_nothing() {
    let fixture = setup();

    let frames = alloc_frames(8).unwrap();
    assert_eq!(frames.len(), 8);
    drop(frames);
    fixture.assert_balanced();

    let reserved = exhaust_frames();
    assert!(alloc_frames(1).is_none());
    release_frames(reserved);
    fixture.assert_balanced();
}

#[test]
fn test_contiguous_frames_split_into_single_frames() {
    let fixture = setup();

    let range = alloc_contig_frames(4).unwrap();
    assert_eq!(range.len(), 4);
    let start = range.start_ppn();

    let frames = range.into_frames();
    assert_eq!(frames.len(), 4);
    for (i, frame) in frames.iter().enumerate() {
        assert_eq!(frame.ppn(), start + i);
    }
    assert_eq!(get_allocated_frames(), fixture.allocated + 4);

    drop(frames);
    fixture.assert_balanced();
    assert!(alloc_contig_frames(0).is_none());
}

#[test]
fn test_commitments_reserve_frames() {
    let fixture = setup();

    assert!(commit_frames(3));
    assert_eq!(get_committed_frames(), fixture.committed + 3);

    let frame = alloc_committed_frame();
    assert_eq!(get_committed_frames(), fixture.committed + 2);
    drop(frame);

    uncommit_frames(2);
    fixture.assert_balanced();
}

#[test]
fn test_committed_frames_unavailable_to_plain_allocation() {
    let fixture = setup();

    let reserved = exhaust_frames();
    assert!(alloc_frame().is_none());
    assert!(alloc_contig_frames(1).is_none());
    assert!(!commit_frames(1));

    // A committed frame can still be taken.
    let frame = alloc_committed_frame();
    drop(frame);
    release_frames(reserved - 1);
    fixture.assert_balanced();
}

#[test]
#[should_panic(expected = "without a commitment")]
fn test_alloc_committed_frame_without_commitment_panics() {
    let _fixture = setup();
    let _frame = alloc_committed_frame();
}
