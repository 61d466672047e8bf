use super::*;

use std::sync::Arc;

use crate::{
    AllocationStrategy, AnonymousVmObject, PageFaultResponse, PageSlot, Paddr, PhysicalPage,
    Ppn, VmObject, alloc_frame,
};

const PAGE: usize = 4096;

#[test]
fn test_zero_size_is_rejected() {
    let fixture = setup();

    assert!(AnonymousVmObject::try_create_with_size(0, AllocationStrategy::Reserve).is_none());
    assert!(AnonymousVmObject::try_create_purgeable_with_size(0, AllocationStrategy::None).is_none());
    assert!(AnonymousVmObject::try_create_physically_contiguous_with_size(0).is_none());
    assert!(AnonymousVmObject::try_create_for_physical_range(Paddr(0x8000_0000), 0).is_none());
    assert!(AnonymousVmObject::try_create_with_physical_pages(&[]).is_none());
    fixture.assert_balanced();
}

#[test]
fn test_reserve_commits_and_rounds_up() {
    let fixture = setup();

    let obj = AnonymousVmObject::try_create_with_size(PAGE + 1, AllocationStrategy::Reserve).unwrap();
    assert_eq!(obj.page_count(), 2);
    assert_eq!(obj.size(), 2 * PAGE);
    assert_eq!(obj.unused_committed_pages(), 2);
    assert_eq!(get_committed_frames(), fixture.committed + 2);
    assert!(matches!(obj.slot(0), Some(PageSlot::LazyCommitted)));
    assert!(obj.physical_page(0).is_none());

    assert_eq!(obj.handle_zero_fault(1), PageFaultResponse::Continue);
    assert_eq!(obj.unused_committed_pages(), 1);
    assert_eq!(get_committed_frames(), fixture.committed + 1);
    assert_eq!(get_allocated_frames(), fixture.allocated + 1);

    let page = obj.physical_page(1).unwrap();
    let mut buf = [0xFFu8; 32];
    page.read(PAGE - 32, &mut buf);
    assert_eq!(buf, [0; 32]);
    drop(page);

    drop(obj);
    fixture.assert_balanced();
}

#[test]
fn test_allocate_now_materializes_every_page() {
    let fixture = setup();

    let obj = AnonymousVmObject::try_create_with_size(3 * PAGE, AllocationStrategy::AllocateNow).unwrap();
    assert!((0..3).all(|i| obj.physical_page(i).is_some()));
    assert_eq!(obj.unused_committed_pages(), 0);
    assert_eq!(get_committed_frames(), fixture.committed);
    assert_eq!(get_allocated_frames(), fixture.allocated + 3);

    drop(obj);
    fixture.assert_balanced();
}

#[test]
fn test_uncommitted_object_faults_from_allocator() {
    let fixture = setup();

    let obj = AnonymousVmObject::try_create_with_size(2 * PAGE, AllocationStrategy::None).unwrap();
    assert!(matches!(obj.slot(0), Some(PageSlot::Empty)));
    assert_eq!(get_committed_frames(), fixture.committed);

    assert_eq!(obj.handle_zero_fault(0), PageFaultResponse::Continue);
    let first = obj.physical_page(0).unwrap();
    // A second fault on a present page is a no-op.
    assert_eq!(obj.handle_zero_fault(0), PageFaultResponse::Continue);
    assert!(Arc::ptr_eq(&first, &obj.physical_page(0).unwrap()));
    drop(first);

    let reserved = exhaust_frames();
    assert_eq!(obj.handle_zero_fault(1), PageFaultResponse::OutOfMemory);
    assert!(matches!(obj.slot(1), Some(PageSlot::Empty)));
    release_frames(reserved);

    assert_eq!(obj.handle_zero_fault(2), PageFaultResponse::ShouldCrash);

    drop(obj);
    fixture.assert_balanced();
}

#[test]
fn test_reserve_fails_without_memory() {
    let fixture = setup();

    let reserved = exhaust_frames();
    assert!(AnonymousVmObject::try_create_with_size(PAGE, AllocationStrategy::Reserve).is_none());
    assert!(AnonymousVmObject::try_create_with_size(PAGE, AllocationStrategy::AllocateNow).is_none());
    assert!(AnonymousVmObject::try_create_physically_contiguous_with_size(PAGE).is_none());
    // Nothing to commit, so this still succeeds.
    let lazy = AnonymousVmObject::try_create_with_size(PAGE, AllocationStrategy::None).unwrap();
    release_frames(reserved);

    drop(lazy);
    fixture.assert_balanced();
}

#[test]
fn test_allocate_committed_page_fills_requested_slot() {
    let fixture = setup();

    let obj = AnonymousVmObject::try_create_with_size(3 * PAGE, AllocationStrategy::Reserve).unwrap();
    let page = obj.allocate_committed_page(1);
    assert!(Arc::ptr_eq(&page, &obj.physical_page(1).unwrap()));
    assert_eq!(obj.unused_committed_pages(), 2);
    assert_eq!(get_committed_frames(), fixture.committed + 2);
    assert_eq!(get_allocated_frames(), fixture.allocated + 1);
    assert!(matches!(obj.slot(0), Some(PageSlot::LazyCommitted)));
    assert!(matches!(obj.slot(2), Some(PageSlot::LazyCommitted)));
    drop(page);

    // The other lazy pages still fault in from their own credits.
    let reserved = exhaust_frames();
    assert_eq!(obj.handle_zero_fault(0), PageFaultResponse::Continue);
    assert_eq!(obj.handle_zero_fault(2), PageFaultResponse::Continue);
    assert_eq!(obj.unused_committed_pages(), 0);
    release_frames(reserved);

    drop(obj);
    fixture.assert_balanced();
}

#[test]
#[should_panic(expected = "has no committed credit")]
fn test_allocate_committed_page_rejects_uncommitted_slot() {
    let _fixture = setup();

    let obj = AnonymousVmObject::try_create_with_size(PAGE, AllocationStrategy::None).unwrap();
    let _ = obj.allocate_committed_page(0);
}

#[test]
fn test_physical_range_pages_are_fixed() {
    let fixture = setup();

    let base = Paddr(0x8000_0000);
    let obj = AnonymousVmObject::try_create_for_physical_range(base, 2 * PAGE).unwrap();
    let page = obj.physical_page(1).unwrap();
    assert!(page.is_fixed());
    assert_eq!(page.ppn(), Ppn(0x8000_0000 / PAGE + 1));
    assert_eq!(obj.cow_pages(), 0);
    assert!(!obj.should_cow(0, false));
    drop(page);

    drop(obj);
    fixture.assert_balanced();
}

#[test]
fn test_with_physical_pages_shares_them() {
    let fixture = setup();

    let page = Arc::new(PhysicalPage::from_frame(alloc_frame().unwrap()));
    let obj = AnonymousVmObject::try_create_with_physical_pages(&[Arc::clone(&page)]).unwrap();
    assert_eq!(Arc::strong_count(&page), 2);
    assert!(Arc::ptr_eq(&page, &obj.physical_page(0).unwrap()));

    drop(obj);
    assert_eq!(Arc::strong_count(&page), 1);
    drop(page);
    fixture.assert_balanced();
}

#[test]
fn test_physically_contiguous_pages() {
    let fixture = setup();

    let obj = AnonymousVmObject::try_create_physically_contiguous_with_size(3 * PAGE).unwrap();
    let first = obj.physical_page(0).unwrap().ppn();
    for i in 1..3 {
        assert_eq!(obj.physical_page(i).unwrap().ppn(), first + i);
    }
    assert_eq!(get_allocated_frames(), fixture.allocated + 3);

    drop(obj);
    fixture.assert_balanced();
}

#[test]
fn test_vm_object_surface() {
    let fixture = setup();

    let obj = AnonymousVmObject::try_create_with_size(PAGE, AllocationStrategy::None).unwrap();
    let vm: &dyn VmObject = &*obj;
    assert_eq!(vm.class_name(), "AnonymousVmObject");
    assert!(vm.is_anonymous());
    assert_eq!(vm.page_count(), 1);
    assert_eq!(vm.size(), PAGE);
    assert!(vm.physical_page(0).is_none());
    assert!(vm.physical_page(1).is_none());

    drop(obj);
    fixture.assert_balanced();
}

#[test]
fn test_set_should_cow_creates_map_on_demand() {
    let fixture = setup();

    let obj = AnonymousVmObject::try_create_with_size(2 * PAGE, AllocationStrategy::None).unwrap();
    obj.set_should_cow(0, false);
    assert_eq!(obj.cow_pages(), 0);

    obj.set_should_cow(1, true);
    assert!(obj.should_cow(1, false));
    assert!(!obj.should_cow(1, true));
    assert!(!obj.should_cow(0, false));
    assert_eq!(obj.cow_pages(), 1);

    obj.set_should_cow(1, false);
    assert_eq!(obj.cow_pages(), 0);

    drop(obj);
    fixture.assert_balanced();
}
