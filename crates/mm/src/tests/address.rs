use super::*;

use crate::{PageNum, Paddr, Ppn, PpnRange, UsizeConvert, Vaddr};

#[test]
fn test_ppn_from_addr_floor_ceil() {
    let _fixture = setup();

    let a = Paddr::from_usize(4096);
    assert_eq!(Ppn::from_addr_floor(a), Ppn(1));
    assert_eq!(Ppn::from_addr_ceil(a), Ppn(1));

    let b = Paddr::from_usize(4097);
    assert_eq!(Ppn::from_addr_floor(b), Ppn(1));
    assert_eq!(Ppn::from_addr_ceil(b), Ppn(2));

    assert_eq!(Ppn(3).start_addr(), Paddr(3 * 4096));
}

#[test]
fn test_address_alignment() {
    let _fixture = setup();

    let va = Vaddr(0x1234);
    assert_eq!(va.page_offset(), 0x234);
    assert!(!va.is_page_aligned());
    assert_eq!(va.align_down_to_page(), Vaddr(0x1000));
    assert_eq!(va.align_up_to_page(), Vaddr(0x2000));
    assert_eq!(Vaddr(0x2000).align_up_to_page(), Vaddr(0x2000));
    assert_eq!(Paddr(0x1000) + 0x10, Paddr(0x1010));
}

#[test]
fn test_ppn_range() {
    let _fixture = setup();

    let range = PpnRange::from_start_len(Ppn(10), 3);
    assert_eq!(range.len(), 3);
    assert!(!range.is_empty());
    assert!(range.contains(Ppn(12)));
    assert!(!range.contains(Ppn(13)));
    assert!(range.iter().eq([Ppn(10), Ppn(11), Ppn(12)]));
    assert!(PpnRange::new(Ppn(5), Ppn(5)).is_empty());
}
