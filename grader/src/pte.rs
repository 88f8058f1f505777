use abyss::mmu::PteFlags;
use ulib::cow::{PTE_COW, SharePerm, SharingMode};

#[test]
fn duplication_mode() {
    let user = PteFlags::P | PteFlags::U;
    assert_eq!(SharingMode::for_duplication(user | PteFlags::W), SharingMode::SharedCow);
    assert_eq!(SharingMode::for_duplication(user | PTE_COW), SharingMode::SharedCow);
    assert_eq!(SharingMode::for_duplication(user), SharingMode::SharedReadOnly);
    assert_eq!(SharingMode::of(user | PteFlags::W), SharingMode::Private);
    assert_eq!(SharingMode::of(user | PTE_COW), SharingMode::SharedCow);
}

#[test]
fn share_perm_rejects_writable_cow() {
    let user = PteFlags::P | PteFlags::U;
    assert!(SharePerm::new(user | PteFlags::W | PTE_COW).is_none());
    assert_eq!(
        SharePerm::new(user | PteFlags::W | PteFlags::D).map(SharePerm::flags),
        Some(user | PteFlags::W)
    );
    assert_eq!(SharePerm::private().flags(), user | PteFlags::W);
    assert_eq!(SharePerm::private().mode(), SharingMode::Private);
}

#[test]
fn cow_perm_keeps_software_bits() {
    let flags = PteFlags::P | PteFlags::U | PteFlags::W | PteFlags::AVAIL_0 | PteFlags::A;
    let perm = SharePerm::for_mode(SharingMode::SharedCow, flags).flags();
    assert_eq!(perm, PteFlags::P | PteFlags::U | PteFlags::AVAIL_0 | PTE_COW);

    let ro = PteFlags::P | PteFlags::U | PteFlags::AVAIL_1;
    assert_eq!(SharePerm::for_mode(SharingMode::SharedReadOnly, ro).flags(), ro);
}

#[test]
fn never_writable_and_cow() {
    for bits in 0..=PteFlags::all().bits() {
        let flags = PteFlags::from_bits_truncate(bits) | PteFlags::P | PteFlags::U;
        let mode = SharingMode::for_duplication(flags);
        let perm = SharePerm::for_mode(mode, flags).flags();
        assert!(!perm.contains(PteFlags::W | PTE_COW), "{flags:?} -> {perm:?}");
        assert!(PteFlags::SYSCALL.contains(perm));
        assert_eq!(perm.contains(PTE_COW), mode == SharingMode::SharedCow);
        assert_eq!(SharePerm::for_mode(mode, flags).mode(), mode);
    }
}
