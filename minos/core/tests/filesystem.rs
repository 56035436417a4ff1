use minos_core::{BlockHeader, CoreError, DiskDriver, Tsb, BLOCK_DATA_LEN};

fn formatted() -> DiskDriver {
    let mut disk = DiskDriver::new();
    disk.format();
    disk
}

#[test]
fn create_write_read_delete_round_trip() {
    let mut disk = formatted();
    disk.create("foo").unwrap();
    disk.write("foo", b"hello world").unwrap();
    assert_eq!(disk.ls(false).unwrap(), vec!["foo".to_string()]);
    assert_eq!(disk.read_string("foo").unwrap(), "hello world");
    disk.delete("foo").unwrap();
    assert_eq!(disk.ls(false).unwrap(), Vec::<String>::new());
    assert!(matches!(disk.read("foo"), Err(CoreError::NotFound { .. })));
}

#[test]
fn hidden_files_only_list_with_the_all_flag() {
    let mut disk = formatted();
    disk.create(".secret").unwrap();
    disk.create("plain").unwrap();
    assert_eq!(disk.ls(false).unwrap(), vec!["plain".to_string()]);
    assert_eq!(disk.ls(true).unwrap(), vec![".secret".to_string(), "plain".to_string()]);
}

#[test]
fn multi_block_files_chain_and_terminate() {
    let mut disk = formatted();
    disk.create("big").unwrap();
    let payload: Vec<u8> = (0..BLOCK_DATA_LEN * 5).map(|i| b'a' + (i % 26) as u8).collect();
    disk.write("big", &payload).unwrap();
    assert_eq!(disk.read("big").unwrap(), payload);

    // Every active directory entry reaches a terminator within the record
    // count, with no cycles.
    for entry in Tsb::directory() {
        let record = disk.record(entry);
        if entry == Tsb::MBR || !record.active {
            continue;
        }
        let mut cursor = match record.header {
            BlockHeader::Next(tsb) => tsb,
            other => panic!("directory entry {entry} has header {other:?}"),
        };
        let mut steps = 0;
        loop {
            steps += 1;
            assert!(steps <= 256, "chain from {entry} does not terminate");
            match disk.record(cursor).header {
                BlockHeader::End => break,
                BlockHeader::Next(next) => cursor = next,
                BlockHeader::Unlinked => panic!("chain from {entry} hit an unlinked block"),
            }
        }
    }
}

#[test]
fn copy_duplicates_contents_under_a_new_name() {
    let mut disk = formatted();
    disk.create("src").unwrap();
    disk.write("src", b"payload").unwrap();
    disk.copy("src", "dst").unwrap();
    assert_eq!(disk.read_string("dst").unwrap(), "payload");
    // Independent chains: rewriting the copy leaves the original alone.
    disk.write("dst", b"changed").unwrap();
    assert_eq!(disk.read_string("src").unwrap(), "payload");
}

#[test]
fn format_twice_yields_an_identical_store() {
    let mut disk = formatted();
    disk.create("junk").unwrap();
    disk.write("junk", b"to be erased").unwrap();
    disk.format();
    let first: Vec<_> = Tsb::all()
        .map(|tsb| {
            let r = disk.record(tsb);
            (r.active, r.header, r.data)
        })
        .collect();
    disk.format();
    let second: Vec<_> = Tsb::all()
        .map(|tsb| {
            let r = disk.record(tsb);
            (r.active, r.header, r.data)
        })
        .collect();
    assert_eq!(first, second);
}

#[test]
fn data_region_exhaustion_is_reported_not_fatal() {
    let mut disk = formatted();
    disk.create("huge").unwrap();
    // 3 data tracks x 8 sectors x 8 blocks = 192 blocks capacity.
    let capacity = 192 * BLOCK_DATA_LEN;
    let payload = vec![b'x'; capacity];
    disk.write("huge", &payload).unwrap();
    assert_eq!(disk.stats().data_free, 0);

    let over = vec![b'x'; capacity + 1];
    assert!(matches!(disk.write("huge", &over), Err(CoreError::NoSpace)));

    // The disk still answers reads after the failure.
    assert!(disk.read("huge").is_ok());
}

#[test]
fn deleted_chains_are_reusable_space() {
    let mut disk = formatted();
    disk.create("a").unwrap();
    disk.write("a", &vec![b'a'; BLOCK_DATA_LEN * 10]).unwrap();
    let used = disk.stats().data_used;
    disk.delete("a").unwrap();
    assert_eq!(disk.stats().data_used, used - 10);

    disk.create("b").unwrap();
    disk.write("b", &vec![b'b'; BLOCK_DATA_LEN * 10]).unwrap();
    assert_eq!(disk.read("b").unwrap(), vec![b'b'; BLOCK_DATA_LEN * 10]);
}
