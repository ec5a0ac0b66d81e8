//! Transaction-path coverage: atomicity of commit and abort, the two read
//! views, overwrite detection and state-machine errors.

mod common;

use common::*;
use tearless::{Error, tracker_len};

const TRACKER: usize = tracker_len(DATA_SIZE, WRITE_SIZE);

#[test]
fn commit_applies_all_writes_in_one_version_bump() {
    let mut tracker = [0u8; TRACKER];
    let (mut ftl, area) = single_area();
    let a = [0x11u8; 16];
    let b = [0x22u8; 16];

    ftl.transaction_start(area, &mut tracker).unwrap();
    ftl.transaction_write(area, BASE, &a).unwrap();
    ftl.transaction_write(area, BASE + 16, &b).unwrap();
    ftl.transaction_commit(area).unwrap();

    let data = read_all(&mut ftl, area, BASE, DATA_SIZE as usize);
    assert_eq!(&data[..16], &a);
    assert_eq!(&data[16..32], &b);
    assert_eq!(&data[32..], &vec![0xFF; 96][..]);

    // one bump for the whole transaction: 1 (format) + 1
    let raw = ftl.flash().raw();
    assert_eq!(raw_u32(raw, meta_offset(BASE, 1)), 2);
}

#[test]
fn abort_leaves_the_committed_state() {
    let mut tracker = [0u8; TRACKER];
    let (mut ftl, area) = single_area();
    let mut before = vec![0u8; DATA_SIZE as usize];
    fill_pattern(&mut 5, &mut before);
    ftl.write(area, BASE, before.as_slice()).unwrap(); // version 2

    ftl.transaction_start(area, &mut tracker).unwrap();
    ftl.transaction_write(area, BASE, &[0xEEu8; 16]).unwrap();
    assert!(ftl.transaction_abort(area).is_some());
    assert!(ftl.transaction_abort(area).is_none());

    assert_eq!(read_all(&mut ftl, area, BASE, DATA_SIZE as usize), before);
    let raw = ftl.flash().raw();
    assert_eq!(raw_u32(raw, meta_offset(BASE, 1)), 2);

    // the abandoned staging slot is reclaimed by the next write
    ftl.write(area, BASE + 16, &[0x77u8; 16]).unwrap();
    let data = read_all(&mut ftl, area, BASE, DATA_SIZE as usize);
    assert_eq!(&data[16..32], &[0x77u8; 16]);
    assert_eq!(&data[..16], &before[..16]);
}

#[test]
fn read_views_during_a_transaction() {
    let mut tracker = [0u8; TRACKER];
    let (mut ftl, area) = single_area();
    let before = [0x00u8; 128];
    ftl.write(area, BASE, &before).unwrap();

    ftl.transaction_start(area, &mut tracker).unwrap();
    let staged = [0x5Au8; 16];
    ftl.transaction_write(area, BASE, &staged).unwrap();

    // committed view is untouched
    let mut old = [0xFFu8; 32];
    ftl.read(area, &mut old, BASE).unwrap();
    assert_eq!(old, [0x00u8; 32]);

    // in-flight view mixes staged and committed units
    let mut newer = [0xFFu8; 32];
    ftl.read_newer(area, &mut newer, BASE).unwrap();
    assert_eq!(&newer[..16], &staged);
    assert_eq!(&newer[16..], &[0x00u8; 16]);

    ftl.transaction_commit(area).unwrap();
    let mut after = [0xFFu8; 32];
    ftl.read(area, &mut after, BASE).unwrap();
    assert_eq!(&after[..16], &staged);
    assert_eq!(&after[16..], &[0x00u8; 16]);
    // outside a transaction both views agree
    let mut after_newer = [0xFFu8; 32];
    ftl.read_newer(area, &mut after_newer, BASE).unwrap();
    assert_eq!(after, after_newer);
}

#[test]
fn staged_reads_cross_unit_boundaries_unaligned() {
    let mut tracker = [0u8; TRACKER];
    let (mut ftl, area) = single_area();
    let mut before = vec![0u8; DATA_SIZE as usize];
    fill_pattern(&mut 30, &mut before);
    ftl.write(area, BASE, before.as_slice()).unwrap();

    ftl.transaction_start(area, &mut tracker).unwrap();
    let staged = [0xC3u8; 16];
    ftl.transaction_write(area, BASE + 16, &staged).unwrap();

    // 10 bytes straddling the committed/staged boundary at offset 16
    let mut view = [0u8; 10];
    ftl.transaction_read(area, &mut view, BASE + 11).unwrap();
    assert_eq!(&view[..5], &before[11..16]);
    assert_eq!(&view[5..], &[0xC3u8; 5]);
}

#[test]
fn overwriting_a_unit_twice_is_rejected() {
    let mut tracker = [0u8; TRACKER];
    let (mut ftl, area) = single_area();

    ftl.transaction_start(area, &mut tracker).unwrap();
    ftl.transaction_write(area, BASE, &[1u8; 16]).unwrap();
    assert_eq!(
        ftl.transaction_write(area, BASE, &[2u8; 16]),
        Err(Error::TransactionOverwrite)
    );
    // an unaligned touch counts the whole unit too
    assert_eq!(
        ftl.transaction_write_any(area, BASE + 17, &[3u8; 2]),
        Ok(())
    );
    assert_eq!(
        ftl.transaction_write(area, BASE + 16, &[4u8; 16]),
        Err(Error::TransactionOverwrite)
    );
}

#[test]
fn transaction_state_machine_errors() {
    let mut tracker = [0u8; TRACKER];
    let mut other = [0u8; TRACKER];
    let (mut ftl, area) = single_area();
    let buf = [0u8; 16];
    let mut rbuf = [0u8; 16];

    assert_eq!(
        ftl.transaction_write(area, BASE, &buf),
        Err(Error::NoTransaction)
    );
    assert_eq!(
        ftl.transaction_read(area, &mut rbuf, BASE),
        Err(Error::NoTransaction)
    );
    assert!(matches!(
        ftl.transaction_commit(area),
        Err(Error::NoTransaction)
    ));
    assert!(ftl.transaction_abort(area).is_none());

    ftl.transaction_start(area, &mut tracker).unwrap();
    assert!(ftl.transaction_active(area));
    assert_eq!(
        ftl.transaction_start(area, &mut other),
        Err(Error::TransactionOngoing)
    );
    assert_eq!(ftl.basic_write(area, BASE, &buf), Err(Error::TransactionOngoing));
    assert_eq!(ftl.erase_all(area), Err(Error::TransactionOngoing));
    ftl.transaction_abort(area);
    assert!(!ftl.transaction_active(area));
}

#[test]
fn undersized_trackers_are_rejected() {
    let mut tracker = [0u8; 0];
    let (mut ftl, area) = single_area();
    assert_eq!(
        ftl.transaction_start(area, &mut tracker),
        Err(Error::TrackerTooSmall)
    );
}

#[test]
fn one_tracker_buffer_serves_successive_transactions() {
    let mut storage = [0u8; TRACKER];
    let (mut ftl, area) = single_area();
    let mut tracker: &mut [u8] = &mut storage;

    for round in 0u8..3 {
        ftl.transaction_start(area, tracker).unwrap();
        ftl.transaction_write(area, BASE, &[round; 16]).unwrap();
        tracker = ftl.transaction_commit(area).unwrap();
    }
    let data = read_all(&mut ftl, area, BASE, 16);
    assert_eq!(data, vec![2u8; 16]);
    // format (1) + three commits
    assert_eq!(raw_u32(ftl.flash().raw(), meta_offset(BASE, 1)), 4);
}

#[test]
fn write_dispatches_into_an_open_transaction() {
    let mut tracker = [0u8; TRACKER];
    let (mut ftl, area) = single_area();

    ftl.transaction_start(area, &mut tracker).unwrap();
    ftl.write(area, BASE, &[9u8; 16]).unwrap();
    ftl.write_any(area, BASE + 33, &[7u8; 3]).unwrap();

    // nothing committed yet
    let mut committed = [0u8; 16];
    ftl.read(area, &mut committed, BASE).unwrap();
    assert_eq!(committed, [0xFFu8; 16]);

    ftl.transaction_commit(area).unwrap();
    let data = read_all(&mut ftl, area, BASE, DATA_SIZE as usize);
    assert_eq!(&data[..16], &[9u8; 16]);
    assert_eq!(&data[33..36], &[7u8; 3]);
    assert_eq!(data[32], 0xFF);
    assert_eq!(data[36], 0xFF);
}

#[test]
fn empty_transaction_commit_still_bumps_the_version() {
    let mut tracker = [0u8; TRACKER];
    let (mut ftl, area) = single_area();
    let mut before = vec![0u8; DATA_SIZE as usize];
    fill_pattern(&mut 60, &mut before);
    ftl.write(area, BASE, before.as_slice()).unwrap(); // version 2

    ftl.transaction_start(area, &mut tracker).unwrap();
    ftl.transaction_commit(area).unwrap(); // version 3

    assert_eq!(read_all(&mut ftl, area, BASE, DATA_SIZE as usize), before);
    assert_eq!(raw_u32(ftl.flash().raw(), meta_offset(BASE, 0)), 3);
}

#[test]
fn unaligned_staged_writes_preserve_pre_transaction_neighbours() {
    let mut tracker = [0u8; TRACKER];
    let (mut ftl, area) = single_area();
    let mut before = vec![0u8; DATA_SIZE as usize];
    fill_pattern(&mut 90, &mut before);
    ftl.write(area, BASE, before.as_slice()).unwrap();

    ftl.transaction_start(area, &mut tracker).unwrap();
    let patch = [0xB7u8; 5];
    ftl.transaction_write_any(area, BASE + 45, &patch).unwrap();
    ftl.transaction_commit(area).unwrap();

    let mut expected = before.clone();
    expected[45..50].copy_from_slice(&patch);
    assert_eq!(read_all(&mut ftl, area, BASE, DATA_SIZE as usize), expected);
}

#[test]
fn misaligned_transaction_writes_are_rejected() {
    let mut tracker = [0u8; TRACKER];
    let (mut ftl, area) = single_area();
    ftl.transaction_start(area, &mut tracker).unwrap();
    let buf = [0u8; 16];
    assert_eq!(
        ftl.transaction_write(area, BASE + 4, &buf),
        Err(Error::BaseMisaligned)
    );
    assert_eq!(
        ftl.transaction_write(area, BASE, &buf[..5]),
        Err(Error::SizeMisaligned)
    );
    // rejected writes must not have marked any unit
    ftl.transaction_write_any(area, BASE + 4, &buf).unwrap();
    ftl.transaction_write(area, BASE + 32, &buf[..16]).unwrap();
    ftl.transaction_commit(area).unwrap();
}

#[test]
fn independent_transactions_on_two_areas() {
    let mut tracker_a = [0u8; TRACKER];
    let mut tracker_b = [0u8; tracker_len(256, WRITE_SIZE)];
    let (mut ftl, a, b) = two_areas();

    ftl.transaction_start(a, &mut tracker_a).unwrap();
    ftl.transaction_start(b, &mut tracker_b).unwrap();
    ftl.transaction_write(a, AREA_A.area, &[0xAAu8; 16]).unwrap();
    ftl.transaction_write(b, AREA_B.area, &[0xBBu8; 16]).unwrap();
    ftl.transaction_commit(a).unwrap();
    ftl.transaction_commit(b).unwrap();

    assert_eq!(read_all(&mut ftl, a, AREA_A.area, 16), vec![0xAA; 16]);
    assert_eq!(read_all(&mut ftl, b, AREA_B.area, 16), vec![0xBB; 16]);
}
