//! Transparent chunking of large count requests.

use medley_core::source::ResolutionFlags;
use medley_core::Framework;
use medley_test_utils::{FrameCollector, MockSource};
use medley_types::{CoreError, KeySet, MetadataKey};

fn keys() -> KeySet {
    KeySet::of(&[MetadataKey::TITLE])
}

#[test]
fn five_results_arrive_in_three_chunks() {
    let fw = Framework::new();
    let source = MockSource::new("endless").unbounded().with_auto_split(2).into_rc();
    fw.register_source(source.clone());

    let collector = FrameCollector::new();
    let op_id = fw
        .browse(source.clone(), None, keys(), 0, 5, ResolutionFlags::empty(), collector.callback())
        .unwrap();
    fw.run_until_idle();

    // the provider saw three chunked requests
    let served: Vec<(u64, u64)> = source.requests().iter().map(|r| (r.skip, r.count)).collect();
    assert_eq!(served, vec![(0, 2), (2, 2), (4, 1)]);

    // the user saw one uninterrupted stream
    assert_eq!(collector.remainings(), vec![4, 3, 2, 1, 0]);
    assert_eq!(collector.item_count(), 5);
    assert_eq!(collector.terminal_count(), 1);
    assert!(fw.is_operation_finished(op_id));
}

#[test]
fn split_delivers_min_of_requested_and_available() {
    let fw = Framework::new();
    let source = MockSource::new("small").with_items(3).with_auto_split(2).into_rc();
    fw.register_source(source.clone());

    let collector = FrameCollector::new();
    fw.browse(source.clone(), None, keys(), 0, 5, ResolutionFlags::empty(), collector.callback())
        .unwrap();
    fw.run_until_idle();

    // the second chunk came up short, ending the stream
    assert_eq!(collector.item_count(), 3);
    assert_eq!(collector.terminal_count(), 1);
    let remainings = collector.remainings();
    assert_eq!(*remainings.last().unwrap(), 0);
    // remaining never increases on the way down
    assert!(remainings.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn an_exhausted_chunk_terminates_without_another_request() {
    let fw = Framework::new();
    let source = MockSource::new("small").with_items(2).with_auto_split(2).into_rc();
    fw.register_source(source.clone());

    let collector = FrameCollector::new();
    fw.browse(source.clone(), None, keys(), 0, 6, ResolutionFlags::empty(), collector.callback())
        .unwrap();
    fw.run_until_idle();

    assert_eq!(collector.item_count(), 2);
    assert_eq!(collector.terminal_count(), 1);
    // first chunk drained the source; the empty second chunk closed the
    // stream and no third was issued
    assert_eq!(source.requests().len(), 2);
}

#[test]
fn small_requests_are_not_split() {
    let fw = Framework::new();
    let source = MockSource::new("endless").unbounded().with_auto_split(10).into_rc();
    fw.register_source(source.clone());

    let collector = FrameCollector::new();
    fw.browse(source.clone(), None, keys(), 0, 5, ResolutionFlags::empty(), collector.callback())
        .unwrap();
    fw.run_until_idle();

    let served: Vec<(u64, u64)> = source.requests().iter().map(|r| (r.skip, r.count)).collect();
    assert_eq!(served, vec![(0, 5)]);
    assert_eq!(collector.remainings(), vec![4, 3, 2, 1, 0]);
}

#[test]
fn cancel_stops_the_chunk_chain() {
    let fw = Framework::new();
    let source =
        MockSource::new("endless").unbounded().with_auto_split(2).emitting_via_queue().into_rc();
    fw.register_source(source.clone());

    let collector = FrameCollector::new();
    let op_id = fw
        .browse(source.clone(), None, keys(), 0, 6, ResolutionFlags::empty(), collector.callback())
        .unwrap();

    // let the first chunk be requested and its first frame delivered
    fw.queue().run_one();
    fw.queue().run_one();
    fw.cancel(op_id);
    fw.run_until_idle();

    assert_eq!(collector.terminal_count(), 1);
    assert_eq!(collector.terminal_error(), Some(CoreError::OperationCancelled));
    // no chunk beyond the first was requested
    assert_eq!(source.requests().len(), 1);
}
