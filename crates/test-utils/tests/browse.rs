//! Streaming-verb behaviour seen from the user side of the pipeline.

use medley_core::source::{Caps, ResolutionFlags};
use medley_core::Framework;
use medley_test_utils::{FrameCollector, MockSource};
use medley_types::{CoreError, KeySet, MetadataKey};

fn keys() -> KeySet {
    KeySet::of(&[MetadataKey::TITLE, MetadataKey::URL])
}

#[test]
fn empty_result_is_a_single_terminal_frame() {
    let fw = Framework::new();
    let source = MockSource::new("tunes").into_rc();
    fw.register_source(source.clone());

    let collector = FrameCollector::new();
    let op_id = fw
        .browse(source.clone(), None, keys(), 0, 5, ResolutionFlags::empty(), collector.callback())
        .unwrap();
    fw.run_until_idle();

    let frames = collector.frames();
    assert_eq!(frames.len(), 1);
    assert!(frames[0].media.is_none());
    assert_eq!(frames[0].remaining, 0);
    assert!(frames[0].error.is_none());
    assert!(fw.is_operation_finished(op_id));
}

#[test]
fn single_item_is_stamped_with_the_source_id() {
    let fw = Framework::new();
    let source = MockSource::new("tunes").with_items(1).into_rc();
    fw.register_source(source.clone());

    let collector = FrameCollector::new();
    fw.browse(source.clone(), None, keys(), 0, 1, ResolutionFlags::empty(), collector.callback())
        .unwrap();
    fw.run_until_idle();

    assert_eq!(collector.remainings(), vec![0]);
    assert_eq!(collector.sources(), vec!["tunes".to_string()]);
    assert_eq!(collector.titles(), vec!["Item 0".to_string()]);
}

#[test]
fn remaining_counts_down_to_exactly_one_terminal() {
    let fw = Framework::new();
    let source = MockSource::new("tunes").with_items(5).into_rc();
    fw.register_source(source.clone());

    let collector = FrameCollector::new();
    let op_id = fw
        .browse(source.clone(), None, keys(), 0, 5, ResolutionFlags::empty(), collector.callback())
        .unwrap();
    fw.run_until_idle();

    assert_eq!(collector.remainings(), vec![4, 3, 2, 1, 0]);
    assert_eq!(collector.terminal_count(), 1);
    // user-visible order equals provider emission order
    assert_eq!(
        collector.titles(),
        vec!["Item 0", "Item 1", "Item 2", "Item 3", "Item 4"]
    );
    assert!(fw.is_operation_finished(op_id));
}

#[test]
fn skip_offsets_into_the_catalogue() {
    let fw = Framework::new();
    let source = MockSource::new("tunes").with_items(5).into_rc();
    fw.register_source(source.clone());

    let collector = FrameCollector::new();
    fw.browse(source.clone(), None, keys(), 2, 2, ResolutionFlags::empty(), collector.callback())
        .unwrap();
    fw.run_until_idle();

    assert_eq!(collector.titles(), vec!["Item 2", "Item 3"]);
    assert_eq!(collector.remainings(), vec![1, 0]);
}

#[test]
fn idle_relay_delivers_the_same_stream() {
    let fw = Framework::new();
    let source = MockSource::new("tunes").with_items(3).emitting_via_queue().into_rc();
    fw.register_source(source.clone());

    let collector = FrameCollector::new();
    fw.browse(
        source.clone(),
        None,
        keys(),
        0,
        3,
        ResolutionFlags::IDLE_RELAY,
        collector.callback(),
    )
    .unwrap();

    // nothing is delivered synchronously
    assert!(collector.is_empty());
    fw.run_until_idle();

    assert_eq!(collector.remainings(), vec![2, 1, 0]);
    assert_eq!(collector.terminal_count(), 1);
}

#[test]
fn fast_only_strips_slow_keys_from_the_request() {
    let fw = Framework::new();
    let source = MockSource::new("tunes")
        .with_items(1)
        .with_slow_keys(KeySet::of(&[MetadataKey::DURATION]))
        .into_rc();
    fw.register_source(source.clone());

    let requested = KeySet::of(&[
        MetadataKey::TITLE,
        MetadataKey::DURATION,
        // slow by default in the key registry
        MetadataKey::THUMBNAIL,
    ]);
    let collector = FrameCollector::new();
    fw.browse(
        source.clone(),
        None,
        requested,
        0,
        1,
        ResolutionFlags::FAST_ONLY,
        collector.callback(),
    )
    .unwrap();
    fw.run_until_idle();

    let served = source.requests();
    assert_eq!(served.len(), 1);
    assert_eq!(served[0].keys, KeySet::of(&[MetadataKey::TITLE]));
}

#[test]
fn browse_requires_the_capability() {
    let fw = Framework::new();
    let source = MockSource::new("tunes").with_caps(Caps::SEARCH).into_rc();
    fw.register_source(source.clone());

    let collector = FrameCollector::new();
    let result = fw.browse(
        source.clone(),
        None,
        keys(),
        0,
        1,
        ResolutionFlags::empty(),
        collector.callback(),
    );
    match result {
        Err(error) => assert_eq!(error.code(), "browse-failed"),
        Ok(_) => panic!("browse without the capability must fail"),
    }
}

#[test]
fn zero_count_is_rejected() {
    let fw = Framework::new();
    let source = MockSource::new("tunes").into_rc();
    fw.register_source(source.clone());

    let collector = FrameCollector::new();
    assert!(fw
        .browse(source.clone(), None, keys(), 0, 0, ResolutionFlags::empty(), collector.callback())
        .is_err());
}

#[test]
fn query_streams_like_browse() {
    let fw = Framework::new();
    let source = MockSource::new("tunes").with_items(2).into_rc();
    fw.register_source(source.clone());

    let collector = FrameCollector::new();
    fw.query(
        source.clone(),
        "genre=jazz",
        keys(),
        0,
        2,
        ResolutionFlags::empty(),
        collector.callback(),
    )
    .unwrap();
    fw.run_until_idle();

    assert_eq!(collector.remainings(), vec![1, 0]);
    assert_eq!(collector.item_count(), 2);
}

#[test]
fn null_text_search_surfaces_the_dedicated_error() {
    let fw = Framework::new();
    let source = MockSource::new("tunes").with_items(2).rejecting_null_text().into_rc();
    fw.register_source(source.clone());

    let collector = FrameCollector::new();
    fw.search(
        source.clone(),
        None,
        keys(),
        0,
        2,
        ResolutionFlags::empty(),
        collector.callback(),
    )
    .unwrap();
    fw.run_until_idle();

    assert_eq!(collector.terminal_error(), Some(CoreError::SearchNullUnsupported));
    assert_eq!(collector.item_count(), 0);

    // a text search still works
    let collector = FrameCollector::new();
    fw.search(
        source.clone(),
        Some("item"),
        keys(),
        0,
        2,
        ResolutionFlags::empty(),
        collector.callback(),
    )
    .unwrap();
    fw.run_until_idle();
    assert_eq!(collector.item_count(), 2);
}

#[test]
fn search_errors_surface_on_the_terminal() {
    let fw = Framework::new();
    let source = MockSource::new("tunes")
        .failing_search(CoreError::SearchFailed("backend offline".into()))
        .into_rc();
    fw.register_source(source.clone());

    let collector = FrameCollector::new();
    fw.search(
        source.clone(),
        Some("anything"),
        keys(),
        0,
        3,
        ResolutionFlags::empty(),
        collector.callback(),
    )
    .unwrap();
    fw.run_until_idle();

    assert_eq!(collector.terminal_count(), 1);
    assert_eq!(
        collector.terminal_error(),
        Some(CoreError::SearchFailed("backend offline".into()))
    );
}
