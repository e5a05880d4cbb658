//! Cancellation semantics and protection against misbehaving providers.

use medley_core::source::{
    media_handle, BrowseRequest, Caps, ResolutionFlags, ResultCallback, ResultFrame, Source,
};
use medley_core::Framework;
use medley_test_utils::{FrameCollector, MockSource};
use medley_types::{CoreError, KeySet, Media, MetadataKey};
use std::cell::Cell;
use std::rc::Rc;

fn keys() -> KeySet {
    KeySet::of(&[MetadataKey::TITLE])
}

#[test]
fn cancel_before_the_first_tick_yields_one_cancelled_terminal() {
    let fw = Framework::new();
    let source = MockSource::new("tunes").with_items(5).emitting_via_queue().into_rc();
    fw.register_source(source.clone());

    let collector = FrameCollector::new();
    let op_id = fw
        .browse(source.clone(), None, keys(), 0, 5, ResolutionFlags::empty(), collector.callback())
        .unwrap();
    fw.cancel(op_id);
    fw.run_until_idle();

    let frames = collector.frames();
    assert_eq!(frames.len(), 1);
    assert!(frames[0].media.is_none());
    assert_eq!(frames[0].remaining, 0);
    assert_eq!(frames[0].error, Some(CoreError::OperationCancelled));
    // the provider was never asked
    assert!(source.requests().is_empty());
    assert!(fw.is_operation_finished(op_id));
}

#[test]
fn cancel_mid_stream_drops_the_tail_and_cancels_the_terminal() {
    let fw = Framework::new();
    let source = MockSource::new("tunes").with_items(5).emitting_via_queue().into_rc();
    fw.register_source(source.clone());

    let collector = FrameCollector::new();
    let inner = collector.callback();
    let fw2 = fw.clone();
    let op_cell = Rc::new(Cell::new(0u64));
    let op_cell2 = op_cell.clone();
    let items_seen = Rc::new(Cell::new(0u32));
    let callback: ResultCallback = Rc::new(move |frame| {
        let is_item = frame.media.is_some();
        inner(frame);
        if is_item {
            items_seen.set(items_seen.get() + 1);
            if items_seen.get() == 2 {
                fw2.cancel(op_cell2.get());
            }
        }
    });

    let op_id = fw
        .browse(source.clone(), None, keys(), 0, 5, ResolutionFlags::empty(), callback)
        .unwrap();
    op_cell.set(op_id);
    fw.run_until_idle();

    // two items got through, the in-flight tail was dropped, the terminal
    // carries the canonical cancellation error
    assert_eq!(collector.remainings(), vec![4, 3, 0]);
    assert_eq!(collector.item_count(), 2);
    assert_eq!(collector.terminal_error(), Some(CoreError::OperationCancelled));
    assert!(fw.is_operation_finished(op_id));
}

#[test]
fn cancel_is_idempotent() {
    let fw = Framework::new();
    let source = MockSource::new("tunes").with_items(3).emitting_via_queue().into_rc();
    fw.register_source(source.clone());

    let collector = FrameCollector::new();
    let op_id = fw
        .browse(source.clone(), None, keys(), 0, 3, ResolutionFlags::empty(), collector.callback())
        .unwrap();
    fw.cancel(op_id);
    fw.cancel(op_id);
    fw.run_until_idle();
    fw.cancel(op_id);

    assert_eq!(collector.len(), 1);
    assert_eq!(collector.terminal_error(), Some(CoreError::OperationCancelled));
}

#[test]
fn cancel_after_completion_changes_nothing() {
    let fw = Framework::new();
    let source = MockSource::new("tunes").with_items(2).into_rc();
    fw.register_source(source.clone());

    let collector = FrameCollector::new();
    let op_id = fw
        .browse(source.clone(), None, keys(), 0, 2, ResolutionFlags::empty(), collector.callback())
        .unwrap();
    fw.run_until_idle();
    assert_eq!(collector.remainings(), vec![1, 0]);

    fw.cancel(op_id);
    fw.run_until_idle();
    assert_eq!(collector.remainings(), vec![1, 0]);
    assert!(collector.terminal_error().is_none());
}

#[test]
fn the_cancel_hook_fires_exactly_once() {
    let fw = Framework::new();
    let source = MockSource::new("tunes").with_items(3).emitting_via_queue().into_rc();
    fw.register_source(source.clone());

    let collector = FrameCollector::new();
    let op_id = fw
        .browse(source.clone(), None, keys(), 0, 3, ResolutionFlags::empty(), collector.callback())
        .unwrap();

    let fired = Rc::new(Cell::new(0u32));
    let fired2 = fired.clone();
    fw.set_cancel_hook(op_id, move || fired2.set(fired2.get() + 1));

    fw.cancel(op_id);
    fw.cancel(op_id);
    fw.run_until_idle();

    assert_eq!(fired.get(), 1);
}

/// A backend that keeps emitting after its terminal frame.
struct NoisySource;

impl Source for NoisySource {
    fn id(&self) -> &str {
        "noisy"
    }

    fn name(&self) -> &str {
        "Noisy"
    }

    fn caps(&self) -> Caps {
        Caps::BROWSE
    }

    fn browse(&self, _fw: &Framework, request: BrowseRequest) {
        let callback = request.callback.clone();
        let op_id = request.op_id;
        let item = |title: &str| Some(media_handle(Media::audio().with_title(title)));
        callback(ResultFrame { op_id, media: item("first"), remaining: 1, error: None });
        callback(ResultFrame { op_id, media: item("second"), remaining: 0, error: None });
        // a confused backend keeps talking
        callback(ResultFrame { op_id, media: item("stray"), remaining: 0, error: None });
        callback(ResultFrame { op_id, media: item("late"), remaining: 2, error: None });
    }
}

#[test]
fn frames_after_the_terminal_are_absorbed() {
    let fw = Framework::new();
    let source: Rc<dyn Source> = Rc::new(NoisySource);
    fw.register_source(source.clone());

    let collector = FrameCollector::new();
    let op_id = fw
        .browse(source.clone(), None, keys(), 0, 2, ResolutionFlags::empty(), collector.callback())
        .unwrap();
    fw.run_until_idle();

    assert_eq!(collector.titles(), vec!["first", "second"]);
    assert_eq!(collector.terminal_count(), 1);
    assert!(fw.is_operation_finished(op_id));
}

#[test]
fn double_terminals_are_absorbed_through_the_idle_relay_too() {
    let fw = Framework::new();
    let source: Rc<dyn Source> = Rc::new(NoisySource);
    fw.register_source(source.clone());

    let collector = FrameCollector::new();
    fw.browse(source.clone(), None, keys(), 0, 2, ResolutionFlags::IDLE_RELAY, collector.callback())
        .unwrap();
    fw.run_until_idle();

    assert_eq!(collector.titles(), vec!["first", "second"]);
    assert_eq!(collector.terminal_count(), 1);
}
