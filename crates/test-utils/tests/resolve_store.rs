//! Single-shot verbs (resolve, store, remove) and change notification.

use medley_core::source::{media_handle, Caps, ChangeEvent, ChangeKind, ResolutionFlags};
use medley_core::Framework;
use medley_test_utils::{MockSource, ReplyCollector};
use medley_types::{CoreError, KeySet, Media, MetadataKey, ProviderConfig, Value};
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn resolve_fills_requested_keys_and_stamps_the_source() {
    let fw = Framework::new();
    let source = MockSource::new("tunes")
        .with_caps(Caps::RESOLVE)
        .with_supported_keys(KeySet::of(&[MetadataKey::ARTIST]))
        .resolving(MetadataKey::ARTIST, "Someone")
        .into_rc();
    fw.register_source(source.clone());

    let media = media_handle(Media::audio().with_id("t-1").with_title("Track"));
    let collector = ReplyCollector::new();
    let op_id = fw
        .resolve(
            source.clone(),
            Some(media.clone()),
            KeySet::of(&[MetadataKey::ARTIST]),
            ResolutionFlags::empty(),
            collector.callback(),
        )
        .unwrap();
    fw.run_until_idle();

    let reply = collector.single();
    assert!(reply.error.is_none());
    assert_eq!(media.borrow().get(MetadataKey::ARTIST), Some(&Value::Str("Someone".into())));
    assert_eq!(media.borrow().source(), Some("tunes"));
    assert!(fw.is_operation_finished(op_id));
}

#[test]
fn full_resolve_chains_auxiliary_sources() {
    let fw = Framework::new();
    let origin = MockSource::new("tunes")
        .with_caps(Caps::RESOLVE)
        .with_supported_keys(KeySet::of(&[MetadataKey::DURATION]))
        .resolving(MetadataKey::DURATION, 180i64)
        .into_rc();
    let aux = MockSource::new("oracle")
        .with_caps(Caps::RESOLVE)
        .with_supported_keys(KeySet::of(&[MetadataKey::ARTIST]))
        .resolving(MetadataKey::ARTIST, "The Band")
        .into_rc();
    fw.register_source(origin.clone());
    fw.register_source(aux.clone());

    let media = media_handle(Media::audio().with_id("t-1").with_title("Track"));
    let collector = ReplyCollector::new();
    fw.resolve(
        origin.clone(),
        Some(media.clone()),
        KeySet::of(&[MetadataKey::DURATION, MetadataKey::ARTIST]),
        ResolutionFlags::FULL,
        collector.callback(),
    )
    .unwrap();
    fw.run_until_idle();

    let reply = collector.single();
    assert!(reply.error.is_none());
    let media = media.borrow();
    assert_eq!(media.get(MetadataKey::DURATION), Some(&Value::Int(180)));
    assert_eq!(media.get(MetadataKey::ARTIST), Some(&Value::Str("The Band".into())));
}

#[test]
fn resolve_validates_capability_and_keys() {
    let fw = Framework::new();
    let no_resolve = MockSource::new("plain").into_rc();
    let resolver = MockSource::new("resolver").with_caps(Caps::RESOLVE).into_rc();
    fw.register_source(no_resolve.clone());
    fw.register_source(resolver.clone());

    let collector = ReplyCollector::new();
    assert!(fw
        .resolve(
            no_resolve.clone(),
            None,
            KeySet::of(&[MetadataKey::TITLE]),
            ResolutionFlags::empty(),
            collector.callback(),
        )
        .is_err());
    assert!(fw
        .resolve(
            resolver.clone(),
            None,
            KeySet::new(),
            ResolutionFlags::empty(),
            collector.callback(),
        )
        .is_err());
}

#[test]
fn store_validates_before_reaching_the_source() {
    let fw = Framework::new();
    let source = MockSource::new("shelf").with_caps(Caps::STORE).into_rc();
    fw.register_source(source.clone());

    let stored = Rc::new(RefCell::new(Vec::new()));
    let stored2 = stored.clone();
    let callback = Rc::new(move |frame: medley_core::source::StoreFrame| {
        stored2.borrow_mut().push(frame.error.is_none());
    });

    // no title
    let untitled = media_handle(Media::audio().with_url("https://x/1.ogg"));
    assert!(fw.store(source.clone(), None, untitled, callback.clone()).is_err());

    // no url on a non-container
    let unlocated = media_handle(Media::audio().with_title("Track"));
    assert!(fw.store(source.clone(), None, unlocated, callback.clone()).is_err());

    // a well-formed record goes through
    let media = media_handle(Media::audio().with_title("Track").with_url("https://x/1.ogg"));
    let op_id = fw.store(source.clone(), None, media, callback).unwrap();
    fw.run_until_idle();

    assert_eq!(*stored.borrow(), vec![true]);
    assert_eq!(source.catalogue().len(), 1);
    assert!(fw.is_operation_finished(op_id));
}

#[test]
fn remove_requires_an_id_and_reports_unknown_media() {
    let fw = Framework::new();
    let source = MockSource::new("shelf").with_caps(Caps::REMOVE).with_items(2).into_rc();
    fw.register_source(source.clone());

    let errors = Rc::new(RefCell::new(Vec::new()));
    let errors2 = errors.clone();
    let callback = Rc::new(move |frame: medley_core::source::RemoveFrame| {
        errors2.borrow_mut().push(frame.error.clone());
    });

    // no id at all
    let anonymous = media_handle(Media::audio().with_title("???"));
    assert!(fw.remove(source.clone(), anonymous, callback.clone()).is_err());

    // unknown id surfaces a provider error
    let stranger = media_handle(Media::audio().with_id("nope"));
    fw.remove(source.clone(), stranger, callback.clone()).unwrap();
    fw.run_until_idle();
    assert!(matches!(errors.borrow()[0], Some(CoreError::RemoveFailed(_))));

    // a real record is removed
    let known = media_handle(Media::audio().with_id("shelf-item-0"));
    fw.remove(source.clone(), known, callback).unwrap();
    fw.run_until_idle();
    assert!(errors.borrow()[1].is_none());
    assert_eq!(source.catalogue().len(), 1);
}

#[test]
fn change_notifications_are_stamped_and_fanned_out() {
    let fw = Framework::new();
    let source = MockSource::new("watcher")
        .with_caps(Caps::BROWSE | Caps::NOTIFY_CHANGE)
        .into_rc();
    fw.register_source(source.clone());

    let events: Rc<RefCell<Vec<ChangeEvent>>> = Rc::new(RefCell::new(Vec::new()));
    let events2 = events.clone();
    let subscription = fw.subscribe_changes(Rc::new(move |event: &ChangeEvent| {
        events2.borrow_mut().push(event.clone());
    }));

    fw.notify_change_start(source.clone()).unwrap();
    assert!(source.notify_active());

    source.emit_change(
        &fw,
        vec![Media::audio().with_id("w-1")],
        ChangeKind::Added,
        false,
    );

    {
        let events = events.borrow();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source_id, "watcher");
        assert_eq!(events[0].kind, ChangeKind::Added);
        assert_eq!(events[0].items[0].borrow().source(), Some("watcher"));
    }

    fw.unsubscribe_changes(subscription);
    source.emit_change(&fw, vec![], ChangeKind::Removed, true);
    assert_eq!(events.borrow().len(), 1);

    fw.notify_change_stop(source.clone()).unwrap();
    assert!(!source.notify_active());

    // sources without the capability are refused
    let mute = MockSource::new("mute").into_rc();
    fw.register_source(mute.clone());
    assert!(fw.notify_change_start(mute.clone()).is_err());
}

#[test]
fn configurations_are_looked_up_by_plugin() {
    let fw = Framework::new();
    fw.add_config(ProviderConfig::new("jukebox").with("api-key", "k1"));
    fw.add_config(ProviderConfig::new("jukebox").for_source("jukebox-remote").with("api-key", "k2"));
    fw.add_config(ProviderConfig::new("other"));

    let configs = fw.configs_for("jukebox");
    assert_eq!(configs.len(), 2);
    assert_eq!(configs[0].api_key(), Some("k1"));
    assert_eq!(configs[1].source(), Some("jukebox-remote"));
    assert!(fw.configs_for("missing").is_empty());
}

#[test]
fn operation_data_lives_until_the_operation_finishes() {
    let fw = Framework::new();
    let source = MockSource::new("tunes").with_items(1).emitting_via_queue().into_rc();
    fw.register_source(source.clone());

    let collector = medley_test_utils::FrameCollector::new();
    let op_id = fw
        .browse(
            source.clone(),
            None,
            KeySet::of(&[MetadataKey::TITLE]),
            0,
            1,
            ResolutionFlags::empty(),
            collector.callback(),
        )
        .unwrap();

    fw.set_operation_data(op_id, Rc::new("bookmark".to_string()));
    let data = fw.operation_data(op_id).expect("data is attached while ongoing");
    assert_eq!(*data.downcast::<String>().unwrap(), "bookmark");

    fw.run_until_idle();
    assert!(fw.operation_data(op_id).is_none());
}
