/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::sync::Arc;

use bulk_buffer::{BulkBufferReader, BulkBufferWriter};
use display_list::{
    ClientPictureCache, DisplayItem, DisplayItemKind, DisplayItemList, DisplayItemListCache,
    DisplayItemListClientCache, Picture, PictureCache, codec,
};

fn drawing_list(unique_id: u32, picture_id: u32) -> DisplayItemList {
    DisplayItemList {
        unique_id,
        items: vec![
            DisplayItem {
                bounds: euclid::rect(0, 0, 100, 50),
                kind: DisplayItemKind::Drawing(Arc::new(Picture {
                    id: picture_id,
                    data: vec![1, 2, 3, 4, 5],
                })),
            },
            DisplayItem {
                bounds: euclid::rect(10, 10, 20, 20),
                kind: DisplayItemKind::Clip(euclid::rect(10, 10, 20, 20)),
            },
        ],
    }
}

#[test]
fn codec_round_trip_preserves_the_list() {
    let mut writer = BulkBufferWriter::with_default_allocator();
    let mut pictures = PictureCache::new();
    let list = drawing_list(42, 7);
    let buffer = codec::serialize_into(&list, &mut writer, &mut pictures).expect("serialize");
    let flush = writer.flush();

    let mut reader = BulkBufferReader::new();
    assert!(reader.import_backings(flush.new_handles));
    let mut client_pictures = ClientPictureCache::new();
    let decoded = codec::create_from_stream(
        &mut reader.make_view(&buffer).into_reader(),
        &mut client_pictures,
    )
    .expect("deserialize");
    assert_eq!(decoded, list);
}

#[test]
fn repeated_pictures_ship_as_back_references() {
    let mut writer = BulkBufferWriter::with_default_allocator();
    let mut pictures = PictureCache::new();
    let first = codec::serialize_into(&drawing_list(1, 7), &mut writer, &mut pictures).unwrap();
    let second = codec::serialize_into(&drawing_list(2, 7), &mut writer, &mut pictures).unwrap();
    let backing_size = writer.backing_size();
    assert!(
        second.len(backing_size) < first.len(backing_size),
        "the second list should carry only the picture ID"
    );

    let flush = writer.flush();
    let mut reader = BulkBufferReader::new();
    assert!(reader.import_backings(flush.new_handles));
    let mut client_pictures = ClientPictureCache::new();
    let first_list = codec::create_from_stream(
        &mut reader.make_view(&first).into_reader(),
        &mut client_pictures,
    )
    .unwrap();
    let second_list = codec::create_from_stream(
        &mut reader.make_view(&second).into_reader(),
        &mut client_pictures,
    )
    .unwrap();
    // The back-reference resolves to the same picture bytes.
    assert_eq!(first_list.items[0].kind, second_list.items[0].kind);
}

#[test]
fn mark_used_serializes_once_per_generation() {
    let mut writer = BulkBufferWriter::with_default_allocator();
    let mut cache = DisplayItemListCache::new();
    let list = drawing_list(42, 7);
    cache.mark_used(&list, &mut writer);
    cache.mark_used(&list, &mut writer);
    cache.mark_used(&list, &mut writer);
    let update = cache.calculate_cache_update_and_flush();
    assert_eq!(update.len(), 1);
    assert_eq!(update[0].unique_id, 42);
}

#[test]
fn unchanged_lists_are_not_resent() {
    let mut writer = BulkBufferWriter::with_default_allocator();
    let mut cache = DisplayItemListCache::new();
    let list = drawing_list(42, 7);
    cache.mark_used(&list, &mut writer);
    assert_eq!(cache.calculate_cache_update_and_flush().len(), 1);

    cache.mark_used(&list, &mut writer);
    assert!(cache.calculate_cache_update_and_flush().is_empty());
}

#[test]
fn unused_lists_are_evicted_from_the_client_cache() {
    let mut writer = BulkBufferWriter::with_default_allocator();
    let mut engine_cache = DisplayItemListCache::new();
    let mut reader = BulkBufferReader::new();
    let mut client_cache = DisplayItemListClientCache::new();

    // Generation 1: the list is referenced and crosses the wire.
    let list = drawing_list(42, 7);
    engine_cache.mark_used(&list, &mut writer);
    let update = engine_cache.calculate_cache_update_and_flush();
    let flush = writer.flush();
    assert!(reader.import_backings(flush.new_handles));
    client_cache.apply_cache_update(&update, &reader);
    client_cache.mark_used(42);
    client_cache.flush();
    assert!(client_cache.contains(42));
    assert_eq!(client_cache.get_display_item_list(42).unique_id, 42);

    // Generation 2: nothing references the list anymore.
    let update = engine_cache.calculate_cache_update_and_flush();
    assert!(update.is_empty());
    client_cache.apply_cache_update(&update, &reader);
    client_cache.flush();
    assert!(!client_cache.contains(42));
}

#[test]
#[should_panic(expected = "duplicate display list")]
fn duplicate_cache_updates_are_a_protocol_violation() {
    let mut writer = BulkBufferWriter::with_default_allocator();
    let mut engine_cache = DisplayItemListCache::new();
    let mut reader = BulkBufferReader::new();
    let mut client_cache = DisplayItemListClientCache::new();

    engine_cache.mark_used(&drawing_list(42, 7), &mut writer);
    let update = engine_cache.calculate_cache_update_and_flush();
    let flush = writer.flush();
    assert!(reader.import_backings(flush.new_handles));
    client_cache.apply_cache_update(&update, &reader);
    client_cache.apply_cache_update(&update, &reader);
}

#[test]
#[should_panic(expected = "missing from client cache")]
fn getting_an_uncached_list_panics() {
    let client_cache = DisplayItemListClientCache::new();
    client_cache.get_display_item_list(99);
}
