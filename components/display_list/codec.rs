/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The display list byte-stream codec.
//!
//! Wire layout: `u32 unique_id`, `u32 item_count`, then per item
//! `{ i32 x, i32 y, i32 width, i32 height, u32 tag, payload }`, all
//! little-endian. A drawing item's payload starts with the picture ID and an
//! inline flag: when the engine's picture cache says the client already
//! holds the picture, only the back-reference crosses the wire.

use std::io::{self, Read, Write};
use std::sync::Arc;

use bulk_buffer::{BulkBuffer, BulkBufferWriter};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use euclid::default::{Rect, Transform3D};
use log::warn;

use crate::picture::{ClientPictureCache, Picture, PictureCache};
use crate::{DisplayItem, DisplayItemKind, DisplayItemList};

const ITEM_TAG_DRAWING: u32 = 1;
const ITEM_TAG_CLIP: u32 = 2;
const ITEM_TAG_TRANSFORM: u32 = 3;

const PICTURE_BY_REFERENCE: u32 = 0;
const PICTURE_INLINE: u32 = 1;

/// Serializes `list` through the bulk buffer writer, returning the buffer
/// that names the bytes. `None` means a backing allocation failed and the
/// payload was abandoned.
pub fn serialize_into(
    list: &DisplayItemList,
    writer: &mut BulkBufferWriter,
    pictures: &mut PictureCache,
) -> Option<BulkBuffer> {
    if !writer.begin_buffer() {
        warn!("No backing for display list {}; dropping it.", list.unique_id);
        return None;
    }
    let result = write_list(list, &mut writer.current_buffer_writer(), pictures);
    let buffer = writer.end_buffer();
    match result {
        Ok(()) => Some(buffer),
        Err(error) => {
            warn!("Serializing display list {} failed: {error}.", list.unique_id);
            None
        },
    }
}

fn write_list(
    list: &DisplayItemList,
    sink: &mut impl Write,
    pictures: &mut PictureCache,
) -> io::Result<()> {
    sink.write_u32::<LittleEndian>(list.unique_id)?;
    sink.write_u32::<LittleEndian>(list.items.len() as u32)?;
    for item in &list.items {
        write_item(item, sink, pictures)?;
    }
    Ok(())
}

fn write_item(
    item: &DisplayItem,
    sink: &mut impl Write,
    pictures: &mut PictureCache,
) -> io::Result<()> {
    write_rect(&item.bounds, sink)?;
    match &item.kind {
        DisplayItemKind::Drawing(picture) => {
            sink.write_u32::<LittleEndian>(ITEM_TAG_DRAWING)?;
            sink.write_u32::<LittleEndian>(picture.id)?;
            if pictures.note_sent(picture.id) {
                sink.write_u32::<LittleEndian>(PICTURE_BY_REFERENCE)?;
            } else {
                sink.write_u32::<LittleEndian>(PICTURE_INLINE)?;
                sink.write_u32::<LittleEndian>(picture.data.len() as u32)?;
                sink.write_all(&picture.data)?;
            }
        },
        DisplayItemKind::Clip(rect) => {
            sink.write_u32::<LittleEndian>(ITEM_TAG_CLIP)?;
            write_rect(rect, sink)?;
        },
        DisplayItemKind::Transform(transform) => {
            sink.write_u32::<LittleEndian>(ITEM_TAG_TRANSFORM)?;
            for value in transform.to_array() {
                sink.write_f32::<LittleEndian>(value)?;
            }
        },
    }
    Ok(())
}

fn write_rect(rect: &Rect<i32>, sink: &mut impl Write) -> io::Result<()> {
    sink.write_i32::<LittleEndian>(rect.origin.x)?;
    sink.write_i32::<LittleEndian>(rect.origin.y)?;
    sink.write_i32::<LittleEndian>(rect.size.width)?;
    sink.write_i32::<LittleEndian>(rect.size.height)?;
    Ok(())
}

/// Rebuilds a display list from a serialized byte stream. The round trip
/// preserves the unique ID and every visual rect and item payload.
pub fn create_from_stream(
    stream: &mut impl Read,
    pictures: &mut ClientPictureCache,
) -> io::Result<DisplayItemList> {
    let unique_id = stream.read_u32::<LittleEndian>()?;
    let item_count = stream.read_u32::<LittleEndian>()?;
    let mut items = Vec::with_capacity(item_count as usize);
    for _ in 0..item_count {
        items.push(read_item(stream, pictures)?);
    }
    Ok(DisplayItemList { unique_id, items })
}

fn read_item(
    stream: &mut impl Read,
    pictures: &mut ClientPictureCache,
) -> io::Result<DisplayItem> {
    let bounds = read_rect(stream)?;
    let tag = stream.read_u32::<LittleEndian>()?;
    let kind = match tag {
        ITEM_TAG_DRAWING => {
            let id = stream.read_u32::<LittleEndian>()?;
            let inline = stream.read_u32::<LittleEndian>()?;
            let picture = match inline {
                PICTURE_INLINE => {
                    let length = stream.read_u32::<LittleEndian>()?;
                    let mut data = vec![0; length as usize];
                    stream.read_exact(&mut data)?;
                    let picture = Arc::new(Picture { id, data });
                    pictures.insert(picture.clone());
                    picture
                },
                PICTURE_BY_REFERENCE => pictures.get(id).ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("back-reference to unknown picture {id}"),
                    )
                })?,
                other => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("bad picture payload flag {other}"),
                    ));
                },
            };
            DisplayItemKind::Drawing(picture)
        },
        ITEM_TAG_CLIP => DisplayItemKind::Clip(read_rect(stream)?),
        ITEM_TAG_TRANSFORM => {
            let mut values = [0.0; 16];
            for value in values.iter_mut() {
                *value = stream.read_f32::<LittleEndian>()?;
            }
            DisplayItemKind::Transform(Transform3D::from_array(values))
        },
        other => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown display item tag {other}"),
            ));
        },
    };
    Ok(DisplayItem { bounds, kind })
}

fn read_rect(stream: &mut impl Read) -> io::Result<Rect<i32>> {
    let x = stream.read_i32::<LittleEndian>()?;
    let y = stream.read_i32::<LittleEndian>()?;
    let width = stream.read_i32::<LittleEndian>()?;
    let height = stream.read_i32::<LittleEndian>()?;
    Ok(euclid::rect(x, y, width, height))
}
