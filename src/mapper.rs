//! Normalization of raw Web API payloads into canonical records.
//!
//! Every function here is pure and total: missing or mistyped fields fall back
//! to `0`, an empty string or an empty list, so a partial upstream payload can
//! never fail the pass at this layer.

use std::collections::HashMap;

use serde_json::Value;

use crate::{
    types::{AlbumRecord, ArtistRecord, EntityLink, PlaybackContext, PlaylistRecord, TrackRecord},
    utils,
};

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn int_field(value: &Value, key: &str) -> i64 {
    value.get(key).and_then(Value::as_i64).unwrap_or_default()
}

fn array_field<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn string_list(value: &Value, key: &str) -> Vec<String> {
    array_field(value, key)
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}

fn first_image_url(value: &Value) -> String {
    array_field(value, "images")
        .first()
        .map(|image| str_field(image, "url"))
        .unwrap_or_default()
}

fn followers(value: &Value) -> i64 {
    value
        .get("followers")
        .map(|f| int_field(f, "total"))
        .unwrap_or_default()
}

fn links(value: &Value, key: &str) -> Vec<EntityLink> {
    array_field(value, key)
        .iter()
        .map(|item| EntityLink {
            id: str_field(item, "id"),
            url: str_field(item, "href"),
        })
        .collect()
}

fn context(event: &Value) -> PlaybackContext {
    let Some(context) = event.get("context").filter(|c| c.is_object()) else {
        return PlaybackContext::default();
    };

    let url = str_field(context, "href");
    let mut id = str_field(context, "id");
    if id.is_empty() {
        id = utils::id_from_url(&url);
    }
    if id.is_empty() {
        id = utils::id_from_url(&str_field(context, "uri"));
    }

    PlaybackContext {
        kind: str_field(context, "type"),
        url,
        id,
    }
}

fn track_record(event: &Value) -> TrackRecord {
    let track = event.get("track").unwrap_or(&Value::Null);
    let album = track.get("album").unwrap_or(&Value::Null);

    TrackRecord {
        id: str_field(track, "id"),
        name: str_field(track, "name"),
        popularity: int_field(track, "popularity"),
        played_at: str_field(event, "played_at"),
        context: context(event),
        preview_url: str_field(track, "preview_url"),
        album: EntityLink {
            id: str_field(album, "id"),
            url: str_field(album, "href"),
        },
        artists: links(track, "artists"),
    }
}

/// Accepts either the full recently-played page or its `items` array.
fn event_items(payload: &Value) -> &[Value] {
    match payload {
        Value::Array(items) => items.as_slice(),
        other => array_field(other, "items"),
    }
}

/// Maps every play event in feed order, one record per event.
pub fn map_plays(payload: &Value) -> Vec<TrackRecord> {
    event_items(payload)
        .iter()
        .map(track_record)
        .filter(|record| !record.id.is_empty())
        .collect()
}

/// Maps the feed to one record per track id.
///
/// When a track occurs several times in the page, the newest play (first in
/// feed order) wins.
pub fn map_tracks(payload: &Value) -> HashMap<String, TrackRecord> {
    let mut tracks = HashMap::new();
    for record in map_plays(payload) {
        tracks.entry(record.id.clone()).or_insert(record);
    }
    tracks
}

pub fn map_album(payload: &Value) -> AlbumRecord {
    AlbumRecord {
        name: str_field(payload, "name"),
        popularity: int_field(payload, "popularity"),
        image_url: first_image_url(payload),
        genres: string_list(payload, "genres"),
        label: str_field(payload, "label"),
    }
}

pub fn map_artist(payload: &Value) -> ArtistRecord {
    ArtistRecord {
        id: str_field(payload, "id"),
        name: str_field(payload, "name"),
        popularity: int_field(payload, "popularity"),
        genres: string_list(payload, "genres"),
        image_url: first_image_url(payload),
        num_followers: followers(payload),
    }
}

pub fn map_playlist(payload: &Value) -> PlaylistRecord {
    let owner = payload.get("owner").unwrap_or(&Value::Null);

    PlaylistRecord {
        name: str_field(payload, "name"),
        description: str_field(payload, "description"),
        num_followers: followers(payload),
        image_url: first_image_url(payload),
        owner_name: str_field(owner, "display_name"),
    }
}
