use crate::{
    output::{Record, Table, TableSet},
    types::{ArtistLink, MarketLink, Track},
};

use super::{artist_links, artist_table, market_links, market_table, push_external};

/// Splits tracks into `artists`, `markets` and `metadata` tables.
pub fn process_tracks(tracks: &[Track]) -> TableSet {
    let mut metadata = Vec::with_capacity(tracks.len());
    let mut artists: Vec<ArtistLink> = Vec::new();
    let mut markets: Vec<MarketLink> = Vec::new();

    for track in tracks {
        artists.extend(artist_links(&track.id, &track.artists));
        markets.extend(market_links(&track.id, &track.available_markets));
        metadata.push(track_record(track));
    }

    let mut tables = TableSet::new();
    tables.insert("artists", artist_table("track_id", &artists));
    tables.insert("markets", market_table("track_id", &markets));
    tables.insert("metadata", Table::from_records(&metadata));
    tables
}

pub fn track_record(track: &Track) -> Record {
    let mut record = Record::new();
    record
        .push("track_id", &track.id)
        .push("name", &track.name)
        .push("album_id", &track.album.id)
        .push("disc_number", track.disc_number)
        .push("track_number", track.track_number)
        .push("duration_ms", track.duration_ms)
        .push("explicit", track.explicit)
        .push_opt("preview_url", track.preview_url.as_ref());
    push_external(&mut record, &track.external_ids, &track.external_urls);
    record
}
