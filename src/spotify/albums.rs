use crate::{
    output::{Record, Table, TableSet},
    types::{Album, CopyrightRow},
};

use super::{artist_links, artist_table, image_rows, image_table, market_links, market_table, push_external};

/// Splits albums into `images`, `artists`, `markets`, `copyrights` and
/// `metadata` tables.
pub fn process_albums(albums: &[Album]) -> TableSet {
    let mut metadata = Vec::with_capacity(albums.len());
    let mut images = Vec::new();
    let mut artists = Vec::new();
    let mut markets = Vec::new();
    let mut copyrights = Vec::new();

    for album in albums {
        images.extend(image_rows(&album.id, &album.images));
        artists.extend(artist_links(&album.id, &album.artists));
        markets.extend(market_links(&album.id, &album.available_markets));
        copyrights.extend(album.copyrights.iter().map(|c| CopyrightRow {
            album_id: album.id.clone(),
            text: c.text.clone(),
            kind: c.kind.clone(),
        }));
        metadata.push(album_record(album));
    }

    let mut tables = TableSet::new();
    tables.insert("images", image_table("album_id", &images));
    tables.insert("artists", artist_table("album_id", &artists));
    tables.insert("markets", market_table("album_id", &markets));
    tables.insert("copyrights", copyright_table(&copyrights));
    tables.insert("metadata", Table::from_records(&metadata));
    tables
}

pub fn album_record(album: &Album) -> Record {
    let mut record = Record::new();
    record
        .push("album_id", &album.id)
        .push("name", &album.name)
        .push("album_type", &album.album_type)
        .push("release_date", &album.release_date)
        .push("release_date_precision", &album.release_date_precision)
        .push("total_tracks", album.total_tracks)
        .push_opt("label", album.label.as_ref());
    push_external(&mut record, &album.external_ids, &album.external_urls);
    record
}

fn copyright_table(rows: &[CopyrightRow]) -> Table {
    let mut table = Table::new(["album_id", "text", "type"]);
    for row in rows {
        table.push_row(vec![row.album_id.clone(), row.text.clone(), row.kind.clone()]);
    }
    table
}
