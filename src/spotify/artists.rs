use crate::{
    output::{Record, Table, TableSet},
    types::{Artist, GenreRow},
};

use super::{image_rows, image_table, push_external_urls};

/// Splits artists into `genres`, `images` and `metadata` tables.
pub fn process_artists(artists: &[Artist]) -> TableSet {
    let mut metadata = Vec::with_capacity(artists.len());
    let mut genres = Vec::new();
    let mut images = Vec::new();

    for artist in artists {
        genres.extend(artist.genres.iter().map(|genre| GenreRow {
            artist_id: artist.id.clone(),
            genre: genre.clone(),
        }));
        images.extend(image_rows(&artist.id, &artist.images));
        metadata.push(artist_record(artist));
    }

    let mut genre_table = Table::new(["artist_id", "genre"]);
    for row in genres {
        genre_table.push_row(vec![row.artist_id, row.genre]);
    }

    let mut tables = TableSet::new();
    tables.insert("genres", genre_table);
    tables.insert("images", image_table("artist_id", &images));
    tables.insert("metadata", Table::from_records(&metadata));
    tables
}

pub fn artist_record(artist: &Artist) -> Record {
    let mut record = Record::new();
    record
        .push("artist_id", &artist.id)
        .push("name", &artist.name)
        .push("followers", artist.followers.total);
    push_external_urls(&mut record, &artist.external_urls);
    record
}
