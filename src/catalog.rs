use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use lofty::file::{AudioFile, FileType, TaggedFileExt};
use lofty::tag::ItemKey;
use log::{debug, warn};
use walkdir::WalkDir;

use crate::error::MetadataError;

/// Facts extracted from one source audio file.
///
/// Track and disk numbers of 0 mean "unset" and are distinct from 1 -
/// the validator decides what to do with them.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub path: PathBuf,
    pub artist: String,
    pub album: String,
    pub title: String,
    /// Free-text comment, passed through to the merged file untouched.
    pub comment: String,
    pub track_no: u32,
    pub max_track: u32,
    pub disk_no: u32,
    pub max_disk: u32,
    pub duration_ms: u64,
}

/// One book's tracks, keyed by source path. `BTreeMap` keeps iteration
/// order (and therefore the "representative" track) deterministic.
pub type TrackSet = BTreeMap<PathBuf, Track>;

/// In-memory index of every discovered track: author -> book -> tracks.
#[derive(Debug, Default)]
pub struct Catalog {
    authors: BTreeMap<String, BTreeMap<String, TrackSet>>,
}

impl Catalog {
    /// Insert a track into the bucket derived from its own metadata,
    /// creating intermediate author/book buckets as needed.
    pub fn record(&mut self, track: Track) {
        self.authors
            .entry(track.artist.clone())
            .or_default()
            .entry(track.album.clone())
            .or_default()
            .insert(track.path.clone(), track);
    }

    pub fn lookup(&self, author: &str, book: &str) -> Option<&TrackSet> {
        self.authors.get(author).and_then(|books| books.get(book))
    }

    /// Removal is always whole-book; single tracks are never dropped.
    pub fn remove_book(&mut self, author: &str, book: &str) {
        if let Some(books) = self.authors.get_mut(author) {
            books.remove(book);
            if books.is_empty() {
                self.authors.remove(author);
            }
        }
    }

    /// All (author, book) pairs, sorted by author then book title.
    pub fn books(&self) -> Vec<(String, String)> {
        self.authors
            .iter()
            .flat_map(|(author, books)| {
                books.keys().map(move |book| (author.clone(), book.clone()))
            })
            .collect()
    }

    pub fn book_count(&self) -> usize {
        self.authors.values().map(BTreeMap::len).sum()
    }

    pub fn track_count(&self) -> usize {
        self.authors
            .values()
            .flat_map(BTreeMap::values)
            .map(BTreeMap::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.authors.is_empty()
    }
}

/// Walk `dir` and build a catalog from every readable MP4-family audio file.
///
/// Files that are not MP4-family containers, carry no tag block, or fail to
/// read are logged and skipped; they never abort the scan.
pub fn scan_directory(dir: impl AsRef<Path>) -> Catalog {
    let mut catalog = Catalog::default();
    debug!("filename, artist, album, title, track/max, disk/max, duration");

    for entry in WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        match read_track(path) {
            Ok(track) => {
                debug!(
                    "{:?}, {}, {}, {}, {}/{}, {}/{}, {} ms",
                    path.file_name().unwrap_or_default(),
                    track.artist,
                    track.album,
                    track.title,
                    track.track_no,
                    track.max_track,
                    track.disk_no,
                    track.max_disk,
                    track.duration_ms
                );
                catalog.record(track);
            }
            Err(MetadataError::NotMp4Audio) => {
                debug!("skipping {:?}: not an MP4-family audio file", path);
            }
            Err(e) => {
                warn!("skipping {:?}: {}", path, e);
            }
        }
    }
    catalog
}

/// Read one candidate file: sniff the container from its content, then pull
/// tags and duration from it in a single probe.
///
/// The container check is content-based on purpose - some encoders label M4A
/// audio as a generic video container, so the extension cannot be trusted.
fn read_track(path: &Path) -> Result<Track, MetadataError> {
    let tagged = lofty::read_from_path(path)?;
    if tagged.file_type() != FileType::Mp4 {
        return Err(MetadataError::NotMp4Audio);
    }

    let duration_ms = tagged.properties().duration().as_millis() as u64;
    let tag = tagged
        .primary_tag()
        .or_else(|| tagged.first_tag())
        .ok_or(MetadataError::Untagged)?;

    let text = |key: ItemKey| {
        tag.get_string(&key)
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    };
    let number = |key: ItemKey| {
        tag.get_string(&key)
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(0)
    };

    Ok(Track {
        path: path.to_path_buf(),
        artist: text(ItemKey::TrackArtist),
        album: text(ItemKey::AlbumTitle),
        title: text(ItemKey::TrackTitle),
        comment: text(ItemKey::Comment),
        track_no: number(ItemKey::TrackNumber),
        max_track: number(ItemKey::TrackTotal),
        disk_no: number(ItemKey::DiscNumber),
        max_disk: number(ItemKey::DiscTotal),
        duration_ms,
    })
}

#[cfg(test)]
pub(crate) fn test_track(
    path: &str,
    artist: &str,
    album: &str,
    track_no: u32,
    max_track: u32,
    disk_no: u32,
    max_disk: u32,
    duration_ms: u64,
) -> Track {
    Track {
        path: PathBuf::from(path),
        artist: artist.to_string(),
        album: album.to_string(),
        title: format!("Track {track_no}"),
        comment: String::new(),
        track_no,
        max_track,
        disk_no,
        max_disk,
        duration_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn record_groups_by_artist_then_album() {
        let mut catalog = Catalog::default();
        catalog.record(test_track("/a/1.m4a", "Doe, John", "Paula", 1, 2, 1, 1, 1000));
        catalog.record(test_track("/a/2.m4a", "Doe, John", "Paula", 2, 2, 1, 1, 1000));
        catalog.record(test_track("/b/1.m4a", "Roe, Jane", "Maxim", 1, 1, 1, 1, 1000));

        assert_eq!(catalog.book_count(), 2);
        assert_eq!(catalog.track_count(), 3);
        assert_eq!(catalog.lookup("Doe, John", "Paula").map(TrackSet::len), Some(2));
        assert_eq!(catalog.lookup("Doe, John", "Maxim"), None);
    }

    #[test]
    fn books_are_sorted_by_author_then_title() {
        let mut catalog = Catalog::default();
        catalog.record(test_track("/1.m4a", "Zeta", "Alpha", 1, 1, 1, 1, 0));
        catalog.record(test_track("/2.m4a", "Alpha", "Zeta", 1, 1, 1, 1, 0));
        catalog.record(test_track("/3.m4a", "Alpha", "Beta", 1, 1, 1, 1, 0));

        let books = catalog.books();
        assert_eq!(
            books,
            vec![
                ("Alpha".to_string(), "Beta".to_string()),
                ("Alpha".to_string(), "Zeta".to_string()),
                ("Zeta".to_string(), "Alpha".to_string()),
            ]
        );
    }

    #[test]
    fn remove_book_drops_empty_author_buckets() {
        let mut catalog = Catalog::default();
        catalog.record(test_track("/a/1.m4a", "Doe", "Paula", 1, 1, 1, 1, 0));
        catalog.remove_book("Doe", "Paula");

        assert!(catalog.is_empty());
        assert_eq!(catalog.lookup("Doe", "Paula"), None);
        // removing again is a no-op
        catalog.remove_book("Doe", "Paula");
    }

    #[test]
    fn a_track_identifier_lands_in_exactly_one_bucket() {
        let mut catalog = Catalog::default();
        let track = test_track("/a/1.m4a", "Doe", "Paula", 1, 1, 1, 1, 0);
        catalog.record(track.clone());
        // re-recording the same path replaces, never duplicates
        catalog.record(track);
        assert_eq!(catalog.track_count(), 1);
    }

    #[test]
    fn scan_skips_unreadable_and_non_audio_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("junk.m4a"), b"not a real container").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignore me").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/also.m4a"), b"still not audio").unwrap();

        let catalog = scan_directory(dir.path());
        assert!(catalog.is_empty());
    }
}
