use std::collections::BTreeMap;

use log::{info, warn};
use strum_macros::Display;

use crate::catalog::{Catalog, Track, TrackSet};

/// Why a book was dropped from the catalog. Shown verbatim in the skip log.
#[derive(Debug, PartialEq, Eq, Display)]
pub enum RejectReason {
    #[strum(to_string = "has just one file - nothing to join")]
    NothingToJoin,
    #[strum(to_string = "already has long parts")]
    AlreadyLong,
    #[strum(to_string = "carries inconsistent max-disk info")]
    InconsistentMaxDisk,
    #[strum(to_string = "disk {disk} is missing from the set")]
    DiskMissing { disk: u32 },
    #[strum(to_string = "disk number {disk} is outside the declared range")]
    DiskOutOfRange { disk: u32 },
    #[strum(to_string = "a track on disk {disk} has no track number")]
    UnnumberedTrack { disk: u32 },
    #[strum(to_string = "track number {number} on disk {disk} is used twice")]
    DuplicateTrackNumber { disk: u32, number: u32 },
    #[strum(to_string = "track {number} on disk {disk} is missing")]
    TrackMissing { disk: u32, number: u32 },
}

/// Run every book through [`validate_book`] and remove the ones that fail.
///
/// Rejections are per-book and non-fatal; the reason lands in the warn log.
/// Returns how many books were removed.
pub fn prune_catalog(catalog: &mut Catalog, long_enough_ms: u64) -> usize {
    let mut rejected = 0;
    for (author, book) in catalog.books() {
        info!("checking track integrity of \"{author}: {book}\"");
        let Some(tracks) = catalog.lookup(&author, &book) else {
            continue;
        };
        if let Err(reason) = validate_book(tracks, long_enough_ms) {
            warn!("skipping \"{author}: {book}\": {reason}");
            catalog.remove_book(&author, &book);
            rejected += 1;
        }
    }
    rejected
}

/// Decide whether a book's track set is complete and consistent enough to
/// merge. Checks run in a fixed order and short-circuit on the first failure:
///
/// 1. at least two tracks, otherwise there is nothing to join;
/// 2. the representative track must not already exceed `long_enough_ms`
///    (such books are assumed to be merged already);
/// 3. every track must agree on the max-disk value, and for a non-zero value
///    every disk 1..=max must be present;
/// 4. per disk: track numbers must be set, unique, and cover 1..=count.
pub fn validate_book(tracks: &TrackSet, long_enough_ms: u64) -> Result<(), RejectReason> {
    if tracks.len() < 2 {
        return Err(RejectReason::NothingToJoin);
    }

    // One representative track stands in for the whole book here; the
    // representative is the first track by sorted path, so the outcome is
    // reproducible across runs.
    if let Some(representative) = tracks.values().next() {
        if representative.duration_ms > long_enough_ms {
            return Err(RejectReason::AlreadyLong);
        }
    }

    let max_disk = uniform_max_disk(tracks)?;
    for (disk, bucket) in disk_buckets(tracks, max_disk)? {
        check_track_numbers(disk, &bucket)?;
    }
    Ok(())
}

fn uniform_max_disk(tracks: &TrackSet) -> Result<u32, RejectReason> {
    let mut values = tracks.values().map(|t| t.max_disk);
    let first = values.next().unwrap_or(0);
    if values.any(|v| v != first) {
        return Err(RejectReason::InconsistentMaxDisk);
    }
    Ok(first)
}

/// Group tracks by disk number, checking that every declared disk is present
/// and no track claims a disk outside 1..=max. A uniform max-disk of 0 means
/// no disk info was ever tagged; the whole set is then treated as one disk so
/// track numbering still gets checked.
fn disk_buckets(
    tracks: &TrackSet,
    max_disk: u32,
) -> Result<BTreeMap<u32, Vec<&Track>>, RejectReason> {
    let mut buckets: BTreeMap<u32, Vec<&Track>> = BTreeMap::new();

    if max_disk == 0 {
        if let Some(track) = tracks.values().next() {
            warn!(
                "no max-disk info given for {} - {}, treating all tracks as one disk",
                track.artist, track.album
            );
        }
        buckets.insert(1, tracks.values().collect());
        return Ok(buckets);
    }

    for track in tracks.values() {
        if track.disk_no == 0 || track.disk_no > max_disk {
            return Err(RejectReason::DiskOutOfRange { disk: track.disk_no });
        }
        buckets.entry(track.disk_no).or_default().push(track);
    }
    for disk in 1..=max_disk {
        if !buckets.contains_key(&disk) {
            return Err(RejectReason::DiskMissing { disk });
        }
    }
    Ok(buckets)
}

fn check_track_numbers(disk: u32, bucket: &[&Track]) -> Result<(), RejectReason> {
    let count = bucket.len();
    let mut present = vec![false; count];

    for track in bucket {
        // Max-track disagreements are informational only: inconsistently
        // tagged rips are common and the actual on-disk count is authoritative.
        if track.max_track == 0 {
            warn!(
                "{}, {}, disk {} has no max-track info where {} tracks are on disk",
                track.artist, track.album, disk, count
            );
        } else if track.max_track as usize != count {
            warn!(
                "{}, {}, disk {} claims {} tracks where {} are on disk",
                track.artist, track.album, disk, track.max_track, count
            );
        }

        if track.track_no == 0 {
            warn!("{:?} has no track number set", track.path);
            return Err(RejectReason::UnnumberedTrack { disk });
        }
        let slot = track.track_no as usize - 1;
        match present.get(slot) {
            Some(true) => {
                return Err(RejectReason::DuplicateTrackNumber {
                    disk,
                    number: track.track_no,
                });
            }
            Some(false) => present[slot] = true,
            // A number beyond the on-disk count leaves a gap behind it,
            // which the coverage scan below reports.
            None => {}
        }
    }

    for (slot, seen) in present.iter().enumerate() {
        if !seen {
            return Err(RejectReason::TrackMissing {
                disk,
                number: slot as u32 + 1,
            });
        }
    }

    if let Some(track) = bucket.first() {
        info!(
            "author: {}, book: {}, disk {} is complete and in order",
            track.artist, track.album, disk
        );
    }
    Ok(())
}
