use log::{error, warn};

use crate::catalog::{Track, TrackSet};
use crate::error::BookError;

/// Produce the canonical play order for a validated book: tracks grouped by
/// ascending disk number, ascending track number within each disk.
///
/// Requires the set to have passed validation. A uniform max-disk of 0 means
/// there is no disk information to order by, and the book is refused rather
/// than ordered by guesswork. Any index that still falls outside the expected
/// range is a validator/orderer contract violation and comes back as
/// [`BookError::OrderingConflict`], never a silently reshuffled sequence.
pub fn order_tracks(tracks: &TrackSet) -> Result<Vec<Track>, BookError> {
    let max_disk = tracks.values().next().map(|t| t.max_disk).unwrap_or(0);
    if max_disk == 0 {
        warn!("no disk numbering information for this book");
        return Err(BookError::NoDiskInfo);
    }

    // Disk buckets, index 0 holding disk 1.
    let mut disks: Vec<Vec<&Track>> = vec![Vec::new(); max_disk as usize];
    for track in tracks.values() {
        if track.disk_no == 0 {
            return Err(conflict(track));
        }
        match disks.get_mut(track.disk_no as usize - 1) {
            Some(bucket) => bucket.push(track),
            None => return Err(conflict(track)),
        }
    }

    let mut ordered = Vec::with_capacity(tracks.len());
    for (disk_idx, bucket) in disks.into_iter().enumerate() {
        let mut slots: Vec<Option<&Track>> = vec![None; bucket.len()];
        for track in bucket {
            if track.track_no == 0 {
                return Err(conflict(track));
            }
            match slots.get_mut(track.track_no as usize - 1) {
                Some(slot) if slot.is_none() => *slot = Some(track),
                _ => return Err(conflict(track)),
            }
        }
        for (slot_idx, slot) in slots.into_iter().enumerate() {
            // A gap here means the validator let an inconsistent set through.
            match slot {
                Some(track) => ordered.push(track.clone()),
                None => {
                    error!(
                        "ordering gap at disk {}, position {}: validation contract violated",
                        disk_idx + 1,
                        slot_idx + 1
                    );
                    return Err(BookError::OrderingConflict {
                        disk: disk_idx as u32 + 1,
                        track: slot_idx as u32 + 1,
                    });
                }
            }
        }
    }
    Ok(ordered)
}

fn conflict(track: &Track) -> BookError {
    error!(
        "ordering conflict for {:?} (disk {}, track {}): validation let an inconsistent set through",
        track.path, track.disk_no, track.track_no
    );
    BookError::OrderingConflict {
        disk: track.disk_no,
        track: track.track_no,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_track;

    fn set(tracks: Vec<Track>) -> TrackSet {
        tracks.into_iter().map(|t| (t.path.clone(), t)).collect()
    }

    #[test]
    fn orders_by_disk_then_track_number() {
        // paths deliberately sort against the play order
        let tracks = set(vec![
            test_track("/a.m4a", "Doe", "Paula", 2, 2, 2, 2, 100),
            test_track("/b.m4a", "Doe", "Paula", 1, 2, 2, 2, 100),
            test_track("/c.m4a", "Doe", "Paula", 2, 2, 1, 2, 100),
            test_track("/d.m4a", "Doe", "Paula", 1, 2, 1, 2, 100),
        ]);

        let ordered = order_tracks(&tracks).unwrap();
        let positions: Vec<(u32, u32)> =
            ordered.iter().map(|t| (t.disk_no, t.track_no)).collect();
        assert_eq!(positions, vec![(1, 1), (1, 2), (2, 1), (2, 2)]);
    }

    #[test]
    fn result_is_dense_and_collision_free() {
        let tracks = set(
            (1..=3)
                .flat_map(|disk| {
                    (1..=4).map(move |no| {
                        test_track(
                            &format!("/d{disk}t{no}.m4a"),
                            "Doe",
                            "Paula",
                            no,
                            4,
                            disk,
                            3,
                            100,
                        )
                    })
                })
                .collect(),
        );

        let ordered = order_tracks(&tracks).unwrap();
        assert_eq!(ordered.len(), 12);
        // disk i's tracks all precede disk i+1's, ascending within a disk
        for pair in ordered.windows(2) {
            assert!(
                (pair[0].disk_no, pair[0].track_no) < (pair[1].disk_no, pair[1].track_no)
            );
        }
    }

    #[test]
    fn no_disk_info_refuses_to_order() {
        let tracks = set(vec![
            test_track("/a.m4a", "Doe", "Paula", 1, 2, 0, 0, 100),
            test_track("/b.m4a", "Doe", "Paula", 2, 2, 0, 0, 100),
        ]);
        assert!(matches!(
            order_tracks(&tracks),
            Err(BookError::NoDiskInfo)
        ));
    }

    #[test]
    fn out_of_range_positions_are_contract_faults() {
        // disk number beyond the declared max
        let tracks = set(vec![
            test_track("/a.m4a", "Doe", "Paula", 1, 2, 1, 1, 100),
            test_track("/b.m4a", "Doe", "Paula", 2, 2, 5, 1, 100),
        ]);
        assert!(matches!(
            order_tracks(&tracks),
            Err(BookError::OrderingConflict { disk: 5, track: 2 })
        ));

        // duplicate track number on one disk
        let tracks = set(vec![
            test_track("/a.m4a", "Doe", "Paula", 1, 2, 1, 1, 100),
            test_track("/b.m4a", "Doe", "Paula", 1, 2, 1, 1, 50),
        ]);
        assert!(matches!(
            order_tracks(&tracks),
            Err(BookError::OrderingConflict { disk: 1, track: 1 })
        ));
    }
}
