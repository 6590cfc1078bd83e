use log::info;

use crate::catalog::Track;

/// One track's place in the final output: which part file it belongs to and
/// its chapter range inside that part.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedTrack {
    pub track: Track,
    /// 1-based part index.
    pub part: usize,
    pub chapter_start_ms: u64,
    pub chapter_end_ms: u64,
}

/// The full merge plan for one book, consumed by the merge orchestrator.
#[derive(Debug, Clone)]
pub struct ProcessingPlan {
    pub author: String,
    pub book: String,
    pub total_ms: u64,
    pub parts: usize,
    pub part_budget_ms: u64,
    pub tracks: Vec<PlannedTrack>,
}

/// Number of output parts for a given total runtime: one part per full
/// multiple of the ceiling, plus one. Grows in whole increments rather than
/// bin-packing to a minimum - predictable over optimal.
pub fn part_count(total_ms: u64, max_part_ms: u64) -> usize {
    (total_ms / max_part_ms) as usize + 1
}

/// Assign every ordered track to a part and compute its chapter offsets.
///
/// Single forward pass with a part-local elapsed counter: a track that would
/// push the running time past the per-part budget opens the next part and
/// becomes its first chapter. The last part absorbs any overflow, so a part
/// boundary always falls on a track boundary and no track is ever split.
pub fn plan_book(
    author: &str,
    book: &str,
    ordered: Vec<Track>,
    max_part_ms: u64,
) -> ProcessingPlan {
    let total_ms: u64 = ordered.iter().map(|t| t.duration_ms).sum();
    let parts = part_count(total_ms, max_part_ms);
    let part_budget_ms = total_ms / parts as u64;

    let mut planned = Vec::with_capacity(ordered.len());
    let mut part = 1;
    let mut elapsed = 0u64;

    for track in ordered {
        let mut start = elapsed;
        elapsed += track.duration_ms;
        if elapsed > part_budget_ms && part < parts {
            part += 1;
            start = 0;
            elapsed = track.duration_ms;
            info!(
                "{author}, {book}: opening part {part} at {elapsed} ms (budget {part_budget_ms} ms, {parts} parts)"
            );
        }
        planned.push(PlannedTrack {
            track,
            part,
            chapter_start_ms: start,
            chapter_end_ms: elapsed,
        });
    }

    ProcessingPlan {
        author: author.to_string(),
        book: book.to_string(),
        total_ms,
        parts,
        part_budget_ms,
        tracks: planned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_track;

    const CEILING: u64 = 23_400_000;

    fn tracks(durations_ms: &[u64]) -> Vec<Track> {
        durations_ms
            .iter()
            .enumerate()
            .map(|(i, &d)| {
                test_track(
                    &format!("/t{i}.m4a"),
                    "Doe",
                    "Paula",
                    i as u32 + 1,
                    durations_ms.len() as u32,
                    1,
                    1,
                    d,
                )
            })
            .collect()
    }

    #[test]
    fn part_count_is_floor_plus_one() {
        assert_eq!(part_count(0, CEILING), 1);
        assert_eq!(part_count(CEILING - 1, CEILING), 1);
        assert_eq!(part_count(CEILING, CEILING), 2);
        assert_eq!(part_count(3 * CEILING + 5, CEILING), 4);
    }

    #[test]
    fn part_count_is_monotonic_in_total_duration() {
        let mut last = 0;
        for total in (0..10 * CEILING).step_by(CEILING as usize / 7) {
            let parts = part_count(total, CEILING);
            assert!(parts >= last);
            last = parts;
        }
        // doubling never decreases the count
        for total in [1, CEILING - 1, CEILING, 2 * CEILING + 17] {
            assert!(part_count(2 * total, CEILING) >= part_count(total, CEILING));
        }
    }

    #[test]
    fn three_ten_minute_tracks_split_after_the_first() {
        // 1.8M ms total with a 1M ceiling: 2 parts, 900k budget. Track 2
        // overflows the budget and opens part 2; track 3 stays in the last
        // part even though it pushes past the budget again.
        let plan = plan_book("Doe", "Paula", tracks(&[600_000, 600_000, 600_000]), 1_000_000);

        assert_eq!(plan.parts, 2);
        assert_eq!(plan.part_budget_ms, 900_000);
        let shape: Vec<(usize, u64, u64)> = plan
            .tracks
            .iter()
            .map(|p| (p.part, p.chapter_start_ms, p.chapter_end_ms))
            .collect();
        assert_eq!(
            shape,
            vec![(1, 0, 600_000), (2, 0, 600_000), (2, 600_000, 1_200_000)]
        );
    }

    #[test]
    fn chapter_offsets_are_contiguous_within_each_part() {
        let durations: Vec<u64> = (0..40).map(|i| 400_000 + i * 13_337).collect();
        let plan = plan_book("Doe", "Paula", tracks(&durations), 4_000_000);

        for pair in plan.tracks.windows(2) {
            if pair[0].part == pair[1].part {
                assert_eq!(pair[0].chapter_end_ms, pair[1].chapter_start_ms);
            } else {
                assert_eq!(pair[1].part, pair[0].part + 1);
                assert_eq!(pair[1].chapter_start_ms, 0);
            }
        }
        assert_eq!(plan.tracks[0].chapter_start_ms, 0);
        // every track appears exactly once, in the order given
        assert_eq!(plan.tracks.len(), durations.len());
    }

    #[test]
    fn single_part_book_never_splits() {
        let plan = plan_book("Doe", "Paula", tracks(&[100, 200, 300]), CEILING);
        assert_eq!(plan.parts, 1);
        assert!(plan.tracks.iter().all(|p| p.part == 1));
        assert_eq!(plan.total_ms, 600);
    }

    #[test]
    fn last_part_absorbs_all_overflow() {
        // budget forces early closes; the final part must take whatever is
        // left no matter how large
        let plan = plan_book(
            "Doe",
            "Paula",
            tracks(&[500, 500, 500, 500, 500, 500, 500]),
            1_000,
        );
        let max_part = plan.tracks.iter().map(|p| p.part).max().unwrap();
        assert_eq!(max_part, plan.parts);
        let last_part_ms: u64 = plan
            .tracks
            .iter()
            .filter(|p| p.part == plan.parts)
            .map(|p| p.track.duration_ms)
            .sum();
        assert!(last_part_ms > plan.part_budget_ms);
    }

    #[test]
    fn planning_is_idempotent() {
        let input = tracks(&[123_456, 654_321, 777_777, 42]);
        let a = plan_book("Doe", "Paula", input.clone(), 1_000_000);
        let b = plan_book("Doe", "Paula", input, 1_000_000);
        assert_eq!(a.tracks, b.tracks);
        assert_eq!(a.parts, b.parts);
        assert_eq!(a.part_budget_ms, b.part_budget_ms);
    }
}
