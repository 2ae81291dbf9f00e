//! Ratio-tested, cross-checked descriptor matching.

use std::borrow::Borrow;

use tracing::warn;

use super::Descriptor;

/// A correspondence between a query and a train feature, by index into the
/// original collections.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureMatch {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: f32,
}

/// Best neighbour of one descriptor that passed the ratio test.
#[derive(Debug, Clone, Copy)]
struct Nearest {
    idx: usize,
    distance: f32,
}

/// Two nearest neighbours of `query` in `train`, ratio-tested.
///
/// Returns `None` when fewer than two comparable candidates exist or when
/// `best / second >= max_ratio`.
fn ratio_tested_nearest<T: Borrow<Descriptor>>(
    query: &Descriptor,
    train: &[T],
    max_ratio: f32,
) -> Option<Nearest> {
    let mut best: Option<Nearest> = None;
    let mut second = f32::INFINITY;
    let mut candidates = 0;

    for (idx, t) in train.iter().enumerate() {
        let Some(distance) = query.distance(t.borrow()) else {
            continue;
        };
        candidates += 1;
        match best {
            Some(b) if distance >= b.distance => {
                if distance < second {
                    second = distance;
                }
            }
            Some(b) => {
                second = b.distance;
                best = Some(Nearest { idx, distance });
            }
            None => best = Some(Nearest { idx, distance }),
        }
    }

    let best = best?;
    if candidates < 2 {
        return None;
    }
    // Strict inequality; 0/0 is NaN and fails the comparison.
    if best.distance / second < max_ratio {
        Some(best)
    } else {
        None
    }
}

/// Match two descriptor collections.
///
/// For every query descriptor the two nearest train descriptors are found
/// (and vice versa); a direction keeps its best neighbour only if
/// `nearest / second_nearest < max_ratio`. A pair survives only if it is the
/// mutual best in both directions.
///
/// Mismatched descriptor kinds or lengths are reported and yield no matches.
pub fn match_descriptors<Q, T>(query: &[Q], train: &[T], max_ratio: f32) -> Vec<FeatureMatch>
where
    Q: Borrow<Descriptor>,
    T: Borrow<Descriptor>,
{
    let (Some(q0), Some(t0)) = (query.first(), train.first()) else {
        return Vec::new();
    };
    let (q0, t0) = (q0.borrow(), t0.borrow());

    if q0.len() != t0.len() {
        warn!("Descriptor lengths do not match ({} vs {})", q0.len(), t0.len());
        return Vec::new();
    }
    if q0.kind() != t0.kind() {
        warn!("Descriptor types do not match ({:?} vs {:?})", q0.kind(), t0.kind());
        return Vec::new();
    }

    let forward: Vec<Option<Nearest>> = query
        .iter()
        .map(|q| ratio_tested_nearest(q.borrow(), train, max_ratio))
        .collect();
    let reverse: Vec<Option<Nearest>> = train
        .iter()
        .map(|t| ratio_tested_nearest(t.borrow(), query, max_ratio))
        .collect();

    let mut matches = Vec::new();
    for (query_idx, fwd) in forward.iter().enumerate() {
        let Some(fwd) = fwd else {
            continue;
        };
        let Some(rev) = reverse[fwd.idx] else {
            continue;
        };
        if rev.idx == query_idx {
            matches.push(FeatureMatch {
                query_idx,
                train_idx: fwd.idx,
                distance: fwd.distance,
            });
        }
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn float(v: &[f32]) -> Descriptor {
        Descriptor::Float(v.to_vec())
    }

    #[test]
    fn test_distinct_descriptors_match() {
        let query = vec![float(&[0.0, 0.0]), float(&[10.0, 0.0]), float(&[0.0, 10.0])];
        let train = vec![float(&[0.0, 10.2]), float(&[0.1, 0.0]), float(&[10.0, 0.3])];

        let mut matches = match_descriptors(&query, &train, 0.7);
        matches.sort_by_key(|m| m.query_idx);

        let pairs: Vec<(usize, usize)> = matches.iter().map(|m| (m.query_idx, m.train_idx)).collect();
        assert_eq!(pairs, vec![(0, 1), (1, 2), (2, 0)]);
    }

    #[test]
    fn test_ratio_exactly_at_threshold_is_rejected() {
        // Every query has nearest 7 and second nearest 10: ratio == 0.7.
        let query = vec![float(&[0.0]), float(&[100.0])];
        let train = vec![float(&[7.0]), float(&[-10.0]), float(&[107.0]), float(&[90.0])];

        assert!(match_descriptors(&query, &train, 0.7).is_empty());
    }

    #[test]
    fn test_ambiguous_match_is_rejected() {
        let query = vec![float(&[0.0, 0.0]), float(&[50.0, 50.0])];
        let train = vec![float(&[1.0, 0.0]), float(&[-1.0, 0.0]), float(&[50.0, 50.0])];

        let matches = match_descriptors(&query, &train, 0.7);
        assert!(matches.iter().all(|m| m.query_idx != 0));
    }

    #[test]
    fn test_cross_check_requires_mutual_best() {
        // Query 0 and 1 both prefer train 0; only the closer one survives.
        let query = vec![float(&[0.0]), float(&[1.0]), float(&[40.0])];
        let train = vec![float(&[0.2]), float(&[20.0]), float(&[41.0])];

        let matches = match_descriptors(&query, &train, 0.9);
        let for_train0: Vec<_> = matches.iter().filter(|m| m.train_idx == 0).collect();
        assert_eq!(for_train0.len(), 1);
        assert_eq!(for_train0[0].query_idx, 0);
    }

    #[test]
    fn test_matches_are_symmetric() {
        let query: Vec<Descriptor> = (0..12)
            .map(|i| Descriptor::Binary(vec![(i * 37 % 256) as u8, (i * 91 % 256) as u8, i as u8]))
            .collect();
        let train: Vec<Descriptor> = (0..12)
            .map(|i| Descriptor::Binary(vec![(i * 37 % 256) as u8, (i * 91 % 256) as u8, (i ^ 1) as u8]))
            .collect();

        let fwd = match_descriptors(&query, &train, 0.8);
        let rev = match_descriptors(&train, &query, 0.8);

        for m in &fwd {
            assert!(rev.iter().any(|r| r.query_idx == m.train_idx && r.train_idx == m.query_idx));
            let q = &query[m.query_idx];
            let best = train.iter().filter_map(|t| q.distance(t)).fold(f32::INFINITY, f32::min);
            assert_eq!(m.distance, best);
        }
        assert_eq!(fwd.len(), rev.len());
    }

    #[test]
    fn test_incompatible_descriptors_yield_nothing() {
        let query = vec![Descriptor::Binary(vec![0; 32])];
        let train = vec![float(&[0.0; 32]), float(&[1.0; 32])];
        assert!(match_descriptors(&query, &train, 0.7).is_empty());

        let short = vec![Descriptor::Binary(vec![0; 16]), Descriptor::Binary(vec![1; 16])];
        assert!(match_descriptors(&query, &short, 0.7).is_empty());
    }

    #[test]
    fn test_single_train_descriptor_has_no_second_neighbour() {
        let query = vec![float(&[0.0])];
        let train = vec![float(&[0.0])];
        assert!(match_descriptors(&query, &train, 0.7).is_empty());
    }
}
