//! Nearest-neighbour matching of probe embeddings against enrolled faces.

use crate::types::{Embedding, FaceMatch, FaceRecord, MatchResult};

/// Distance at or below which two embeddings are considered the same person.
pub const DEFAULT_TOLERANCE: f32 = 0.6;

/// Strategy for comparing probe embeddings against the enrolled faces.
pub trait Matcher {
    /// Best match for a single probe, or `NoMatch` if nothing is within `tolerance`.
    fn compare(&self, probe: &Embedding, gallery: &[FaceRecord], tolerance: f32) -> MatchResult;

    /// One entry per probe. Probes without a match yield [`FaceMatch::unknown`]
    /// rather than being dropped.
    fn compare_each(
        &self,
        probes: &[Embedding],
        gallery: &[FaceRecord],
        tolerance: f32,
    ) -> Vec<FaceMatch>;
}

/// Euclidean distance matcher with a linear scan over the gallery.
pub struct EuclideanMatcher;

impl EuclideanMatcher {
    /// Distance from `probe` to every record, `None` where dimensions differ.
    fn distances(probe: &Embedding, gallery: &[FaceRecord]) -> Vec<Option<f32>> {
        let distances: Vec<Option<f32>> = gallery
            .iter()
            .map(|record| probe.euclidean_distance(&record.embedding))
            .collect();

        let skipped = distances.iter().filter(|d| d.is_none()).count();
        if skipped > 0 {
            tracing::warn!(
                skipped,
                probe_dim = probe.len(),
                "ignoring enrolled faces with mismatched embedding length"
            );
        }
        distances
    }

    /// Index and distance of the closest record. Ties keep the earliest record.
    fn argmin(distances: &[Option<f32>]) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        for (i, d) in distances.iter().enumerate() {
            let Some(d) = *d else { continue };
            match best {
                Some((_, best_d)) if d >= best_d => {}
                _ => best = Some((i, d)),
            }
        }
        best
    }

    fn accept(record: &FaceRecord, distance: f32) -> FaceMatch {
        FaceMatch {
            name: record.name.clone(),
            id: record.id.clone(),
            confidence: 1.0 - distance,
        }
    }
}

impl Matcher for EuclideanMatcher {
    fn compare(&self, probe: &Embedding, gallery: &[FaceRecord], tolerance: f32) -> MatchResult {
        if gallery.is_empty() {
            return MatchResult::NoMatch;
        }

        let distances = Self::distances(probe, gallery);
        match Self::argmin(&distances) {
            Some((idx, d)) if d <= tolerance => {
                MatchResult::Matched(Self::accept(&gallery[idx], d))
            }
            _ => MatchResult::NoMatch,
        }
    }

    fn compare_each(
        &self,
        probes: &[Embedding],
        gallery: &[FaceRecord],
        tolerance: f32,
    ) -> Vec<FaceMatch> {
        probes
            .iter()
            .map(|probe| {
                let distances = Self::distances(probe, gallery);
                let accepted: Vec<bool> = distances
                    .iter()
                    .map(|d| d.is_some_and(|d| d <= tolerance))
                    .collect();

                match Self::argmin(&distances) {
                    Some((idx, d)) if accepted[idx] => Self::accept(&gallery[idx], d),
                    _ => FaceMatch::unknown(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, id: &str, values: Vec<f32>) -> FaceRecord {
        FaceRecord { name: name.into(), id: id.into(), embedding: Embedding::new(values) }
    }

    /// Records at distances 0.9, 0.3, 0.6 from the origin probe.
    fn spread_gallery() -> Vec<FaceRecord> {
        vec![
            record("far", "3", vec![0.9, 0.0]),
            record("near", "1", vec![0.0, 0.3]),
            record("mid", "2", vec![0.6, 0.0]),
        ]
    }

    #[test]
    fn test_empty_gallery_is_no_match() {
        let probe = Embedding::new(vec![1.0, 0.0]);
        let result = EuclideanMatcher.compare(&probe, &[], DEFAULT_TOLERANCE);
        assert_eq!(result, MatchResult::NoMatch);
        assert_eq!(result.confidence(), 0.0);
    }

    #[test]
    fn test_closest_within_tolerance() {
        let probe = Embedding::new(vec![0.0, 0.0]);
        let result = EuclideanMatcher.compare(&probe, &spread_gallery(), 0.6);
        let m = result.into_match().expect("expected a match");
        assert_eq!(m.name, "near");
        assert_eq!(m.id, "1");
        assert!((m.confidence - 0.7).abs() < 1e-6, "confidence = {}", m.confidence);
    }

    #[test]
    fn test_tight_tolerance_rejects() {
        let probe = Embedding::new(vec![0.0, 0.0]);
        let result = EuclideanMatcher.compare(&probe, &spread_gallery(), 0.2);
        assert_eq!(result, MatchResult::NoMatch);
    }

    #[test]
    fn test_distance_equal_to_tolerance_matches() {
        let probe = Embedding::new(vec![0.0, 0.0]);
        let gallery = vec![record("edge", "e", vec![0.5, 0.0])];
        let result = EuclideanMatcher.compare(&probe, &gallery, 0.5);
        assert!(matches!(result, MatchResult::Matched(_)));
    }

    #[test]
    fn test_identical_embedding_has_full_confidence() {
        let probe = Embedding::new(vec![0.1, 0.2, 0.3]);
        let gallery = vec![record("self", "s", vec![0.1, 0.2, 0.3])];
        let m = EuclideanMatcher.compare(&probe, &gallery, 0.6).into_match().unwrap();
        assert_eq!(m.confidence, 1.0);
    }

    #[test]
    fn test_argmin_is_minimum_over_gallery() {
        let gallery: Vec<FaceRecord> = (0..20)
            .map(|i| {
                let f = i as f32;
                record(&format!("p{i}"), &i.to_string(), vec![(f * 0.37).sin(), (f * 1.3).cos()])
            })
            .collect();
        let probe = Embedding::new(vec![0.2, -0.4]);

        let m = EuclideanMatcher.compare(&probe, &gallery, f32::MAX).into_match().unwrap();
        let chosen = gallery.iter().find(|r| r.id == m.id).unwrap();
        let chosen_d = probe.euclidean_distance(&chosen.embedding).unwrap();
        for r in &gallery {
            assert!(chosen_d <= probe.euclidean_distance(&r.embedding).unwrap());
        }
    }

    #[test]
    fn test_ties_keep_first_enrolled() {
        let probe = Embedding::new(vec![0.0, 0.0]);
        let gallery = vec![
            record("first", "a", vec![0.0, 0.1]),
            record("second", "b", vec![0.1, 0.0]),
        ];
        let m = EuclideanMatcher.compare(&probe, &gallery, 0.6).into_match().unwrap();
        assert_eq!(m.id, "a");
    }

    #[test]
    fn test_mismatched_dimensions_are_skipped() {
        let probe = Embedding::new(vec![0.0, 0.0]);
        let gallery = vec![
            record("broken", "x", vec![0.0, 0.0, 0.0]),
            record("ok", "y", vec![0.0, 0.2]),
        ];
        let m = EuclideanMatcher.compare(&probe, &gallery, 0.6).into_match().unwrap();
        assert_eq!(m.id, "y");
    }

    #[test]
    fn test_negative_confidence_beyond_unit_distance() {
        let probe = Embedding::new(vec![0.0, 0.0]);
        let gallery = vec![record("far", "f", vec![1.5, 0.0])];
        let m = EuclideanMatcher.compare(&probe, &gallery, 2.0).into_match().unwrap();
        assert!((m.confidence + 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_compare_each_keeps_every_probe() {
        let gallery = spread_gallery();
        let probes = vec![
            Embedding::new(vec![0.0, 0.3]),
            Embedding::new(vec![10.0, 10.0]),
            Embedding::new(vec![0.6, 0.05]),
        ];
        let results = EuclideanMatcher.compare_each(&probes, &gallery, 0.6);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].id, "1");
        assert_eq!(results[0].confidence, 1.0);
        assert!(results[1].is_unknown());
        assert_eq!(results[2].id, "2");
    }

    #[test]
    fn test_compare_each_empty_gallery_yields_unknowns() {
        let probes = vec![Embedding::new(vec![0.0]), Embedding::new(vec![1.0])];
        let results = EuclideanMatcher.compare_each(&probes, &[], 0.6);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(FaceMatch::is_unknown));
    }
}
