//! Relevance ranking: rescale similarity by how many extracted concepts appear
//! literally in the candidate's source URL.

use std::cmp::Ordering;

use serde::Serialize;

use super::concepts::ConceptSet;
use super::retriever::Candidate;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCandidate {
    pub candidate: Candidate,
    pub original_score: f32,
    pub concept_matches: usize,
    pub enhanced_score: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct RelevanceRanker {
    boost_per_match: f32,
}

impl RelevanceRanker {
    pub fn new(boost_per_match: f32) -> Self {
        Self {
            boost_per_match: boost_per_match.max(0.0),
        }
    }

    /// Scores every candidate and sorts descending by enhanced score. The sort
    /// is stable, so ties keep retrieval order.
    pub fn rank(&self, candidates: Vec<Candidate>, concepts: &ConceptSet) -> Vec<RankedCandidate> {
        let mut ranked: Vec<RankedCandidate> = candidates
            .into_iter()
            .map(|candidate| self.score(candidate, concepts))
            .collect();

        ranked.sort_by(|a, b| {
            b.enhanced_score
                .partial_cmp(&a.enhanced_score)
                .unwrap_or(Ordering::Equal)
        });

        ranked
    }

    fn score(&self, candidate: Candidate, concepts: &ConceptSet) -> RankedCandidate {
        let original_score = candidate.score;
        let concept_matches = match candidate.url() {
            Some(url) => {
                let url = url.to_lowercase();
                concepts
                    .terms()
                    .iter()
                    .filter(|concept| url.contains(concept.as_str()))
                    .count()
            }
            None => 0,
        };

        let boost = concept_matches as f32 * self.boost_per_match;
        let enhanced_score = if boost > 0.0 {
            (original_score + boost).min(1.0)
        } else {
            original_score
        };

        tracing::debug!(
            url = candidate.url().unwrap_or(""),
            original = original_score,
            matches = concept_matches,
            boost,
            enhanced = enhanced_score,
            "URL relevance check"
        );

        RankedCandidate {
            candidate,
            original_score,
            concept_matches,
            enhanced_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::store::ChunkMetadata;

    fn candidate(id: &str, score: f32, url: Option<&str>) -> Candidate {
        let mut metadata = ChunkMetadata::new("pdq-powershell");
        metadata.url = url.map(str::to_string);
        Candidate {
            id: id.to_string(),
            content: format!("content of {}", id),
            metadata: Some(metadata),
            score,
        }
    }

    fn ranker() -> RelevanceRanker {
        RelevanceRanker::new(0.05)
    }

    #[test]
    fn one_matching_concept_adds_one_boost() {
        let concepts = ConceptSet::parse("Get-Service");
        let ranked = ranker().rank(
            vec![candidate("a", 0.80, Some("https://docs.example.com/get-service/"))],
            &concepts,
        );

        assert_eq!(ranked[0].concept_matches, 1);
        assert!((ranked[0].enhanced_score - 0.85).abs() < 1e-6);
    }

    #[test]
    fn boost_is_clamped_at_one() {
        let concepts = ConceptSet::parse("restart, service, restart-service");
        let ranked = ranker().rank(
            vec![candidate("a", 0.90, Some("https://x/Restart-Service"))],
            &concepts,
        );

        assert_eq!(ranked[0].concept_matches, 3);
        assert_eq!(ranked[0].enhanced_score, 1.0);
    }

    #[test]
    fn matching_is_literal_substring_containment() {
        let concepts = ConceptSet::parse("Restart-Service, Get-Service");
        let ranked = ranker().rank(
            vec![
                candidate("match", 0.70, Some("https://learn.example.com/restart-service/")),
                candidate("stem", 0.70, Some("https://learn.example.com/restarting-services/")),
            ],
            &concepts,
        );

        let by_id = |id: &str| ranked.iter().find(|r| r.candidate.id == id).unwrap();
        assert_eq!(by_id("match").concept_matches, 1);
        assert_eq!(by_id("stem").concept_matches, 0);
        assert_eq!(by_id("stem").enhanced_score, 0.70);
    }

    #[test]
    fn candidates_without_url_keep_their_score() {
        let concepts = ConceptSet::parse("get-service");
        let mut no_metadata = candidate("bare", 0.75, None);
        no_metadata.metadata = None;

        let ranked = ranker().rank(vec![candidate("nourl", 0.83, None), no_metadata], &concepts);

        assert_eq!(ranked[0].enhanced_score, 0.83);
        assert_eq!(ranked[1].enhanced_score, 0.75);
        assert!(ranked.iter().all(|r| r.concept_matches == 0));
    }

    #[test]
    fn sorts_descending_and_keeps_ties_in_retrieval_order() {
        let concepts = ConceptSet::parse("stop-service");
        let ranked = ranker().rank(
            vec![
                candidate("first", 0.84, Some("https://a")),
                candidate("boosted", 0.80, Some("https://x/stop-service")),
                candidate("second", 0.84, Some("https://b")),
                candidate("top", 0.95, None),
            ],
            &concepts,
        );

        let ids: Vec<&str> = ranked.iter().map(|r| r.candidate.id.as_str()).collect();
        assert_eq!(ids, vec!["top", "boosted", "first", "second"]);
    }

    #[test]
    fn enhanced_score_is_bounded_for_all_inputs() {
        let concepts = ConceptSet::parse("a, b, c, d, e, f, g");
        let scores = [0.0_f32, 0.1, 0.5, 0.82, 0.97, 1.0];
        let candidates: Vec<Candidate> = scores
            .iter()
            .enumerate()
            .map(|(i, s)| candidate(&i.to_string(), *s, Some("https://abcdefg")))
            .collect();

        for ranked in ranker().rank(candidates, &concepts) {
            assert!(ranked.enhanced_score <= 1.0);
            assert!(ranked.enhanced_score >= ranked.original_score);
        }
    }
}
