use bson::Uuid;

use crate::error::Error;
use crate::review::{Review, Vote, VoteCounts, VoteKind};

/// Applies a user's helpfulness vote to a review in memory.
///
/// A voter's entry in the vote list is the sole source of truth: the tallies are
/// re-derived from the list after every transition. Re-voting the same way
/// retracts the vote, voting the other way switches it.
///
/// Persistence, cache invalidation, and downstream aggregation are the caller's
/// responsibility.
pub fn apply_vote(review: &mut Review, voter_id: Uuid, kind: VoteKind) -> Result<(), Error> {
    if voter_id == review.user_id {
        return Err(Error::Forbidden(format!(
            "User of UUID: `{}` can not vote on their own review.",
            voter_id
        )));
    }
    match review.votes.iter().position(|v| v.user_id == voter_id) {
        None => {
            review.votes.push(Vote {
                user_id: voter_id,
                kind,
            });
        }
        Some(index) if review.votes[index].kind == kind => {
            // Toggle off.
            review.votes.remove(index);
        }
        Some(index) => {
            // Switch.
            review.votes[index].kind = kind;
        }
    }
    review.vote_counts = VoteCounts::tally(&review.votes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::tests::test_review;

    #[test]
    fn first_vote_appends_and_counts() {
        let mut review = test_review();
        let voter = Uuid::new();
        apply_vote(&mut review, voter, VoteKind::Helpful).unwrap();
        assert_eq!(review.votes.len(), 1);
        assert_eq!(review.vote_counts.helpful, 1);
        assert_eq!(review.vote_counts.not_helpful, 0);
    }

    #[test]
    fn same_vote_twice_toggles_off() {
        let mut review = test_review();
        let voter = Uuid::new();
        let before = review.clone();
        apply_vote(&mut review, voter, VoteKind::NotHelpful).unwrap();
        apply_vote(&mut review, voter, VoteKind::NotHelpful).unwrap();
        assert_eq!(review, before);
    }

    #[test]
    fn different_vote_switches_counters() {
        let mut review = test_review();
        let voter = Uuid::new();
        apply_vote(&mut review, voter, VoteKind::Helpful).unwrap();
        apply_vote(&mut review, voter, VoteKind::NotHelpful).unwrap();
        assert_eq!(review.votes.len(), 1);
        assert_eq!(review.vote_counts.helpful, 0);
        assert_eq!(review.vote_counts.not_helpful, 1);
    }

    #[test]
    fn self_vote_is_forbidden() {
        let mut review = test_review();
        let author = review.user_id;
        for kind in [VoteKind::Helpful, VoteKind::NotHelpful] {
            let result = apply_vote(&mut review, author, kind);
            assert!(matches!(result, Err(Error::Forbidden(_))));
        }
        assert!(review.votes.is_empty());
    }

    #[test]
    fn counters_always_match_vote_list_tally() {
        let mut review = test_review();
        let voters: Vec<Uuid> = (0..5).map(|_| Uuid::new()).collect();
        let sequence = [
            (0, VoteKind::Helpful),
            (1, VoteKind::Helpful),
            (2, VoteKind::NotHelpful),
            (0, VoteKind::NotHelpful),
            (3, VoteKind::Helpful),
            (1, VoteKind::Helpful),
            (4, VoteKind::NotHelpful),
            (2, VoteKind::NotHelpful),
        ];
        for (voter, kind) in sequence {
            apply_vote(&mut review, voters[voter], kind).unwrap();
            assert_eq!(review.vote_counts, VoteCounts::tally(&review.votes));
        }
    }

    #[test]
    fn helpful_score_follows_votes() {
        let mut review = test_review();
        apply_vote(&mut review, Uuid::new(), VoteKind::Helpful).unwrap();
        apply_vote(&mut review, Uuid::new(), VoteKind::Helpful).unwrap();
        apply_vote(&mut review, Uuid::new(), VoteKind::NotHelpful).unwrap();
        assert_eq!(review.helpful_score(), 67);
    }
}
