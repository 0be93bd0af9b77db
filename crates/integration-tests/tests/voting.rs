mod support;

use domains::{DomainError, VoteOutcome, VoteValue};
use support::harnesses;

#[tokio::test]
async fn same_direction_twice_retracts() {
    for h in harnesses().await {
        let x = h.user("xavier").await;
        let y = h.user("yolanda").await;
        let (debate, stances) = h.debate(x, &["Yes"], false).await;
        h.services.participation.join_debate(y, debate.id).await.unwrap();
        let j = h.services.discussion.create_justification(y, debate.id, stances[0].id, "Cheap").await.unwrap();

        let first = h.services.discussion.cast_vote(x, j.id, 1).await.unwrap();
        assert!(matches!(first.outcome, VoteOutcome::Created(_)), "[{}]", h.backend);
        assert_eq!(first.vote_sum, 1);

        let second = h.services.discussion.cast_vote(x, j.id, 1).await.unwrap();
        assert_eq!(second.outcome, VoteOutcome::Removed);
        assert_eq!(second.vote_sum, 0);
        assert!(h.discussion.list_votes(j.id).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn opposite_direction_switches_in_place() {
    for h in harnesses().await {
        let x = h.user("xavier").await;
        let (debate, stances) = h.debate(x, &["Yes"], false).await;
        let j = h.services.discussion.create_justification(x, debate.id, stances[0].id, "Fast").await.unwrap();

        let VoteOutcome::Created(created) = h.services.discussion.cast_vote(x, j.id, 1).await.unwrap().outcome else {
            panic!("[{}] first cast should create", h.backend);
        };
        let switched = h.services.discussion.cast_vote(x, j.id, -1).await.unwrap();
        let VoteOutcome::Switched(vote) = switched.outcome else {
            panic!("[{}] opposite cast should switch", h.backend);
        };
        assert_eq!(vote.id, created.id);
        assert_eq!(vote.value, VoteValue::Down);
        assert_eq!(vote.created_at, created.created_at);
        assert_eq!(switched.vote_sum, -1);

        let stored = h.discussion.list_votes(j.id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].value, VoteValue::Down);
    }
}

#[tokio::test]
async fn only_unit_values_are_accepted() {
    for h in harnesses().await {
        let x = h.user("xavier").await;
        let (debate, stances) = h.debate(x, &["Yes"], false).await;
        let j = h.services.discussion.create_justification(x, debate.id, stances[0].id, "Fair").await.unwrap();

        for bad in [0, 2, -2] {
            let err = h.services.discussion.cast_vote(x, j.id, bad).await.unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)), "[{}] {bad}: {err:?}", h.backend);
        }
        let err = h.services.discussion.cast_vote(x, uuid::Uuid::now_v7(), 1).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_casts_never_duplicate_rows() {
    for h in harnesses().await {
        let x = h.user("xavier").await;
        let (debate, stances) = h.debate(x, &["Yes"], false).await;
        let j = h.services.discussion.create_justification(x, debate.id, stances[0].id, "Robust").await.unwrap();

        let tasks: Vec<_> = (0..9)
            .map(|_| {
                let discussion = h.services.discussion.clone();
                let jid = j.id;
                tokio::spawn(async move { discussion.cast_vote(x, jid, 1).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        // Nine serialized toggles of the same direction end on "voted".
        let votes = h.discussion.list_votes(j.id).await.unwrap();
        assert_eq!(votes.len(), 1, "[{}]", h.backend);
        assert_eq!(votes[0].value, VoteValue::Up);
    }
}

#[tokio::test]
async fn closed_debates_reject_votes() {
    for h in harnesses().await {
        let x = h.user("xavier").await;
        let (debate, stances) = h.debate(x, &["Yes"], false).await;
        let j = h.services.discussion.create_justification(x, debate.id, stances[0].id, "Late").await.unwrap();
        h.services.participation.close_debate(x, debate.id).await.unwrap();

        let err = h.services.discussion.cast_vote(x, j.id, 1).await.unwrap_err();
        assert!(matches!(err, DomainError::DebateClosed(_)), "[{}] {err:?}", h.backend);
    }
}

#[tokio::test]
async fn outsiders_and_observers_cannot_vote() {
    for h in harnesses().await {
        let x = h.user("xavier").await;
        let o = h.user("olga").await;
        let (debate, stances) = h.debate(x, &["Yes"], false).await;
        let j = h.services.discussion.create_justification(x, debate.id, stances[0].id, "Hmm").await.unwrap();

        let err = h.services.discussion.cast_vote(o, j.id, 1).await.unwrap_err();
        assert!(matches!(err, DomainError::Permission(_)), "[{}] {err:?}", h.backend);

        let po = h.services.participation.join_debate(o, debate.id).await.unwrap();
        h.services.participation.change_role(x, debate.id, po.id, "OBSERVER").await.unwrap();
        let err = h.services.discussion.cast_vote(o, j.id, -1).await.unwrap_err();
        assert!(matches!(err, DomainError::Permission(_)));
    }
}

#[tokio::test]
async fn ranking_orders_by_vote_sum() {
    for h in harnesses().await {
        let x = h.user("xavier").await;
        let y = h.user("yolanda").await;
        let z = h.user("zed").await;
        let (debate, stances) = h.debate(x, &["Yes"], false).await;
        for actor in [y, z] {
            h.services.participation.join_debate(actor, debate.id).await.unwrap();
        }
        let stance = stances[0].id;
        let discussion = &h.services.discussion;

        let weak = discussion.create_justification(x, debate.id, stance, "Weak").await.unwrap();
        let strong = discussion.create_justification(y, debate.id, stance, "Strong").await.unwrap();
        let middling = discussion.create_justification(z, debate.id, stance, "Middling").await.unwrap();

        discussion.cast_vote(x, strong.id, 1).await.unwrap();
        discussion.cast_vote(z, strong.id, 1).await.unwrap();
        discussion.cast_vote(y, weak.id, -1).await.unwrap();

        let ranked = discussion.ranked_justifications(x, debate.id, stance).await.unwrap();
        let order: Vec<_> = ranked.iter().map(|s| (s.justification.id, s.vote_sum)).collect();
        assert_eq!(order, vec![(strong.id, 2), (middling.id, 0), (weak.id, -1)], "[{}]", h.backend);

        let overview = discussion.debate_overview(y, debate.id).await.unwrap();
        assert_eq!(overview.stances.len(), 1);
        assert_eq!(overview.stances[0].justifications, ranked);
        assert_eq!(overview.viewer.map(|p| p.role), Some(domains::Role::Debater));
    }
}
