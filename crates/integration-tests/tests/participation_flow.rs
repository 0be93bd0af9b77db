mod support;

use domains::{Actor, DomainError, Role};
use support::harnesses;

#[tokio::test]
async fn creator_is_enrolled_atomically() {
    for h in harnesses().await {
        let x = h.user("xavier").await;
        let (debate, stances) = h.debate(x, &["Yes", "No"], false).await;

        let participants = h.services.participation.list_participants(x, debate.id).await.unwrap();
        assert_eq!(participants.len(), 1, "[{}]", h.backend);
        assert_eq!(participants[0].role, Role::Creator);
        assert_eq!(Actor::User(participants[0].user_id), x);
        assert_eq!(stances.len(), 2);
    }
}

#[tokio::test]
async fn duplicate_stance_labels_are_rejected() {
    for h in harnesses().await {
        let x = h.user("xavier").await;
        let topic = h.topic(x, "Cities").await;
        let err = h
            .services
            .participation
            .create_debate(
                x,
                services::NewDebate {
                    topic_id: topic.id.to_string(),
                    is_private: false,
                    stances: vec!["Trams".into(), "trams".into()],
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)), "[{}] {err:?}", h.backend);

        let err = h
            .services
            .participation
            .create_debate(x, services::NewDebate { topic_id: "not-a-uuid".into(), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}

#[tokio::test]
async fn second_join_is_already_participant() {
    for h in harnesses().await {
        let x = h.user("xavier").await;
        let y = h.user("yolanda").await;
        let (debate, _) = h.debate(x, &["Yes"], false).await;

        let joined = h.services.participation.join_debate(y, debate.id).await.unwrap();
        assert_eq!(joined.role, Role::Debater);

        let err = h.services.participation.join_debate(y, debate.id).await.unwrap_err();
        assert!(matches!(err, DomainError::AlreadyParticipant { .. }), "[{}] {err:?}", h.backend);

        let err = h.services.participation.join_debate(x, debate.id).await.unwrap_err();
        assert!(matches!(err, DomainError::AlreadyParticipant { .. }));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_joins_leave_one_row() {
    for h in harnesses().await {
        let x = h.user("xavier").await;
        let y = h.user("yolanda").await;
        let (debate, _) = h.debate(x, &["Yes"], false).await;

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let participation = h.services.participation.clone();
                let debate_id = debate.id;
                tokio::spawn(async move { participation.join_debate(y, debate_id).await })
            })
            .collect();

        let mut joined = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => joined += 1,
                Err(DomainError::AlreadyParticipant { .. }) => {}
                Err(other) => panic!("[{}] unexpected join failure: {other:?}", h.backend),
            }
        }
        assert_eq!(joined, 1, "[{}]", h.backend);

        let participants = h.services.participation.list_participants(x, debate.id).await.unwrap();
        assert_eq!(participants.len(), 2);
    }
}

#[tokio::test]
async fn private_and_closed_debates_refuse_joins() {
    for h in harnesses().await {
        let x = h.user("xavier").await;
        let y = h.user("yolanda").await;
        let anonymous = Actor::Anonymous;

        let (private, _) = h.debate(x, &["Yes"], true).await;
        let err = h.services.participation.join_debate(y, private.id).await.unwrap_err();
        assert!(matches!(err, DomainError::Permission(_)), "[{}] {err:?}", h.backend);

        let (public, _) = h.debate(x, &["Yes"], false).await;
        let err = h.services.participation.join_debate(anonymous, public.id).await.unwrap_err();
        assert!(matches!(err, DomainError::Permission(_)));

        h.services.participation.close_debate(x, public.id).await.unwrap();
        let err = h.services.participation.join_debate(y, public.id).await.unwrap_err();
        assert!(matches!(err, DomainError::DebateClosed(id) if id == public.id));

        let err = h.services.participation.close_debate(x, public.id).await.unwrap_err();
        assert!(matches!(err, DomainError::DebateClosed(_)));
    }
}

#[tokio::test]
async fn role_changes_follow_the_permission_ladder() {
    for h in harnesses().await {
        let x = h.user("xavier").await;
        let y = h.user("yolanda").await;
        let z = h.user("zed").await;
        let (debate, _) = h.debate(x, &["Yes"], false).await;
        let py = h.services.participation.join_debate(y, debate.id).await.unwrap();
        let pz = h.services.participation.join_debate(z, debate.id).await.unwrap();
        let px = h.services.participation.ensure_debate_access(x, debate.id).await.unwrap().participant.unwrap();
        let participation = &h.services.participation;

        // A debater cannot promote anyone.
        let err = participation.change_role(y, debate.id, pz.id, "ADMIN").await.unwrap_err();
        assert!(matches!(err, DomainError::Permission(_)), "[{}] {err:?}", h.backend);

        let promoted = participation.change_role(x, debate.id, py.id, "admin").await.unwrap();
        assert_eq!(promoted.role, Role::Admin);

        // The new admin can demote others but never touch the creator.
        let demoted = participation.change_role(y, debate.id, pz.id, "OBSERVER").await.unwrap();
        assert_eq!(demoted.role, Role::Observer);
        let err = participation.change_role(y, debate.id, px.id, "DEBATER").await.unwrap_err();
        assert!(matches!(err, DomainError::Permission(_)));

        let err = participation.change_role(x, debate.id, pz.id, "CREATOR").await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidRole(_)));
        let err = participation.change_role(x, debate.id, pz.id, "moderator").await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidRole(_)));

        let err = participation.change_role(x, debate.id, uuid::Uuid::now_v7(), "DEBATER").await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
    }
}

#[tokio::test]
async fn observers_cannot_argue_or_pick_stances() {
    for h in harnesses().await {
        let x = h.user("xavier").await;
        let z = h.user("zed").await;
        let (debate, stances) = h.debate(x, &["Yes", "No"], false).await;
        let pz = h.services.participation.join_debate(z, debate.id).await.unwrap();
        h.services.participation.change_role(x, debate.id, pz.id, "OBSERVER").await.unwrap();

        let err = h
            .services
            .discussion
            .create_justification(z, debate.id, stances[0].id, "I have thoughts")
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Permission(_)), "[{}] {err:?}", h.backend);

        let err = h.services.participation.choose_stance(z, debate.id, stances[0].id).await.unwrap_err();
        assert!(matches!(err, DomainError::Permission(_)));
    }
}

#[tokio::test]
async fn stances_can_be_chosen_and_managed() {
    for h in harnesses().await {
        let x = h.user("xavier").await;
        let y = h.user("yolanda").await;
        let (debate, stances) = h.debate(x, &["Yes", "No"], false).await;
        let by_label = |label: &str| stances.iter().find(|s| s.label == label).unwrap().id;
        let (yes, no) = (by_label("Yes"), by_label("No"));
        h.services.participation.join_debate(y, debate.id).await.unwrap();
        let participation = &h.services.participation;

        let chosen = participation.choose_stance(y, debate.id, no).await.unwrap();
        assert_eq!(chosen.stance_id, Some(no), "[{}]", h.backend);

        let added = participation.add_stance(x, debate.id, "Maybe").await.unwrap();
        let err = participation.add_stance(x, debate.id, "maybe").await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        let err = participation.add_stance(y, debate.id, "Later").await.unwrap_err();
        assert!(matches!(err, DomainError::Permission(_)));

        let renamed = participation.rename_stance(x, debate.id, added.id, "Perhaps").await.unwrap();
        assert_eq!(renamed.label, "Perhaps");

        // Removing the chosen stance clears the participant's choice.
        participation.remove_stance(x, debate.id, no).await.unwrap();
        let access = participation.ensure_debate_access(y, debate.id).await.unwrap();
        assert_eq!(access.participant.unwrap().stance_id, None);

        h.services.discussion.create_justification(x, debate.id, yes, "Because").await.unwrap();
        let err = participation.remove_stance(x, debate.id, yes).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let labels: Vec<String> =
            participation.list_stances(x, debate.id).await.unwrap().into_iter().map(|s| s.label).collect();
        assert_eq!(labels.len(), 2);
        assert!(labels.contains(&"Yes".to_string()) && labels.contains(&"Perhaps".to_string()));
    }
}

#[tokio::test]
async fn leaving_and_deleting() {
    for h in harnesses().await {
        let x = h.user("xavier").await;
        let y = h.user("yolanda").await;
        let (debate, stances) = h.debate(x, &["Yes"], false).await;
        h.services.participation.join_debate(y, debate.id).await.unwrap();

        let err = h.services.participation.leave_debate(x, debate.id).await.unwrap_err();
        assert!(matches!(err, DomainError::Permission(_)), "[{}] {err:?}", h.backend);

        let err = h.services.participation.delete_debate(y, debate.id).await.unwrap_err();
        assert!(matches!(err, DomainError::Permission(_)));

        h.services.participation.leave_debate(y, debate.id).await.unwrap();
        let err = h.services.participation.leave_debate(y, debate.id).await.unwrap_err();
        assert!(matches!(err, DomainError::Permission(_)));

        let j = h
            .services
            .discussion
            .create_justification(x, debate.id, stances[0].id, "Obviously")
            .await
            .unwrap();
        h.services.participation.delete_debate(x, debate.id).await.unwrap();

        let err = h.services.participation.ensure_debate_access(x, debate.id).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
        assert!(h.discussion.get_justification(j.id).await.unwrap().is_none());
    }
}
