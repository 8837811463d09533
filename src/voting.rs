// src/voting.rs
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::eligibility::{Eligibility, EligibilityClient};
use crate::error::{AppError, ALREADY_VOTED};
use crate::models::{
    mask_voter_identifier, normalize_voter_identifier, ResultsSummary, Vote, VoteOption,
    VoteRequest, VotingSession,
};
use crate::repository::{
    AgendaRepository, SessionRepository, SharedStore, StoreError, VoteRepository,
    VOTE_AGENDA_VOTER_UNIQUE,
};
use crate::session;

#[derive(Clone)]
pub struct VotingService {
    store: SharedStore,
    clock: Arc<dyn Clock>,
    eligibility: Option<Arc<dyn EligibilityClient>>,
}

impl VotingService {
    pub fn new(store: SharedStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            eligibility: None,
        }
    }

    /// Consults `client` on every vote. Without it the eligibility step is skipped.
    pub fn with_eligibility(mut self, client: Arc<dyn EligibilityClient>) -> Self {
        self.eligibility = Some(client);
        self
    }

    pub async fn vote(&self, agenda_id: Uuid, request: &VoteRequest) -> Result<Vote, AppError> {
        let voter = request
            .voter_identifier
            .as_deref()
            .and_then(normalize_voter_identifier)
            .ok_or_else(|| {
                debug!(%agenda_id, "vote rejected: malformed voter identifier");
                AppError::unprocessable("invalid voter identifier (expected 11 digits)")
            })?;

        if self.store.find_agenda(agenda_id).await?.is_none() {
            return Err(AppError::not_found("agenda not found"));
        }

        let now = self.clock.now();
        let session = self.resolve_session(agenda_id).await?;

        if session.agenda_id != agenda_id {
            return Err(AppError::unprocessable(
                "voting session does not belong to the requested agenda",
            ));
        }

        if !session.is_open_at(now) {
            debug!(%agenda_id, closes_at = %session.closes_at, "vote rejected: session closed");
            return Err(AppError::unprocessable("voting session closed"));
        }

        let option = request
            .option
            .as_deref()
            .and_then(|o| o.parse::<VoteOption>().ok())
            .ok_or_else(|| AppError::unprocessable("invalid option (use YES or NO)"))?;

        if let Some(client) = &self.eligibility {
            if client.check(&voter).await? == Eligibility::UnableToVote {
                return Err(AppError::Forbidden(
                    "voter is not eligible to vote".to_string(),
                ));
            }
        }

        if self.store.vote_exists(agenda_id, &voter).await? {
            return Err(AppError::conflict(ALREADY_VOTED));
        }

        let vote = Vote {
            id: Uuid::new_v4(),
            agenda_id,
            voter_identifier: voter,
            option,
            created_at: now,
        };

        match self.store.insert_vote(&vote).await {
            Ok(()) => {}
            Err(StoreError::UniqueViolation { constraint })
                if constraint == VOTE_AGENDA_VOTER_UNIQUE =>
            {
                warn!(%agenda_id, voter = %mask_voter_identifier(&vote.voter_identifier), "concurrent duplicate vote rejected");
                return Err(AppError::conflict(ALREADY_VOTED));
            }
            Err(other) => return Err(other.into()),
        }

        info!(
            %agenda_id,
            voter = %mask_voter_identifier(&vote.voter_identifier),
            option = %vote.option,
            "vote recorded"
        );
        Ok(vote)
    }

    pub async fn results(&self, agenda_id: Uuid) -> Result<ResultsSummary, AppError> {
        if self.store.find_agenda(agenda_id).await?.is_none() {
            return Err(AppError::not_found("agenda not found"));
        }
        session::summarize(self.store.as_ref(), agenda_id, self.clock.now()).await
    }

    /// Returns the agenda's session, opening a default-length one when the
    /// agenda has none yet. Racing first votes converge on a single row.
    async fn resolve_session(&self, agenda_id: Uuid) -> Result<VotingSession, AppError> {
        if let Some(existing) = self.store.find_session_by_agenda(agenda_id).await? {
            return Ok(existing);
        }

        let candidate = session::new_session(agenda_id, self.clock.now(), None)?;
        let session = self.store.insert_session_or_fetch(&candidate).await?;
        if session.id == candidate.id {
            info!(
                %agenda_id,
                session_id = %session.id,
                closes_at = %session.closes_at,
                "voting session opened by first vote"
            );
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agenda::AgendaService;
    use crate::clock::ManualClock;
    use crate::eligibility::EligibilityError;
    use crate::memory::MemoryStore;
    use crate::models::{Agenda, SessionStatus};
    use crate::repository::Store;
    use async_trait::async_trait;
    use chrono::{TimeDelta, TimeZone, Utc};

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        agendas: AgendaService,
        voting: VotingService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap(),
        ));
        Fixture {
            agendas: AgendaService::new(store.clone(), clock.clone()),
            voting: VotingService::new(store.clone(), clock.clone()),
            store,
            clock,
        }
    }

    #[tokio::test]
    async fn one_vote_per_voter_per_agenda_end_to_end() {
        let f = fixture();
        let agenda = f.agendas.create("A", None).await.unwrap();
        f.agendas.open_session(agenda.id, None).await.unwrap();

        let yes = VoteRequest::new("11122233344", VoteOption::Yes);
        f.voting.vote(agenda.id, &yes).await.unwrap();

        let err = f.voting.vote(agenda.id, &yes).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref m) if m == ALREADY_VOTED));

        let no = VoteRequest::new("99988877766", VoteOption::No);
        f.voting.vote(agenda.id, &no).await.unwrap();

        let summary = f.agendas.results(agenda.id).await.unwrap();
        assert_eq!(
            summary,
            ResultsSummary {
                yes: 1,
                no: 1,
                total: 2,
                status: SessionStatus::Open
            }
        );
        assert_eq!(f.voting.results(agenda.id).await.unwrap(), summary);
    }

    #[tokio::test]
    async fn changing_the_option_does_not_allow_a_second_vote() {
        let f = fixture();
        let agenda = f.agendas.create("A", None).await.unwrap();
        f.agendas.open_session(agenda.id, None).await.unwrap();

        f.voting
            .vote(agenda.id, &VoteRequest::new("11122233344", VoteOption::Yes))
            .await
            .unwrap();
        let err = f
            .voting
            .vote(agenda.id, &VoteRequest::new("11122233344", VoteOption::No))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn same_voter_may_vote_on_two_agendas() {
        let f = fixture();
        let a = f.agendas.create("A", None).await.unwrap();
        let b = f.agendas.create("B", None).await.unwrap();
        f.agendas.open_session(a.id, Some(60)).await.unwrap();
        f.agendas.open_session(b.id, Some(60)).await.unwrap();

        let req = VoteRequest::new("11122233344", VoteOption::Yes);
        f.voting.vote(a.id, &req).await.unwrap();
        f.voting.vote(b.id, &req).await.unwrap();

        assert_eq!(f.voting.results(a.id).await.unwrap().total, 1);
        assert_eq!(f.voting.results(b.id).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn punctuated_identifier_collides_with_raw_digits() {
        let f = fixture();
        let agenda = f.agendas.create("A", None).await.unwrap();
        f.agendas.open_session(agenda.id, None).await.unwrap();

        let vote = f
            .voting
            .vote(agenda.id, &VoteRequest::new("111.222.333-44", VoteOption::Yes))
            .await
            .unwrap();
        assert_eq!(vote.voter_identifier, "11122233344");

        let err = f
            .voting
            .vote(agenda.id, &VoteRequest::new("11122233344", VoteOption::Yes))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn vote_after_window_lapses_is_unprocessable() {
        let f = fixture();
        let agenda = f.agendas.create("A", None).await.unwrap();
        let session = f.agendas.open_session(agenda.id, Some(1)).await.unwrap();
        f.clock.set(session.closes_at);

        let err = f
            .voting
            .vote(agenda.id, &VoteRequest::new("55566677788", VoteOption::No))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unprocessable(ref m) if m == "voting session closed"));
        assert_eq!(f.voting.results(agenda.id).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn malformed_identifier_fails_before_anything_is_written() {
        let f = fixture();
        let agenda = f.agendas.create("A", None).await.unwrap();

        for raw in ["123", "", "111.222.333-4", "1112223334455"] {
            let err = f
                .voting
                .vote(agenda.id, &VoteRequest::new(raw, VoteOption::Yes))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Unprocessable(_)));
        }
        let missing = VoteRequest {
            voter_identifier: None,
            option: Some("YES".to_string()),
        };
        assert!(matches!(
            f.voting.vote(agenda.id, &missing).await,
            Err(AppError::Unprocessable(_))
        ));

        assert!(f
            .store
            .find_session_by_agenda(agenda.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn vote_on_unknown_agenda_is_not_found() {
        let f = fixture();
        let err = f
            .voting
            .vote(Uuid::new_v4(), &VoteRequest::new("11122233344", VoteOption::Yes))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn missing_or_unknown_option_is_unprocessable() {
        let f = fixture();
        let agenda = f.agendas.create("A", None).await.unwrap();
        f.agendas.open_session(agenda.id, None).await.unwrap();

        for option in [None, Some("MAYBE".to_string())] {
            let req = VoteRequest {
                voter_identifier: Some("11122233344".to_string()),
                option,
            };
            let err = f.voting.vote(agenda.id, &req).await.unwrap_err();
            assert!(matches!(err, AppError::Unprocessable(ref m) if m.contains("option")));
        }
    }

    #[tokio::test]
    async fn first_vote_opens_a_default_session_that_blocks_explicit_open() {
        let f = fixture();
        let agenda = f.agendas.create("A", None).await.unwrap();

        f.voting
            .vote(agenda.id, &VoteRequest::new("11122233344", VoteOption::Yes))
            .await
            .unwrap();

        let session = f
            .store
            .find_session_by_agenda(agenda.id)
            .await
            .unwrap()
            .expect("lazily created session");
        assert_eq!(session.duration_seconds, 3600);

        let err = f.agendas.open_session(agenda.id, None).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_votes_converge_on_one_session() {
        let f = fixture();
        let agenda = f.agendas.create("A", None).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let voting = f.voting.clone();
                let id = agenda.id;
                tokio::spawn(async move {
                    voting
                        .vote(id, &VoteRequest::new(format!("0000000000{i}"), VoteOption::Yes))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(f.voting.results(agenda.id).await.unwrap().yes, 8);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_duplicate_votes_yield_one_success_and_one_conflict() {
        let f = fixture();
        let agenda = f.agendas.create("A", None).await.unwrap();
        f.agendas.open_session(agenda.id, None).await.unwrap();

        let spawn_vote = |option| {
            let voting = f.voting.clone();
            let id = agenda.id;
            tokio::spawn(async move {
                voting
                    .vote(id, &VoteRequest::new("11122233344", option))
                    .await
            })
        };
        let a = spawn_vote(VoteOption::Yes);
        let b = spawn_vote(VoteOption::No);
        let outcomes = [a.await.unwrap(), b.await.unwrap()];

        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            outcomes
                .iter()
                .filter(|r| matches!(r, Err(AppError::Conflict(_))))
                .count(),
            1
        );
        assert_eq!(f.voting.results(agenda.id).await.unwrap().total, 1);
    }

    /// Store whose duplicate pre-check always answers "no", so only the
    /// constraint on insert can catch the second vote.
    struct BlindPrecheck(MemoryStore);

    #[async_trait]
    impl AgendaRepository for BlindPrecheck {
        async fn insert_agenda(&self, agenda: &Agenda) -> Result<(), StoreError> {
            self.0.insert_agenda(agenda).await
        }
        async fn find_agenda(&self, id: Uuid) -> Result<Option<Agenda>, StoreError> {
            self.0.find_agenda(id).await
        }
        async fn list_agendas(&self) -> Result<Vec<Agenda>, StoreError> {
            self.0.list_agendas().await
        }
    }

    #[async_trait]
    impl SessionRepository for BlindPrecheck {
        async fn insert_session(&self, session: &VotingSession) -> Result<(), StoreError> {
            self.0.insert_session(session).await
        }
        async fn insert_session_or_fetch(
            &self,
            session: &VotingSession,
        ) -> Result<VotingSession, StoreError> {
            self.0.insert_session_or_fetch(session).await
        }
        async fn find_session_by_agenda(
            &self,
            agenda_id: Uuid,
        ) -> Result<Option<VotingSession>, StoreError> {
            self.0.find_session_by_agenda(agenda_id).await
        }
    }

    #[async_trait]
    impl VoteRepository for BlindPrecheck {
        async fn insert_vote(&self, vote: &Vote) -> Result<(), StoreError> {
            self.0.insert_vote(vote).await
        }
        async fn vote_exists(&self, _: Uuid, _: &str) -> Result<bool, StoreError> {
            Ok(false)
        }
        async fn count_votes_by_option(
            &self,
            agenda_id: Uuid,
        ) -> Result<Vec<(VoteOption, i64)>, StoreError> {
            self.0.count_votes_by_option(agenda_id).await
        }
    }

    #[tokio::test]
    async fn constraint_violation_on_insert_surfaces_as_conflict() {
        let store: Arc<dyn Store> = Arc::new(BlindPrecheck(MemoryStore::new()));
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let agendas = AgendaService::new(store.clone(), clock.clone());
        let voting = VotingService::new(store, clock);
        let agenda = agendas.create("A", None).await.unwrap();

        let req = VoteRequest::new("11122233344", VoteOption::Yes);
        voting.vote(agenda.id, &req).await.unwrap();
        let err = voting.vote(agenda.id, &req).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref m) if m == ALREADY_VOTED));
    }

    /// Store that hands back a session belonging to some other agenda.
    struct MisfiledSessions(MemoryStore);

    #[async_trait]
    impl AgendaRepository for MisfiledSessions {
        async fn insert_agenda(&self, agenda: &Agenda) -> Result<(), StoreError> {
            self.0.insert_agenda(agenda).await
        }
        async fn find_agenda(&self, id: Uuid) -> Result<Option<Agenda>, StoreError> {
            self.0.find_agenda(id).await
        }
        async fn list_agendas(&self) -> Result<Vec<Agenda>, StoreError> {
            self.0.list_agendas().await
        }
    }

    #[async_trait]
    impl SessionRepository for MisfiledSessions {
        async fn insert_session(&self, session: &VotingSession) -> Result<(), StoreError> {
            self.0.insert_session(session).await
        }
        async fn insert_session_or_fetch(
            &self,
            session: &VotingSession,
        ) -> Result<VotingSession, StoreError> {
            self.0.insert_session_or_fetch(session).await
        }
        async fn find_session_by_agenda(
            &self,
            agenda_id: Uuid,
        ) -> Result<Option<VotingSession>, StoreError> {
            let now = Utc::now();
            Ok(Some(session::new_session(Uuid::new_v4(), now, None).map_err(|e| {
                StoreError::Corrupt {
                    table: "voting_sessions",
                    detail: format!("{agenda_id}: {e}"),
                }
            })?))
        }
    }

    #[async_trait]
    impl VoteRepository for MisfiledSessions {
        async fn insert_vote(&self, vote: &Vote) -> Result<(), StoreError> {
            self.0.insert_vote(vote).await
        }
        async fn vote_exists(&self, agenda_id: Uuid, voter: &str) -> Result<bool, StoreError> {
            self.0.vote_exists(agenda_id, voter).await
        }
        async fn count_votes_by_option(
            &self,
            agenda_id: Uuid,
        ) -> Result<Vec<(VoteOption, i64)>, StoreError> {
            self.0.count_votes_by_option(agenda_id).await
        }
    }

    #[tokio::test]
    async fn session_from_another_agenda_is_refused() {
        let store: Arc<dyn Store> = Arc::new(MisfiledSessions(MemoryStore::new()));
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let agendas = AgendaService::new(store.clone(), clock.clone());
        let voting = VotingService::new(store, clock);
        let agenda = agendas.create("A", None).await.unwrap();

        let err = voting
            .vote(agenda.id, &VoteRequest::new("11122233344", VoteOption::Yes))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unprocessable(ref m) if m.contains("does not belong")));
    }

    struct FixedEligibility(Result<Eligibility, ()>);

    #[async_trait]
    impl EligibilityClient for FixedEligibility {
        async fn check(&self, _: &str) -> Result<Eligibility, EligibilityError> {
            self.0.map_err(|()| EligibilityError::UnknownIdentifier)
        }
    }

    #[tokio::test]
    async fn eligibility_is_enforced_when_configured() {
        let f = fixture();
        let agenda = f.agendas.create("A", None).await.unwrap();
        f.agendas.open_session(agenda.id, None).await.unwrap();
        let req = VoteRequest::new("11122233344", VoteOption::Yes);

        let unable = f
            .voting
            .clone()
            .with_eligibility(Arc::new(FixedEligibility(Ok(Eligibility::UnableToVote))));
        assert!(matches!(
            unable.vote(agenda.id, &req).await,
            Err(AppError::Forbidden(_))
        ));

        let unknown = f
            .voting
            .clone()
            .with_eligibility(Arc::new(FixedEligibility(Err(()))));
        assert!(matches!(
            unknown.vote(agenda.id, &req).await,
            Err(AppError::NotFound(ref m)) if m == "invalid voter identifier"
        ));

        let able = f
            .voting
            .clone()
            .with_eligibility(Arc::new(FixedEligibility(Ok(Eligibility::AbleToVote))));
        able.vote(agenda.id, &req).await.unwrap();
    }

    #[tokio::test]
    async fn results_require_a_known_agenda_but_not_a_session() {
        let f = fixture();
        assert!(matches!(
            f.voting.results(Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));

        let agenda = f.agendas.create("A", None).await.unwrap();
        let summary = f.voting.results(agenda.id).await.unwrap();
        assert_eq!(summary.status, SessionStatus::Closed);
        assert_eq!(summary.total, 0);

        f.clock.advance(TimeDelta::seconds(1));
        assert_eq!(f.agendas.results(agenda.id).await.unwrap(), summary);
    }
}
