//! Property tests for scheduler invariants.

use std::collections::HashMap;
use std::sync::Arc;

use proptest::collection::vec;
use proptest::prelude::*;
use sokovan_events::EventProducer;
use sokovan_id::ScalingGroup;
use sokovan_scheduler::config::{SchedulerParams, SokovanConfig};
use sokovan_scheduler::lock::LockProvider;
use sokovan_scheduler::model::SessionStatus;
use sokovan_scheduler::repository::SchedulerRepository;
use sokovan_scheduler::Sokovan;
use sokovan_testing::{
    slots, AgentBuilder, InMemoryRepository, MemoryLockProvider, RecordingEventProducer,
    WorkloadBuilder,
};

fn build(repo: &Arc<InMemoryRepository>) -> Sokovan {
    let repository: Arc<dyn SchedulerRepository> = repo.clone();
    let producer: Arc<dyn EventProducer> = Arc::new(RecordingEventProducer::new());
    let locks: Arc<dyn LockProvider> = Arc::new(MemoryLockProvider::new());
    Sokovan::new(repository, producer, locks, SokovanConfig::default())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// No mix of demands may push any agent past its capacity.
    #[test]
    fn agents_are_never_overcommitted(
        demands in vec(1u64..=8, 1..12),
        capacities in vec(2u64..=10, 1..4),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let group = ScalingGroup::parse("default").unwrap();
            let repo = Arc::new(InMemoryRepository::new());
            let mut agent_ids = Vec::new();
            for capacity in &capacities {
                let agent = AgentBuilder::new(&group, slots(&[("cpu", *capacity)])).build();
                agent_ids.push(agent.agent_id);
                repo.add_agent(agent);
            }
            for demand in &demands {
                repo.add_session(
                    WorkloadBuilder::new(&group, slots(&[("cpu", *demand)])).build(),
                );
            }

            let sokovan = build(&repo);
            sokovan.run_scheduling_tick(&group).await.unwrap();

            for agent_id in agent_ids {
                let agent = repo.agent(agent_id).unwrap();
                prop_assert!(
                    agent.occupied_slots.fits_in(&agent.available_slots),
                    "agent {agent_id} overcommitted"
                );
            }
            Ok(())
        })?;
    }

    /// Every scheduling tick transitions each session at most once, and
    /// only to a status its decision category declares.
    #[test]
    fn at_most_one_transition_per_session_per_tick(
        demands in vec(1u64..=6, 1..10),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let group = ScalingGroup::parse("default").unwrap();
            let repo = Arc::new(InMemoryRepository::new());
            repo.add_agent(AgentBuilder::new(&group, slots(&[("cpu", 8)])).build());
            for demand in &demands {
                repo.add_session(
                    WorkloadBuilder::new(&group, slots(&[("cpu", *demand)])).build(),
                );
            }

            let sokovan = build(&repo);
            let report = sokovan.run_scheduling_tick(&group).await.unwrap();
            prop_assert_eq!(report.invariant_errors, 0);

            let mut per_session: HashMap<_, usize> = HashMap::new();
            for op in repo.transition_log() {
                *per_session.entry(op.session_id).or_default() += 1;
            }
            for (session_id, count) in per_session {
                prop_assert_eq!(count, 1, "session {} transitioned {} times", session_id, count);
            }
            Ok(())
        })?;
    }

    /// Repeated deprioritization converges on the floor and never crosses
    /// it, regardless of starting priority.
    #[test]
    fn deprioritization_never_crosses_the_floor(
        start_priority in -20i32..=100,
        rounds in 1usize..=6,
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let group = ScalingGroup::parse("default").unwrap();
            let repo = Arc::new(InMemoryRepository::new());
            repo.add_agent(AgentBuilder::new(&group, slots(&[("cpu", 1)])).build());
            let params = SchedulerParams::default();
            let floor = params.priority_floor;

            let session = WorkloadBuilder::new(&group, slots(&[("cpu", 1)]))
                .status(SessionStatus::Deprioritizing)
                .priority(start_priority)
                .build();
            let session_id = session.session_id;
            repo.add_session(session);

            let sokovan = build(&repo);
            let mut last = start_priority;
            for _ in 0..rounds {
                sokovan.run_lifecycle_tick("deprioritize").await.unwrap();
                let current = repo.session(session_id).unwrap().priority;
                prop_assert!(current >= floor);
                prop_assert!(current <= last.max(floor));
                last = current;

                // Requeued as pending; route it back for the next round.
                repo.set_session_status(session_id, SessionStatus::Deprioritizing);
            }
            Ok(())
        })?;
    }
}
