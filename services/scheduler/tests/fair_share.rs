//! Fair-share recalculation and its effect on scheduling order.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use sokovan_events::EventProducer;
use sokovan_id::{ScalingGroup, UserId};
use sokovan_scheduler::config::{SchedulerParams, SokovanConfig};
use sokovan_scheduler::fairshare::{FairShareSpec, UsageBucket};
use sokovan_scheduler::lock::LockProvider;
use sokovan_scheduler::model::{FairShareCalculationSnapshot, FairShareEntity, SessionStatus};
use sokovan_scheduler::prioritizer::Prioritizer;
use sokovan_scheduler::repository::SchedulerRepository;
use sokovan_scheduler::Sokovan;
use sokovan_testing::{
    slots, AgentBuilder, InMemoryRepository, MemoryLockProvider, RecordingEventProducer,
    WorkloadBuilder,
};

struct Fixture {
    repo: Arc<InMemoryRepository>,
    sokovan: Sokovan,
    group: ScalingGroup,
}

fn fixture() -> Fixture {
    let repo = Arc::new(InMemoryRepository::new());
    let repository: Arc<dyn SchedulerRepository> = repo.clone();
    let producer: Arc<dyn EventProducer> = Arc::new(RecordingEventProducer::new());
    let locks: Arc<dyn LockProvider> = Arc::new(MemoryLockProvider::new());
    let sokovan = Sokovan::new(repository, producer, locks, SokovanConfig::default());
    Fixture {
        repo,
        sokovan,
        group: ScalingGroup::parse("default").unwrap(),
    }
}

#[tokio::test]
async fn recalculation_persists_snapshots_per_entity() {
    let f = fixture();
    f.repo.set_cluster_capacity(slots(&[("cpu", 100)]));

    let light = FairShareEntity::User(UserId::new());
    let heavy = FairShareEntity::User(UserId::new());
    f.repo
        .add_fair_share_spec(light.clone(), FairShareSpec::default());
    f.repo
        .add_fair_share_spec(heavy.clone(), FairShareSpec::default());

    let now = Utc::now();
    f.repo.set_usage(
        light.clone(),
        vec![UsageBucket {
            start: now - ChronoDuration::days(1),
            usage: slots(&[("cpu", 5)]),
        }],
    );
    f.repo.set_usage(
        heavy.clone(),
        vec![UsageBucket {
            start: now - ChronoDuration::days(1),
            usage: slots(&[("cpu", 80)]),
        }],
    );

    let refreshed = f.sokovan.recalculate_fair_share().await.unwrap();
    assert_eq!(refreshed, 2);

    let snapshots = f.repo.fair_share_snapshots();
    let light_factor = snapshots[&light].factor;
    let heavy_factor = snapshots[&heavy].factor;
    assert!(light_factor > heavy_factor);
    assert!(heavy_factor > Decimal::ZERO);
}

#[tokio::test]
async fn heavy_user_is_scheduled_after_light_user() {
    let f = fixture();
    f.repo
        .add_agent(AgentBuilder::new(&f.group, slots(&[("cpu", 2)])).build());
    f.repo.set_params(
        &f.group,
        SchedulerParams {
            prioritizer: Prioritizer::FairShare,
            ..SchedulerParams::default()
        },
    );

    let light_user = UserId::new();
    let heavy_user = UserId::new();
    let now = Utc::now();
    for (user, factor) in [(light_user, "0.9"), (heavy_user, "0.2")] {
        f.repo.seed_fair_share_snapshot(
            FairShareEntity::User(user),
            FairShareCalculationSnapshot {
                factor: factor.parse().unwrap(),
                decayed_usage: slots(&[]),
                computed_at: now,
            },
        );
    }

    // The heavy user submitted first; fair share outranks arrival order.
    let heavy_session = WorkloadBuilder::new(&f.group, slots(&[("cpu", 2)]))
        .user(heavy_user)
        .created_at(now - ChronoDuration::minutes(10))
        .build();
    let light_session = WorkloadBuilder::new(&f.group, slots(&[("cpu", 2)]))
        .user(light_user)
        .created_at(now)
        .build();
    let (heavy_id, light_id) = (heavy_session.session_id, light_session.session_id);
    f.repo.add_session(heavy_session);
    f.repo.add_session(light_session);

    let report = f.sokovan.run_scheduling_tick(&f.group).await.unwrap();
    assert_eq!(report.scheduled, 1);
    assert_eq!(report.retried, 1);
    assert_eq!(f.repo.session_status(light_id), Some(SessionStatus::Scheduled));
    assert_eq!(f.repo.session_status(heavy_id), Some(SessionStatus::Pending));
}

#[tokio::test]
async fn entities_without_usage_rank_first() {
    let f = fixture();
    f.repo.set_cluster_capacity(slots(&[("cpu", 100)]));

    let entity = FairShareEntity::User(UserId::new());
    f.repo
        .add_fair_share_spec(entity.clone(), FairShareSpec::default());

    f.sokovan.recalculate_fair_share().await.unwrap();
    let snapshots = f.repo.fair_share_snapshots();
    assert_eq!(snapshots[&entity].factor, Decimal::ONE);
}
