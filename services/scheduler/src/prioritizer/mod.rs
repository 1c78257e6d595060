//! Scheduling prioritizers.
//!
//! A prioritizer produces a total reordering of the pending workloads:
//! same elements, same length, deterministic for identical inputs. The
//! variant is resolved once per scaling-group config load, not per call.
//! Prioritizers never consult agent capacity and never mutate the snapshot.

use std::cmp::Reverse;

use serde::{Deserialize, Serialize};

use crate::model::{FairShareEntity, SessionWorkload, SystemSnapshot};

/// Ordering strategy over pending workloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prioritizer {
    /// Ascending creation order.
    Fifo,
    /// Exact reversal of the input order. Not a re-sort: if the input is
    /// not creation-ordered, the output is not either.
    Lifo,
    /// Descending composite fair-share key `(domain, project, user)`,
    /// FIFO order within equal keys.
    FairShare,
}

impl Prioritizer {
    /// Reorders `workloads` for scheduling.
    #[must_use]
    pub fn prioritize(
        &self,
        snapshot: &SystemSnapshot,
        mut workloads: Vec<SessionWorkload>,
    ) -> Vec<SessionWorkload> {
        match self {
            Prioritizer::Fifo => {
                workloads.sort_by(|a, b| fifo_key(a).cmp(&fifo_key(b)));
                workloads
            }
            Prioritizer::Lifo => {
                workloads.reverse();
                workloads
            }
            Prioritizer::FairShare => {
                workloads.sort_by(|a, b| {
                    let ka = fair_share_key(snapshot, a);
                    let kb = fair_share_key(snapshot, b);
                    ka.cmp(&kb).then_with(|| fifo_key(a).cmp(&fifo_key(b)))
                });
                workloads
            }
        }
    }
}

// Tie-break by creation time then session id for stable expectations.
fn fifo_key(w: &SessionWorkload) -> (chrono::DateTime<chrono::Utc>, String) {
    (w.created_at, w.session_id.to_string())
}

type FairShareKey = (
    Reverse<rust_decimal::Decimal>,
    Reverse<rust_decimal::Decimal>,
    Reverse<rust_decimal::Decimal>,
);

fn fair_share_key(snapshot: &SystemSnapshot, w: &SessionWorkload) -> FairShareKey {
    (
        Reverse(snapshot.factor_for(&FairShareEntity::Domain(w.domain.clone()))),
        Reverse(snapshot.factor_for(&FairShareEntity::Project(w.project))),
        Reverse(snapshot.factor_for(&FairShareEntity::User(w.user))),
    )
}
