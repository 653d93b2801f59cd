//! Idle culling.
//!
//! One pass per wake-up:
//! 1. notebook gone, terminating or opted out: stop
//! 2. no policy at any scope: stop
//! 3. workload missing or already at zero replicas: stop (kernel API not queried)
//! 4. ask the kernel API for the last activity
//! 5. idle longer than the policy duration: stop the workload
//! 6. requeue after half the policy interval
//!
//! Malformed policy durations end the pass quietly without a requeue; the
//! next policy change re-triggers the notebook through the policy watch.

use super::{Outcome, Reconciler};
use crate::error::ControllerError;
use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::StatefulSet;
use kube::ResourceExt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// True when `last_activity + idle_for` lies strictly before `now`.
///
/// No recorded activity never triggers a cull.
#[must_use]
pub fn is_idle_too_long(
    last_activity: Option<DateTime<Utc>>,
    idle_for: Duration,
    now: DateTime<Utc>,
) -> bool {
    let Some(last) = last_activity else {
        return false;
    };
    chrono::Duration::from_std(idle_for)
        .ok()
        .and_then(|d| last.checked_add_signed(d))
        .is_some_and(|deadline| deadline < now)
}

fn current_replicas(workload: &StatefulSet) -> i32 {
    // An unset replica count is defaulted to 1 by the API server
    workload
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1)
}

impl Reconciler {
    /// Run one culling pass for a notebook.
    ///
    /// # Errors
    ///
    /// Store and kernel API failures; the caller requeues with backoff.
    pub async fn reconcile_culling(&self, namespace: &str, name: &str) -> Result<Outcome, ControllerError> {
        let Some(notebook) = self.store.get_notebook(namespace, name).await? else {
            debug!("Notebook {}/{} not found, nothing to cull", namespace, name);
            return Ok(Outcome::done());
        };
        if notebook.is_terminating() {
            return Ok(Outcome::done());
        }
        if notebook.ignores_culling() {
            debug!("Notebook {}/{} opted out of culling", namespace, name);
            return Ok(Outcome::done());
        }

        let Some(policy) = self.resolve_policy(&notebook).await? else {
            return Ok(Outcome::done());
        };

        let Some(workload) = self
            .store
            .get_workload(namespace, &notebook.workload_name())
            .await?
        else {
            debug!("Workload of notebook {}/{} not found", namespace, name);
            return Ok(Outcome::done());
        };
        if current_replicas(&workload) == 0 {
            debug!("Notebook {}/{} is already stopped", namespace, name);
            return Ok(Outcome::done());
        }

        let last_activity = self.oracle.last_activity(namespace, name).await?;

        let idle_for = match policy.options.idle_duration() {
            Ok(d) => d,
            Err(e) => {
                warn!(
                    "Culling policy {} for notebook {}/{} is unusable: {}",
                    policy.source, namespace, name, e
                );
                return Ok(Outcome::done());
            }
        };

        if is_idle_too_long(last_activity, idle_for, Utc::now()) {
            info!(
                "Culling notebook {}/{}: idle since {:?}, limit {:?} ({})",
                namespace, name, last_activity, idle_for, policy.source
            );
            self.store.stop_workload(&workload).await?;
        } else {
            debug!(
                "Notebook {}/{} active (last activity {:?}, limit {:?})",
                namespace,
                name,
                last_activity,
                idle_for
            );
        }

        let interval = match policy.options.check_interval() {
            Ok(i) => i,
            Err(e) => {
                warn!(
                    "Culling policy {} for notebook {}/{} is unusable: {}",
                    policy.source, namespace, name, e
                );
                return Ok(Outcome::done());
            }
        };

        let next_check = interval / 2;
        if next_check.is_zero() {
            return Ok(Outcome::done());
        }
        debug!("Next culling check for {}/{} in {:?}", namespace, name, next_check);
        Ok(Outcome::requeue_after(next_check))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_is_idle_too_long_boundaries() {
        let last = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let limit = Duration::from_secs(3600);

        assert!(!is_idle_too_long(None, limit, last + chrono::Duration::days(30)));
        assert!(!is_idle_too_long(Some(last), limit, last + chrono::Duration::minutes(59)));
        // Exactly at the limit is not yet idle
        assert!(!is_idle_too_long(Some(last), limit, last + chrono::Duration::hours(1)));
        assert!(is_idle_too_long(
            Some(last),
            limit,
            last + chrono::Duration::hours(1) + chrono::Duration::seconds(1)
        ));
    }

    #[test]
    fn test_is_idle_too_long_huge_limit_never_culls() {
        let last = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert!(!is_idle_too_long(Some(last), Duration::from_secs(u64::MAX), Utc::now()));
    }
}
