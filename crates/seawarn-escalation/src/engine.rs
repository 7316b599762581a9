use crate::error::EscalationError;
use crate::plan::{self, EscalationPlan};
use crate::policy;
use chrono::Utc;
use seawarn_common::types::{AlertStatus, MessageContent, Severity};
use seawarn_dispatch::DispatcherSet;
use seawarn_ledger::state::{self, DeliveryRecord};
use seawarn_storage::{AlertRow, PolicyRow, StepRow, Store};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinSet;

struct TimerHandle {
    step_index: i32,
    task: tokio::task::JoinHandle<()>,
}

/// Drives alerts through their escalation policies.
///
/// Lifecycle per alert: not started, then step-active(n) with a timer
/// armed, then acknowledged or exhausted. The step timer is armed
/// before the step's dispatches run, so provider latency or failure
/// never stalls the escalation clock, and the timer re-checks the
/// alert's state at fire time so a late tick against an acknowledged
/// alert is a no-op.
pub struct EscalationEngine {
    store: Arc<Store>,
    dispatchers: DispatcherSet,
    dispatch_timeout: Duration,
    timers: Mutex<HashMap<String, TimerHandle>>,
}

impl EscalationEngine {
    pub fn new(store: Arc<Store>, dispatchers: DispatcherSet, dispatch_timeout: Duration) -> Self {
        Self {
            store,
            dispatchers,
            dispatch_timeout,
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves the policy an alert with this shape would use.
    ///
    /// Zero-step (or otherwise unrunnable) matched policies are an
    /// error; alert creation is blocked rather than producing an alert
    /// that can never page anyone. No match at all returns `None` and
    /// the caller leaves the alert pending.
    pub async fn resolve_policy(
        &self,
        event_type: &str,
        severity: Severity,
    ) -> Result<Option<(PolicyRow, Vec<StepRow>)>, EscalationError> {
        let policies = self.store.list_enabled_policies().await?;
        let Some(policy) = policy::resolve(&policies, event_type, severity) else {
            return Ok(None);
        };
        let steps = self.store.steps_for_policy(&policy.id).await?;
        policy::validate_steps(&policy.name, &steps)?;
        Ok(Some((policy.clone(), steps)))
    }

    /// Starts escalation for a pending alert: marks it sent and runs
    /// step 0. Returns once step 0's dispatches have settled.
    pub async fn start(self: Arc<Self>, alert_id: &str) -> Result<(), EscalationError> {
        let alert = self.load_alert(alert_id).await?;
        if alert.status != AlertStatus::Pending {
            return Err(EscalationError::InvalidState(format!(
                "alert {alert_id} is {}, escalation starts from pending",
                alert.status
            )));
        }
        if alert.policy_id.is_none() {
            return Err(EscalationError::InvalidState(format!(
                "alert {alert_id} has no policy assigned"
            )));
        }
        self.store.mark_alert_sent(alert_id, Utc::now()).await?;
        self.run_step(alert_id.to_string(), 0).await
    }

    /// Acknowledges an alert: freezes its status, cancels the step
    /// timer, and closes every non-terminal ledger row. Idempotent.
    pub async fn acknowledge(&self, alert_id: &str, by: &str) -> Result<AlertRow, EscalationError> {
        let now = Utc::now();
        let row = self
            .store
            .acknowledge_alert(alert_id, by, now)
            .await?
            .ok_or_else(|| EscalationError::AlertNotFound(alert_id.to_string()))?;
        self.clear_timer(alert_id);
        let closed = self.store.close_open_attempts(alert_id, now).await?;
        tracing::info!(alert_id, by, closed_attempts = closed, "Alert acknowledged");
        Ok(row)
    }

    /// Previews the full escalation without sending anything. Uses the
    /// same per-step resolution as live execution.
    pub async fn dry_run(&self, alert_id: &str) -> Result<EscalationPlan, EscalationError> {
        let alert = self.load_alert(alert_id).await?;
        let policy_id = alert.policy_id.clone().ok_or_else(|| {
            EscalationError::InvalidState(format!("alert {alert_id} has no policy assigned"))
        })?;
        let policy = self
            .store
            .get_policy_by_id(&policy_id)
            .await?
            .ok_or_else(|| {
                EscalationError::PolicyResolution(format!("policy {policy_id} no longer exists"))
            })?;
        let steps = self.store.steps_for_policy(&policy_id).await?;
        policy::validate_steps(&policy.name, &steps)?;

        let contacts = self.store.list_all_contacts().await?;
        let configured = self.dispatchers.configured_channels();
        let step_plans = steps
            .iter()
            .map(|s| plan::plan_step(s, &contacts, &configured))
            .collect();
        Ok(EscalationPlan {
            alert_id: alert.id,
            policy_id: policy.id,
            policy_name: policy.name,
            steps: step_plans,
        })
    }

    /// Re-arms timers for alerts whose escalation was live when the
    /// process last stopped. The current step's timeout restarts in
    /// full; attempts already on the ledger are not re-sent.
    pub async fn resume(self: Arc<Self>) -> Result<usize, EscalationError> {
        let alerts = self.store.list_escalating_alerts().await?;
        let count = alerts.len();
        for alert in alerts {
            let Some(policy_id) = alert.policy_id.clone() else {
                continue;
            };
            let steps = self.store.steps_for_policy(&policy_id).await?;
            let Some(step) = steps.get(alert.escalation_step as usize) else {
                continue;
            };
            tracing::info!(
                alert_id = %alert.id,
                step = alert.escalation_step,
                "Resuming escalation timer"
            );
            Arc::clone(&self).arm_timer(
                &alert.id,
                alert.escalation_step,
                Duration::from_secs(step.timeout_secs as u64),
            );
        }
        Ok(count)
    }

    async fn run_step(
        self: Arc<Self>,
        alert_id: String,
        step_index: i32,
    ) -> Result<(), EscalationError> {
        let alert = self.load_alert(&alert_id).await?;
        if alert.status != AlertStatus::Sent {
            tracing::debug!(alert_id, status = %alert.status, "Alert settled; step not run");
            return Ok(());
        }
        let policy_id = alert.policy_id.clone().ok_or_else(|| {
            EscalationError::InvalidState(format!("alert {alert_id} has no policy assigned"))
        })?;
        let steps = self.store.steps_for_policy(&policy_id).await?;

        if step_index as usize >= steps.len() {
            self.store.mark_alert_exhausted(&alert_id).await?;
            self.clear_timer(&alert_id);
            tracing::warn!(
                alert_id,
                steps = steps.len(),
                "Escalation exhausted with no acknowledgement"
            );
            return Ok(());
        }

        let step = steps[step_index as usize].clone();
        self.store.set_alert_step(&alert_id, step_index).await?;

        // Timer first: the step advances on schedule even if every
        // dispatch below fails or hangs.
        Arc::clone(&self).arm_timer(
            &alert_id,
            step_index,
            Duration::from_secs(step.timeout_secs as u64),
        );

        let contacts = self.store.list_all_contacts().await?;
        let step_plan = plan::plan_step(&step, &contacts, &self.dispatchers.configured_channels());
        for skip in &step_plan.skipped {
            tracing::warn!(
                alert_id,
                step = step_index,
                contact = %skip.contact_name,
                reason = %skip.reason,
                "Contact unreachable in this step"
            );
        }
        if step_plan.dispatches.is_empty() {
            tracing::warn!(
                alert_id,
                step = step_index,
                "Step produced no dispatches; its timeout still applies"
            );
            return Ok(());
        }

        let content = message_for(&alert);
        let mut join = JoinSet::new();
        for dispatch in step_plan.dispatches {
            let store = Arc::clone(&self.store);
            let dispatcher = self.dispatchers.get(dispatch.channel);
            let content = content.clone();
            let alert_id = alert_id.clone();
            let timeout = self.dispatch_timeout;
            join.spawn(async move {
                let mut record = DeliveryRecord::new(
                    seawarn_common::id::next_id(),
                    alert_id.clone(),
                    step_index,
                    dispatch.contact_id.clone(),
                    dispatch.channel,
                    dispatch.address.clone(),
                    Utc::now(),
                );
                if let Err(e) = store.insert_attempt(&record).await {
                    tracing::error!(alert_id, error = %e, "Failed to record delivery attempt");
                    return;
                }

                let Some(dispatcher) = dispatcher else {
                    // plan_step filters unconfigured channels; this can
                    // only hit if configuration changed mid-step.
                    state::record_dispatch_failure(
                        &mut record,
                        &format!("no provider configured for channel '{}'", dispatch.channel),
                        Utc::now(),
                    );
                    let _ = store.save_attempt(&record).await;
                    return;
                };

                match tokio::time::timeout(timeout, dispatcher.dispatch(&dispatch.address, &content))
                    .await
                {
                    Ok(Ok(receipt)) => {
                        state::record_dispatch(&mut record, &receipt.provider_message_id, Utc::now());
                        tracing::info!(
                            alert_id,
                            step = step_index,
                            channel = %dispatch.channel,
                            contact = %dispatch.contact_name,
                            provider_message_id = %receipt.provider_message_id,
                            "Dispatched"
                        );
                    }
                    Ok(Err(e)) => {
                        state::record_dispatch_failure(&mut record, &e.to_string(), Utc::now());
                        tracing::warn!(
                            alert_id,
                            step = step_index,
                            channel = %dispatch.channel,
                            error = %e,
                            "Dispatch failed"
                        );
                    }
                    Err(_) => {
                        state::record_dispatch_failure(&mut record, "dispatch timed out", Utc::now());
                        tracing::warn!(
                            alert_id,
                            step = step_index,
                            channel = %dispatch.channel,
                            "Dispatch timed out"
                        );
                    }
                }
                if let Err(e) = store.save_attempt(&record).await {
                    tracing::error!(alert_id, error = %e, "Failed to update delivery attempt");
                }
            });
        }
        while join.join_next().await.is_some() {}

        // An acknowledgement that raced this step may have enumerated
        // open rows before some of the inserts and saves above landed.
        let settled = self.load_alert(&alert_id).await?;
        if settled.status == AlertStatus::Acknowledged {
            let closed = self.store.close_open_attempts(&alert_id, Utc::now()).await?;
            if closed > 0 {
                tracing::info!(
                    alert_id,
                    step = step_index,
                    closed_attempts = closed,
                    "Closed attempts left open by a concurrent acknowledgement"
                );
            }
        }
        Ok(())
    }

    fn arm_timer(self: Arc<Self>, alert_id: &str, step_index: i32, timeout: Duration) {
        let engine = Arc::clone(&self);
        let id = alert_id.to_string();
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            engine.on_timer_fired(id, step_index).await;
        });
        let mut timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(prev) = timers.insert(alert_id.to_string(), TimerHandle { step_index, task }) {
            prev.task.abort();
        }
    }

    async fn on_timer_fired(self: Arc<Self>, alert_id: String, step_index: i32) {
        // This handle is done sleeping and is now the task driving the
        // advance. Drop it from the map without aborting it, so arming
        // the next step's timer does not cancel the dispatches below.
        {
            let mut timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
            if timers
                .get(&alert_id)
                .map_or(false, |h| h.step_index == step_index)
            {
                timers.remove(&alert_id);
            }
        }
        match self.store.get_alert_by_id(&alert_id).await {
            Ok(Some(alert))
                if alert.status == AlertStatus::Sent
                    && alert.escalation_started
                    && alert.escalation_step == step_index =>
            {
                tracing::info!(alert_id, step = step_index, "Step timed out unacknowledged");
                if let Err(e) = Arc::clone(&self).run_step(alert_id.clone(), step_index + 1).await {
                    tracing::error!(alert_id, error = %e, "Escalation advance failed");
                }
            }
            Ok(_) => {
                tracing::debug!(alert_id, step = step_index, "Timer fired for settled alert");
            }
            Err(e) => {
                tracing::error!(alert_id, error = %e, "Timer could not load alert");
            }
        }
    }

    fn clear_timer(&self, alert_id: &str) {
        let mut timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = timers.remove(alert_id) {
            handle.task.abort();
        }
    }

    async fn load_alert(&self, alert_id: &str) -> Result<AlertRow, EscalationError> {
        self.store
            .get_alert_by_id(alert_id)
            .await?
            .ok_or_else(|| EscalationError::AlertNotFound(alert_id.to_string()))
    }

    #[cfg(test)]
    fn active_timer_step(&self, alert_id: &str) -> Option<i32> {
        let timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        timers.get(alert_id).map(|h| h.step_index)
    }
}

/// Renders the outbound message for an alert.
fn message_for(alert: &AlertRow) -> MessageContent {
    let subject = format!("[{}] {}", alert.severity, alert.headline);
    let mut body = alert.headline.clone();
    if let Some(rec) = &alert.recommendation {
        body.push_str("\nRecommended action: ");
        body.push_str(rec);
    }
    body.push_str("\nAlert ID: ");
    body.push_str(&alert.id);
    MessageContent { subject, body }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use seawarn_common::types::{Channel, DeliveryStatus};
    use seawarn_dispatch::{ChannelDispatcher, DispatchError, DispatchReceipt};
    use seawarn_storage::{ContactRow, PolicyRow, StepRow};
    use std::sync::atomic::{AtomicU64, Ordering};
    use tempfile::TempDir;

    struct FakeDispatcher {
        channel: Channel,
        calls: Arc<Mutex<Vec<String>>>,
        counter: AtomicU64,
        fail: bool,
        delay: Duration,
    }

    impl FakeDispatcher {
        fn new(channel: Channel, fail: bool) -> (Arc<Self>, Arc<Mutex<Vec<String>>>) {
            Self::build(channel, fail, Duration::ZERO)
        }

        fn slow(channel: Channel, delay: Duration) -> (Arc<Self>, Arc<Mutex<Vec<String>>>) {
            Self::build(channel, false, delay)
        }

        fn build(
            channel: Channel,
            fail: bool,
            delay: Duration,
        ) -> (Arc<Self>, Arc<Mutex<Vec<String>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            let d = Arc::new(Self {
                channel,
                calls: Arc::clone(&calls),
                counter: AtomicU64::new(0),
                fail,
                delay,
            });
            (d, calls)
        }
    }

    #[async_trait]
    impl ChannelDispatcher for FakeDispatcher {
        async fn dispatch(
            &self,
            address: &str,
            _content: &MessageContent,
        ) -> Result<DispatchReceipt, DispatchError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.calls.lock().unwrap().push(address.to_string());
            if self.fail {
                return Err(DispatchError::TransientProvider("gateway down".into()));
            }
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            Ok(DispatchReceipt {
                provider_message_id: format!("fake-{}-{n}", self.channel),
            })
        }

        fn channel(&self) -> Channel {
            self.channel
        }
    }

    async fn setup() -> (TempDir, Arc<Store>) {
        seawarn_common::id::init(1, 1);
        let dir = TempDir::new().unwrap();
        let db_url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("seawarn.db").display()
        );
        let store = Arc::new(Store::new(&db_url).await.unwrap());
        (dir, store)
    }

    async fn seed_policy(store: &Store, step_count: usize, timeout_secs: i64) -> PolicyRow {
        let policy = PolicyRow {
            id: seawarn_common::id::next_id(),
            name: "critical-tsunami".to_string(),
            event_type: "tsunami.*".to_string(),
            severities: vec![Severity::Critical],
            enabled: true,
            created_at: Utc::now(),
        };
        let steps: Vec<StepRow> = (0..step_count)
            .map(|i| StepRow {
                id: seawarn_common::id::next_id(),
                policy_id: policy.id.clone(),
                step_index: i as i32,
                role_pattern: if i == 0 { "bridge.*" } else { "*" }.to_string(),
                max_priority: None,
                channels: vec![Channel::Sms],
                timeout_secs,
            })
            .collect();
        store.insert_policy(&policy, &steps).await.unwrap()
    }

    async fn seed_contacts(store: &Store) {
        for (name, role, phone) in [
            ("okafor", "bridge.captain", "+15550001"),
            ("reyes", "shore.dispatch", "+15550002"),
        ] {
            store
                .insert_contact(&ContactRow {
                    id: seawarn_common::id::next_id(),
                    name: name.to_string(),
                    role: role.to_string(),
                    priority: 10,
                    phone: Some(phone.to_string()),
                    email: None,
                    whatsapp: None,
                    preferred_channels: Vec::new(),
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }
    }

    async fn seed_alert(store: &Store, policy_id: &str) -> AlertRow {
        store
            .insert_alert(&AlertRow {
                id: seawarn_common::id::next_id(),
                event_type: "tsunami.warning".to_string(),
                severity: Severity::Critical,
                headline: "Tsunami warning for sector 7".to_string(),
                recommendation: Some("Proceed to open water".to_string()),
                target: None,
                status: AlertStatus::Pending,
                policy_id: Some(policy_id.to_string()),
                escalation_step: 0,
                escalation_started: false,
                exhausted: false,
                acknowledged_by: None,
                created_at: Utc::now(),
                sent_at: None,
                acknowledged_at: None,
                resolved_at: None,
                expires_at: None,
            })
            .await
            .unwrap()
    }

    fn engine_with(store: Arc<Store>, fail: bool) -> (Arc<EscalationEngine>, Arc<Mutex<Vec<String>>>) {
        let (dispatcher, calls) = FakeDispatcher::new(Channel::Sms, fail);
        let mut set = DispatcherSet::new();
        set.insert(dispatcher);
        let engine = Arc::new(EscalationEngine::new(
            store,
            set,
            Duration::from_millis(500),
        ));
        (engine, calls)
    }

    #[tokio::test]
    async fn first_step_dispatches_to_matching_contacts_only() {
        let (_dir, store) = setup().await;
        let policy = seed_policy(&store, 2, 60).await;
        seed_contacts(&store).await;
        let alert = seed_alert(&store, &policy.id).await;

        let (engine, calls) = engine_with(Arc::clone(&store), false);
        Arc::clone(&engine).start(&alert.id).await.unwrap();

        // Step 0 targets bridge.* only.
        assert_eq!(calls.lock().unwrap().as_slice(), ["+15550001"]);

        let row = store.get_alert_by_id(&alert.id).await.unwrap().unwrap();
        assert_eq!(row.status, AlertStatus::Sent);
        assert_eq!(row.escalation_step, 0);
        assert_eq!(engine.active_timer_step(&alert.id), Some(0));

        let attempts = store.list_attempts_for_alert(&alert.id).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].status, DeliveryStatus::Sent);
        assert!(attempts[0].provider_message_id.is_some());
    }

    #[tokio::test]
    async fn unacknowledged_alert_exhausts_after_every_step_times_out() {
        let (_dir, store) = setup().await;
        let policy = seed_policy(&store, 2, 1).await;
        seed_contacts(&store).await;
        let alert = seed_alert(&store, &policy.id).await;

        let (engine, calls) = engine_with(Arc::clone(&store), false);
        Arc::clone(&engine).start(&alert.id).await.unwrap();

        // Two 1s steps plus scheduling slack.
        tokio::time::sleep(Duration::from_millis(2600)).await;

        let row = store.get_alert_by_id(&alert.id).await.unwrap().unwrap();
        assert!(row.exhausted);
        assert!(!row.escalation_started);
        assert_eq!(row.status, AlertStatus::Sent);
        assert_eq!(row.escalation_step, 1);
        assert_eq!(engine.active_timer_step(&alert.id), None);

        // Step 0 pages the captain, step 1 pages everyone. The step 1
        // dispatches run inside the expiring timer's own task, so they
        // must survive the next timer being armed.
        assert_eq!(calls.lock().unwrap().len(), 3);
        let attempts = store.list_attempts_for_alert(&alert.id).await.unwrap();
        assert_eq!(attempts.len(), 3);
        assert_eq!(
            attempts.iter().filter(|a| a.step_index == 1).count(),
            2
        );
        assert!(attempts.iter().all(|a| a.status == DeliveryStatus::Sent));
    }

    #[tokio::test]
    async fn acknowledgement_short_circuits_escalation() {
        let (_dir, store) = setup().await;
        let policy = seed_policy(&store, 3, 1).await;
        seed_contacts(&store).await;
        let alert = seed_alert(&store, &policy.id).await;

        let (engine, calls) = engine_with(Arc::clone(&store), false);
        Arc::clone(&engine).start(&alert.id).await.unwrap();

        let row = engine.acknowledge(&alert.id, "capt-okafor").await.unwrap();
        assert_eq!(row.status, AlertStatus::Acknowledged);
        assert_eq!(engine.active_timer_step(&alert.id), None);

        // Past where step 0 would have timed out: no further dispatch,
        // no step advance.
        tokio::time::sleep(Duration::from_millis(1400)).await;
        let row = store.get_alert_by_id(&alert.id).await.unwrap().unwrap();
        assert_eq!(row.status, AlertStatus::Acknowledged);
        assert_eq!(row.escalation_step, 0);
        assert!(!row.exhausted);
        assert_eq!(calls.lock().unwrap().len(), 1);

        // Every attempt was closed by the ack.
        let attempts = store.list_attempts_for_alert(&alert.id).await.unwrap();
        assert!(attempts
            .iter()
            .all(|a| a.status == DeliveryStatus::Acknowledged));

        // Idempotent.
        let again = engine.acknowledge(&alert.id, "someone-else").await.unwrap();
        assert_eq!(again.acknowledged_by.as_deref(), Some("capt-okafor"));
    }

    #[tokio::test]
    async fn whatsapp_only_contact_is_paged_on_whatsapp_alone() {
        let (_dir, store) = setup().await;
        let policy = PolicyRow {
            id: seawarn_common::id::next_id(),
            name: "critical-tsunami".to_string(),
            event_type: "tsunami.*".to_string(),
            severities: vec![Severity::Critical],
            enabled: true,
            created_at: Utc::now(),
        };
        let steps = vec![StepRow {
            id: seawarn_common::id::next_id(),
            policy_id: policy.id.clone(),
            step_index: 0,
            role_pattern: "*".to_string(),
            max_priority: None,
            channels: vec![Channel::Sms, Channel::Whatsapp],
            timeout_secs: 60,
        }];
        let policy = store.insert_policy(&policy, &steps).await.unwrap();
        store
            .insert_contact(&ContactRow {
                id: seawarn_common::id::next_id(),
                name: "mara".to_string(),
                role: "shore.watch".to_string(),
                priority: 10,
                phone: None,
                email: None,
                whatsapp: Some("+15559001".to_string()),
                preferred_channels: Vec::new(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let alert = seed_alert(&store, &policy.id).await;

        let (sms, sms_calls) = FakeDispatcher::new(Channel::Sms, false);
        let (whatsapp, whatsapp_calls) = FakeDispatcher::new(Channel::Whatsapp, false);
        let mut set = DispatcherSet::new();
        set.insert(sms);
        set.insert(whatsapp);
        let engine = Arc::new(EscalationEngine::new(
            Arc::clone(&store),
            set,
            Duration::from_millis(500),
        ));

        // The contact is reachable, so the step plans a dispatch and
        // reports nobody skipped.
        let plan = engine.dry_run(&alert.id).await.unwrap();
        assert_eq!(plan.steps[0].dispatches.len(), 1);
        assert!(plan.steps[0].skipped.is_empty());

        Arc::clone(&engine).start(&alert.id).await.unwrap();

        // The missing sms address skips that channel without failing
        // the step and without writing an sms ledger row.
        assert!(sms_calls.lock().unwrap().is_empty());
        assert_eq!(whatsapp_calls.lock().unwrap().as_slice(), ["+15559001"]);

        let attempts = store.list_attempts_for_alert(&alert.id).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].channel, Channel::Whatsapp);
        assert_eq!(attempts[0].status, DeliveryStatus::Sent);
    }

    #[tokio::test]
    async fn acknowledgement_during_a_slow_dispatch_still_closes_the_attempt() {
        let (_dir, store) = setup().await;
        let policy = seed_policy(&store, 2, 60).await;
        seed_contacts(&store).await;
        let alert = seed_alert(&store, &policy.id).await;

        let (dispatcher, _calls) = FakeDispatcher::slow(Channel::Sms, Duration::from_millis(300));
        let mut set = DispatcherSet::new();
        set.insert(dispatcher);
        let engine = Arc::new(EscalationEngine::new(
            Arc::clone(&store),
            set,
            Duration::from_secs(2),
        ));

        let running = {
            let engine = Arc::clone(&engine);
            let id = alert.id.clone();
            tokio::spawn(async move { engine.start(&id).await })
        };

        // The ack lands while step 0's dispatch is still in flight; its
        // attempt row must not come back out of the dispatch task as
        // merely sent.
        tokio::time::sleep(Duration::from_millis(100)).await;
        engine.acknowledge(&alert.id, "capt-okafor").await.unwrap();
        running.await.unwrap().unwrap();

        let attempts = store.list_attempts_for_alert(&alert.id).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].status, DeliveryStatus::Acknowledged);
    }

    #[tokio::test]
    async fn failing_provider_does_not_stall_the_escalation_clock() {
        let (_dir, store) = setup().await;
        let policy = seed_policy(&store, 2, 1).await;
        seed_contacts(&store).await;
        let alert = seed_alert(&store, &policy.id).await;

        let (engine, _calls) = engine_with(Arc::clone(&store), true);
        Arc::clone(&engine).start(&alert.id).await.unwrap();

        let attempts = store.list_attempts_for_alert(&alert.id).await.unwrap();
        assert_eq!(attempts[0].status, DeliveryStatus::Failed);
        assert_eq!(attempts[0].error_message.as_deref(), Some("Dispatch: transient provider error: gateway down"));

        // Advancement comes from the timer, not from dispatch success.
        tokio::time::sleep(Duration::from_millis(1400)).await;
        let row = store.get_alert_by_id(&alert.id).await.unwrap().unwrap();
        assert_eq!(row.escalation_step, 1);
    }

    #[tokio::test]
    async fn dry_run_matches_live_resolution_without_side_effects() {
        let (_dir, store) = setup().await;
        let policy = seed_policy(&store, 2, 60).await;
        seed_contacts(&store).await;
        let alert = seed_alert(&store, &policy.id).await;

        let (engine, calls) = engine_with(Arc::clone(&store), false);
        let plan = engine.dry_run(&alert.id).await.unwrap();

        assert_eq!(plan.policy_name, "critical-tsunami");
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].dispatches.len(), 1);
        assert_eq!(plan.steps[0].dispatches[0].address, "+15550001");
        assert_eq!(plan.steps[1].dispatches.len(), 2);

        // Nothing was sent or recorded.
        assert!(calls.lock().unwrap().is_empty());
        assert!(store
            .list_attempts_for_alert(&alert.id)
            .await
            .unwrap()
            .is_empty());
        let row = store.get_alert_by_id(&alert.id).await.unwrap().unwrap();
        assert_eq!(row.status, AlertStatus::Pending);
    }

    #[tokio::test]
    async fn resolve_policy_blocks_zero_step_match_and_passes_no_match() {
        let (_dir, store) = setup().await;
        let empty = PolicyRow {
            id: seawarn_common::id::next_id(),
            name: "hollow".to_string(),
            event_type: "seismic.*".to_string(),
            severities: vec![Severity::High],
            enabled: true,
            created_at: Utc::now(),
        };
        store.insert_policy(&empty, &[]).await.unwrap();

        let (engine, _calls) = engine_with(Arc::clone(&store), false);

        let err = engine
            .resolve_policy("seismic.swarm", Severity::High)
            .await
            .unwrap_err();
        assert!(matches!(err, EscalationError::PolicyResolution(_)));

        let none = engine
            .resolve_policy("tsunami.warning", Severity::Low)
            .await
            .unwrap();
        assert!(none.is_none());
    }
}
