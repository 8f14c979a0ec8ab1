#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use scout_autonomy::{BrakeController, VerificationScheduler};
    use scout_core::{
        CoordinationStore, InFlightTask, MemoryCoordinationStore, Result, ScoutError, TaskHandle,
        TaskQueue,
    };
    use scout_store::SqliteStore;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    // ── Fakes ──────────────────────────────────────────────────

    /// Task queue whose in-flight list is scripted by the test.
    #[derive(Default)]
    struct ScriptedQueue {
        in_flight: Mutex<Vec<InFlightTask>>,
        unreachable: AtomicBool,
    }

    impl ScriptedQueue {
        fn add_in_flight(&self, user_id: &str) -> TaskHandle {
            let handle = TaskHandle::new();
            self.in_flight.lock().push(InFlightTask {
                handle,
                name: "agents.job_scout".into(),
                user_id: user_id.to_string(),
                args: Value::Null,
                submitted_at: chrono::Utc::now(),
            });
            handle
        }
    }

    #[async_trait]
    impl TaskQueue for ScriptedQueue {
        async fn submit(&self, _name: &str, user_id: &str, _args: Value) -> Result<TaskHandle> {
            Ok(self.add_in_flight(user_id))
        }

        async fn inspect(&self) -> Result<Vec<InFlightTask>> {
            if self.unreachable.load(Ordering::SeqCst) {
                return Err(ScoutError::TaskQueue("broker unreachable".into()));
            }
            Ok(self.in_flight.lock().clone())
        }
    }

    #[derive(Default)]
    struct RecordingVerifier {
        calls: Mutex<Vec<(String, Duration)>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl VerificationScheduler for RecordingVerifier {
        async fn schedule_verification(&self, user_id: &str, delay: Duration) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ScoutError::TaskQueue("scheduler offline".into()));
            }
            self.calls.lock().push((user_id.to_string(), delay));
            Ok(())
        }
    }

    /// A coordination store that is always unreachable.
    struct DownCoord;

    fn down() -> ScoutError {
        ScoutError::Coordination("connection refused".into())
    }

    #[async_trait]
    impl CoordinationStore for DownCoord {
        async fn set(&self, _: &str, _: &str) -> Result<()> {
            Err(down())
        }
        async fn exists(&self, _: &str) -> Result<bool> {
            Err(down())
        }
        async fn delete(&self, _: &str) -> Result<bool> {
            Err(down())
        }
        async fn hset(&self, _: &str, _: &[(&str, String)]) -> Result<()> {
            Err(down())
        }
        async fn hgetall(&self, _: &str) -> Result<HashMap<String, String>> {
            Err(down())
        }
        async fn get(&self, _: &str) -> Result<Option<String>> {
            Err(down())
        }
        async fn set_ex(&self, _: &str, _: &str, _: Duration) -> Result<()> {
            Err(down())
        }
        async fn publish(&self, _: &str, _: &str) -> Result<usize> {
            Err(down())
        }
    }

    struct Harness {
        coord: Arc<MemoryCoordinationStore>,
        store: Arc<SqliteStore>,
        queue: Arc<ScriptedQueue>,
        verifier: Arc<RecordingVerifier>,
        brake: Arc<BrakeController>,
    }

    fn harness() -> Harness {
        let coord = Arc::new(MemoryCoordinationStore::new());
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let queue = Arc::new(ScriptedQueue::default());
        let verifier = Arc::new(RecordingVerifier::default());
        let brake = Arc::new(BrakeController::new(
            coord.clone(),
            store.clone(),
            queue.clone(),
            verifier.clone(),
        ));
        Harness {
            coord,
            store,
            queue,
            verifier,
            brake,
        }
    }

    // ── Autonomy Levels ────────────────────────────────────────

    mod level {
        use scout_autonomy::AutonomyLevel;

        #[test]
        fn test_from_u8() {
            assert_eq!(AutonomyLevel::from_u8(0), AutonomyLevel::Suggest);
            assert_eq!(AutonomyLevel::from_u8(1), AutonomyLevel::ReadOnly);
            assert_eq!(AutonomyLevel::from_u8(2), AutonomyLevel::Supervised);
            assert_eq!(AutonomyLevel::from_u8(3), AutonomyLevel::Autonomous);
            // Out of range defaults to read-only
            assert_eq!(AutonomyLevel::from_u8(4), AutonomyLevel::ReadOnly);
            assert_eq!(AutonomyLevel::from_u8(255), AutonomyLevel::ReadOnly);
        }

        #[test]
        fn test_parse() {
            assert_eq!("L2".parse::<AutonomyLevel>().unwrap(), AutonomyLevel::Supervised);
            assert_eq!("l0".parse::<AutonomyLevel>().unwrap(), AutonomyLevel::Suggest);
            assert_eq!(" 3 ".parse::<AutonomyLevel>().unwrap(), AutonomyLevel::Autonomous);
            assert_eq!("L9".parse::<AutonomyLevel>().unwrap(), AutonomyLevel::ReadOnly);
            assert_eq!("admin".parse::<AutonomyLevel>().unwrap(), AutonomyLevel::ReadOnly);
        }

        #[test]
        fn test_ordering_and_cap() {
            assert!(AutonomyLevel::Suggest < AutonomyLevel::ReadOnly);
            assert!(AutonomyLevel::Supervised < AutonomyLevel::Autonomous);
            assert_eq!(
                AutonomyLevel::Autonomous.capped_at(Some(AutonomyLevel::Supervised)),
                AutonomyLevel::Supervised
            );
            assert_eq!(
                AutonomyLevel::ReadOnly.capped_at(Some(AutonomyLevel::Autonomous)),
                AutonomyLevel::ReadOnly
            );
            assert_eq!(AutonomyLevel::Supervised.capped_at(None), AutonomyLevel::Supervised);
        }

        #[test]
        fn test_display() {
            let s = format!("{}", AutonomyLevel::Supervised);
            assert!(s.contains("L2"));
            assert!(s.contains("Supervised"));
        }
    }

    // ── Brake ──────────────────────────────────────────────────

    mod brake {
        use super::*;
        use scout_autonomy::BrakeState;
        use scout_config::{BrakeConfig, FailMode};
        use scout_core::{PublishedEvent, keys};

        #[tokio::test]
        async fn test_check_follows_activate_and_resume() {
            let h = harness();
            assert!(!h.brake.check("u1").await);
            h.brake.activate("u1").await.unwrap();
            assert!(h.brake.check("u1").await);
            assert!(!h.brake.check("u2").await);
            h.brake.resume("u1").await.unwrap();
            assert!(!h.brake.check("u1").await);
        }

        #[tokio::test]
        async fn test_check_or_raise() {
            let h = harness();
            h.brake.check_or_raise("u1").await.unwrap();
            h.brake.activate("u1").await.unwrap();
            let err = h.brake.check_or_raise("u1").await.unwrap_err();
            assert!(matches!(err, ScoutError::BrakeActive { ref user_id } if user_id == "u1"));
            assert!(err.is_safety_stop());
        }

        #[tokio::test]
        async fn test_unset_state_is_running() {
            let h = harness();
            let state = h.brake.get_state("nobody").await.unwrap();
            assert_eq!(state.state, BrakeState::Running);
            assert!(state.activated_at.is_none());
        }

        #[tokio::test]
        async fn test_activate_reports_pausing_and_schedules_verification() {
            let h = harness();
            h.brake.activate("u1").await.unwrap();

            let state = h.brake.get_state("u1").await.unwrap();
            assert_eq!(state.state, BrakeState::Pausing);
            assert!(state.activated_at.is_some());

            let calls = h.verifier.calls.lock().clone();
            assert_eq!(calls, vec![("u1".to_string(), Duration::from_secs(30))]);
        }

        #[tokio::test]
        async fn test_activate_publishes_critical_event() {
            let h = harness();
            let mut rx = h.coord.subscribe(&keys::events_channel("u1"));
            h.brake.activate("u1").await.unwrap();

            let raw = rx.recv().await.unwrap();
            let event: PublishedEvent = serde_json::from_str(&raw).unwrap();
            assert_eq!(event.event_type, "brake.activated");
            assert_eq!(event.user_id, "u1");
            assert_eq!(event.severity, scout_core::Severity::Critical);
        }

        #[tokio::test]
        async fn test_reactivation_converges_to_pausing() {
            let h = harness();
            let first = h.brake.activate("u1").await.unwrap();
            let second = h.brake.activate("u1").await.unwrap();
            assert!(h.brake.check("u1").await);
            assert_eq!(second, first);
            assert_eq!(h.brake.get_state("u1").await.unwrap().state, BrakeState::Pausing);
            assert_eq!(h.verifier.calls.lock().len(), 1);
        }

        #[tokio::test]
        async fn test_reactivating_settled_brake_only_republishes() {
            let h = harness();
            h.queue.add_in_flight("u1");
            h.brake.activate("u1").await.unwrap();
            h.brake.verify_completion("u1").await.unwrap();
            let settled = h.brake.get_state("u1").await.unwrap();
            assert_eq!(settled.state, BrakeState::Partial);

            let mut rx = h.coord.subscribe(&keys::events_channel("u1"));
            let snapshot = h.brake.activate("u1").await.unwrap();

            assert_eq!(snapshot, settled);
            assert_eq!(h.brake.get_state("u1").await.unwrap(), settled);
            assert_eq!(h.verifier.calls.lock().len(), 1);
            assert!(h.brake.check("u1").await);
            let event: PublishedEvent = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
            assert_eq!(event.event_type, "brake.activated");
        }

        #[tokio::test]
        async fn test_failed_scheduling_does_not_undo_activation() {
            let h = harness();
            h.verifier.fail.store(true, Ordering::SeqCst);
            let snapshot = h.brake.activate("u1").await.unwrap();
            assert_eq!(snapshot.state, BrakeState::Pausing);
            assert!(h.brake.check("u1").await);
        }

        #[tokio::test]
        async fn test_verify_with_no_stuck_tasks_is_paused() {
            let h = harness();
            h.queue.add_in_flight("someone_else");
            h.brake.activate("u1").await.unwrap();

            let snapshot = h.brake.verify_completion("u1").await.unwrap();
            assert_eq!(snapshot.state, BrakeState::Paused);
            assert!(snapshot.stuck_task_ids.is_empty());
            assert_eq!(h.brake.get_state("u1").await.unwrap().state, BrakeState::Paused);
        }

        #[tokio::test]
        async fn test_verify_with_stuck_tasks_is_partial() {
            let h = harness();
            let handle = h.queue.add_in_flight("u1");
            h.brake.activate("u1").await.unwrap();

            let snapshot = h.brake.verify_completion("u1").await.unwrap();
            assert_eq!(snapshot.state, BrakeState::Partial);
            assert_eq!(snapshot.stuck_task_ids, vec![handle.to_string()]);

            let stored = h.brake.get_state("u1").await.unwrap();
            assert_eq!(stored.stuck_task_ids, vec![handle.to_string()]);
            assert!(stored.activated_at.is_some());
        }

        #[tokio::test]
        async fn test_unreachable_inspector_assumes_none_stuck() {
            let h = harness();
            h.queue.add_in_flight("u1");
            h.queue.unreachable.store(true, Ordering::SeqCst);
            h.brake.activate("u1").await.unwrap();

            let snapshot = h.brake.verify_completion("u1").await.unwrap();
            assert_eq!(snapshot.state, BrakeState::Paused);
        }

        #[tokio::test]
        async fn test_verify_after_resume_is_noop() {
            let h = harness();
            h.brake.activate("u1").await.unwrap();
            h.brake.resume("u1").await.unwrap();

            let snapshot = h.brake.verify_completion("u1").await.unwrap();
            assert_eq!(snapshot.state, BrakeState::Running);
            assert_eq!(h.brake.get_state("u1").await.unwrap().state, BrakeState::Running);
        }

        #[tokio::test]
        async fn test_resume_from_partial() {
            let h = harness();
            h.queue.add_in_flight("u1");
            h.brake.activate("u1").await.unwrap();
            h.brake.verify_completion("u1").await.unwrap();

            let snapshot = h.brake.resume("u1").await.unwrap();
            assert_eq!(snapshot.state, BrakeState::Running);
            assert!(!h.brake.check("u1").await);
            let stored = h.brake.get_state("u1").await.unwrap();
            assert_eq!(stored.state, BrakeState::Running);
            assert!(stored.stuck_task_ids.is_empty());
        }

        #[tokio::test]
        async fn test_fail_closed_by_default() {
            let h = harness();
            let brake = BrakeController::new(
                Arc::new(DownCoord),
                h.store.clone(),
                h.queue.clone(),
                h.verifier.clone(),
            );
            assert_eq!(brake.fail_mode(), FailMode::Closed);
            assert!(brake.check("u1").await);
            let err = brake.check_or_raise("u1").await.unwrap_err();
            assert!(matches!(err, ScoutError::BrakeCheckFailed { .. }));
            assert!(err.is_safety_stop());
        }

        #[tokio::test]
        async fn test_fail_open_when_configured() {
            let h = harness();
            let config = BrakeConfig {
                fail_mode: FailMode::Open,
                ..Default::default()
            };
            let brake = BrakeController::new(
                Arc::new(DownCoord),
                h.store.clone(),
                h.queue.clone(),
                h.verifier.clone(),
            )
            .with_config(&config);
            assert!(!brake.check("u1").await);
            brake.check_or_raise("u1").await.unwrap();
        }

        #[tokio::test]
        async fn test_activate_propagates_flag_write_failure() {
            let h = harness();
            let brake = BrakeController::new(
                Arc::new(DownCoord),
                h.store.clone(),
                h.queue.clone(),
                h.verifier.clone(),
            );
            assert!(brake.activate("u1").await.is_err());
            assert!(h.verifier.calls.lock().is_empty());
        }

        #[tokio::test]
        async fn test_verify_delay_from_config() {
            let h = harness();
            let brake = BrakeController::new(
                h.coord.clone(),
                h.store.clone(),
                h.queue.clone(),
                h.verifier.clone(),
            )
            .with_config(&BrakeConfig {
                verify_delay_secs: 5,
                ..Default::default()
            });
            brake.activate("u1").await.unwrap();
            assert_eq!(h.verifier.calls.lock()[0].1, Duration::from_secs(5));
        }

        #[tokio::test]
        async fn test_verify_only_settles_pausing_brake() {
            let h = harness();
            h.brake.activate("u1").await.unwrap();
            let first = h.brake.verify_completion("u1").await.unwrap();
            assert_eq!(first.state, BrakeState::Paused);

            h.queue.add_in_flight("u1");
            let second = h.brake.verify_completion("u1").await.unwrap();
            assert_eq!(second.state, BrakeState::Paused);
            assert!(second.stuck_task_ids.is_empty());
        }

        /// Inspector that releases the brake the way a concurrent resume
        /// would, while the verification is looking at tasks.
        struct ResumingInspector {
            coord: Arc<MemoryCoordinationStore>,
            user_id: String,
        }

        #[async_trait]
        impl TaskQueue for ResumingInspector {
            async fn submit(&self, _: &str, _: &str, _: Value) -> Result<TaskHandle> {
                Err(ScoutError::TaskQueue("read-only".into()))
            }

            async fn inspect(&self) -> Result<Vec<InFlightTask>> {
                let state = keys::brake_state(&self.user_id);
                self.coord.hset(&state, &[("state", "RESUMING".to_string())]).await?;
                self.coord.delete(&keys::pause_flag(&self.user_id)).await?;
                self.coord.hset(&state, &[("state", "RUNNING".to_string())]).await?;
                Ok(Vec::new())
            }
        }

        #[tokio::test]
        async fn test_resume_during_verification_wins() {
            let h = harness();
            let approvals = scout_autonomy::ApprovalQueue::new(h.store.clone(), h.coord.clone());
            let (item, _) = approvals
                .queue("u1", "apply", "submit", Value::Null, "", 0.9)
                .await
                .unwrap();
            let brake = BrakeController::new(
                h.coord.clone(),
                h.store.clone(),
                Arc::new(ResumingInspector {
                    coord: h.coord.clone(),
                    user_id: "u1".into(),
                }),
                h.verifier.clone(),
            );
            brake.activate("u1").await.unwrap();

            let snapshot = brake.verify_completion("u1").await.unwrap();
            assert_eq!(snapshot.state, BrakeState::Running);
            assert!(!brake.check("u1").await);
            assert_eq!(brake.get_state("u1").await.unwrap().state, BrakeState::Running);
            assert_eq!(
                approvals.get(item.id).await.unwrap().unwrap().status,
                scout_core::ApprovalStatus::Pending
            );
        }

        #[tokio::test]
        async fn test_resume_with_unreadable_state() {
            let h = harness();
            h.brake.activate("u1").await.unwrap();
            h.coord
                .hset(&keys::brake_state("u1"), &[("state", "HIBERNATING".to_string())])
                .await
                .unwrap();
            assert!(h.brake.get_state("u1").await.is_err());

            let snapshot = h.brake.resume("u1").await.unwrap();
            assert_eq!(snapshot.state, BrakeState::Running);
            assert!(!h.brake.check("u1").await);
            assert_eq!(h.brake.get_state("u1").await.unwrap().state, BrakeState::Running);
        }

        #[tokio::test]
        async fn test_activate_with_unreadable_state_starts_fresh() {
            let h = harness();
            h.coord
                .hset(&keys::brake_state("u1"), &[("state", "HIBERNATING".to_string())])
                .await
                .unwrap();
            let snapshot = h.brake.activate("u1").await.unwrap();
            assert_eq!(snapshot.state, BrakeState::Pausing);
            assert_eq!(h.verifier.calls.lock().len(), 1);
        }

        #[tokio::test]
        async fn test_brake_shared_across_store_handles() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("scout.db");
            let controller = |store: Arc<SqliteStore>| {
                BrakeController::new(
                    store.clone(),
                    store,
                    Arc::new(ScriptedQueue::default()),
                    Arc::new(RecordingVerifier::default()),
                )
            };
            let api = controller(Arc::new(SqliteStore::open(&path).unwrap()));
            let worker = controller(Arc::new(SqliteStore::open(&path).unwrap()));

            api.activate("u1").await.unwrap();
            assert!(worker.check("u1").await);
            assert_eq!(worker.get_state("u1").await.unwrap().state, BrakeState::Pausing);

            let settled = worker.verify_completion("u1").await.unwrap();
            assert_eq!(settled.state, BrakeState::Paused);
            assert_eq!(api.get_state("u1").await.unwrap().state, BrakeState::Paused);

            api.resume("u1").await.unwrap();
            assert!(!worker.check("u1").await);
            assert_eq!(worker.get_state("u1").await.unwrap().state, BrakeState::Running);
        }
    }

    // ── Gate ───────────────────────────────────────────────────

    mod gate {
        use super::*;
        use scout_autonomy::{
            AutonomyGate, AutonomyLevel, FixedCeiling, GateOutcome, NoCeiling,
            PreferenceTierResolver, TierResolver,
        };
        use scout_config::AutonomyConfig;
        use scout_core::{ActionKind, PreferenceStore};
        use std::sync::atomic::AtomicUsize;

        struct CountingResolver {
            level: AutonomyLevel,
            calls: AtomicUsize,
        }

        #[async_trait]
        impl TierResolver for CountingResolver {
            async fn resolve(&self, _user_id: &str) -> Result<AutonomyLevel> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(self.level)
            }
        }

        fn counting(level: AutonomyLevel) -> Arc<CountingResolver> {
            Arc::new(CountingResolver {
                level,
                calls: AtomicUsize::new(0),
            })
        }

        #[test]
        fn test_decision_table() {
            use ActionKind::{Read, Write};
            use AutonomyLevel::{Autonomous, ReadOnly, Supervised};
            use GateOutcome::{Blocked, Execute, QueueApproval};

            let expected = [
                (AutonomyLevel::Suggest, Read, GateOutcome::Suggest),
                (AutonomyLevel::Suggest, Write, Blocked),
                (ReadOnly, Read, Execute),
                (ReadOnly, Write, Blocked),
                (Supervised, Read, Execute),
                (Supervised, Write, QueueApproval),
                (Autonomous, Read, Execute),
                (Autonomous, Write, Execute),
            ];
            for (level, kind, outcome) in expected {
                assert_eq!(
                    GateOutcome::for_level(level, kind),
                    outcome,
                    "{level} / {kind}"
                );
            }
        }

        #[tokio::test]
        async fn test_gate_matches_table_for_every_tier() {
            for level in AutonomyLevel::ALL {
                let h = harness();
                let gate = AutonomyGate::new(h.brake.clone(), counting(level));
                for kind in [ActionKind::Read, ActionKind::Write] {
                    assert_eq!(
                        gate.check("u1", kind).await.unwrap(),
                        GateOutcome::for_level(level, kind)
                    );
                }
            }
        }

        #[tokio::test]
        async fn test_brake_wins_without_resolving_tier() {
            let h = harness();
            let resolver = counting(AutonomyLevel::Autonomous);
            let gate = AutonomyGate::new(h.brake.clone(), resolver.clone());
            h.brake.activate("u1").await.unwrap();

            for kind in [ActionKind::Read, ActionKind::Write] {
                assert_eq!(gate.check("u1", kind).await.unwrap(), GateOutcome::Blocked);
            }
            assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);

            h.brake.resume("u1").await.unwrap();
            assert_eq!(
                gate.check("u1", ActionKind::Write).await.unwrap(),
                GateOutcome::Execute
            );
            assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn test_blocked_decision_errors() {
            let h = harness();
            let gate = AutonomyGate::new(h.brake.clone(), counting(AutonomyLevel::ReadOnly));

            let err = gate
                .decide("u1", ActionKind::Write)
                .await
                .unwrap()
                .into_result("u1", "apply", ActionKind::Write)
                .unwrap_err();
            match err {
                ScoutError::TierViolation {
                    action,
                    required,
                    current,
                } => {
                    assert_eq!(action, "apply");
                    assert_eq!(required, 2);
                    assert_eq!(current, 1);
                }
                other => panic!("expected TierViolation, got {other:?}"),
            }

            h.brake.activate("u1").await.unwrap();
            let err = gate
                .decide("u1", ActionKind::Read)
                .await
                .unwrap()
                .into_result("u1", "job_scout", ActionKind::Read)
                .unwrap_err();
            assert!(matches!(err, ScoutError::BrakeActive { .. }));
        }

        #[tokio::test]
        async fn test_preference_resolver_uses_stored_level_or_default() {
            let store = Arc::new(SqliteStore::open_in_memory().unwrap());
            let resolver = PreferenceTierResolver::new(store.clone(), Arc::new(NoCeiling));
            assert_eq!(resolver.resolve("u1").await.unwrap(), AutonomyLevel::ReadOnly);

            store.set_autonomy_level("u1", 3).await.unwrap();
            assert_eq!(resolver.resolve("u1").await.unwrap(), AutonomyLevel::Autonomous);

            let resolver = PreferenceTierResolver::new(store.clone(), Arc::new(NoCeiling))
                .with_default_level(AutonomyLevel::Suggest);
            assert_eq!(resolver.resolve("u2").await.unwrap(), AutonomyLevel::Suggest);
        }

        #[tokio::test]
        async fn test_org_ceiling_caps_preference() {
            let store = Arc::new(SqliteStore::open_in_memory().unwrap());
            store.set_autonomy_level("u1", 3).await.unwrap();
            let resolver = PreferenceTierResolver::new(
                store.clone(),
                Arc::new(FixedCeiling(AutonomyLevel::Supervised)),
            );
            assert_eq!(resolver.resolve("u1").await.unwrap(), AutonomyLevel::Supervised);

            let config = AutonomyConfig {
                default_level: 2,
                org_ceiling: Some(1),
            };
            let resolver = PreferenceTierResolver::from_config(store, &config);
            assert_eq!(resolver.resolve("u1").await.unwrap(), AutonomyLevel::ReadOnly);
            assert_eq!(resolver.resolve("u9").await.unwrap(), AutonomyLevel::ReadOnly);
        }
    }

    // ── Approval Queue ─────────────────────────────────────────

    mod approvals {
        use super::*;
        use chrono::Utc;
        use scout_autonomy::{ApprovalDecision, ApprovalQueue, BrakeState};
        use scout_core::{ApprovalStatus, PublishedEvent, QUEUED_FOR_APPROVAL, keys};

        fn approvals(h: &Harness) -> ApprovalQueue {
            ApprovalQueue::new(h.store.clone(), h.coord.clone())
        }

        async fn queue_apply(q: &ApprovalQueue, user: &str) -> scout_core::ApprovalItem {
            q.queue(
                user,
                "apply",
                "submit_application",
                serde_json::json!({ "job_id": "123" }),
                "strong match",
                0.8,
            )
            .await
            .unwrap()
            .0
        }

        #[tokio::test]
        async fn test_queued_item_shape() {
            let h = harness();
            let q = approvals(&h);
            let before = Utc::now();
            let (item, output) = q
                .queue(
                    "u1",
                    "apply",
                    "submit_application",
                    serde_json::json!({ "job_id": "123" }),
                    "strong match",
                    0.8,
                )
                .await
                .unwrap();

            assert_eq!(item.status, ApprovalStatus::Pending);
            assert!(item.expires_at > Utc::now());
            let window = item.expires_at - before;
            assert!(window >= chrono::Duration::hours(48));
            assert!(window < chrono::Duration::hours(48) + chrono::Duration::minutes(1));
            assert_eq!(item.payload["job_id"], "123");

            assert_eq!(output.action, QUEUED_FOR_APPROVAL);
            assert!(output.requires_approval);
            assert_eq!(output.confidence, 1.0);
            assert_eq!(output.data["approval_id"], item.id.to_string());

            let stored = q.get(item.id).await.unwrap().unwrap();
            assert_eq!(stored.id, item.id);
            assert_eq!(stored.status, ApprovalStatus::Pending);
            assert_eq!(stored.agent_type, "apply");
            assert_eq!(stored.action, "submit_application");
        }

        #[tokio::test]
        async fn test_oversized_expiry_is_capped() {
            let h = harness();
            let config = scout_config::ApprovalConfig {
                expiry_hours: u64::MAX,
                ..Default::default()
            };
            let q = approvals(&h).with_config(&config);
            let before = Utc::now();
            let item = queue_apply(&q, "u1").await;

            let cap = chrono::Duration::hours(scout_config::MAX_EXPIRY_HOURS as i64);
            let window = item.expires_at - before;
            assert!(window >= cap);
            assert!(window < cap + chrono::Duration::minutes(1));

            let q = approvals(&h).with_expiry(chrono::Duration::weeks(100_000));
            let item = queue_apply(&q, "u1").await;
            assert!(item.expires_at - before < cap + chrono::Duration::minutes(1));
        }

        #[tokio::test]
        async fn test_queue_publishes_new_approval() {
            let h = harness();
            let mut rx = h.coord.subscribe(&keys::events_channel("u1"));
            let item = queue_apply(&approvals(&h), "u1").await;

            let event: PublishedEvent = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
            assert_eq!(event.event_type, "approval.new");
            assert_eq!(event.data["approval_id"], item.id.to_string());
        }

        #[tokio::test]
        async fn test_queue_survives_publish_failure() {
            let h = harness();
            let q = ApprovalQueue::new(h.store.clone(), Arc::new(DownCoord));
            let (item, _) = q
                .queue("u1", "apply", "submit", Value::Null, "", 0.5)
                .await
                .unwrap();
            assert!(q.get(item.id).await.unwrap().is_some());
        }

        #[tokio::test]
        async fn test_approve_with_edited_payload() {
            let h = harness();
            let q = approvals(&h);
            let item = queue_apply(&q, "u1").await;

            let resolved = q
                .resolve(
                    item.id,
                    ApprovalDecision::approve_edited(serde_json::json!({ "job_id": "999" })),
                )
                .await
                .unwrap();
            assert_eq!(resolved.status, ApprovalStatus::Approved);
            assert_eq!(resolved.payload["job_id"], "999");
            assert!(resolved.decided_at.is_some());
        }

        #[tokio::test]
        async fn test_reject_keeps_payload_and_is_terminal() {
            let h = harness();
            let q = approvals(&h);
            let item = queue_apply(&q, "u1").await;

            let resolved = q.resolve(item.id, ApprovalDecision::Reject).await.unwrap();
            assert_eq!(resolved.status, ApprovalStatus::Rejected);
            assert_eq!(resolved.payload["job_id"], "123");

            let err = q
                .resolve(item.id, ApprovalDecision::approve())
                .await
                .unwrap_err();
            assert!(matches!(err, ScoutError::InvalidTransition { .. }));
        }

        #[tokio::test]
        async fn test_resolve_unknown_item() {
            let h = harness();
            let id = uuid::Uuid::new_v4();
            let err = approvals(&h)
                .resolve(id, ApprovalDecision::Reject)
                .await
                .unwrap_err();
            assert!(matches!(err, ScoutError::ApprovalNotFound(missing) if missing == id));
        }

        #[tokio::test]
        async fn test_brake_pauses_pending_then_resume_keeps_paused() {
            let h = harness();
            let q = approvals(&h);
            let item = queue_apply(&q, "u1").await;
            let other = queue_apply(&q, "u2").await;

            h.brake.activate("u1").await.unwrap();
            assert!(h.brake.check("u1").await);
            let snapshot = h.brake.verify_completion("u1").await.unwrap();
            assert_eq!(snapshot.state, BrakeState::Paused);
            assert_eq!(snapshot.paused_tasks_count, 1);

            assert_eq!(
                q.get(item.id).await.unwrap().unwrap().status,
                ApprovalStatus::Paused
            );
            assert_eq!(
                q.get(other.id).await.unwrap().unwrap().status,
                ApprovalStatus::Pending
            );

            h.brake.resume("u1").await.unwrap();
            assert!(!h.brake.check("u1").await);
            assert_eq!(
                h.brake.get_state("u1").await.unwrap().state,
                BrakeState::Running
            );
            let paused = q.list_paused("u1").await.unwrap();
            assert_eq!(paused.len(), 1);
            assert_eq!(paused[0].id, item.id);
            assert!(q.list_pending("u1").await.unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_paused_item_cannot_be_resolved_while_braked() {
            let h = harness();
            let q = approvals(&h);
            let item = queue_apply(&q, "u1").await;
            h.brake.activate("u1").await.unwrap();
            h.brake.verify_completion("u1").await.unwrap();

            let err = q
                .resolve(item.id, ApprovalDecision::approve())
                .await
                .unwrap_err();
            assert!(matches!(err, ScoutError::BrakeActive { .. }));

            h.brake.resume("u1").await.unwrap();
            let resolved = q.resolve(item.id, ApprovalDecision::approve()).await.unwrap();
            assert_eq!(resolved.status, ApprovalStatus::Approved);
        }

        #[tokio::test]
        async fn test_sweep_expires_only_overdue_pending() {
            let h = harness();
            let overdue_queue = approvals(&h).with_expiry(chrono::Duration::seconds(-1));
            let q = approvals(&h);

            let parked = queue_apply(&overdue_queue, "u1").await;
            h.brake.activate("u1").await.unwrap();
            h.brake.verify_completion("u1").await.unwrap();
            h.brake.resume("u1").await.unwrap();

            let overdue = queue_apply(&overdue_queue, "u1").await;
            let fresh = queue_apply(&q, "u1").await;
            let decided = queue_apply(&overdue_queue, "u2").await;
            q.resolve(decided.id, ApprovalDecision::Reject).await.unwrap();

            assert_eq!(q.expire_stale(Utc::now()).await.unwrap(), 1);

            let status = |id| {
                let q = &q;
                async move { q.get(id).await.unwrap().unwrap().status }
            };
            assert_eq!(status(overdue.id).await, ApprovalStatus::Expired);
            assert_eq!(status(fresh.id).await, ApprovalStatus::Pending);
            assert_eq!(status(parked.id).await, ApprovalStatus::Paused);
            assert_eq!(status(decided.id).await, ApprovalStatus::Rejected);

            // Expired items stay queryable for audit.
            assert!(q.get(overdue.id).await.unwrap().is_some());
        }

        #[tokio::test]
        async fn test_resolution_publishes_outcome() {
            let h = harness();
            let q = approvals(&h);
            let item = queue_apply(&q, "u1").await;
            let mut rx = h.coord.subscribe(&keys::events_channel("u1"));

            q.resolve(item.id, ApprovalDecision::approve()).await.unwrap();
            let event: PublishedEvent = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
            assert_eq!(event.event_type, "approval.approved");
        }
    }
}
