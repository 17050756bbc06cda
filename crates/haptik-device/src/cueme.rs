//! Worked adapter for the Cueme device family.
//!
//! The Cueme wire protocol is a single byte per update: the active feature's
//! speed quantized to 0-15 in the low nibble and, when non-zero, the 1-based
//! active feature index in the high nibble. Multi-feature devices are driven
//! by re-emitting this byte on a fixed interval while rotating the active
//! feature round-robin.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use haptik_proto::{Message, MessageId, MessageKind, VibrateSubcommand};
use tokio::sync::{broadcast, Mutex};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::adapter::{MessagePrecondition, ProtocolAdapter};
use crate::descriptor::{DescriptorTable, FeatureDescriptor};
use crate::error::{DeviceError, Result};
use crate::transport::DeviceTransport;

/// Interval between periodic state re-emissions.
pub const UPDATE_INTERVAL: Duration = Duration::from_millis(500);

/// Speed deltas below this are treated as unchanged.
const SPEED_EPSILON: f64 = 0.001;

/// Quantization range for the output byte's low nibble.
const SPEED_STEPS: f64 = 15.0;

/// Protocol adapter for one connected Cueme device.
pub struct CuemeAdapter {
    accepted: HashMap<MessageKind, MessagePrecondition>,
    shared: Arc<Shared>,
}

struct Shared {
    descriptor: FeatureDescriptor,
    transport: Arc<dyn DeviceTransport>,
    /// Root cancellation scope; cancelled on device removal or teardown.
    scope: CancellationToken,
    interval: Duration,
    state: Mutex<VibeState>,
}

/// Mutable per-device state. Guarded by the adapter's mutex so that command
/// handling and the periodic task never run concurrently for one device.
struct VibeState {
    speeds: Vec<f64>,
    active_index: usize,
    /// Cancellation token of the armed periodic task, if any.
    task: Option<CancellationToken>,
    /// Whether any vibration command has produced output this lifetime.
    vibration_sent: bool,
}

impl VibeState {
    fn armed(&self) -> bool {
        self.task.is_some()
    }

    fn all_stopped(&self) -> bool {
        self.speeds.iter().all(|speed| *speed == 0.0)
    }

    fn disarm(&mut self) {
        if let Some(task) = self.task.take() {
            task.cancel();
        }
    }

    /// Single-byte Cueme encoding of the active feature.
    fn encode_output(&self) -> u8 {
        let speed = self.speeds[self.active_index].clamp(0.0, 1.0);
        let quantized = (speed * SPEED_STEPS) as u8;
        if quantized == 0 {
            return 0;
        }
        quantized | ((self.active_index as u8 + 1) << 4)
    }

    /// Rotate to the next feature with non-zero speed, scanning forward
    /// circularly. The starting index itself is checked last; if no other
    /// feature is active there is nothing to rotate through and the task
    /// disarms.
    fn advance_active_index(&mut self) {
        let len = self.speeds.len();
        for offset in 1..len {
            let index = (self.active_index + offset) % len;
            if self.speeds[index] != 0.0 {
                self.active_index = index;
                return;
            }
        }
        self.disarm();
    }
}

impl CuemeAdapter {
    /// Construct an adapter for `device_name`, resolving its feature
    /// descriptor from the family table.
    ///
    /// Must be called within a tokio runtime; the adapter spawns a watcher
    /// for the transport's device-removed notification.
    pub fn new(
        device_name: &str,
        transport: Arc<dyn DeviceTransport>,
        table: &DescriptorTable,
    ) -> Self {
        Self::with_interval(device_name, transport, table, UPDATE_INTERVAL)
    }

    /// Like [`CuemeAdapter::new`] with an explicit update interval.
    pub fn with_interval(
        device_name: &str,
        transport: Arc<dyn DeviceTransport>,
        table: &DescriptorTable,
        interval: Duration,
    ) -> Self {
        let descriptor = table.resolve(device_name);
        let feature_count = descriptor.feature_count;

        let mut accepted = HashMap::new();
        accepted.insert(MessageKind::StopDeviceCmd, MessagePrecondition::default());
        accepted.insert(
            MessageKind::SingleMotorVibrateCmd,
            MessagePrecondition::default(),
        );
        accepted.insert(
            MessageKind::VibrateCmd,
            MessagePrecondition::with_feature_count(feature_count),
        );

        let removed = transport.subscribe_removed();
        let shared = Arc::new(Shared {
            descriptor,
            transport,
            scope: CancellationToken::new(),
            interval,
            state: Mutex::new(VibeState {
                speeds: vec![0.0; feature_count],
                active_index: 0,
                task: None,
                vibration_sent: false,
            }),
        });
        spawn_removal_watcher(Arc::clone(&shared), removed);

        Self { accepted, shared }
    }

    /// Apply a vibrate command: validate, diff against current state, commit,
    /// run one update step synchronously, and arm the periodic task.
    async fn vibrate(&self, id: MessageId, entries: &[VibrateSubcommand]) -> Result<Message> {
        let shared = &self.shared;
        let feature_count = shared.descriptor.feature_count;

        for entry in entries {
            if entry.index as usize >= feature_count {
                return Err(DeviceError::InvalidCommand(format!(
                    "feature index {} out of range for {} ({} features)",
                    entry.index, shared.descriptor.display_name, feature_count
                )));
            }
        }

        let mut state = shared.state.lock().await;

        let mut candidate = state.speeds.clone();
        for entry in entries {
            let index = entry.index as usize;
            // Deltas below epsilon are not worth a write; leave the current
            // value in place.
            if (entry.speed - candidate[index]).abs() < SPEED_EPSILON {
                continue;
            }
            candidate[index] = entry.speed;
        }

        if candidate == state.speeds && state.vibration_sent {
            // Nothing changed and output has already been produced.
            return Ok(Message::ok(id));
        }

        state.speeds = candidate;
        state.vibration_sent = true;

        // First write happens now rather than waiting out the interval.
        let healthy = shared.update_step(&mut state).await;
        if healthy && !state.all_stopped() && !state.armed() {
            shared.arm(&mut state);
        }

        Ok(Message::ok(id))
    }
}

#[async_trait]
impl ProtocolAdapter for CuemeAdapter {
    fn display_name(&self) -> &str {
        &self.shared.descriptor.display_name
    }

    fn accepted_messages(&self) -> &HashMap<MessageKind, MessagePrecondition> {
        &self.accepted
    }

    async fn handle_message(&self, message: &Message) -> Result<Message> {
        let feature_count = self.shared.descriptor.feature_count;
        match message {
            Message::VibrateCmd { id, speeds, .. } => self.vibrate(*id, speeds).await,
            // Defined as a VibrateCmd applied uniformly to all features.
            Message::SingleMotorVibrateCmd { id, speed, .. } => {
                let speeds: Vec<_> = (0..feature_count)
                    .map(|index| VibrateSubcommand::new(index as u32, *speed))
                    .collect();
                self.vibrate(*id, &speeds).await
            }
            // Defined as a VibrateCmd with all speeds zero.
            Message::StopDeviceCmd { id, .. } => {
                let speeds: Vec<_> = (0..feature_count)
                    .map(|index| VibrateSubcommand::new(index as u32, 0.0))
                    .collect();
                self.vibrate(*id, &speeds).await
            }
            other => Err(DeviceError::UnsupportedMessage(other.kind())),
        }
    }

    fn teardown(&self) {
        self.shared.scope.cancel();
    }
}

impl Shared {
    /// One iteration of the periodic update: emit the current state or wind
    /// the task down. Returns false if the transport write failed.
    async fn update_step(&self, state: &mut VibeState) -> bool {
        if state.all_stopped() {
            // Restart the round-robin from feature 0 on the next command.
            state.active_index = 0;
            state.disarm();
            return true;
        }

        let byte = state.encode_output();
        if let Err(err) = self.transport.write(&[byte], &self.scope).await {
            warn!(
                device = %self.descriptor.display_name,
                error = %err,
                "periodic write failed, disarming update task"
            );
            state.disarm();
            return false;
        }

        if state.armed() {
            state.advance_active_index();
        }
        true
    }

    /// Spawn the periodic update task under a child token of the adapter
    /// scope. Disarming cancels only the child; the scope stays live.
    fn arm(self: &Arc<Self>, state: &mut VibeState) {
        let token = self.scope.child_token();
        state.task = Some(token.clone());

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(shared.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately; the arming command has
            // already written once.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let mut state = shared.state.lock().await;
                        // A disarm may have raced the tick; never act as a
                        // stale task.
                        if token.is_cancelled() {
                            break;
                        }
                        shared.update_step(&mut state).await;
                        if !state.armed() {
                            break;
                        }
                    }
                }
            }
        });
    }
}

/// Watch for the transport's removal notification: disarm the periodic task
/// and cancel the adapter scope on first delivery. The subscription is held
/// by this task alone, so dropping the receiver deregisters it exactly once;
/// later notifications are never observed.
fn spawn_removal_watcher(shared: Arc<Shared>, mut removed: broadcast::Receiver<()>) {
    tokio::spawn(async move {
        tokio::select! {
            _ = shared.scope.cancelled() => {}
            received = removed.recv() => {
                if received.is_ok() {
                    debug!(
                        device = %shared.descriptor.display_name,
                        "device removed, stopping adapter"
                    );
                    let mut state = shared.state.lock().await;
                    state.disarm();
                    shared.scope.cancel();
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::MockTransport;

    fn vibrate_msg(id: MessageId, entries: &[(u32, f64)]) -> Message {
        Message::VibrateCmd {
            id,
            device_index: 0,
            speeds: entries
                .iter()
                .map(|(index, speed)| VibrateSubcommand::new(*index, *speed))
                .collect(),
        }
    }

    /// Four-feature sleeve with the default 500 ms interval.
    fn sleeve(transport: Arc<MockTransport>) -> CuemeAdapter {
        CuemeAdapter::new("Cueme_2", transport, &DescriptorTable::cueme())
    }

    async fn settle(ticks: u32) {
        tokio::time::sleep(Duration::from_millis(u64::from(ticks) * 500 + 100)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_write_then_single_feature_short_circuit() {
        let transport = Arc::new(MockTransport::new());
        let adapter = sleeve(Arc::clone(&transport));

        let reply = adapter
            .handle_message(&vibrate_msg(1, &[(0, 0.5)]))
            .await
            .expect("command should succeed");
        assert_eq!(reply, Message::ok(1));

        // 0.5 * 15 = 7, feature 1 in the high nibble.
        assert_eq!(transport.writes(), vec![vec![0x17]]);

        // Only one feature is active: the first tick re-emits once, then the
        // rotation finds no other non-zero feature and the task disarms.
        settle(1).await;
        assert_eq!(transport.writes(), vec![vec![0x17], vec![0x17]]);

        settle(4).await;
        assert_eq!(transport.write_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn two_active_features_alternate_skipping_zeroed_ones() {
        let transport = Arc::new(MockTransport::new());
        let adapter = sleeve(Arc::clone(&transport));

        adapter
            .handle_message(&vibrate_msg(1, &[(0, 0.5), (2, 0.5)]))
            .await
            .expect("command should succeed");

        settle(4).await;
        let writes = transport.writes();
        assert!(writes.len() >= 4);
        // High nibble is the 1-based active index: only features 0 and 2
        // (nibbles 1 and 3) ever appear; 1 and 3 are zero-valued and skipped.
        let nibbles: Vec<u8> = writes.iter().map(|w| w[0] >> 4).collect();
        assert!(nibbles.iter().all(|n| *n == 1 || *n == 3));
        // Strict alternation after the immediate write.
        for pair in nibbles[1..].windows(2) {
            assert_ne!(pair[0], pair[1], "rotation should alternate: {nibbles:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_identical_command_is_a_no_op() {
        let transport = Arc::new(MockTransport::new());
        let adapter = CuemeAdapter::with_interval(
            "Cueme_2",
            Arc::clone(&transport) as Arc<dyn DeviceTransport>,
            &DescriptorTable::cueme(),
            // Long interval so no tick interferes with the count.
            Duration::from_secs(3600),
        );

        adapter
            .handle_message(&vibrate_msg(1, &[(0, 0.5)]))
            .await
            .expect("first command should succeed");
        assert_eq!(transport.write_count(), 1);

        let reply = adapter
            .handle_message(&vibrate_msg(2, &[(0, 0.5)]))
            .await
            .expect("repeat should succeed");
        assert_eq!(reply, Message::ok(2));
        assert_eq!(transport.write_count(), 1, "no-op must not write");
    }

    #[tokio::test(start_paused = true)]
    async fn sub_epsilon_delta_is_treated_as_unchanged() {
        let transport = Arc::new(MockTransport::new());
        let adapter = CuemeAdapter::with_interval(
            "Cueme_2",
            Arc::clone(&transport) as Arc<dyn DeviceTransport>,
            &DescriptorTable::cueme(),
            Duration::from_secs(3600),
        );

        adapter
            .handle_message(&vibrate_msg(1, &[(0, 0.5)]))
            .await
            .expect("command should succeed");
        adapter
            .handle_message(&vibrate_msg(2, &[(0, 0.5004)]))
            .await
            .expect("command should succeed");
        assert_eq!(transport.write_count(), 1);

        adapter
            .handle_message(&vibrate_msg(3, &[(0, 0.6)]))
            .await
            .expect("command should succeed");
        assert_eq!(transport.write_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_disarms_and_resets_round_robin_phase() {
        let transport = Arc::new(MockTransport::new());
        let adapter = sleeve(Arc::clone(&transport));

        adapter
            .handle_message(&vibrate_msg(1, &[(0, 0.5), (2, 0.5)]))
            .await
            .expect("command should succeed");
        settle(2).await;

        adapter
            .handle_message(&Message::StopDeviceCmd {
                id: 2,
                device_index: 0,
            })
            .await
            .expect("stop should succeed");
        let frozen = transport.write_count();

        // No further writes once the stop interval elapses.
        settle(4).await;
        assert_eq!(transport.write_count(), frozen);

        // Round-robin restarted from feature 0: the next command's immediate
        // write addresses feature 0, not whichever feature was active before.
        adapter
            .handle_message(&vibrate_msg(3, &[(0, 1.0)]))
            .await
            .expect("command should succeed");
        let writes = transport.writes();
        assert_eq!(writes[frozen], vec![0x1F]);
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_range_feature_index_is_rejected_without_mutation() {
        let transport = Arc::new(MockTransport::new());
        let adapter = sleeve(Arc::clone(&transport));

        let err = adapter
            .handle_message(&vibrate_msg(1, &[(7, 0.5)]))
            .await
            .expect_err("out-of-range index should fail");
        assert!(matches!(err, DeviceError::InvalidCommand(_)));
        assert_eq!(transport.write_count(), 0);

        settle(2).await;
        assert_eq!(transport.write_count(), 0, "rejected command must not arm");
    }

    #[tokio::test(start_paused = true)]
    async fn write_failure_during_tick_disarms_the_task() {
        let transport = Arc::new(MockTransport::new());
        let adapter = sleeve(Arc::clone(&transport));

        adapter
            .handle_message(&vibrate_msg(1, &[(0, 0.5), (2, 0.5)]))
            .await
            .expect("command should succeed");
        settle(1).await;
        let before = transport.write_count();

        transport.fail_next_write();
        settle(1).await;
        // The failed tick produced no recorded write and stopped the task.
        settle(4).await;
        assert_eq!(transport.write_count(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn device_removal_cancels_the_periodic_task() {
        let transport = Arc::new(MockTransport::new());
        let adapter = sleeve(Arc::clone(&transport));

        adapter
            .handle_message(&vibrate_msg(1, &[(0, 0.5), (2, 0.5)]))
            .await
            .expect("command should succeed");

        transport.remove();
        // Duplicate notifications must be tolerated.
        transport.remove();
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        let frozen = transport.write_count();
        settle(4).await;
        assert_eq!(transport.write_count(), frozen);
        let _ = adapter;
    }

    #[tokio::test(start_paused = true)]
    async fn single_motor_command_applies_to_all_features() {
        let transport = Arc::new(MockTransport::new());
        // Two-feature band.
        let adapter = CuemeAdapter::new(
            "Cueme_1",
            Arc::clone(&transport) as Arc<dyn DeviceTransport>,
            &DescriptorTable::cueme(),
        );

        adapter
            .handle_message(&Message::SingleMotorVibrateCmd {
                id: 1,
                device_index: 0,
                speed: 1.0,
            })
            .await
            .expect("command should succeed");

        settle(2).await;
        let nibbles: Vec<u8> = transport.writes().iter().map(|w| w[0] >> 4).collect();
        assert!(nibbles.contains(&1) && nibbles.contains(&2));
        assert!(transport.writes().iter().all(|w| w[0] & 0x0F == 0x0F));
    }

    #[tokio::test(start_paused = true)]
    async fn unsupported_message_kind_is_refused() {
        let transport = Arc::new(MockTransport::new());
        let adapter = sleeve(transport);

        let err = adapter
            .handle_message(&Message::Ping { id: 1 })
            .await
            .expect_err("ping is not a device command");
        assert!(matches!(
            err,
            DeviceError::UnsupportedMessage(MessageKind::Ping)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn registers_vibrate_arity_precondition() {
        let transport = Arc::new(MockTransport::new());
        let adapter = sleeve(transport);

        let accepted = adapter.accepted_messages();
        assert_eq!(
            accepted.get(&MessageKind::VibrateCmd),
            Some(&MessagePrecondition::with_feature_count(4))
        );
        assert_eq!(
            accepted.get(&MessageKind::StopDeviceCmd),
            Some(&MessagePrecondition::default())
        );
        assert!(!accepted.contains_key(&MessageKind::Ping));
    }
}
