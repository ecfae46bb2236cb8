//! InputGate / InputChannel / UnionInputGate. Consumer side of the
//! shuffle: an InputGate owns M channels (local or remote), and a
//! UnionInputGate flattens several gates into one flat channel-index space
//! for fan-in operators, with fairness via a FIFO queue of gates-with-data.

use crate::result_partition::ResultSubpartition;
use conduit_core::ids::CheckpointId;
use conduit_runtime::events::{BufferOrEvent, ChannelEvent, CheckpointOptions, CheckpointType};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

/// One input channel: either reads a local producer's subpartition
/// directly, or (conceptually) a remote one over a credit-flow-controlled
/// connection. Remote delivery itself is an external-transport concern;
/// this crate models only the channel's consumption contract.
pub enum InputChannel {
    Local { subpartition: Arc<ResultSubpartition> },
    Remote { inbox: Arc<Mutex<VecDeque<BufferOrEvent>>> },
}

impl InputChannel {
    pub async fn poll_next(&self) -> Option<BufferOrEvent> {
        match self {
            InputChannel::Local { subpartition } => subpartition.poll_next().await,
            InputChannel::Remote { inbox } => inbox.lock().await.pop_front(),
        }
    }
}

/// Tracks an in-flight `Aligned` barrier: which channels (by index, or by
/// child-gate index for `UnionInputGate`) have already delivered it.
struct AlignmentState {
    checkpoint_id: CheckpointId,
    timestamp: u64,
    options: CheckpointOptions,
    arrived: HashSet<usize>,
}

/// Owns M input channels and exposes a flat, fair poll across them.
/// Availability is communicated through a future that resolves when any
/// channel has data, modeled here as racing each channel's `poll_next`
/// future. In `Aligned` mode, once a channel delivers a checkpoint
/// barrier it is excluded from the race (its queued data is left right
/// where it is, effectively buffered for later replay) until every other
/// channel has delivered the same barrier, at which point the barrier is
/// surfaced to the caller exactly once and every channel resumes.
pub struct InputGate {
    channels: Vec<InputChannel>,
    alignment: Mutex<Option<AlignmentState>>,
}

impl InputGate {
    pub fn new(channels: Vec<InputChannel>) -> Self {
        Self {
            channels,
            alignment: Mutex::new(None),
        }
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// `poll_next() -> Option<BufferOrEvent>`. Returns `None`
    /// only once every channel has signaled EndOfPartition and gone
    /// silent; callers distinguish a real end-of-stream from "no data
    /// right now" by checking `is_end_of_partition()` on the returned
    /// item, not on `None`, since this gate blocks rather than polling
    /// spuriously.
    pub async fn poll_next(&self) -> Option<BufferOrEvent> {
        if self.channels.is_empty() {
            return None;
        }
        loop {
            let blocked: HashSet<usize> = self
                .alignment
                .lock()
                .await
                .as_ref()
                .map(|a| a.arrived.clone())
                .unwrap_or_default();

            let candidates: Vec<usize> = (0..self.channels.len()).filter(|i| !blocked.contains(i)).collect();
            if candidates.is_empty() {
                // Every channel already delivered the barrier; alignment
                // finalization below should have already cleared this on
                // the previous iteration, so this can't actually recur.
                return None;
            }

            let futures: Vec<_> = candidates
                .iter()
                .map(|&index| {
                    let fut = self.channels[index].poll_next();
                    Box::pin(async move { (index, fut.await) })
                })
                .collect();

            let (_pos, (channel_index, result)) = futures_select_first(futures).await;

            let Some(item) = result else {
                return None;
            };

            if let BufferOrEvent::Event {
                event:
                    ChannelEvent::CheckpointBarrier {
                        checkpoint_id,
                        timestamp,
                        options,
                    },
                ..
            } = &item
            {
                if options.checkpoint_type == CheckpointType::Aligned {
                    let mut guard = self.alignment.lock().await;
                    let state = guard.get_or_insert_with(|| AlignmentState {
                        checkpoint_id: *checkpoint_id,
                        timestamp: *timestamp,
                        options: options.clone(),
                        arrived: HashSet::new(),
                    });
                    state.arrived.insert(channel_index);

                    if state.arrived.len() < self.channels.len() {
                        // Still waiting on other channels; this channel is
                        // now excluded from the race until they catch up.
                        continue;
                    }

                    let checkpoint_id = state.checkpoint_id;
                    let timestamp = state.timestamp;
                    let options = state.options.clone();
                    *guard = None;
                    return Some(BufferOrEvent::Event {
                        channel_index,
                        event: ChannelEvent::CheckpointBarrier {
                            checkpoint_id,
                            timestamp,
                            options,
                        },
                    });
                }
            }

            return Some(tag_channel_index(item, channel_index));
        }
    }
}

fn tag_channel_index(item: BufferOrEvent, channel_index: usize) -> BufferOrEvent {
    match item {
        BufferOrEvent::Buffer { buffer, .. } => BufferOrEvent::Buffer { channel_index, buffer },
        BufferOrEvent::Event { event, .. } => BufferOrEvent::Event { channel_index, event },
    }
}

async fn futures_select_first<F>(futures: Vec<std::pin::Pin<Box<F>>>) -> (usize, F::Output)
where
    F: std::future::Future + Unpin,
{
    use futures::future::select_all;
    let (output, index, _rest) = select_all(futures).await;
    (index, output)
}

/// Flattens several InputGates into one flat channel-index space. Indexing
/// is offset-based so each child channel retains a unique global index.
/// Recursion is forbidden: a UnionInputGate may not itself contain another
/// UnionInputGate, enforced by construction since this type only accepts
/// plain `InputGate`s.
pub struct UnionInputGate {
    gates: Vec<InputGate>,
    offsets: Vec<usize>,
}

impl UnionInputGate {
    pub fn new(gates: Vec<InputGate>) -> Self {
        let mut offsets = Vec::with_capacity(gates.len());
        let mut running = 0;
        for gate in &gates {
            offsets.push(running);
            running += gate.num_channels();
        }
        Self { gates, offsets }
    }

    pub fn total_channels(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0) + self.gates.last().map(|g| g.num_channels()).unwrap_or(0)
    }

    /// FIFO-fair poll across child gates: races every gate's `poll_next`,
    /// then remaps the winning gate's local channel index to the global
    /// index space via its offset.
    pub async fn poll_next(&self) -> Option<BufferOrEvent> {
        if self.gates.is_empty() {
            return None;
        }
        let futures: Vec<_> = self
            .gates
            .iter()
            .enumerate()
            .map(|(gate_index, gate)| {
                let fut = gate.poll_next();
                Box::pin(async move { (gate_index, fut.await) })
            })
            .collect();

        let (_pos, (gate_index, result)) = futures_select_first(futures).await;
        result.map(|item| {
            let offset = self.offsets[gate_index];
            match item {
                BufferOrEvent::Buffer { channel_index, buffer } => BufferOrEvent::Buffer {
                    channel_index: channel_index + offset,
                    buffer,
                },
                BufferOrEvent::Event { channel_index, event } => BufferOrEvent::Event {
                    channel_index: channel_index + offset,
                    event,
                },
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use conduit_runtime::events::ChannelEvent;

    #[tokio::test]
    async fn local_channel_delivers_in_order() {
        let sp = Arc::new(ResultSubpartition::new(4));
        sp.add_unconditionally(BufferOrEvent::Event {
            channel_index: 0,
            event: ChannelEvent::Watermark(1),
        })
        .await;
        sp.add_unconditionally(BufferOrEvent::Event {
            channel_index: 0,
            event: ChannelEvent::Watermark(2),
        })
        .await;

        let gate = InputGate::new(vec![InputChannel::Local { subpartition: sp }]);
        let first = gate.poll_next().await.unwrap();
        let second = gate.poll_next().await.unwrap();
        assert!(matches!(
            first,
            BufferOrEvent::Event {
                event: ChannelEvent::Watermark(1),
                ..
            }
        ));
        assert!(matches!(
            second,
            BufferOrEvent::Event {
                event: ChannelEvent::Watermark(2),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn union_gate_offsets_channel_indices() {
        let sp_a = Arc::new(ResultSubpartition::new(4));
        let sp_b = Arc::new(ResultSubpartition::new(4));
        sp_b.add_unconditionally(BufferOrEvent::Event {
            channel_index: 0,
            event: ChannelEvent::Watermark(9),
        })
        .await;

        let gate_a = InputGate::new(vec![InputChannel::Local { subpartition: sp_a }]);
        let gate_b = InputGate::new(vec![InputChannel::Local { subpartition: sp_b }]);
        let union = UnionInputGate::new(vec![gate_a, gate_b]);

        assert_eq!(union.total_channels(), 2);
        let item = union.poll_next().await.unwrap();
        assert_eq!(item.channel_index(), 1); // gate_b's channel 0 offset by gate_a's width
    }

    fn aligned_barrier(checkpoint_id: conduit_core::ids::CheckpointId) -> BufferOrEvent {
        BufferOrEvent::Event {
            channel_index: 0,
            event: ChannelEvent::CheckpointBarrier {
                checkpoint_id,
                timestamp: 0,
                options: conduit_runtime::events::CheckpointOptions {
                    checkpoint_type: conduit_runtime::events::CheckpointType::Aligned,
                },
            },
        }
    }

    #[tokio::test]
    async fn aligned_barrier_blocks_fast_channel_until_slow_channel_catches_up() {
        let cid = conduit_core::ids::CheckpointId::first();

        let sp_a = Arc::new(ResultSubpartition::new(4));
        let sp_b = Arc::new(ResultSubpartition::new(4));

        // Channel A races ahead: its barrier, then a post-barrier record.
        sp_a.add_unconditionally(aligned_barrier(cid)).await;
        sp_a.add_unconditionally(BufferOrEvent::Event {
            channel_index: 0,
            event: ChannelEvent::Watermark(42),
        })
        .await;

        let gate = Arc::new(InputGate::new(vec![
            InputChannel::Local { subpartition: sp_a },
            InputChannel::Local { subpartition: sp_b.clone() },
        ]));

        let gate_clone = gate.clone();
        let first = tokio::spawn(async move { gate_clone.poll_next().await });

        // A is blocked on its own barrier; B's pre-barrier record must
        // still be delivered rather than stalling the whole gate.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        sp_b.add_unconditionally(BufferOrEvent::Event {
            channel_index: 0,
            event: ChannelEvent::Watermark(7),
        })
        .await;

        let first_item = first.await.unwrap().unwrap();
        assert!(
            matches!(
                first_item,
                BufferOrEvent::Event {
                    event: ChannelEvent::Watermark(7),
                    ..
                }
            ),
            "channel B's pre-barrier record must be delivered while A is blocked"
        );

        // Now B delivers the same barrier, completing alignment.
        sp_b.add_unconditionally(aligned_barrier(cid)).await;
        let second_item = gate.poll_next().await.unwrap();
        assert!(
            matches!(
                second_item,
                BufferOrEvent::Event {
                    event: ChannelEvent::CheckpointBarrier { .. },
                    ..
                }
            ),
            "the barrier surfaces exactly once, only after every channel has aligned"
        );

        // A's post-barrier record is released only now that both channels
        // have aligned — never ahead of B's barrier.
        let third_item = gate.poll_next().await.unwrap();
        assert!(matches!(
            third_item,
            BufferOrEvent::Event {
                event: ChannelEvent::Watermark(42),
                ..
            }
        ));
    }
}
