//! Control events multiplexed with data buffers on every shuffle channel
//! ("Events carry control (EndOfPartition, CheckpointBarrier,
//! CancelCheckpointMarker, watermarks, etc.)").

use conduit_core::ids::CheckpointId;
use serde::{Deserialize, Serialize};

/// Whether this checkpoint barrier requires the receiver to align with
/// barriers from other channels before snapshotting.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum CheckpointType {
    Aligned,
    Unaligned,
    AtLeastOnce,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckpointOptions {
    pub checkpoint_type: CheckpointType,
}

/// Control events a channel may carry in place of a data buffer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ChannelEvent {
    /// No further buffers will arrive on this subpartition.
    EndOfPartition,
    /// Injected by a source before continuing to emit records past the
    /// checkpointed point; forwarded by every downstream task once its
    /// local snapshot (or unaligned spill) completes.
    CheckpointBarrier {
        checkpoint_id: CheckpointId,
        timestamp: u64,
        options: CheckpointOptions,
    },
    /// Broadcast downstream when a checkpoint is declined or times out, so
    /// tasks that already started aligning can abandon it.
    CancelCheckpointMarker(CheckpointId),
    /// Event-time progress marker; routed through operators like a record
    /// but never held back by barrier alignment.
    Watermark(u64),
}

/// What an input gate/channel produces on each poll: either a data buffer
/// or a control event, tagged with the originating channel's global index
/// ("UnionInputGate ... indexing is offset-based").
#[derive(Debug)]
pub enum BufferOrEvent {
    Buffer {
        channel_index: usize,
        buffer: crate::buffer::Buffer,
    },
    Event {
        channel_index: usize,
        event: ChannelEvent,
    },
}

impl BufferOrEvent {
    pub fn channel_index(&self) -> usize {
        match self {
            BufferOrEvent::Buffer { channel_index, .. } => *channel_index,
            BufferOrEvent::Event { channel_index, .. } => *channel_index,
        }
    }

    pub fn is_end_of_partition(&self) -> bool {
        matches!(
            self,
            BufferOrEvent::Event {
                event: ChannelEvent::EndOfPartition,
                ..
            }
        )
    }
}
