//! rendergrid-result — the binary result channel.
//!
//! A pool's coordinator returns the finished artifact over a plain TCP
//! connection carrying exactly one length-prefixed frame:
//!
//! ```text
//! [4-byte BE u32 id_len][id_len bytes UTF-8 task id]
//! [4-byte BE u32 payload_len][payload_len bytes payload]
//! ```
//!
//! Each accepted connection is handled on its own task, so one stalled
//! sender cannot block the rest. After a full frame the task's result
//! binding decides the destination: keep the blob in the store for pickup,
//! or POST it to a callback URL (one attempt, bounded timeout). Partial
//! frames abort the connection without touching any binding.

pub mod callback;
pub mod channel;
pub mod protocol;

pub use callback::deliver_callback;
pub use channel::{ResultChannel, ResultChannelConfig};
pub use protocol::{read_frame, send_artifact, write_frame, Frame, FrameError};
