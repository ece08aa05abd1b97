//! Coordinator/worker wire protocol
//!
//! Workers talk to the coordinator over a persistent TCP connection using
//! length-prefixed MessagePack (rmp-serde) frames.
//!
//! # Protocol Version
//!
//! Current version: 1
//!
//! # Message Flow
//!
//! ```text
//! Worker                          Coordinator
//!     |                              |
//!     |-------- HELLO -------------->|
//!     |<------- WELCOME -------------|
//!     |                              |
//!     |-------- GIVE_TASK ---------->|   (blocks until a sub-task is queued)
//!     |<------- TASK ----------------|
//!     |                              |
//!     |-------- GET_RESULT --------->|
//!     |<------- RESULT_ACK ----------|
//! ```
//!
//! # Message Framing
//!
//! Each message is prefixed with a 4-byte length field (little-endian u32):
//!
//! ```text
//! [4 bytes: message length][N bytes: MessagePack-serialized message]
//! ```

use crate::postfix::Operator;
use crate::task::{ComputeError, RoundTag, SubTask, TaskOutcome};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol version
///
/// Coordinator and workers must have matching protocol versions.
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest frame either side accepts
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Protocol message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// Handshake (Worker → Coordinator)
    Hello(HelloMessage),

    /// Handshake accepted (Coordinator → Worker)
    Welcome(WelcomeMessage),

    /// Ask for the next sub-task (Worker → Coordinator)
    ///
    /// The coordinator answers only once a sub-task is queued.
    GiveTask(TaskRequest),

    /// Sub-task to compute (Coordinator → Worker)
    Task(TaskResponse),

    /// Report a computed result (Worker → Coordinator)
    GetResult(ResultRequest),

    /// Result queued (Coordinator → Worker)
    ResultAck(ResultResponse),

    /// Error message (either direction)
    Error(ErrorMessage),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloMessage {
    pub protocol_version: u32,
    pub worker_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WelcomeMessage {
    pub protocol_version: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskRequest {}

/// A sub-task on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResponse {
    pub id: i64,
    pub arg1: f64,
    pub arg2: f64,
    pub operation: String,

    /// Round tag, echoed back in the result
    pub expression_id: i64,
    pub round: u32,
}

/// A computed result on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRequest {
    pub id: i64,
    pub result: f64,

    /// Classified compute failure; `result` is meaningless when set
    #[serde(default)]
    pub error: Option<ComputeError>,

    pub expression_id: i64,
    pub round: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultResponse {}

/// Error message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Sender identifier (worker id or "coordinator")
    pub sender: String,

    /// Error description
    pub error: String,
}

impl TaskResponse {
    pub fn tag(&self) -> RoundTag {
        RoundTag::new(self.expression_id, self.round)
    }
}

impl From<&SubTask> for TaskResponse {
    fn from(task: &SubTask) -> Self {
        Self {
            id: task.id,
            arg1: task.operand1,
            arg2: task.operand2,
            operation: task.operator.symbol().to_string(),
            expression_id: task.tag.expression_id,
            round: task.tag.round,
        }
    }
}

impl TryFrom<TaskResponse> for SubTask {
    type Error = ComputeError;

    fn try_from(resp: TaskResponse) -> std::result::Result<Self, ComputeError> {
        let operator: Operator = resp.operation.parse()?;
        Ok(SubTask {
            id: resp.id,
            tag: resp.tag(),
            operand1: resp.arg1,
            operand2: resp.arg2,
            operator,
        })
    }
}

impl ResultRequest {
    /// Build the wire form of a computed (or failed) sub-task
    pub fn new(id: i64, tag: RoundTag, value: std::result::Result<f64, ComputeError>) -> Self {
        let (result, error) = match value {
            Ok(v) => (v, None),
            Err(e) => (0.0, Some(e)),
        };
        Self {
            id,
            result,
            error,
            expression_id: tag.expression_id,
            round: tag.round,
        }
    }
}

impl From<ResultRequest> for TaskOutcome {
    fn from(req: ResultRequest) -> Self {
        let tag = RoundTag::new(req.expression_id, req.round);
        let value = match req.error {
            Some(err) => Err(err),
            None => Ok(req.result),
        };
        TaskOutcome { id: req.id, tag, value }
    }
}

/// Serialize a message to bytes
///
/// Prepends a 4-byte length field for framing.
pub fn serialize_message(msg: &Message) -> Result<Vec<u8>> {
    let msg_bytes = rmp_serde::to_vec(msg)
        .context("Failed to serialize message")?;

    let msg_len = msg_bytes.len() as u32;
    let mut framed = Vec::with_capacity(4 + msg_bytes.len());
    framed.extend_from_slice(&msg_len.to_le_bytes());
    framed.extend_from_slice(&msg_bytes);

    Ok(framed)
}

/// Read a complete message from a stream
pub async fn read_message<R>(stream: &mut R) -> Result<Message>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await
        .context("Failed to read message length")?;

    let msg_len = u32::from_le_bytes(len_buf) as usize;
    if msg_len > MAX_FRAME_LEN {
        anyhow::bail!("Message too large: {} bytes (max {})", msg_len, MAX_FRAME_LEN);
    }

    let mut msg_buf = vec![0u8; msg_len];
    stream.read_exact(&mut msg_buf).await
        .context("Failed to read message body")?;

    let msg = rmp_serde::from_slice(&msg_buf)
        .context("Failed to deserialize message")?;

    Ok(msg)
}

/// Write a message to a stream and flush it
pub async fn write_message<W>(stream: &mut W, msg: &Message) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let framed = serialize_message(msg)?;

    stream.write_all(&framed).await
        .context("Failed to write message")?;
    stream.flush().await
        .context("Failed to flush stream")?;

    Ok(())
}
