//! Coordinator task service
//!
//! Accepts worker connections and serves the two remote calls:
//!
//! - `GiveTask`: waits until a sub-task of the active round is queued, then
//!   returns it. There is no timeout; a worker that disconnects while waiting
//!   releases its wait without consuming a task.
//! - `GetResult`: hands the outcome to the scheduler and acknowledges at once.
//!
//! Each connection runs in its own task so a slow or stuck worker never holds
//! up the others.

use crate::distributed::protocol::*;
use crate::distributed::queue::ServiceQueues;
use crate::task::{SubTask, TaskOutcome};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, info, warn};

const SENDER: &str = "coordinator";

/// Task service
///
/// Bound listener plus the service half of the operation queues.
pub struct TaskService {
    listener: TcpListener,
    queues: ServiceQueues,
}

impl TaskService {
    /// Bind the service
    pub async fn bind<A: ToSocketAddrs>(addr: A, queues: ServiceQueues) -> Result<Self> {
        let listener = TcpListener::bind(addr).await
            .context("Failed to bind task service")?;

        Ok(Self { listener, queues })
    }

    /// Address the service is listening on
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr()
            .context("Failed to read task service address")
    }

    /// Accept workers until the task is dropped
    pub async fn run(self) -> Result<()> {
        info!(addr = %self.local_addr()?, "Task service listening");

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };

            let queues = self.queues.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer, queues).await {
                    warn!(%peer, error = %format!("{:#}", e), "Worker connection failed");
                }
            });
        }
    }
}

async fn handle_connection(mut stream: TcpStream, peer: SocketAddr, queues: ServiceQueues) -> Result<()> {
    let _ = stream.set_nodelay(true);

    let worker_id = match read_message(&mut stream).await? {
        Message::Hello(hello) => {
            if hello.protocol_version != PROTOCOL_VERSION {
                let err = format!(
                    "Protocol version mismatch: coordinator={}, worker={}",
                    PROTOCOL_VERSION, hello.protocol_version
                );
                send_error(&mut stream, &err).await?;
                anyhow::bail!(err);
            }
            write_message(&mut stream, &Message::Welcome(WelcomeMessage {
                protocol_version: PROTOCOL_VERSION,
            })).await?;
            hello.worker_id
        }
        other => {
            send_error(&mut stream, "Expected HELLO").await?;
            anyhow::bail!("Expected HELLO, got {:?}", other);
        }
    };

    info!(worker = %worker_id, %peer, "Worker connected");

    loop {
        let msg = match read_message(&mut stream).await {
            Ok(msg) => msg,
            Err(e) if is_disconnect(&e) => {
                info!(worker = %worker_id, "Worker disconnected");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        match msg {
            Message::GiveTask(_) => {
                let task = tokio::select! {
                    task = queues.take_task() => task,
                    _ = wait_for_disconnect(&stream) => {
                        info!(worker = %worker_id, "Worker left while waiting for a task");
                        return Ok(());
                    }
                };

                let Some(task) = task else {
                    send_error(&mut stream, "Task queue closed").await?;
                    return Ok(());
                };

                deliver_task(&mut stream, &worker_id, task, &queues).await?;
            }
            Message::GetResult(req) => {
                let outcome = TaskOutcome::from(req);
                debug!(
                    worker = %worker_id,
                    task_id = outcome.id,
                    expression_id = outcome.tag.expression_id,
                    round = outcome.tag.round,
                    "Result received"
                );

                if queues.submit_result(outcome).is_err() {
                    send_error(&mut stream, "Result queue closed").await?;
                    return Ok(());
                }
                write_message(&mut stream, &Message::ResultAck(ResultResponse {})).await?;
            }
            other => {
                send_error(&mut stream, "Unexpected message").await?;
                anyhow::bail!("Unexpected message from {}: {:?}", worker_id, other);
            }
        }
    }
}

/// Send a task to the worker, putting it back in the queue if the write fails
async fn deliver_task<W>(stream: &mut W, worker_id: &str, task: SubTask, queues: &ServiceQueues) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let response = Message::Task(TaskResponse::from(&task));
    if let Err(e) = write_message(stream, &response).await {
        warn!(worker = %worker_id, task_id = task.id, tag = %task.tag, "Task delivery failed, requeueing");
        queues.requeue(task);
        return Err(e);
    }

    debug!(
        worker = %worker_id,
        task_id = task.id,
        expression_id = task.tag.expression_id,
        round = task.tag.round,
        "Task handed out"
    );
    Ok(())
}

/// Resolves once the peer closes the connection
///
/// Data arriving while the worker should be waiting also ends the wait; the
/// caller drops the connection in either case.
async fn wait_for_disconnect(stream: &TcpStream) {
    let mut buf = [0u8; 1];
    let _ = stream.peek(&mut buf).await;
}

async fn send_error(stream: &mut TcpStream, error: &str) -> Result<()> {
    write_message(stream, &Message::Error(ErrorMessage {
        sender: SENDER.to_string(),
        error: error.to_string(),
    })).await
}

fn is_disconnect(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<std::io::Error>())
        .any(|io| matches!(
            io.kind(),
            std::io::ErrorKind::UnexpectedEof
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::BrokenPipe
        ))
}
