//! Worker-side client for the task service
//!
//! Holds one persistent connection, opened lazily. Any transport failure drops
//! the connection so the next call reconnects; callers decide whether to retry.

use crate::distributed::protocol::*;
use crate::task::TaskOutcome;
use anyhow::{Context, Result};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info};

pub struct CoordinatorClient {
    addr: String,
    worker_id: String,
    connect_timeout: Duration,
    stream: Option<TcpStream>,
}

impl CoordinatorClient {
    pub fn new(addr: impl Into<String>, worker_id: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            worker_id: worker_id.into(),
            connect_timeout,
            stream: None,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    #[cfg(test)]
    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Ask the coordinator for a sub-task
    ///
    /// Waits as long as the coordinator has nothing queued.
    pub async fn give_task(&mut self) -> Result<TaskResponse> {
        match self.call(Message::GiveTask(TaskRequest {})).await? {
            Message::Task(task) => Ok(task),
            Message::Error(err) => anyhow::bail!("Coordinator error: {}", err.error),
            other => anyhow::bail!("Expected TASK, got {:?}", other),
        }
    }

    /// Report a sub-task outcome
    pub async fn get_result(&mut self, outcome: TaskOutcome) -> Result<ResultResponse> {
        let TaskOutcome { id, tag, value } = outcome;
        let request = ResultRequest::new(id, tag, value);

        match self.call(Message::GetResult(request)).await? {
            Message::ResultAck(ack) => Ok(ack),
            Message::Error(err) => anyhow::bail!("Coordinator error: {}", err.error),
            other => anyhow::bail!("Expected RESULT_ACK, got {:?}", other),
        }
    }

    async fn call(&mut self, msg: Message) -> Result<Message> {
        let result = self.exchange(msg).await;
        if result.is_err() {
            // Next call starts from a fresh connection
            self.stream = None;
        }
        result
    }

    async fn exchange(&mut self, msg: Message) -> Result<Message> {
        let stream = self.connection().await?;
        write_message(stream, &msg).await?;
        read_message(stream).await
    }

    async fn connection(&mut self) -> Result<&mut TcpStream> {
        if self.stream.is_none() {
            let stream = self.connect().await?;
            self.stream = Some(stream);
        }

        self.stream
            .as_mut()
            .context("Connection unavailable")
    }

    async fn connect(&self) -> Result<TcpStream> {
        debug!(worker = %self.worker_id, addr = %self.addr, "Connecting to coordinator");

        let mut stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.addr))
            .await
            .with_context(|| format!("Timed out connecting to {}", self.addr))?
            .with_context(|| format!("Failed to connect to {}", self.addr))?;
        let _ = stream.set_nodelay(true);

        write_message(&mut stream, &Message::Hello(HelloMessage {
            protocol_version: PROTOCOL_VERSION,
            worker_id: self.worker_id.clone(),
        })).await?;

        match read_message(&mut stream).await? {
            Message::Welcome(welcome) if welcome.protocol_version == PROTOCOL_VERSION => {
                info!(worker = %self.worker_id, addr = %self.addr, "Connected to coordinator");
                Ok(stream)
            }
            Message::Welcome(welcome) => anyhow::bail!(
                "Protocol version mismatch: coordinator={}, worker={}",
                welcome.protocol_version, PROTOCOL_VERSION
            ),
            Message::Error(err) => anyhow::bail!("Coordinator rejected worker: {}", err.error),
            other => anyhow::bail!("Expected WELCOME, got {:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::queue::operation_queues;
    use crate::distributed::server::TaskService;
    use crate::postfix::Operator;
    use crate::task::{RoundTag, SubTask};

    #[tokio::test]
    async fn test_round_trip_through_service() {
        let (mut dispatch, service) = operation_queues();
        let server = TaskService::bind("127.0.0.1:0", service).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());

        let tag = RoundTag::new(9, 1);
        dispatch.begin_round(tag);
        dispatch.offer(SubTask {
            id: 1,
            tag,
            operand1: 3.0,
            operand2: 4.0,
            operator: Operator::Multiply,
        }).unwrap();

        let mut client = CoordinatorClient::new(addr.to_string(), "w-0", Duration::from_secs(1));
        assert!(!client.is_connected());

        let task = client.give_task().await.unwrap();
        assert!(client.is_connected());
        assert_eq!(task.operation, "*");

        client.get_result(TaskOutcome { id: task.id, tag: task.tag(), value: Ok(12.0) }).await.unwrap();
        let outcome = dispatch.next_result().await.unwrap();
        assert_eq!(outcome.value, Ok(12.0));
    }

    #[tokio::test]
    async fn test_unreachable_coordinator() {
        // Bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut client = CoordinatorClient::new(addr.to_string(), "w-0", Duration::from_millis(200));
        assert!(client.give_task().await.is_err());
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_reconnects_after_transport_error() {
        // First listener hangs up on the worker right after accepting
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hang_up = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let mut client = CoordinatorClient::new(addr.to_string(), "w-0", Duration::from_secs(1));
        assert!(client.give_task().await.is_err());
        assert!(!client.is_connected());
        hang_up.await.unwrap();

        // Real service comes up on the same address
        let (dispatch, service) = operation_queues();
        let server = TaskService::bind(addr, service).await.unwrap();
        tokio::spawn(server.run());

        let tag = RoundTag::new(5, 1);
        dispatch.begin_round(tag);
        dispatch.offer(SubTask {
            id: 1,
            tag,
            operand1: 8.0,
            operand2: 1.0,
            operator: Operator::Subtract,
        }).unwrap();

        let task = client.give_task().await.unwrap();
        assert!(client.is_connected());
        assert_eq!((task.id, task.tag()), (1, tag));
    }
}
