#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use imagegen_client::{ClientError, PushEvent, PushStream, TaskFeed, TaskSnapshot};
use imagegen_core::task_status::TaskStatus;

pub fn snap(status: TaskStatus, completed: i64) -> TaskSnapshot {
    TaskSnapshot {
        task_id: "task-1".into(),
        status,
        prompt: "a lighthouse".into(),
        provider_name: "fake".into(),
        model_id: "fake-model".into(),
        total_count: 2,
        completed_count: completed,
        error_message: None,
        images: Vec::new(),
    }
}

/// How one `open` call behaves.
pub enum OpenScript {
    Refuse,
    /// Never answer the open request.
    Stall,
    /// Deliver the events, then stay open and silent.
    Hold(Vec<PushEvent>),
    /// Deliver the events, then end the stream.
    End(Vec<PushEvent>),
}

/// Feed that replays scripted opens and fetches in order.
///
/// Once a script runs out, opens are refused and fetches fail.
#[derive(Default)]
pub struct ScriptedFeed {
    opens: Mutex<VecDeque<OpenScript>>,
    fetches: Mutex<VecDeque<Result<Option<TaskSnapshot>, String>>>,
    pub open_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
}

impl ScriptedFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_open(self, script: OpenScript) -> Self {
        self.opens.lock().unwrap().push_back(script);
        self
    }

    pub fn with_fetch(self, snapshot: Option<TaskSnapshot>) -> Self {
        self.fetches.lock().unwrap().push_back(Ok(snapshot));
        self
    }

    pub fn with_fetch_errors(self, times: usize) -> Self {
        {
            let mut fetches = self.fetches.lock().unwrap();
            for _ in 0..times {
                fetches.push_back(Err("connection refused".into()));
            }
        }
        self
    }

    pub fn opens(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskFeed for ScriptedFeed {
    async fn open(&self, _task_id: &str) -> Result<PushStream, ClientError> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.opens.lock().unwrap().pop_front();
        match script {
            None | Some(OpenScript::Refuse) => {
                Err(ClientError::Transport("connection refused".into()))
            }
            Some(OpenScript::Stall) => std::future::pending().await,
            Some(OpenScript::Hold(events)) => Ok(stream::iter(events.into_iter().map(Ok::<_, ClientError>))
                .chain(stream::pending())
                .boxed()),
            Some(OpenScript::End(events)) => Ok(stream::iter(events.into_iter().map(Ok::<_, ClientError>)).boxed()),
        }
    }

    async fn fetch(&self, _task_id: &str) -> Result<Option<TaskSnapshot>, ClientError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.fetches.lock().unwrap().pop_front();
        match next {
            Some(Ok(snapshot)) => Ok(snapshot),
            Some(Err(reason)) => Err(ClientError::Transport(reason)),
            None => Err(ClientError::Transport("no scripted response".into())),
        }
    }
}
