//! Request trace log — step-by-step record of each analyze request.
//!
//! Every step is emitted as a tracing event as it happens; the finished
//! trace is kept in a bounded in-memory ring so recent failures can be
//! inspected over `/api/debug/sessions`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

pub const DEFAULT_TRACE_CAPACITY: usize = 50;

/// Server-side stages of the analyze pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ValidateImages,
    EncodeImages,
    FetchHistory,
    BuildPrompt,
    CallVision,
    ParseResponse,
    PersistSwing,
}

impl Stage {
    pub const COUNT: u8 = 7;

    pub fn number(&self) -> u8 {
        match self {
            Stage::ValidateImages => 1,
            Stage::EncodeImages => 2,
            Stage::FetchHistory => 3,
            Stage::BuildPrompt => 4,
            Stage::CallVision => 5,
            Stage::ParseResponse => 6,
            Stage::PersistSwing => 7,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Stage::ValidateImages => "Validate uploaded images (MIME type, size, decodability)",
            Stage::EncodeImages => "Convert images to base64 and detect media types",
            Stage::FetchHistory => "Fetch recent swings for prompt context",
            Stage::BuildPrompt => "Build analysis prompt with shot context and history",
            Stage::CallVision => "Call vision model",
            Stage::ParseResponse => "Parse rating and summary from response",
            Stage::PersistSwing => "Save swing record to database",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Started,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStatus {
    InProgress,
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceStep {
    pub step_number: u8,
    pub step_name: &'static str,
    pub status: StepStatus,
    pub timestamp: DateTime<Utc>,
    pub duration_from_start_ms: u64,
    pub details: serde_json::Value,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceError {
    pub step: u8,
    pub step_name: &'static str,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceMetadata {
    pub request_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: TraceStatus,
    pub steps_completed: u8,
    pub total_steps: u8,
    pub total_duration_ms: u64,
    pub error_count: usize,
}

/// A finished (or in-flight) request trace.
#[derive(Debug, Clone, Serialize)]
pub struct TraceSession {
    pub metadata: TraceMetadata,
    pub steps: Vec<TraceStep>,
    pub errors: Vec<TraceError>,
}

/// Builder for one request's trace.
#[derive(Debug)]
pub struct RequestTrace {
    started: Instant,
    session: TraceSession,
}

impl Default for RequestTrace {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestTrace {
    pub fn new() -> Self {
        let request_id = Uuid::new_v4().to_string();
        tracing::info!(request_id = %request_id, "Analyze trace started");
        Self {
            started: Instant::now(),
            session: TraceSession {
                metadata: TraceMetadata {
                    request_id,
                    start_time: Utc::now(),
                    end_time: None,
                    status: TraceStatus::InProgress,
                    steps_completed: 0,
                    total_steps: Stage::COUNT,
                    total_duration_ms: 0,
                    error_count: 0,
                },
                steps: Vec::new(),
                errors: Vec::new(),
            },
        }
    }

    pub fn request_id(&self) -> &str {
        &self.session.metadata.request_id
    }

    pub fn started(&mut self, stage: Stage) {
        self.record(stage, StepStatus::Started, serde_json::Value::Null, None);
    }

    pub fn completed(&mut self, stage: Stage, details: serde_json::Value) {
        self.record(stage, StepStatus::Completed, details, None);
    }

    pub fn failed(&mut self, stage: Stage, error: impl Into<String>) {
        self.record(stage, StepStatus::Failed, serde_json::Value::Null, Some(error.into()));
    }

    fn record(
        &mut self,
        stage: Stage,
        status: StepStatus,
        details: serde_json::Value,
        error: Option<String>,
    ) {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        let now = Utc::now();
        let request_id = self.session.metadata.request_id.as_str();

        match &error {
            Some(e) => tracing::error!(
                request_id,
                step = stage.number(),
                status = ?status,
                elapsed_ms,
                error = %e,
                "{}", stage.description()
            ),
            None => tracing::info!(
                request_id,
                step = stage.number(),
                status = ?status,
                elapsed_ms,
                "{}", stage.description()
            ),
        }

        if status == StepStatus::Completed {
            self.session.metadata.steps_completed = stage.number();
        }
        if let Some(e) = &error {
            self.session.errors.push(TraceError {
                step: stage.number(),
                step_name: stage.description(),
                error: e.clone(),
                timestamp: now,
            });
        }

        self.session.steps.push(TraceStep {
            step_number: stage.number(),
            step_name: stage.description(),
            status,
            timestamp: now,
            duration_from_start_ms: elapsed_ms,
            details,
            error,
        });
    }

    /// Close the trace and hand back the finished session.
    pub fn finish(mut self, success: bool) -> TraceSession {
        let meta = &mut self.session.metadata;
        meta.status = if success {
            TraceStatus::Success
        } else {
            TraceStatus::Failed
        };
        meta.total_duration_ms = self.started.elapsed().as_millis() as u64;
        meta.end_time = Some(Utc::now());
        meta.error_count = self.session.errors.len();

        tracing::info!(
            request_id = %meta.request_id,
            status = ?meta.status,
            steps_completed = meta.steps_completed,
            duration_ms = meta.total_duration_ms,
            errors = meta.error_count,
            "Analyze trace finished"
        );

        self.session
    }
}

/// Bounded, shared ring of finished traces. Oldest entries are dropped first.
#[derive(Debug, Clone)]
pub struct TraceLog {
    inner: Arc<Mutex<VecDeque<TraceSession>>>,
    capacity: usize,
}

impl Default for TraceLog {
    fn default() -> Self {
        Self::new(DEFAULT_TRACE_CAPACITY)
    }
}

impl TraceLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&self, session: TraceSession) {
        let mut sessions = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        while sessions.len() >= self.capacity {
            sessions.pop_front();
        }
        sessions.push_back(session);
    }

    /// Up to `limit` most recent sessions, newest first.
    pub fn recent(&self, limit: usize) -> Vec<TraceSession> {
        let sessions = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        sessions.iter().rev().take(limit).cloned().collect()
    }

    pub fn get(&self, request_id: &str) -> Option<TraceSession> {
        let sessions = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        sessions
            .iter()
            .find(|s| s.metadata.request_id == request_id)
            .cloned()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
