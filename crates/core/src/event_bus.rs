//! Event bus for funnel analytics and contact events.
//!
//! Emission is fire-and-forget: nothing on the request path waits for a
//! downstream CRM, webhook or analytics store.

use crate::types::{FunnelId, PageId, StepType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FunnelEventType {
    StepPassed,
    UpsellAccepted,
    UpsellRejected,
    UpsellRevenue,
    CouponApplied,
    CouponRejected,
    TamperRejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunnelEvent {
    pub event_id: Uuid,
    pub event_type: FunnelEventType,
    pub session_id: String,
    pub funnel_id: Option<FunnelId>,
    pub page_id: Option<PageId>,
    pub step_type: Option<StepType>,
    pub amount: Option<f64>,
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl FunnelEvent {
    pub fn with_funnel(mut self, funnel_id: FunnelId) -> Self {
        self.funnel_id = Some(funnel_id);
        self
    }

    pub fn with_step(mut self, page_id: PageId, step_type: StepType) -> Self {
        self.page_id = Some(page_id);
        self.step_type = Some(step_type);
        self
    }

    pub fn with_amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Trait for emitting funnel events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: FunnelEvent);
}

/// No-op sink for tests and modules that don't need event emission.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: FunnelEvent) {}
}

/// Writes every event as a structured log line.
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: FunnelEvent) {
        info!(
            event_type = ?event.event_type,
            session_id = %event.session_id,
            funnel_id = ?event.funnel_id,
            page_id = ?event.page_id,
            amount = ?event.amount,
            detail = ?event.detail,
            "Funnel event"
        );
    }
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<FunnelEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<FunnelEvent> {
        self.events.lock().expect("event bus mutex poisoned").clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().expect("event bus mutex poisoned").len()
    }

    pub fn count_type(&self, event_type: FunnelEventType) -> usize {
        self.events
            .lock()
            .expect("event bus mutex poisoned")
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().expect("event bus mutex poisoned").clear();
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: FunnelEvent) {
        self.events.lock().expect("event bus mutex poisoned").push(event);
    }
}

/// Convenience builder for creating a `FunnelEvent` with minimal boilerplate.
pub fn make_event(event_type: FunnelEventType, session_id: impl Into<String>) -> FunnelEvent {
    FunnelEvent {
        event_id: Uuid::new_v4(),
        event_type,
        session_id: session_id.into(),
        funnel_id: None,
        page_id: None,
        step_type: None,
        amount: None,
        detail: None,
        timestamp: Utc::now(),
    }
}

/// Convenience: create a no-op event bus for modules that don't need it.
pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

/// Convenience: create a capture sink for tests.
pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}
