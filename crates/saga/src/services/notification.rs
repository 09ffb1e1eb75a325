//! Notification delivery channels.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{Clock, RandomSource};
use domain::Notification;

use crate::error::StageError;
use crate::order_fulfillment::LatencyProfile;

/// Sends a notification to its recipient.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<(), StageError>;
}

/// Simulated email/SMS/push sender. Always succeeds after a short delay.
#[derive(Debug, Clone)]
pub struct SimulatedChannel {
    random: Arc<dyn RandomSource>,
    clock: Arc<dyn Clock>,
    latency: LatencyProfile,
}

impl SimulatedChannel {
    pub fn new(random: Arc<dyn RandomSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            random,
            clock,
            latency: LatencyProfile::NOTIFICATION,
        }
    }

    pub fn with_latency(mut self, latency: LatencyProfile) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl NotificationChannel for SimulatedChannel {
    async fn deliver(&self, notification: &Notification) -> Result<(), StageError> {
        let delay = self.random.latency(self.latency.base, self.latency.spread);
        self.clock.sleep(delay).await;
        tracing::info!(
            notification_id = %notification.notification_id,
            recipient = %notification.recipient,
            channel = ?notification.channel,
            subject = %notification.subject,
            "notification sent"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryChannelState {
    delivered: Vec<Notification>,
    failing_recipients: HashSet<String>,
}

/// In-memory channel for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryChannel {
    state: Arc<RwLock<InMemoryChannelState>>,
}

impl InMemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every delivery to `recipient` fail.
    pub fn fail_for(&self, recipient: &str) {
        self.state
            .write()
            .unwrap()
            .failing_recipients
            .insert(recipient.to_string());
    }

    pub fn delivered(&self) -> Vec<Notification> {
        self.state.read().unwrap().delivered.clone()
    }

    pub fn delivered_count(&self) -> usize {
        self.state.read().unwrap().delivered.len()
    }
}

#[async_trait]
impl NotificationChannel for InMemoryChannel {
    async fn deliver(&self, notification: &Notification) -> Result<(), StageError> {
        let mut state = self.state.write().unwrap();
        if state.failing_recipients.contains(&notification.recipient) {
            return Err(StageError::Notification(format!(
                "Mailbox unavailable: {}",
                notification.recipient
            )));
        }
        state.delivered.push(notification.clone());
        Ok(())
    }
}
