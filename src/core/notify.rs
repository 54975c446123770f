use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastLevel {
    Success,
    Error,
}

/// A transient user notification.
#[derive(Debug, Clone, Serialize)]
pub struct Toast {
    pub level: ToastLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct Toaster {
    toasts: Arc<Mutex<Vec<Toast>>>,
}

impl Toaster {
    pub fn new() -> Toaster {
        Toaster::default()
    }

    pub fn success(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("toast: {}", message);
        self.push(ToastLevel::Success, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("toast: {}", message);
        self.push(ToastLevel::Error, message);
    }

    fn push(&self, level: ToastLevel, message: String) {
        self.toasts.lock().push(Toast {
            level,
            message,
            created_at: Utc::now(),
        });
    }

    pub fn toasts(&self) -> Vec<Toast> {
        self.toasts.lock().clone()
    }

    pub fn last(&self) -> Option<Toast> {
        self.toasts.lock().last().cloned()
    }

    /// Takes every pending toast, oldest first.
    pub fn drain(&self) -> Vec<Toast> {
        std::mem::take(&mut *self.toasts.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toasts_are_kept_in_order() {
        let toaster = Toaster::new();
        toaster.success("Service added successfully");
        toaster.error("Failed to delete service: service s9 not found");

        let last = toaster.last().unwrap();
        assert_eq!(last.level, ToastLevel::Error);

        let drained = toaster.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].message, "Service added successfully");
        assert!(toaster.toasts().is_empty());
    }

    #[test]
    fn clones_share_the_queue() {
        let toaster = Toaster::new();
        let other = toaster.clone();
        other.success("ok");
        assert_eq!(toaster.toasts().len(), 1);
        let json = serde_json::to_value(&toaster.toasts()[0]).unwrap();
        assert_eq!(json["level"], "success");
    }
}
