use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

pub const DEFAULT_TOAST_DURATION_MS: u64 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    Success,
    Error,
    Warning,
    Info,
}

impl ToastKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ToastKind::Success => "success",
            ToastKind::Error => "error",
            ToastKind::Warning => "warning",
            ToastKind::Info => "info",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toast {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: ToastKind,
    /// Milliseconds; zero means "use the default".
    #[serde(default)]
    pub duration: u64,
}

impl Toast {
    pub fn new(kind: ToastKind, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            kind,
            duration: 0,
        }
    }

    pub fn success(title: impl Into<String>) -> Self {
        Self::new(ToastKind::Success, title)
    }

    pub fn error(title: impl Into<String>) -> Self {
        Self::new(ToastKind::Error, title)
    }

    pub fn warning(title: impl Into<String>) -> Self {
        Self::new(ToastKind::Warning, title)
    }

    pub fn info(title: impl Into<String>) -> Self {
        Self::new(ToastKind::Info, title)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone)]
struct Entry {
    toast: Toast,
    shown_at: Instant,
}

/// Pending notifications, oldest first.
#[derive(Debug, Clone, Default)]
pub struct ToastQueue {
    entries: Vec<Entry>,
}

impl ToastQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, toast: Toast) {
        self.add_at(toast, Instant::now());
    }

    fn add_at(&mut self, mut toast: Toast, now: Instant) {
        if toast.duration == 0 {
            toast.duration = DEFAULT_TOAST_DURATION_MS;
        }
        self.entries.push(Entry { toast, shown_at: now });
    }

    /// Out-of-range indices are ignored.
    pub fn remove(&mut self, index: usize) {
        if index < self.entries.len() {
            self.entries.remove(index);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drop toasts whose duration has elapsed at `now`.
    pub fn expire(&mut self, now: Instant) {
        self.entries.retain(|e| {
            now.saturating_duration_since(e.shown_at) < Duration::from_millis(e.toast.duration)
        });
    }

    pub fn toasts(&self) -> impl Iterator<Item = &Toast> {
        self.entries.iter().map(|e| &e.toast)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn drain(&mut self) -> Vec<Toast> {
        self.entries.drain(..).map(|e| e.toast).collect()
    }
}
