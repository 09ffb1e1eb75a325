//! Epoch-aligned tumbling windows and per-window keyed state.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// Fixed-size, non-overlapping windows aligned to the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TumblingWindow {
    size: Duration,
}

impl TumblingWindow {
    pub fn new(size: Duration) -> Self {
        Self {
            size: size.max(Duration::milliseconds(1)),
        }
    }

    pub fn of_minutes(minutes: i64) -> Self {
        Self::new(Duration::minutes(minutes))
    }

    pub fn size(&self) -> Duration {
        self.size
    }

    /// The window containing `at`.
    pub fn window_for(&self, at: DateTime<Utc>) -> Window {
        let size_ms = self.size.num_milliseconds();
        let start_ms = at.timestamp_millis().div_euclid(size_ms) * size_ms;
        let start = Utc
            .timestamp_millis_opt(start_ms)
            .single()
            .unwrap_or(at);
        Window {
            start,
            end: start + self.size,
        }
    }
}

/// A window that closed, with the final value of every key.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedWindow<K, V> {
    pub window: Window,
    pub values: Vec<(K, V)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "K: Serialize, V: Serialize",
    deserialize = "K: DeserializeOwned, V: DeserializeOwned"
))]
struct OpenWindow<K, V> {
    window: Window,
    values: Vec<(K, V)>,
}

/// Serializable form of a [`WindowedState`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(
    serialize = "K: Serialize, V: Serialize",
    deserialize = "K: DeserializeOwned, V: DeserializeOwned"
))]
pub struct WindowedSnapshot<K, V> {
    watermark: Option<DateTime<Utc>>,
    windows: Vec<OpenWindow<K, V>>,
}

/// Keyed state of the open windows of one aggregation.
///
/// Windows close once the watermark reaches their end. The watermark is the
/// maximum of every time passed to [`WindowedState::advance`] and never
/// moves backwards. Updates for a closed window are rejected as late.
#[derive(Debug, Clone)]
pub struct WindowedState<K, V> {
    windows: TumblingWindow,
    open: BTreeMap<DateTime<Utc>, (Window, BTreeMap<K, V>)>,
    watermark: Option<DateTime<Utc>>,
}

impl<K, V> WindowedState<K, V>
where
    K: Ord + Clone,
    V: Default + Clone,
{
    pub fn new(windows: TumblingWindow) -> Self {
        Self {
            windows,
            open: BTreeMap::new(),
            watermark: None,
        }
    }

    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.watermark
    }

    /// Applies `f` to the value of `key` in the window containing `at`.
    ///
    /// Returns the window, or `None` if it has already closed.
    pub fn update(&mut self, key: K, at: DateTime<Utc>, f: impl FnOnce(&mut V)) -> Option<Window> {
        let window = self.windows.window_for(at);
        if self.watermark.is_some_and(|w| window.end <= w) {
            return None;
        }
        let (_, values) = self
            .open
            .entry(window.start)
            .or_insert_with(|| (window, BTreeMap::new()));
        f(values.entry(key).or_default());
        Some(window)
    }

    /// Moves the watermark to `time` and returns the windows that closed.
    pub fn advance(&mut self, time: DateTime<Utc>) -> Vec<ClosedWindow<K, V>> {
        let watermark = match self.watermark {
            Some(current) if current >= time => current,
            _ => time,
        };
        self.watermark = Some(watermark);

        let mut closed = Vec::new();
        while let Some(entry) = self.open.first_entry() {
            if entry.get().0.end > watermark {
                break;
            }
            let (window, values) = entry.remove();
            closed.push(ClosedWindow {
                window,
                values: values.into_iter().collect(),
            });
        }
        closed
    }

    /// Open windows with their current values, oldest first.
    pub fn open_windows(&self) -> Vec<ClosedWindow<K, V>> {
        self.open
            .values()
            .map(|(window, values)| ClosedWindow {
                window: *window,
                values: values.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.open.clear();
        self.watermark = None;
    }

    pub fn snapshot(&self) -> WindowedSnapshot<K, V> {
        WindowedSnapshot {
            watermark: self.watermark,
            windows: self
                .open
                .values()
                .map(|(window, values)| OpenWindow {
                    window: *window,
                    values: values.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                })
                .collect(),
        }
    }

    pub fn restore(&mut self, snapshot: WindowedSnapshot<K, V>) {
        self.watermark = snapshot.watermark;
        self.open = snapshot
            .windows
            .into_iter()
            .map(|open| (open.window.start, (open.window, open.values.into_iter().collect())))
            .collect();
    }
}
