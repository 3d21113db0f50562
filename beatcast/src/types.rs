//! Types that mirror the agent's push frames.

use serde::Deserialize;
use serde_json::Value;

pub const DATA_EVENT: &str = "MetricbeatData";
pub const STALE_EVENT: &str = "MetricbeatStale";

#[derive(Debug, Deserialize, Clone)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Option<Vec<Value>>,
    #[serde(default)]
    pub error: Option<String>,
}

/// One full-profile delivery, by position. Gauges arrive as preformatted strings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Gauges {
    pub cpu_pct: Option<String>,
    pub memory_pct: Option<String>,
    pub load: Option<String>,
    pub swap_pct: Option<String>,
    pub disk_pct: Option<String>,
    pub processes: Option<u64>,
    pub net_in_dropped: Option<f64>,
    pub net_out_dropped: Option<f64>,
    pub used_memory_gib: Option<String>,
    pub total_memory_gib: Option<f64>,
    pub top_disk: Option<(String, String)>,
}

impl Gauges {
    /// `None` unless `data` has the eleven-position full-profile shape.
    pub fn from_data(data: &[Value]) -> Option<Self> {
        if data.len() != 11 {
            return None;
        }
        let text = |i: usize| data[i].as_str().map(String::from);
        let top_disk = data[10].as_array().and_then(|pair| {
            Some((
                pair.first()?.as_str()?.to_string(),
                pair.get(1)?.as_str()?.to_string(),
            ))
        });
        Some(Self {
            cpu_pct: text(0),
            memory_pct: text(1),
            load: text(2),
            swap_pct: text(3),
            disk_pct: text(4),
            processes: data[5].as_u64(),
            net_in_dropped: data[6].as_f64(),
            net_out_dropped: data[7].as_f64(),
            used_memory_gib: text(8),
            total_memory_gib: data[9].as_f64(),
            top_disk,
        })
    }

    pub fn render(&self) -> String {
        fn or_na<T: ToString>(v: &Option<T>) -> String {
            v.as_ref().map(T::to_string).unwrap_or_else(|| "n/a".into())
        }
        let total_mem = self
            .total_memory_gib
            .map(|v| format!("{v:.1}"))
            .unwrap_or_else(|| "n/a".into());
        let top = self
            .top_disk
            .as_ref()
            .map(|(mount, pct)| format!("{mount} {pct}%"))
            .unwrap_or_else(|| "n/a".into());
        format!(
            "cpu {}% mem {}% load {} swap {}% disk {}% procs {} drop in/out {}/{} mem {}/{} GiB top {}",
            or_na(&self.cpu_pct),
            or_na(&self.memory_pct),
            or_na(&self.load),
            or_na(&self.swap_pct),
            or_na(&self.disk_pct),
            or_na(&self.processes),
            or_na(&self.net_in_dropped),
            or_na(&self.net_out_dropped),
            or_na(&self.used_memory_gib),
            total_mem,
            top,
        )
    }
}

/// One printable line for a frame; unknown events are shown raw.
pub fn describe(frame: &Frame) -> String {
    match frame.event.as_str() {
        DATA_EVENT => {
            let data = frame.data.as_deref().unwrap_or_default();
            match Gauges::from_data(data) {
                Some(g) => g.render(),
                None => Value::Array(data.to_vec()).to_string(),
            }
        }
        STALE_EVENT => format!(
            "stale: {}",
            frame.error.as_deref().unwrap_or("backend unavailable")
        ),
        other => format!("unknown event {other}"),
    }
}
