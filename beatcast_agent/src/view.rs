//! Client-facing view model and the per-tick payload shaping.

use serde_json::{json, Value};

use crate::snapshot::{HostSnapshot, MetricSnapshot, Snapshot, TopDisk};

const GIB: f64 = 1_073_741_824.0;

/// Derived gauges, in push payload order. `None` is unavailable.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedViewModel {
    pub cpu_gauge_pct: Option<f64>,
    pub memory_gauge_pct: Option<f64>,
    pub load_gauge: Option<f64>,
    pub swap_gauge_pct: Option<f64>,
    pub disk_used_pct: Option<f64>,
    pub process_count: Option<u64>,
    pub net_in_dropped: Option<f64>,
    pub net_out_dropped: Option<f64>,
    pub used_memory_gib: Option<f64>,
    pub total_memory_gib: Option<f64>,
    pub top_disk_mount: Option<TopDisk>,
}

/// `num / den`, unavailable on a zero denominator or non-finite result.
fn safe_div(num: Option<f64>, den: Option<f64>) -> Option<f64> {
    let (n, d) = (num?, den?);
    if d == 0.0 {
        return None;
    }
    Some(n / d).filter(|v| v.is_finite())
}

fn scale(v: Option<f64>, factor: f64) -> Option<f64> {
    v.map(|x| x * factor).filter(|x| x.is_finite())
}

impl DerivedViewModel {
    pub fn from_snapshot(s: &MetricSnapshot) -> Self {
        let cpu_busy = match (s.cpu_user_pct, s.cpu_sys_pct) {
            (Some(u), Some(sys)) => Some(u + sys),
            _ => None,
        };
        Self {
            cpu_gauge_pct: scale(safe_div(cpu_busy, s.cpu_core_count), 100.0),
            memory_gauge_pct: scale(s.memory_used_pct, 100.0),
            load_gauge: s.load5m,
            swap_gauge_pct: scale(s.swap_used_pct, 100.0),
            disk_used_pct: scale(safe_div(s.fsstat_used_bytes, s.fsstat_total_bytes), 100.0),
            process_count: s.process_count,
            net_in_dropped: s.net_in_dropped,
            net_out_dropped: s.net_out_dropped,
            used_memory_gib: safe_div(s.memory_used_bytes, Some(GIB)),
            total_memory_gib: safe_div(s.memory_total_bytes, Some(GIB)),
            top_disk_mount: s.top_disk_mount.clone(),
        }
    }

    /// Ordered push array. Gauges are fixed-precision strings, as clients expect.
    pub fn to_payload(&self) -> Value {
        let fixed = |v: Option<f64>, places: usize| match v {
            Some(x) => Value::String(to_fixed(x, places)),
            None => Value::Null,
        };
        json!([
            fixed(self.cpu_gauge_pct, 3),
            fixed(self.memory_gauge_pct, 3),
            fixed(self.load_gauge, 3),
            fixed(self.swap_gauge_pct, 3),
            fixed(self.disk_used_pct, 3),
            self.process_count,
            self.net_in_dropped,
            self.net_out_dropped,
            fixed(self.used_memory_gib, 1),
            self.total_memory_gib,
            self.top_disk_mount,
        ])
    }
}

/// Fixed-point text with halves rounded away from zero (`12.0625` → `12.063`),
/// where `format!` alone would round half to even.
fn to_fixed(x: f64, places: usize) -> String {
    let factor = 10f64.powi(places as i32);
    let rounded = (x * factor).round() / factor;
    if rounded.is_finite() {
        format!("{rounded:.places$}")
    } else {
        format!("{x:.places$}")
    }
}

fn host_payload(h: &HostSnapshot) -> Value {
    json!([h.timestamp, h.hostname])
}

/// Shapes one snapshot into the `data` array of a delivery.
pub fn payload(snapshot: &Snapshot) -> Value {
    match snapshot {
        Snapshot::Full(m) => DerivedViewModel::from_snapshot(m).to_payload(),
        Snapshot::Minimal(h) => host_payload(h),
    }
}
