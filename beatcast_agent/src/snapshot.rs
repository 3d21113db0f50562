//! Typed snapshots built from raw aggregation results.
//!
//! Every numeric field is `Option`: `None` is the "unavailable" marker and
//! serializes as `null`. Builders are total: missing, null or non-finite
//! aggregation values become `None` and never fail the whole snapshot.

use serde::ser::SerializeTuple;
use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::debug;

use crate::config::QueryProfile;

/// Mount point with the highest average used percentage in the window.
#[derive(Debug, Clone, PartialEq)]
pub struct TopDisk {
    pub mount_path: String,
    /// Percentage (0..100) rounded to two decimals.
    pub used_pct: f64,
}

impl Serialize for TopDisk {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut t = serializer.serialize_tuple(2)?;
        t.serialize_element(&self.mount_path)?;
        t.serialize_element(&format!("{:.2}", self.used_pct))?;
        t.end()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSnapshot {
    pub cpu_user_pct: Option<f64>,
    pub cpu_sys_pct: Option<f64>,
    pub cpu_core_count: Option<f64>,
    pub memory_used_pct: Option<f64>,
    pub load5m: Option<f64>,
    pub swap_used_pct: Option<f64>,
    pub fsstat_used_bytes: Option<f64>,
    pub fsstat_total_bytes: Option<f64>,
    pub process_count: Option<u64>,
    pub net_in_dropped: Option<f64>,
    pub net_out_dropped: Option<f64>,
    pub memory_used_bytes: Option<f64>,
    pub memory_total_bytes: Option<f64>,
    pub top_disk_mount: Option<TopDisk>,
}

/// Latest document seen in the window (minimal profile).
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostSnapshot {
    pub timestamp: Option<String>,
    pub hostname: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Snapshot {
    Full(MetricSnapshot),
    Minimal(HostSnapshot),
}

impl Snapshot {
    pub fn build(profile: QueryProfile, raw: &Value) -> Self {
        match profile {
            QueryProfile::Full => Snapshot::Full(MetricSnapshot::build(raw)),
            QueryProfile::Minimal => Snapshot::Minimal(HostSnapshot::build(raw)),
        }
    }
}

/// `aggs.<name>.value` as a finite float.
fn agg_value(raw: &Value, name: &str) -> Option<f64> {
    let value = raw.get(name).and_then(|a| a.get("value")).and_then(Value::as_f64);
    match value {
        Some(v) if v.is_finite() => Some(v),
        _ => {
            debug!("aggregation {name} unavailable");
            None
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn top_disk(raw: &Value) -> Option<TopDisk> {
    let bucket = raw
        .get("Top_disk")
        .and_then(|a| a.get("buckets"))
        .and_then(Value::as_array)
        .and_then(|b| b.first());
    let Some(bucket) = bucket else {
        debug!("aggregation Top_disk has no buckets");
        return None;
    };
    let mount_path = bucket.get("key").and_then(Value::as_str)?.to_string();
    let used = agg_value(bucket, "used_pct")?;
    let used_pct = round2(used * 100.0);
    used_pct.is_finite().then_some(TopDisk {
        mount_path,
        used_pct,
    })
}

impl MetricSnapshot {
    pub fn build(raw: &Value) -> Self {
        Self {
            cpu_user_pct: agg_value(raw, "CPU_gauge_user"),
            cpu_sys_pct: agg_value(raw, "CPU_gauge_sys"),
            cpu_core_count: agg_value(raw, "CPU_gauge_core"),
            memory_used_pct: agg_value(raw, "Memory_gauge"),
            load5m: agg_value(raw, "Load_5m"),
            swap_used_pct: agg_value(raw, "Swap_usage"),
            fsstat_used_bytes: agg_value(raw, "Fsstat_used"),
            fsstat_total_bytes: agg_value(raw, "Fsstat_total"),
            process_count: agg_value(raw, "Process")
                .filter(|v| *v >= 0.0)
                .map(|v| v.round() as u64),
            net_in_dropped: agg_value(raw, "In_pocketloss"),
            net_out_dropped: agg_value(raw, "Out_pocketloss"),
            memory_used_bytes: agg_value(raw, "Used_memory"),
            memory_total_bytes: agg_value(raw, "Total_memory"),
            top_disk_mount: top_disk(raw),
        }
    }
}

impl HostSnapshot {
    pub fn build(raw: &Value) -> Self {
        let source = raw
            .pointer("/Latest/hits/hits/0/_source")
            .cloned()
            .unwrap_or(Value::Null);
        let text = |ptr: &str| source.pointer(ptr).and_then(Value::as_str).map(String::from);
        Self {
            timestamp: text("/@timestamp"),
            hostname: text("/host/hostname"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_raw() -> Value {
        json!({
            "CPU_gauge_user": { "value": 0.2 },
            "CPU_gauge_sys": { "value": 0.1 },
            "CPU_gauge_core": { "value": 4.0 },
            "Memory_gauge": { "value": 0.5 },
            "Load_5m": { "value": 1.25 },
            "Swap_usage": { "value": 0.01 },
            "Fsstat_used": { "value": 50.0 },
            "Fsstat_total": { "value": 200.0 },
            "Process": { "value": 312 },
            "In_pocketloss": { "value": 3.0 },
            "Out_pocketloss": { "value": 0.0 },
            "Used_memory": { "value": 1073741824.0 },
            "Total_memory": { "value": 8589934592.0 },
            "Top_disk": {
                "buckets": [
                    { "key": "/data", "doc_count": 90, "used_pct": { "value": 0.4567 } }
                ]
            }
        })
    }

    #[test]
    fn builds_every_field() {
        let s = MetricSnapshot::build(&full_raw());
        assert_eq!(s.cpu_user_pct, Some(0.2));
        assert_eq!(s.cpu_core_count, Some(4.0));
        assert_eq!(s.process_count, Some(312));
        assert_eq!(s.memory_total_bytes, Some(8589934592.0));
        assert_eq!(
            s.top_disk_mount,
            Some(TopDisk {
                mount_path: "/data".into(),
                used_pct: 45.67
            })
        );
    }

    #[test]
    fn missing_and_null_values_are_unavailable() {
        let raw = json!({
            "CPU_gauge_user": { "value": null },
            "Load_5m": {},
            "Top_disk": { "buckets": [] }
        });
        let s = MetricSnapshot::build(&raw);
        assert_eq!(s, MetricSnapshot::default());
    }

    #[test]
    fn tolerates_garbage_shapes() {
        for raw in [json!(null), json!([]), json!("x"), json!({ "Top_disk": 3 })] {
            assert_eq!(MetricSnapshot::build(&raw), MetricSnapshot::default());
        }
        let raw = json!({ "Top_disk": { "buckets": [ { "key": "/", "used_pct": {} } ] } });
        assert_eq!(MetricSnapshot::build(&raw).top_disk_mount, None);
    }

    #[test]
    fn build_is_deterministic() {
        let raw = full_raw();
        assert_eq!(MetricSnapshot::build(&raw), MetricSnapshot::build(&raw));
    }

    #[test]
    fn pull_record_uses_camel_case_and_pair() {
        let v = serde_json::to_value(Snapshot::build(QueryProfile::Full, &full_raw())).unwrap();
        assert_eq!(v["cpuUserPct"], json!(0.2));
        assert_eq!(v["load5m"], json!(1.25));
        assert_eq!(v["processCount"], json!(312));
        assert_eq!(v["topDiskMount"], json!(["/data", "45.67"]));
        let empty = serde_json::to_value(MetricSnapshot::default()).unwrap();
        assert_eq!(empty["topDiskMount"], Value::Null);
        assert_eq!(empty["fsstatTotalBytes"], Value::Null);
    }

    #[test]
    fn minimal_profile_reads_latest_hit() {
        let raw = json!({
            "Latest": { "hits": { "hits": [
                { "_source": { "@timestamp": "2024-05-01T10:00:00Z", "host": { "hostname": "web-1" } } }
            ] } }
        });
        let s = HostSnapshot::build(&raw);
        assert_eq!(s.timestamp.as_deref(), Some("2024-05-01T10:00:00Z"));
        assert_eq!(s.hostname.as_deref(), Some("web-1"));
        assert_eq!(HostSnapshot::build(&json!({})), HostSnapshot::default());
    }
}
