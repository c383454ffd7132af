//! Counter registry for one client process.
//!
//! Labels are flattened into sorted key vectors to keep rendering order
//! deterministic.

use dashmap::DashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn label_key(labels: &[(&str, &str)]) -> Vec<(String, String)> {
    let mut key: Vec<(String, String)> = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    key.sort();
    key
}

#[derive(Default)]
pub struct CounterVec {
    map: DashMap<Vec<(String, String)>, AtomicU64>,
}

impl CounterVec {
    /// Increment by 1.
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.add(labels, 1);
    }

    pub fn add(&self, labels: &[(&str, &str)], v: u64) {
        let counter = self
            .map
            .entry(label_key(labels))
            .or_insert_with(|| AtomicU64::new(0));
        counter.fetch_add(v, Ordering::Relaxed);
    }

    /// Current value for an exact label set (0 when never touched).
    pub fn get(&self, labels: &[(&str, &str)]) -> u64 {
        self.map
            .get(&label_key(labels))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {} counter", name);
        let mut rows: Vec<(String, u64)> = self
            .map
            .iter()
            .map(|r| {
                let label_str = r
                    .key()
                    .iter()
                    .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
                    .collect::<Vec<_>>()
                    .join(",");
                (label_str, r.value().load(Ordering::Relaxed))
            })
            .collect();
        rows.sort();
        for (label_str, val) in rows {
            let _ = writeln!(out, "{}{{{}}} {}", name, label_str, val);
        }
    }
}

#[derive(Default)]
pub struct ClientMetrics {
    /// Frames by direction (`dir` = in/out).
    pub frames: CounterVec,
    /// Raw bytes by direction.
    pub bytes: CounterVec,
    /// Received frames that failed to decode, by error kind.
    pub decode_errors: CounterVec,
    /// Forwarded requests by outcome (`RESPONSE` / `ERROR`).
    pub dispatch: CounterVec,
}

impl ClientMetrics {
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.frames.render("pathlink_frames_total", &mut out);
        self.bytes.render("pathlink_bytes_total", &mut out);
        self.decode_errors.render("pathlink_decode_errors_total", &mut out);
        self.dispatch.render("pathlink_dispatch_total", &mut out);
        out
    }
}
