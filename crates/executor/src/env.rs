//! Alert payload to process environment encoding.
//!
//! Every notification becomes a flat list of `NAME=VALUE` entries prefixed
//! with `AMX_`. The layout is:
//!
//! - `AMX_RECEIVER`, `AMX_STATUS`, `AMX_EXTERNAL_URL`, `AMX_ALERT_LEN`
//! - `AMX_LABEL_<k>`, `AMX_GLABEL_<k>`, `AMX_ANNOTATION_<k>` for the common
//!   labels, group labels and common annotations
//! - per alert `i` (1-based): `AMX_ALERT_<i>_STATUS`, `_START`, `_END`, `_URL`,
//!   then `AMX_ALERT_<i>_LABEL_<k>` and `AMX_ALERT_<i>_ANNOTATION_<k>`
//!
//! Map keys are emitted in sorted order and are not sanitized: a key holding
//! `=` or other characters that are invalid in an environment name is passed
//! through as-is.

use chrono::{DateTime, Utc};

use crate::alert::{AlertPayload, LabelSet};

/// Ordered `NAME=VALUE` entries appended to the inherited environment.
pub type EnvironmentVector = Vec<String>;

/// Unix seconds of Go's zero `time.Time` (0001-01-01T00:00:00Z), which
/// Alertmanager sends for unset timestamps.
const ZERO_TIME_UNIX: i64 = -62_135_596_800;

pub fn encode(payload: &AlertPayload) -> EnvironmentVector {
    let mut env = vec![
        format!("AMX_RECEIVER={}", payload.receiver),
        format!("AMX_STATUS={}", payload.status),
        format!("AMX_EXTERNAL_URL={}", payload.external_url),
        format!("AMX_ALERT_LEN={}", payload.alerts.len()),
    ];

    for (prefix, map) in [
        ("AMX_LABEL", &payload.common_labels),
        ("AMX_GLABEL", &payload.group_labels),
        ("AMX_ANNOTATION", &payload.common_annotations),
    ] {
        push_map(&mut env, prefix, map);
    }

    for (i, alert) in payload.alerts.iter().enumerate() {
        let key = format!("AMX_ALERT_{}", i + 1);
        env.push(format!("{key}_STATUS={}", alert.status));
        env.push(format!("{key}_START={}", format_timestamp(alert.starts_at.as_ref())));
        env.push(format!("{key}_END={}", format_timestamp(alert.ends_at.as_ref())));
        env.push(format!("{key}_URL={}", alert.generator_url));
        push_map(&mut env, &format!("{key}_LABEL"), &alert.labels);
        push_map(&mut env, &format!("{key}_ANNOTATION"), &alert.annotations);
    }

    env
}

/// Renders a timestamp as decimal Unix seconds, or `"0"` when it is absent or zero.
pub fn format_timestamp(timestamp: Option<&DateTime<Utc>>) -> String {
    match timestamp {
        Some(t) if !is_zero(t) => t.timestamp().to_string(),
        _ => "0".to_string(),
    }
}

fn is_zero(timestamp: &DateTime<Utc>) -> bool {
    timestamp.timestamp() == ZERO_TIME_UNIX && timestamp.timestamp_subsec_nanos() == 0
}

fn push_map(env: &mut EnvironmentVector, prefix: &str, map: &LabelSet) {
    env.extend(map.iter().map(|(k, v)| format!("{prefix}_{k}={v}")));
}
