//! Pure helpers for node identity and uptime parsing
//!
//! Brokers report nodes as `name@host`. Metrics key on the host part only,
//! with IPs normalized and DNS names cut at the first label.

use std::net::IpAddr;

/// Canonicalize a broker node name.
///
/// `emqx@10.0.0.5` becomes `10.0.0.5`, `emqx@broker.example.com` becomes
/// `broker`, and a name without exactly one `@` passes through unchanged.
pub fn cut_node_name(node_name: &str) -> String {
    let mut parts = node_name.splitn(2, '@');
    let (Some(_), Some(host)) = (parts.next(), parts.next()) else {
        return node_name.to_string();
    };
    if host.is_empty() || host.contains('@') {
        return node_name.to_string();
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.to_string();
    }
    match host.find('.') {
        Some(pos) if pos > 0 => host[..pos].to_string(),
        _ => host.to_string(),
    }
}

/// Parse a human-phrased uptime like `"2 days, 19 hours, 41 minutes,
/// 47 seconds"` into seconds. Unrecognized units contribute nothing.
pub fn parse_human_uptime(uptime: &str) -> i64 {
    let mut seconds = 0i64;
    for part in uptime.split(", ") {
        let mut fields = part.split_whitespace();
        let (Some(count), Some(unit)) = (fields.next(), fields.next()) else {
            continue;
        };
        let Ok(count) = count.parse::<i64>() else {
            continue;
        };
        seconds += match unit {
            "days" | "day" => count * 60 * 60 * 24,
            "hours" | "hour" => count * 60 * 60,
            "minutes" | "minute" => count * 60,
            "seconds" | "second" => count,
            _ => 0,
        };
    }
    seconds
}
