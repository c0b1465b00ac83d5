//! HTML status pages served at `/ruler/ring`.

use std::fmt::Write as _;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::desc::RingDesc;

const SHARDING_DISABLED: &str = r#"<!DOCTYPE html>
<html>
	<head>
		<meta charset="UTF-8">
		<title>Cortex Ruler Status</title>
	</head>
	<body>
		<h1>Cortex Ruler Status</h1>
		<p>Ruler running with shards disabled</p>
	</body>
</html>"#;

/// Static page served when the ruler runs without a ring.
pub fn sharding_disabled_page() -> &'static str {
    SHARDING_DISABLED
}

/// Member table with state, heartbeat age and share of the token space.
pub fn render(desc: &RingDesc, heartbeat_timeout: Duration, now: DateTime<Utc>) -> String {
    let ownership = token_ownership(desc);

    let mut html = String::from(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n\
         <title>Cortex Ruler Ring Status</title>\n</head>\n<body>\n\
         <h1>Cortex Ruler Ring Status</h1>\n",
    );
    let _ = writeln!(html, "<p>Current time: {}</p>", now.to_rfc3339());
    html.push_str(
        "<table border=\"1\">\n<thead><tr><th>Instance ID</th><th>Address</th>\
         <th>State</th><th>Last Heartbeat</th><th>Tokens</th><th>Ownership</th></tr></thead>\n<tbody>\n",
    );

    for (id, inst) in &desc.instances {
        let state = if inst.is_alive(now, heartbeat_timeout) {
            inst.state.to_string()
        } else {
            "UNHEALTHY".to_string()
        };
        let age = now.signed_duration_since(inst.heartbeat).num_seconds().max(0);
        let pct = ownership.get(id.as_str()).copied().unwrap_or(0.0);
        let _ = writeln!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}s ago</td><td>{}</td><td>{:.2}%</td></tr>",
            escape(id),
            escape(&inst.addr),
            state,
            age,
            inst.tokens.len(),
            pct
        );
    }

    html.push_str("</tbody>\n</table>\n</body>\n</html>\n");
    html
}

/// Percentage of the 32-bit token space each instance owns.
///
/// Each token owns the range from the previous token (exclusive) up to itself.
fn token_ownership(desc: &RingDesc) -> std::collections::HashMap<&str, f64> {
    let mut out = std::collections::HashMap::new();
    let tokens = desc.sorted_tokens();
    if tokens.is_empty() {
        return out;
    }
    let space = u32::MAX as f64 + 1.0;
    for (i, (token, id)) in tokens.iter().enumerate() {
        let prev = if i == 0 {
            tokens[tokens.len() - 1].0
        } else {
            tokens[i - 1].0
        };
        let span = token.wrapping_sub(prev) as f64;
        // A single token owns the whole ring.
        let span = if tokens.len() == 1 { space } else { span };
        if let Some((key, _)) = desc.instances.get_key_value(id) {
            *out.entry(key.as_str()).or_insert(0.0) += span / space * 100.0;
        }
    }
    out
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
