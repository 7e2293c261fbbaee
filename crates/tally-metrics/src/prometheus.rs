//! Prometheus text exposition format.
//!
//! Renders a snapshot into the Prometheus text exposition format so a
//! collector agent can scrape the same window that gets published.

use std::fmt::{Display, Write};

use tally_core::Snapshot;

use crate::accumulator::{Counter, Observable};

/// Naming options for the rendered families.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpositionOptions {
    /// Prepended to every family name as `<prefix>_`. Empty for none.
    pub prefix: String,
    /// Append `_total` to counter families.
    pub append_total: bool,
}

impl Default for ExpositionOptions {
    fn default() -> Self {
        Self {
            prefix: "tally".to_string(),
            append_total: true,
        }
    }
}

/// Render one snapshot into Prometheus text format.
///
/// Counters (built-in and custom) become COUNTER families; observables,
/// anchor ages and aggregate mean/max/count become GAUGE families. Every
/// sample carries a `node` label with the node id.
pub fn render_prometheus(snapshot: &Snapshot, options: &ExpositionOptions) -> String {
    let mut out = String::new();
    let node = escape_label(&snapshot.node_identity.id);

    for counter in Counter::ALL {
        let value = match counter {
            Counter::RecentCompletedRequests => snapshot.recent_completed_requests,
            Counter::RecentErrors => snapshot.recent_errors,
        };
        let help = match counter {
            Counter::RecentCompletedRequests => "Requests completed in the current window.",
            Counter::RecentErrors => "Errors recorded in the current window.",
        };
        let name = counter_name(options, counter.metric_name());
        family(&mut out, &name, help, "counter", &node, value);
    }

    for observable in Observable::ALL {
        let value = match observable {
            Observable::TotalPinnedStreams => snapshot.total_pinned_streams,
            Observable::TotalIndexedModels => snapshot.total_indexed_models,
            Observable::CurrentPendingRequests => snapshot.current_pending_requests,
        };
        let help = match observable {
            Observable::TotalPinnedStreams => "Streams currently pinned.",
            Observable::TotalIndexedModels => "Models currently indexed.",
            Observable::CurrentPendingRequests => "Requests currently pending.",
        };
        let name = gauge_name(options, observable.metric_name());
        family(&mut out, &name, help, "gauge", &node, value);
    }

    family(
        &mut out,
        &gauge_name(options, "mean_anchor_request_age_ms"),
        "Mean age of anchor requests in the current window, in milliseconds.",
        "gauge",
        &node,
        snapshot.mean_anchor_request_age_ms,
    );
    family(
        &mut out,
        &gauge_name(options, "max_anchor_request_age_ms"),
        "Max age of anchor requests in the current window, in milliseconds.",
        "gauge",
        &node,
        snapshot.max_anchor_request_age_ms,
    );

    for (name, value) in &snapshot.custom_counters {
        let name = counter_name(options, &sanitize_name(name));
        family(&mut out, &name, "Custom counter.", "counter", &node, *value);
    }
    for (name, value) in &snapshot.custom_observables {
        let name = gauge_name(options, &sanitize_name(name));
        family(&mut out, &name, "Custom observable.", "gauge", &node, *value);
    }
    for (name, summary) in &snapshot.custom_aggregates {
        let base = gauge_name(options, &sanitize_name(name));
        let mean = format!("{base}_mean");
        let max = format!("{base}_max");
        let count = format!("{base}_count");
        family(&mut out, &mean, "Mean of window samples.", "gauge", &node, summary.mean);
        family(&mut out, &max, "Max of window samples.", "gauge", &node, summary.max);
        family(&mut out, &count, "Samples in the window.", "gauge", &node, summary.count);
    }

    out
}

fn family(
    out: &mut String,
    name: &str,
    help: &str,
    kind: &str,
    node: &str,
    value: impl Display,
) {
    // Writing to a String cannot fail.
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
    let _ = writeln!(out, "{name}{{node=\"{node}\"}} {value}");
}

fn gauge_name(options: &ExpositionOptions, base: &str) -> String {
    if options.prefix.is_empty() {
        base.to_string()
    } else {
        format!("{}_{base}", options.prefix)
    }
}

fn counter_name(options: &ExpositionOptions, base: &str) -> String {
    let name = gauge_name(options, base);
    if options.append_total && !name.ends_with("_total") {
        format!("{name}_total")
    } else {
        name
    }
}

/// Map a free-form name onto `[a-zA-Z_:][a-zA-Z0-9_:]*`.
fn sanitize_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == ':' { c } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

fn escape_label(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}
