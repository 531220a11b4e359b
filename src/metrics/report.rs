//! Console summaries printed when a run ends

use crate::frontier::FrontierStats;
use crate::metrics::MetricsSnapshot;
use crate::state::EntryState;

/// Prints the aggregated metrics to stdout
pub fn print_snapshot(snapshot: &MetricsSnapshot) {
    println!("=== Pipeline Metrics ===\n");

    println!("Totals:");
    println!("  Pages crawled: {}", snapshot.totals.crawled);
    println!("  Documents indexed: {}", snapshot.totals.indexed);
    println!("  Errors: {}", snapshot.totals.errors);
    println!();

    if !snapshot.nodes.is_empty() {
        println!("Nodes ({}):", snapshot.nodes.len());
        for node in &snapshot.nodes {
            println!(
                "  {} [{}]: crawled {}, indexed {}, errors {}, queue depth {} (at {})",
                node.node_id,
                node.role,
                node.counters.crawled,
                node.counters.indexed,
                node.counters.errors,
                node.counters.queue_depth_estimate,
                node.timestamp.format("%H:%M:%S")
            );
        }
        println!();
    }
}

/// Prints the frontier's entry counts to stdout
pub fn print_frontier_stats(stats: &FrontierStats) {
    println!("=== Frontier ===\n");

    println!("Overview:");
    println!("  Entries: {}", stats.entries);
    println!("  URL budget used: {} / {}", stats.urls_reserved, stats.max_urls);
    if stats.cancelled {
        println!("  Job was cancelled");
    }
    println!();

    println!("Entries by State:");
    let mut state_counts: Vec<(EntryState, usize)> = EntryState::all_states()
        .into_iter()
        .map(|state| (state, stats.count(state)))
        .filter(|(_, count)| *count > 0)
        .collect();
    state_counts.sort_by(|a, b| b.1.cmp(&a.1));

    for (state, count) in state_counts {
        println!("  {}: {} ({:.1}%)", state, count, percentage(count, stats.entries));
    }
    println!();

    let done = stats.count(EntryState::Done);
    println!(
        "Success Rate: {:.1}% ({} / {} entries crawled)",
        percentage(done, stats.entries),
        done,
        stats.entries
    );
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole > 0 {
        (part as f64 / whole as f64) * 100.0
    } else {
        0.0
    }
}
