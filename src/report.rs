//! Plain-text formatting of analysis results

use crate::probability::Analysis;
use crate::tree::FaultTree;

/// Format an analysis result as a plain-text report
pub fn format_analysis_report(tree: &FaultTree, analysis: &Analysis) -> String {
    let mut output = String::new();

    output.push_str("=== Fault Tree Analysis Report ===\n\n");
    output.push_str(&format!("Fault tree: {}\n", tree.name()));
    if let Some(top) = tree.top_event() {
        output.push_str(&format!("Top event: {}\n", tree.orig_of(top)));
    }
    output.push_str(&format!(
        "Gates: {}\nBasic events: {}\nHouse events: {}\n\n",
        tree.inter_events().len() + 1,
        tree.reachable_basics().len(),
        tree.reachable_houses().len()
    ));

    output.push_str("--- Minimal Cut Sets ---\n");
    output.push_str(&format!(
        "Top event probability: {:.6e}\n",
        analysis.top_probability
    ));
    output.push_str(&format!("Total cut sets: {}\n", analysis.cut_sets.len()));
    output.push_str(&format!("Maximum order: {}\n", analysis.max_order));

    let mut by_order: Vec<(usize, usize)> = Vec::new();
    for cut_set in &analysis.cut_sets {
        let order = cut_set.events.len();
        match by_order.iter_mut().find(|(o, _)| *o == order) {
            Some((_, count)) => *count += 1,
            None => by_order.push((order, 1)),
        }
    }
    by_order.sort_by_key(|&(order, _)| order);
    output.push_str("\nCut sets by order:\n");
    for (order, count) in by_order {
        output.push_str(&format!("  Order {}: {} cut sets\n", order, count));
    }

    output.push_str("\nCut sets by probability:\n");
    for cut_set in analysis.cut_sets_by_probability() {
        let members = if cut_set.events.is_empty() {
            "(certain)".to_string()
        } else {
            cut_set.events.join(" AND ")
        };
        output.push_str(&format!("  {:.6e}  {}\n", cut_set.probability, members));
    }

    if !analysis.importance.is_empty() {
        output.push_str("\n--- Importance Measures ---\n");
        output.push_str(&format!("{:<30} {:>12}\n", "Event", "F-V"));
        for measure in &analysis.importance {
            output.push_str(&format!(
                "{:<30} {:>12.4}\n",
                measure.event, measure.fussell_vesely
            ));
        }
    }

    if let Some(stats) = &analysis.sample_stats {
        output.push_str("\n--- Monte Carlo ---\n");
        output.push_str(&format!("Simulations: {}\n", stats.n_simulations));
        output.push_str(&format!("Mean: {:.6e}\n", stats.mean));
        output.push_str(&format!("Std dev: {:.6e}\n", stats.std_dev));
        output.push_str(&format!(
            "Quantiles (5/50/95): {:.6e} / {:.6e} / {:.6e}\n",
            stats.q05, stats.median, stats.q95
        ));
    }

    if !analysis.warnings.is_empty() {
        output.push_str("\n--- Warnings ---\n");
        for warning in &analysis.warnings {
            output.push_str(&format!("  {}\n", warning));
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::GateKind;
    use crate::expression::ExpressionPool;
    use crate::probability::analyze;
    use crate::{AnalysisConfig, CancelToken};

    #[test]
    fn test_report_contains_sections() {
        let mut pool = ExpressionPool::new();
        let pa = pool.constant(0.1);
        let pb = pool.constant(0.2);
        let mut tree = FaultTree::new("report-demo");
        tree.add_gate("Top", GateKind::Or, &["Pump", "Valve"]).unwrap();
        tree.add_basic_event("Pump", Some(pa)).unwrap();
        tree.add_basic_event("Valve", Some(pb)).unwrap();
        tree.seal(&pool, true).unwrap();
        let analysis = analyze(
            &tree,
            &mut pool,
            &AnalysisConfig::default(),
            &CancelToken::new(),
        )
        .unwrap();

        let report = format_analysis_report(&tree, &analysis);
        assert!(report.contains("Fault Tree Analysis Report"));
        assert!(report.contains("report-demo"));
        assert!(report.contains("Minimal Cut Sets"));
        assert!(report.contains("Importance Measures"));
        assert!(report.contains("Pump"));
        assert!(report.contains("Order 1: 2 cut sets"));
    }
}
