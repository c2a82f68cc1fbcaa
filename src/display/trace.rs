use crate::compute::{Breakdown, ExecutionResult};
use crate::graph::PricingGraph;
use crate::store::{CombineOperator, FactorConfig, NodeId, NodeKind};
use std::collections::HashMap;
use std::fmt::Write;

/// Renders the evaluated tree below the output node, one line per node, with
/// each Controls node's step-by-step deltas.
pub fn format_trace(graph: &PricingGraph, result: &ExecutionResult) -> String {
    let mut tracer = Tracer { graph, result, visited_at_level: HashMap::new(), output: String::new() };

    let _ = writeln!(tracer.output, "AUDIT TRACE for node '{}':", graph.output_id());
    let _ = writeln!(tracer.output, "--------------------------------------------------");
    tracer.trace_node(graph.output(), 1, "");
    let _ = writeln!(tracer.output, "--------------------------------------------------");
    let _ = writeln!(tracer.output, "RESULT: {}", result.value.normalize());
    tracer.output
}

struct Tracer<'a> {
    graph: &'a PricingGraph,
    result: &'a ExecutionResult,
    visited_at_level: HashMap<NodeId, usize>,
    output: String,
}

impl<'a> Tracer<'a> {
    fn trace_node(&mut self, node_id: NodeId, level: usize, prefix: &str) {
        if let Some(&first_seen) = self.visited_at_level.get(&node_id) {
            let _ = writeln!(self.output, "{}-> {} (Ref to L{})", prefix, self.graph.id(node_id), first_seen);
            return;
        }
        self.visited_at_level.insert(node_id, level);

        let line_header = format!("[L{}] {}{}", level, self.graph.id(node_id), self.format_value(node_id));
        let parents = self.graph.predecessors(node_id);

        match self.graph.kind(node_id) {
            NodeKind::Factor(cfg) => {
                let _ = writeln!(self.output, "{}{} -> Var({})", prefix, line_header, format_source(cfg));
            }
            NodeKind::Transform(cfg) => {
                let args = self.format_args(parents);
                let _ = match &cfg.reference {
                    Some(reference) => {
                        writeln!(self.output, "{}{} = {}({}, {})", prefix, line_header, cfg.operation, args, reference)
                    }
                    None => writeln!(self.output, "{}{} = {}({})", prefix, line_header, cfg.operation, args),
                };
                self.recurse_children(prefix, parents, level);
            }
            NodeKind::Convert(cfg) => {
                let args = self.format_args(parents);
                let _ = writeln!(self.output, "{}{} = convert({}, {} -> {})", prefix, line_header, args, cfg.from, cfg.to);
                self.recurse_children(prefix, parents, level);
            }
            NodeKind::Combine(cfg) => {
                let formula = self.format_combine(cfg.operator, parents);
                let _ = writeln!(self.output, "{}{} = {}", prefix, line_header, formula);
                self.print_breakdown(prefix, node_id);
                self.recurse_children(prefix, parents, level);
            }
            NodeKind::Controls(_) => {
                let args = self.format_args(parents);
                let _ = writeln!(self.output, "{}{} = controls({})", prefix, line_header, args);
                self.print_breakdown(prefix, node_id);
                self.recurse_children(prefix, parents, level);
            }
            NodeKind::Output => {
                let _ = writeln!(self.output, "{}{} = {}", prefix, line_header, self.format_args(parents));
                self.recurse_children(prefix, parents, level);
            }
        }
    }

    fn recurse_children(&mut self, prefix: &str, children: &[NodeId], level: usize) {
        let stem = build_child_stem(prefix);
        for (i, &child) in children.iter().enumerate() {
            let connector = if i == children.len() - 1 { "`--" } else { "|--" };
            self.trace_node(child, level + 1, &format!("{}{}", stem, connector));
        }
    }

    fn print_breakdown(&mut self, prefix: &str, node_id: NodeId) {
        let stem = build_child_stem(prefix);
        match self.result.breakdowns.get(self.graph.id(node_id)) {
            Some(Breakdown::Controls(outcome)) => {
                let _ = writeln!(
                    self.output,
                    "{}|  delta {}% -> band {}% -> sharing {}% -> cap/floor {}%",
                    stem,
                    outcome.raw_delta.normalize(),
                    outcome.after_band.normalize(),
                    outcome.after_sharing.normalize(),
                    outcome.final_delta.normalize()
                );
            }
            Some(Breakdown::WeightedTerms { terms, total_weight }) => {
                let terms: Vec<String> = terms.iter().map(|t| t.normalize().to_string()).collect();
                let _ = writeln!(
                    self.output,
                    "{}|  terms [{}] / total weight {}",
                    stem,
                    terms.join(", "),
                    total_weight.normalize()
                );
            }
            None => {}
        }
    }

    fn format_combine(&self, operator: CombineOperator, parents: &[NodeId]) -> String {
        let sym = match operator {
            CombineOperator::Add => " + ",
            CombineOperator::Subtract => " - ",
            CombineOperator::Multiply => " * ",
            CombineOperator::Divide => " / ",
            CombineOperator::Average => return format!("average({})", self.format_args(parents)),
            CombineOperator::WeightedAverage => return format!("weighted_average({})", self.format_args(parents)),
        };
        parents.iter().map(|&p| self.format_parent_ref(p)).collect::<Vec<_>>().join(sym)
    }

    fn format_args(&self, parents: &[NodeId]) -> String {
        parents.iter().map(|&p| self.format_parent_ref(p)).collect::<Vec<_>>().join(", ")
    }

    fn format_parent_ref(&self, id: NodeId) -> String {
        format!("{}{}", self.graph.id(id), self.format_value(id))
    }

    /// Nodes shadowed by an override were never evaluated.
    fn format_value(&self, id: NodeId) -> String {
        match self.result.contributions.get(self.graph.id(id)) {
            Some(v) => format!("[{}]", v.normalize()),
            None => "[?]".to_string(),
        }
    }
}

fn format_source(cfg: &FactorConfig) -> String {
    match (&cfg.value, &cfg.reference, cfg.base_price) {
        (Some(v), _, _) => v.normalize().to_string(),
        (_, Some(key), _) => key.clone(),
        _ => "basePrice".to_string(),
    }
}

fn build_child_stem(current_prefix: &str) -> String {
    current_prefix.replace("`--", "   ").replace("|--", "|  ")
}
