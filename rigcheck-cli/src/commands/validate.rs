//! `rigcheck validate` command handler

use std::io::Write;

use serde::Serialize;
use tracing::info;

use rigcheck_core::types::EntityKindTag;

use crate::cli::ValidateArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};
use crate::plan::{PlanEntity, RunPlan};

/// Execute the `validate` command.
///
/// Parses the plan, builds the entity tree (required fields, unique names,
/// known hook stages) and prints it without running anything.
pub async fn execute(args: ValidateArgs, writer: &OutputWriter) -> Result<(), CliError> {
    info!(plan = %args.plan.display(), "validating plan");

    let plan = RunPlan::load(&args.plan).await?;
    plan.build()?;
    let hooks = plan.hooks()?;

    let report = PlanReport::new(args.plan.display().to_string(), &plan, hooks.len());
    writer.render(&report)
}

/// A validated plan, flattened in execution order.
#[derive(Debug, Serialize)]
pub struct PlanReport {
    pub source: String,
    pub hooks: usize,
    pub entities: Vec<PlanNode>,
}

/// One entity line of the plan tree.
#[derive(Debug, Serialize)]
pub struct PlanNode {
    pub name: String,
    pub kind: EntityKindTag,
    pub depth: usize,
    pub parallel: bool,
}

impl PlanReport {
    pub fn new(source: String, plan: &RunPlan, hooks: usize) -> Self {
        fn visit(entities: &[PlanEntity], depth: usize, out: &mut Vec<PlanNode>) {
            for entity in entities {
                out.push(PlanNode {
                    name: entity.name().to_owned(),
                    kind: entity.kind(),
                    depth,
                    parallel: entity.is_parallel(),
                });
                visit(entity.children(), depth + 1, out);
            }
        }

        let mut entities = Vec::with_capacity(plan.entity_count());
        visit(&plan.entities, 0, &mut entities);
        Self {
            source,
            hooks,
            entities,
        }
    }
}

impl Render for PlanReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Plan: {}", self.source.bold())?;
        writeln!(
            w,
            "  {} entities, {} hooks -- {}",
            self.entities.len(),
            self.hooks,
            "VALID".green().bold()
        )?;
        writeln!(w)?;
        for node in &self.entities {
            let marker = if node.parallel { " [parallel]" } else { "" };
            writeln!(
                w,
                "{}{} ({}){}",
                "  ".repeat(node.depth + 1),
                node.name,
                node.kind,
                marker.cyan()
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_report_flattens_tree_in_order() {
        let plan = RunPlan::parse(
            r#"
[[entity]]
kind = "group"
name = "io"
parallel = true
[[entity.children]]
kind = "case"
name = "io-read"
procedure = "true"

[[entity]]
kind = "case"
name = "ping"
procedure = "true"
"#,
        )
        .unwrap();

        let report = PlanReport::new("plan.toml".to_owned(), &plan, 0);
        let shape: Vec<(&str, usize)> = report
            .entities
            .iter()
            .map(|n| (n.name.as_str(), n.depth))
            .collect();
        assert_eq!(shape, [("io", 0), ("io-read", 1), ("ping", 0)]);
        assert!(report.entities[0].parallel);
    }

    #[test]
    fn test_plan_report_render_text() {
        colored::control::set_override(false);
        let plan = RunPlan::parse(
            "[[entity]]\nkind = \"case\"\nname = \"ping\"\nparallel = true\nprocedure = \"true\"\n",
        )
        .unwrap();
        let report = PlanReport::new("plan.toml".to_owned(), &plan, 2);

        let mut buffer = Vec::new();
        report.render_text(&mut buffer).unwrap();
        let output = String::from_utf8(buffer).unwrap();
        assert!(output.contains("1 entities, 2 hooks"));
        assert!(output.contains("  ping (case) [parallel]"));
    }
}
