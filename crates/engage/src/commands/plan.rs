//! Plan inspection

use anyhow::Result;
use engage_install::{InstallPlan, InstallPlanBuilder};
use owo_colors::OwoColorize;
use tabled::{settings::Style, Table, Tabled};

use super::read_resources;
use crate::cli::PlanArgs;
use crate::output;

#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "#")]
    position: usize,
    id: String,
    #[tabled(rename = "resource")]
    key: String,
    host: String,
    #[tabled(rename = "depends on")]
    depends_on: String,
}

pub fn run(args: PlanArgs) -> Result<()> {
    let resources = read_resources(args.resources.as_std_path())?;
    let plan = InstallPlanBuilder::new(resources).build()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan_json(&plan))?);
        return Ok(());
    }

    output::header(&format!("Install order ({} resources)", plan.len()));
    let table = Table::new(plan_rows(&plan)).with(Style::sharp()).to_string();
    println!("{}", table);

    if let Some(target) = plan.install_target() {
        output::kv("Install target", &target.id);
    }

    let partitions = plan.partition_by_host();
    output::header(&format!("Hosts ({})", partitions.len()));
    for partition in partitions {
        println!("  {}", partition.host.cyan().bold());
        for id in &partition.resources {
            println!("    {} {}", "•".dimmed(), id);
        }
    }
    Ok(())
}

fn plan_rows(plan: &InstallPlan) -> Vec<PlanRow> {
    let partitions = plan.partition_by_host();
    plan.resources()
        .into_iter()
        .enumerate()
        .map(|(i, resource)| PlanRow {
            position: i + 1,
            id: resource.id.clone(),
            key: resource.key.to_string(),
            host: partitions
                .iter()
                .find(|p| p.resources.contains(&resource.id))
                .map(|p| p.host.clone())
                .unwrap_or_default(),
            depends_on: resource.dependency_ids().collect::<Vec<_>>().join(", "),
        })
        .collect()
}

fn plan_json(plan: &InstallPlan) -> serde_json::Value {
    let hosts: Vec<serde_json::Value> = plan
        .partition_by_host()
        .into_iter()
        .map(|p| serde_json::json!({ "host": p.host, "resources": p.resources }))
        .collect();
    serde_json::json!({
        "order": plan.order(),
        "install_target": plan.install_target().map(|r| r.id.clone()),
        "hosts": hosts,
    })
}
