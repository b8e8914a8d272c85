//! Rendering of workflow results as text or JSON on stdout.

use clap::ValueEnum;
use pipeline::{Function, ProvisionError};
use provisioners::{DeletionReport, DeployError, Deployment, Inventory};
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

fn print_json(value: &impl Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("Could not render output: {e}"),
    }
}

fn branch<T: Serialize>(result: &Result<Vec<T>, ProvisionError>) -> Value {
    match result {
        Ok(items) => json!({ "items": items }),
        Err(e) => json!({ "error": e.to_string() }),
    }
}

pub fn deployment(format: OutputFormat, deployment: &Deployment) {
    match format {
        OutputFormat::Json => print_json(deployment),
        OutputFormat::Text => {
            println!("Deployed {}", deployment.function_name);
            println!("  function:     {}", deployment.function_arn);
            println!(
                "  role:         {}{}",
                deployment.role,
                if deployment.role_created { " (created)" } else { "" }
            );
            println!("  gateway:      {}", deployment.gateway_id);
            println!("  url:          {}", deployment.url);
            println!("  subscription: {}", deployment.subscription_id);
        }
    }
}

pub fn deploy_failure(format: OutputFormat, error: &DeployError) {
    match format {
        OutputFormat::Json => print_json(&json!({
            "failed_step": error.step,
            "inconsistent": error.is_inconsistent(),
            "partial": error.partial,
            "error": error.source.to_string(),
        })),
        OutputFormat::Text => {
            println!("Deploy stopped at step '{}'", error.step);
            let partial = &error.partial;
            if let Some(name) = &partial.function_name {
                println!("  function left in place: {name}");
            }
            if let Some(id) = &partial.gateway_id {
                println!("  gateway left in place:  {id}");
            }
            if error.is_inconsistent() {
                println!("  clean up with `hookwire delete` or `hookwire delete --all`");
            }
        }
    }
}

pub fn inventory(format: OutputFormat, inventory: &Inventory) {
    match format {
        OutputFormat::Json => print_json(&json!({
            "functions": branch(&inventory.functions),
            "gateways": branch(&inventory.gateways),
            "subscriptions": branch(&inventory.subscriptions),
        })),
        OutputFormat::Text => {
            section("Functions", &inventory.functions, |f| {
                format!("{} ({:?})", f.name, f.state)
            });
            section("Gateways", &inventory.gateways, |g| format!("{} {}", g.id, g.name));
            section("Subscriptions", &inventory.subscriptions, |s| {
                format!("{} -> {} [{}]", s.id, s.url, s.enabled_events)
            });
        }
    }
}

fn section<T>(
    title: &str,
    result: &Result<Vec<T>, ProvisionError>,
    line: impl Fn(&T) -> String,
) {
    println!("{title}:");
    match result {
        Ok(items) if items.is_empty() => println!("  (none)"),
        Ok(items) => items.iter().for_each(|item| println!("  {}", line(item))),
        Err(e) => println!("  error: {e}"),
    }
}

pub fn deletion(format: OutputFormat, report: &DeletionReport) {
    match format {
        OutputFormat::Json => {
            let failures: Vec<Value> = report
                .failures
                .iter()
                .map(|f| json!({ "kind": f.kind, "id": f.id, "error": f.error.to_string() }))
                .collect();
            print_json(&json!({ "deleted": report.deleted, "failures": failures }));
        }
        OutputFormat::Text => {
            if report.deleted.is_empty() && report.failures.is_empty() {
                println!("Nothing to delete");
            }
            for deleted in &report.deleted {
                println!("Deleted {} {}", deleted.kind, deleted.id);
            }
            for failure in &report.failures {
                match &failure.id {
                    Some(id) => println!("Failed to delete {} {id}: {}", failure.kind, failure.error),
                    None => println!("Failed to list {}s: {}", failure.kind, failure.error),
                }
            }
        }
    }
}

pub fn function(format: OutputFormat, function: &Function) {
    match format {
        OutputFormat::Json => print_json(function),
        OutputFormat::Text => {
            println!("Updated {}", function.name);
            println!("  state:       {:?}", function.state);
            let keys: Vec<_> = function.environment.keys().map(String::as_str).collect();
            println!("  environment: {}", keys.join(", "));
        }
    }
}
