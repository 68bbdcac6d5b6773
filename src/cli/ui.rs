use crate::discovery::{DiscoveryOutcome, DiscoveryReport};
use colored::Colorize;
use comfy_table::{Table, presets::UTF8_FULL};

pub fn display_success(message: &str) {
    println!("{} {}", "Success:".green().bold(), message);
}

pub fn display_error(message: &str) {
    eprintln!("{} {}", "Error:".red().bold(), message);
}

pub fn display_warning(message: &str) {
    println!("{} {}", "Warning:".yellow().bold(), message);
}

pub fn display_info(message: &str) {
    println!("{} {}", "Info:".cyan(), message);
}

pub fn display_report(report: &DiscoveryReport) {
    if report.resource_count() == 0 {
        println!("No resources discovered");
    } else {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_header(vec!["Service", "Href", "Types", "Interfaces", "Obs"]);

        for service in &report.services {
            for resource in &service.resources {
                table.add_row(vec![
                    service.address.clone(),
                    resource.href.clone(),
                    resource.resource_types.join(", "),
                    resource.interfaces.join(", "),
                    if resource.observable { "yes" } else { "" }.to_string(),
                ]);
            }
        }

        println!(
            "Discovered {} resource(s) on {} service(s):",
            report.resource_count(),
            report.services.len()
        );
        println!("{table}");
    }

    match report.outcome {
        DiscoveryOutcome::Completed => display_success("Discovery completed"),
        DiscoveryOutcome::Failed { ref reason } => display_error(reason),
        DiscoveryOutcome::Released | DiscoveryOutcome::Pending => {
            display_warning("Discovery ended without a result")
        }
    }
}
