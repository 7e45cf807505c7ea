use crate::model::{CheckReport, CheckResult, GitRef};
use crate::status::{status_label, user_repo, Status};
use anyhow::Result;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct CheckRow {
    #[tabled(rename = "Package")]
    package: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Repository")]
    repository: String,
    #[tabled(rename = "Ref")]
    git_ref: String,
    #[tabled(rename = "Status")]
    status: String,
}

pub fn print_cli_table(report: &CheckReport) -> Result<()> {
    println!();
    println!(
        "Checked at: {}",
        report.checked_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();

    if report.results.is_empty() {
        println!("No packages checked.");
        return Ok(());
    }

    let rows: Vec<CheckRow> = report
        .results
        .iter()
        .map(|result| CheckRow {
            package: truncate(&result.hex_package.name, 30),
            version: result.hex_package.version.clone(),
            repository: result
                .git_url
                .as_deref()
                .and_then(user_repo)
                .unwrap_or_else(|| "-".to_string()),
            git_ref: result
                .git_ref
                .as_ref()
                .map(GitRef::describe)
                .unwrap_or_else(|| "-".to_string()),
            status: format_status(Status::of(result)),
        })
        .collect();

    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);

    print_details(report);

    println!();
    print_summary(report);

    Ok(())
}

/// Expanded detail blocks for results whose one-word status isn't the
/// whole story.
fn print_details(report: &CheckReport) {
    for result in &report.results {
        match Status::of(result) {
            Status::Corrupt => {
                println!();
                println!(
                    "{} {} differs from its source:",
                    result.hex_package.name, result.hex_package.version
                );
                for diff in &result.diffs {
                    println!("  {}", diff);
                }
            }
            Status::Absolved => {
                println!();
                println!("{}", status_line(result));
            }
            Status::Unresolved => {
                if let Some(reason) = &result.error_reason {
                    println!();
                    println!(
                        "{} {} unresolved: {}",
                        result.hex_package.name, result.hex_package.version, reason
                    );
                }
            }
            Status::Honest => {}
        }
    }
}

fn status_line(result: &CheckResult) -> String {
    format!(
        "{} {} {}",
        result.hex_package.name,
        result.hex_package.version,
        status_label(result)
    )
}

fn format_status(status: Status) -> String {
    match status {
        Status::Honest => "\x1b[32mhonest\x1b[0m".to_string(),
        Status::Absolved => "\x1b[32mabsolved\x1b[0m".to_string(),
        Status::Unresolved => "\x1b[33munresolved\x1b[0m".to_string(),
        Status::Corrupt => "\x1b[31mcorrupt\x1b[0m".to_string(),
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", &s[..max_len - 3])
    }
}

fn print_summary(report: &CheckReport) {
    let count = |status: Status| {
        report
            .results
            .iter()
            .filter(|r| Status::of(r) == status)
            .count()
    };

    println!("Summary:");
    println!("  Total packages: {}", report.results.len());
    println!(
        "  {} honest, {} corrupt, {} unresolved, {} absolved",
        count(Status::Honest),
        count(Status::Corrupt),
        count(Status::Unresolved),
        count(Status::Absolved)
    );
}
