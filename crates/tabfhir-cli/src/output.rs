//! Output formatting and reporting

use colored::*;
use tabfhir_core::export::ConversionStats;
use tabfhir_core::{InputIssue, IssueSeverity};

/// Summary statistics for a conversion run
#[derive(Debug, Clone, Default)]
pub struct ConvertSummary {
    pub subjects: usize,
    pub bundles_written: usize,
    pub failed: usize,
    pub documents: usize,
    pub fields_written: usize,
    pub fields_skipped: usize,
    pub references: usize,
}

impl ConvertSummary {
    pub fn new(subjects: usize) -> Self {
        Self {
            subjects,
            ..Self::default()
        }
    }

    pub fn record(&mut self, stats: &ConversionStats) {
        self.bundles_written += 1;
        self.documents += stats.documents;
        self.fields_written += stats.fields_written;
        self.fields_skipped += stats.fields_skipped;
        self.references += stats.links.applied;
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub fn print(&self) {
        println!();
        println!("{}", "Conversion Summary".bold());
        println!("  Subjects:        {}", self.subjects);
        println!(
            "  Bundles written: {}",
            self.bundles_written.to_string().green()
        );
        if self.failed > 0 {
            println!("  Failed:          {}", self.failed.to_string().red().bold());
        }
        println!("  Documents:       {}", self.documents);
        println!("  Fields written:  {}", self.fields_written);
        if self.fields_skipped > 0 {
            println!(
                "  Fields skipped:  {}",
                self.fields_skipped.to_string().yellow()
            );
        }
        println!("  References:      {}", self.references);
    }
}

/// Print check results; returns the number of errors
pub fn print_issues(issues: &[InputIssue]) -> usize {
    let mut errors = 0;
    for issue in issues {
        match issue.severity {
            IssueSeverity::Error => {
                errors += 1;
                println!("{} {}", "error:".red().bold(), issue);
            }
            IssueSeverity::Warning => println!("{} {}", "warning:".yellow().bold(), issue),
        }
    }

    let warnings = issues.len() - errors;
    if issues.is_empty() {
        println!("{}", "✓ No problems found".green());
    } else {
        println!();
        println!("Found {} error(s), {} warning(s)", errors, warnings);
    }
    errors
}
