//! Printed statistical tables.
//!
//! The only persisted artifacts of a run are figures and these tables; the
//! report renders ANOVA and estimated-means results as aligned text for the
//! console or as JSON for downstream tooling.

use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::anova::SignificanceReport;
use crate::data::{Column, DataTable};
use crate::emmeans::EmmeansTable;
use crate::error::{PhytostatError, Result};
use crate::stratify::StratificationPlan;

/// Output format for rendered reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
}

impl std::str::FromStr for ReportFormat {
    type Err = PhytostatError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            other => Err(PhytostatError::Config(format!(
                "unknown report format '{}'",
                other
            ))),
        }
    }
}

/// Everything one experiment run reports to the analyst.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub experiment: String,
    pub response: String,
    /// Per-group descriptive statistics, including any descriptive-only
    /// response columns
    pub summary: Option<DataTable>,
    pub anova: SignificanceReport,
    pub plan: StratificationPlan,
    /// One table for the full model, or one per stratum
    pub means: Vec<(String, EmmeansTable)>,
    pub figure: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ExperimentReport {
    pub fn render(&self, format: ReportFormat) -> Result<String> {
        match format {
            ReportFormat::Text => Ok(self.to_text()),
            ReportFormat::Json => serde_json::to_string_pretty(self)
                .map_err(|e| PhytostatError::Config(e.to_string())),
        }
    }

    fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "\n{}\n",
            format!("== {} ({}) ==", self.experiment, self.response)
                .bold()
                .to_string()
        ));

        if let Some(summary) = &self.summary {
            out.push_str(&format!("\n{}\n", "Group summary".underline()));
            out.push_str(&render_table(summary));
        }

        out.push_str(&format!("\n{}\n", "ANOVA (likelihood-ratio chi-square)".underline()));
        out.push_str(&format!(
            "{:<28} {:>10} {:>4} {:>10}\n",
            "Term", "Chi.sq", "Df", "Pr(>Chisq)"
        ));
        for term in &self.anova.terms {
            let p = format_p(term.p_value);
            let line = format!(
                "{:<28} {:>10.3} {:>4} {:>10}\n",
                term.term, term.chi_square, term.df, p
            );
            if term.p_value < 0.05 {
                out.push_str(&line.green().to_string());
            } else {
                out.push_str(&line);
            }
        }

        if let StratificationPlan::ByFactor(factor) = &self.plan {
            out.push_str(&format!(
                "\n{}\n",
                format!(
                    "Significant interaction: means estimated separately per level of '{}'",
                    factor
                )
                .yellow()
                .to_string()
            ));
        }

        for (label, table) in &self.means {
            out.push_str(&format!(
                "\n{}\n",
                format!(
                    "Estimated marginal means, {} ({:.0}% CI)",
                    label,
                    table.confidence * 100.0
                )
                .underline()
            ));
            out.push_str(&format!(
                "{:<28} {:>10} {:>8} {:>10} {:>10}  {}\n",
                "Group", "Mean", "SE", "Lower", "Upper", "Letters"
            ));
            for mean in &table.means {
                out.push_str(&format!(
                    "{:<28} {:>10.3} {:>8.3} {:>10.3} {:>10.3}  {}\n",
                    mean.group, mean.estimate, mean.se, mean.lower, mean.upper, mean.letters
                ));
            }
        }

        if let Some(figure) = &self.figure {
            out.push_str(&format!("\nFigure: {}\n", figure));
        }
        out
    }
}

/// Columnar text rendering of an arbitrary table, 14 characters per column.
fn render_table(table: &DataTable) -> String {
    let mut out = String::new();
    for name in table.column_names() {
        out.push_str(&format!("{:<14} ", name));
    }
    out.push('\n');
    for row in 0..table.n_rows() {
        for name in table.column_names() {
            match table.column(name) {
                Ok(Column::Categorical(v)) => out.push_str(&format!("{:<14} ", v[row])),
                Ok(Column::Numeric(v)) => out.push_str(&format!("{:<14.3} ", v[row])),
                Err(_) => {}
            }
        }
        out.push('\n');
    }
    out
}

fn format_p(p: f64) -> String {
    if p < 0.001 {
        "<0.001".to_string()
    } else {
        format!("{:.4}", p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anova::TermTest;
    use crate::emmeans::EstimatedMean;

    fn sample_report() -> ExperimentReport {
        ExperimentReport {
            experiment: "perithecia".to_string(),
            response: "ppi".to_string(),
            summary: None,
            anova: SignificanceReport {
                response: "ppi".to_string(),
                terms: vec![TermTest {
                    term: "substrate".to_string(),
                    chi_square: 18.4,
                    df: 1,
                    p_value: 0.00002,
                }],
            },
            plan: StratificationPlan::None,
            means: vec![(
                "full model".to_string(),
                EmmeansTable {
                    response: "ppi".to_string(),
                    factors: vec!["substrate".to_string()],
                    confidence: 0.95,
                    means: vec![EstimatedMean {
                        group: "wheat".to_string(),
                        estimate: 62.1,
                        se: 3.2,
                        lower: 55.4,
                        upper: 68.8,
                        letters: "A".to_string(),
                    }],
                },
            )],
            figure: Some("figures/perithecia.png".to_string()),
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_text_report_contains_tables() {
        let text = sample_report().render(ReportFormat::Text).unwrap();
        assert!(text.contains("ANOVA"));
        assert!(text.contains("substrate"));
        assert!(text.contains("<0.001"));
        assert!(text.contains("wheat"));
        assert!(text.contains("figures/perithecia.png"));
    }

    #[test]
    fn test_json_report_round_trips() {
        let json = sample_report().render(ReportFormat::Json).unwrap();
        let parsed: ExperimentReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.experiment, "perithecia");
        assert_eq!(parsed.anova.terms.len(), 1);
    }

    #[test]
    fn test_stratified_report_mentions_policy() {
        let mut report = sample_report();
        report.plan = StratificationPlan::ByFactor("temperature".to_string());
        let text = report.render(ReportFormat::Text).unwrap();
        assert!(text.contains("per level of 'temperature'"));
    }

    #[test]
    fn test_summary_table_rendered_when_present() {
        let mut report = sample_report();
        report.summary = Some(
            DataTable::from_columns(vec![
                (
                    "population".to_string(),
                    Column::Categorical(vec!["Fg_wt".to_string(), "Fa_wt".to_string()]),
                ),
                ("n".to_string(), Column::Numeric(vec![9.0, 9.0])),
                ("mean".to_string(), Column::Numeric(vec![6.8, 5.3])),
                ("sd".to_string(), Column::Numeric(vec![0.2, 0.3])),
                ("se".to_string(), Column::Numeric(vec![0.07, 0.1])),
                (
                    "germination_mean".to_string(),
                    Column::Numeric(vec![85.0, 82.0]),
                ),
                (
                    "germination_sd".to_string(),
                    Column::Numeric(vec![1.0, 1.5]),
                ),
                (
                    "germination_se".to_string(),
                    Column::Numeric(vec![0.3, 0.5]),
                ),
            ])
            .unwrap(),
        );
        let text = report.render(ReportFormat::Text).unwrap();
        assert!(text.contains("Group summary"));
        assert!(text.contains("germination_mean"));
        assert!(text.contains("Fg_wt"));
        // absent summary leaves the section out entirely
        let bare = sample_report().render(ReportFormat::Text).unwrap();
        assert!(!bare.contains("Group summary"));
    }

    #[test]
    fn test_format_p_threshold() {
        assert_eq!(format_p(0.0004), "<0.001");
        assert_eq!(format_p(0.0421), "0.0421");
    }
}
