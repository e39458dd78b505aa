use chrono::NaiveDate;

use crate::summary::ClusterSummary;

pub const TITLE: &str = "Daily News Brief";

/// Renders the brief as markdown: title and date, the insight list when
/// there is one, then one section per cluster separated by rules.
pub fn render_brief(date: NaiveDate, insights: &[String], summaries: &[ClusterSummary]) -> String {
    let mut out = format!("# {}\n\n**{}**\n\n", TITLE, date.format("%Y-%m-%d"));

    if !insights.is_empty() {
        out.push_str("## Key Insights\n\n");
        for insight in insights {
            out.push_str(&format!("- {}\n", insight));
        }
        out.push('\n');
    }

    out.push_str("## Top Stories\n\n");
    let sections: Vec<String> = summaries.iter().map(render_section).collect();
    out.push_str(&sections.join("---\n\n"));
    out
}

fn render_section(summary: &ClusterSummary) -> String {
    let topics = if summary.topics.is_empty() {
        "No topics identified".to_string()
    } else {
        summary.topics.join(", ")
    };

    let mut section = format!(
        "### {}\n\n*{} sentiment • {}*\n\n{}\n\n",
        summary.title,
        summary.label.capitalized(),
        topics,
        summary.summary
    );
    if !summary.sources.is_empty() {
        section.push_str(&format!("*Sources: {}*\n\n", summary.sources.join(", ")));
    }
    section
}
