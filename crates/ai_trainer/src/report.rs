//! Rendering of the risk-factor ranking and held-out metrics
//!
//! The ranking is rendered twice: as a text bar chart for the terminal and
//! as an SVG horizontal bar chart written next to the model.

use absence_ai_core::serde_canon::{write_atomic, StagedFile};
use absence_ai_core::{Attribution, PipelineError, Result};
use plotters::prelude::*;
use std::fmt::Write as _;
use std::path::Path;

use crate::metrics::ClassificationMetrics;

/// Title of both renderings
pub const CHART_TITLE: &str = "Top 10 Risk Factors";

const BAR_WIDTH: usize = 40;
const CHART_SIZE: (u32, u32) = (900, 500);

/// Text bar chart, one line per feature, widest bar for the top score
pub fn render_text(ranking: &[Attribution]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", CHART_TITLE);
    if ranking.is_empty() {
        let _ = writeln!(out, "  (no features)");
        return out;
    }

    let name_width = ranking.iter().map(|a| a.feature.len()).max().unwrap_or(0);
    let max_score = ranking.iter().map(|a| a.score).fold(0.0, f64::max);

    for attribution in ranking {
        let len = if max_score > 0.0 {
            ((attribution.score / max_score) * BAR_WIDTH as f64).round() as usize
        } else {
            0
        };
        let _ = writeln!(
            out,
            "  {:<width$}  {:<bar$}  {:.4}",
            attribution.feature,
            "█".repeat(len),
            attribution.score,
            width = name_width,
            bar = BAR_WIDTH
        );
    }
    out
}

/// Held-out metrics block
pub fn render_metrics(metrics: &ClassificationMetrics) -> String {
    format!(
        "Held-out metrics ({} rows)\n  accuracy:  {:.3}\n  precision: {:.3}\n  recall:    {:.3}\n  f1:        {:.3}\n  logloss:   {:.4}\n",
        metrics.support,
        metrics.accuracy,
        metrics.precision,
        metrics.recall,
        metrics.f1,
        metrics.log_loss
    )
}

/// Render the ranking as an SVG document; the top feature is the top bar
pub fn render_svg(ranking: &[Attribution]) -> Result<String> {
    let n = ranking.len().max(1);
    let max_score = ranking.iter().map(|a| a.score).fold(0.0, f64::max);
    let x_max = if max_score > 0.0 { max_score * 1.1 } else { 1.0 };

    // Bottom-up order so rank 0 sits at the top of the y axis
    let labels: Vec<&str> = ranking.iter().rev().map(|a| a.feature.as_str()).collect();

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, CHART_SIZE).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(CHART_TITLE, ("sans-serif", 24))
            .margin(20)
            .x_label_area_size(40)
            .y_label_area_size(200)
            .build_cartesian_2d(0f64..x_max, (0usize..n).into_segmented())
            .map_err(render_err)?;

        chart
            .configure_mesh()
            .disable_y_mesh()
            .y_labels(n + 1)
            .y_label_formatter(&|v| match v {
                SegmentValue::CenterOf(i) => labels.get(*i).map(|s| s.to_string()).unwrap_or_default(),
                _ => String::new(),
            })
            .x_desc("mean |SHAP value|")
            .draw()
            .map_err(render_err)?;

        chart
            .draw_series(
                Histogram::horizontal(&chart)
                    .style(BLUE.filled())
                    .margin(5)
                    .data(ranking.iter().rev().enumerate().map(|(i, a)| (i, a.score))),
            )
            .map_err(render_err)?;

        root.present().map_err(render_err)?;
    }
    Ok(svg)
}

fn render_err<E: std::fmt::Display>(e: E) -> PipelineError {
    PipelineError::Render(e.to_string())
}

/// Render the ranking and write it atomically to `path`
/// Render the chart into a temp file next to `path`; see [`StagedFile::commit`]
pub fn stage_svg_chart(ranking: &[Attribution], path: &Path) -> Result<StagedFile> {
    let svg = render_svg(ranking)?;
    Ok(StagedFile::new(path, svg.as_bytes())?)
}

pub fn write_svg_chart(ranking: &[Attribution], path: &Path) -> Result<()> {
    let svg = render_svg(ranking)?;
    write_atomic(path, svg.as_bytes())?;
    Ok(())
}
