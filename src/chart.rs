//! Stacked bar charts for series tables.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Phase;
use crate::schema::Subsystem;
use crate::series::SeriesTable;

#[derive(Debug, thiserror::Error)]
pub enum ChartError {
    #[error("cannot chart an empty series table")]
    Empty,

    #[error("failed to write chart {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Draws one stacked bar per table column, one segment per row.
pub trait ChartRenderer {
    /// File extension of the produced artifacts, without the dot.
    fn extension(&self) -> &'static str;

    fn render(&self, title: &str, table: &SeriesTable, path: &Path) -> Result<(), ChartError>;
}

/// Artifact name for one subsystem and phase, e.g. `pmdk-load.svg`.
pub fn chart_file_name(subsystem: Subsystem, phase: Phase, extension: &str) -> String {
    format!("{subsystem}-{phase}.{extension}")
}

const PALETTE: [&str; 10] = [
    "#4e79a7", "#f28e2b", "#e15759", "#76b7b2", "#59a14f", "#edc948", "#b07aa1", "#ff9da7",
    "#9c755f", "#86bcb6",
];
const OTHER_COLOR: &str = "#bab0ac";

/// Self-contained SVG renderer.
#[derive(Debug, Clone)]
pub struct SvgChart {
    bar_width: f64,
    bar_gap: f64,
    plot_height: f64,
}

impl Default for SvgChart {
    fn default() -> Self {
        Self {
            bar_width: 48.0,
            bar_gap: 32.0,
            plot_height: 300.0,
        }
    }
}

impl SvgChart {
    const MARGIN_LEFT: f64 = 60.0;
    const MARGIN_TOP: f64 = 40.0;
    const MARGIN_BOTTOM: f64 = 50.0;
    const LEGEND_WIDTH: f64 = 200.0;
    const LEGEND_ROW: f64 = 18.0;

    /// Render `table` to an SVG document.
    pub fn to_svg(&self, title: &str, table: &SeriesTable) -> Result<String, ChartError> {
        if table.value_sizes.is_empty() || table.rows.is_empty() {
            return Err(ChartError::Empty);
        }

        let bars = table.value_sizes.len() as f64;
        let plot_width = bars * self.bar_width + (bars + 1.0) * self.bar_gap;
        let legend_height = table.rows.len() as f64 * Self::LEGEND_ROW;
        let width = Self::MARGIN_LEFT + plot_width + Self::LEGEND_WIDTH;
        let height =
            Self::MARGIN_TOP + self.plot_height.max(legend_height) + Self::MARGIN_BOTTOM;
        let baseline = Self::MARGIN_TOP + self.plot_height;
        // Only inconsistent input stacks above 100%; keep it on the canvas.
        let scale_max = (0..table.value_sizes.len())
            .map(|col| table.column_total(col))
            .fold(100.0_f64, f64::max);
        let scale = self.plot_height / scale_max;

        let mut lines = Vec::new();
        lines.push(format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" font-family="sans-serif" font-size="12">"#
        ));
        lines.push(format!(
            r#"<text x="{}" y="20" font-size="14" text-anchor="middle">{}</text>"#,
            Self::MARGIN_LEFT + plot_width / 2.0,
            escape(title)
        ));

        for tick in (0..=100u32).step_by(20) {
            let y = baseline - f64::from(tick) * scale;
            lines.push(format!(
                r##"<line x1="{x0}" y1="{y}" x2="{x1}" y2="{y}" stroke="#dddddd"/><text x="{tx}" y="{ty}" text-anchor="end">{tick}%</text>"##,
                x0 = Self::MARGIN_LEFT,
                x1 = Self::MARGIN_LEFT + plot_width,
                tx = Self::MARGIN_LEFT - 6.0,
                ty = y + 4.0,
            ));
        }

        for (col, value_size) in table.value_sizes.iter().enumerate() {
            let x = Self::MARGIN_LEFT + self.bar_gap + col as f64 * (self.bar_width + self.bar_gap);
            let mut top = baseline;
            for (row_idx, row) in table.rows.iter().enumerate() {
                let segment = row.values[col] * scale;
                if segment <= 0.0 {
                    continue;
                }
                top -= segment;
                lines.push(format!(
                    r#"<rect x="{x}" y="{top}" width="{w}" height="{segment}" fill="{fill}"><title>{label}: {value}%</title></rect>"#,
                    w = self.bar_width,
                    fill = color(table, row_idx),
                    label = escape(&row.label),
                    value = row.values[col],
                ));
            }
            lines.push(format!(
                r#"<text x="{}" y="{}" text-anchor="middle">{value_size}</text>"#,
                x + self.bar_width / 2.0,
                baseline + 18.0
            ));
        }

        lines.push(format!(
            r#"<text x="{}" y="{}" text-anchor="middle">Value size (bytes)</text>"#,
            Self::MARGIN_LEFT + plot_width / 2.0,
            baseline + 40.0
        ));

        let legend_x = Self::MARGIN_LEFT + plot_width + 16.0;
        for (row_idx, row) in table.rows.iter().enumerate() {
            let y = Self::MARGIN_TOP + row_idx as f64 * Self::LEGEND_ROW;
            lines.push(format!(
                r#"<rect x="{legend_x}" y="{y}" width="12" height="12" fill="{}"/><text x="{}" y="{}">{}</text>"#,
                color(table, row_idx),
                legend_x + 18.0,
                y + 10.0,
                escape(&row.label)
            ));
        }

        lines.push("</svg>\n".to_string());
        Ok(lines.join("\n"))
    }
}

impl ChartRenderer for SvgChart {
    fn extension(&self) -> &'static str {
        "svg"
    }

    fn render(&self, title: &str, table: &SeriesTable, path: &Path) -> Result<(), ChartError> {
        let svg = self.to_svg(title, table)?;
        fs::write(path, svg).map_err(|source| ChartError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn color(table: &SeriesTable, row_idx: usize) -> &'static str {
    if row_idx + 1 == table.rows.len() {
        OTHER_COLOR
    } else {
        PALETTE[row_idx % PALETTE.len()]
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::RoundingPolicy;

    fn table() -> SeriesTable {
        SeriesTable::from_rows(
            vec![64, 128],
            vec![
                ("Durability".to_string(), vec![12.0, 50.0]),
                ("Locking & latching".to_string(), vec![8.0, 50.0]),
            ],
            RoundingPolicy::Ceil,
        )
        .unwrap()
    }

    #[test]
    fn file_names_combine_subsystem_and_phase() {
        assert_eq!(
            chart_file_name(Subsystem::KvNoMaintenance, Phase::Update, "svg"),
            "kv-no-maintenance-update.svg"
        );
    }

    #[test]
    fn svg_has_one_segment_per_non_zero_value() {
        let svg = SvgChart::default().to_svg("PMDK <load>", &table()).unwrap();
        // 64: three segments; 128: two (Other is zero).
        assert_eq!(svg.matches("<rect x=").count(), 5 + 3);
        assert!(svg.contains("PMDK &lt;load&gt;"));
        assert!(svg.contains("Locking &amp; latching"));
        assert!(svg.contains(">128</text>"));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn empty_table_is_rejected() {
        let empty = SeriesTable::from_rows(Vec::new(), Vec::new(), RoundingPolicy::Ceil).unwrap();
        assert!(matches!(
            SvgChart::default().to_svg("x", &empty),
            Err(ChartError::Empty)
        ));
    }

    #[test]
    fn render_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pmdk-load.svg");
        SvgChart::default()
            .render("PMDK", &table(), &path)
            .unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("<svg"));
    }
}
