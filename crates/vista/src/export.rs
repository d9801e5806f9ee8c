// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.


//! PDF report export. The whole document is assembled in memory, written to
//! a sibling temporary file and renamed over the destination.

use crate::chart_spec::ChartSpec;
use crate::config::VistaConfig;
use crate::dataset::Dataset;
use crate::error::{ExportError, ExportResult};
use crate::profile::DataProfiler;
use crate::render::{ChartOutcome, RendererRegistry};
use printpdf::{
    BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference, Pt,
    Svg, SvgTransform,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 20.0;
const FIGURE_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;
const SVG_DPI: f32 = 96.0;
const TABLE_FONT_SIZE: f32 = 8.0;

const SECTIONS: [&str; 5] = [
    "1. Context Analysis",
    "2. Detailed Analysis",
    "3. Data Summary",
    "Sample Data",
    "4. Data Visualizations",
];

/// Everything one exported report is made of.
#[derive(Debug, Clone)]
pub struct ExportRequest<'a> {
    pub title: String,
    pub context: String,
    pub report: String,
    pub dataset: &'a Dataset,
    /// Table the specifications refer to when it differs from `dataset`.
    pub chart_basis: Option<&'a Dataset>,
    pub specs: &'a [ChartSpec],
    pub destination: PathBuf,
}

pub trait DocumentStore {
    /// Writes the document and returns where it went.
    fn export(&self, request: &ExportRequest<'_>) -> ExportResult<PathBuf>;
}

#[derive(Debug, Clone, Default)]
pub struct PdfReportStore {
    config: VistaConfig,
}

impl PdfReportStore {
    pub fn new(config: VistaConfig) -> Self {
        Self { config }
    }

    /// Builds the PDF bytes without touching the filesystem.
    pub fn build(&self, request: &ExportRequest<'_>) -> ExportResult<Vec<u8>> {
        let (doc, page, layer) = PdfDocument::new(
            request.title.as_str(),
            Mm(PAGE_WIDTH),
            Mm(PAGE_HEIGHT),
            "Layer 1",
        );
        let fonts = Fonts {
            regular: doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf)?,
            bold: doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(pdf)?,
            mono: doc.add_builtin_font(BuiltinFont::Courier).map_err(pdf)?,
        };
        let first = doc.get_page(page).get_layer(layer);
        let mut writer = PageWriter::new(&doc, fonts, first);

        writer.cover(&request.title, &chrono::Local::now().format("%B %d, %Y").to_string());

        writer.new_page();
        writer.heading("Contents", 18.0);
        for section in SECTIONS {
            writer.paragraph(section, 11.0);
        }

        writer.new_page();
        writer.heading(SECTIONS[0], 16.0);
        writer.markdown(&request.context);

        writer.new_page();
        writer.heading(SECTIONS[1], 16.0);
        writer.markdown(&request.report);

        writer.new_page();
        writer.heading(SECTIONS[2], 16.0);
        let profiler = DataProfiler::new();
        match profiler.profile(request.dataset) {
            Ok(profiles) => {
                let describe = profiler.describe(&profiles);
                if describe.is_empty() {
                    writer.paragraph("(no numeric columns)", 10.0);
                } else {
                    writer.table(&TextGrid::from_describe(&describe));
                }
            }
            Err(e) => {
                warn!(error = %e, "Dataset could not be profiled for export");
                writer.paragraph(&format!("Summary unavailable: {e}"), 10.0);
            }
        }
        writer.gap(6.0);
        writer.heading(SECTIONS[3], 14.0);
        writer.table(&TextGrid::from_sample(request.dataset, self.config.sample_rows));

        writer.new_page();
        writer.heading(SECTIONS[4], 16.0);
        let registry = RendererRegistry::with_export_charts(&self.config);
        let outcomes = registry.render_batch(
            request.specs,
            request.chart_basis.unwrap_or(request.dataset),
        );
        if outcomes.is_empty() {
            writer.paragraph("No visualizations were generated.", 11.0);
        }
        for outcome in &outcomes {
            writer.figure(outcome, self.config.chart_width, self.config.chart_height);
        }
        drop(writer);

        doc.save_to_bytes().map_err(pdf)
    }
}

impl DocumentStore for PdfReportStore {
    fn export(&self, request: &ExportRequest<'_>) -> ExportResult<PathBuf> {
        if request.destination.as_os_str().is_empty() {
            return Err(ExportError::EmptyDestination);
        }
        let bytes = self.build(request)?;
        write_document(&request.destination, &bytes)?;
        info!(
            path = %request.destination.display(),
            bytes = bytes.len(),
            figures = request.specs.len(),
            "Exported PDF report"
        );
        Ok(request.destination.clone())
    }
}

fn write_document(path: &Path, bytes: &[u8]) -> ExportResult<()> {
    let io = |source: std::io::Error| ExportError::Io {
        path: path.display().to_string(),
        source,
    };
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staged = tempfile::NamedTempFile::new_in(parent).map_err(io)?;
    staged.write_all(bytes).map_err(io)?;
    staged.as_file().sync_all().map_err(io)?;
    staged.persist(path).map_err(|e| io(e.error))?;
    Ok(())
}

fn pdf<E: std::fmt::Debug>(e: E) -> ExportError {
    ExportError::Pdf(format!("{e:?}"))
}

fn mm_to_pt(mm: f32) -> f32 {
    mm * 72.0 / 25.4
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    mono: IndirectFontRef,
}

/// Top-down text cursor that starts a new page when it runs out of room.
struct PageWriter<'d> {
    doc: &'d PdfDocumentReference,
    fonts: Fonts,
    layer: PdfLayerReference,
    y: f32,
    pages: usize,
}

impl<'d> PageWriter<'d> {
    fn new(doc: &'d PdfDocumentReference, fonts: Fonts, layer: PdfLayerReference) -> Self {
        Self {
            doc,
            fonts,
            layer,
            y: PAGE_HEIGHT - MARGIN,
            pages: 1,
        }
    }

    fn new_page(&mut self) {
        self.pages += 1;
        let (page, layer) = self.doc.add_page(
            Mm(PAGE_WIDTH),
            Mm(PAGE_HEIGHT),
            format!("Page {}", self.pages),
        );
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = PAGE_HEIGHT - MARGIN;
    }

    fn ensure(&mut self, height: f32) {
        if self.y - height < MARGIN {
            self.new_page();
        }
    }

    fn gap(&mut self, height: f32) {
        self.y -= height;
    }

    fn line_height(size: f32) -> f32 {
        size * 0.5
    }

    fn text(&mut self, text: &str, size: f32, font: FontKind) {
        self.ensure(Self::line_height(size));
        self.y -= Self::line_height(size);
        let font = match font {
            FontKind::Regular => &self.fonts.regular,
            FontKind::Bold => &self.fonts.bold,
            FontKind::Mono => &self.fonts.mono,
        };
        self.layer.use_text(text, size, Mm(MARGIN), Mm(self.y), font);
    }

    fn cover(&mut self, title: &str, date: &str) {
        self.y = PAGE_HEIGHT * 0.6;
        self.text(title, 26.0, FontKind::Bold);
        self.gap(6.0);
        self.text("Dataset insight report", 14.0, FontKind::Regular);
        self.text(&format!("Generated on {date}"), 12.0, FontKind::Regular);
    }

    fn heading(&mut self, text: &str, size: f32) {
        self.ensure(Self::line_height(size) + 12.0);
        self.gap(3.0);
        self.text(text, size, FontKind::Bold);
        self.gap(3.0);
    }

    fn paragraph(&mut self, text: &str, size: f32) {
        for line in wrap(text, chars_per_line(size)) {
            self.text(&line, size, FontKind::Regular);
        }
    }

    fn markdown(&mut self, text: &str) {
        if text.trim().is_empty() {
            self.paragraph("(not generated)", 11.0);
            return;
        }
        for block in markdown_blocks(text) {
            match block {
                MarkdownBlock::Line(MarkdownLine::Blank) => self.gap(2.0),
                MarkdownBlock::Line(MarkdownLine::Heading(h)) => self.heading(&h, 13.0),
                MarkdownBlock::Line(MarkdownLine::Text(t)) => self.paragraph(&t, 10.0),
                MarkdownBlock::Table(grid) => {
                    self.gap(2.0);
                    self.table(&grid);
                    self.gap(2.0);
                }
            }
        }
    }

    /// Aligned columns in Courier; tables wider than the page continue in
    /// further column groups below.
    fn table(&mut self, grid: &TextGrid) {
        let groups = grid.layout(mono_chars_per_line(TABLE_FONT_SIZE));
        for (i, lines) in groups.iter().enumerate() {
            if i > 0 {
                self.gap(3.0);
            }
            self.ensure(Self::line_height(TABLE_FONT_SIZE) * lines.len().min(6) as f32);
            for line in lines {
                self.text(line, TABLE_FONT_SIZE, FontKind::Mono);
            }
        }
    }

    fn figure(&mut self, outcome: &ChartOutcome, width_px: u32, height_px: u32) {
        let scale = mm_to_pt(FIGURE_WIDTH) / (width_px as f32 * 72.0 / SVG_DPI);
        let height_mm = height_px as f32 * 25.4 / SVG_DPI * scale;
        let needed = if outcome.is_rendered() { height_mm + 20.0 } else { 20.0 };
        self.ensure(needed);
        self.text(&outcome.caption(), 12.0, FontKind::Bold);
        let reason = outcome.spec().reason.trim();
        if !reason.is_empty() {
            self.paragraph(reason, 10.0);
        }
        let Some(figure) = outcome.figure() else {
            if let Some(error) = outcome.error() {
                warn!(figure = outcome.figure_number(), error = %error, "Figure left out of export");
            }
            self.gap(4.0);
            return;
        };
        match Svg::parse(&figure.svg) {
            Ok(svg) => {
                self.ensure(height_mm + 4.0);
                self.y -= height_mm + 2.0;
                svg.add_to_layer(
                    &self.layer,
                    SvgTransform {
                        translate_x: Some(Pt(mm_to_pt(MARGIN))),
                        translate_y: Some(Pt(mm_to_pt(self.y))),
                        scale_x: Some(scale),
                        scale_y: Some(scale),
                        dpi: Some(SVG_DPI),
                        ..Default::default()
                    },
                );
                self.gap(6.0);
            }
            Err(e) => {
                warn!(figure = outcome.figure_number(), error = ?e, "SVG could not be embedded");
                self.gap(4.0);
            }
        }
    }
}

#[derive(Clone, Copy)]
enum FontKind {
    Regular,
    Bold,
    Mono,
}

#[derive(Debug, PartialEq)]
enum MarkdownLine {
    Blank,
    Heading(String),
    Text(String),
}

fn flatten_markdown(line: &str) -> MarkdownLine {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return MarkdownLine::Blank;
    }
    let strip = |s: &str| s.replace("**", "").replace('`', "").replace("__", "");
    if trimmed.starts_with('#') {
        return MarkdownLine::Heading(strip(trimmed.trim_start_matches('#').trim()));
    }
    let body = trimmed
        .strip_prefix("* ")
        .or_else(|| trimmed.strip_prefix("- "))
        .map(|rest| format!("- {rest}"))
        .unwrap_or_else(|| trimmed.to_string());
    MarkdownLine::Text(strip(&body))
}

#[derive(Debug, PartialEq)]
enum MarkdownBlock {
    Line(MarkdownLine),
    Table(TextGrid),
}

/// Groups consecutive `|`-delimited lines into tables; everything else is
/// flattened line by line.
fn markdown_blocks(text: &str) -> Vec<MarkdownBlock> {
    let mut blocks = Vec::new();
    let mut rows: Vec<Vec<String>> = Vec::new();
    let flush = |rows: &mut Vec<Vec<String>>, blocks: &mut Vec<MarkdownBlock>| {
        if rows.is_empty() {
            return;
        }
        let mut rows = std::mem::take(rows).into_iter();
        let header = rows.next().unwrap_or_default();
        blocks.push(MarkdownBlock::Table(TextGrid::new(header, rows.collect(), true)));
    };
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('|') {
            if let Some(cells) = table_cells(trimmed) {
                rows.push(cells);
            }
            continue;
        }
        flush(&mut rows, &mut blocks);
        blocks.push(MarkdownBlock::Line(flatten_markdown(line)));
    }
    flush(&mut rows, &mut blocks);
    blocks
}

/// Cells of one table row; `None` for the `|---|:--:|` alignment row.
fn table_cells(line: &str) -> Option<Vec<String>> {
    let inner = line.trim_start_matches('|');
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    let cells: Vec<String> = inner
        .split('|')
        .map(|c| c.trim().replace("**", "").replace('`', "").replace("__", ""))
        .collect();
    let separator = cells
        .iter()
        .all(|c| !c.is_empty() && c.chars().all(|ch| matches!(ch, '-' | ':' | ' ')));
    (!separator).then_some(cells)
}

/// A table of text cells laid out in fixed-width columns.
#[derive(Debug, Clone, PartialEq)]
struct TextGrid {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
    /// Repeat the first column in every column group.
    keyed: bool,
}

impl TextGrid {
    fn new(header: Vec<String>, rows: Vec<Vec<String>>, keyed: bool) -> Self {
        let columns = rows.iter().map(Vec::len).chain([header.len()]).max().unwrap_or(0);
        let pad = |mut row: Vec<String>| {
            row.resize(columns, String::new());
            row
        };
        Self {
            header: pad(header),
            rows: rows.into_iter().map(pad).collect(),
            keyed,
        }
    }

    fn from_describe(table: &crate::profile::DescribeTable) -> Self {
        let header = std::iter::once(String::new())
            .chain(table.columns.iter().cloned())
            .collect();
        let rows = table
            .rows
            .iter()
            .enumerate()
            .map(|(r, (label, _))| {
                std::iter::once(label.clone())
                    .chain((0..table.columns.len()).map(|c| table.cell(r, c)))
                    .collect()
            })
            .collect();
        Self::new(header, rows, true)
    }

    fn from_sample(dataset: &Dataset, rows: usize) -> Self {
        let head = dataset.head(rows);
        let names = head.column_names();
        let columns: Vec<Vec<Option<String>>> = names
            .iter()
            .map(|name| head.text_values(name).unwrap_or_default())
            .collect();
        let rows = (0..head.height())
            .map(|row| {
                columns
                    .iter()
                    .map(|col| col.get(row).cloned().flatten().unwrap_or_default())
                    .collect()
            })
            .collect();
        Self::new(names, rows, false)
    }

    fn column_count(&self) -> usize {
        self.header.len()
    }

    fn widths(&self, limit: usize) -> Vec<usize> {
        (0..self.column_count())
            .map(|c| {
                std::iter::once(&self.header)
                    .chain(self.rows.iter())
                    .map(|row| row[c].chars().count())
                    .max()
                    .unwrap_or(0)
                    .clamp(1, limit)
            })
            .collect()
    }

    /// Column indices per group so every rendered line fits in `limit` characters.
    fn column_groups(&self, widths: &[usize], limit: usize) -> Vec<Vec<usize>> {
        let key = (self.keyed && widths.len() > 1).then_some(0);
        let start = usize::from(key.is_some());
        let base: Vec<usize> = key.into_iter().collect();
        let base_width = key.map_or(0, |k| widths[k]);
        let mut groups = Vec::new();
        let mut group = base.clone();
        let mut used = base_width;
        for c in start..widths.len() {
            let needed = if group.is_empty() { widths[c] } else { used + 2 + widths[c] };
            if needed > limit && group.len() > base.len() {
                groups.push(std::mem::replace(&mut group, base.clone()));
                used = base_width;
            }
            used = if group.is_empty() { widths[c] } else { used + 2 + widths[c] };
            group.push(c);
        }
        if group.len() > base.len() || groups.is_empty() {
            groups.push(group);
        }
        groups
    }

    /// Lines per column group: header, rule, then one line per row.
    fn layout(&self, limit: usize) -> Vec<Vec<String>> {
        let widths = self.widths(limit);
        self.column_groups(&widths, limit)
            .into_iter()
            .map(|group| {
                let line = |row: &[String]| {
                    let cells: Vec<String> = group
                        .iter()
                        .map(|&c| {
                            let cell: String = row[c].chars().take(widths[c]).collect();
                            format!("{cell:<w$}", w = widths[c])
                        })
                        .collect();
                    cells.join("  ").trim_end().to_string()
                };
                let rule = group
                    .iter()
                    .map(|&c| "-".repeat(widths[c]))
                    .collect::<Vec<_>>()
                    .join("  ");
                std::iter::once(line(&self.header))
                    .chain(std::iter::once(rule))
                    .chain(self.rows.iter().map(|row| line(row)))
                    .collect()
            })
            .collect()
    }
}

/// Courier advance is 0.6 em.
fn mono_chars_per_line(size: f32) -> usize {
    ((FIGURE_WIDTH / (size * 0.6 * 25.4 / 72.0)) as usize).max(20)
}

/// Rough Helvetica capacity of one line of body width.
fn chars_per_line(size: f32) -> usize {
    ((FIGURE_WIDTH / (size * 0.19)) as usize).max(20)
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> Dataset {
        Dataset::from_csv_bytes(
            b"category,sales,cost\nA,10,1\nB,20,2\nA,30,3\n",
            &VistaConfig::default(),
        )
        .unwrap()
    }

    fn specs() -> Vec<ChartSpec> {
        vec![
            ChartSpec::new("bar")
                .with_x("category")
                .with_y("sales")
                .with_reason("Compares categories."),
            ChartSpec::new("histogram").with_y("category"),
            ChartSpec::new("heatmap"),
        ]
    }

    #[test]
    fn test_export_writes_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let ds = dataset();
        let specs = specs();
        let request = ExportRequest {
            title: "Sales Report".into(),
            context: "Retail sales.".into(),
            report: "# Overview\n**Sales** grew.\n- A leads".into(),
            dataset: &ds,
            chart_basis: None,
            specs: &specs,
            destination: dir.path().join("report.pdf"),
        };
        let path = PdfReportStore::default().export(&request).unwrap();
        let bytes = std::fs::read(path).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_failed_export_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("missing").join("report.pdf");
        let ds = dataset();
        let request = ExportRequest {
            title: "Sales Report".into(),
            context: String::new(),
            report: String::new(),
            dataset: &ds,
            chart_basis: None,
            specs: &[],
            destination: destination.clone(),
        };
        let err = PdfReportStore::default().export(&request).unwrap_err();
        assert!(matches!(err, ExportError::Io { .. }));
        assert!(!destination.exists());
    }

    #[test]
    fn test_empty_destination_rejected() {
        let ds = dataset();
        let request = ExportRequest {
            title: "t".into(),
            context: String::new(),
            report: String::new(),
            dataset: &ds,
            chart_basis: None,
            specs: &[],
            destination: PathBuf::new(),
        };
        assert!(matches!(
            PdfReportStore::default().export(&request),
            Err(ExportError::EmptyDestination)
        ));
    }

    #[test]
    fn test_flatten_markdown() {
        assert_eq!(flatten_markdown("## Key **Stats**"), MarkdownLine::Heading("Key Stats".into()));
        assert_eq!(flatten_markdown("* `sales` up"), MarkdownLine::Text("- sales up".into()));
        assert_eq!(flatten_markdown("   "), MarkdownLine::Blank);
    }

    #[test]
    fn test_export_report_with_markdown_table() {
        let dir = tempfile::tempdir().unwrap();
        let ds = dataset();
        let report = "## Totals\n| Category | Sales |\n|---|---:|\n| A | 40 |\n| B | 20 |\nA leads.";
        let request = ExportRequest {
            title: "Sales Report".into(),
            context: String::new(),
            report: report.into(),
            dataset: &ds,
            chart_basis: None,
            specs: &[],
            destination: dir.path().join("tables.pdf"),
        };
        let path = PdfReportStore::default().export(&request).unwrap();
        assert!(std::fs::read(path).unwrap().starts_with(b"%PDF"));
        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);

        let blocks = markdown_blocks(report);
        assert_eq!(blocks.len(), 3);
        let MarkdownBlock::Table(grid) = &blocks[1] else {
            panic!("expected a table block, got {:?}", blocks[1]);
        };
        assert_eq!(grid.header, vec!["Category", "Sales"]);
        assert_eq!(grid.rows, vec![vec!["A", "40"], vec!["B", "20"]]);
        assert_eq!(
            grid.layout(80),
            vec![vec![
                "Category  Sales".to_string(),
                "--------  -----".to_string(),
                "A         40".to_string(),
                "B         20".to_string(),
            ]]
        );
    }

    #[test]
    fn test_wide_table_splits_into_column_groups() {
        let header: Vec<String> = std::iter::once("stat".to_string())
            .chain((1..=12).map(|i| format!("column_{i:02}")))
            .collect();
        let row: Vec<String> = std::iter::once("mean".to_string())
            .chain((1..=12).map(|i| format!("{i}.50")))
            .collect();
        let grid = TextGrid::new(header.clone(), vec![row], true);
        let groups = grid.layout(40);
        assert!(groups.len() > 1);
        for lines in &groups {
            assert!(lines[0].starts_with("stat"));
            assert!(lines.iter().all(|l| l.chars().count() <= 40));
        }
        let all = groups.iter().map(|g| g.join("\n")).collect::<Vec<_>>().join("\n");
        for name in &header[1..] {
            assert!(all.contains(name.as_str()), "{name} was dropped");
        }
    }

    #[test]
    fn test_sample_grid_keeps_every_column() {
        let grid = TextGrid::from_sample(&dataset(), 2);
        assert_eq!(grid.header, vec!["category", "sales", "cost"]);
        assert_eq!(grid.rows.len(), 2);
        assert_eq!(grid.rows[0][0], "A");
    }

    #[test]
    fn test_wrap_respects_width() {
        let lines = wrap("one two three four five", 9);
        assert_eq!(lines, vec!["one two", "three", "four five"]);
    }
}
