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


use super::geometry::{Bin, ChartGeometry, LineAxis, Wedge};
use crate::dataset::format_number;
use crate::error::{RenderError, RenderResult};
use crate::profile::round2;
use crate::stats::format_coefficient;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::f64::consts::{FRAC_PI_2, TAU};
use std::ops::Range;

type Area<'a> = DrawingArea<SVGBackend<'a>, Shift>;

const FONT: &str = "sans-serif";
const MAX_AXIS_LABELS: usize = 20;

/// Text and size of one figure.
#[derive(Debug, Clone)]
pub struct Canvas {
    pub title: String,
    pub x_desc: String,
    pub y_desc: String,
    pub width: u32,
    pub height: u32,
}

pub fn draw_svg(canvas: &Canvas, geometry: &ChartGeometry) -> RenderResult<String> {
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (canvas.width, canvas.height))
            .into_drawing_area();
        root.fill(&WHITE).map_err(drawing)?;
        match geometry {
            ChartGeometry::Bars { labels, values } => draw_bars(&root, canvas, labels, values)?,
            ChartGeometry::Points { points } => draw_points(&root, canvas, points, &BLUE)?,
            ChartGeometry::GeoPoints { points } => draw_points(&root, canvas, points, &RED)?,
            ChartGeometry::Line {
                axis,
                points,
                filled,
            } => draw_line(&root, canvas, axis, points, *filled)?,
            ChartGeometry::Wedges { wedges } => draw_pie(&root, canvas, wedges)?,
            ChartGeometry::Bins { bins } => draw_histogram(&root, canvas, bins)?,
            ChartGeometry::Matrix {
                columns,
                coefficients,
            } => draw_heatmap(&root, canvas, columns, coefficients)?,
        }
        root.present().map_err(drawing)?;
    }
    Ok(svg)
}

fn drawing<E: std::fmt::Display>(e: E) -> RenderError {
    RenderError::Drawing(e.to_string())
}

/// Range over the values with a little headroom; never empty.
fn padded(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !lo.is_finite() {
        return 0.0..1.0;
    }
    if lo == hi {
        return (lo - 1.0)..(hi + 1.0);
    }
    let pad = (hi - lo) * 0.05;
    (lo - pad)..(hi + pad)
}

fn tick(v: f64) -> String {
    format_number(round2(v))
}

fn draw_bars(root: &Area, canvas: &Canvas, labels: &[String], values: &[f64]) -> RenderResult<()> {
    let n = labels.len();
    let y_range = padded(values.iter().copied().chain(std::iter::once(0.0)));
    let mut chart = ChartBuilder::on(root)
        .caption(&canvas.title, (FONT, 22))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d((0..n).into_segmented(), y_range)
        .map_err(drawing)?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(n.min(MAX_AXIS_LABELS))
        .x_label_formatter(&|x| match x {
            SegmentValue::CenterOf(i) => labels.get(*i).cloned().unwrap_or_default(),
            _ => String::new(),
        })
        .y_label_formatter(&|y| tick(*y))
        .x_desc(canvas.x_desc.as_str())
        .y_desc(canvas.y_desc.as_str())
        .draw()
        .map_err(drawing)?;
    chart
        .draw_series(values.iter().enumerate().map(|(i, v)| {
            let mut bar = Rectangle::new(
                [(SegmentValue::Exact(i), 0.0), (SegmentValue::Exact(i + 1), *v)],
                BLUE.mix(0.7).filled(),
            );
            bar.set_margin(0, 0, 6, 6);
            bar
        }))
        .map_err(drawing)?;
    Ok(())
}

fn draw_points(root: &Area, canvas: &Canvas, points: &[(f64, f64)], color: &RGBColor) -> RenderResult<()> {
    let x_range = padded(points.iter().map(|p| p.0));
    let y_range = padded(points.iter().map(|p| p.1));
    let mut chart = ChartBuilder::on(root)
        .caption(&canvas.title, (FONT, 22))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, y_range)
        .map_err(drawing)?;
    chart
        .configure_mesh()
        .x_label_formatter(&|x| tick(*x))
        .y_label_formatter(&|y| tick(*y))
        .x_desc(canvas.x_desc.as_str())
        .y_desc(canvas.y_desc.as_str())
        .draw()
        .map_err(drawing)?;
    chart
        .draw_series(
            points
                .iter()
                .map(|(x, y)| Circle::new((*x, *y), 3, color.mix(0.6).filled())),
        )
        .map_err(drawing)?;
    Ok(())
}

fn line_tick(axis: &LineAxis, v: f64) -> String {
    match axis {
        LineAxis::Numeric => tick(v),
        LineAxis::Temporal => chrono::DateTime::from_timestamp_millis(v as i64)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        LineAxis::Categorical(labels) => {
            let nearest = v.round();
            if (v - nearest).abs() > 1e-6 || nearest < 0.0 {
                return String::new();
            }
            labels.get(nearest as usize).cloned().unwrap_or_default()
        }
    }
}

fn draw_line(
    root: &Area,
    canvas: &Canvas,
    axis: &LineAxis,
    points: &[(f64, f64)],
    filled: bool,
) -> RenderResult<()> {
    let x_range = match axis {
        LineAxis::Categorical(labels) => -0.5..(labels.len() as f64 - 0.5),
        _ => padded(points.iter().map(|p| p.0)),
    };
    let baseline = if filled { Some(0.0) } else { None };
    let y_range = padded(points.iter().map(|p| p.1).chain(baseline));
    let x_labels = match axis {
        LineAxis::Categorical(labels) => labels.len().clamp(1, MAX_AXIS_LABELS),
        _ => 10,
    };
    let mut chart = ChartBuilder::on(root)
        .caption(&canvas.title, (FONT, 22))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, y_range)
        .map_err(drawing)?;
    chart
        .configure_mesh()
        .x_labels(x_labels)
        .x_label_formatter(&|x| line_tick(axis, *x))
        .y_label_formatter(&|y| tick(*y))
        .x_desc(canvas.x_desc.as_str())
        .y_desc(canvas.y_desc.as_str())
        .draw()
        .map_err(drawing)?;
    if filled {
        chart
            .draw_series(
                AreaSeries::new(points.iter().copied(), 0.0, &BLUE.mix(0.3)).border_style(&BLUE),
            )
            .map_err(drawing)?;
    } else {
        chart
            .draw_series(LineSeries::new(points.iter().copied(), &BLUE))
            .map_err(drawing)?;
    }
    Ok(())
}

fn draw_histogram(root: &Area, canvas: &Canvas, bins: &[Bin]) -> RenderResult<()> {
    let (Some(first), Some(last)) = (bins.first(), bins.last()) else {
        return Ok(());
    };
    let max_count = bins.iter().map(|b| b.count).max().unwrap_or(0).max(1) as f64;
    let mut chart = ChartBuilder::on(root)
        .caption(&canvas.title, (FONT, 22))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(first.start..last.end, 0.0..max_count * 1.1)
        .map_err(drawing)?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_label_formatter(&|x| tick(*x))
        .y_label_formatter(&|y| tick(*y))
        .x_desc(canvas.x_desc.as_str())
        .y_desc("Frequency")
        .draw()
        .map_err(drawing)?;
    chart
        .draw_series(bins.iter().map(|b| {
            Rectangle::new(
                [(b.start, 0.0), (b.end, b.count as f64)],
                BLUE.mix(0.6).filled(),
            )
        }))
        .map_err(drawing)?;
    Ok(())
}

fn draw_pie(root: &Area, canvas: &Canvas, wedges: &[Wedge]) -> RenderResult<()> {
    let (w, h) = root.dim_in_pixel();
    let title_style = (FONT, 22)
        .into_font()
        .color(&BLACK)
        .pos(Pos::new(HPos::Center, VPos::Center));
    let label_style = (FONT, 14)
        .into_font()
        .color(&BLACK)
        .pos(Pos::new(HPos::Center, VPos::Center));
    root.draw(&Text::new(canvas.title.clone(), (w as i32 / 2, 20), title_style))
        .map_err(drawing)?;
    let (cx, cy) = (f64::from(w) / 2.0, f64::from(h) / 2.0 + 15.0);
    let radius = f64::from(w.min(h)) * 0.32;
    let at = |angle: f64, r: f64| ((cx + r * angle.cos()) as i32, (cy + r * angle.sin()) as i32);
    let mut angle = -FRAC_PI_2;
    for (i, wedge) in wedges.iter().enumerate() {
        let sweep = wedge.percent / 100.0 * TAU;
        if sweep <= 0.0 {
            continue;
        }
        let steps = ((sweep / TAU) * 180.0).ceil().max(2.0) as usize;
        let mut outline = vec![(cx as i32, cy as i32)];
        outline.extend((0..=steps).map(|s| at(angle + sweep * s as f64 / steps as f64, radius)));
        root.draw(&Polygon::new(outline, Palette99::pick(i).filled()))
            .map_err(drawing)?;
        let mid = angle + sweep / 2.0;
        root.draw(&Text::new(wedge.annotation(), at(mid, radius * 0.6), label_style.clone()))
            .map_err(drawing)?;
        root.draw(&Text::new(wedge.label.clone(), at(mid, radius * 1.15), label_style.clone()))
            .map_err(drawing)?;
        angle += sweep;
    }
    Ok(())
}

fn heat_color(r: Option<f64>) -> RGBColor {
    match r {
        None => RGBColor(200, 200, 200),
        Some(r) => {
            let fade = (255.0 * (1.0 - r.abs().min(1.0))) as u8;
            if r >= 0.0 {
                RGBColor(255, fade, fade)
            } else {
                RGBColor(fade, fade, 255)
            }
        }
    }
}

fn draw_heatmap(
    root: &Area,
    canvas: &Canvas,
    columns: &[String],
    coefficients: &[Vec<Option<f64>>],
) -> RenderResult<()> {
    let n = columns.len();
    let mut chart = ChartBuilder::on(root)
        .caption(&canvas.title, (FONT, 22))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(100)
        .build_cartesian_2d((0..n).into_segmented(), (0..n).into_segmented())
        .map_err(drawing)?;
    // Row 0 is drawn at the top.
    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(n)
        .y_labels(n)
        .x_label_formatter(&|x| match x {
            SegmentValue::CenterOf(i) => columns.get(*i).cloned().unwrap_or_default(),
            _ => String::new(),
        })
        .y_label_formatter(&|y| match y {
            SegmentValue::CenterOf(i) if *i < n => columns[n - 1 - *i].clone(),
            _ => String::new(),
        })
        .draw()
        .map_err(drawing)?;
    let style = (FONT, 14)
        .into_font()
        .color(&BLACK)
        .pos(Pos::new(HPos::Center, VPos::Center));
    for (i, row) in coefficients.iter().enumerate() {
        let y = n - 1 - i;
        for (j, r) in row.iter().enumerate() {
            chart
                .draw_series(std::iter::once(Rectangle::new(
                    [
                        (SegmentValue::Exact(j), SegmentValue::Exact(y)),
                        (SegmentValue::Exact(j + 1), SegmentValue::Exact(y + 1)),
                    ],
                    heat_color(*r).filled(),
                )))
                .map_err(drawing)?;
            chart
                .draw_series(std::iter::once(Text::new(
                    format_coefficient(*r),
                    (SegmentValue::CenterOf(j), SegmentValue::CenterOf(y)),
                    style.clone(),
                )))
                .map_err(drawing)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canvas() -> Canvas {
        Canvas {
            title: "Test".into(),
            x_desc: "x".into(),
            y_desc: "y".into(),
            width: 400,
            height: 300,
        }
    }

    #[test]
    fn test_padded_ranges() {
        assert_eq!(padded([2.0, 2.0].into_iter()), 1.0..3.0);
        assert_eq!(padded(std::iter::empty()), 0.0..1.0);
        let r = padded([0.0, 10.0].into_iter());
        assert!(r.start < 0.0 && r.end > 10.0);
    }

    #[test]
    fn test_svg_for_every_geometry() {
        let geometries = vec![
            ChartGeometry::Bars {
                labels: vec!["A".into(), "B".into()],
                values: vec![20.0, 20.0],
            },
            ChartGeometry::Points {
                points: vec![(1.0, 2.0), (2.0, 3.0)],
            },
            ChartGeometry::Line {
                axis: LineAxis::Categorical(vec!["Jan".into(), "Feb".into()]),
                points: vec![(0.0, 1.0), (1.0, 2.0)],
                filled: true,
            },
            ChartGeometry::Wedges {
                wedges: vec![Wedge {
                    label: "a".into(),
                    value: 1.0,
                    percent: 100.0,
                }],
            },
            ChartGeometry::Bins {
                bins: vec![Bin {
                    start: 0.0,
                    end: 1.0,
                    count: 3,
                }],
            },
            ChartGeometry::Matrix {
                columns: vec!["a".into(), "b".into()],
                coefficients: vec![vec![Some(1.0), None], vec![None, Some(1.0)]],
            },
        ];
        for geometry in geometries {
            let svg = draw_svg(&canvas(), &geometry).unwrap();
            assert!(svg.contains("<svg"), "no svg for {geometry:?}");
        }
    }

    #[test]
    fn test_pie_annotations_in_svg() {
        let svg = draw_svg(
            &canvas(),
            &ChartGeometry::Wedges {
                wedges: vec![
                    Wedge {
                        label: "north".into(),
                        value: 1.0,
                        percent: 25.0,
                    },
                    Wedge {
                        label: "south".into(),
                        value: 3.0,
                        percent: 75.0,
                    },
                ],
            },
        )
        .unwrap();
        assert!(svg.contains("25.0%"));
        assert!(svg.contains("south"));
    }
}
