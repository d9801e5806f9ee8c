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


use std::path::PathBuf;
use vista::ChartSpec;

pub const HELP: &str = "\
Commands:
  load <path.csv>           load a dataset
  report                    detect context and write the analysis report
  charts                    ask for chart suggestions and render them
  chart <type> <x> [y]      render one chart of your choice
                            (histogram takes one column, pie one or two)
  ask <question>            ask about the dataset and report
  export <path.pdf>         write the PDF report
  help                      show this list
  quit                      leave";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Load(PathBuf),
    Report,
    Charts,
    Chart(ChartSpec),
    Ask(String),
    Export(PathBuf),
    Help,
    Quit,
}

impl Command {
    /// `Ok(None)` for a blank line.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let command = match word.to_lowercase().as_str() {
            "load" => Command::Load(required_path(rest, "load")?),
            "report" => Command::Report,
            "charts" => Command::Charts,
            "chart" => Command::Chart(chart_spec(rest)?),
            "ask" if rest.is_empty() => return Err("usage: ask <question>".to_string()),
            "ask" => Command::Ask(rest.to_string()),
            "export" => Command::Export(required_path(rest, "export")?),
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(format!("unknown command '{other}', type 'help'")),
        };
        Ok(Some(command))
    }
}

fn required_path(rest: &str, command: &str) -> Result<PathBuf, String> {
    if rest.is_empty() {
        Err(format!("usage: {command} <path>"))
    } else {
        Ok(PathBuf::from(rest))
    }
}

/// A lone column goes to `y` for histograms, which bin the y column; a
/// lone pie column is drawn as its value counts.
fn chart_spec(rest: &str) -> Result<ChartSpec, String> {
    let mut parts = rest.split_whitespace();
    let chart_type = parts
        .next()
        .ok_or_else(|| "usage: chart <type> <x> [y]".to_string())?;
    let mut spec = ChartSpec::new(chart_type).with_reason("Requested by the user.");
    let columns: Vec<&str> = parts.take(2).collect();
    match columns.as_slice() {
        [only] if chart_type.eq_ignore_ascii_case("histogram") => spec = spec.with_y(*only),
        [x] => spec = spec.with_x(*x),
        [x, y] => spec = spec.with_x(*x).with_y(*y),
        _ => {}
    }
    Ok(spec)
}
