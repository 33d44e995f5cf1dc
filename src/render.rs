//! Terminal rendering of analysis results

use std::io::{self, Write};

use crossterm::style::{Color, Stylize};

use crate::pipeline::{Analysis, Strategy};
use crate::report::ParsedReport;
use crate::tracking::{LeakCategory, ResponsibleLine};

pub struct Theme {
    pub heading: Color,
    pub location: Color,
    pub code: Color,
    pub step: Color,
    pub muted: Color,
    pub never_freed: Color,
    pub pointer_lost: Color,
    pub container_freed: Color,
    pub success: Color,
}

pub const DEFAULT_THEME: Theme = Theme {
    heading: Color::Rgb { r: 137, g: 180, b: 250 },         // Blue
    location: Color::Rgb { r: 249, g: 226, b: 175 },        // Yellow
    code: Color::Rgb { r: 205, g: 214, b: 244 },
    step: Color::Rgb { r: 148, g: 226, b: 213 },            // Teal
    muted: Color::Rgb { r: 108, g: 112, b: 134 },           // Grey
    never_freed: Color::Rgb { r: 250, g: 179, b: 135 },     // Orange
    pointer_lost: Color::Rgb { r: 243, g: 139, b: 168 },    // Red
    container_freed: Color::Rgb { r: 245, g: 194, b: 231 }, // Pink
    success: Color::Rgb { r: 166, g: 227, b: 161 },         // Green
};

/// Writes styled text, or plain text when color is off.
pub struct Renderer<'t> {
    theme: &'t Theme,
    color: bool,
}

impl<'t> Renderer<'t> {
    pub fn new(theme: &'t Theme, color: bool) -> Self {
        Self { theme, color }
    }

    fn paint(&self, text: impl Into<String>, color: Color) -> String {
        let text = text.into();
        if self.color {
            text.with(color).to_string()
        } else {
            text
        }
    }

    fn bold(&self, text: impl Into<String>, color: Color) -> String {
        let text = text.into();
        if self.color {
            text.with(color).bold().to_string()
        } else {
            text
        }
    }

    fn category_color(&self, kind: LeakCategory) -> Color {
        match kind {
            LeakCategory::NeverFreed => self.theme.never_freed,
            LeakCategory::PointerLost => self.theme.pointer_lost,
            LeakCategory::ContainerFreedFirst => self.theme.container_freed,
        }
    }

    pub fn summary(&self, out: &mut impl Write, report: &ParsedReport) -> io::Result<()> {
        if !report.has_leaks && report.leaks.is_empty() {
            return writeln!(out, "{}", self.bold("No leaks detected.", self.theme.success));
        }
        let s = &report.summary;
        writeln!(
            out,
            "{} {} leak(s): {} bytes definitely lost, {} indirectly, {} possibly",
            self.bold("Leak summary:", self.theme.heading),
            report.leaks.len(),
            s.definitely_lost,
            s.indirectly_lost,
            s.possibly_lost
        )
    }

    pub fn analysis(&self, out: &mut impl Write, number: usize, analysis: &Analysis) -> io::Result<()> {
        let leak = &analysis.leak;
        writeln!(out)?;
        writeln!(
            out,
            "{} {} bytes in {} block(s) {}",
            self.bold(format!("Leak #{}:", number), self.theme.heading),
            leak.byte_count,
            leak.block_count,
            leak.kind
        )?;
        writeln!(
            out,
            "  allocated in {}",
            self.paint(
                format!("{}() at {}:{}", leak.function, leak.file, leak.line),
                self.theme.location
            )
        )?;

        let chain: Vec<String> = leak.backtrace.iter().map(|f| format!("{}()", f.function)).collect();
        if chain.len() > 1 {
            writeln!(out, "  call chain  {}", self.paint(chain.join(" → "), self.theme.muted))?;
        }

        let Some(info) = &analysis.root_cause else {
            writeln!(
                out,
                "  {}",
                self.paint("root cause could not be determined", self.theme.muted)
            )?;
            if let Some(reason) = &analysis.trace_failure {
                writeln!(out, "  {}", self.paint(format!("({})", reason), self.theme.muted))?;
            }
            return Ok(());
        };

        let color = self.category_color(info.leak_kind);
        writeln!(out, "  root cause  {}", self.bold(info.leak_kind.to_string(), color))?;

        let line = match (&info.line, info.line_number) {
            (ResponsibleLine::EndOfProgram, _) => "end of program".to_string(),
            (line, Some(n)) => format!("{}:{}  {}", info.file, n, line),
            (line, None) => format!("{}  {}", info.file, line),
        };
        writeln!(
            out,
            "  responsible {} in {}()",
            self.paint(line, self.theme.code),
            info.function
        )?;

        let via = match analysis.strategy {
            Some(Strategy::Dynamic) => "execution trace",
            _ => "static scan",
        };
        writeln!(out, "  {}", self.paint(format!("ownership ({})", via), self.theme.muted))?;
        for (i, step) in info.steps.iter().enumerate() {
            writeln!(out, "    {:>2}. {}", i + 1, self.paint(step.as_str(), self.theme.step))?;
        }
        Ok(())
    }
}
