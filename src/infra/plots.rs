// ============================================================
// Layer 6 — SVG Plots
// ============================================================
// Renders read-only views of a fit as standalone SVG files:
//
//   density_<param>.svg   histogram density of the pooled draws
//   trace_<param>.svg     draw value vs iteration, one line per chain
//   intervals.svg         posterior mean and central interval per parameter
//   ess_ratio.svg         histogram of bulk ESS / total draws
//   observed_vs_predicted.svg
//                         held-out targets against point predictions,
//                         with the y = x reference line
//   observed_vs_fitted.svg
//                         GP only: training targets against the
//                         posterior mean latent function
//
// Files land in <output_dir>/<model>/plots/. SVG is written by
// hand so no rendering backend is needed.

use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use crate::domain::error::PipelineError;
use crate::domain::fit::FitResult;
use crate::infra::diagnostics::DiagnosticsReport;

const WIDTH: f64 = 640.0;
const HEIGHT: f64 = 400.0;
const MARGIN: f64 = 50.0;
const BINS: usize = 30;

const CHAIN_COLORS: [&str; 6] = ["#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b"];

// ─── Canvas ───────────────────────────────────────────────────────────────────
/// Maps data coordinates onto the plotting area of a fixed-size SVG.
struct Canvas {
    svg:   String,
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
}

impl Canvas {
    fn new(title: &str, x: (f64, f64), y: (f64, f64)) -> Self {
        let (x_min, x_max) = widen(x);
        let (y_min, y_max) = widen(y);

        let mut svg = String::new();
        svg.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        let _ = writeln!(
            svg,
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{WIDTH}\" height=\"{HEIGHT}\">"
        );
        svg.push_str("  <rect width=\"100%\" height=\"100%\" fill=\"#ffffff\"/>\n");
        let _ = writeln!(
            svg,
            "  <text x=\"{:.1}\" y=\"25\" text-anchor=\"middle\" font-family=\"sans-serif\" font-size=\"15\">{}</text>",
            WIDTH / 2.0,
            escape(title)
        );
        let _ = writeln!(
            svg,
            "  <rect x=\"{MARGIN}\" y=\"{MARGIN}\" width=\"{:.1}\" height=\"{:.1}\" fill=\"none\" stroke=\"#333\"/>",
            WIDTH - 2.0 * MARGIN,
            HEIGHT - 2.0 * MARGIN
        );

        let mut canvas = Self { svg, x_min, x_max, y_min, y_max };
        canvas.axis_labels();
        canvas
    }

    fn px(&self, x: f64) -> f64 {
        MARGIN + (x - self.x_min) / (self.x_max - self.x_min) * (WIDTH - 2.0 * MARGIN)
    }

    fn py(&self, y: f64) -> f64 {
        HEIGHT - MARGIN - (y - self.y_min) / (self.y_max - self.y_min) * (HEIGHT - 2.0 * MARGIN)
    }

    fn axis_labels(&mut self) {
        let labels = [
            (MARGIN, HEIGHT - MARGIN + 16.0, "start", self.x_min),
            (WIDTH - MARGIN, HEIGHT - MARGIN + 16.0, "end", self.x_max),
            (MARGIN - 4.0, HEIGHT - MARGIN, "end", self.y_min),
            (MARGIN - 4.0, MARGIN + 10.0, "end", self.y_max),
        ];
        for (x, y, anchor, v) in labels {
            let _ = writeln!(
                self.svg,
                "  <text x=\"{x:.1}\" y=\"{y:.1}\" text-anchor=\"{anchor}\" font-family=\"monospace\" font-size=\"10\">{v:.3}</text>"
            );
        }
    }

    fn polyline(&mut self, points: &[(f64, f64)], color: &str) {
        let coords: Vec<String> = points
            .iter()
            .map(|&(x, y)| format!("{:.1},{:.1}", self.px(x), self.py(y)))
            .collect();
        let _ = writeln!(
            self.svg,
            "  <polyline points=\"{}\" fill=\"none\" stroke=\"{color}\" stroke-width=\"1\"/>",
            coords.join(" ")
        );
    }

    fn line(&mut self, from: (f64, f64), to: (f64, f64), color: &str) {
        let _ = writeln!(
            self.svg,
            "  <line x1=\"{:.1}\" y1=\"{:.1}\" x2=\"{:.1}\" y2=\"{:.1}\" stroke=\"{color}\"/>",
            self.px(from.0),
            self.py(from.1),
            self.px(to.0),
            self.py(to.1)
        );
    }

    fn circle(&mut self, x: f64, y: f64, color: &str) {
        let _ = writeln!(
            self.svg,
            "  <circle cx=\"{:.1}\" cy=\"{:.1}\" r=\"3\" fill=\"{color}\" fill-opacity=\"0.6\"/>",
            self.px(x),
            self.py(y)
        );
    }

    fn bar(&mut self, x0: f64, x1: f64, height: f64, color: &str) {
        let (left, right) = (self.px(x0), self.px(x1));
        let (top, bottom) = (self.py(height), self.py(self.y_min.max(0.0)));
        let _ = writeln!(
            self.svg,
            "  <rect x=\"{left:.1}\" y=\"{top:.1}\" width=\"{:.1}\" height=\"{:.1}\" fill=\"{color}\" stroke=\"#fff\"/>",
            (right - left).max(0.0),
            (bottom - top).max(0.0)
        );
    }

    fn label(&mut self, x: f64, y: f64, text: &str) {
        let _ = writeln!(
            self.svg,
            "  <text x=\"{:.1}\" y=\"{:.1}\" font-family=\"monospace\" font-size=\"10\">{}</text>",
            self.px(x) + 4.0,
            self.py(y) - 4.0,
            escape(text)
        );
    }

    fn finish(mut self) -> String {
        self.svg.push_str("</svg>\n");
        self.svg
    }
}

fn widen((lo, hi): (f64, f64)) -> (f64, f64) {
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    if (hi - lo).abs() < 1e-12 {
        return (lo - 0.5, hi + 0.5);
    }
    (lo, hi)
}

fn bounds<'a>(values: impl IntoIterator<Item = &'a f64>) -> (f64, f64) {
    values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Histogram counts of `values` over [lo, hi] in `bins` equal bins.
fn histogram(values: &[f64], lo: f64, hi: f64, bins: usize) -> Vec<usize> {
    let mut counts = vec![0usize; bins];
    let width = (hi - lo) / bins as f64;
    for &v in values.iter().filter(|v| v.is_finite()) {
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    counts
}

// ─── Individual plots ─────────────────────────────────────────────────────────

pub fn density_svg(name: &str, draws: &[f64]) -> String {
    let (lo, hi) = widen(bounds(draws));
    let counts   = histogram(draws, lo, hi, BINS);
    let width    = (hi - lo) / BINS as f64;
    let total    = draws.len().max(1) as f64;

    let densities: Vec<f64> = counts.iter().map(|&c| c as f64 / (total * width)).collect();
    let peak = densities.iter().copied().fold(0.0, f64::max);

    let mut canvas = Canvas::new(&format!("posterior density: {name}"), (lo, hi), (0.0, peak));
    for (i, d) in densities.iter().enumerate() {
        let x0 = lo + i as f64 * width;
        canvas.bar(x0, x0 + width, *d, "#9ecae1");
    }
    let outline: Vec<(f64, f64)> = densities
        .iter()
        .enumerate()
        .map(|(i, &d)| (lo + (i as f64 + 0.5) * width, d))
        .collect();
    canvas.polyline(&outline, "#08519c");
    canvas.finish()
}

pub fn trace_svg(name: &str, chains: &[Vec<f64>]) -> String {
    let draws = chains.iter().map(|c| c.len()).max().unwrap_or(0);
    let (lo, hi) = bounds(chains.iter().flatten());

    let mut canvas = Canvas::new(&format!("trace: {name}"), (0.0, draws as f64), (lo, hi));
    for (c, chain) in chains.iter().enumerate() {
        let points: Vec<(f64, f64)> = chain.iter().enumerate().map(|(i, &v)| (i as f64, v)).collect();
        canvas.polyline(&points, CHAIN_COLORS[c % CHAIN_COLORS.len()]);
    }
    canvas.finish()
}

pub fn intervals_svg(report: &DiagnosticsReport) -> String {
    let n = report.params.len();
    let (lo, hi) = bounds(report.params.iter().flat_map(|p| [&p.lower, &p.upper]));

    let title = format!(
        "{}: posterior means with {:.0}% intervals",
        report.model_name,
        report.interval_prob * 100.0
    );
    let mut canvas = Canvas::new(&title, (lo, hi), (0.0, n as f64 + 1.0));
    for (i, p) in report.params.iter().enumerate() {
        let row = (n - i) as f64;
        canvas.line((p.lower, row), (p.upper, row), "#333");
        canvas.circle(p.mean, row, "#d62728");
        canvas.label(p.upper, row, &p.name);
    }
    canvas.finish()
}

pub fn ess_ratio_svg(report: &DiagnosticsReport) -> String {
    let total = (report.num_chains * report.num_draws).max(1) as f64;
    let ratios: Vec<f64> = report
        .params
        .iter()
        .map(|p| p.ess_bulk / total)
        .filter(|r| r.is_finite())
        .collect();

    let (lo, hi) = widen(bounds(ratios.iter().chain([0.0, 1.0].iter())));
    let bins   = 20;
    let counts = histogram(&ratios, lo, hi, bins);
    let peak   = counts.iter().copied().max().unwrap_or(0) as f64;
    let width  = (hi - lo) / bins as f64;

    let title = format!("{}: bulk ESS / draws", report.model_name);
    let mut canvas = Canvas::new(&title, (lo, hi), (0.0, peak));
    for (i, &c) in counts.iter().enumerate() {
        let x0 = lo + i as f64 * width;
        canvas.bar(x0, x0 + width, c as f64, "#a1d99b");
    }
    canvas.finish()
}

pub fn observed_vs_predicted_svg(model: &str, observed: &[f64], predicted: &[f64]) -> String {
    let (lo, hi) = bounds(observed.iter().chain(predicted));

    let mut canvas = Canvas::new(&format!("{model}: observed vs predicted"), (lo, hi), (lo, hi));
    canvas.line((lo, lo), (hi, hi), "#999");
    for (&o, &p) in observed.iter().zip(predicted) {
        canvas.circle(o, p, "#1f77b4");
    }
    canvas.finish()
}

// ─── Rendering a whole fit ────────────────────────────────────────────────────

/// Write every plot for one fit into `<dir>/plots/`. `holdout` is the
/// (observed, predicted) pair of the test set when it is known.
pub fn render_fit(
    dir: &Path,
    fit: &FitResult,
    report: &DiagnosticsReport,
    holdout: Option<(&[f64], &[f64])>,
) -> Result<Vec<PathBuf>, PipelineError> {
    let plots = dir.join("plots");
    fs::create_dir_all(&plots)?;

    let mut written = Vec::new();
    let mut write = |file: String, svg: String| -> Result<(), PipelineError> {
        let path = plots.join(file);
        fs::write(&path, svg)?;
        tracing::debug!("Wrote plot {}", path.display());
        written.push(path);
        Ok(())
    };

    for p in &report.params {
        if let Some(chains) = fit.draws(&p.name) {
            let flat: Vec<f64> = chains.iter().flatten().copied().collect();
            write(format!("density_{}.svg", p.name), density_svg(&p.name, &flat))?;
            write(format!("trace_{}.svg", p.name), trace_svg(&p.name, chains))?;
        }
    }
    write("intervals.svg".to_string(), intervals_svg(report))?;
    write("ess_ratio.svg".to_string(), ess_ratio_svg(report))?;

    if let Some((observed, predicted)) = holdout {
        write(
            "observed_vs_predicted.svg".to_string(),
            observed_vs_predicted_svg(fit.model_name(), observed, predicted),
        )?;
    }

    Ok(written)
}

/// Training targets against the recovered latent function.
pub fn render_fitted(
    dir: &Path,
    model: &str,
    observed: &[f64],
    fitted: &[f64],
) -> Result<PathBuf, PipelineError> {
    let plots = dir.join("plots");
    fs::create_dir_all(&plots)?;

    let path = plots.join("observed_vs_fitted.svg");
    let svg  = observed_vs_predicted_svg(&format!("{model} (train, latent f)"), observed, fitted);
    fs::write(&path, svg)?;
    tracing::debug!("Wrote plot {}", path.display());
    Ok(path)
}
