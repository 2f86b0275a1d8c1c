use crate::app::{App, AppView, Panel};
use internetometer::settings::SettingsField;
use internetometer::speedtest::TestPhase;
use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{
        Axis, Block, Borders, Chart, Dataset, GraphType, LineGauge, Padding, Paragraph, Row,
        Sparkline, Table,
    },
    Frame,
};
use std::collections::VecDeque;

const ACCENT: Color = Color::Rgb(255, 95, 175);
const DOWNLOAD: Color = Color::Rgb(134, 194, 156);
const DOWNLOAD_DIM: Color = Color::Rgb(80, 120, 90);
const UPLOAD: Color = Color::Rgb(147, 180, 220);
const UPLOAD_DIM: Color = Color::Rgb(90, 110, 140);
const LATENCY: Color = Color::Rgb(220, 180, 130);
const ERROR: Color = Color::Rgb(230, 110, 110);
const TEXT_PRIMARY: Color = Color::Rgb(230, 230, 230);
const TEXT_SECONDARY: Color = Color::Rgb(160, 160, 160);
const TEXT_MUTED: Color = Color::Rgb(100, 100, 100);
const BORDER: Color = Color::Rgb(60, 60, 65);
const BORDER_ACTIVE: Color = Color::Rgb(100, 100, 110);

pub fn draw_ui(frame: &mut Frame, app: &App) {
    let area = frame.area();

    match app.view {
        AppView::Main => draw_main_view(frame, area, app),
        AppView::Settings => draw_settings_view(frame, area, app),
    }
}

fn draw_main_view(frame: &mut Frame, area: Rect, app: &App) {
    let [header, info, body, footer] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(1),
        Constraint::Min(8),
        Constraint::Length(1),
    ])
    .areas(area);

    draw_header(frame, header, app);
    draw_connection_info(frame, info, app);

    if app.expanded {
        draw_panel(frame, body, app, app.selected_panel, true);
    } else {
        let columns: [Rect; 3] = Layout::horizontal([Constraint::Fill(1); 3]).areas(body);
        for (area, panel) in columns.into_iter().zip(Panel::ALL) {
            draw_panel(frame, area, app, panel, false);
        }
    }

    draw_help(frame, footer, app);
}

fn draw_panel(frame: &mut Frame, area: Rect, app: &App, panel: Panel, expanded: bool) {
    match panel {
        Panel::Latency => draw_latency(frame, area, app, expanded),
        Panel::Download | Panel::Upload => draw_throughput(frame, area, app, panel, expanded),
    }
}

fn draw_header(frame: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(Style::default().fg(BORDER));
    let [name, status_area, phases] = Layout::horizontal([
        Constraint::Length(16),
        Constraint::Fill(1),
        Constraint::Length(20),
    ])
    .areas(block.inner(area));
    frame.render_widget(block, area);

    frame.render_widget(
        Span::styled(
            "internetometer",
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        ),
        name,
    );

    let (status, color) = match (&app.error, app.phase) {
        (Some(err), _) => (format!("Error: {err}"), ERROR),
        (None, TestPhase::Idle) => ("Ready".to_string(), TEXT_MUTED),
        (None, TestPhase::Ping) => ("Measuring latency...".to_string(), LATENCY),
        (None, TestPhase::Download) => ("Measuring download...".to_string(), DOWNLOAD),
        (None, TestPhase::Upload) => ("Measuring upload...".to_string(), UPLOAD),
        (None, TestPhase::Complete) => ("Complete".to_string(), ACCENT),
    };
    frame.render_widget(
        Line::styled(status, Style::default().fg(color)).centered(),
        status_area,
    );
    frame.render_widget(phase_line(app.phase).right_aligned(), phases);
}

/// `ping / down / up`, current phase highlighted and finished ones dimmed less.
fn phase_line(phase: TestPhase) -> Line<'static> {
    let order = |p: TestPhase| match p {
        TestPhase::Idle => 0,
        TestPhase::Ping => 1,
        TestPhase::Download => 2,
        TestPhase::Upload => 3,
        TestPhase::Complete => 4,
    };

    let steps = [
        (TestPhase::Ping, "ping"),
        (TestPhase::Download, "down"),
        (TestPhase::Upload, "up"),
    ];
    let spans = steps.into_iter().enumerate().flat_map(|(i, (step, label))| {
        let style = match order(step).cmp(&order(phase)) {
            std::cmp::Ordering::Equal => Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
            std::cmp::Ordering::Less => Style::default().fg(TEXT_SECONDARY),
            std::cmp::Ordering::Greater => Style::default().fg(TEXT_MUTED),
        };
        let divider = (i > 0).then(|| Span::styled(" / ", Style::default().fg(TEXT_MUTED)));
        divider.into_iter().chain([Span::styled(label, style)])
    });

    Line::from_iter(spans)
}

fn draw_connection_info(frame: &mut Frame, area: Rect, app: &App) {
    let line = match &app.info {
        None if app.is_running() => Line::from(Span::styled(
            "Gathering information...",
            Style::default().fg(TEXT_MUTED),
        )),
        None => Line::default(),
        Some(info) => {
            let field = |label: &'static str, value: Option<&str>| {
                vec![
                    Span::styled(label, Style::default().fg(TEXT_MUTED)),
                    Span::styled(
                        value.unwrap_or("-").to_string(),
                        Style::default().fg(TEXT_SECONDARY),
                    ),
                ]
            };
            let mut spans = field("IPv4 ", info.ipv4.as_deref());
            if info.ipv6.is_some() {
                spans.extend(field("  ·  IPv6 ", info.ipv6.as_deref()));
            }
            spans.extend(field("  ·  Region ", info.region.as_deref()));
            spans.extend(field(
                "  ·  ISP ",
                info.isp.as_ref().map(|isp| isp.name.as_str()),
            ));
            Line::from(spans)
        }
    };

    frame.render_widget(Paragraph::new(line).alignment(Alignment::Center), area);
}

fn draw_throughput(frame: &mut Frame, area: Rect, app: &App, panel: Panel, expanded: bool) {
    let (title, color, dim, meter, final_mbps, progress) = match panel {
        Panel::Upload => (
            "Upload",
            UPLOAD,
            UPLOAD_DIM,
            &app.upload_meter,
            app.result.upload_mbps,
            upload_progress(app),
        ),
        _ => (
            "Download",
            DOWNLOAD,
            DOWNLOAD_DIM,
            &app.download_meter,
            app.result.download_mbps,
            download_progress(app),
        ),
    };

    let selected = expanded || app.selected_panel == panel;
    let block = panel_block(title, color, selected);
    let [value_area, bar_area, history_area] = panel_rows(block.inner(area));
    frame.render_widget(block, area);

    let speed = if final_mbps > 0.0 {
        final_mbps
    } else {
        meter.current_mbps()
    };
    let samples = meter.samples();

    let headline = if expanded {
        let Summary { min, max, avg } = Summary::of(samples);
        Line::from(vec![
            Span::styled(
                format_speed(speed),
                Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD),
            ),
            separator(),
            Span::styled(format!("avg {}", format_speed(avg)), Style::default().fg(TEXT_MUTED)),
            separator(),
            Span::styled(format!("max {}", format_speed(max)), Style::default().fg(TEXT_MUTED)),
            separator(),
            Span::styled(format!("min {}", format_speed(min)), Style::default().fg(TEXT_MUTED)),
        ])
    } else {
        Line::from(Span::styled(
            format_speed(speed),
            Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD),
        ))
    };
    frame.render_widget(headline.centered(), value_area);

    draw_progress_bar(frame, bar_area, progress, color, dim);
    draw_history(frame, history_area, samples, color, expanded.then_some("Mbps"));
}

fn draw_latency(frame: &mut Frame, area: Rect, app: &App, expanded: bool) {
    let selected = expanded || app.selected_panel == Panel::Latency;
    let block = panel_block("Latency", LATENCY, selected);
    let [value_area, detail_area, history_area] = panel_rows(block.inner(area));
    frame.render_widget(block, area);

    let value = match app.result.latency {
        Some(latency) => format!("{} ms", latency.as_millis()),
        None if app.phase == TestPhase::Complete || app.phase == TestPhase::Upload => {
            "unavailable".to_string()
        }
        None => app
            .latency_samples
            .iter()
            .cloned()
            .reduce(f64::min)
            .map(|ms| format!("{ms:.0} ms"))
            .unwrap_or_else(|| "—".to_string()),
    };
    frame.render_widget(
        Line::styled(value, Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD))
            .centered(),
        value_area,
    );

    let detail = if expanded && !app.latency_samples.is_empty() {
        let Summary { min, max, avg } = Summary::of(&app.latency_samples);
        format!("min {min:.0} · avg {avg:.0} · max {max:.0} ms")
    } else {
        format!("best of {} round trips", app.latency_samples.len())
    };
    frame.render_widget(
        Line::styled(detail, Style::default().fg(TEXT_MUTED)).centered(),
        detail_area,
    );

    draw_history(frame, history_area, &app.latency_samples, LATENCY, expanded.then_some("ms"));
}

/// Headline value, progress line, then history.
fn panel_rows(inner: Rect) -> [Rect; 3] {
    Layout::vertical([
        Constraint::Length(2),
        Constraint::Length(1),
        Constraint::Min(3),
    ])
    .areas(inner)
}

fn panel_block(title: &str, color: Color, selected: bool) -> Block<'static> {
    Block::bordered()
        .border_style(Style::default().fg(if selected { BORDER_ACTIVE } else { BORDER }))
        .title(Span::styled(
            format!(" {title} "),
            Style::default().fg(if selected { color } else { TEXT_SECONDARY }),
        ))
}

fn separator() -> Span<'static> {
    Span::styled("  ·  ", Style::default().fg(TEXT_MUTED))
}

fn draw_progress_bar(frame: &mut Frame, area: Rect, ratio: f64, color: Color, dim_color: Color) {
    let gauge = LineGauge::default()
        .line_set(symbols::line::THICK)
        .filled_style(Style::default().fg(color))
        .unfilled_style(Style::default().fg(dim_color))
        .label("")
        .ratio(ratio.clamp(0.0, 1.0));
    frame.render_widget(gauge, area);
}

/// Compact panels get a sparkline, the expanded panel a labelled line chart.
fn draw_history(
    frame: &mut Frame,
    area: Rect,
    data: &VecDeque<f64>,
    color: Color,
    unit: Option<&str>,
) {
    if data.is_empty() || area.height < 2 {
        return;
    }

    let Some(unit) = unit else {
        // sparkline wants integers, keep one decimal of resolution
        let bars: Vec<u64> = data
            .iter()
            .rev()
            .take(area.width as usize)
            .rev()
            .map(|v| (v * 10.0).round() as u64)
            .collect();
        frame.render_widget(
            Sparkline::default().data(&bars).style(Style::default().fg(color)),
            area,
        );
        return;
    };

    let summary = Summary::of(data);
    let headroom = (summary.max - summary.min).max(0.1) / 10.0;
    let bounds = [(summary.min - headroom).max(0.0), summary.max + headroom];
    let points: Vec<(f64, f64)> = (0..).map(f64::from).zip(data.iter().copied()).collect();

    let chart = Chart::new(vec![Dataset::default()
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(color))
        .data(&points)])
    .x_axis(Axis::default().bounds([0.0, points.len() as f64]))
    .y_axis(
        Axis::default()
            .style(Style::default().fg(BORDER))
            .bounds(bounds)
            .labels([
                Span::styled(format!("{:.0}", bounds[0]), Style::default().fg(TEXT_MUTED)),
                Span::styled(format!("{:.0} {unit}", bounds[1]), Style::default().fg(TEXT_MUTED)),
            ]),
    );
    frame.render_widget(chart, area);
}

fn draw_settings_view(frame: &mut Frame, area: Rect, app: &App) {
    let [body, footer] = Layout::vertical([Constraint::Min(5), Constraint::Length(1)]).areas(area);

    let entries = [
        (
            SettingsField::Concurrency,
            "Connections",
            app.settings.concurrency.to_string(),
        ),
        (
            SettingsField::LatencyRounds,
            "Latency rounds",
            app.settings.latency_rounds.to_string(),
        ),
        (
            SettingsField::UploadSize,
            "Upload size",
            format!("{} MiB", app.settings.upload_size_mb),
        ),
    ];

    let rows = entries.into_iter().map(|(field, label, value)| {
        let row = if field == app.selected_setting {
            Row::new(vec![
                Span::styled(format!("› {label}"), Style::default().fg(ACCENT)),
                Span::styled(format!("◂ {value} ▸"), Style::default().fg(TEXT_PRIMARY)),
            ])
        } else {
            Row::new(vec![
                Span::styled(format!("  {label}"), Style::default().fg(TEXT_SECONDARY)),
                Span::styled(format!("  {value}"), Style::default().fg(TEXT_MUTED)),
            ])
        };
        row.height(2)
    });

    let table = Table::new(rows, [Constraint::Length(20), Constraint::Fill(1)]).block(
        Block::bordered()
            .border_style(Style::default().fg(BORDER))
            .title(Span::styled(
                " Settings ",
                Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD),
            ))
            .padding(Padding::uniform(1)),
    );
    frame.render_widget(table, body);

    frame.render_widget(
        Paragraph::new("↑↓ select · ←→ adjust · enter done")
            .style(Style::default().fg(TEXT_MUTED))
            .alignment(Alignment::Center),
        footer,
    );
}

fn draw_help(frame: &mut Frame, area: Rect, app: &App) {
    let help = if app.expanded {
        "esc close · q quit"
    } else if app.is_running() {
        "tab select · space expand · esc cancel · q quit"
    } else {
        "enter start · s settings · tab select · space expand · q quit"
    };

    frame.render_widget(
        Paragraph::new(help)
            .style(Style::default().fg(TEXT_MUTED))
            .alignment(Alignment::Center),
        area,
    );
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Summary {
    min: f64,
    max: f64,
    avg: f64,
}

impl Summary {
    /// All zero for an empty history.
    fn of(data: &VecDeque<f64>) -> Self {
        let Some(&first) = data.front() else {
            return Self { min: 0.0, max: 0.0, avg: 0.0 };
        };
        let (min, max, sum) = data
            .iter()
            .fold((first, first, 0.0), |(lo, hi, sum), &v| (lo.min(v), hi.max(v), sum + v));
        Self { min, max, avg: sum / data.len() as f64 }
    }
}

fn download_progress(app: &App) -> f64 {
    match app.phase {
        TestPhase::Download => app.phase_progress(),
        TestPhase::Upload | TestPhase::Complete => 1.0,
        _ => 0.0,
    }
}

fn upload_progress(app: &App) -> f64 {
    match app.phase {
        TestPhase::Upload => app.phase_progress(),
        TestPhase::Complete => 1.0,
        _ => 0.0,
    }
}

fn format_speed(mbps: f64) -> String {
    match mbps {
        m if m >= 1000.0 => format!("{:.1} Gbps", m / 1000.0),
        m if m >= 1.0 => format!("{m:.1} Mbps"),
        m if m > 0.0 => format!("{:.0} Kbps", m * 1000.0),
        _ => "—".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speeds_pick_a_readable_unit() {
        assert_eq!(format_speed(0.0), "—");
        assert_eq!(format_speed(0.25), "250 Kbps");
        assert_eq!(format_speed(93.44), "93.4 Mbps");
        assert_eq!(format_speed(1260.0), "1.3 Gbps");
    }

    #[test]
    fn summary_of_history() {
        assert_eq!(
            Summary::of(&VecDeque::new()),
            Summary { min: 0.0, max: 0.0, avg: 0.0 }
        );
        assert_eq!(
            Summary::of(&VecDeque::from([2.0, 4.0, 9.0])),
            Summary { min: 2.0, max: 9.0, avg: 5.0 }
        );
    }
}
