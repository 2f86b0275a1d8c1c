use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use internetometer::provider::{ConnectionInfo, YandexClient};
use internetometer::settings::{Settings, SettingsField};
use internetometer::speedtest::{
    Direction, EventSink, RateMeter, SpeedTest, SpeedTestResult, TestPhase, TestUpdate,
};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// (min, max, step) for the settings screen.
const CONCURRENCY_RANGE: (u64, u64, u64) = (1, 32, 1);
const LATENCY_ROUNDS_RANGE: (u64, u64, u64) = (1, 10, 1);
const UPLOAD_MB_RANGE: (u64, u64, u64) = (10, 200, 10);

/// Latency points kept for the chart.
const LATENCY_HISTORY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppView {
    Main,
    Settings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Panel {
    Download,
    Upload,
    Latency,
}

impl Panel {
    /// Left to right, as laid out on screen.
    pub const ALL: [Panel; 3] = [Panel::Download, Panel::Upload, Panel::Latency];

    fn index(self) -> usize {
        self as usize
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

pub struct App {
    pub phase: TestPhase,
    pub result: SpeedTestResult,
    pub info: Option<ConnectionInfo>,
    pub error: Option<String>,
    pub should_quit: bool,

    // UI state
    pub view: AppView,
    pub selected_panel: Panel,
    pub expanded: bool,

    // Settings
    pub settings: Settings,
    pub selected_setting: SettingsField,

    // Live rates
    pub download_meter: RateMeter,
    pub upload_meter: RateMeter,
    pub latency_samples: VecDeque<f64>,
    phase_started: Option<Instant>,

    cancel: Option<CancellationToken>,
}

impl App {
    pub fn new(settings: Settings) -> Self {
        Self {
            phase: TestPhase::Idle,
            result: SpeedTestResult::default(),
            info: None,
            error: None,
            should_quit: false,
            view: AppView::Main,
            selected_panel: Panel::Download,
            expanded: false,
            settings,
            selected_setting: SettingsField::Concurrency,
            download_meter: RateMeter::new(),
            upload_meter: RateMeter::new(),
            latency_samples: VecDeque::new(),
            phase_started: None,
            cancel: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase != TestPhase::Idle && self.phase != TestPhase::Complete
    }

    pub fn handle_key_event(&mut self, key: event::KeyEvent) -> Option<AppAction> {
        if key.kind != KeyEventKind::Press {
            return None;
        }

        let quit = key.code == KeyCode::Char('q')
            || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL));

        match self.view {
            AppView::Main if quit => {
                self.should_quit = true;
                Some(AppAction::Quit)
            }
            AppView::Main => self.main_key(key.code),
            AppView::Settings => {
                self.settings_key(key.code, quit);
                None
            }
        }
    }

    fn main_key(&mut self, code: KeyCode) -> Option<AppAction> {
        let running = self.is_running();
        match code {
            KeyCode::Char('s') if !running => self.view = AppView::Settings,
            KeyCode::Enter | KeyCode::Esc if self.expanded => self.expanded = false,
            KeyCode::Enter if !running => return Some(AppAction::StartTest),
            KeyCode::Enter => self.expanded = true,
            KeyCode::Esc if running => return Some(AppAction::CancelTest),
            KeyCode::Char(' ') => self.expanded = !self.expanded,
            KeyCode::Tab | KeyCode::Right | KeyCode::Char('j') if !self.expanded => {
                self.selected_panel = self.selected_panel.next();
            }
            KeyCode::BackTab | KeyCode::Left | KeyCode::Char('k') if !self.expanded => {
                self.selected_panel = self.selected_panel.prev();
            }
            _ => {}
        }
        None
    }

    fn settings_key(&mut self, code: KeyCode, quit: bool) {
        match code {
            _ if quit => self.view = AppView::Main,
            KeyCode::Esc | KeyCode::Enter => self.view = AppView::Main,
            KeyCode::Up | KeyCode::Char('k') => self.selected_setting = self.selected_setting.prev(),
            KeyCode::Down | KeyCode::Char('j') | KeyCode::Tab => {
                self.selected_setting = self.selected_setting.next();
            }
            KeyCode::Left | KeyCode::Char('h') => self.adjust_setting(false),
            KeyCode::Right | KeyCode::Char('l') => self.adjust_setting(true),
            _ => {}
        }
    }

    /// Steps the selected setting within its allowed range.
    fn adjust_setting(&mut self, up: bool) {
        fn step(value: u64, (min, max, by): (u64, u64, u64), up: bool) -> u64 {
            let next = if up { value.saturating_add(by) } else { value.saturating_sub(by) };
            next.clamp(min, max)
        }

        let settings = &mut self.settings;
        match self.selected_setting {
            SettingsField::Concurrency => {
                settings.concurrency = step(settings.concurrency as u64, CONCURRENCY_RANGE, up) as usize;
            }
            SettingsField::LatencyRounds => {
                settings.latency_rounds =
                    step(settings.latency_rounds as u64, LATENCY_ROUNDS_RANGE, up) as usize;
            }
            SettingsField::UploadSize => {
                settings.upload_size_mb = step(settings.upload_size_mb, UPLOAD_MB_RANGE, up);
            }
        }
    }

    pub fn reset_for_new_test(&mut self) {
        self.phase = TestPhase::Idle;
        self.result = SpeedTestResult::default();
        self.error = None;
        self.download_meter.reset();
        self.upload_meter.reset();
        self.latency_samples.clear();
        self.phase_started = None;
        self.expanded = false;
    }

    pub fn apply_update(&mut self, update: TestUpdate) {
        match update {
            TestUpdate::PhaseStarted(phase) => {
                self.phase = phase;
                self.phase_started = Some(Instant::now());
            }
            TestUpdate::LatencySample(rtt) => {
                self.latency_samples.push_back(rtt.as_secs_f64() * 1000.0);
                if self.latency_samples.len() > LATENCY_HISTORY {
                    self.latency_samples.pop_front();
                }
            }
            TestUpdate::LatencyComplete(latency) => self.result.latency = latency,
            TestUpdate::Progress(sample) => {
                let meter = match sample.direction {
                    Direction::Download => &mut self.download_meter,
                    Direction::Upload => &mut self.upload_meter,
                };
                meter.record(sample.bytes_total, Instant::now());
            }
            TestUpdate::DownloadComplete { speed_mbps } => self.result.download_mbps = speed_mbps,
            TestUpdate::UploadComplete { speed_mbps } => self.result.upload_mbps = speed_mbps,
        }
    }

    pub fn apply_message(&mut self, message: AppMessage) {
        match message {
            AppMessage::Info(info) => self.info = Some(info),
            AppMessage::Finished(Ok(result)) => {
                self.result = result;
                self.complete_test();
            }
            AppMessage::Finished(Err(err)) => {
                self.error = Some(err);
                self.complete_test();
            }
        }
    }

    /// Share of the current throughput window already elapsed.
    pub fn phase_progress(&self) -> f64 {
        match self.phase_started {
            Some(started) => {
                (started.elapsed().as_secs_f64() / self.settings.window.as_secs_f64()).min(1.0)
            }
            None => 0.0,
        }
    }

    pub fn complete_test(&mut self) {
        self.phase = TestPhase::Complete;
        self.cancel = None;
    }

    pub fn set_cancel(&mut self, cancel: CancellationToken) {
        self.cancel = Some(cancel);
    }

    pub fn cancel_test(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        self.phase = TestPhase::Idle;
    }
}

#[derive(Debug, Clone, Copy)]
pub enum AppAction {
    Quit,
    StartTest,
    CancelTest,
}

pub enum AppMessage {
    Info(ConnectionInfo),
    Finished(std::result::Result<SpeedTestResult, String>),
}

pub async fn run_speed_test(
    settings: Settings,
    sink: EventSink,
    message_tx: mpsc::Sender<AppMessage>,
    cancel: CancellationToken,
) -> Result<()> {
    let client = YandexClient::new(settings.clone()).context("failed to build HTTP client")?;

    let Ok(info) = client.connection_info(&cancel).await else {
        return Ok(());
    };
    let _ = message_tx.send(AppMessage::Info(info)).await;

    let http = client.http().clone();
    let test = SpeedTest::new(client, http, settings, sink);
    let outcome = test.run(&cancel).await.map_err(|err| err.to_string());
    if !cancel.is_cancelled() {
        let _ = message_tx.send(AppMessage::Finished(outcome)).await;
    }

    Ok(())
}

pub fn poll_event(timeout: Duration) -> Result<Option<Event>> {
    if event::poll(timeout)? {
        Ok(Some(event::read()?))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEvent;
    use internetometer::speedtest::ProgressSample;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn enter_starts_only_when_idle() {
        let mut app = App::new(Settings::default());
        assert!(matches!(
            app.handle_key_event(press(KeyCode::Enter)),
            Some(AppAction::StartTest)
        ));

        app.apply_update(TestUpdate::PhaseStarted(TestPhase::Download));
        assert!(app.handle_key_event(press(KeyCode::Enter)).is_none());
        assert!(app.expanded);
    }

    #[test]
    fn settings_are_clamped() {
        let mut app = App::new(Settings::default());
        app.handle_key_event(press(KeyCode::Char('s')));
        assert_eq!(app.view, AppView::Settings);

        for _ in 0..10 {
            app.handle_key_event(press(KeyCode::Left));
        }
        assert_eq!(app.settings.concurrency, 1);

        for _ in 0..50 {
            app.handle_key_event(press(KeyCode::Right));
        }
        assert_eq!(app.settings.concurrency, 32);

        app.handle_key_event(press(KeyCode::Down));
        app.handle_key_event(press(KeyCode::Down));
        for _ in 0..30 {
            app.handle_key_event(press(KeyCode::Right));
        }
        assert_eq!(app.settings.upload_size_mb, 200);

        app.handle_key_event(press(KeyCode::Char('q')));
        assert_eq!(app.view, AppView::Main);
        assert!(!app.should_quit);
    }

    #[test]
    fn panels_cycle_both_ways() {
        assert_eq!(Panel::Latency.next(), Panel::Download);
        assert_eq!(Panel::Download.prev(), Panel::Latency);
        assert_eq!(Panel::Upload.next(), Panel::Latency);
    }

    #[test]
    fn updates_fill_in_the_result() {
        let mut app = App::new(Settings::default());
        app.apply_update(TestUpdate::LatencySample(Duration::from_millis(20)));
        app.apply_update(TestUpdate::LatencyComplete(Some(Duration::from_millis(20))));
        app.apply_update(TestUpdate::Progress(ProgressSample {
            bytes_total: 1024,
            direction: Direction::Download,
        }));
        app.apply_update(TestUpdate::DownloadComplete { speed_mbps: 88.0 });
        app.apply_update(TestUpdate::UploadComplete { speed_mbps: 21.5 });

        assert_eq!(app.latency_samples, [20.0]);
        assert_eq!(app.result.latency, Some(Duration::from_millis(20)));
        assert_eq!(app.result.download_mbps, 88.0);
        assert_eq!(app.result.upload_mbps, 21.5);
    }

    #[test]
    fn failed_run_is_shown_as_error() {
        let mut app = App::new(Settings::default());
        app.apply_update(TestUpdate::PhaseStarted(TestPhase::Ping));
        app.apply_message(AppMessage::Finished(Err("failed to get probes".to_string())));
        assert_eq!(app.phase, TestPhase::Complete);
        assert_eq!(app.error.as_deref(), Some("failed to get probes"));
    }

    #[test]
    fn cancel_raises_the_token() {
        let mut app = App::new(Settings::default());
        let token = CancellationToken::new();
        app.set_cancel(token.clone());
        app.apply_update(TestUpdate::PhaseStarted(TestPhase::Upload));
        app.cancel_test();
        assert!(token.is_cancelled());
        assert_eq!(app.phase, TestPhase::Idle);
    }
}
