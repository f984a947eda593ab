use crate::audio::AudioEngine;
use crate::core::{PlayerController, TickOutcome};
use crate::model::VolumeChange;
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::io::stdout;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const VOLUME_STEP: i32 = 10;

#[derive(Debug, Clone)]
pub struct AppOptions {
    pub music_root: PathBuf,
    pub tick: Duration,
    pub autoplay: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub struct App<E: AudioEngine> {
    controller: PlayerController<E>,
    music_root: PathBuf,
    message: String,
    dirty: bool,
}

impl<E: AudioEngine> App<E> {
    pub fn new(controller: PlayerController<E>, music_root: PathBuf) -> Self {
        let mut app = Self {
            controller,
            music_root,
            message: String::from("space play/pause  n next  p prev  s shuffle  q quit"),
            dirty: true,
        };
        app.collect_notice();
        app
    }

    pub fn controller(&self) -> &PlayerController<E> {
        &self.controller
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn autoplay(&mut self) {
        if self.controller.current_playlist().is_none() {
            return;
        }
        let result = self.controller.toggle_play_pause();
        self.report(result);
    }

    pub fn tick(&mut self) -> bool {
        let outcome = self.controller.monitor_tick();
        if outcome != TickOutcome::Idle {
            self.dirty = true;
        }
        self.collect_notice();
        outcome != TickOutcome::Idle
    }

    fn handle_key(&mut self, key: KeyEvent) -> Flow {
        if key.kind != KeyEventKind::Press {
            return Flow::Continue;
        }
        self.dirty = true;

        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Flow::Quit;
            }
            KeyCode::Char('q') | KeyCode::Esc => return Flow::Quit,
            KeyCode::Char(' ') => {
                let result = self.controller.toggle_play_pause();
                self.report(result);
            }
            KeyCode::Char('n') | KeyCode::Right => {
                let result = self.controller.next();
                self.report(result);
            }
            KeyCode::Char('p') | KeyCode::Left => {
                let result = self.controller.previous();
                self.report(result);
            }
            KeyCode::Char('x') => {
                self.controller.stop();
                self.message = String::from("Stopped");
            }
            KeyCode::Char('s') => {
                let enabled = !self.controller.shuffle();
                self.controller.set_shuffle(enabled);
                self.message = format!("Shuffle {}", if enabled { "on" } else { "off" });
            }
            KeyCode::Char('+') | KeyCode::Char('=') => {
                let volume = self.controller.set_volume(VolumeChange::By(VOLUME_STEP));
                self.message = format!("Volume: {volume}%");
            }
            KeyCode::Char('-') => {
                let volume = self.controller.set_volume(VolumeChange::By(-VOLUME_STEP));
                self.message = format!("Volume: {volume}%");
            }
            KeyCode::Char('r') => {
                self.controller.rescan(&self.music_root);
            }
            KeyCode::Char('[') | KeyCode::Char(']') => {
                let forward = key.code == KeyCode::Char(']');
                if let Some(name) = self.controller.select_adjacent_playlist(forward) {
                    info!(playlist = %name, "switched playlist");
                    let index = self.controller.current_index().unwrap_or(0);
                    let result = self.controller.play_track_at_index(index);
                    self.report(result);
                }
            }
            _ => self.dirty = false,
        }

        self.collect_notice();
        Flow::Continue
    }

    fn report(&mut self, result: crate::error::Result<()>) {
        match result {
            Ok(()) => {
                if let Some(title) = self.controller.current_title() {
                    self.message = format!("{}: {title}", self.controller.status().label());
                }
            }
            Err(err) => {
                warn!("{err}");
                self.message = err.to_string();
            }
        }
    }

    fn collect_notice(&mut self) {
        if let Some(notice) = self.controller.take_notice() {
            self.message = notice.to_string();
            self.dirty = true;
        }
    }
}

pub fn run<E: AudioEngine>(controller: PlayerController<E>, options: AppOptions) -> Result<()> {
    let mut app = App::new(controller, options.music_root);
    if options.autoplay {
        app.autoplay();
    }

    enable_raw_mode()?;
    let mut out = stdout();
    execute!(out, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(out);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let mut last_tick = Instant::now();
    let mut last_draw = Instant::now();

    let result: Result<()> = loop {
        if last_tick.elapsed() >= options.tick {
            app.tick();
            last_tick = Instant::now();
        }

        // position display moves even when nothing else does
        if app.dirty || last_draw.elapsed() > Duration::from_millis(250) {
            if let Err(err) =
                terminal.draw(|frame| crate::ui::draw(frame, &app.controller, &app.message))
            {
                break Err(err.into());
            }
            app.dirty = false;
            last_draw = Instant::now();
        }

        match event::poll(Duration::from_millis(33)) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(err) => break Err(err.into()),
        }

        let key = match event::read() {
            Ok(Event::Key(key)) => key,
            Ok(_) => {
                app.dirty = true;
                continue;
            }
            Err(err) => break Err(err.into()),
        };
        if app.handle_key(key) == Flow::Quit {
            break Ok(());
        }
    };

    finish(&mut app.controller, result, || restore_terminal(&mut terminal))
}

// Teardown runs whatever the loop ended with; the loop error wins.
fn finish<E: AudioEngine>(
    controller: &mut PlayerController<E>,
    result: Result<()>,
    restore: impl FnOnce() -> Result<()>,
) -> Result<()> {
    let save_result = controller.shutdown();
    let restore_result = restore();
    result?;
    restore_result?;
    save_result?;
    info!("session ended");
    Ok(())
}

fn restore_terminal<W: std::io::Write>(terminal: &mut Terminal<CrosstermBackend<W>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}
