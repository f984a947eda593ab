use crate::audio::AudioEngine;
use crate::core::PlayerController;
use crate::model::{PlaybackStatus, Settings};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};
use std::time::Duration;

const TIMELINE_WIDTH: usize = 20;

#[derive(Clone, Copy)]
struct BarPalette {
    bg: Color,
    button: Color,
    text: Color,
    muted: Color,
}

fn palette(settings: &Settings) -> BarPalette {
    let text = parse_hex_color(&settings.font_color).unwrap_or(Color::White);
    BarPalette {
        bg: parse_hex_color(&settings.bg_color).unwrap_or(Color::Black),
        button: parse_hex_color(&settings.btn_color).unwrap_or(Color::DarkGray),
        text,
        muted: dim(text),
    }
}

pub fn parse_hex_color(raw: &str) -> Option<Color> {
    let hex = raw.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
    Some(Color::Rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

fn dim(color: Color) -> Color {
    match color {
        Color::Rgb(r, g, b) => Color::Rgb(r / 3 * 2, g / 3 * 2, b / 3 * 2),
        other => other,
    }
}

pub fn draw<E: AudioEngine>(frame: &mut Frame, controller: &PlayerController<E>, message: &str) {
    let colors = palette(controller.settings());
    let block = Block::default()
        .borders(if controller.settings().show_titlebar {
            Borders::ALL
        } else {
            Borders::NONE
        })
        .title(Span::styled(
            " tunebar ",
            Style::default()
                .fg(colors.text)
                .add_modifier(Modifier::BOLD),
        ))
        .border_style(Style::default().fg(colors.button))
        .style(Style::default().bg(colors.bg));
    let inner = block.inner(frame.area());
    frame.render_widget(block, frame.area());

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(inner);

    frame.render_widget(Paragraph::new(controls_line(controller, &colors)), rows[0]);

    let title = controller
        .current_title()
        .unwrap_or_else(|| String::from("Nothing loaded"));
    let track_line = Line::from(vec![
        Span::styled(
            format!("{:<8}", controller.status().label()),
            Style::default().fg(colors.muted),
        ),
        Span::styled(
            title,
            Style::default()
                .fg(colors.text)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        Span::styled(
            timeline(controller.position(), controller.duration()),
            Style::default().fg(colors.muted),
        ),
    ]);
    frame.render_widget(Paragraph::new(track_line), rows[1]);

    frame.render_widget(
        Paragraph::new(Span::styled(message, Style::default().fg(colors.muted))),
        rows[2],
    );
}

fn controls_line<E: AudioEngine>(
    controller: &PlayerController<E>,
    colors: &BarPalette,
) -> Line<'static> {
    let button = Style::default().fg(colors.text).bg(colors.button);
    let play_label = if controller.status() == PlaybackStatus::Playing {
        " ❚❚ "
    } else {
        " ▶ "
    };
    let shuffle_label = if controller.shuffle() {
        " Shuffle on "
    } else {
        " Shuffle off "
    };
    let playlist = controller
        .current_playlist()
        .map(str::to_string)
        .unwrap_or_else(|| String::from("No playlist"));

    Line::from(vec![
        Span::styled(" ◀◀ ", button),
        Span::raw(" "),
        Span::styled(play_label, button.add_modifier(Modifier::BOLD)),
        Span::raw(" "),
        Span::styled(" ▶▶ ", button),
        Span::raw(" "),
        Span::styled(shuffle_label, button),
        Span::raw("  "),
        Span::styled(format!("[{playlist}]"), Style::default().fg(colors.text)),
        Span::styled(
            format!("  Vol {:>3}%", controller.volume()),
            Style::default().fg(colors.muted),
        ),
    ])
}

fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    format!("{minutes:02}:{seconds:02}")
}

fn progress_bar(ratio: Option<f64>, width: usize) -> String {
    let clamped = ratio.unwrap_or(0.0).clamp(0.0, 1.0);
    let filled = (clamped * width as f64).round() as usize;
    let mut bar = String::with_capacity(width + 2);
    bar.push('[');
    bar.push_str(&"#".repeat(filled));
    bar.push_str(&"-".repeat(width.saturating_sub(filled)));
    bar.push(']');
    bar
}

fn timeline(position: Option<Duration>, total: Option<Duration>) -> String {
    let elapsed = position.unwrap_or_default();
    let ratio = total.and_then(|duration| {
        let total_secs = duration.as_secs_f64();
        (total_secs > 0.0).then_some(elapsed.as_secs_f64() / total_secs)
    });
    format!(
        "{} / {} {}",
        format_duration(elapsed),
        total
            .map(format_duration)
            .unwrap_or_else(|| String::from("--:--")),
        progress_bar(ratio, TIMELINE_WIDTH)
    )
}
