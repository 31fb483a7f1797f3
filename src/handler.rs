use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use crate::app::App;
use crate::tui::AppEvent;

pub fn handle_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick_animation(),
        AppEvent::Reply(id, event) => app.on_reply(id, event),
        AppEvent::ReplyDone(id, result) => app.on_reply_done(id, result),
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('c') | KeyCode::Char('q') => app.quit(),
            KeyCode::Char('r') => app.regenerate(),
            KeyCode::Char('l') => app.clear_history(),
            KeyCode::Char('b') => app.panels.toggle_left(),
            KeyCode::Char('o') => app.panels.toggle_right(),
            // Half-page scroll
            KeyCode::Char('d') => app.scroll_down(app.half_page()),
            KeyCode::Char('u') => app.scroll_up(app.half_page()),
            _ => {}
        }
        return;
    }

    match key.code {
        KeyCode::Enter => app.submit(),
        KeyCode::Esc => {
            if app.is_busy() {
                app.cancel_reply();
            } else {
                app.input.clear();
                app.cursor = 0;
                app.status = None;
            }
        }

        // Transcript scrolling
        KeyCode::Up => app.scroll_up(1),
        KeyCode::Down => app.scroll_down(1),
        KeyCode::PageUp => app.scroll_up(app.half_page()),
        KeyCode::PageDown => app.scroll_down(app.half_page()),

        // Input line editing
        KeyCode::Backspace => app.backspace(),
        KeyCode::Delete => app.delete(),
        KeyCode::Left => app.cursor_left(),
        KeyCode::Right => app.cursor_right(),
        KeyCode::Home => app.cursor_home(),
        KeyCode::End => app.cursor_end(),
        KeyCode::Char(c) => app.insert_char(c),
        _ => {}
    }
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::ScrollUp => app.scroll_up(3),
        MouseEventKind::ScrollDown => app.scroll_down(3),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crossterm::event::{KeyEventKind, KeyEventState};
    use tokio::sync::mpsc;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> AppEvent {
        AppEvent::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    #[test]
    fn test_panel_toggles() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = App::new(&Config::new(), tx);

        handle_event(&mut app, key(KeyCode::Char('b'), KeyModifiers::CONTROL));
        assert!(app.panels.left_open);
        assert!(!app.panels.right_open);

        handle_event(&mut app, key(KeyCode::Char('o'), KeyModifiers::CONTROL));
        handle_event(&mut app, key(KeyCode::Char('b'), KeyModifiers::CONTROL));
        assert!(!app.panels.left_open);
        assert!(app.panels.right_open);
    }

    #[test]
    fn test_typing_and_quit() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = App::new(&Config::new(), tx);

        handle_event(&mut app, key(KeyCode::Char('h'), KeyModifiers::NONE));
        handle_event(&mut app, key(KeyCode::Char('i'), KeyModifiers::SHIFT));
        assert_eq!(app.input, "hi");

        handle_event(&mut app, key(KeyCode::Esc, KeyModifiers::NONE));
        assert!(app.input.is_empty());

        handle_event(&mut app, key(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(app.should_quit);
    }
}
