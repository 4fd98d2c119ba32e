use crate::app::InputMode;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Quit,
    ToggleHelp,
    NextTarget,
    PrevTarget,
    Down,
    Up,
    Top,
    Bottom,
    Refresh,
    TogglePicker,
    ClosePicker,
    ToggleMember,
    SelectAll,
    ClearSelection,
    StartLocation,
    NavigateBack,
    SubmitInput,
    CancelInput,
    Backspace,
    InputChar(char),
}

pub fn map_key(mode: InputMode, key: KeyEvent) -> Option<Action> {
    if is_picker_shortcut(key) && mode != InputMode::Location {
        return Some(Action::TogglePicker);
    }
    match mode {
        InputMode::Normal => map_normal_mode_key(key),
        InputMode::Picker => map_picker_mode_key(key),
        InputMode::Location => map_input_mode_key(key),
    }
}

/// Ctrl+N, or Cmd+N where the terminal reports the super modifier.
fn is_picker_shortcut(key: KeyEvent) -> bool {
    matches!(key.code, KeyCode::Char('n') | KeyCode::Char('N'))
        && (key.modifiers.contains(KeyModifiers::CONTROL)
            || key.modifiers.contains(KeyModifiers::SUPER))
}

fn map_normal_mode_key(key: KeyEvent) -> Option<Action> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return None;
    }
    match key.code {
        KeyCode::Char('q') => Some(Action::Quit),
        KeyCode::Char('?') => Some(Action::ToggleHelp),
        KeyCode::Char('j') | KeyCode::Down => Some(Action::Down),
        KeyCode::Char('k') | KeyCode::Up => Some(Action::Up),
        KeyCode::Char('g') | KeyCode::Home => Some(Action::Top),
        KeyCode::Char('G') | KeyCode::End => Some(Action::Bottom),
        KeyCode::Left | KeyCode::Char('[') => Some(Action::PrevTarget),
        KeyCode::Right | KeyCode::Char(']') => Some(Action::NextTarget),
        KeyCode::Char('r') | KeyCode::F(5) => Some(Action::Refresh),
        KeyCode::Char(':') => Some(Action::StartLocation),
        KeyCode::Char(';') if key.modifiers.contains(KeyModifiers::SHIFT) => {
            Some(Action::StartLocation)
        }
        KeyCode::Char('b') | KeyCode::Backspace => Some(Action::NavigateBack),
        _ => None,
    }
}

fn map_picker_mode_key(key: KeyEvent) -> Option<Action> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return None;
    }
    match key.code {
        KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q') => Some(Action::ClosePicker),
        KeyCode::Char(' ') => Some(Action::ToggleMember),
        KeyCode::Char('a') => Some(Action::SelectAll),
        KeyCode::Char('x') => Some(Action::ClearSelection),
        KeyCode::Char('j') | KeyCode::Down => Some(Action::Down),
        KeyCode::Char('k') | KeyCode::Up => Some(Action::Up),
        KeyCode::Char('g') | KeyCode::Home => Some(Action::Top),
        KeyCode::Char('G') | KeyCode::End => Some(Action::Bottom),
        KeyCode::Char('?') => Some(Action::ToggleHelp),
        _ => None,
    }
}

fn map_input_mode_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Esc => Some(Action::CancelInput),
        KeyCode::Enter => Some(Action::SubmitInput),
        KeyCode::Char('m') | KeyCode::Char('j')
            if key.modifiers.contains(KeyModifiers::CONTROL) =>
        {
            Some(Action::SubmitInput)
        }
        KeyCode::Backspace => Some(Action::Backspace),
        KeyCode::Char(c)
            if !key.modifiers.contains(KeyModifiers::CONTROL)
                && !key.modifiers.contains(KeyModifiers::ALT) =>
        {
            Some(Action::InputChar(c))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{Action, map_key};
    use crate::app::InputMode;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

    #[test]
    fn normal_mode_maps_quit() {
        let key = KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE);
        let action = map_key(InputMode::Normal, key);
        assert_eq!(action, Some(Action::Quit));
    }

    #[test]
    fn ctrl_n_toggles_picker_in_normal_and_picker_modes() {
        let key = KeyEvent::new(KeyCode::Char('n'), KeyModifiers::CONTROL);
        assert_eq!(map_key(InputMode::Normal, key), Some(Action::TogglePicker));
        assert_eq!(map_key(InputMode::Picker, key), Some(Action::TogglePicker));
        assert_eq!(map_key(InputMode::Location, key), None);
    }

    #[test]
    fn super_n_toggles_picker() {
        let key = KeyEvent::new(KeyCode::Char('n'), KeyModifiers::SUPER);
        assert_eq!(map_key(InputMode::Normal, key), Some(Action::TogglePicker));
    }

    #[test]
    fn plain_n_is_not_the_picker_shortcut() {
        let key = KeyEvent::new(KeyCode::Char('n'), KeyModifiers::NONE);
        assert_eq!(map_key(InputMode::Normal, key), None);
    }

    #[test]
    fn picker_mode_maps_selection_keys() {
        let cases = [
            (KeyCode::Char(' '), Action::ToggleMember),
            (KeyCode::Char('a'), Action::SelectAll),
            (KeyCode::Char('x'), Action::ClearSelection),
            (KeyCode::Esc, Action::ClosePicker),
            (KeyCode::Enter, Action::ClosePicker),
            (KeyCode::Down, Action::Down),
        ];
        for (code, expected) in cases {
            let key = KeyEvent::new(code, KeyModifiers::NONE);
            assert_eq!(map_key(InputMode::Picker, key), Some(expected));
        }
    }

    #[test]
    fn normal_mode_maps_target_switching() {
        for (code, expected) in [
            (KeyCode::Left, Action::PrevTarget),
            (KeyCode::Char('['), Action::PrevTarget),
            (KeyCode::Right, Action::NextTarget),
            (KeyCode::Char(']'), Action::NextTarget),
        ] {
            let key = KeyEvent::new(code, KeyModifiers::NONE);
            assert_eq!(map_key(InputMode::Normal, key), Some(expected));
        }
    }

    #[test]
    fn location_mode_maps_chars_and_submit() {
        let key = KeyEvent::new(KeyCode::Char('?'), KeyModifiers::SHIFT);
        assert_eq!(map_key(InputMode::Location, key), Some(Action::InputChar('?')));

        let enter = KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE);
        assert_eq!(map_key(InputMode::Location, enter), Some(Action::SubmitInput));
    }

    #[test]
    fn location_mode_rejects_ctrl_c() {
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(map_key(InputMode::Location, key), None);
    }
}
