use crate::input::Action;
use crate::location::{Location, Navigation};
use crate::model::MemberSnapshot;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum InputMode {
    Normal,
    Picker,
    Location,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    None,
    SwitchTarget { target: String },
    Refresh,
    SetSelection { names: Vec<String> },
}

pub struct App {
    running: bool,
    mode: InputMode,
    targets: Vec<String>,
    active_target: usize,
    navigation: Navigation,
    members: MemberSnapshot,
    cursor: usize,
    input: String,
    status: String,
    show_help: bool,
}

impl App {
    pub fn new(mut targets: Vec<String>, active_target: &str, navigation: Navigation) -> Self {
        let active_target = match targets.iter().position(|target| target == active_target) {
            Some(index) => index,
            None => {
                targets.push(active_target.to_string());
                targets.len() - 1
            }
        };

        Self {
            running: true,
            mode: InputMode::Normal,
            targets,
            active_target,
            navigation,
            members: MemberSnapshot::default(),
            cursor: 0,
            input: String::new(),
            status: "Ready".to_string(),
            show_help: false,
        }
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn active_target(&self) -> &str {
        self.targets
            .get(self.active_target)
            .map(String::as_str)
            .unwrap_or("-")
    }

    pub fn navigation(&self) -> &Navigation {
        &self.navigation
    }

    pub fn navigation_mut(&mut self) -> &mut Navigation {
        &mut self.navigation
    }

    pub fn members(&self) -> &MemberSnapshot {
        &self.members
    }

    pub fn set_members(&mut self, members: MemberSnapshot) {
        self.members = members;
        self.cursor = self
            .cursor
            .min(self.members.available.len().saturating_sub(1));
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn cursor_member(&self) -> Option<&str> {
        self.members.available.get(self.cursor).map(String::as_str)
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    pub fn show_help(&self) -> bool {
        self.show_help
    }

    pub fn picker_open(&self) -> bool {
        self.mode == InputMode::Picker
    }

    pub fn open_picker(&mut self) {
        self.mode = InputMode::Picker;
        self.input.clear();
    }

    pub fn close_picker(&mut self) {
        if self.mode == InputMode::Picker {
            self.mode = InputMode::Normal;
        }
    }

    pub fn toggle_picker(&mut self) {
        if self.picker_open() {
            self.close_picker();
        } else {
            self.open_picker();
        }
    }

    pub fn apply_action(&mut self, action: Action) -> AppCommand {
        if self.show_help && !matches!(action, Action::ToggleHelp) {
            self.show_help = false;
        }

        match action {
            Action::Quit => {
                self.running = false;
                self.status = "Exit requested".to_string();
                AppCommand::None
            }
            Action::ToggleHelp => {
                self.show_help = !self.show_help;
                AppCommand::None
            }
            Action::NextTarget => self.switch_target_by_offset(1),
            Action::PrevTarget => self.switch_target_by_offset(-1),
            Action::Down => {
                self.move_cursor(1);
                AppCommand::None
            }
            Action::Up => {
                self.move_cursor(-1);
                AppCommand::None
            }
            Action::Top => {
                self.cursor = 0;
                AppCommand::None
            }
            Action::Bottom => {
                self.cursor = self.members.available.len().saturating_sub(1);
                AppCommand::None
            }
            Action::Refresh => {
                self.status = format!("Refreshing {}", self.active_target());
                AppCommand::Refresh
            }
            Action::TogglePicker => {
                self.toggle_picker();
                AppCommand::None
            }
            Action::ClosePicker => {
                self.close_picker();
                AppCommand::None
            }
            Action::ToggleMember => self.toggle_cursor_member(),
            Action::SelectAll => {
                self.status = format!("Selected all {} namespaces", self.members.available.len());
                AppCommand::SetSelection {
                    names: self.members.available.clone(),
                }
            }
            Action::ClearSelection => {
                self.status = "Selection cleared".to_string();
                AppCommand::SetSelection { names: Vec::new() }
            }
            Action::StartLocation => {
                self.mode = InputMode::Location;
                self.input = self.navigation.current().to_string();
                AppCommand::None
            }
            Action::NavigateBack => {
                if self.navigation.back() {
                    self.status = format!("Back to {}", self.navigation.current());
                } else {
                    self.status = "No earlier location".to_string();
                }
                AppCommand::None
            }
            Action::SubmitInput => {
                self.submit_location();
                AppCommand::None
            }
            Action::CancelInput => {
                self.mode = InputMode::Normal;
                self.input.clear();
                AppCommand::None
            }
            Action::Backspace => {
                self.input.pop();
                AppCommand::None
            }
            Action::InputChar(c) => {
                self.input.push(c);
                AppCommand::None
            }
        }
    }

    fn switch_target_by_offset(&mut self, offset: isize) -> AppCommand {
        if self.targets.len() < 2 {
            self.status = "No other cluster to switch to".to_string();
            return AppCommand::None;
        }
        let len = self.targets.len() as isize;
        self.active_target = (self.active_target as isize + offset).rem_euclid(len) as usize;
        self.cursor = 0;
        let target = self.active_target().to_string();
        self.status = format!("Switching to {target}");
        AppCommand::SwitchTarget { target }
    }

    fn move_cursor(&mut self, delta: isize) {
        let len = self.members.available.len();
        if len == 0 {
            self.cursor = 0;
            return;
        }
        let next = (self.cursor as isize + delta).clamp(0, len as isize - 1);
        self.cursor = next as usize;
    }

    fn toggle_cursor_member(&mut self) -> AppCommand {
        let Some(member) = self.cursor_member().map(str::to_string) else {
            return AppCommand::None;
        };
        let names = self
            .members
            .available
            .iter()
            .filter(|name| self.members.is_selected(name) != (**name == member))
            .cloned()
            .collect::<Vec<_>>();
        self.status = if names.contains(&member) {
            format!("Selected {member}")
        } else {
            format!("Deselected {member}")
        };
        AppCommand::SetSelection { names }
    }

    fn submit_location(&mut self) {
        let raw = self.input.trim().to_string();
        self.mode = InputMode::Normal;
        self.input.clear();
        match Location::parse(&raw) {
            Ok(location) => {
                self.status = format!("Navigated to {location}");
                self.navigation.navigate(location);
            }
            Err(error) => self.status = format!("{error:#}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{App, AppCommand, InputMode};
    use crate::input::Action;
    use crate::location::{Location, Navigation};
    use crate::model::MemberSnapshot;

    fn app() -> App {
        let mut app = App::new(
            vec!["dev".to_string(), "prod".to_string()],
            "dev",
            Navigation::new(Location::default()),
        );
        app.set_members(MemberSnapshot {
            target: Some("dev".to_string()),
            available: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            selected: vec!["a".to_string(), "c".to_string()],
            ..MemberSnapshot::default()
        });
        app
    }

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn unknown_initial_target_is_added() {
        let app = App::new(vec!["a".to_string()], "z", Navigation::new(Location::default()));
        assert_eq!(app.targets(), ["a".to_string(), "z".to_string()].as_slice());
        assert_eq!(app.active_target(), "z");
    }

    #[test]
    fn picker_opens_toggles_and_closes() {
        let mut app = app();
        assert!(!app.picker_open());

        app.apply_action(Action::TogglePicker);
        assert!(app.picker_open());
        assert_eq!(app.mode(), InputMode::Picker);

        app.apply_action(Action::TogglePicker);
        assert!(!app.picker_open());

        app.open_picker();
        app.apply_action(Action::ClosePicker);
        assert_eq!(app.mode(), InputMode::Normal);
    }

    #[test]
    fn toggling_member_flips_only_cursor_member() {
        let mut app = app();
        app.apply_action(Action::Down);
        assert_eq!(app.cursor_member(), Some("b"));

        let cmd = app.apply_action(Action::ToggleMember);
        assert_eq!(
            cmd,
            AppCommand::SetSelection {
                names: names(&["a", "b", "c"])
            }
        );

        app.apply_action(Action::Top);
        let cmd = app.apply_action(Action::ToggleMember);
        assert_eq!(
            cmd,
            AppCommand::SetSelection {
                names: names(&["c"])
            }
        );
    }

    #[test]
    fn select_all_and_clear_emit_selection() {
        let mut app = app();
        assert_eq!(
            app.apply_action(Action::SelectAll),
            AppCommand::SetSelection {
                names: names(&["a", "b", "c"])
            }
        );
        assert_eq!(
            app.apply_action(Action::ClearSelection),
            AppCommand::SetSelection { names: Vec::new() }
        );
    }

    #[test]
    fn cursor_is_clamped_to_members() {
        let mut app = app();
        app.apply_action(Action::Bottom);
        app.apply_action(Action::Down);
        assert_eq!(app.cursor(), 2);

        app.set_members(MemberSnapshot::default());
        assert_eq!(app.cursor(), 0);
        assert_eq!(app.apply_action(Action::ToggleMember), AppCommand::None);
    }

    #[test]
    fn target_switching_wraps() {
        let mut app = app();
        assert_eq!(
            app.apply_action(Action::NextTarget),
            AppCommand::SwitchTarget {
                target: "prod".to_string()
            }
        );
        assert_eq!(
            app.apply_action(Action::NextTarget),
            AppCommand::SwitchTarget {
                target: "dev".to_string()
            }
        );
        assert_eq!(
            app.apply_action(Action::PrevTarget),
            AppCommand::SwitchTarget {
                target: "prod".to_string()
            }
        );
    }

    #[test]
    fn single_target_does_not_switch() {
        let mut app = App::new(vec!["only".to_string()], "only", Navigation::new(Location::default()));
        assert_eq!(app.apply_action(Action::NextTarget), AppCommand::None);
        assert_eq!(app.active_target(), "only");
    }

    #[test]
    fn location_prompt_navigates() {
        let mut app = app();
        app.apply_action(Action::StartLocation);
        assert_eq!(app.mode(), InputMode::Location);
        assert_eq!(app.input(), "/");

        app.apply_action(Action::Backspace);
        for c in "/pods?namespace=b".chars() {
            app.apply_action(Action::InputChar(c));
        }
        let cmd = app.apply_action(Action::SubmitInput);

        assert_eq!(cmd, AppCommand::None);
        assert_eq!(app.mode(), InputMode::Normal);
        assert_eq!(app.navigation().version(), 2);
        assert_eq!(app.navigation().current().param("namespace"), Some("b"));

        app.apply_action(Action::NavigateBack);
        assert_eq!(app.navigation().current().to_string(), "/");
        assert_eq!(app.navigation().version(), 3);
    }

    #[test]
    fn invalid_location_reports_error() {
        let mut app = app();
        app.apply_action(Action::StartLocation);
        app.apply_action(Action::CancelInput);
        assert_eq!(app.navigation().version(), 1);

        app.apply_action(Action::StartLocation);
        app.apply_action(Action::Backspace);
        for c in "http://[broken".chars() {
            app.apply_action(Action::InputChar(c));
        }
        app.apply_action(Action::SubmitInput);
        assert!(app.status().contains("invalid location"));
        assert_eq!(app.navigation().version(), 1);
    }

    #[test]
    fn help_closes_on_next_action() {
        let mut app = app();
        app.apply_action(Action::ToggleHelp);
        assert!(app.show_help());
        app.apply_action(Action::Down);
        assert!(!app.show_help());
    }

    #[test]
    fn quit_stops_app() {
        let mut app = app();
        app.apply_action(Action::Quit);
        assert!(!app.running());
    }
}
