/// Which members are selected, plus the sticky "select everything" intent.
///
/// `all_selected` is only recomputed by [`Selection::initialize`],
/// [`Selection::set_selection`] and [`Selection::select_only`]. Growth and
/// shrinkage of the collection never change it.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Selection {
    selected: Vec<String>,
    all_selected: bool,
}

impl Selection {
    pub fn initialize(&mut self, names: &[String], url_member: Option<&str>) {
        if let Some(member) = url_member
            && names.iter().any(|name| name == member)
        {
            self.select_only(member);
            return;
        }

        self.selected = dedup(names);
        self.all_selected = true;
    }

    pub fn set_selection(&mut self, names: &[String], available: &[String]) {
        self.selected = dedup(names);
        self.all_selected = !self.selected.is_empty() && self.selected.len() == available.len();
    }

    pub fn select_only(&mut self, name: &str) {
        self.selected = vec![name.to_string()];
        self.all_selected = false;
    }

    /// Drops names missing from a fresh snapshot and, under the select-all
    /// intent, picks up the new ones. Intent itself is left alone.
    pub fn retain_available(&mut self, names: &[String]) {
        self.selected.retain(|selected| names.contains(selected));
        if self.all_selected {
            for name in names {
                if !self.contains(name) {
                    self.selected.push(name.clone());
                }
            }
        }
    }

    pub fn on_member_added(&mut self, name: &str) -> bool {
        if !self.all_selected || self.contains(name) {
            return false;
        }
        self.selected.push(name.to_string());
        true
    }

    pub fn on_member_removed(&mut self, name: &str) -> bool {
        let before = self.selected.len();
        self.selected.retain(|selected| selected != name);
        self.selected.len() != before
    }

    pub fn clear(&mut self) {
        self.selected.clear();
        self.all_selected = false;
    }

    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    pub fn all_selected(&self) -> bool {
        self.all_selected
    }

    pub fn contains(&self, name: &str) -> bool {
        self.selected.iter().any(|selected| selected == name)
    }
}

fn dedup(names: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        if !out.contains(name) {
            out.push(name.clone());
        }
    }
    out
}
