/// Open/closed state of the two side panels. Purely visual.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Panels {
    pub left_open: bool,
    pub right_open: bool,
}

impl Panels {
    pub fn toggle_left(&mut self) {
        self.left_open = !self.left_open;
    }

    pub fn toggle_right(&mut self) {
        self.right_open = !self.right_open;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggles_are_independent() {
        let mut panels = Panels::default();

        panels.toggle_left();
        assert_eq!(panels, Panels { left_open: true, right_open: false });

        panels.toggle_right();
        panels.toggle_left();
        assert_eq!(panels, Panels { left_open: false, right_open: true });
    }
}
