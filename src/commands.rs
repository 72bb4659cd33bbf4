/// Keyboard commands the host may deliver by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Pop the active tab out, or merge it back when already in a popup.
    PopupTab,
}

impl Command {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "popupTab" => Some(Command::PopupTab),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::PopupTab => "popupTab",
        }
    }
}
