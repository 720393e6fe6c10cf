use crate::render::animator::SpeedPreset;
use crate::tasks::catalog::Direction;

/// Control messages for the presenter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewerCommand {
    TogglePause,
    /// Moves the paused view up (positive) or down.
    Nudge(f64),
    SetSpeed(SpeedPreset),
    Quit,
}

/// Control messages for the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogCommand {
    SetDirection(Direction),
    /// Skips entries in the current direction.
    Skip(usize),
    /// Skips entries backwards, then keeps going forward.
    SkipBack(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Viewer(ViewerCommand),
    Catalog(CatalogCommand),
}

pub const SKIP_STEP: usize = 10;

impl Command {
    /// Parses one line typed on the control terminal.
    pub fn parse(line: &str) -> Option<Self> {
        use crate::render::animator::NUDGE_STEP;
        let cmd = match line.trim() {
            "q" | "quit" => Command::Viewer(ViewerCommand::Quit),
            "" | "p" | "pause" => Command::Viewer(ViewerCommand::TogglePause),
            "u" | "up" => Command::Viewer(ViewerCommand::Nudge(NUDGE_STEP)),
            "d" | "down" => Command::Viewer(ViewerCommand::Nudge(-NUDGE_STEP)),
            "s" | "slow" => Command::Viewer(ViewerCommand::SetSpeed(SpeedPreset::Slow)),
            "n" | "normal" => Command::Viewer(ViewerCommand::SetSpeed(SpeedPreset::Normal)),
            "f" | "fast" => Command::Viewer(ViewerCommand::SetSpeed(SpeedPreset::Fast)),
            "<" | "left" | "back" => {
                Command::Catalog(CatalogCommand::SetDirection(Direction::Backward))
            }
            ">" | "right" | "forward" => {
                Command::Catalog(CatalogCommand::SetDirection(Direction::Forward))
            }
            "+" => Command::Catalog(CatalogCommand::Skip(SKIP_STEP)),
            "-" => Command::Catalog(CatalogCommand::SkipBack(SKIP_STEP)),
            _ => return None,
        };
        Some(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_keys() {
        assert_eq!(
            Command::parse("f\n"),
            Some(Command::Viewer(ViewerCommand::SetSpeed(SpeedPreset::Fast)))
        );
        assert_eq!(
            Command::parse("-"),
            Some(Command::Catalog(CatalogCommand::SkipBack(10)))
        );
        assert_eq!(
            Command::parse("down"),
            Some(Command::Viewer(ViewerCommand::Nudge(-0.1)))
        );
        assert_eq!(Command::parse("x"), None);
    }
}
