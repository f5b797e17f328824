//! Keyboard commands read from stdin.

use v2x_core::UserCommand;

pub const HELP: &str = "commands: a/left  d/right  w/faster  s/slower  e/ambulance  x/drowsy  q/quit";

/// One parsed console line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConsoleInput {
    Command(UserCommand),
    Help,
    Quit,
}

/// Parses a console line; `None` for anything unrecognised.
pub fn parse_line(line: &str, cruise_step: f64) -> Option<ConsoleInput> {
    let input = match line.trim().to_lowercase().as_str() {
        "a" | "left" => ConsoleInput::Command(UserCommand::ChangeLane(-1)),
        "d" | "right" => ConsoleInput::Command(UserCommand::ChangeLane(1)),
        "w" | "faster" => ConsoleInput::Command(UserCommand::AdjustCruise(cruise_step)),
        "s" | "slower" => ConsoleInput::Command(UserCommand::AdjustCruise(-cruise_step)),
        "e" | "ambulance" => ConsoleInput::Command(UserCommand::SummonEmergency),
        "x" | "drowsy" => ConsoleInput::Command(UserCommand::ToggleManualImpairment),
        "h" | "help" | "?" => ConsoleInput::Help,
        "q" | "quit" | "exit" => ConsoleInput::Quit,
        _ => return None,
    };
    Some(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_and_long_forms() {
        assert_eq!(parse_line("a", 5.0), parse_line("LEFT", 5.0));
        assert_eq!(
            parse_line("  d \n", 5.0),
            Some(ConsoleInput::Command(UserCommand::ChangeLane(1)))
        );
        assert_eq!(
            parse_line("s", 5.0),
            Some(ConsoleInput::Command(UserCommand::AdjustCruise(-5.0)))
        );
        assert_eq!(
            parse_line("ambulance", 5.0),
            Some(ConsoleInput::Command(UserCommand::SummonEmergency))
        );
        assert_eq!(
            parse_line("x", 5.0),
            Some(ConsoleInput::Command(UserCommand::ToggleManualImpairment))
        );
        assert_eq!(parse_line("q", 5.0), Some(ConsoleInput::Quit));
        assert_eq!(parse_line("?", 5.0), Some(ConsoleInput::Help));
    }

    #[test]
    fn test_unknown_input() {
        assert_eq!(parse_line("", 5.0), None);
        assert_eq!(parse_line("jump", 5.0), None);
    }
}
