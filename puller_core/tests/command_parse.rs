use proptest::prelude::*;
use puller_core::{Command, parse};
use rstest::rstest;

#[rstest]
#[case("open", Command::Open)]
#[case("close", Command::Close)]
#[case("stop", Command::Stop)]
#[case("home", Command::Home)]
#[case("open_until_break", Command::OpenUntilBreak)]
#[case("move_to_position10", Command::MoveToPosition(10))]
#[case("move_to_position 25", Command::MoveToPosition(25))]
#[case("move_to_position-3", Command::MoveToPosition(-3))]
#[case("move_to_force7", Command::MoveToForce(7))]
#[case("  stop\r\n", Command::Stop)]
fn decodes_valid_lines(#[case] line: &str, #[case] expected: Command) {
    assert_eq!(parse(line), expected);
}

#[rstest]
#[case("fly")]
#[case("")]
#[case("OPEN")]
#[case("open now")]
#[case("open_until")]
#[case("move_to_position")]
#[case("move_to_positionabc")]
#[case("move_to_force 1.5")]
#[case("move_to_force99999999999")]
#[case("stop3")]
fn rejects_everything_else(#[case] line: &str) {
    assert!(parse(line).is_invalid(), "{line:?} should be invalid");
}

#[test]
fn open_does_not_shadow_open_until_break() {
    assert_eq!(parse("open_until_break"), Command::OpenUntilBreak);
    assert_ne!(parse("open_until_break"), Command::Open);
}

#[test]
fn invalid_keeps_the_trimmed_line() {
    assert_eq!(parse("  fly \n"), Command::Invalid("fly".to_string()));
}

proptest! {
    #[test]
    fn parse_never_panics(line in ".*") {
        let _ = parse(&line);
    }

    #[test]
    fn valid_commands_survive_display(n in any::<i32>(), pick in 0usize..7) {
        let cmd = match pick {
            0 => Command::Open,
            1 => Command::Close,
            2 => Command::Stop,
            3 => Command::Home,
            4 => Command::OpenUntilBreak,
            5 => Command::MoveToPosition(n),
            _ => Command::MoveToForce(n),
        };
        prop_assert_eq!(parse(&cmd.to_string()), cmd);
    }
}
