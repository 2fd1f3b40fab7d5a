//! A line-oriented program format for exercising a session from the
//! command line. This is *not* a G-code interpreter — the interpreter is
//! an external collaborator the core pipeline never depends on — it's a
//! literal, whitespace-separated rendering of [`CommandKind`] meant for
//! manual testing and the integration tests that drive [`auto_cmd`].
//!
//! ```text
//! # comment
//! LINE x y z vel accel
//! CIRCLE ex ey ez cx cy cz nx ny nz turn vel accel
//! PAUSE
//! STOP | BLEND
//! DELAY seconds
//! SYNC feed_per_revolution
//! UNSYNC
//! END
//! ```
//!
//! [`auto_cmd`]: rtstep_engine::session::Session::auto_cmd

use rtstep_common::geometry::Pose;
use rtstep_common::tc::TermCond;
use rtstep_engine::command::{CommandKind, InterpreterCommand};

use crate::error::CliError;

pub fn parse(text: &str) -> Result<Vec<InterpreterCommand>, CliError> {
    let mut out = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = (idx + 1) as u32;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        out.push(InterpreterCommand {
            line,
            kind: parse_line(line, trimmed)?,
        });
    }
    Ok(out)
}

fn parse_line(line: u32, text: &str) -> Result<CommandKind, CliError> {
    let mut tokens = text.split_whitespace();
    let verb = tokens.next().unwrap_or_default().to_ascii_uppercase();
    let rest: Vec<&str> = tokens.collect();

    let err = |message: String| CliError::Program { line, message };
    let num = |s: &str| -> Result<f64, CliError> {
        s.parse::<f64>()
            .map_err(|e| err(format!("expected a number, got `{s}`: {e}")))
    };

    match verb.as_str() {
        "LINE" => {
            if rest.len() < 5 {
                return Err(err("LINE needs x y z vel accel".into()));
            }
            let end = Pose {
                x: num(rest[0])?,
                y: num(rest[1])?,
                z: num(rest[2])?,
                ..Pose::default()
            };
            let vel = num(rest[3])?;
            let accel = num(rest[4])?;
            Ok(CommandKind::LinearMove { end, vel, accel })
        }
        "CIRCLE" => {
            if rest.len() < 12 {
                return Err(err(
                    "CIRCLE needs ex ey ez cx cy cz nx ny nz turn vel accel".into(),
                ));
            }
            let end = Pose {
                x: num(rest[0])?,
                y: num(rest[1])?,
                z: num(rest[2])?,
                ..Pose::default()
            };
            let center = [num(rest[3])?, num(rest[4])?, num(rest[5])?];
            let normal = [num(rest[6])?, num(rest[7])?, num(rest[8])?];
            let turn: i32 = rest[9]
                .parse()
                .map_err(|e| err(format!("expected an integer turn count: {e}")))?;
            let vel = num(rest[10])?;
            let accel = num(rest[11])?;
            Ok(CommandKind::CircularMove {
                end,
                center,
                normal,
                turn,
                vel,
                accel,
            })
        }
        "PAUSE" => Ok(CommandKind::Pause),
        "STOP" | "BLEND" => Ok(CommandKind::SetTermCond(parse_term(line, &verb)?)),
        "DELAY" => {
            let seconds = rest.first().ok_or_else(|| err("DELAY needs a duration".into()))?;
            Ok(CommandKind::Delay(num(seconds)?))
        }
        "SYNC" => {
            let feed = rest
                .first()
                .ok_or_else(|| err("SYNC needs a feed_per_revolution".into()))?;
            Ok(CommandKind::StartSpeedFeedSync {
                feed_per_revolution: num(feed)?,
            })
        }
        "UNSYNC" => Ok(CommandKind::StopSpeedFeedSync),
        "END" => Ok(CommandKind::End),
        other => Ok(CommandKind::Unknown(other.to_string())),
    }
}

fn parse_term(line: u32, token: &str) -> Result<TermCond, CliError> {
    match token.to_ascii_uppercase().as_str() {
        "STOP" => Ok(TermCond::Stop),
        "BLEND" => Ok(TermCond::Blend),
        other => Err(CliError::Program {
            line,
            message: format!("expected BLEND or STOP, got `{other}`"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        let cmds = parse("# a comment\n\nEND\n").unwrap();
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].line, 3);
    }

    #[test]
    fn line_parses_into_linear_move() {
        let cmds = parse("LINE 1.0 2.0 3.0 0.5 10.0\n").unwrap();
        match &cmds[0].kind {
            CommandKind::LinearMove { end, vel, accel } => {
                assert_eq!(end.x, 1.0);
                assert_eq!(end.y, 2.0);
                assert_eq!(end.z, 3.0);
                assert_eq!(*vel, 0.5);
                assert_eq!(*accel, 10.0);
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn unrecognized_verb_becomes_unknown_not_an_error() {
        let cmds = parse("M6 T1\n").unwrap();
        assert!(matches!(&cmds[0].kind, CommandKind::Unknown(v) if v == "M6"));
    }

    #[test]
    fn malformed_line_args_is_a_program_error() {
        let err = parse("LINE 1.0 2.0\n").unwrap_err();
        assert!(matches!(err, CliError::Program { line: 1, .. }));
    }

    #[test]
    fn sync_parses_feed_per_revolution() {
        let cmds = parse("SYNC 0.125\n").unwrap();
        assert!(matches!(
            &cmds[0].kind,
            CommandKind::StartSpeedFeedSync { feed_per_revolution } if *feed_per_revolution == 0.125
        ));
    }
}
