use trylma::MoveInstruction;

pub enum Command {
    Submit(MoveInstruction),
    Quit,
}

/// Parses one console line. `Ok(None)` is a blank line.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let instr = match verb {
        "quit" | "exit" => return Ok(Some(Command::Quit)),
        "players" => MoveInstruction::join(number(words.next(), "player count")?),
        "ready" => MoveInstruction::ready(number(words.next(), "seat")?),
        "load" => MoveInstruction::load(number(words.next(), "seat")?),
        "move" => MoveInstruction::play(
            number(words.next(), "seat")?,
            number(words.next(), "origin cell")?,
            number(words.next(), "destination cell")?,
        ),
        "end" => MoveInstruction::end_turn(number(words.next(), "seat")?),
        other => {
            return Err(format!(
                "unknown command {:?}; try players, ready, load, move, end or quit",
                other
            ));
        }
    };
    if words.next().is_some() {
        return Err(format!("too many arguments for {:?}", verb));
    }
    Ok(Some(Command::Submit(instr)))
}

fn number<T: std::str::FromStr>(word: Option<&str>, what: &str) -> Result<T, String> {
    let word = word.ok_or_else(|| format!("missing {}", what))?;
    word.parse()
        .map_err(|_| format!("{} must be a number, got {:?}", what, word))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instr(line: &str) -> MoveInstruction {
        match parse(line).unwrap().unwrap() {
            Command::Submit(instr) => instr,
            Command::Quit => panic!("parsed as quit"),
        }
    }

    #[test]
    fn commands_map_to_instructions() {
        assert_eq!(instr("players 3").to_string(), "JOIN;3;-;-");
        assert_eq!(instr("ready 1").to_string(), "READY;1;-;-");
        assert_eq!(instr("load 2").to_string(), "LOAD;2;-;-");
        assert_eq!(instr("move 0 6 15").to_string(), "PLAY;0;6;15");
        assert_eq!(instr("end 0").to_string(), "NEXT;0;-;-");
    }

    #[test]
    fn quit_and_blank_lines() {
        assert!(matches!(parse("quit"), Ok(Some(Command::Quit))));
        assert!(matches!(parse("   "), Ok(None)));
    }

    #[test]
    fn bad_input_is_reported() {
        assert!(parse("dance").is_err());
        assert!(parse("move 0 six 15").is_err());
        assert!(parse("ready").is_err());
        assert!(parse("ready 1 2").is_err());
    }
}
