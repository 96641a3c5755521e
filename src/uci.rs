use std::io::{self, BufRead, Write};

use anyhow::{anyhow, bail, Context, Result};
use tracing::{debug, warn};

use crate::board::{Board, Color};
use crate::error::ChessError;
use crate::game_state::classify;
use crate::movegen::MoveGenerator;
use crate::notation::move_from_long_algebraic;
use crate::search::{is_mate_score, ply_to_mate_from_score, Search, SearchSettings};

const ENGINE_NAME: &str = "Fantom Chess";
// Time-control games spend this fraction of the remaining clock on one move.
const CLOCK_DIVISOR: u64 = 20;
const UNLIMITED_MS: u64 = 24 * 60 * 60 * 1000;
// There is no `stop`, so `go infinite` searches for this long and then answers.
const INFINITE_MS: u64 = 10_000;

pub struct UciHandler {
    board: Board,
    settings: SearchSettings,
    search: Search,
}

impl UciHandler {
    pub fn new() -> Self {
        let settings = SearchSettings::default();
        UciHandler {
            board: Board::new(),
            search: Search::new(settings.clone()),
            settings,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn run(&mut self) -> Result<()> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        let mut reader = stdin.lock();
        let mut line = String::new();

        while reader.read_line(&mut line)? > 0 {
            let command = line.trim();
            if command == "quit" {
                break;
            }

            match self.handle_command(command) {
                Ok(response) => print!("{}", response),
                Err(err) => warn!(command, error = %err, "command failed"),
            }

            stdout.flush()?;
            line.clear();
        }
        Ok(())
    }

    pub fn handle_command(&mut self, command: &str) -> Result<String> {
        let parts: Vec<&str> = command.split_whitespace().collect();
        let Some(&keyword) = parts.first() else {
            return Ok(String::new());
        };

        match keyword {
            "uci" => Ok(self.handle_uci()),
            "isready" => Ok("readyok\n".to_string()),
            "ucinewgame" => {
                self.board = Board::new();
                self.search.clear_transposition_table();
                Ok(String::new())
            }
            "position" => {
                self.handle_position(&parts[1..])?;
                Ok(String::new())
            }
            "go" => self.handle_go(&parts[1..]),
            "setoption" => {
                self.handle_setoption(&parts[1..])?;
                Ok(String::new())
            }
            "d" => Ok(self.handle_display()),
            "quit" => Ok(String::new()),
            other => {
                debug!(command = other, "ignoring unknown command");
                Ok(String::new())
            }
        }
    }

    fn handle_uci(&self) -> String {
        let defaults = SearchSettings::default();
        format!(
            "id name {}\n\
             id author {} developers\n\
             option name MoveTime type spin default {} min 1 max {}\n\
             option name Depth type spin default {} min 1 max 64\n\
             option name Hash type spin default {} min 1 max {}\n\
             uciok\n",
            ENGINE_NAME,
            ENGINE_NAME,
            defaults.max_time_ms,
            UNLIMITED_MS,
            defaults.max_depth,
            defaults.tt_size,
            1 << 24,
        )
    }

    /// `position startpos|fen <fen> [moves ...]`. The current position is kept if anything fails.
    fn handle_position(&mut self, parts: &[&str]) -> Result<()> {
        let moves_at = parts.iter().position(|&p| p == "moves");
        let (setup, moves) = match moves_at {
            Some(index) => (&parts[..index], &parts[index + 1..]),
            None => (parts, &parts[parts.len()..]),
        };

        let mut board = match setup.split_first() {
            Some((&"startpos", _)) => Board::new(),
            Some((&"fen", fields)) => Board::from_fen(&fields.join(" "))?,
            _ => bail!("expected 'startpos' or 'fen'"),
        };

        for token in moves {
            let mv = move_from_long_algebraic(&board, token)
                .ok_or_else(|| anyhow!("illegal move '{}' in {}", token, board.to_fen()))?;
            board.make_move(mv);
        }

        self.board = board;
        Ok(())
    }

    fn handle_go(&mut self, parts: &[&str]) -> Result<String> {
        let mut settings = self.settings.clone();
        let mut move_time = None;
        let mut clock = None;
        let mut depth = None;

        let mut args = parts.iter();
        while let Some(&arg) = args.next() {
            let mut value = || -> Result<u64> {
                let text = args.next().ok_or_else(|| anyhow!("missing value for {}", arg))?;
                text.parse::<u64>()
                    .with_context(|| format!("invalid value '{}' for {}", text, arg))
            };
            match arg {
                "movetime" => move_time = Some(value()?),
                "wtime" if self.board.side_to_move() == Color::White => clock = Some(value()?),
                "btime" if self.board.side_to_move() == Color::Black => clock = Some(value()?),
                "wtime" | "btime" | "winc" | "binc" | "movestogo" => {
                    value()?;
                }
                "depth" => depth = Some(value()?),
                "infinite" => move_time = Some(INFINITE_MS),
                other => debug!(argument = other, "ignoring go argument"),
            }
        }

        if let Some(depth) = depth {
            settings.max_depth = depth.clamp(1, 64) as u32;
            if move_time.is_none() && clock.is_none() {
                settings.max_time_ms = UNLIMITED_MS;
            }
        }
        if let Some(millis) = clock {
            settings.max_time_ms = (millis / CLOCK_DIVISOR).max(1);
        }
        if let Some(millis) = move_time {
            settings.max_time_ms = millis;
        }
        self.search.set_settings(settings);

        match self.search.choose_move(&self.board) {
            Ok((best_move, diagnostics)) => {
                let score = if is_mate_score(diagnostics.eval) {
                    let moves = (ply_to_mate_from_score(diagnostics.eval) as i32 + 1) / 2;
                    format!("mate {}", moves * diagnostics.eval.signum())
                } else {
                    format!("cp {}", diagnostics.eval)
                };
                Ok(format!(
                    "info depth {} score {} nodes {} time {} pv {}\nbestmove {}\n",
                    diagnostics.last_completed_depth,
                    score,
                    diagnostics.nodes,
                    diagnostics.elapsed_ms,
                    best_move,
                    best_move
                ))
            }
            Err(ChessError::NoLegalMove) => {
                warn!(fen = %self.board.to_fen(), "go requested in a finished position");
                Ok("bestmove 0000\n".to_string())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// `setoption name <MoveTime|Depth|Hash> value <n>`.
    fn handle_setoption(&mut self, parts: &[&str]) -> Result<()> {
        let (Some(&"name"), Some(&name), Some(&"value"), Some(&value)) =
            (parts.first(), parts.get(1), parts.get(2), parts.get(3))
        else {
            bail!("expected 'setoption name <option> value <n>'");
        };
        let value: u64 = value
            .parse()
            .with_context(|| format!("invalid value '{}' for option {}", value, name))?;

        match name.to_ascii_lowercase().as_str() {
            "movetime" => self.settings.max_time_ms = value.max(1),
            "depth" => self.settings.max_depth = value.clamp(1, 64) as u32,
            "hash" => self.settings.tt_size = value.clamp(1, 1 << 24) as usize,
            _ => bail!("unknown option '{}'", name),
        }
        self.search.set_settings(self.settings.clone());
        Ok(())
    }

    fn handle_display(&self) -> String {
        let mut out = format!(
            "{}\nFen: {}\nKey: {:016X}\n",
            self.board,
            self.board.to_fen(),
            self.board.zobrist_key()
        );
        let result = classify(&self.board, &mut MoveGenerator::new());
        if result.is_terminal() {
            out.push_str(&format!("Result: {}\n", result.description()));
        }
        out
    }
}

impl Default for UciHandler {
    fn default() -> Self {
        Self::new()
    }
}
