//! Whitespace tokenizer for command lines.
//!
//! There is no quoting: a stage is just a program followed by arguments,
//! separated by runs of whitespace. Pipelines are split on a single
//! separator character before tokenizing.

use crate::command::{Pipeline, Stage};
use crate::error::{Result, ShellError};

/// Default stage separator.
pub const PIPE: char = '|';

/// Split one stage into program and arguments.
///
/// Returns `None` if the stage holds no tokens at all.
pub fn split_args(stage: &str) -> Option<Stage> {
    let mut tokens = stage.split_whitespace().map(str::to_string);
    let program = tokens.next()?;
    Some(Stage::new(program, tokens.collect()))
}

/// Split a line into pipeline stages on `separator`.
///
/// Every piece is trimmed and tokenized; the first piece with no tokens
/// rejects the whole line with [`ShellError::EmptyStage`].
pub fn split_pipeline(line: &str, separator: char) -> Result<Pipeline> {
    let stages = line
        .split(separator)
        .enumerate()
        .map(|(index, piece)| split_args(piece.trim()).ok_or(ShellError::EmptyStage { index }))
        .collect::<Result<Vec<Stage>>>()?;

    // split() always yields at least one piece
    Pipeline::new(stages).ok_or(ShellError::EmptyStage { index: 0 })
}
