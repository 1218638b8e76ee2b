//! # Sheet Events
//!
//! The boundary between a sheet event source and its consumer. A source calls
//! `start_row`, zero or more `cell`, then `end_row` for every row in strictly
//! increasing row order, and finally `end_sheet`. Cells inside a row may come
//! in any column order and empty cells may be skipped.
use crate::mapper::MappingError;

/// One event of a sheet stream.
#[derive(Clone, Debug, PartialEq)]
pub enum SheetEvent {
    RowStart(usize),
    Cell { row: usize, column: usize, text: String },
    RowEnd(usize),
    SheetEnd,
}

impl SheetEvent {
    /// Delivers the event to `handler`.
    pub fn dispatch<H>(&self, handler: &mut H) -> Result<(), MappingError>
    where
        H: SheetHandler + ?Sized,
    {
        match self {
            SheetEvent::RowStart(row) => handler.start_row(*row),
            SheetEvent::Cell { row, column, text } => handler.cell(*row, *column, text),
            SheetEvent::RowEnd(row) => handler.end_row(*row),
            SheetEvent::SheetEnd => handler.end_sheet(),
        }
    }
}

/// Consumer of sheet events.
pub trait SheetHandler {
    fn start_row(&mut self, row: usize) -> Result<(), MappingError>;

    /// `text` is the cell's display text, already formatted by the source.
    fn cell(&mut self, row: usize, column: usize, text: &str) -> Result<(), MappingError>;

    fn end_row(&mut self, row: usize) -> Result<(), MappingError>;

    fn end_sheet(&mut self) -> Result<(), MappingError>;
}

/// Feeds events to `handler` in order, stopping at the first error.
pub fn replay<H, I>(handler: &mut H, events: I) -> Result<(), MappingError>
where
    H: SheetHandler + ?Sized,
    I: IntoIterator<Item = SheetEvent>,
{
    for event in events {
        event.dispatch(handler)?;
    }
    Ok(())
}

/// Builds the event stream of an in-memory table. Row 0 is the header.
/// Empty strings are treated as missing cells.
pub fn events_from_rows<R, S>(rows: R) -> Vec<SheetEvent>
where
    R: IntoIterator,
    R::Item: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut events = Vec::new();
    for (row, cells) in rows.into_iter().enumerate() {
        events.push(SheetEvent::RowStart(row));
        for (column, text) in cells.into_iter().enumerate() {
            let text = text.as_ref();
            if !text.is_empty() {
                events.push(SheetEvent::Cell { row, column, text: text.to_owned() });
            }
        }
        events.push(SheetEvent::RowEnd(row));
    }
    events.push(SheetEvent::SheetEnd);
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        trace: Vec<String>,
    }

    impl SheetHandler for Recorder {
        fn start_row(&mut self, row: usize) -> Result<(), MappingError> {
            self.trace.push(format!("start {row}"));
            Ok(())
        }

        fn cell(&mut self, row: usize, column: usize, text: &str) -> Result<(), MappingError> {
            self.trace.push(format!("cell {row}:{column} {text}"));
            Ok(())
        }

        fn end_row(&mut self, row: usize) -> Result<(), MappingError> {
            self.trace.push(format!("end {row}"));
            if row == 1 {
                Err(MappingError::SheetFinished)
            } else {
                Ok(())
            }
        }

        fn end_sheet(&mut self) -> Result<(), MappingError> {
            self.trace.push("done".to_owned());
            Ok(())
        }
    }

    #[test]
    fn events_skip_empty_cells() {
        let events = events_from_rows(vec![vec!["Name", "Age"], vec!["Ann", ""]]);
        assert_eq!(events, vec![
            SheetEvent::RowStart(0),
            SheetEvent::Cell { row: 0, column: 0, text: "Name".to_owned() },
            SheetEvent::Cell { row: 0, column: 1, text: "Age".to_owned() },
            SheetEvent::RowEnd(0),
            SheetEvent::RowStart(1),
            SheetEvent::Cell { row: 1, column: 0, text: "Ann".to_owned() },
            SheetEvent::RowEnd(1),
            SheetEvent::SheetEnd,
        ]);
    }

    #[test]
    fn replay_stops_at_first_error() {
        let mut recorder = Recorder::default();
        let events = events_from_rows(vec![vec!["A"], vec!["b"], vec!["c"]]);
        let result = replay(&mut recorder, events);

        assert!(matches!(result, Err(MappingError::SheetFinished)));
        assert_eq!(recorder.trace, vec!["start 0", "cell 0:0 A", "end 0", "start 1", "cell 1:0 b", "end 1"]);
    }
}
