use chrono::Duration;
use chrono::NaiveDate;

/// Serial of 9999-12-31, the last day a spreadsheet can hold
const MAX_SERIAL: f64 = 2_958_465.0;

/// Storage kind of a worksheet cell, derived from its `t` attribute and number format.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) enum CellType {
    #[default]
    Empty,
    Boolean,
    Number,
    /// Serial date-time from the 1900 epoch
    NumberDateTime1900,
    NumberDate1900,
    NumberTime1900,
    /// Serial date-time from the 1904 epoch
    NumberDateTime1904,
    NumberDate1904,
    NumberTime1904,
    /// ISO 8601 text (`t="d"`)
    IsoDateTime,
    InlineString,
    /// Index into the shared string table
    SharedString,
    Error,
}

impl CellType {
    /// Cell type implied by a built-in number format id.
    pub(crate) fn parse_builtin_number_format_id(id: &str, is_1904: bool) -> Option<Self> {
        match id {
            "22" => Some(Self::date_time(is_1904)),
            "14" | "15" | "16" | "17" => Some(Self::date(is_1904)),
            "18" | "19" | "20" | "21" | "45" | "46" | "47" => Some(Self::time(is_1904)),
            _ => None,
        }
    }

    /// Cell type implied by a custom format code such as `dd/mm/yyyy hh:mm`.
    /// Quoted literals, escapes and bracketed sections are ignored.
    pub(crate) fn parse_custom_number_format(format: &str, is_1904: bool) -> Self {
        let mut is_escaped = false;
        let mut is_literal = false;
        let mut is_bracket = false;
        let mut is_date = false;
        let mut is_time = false;
        for character in format.chars() {
            match character {
                _ if is_escaped => is_escaped = false,
                '_' | '\\' => is_escaped = true,

                '"' if is_literal => is_literal = false,
                '"' if !is_bracket => is_literal = true,

                ']' if is_bracket => is_bracket = false,
                '[' if !is_literal => is_bracket = true,
                _ if is_literal || is_bracket => (),

                'Y' | 'y' | 'D' | 'd' => is_date = true,
                'H' | 'h' | 'S' | 's' => is_time = true,
                _ => (),
            }
        }

        match (is_date, is_time) {
            (true, true) => Self::date_time(is_1904),
            (true, false) => Self::date(is_1904),
            (false, true) => Self::time(is_1904),
            (false, false) => Self::Number,
        }
    }

    fn date_time(is_1904: bool) -> Self {
        if is_1904 { Self::NumberDateTime1904 } else { Self::NumberDateTime1900 }
    }

    fn date(is_1904: bool) -> Self {
        if is_1904 { Self::NumberDate1904 } else { Self::NumberDate1900 }
    }

    fn time(is_1904: bool) -> Self {
        if is_1904 { Self::NumberTime1904 } else { Self::NumberTime1900 }
    }
}

/// Display text of a cell as a user would read it in a spreadsheet application.
///
/// Booleans become `true`/`false`, serial dates become `YYYY-MM-DD`, serial
/// date-times `YYYY-MM-DD HH:MM:SS` and serial times `HH:MM:SS`. A serial
/// value that is not a number is passed through unchanged.
pub(crate) fn display_text(kind: CellType, value: &str) -> String {
    let formatted = match kind {
        CellType::Boolean => Some(if value == "1" { "true" } else { "false" }.to_owned()),
        CellType::NumberDateTime1900 => to_datetime_string(value, false),
        CellType::NumberDateTime1904 => to_datetime_string(value, true),
        CellType::NumberDate1900 => to_date_string(value, false),
        CellType::NumberDate1904 => to_date_string(value, true),
        CellType::NumberTime1900 | CellType::NumberTime1904 => to_time_string(value),
        CellType::IsoDateTime => Some(value.replacen('T', " ", 1)),
        _ => None,
    };
    formatted.unwrap_or_else(|| value.to_owned())
}

fn serial_date(days: i64, is_1904: bool) -> Option<NaiveDate> {
    // 1900 serials count the nonexistent 1900-02-29
    let offset = if is_1904 {
        1462
    } else if days < 60 {
        1
    } else {
        0
    };
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::try_days(days.checked_add(offset)?)?)
}

fn split_milliseconds(milliseconds: i64) -> (i64, i64, i64, i64) {
    let seconds = milliseconds / 1_000;
    (seconds / 3_600, seconds / 60 % 60, seconds % 60, milliseconds % 1_000)
}

fn format_time(milliseconds: i64) -> String {
    let (hours, minutes, seconds, millis) = split_milliseconds(milliseconds);
    if millis > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}.{millis:03}")
    } else {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    }
}

/// Parses a serial value, rejecting NaN, infinities and serials past year 9999.
fn parse_serial(value: &str) -> Option<f64> {
    value
        .parse::<f64>()
        .ok()
        .filter(|serial| serial.is_finite() && serial.abs() <= MAX_SERIAL + 1.0)
}

fn to_date_string(value: &str, is_1904: bool) -> Option<String> {
    let days = parse_serial(value)?.trunc() as i64;
    serial_date(days, is_1904).map(|date| date.format("%Y-%m-%d").to_string())
}

fn to_time_string(value: &str) -> Option<String> {
    let factor = parse_serial(value)?;
    let milliseconds = (factor.fract().abs() * 86_400_000f64).round() as i64;
    Some(format_time(milliseconds.min(86_399_999)))
}

fn to_datetime_string(value: &str, is_1904: bool) -> Option<String> {
    let serial = parse_serial(value)?;
    let total = (serial * 86_400_000f64).round() as i64;
    let days = total.div_euclid(86_400_000);
    let date = serial_date(days, is_1904)?;
    let time = format_time(total.rem_euclid(86_400_000));
    Some(format!("{} {time}", date.format("%Y-%m-%d")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_and_custom_formats() {
        assert_eq!(CellType::parse_builtin_number_format_id("14", false), Some(CellType::NumberDate1900));
        assert_eq!(CellType::parse_builtin_number_format_id("22", true), Some(CellType::NumberDateTime1904));
        assert_eq!(CellType::parse_builtin_number_format_id("2", false), None);

        assert_eq!(CellType::parse_custom_number_format("dd/mm/yyyy", false), CellType::NumberDate1900);
        assert_eq!(CellType::parse_custom_number_format("yyyy-mm-dd hh:mm", false), CellType::NumberDateTime1900);
        assert_eq!(CellType::parse_custom_number_format("hh:mm:ss", true), CellType::NumberTime1904);
        assert_eq!(CellType::parse_custom_number_format("[Red]0.00", false), CellType::Number);
        assert_eq!(CellType::parse_custom_number_format("0.0\" days\"", false), CellType::Number);
    }

    #[test]
    fn display_serial_values() {
        assert_eq!(display_text(CellType::NumberDate1900, "45306"), "2024-01-15");
        assert_eq!(display_text(CellType::NumberDate1900, "1"), "1900-01-01");
        assert_eq!(display_text(CellType::NumberDate1904, "0"), "1904-01-01");
        assert_eq!(display_text(CellType::NumberDateTime1900, "45306.5"), "2024-01-15 12:00:00");
        assert_eq!(display_text(CellType::NumberDateTime1900, "45306"), "2024-01-15 00:00:00");
        assert_eq!(display_text(CellType::NumberTime1900, "0.75"), "18:00:00");
        assert_eq!(display_text(CellType::NumberTime1900, "0.999999999"), "23:59:59.999");
    }

    #[test]
    fn display_other_values() {
        assert_eq!(display_text(CellType::Boolean, "1"), "true");
        assert_eq!(display_text(CellType::Boolean, "0"), "false");
        assert_eq!(display_text(CellType::IsoDateTime, "2024-01-15T08:30:00"), "2024-01-15 08:30:00");
        assert_eq!(display_text(CellType::Number, "12.5"), "12.5");
        assert_eq!(display_text(CellType::NumberDate1900, "n/a"), "n/a");
    }

    #[test]
    fn out_of_range_serials_pass_through() {
        assert_eq!(display_text(CellType::NumberDate1904, "1e300"), "1e300");
        assert_eq!(display_text(CellType::NumberDate1900, "-1e300"), "-1e300");
        assert_eq!(display_text(CellType::NumberDateTime1904, "1e300"), "1e300");
        assert_eq!(display_text(CellType::NumberTime1900, "inf"), "inf");
        assert_eq!(display_text(CellType::NumberDate1900, "NaN"), "NaN");
        assert_eq!(display_text(CellType::NumberDate1900, "2958465"), "9999-12-31");
    }
}
