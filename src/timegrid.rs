use crate::data::Period;

// Fixed daily layout: first lesson at 08:00, 45-minute lessons separated by
// 15-minute breaks. Periods are 1-based.
pub const DAY_START_HOUR: u32 = 8;
pub const LESSON_MINUTES: u32 = 45;
pub const BREAK_MINUTES: u32 = 15;

/// Wall-clock start of a period, as "HH:MM:SS".
pub fn start_time(period: Period) -> String {
    format_clock(start_minutes(period))
}

/// Wall-clock end of a period, as "HH:MM:SS".
pub fn end_time(period: Period) -> String {
    format_clock(start_minutes(period) + LESSON_MINUTES)
}

fn start_minutes(period: Period) -> u32 {
    DAY_START_HOUR * 60 + (u32::from(period) - 1) * (LESSON_MINUTES + BREAK_MINUTES)
}

fn format_clock(total_minutes: u32) -> String {
    format!("{:02}:{:02}:00", total_minutes / 60, total_minutes % 60)
}
